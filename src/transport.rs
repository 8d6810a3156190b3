//! Outbound chat operations behind a trait, with the Telegram implementation.
use async_trait::async_trait;
use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId};
use teloxide::{ApiError, RequestError};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    Callback(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub action: ButtonAction,
}

impl Button {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Url(url.into()),
        }
    }
}

/// Rows of inline buttons attached to a message.
pub type Keyboard = Vec<Vec<Button>>;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The chat no longer exists or refuses messages from the bot.
    #[error("chat unavailable: {0}")]
    ChatUnavailable(String),
    #[error("transport error: {0:#}")]
    Other(#[from] anyhow::Error),
}

impl TransportError {
    pub fn is_chat_unavailable(&self) -> bool {
        matches!(self, TransportError::ChatUnavailable(_))
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), TransportError>;

    async fn edit_message_text(
        &self,
        chat_id: &str,
        message_id: i32,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), TransportError>;

    async fn edit_message_keyboard(
        &self,
        chat_id: &str,
        message_id: i32,
        keyboard: Keyboard,
    ) -> Result<(), TransportError>;
}

#[derive(Debug, Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn parse_chat_id(chat_id: &str) -> Result<ChatId, TransportError> {
    chat_id
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| TransportError::ChatUnavailable(format!("invalid chat id {:?}", chat_id)))
}

fn to_markup(keyboard: Keyboard) -> Result<InlineKeyboardMarkup, TransportError> {
    let mut rows = Vec::with_capacity(keyboard.len());
    for row in keyboard {
        let mut buttons = Vec::with_capacity(row.len());
        for button in row {
            buttons.push(match button.action {
                ButtonAction::Callback(data) => InlineKeyboardButton::callback(button.text, data),
                ButtonAction::Url(url) => {
                    let url = Url::parse(&url)
                        .map_err(|e| anyhow::anyhow!("invalid button url {}: {}", url, e))?;
                    InlineKeyboardButton::url(button.text, url)
                }
            });
        }
        rows.push(buttons);
    }
    Ok(InlineKeyboardMarkup::new(rows))
}

/// Split Telegram failures into permanent delivery failures and the rest.
pub fn classify(err: RequestError) -> TransportError {
    match err {
        RequestError::Api(
            api @ (ApiError::BotBlocked
            | ApiError::ChatNotFound
            | ApiError::UserDeactivated
            | ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup
            | ApiError::CantInitiateConversation
            | ApiError::CantTalkWithBots),
        ) => TransportError::ChatUnavailable(api.to_string()),
        other => TransportError::Other(other.into()),
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    #[instrument(skip_all, fields(chat_id = %chat_id))]
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), TransportError> {
        let chat = parse_chat_id(chat_id)?;
        let mut req = self.bot.send_message(chat, text);
        if let Some(kb) = keyboard {
            req = req.reply_markup(to_markup(kb)?);
        }
        req.await.map_err(classify)?;
        Ok(())
    }

    #[instrument(skip_all, fields(chat_id = %chat_id, message_id = message_id))]
    async fn edit_message_text(
        &self,
        chat_id: &str,
        message_id: i32,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), TransportError> {
        let chat = parse_chat_id(chat_id)?;
        let mut req = self.bot.edit_message_text(chat, MessageId(message_id), text);
        if let Some(kb) = keyboard {
            req = req.reply_markup(to_markup(kb)?);
        }
        req.await.map_err(classify)?;
        Ok(())
    }

    #[instrument(skip_all, fields(chat_id = %chat_id, message_id = message_id))]
    async fn edit_message_keyboard(
        &self,
        chat_id: &str,
        message_id: i32,
        keyboard: Keyboard,
    ) -> Result<(), TransportError> {
        let chat = parse_chat_id(chat_id)?;
        self.bot
            .edit_message_reply_markup(chat, MessageId(message_id))
            .reply_markup(to_markup(keyboard)?)
            .await
            .map_err(classify)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_and_missing_chats_are_unavailable() {
        assert!(classify(RequestError::Api(ApiError::BotBlocked)).is_chat_unavailable());
        assert!(classify(RequestError::Api(ApiError::ChatNotFound)).is_chat_unavailable());
        assert!(classify(RequestError::Api(ApiError::UserDeactivated)).is_chat_unavailable());
    }

    #[test]
    fn other_api_errors_are_transient() {
        let err = classify(RequestError::Api(ApiError::MessageNotModified));
        assert!(!err.is_chat_unavailable());
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        assert!(!classify(RequestError::Io(io)).is_chat_unavailable());
    }

    #[test]
    fn non_numeric_chat_id_is_unavailable() {
        assert!(parse_chat_id("abc").unwrap_err().is_chat_unavailable());
        assert_eq!(parse_chat_id("-100123").unwrap(), ChatId(-100123));
    }

    #[test]
    fn keyboard_converts_to_inline_markup() {
        let kb = vec![vec![
            Button::url("repo", "https://github.com/a/b"),
            Button::callback("del", "R_1"),
        ]];
        let markup = to_markup(kb).unwrap();
        assert_eq!(markup.inline_keyboard.len(), 1);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert_eq!(markup.inline_keyboard[0][1].text, "del");
    }

    #[test]
    fn invalid_button_url_is_rejected() {
        let kb = vec![vec![Button::url("bad", "not a url")]];
        assert!(to_markup(kb).is_err());
    }
}
