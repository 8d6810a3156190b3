//! Conversation handling: commands, free text and button presses.
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::callback::CallbackAction;
use crate::db::{StoreError, WatchStore};
use crate::github::ReleaseLookup;
use crate::identity::parse_repo_ref;
use crate::keyboards::{self, render_watch_page, LIST_TEXT};
use crate::model::WatchEntry;
use crate::transport::ChatTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingRepoInput,
}

/// Per-chat conversation state. Idle chats are not stored.
#[derive(Debug, Default)]
pub struct Conversations {
    states: Mutex<HashMap<String, ConversationState>>,
}

impl Conversations {
    pub async fn get(&self, chat_id: &str) -> ConversationState {
        self.states
            .lock()
            .await
            .get(chat_id)
            .copied()
            .unwrap_or_default()
    }

    pub async fn set(&self, chat_id: &str, state: ConversationState) {
        let mut states = self.states.lock().await;
        match state {
            ConversationState::Idle => {
                states.remove(chat_id);
            }
            other => {
                states.insert(chat_id.to_string(), other);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Invalid,
    NotFound,
    AlreadyWatching,
    Added { has_releases: bool },
}

pub struct Controller {
    store: Arc<dyn WatchStore>,
    lookup: Arc<dyn ReleaseLookup>,
    transport: Arc<dyn ChatTransport>,
    conversations: Conversations,
    page_size: usize,
}

impl Controller {
    pub fn new(
        store: Arc<dyn WatchStore>,
        lookup: Arc<dyn ReleaseLookup>,
        transport: Arc<dyn ChatTransport>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            lookup,
            transport,
            conversations: Conversations::default(),
            page_size: page_size.max(1),
        }
    }

    pub async fn state(&self, chat_id: &str) -> ConversationState {
        self.conversations.get(chat_id).await
    }

    pub async fn handle_start(&self, chat_id: &str) -> Result<()> {
        self.send_menu(chat_id).await
    }

    pub async fn handle_about(&self, chat_id: &str) -> Result<()> {
        self.transport
            .send_message(chat_id, keyboards::ABOUT_TEXT, None)
            .await?;
        Ok(())
    }

    /// Free text: a repository reference while awaiting one, otherwise an
    /// unknown command. Awaiting input is consumed by one attempt.
    #[instrument(skip_all, fields(chat_id = %chat_id))]
    pub async fn handle_text(&self, chat_id: &str, text: &str) -> Result<()> {
        match self.conversations.get(chat_id).await {
            ConversationState::AwaitingRepoInput => {
                self.conversations
                    .set(chat_id, ConversationState::Idle)
                    .await;
                self.add_repo(chat_id, text).await?;
            }
            ConversationState::Idle => {
                self.transport
                    .send_message(chat_id, keyboards::UNKNOWN_COMMAND_TEXT, None)
                    .await?;
                self.send_menu(chat_id).await?;
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(chat_id = %chat_id, message_id = message_id, data = %data))]
    pub async fn handle_callback(&self, chat_id: &str, message_id: i32, data: &str) -> Result<()> {
        let action = match data.parse::<CallbackAction>() {
            Ok(action) => action,
            Err(err) => {
                warn!(%err, "ignoring malformed callback");
                return Ok(());
            }
        };

        match action {
            CallbackAction::SeeAll => self.show_page(chat_id, message_id, 0, false).await,
            CallbackAction::PreviousPage(page) | CallbackAction::NextPage(page) => {
                self.show_page(chat_id, message_id, page, true).await
            }
            CallbackAction::Add => {
                let res = self
                    .transport
                    .edit_message_text(
                        chat_id,
                        message_id,
                        keyboards::ADD_PROMPT_TEXT,
                        Some(keyboards::cancel_add_keyboard()),
                    )
                    .await;
                self.conversations
                    .set(chat_id, ConversationState::AwaitingRepoInput)
                    .await;
                res?;
                Ok(())
            }
            CallbackAction::Menu => {
                self.conversations
                    .set(chat_id, ConversationState::Idle)
                    .await;
                self.edit_to_menu(chat_id, message_id).await
            }
            CallbackAction::TogglePrerelease { repo_id, notify } => {
                self.store
                    .set_notify_prerelease(chat_id, &repo_id, notify)
                    .await?;
                info!(%repo_id, notify, "prerelease notifications toggled");
                self.edit_to_menu(chat_id, message_id).await
            }
            CallbackAction::Delete { repo_id } => {
                self.store.remove(chat_id, &repo_id).await?;
                info!(%repo_id, "watch removed");
                self.edit_to_menu(chat_id, message_id).await
            }
        }
    }

    /// Resolve `text` to a repository and start watching it for `chat_id`,
    /// replying with the result.
    #[instrument(skip_all, fields(chat_id = %chat_id))]
    pub async fn add_repo(&self, chat_id: &str, text: &str) -> Result<AddOutcome> {
        let Some(repo_ref) = parse_repo_ref(text) else {
            self.reply_add_result(chat_id, keyboards::INVALID_REPO_TEXT)
                .await?;
            return Ok(AddOutcome::Invalid);
        };

        let snapshot = match self.lookup.resolve(&repo_ref.owner, &repo_ref.name).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%err, repo = %repo_ref, "lookup failed while adding");
                self.reply_add_result(chat_id, keyboards::NOT_FOUND_TEXT)
                    .await?;
                return Ok(AddOutcome::NotFound);
            }
        };

        if self.store.exists(chat_id, &snapshot.repo_id).await? {
            self.reply_add_result(chat_id, keyboards::ALREADY_WATCHING_TEXT)
                .await?;
            return Ok(AddOutcome::AlreadyWatching);
        }

        let entry = WatchEntry::from_snapshot(chat_id, &snapshot);
        match self.store.add(&entry).await {
            Ok(()) => {}
            Err(StoreError::Conflict { .. }) => {
                self.reply_add_result(chat_id, keyboards::ALREADY_WATCHING_TEXT)
                    .await?;
                return Ok(AddOutcome::AlreadyWatching);
            }
            Err(err) => return Err(err.into()),
        }
        info!(repo = %entry.full_name(), repo_id = %entry.repo_id, "watch added");

        let has_releases = snapshot.has_releases();
        let text = if has_releases {
            keyboards::ADDED_TEXT
        } else {
            keyboards::ADDED_NO_RELEASES_TEXT
        };
        self.reply_add_result(chat_id, text).await?;
        Ok(AddOutcome::Added { has_releases })
    }

    async fn reply_add_result(&self, chat_id: &str, text: &str) -> Result<()> {
        self.transport
            .send_message(chat_id, text, Some(keyboards::add_another_keyboard()))
            .await?;
        Ok(())
    }

    async fn send_menu(&self, chat_id: &str) -> Result<()> {
        self.transport
            .send_message(
                chat_id,
                keyboards::START_TEXT,
                Some(keyboards::start_keyboard()),
            )
            .await?;
        Ok(())
    }

    async fn edit_to_menu(&self, chat_id: &str, message_id: i32) -> Result<()> {
        self.transport
            .edit_message_text(
                chat_id,
                message_id,
                keyboards::START_TEXT,
                Some(keyboards::start_keyboard()),
            )
            .await?;
        Ok(())
    }

    /// Render a page of the chat's watch-list into `message_id`. When the
    /// message already shows the list, only its buttons are replaced.
    async fn show_page(
        &self,
        chat_id: &str,
        message_id: i32,
        page: usize,
        keyboard_only: bool,
    ) -> Result<()> {
        let entries = self.store.get_by_chat(chat_id).await?;
        let view = render_watch_page(&entries, page, self.page_size);
        if keyboard_only && view.text == LIST_TEXT {
            self.transport
                .edit_message_keyboard(chat_id, message_id, view.keyboard)
                .await?;
        } else {
            self.transport
                .edit_message_text(chat_id, message_id, view.text, Some(view.keyboard))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conversations_default_to_idle_and_forget_idle_chats() {
        let conv = Conversations::default();
        assert_eq!(conv.get("1").await, ConversationState::Idle);
        conv.set("1", ConversationState::AwaitingRepoInput).await;
        assert_eq!(conv.get("1").await, ConversationState::AwaitingRepoInput);
        assert_eq!(conv.get("2").await, ConversationState::Idle);
        conv.set("1", ConversationState::Idle).await;
        assert_eq!(conv.get("1").await, ConversationState::Idle);
        assert!(conv.states.lock().await.is_empty());
    }
}
