//! Wire format of inline-button callback payloads.
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const SEE_ALL: &str = "see-all";
pub const ADD: &str = "add";
pub const MENU: &str = "menu";

const TOGGLE_PREFIX: &str = "OP_FLIP_";
const PREVIOUS_PREFIX: &str = "OP_PREV_";
const NEXT_PREFIX: &str = "OP_NEXT_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    SeeAll,
    Add,
    Menu,
    /// Set the prerelease opt-in of `repo_id` to `notify`.
    TogglePrerelease { repo_id: String, notify: bool },
    PreviousPage(usize),
    NextPage(usize),
    /// Bare repository id.
    Delete { repo_id: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallbackError {
    #[error("invalid page number in callback {0:?}")]
    InvalidPage(String),
    #[error("malformed prerelease toggle {0:?}")]
    InvalidToggle(String),
    #[error("empty callback payload")]
    Empty,
}

impl FromStr for CallbackAction {
    type Err = CallbackError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            "" => return Err(CallbackError::Empty),
            SEE_ALL => return Ok(Self::SeeAll),
            ADD => return Ok(Self::Add),
            MENU => return Ok(Self::Menu),
            _ => {}
        }

        if let Some(rest) = data.strip_prefix(TOGGLE_PREFIX) {
            let (flag, repo_id) = rest
                .split_once('_')
                .ok_or_else(|| CallbackError::InvalidToggle(data.to_string()))?;
            let notify = match flag {
                "T" => true,
                "F" => false,
                _ => return Err(CallbackError::InvalidToggle(data.to_string())),
            };
            if repo_id.is_empty() {
                return Err(CallbackError::InvalidToggle(data.to_string()));
            }
            return Ok(Self::TogglePrerelease {
                repo_id: repo_id.to_string(),
                notify,
            });
        }

        let page = |digits: &str| {
            digits
                .parse::<usize>()
                .map_err(|_| CallbackError::InvalidPage(data.to_string()))
        };
        if let Some(rest) = data.strip_prefix(PREVIOUS_PREFIX) {
            return Ok(Self::PreviousPage(page(rest)?));
        }
        if let Some(rest) = data.strip_prefix(NEXT_PREFIX) {
            return Ok(Self::NextPage(page(rest)?));
        }

        Ok(Self::Delete {
            repo_id: data.to_string(),
        })
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SeeAll => f.write_str(SEE_ALL),
            Self::Add => f.write_str(ADD),
            Self::Menu => f.write_str(MENU),
            Self::TogglePrerelease { repo_id, notify } => {
                let flag = if *notify { 'T' } else { 'F' };
                write!(f, "{}{}_{}", TOGGLE_PREFIX, flag, repo_id)
            }
            Self::PreviousPage(page) => write!(f, "{}{}", PREVIOUS_PREFIX, page),
            Self::NextPage(page) => write!(f, "{}{}", NEXT_PREFIX, page),
            Self::Delete { repo_id } => f.write_str(repo_id),
        }
    }
}
