//! User-initiated writes.
//!
//! Every action validates its input before touching the network, sends
//! the write, then patches whatever the cache holds so the next screen
//! mount shows the change without waiting for a refetch. Failures are
//! returned to the caller; authorization failures also end the session.

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::warn;

use crate::api::{ApiError, ErrorKind};
use crate::sync::SyncContext;

pub mod agenda;
pub mod error;
pub mod profile;

pub use error::{ActionError, ValidationError};

pub const MAX_AGENDA_NAME_LEN: usize = 15;
pub const MAX_SECTION_NAME_LEN: usize = 50;
pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_COMMENT_LEN: usize = 500;
pub const MAX_BIO_LEN: usize = 200;
pub const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=20;
pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;
pub const JOIN_KEY_LEN: usize = 8;

pub const REACTION_KINDS: &[&str] = &["like", "love", "laugh", "wow", "fire"];

/// Write operations, sharing the screens' cache, backend and session.
#[derive(Clone)]
pub struct Actions {
    ctx: SyncContext,
}

impl Actions {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    fn viewer(&self) -> Result<String, ActionError> {
        self.ctx.session.user_id().ok_or(ActionError::NotSignedIn)
    }

    fn checked<T>(&self, action: &str, result: Result<T, ApiError>) -> Result<T, ActionError> {
        result.map_err(|e| self.report(action, e))
    }

    /// Log a backend failure and end the session when it was rejected as
    /// unauthorized.
    fn report(&self, action: &str, error: ApiError) -> ActionError {
        match error.kind() {
            ErrorKind::Authorization => {
                warn!(action, error = %error, "Write rejected, ending session");
                self.ctx.session.expire();
            }
            _ => warn!(action, error = %error, "Write failed"),
        }
        ActionError::Api(error)
    }
}

/// Trim and bound a required piece of text by character count.
fn bounded(
    text: &str,
    max: usize,
    empty: ValidationError,
    too_long: ValidationError,
) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(empty);
    }
    if trimmed.chars().count() > max {
        return Err(too_long);
    }
    Ok(trimmed.to_string())
}

pub fn validate_agenda_name(name: &str) -> Result<String, ValidationError> {
    bounded(
        name,
        MAX_AGENDA_NAME_LEN,
        ValidationError::EmptyName,
        ValidationError::NameTooLong {
            max: MAX_AGENDA_NAME_LEN,
        },
    )
}

pub fn validate_section_name(name: &str) -> Result<String, ValidationError> {
    bounded(
        name,
        MAX_SECTION_NAME_LEN,
        ValidationError::EmptyName,
        ValidationError::NameTooLong {
            max: MAX_SECTION_NAME_LEN,
        },
    )
}

pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    bounded(
        title,
        MAX_TITLE_LEN,
        ValidationError::EmptyTitle,
        ValidationError::TitleTooLong { max: MAX_TITLE_LEN },
    )
}

pub fn validate_comment(content: &str) -> Result<String, ValidationError> {
    bounded(
        content,
        MAX_COMMENT_LEN,
        ValidationError::EmptyComment,
        ValidationError::CommentTooLong {
            max: MAX_COMMENT_LEN,
        },
    )
}

pub fn validate_username(username: &str) -> Result<String, ValidationError> {
    let trimmed = username.trim();
    let valid_chars = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_chars || !USERNAME_LEN.contains(&trimmed.chars().count()) {
        return Err(ValidationError::InvalidUsername {
            min: *USERNAME_LEN.start(),
            max: *USERNAME_LEN.end(),
        });
    }
    Ok(trimmed.to_string())
}

pub fn validate_reaction(kind: &str) -> Result<&'static str, ValidationError> {
    REACTION_KINDS
        .iter()
        .find(|k| **k == kind)
        .copied()
        .ok_or_else(|| ValidationError::UnknownReaction(kind.to_string()))
}

/// File extension for an accepted avatar content type.
pub fn avatar_extension(content_type: &str) -> Result<&'static str, ValidationError> {
    match content_type {
        "image/jpeg" => Ok("jpg"),
        "image/png" => Ok("png"),
        "image/webp" => Ok("webp"),
        other => Err(ValidationError::UnsupportedImage(other.to_string())),
    }
}

/// Random alphanumeric key members type in to join an agenda.
pub fn generate_join_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(JOIN_KEY_LEN)
        .map(char::from)
        .collect()
}
