use thiserror::Error;

use crate::api::{ApiError, ErrorKind};

/// Input rejected before anything is sent to the backend, or a backend
/// failure with a specific meaning for the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Name must be at most {max} characters")]
    NameTooLong { max: usize },

    #[error("Title cannot be empty")]
    EmptyTitle,

    #[error("Title must be at most {max} characters")]
    TitleTooLong { max: usize },

    #[error("Comment cannot be empty")]
    EmptyComment,

    #[error("Comment must be at most {max} characters")]
    CommentTooLong { max: usize },

    #[error("Username must be {min} to {max} letters, digits or underscores")]
    InvalidUsername { min: usize, max: usize },

    #[error("Bio must be at most {max} characters")]
    BioTooLong { max: usize },

    #[error("Nothing to update")]
    NothingToUpdate,

    #[error("Unknown reaction: {0}")]
    UnknownReaction(String),

    #[error("Image must be at most {max_bytes} bytes")]
    ImageTooLarge { max_bytes: usize },

    #[error("Unsupported image type: {0}")]
    UnsupportedImage(String),

    #[error("Wrong join key")]
    WrongJoinKey,

    #[error("Already a member of this agenda")]
    AlreadyMember,

    #[error("Already reacted")]
    AlreadyReacted,

    #[error("Only the owner can do this")]
    NotOwner,

    #[error("Only editors can do this")]
    NotEditor,
}

#[derive(Error, Debug)]
pub enum ActionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Not signed in")]
    NotSignedIn,

    #[error(transparent)]
    Api(#[from] ApiError),

    /// Session or cache files on this device could not be updated.
    #[error(transparent)]
    Local(#[from] anyhow::Error),
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::Validation(_) => ErrorKind::Constraint,
            ActionError::NotSignedIn => ErrorKind::Authorization,
            ActionError::Api(e) => e.kind(),
            ActionError::Local(_) => ErrorKind::Unknown,
        }
    }

    /// Text to show the user when the action fails.
    pub fn user_message(&self) -> String {
        match self {
            ActionError::Validation(e) => e.to_string(),
            ActionError::NotSignedIn => "Please sign in again.".to_string(),
            ActionError::Api(ApiError::AccessDenied(_)) => {
                "You do not have permission to do this.".to_string()
            }
            ActionError::Api(e) => match e.kind() {
                ErrorKind::Transient => {
                    "Could not reach the server. Check your connection and try again.".to_string()
                }
                ErrorKind::Authorization => {
                    "Your session has expired. Please sign in again.".to_string()
                }
                ErrorKind::Constraint => format!("The server rejected this change: {}", e),
                ErrorKind::Unknown => "Something went wrong. Please try again.".to_string(),
            },
            ActionError::Local(_) => "Could not update data stored on this device.".to_string(),
        }
    }
}
