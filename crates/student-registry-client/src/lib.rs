//! Client side of the student registry: a typed view-state cache over the
//! student list, the blocking HTTP client that feeds it, and the controller
//! that ties the two together.

mod controller;
mod http;
mod view;

pub use controller::{StudentListController, StudentsBackend};
pub use http::{DeletedStudent, StudentsClient, DEFAULT_SERVER_URL, DEFAULT_TIMEOUT};
pub use view::{
    filter_by_name, sort_by_name, EmptyReason, Listing, Notification, NotificationKind, SortOrder,
    StudentListView, ViewState,
};

use student_registry_core::ErrorKind;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ClientError {
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("request failed without an error body"))]
    Api { status: u16, kind: Option<ErrorKind>, message: Option<String> },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("{0}")]
    InvalidIdentifier(String),
    #[error("{0}")]
    Validation(String),
    #[error("student list is not ready")]
    NotReady,
}

impl ClientError {
    /// Build an API error, classifying it from the status and the server's message.
    #[must_use]
    pub fn api(status: u16, message: Option<String>) -> Self {
        let kind = match status {
            400 if message
                .as_deref()
                .is_some_and(|text| text.starts_with("invalid student id")) =>
            {
                Some(ErrorKind::InvalidIdentifier)
            }
            400 => Some(ErrorKind::Validation),
            404 => Some(ErrorKind::NotFound),
            500..=599 => Some(ErrorKind::StoreUnavailable),
            _ => None,
        };
        Self::Api { status, kind, message }
    }

    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Api { kind, .. } => *kind,
            Self::InvalidIdentifier(_) => Some(ErrorKind::InvalidIdentifier),
            Self::Validation(_) => Some(ErrorKind::Validation),
            Self::Transport(_) | Self::Decode(_) | Self::NotReady => None,
        }
    }

    /// Text shown to the user: the server's own message when it sent one,
    /// locally detected problems as-is, `fallback` otherwise.
    #[must_use]
    pub fn notification_text(&self, fallback: &str) -> String {
        match self {
            Self::Api { message: Some(message), .. } if !message.is_empty() => message.clone(),
            Self::InvalidIdentifier(message) | Self::Validation(message) => message.clone(),
            _ => fallback.to_string(),
        }
    }
}
