//! The operator-facing side of every action: confirmation prompts and
//! non-blocking result notices.

use std::cell::RefCell;
use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::view::format_coordinate;

pub const CONFIRM_TRANSFER: &str = "Are you sure you want to transfer this data?";
pub const CONFIRM_LOCAL_DELETE: &str =
    "Are you sure you want to delete this location from the local device?";
pub const CONFIRM_REMOTE_DELETE: &str =
    "Are you sure you want to delete this location from the server?";

/// Something the operator is told once an action ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Notice {
    Captured {
        name: String,
        lat: Option<f64>,
        lng: Option<f64>,
    },
    NameRequired,
    CaptureFailed(String),
    LocationFailed(String),
    NothingToSync,
    Synced(usize),
    SyncFailed(String),
    LocalDeleted,
    LocalDeleteFailed(String),
    RemoteDeleted,
    RemoteDeleteFailed(String),
    RemoteLoadFailed(String),
}

impl Notice {
    /// Whether the notice reports a failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Notice::NameRequired
                | Notice::CaptureFailed(_)
                | Notice::LocationFailed(_)
                | Notice::SyncFailed(_)
                | Notice::LocalDeleteFailed(_)
                | Notice::RemoteDeleteFailed(_)
                | Notice::RemoteLoadFailed(_)
        )
    }
}

impl Display for Notice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::Captured { name, lat, lng } => write!(
                f,
                "Captured:\n{}\nLat: {}\nLng: {}",
                name,
                format_coordinate(*lat),
                format_coordinate(*lng)
            ),
            Notice::NameRequired => write!(f, "Please enter a name"),
            Notice::CaptureFailed(_) => write!(f, "Failed to save location."),
            Notice::LocationFailed(reason) => write!(f, "Error getting location: {}", reason),
            Notice::NothingToSync => write!(f, "All data already synced!"),
            Notice::Synced(count) => write!(f, "{} location(s) synced successfully!", count),
            Notice::SyncFailed(_) => write!(f, "Failed to sync data."),
            Notice::LocalDeleted => write!(f, "Location deleted successfully."),
            Notice::LocalDeleteFailed(_) => write!(f, "Something went wrong while deleting."),
            Notice::RemoteDeleted => write!(f, "Location deleted."),
            Notice::RemoteDeleteFailed(_) => write!(f, "Failed to delete location."),
            Notice::RemoteLoadFailed(_) => write!(f, "Error fetching locations."),
        }
    }
}

/// Dialog collaborator used by the coordinators.
pub trait Operator {
    /// Asks a yes/no question; `false` aborts the action without changes.
    fn confirm(&self, prompt: &str) -> bool;

    /// Shows a result without blocking the action.
    fn notify(&self, notice: Notice);
}

/// An operator whose answer was collected up front, e.g. by a host UI
/// before calling through FFI. Notices are kept for the caller to show.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answer: bool,
    prompts: RefCell<Vec<String>>,
    notices: RefCell<Vec<Notice>>,
}

impl ScriptedOperator {
    pub fn accepting() -> Self {
        Self::answering(true)
    }

    pub fn declining() -> Self {
        Self::answering(false)
    }

    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.borrow().clone()
    }

    pub fn last_notice(&self) -> Option<Notice> {
        self.notices.borrow().last().cloned()
    }
}

impl Operator for ScriptedOperator {
    fn confirm(&self, prompt: &str) -> bool {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.answer
    }

    fn notify(&self, notice: Notice) {
        log::info!("Notice: {}", notice);
        self.notices.borrow_mut().push(notice);
    }
}
