//! IPC protocol types for a controlling shell or preferences front-end.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (daemon -> client).
//! Commands use `{"command": "<name>", ...}` format (client -> daemon).

pub mod bridge;

use serde::{Deserialize, Serialize};

use crate::controller::Action;

// ---------------------------------------------------------------------------
// Events: daemon -> client (stdout)
// ---------------------------------------------------------------------------

/// All events emitted via stdout as JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum DaemonEvent {
    Starting {},
    Ready {
        gesture: String,
    },
    ZoomChanged {
        from: f64,
        to: f64,
    },
    ZoomReset {
        from: f64,
    },
    WorkspaceSwitched {
        from: usize,
        to: usize,
    },
    GestureChanged {
        gesture: String,
    },
    Status {
        active: bool,
        gesture: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        factor: Option<f64>,
        subscriptions: usize,
    },
    Pong {},
    Error {
        message: String,
    },
    Stopping {},
}

impl From<&Action> for DaemonEvent {
    fn from(action: &Action) -> Self {
        match *action {
            Action::ZoomChanged { from, to } => Self::ZoomChanged { from, to },
            Action::ZoomReset { from } => Self::ZoomReset { from },
            Action::WorkspaceSwitched { from, to } => Self::WorkspaceSwitched { from, to },
        }
    }
}

// ---------------------------------------------------------------------------
// Commands: client -> daemon (stdin)
// ---------------------------------------------------------------------------

/// All commands received via stdin as JSON lines.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum DaemonCommand {
    Ping {},
    Status {},
    ResetZoom {},
    /// Persist a new `modifier-key` token (same as the preferences form).
    SetModifierKey {
        key: String,
    },
    Stop {},
}
