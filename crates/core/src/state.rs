// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The sapporo developers

//! Run state machine.
//!
//! `state.txt` on disk holds exactly one of these words. Transitions are
//! checked immediately before every write; a forbidden transition is a
//! no-op reported as a state conflict, never a partial write.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle state of a run.
///
/// `PAUSED`, `PREEMPTED` and `UNKNOWN` are representable for WES
/// compatibility but are never produced by this implementation
/// (`UNKNOWN` only appears when `state.txt` is missing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Unknown,
    Queued,
    Initializing,
    Running,
    Paused,
    Complete,
    ExecutorError,
    SystemError,
    Canceled,
    Canceling,
    Preempted,
    Deleting,
    Deleted,
}

crate::simple_display! {
    State {
        Unknown => "UNKNOWN",
        Queued => "QUEUED",
        Initializing => "INITIALIZING",
        Running => "RUNNING",
        Paused => "PAUSED",
        Complete => "COMPLETE",
        ExecutorError => "EXECUTOR_ERROR",
        SystemError => "SYSTEM_ERROR",
        Canceled => "CANCELED",
        Canceling => "CANCELING",
        Preempted => "PREEMPTED",
        Deleting => "DELETING",
        Deleted => "DELETED",
    }
}

impl FromStr for State {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "UNKNOWN" => Ok(State::Unknown),
            "QUEUED" => Ok(State::Queued),
            "INITIALIZING" => Ok(State::Initializing),
            "RUNNING" => Ok(State::Running),
            "PAUSED" => Ok(State::Paused),
            "COMPLETE" => Ok(State::Complete),
            "EXECUTOR_ERROR" => Ok(State::ExecutorError),
            "SYSTEM_ERROR" => Ok(State::SystemError),
            "CANCELED" => Ok(State::Canceled),
            "CANCELING" => Ok(State::Canceling),
            "PREEMPTED" => Ok(State::Preempted),
            "DELETING" => Ok(State::Deleting),
            "DELETED" => Ok(State::Deleted),
            other => Err(StateError::UnknownWord(other.to_string())),
        }
    }
}

impl State {
    /// Terminal states are absorbing: no transition leaves them except
    /// the deletion path.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            State::Complete
                | State::ExecutorError
                | State::SystemError
                | State::Canceled
                | State::Deleted
        )
    }

    /// States from which a cooperative cancel may be requested.
    pub fn is_cancelable(&self) -> bool {
        matches!(self, State::Queued | State::Initializing | State::Running)
    }

    /// Whether `self → to` is a legal transition.
    ///
    /// The graph:
    ///
    /// ```text
    /// QUEUED → INITIALIZING → RUNNING → {COMPLETE, EXECUTOR_ERROR, SYSTEM_ERROR}
    /// {QUEUED, INITIALIZING, RUNNING} → CANCELING → CANCELED
    /// any non-terminal → SYSTEM_ERROR        (reconciliation of dead runs)
    /// any state but DELETING/DELETED → DELETING → DELETED
    /// ```
    ///
    /// Deleting an in-flight run is allowed but not recommended; the
    /// dispatcher later finds its directory gone.
    pub fn can_transition(&self, to: State) -> bool {
        if *self == to {
            return false;
        }
        match to {
            State::Initializing => *self == State::Queued,
            State::Running => *self == State::Initializing,
            State::Complete | State::ExecutorError => *self == State::Running,
            State::SystemError => !self.is_terminal() && *self != State::Deleting,
            State::Canceling => self.is_cancelable(),
            State::Canceled => *self == State::Canceling,
            State::Deleting => !matches!(self, State::Deleting | State::Deleted),
            State::Deleted => *self == State::Deleting,
            State::Queued | State::Unknown | State::Paused | State::Preempted => false,
        }
    }
}

/// Errors from parsing state words.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("unrecognized state word: {0:?}")]
    UnknownWord(String),
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
