//! Order lifecycle state machine.
//!
//! `queued -> validating -> generating -> compositing -> completed`, with
//! `failed` reachable from every in-progress state. A queued order whose
//! pages are all recorded already may jump straight to `completed`, and a
//! terminal order may be re-queued for a retry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Queued,
    Validating,
    Generating,
    Compositing,
    Completed,
    Failed,
}

impl OrderState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Validating => "validating",
            Self::Generating => "generating",
            Self::Compositing => "compositing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// States reachable from `self` in one step.
    pub fn valid_transitions(self) -> &'static [OrderState] {
        use OrderState::*;
        match self {
            Queued => &[Validating, Completed, Failed],
            Validating => &[Generating, Failed],
            Generating => &[Compositing, Failed],
            Compositing => &[Completed, Failed],
            Completed | Failed => &[Queued],
        }
    }

    pub fn can_transition_to(self, next: OrderState) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn validate_transition(self, next: OrderState) -> Result<(), CoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::Internal(format!(
                "Invalid order transition: {self} -> {next}"
            )))
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "validating" => Ok(Self::Validating),
            "generating" => Ok(Self::Generating),
            "compositing" => Ok(Self::Compositing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!("Unknown order state '{other}'"))),
        }
    }
}
