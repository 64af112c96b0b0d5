use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Processing pipeline lifecycle. Acquisitions are only accepted while
/// `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Initializing {
        progress: u8,
    },
    Running {
        #[serde(skip)]
        start_time: Option<Instant>,
        acquisitions_processed: u64,
    },
    Paused {
        #[serde(skip)]
        pause_time: Option<Instant>,
        acquisitions_processed: u64,
    },
    Stopped {
        #[serde(skip)]
        duration: Option<Duration>,
        total_acquisitions: u64,
    },
    Error {
        error_msg: String,
        recoverable: bool,
    },
}

impl PipelineState {
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, target),
            (Idle, Initializing { .. })
                | (Initializing { .. }, Running { .. })
                | (Initializing { .. }, Error { .. })
                | (Running { .. }, Running { .. })
                | (Running { .. }, Paused { .. })
                | (Running { .. }, Stopped { .. })
                | (Running { .. }, Error { .. })
                | (Paused { .. }, Running { .. })
                | (Paused { .. }, Stopped { .. })
                | (Paused { .. }, Error { .. })
                | (Stopped { .. }, Idle)
                | (Error { recoverable: true, .. }, Idle)
        )
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Initializing { .. } => "Initializing",
            Self::Running { .. } => "Running",
            Self::Paused { .. } => "Paused",
            Self::Stopped { .. } => "Stopped",
            Self::Error { .. } => "Error",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Acquisitions published since the pipeline started
    pub fn acquisitions_processed(&self) -> u64 {
        match self {
            Self::Running {
                acquisitions_processed,
                ..
            }
            | Self::Paused {
                acquisitions_processed,
                ..
            } => *acquisitions_processed,
            Self::Stopped {
                total_acquisitions, ..
            } => *total_acquisitions,
            _ => 0,
        }
    }
}
