// =============================================================================
// Error taxonomy
// =============================================================================
//
// Only two kinds of error ever surface past a component boundary:
//   - MalformedSeriesError: fatal for one (asset, cycle) evaluation.
//   - ConfigError:          fatal at startup, before the first cycle.
//
// RemoteServiceError never leaves the orchestrator: it is converted into a
// fallback transition and logged as a warning.  Insufficient data and risk
// rejections are plain values, not errors.
// =============================================================================

use std::time::Duration;

use thiserror::Error;

/// Input series that cannot be evaluated at all.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedSeriesError {
    #[error("price series is empty")]
    Empty,

    #[error("bar {index} is not after its predecessor (timestamp {timestamp} <= {previous})")]
    NonChronological {
        index: usize,
        timestamp: i64,
        previous: i64,
    },

    #[error("bar {index} carries a non-finite or negative price/volume")]
    InvalidBar { index: usize },
}

/// Failure of the remote-inference collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteServiceError {
    #[error("remote inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote inference returned HTTP {0}")]
    Status(u16),

    #[error("malformed remote response: {0}")]
    Malformed(String),

    #[error("remote call abandoned: cycle superseded")]
    Superseded,

    #[error("remote inference disabled")]
    Disabled,
}

impl RemoteServiceError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// A malformed reply is a property of the remote model's output, not of
    /// the network, so it is not retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::Malformed(_) | Self::Superseded | Self::Disabled => false,
        }
    }
}

/// Invalid configuration, detected while building the immutable profile.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} = {value} is outside the permitted range [{min}, {max}]")]
    OutOfBounds {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("weight table entry {regime}/{level}: {reason}")]
    InvalidWeights {
        regime: String,
        level: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
