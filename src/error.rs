use std::io;

use thiserror::Error;
use tracing::error;

use crate::transport::Tag;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, GasError>;

/// Errors surfaced by loading, partitioning, and GAS execution.
#[derive(Debug, Error)]
pub enum GasError {
    /// Underlying I/O failure (unreadable input file, socket error).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A non-comment input line that is not an edge.
    #[error("malformed edge at line {line}: {content:?}")]
    Parse {
        /// One-based line number in the input file.
        line: usize,
        /// Offending line content.
        content: String,
    },
    /// Partitioning strategy id outside the closed enumeration.
    #[error("unknown partitioning strategy id {0}")]
    UnknownStrategy(i64),
    /// A message arrived with a tag the running phase does not expect.
    #[error("protocol desynchronization: expected tag {expected:?}, found {found} from rank {peer}")]
    Protocol {
        /// Tag the phase was draining.
        expected: Tag,
        /// Raw tag value observed on the wire.
        found: u8,
        /// Rank that sent the message.
        peer: usize,
    },
    /// A well-formed message reached a rank whose replica layout has no place for it.
    #[error("protocol desynchronization: {detail} (from rank {peer})")]
    Misrouted {
        /// Rank that sent the message.
        peer: usize,
        /// What the message claimed.
        detail: String,
    },
    /// Payload bytes that do not decode into the expected layout.
    #[error("codec error: {0}")]
    Codec(String),
    /// Configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
    /// Caller supplied an argument the engine cannot honour.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Transport level failure: handshake, disconnect, unreachable peer.
    #[error("transport error: {0}")]
    Transport(String),
}

impl GasError {
    /// Returns true when the cluster cannot continue after this error.
    ///
    /// Every rank must restart from the stored graph input; there is no partial recovery.
    pub fn is_fatal(&self) -> bool {
        match self {
            GasError::Io(_)
            | GasError::Parse { .. }
            | GasError::UnknownStrategy(_)
            | GasError::Protocol { .. }
            | GasError::Misrouted { .. }
            | GasError::Transport(_) => true,
            GasError::Codec(_) | GasError::Config(_) | GasError::InvalidArgument(_) => false,
        }
    }

    /// Builds a protocol error and logs it as a logic defect.
    pub(crate) fn protocol(expected: Tag, found: u8, peer: usize) -> Self {
        error!(
            expected = ?expected,
            found,
            peer,
            "gas.protocol.unexpected_tag"
        );
        GasError::Protocol {
            expected,
            found,
            peer,
        }
    }

    /// Builds a misrouting error and logs it as a logic defect.
    pub(crate) fn misrouted(peer: usize, detail: String) -> Self {
        error!(peer, detail = %detail, "gas.protocol.misrouted");
        GasError::Misrouted { peer, detail }
    }
}
