use thiserror::Error;

use crate::frame::asdu::{CauseOfTransmission, TypeID};

pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a [`crate::connection::Connection`] tears itself down; carried by
/// [`crate::handler::ConnectionEvent::Closed`], never propagated above the connection task.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    #[error("bad start byte or APDU length")]
    FramingError,
    #[error("N(S)/N(R) sequence error")]
    SequenceError,
    #[error("peer did not acknowledge within t1")]
    TimeoutT1,
    #[error("more than two unanswered TESTFR_ACT")]
    TimeoutT3Overrun,
    #[error("socket read/write failed")]
    Transport,
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("stopped by the application")]
    Stopped,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("asdu: [type identifier: {0:?}] doesn't match call or time tag")]
    ErrTypeIDNotMatch(TypeID),
    #[error("asdu: [cause of transmission: {0:?}] for command not standard requirement")]
    ErrCmdCause(CauseOfTransmission),
    #[error("connection closed: {0}")]
    Closed(CloseReason),
    #[error("no redundancy group accepts this peer")]
    NoMatchingGroup,
    #[error("server is not accepting any more connections")]
    MaxOpenConnections,

    #[error("anyhow error")]
    ErrAnyHow(#[from] anyhow::Error),
}
