use std::num::ParseIntError;
use thiserror::Error;

use crate::format::rtp::RTPError;
use crate::format::tlv::TLVError;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parser error: {0}")]
    Parser(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("rtp framing error: {0}")]
    Rtp(#[from] RTPError),

    #[error("tlv framing error: {0}")]
    Tlv(#[from] TLVError),

    /// `write` was called while bytes from the previous call were still pending.
    #[error("previous write not drained ({0} bytes pending)")]
    PendingData(usize),

    #[error("cannot unread {requested} bytes: only {available} available")]
    Unread { requested: usize, available: usize },

    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),
}

pub type Result<T> = std::result::Result<T, FlowError>;
