// src/error.rs
// Copyright 2025 Paul Moore Parks and contributors
// Licensed under the Apache License, Version 2.0

//! The kernel's error taxonomy. Every fallible operation in this crate
//! returns `Result<T, KernelError>` — no bare `String` or `Box<dyn Error>`
//! escapes a public function.

use thiserror::Error;

/// Stable error codes reported to callers. Variants map 1:1 to the error
/// taxonomy of the kernel's design: lock/terminal errors, session/tx
/// lifecycle errors, line-item errors, and money/currency errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("terminal is locked by another process")]
    TerminalBusy,

    #[error("terminal is not owned by this process")]
    TerminalNotOwned,

    #[error("WAL corrupt at byte offset {offset}: {reason}")]
    WalCorrupt { offset: u64, reason: String },

    #[error("I/O failure made the terminal read-only: {0}")]
    IoFatal(String),

    #[error("session not found")]
    SessionNotFound,

    #[error("session has a transaction still in Building state")]
    SessionBusy,

    #[error("transaction not found")]
    TxNotFound,

    #[error("operation invalid in current transaction state")]
    InvalidState,

    #[error("line item not found")]
    LineNotFound,

    #[error("parent line item is voided")]
    ParentVoided,

    #[error("item type not permitted here")]
    InvalidItemType,

    #[error("quantity must be >= 1")]
    InvalidQuantity,

    #[error("invalid product reference: {0}")]
    InvalidProduct(String),

    #[error("currency mismatch")]
    CurrencyMismatch,

    #[error("decimal places mismatch")]
    DecimalPlacesMismatch,

    #[error("invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("arithmetic overflow")]
    Arithmetic,

    #[error("internal error: {context}")]
    Internal { context: String },
}

pub type KernelResult<T> = Result<T, KernelError>;

impl KernelError {
    /// Stable short code, suitable for JSON error payloads or exit codes.
    pub fn code(&self) -> &'static str {
        match self {
            KernelError::TerminalBusy => "TerminalBusy",
            KernelError::TerminalNotOwned => "TerminalNotOwned",
            KernelError::WalCorrupt { .. } => "WalCorrupt",
            KernelError::IoFatal(_) => "IoFatal",
            KernelError::SessionNotFound => "SessionNotFound",
            KernelError::SessionBusy => "SessionBusy",
            KernelError::TxNotFound => "TxNotFound",
            KernelError::InvalidState => "InvalidState",
            KernelError::LineNotFound => "LineNotFound",
            KernelError::ParentVoided => "ParentVoided",
            KernelError::InvalidItemType => "InvalidItemType",
            KernelError::InvalidQuantity => "InvalidQuantity",
            KernelError::InvalidProduct(_) => "InvalidProduct",
            KernelError::CurrencyMismatch => "CurrencyMismatch",
            KernelError::DecimalPlacesMismatch => "DecimalPlacesMismatch",
            KernelError::InvalidCurrency(_) => "InvalidCurrency",
            KernelError::Arithmetic => "Arithmetic",
            KernelError::Internal { .. } => "Internal",
        }
    }
}

impl From<std::io::Error> for KernelError {
    fn from(err: std::io::Error) -> Self {
        KernelError::IoFatal(err.to_string())
    }
}
