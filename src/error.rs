//! Error types for the vehicle ledger

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Unknown transaction kind: {0}")]
    UnknownTransactionKind(String),

    #[error("Malformed {kind} payload: {reason}")]
    MalformedTransactionPayload { kind: String, reason: String },

    #[error("Malformed block record: {0}")]
    MalformedBlock(String),

    #[error("Chain corruption: {0}")]
    ChainCorruption(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("Vehicle not found: {0}")]
    OwnerNotFound(String),

    #[error("Seal search exhausted the nonce space at difficulty {difficulty_bits} bits")]
    SealSearchExhausted { difficulty_bits: u32 },

    #[error("Seal search cancelled")]
    SealSearchCancelled,

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("{claimed} is not the current owner of vehicle {vin}")]
    NotCurrentOwner { vin: String, claimed: String },

    #[error("Vehicle {0} is under an active loan")]
    ActiveLoan(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Errors that leave the process unable to use its store at all.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::StoreUnavailable(_)
                | LedgerError::ChainCorruption(_)
                | LedgerError::SealSearchExhausted { .. }
        )
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy)
            | Some(rusqlite::ErrorCode::DatabaseLocked)
            | Some(rusqlite::ErrorCode::CannotOpen) => LedgerError::StoreUnavailable(err.to_string()),
            _ => LedgerError::Database(err.to_string()),
        }
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;
