//! Kind-tagged transaction codec.
//!
//! A payload is the bincode encoding of the variant's record alone. The kind tag is
//! carried beside it (in the block's tag list), so decoding never inspects the payload
//! to find out what it is.

use super::types::{Transaction, TransactionKind};
use crate::error::{LedgerError, Result};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Maximum encoded transaction size in bytes (100KB)
pub const MAX_TRANSACTION_SIZE: u64 = 100_000;

/// Varint integers, little endian, trailing bytes rejected, size limited.
fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_TRANSACTION_SIZE)
        .reject_trailing_bytes()
}

fn encode_record<T: Serialize>(kind: TransactionKind, record: &T) -> Result<Vec<u8>> {
    options().serialize(record).map_err(|e| {
        LedgerError::InvalidTransaction(format!("cannot encode {} record: {}", kind, e))
    })
}

fn decode_record<T: DeserializeOwned>(kind: TransactionKind, bytes: &[u8]) -> Result<T> {
    options()
        .deserialize(bytes)
        .map_err(|e| LedgerError::MalformedTransactionPayload {
            kind: kind.to_string(),
            reason: e.to_string(),
        })
}

/// Encode a transaction into its self-contained payload.
pub fn encode(tx: &Transaction) -> Result<Vec<u8>> {
    let kind = tx.kind();
    match tx {
        Transaction::VehicleRegistration(record) => encode_record(kind, record),
        Transaction::VehicleSale(record) => encode_record(kind, record),
        Transaction::LoanContract(record) => encode_record(kind, record),
        Transaction::Genesis(record) => encode_record(kind, record),
    }
}

/// Decode a payload given the kind tag it was stored under.
pub fn decode(tag: &str, bytes: &[u8]) -> Result<Transaction> {
    let kind: TransactionKind = tag.parse()?;
    decode_kind(kind, bytes)
}

pub fn decode_kind(kind: TransactionKind, bytes: &[u8]) -> Result<Transaction> {
    let tx = match kind {
        TransactionKind::VehicleRegistration => {
            Transaction::VehicleRegistration(decode_record(kind, bytes)?)
        }
        TransactionKind::VehicleSale => Transaction::VehicleSale(decode_record(kind, bytes)?),
        TransactionKind::LoanContract => Transaction::LoanContract(decode_record(kind, bytes)?),
        TransactionKind::Genesis => Transaction::Genesis(decode_record(kind, bytes)?),
    };
    Ok(tx)
}

impl Transaction {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }
}
