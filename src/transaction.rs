//! Transaction module split into record types and the kind-tagged codec

pub mod codec;
pub mod types;

pub use codec::{decode, decode_kind, encode, MAX_TRANSACTION_SIZE};
pub use types::*;
