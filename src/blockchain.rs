// Thin re-export module: implementation is in `blockchain/core.rs` split by
// responsibility (block storage, ownership queries, audit and admission).

pub mod core;
pub use core::*;
