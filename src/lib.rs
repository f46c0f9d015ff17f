//! Vehicle Ledger - a proof-of-work chain of vehicle registrations, sales and loans
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, the append-only store, ownership queries and audits
//! - [`transaction`] - Transaction kinds and the kind-tagged codec
//!
//! ## Consensus & Sealing
//! - [`miner`] - Proof-of-work sealing
//! - [`consensus`] - Placeholder acceptance vote for peer-proposed blocks
//!
//! ## Storage
//! - [`persistence`] - Key-value bucket layer (SQLite)
//! - [`cache`] - Decoded block cache
//!
//! ## Networking
//! - [`network`] - Message envelope, peer registry and dispatch
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`cli`] - CLI utilities

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod transaction;

// ============================================================================
// Consensus & Sealing
// ============================================================================
pub mod consensus;
pub mod miner;

// ============================================================================
// Storage
// ============================================================================
pub mod cache;
pub mod persistence;

// ============================================================================
// Networking
// ============================================================================
pub mod network;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod cli;
pub mod config;
pub mod error;
