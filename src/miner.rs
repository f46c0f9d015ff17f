//! Proof-of-work sealing.
//!
//! A block is sealed when `SHA-256(prepare_data)` read as a big-endian 256-bit integer
//! is strictly below `2^(256 - difficulty_bits)`. Comparing the digest bytes against
//! `2^(256 - difficulty_bits) - 1` with `<=` is the same test without big integers.

use crate::blockchain::{Block, Sha256Hash};
use crate::error::{LedgerError, Result};
use crate::transaction::{self, Transaction};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Leading zero bits required of a block hash unless configured otherwise.
pub const DEFAULT_DIFFICULTY_BITS: u32 = 12;

/// Upper bound of the nonce search (exclusive).
pub const MAX_NONCE: u64 = i64::MAX as u64;

const PROGRESS_INTERVAL: u64 = 1 << 20;

/// Outcome of a successful search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seal {
    pub nonce: u64,
    pub hash: Sha256Hash,
}

#[derive(Debug, Clone)]
pub struct ProofOfWork {
    difficulty_bits: u32,
    target: Sha256Hash,
    max_nonce: u64,
}

impl ProofOfWork {
    pub fn new(difficulty_bits: u32) -> Result<Self> {
        if difficulty_bits > 256 {
            return Err(LedgerError::Config(format!(
                "difficulty_bits must be at most 256, got {}",
                difficulty_bits
            )));
        }
        Ok(Self {
            difficulty_bits,
            target: Self::hash_to_target(difficulty_bits),
            max_nonce: MAX_NONCE,
        })
    }

    /// Lower the exclusive nonce bound.
    pub fn with_max_nonce(mut self, max_nonce: u64) -> Self {
        self.max_nonce = max_nonce;
        self
    }

    pub fn difficulty_bits(&self) -> u32 {
        self.difficulty_bits
    }

    pub fn target(&self) -> &Sha256Hash {
        &self.target
    }

    /// Largest hash accepted at `difficulty` bits, i.e. `2^(256 - difficulty) - 1`.
    pub fn hash_to_target(difficulty: u32) -> Sha256Hash {
        let mut target = [0xFF; 32];
        let leading_zeros = difficulty / 8;
        let partial_bits = difficulty % 8;

        for item in target.iter_mut().take(leading_zeros as usize) {
            *item = 0;
        }

        if leading_zeros < 32 && partial_bits > 0 {
            target[leading_zeros as usize] = 0xFF >> partial_bits;
        }
        target
    }

    pub fn meets_target(&self, hash: &Sha256Hash) -> bool {
        hash <= &self.target
    }

    /// Search nonces from zero until the pre-image hashes below the target.
    pub fn run(
        &self,
        previous_hash: &[u8],
        timestamp: i64,
        transactions: &[Transaction],
    ) -> Result<Seal> {
        self.search(previous_hash, timestamp, transactions, None)
    }

    /// Like [`run`](Self::run), checking `cancel` between nonce attempts.
    pub fn run_cancellable(
        &self,
        previous_hash: &[u8],
        timestamp: i64,
        transactions: &[Transaction],
        cancel: &AtomicBool,
    ) -> Result<Seal> {
        self.search(previous_hash, timestamp, transactions, Some(cancel))
    }

    fn search(
        &self,
        previous_hash: &[u8],
        timestamp: i64,
        transactions: &[Transaction],
        cancel: Option<&AtomicBool>,
    ) -> Result<Seal> {
        // Payloads do not change between attempts; only the nonce digits do.
        let payloads = encode_payloads(transactions)?;
        let mut prefix = Sha256::new();
        prefix.update(previous_hash);
        prefix.update(timestamp.to_string().as_bytes());

        let mut nonce = 0u64;
        while nonce < self.max_nonce {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    return Err(LedgerError::SealSearchCancelled);
                }
            }

            let mut hasher = prefix.clone();
            hasher.update(nonce.to_string().as_bytes());
            hasher.update(&payloads);
            let hash: Sha256Hash = hasher.finalize().into();

            if self.meets_target(&hash) {
                debug!(nonce, hash = %hex::encode(hash), "block sealed");
                return Ok(Seal { nonce, hash });
            }

            nonce += 1;
            if nonce % PROGRESS_INTERVAL == 0 {
                debug!(nonce, difficulty_bits = self.difficulty_bits, "still sealing");
            }
        }

        Err(LedgerError::SealSearchExhausted {
            difficulty_bits: self.difficulty_bits,
        })
    }

    /// Recompute the hash from the block's stored nonce and timestamp. The stored hash
    /// is never trusted: the recomputed one must meet the target and equal it.
    pub fn validate(&self, block: &Block) -> bool {
        match block.compute_hash() {
            Ok(hash) => self.meets_target(&hash) && &hash == block.hash(),
            Err(_) => false,
        }
    }
}

fn encode_payloads(transactions: &[Transaction]) -> Result<Vec<u8>> {
    let mut payloads = Vec::new();
    for tx in transactions {
        payloads.extend_from_slice(&transaction::encode(tx)?);
    }
    Ok(payloads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::VehicleRegistration;

    fn txs() -> Vec<Transaction> {
        vec![Transaction::VehicleRegistration(VehicleRegistration {
            vin: "V1".to_string(),
            owner: b"Alice".to_vec(),
            registration_date: 1_700_000_000,
        })]
    }

    #[test]
    fn test_hash_to_target() {
        let t = ProofOfWork::hash_to_target(12);
        assert_eq!(t[0], 0x00);
        assert_eq!(t[1], 0x0F);
        assert!(t[2..].iter().all(|b| *b == 0xFF));

        assert_eq!(ProofOfWork::hash_to_target(0), [0xFF; 32]);
        assert_eq!(ProofOfWork::hash_to_target(256), [0u8; 32]);
    }

    #[test]
    fn test_target_is_strict_power_of_two_bound() {
        let pow = ProofOfWork::new(12).unwrap();
        // 2^244 - 1 passes, 2^244 does not.
        let mut below = [0xFF; 32];
        below[0] = 0x00;
        below[1] = 0x0F;
        let mut at = [0u8; 32];
        at[1] = 0x10;
        assert!(pow.meets_target(&below));
        assert!(!pow.meets_target(&at));
    }

    #[test]
    fn test_rejects_difficulty_above_256() {
        assert!(matches!(ProofOfWork::new(257), Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_run_finds_hash_below_target() {
        let pow = ProofOfWork::new(8).unwrap();
        let seal = pow.run(&[7u8; 32], 1_700_000_000, &txs()).unwrap();
        assert_eq!(seal.hash[0], 0);
    }

    #[test]
    fn test_run_matches_preimage_hash() {
        let pow = ProofOfWork::new(4).unwrap();
        let prev = [3u8; 32];
        let seal = pow.run(&prev, 42, &txs()).unwrap();

        let mut data = prev.to_vec();
        data.extend_from_slice(b"42");
        data.extend_from_slice(seal.nonce.to_string().as_bytes());
        data.extend_from_slice(&transaction::encode(&txs()[0]).unwrap());
        let expected: Sha256Hash = Sha256::digest(&data).into();
        assert_eq!(seal.hash, expected);
    }

    #[test]
    fn test_exhausted_nonce_space_is_reported() {
        let pow = ProofOfWork::new(256).unwrap().with_max_nonce(16);
        match pow.run(&[], 0, &txs()) {
            Err(LedgerError::SealSearchExhausted { difficulty_bits }) => {
                assert_eq!(difficulty_bits, 256)
            }
            other => panic!("expected SealSearchExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_cancellation_stops_search() {
        let pow = ProofOfWork::new(256).unwrap();
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            pow.run_cancellable(&[], 0, &txs(), &cancel),
            Err(LedgerError::SealSearchCancelled)
        ));
    }
}
