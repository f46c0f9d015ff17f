use crate::error::{LedgerError, Result};
use crate::miner::ProofOfWork;
use crate::transaction::Transaction;
use std::collections::HashSet;

use super::chain::{BlockSource, BlockchainIterator, Sha256Hash};
use super::state::{has_active_loan, latest_owner};

/// Outcome of a tip-to-genesis audit, newest block first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainReport {
    pub blocks: Vec<(Sha256Hash, bool)>,
}

impl ChainReport {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Hashes of blocks whose recomputed seal does not hold.
    pub fn invalid_seals(&self) -> Vec<Sha256Hash> {
        self.blocks
            .iter()
            .filter(|(_, valid)| !valid)
            .map(|(hash, _)| *hash)
            .collect()
    }

    pub fn all_sealed(&self) -> bool {
        self.blocks.iter().all(|(_, valid)| *valid)
    }
}

/// Walk from the tip to genesis checking linkage and recording seal validity.
///
/// Structural faults (a missing predecessor, a block stored under the wrong key, a repeated
/// hash, a genesis transaction anywhere but alone in the final block) are `ChainCorruption`.
/// A block whose hash misses the difficulty target is only reported, since the chain is
/// still walkable.
pub fn validate_chain(source: &dyn BlockSource, pow: &ProofOfWork) -> Result<ChainReport> {
    if source.tip_hash()?.is_none() {
        return Err(LedgerError::ChainCorruption("tip pointer is missing".to_string()));
    }

    let mut seen = HashSet::new();
    let mut report = ChainReport::default();
    let mut reached_genesis = false;

    for block in BlockchainIterator::new(source)? {
        let block = block?;
        let hash = *block.hash();
        if !seen.insert(hash) {
            return Err(LedgerError::ChainCorruption(format!(
                "block {} is reachable twice",
                hex::encode(hash)
            )));
        }

        let genesis_txs = block
            .transactions()
            .iter()
            .filter(|tx| matches!(tx, Transaction::Genesis(_)))
            .count();
        if block.is_genesis() {
            if genesis_txs != 1 || block.transactions().len() != 1 {
                return Err(LedgerError::ChainCorruption(format!(
                    "genesis block {} must hold exactly one genesis transaction",
                    hex::encode(hash)
                )));
            }
            reached_genesis = true;
        } else if genesis_txs > 0 {
            return Err(LedgerError::ChainCorruption(format!(
                "non-genesis block {} carries a genesis transaction",
                hex::encode(hash)
            )));
        }

        report.blocks.push((hash, pow.validate(&block)));
    }

    if !reached_genesis {
        return Err(LedgerError::ChainCorruption(
            "chain does not end at a genesis block".to_string(),
        ));
    }
    Ok(report)
}

fn require_non_empty(field: &str, value: &[u8]) -> Result<()> {
    if value.is_empty() {
        return Err(LedgerError::InvalidTransaction(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Field-level checks that need no chain state.
pub fn check_fields(tx: &Transaction) -> Result<()> {
    match tx {
        Transaction::VehicleRegistration(reg) => {
            require_non_empty("VIN", reg.vin.as_bytes())?;
            require_non_empty("owner", &reg.owner)
        }
        Transaction::VehicleSale(sale) => {
            require_non_empty("VIN", sale.vin.as_bytes())?;
            require_non_empty("dealer", &sale.dealer)?;
            require_non_empty("buyer", &sale.buyer)?;
            if sale.price <= 0 {
                return Err(LedgerError::InvalidTransaction(
                    "Price must be a positive number".to_string(),
                ));
            }
            Ok(())
        }
        Transaction::LoanContract(loan) => {
            require_non_empty("VIN", loan.vin.as_bytes())?;
            require_non_empty("borrower", &loan.borrower)?;
            require_non_empty("lender", &loan.lender)?;
            if loan.loan_amount <= 0 {
                return Err(LedgerError::InvalidTransaction(
                    "Loan amount must be a positive number".to_string(),
                ));
            }
            if loan.end_date < loan.start_date {
                return Err(LedgerError::InvalidTransaction(
                    "End date must not be before start date".to_string(),
                ));
            }
            Ok(())
        }
        Transaction::Genesis(_) => Err(LedgerError::InvalidTransaction(
            "genesis transactions cannot be submitted".to_string(),
        )),
    }
}

fn require_owner(source: &dyn BlockSource, vin: &str, claimed: &[u8]) -> Result<()> {
    let owner = latest_owner(source, vin)?;
    if owner != claimed {
        return Err(LedgerError::NotCurrentOwner {
            vin: vin.to_string(),
            claimed: String::from_utf8_lossy(claimed).into_owned(),
        });
    }
    Ok(())
}

/// Business rules a transaction must satisfy against the chain as it stands at `now`.
pub fn admit_transaction(source: &dyn BlockSource, tx: &Transaction, now: i64) -> Result<()> {
    check_fields(tx)?;
    match tx {
        Transaction::VehicleRegistration(_) | Transaction::Genesis(_) => Ok(()),
        Transaction::VehicleSale(sale) => {
            require_owner(source, &sale.vin, &sale.dealer)?;
            if has_active_loan(source, &sale.vin, now)? {
                return Err(LedgerError::ActiveLoan(sale.vin.clone()));
            }
            Ok(())
        }
        Transaction::LoanContract(loan) => require_owner(source, &loan.vin, &loan.borrower),
    }
}
