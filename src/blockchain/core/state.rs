//! Point-in-time ownership and loan facts derived by scanning the chain backwards.
//! No index is kept; both queries are linear in the chain length.

use crate::error::{LedgerError, Result};
use crate::transaction::Transaction;

use super::chain::{BlockSource, Blockchain, BlockchainIterator};

/// Owner named by the most recent registration or sale of `vin`.
pub fn latest_owner(source: &dyn BlockSource, vin: &str) -> Result<Vec<u8>> {
    for block in BlockchainIterator::new(source)? {
        let block = block?;
        // Later entries within a block are more recent.
        for tx in block.transactions().iter().rev() {
            match tx {
                Transaction::VehicleRegistration(reg) if reg.vin == vin => {
                    return Ok(reg.owner.clone())
                }
                Transaction::VehicleSale(sale) if sale.vin == vin => return Ok(sale.buyer.clone()),
                _ => {}
            }
        }
    }
    Err(LedgerError::OwnerNotFound(vin.to_string()))
}

/// Whether any loan on `vin` ends strictly after `as_of` (Unix seconds).
pub fn has_active_loan(source: &dyn BlockSource, vin: &str, as_of: i64) -> Result<bool> {
    for block in BlockchainIterator::new(source)? {
        let block = block?;
        let active = block.transactions().iter().any(|tx| {
            matches!(tx, Transaction::LoanContract(loan) if loan.vin == vin && loan.end_date > as_of)
        });
        if active {
            return Ok(true);
        }
    }
    Ok(false)
}

impl Blockchain {
    pub fn latest_owner(&self, vin: &str) -> Result<Vec<u8>> {
        latest_owner(self, vin)
    }

    pub fn has_active_loan(&self, vin: &str, as_of: i64) -> Result<bool> {
        has_active_loan(self, vin, as_of)
    }
}
