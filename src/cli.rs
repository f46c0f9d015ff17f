//! Ledger operations as seen by command-line front ends

use crate::blockchain::{admit_transaction, Block, BlockSource, Blockchain, BlockchainIterator};
use crate::config::{load_config_from, Config};
use crate::error::{LedgerError, Result};
use crate::miner::ProofOfWork;
use crate::persistence::Database;
use crate::transaction::{LoanContract, Transaction, VehicleRegistration, VehicleSale};
use chrono::NaiveDate;
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` date as midnight UTC, in Unix seconds.
pub fn parse_date(text: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|_| {
        LedgerError::InvalidTransaction(format!("Invalid date '{}'. Use YYYY-MM-DD.", text))
    })?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .ok_or_else(|| LedgerError::InvalidTransaction(format!("Invalid date '{}'", text)))
}

/// A transaction as entered by a user, with dates still in text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionRequest {
    Registration {
        vin: String,
        owner: String,
        date: String,
    },
    Sale {
        vin: String,
        dealer: String,
        buyer: String,
        date: String,
        price: i64,
    },
    Loan {
        vin: String,
        borrower: String,
        lender: String,
        amount: i64,
        start: String,
        end: String,
    },
}

impl TransactionRequest {
    pub fn into_transaction(self) -> Result<Transaction> {
        let tx = match self {
            TransactionRequest::Registration { vin, owner, date } => {
                Transaction::VehicleRegistration(VehicleRegistration {
                    vin,
                    owner: owner.into_bytes(),
                    registration_date: parse_date(&date)?,
                })
            }
            TransactionRequest::Sale {
                vin,
                dealer,
                buyer,
                date,
                price,
            } => Transaction::VehicleSale(VehicleSale {
                vin,
                dealer: dealer.into_bytes(),
                buyer: buyer.into_bytes(),
                sale_date: parse_date(&date)?,
                price,
            }),
            TransactionRequest::Loan {
                vin,
                borrower,
                lender,
                amount,
                start,
                end,
            } => Transaction::LoanContract(LoanContract {
                vin,
                borrower: borrower.into_bytes(),
                lender: lender.into_bytes(),
                loan_amount: amount,
                start_date: parse_date(&start)?,
                end_date: parse_date(&end)?,
            }),
        };
        Ok(tx)
    }
}

/// Admit and append one transaction in its own block, judging loans as of now.
pub fn add_transaction(chain: &Blockchain, request: TransactionRequest) -> Result<Arc<Block>> {
    add_transaction_at(chain, request, chrono::Utc::now().timestamp())
}

pub fn add_transaction_at(
    chain: &Blockchain,
    request: TransactionRequest,
    now: i64,
) -> Result<Arc<Block>> {
    let tx = request.into_transaction()?;
    chain.append_with(vec![tx.clone()], &|source: &dyn BlockSource| {
        admit_transaction(source, &tx, now)
    })
}

pub fn has_active_loan_now(chain: &Blockchain, vin: &str) -> Result<bool> {
    chain.has_active_loan(vin, chrono::Utc::now().timestamp())
}

#[derive(Debug, Clone)]
pub struct PrintableBlock {
    pub block: Arc<Block>,
    pub pow_valid: bool,
}

/// Blocks newest to oldest, each paired with its recomputed seal check.
pub fn iterate_printable(
    chain: &Blockchain,
) -> Result<impl Iterator<Item = Result<PrintableBlock>> + '_> {
    let pow = chain.pow();
    Ok(BlockchainIterator::new(chain)?.map(move |block| {
        block.map(|block| PrintableBlock {
            pow_valid: pow.validate(&block),
            block,
        })
    }))
}

/// Open the configured store, creating its directory and a genesis block as needed.
pub fn open_blockchain(config: &Config) -> Result<Blockchain> {
    config.validate()?;
    if let Some(parent) = Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                LedgerError::StoreUnavailable(format!(
                    "Failed to create data dir {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let db = Database::open(&config.database.path)?;
    let pow = ProofOfWork::new(config.chain.difficulty_bits)?;
    Blockchain::open_with_cache(Box::new(db), pow, config.chain.block_cache_capacity)
}

pub fn load_blockchain_from(path: impl AsRef<Path>) -> Result<(Config, Blockchain)> {
    let config = load_config_from(path)?;
    let chain = open_blockchain(&config)?;
    Ok((config, chain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;

    fn chain() -> Blockchain {
        Blockchain::open(Box::new(InMemoryPersistence::new()), ProofOfWork::new(8).unwrap()).unwrap()
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("1970-01-02").unwrap(), 86_400);
        assert_eq!(parse_date("2024-02-29").unwrap(), 1_709_164_800);
        assert!(matches!(parse_date("2024-02-30"), Err(LedgerError::InvalidTransaction(_))));
        assert!(parse_date("29/02/2024").is_err());
    }

    #[test]
    fn test_registration_then_sale() {
        let chain = chain();
        add_transaction(
            &chain,
            TransactionRequest::Registration {
                vin: "V1".to_string(),
                owner: "Alice".to_string(),
                date: "2024-01-01".to_string(),
            },
        )
        .unwrap();
        let block = add_transaction(
            &chain,
            TransactionRequest::Sale {
                vin: "V1".to_string(),
                dealer: "Alice".to_string(),
                buyer: "Bob".to_string(),
                date: "2024-02-01".to_string(),
                price: 100,
            },
        )
        .unwrap();

        assert_eq!(chain.tip().unwrap(), *block.hash());
        assert_eq!(chain.latest_owner("V1").unwrap(), b"Bob".to_vec());
    }

    #[test]
    fn test_rejected_request_leaves_tip() {
        let chain = chain();
        let tip = chain.tip().unwrap();
        let result = add_transaction(
            &chain,
            TransactionRequest::Loan {
                vin: "V1".to_string(),
                borrower: "Alice".to_string(),
                lender: "Bank".to_string(),
                amount: 10,
                start: "2024-01-01".to_string(),
                end: "2025-01-01".to_string(),
            },
        );
        assert!(matches!(result, Err(LedgerError::OwnerNotFound(_))));
        assert_eq!(chain.tip().unwrap(), tip);
    }

    #[test]
    fn test_printable_flags_valid_seals() {
        let chain = chain();
        add_transaction(
            &chain,
            TransactionRequest::Registration {
                vin: "V1".to_string(),
                owner: "Alice".to_string(),
                date: "2024-01-01".to_string(),
            },
        )
        .unwrap();

        let rows: Vec<_> = iterate_printable(&chain).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.pow_valid));
        assert!(rows[1].block.is_genesis());
    }
}
