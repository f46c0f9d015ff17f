/// Transaction types for the vehicle ledger
use crate::error::LedgerError;
use chrono::DateTime;
use std::fmt;
use std::str::FromStr;

/// Identifier carried by the genesis transaction
pub const GENESIS_MARKER: &str = "GENESIS BLOCK";

/// A record that can be sealed into a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    VehicleRegistration(VehicleRegistration),
    VehicleSale(VehicleSale),
    LoanContract(LoanContract),
    Genesis(Genesis),
}

/// Closed set of kind tags. The tag travels next to the payload, never inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    VehicleRegistration,
    VehicleSale,
    LoanContract,
    Genesis,
}

impl TransactionKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::VehicleRegistration => "VehicleRegistration",
            TransactionKind::VehicleSale => "VehicleSale",
            TransactionKind::LoanContract => "LoanContract",
            TransactionKind::Genesis => "genesis",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = LedgerError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "VehicleRegistration" => Ok(TransactionKind::VehicleRegistration),
            "VehicleSale" => Ok(TransactionKind::VehicleSale),
            "LoanContract" => Ok(TransactionKind::LoanContract),
            "genesis" => Ok(TransactionKind::Genesis),
            other => Err(LedgerError::UnknownTransactionKind(other.to_string())),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Transaction {
    pub fn kind(&self) -> TransactionKind {
        match self {
            Transaction::VehicleRegistration(_) => TransactionKind::VehicleRegistration,
            Transaction::VehicleSale(_) => TransactionKind::VehicleSale,
            Transaction::LoanContract(_) => TransactionKind::LoanContract,
            Transaction::Genesis(_) => TransactionKind::Genesis,
        }
    }

    /// The VIN for vehicle records, the marker for genesis.
    pub fn id(&self) -> &str {
        match self {
            Transaction::VehicleRegistration(tx) => &tx.vin,
            Transaction::VehicleSale(tx) => &tx.vin,
            Transaction::LoanContract(tx) => &tx.vin,
            Transaction::Genesis(tx) => &tx.marker,
        }
    }

    pub fn genesis() -> Self {
        Transaction::Genesis(Genesis {
            marker: GENESIS_MARKER.to_string(),
        })
    }
}

/// First registration of a vehicle to an owner
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VehicleRegistration {
    pub vin: String,
    #[serde(with = "serde_bytes")]
    pub owner: Vec<u8>,
    pub registration_date: i64,
}

/// Transfer of a vehicle from its current owner (the dealer) to a buyer
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VehicleSale {
    pub vin: String,
    #[serde(with = "serde_bytes")]
    pub dealer: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub buyer: Vec<u8>,
    pub sale_date: i64,
    pub price: i64,
}

/// Loan secured against a vehicle; active while `end_date` lies in the future
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LoanContract {
    pub vin: String,
    #[serde(with = "serde_bytes")]
    pub borrower: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub lender: Vec<u8>,
    pub loan_amount: i64,
    pub start_date: i64,
    pub end_date: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Genesis {
    pub marker: String,
}

impl From<VehicleRegistration> for Transaction {
    fn from(tx: VehicleRegistration) -> Self {
        Transaction::VehicleRegistration(tx)
    }
}

impl From<VehicleSale> for Transaction {
    fn from(tx: VehicleSale) -> Self {
        Transaction::VehicleSale(tx)
    }
}

impl From<LoanContract> for Transaction {
    fn from(tx: LoanContract) -> Self {
        Transaction::LoanContract(tx)
    }
}

fn format_date(timestamp: i64) -> String {
    match DateTime::from_timestamp(timestamp, 0) {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => "Invalid".to_string(),
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Transaction::Genesis(tx) => {
                writeln!(f, "Genesis Block")?;
                write!(f, "ID: {}", tx.marker)
            }
            Transaction::VehicleRegistration(tx) => {
                writeln!(f, "Vehicle Registration Transaction")?;
                writeln!(f, "ID: {}", tx.vin)?;
                writeln!(f, "Owner: {}", String::from_utf8_lossy(&tx.owner))?;
                write!(f, "Registration Date: {}", format_date(tx.registration_date))
            }
            Transaction::VehicleSale(tx) => {
                writeln!(f, "Vehicle Sale Transaction")?;
                writeln!(f, "ID: {}", tx.vin)?;
                writeln!(f, "Dealer: {}", String::from_utf8_lossy(&tx.dealer))?;
                writeln!(f, "Buyer: {}", String::from_utf8_lossy(&tx.buyer))?;
                writeln!(f, "Price: {}", tx.price)?;
                write!(f, "Sale Date: {}", format_date(tx.sale_date))
            }
            Transaction::LoanContract(tx) => {
                writeln!(f, "Loan Contract Transaction")?;
                writeln!(f, "ID: {}", tx.vin)?;
                writeln!(f, "Lender: {}", String::from_utf8_lossy(&tx.lender))?;
                writeln!(f, "Borrower: {}", String::from_utf8_lossy(&tx.borrower))?;
                writeln!(f, "Loan Amount: {}", tx.loan_amount)?;
                writeln!(f, "Start Date: {}", format_date(tx.start_date))?;
                write!(f, "End Date: {}", format_date(tx.end_date))
            }
        }
    }
}
