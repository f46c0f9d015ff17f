#![forbid(unsafe_code)]
//! Command-line front end for the vehicle ledger

use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color as TableColor, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use vehicle_ledger::blockchain::Blockchain;
use vehicle_ledger::cli::{
    add_transaction, has_active_loan_now, iterate_printable, load_blockchain_from,
    TransactionRequest,
};
use vehicle_ledger::config::DEFAULT_CONFIG_PATH;
use vehicle_ledger::error::LedgerError;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a vehicle to an owner
    Register {
        #[arg(long)]
        vin: String,
        #[arg(long)]
        owner: String,
        /// Registration date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
    },
    /// Record the sale of a vehicle by its current owner
    Sale {
        #[arg(long)]
        vin: String,
        #[arg(long)]
        dealer: String,
        #[arg(long)]
        buyer: String,
        /// Sale date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        #[arg(long)]
        price: i64,
    },
    /// Record a loan secured on a vehicle
    Loan {
        #[arg(long)]
        vin: String,
        #[arg(long)]
        borrower: String,
        #[arg(long)]
        lender: String,
        #[arg(long)]
        amount: i64,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: String,
    },
    /// Show the current owner of a vehicle
    Owner { vin: String },
    /// Show whether a vehicle has an unexpired loan
    LoanStatus { vin: String },
    /// Print every block from the tip back to genesis
    Print,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let chain = match load_blockchain_from(&cli.config) {
        Ok((_config, chain)) => chain,
        Err(e) => {
            let label = if e.is_fatal() {
                "❌ Fatal: cannot open ledger:"
            } else {
                "❌ Cannot open ledger:"
            };
            eprintln!("{} {}", label.red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    match run(&chain, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(LedgerError::OwnerNotFound(vin)) => {
            eprintln!("{} {}", "❌ Vehicle not found:".red().bold(), vin);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{} {}", "❌ Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(chain: &Blockchain, command: Commands) -> Result<(), LedgerError> {
    let request = match command {
        Commands::Register { vin, owner, date } => {
            TransactionRequest::Registration { vin, owner, date }
        }
        Commands::Sale {
            vin,
            dealer,
            buyer,
            date,
            price,
        } => TransactionRequest::Sale {
            vin,
            dealer,
            buyer,
            date,
            price,
        },
        Commands::Loan {
            vin,
            borrower,
            lender,
            amount,
            start,
            end,
        } => TransactionRequest::Loan {
            vin,
            borrower,
            lender,
            amount,
            start,
            end,
        },
        Commands::Owner { vin } => {
            let owner = chain.latest_owner(&vin)?;
            println!(
                "{} {}",
                format!("🚗 {} is owned by", vin).cyan(),
                String::from_utf8_lossy(&owner).bright_yellow().bold()
            );
            return Ok(());
        }
        Commands::LoanStatus { vin } => {
            if has_active_loan_now(chain, &vin)? {
                println!("{}", format!("🔒 {} has an active loan", vin).yellow());
            } else {
                println!("{}", format!("✅ {} has no active loan", vin).green());
            }
            return Ok(());
        }
        Commands::Print => return print_chain(chain),
    };

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(format!(
        "Sealing block at difficulty {}...",
        chain.pow().difficulty_bits()
    ));
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = add_transaction(chain, request);
    spinner.finish_and_clear();

    let block = result?;
    println!("{}", "✅ Transaction added successfully!".green().bold());
    println!("   Hash:  {}", hex::encode(block.hash()).bright_white());
    println!("   Nonce: {}", block.nonce());
    Ok(())
}

fn print_chain(chain: &Blockchain) -> Result<(), LedgerError> {
    for row in iterate_printable(chain)? {
        let row = row?;
        let block = &row.block;

        let prev = block.previous_hash().map(hex::encode).unwrap_or_default();
        println!("{} {}", "Prev. hash:".bright_black(), prev);

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Type").add_attribute(Attribute::Bold),
                Cell::new("ID").add_attribute(Attribute::Bold),
                Cell::new("Details").add_attribute(Attribute::Bold),
            ]);
        for tx in block.transactions() {
            let rendered = tx.to_string();
            let details: Vec<&str> = rendered.lines().skip(2).collect();
            table.add_row(vec![
                Cell::new(tx.kind()).fg(TableColor::Cyan),
                Cell::new(tx.id()),
                Cell::new(details.join("\n")),
            ]);
        }
        println!("{}", table);

        println!("{} {}", "Hash:".bright_black(), hex::encode(block.hash()));
        let pow = if row.pow_valid {
            "true".green().bold()
        } else {
            "false".red().bold()
        };
        println!("{} {}", "PoW:".bright_black(), pow);
        println!();
    }
    Ok(())
}
