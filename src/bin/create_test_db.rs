use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;

use expense_recorder::{IngestOutcome, ingest_notification, initialize_db, open_connection};

/// A utility for creating a test database for the expense recorder server.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

const SAMPLE_NOTIFICATIONS: [&str; 5] = [
    r#"{"transactionId": "TEST-0001", "upiId": "alice@okbank", "merchantName": "Corner Grocery",
        "amount": 452.75, "category": "Food", "transactionDate": "2024-01-03T09:15:00+05:30"}"#,
    r#"{"transactionId": "TEST-0002", "upiId": "alice@okbank", "merchantName": "City Metro",
        "amount": 60, "category": "Travel", "transactionDate": "2024-01-04T08:05:00+05:30"}"#,
    r#"{"transactionId": "TEST-0003", "upiId": "alice@okbank", "merchantName": "Power Co",
        "amount": 1830.4, "category": "Utilities", "description": "January electricity",
        "transactionDate": "2024-01-10"}"#,
    r#"{"transactionId": "TEST-0004", "upiId": "alice@okbank", "merchantName": "Chai Point",
        "amount": 35, "category": "Food", "transactionDate": "2024-01-12T16:45:00Z"}"#,
    r#"{"transactionId": "TEST-0005", "upiId": "alice@okbank", "merchantName": "Book Nook",
        "amount": 799, "transactionDate": "2024-01-20T13:00:00"}"#,
];

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = open_connection(output_path)?;

    initialize_db(&conn)?;

    println!("Recording sample payment notifications...");

    for notification in SAMPLE_NOTIFICATIONS {
        match ingest_notification(notification, &conn)? {
            IngestOutcome::Created(expense) => println!(
                "  {} {} {} at {}",
                expense.transaction_id, expense.amount, expense.currency, expense.merchant_name
            ),
            IngestOutcome::Duplicate(transaction_id) => {
                println!("  {transaction_id} was already recorded")
            }
        }
    }

    println!("Success!");

    Ok(())
}
