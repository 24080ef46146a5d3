//! The ingestion pipeline shared by the HTTP and queue paths.
//!
//! A notification is decoded, validated and checked against the expenses
//! already recorded before a new expense is inserted. The lookup and the
//! insert are separate statements, so two copies of one notification can both
//! pass the lookup. The unique index on the transaction ID catches the second
//! insert, and that case is reported as a duplicate just like the lookup would.

use rusqlite::Connection;

use crate::{
    Error,
    expense::{
        Expense, ExpenseBuilder, PaymentNotification, create_expense,
        find_expense_by_transaction_id,
    },
};

/// The successful outcomes of ingesting a payment notification.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// A new expense was recorded.
    Created(Expense),
    /// An expense already exists for the transaction ID, nothing was recorded.
    Duplicate(String),
}

/// Record the payment notification `raw_payload` as an expense.
///
/// The notification text is kept with the expense for auditing.
///
/// # Errors
/// This function will return a:
/// - [Error::MalformedPayload] if `raw_payload` cannot be decoded,
/// - [Error::Validation] if any field of the notification is invalid,
/// - or [Error::SqlError] if the database fails for any reason other than a duplicate.
pub fn ingest_notification(
    raw_payload: &str,
    connection: &Connection,
) -> Result<IngestOutcome, Error> {
    let builder = PaymentNotification::parse(raw_payload)?
        .validate()?
        .raw_payload(raw_payload);

    if let Some(existing) = find_expense_by_transaction_id(&builder.transaction_id, connection)? {
        tracing::warn!(
            "Duplicate transaction detected: {} (recorded as expense {})",
            existing.transaction_id,
            existing.id
        );
        return Ok(IngestOutcome::Duplicate(existing.transaction_id));
    }

    record_expense(builder, connection)
}

/// Insert a validated expense, treating a unique constraint violation on the
/// transaction ID as a duplicate.
///
/// # Errors
/// Returns [Error::SqlError] if the insert fails for any other reason.
pub fn record_expense(
    builder: ExpenseBuilder,
    connection: &Connection,
) -> Result<IngestOutcome, Error> {
    match create_expense(builder, connection) {
        Ok(expense) => {
            tracing::info!(
                "Expense created. Transaction ID: {}, Amount: {} {}",
                expense.transaction_id,
                expense.amount,
                expense.currency
            );
            Ok(IngestOutcome::Created(expense))
        }
        Err(Error::DuplicateTransactionId(transaction_id)) => {
            tracing::warn!(
                "Duplicate transaction {transaction_id} was inserted concurrently, keeping the existing expense"
            );
            Ok(IngestOutcome::Duplicate(transaction_id))
        }
        Err(error) => Err(error),
    }
}
