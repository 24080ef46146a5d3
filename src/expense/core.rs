//! Defines the core data models and database queries for expenses.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, OptionalExtension, Row, ToSql,
    types::{FromSql, FromSqlResult, ToSqlOutput, Type, ValueRef},
};
use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, timestamp::StoredTimestamp};

/// The payment method recorded for UPI payment notifications.
pub const UPI_PAYMENT_METHOD: &str = "UPI";
/// The currency used when a notification does not specify one.
pub const DEFAULT_CURRENCY: &str = "INR";
/// The category used when a notification does not specify one.
pub const DEFAULT_CATEGORY: &str = "Others";
/// The status used when a notification does not specify one.
pub const DEFAULT_STATUS: &str = "Success";

// ============================================================================
// MODELS
// ============================================================================

/// The system-generated ID of an expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExpenseId(Uuid);

impl ExpenseId {
    /// Generate a new, random expense ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an expense ID from its string representation.
    ///
    /// # Errors
    /// Returns [Error::InvalidIdFormat] if `text` is not a UUID.
    pub fn parse(text: &str) -> Result<Self, Error> {
        Uuid::parse_str(text)
            .map(Self)
            .map_err(|_| Error::InvalidIdFormat(text.to_owned()))
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExpenseId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ExpenseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl ToSql for ExpenseId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for ExpenseId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;

        Uuid::parse_str(text)
            .map(Self)
            .map_err(|error| rusqlite::types::FromSqlError::Other(Box::new(error)))
    }
}

/// A payment recorded from a UPI payment notification.
///
/// Expenses are created once by the ingestion pipeline and never modified.
/// To create a new `Expense`, use [Expense::build].
#[derive(Debug, Clone, PartialEq)]
pub struct Expense {
    /// The ID of the expense.
    pub id: ExpenseId,
    /// The payment provider's ID for the transaction. Unique across expenses.
    pub transaction_id: String,
    /// How the payment was made, e.g. "UPI".
    pub payment_method: String,
    /// The UPI ID (virtual payment address) of the payer.
    pub upi_id: String,
    /// Who was paid.
    pub merchant_name: String,
    /// The amount paid, with two decimal places.
    pub amount: Decimal,
    /// The currency code of the amount, e.g. "INR".
    pub currency: String,
    /// A text description of what the payment was for.
    pub description: Option<String>,
    /// The category the expense belongs to, e.g. "Food".
    pub category: String,
    /// When the payment happened, according to the payment provider.
    pub transaction_date: OffsetDateTime,
    /// When the expense was recorded.
    pub created_at: OffsetDateTime,
    /// When the expense was last modified, if ever.
    pub updated_at: Option<OffsetDateTime>,
    /// The payment status reported by the payment provider, e.g. "Success".
    pub status: String,
    /// The notification body the expense was created from, kept for auditing.
    pub raw_payload: Option<String>,
}

impl Expense {
    /// Create a new expense.
    ///
    /// Shortcut for [ExpenseBuilder] for discoverability.
    pub fn build(
        transaction_id: &str,
        upi_id: &str,
        merchant_name: &str,
        amount: Decimal,
        transaction_date: OffsetDateTime,
    ) -> ExpenseBuilder {
        ExpenseBuilder {
            transaction_id: transaction_id.to_owned(),
            upi_id: upi_id.to_owned(),
            merchant_name: merchant_name.to_owned(),
            amount,
            currency: DEFAULT_CURRENCY.to_owned(),
            description: None,
            category: DEFAULT_CATEGORY.to_owned(),
            transaction_date,
            status: DEFAULT_STATUS.to_owned(),
            raw_payload: None,
        }
    }
}

/// A builder for creating [Expense] instances.
///
/// Optional fields start with the defaults used for UPI notifications: the
/// currency "INR", the category "Others" and the status "Success". The ID,
/// payment method and creation time are assigned by [create_expense].
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseBuilder {
    /// The payment provider's ID for the transaction.
    pub transaction_id: String,
    /// The UPI ID of the payer.
    pub upi_id: String,
    /// Who was paid.
    pub merchant_name: String,
    /// The amount paid. Must be greater than zero.
    pub amount: Decimal,
    /// The currency code of the amount.
    pub currency: String,
    /// What the payment was for.
    pub description: Option<String>,
    /// The category of the expense.
    pub category: String,
    /// When the payment happened.
    pub transaction_date: OffsetDateTime,
    /// The payment status.
    pub status: String,
    /// The notification body the expense is created from.
    pub raw_payload: Option<String>,
}

impl ExpenseBuilder {
    /// Set the currency code.
    pub fn currency(mut self, currency: &str) -> Self {
        currency.clone_into(&mut self.currency);
        self
    }

    /// Set the description.
    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Set the category.
    pub fn category(mut self, category: &str) -> Self {
        category.clone_into(&mut self.category);
        self
    }

    /// Set the payment status.
    pub fn status(mut self, status: &str) -> Self {
        status.clone_into(&mut self.status);
        self
    }

    /// Set the raw notification body.
    pub fn raw_payload(mut self, raw_payload: &str) -> Self {
        self.raw_payload = Some(raw_payload.to_owned());
        self
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// The columns selected for an [Expense], in the order [map_expense_row] expects.
pub(crate) const EXPENSE_COLUMNS: &str = "id, transaction_id, payment_method, upi_id, \
    merchant_name, amount, currency, description, category, transaction_date, created_at, \
    updated_at, status, raw_payload";

/// Create a new expense in the database from a builder.
///
/// The expense is given a fresh ID, the payment method "UPI" and the current
/// UTC time as its creation time.
///
/// # Errors
/// This function will return a:
/// - [Error::DuplicateTransactionId] if an expense with the same transaction ID already exists,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_expense(builder: ExpenseBuilder, connection: &Connection) -> Result<Expense, Error> {
    let query = format!(
        "INSERT INTO expense ({EXPENSE_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL, ?12, ?13)
         RETURNING {EXPENSE_COLUMNS}"
    );

    connection
        .prepare(&query)?
        .query_row(
            (
                ExpenseId::new(),
                &builder.transaction_id,
                UPI_PAYMENT_METHOD,
                &builder.upi_id,
                &builder.merchant_name,
                format!("{:.2}", builder.amount),
                &builder.currency,
                &builder.description,
                &builder.category,
                StoredTimestamp(builder.transaction_date),
                StoredTimestamp(OffsetDateTime::now_utc()),
                &builder.status,
                &builder.raw_payload,
            ),
            map_expense_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                Some(ref description),
            ) if description.ends_with("expense.transaction_id") => {
                Error::DuplicateTransactionId(builder.transaction_id.clone())
            }
            error => error.into(),
        })
}

/// Retrieve an expense from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid expense,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_expense(id: ExpenseId, connection: &Connection) -> Result<Expense, Error> {
    let expense = connection
        .prepare(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense WHERE id = :id"
        ))?
        .query_one(&[(":id", &id)], map_expense_row)?;

    Ok(expense)
}

/// Retrieve the expense recorded for `transaction_id`, if there is one.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is some SQL error.
pub fn find_expense_by_transaction_id(
    transaction_id: &str,
    connection: &Connection,
) -> Result<Option<Expense>, Error> {
    connection
        .prepare(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense WHERE transaction_id = :transaction_id"
        ))?
        .query_row(&[(":transaction_id", transaction_id)], map_expense_row)
        .optional()
        .map_err(|error| error.into())
}

/// Get the total number of expenses in the database.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
pub fn count_expenses(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM expense;", [], |row| row.get(0))
        .map_err(|error| error.into())
}

/// Create the expense table and its indexes in the database.
///
/// The unique index on `transaction_id` is what guarantees that a payment is
/// recorded at most once when notifications for it are processed
/// concurrently.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_expense_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS expense (
            id TEXT PRIMARY KEY NOT NULL,
            transaction_id TEXT NOT NULL,
            payment_method TEXT NOT NULL DEFAULT 'UPI',
            upi_id TEXT NOT NULL,
            merchant_name TEXT NOT NULL,
            amount TEXT NOT NULL,
            currency TEXT NOT NULL DEFAULT 'INR',
            description TEXT,
            category TEXT NOT NULL DEFAULT 'Others',
            transaction_date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            status TEXT NOT NULL DEFAULT 'Success',
            raw_payload TEXT
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_expense_transaction_id ON expense(transaction_id);
        CREATE INDEX IF NOT EXISTS idx_expense_transaction_date ON expense(transaction_date);
        CREATE INDEX IF NOT EXISTS idx_expense_category ON expense(category);",
    )
}

/// Map a database row to an Expense.
///
/// The row must contain the columns listed in [EXPENSE_COLUMNS], in order.
pub fn map_expense_row(row: &Row) -> Result<Expense, rusqlite::Error> {
    let raw_amount: String = row.get(5)?;
    let amount = Decimal::from_str(&raw_amount).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(error))
    })?;

    Ok(Expense {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        payment_method: row.get(2)?,
        upi_id: row.get(3)?,
        merchant_name: row.get(4)?,
        amount,
        currency: row.get(6)?,
        description: row.get(7)?,
        category: row.get(8)?,
        transaction_date: row.get::<_, StoredTimestamp>(9)?.0,
        created_at: row.get::<_, StoredTimestamp>(10)?.0,
        updated_at: row
            .get::<_, Option<StoredTimestamp>>(11)?
            .map(|timestamp| timestamp.0),
        status: row.get(12)?,
        raw_payload: row.get(13)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::{OffsetDateTime, macros::datetime};

    use crate::{
        Error,
        db::initialize,
        expense::{
            Expense, ExpenseId, count_expenses, create_expense, find_expense_by_transaction_id,
            get_expense,
        },
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn create_succeeds_with_defaults() {
        let conn = get_test_connection();
        let before = OffsetDateTime::now_utc();

        let expense = create_expense(
            Expense::build(
                "TX1",
                "a@bank",
                "Shop",
                dec!(100.50),
                datetime!(2024-01-01 0:00 UTC),
            ),
            &conn,
        )
        .expect("Could not create expense");

        assert_eq!(expense.transaction_id, "TX1");
        assert_eq!(expense.payment_method, "UPI");
        assert_eq!(expense.amount, dec!(100.50));
        assert_eq!(expense.amount.to_string(), "100.50");
        assert_eq!(expense.currency, "INR");
        assert_eq!(expense.category, "Others");
        assert_eq!(expense.status, "Success");
        assert_eq!(expense.description, None);
        assert_eq!(expense.updated_at, None);
        assert_eq!(expense.transaction_date, datetime!(2024-01-01 0:00 UTC));
        assert!(expense.created_at >= before - time::Duration::seconds(1));
    }

    #[test]
    fn create_fails_on_duplicate_transaction_id() {
        let conn = get_test_connection();
        let date = datetime!(2024-01-01 0:00 UTC);
        create_expense(Expense::build("TX1", "a@bank", "Shop", dec!(1), date), &conn)
            .expect("Could not create expense");

        let duplicate =
            create_expense(Expense::build("TX1", "b@bank", "Other", dec!(2), date), &conn);

        assert_eq!(
            duplicate,
            Err(Error::DuplicateTransactionId("TX1".to_owned()))
        );
        assert_eq!(count_expenses(&conn), Ok(1));
    }

    #[test]
    fn get_returns_created_expense() {
        let conn = get_test_connection();
        let created = create_expense(
            Expense::build(
                "TX1",
                "a@bank",
                "Shop",
                dec!(10),
                datetime!(2024-01-01 0:00 UTC),
            )
            .description(Some("Lunch".to_owned()))
            .raw_payload("{}"),
            &conn,
        )
        .unwrap();

        let got = get_expense(created.id, &conn);

        assert_eq!(got, Ok(created));
    }

    #[test]
    fn get_unknown_id_returns_not_found() {
        let conn = get_test_connection();

        assert_eq!(get_expense(ExpenseId::new(), &conn), Err(Error::NotFound));
    }

    #[test]
    fn find_by_transaction_id() {
        let conn = get_test_connection();
        let created = create_expense(
            Expense::build(
                "TX1",
                "a@bank",
                "Shop",
                dec!(10),
                datetime!(2024-01-01 0:00 UTC),
            ),
            &conn,
        )
        .unwrap();

        assert_eq!(
            find_expense_by_transaction_id("TX1", &conn),
            Ok(Some(created))
        );
        assert_eq!(find_expense_by_transaction_id("TX2", &conn), Ok(None));
    }
}
