//! Expense management for the application.
//!
//! This module contains everything related to expenses:
//! - The `Expense` model and `ExpenseBuilder` for creating expenses
//! - Decoding and validation of UPI payment notifications
//! - The ingestion pipeline that records notifications exactly once
//! - Database functions for storing, filtering and listing expenses
//! - The route handlers for the expense API

mod core;
mod create_endpoint;
mod get_endpoint;
mod ingest;
mod list_endpoint;
mod notification;
mod query;
mod response;

pub(crate) use core::EXPENSE_COLUMNS;
pub use core::{
    DEFAULT_CATEGORY, DEFAULT_CURRENCY, DEFAULT_STATUS, Expense, ExpenseBuilder, ExpenseId,
    UPI_PAYMENT_METHOD, count_expenses, create_expense, create_expense_table,
    find_expense_by_transaction_id, get_expense, map_expense_row,
};
pub use create_endpoint::{ExpenseState, create_expense_endpoint};
pub use get_endpoint::get_expense_endpoint;
pub use ingest::{IngestOutcome, ingest_notification, record_expense};
pub use list_endpoint::{ListExpensesState, list_expenses_endpoint};
pub use notification::{FieldError, PaymentNotification};
pub use query::{
    ExpenseFilter, ExpensePredicate, ExpenseQueryParams, QueryConfig, list_expenses,
};
pub use response::{ExpenseListResponse, ExpenseResponse};
