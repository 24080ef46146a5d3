//! The JSON shape of expenses in API responses.

use rust_decimal::Decimal;
use serde::{Serialize, Serializer, ser::Error as _};
use serde_json::value::RawValue;
use time::OffsetDateTime;

use crate::expense::Expense;

/// An expense as it is returned to API clients.
///
/// The raw notification payload and modification time are internal and are
/// left out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseResponse {
    id: String,
    transaction_id: String,
    payment_method: String,
    upi_id: String,
    merchant_name: String,
    #[serde(serialize_with = "serialize_amount")]
    amount: Decimal,
    currency: String,
    description: Option<String>,
    category: String,
    #[serde(with = "time::serde::rfc3339")]
    transaction_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    status: String,
}

impl From<Expense> for ExpenseResponse {
    fn from(expense: Expense) -> Self {
        Self {
            id: expense.id.to_string(),
            transaction_id: expense.transaction_id,
            payment_method: expense.payment_method,
            upi_id: expense.upi_id,
            merchant_name: expense.merchant_name,
            amount: expense.amount,
            currency: expense.currency,
            description: expense.description,
            category: expense.category,
            transaction_date: expense.transaction_date,
            created_at: expense.created_at,
            status: expense.status,
        }
    }
}

/// The response body for a list of expenses.
#[derive(Debug, Clone, Serialize)]
pub struct ExpenseListResponse {
    /// The number of expenses in `expenses`.
    pub count: usize,
    /// The expenses, most recent transaction first.
    pub expenses: Vec<ExpenseResponse>,
}

impl From<Vec<Expense>> for ExpenseListResponse {
    fn from(expenses: Vec<Expense>) -> Self {
        let expenses: Vec<ExpenseResponse> = expenses.into_iter().map(Into::into).collect();

        Self {
            count: expenses.len(),
            expenses,
        }
    }
}

/// Write the amount as a JSON number with exactly two decimal places, e.g. `100.50`.
fn serialize_amount<S: Serializer>(amount: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    RawValue::from_string(format!("{amount:.2}"))
        .map_err(S::Error::custom)?
        .serialize(serializer)
}
