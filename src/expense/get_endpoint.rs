//! Defines the endpoint for getting a single expense.

use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    Error,
    expense::{ExpenseId, ExpenseResponse, ExpenseState, get_expense},
};

/// A route handler for getting an expense by its ID.
///
/// Responds with `400 Bad Request` if `expense_id` is not a valid ID and
/// `404 Not Found` if there is no expense with that ID.
pub async fn get_expense_endpoint(
    State(state): State<ExpenseState>,
    Path(expense_id): Path<String>,
) -> Result<Json<ExpenseResponse>, Error> {
    tracing::debug!("Get expense by ID: {expense_id}");

    let id = ExpenseId::parse(&expense_id)?;

    let connection = state.db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })?;

    get_expense(id, &connection)
        .map(|expense| Json(expense.into()))
        .inspect_err(|error| {
            if *error != Error::NotFound {
                tracing::error!("Error retrieving expense with ID {id}: {error}");
            }
        })
}
