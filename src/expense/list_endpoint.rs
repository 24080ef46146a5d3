//! Defines the endpoint for listing expenses.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Query, State},
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    expense::{ExpenseFilter, ExpenseListResponse, ExpenseQueryParams, QueryConfig, list_expenses},
};

/// The state needed to list expenses.
#[derive(Debug, Clone)]
pub struct ListExpensesState {
    /// The database connection for reading expenses.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The config that controls how many expenses are returned.
    pub query_config: QueryConfig,
}

impl FromRef<AppState> for ListExpensesState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            query_config: state.query_config.clone(),
        }
    }
}

/// A route handler for listing expenses, most recent transaction first.
///
/// Accepts the optional query parameters `category`, `startDate`, `endDate`
/// and `limit`. Values that cannot be parsed are ignored, and a repeated
/// parameter uses its first usable value.
pub async fn list_expenses_endpoint(
    State(state): State<ListExpensesState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ExpenseListResponse>, Error> {
    let params = ExpenseQueryParams::from_pairs(pairs);
    let filter = ExpenseFilter::from_params(params, &state.query_config);

    let connection = state.db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })?;

    let expenses = list_expenses(&filter, &connection)
        .inspect_err(|error| tracing::error!("Error retrieving expenses: {error}"))?;

    tracing::info!("Retrieved {} expenses", expenses.len());

    Ok(Json(expenses.into()))
}
