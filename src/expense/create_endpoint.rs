//! Defines the endpoint for receiving UPI payment notifications over HTTP.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    body::Bytes,
    extract::{FromRef, State},
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    endpoints::{self, format_endpoint},
    expense::{ExpenseResponse, IngestOutcome, ingest_notification},
};

/// The state needed to record or look up expenses.
#[derive(Debug, Clone)]
pub struct ExpenseState {
    /// The database connection for managing expenses.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ExpenseState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler for UPI payment notifications.
///
/// The body is read as raw bytes rather than through a JSON extractor so that
/// it can be stored verbatim with the expense. A body that is not valid UTF-8
/// is malformed. Responds with the new expense and
/// `201 Created`, or `409 Conflict` if the transaction was already recorded.
pub async fn create_expense_endpoint(
    State(state): State<ExpenseState>,
    body: Bytes,
) -> Result<Response, Error> {
    tracing::info!("Processing UPI payment notification.");

    let body = std::str::from_utf8(&body)
        .map_err(|error| Error::MalformedPayload(format!("the body is not UTF-8: {error}")))?;

    if body.trim().is_empty() {
        return Err(Error::EmptyBody);
    }

    let connection = state.db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })?;

    match ingest_notification(body, &connection) {
        Ok(IngestOutcome::Created(expense)) => {
            let location = format_endpoint(endpoints::EXPENSE, expense.id);

            Ok((
                StatusCode::CREATED,
                [(LOCATION, location)],
                Json(ExpenseResponse::from(expense)),
            )
                .into_response())
        }
        Ok(IngestOutcome::Duplicate(transaction_id)) => {
            Err(Error::DuplicateTransactionId(transaction_id))
        }
        Err(error) => {
            tracing::error!("could not record UPI payment: {error}");
            Err(error)
        }
    }
}
