//! Expense Recorder turns UPI payment notifications into expense records.
//!
//! Notifications arrive either as HTTP requests or as messages on a queue.
//! Both paths share one ingestion pipeline that validates the notification,
//! makes sure the same transaction is never recorded twice and stores the
//! result in SQLite. Recorded expenses can then be listed and filtered over a
//! JSON REST API.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
mod db;
mod endpoints;
mod expense;
mod logging;
mod not_found;
mod queue;
mod routing;
mod timestamp;

pub use app_state::AppState;
pub use db::{initialize as initialize_db, open_connection};
pub use expense::{
    DEFAULT_CATEGORY, DEFAULT_CURRENCY, DEFAULT_STATUS, Expense, ExpenseBuilder, ExpenseFilter,
    ExpenseId, ExpenseListResponse, ExpensePredicate, ExpenseQueryParams, ExpenseResponse,
    FieldError, IngestOutcome, PaymentNotification, QueryConfig, UPI_PAYMENT_METHOD,
    count_expenses, get_expense, ingest_notification, list_expenses, record_expense,
};
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use queue::{
    DEFAULT_MAX_DELIVERY_COUNT, DEFAULT_REDELIVERY_DELAY, DeadLetter, QueueBroker, QueueMessage,
    QueueReceiver, QueueState, handle_delivery, listen_for_messages, process_message,
    queue_channel, run_consumer,
};
pub use routing::build_router;
pub use timestamp::parse_timestamp;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The request body was empty or only contained whitespace.
    #[error("the request body is empty")]
    EmptyBody,

    /// The notification could not be decoded as a JSON object of the expected
    /// shape.
    ///
    /// The string describes what went wrong and is only intended for the
    /// server logs.
    #[error("could not decode the payment notification: {0}")]
    MalformedPayload(String),

    /// The notification was decoded but one or more fields are invalid.
    #[error("invalid payment notification: {}", describe_field_errors(.0))]
    Validation(Vec<FieldError>),

    /// An expense with the given transaction ID already exists in the database.
    ///
    /// Payment providers may deliver the same notification more than once.
    /// The database enforces uniqueness on the transaction ID so that a
    /// payment is only ever recorded once, even when two copies of the same
    /// notification are processed at the same time.
    #[error("an expense with the transaction ID \"{0}\" already exists")]
    DuplicateTransactionId(String),

    /// The string could not be parsed as an expense ID.
    #[error("\"{0}\" is not a valid expense ID")]
    InvalidIdFormat(String),

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// Could not acquire the lock on the dead-letter list.
    #[error("could not acquire the dead-letter lock")]
    QueueLockError,

    /// The receiving end of the queue has been dropped.
    #[error("the queue is closed")]
    QueueClosed,

    /// An I/O error, e.g. while accepting a queue connection.
    #[error("I/O error: {0}")]
    Io(String),
}

fn describe_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|error| format!("{} {}", error.field, error.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Error::EmptyBody => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Request body is empty" }),
            ),
            Error::MalformedPayload(_) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid JSON format" }),
            ),
            Error::Validation(details) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Validation failed", "details": details }),
            ),
            Error::DuplicateTransactionId(transaction_id) => (
                StatusCode::CONFLICT,
                json!({
                    "error": "Transaction already exists",
                    "transactionId": transaction_id,
                }),
            ),
            Error::InvalidIdFormat(_) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid expense ID format" }),
            ),
            Error::NotFound => (
                StatusCode::NOT_FOUND,
                json!({ "error": "Expense not found" }),
            ),
            // Any errors that are not handled above are not intended to be shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod error_response_tests {
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
    use serde_json::{Value, json};

    use crate::{Error, FieldError};

    async fn render(error: Error) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn duplicate_is_conflict_with_transaction_id() {
        let (status, body) = render(Error::DuplicateTransactionId("TX1".to_owned())).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["transactionId"], "TX1");
    }

    #[tokio::test]
    async fn validation_lists_fields() {
        let (status, body) = render(Error::Validation(vec![FieldError::new(
            "amount",
            "must be greater than 0",
        )]))
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["details"],
            json!([{ "field": "amount", "message": "must be greater than 0" }])
        );
    }

    #[tokio::test]
    async fn sql_errors_do_not_leak_details() {
        let (status, body) = render(Error::SqlError(rusqlite::Error::InvalidQuery)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Internal server error" }));
    }

    #[tokio::test]
    async fn malformed_payload_hides_parser_message() {
        let (status, body) =
            render(Error::MalformedPayload("expected value at line 1".to_owned())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid JSON format" }));
    }
}
