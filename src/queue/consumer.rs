//! Records payment notifications delivered through the queue.
//!
//! Redelivery is left entirely to the broker. A message that is recorded, or
//! that turns out to be a duplicate, is completed. Any error abandons the
//! message so the broker can deliver it again or dead-letter it.

use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use rusqlite::Connection;

use crate::{
    AppState, Error,
    expense::{IngestOutcome, ingest_notification},
    queue::{QueueBroker, QueueMessage, QueueReceiver},
};

/// The state needed to record notifications from the queue.
#[derive(Debug, Clone)]
pub struct QueueState {
    /// The database connection for recording expenses.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for QueueState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Record the notification in a message body.
///
/// A duplicate notification is a success: the payment has already been
/// recorded, so delivering the message again would change nothing.
///
/// # Errors
/// Returns an error for a malformed or invalid notification and for database
/// failures, see [ingest_notification].
pub fn process_message(body: &str, state: &QueueState) -> Result<IngestOutcome, Error> {
    let connection = state.db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })?;

    let outcome = ingest_notification(body, &connection)
        .inspect_err(|error| tracing::error!("Error processing UPI payment from queue: {error}"))?;

    match &outcome {
        IngestOutcome::Created(expense) => tracing::info!(
            "Expense created from queue. Transaction ID: {}, Amount: {} {}",
            expense.transaction_id,
            expense.amount,
            expense.currency
        ),
        IngestOutcome::Duplicate(transaction_id) => {
            tracing::warn!("Skipping duplicate transaction from queue: {transaction_id}")
        }
    }

    Ok(outcome)
}

/// Process one delivered message and settle it with the broker.
pub async fn handle_delivery(message: QueueMessage, state: QueueState, broker: QueueBroker) {
    tracing::info!(
        "Processing message {} (delivery {})",
        message.message_id,
        message.delivery_count
    );

    match process_message(&message.body, &state) {
        Ok(_) => broker.complete(&message),
        Err(error) => {
            let message_id = message.message_id;

            if let Err(settle_error) = broker.abandon(message, &error.to_string()) {
                tracing::error!("Could not abandon message {message_id}: {settle_error}");
            }
        }
    }
}

/// Receive messages until the queue closes, processing each on its own task.
pub async fn run_consumer(state: QueueState, broker: QueueBroker, mut receiver: QueueReceiver) {
    tracing::info!("Queue consumer started");

    while let Some(message) = receiver.receive().await {
        tokio::spawn(handle_delivery(message, state.clone(), broker.clone()));
    }

    tracing::info!("Queue consumer stopped");
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use rusqlite::Connection;

    use crate::{
        Error,
        db::initialize,
        expense::{IngestOutcome, count_expenses},
        queue::queue_channel,
    };

    use super::{QueueState, handle_delivery, process_message};

    const TX1: &str = r#"{"transactionId": "TX1", "upiId": "a@bank", "merchantName": "Shop",
        "amount": 100.50, "transactionDate": "2024-01-01"}"#;

    fn get_test_state() -> QueueState {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        QueueState {
            db_connection: Arc::new(Mutex::new(conn)),
        }
    }

    fn count(state: &QueueState) -> u32 {
        count_expenses(&state.db_connection.lock().unwrap()).unwrap()
    }

    #[test]
    fn duplicate_message_is_success() {
        let state = get_test_state();

        let first = process_message(TX1, &state);
        let second = process_message(TX1, &state);

        assert!(matches!(first, Ok(IngestOutcome::Created(_))));
        assert_eq!(second, Ok(IngestOutcome::Duplicate("TX1".to_owned())));
        assert_eq!(count(&state), 1);
    }

    #[test]
    fn invalid_message_is_error() {
        let state = get_test_state();

        let result = process_message(r#"{"transactionId": "TX1", "amount": -5}"#, &state);

        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(count(&state), 0);
    }

    #[tokio::test]
    async fn redelivered_message_is_recorded_once_and_completed_twice() {
        let state = get_test_state();
        let (broker, mut receiver) = queue_channel(3, Duration::ZERO);
        broker.publish(TX1).unwrap();
        broker.publish(TX1).unwrap();

        for _ in 0..2 {
            let message = receiver.receive().await.unwrap();
            handle_delivery(message, state.clone(), broker.clone()).await;
        }

        assert_eq!(count(&state), 1);
        assert_eq!(receiver.try_receive(), None, "no message should be redelivered");
        assert_eq!(broker.dead_letters(), Ok(vec![]));
    }

    #[tokio::test]
    async fn malformed_message_is_abandoned_until_dead_lettered() {
        let state = get_test_state();
        let (broker, mut receiver) = queue_channel(3, Duration::ZERO);
        broker.publish("not json").unwrap();

        let mut deliveries = 0;
        while let Some(message) = receiver.try_receive() {
            deliveries += 1;
            handle_delivery(message, state.clone(), broker.clone()).await;
        }

        assert_eq!(deliveries, 3);
        let dead_letters = broker.dead_letters().unwrap();
        assert_eq!(dead_letters.len(), 1);
        assert_eq!(dead_letters[0].message.body, "not json");
        assert_eq!(count(&state), 0);
    }

    #[tokio::test]
    async fn store_failure_is_abandoned_for_redelivery() {
        let state = QueueState {
            db_connection: Arc::new(Mutex::new(Connection::open_in_memory().unwrap())),
        };
        let (broker, mut receiver) = queue_channel(3, Duration::ZERO);
        broker.publish(TX1).unwrap();

        let message = receiver.receive().await.unwrap();
        handle_delivery(message, state, broker.clone()).await;

        let redelivered = receiver.try_receive().expect("message should be redelivered");
        assert_eq!(redelivered.delivery_count, 2);
        assert_eq!(redelivered.body, TX1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_store_failure_recovers_on_delayed_redelivery() {
        let state = QueueState {
            db_connection: Arc::new(Mutex::new(Connection::open_in_memory().unwrap())),
        };
        let (broker, mut receiver) = queue_channel(3, Duration::from_secs(2));
        broker.publish(TX1).unwrap();

        let message = receiver.receive().await.unwrap();
        handle_delivery(message, state.clone(), broker.clone()).await;
        initialize(&state.db_connection.lock().unwrap()).unwrap();

        let redelivered = receiver.receive().await.unwrap();
        handle_delivery(redelivered, state.clone(), broker.clone()).await;

        assert_eq!(count(&state), 1);
        assert_eq!(broker.dead_letters(), Ok(vec![]));
    }
}
