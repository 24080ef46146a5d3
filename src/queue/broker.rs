//! An in-process message queue with at-least-once delivery.
//!
//! The queue behaves like a hosted message broker: a consumer either
//! completes a message, which removes it, or abandons it, which makes it
//! available again with its delivery count increased. An abandoned message
//! is held back for the redelivery delay times its delivery count before it
//! is delivered again. A message that is abandoned on its final allowed
//! delivery is moved to the dead-letter list.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::Error;

/// The number of times a message is delivered before it is dead-lettered.
pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 10;

/// How long an abandoned message waits before its second delivery.
pub const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_secs(1);

/// A message as it is delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Identifies the message across redeliveries.
    pub message_id: Uuid,
    /// The message body, a serialized payment notification.
    pub body: String,
    /// How many times the message has been delivered, starting at 1.
    pub delivery_count: u32,
}

/// A message that was abandoned too many times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// The message as it was last delivered.
    pub message: QueueMessage,
    /// Why the last delivery was abandoned.
    pub reason: String,
}

/// The sending and settling side of a queue.
///
/// Cloning the broker gives another handle to the same queue.
#[derive(Debug, Clone)]
pub struct QueueBroker {
    sender: mpsc::UnboundedSender<QueueMessage>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
    max_delivery_count: u32,
    redelivery_delay: Duration,
}

/// The receiving side of a queue.
#[derive(Debug)]
pub struct QueueReceiver {
    receiver: mpsc::UnboundedReceiver<QueueMessage>,
}

/// Create a queue whose messages are dead-lettered after `max_delivery_count`
/// deliveries.
///
/// The n-th redelivery of a message waits `redelivery_delay * n`, so a zero
/// delay redelivers immediately.
pub fn queue_channel(
    max_delivery_count: u32,
    redelivery_delay: Duration,
) -> (QueueBroker, QueueReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();

    (
        QueueBroker {
            sender,
            dead_letters: Arc::new(Mutex::new(Vec::new())),
            max_delivery_count: max_delivery_count.max(1),
            redelivery_delay,
        },
        QueueReceiver { receiver },
    )
}

impl QueueBroker {
    /// Add a new message to the queue and return its ID.
    ///
    /// # Errors
    /// Returns [Error::QueueClosed] if the receiver has been dropped.
    pub fn publish(&self, body: impl Into<String>) -> Result<Uuid, Error> {
        let message = QueueMessage {
            message_id: Uuid::new_v4(),
            body: body.into(),
            delivery_count: 1,
        };
        let message_id = message.message_id;

        self.sender
            .send(message)
            .map_err(|_| Error::QueueClosed)?;

        tracing::debug!("Published message {message_id}");

        Ok(message_id)
    }

    /// Mark a delivered message as handled so that it is not delivered again.
    ///
    /// A message leaves the queue when it is received and only comes back
    /// through [QueueBroker::abandon], so completing it only needs to record
    /// the settlement.
    pub fn complete(&self, message: &QueueMessage) {
        tracing::debug!(
            "Completed message {} after {} deliveries",
            message.message_id,
            message.delivery_count
        );
    }

    /// Give a delivered message back to the queue.
    ///
    /// The message is delivered again unless it has reached the maximum
    /// delivery count, in which case it is dead-lettered with `reason`.
    /// A delayed redelivery is scheduled on the current tokio runtime, so this
    /// must be called from within one unless the redelivery delay is zero.
    ///
    /// # Errors
    /// Returns [Error::QueueClosed] if the receiver has been dropped, or
    /// [Error::QueueLockError] if the dead-letter list cannot be locked.
    pub fn abandon(&self, message: QueueMessage, reason: &str) -> Result<(), Error> {
        if message.delivery_count >= self.max_delivery_count {
            tracing::error!(
                "Dead-lettering message {} after {} deliveries: {reason}",
                message.message_id,
                message.delivery_count
            );

            self.dead_letters
                .lock()
                .map_err(|_| Error::QueueLockError)?
                .push(DeadLetter {
                    message,
                    reason: reason.to_owned(),
                });

            return Ok(());
        }

        let delay = self.redelivery_delay * message.delivery_count;
        tracing::warn!(
            "Abandoned message {} on delivery {}, redelivering in {delay:?}: {reason}",
            message.message_id,
            message.delivery_count
        );

        let redelivery = QueueMessage {
            delivery_count: message.delivery_count + 1,
            ..message
        };

        if delay.is_zero() {
            return self
                .sender
                .send(redelivery)
                .map_err(|_| Error::QueueClosed);
        }

        if self.sender.is_closed() {
            return Err(Error::QueueClosed);
        }

        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if let Err(error) = sender.send(redelivery) {
                tracing::error!(
                    "Could not redeliver message {}, the queue is closed",
                    error.0.message_id
                );
            }
        });

        Ok(())
    }

    /// The messages that have been dead-lettered so far.
    ///
    /// # Errors
    /// Returns [Error::QueueLockError] if the dead-letter list cannot be locked.
    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>, Error> {
        self.dead_letters
            .lock()
            .map(|dead_letters| dead_letters.clone())
            .map_err(|_| Error::QueueLockError)
    }

    /// Remove and return the messages that have been dead-lettered so far.
    ///
    /// # Errors
    /// Returns [Error::QueueLockError] if the dead-letter list cannot be locked.
    pub fn take_dead_letters(&self) -> Result<Vec<DeadLetter>, Error> {
        self.dead_letters
            .lock()
            .map(|mut dead_letters| std::mem::take(&mut *dead_letters))
            .map_err(|_| Error::QueueLockError)
    }
}

impl QueueReceiver {
    /// Wait for the next message.
    ///
    /// Returns `None` once every [QueueBroker] handle has been dropped and the
    /// queue is empty.
    pub async fn receive(&mut self) -> Option<QueueMessage> {
        self.receiver.recv().await
    }

    /// Take the next message if one is ready.
    pub fn try_receive(&mut self) -> Option<QueueMessage> {
        self.receiver.try_recv().ok()
    }
}
