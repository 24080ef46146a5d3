//! The queue path for payment notifications.
//!
//! - [broker] is an in-process queue with redelivery and dead-lettering
//! - [consumer] records the notifications delivered by the queue
//! - [listener] accepts messages for the queue over TCP

mod broker;
mod consumer;
mod listener;

pub use broker::{
    DEFAULT_MAX_DELIVERY_COUNT, DEFAULT_REDELIVERY_DELAY, DeadLetter, QueueBroker, QueueMessage,
    QueueReceiver, queue_channel,
};
pub use consumer::{QueueState, handle_delivery, process_message, run_consumer};
pub use listener::listen_for_messages;
