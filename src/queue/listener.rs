//! A TCP listener that feeds newline-delimited messages into the queue.
//!
//! Each line received on a connection is published as one message. Blank
//! lines are skipped. A connection that sends a line longer than
//! [MAX_MESSAGE_LENGTH] bytes is closed.

use std::net::SocketAddr;

use futures::StreamExt;
use tokio::{io::AsyncRead, net::TcpListener};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::{Error, queue::QueueBroker};

/// The longest message, in bytes, that is accepted on a queue connection.
pub const MAX_MESSAGE_LENGTH: usize = 1024 * 1024;

/// Accept connections on `listener` and publish every line they send to `broker`.
///
/// # Errors
/// Returns [Error::Io] if accepting a connection fails.
pub async fn listen_for_messages(listener: TcpListener, broker: QueueBroker) -> Result<(), Error> {
    if let Ok(address) = listener.local_addr() {
        tracing::info!("Queue listener accepting messages on {address}");
    }

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::debug!("Accepted queue connection from {peer}");

        tokio::spawn(publish_lines(stream, peer, broker.clone()));
    }
}

/// Publish each non-blank line read from `reader`, returning how many were published.
pub(crate) async fn publish_lines<R>(reader: R, peer: SocketAddr, broker: QueueBroker) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_MESSAGE_LENGTH));
    let mut published = 0;

    while let Some(line) = lines.next().await {
        match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => match broker.publish(line) {
                Ok(_) => published += 1,
                Err(error) => {
                    tracing::error!("Could not publish message from {peer}: {error}");
                    break;
                }
            },
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                tracing::warn!(
                    "Closing queue connection {peer}: message longer than {MAX_MESSAGE_LENGTH} bytes"
                );
                break;
            }
            Err(LinesCodecError::Io(error)) => {
                tracing::warn!("Could not read from queue connection {peer}: {error}");
                break;
            }
        }
    }

    tracing::debug!("Queue connection from {peer} closed after {published} messages");

    published
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, time::Duration};

    use tokio::{io::AsyncWriteExt, net::TcpListener};

    use crate::queue::queue_channel;

    use super::{MAX_MESSAGE_LENGTH, listen_for_messages, publish_lines};

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 9999))
    }

    #[tokio::test]
    async fn publishes_each_non_blank_line() {
        let (broker, mut receiver) = queue_channel(3, Duration::ZERO);
        let input: &[u8] = b"{\"a\": 1}\n\n   \n{\"b\": 2}";

        let published = publish_lines(input, peer(), broker).await;

        assert_eq!(published, 2);
        assert_eq!(receiver.receive().await.unwrap().body, "{\"a\": 1}");
        assert_eq!(receiver.receive().await.unwrap().body, "{\"b\": 2}");
    }

    #[tokio::test]
    async fn handles_crlf_line_endings() {
        let (broker, mut receiver) = queue_channel(3, Duration::ZERO);
        let input: &[u8] = b"first\r\nsecond\r\n";

        publish_lines(input, peer(), broker).await;

        assert_eq!(receiver.receive().await.unwrap().body, "first");
        assert_eq!(receiver.receive().await.unwrap().body, "second");
    }

    #[tokio::test]
    async fn overlong_message_closes_the_connection() {
        let (broker, mut receiver) = queue_channel(3, Duration::ZERO);
        let mut input = b"first\n".to_vec();
        input.extend(std::iter::repeat_n(b'x', MAX_MESSAGE_LENGTH + 1));
        input.extend(b"\nafter\n");

        let published = publish_lines(input.as_slice(), peer(), broker).await;

        assert_eq!(published, 1);
        assert_eq!(receiver.receive().await.unwrap().body, "first");
        assert_eq!(receiver.try_receive(), None);
    }

    #[tokio::test]
    async fn listener_publishes_messages_from_tcp_clients() {
        let (broker, mut receiver) = queue_channel(3, Duration::ZERO);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(listen_for_messages(listener, broker));

        let mut client = tokio::net::TcpStream::connect(address).await.unwrap();
        client.write_all(b"hello queue\n").await.unwrap();
        client.shutdown().await.unwrap();

        let message = receiver.receive().await.unwrap();
        assert_eq!(message.body, "hello queue");
    }
}
