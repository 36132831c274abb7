//! Connection handles: the registry's only way to reach a live socket.

use std::fmt;
use std::time::Duration;

use lingumate_protocol::ServerMessage;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Items consumed by a connection's writer task.
#[derive(Debug)]
pub enum Outbound {
    /// Write one frame. `ack` fires once the socket write has completed.
    Frame {
        message: ServerMessage,
        ack: Option<oneshot::Sender<()>>,
    },
    /// Write the closure notice, close the socket and stop the writer.
    Close { notice: ServerMessage },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection is closed")]
    Closed,
    #[error("socket write did not complete within {0:?}")]
    TimedOut(Duration),
}

/// Cloneable sending side of one connection's outbound queue.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: String,
    tx: mpsc::Sender<Outbound>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl ConnectionHandle {
    /// Create a handle with a fresh connection id plus the receiver its
    /// writer task drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: uuid::Uuid::new_v4().to_string(),
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue a frame without waiting for the write. Returns false when the
    /// connection has gone away.
    pub async fn send(&self, message: ServerMessage) -> bool {
        self.tx
            .send(Outbound::Frame { message, ack: None })
            .await
            .is_ok()
    }

    /// Queue a frame and wait until the writer reports the socket write done.
    pub async fn deliver(
        &self,
        message: ServerMessage,
        timeout: Duration,
    ) -> Result<(), DeliveryError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let delivery = async {
            self.tx
                .send(Outbound::Frame {
                    message,
                    ack: Some(ack_tx),
                })
                .await
                .map_err(|_| DeliveryError::Closed)?;
            ack_rx.await.map_err(|_| DeliveryError::Closed)
        };
        tokio::time::timeout(timeout, delivery)
            .await
            .map_err(|_| DeliveryError::TimedOut(timeout))?
    }

    /// Ask the writer to send `notice` and shut the socket. Never blocks the
    /// caller; a full queue hands the notice to a background task.
    pub fn close(&self, notice: ServerMessage) {
        match self.tx.try_send(Outbound::Close { notice }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(item)) => {
                let tx = self.tx.clone();
                let conn_id = self.id.clone();
                tokio::spawn(async move {
                    if tx.send_timeout(item, Duration::from_secs(5)).await.is_err() {
                        debug!(conn_id = %conn_id, "Dropping closure notice for stalled connection");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
