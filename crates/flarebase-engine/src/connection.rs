//! Outbound side of a socket session.
//!
//! Shards never touch sockets. Each accepted socket gets a bounded queue of
//! [`Outbound`] frames; the shard holds the sending half as a
//! [`ConnectionHandle`] and the gateway drains the receiving half into the
//! socket. A full or closed queue makes the send fail, and the shard treats
//! that session as gone.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// A frame for the socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame.
    Text(String),
    /// Close the socket.
    Close,
}

/// Why a frame could not be queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The writer is not keeping up.
    #[error("outbound queue full")]
    Full,
    /// The writer is gone.
    #[error("connection closed")]
    Closed,
    /// The frame could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Sending half of a session's outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver the socket writer drains.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// Whether the writer is still attached.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a text frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is full or the writer is gone.
    pub fn send_text(&self, text: String) -> Result<(), SendError> {
        self.tx.try_send(Outbound::Text(text)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Encode `frame` as JSON and queue it.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails, the queue is full, or the writer is gone.
    pub fn send_json<T: Serialize>(&self, frame: &T) -> Result<(), SendError> {
        let text = serde_json::to_string(frame).map_err(|e| SendError::Encode(e.to_string()))?;
        self.send_text(text)
    }

    /// Ask the writer to close the socket. Best effort.
    pub fn close(&self) {
        let _ = self.tx.try_send(Outbound::Close);
    }
}
