//! Per-connection handle shared between the connection task and the registry.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// Identity of one accepted connection; never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a line could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("outbound queue full")]
    Full,
    #[error("connection closed")]
    Closed,
}

/// Sending half of a connection.
///
/// Lines are queued without blocking; the connection task owns the socket
/// and drains the queue. Closing only signals the task, which flushes what
/// is already queued before dropping the socket.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    outbound: mpsc::Sender<String>,
    shutdown: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle and the receiver its connection task drains.
    pub fn new(id: ConnectionId, addr: SocketAddr, queue: usize) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (outbound, rx) = mpsc::channel(queue);
        let handle = Self { id, addr, outbound, shutdown: CancellationToken::new() };
        (Arc::new(handle), rx)
    }

    /// Queue one line (without its terminator).
    pub fn send_line(&self, line: impl Into<String>) -> Result<(), SendError> {
        if self.shutdown.is_cancelled() {
            return Err(SendError::Closed);
        }
        self.outbound.try_send(line.into()).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Ask the connection task to flush and close.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once `close` has been called.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn test_send_queues_lines_in_order() {
        let (handle, mut rx) = ConnectionHandle::new(ConnectionId(1), addr(), 4);
        handle.send_line("a").unwrap();
        handle.send_line("b").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "a");
        assert_eq!(rx.try_recv().unwrap(), "b");
    }

    #[test]
    fn test_full_queue_is_reported() {
        let (handle, _rx) = ConnectionHandle::new(ConnectionId(1), addr(), 1);
        handle.send_line("a").unwrap();
        assert_eq!(handle.send_line("b"), Err(SendError::Full));
    }

    #[test]
    fn test_closed_handle_rejects_lines() {
        let (handle, rx) = ConnectionHandle::new(ConnectionId(1), addr(), 4);
        handle.close();
        assert!(handle.is_closed());
        assert_eq!(handle.send_line("a"), Err(SendError::Closed));
        drop(rx);
    }

    #[test]
    fn test_dropped_receiver_is_closed() {
        let (handle, rx) = ConnectionHandle::new(ConnectionId(2), addr(), 4);
        drop(rx);
        assert_eq!(handle.send_line("a"), Err(SendError::Closed));
    }
}
