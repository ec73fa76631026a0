// Round-robin pool of connections sharing one configuration.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::ApnsResult;
use crate::notification::Notification;
use crate::response::Response;

/// A fixed-size pool. Sizing policy is the caller's concern; the pool just
/// spreads pushes across its connections.
pub struct ConnectionPool {
    connections: Vec<Arc<Connection>>,
    next: AtomicUsize,
}

impl ConnectionPool {
    /// Open `size` connections (at least one) against the same gateway.
    pub async fn open(config: ConnectionConfig, size: usize) -> ApnsResult<Self> {
        let size = size.max(1);
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            connections.push(Arc::new(Connection::open(config.clone()).await?));
        }
        Ok(Self::from_connections(connections))
    }

    /// Assemble a pool from already-open connections.
    pub fn from_connections(connections: Vec<Arc<Connection>>) -> Self {
        ConnectionPool {
            connections,
            next: AtomicUsize::new(0),
        }
    }

    /// Round-robin pick only.
    pub fn get(&self) -> Arc<Connection> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        Arc::clone(&self.connections[index])
    }

    /// Push on the next connection in rotation.
    pub async fn push(&self, notification: &dyn Notification) -> ApnsResult<Option<Response>> {
        self.get().push(notification).await
    }

    pub async fn close(&self) {
        for connection in &self.connections {
            connection.close().await;
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
