//! Cache of warm backend connections
//!
//! One pool per backend. The slot table sits behind a `parking_lot::Mutex`
//! that is only held for the slot scan; connecting, logging in and probing
//! all happen after the lock is released.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::transport::Connector;
use crate::variant::ProtocolVariant;

/// Bounded cache of idle connections for one backend
pub struct ConnectionPool {
    name: String,
    connector: Arc<dyn Connector>,
    variant: Arc<dyn ProtocolVariant>,
    packet_size: usize,
    socket_idle_limit: Option<Duration>,
    cache_idle_limit: Option<Duration>,
    connect_probe: Option<Duration>,
    prepost_probe: Option<Duration>,
    send_deadline: Option<Duration>,
    slots: Mutex<Vec<Option<Connection>>>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.name)
            .field("endpoint", &self.connector.endpoint())
            .field("capacity", &self.capacity())
            .field("idle", &self.idle_count())
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Create an empty pool sized and timed by `config`
    pub fn new(
        config: &WorkerConfig,
        connector: Arc<dyn Connector>,
        variant: Arc<dyn ProtocolVariant>,
    ) -> Self {
        let slots = std::iter::repeat_with(|| None)
            .take(config.pool_size)
            .collect();
        Self {
            name: config.name.clone(),
            connector,
            variant,
            packet_size: config.max_packet_size,
            socket_idle_limit: config.socket_idle_limit(),
            cache_idle_limit: config.cache_idle_limit(),
            connect_probe: config.connect_probe(),
            prepost_probe: config.prepost_probe(),
            send_deadline: config.send_deadline(),
            slots: Mutex::new(slots),
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// Connections currently parked in the pool
    pub fn idle_count(&self) -> usize {
        self.slots.lock().iter().filter(|slot| slot.is_some()).count()
    }

    /// Take one idle connection out of the table
    ///
    /// Other slots idle past the cache timeout are evicted during the same
    /// scan, and a candidate idle past the socket timeout is closed instead of
    /// handed out. Evicted connections are closed after the lock is released.
    fn take_idle(&self) -> Option<Connection> {
        let mut evicted = Vec::new();
        let mut taken = None;
        {
            let mut slots = self.slots.lock();
            for slot in slots.iter_mut() {
                let Some(idle) = slot.as_ref().map(Connection::idle_for) else {
                    continue;
                };

                if taken.is_none() {
                    if self.socket_idle_limit.is_some_and(|limit| idle > limit) {
                        evicted.extend(slot.take());
                    } else {
                        taken = slot.take();
                    }
                } else if self.cache_idle_limit.is_some_and(|limit| idle > limit) {
                    evicted.extend(slot.take());
                }
            }
        }

        for conn in evicted {
            info!(
                worker = %self.name,
                connection = conn.id(),
                "Closing connection idle for {:?}",
                conn.idle_for()
            );
        }
        taken
    }

    /// Hand out a ready connection, reusing an idle one when possible
    ///
    /// A reused connection is probed with CPING first when a prepost timeout
    /// is configured; one that fails the probe is closed and the next idle
    /// connection is tried. A new connection has completed its logon (and the
    /// connect probe, if configured) before it is returned.
    pub async fn acquire(&self) -> Result<Connection> {
        while let Some(mut conn) = self.take_idle() {
            let Some(limit) = self.prepost_probe else {
                debug!(worker = %self.name, connection = conn.id(), "Reusing pooled connection");
                return Ok(conn);
            };

            match conn.cping(limit).await {
                Ok(()) => {
                    debug!(worker = %self.name, connection = conn.id(), "Reusing probed connection");
                    return Ok(conn);
                }
                Err(e) => {
                    warn!(
                        worker = %self.name,
                        connection = conn.id(),
                        "Pooled connection failed CPING, closing: {e}"
                    );
                }
            }
        }

        self.open().await
    }

    async fn open(&self) -> Result<Connection> {
        let stream = self.connector.connect().await?;
        let mut conn = Connection::new(stream, self.variant.protocol(), self.packet_size)
            .with_send_deadline(self.send_deadline);

        self.variant.logon(&mut conn).await?;
        if let Some(limit) = self.connect_probe {
            conn.cping(limit).await?;
        }

        debug!(
            worker = %self.name,
            connection = conn.id(),
            "Opened {} connection to {}",
            conn.protocol(),
            self.connector.endpoint()
        );
        Ok(conn)
    }

    /// Return a connection after an exchange
    ///
    /// Connections not eligible for reuse, or for which no slot is free, are
    /// closed.
    pub fn release(&self, mut conn: Connection, reuse: bool) {
        if !reuse {
            debug!(worker = %self.name, connection = conn.id(), "Closing connection not eligible for reuse");
            return;
        }

        conn.touch();
        let overflow = {
            let mut slots = self.slots.lock();
            match slots.iter_mut().find(|slot| slot.is_none()) {
                Some(slot) => {
                    *slot = Some(conn);
                    None
                }
                None => Some(conn),
            }
        };

        if let Some(conn) = overflow {
            debug!(worker = %self.name, connection = conn.id(), "Pool full, closing connection");
        }
    }

    /// Close every idle connection
    pub fn close_idle(&self) -> usize {
        let drained: Vec<Connection> = self
            .slots
            .lock()
            .iter_mut()
            .filter_map(Option::take)
            .collect();
        if !drained.is_empty() {
            info!(worker = %self.name, "Closed {} idle connections", drained.len());
        }
        drained.len()
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.close_idle();
    }
}
