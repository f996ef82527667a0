//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Per-destination connection pool.

use super::connect::{ConnectFuture, ConnectSender};
use super::{PoolConfig, PooledConnection};
use crate::transport::{Connection, Connector, RemoteAddress, TransportError};
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[cfg(feature = "observability")]
use tracing::{debug, info, warn};

type Pooled<C> = Arc<PooledConnection<<C as Connector>::Connection>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    address: RemoteAddress,
    index: usize,
}

enum Slot<T> {
    Connecting(ConnectSender<T>),
    Ready(Arc<PooledConnection<T>>),
}

enum Checkout<T> {
    Ready(Arc<PooledConnection<T>>),
    Pending(ConnectFuture<T>),
}

struct PoolInner<C: Connector> {
    connector: C,
    config: PoolConfig,
    slots: Mutex<HashMap<SlotKey, Slot<C::Connection>>>,
    cursor: AtomicUsize,
    closed: AtomicBool,
    dials: AtomicU64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Keeps up to `connections_per_address` connections per destination.
///
/// Creation is single-flighted per slot: while a slot is being dialed, every
/// other acquirer of that slot waits on the same dial. A dial whose waiters
/// have all gone away (cancelled or timed out) closes the connection it
/// produced rather than registering it, and a connection is always removed
/// from the pool before it is closed.
///
/// # Examples
///
/// ```rust,no_run
/// use rpcore::pool::{ConnectionPool, PoolConfig};
/// use rpcore::transport::TcpConnector;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = ConnectionPool::new(TcpConnector::new(), PoolConfig::default());
/// let address = "127.0.0.1:8000".parse()?;
///
/// let connection = pool.acquire(&address).await?;
/// // ... connection.call(request) ...
/// pool.release(&connection);
///
/// pool.close().await;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionPool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// Creates an empty pool.
    pub fn new(connector: C, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                connector,
                config,
                slots: Mutex::new(HashMap::new()),
                cursor: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                dials: AtomicU64::new(0),
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// The pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// The connector used for dialing.
    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    /// Returns a connection to `address`, dialing one if the chosen slot is
    /// empty.
    ///
    /// # Errors
    ///
    /// [`TransportError::Closed`] once the pool is closed, the dial's error,
    /// or [`TransportError::Timeout`] after `connect_timeout`.
    pub async fn acquire(&self, address: &RemoteAddress) -> Result<Pooled<C>, TransportError> {
        loop {
            let pending = match self.checkout(address)? {
                Checkout::Ready(connection) => return Ok(connection),
                Checkout::Pending(pending) => pending,
            };
            let connection = pending.await?;
            if self.claim(&connection) {
                return Ok(connection);
            }

            #[cfg(feature = "observability")]
            debug!(address = %address, slot = connection.slot(), "Dialed connection evicted before use, retrying");
        }
    }

    /// Gives a connection back. It stays pooled while the pool is open and
    /// the connection healthy; otherwise it is evicted and closed.
    pub fn release(&self, connection: &Pooled<C>) {
        connection.checkin();
        if self.is_closed() || !connection.is_open() {
            self.invalidate(connection);
        }
    }

    /// Evicts `connection` from the pool and closes it in the background.
    pub fn invalidate(&self, connection: &Pooled<C>) {
        let _removed = self.remove_if_current(connection);

        #[cfg(feature = "observability")]
        debug!(
            address = %connection.address(),
            slot = connection.slot(),
            removed = _removed,
            "Evicting connection"
        );

        let connection = connection.clone();
        tokio::spawn(async move {
            if let Err(_e) = connection.close().await {
                #[cfg(feature = "observability")]
                debug!(address = %connection.address(), error = %_e, "Error closing evicted connection");
            }
        });
    }

    /// Closes the pool.
    ///
    /// No acquire succeeds afterwards. Every pooled connection is closed
    /// concurrently, and so is every connection still being dialed; this
    /// returns once all of them have finished closing.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(sweeper) = self.inner.sweeper.lock().take() {
            sweeper.abort();
        }

        let (ready, connecting): (Vec<_>, Vec<_>) = {
            let mut slots = self.inner.slots.lock();
            let mut ready = Vec::new();
            let mut connecting = Vec::new();
            for (_, slot) in slots.drain() {
                match slot {
                    Slot::Ready(connection) => ready.push(connection),
                    Slot::Connecting(tx) => connecting.push(tx.subscribe()),
                }
            }
            (ready, connecting)
        };

        #[cfg(feature = "observability")]
        info!(
            connections = ready.len(),
            dialing = connecting.len(),
            "Closing connection pool"
        );

        let closes = ready.iter().map(|connection| async move {
            if let Err(_e) = connection.close().await {
                #[cfg(feature = "observability")]
                warn!(address = %connection.address(), error = %_e, "Error closing pooled connection");
            }
        });
        let dials = connecting.into_iter().map(|mut rx| async move {
            while rx.borrow_and_update().is_none() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
        futures_util::future::join(join_all(closes), join_all(dials)).await;
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of registered connections across all destinations.
    pub fn size(&self) -> usize {
        self.inner
            .slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Number of registered connections to `address`.
    pub fn connection_count(&self, address: &RemoteAddress) -> usize {
        self.inner
            .slots
            .lock()
            .iter()
            .filter(|(key, slot)| key.address == *address && matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Number of dials started since the pool was created.
    pub fn dial_count(&self) -> u64 {
        self.inner.dials.load(Ordering::Relaxed)
    }

    /// Closes connections idle for longer than `idle_timeout` and returns
    /// how many were evicted. A no-op when no idle timeout is configured.
    pub async fn evict_idle(&self) -> usize {
        let Some(idle_timeout) = self.inner.config.idle_timeout else {
            return 0;
        };

        let expired: Vec<_> = {
            let mut slots = self.inner.slots.lock();
            let keys: Vec<SlotKey> = slots
                .iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Ready(c) if !c.is_open() || c.idle_for() >= idle_timeout => {
                        Some(key.clone())
                    }
                    _ => None,
                })
                .collect();
            keys.iter()
                .filter_map(|key| match slots.remove(key) {
                    Some(Slot::Ready(c)) => Some(c),
                    _ => None,
                })
                .collect()
        };

        let evicted = expired.len();
        join_all(expired.iter().map(|c| c.close())).await;

        #[cfg(feature = "observability")]
        if evicted > 0 {
            debug!(evicted, "Evicted idle connections");
        }
        evicted
    }

    /// Starts a background task calling [`evict_idle`](Self::evict_idle)
    /// periodically. A no-op when no idle timeout is configured or the
    /// sweeper already runs. The task stops when the pool closes or is
    /// dropped.
    pub fn start_idle_sweeper(&self) {
        let Some(idle_timeout) = self.inner.config.idle_timeout else {
            return;
        };
        let mut sweeper = self.inner.sweeper.lock();
        if sweeper.is_some() || self.is_closed() {
            return;
        }

        let period = (idle_timeout / 2).max(Duration::from_millis(10));
        let weak: Weak<PoolInner<C>> = Arc::downgrade(&self.inner);
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let pool = ConnectionPool { inner };
                if pool.is_closed() {
                    break;
                }
                pool.evict_idle().await;
            }
        }));
    }

    fn checkout(&self, address: &RemoteAddress) -> Result<Checkout<C::Connection>, TransportError> {
        let closed = || TransportError::Closed {
            address: address.to_string(),
        };
        if self.is_closed() {
            return Err(closed());
        }

        let per_address = self.inner.config.connections_per_address.max(1);
        let index = self.inner.cursor.fetch_add(1, Ordering::Relaxed) % per_address;
        let key = SlotKey {
            address: address.clone(),
            index,
        };
        let timeout = self.inner.config.connect_timeout;

        let mut slots = self.inner.slots.lock();
        if self.is_closed() {
            return Err(closed());
        }

        match slots.get(&key) {
            Some(Slot::Ready(connection)) if connection.is_open() => {
                connection.checkout();
                return Ok(Checkout::Ready(connection.clone()));
            }
            Some(Slot::Connecting(tx)) => {
                return Ok(Checkout::Pending(ConnectFuture::new(
                    tx.subscribe(),
                    address.clone(),
                    timeout,
                )));
            }
            _ => {}
        }
        let stale = match slots.remove(&key) {
            Some(Slot::Ready(connection)) => Some(connection),
            _ => None,
        };

        let (tx, rx) = watch::channel(None);
        let tx = Arc::new(tx);
        slots.insert(key.clone(), Slot::Connecting(tx.clone()));
        drop(slots);

        if let Some(stale) = stale {
            tokio::spawn(async move {
                let _ = stale.close().await;
            });
        }

        self.inner.dials.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(dial(self.inner.clone(), key, tx));
        Ok(Checkout::Pending(ConnectFuture::new(rx, address.clone(), timeout)))
    }

    /// Marks a freshly dialed connection as borrowed, provided it is still
    /// the registered connection of its slot. The check and the borrow happen
    /// under the slots lock that idle eviction takes.
    fn claim(&self, connection: &Pooled<C>) -> bool {
        let key = SlotKey {
            address: connection.address().clone(),
            index: connection.slot(),
        };
        let slots = self.inner.slots.lock();
        match slots.get(&key) {
            Some(Slot::Ready(current)) if Arc::ptr_eq(current, connection) && connection.is_open() => {
                connection.checkout();
                true
            }
            _ => false,
        }
    }

    fn remove_if_current(&self, connection: &Pooled<C>) -> bool {
        let key = SlotKey {
            address: connection.address().clone(),
            index: connection.slot(),
        };
        let mut slots = self.inner.slots.lock();
        match slots.get(&key) {
            Some(Slot::Ready(current)) if Arc::ptr_eq(current, connection) => {
                slots.remove(&key);
                true
            }
            _ => false,
        }
    }
}

async fn dial<C: Connector>(inner: Arc<PoolInner<C>>, key: SlotKey, tx: ConnectSender<C::Connection>) {
    let connect_timeout = inner.config.connect_timeout;
    let result = match tokio::time::timeout(connect_timeout, inner.connector.connect(&key.address)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            address: key.address.to_string(),
            duration: connect_timeout,
        }),
    };

    let is_ours = |slots: &HashMap<SlotKey, Slot<C::Connection>>| {
        matches!(slots.get(&key), Some(Slot::Connecting(current)) if Arc::ptr_eq(current, &tx))
    };

    let connection = match result {
        Ok(connection) => connection,
        Err(e) => {
            {
                let mut slots = inner.slots.lock();
                if is_ours(&slots) {
                    slots.remove(&key);
                }
            }
            #[cfg(feature = "observability")]
            debug!(address = %key.address, slot = key.index, error = %e, "Dial failed");
            tx.send_replace(Some(Err(e)));
            return;
        }
    };

    let pooled = Arc::new(PooledConnection::new(connection, key.address.clone(), key.index));
    let registered = {
        let mut slots = inner.slots.lock();
        let ours = is_ours(&slots);
        let wanted = ours && !inner.closed.load(Ordering::Acquire) && tx.receiver_count() > 0;
        if wanted {
            slots.insert(key.clone(), Slot::Ready(pooled.clone()));
        } else if ours {
            slots.remove(&key);
        }
        wanted
    };

    if registered {
        #[cfg(feature = "observability")]
        debug!(address = %key.address, slot = key.index, "Connection registered");
        tx.send_replace(Some(Ok(pooled)));
        return;
    }

    #[cfg(feature = "observability")]
    debug!(address = %key.address, slot = key.index, "Closing connection nobody is waiting for");
    if let Err(_e) = pooled.close().await {
        #[cfg(feature = "observability")]
        debug!(address = %key.address, error = %_e, "Error closing orphaned connection");
    }
    tx.send_replace(Some(Err(TransportError::Closed {
        address: key.address.to_string(),
    })));
}

impl<C: Connector> Drop for PoolInner<C> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.abort();
        }
    }
}

impl<C: Connector> fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("size", &self.size())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::{Request, Response};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct MockConnection {
        remote: RemoteAddress,
        closed: Arc<AtomicUsize>,
        healthy: AtomicBool,
    }

    #[async_trait]
    impl Connection for MockConnection {
        fn remote(&self) -> &RemoteAddress {
            &self.remote
        }

        fn is_healthy(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }

        async fn call(&self, request: Request) -> Result<Response, TransportError> {
            Ok(Response::ok(request.request_id, Vec::new()))
        }

        async fn send_oneway(&self, _request: Request) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MockConnector {
        delay: Duration,
        fail: bool,
        dials: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Connection = MockConnection;

        async fn connect(&self, address: &RemoteAddress) -> Result<MockConnection, TransportError> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(TransportError::ConnectionFailed {
                    address: address.to_string(),
                    source: Arc::new(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused")),
                });
            }
            Ok(MockConnection {
                remote: address.clone(),
                closed: self.closed.clone(),
                healthy: AtomicBool::new(true),
            })
        }
    }

    fn single_slot() -> PoolConfig {
        PoolConfig::default().with_connections_per_address(1)
    }

    fn address() -> RemoteAddress {
        RemoteAddress::new("backend", 9000)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_connection_is_reused() {
        let connector = MockConnector::default();
        let pool = ConnectionPool::new(connector.clone(), single_slot());

        let first = pool.acquire(&address()).await.unwrap();
        pool.release(&first);
        let second = pool.acquire(&address()).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.dials.load(Ordering::SeqCst), 1);
        assert_eq!(pool.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slots_are_filled_round_robin() {
        let connector = MockConnector::default();
        let pool = ConnectionPool::new(connector.clone(), PoolConfig::default());

        let a = pool.acquire(&address()).await.unwrap();
        let b = pool.acquire(&address()).await.unwrap();
        let c = pool.acquire(&address()).await.unwrap();

        assert_ne!(a.slot(), b.slot());
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(pool.connection_count(&address()), 2);
        assert_eq!(connector.dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_dial_registers_nothing() {
        let connector = MockConnector {
            fail: true,
            ..Default::default()
        };
        let pool = ConnectionPool::new(connector, single_slot());

        let err = pool.acquire(&address()).await.unwrap_err();
        assert!(err.is_connect_failure());
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dial_bounded_by_connect_timeout() {
        let connector = MockConnector {
            delay: Duration::from_secs(10),
            ..Default::default()
        };
        let pool = ConnectionPool::new(
            connector.clone(),
            single_slot().with_connect_timeout(Duration::from_millis(200)),
        );

        let err = pool.acquire(&address()).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.size(), 0);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_connection_is_replaced() {
        let connector = MockConnector::default();
        let pool = ConnectionPool::new(connector.clone(), single_slot());

        let first = pool.acquire(&address()).await.unwrap();
        first.healthy.store(false, Ordering::SeqCst);
        pool.release(&first);

        let second = pool.acquire(&address()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(connector.dials.load(Ordering::SeqCst), 2);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_waits_for_every_connection() {
        let connector = MockConnector::default();
        let pool = ConnectionPool::new(connector.clone(), PoolConfig::default());
        let other = RemoteAddress::new("other", 9001);

        for target in [address(), address(), other.clone(), other.clone()] {
            pool.acquire(&target).await.unwrap();
        }
        assert_eq!(pool.size(), 4);

        pool.close().await;
        assert_eq!(pool.size(), 0);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 4);
        assert!(matches!(
            pool.acquire(&address()).await,
            Err(TransportError::Closed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_reaps_in_flight_dial() {
        let connector = MockConnector {
            delay: Duration::from_millis(100),
            ..Default::default()
        };
        let pool = ConnectionPool::new(connector.clone(), single_slot());

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(&address()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        pool.close().await;
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
        assert!(waiter.await.unwrap().is_err());
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_idle() {
        let connector = MockConnector::default();
        let pool = ConnectionPool::new(
            connector.clone(),
            single_slot().with_idle_timeout(Some(Duration::from_secs(60))),
        );

        let connection = pool.acquire(&address()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(pool.evict_idle().await, 0, "borrowed connections are never idle");

        pool.release(&connection);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(pool.evict_idle().await, 1);
        assert_eq!(pool.size(), 0);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_checkout_is_borrowed_before_the_lock_is_released() {
        let pool = ConnectionPool::new(
            MockConnector::default(),
            single_slot().with_idle_timeout(Some(Duration::from_secs(60))),
        );
        let connection = pool.acquire(&address()).await.unwrap();
        pool.release(&connection);
        tokio::time::sleep(Duration::from_secs(120)).await;

        let Checkout::Ready(reused) = pool.checkout(&address()).unwrap() else {
            panic!("expected the pooled connection");
        };
        assert_eq!(reused.in_use(), 1);
        assert_eq!(pool.evict_idle().await, 0);
        assert!(reused.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dialed_connection_evicted_before_claim_is_not_handed_out() {
        let connector = MockConnector::default();
        let pool = ConnectionPool::new(
            connector.clone(),
            single_slot().with_idle_timeout(Some(Duration::from_secs(60))),
        );

        let Checkout::Pending(pending) = pool.checkout(&address()).unwrap() else {
            panic!("expected a dial");
        };
        let dialed = pending.await.unwrap();
        assert_eq!(dialed.in_use(), 0);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(pool.evict_idle().await, 1);
        assert!(!pool.claim(&dialed));

        let fresh = pool.acquire(&address()).await.unwrap();
        assert!(!Arc::ptr_eq(&fresh, &dialed));
        assert!(fresh.is_open());
        assert_eq!(fresh.in_use(), 1);
        assert_eq!(connector.dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sweeper_evicts_in_background() {
        let connector = MockConnector::default();
        let pool = ConnectionPool::new(
            connector.clone(),
            single_slot().with_idle_timeout(Some(Duration::from_secs(10))),
        );
        pool.start_idle_sweeper();

        let connection = pool.acquire(&address()).await.unwrap();
        pool.release(&connection);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(pool.size(), 0);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
        pool.close().await;
    }
}
