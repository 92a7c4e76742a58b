use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use crate::clock::{Clock, SystemClock};
use crate::connection::{Advance, Connection, ConnectionConfig, ConnectionHandle};
use crate::error::Error;
use crate::frame::asdu::Asdu;
use crate::handler::{
    ConnectionEventHandler, ConnectionRequestHandler, Plugin, RawMessageHandler, ServerHandler,
};
use crate::params::{APCIParameters, AppLayerParameters};
use crate::queue::{HighPrioQueue, MessageQueue};
use crate::redundancy::{select_group, RedundancyGroup};

/// The three ways a `Slave` can partition connections into redundancy groups: which
/// queues a connection binds to, and the scope activation exclusivity is enforced
/// within.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    SingleRedundancyGroup,
    ConnectionIsRedundancyGroup,
    MultipleRedundancyGroups,
}

/// Identifies the activation scope a connection belongs to: every connection sharing
/// a `scope_id` is mutually exclusive for being active. SINGLE uses a constant scope,
/// MULTIPLE uses the owning group's index, and CONNECTION_IS_REDUNDANCY_GROUP gives
/// every connection its own scope so activation never touches a peer.
type ScopeId = u64;
const SINGLE_SCOPE: ScopeId = 0;

struct ConnEntry {
    handle: Arc<ConnectionHandle>,
    scope_id: ScopeId,
    low_queue: Arc<MessageQueue>,
    high_queue: Arc<HighPrioQueue>,
}

/// Parameters, mode and redundancy groups shared by every connection, held behind an
/// `Arc` so connections can read their configuration without owning the `Slave` that
/// spawned them. Connections read this for configuration; they never hand mutable
/// protocol state back through it.
struct SlaveShared {
    params: APCIParameters,
    al_params: AppLayerParameters,
    mode: ServerMode,
    groups: Vec<RedundancyGroup>,
}

/// Listener, accept policy, connection table, and mode dispatch. Generic over the
/// application's [`ServerHandler`].
pub struct Slave<H> {
    shared: Arc<SlaveShared>,
    handler: Arc<H>,
    clock: Arc<dyn Clock>,
    connections: Arc<Mutex<Vec<ConnEntry>>>,
    open_count: Arc<AtomicUsize>,
    max_open_connections: AtomicUsize,
    next_scope_id: AtomicU64,
    connection_request_handler: Option<Arc<dyn ConnectionRequestHandler>>,
    connection_event_handler: Option<Arc<dyn ConnectionEventHandler>>,
    raw_message_handler: Option<Arc<dyn RawMessageHandler>>,
    plugins: Vec<Arc<dyn Plugin>>,
    running: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
}

impl<H> Slave<H>
where
    H: ServerHandler + Send + Sync + 'static,
{
    pub fn new(handler: H, params: APCIParameters, al_params: AppLayerParameters) -> Self {
        Slave {
            shared: Arc::new(SlaveShared {
                params,
                al_params,
                mode: ServerMode::SingleRedundancyGroup,
                groups: vec![RedundancyGroup::new(None, 1000, 100, None)],
            }),
            handler: Arc::new(handler),
            clock: Arc::new(SystemClock),
            connections: Arc::new(Mutex::new(Vec::new())),
            open_count: Arc::new(AtomicUsize::new(0)),
            max_open_connections: AtomicUsize::new(0),
            next_scope_id: AtomicU64::new(1),
            connection_request_handler: None,
            connection_event_handler: None,
            raw_message_handler: None,
            plugins: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(Notify::new()),
        }
    }

    /// Switch server mode and supply the redundancy groups it needs. SINGLE and
    /// CONNECTION_IS_GROUP ignore `groups` (SINGLE gets one implicit catch-all group;
    /// CONNECTION_IS_GROUP allocates a fresh pair per connection instead).
    pub fn set_server_mode(&mut self, mode: ServerMode, groups: Vec<RedundancyGroup>) {
        let groups = match mode {
            ServerMode::SingleRedundancyGroup => {
                vec![RedundancyGroup::new(None, 1000, 100, None)]
            }
            ServerMode::ConnectionIsRedundancyGroup => Vec::new(),
            ServerMode::MultipleRedundancyGroups => groups,
        };
        self.shared = Arc::new(SlaveShared {
            params: self.shared.params,
            al_params: self.shared.al_params,
            mode,
            groups,
        });
    }

    pub fn set_max_open_connections(&self, max: usize) {
        self.max_open_connections.store(max, Ordering::SeqCst);
    }

    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    pub fn set_connection_request_handler(&mut self, handler: Arc<dyn ConnectionRequestHandler>) {
        self.connection_request_handler = Some(handler);
    }

    pub fn set_connection_event_handler(&mut self, handler: Arc<dyn ConnectionEventHandler>) {
        self.connection_event_handler = Some(handler);
    }

    pub fn set_raw_message_handler(&mut self, handler: Arc<dyn RawMessageHandler>) {
        self.raw_message_handler = Some(handler);
    }

    pub fn add_plugin(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn connection_parameters(&self) -> APCIParameters {
        self.shared.params
    }

    pub fn app_layer_parameters(&self) -> AppLayerParameters {
        self.shared.al_params
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    fn admits(&self) -> bool {
        let max = self.max_open_connections.load(Ordering::SeqCst);
        max == 0 || self.open_count.load(Ordering::SeqCst) < max
    }

    /// Routes an outgoing ASDU per mode: SINGLE goes to the one shared queue, MULTIPLE
    /// broadcasts to every named group, CONNECTION_IS_GROUP broadcasts to every
    /// currently open connection's own queue.
    pub fn enqueue_asdu(&self, asdu: Asdu) {
        let now = self.clock.now_ms();
        match self.shared.mode {
            ServerMode::SingleRedundancyGroup | ServerMode::MultipleRedundancyGroups => {
                for group in &self.shared.groups {
                    group.low_queue.enqueue(asdu.clone(), now);
                }
            }
            ServerMode::ConnectionIsRedundancyGroup => {
                let connections = self.connections.lock().unwrap();
                for entry in connections.iter() {
                    entry.low_queue.enqueue(asdu.clone(), now);
                }
            }
        }
    }

    /// Deactivates every other peer sharing `scope_id`, then activates `target`,
    /// enforcing at most one ACTIVE connection per scope.
    fn activate(&self, target: &Arc<ConnectionHandle>, scope_id: ScopeId) {
        let connections = self.connections.lock().unwrap();
        for entry in connections.iter() {
            if entry.scope_id == scope_id && !Arc::ptr_eq(&entry.handle, target) {
                entry.handle.deactivate();
            }
        }
        drop(connections);
        // `Connection::on_frame` sets `is_active` itself right after calling
        // `on_activate`; nothing further to do here besides the exclusivity sweep.
    }

    fn resolve_queues(
        &self,
        peer: SocketAddr,
    ) -> Option<(ScopeId, Arc<MessageQueue>, Arc<HighPrioQueue>)> {
        match self.shared.mode {
            ServerMode::SingleRedundancyGroup => {
                let group = self.shared.groups.first()?;
                Some((SINGLE_SCOPE, group.low_queue.clone(), group.high_queue.clone()))
            }
            ServerMode::ConnectionIsRedundancyGroup => {
                let scope = self.next_scope_id.fetch_add(1, Ordering::SeqCst);
                Some((
                    scope,
                    Arc::new(MessageQueue::new(1000)),
                    Arc::new(HighPrioQueue::new(100)),
                ))
            }
            ServerMode::MultipleRedundancyGroups => {
                let selected = select_group(&self.shared.groups, &peer.ip())?;
                let selected_ptr = selected as *const RedundancyGroup;
                let idx = self
                    .shared
                    .groups
                    .iter()
                    .position(|g| std::ptr::eq(g as *const RedundancyGroup, selected_ptr))?;
                let group = &self.shared.groups[idx];
                Some((idx as ScopeId, group.low_queue.clone(), group.high_queue.clone()))
            }
        }
    }

    fn peer_accepted(&self, peer: SocketAddr) -> bool {
        if let Some(gate) = &self.connection_request_handler {
            gate.accept(peer.ip())
        } else {
            true
        }
    }
}

impl<H> Slave<H>
where
    H: ServerHandler + Send + Sync + 'static,
{
    /// Threaded accept loop: one acceptor task plus one `tokio::spawn`ed task per
    /// connection.
    pub async fn start(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        self.running.store(true, Ordering::SeqCst);
        loop {
            tokio::select! {
                _ = self.stop_notify.notified() => {
                    self.running.store(false, Ordering::SeqCst);
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    Self::spawn_connection(&self, stream, peer);
                }
            }
        }
    }

    pub fn stop(&self) {
        self.stop_notify.notify_one();
        let connections = self.connections.lock().unwrap();
        for entry in connections.iter() {
            entry.handle.close();
        }
    }

    fn spawn_connection(slave: &Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        if !slave.admits() {
            log::debug!("[{peer}] rejected: server at max_open_connections");
            return;
        }
        if !slave.peer_accepted(peer) {
            log::debug!("[{peer}] rejected by connection request handler");
            return;
        }
        let Some((scope_id, low_queue, high_queue)) = slave.resolve_queues(peer) else {
            log::debug!("[{peer}] rejected: no matching redundancy group");
            return;
        };

        let handle = ConnectionHandle::new(peer);
        slave.connections.lock().unwrap().push(ConnEntry {
            handle: handle.clone(),
            scope_id,
            low_queue: low_queue.clone(),
            high_queue: high_queue.clone(),
        });
        slave.open_count.fetch_add(1, Ordering::SeqCst);

        let on_activate_slave = slave.clone();
        let on_activate_handle = handle.clone();
        let on_activate: Arc<dyn Fn() + Send + Sync> =
            Arc::new(move || on_activate_slave.activate(&on_activate_handle, scope_id));

        let config = ConnectionConfig {
            handle: handle.clone(),
            on_activate,
            low_queue,
            high_queue,
            params: slave.shared.params,
            clock: slave.clock.clone(),
            handler: slave.handler.clone(),
            event_handler: slave.connection_event_handler.clone(),
            raw_handler: slave.raw_message_handler.clone(),
            plugins: slave.plugins.clone(),
        };
        let close_notify = Arc::new(Notify::new());
        let connection = Connection::new(config, stream);

        let connections = slave.connections.clone();
        let open_count = slave.open_count.clone();
        tokio::spawn(async move {
            let _ = connection.run(close_notify).await;
            connections.lock().unwrap().retain(|e| !Arc::ptr_eq(&e.handle, &handle));
            open_count.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

/// Threadless (cooperative) driver: the application drives `tick()` itself, no
/// `tokio::spawn` anywhere. Holds the listener and every open connection's
/// state directly so one `tick` can perform a bounded accept attempt plus a bounded
/// read/timeout/drain pass per connection, all within the caller's own task.
pub struct SlaveDriver<H> {
    slave: Arc<Slave<H>>,
    listener: TcpListener,
    live: Vec<(Arc<ConnectionHandle>, Connection<H, TcpStream>)>,
}

impl<H> SlaveDriver<H>
where
    H: ServerHandler + Send + Sync + 'static,
{
    pub fn new(slave: Arc<Slave<H>>, listener: TcpListener) -> Self {
        slave.running.store(true, Ordering::SeqCst);
        SlaveDriver {
            slave,
            listener,
            live: Vec::new(),
        }
    }

    /// One non-blocking accept attempt, then one bounded read + timeout + drain pass
    /// per open connection.
    pub async fn tick(&mut self) -> io::Result<()> {
        if let Some(accepted) = self.listener.accept().now_or_never() {
            let (stream, peer) = accepted?;
            self.accept(stream, peer);
        }

        let mut closed = Vec::new();
        for (handle, connection) in self.live.iter_mut() {
            if let Advance::Closed(reason) = connection.tick().await {
                log::debug!("[{}] threadless tick closed: {reason}", handle.peer);
                closed.push(handle.clone());
            }
        }
        if !closed.is_empty() {
            self.live
                .retain(|(handle, _)| !closed.iter().any(|h| Arc::ptr_eq(h, handle)));
            let mut connections = self.slave.connections.lock().unwrap();
            connections.retain(|e| !closed.iter().any(|h| Arc::ptr_eq(h, &e.handle)));
            self.slave
                .open_count
                .fetch_sub(closed.len(), Ordering::SeqCst);
        }
        Ok(())
    }

    fn accept(&mut self, stream: TcpStream, peer: SocketAddr) {
        if !self.slave.admits() || !self.slave.peer_accepted(peer) {
            log::debug!("[{peer}] rejected by threadless driver");
            return;
        }
        let Some((scope_id, low_queue, high_queue)) = self.slave.resolve_queues(peer) else {
            log::debug!("[{peer}] rejected: no matching redundancy group");
            return;
        };

        let handle = ConnectionHandle::new(peer);
        self.slave.connections.lock().unwrap().push(ConnEntry {
            handle: handle.clone(),
            scope_id,
            low_queue: low_queue.clone(),
            high_queue: high_queue.clone(),
        });
        self.slave.open_count.fetch_add(1, Ordering::SeqCst);

        let slave = self.slave.clone();
        let on_activate_handle = handle.clone();
        let on_activate: Arc<dyn Fn() + Send + Sync> =
            Arc::new(move || slave.activate(&on_activate_handle, scope_id));

        let config = ConnectionConfig {
            handle: handle.clone(),
            on_activate,
            low_queue,
            high_queue,
            params: self.slave.shared.params,
            clock: self.slave.clock.clone(),
            handler: self.slave.handler.clone(),
            event_handler: self.slave.connection_event_handler.clone(),
            raw_handler: self.slave.raw_message_handler.clone(),
            plugins: self.slave.plugins.clone(),
        };
        let connection = Connection::new(config, stream);
        self.live.push((handle, connection));
    }

    pub fn stop(self) {
        self.slave.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::asdu::{CauseOfTransmission, Identifier, TypeID, VariableStruct};
    use crate::frame::asdu::Cause;
    use bit_struct::*;
    use bytes::Bytes;
    use futures::future::BoxFuture;
    use std::net::{IpAddr, Ipv4Addr};

    struct NullHandler;

    impl ServerHandler for NullHandler {
        type Future = BoxFuture<'static, Result<Vec<Asdu>, Error>>;

        fn call_interrogation(
            &self,
            _asdu: Asdu,
            _qoi: crate::frame::csys::ObjectQOI,
        ) -> Self::Future {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn call_counter_interrogation(
            &self,
            _asdu: Asdu,
            _qcc: crate::frame::csys::ObjectQCC,
        ) -> Self::Future {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn call_read(&self, _asdu: Asdu) -> Self::Future {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn call_clock_sync(&self, _asdu: Asdu, _time: chrono::DateTime<chrono::Utc>) -> Self::Future {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn call_reset_process(&self, _asdu: Asdu, _qrp: crate::frame::csys::ObjectQRP) -> Self::Future {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn call_delay_acquisition(&self, _asdu: Asdu, _msec: u16) -> Self::Future {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn call(&self, _asdu: Asdu) -> Self::Future {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    fn test_asdu() -> Asdu {
        Asdu {
            identifier: Identifier {
                type_id: TypeID::M_SP_NA_1,
                vsq: VariableStruct::new(u1::new(0).unwrap(), u7::new(1).unwrap()),
                cot: CauseOfTransmission::new(false, true, Cause::Spontaneous),
                common_addr: 1,
            },
            raw: Bytes::new(),
        }
    }

    #[test]
    fn admits_unlimited_when_max_is_zero() {
        let slave = Slave::new(NullHandler, APCIParameters::default(), AppLayerParameters::default());
        slave.open_count.store(10_000, Ordering::SeqCst);
        assert!(slave.admits());
        slave.set_max_open_connections(5);
        assert!(!slave.admits());
    }

    #[test]
    fn single_mode_enqueue_reaches_the_shared_group_queue() {
        let slave = Slave::new(NullHandler, APCIParameters::default(), AppLayerParameters::default());
        slave.enqueue_asdu(test_asdu());
        assert_eq!(slave.shared.groups[0].low_queue.len(), 1);
    }

    #[test]
    fn resolve_queues_shares_the_same_arc_across_connections() {
        let slave = Slave::new(NullHandler, APCIParameters::default(), AppLayerParameters::default());
        let peer_a = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 2404);
        let peer_b = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 2404);
        let (_, low_a, _) = slave.resolve_queues(peer_a).unwrap();
        let (_, low_b, _) = slave.resolve_queues(peer_b).unwrap();
        assert!(Arc::ptr_eq(&low_a, &low_b));
    }
}
