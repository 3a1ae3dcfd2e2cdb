//! The agent side of the proxy link.
//!
//! One reader task owns `recv_from` and feeds a queue drained by a pool of
//! worker tasks. Each worker decodes a datagram, checks where it came from
//! and dispatches it by type. While the session is `Ready` a keepalive task
//! pings the proxy once per interval and drops the session when a ping
//! goes unanswered.

use std::future::pending;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use yate_proto::{BlockPos, IntoBlockPos, Message, MsgType, Value, VoxelRecord};

use crate::config::ClientSection;
use crate::error::ClientError;
use crate::state::{ConnectionState, Session};
use crate::world::{VisualWindow, WorldModel};

type Datagram = (Bytes, SocketAddr);

pub type ConnectCallback = Box<dyn Fn() + Send + Sync>;
pub type VoxelCallback = Box<dyn Fn(&VoxelRecord) + Send + Sync>;
pub type AvatarCallback = Box<dyn Fn(BlockPos) + Send + Sync>;

/// Notification hooks. They run on worker or keepalive tasks, never while a
/// client lock is held, so they may call back into the client.
#[derive(Default)]
pub struct Callbacks {
    on_connect: Option<ConnectCallback>,
    on_disconnect: Option<ConnectCallback>,
    on_voxel_update: Option<VoxelCallback>,
    on_avatar_pos: Option<AvatarCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Box::new(f));
        self
    }

    /// Fired once each time a `Ready` session ends, by timeout or `stop`.
    pub fn on_disconnect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Box::new(f));
        self
    }

    pub fn on_voxel_update(mut self, f: impl Fn(&VoxelRecord) + Send + Sync + 'static) -> Self {
        self.on_voxel_update = Some(Box::new(f));
        self
    }

    pub fn on_avatar_pos(mut self, f: impl Fn(BlockPos) + Send + Sync + 'static) -> Self {
        self.on_avatar_pos = Some(Box::new(f));
        self
    }

    fn connected(&self) {
        if let Some(f) = &self.on_connect {
            f();
        }
    }

    fn disconnected(&self) {
        if let Some(f) = &self.on_disconnect {
            f();
        }
    }

    fn voxel_updated(&self, record: &VoxelRecord) {
        if let Some(f) = &self.on_voxel_update {
            f(record);
        }
    }

    fn avatar_moved(&self, pos: BlockPos) {
        if let Some(f) = &self.on_avatar_pos {
            f(pos);
        }
    }
}

/// Cancels a pending [`YateClient::get_voxel`] from another task.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounds on a blocking voxel query. With neither set, a proxy that never
/// answers stalls the caller indefinitely.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub deadline: Option<Instant>,
    pub cancel: Option<CancelHandle>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Tasks spawned for one connection attempt.
struct Connection {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

struct Shared {
    /// The socket of the current session. Closed by `stop`, and replaced when
    /// a session that ended on its own is redialled, so datagrams addressed
    /// to an old session never reach a new one.
    socket: Mutex<Option<Arc<UdpSocket>>>,
    config: ClientSection,
    session: Mutex<Session>,
    world: Mutex<WorldModel>,
    /// Woken after every stored voxel update.
    world_changed: Notify,
    callbacks: Callbacks,
    connection: Mutex<Option<Connection>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn next_id() -> i64 {
    rand::random::<u32>() as i64
}

/// Handle to the agent's link with a proxy. Cheap to clone.
#[derive(Clone)]
pub struct YateClient {
    shared: Arc<Shared>,
}

impl YateClient {
    /// Bind the local socket. Nothing is sent until [`connect`](Self::connect).
    /// The socket is closed by [`stop`](Self::stop); a later `connect` binds a
    /// new one from the same configuration.
    pub async fn bind(config: ClientSection) -> Result<Self, ClientError> {
        Self::bind_with_callbacks(config, Callbacks::default()).await
    }

    pub async fn bind_with_callbacks(
        config: ClientSection,
        callbacks: Callbacks,
    ) -> Result<Self, ClientError> {
        let socket = bind_socket(&config).await?;

        Ok(Self {
            shared: Arc::new(Shared {
                socket: Mutex::new(Some(socket)),
                config,
                session: Mutex::new(Session::new()),
                world: Mutex::new(WorldModel::new()),
                world_changed: Notify::new(),
                callbacks,
                connection: Mutex::new(None),
            }),
        })
    }

    /// Address of the current socket. `NotConnected` once stopped.
    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.shared.socket()?.local_addr()?)
    }

    /// Start the reader and workers and send `connect` to `addr`. Only valid
    /// while disconnected.
    pub async fn connect(&self, addr: SocketAddr) -> Result<(), ClientError> {
        {
            let mut session = lock(&self.shared.session);
            if session.state != ConnectionState::Disconnected {
                return Err(ClientError::AlreadyConnected(session.state));
            }
            session.state = ConnectionState::Connecting;
            session.peer = Some(addr);
            session.connect_id = None;
            session.acked.clear();
        }
        // Tasks of a session that timed out are already winding down. Its
        // socket may still hold that session's datagrams, so it goes too.
        let stale = lock(&self.shared.connection).take();
        if let Some(stale) = stale {
            join_all(stale.tasks).await;
            lock(&self.shared.socket).take();
        }
        let idle = lock(&self.shared.socket).clone();
        let socket = match idle {
            Some(socket) => socket,
            None => match bind_socket(&self.shared.config).await {
                Ok(socket) => {
                    *lock(&self.shared.socket) = Some(socket.clone());
                    socket
                }
                Err(e) => {
                    let mut session = lock(&self.shared.session);
                    session.disconnect();
                    session.peer = None;
                    return Err(e);
                }
            },
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let queue_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));

        let workers = self.shared.config.workers.max(1);
        let mut tasks = Vec::with_capacity(workers + 2);
        tasks.push(tokio::spawn(read_loop(
            socket,
            self.shared.config.recv_buffer_size,
            queue_tx,
            shutdown_rx.clone(),
        )));
        for worker in 0..workers {
            tasks.push(tokio::spawn(worker_loop(
                self.shared.clone(),
                queue_rx.clone(),
                shutdown_rx.clone(),
                worker,
            )));
        }
        *lock(&self.shared.connection) = Some(Connection {
            shutdown: shutdown_tx,
            tasks,
        });

        let id = next_id();
        if let Err(e) = self
            .shared
            .send_with_id(MsgType::Connect, Vec::new(), id, addr)
            .await
        {
            self.stop().await;
            return Err(e);
        }
        lock(&self.shared.session).connect_id = Some(id);
        info!("Connecting to proxy at {addr}");
        Ok(())
    }

    /// Tear down the session, wait for every task to exit and close the
    /// socket. Fires on-disconnect if the session was `Ready`.
    pub async fn stop(&self) {
        let connection = lock(&self.shared.connection).take();
        if let Some(conn) = &connection {
            conn.shutdown.send_replace(true);
        }
        let was_ready = {
            let mut session = lock(&self.shared.session);
            let was_ready = session.disconnect();
            session.peer = None;
            session.connect_id = None;
            was_ready
        };
        if was_ready {
            info!("Disconnected from proxy");
            self.shared.callbacks.disconnected();
        }
        if let Some(conn) = connection {
            join_all(conn.tasks).await;
        }
        if lock(&self.shared.socket).take().is_some() {
            debug!("Socket closed");
        }
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.shared.session).state
    }

    /// Whether the proxy has acknowledged the connection.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        lock(&self.shared.session).peer
    }

    // -----------------------------------------------------------------------
    // World snapshots
    // -----------------------------------------------------------------------

    pub fn avatar_pos(&self) -> BlockPos {
        lock(&self.shared.world).avatar_pos()
    }

    pub fn visual_window(&self) -> VisualWindow {
        lock(&self.shared.world).window()
    }

    pub fn visual_range(&self) -> [i32; 3] {
        lock(&self.shared.world).visual_range()
    }

    pub fn known_voxel(&self, pos: impl IntoBlockPos) -> Option<VoxelRecord> {
        lock(&self.shared.world).voxel(pos)
    }

    pub fn known_voxel_count(&self) -> usize {
        lock(&self.shared.world).voxels().len()
    }

    pub fn last_update(&self) -> f64 {
        lock(&self.shared.world).last_update()
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Send a message of any registered type to the proxy. Returns its id.
    pub async fn send(&self, msg_type: MsgType, params: Vec<Value>) -> Result<i64, ClientError> {
        let peer = self.peer().ok_or(ClientError::NotConnected)?;
        self.shared.send_message(msg_type, params, peer).await
    }

    pub async fn send_by_name(&self, name: &str, params: Vec<Value>) -> Result<i64, ClientError> {
        let msg_type = MsgType::from_name(name)
            .ok_or_else(|| ClientError::InvalidParams(format!("unknown message type {name:?}")))?;
        self.send(msg_type, params).await
    }

    /// Ask the proxy for everything that changed since the last update.
    pub async fn refresh_visual(&self) -> Result<i64, ClientError> {
        let since = self.last_update();
        self.send(MsgType::RequestVisual, vec![Value::Float(since)]).await
    }

    /// Ask the proxy to resend one voxel without waiting for it.
    pub async fn refresh_voxel(&self, pos: impl IntoBlockPos) -> Result<i64, ClientError> {
        let pos = pos.into_block_pos();
        self.send(MsgType::RequestVoxel, vec![pos.into()]).await
    }

    /// Look up a voxel. Known voxels return at once. Unknown voxels inside
    /// the visual window are requested from the proxy and awaited; unknown
    /// voxels outside it come back as an `Unknown` record without a request.
    pub async fn get_voxel(
        &self,
        pos: impl IntoBlockPos,
        options: QueryOptions,
    ) -> Result<VoxelRecord, ClientError> {
        let pos = pos.into_block_pos();
        {
            let world = lock(&self.shared.world);
            if let Some(record) = world.voxel(pos) {
                return Ok(record);
            }
            if !world.is_visible(pos) {
                return Ok(VoxelRecord::unknown(pos));
            }
        }
        let peer = self.peer().ok_or(ClientError::NotConnected)?;

        let arrival = async {
            let notified = self.shared.world_changed.notified();
            tokio::pin!(notified);
            // Register before sending so a fast reply cannot slip past.
            notified.as_mut().enable();
            if let Err(e) = self
                .shared
                .send_message(MsgType::RequestVoxel, vec![pos.into()], peer)
                .await
            {
                return Err(e);
            }
            loop {
                let known = lock(&self.shared.world).voxel(pos);
                if let Some(record) = known {
                    return Ok(record);
                }
                notified.as_mut().await;
                notified.set(self.shared.world_changed.notified());
                notified.as_mut().enable();
            }
        };
        let deadline = async {
            match options.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending().await,
            }
        };
        let cancelled = async {
            match &options.cancel {
                Some(cancel) => cancel.cancelled().await,
                None => pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(ClientError::QueryCancelled(pos)),
            _ = deadline => Err(ClientError::QueryTimedOut(pos)),
            result = arrival => result,
        }
    }
}

async fn bind_socket(config: &ClientSection) -> Result<Arc<UdpSocket>, ClientError> {
    let socket = UdpSocket::bind(&config.bind_address).await?;
    info!("YATE client bound on {}", socket.local_addr()?);
    Ok(Arc::new(socket))
}

impl Shared {
    fn socket(&self) -> Result<Arc<UdpSocket>, ClientError> {
        lock(&self.socket).clone().ok_or(ClientError::NotConnected)
    }

    async fn send_message(
        &self,
        msg_type: MsgType,
        params: Vec<Value>,
        dest: SocketAddr,
    ) -> Result<i64, ClientError> {
        let id = next_id();
        self.send_with_id(msg_type, params, id, dest).await?;
        Ok(id)
    }

    async fn send_with_id(
        &self,
        msg_type: MsgType,
        params: Vec<Value>,
        id: i64,
        dest: SocketAddr,
    ) -> Result<(), ClientError> {
        let socket = self.socket()?;
        let msg = Message::new(msg_type, params, id);
        socket.send_to(&msg.to_bytes(), dest).await?;
        trace!("Sent {msg} to {dest}");
        Ok(())
    }

    /// Flag the current connection's tasks to exit without waiting for them.
    fn signal_shutdown(&self) {
        if let Some(conn) = lock(&self.connection).as_ref() {
            conn.shutdown.send_replace(true);
        }
    }
}

async fn join_all(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        if let Err(e) = task.await {
            warn!("Client task ended abnormally: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Reader and workers
// ---------------------------------------------------------------------------

async fn read_loop(
    socket: Arc<UdpSocket>,
    buf_size: usize,
    queue: mpsc::UnboundedSender<Datagram>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut recv_buf = vec![0u8; buf_size];
    loop {
        tokio::select! {
            result = socket.recv_from(&mut recv_buf) => {
                match result {
                    Ok((len, addr)) => {
                        let payload = Bytes::copy_from_slice(&recv_buf[..len]);
                        if queue.send((payload, addr)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("UDP recv error: {e}"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("Reader stopped");
}

async fn worker_loop(
    shared: Arc<Shared>,
    queue: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>>,
    mut shutdown: watch::Receiver<bool>,
    worker: usize,
) {
    loop {
        let next = tokio::select! {
            item = async { queue.lock().await.recv().await } => item,
            _ = shutdown.changed() => break,
        };
        let Some((payload, src)) = next else { break };
        if let Err(e) = handle_datagram(&shared, &payload, src).await {
            debug!("Worker {worker}: dropped datagram from {src}: {e}");
        }
    }
    trace!("Worker {worker} stopped");
}

async fn handle_datagram(
    shared: &Arc<Shared>,
    data: &[u8],
    src: SocketAddr,
) -> Result<(), ClientError> {
    let msg = Message::decode(data)?;

    let peer = lock(&shared.session).peer;
    if peer != Some(src) {
        shared
            .send_message(MsgType::UnknownPeer, Vec::new(), src)
            .await?;
        return Err(ClientError::PeerMismatch {
            expected: peer,
            got: src,
        });
    }

    let Some(msg_type) = msg.msg_type() else {
        warn!("Unknown message type {} from {src}", msg.code);
        return Ok(());
    };
    trace!("Received {msg} from {src}");

    if msg_type != MsgType::ConnectAck {
        let mut session = lock(&shared.session);
        if session.state == ConnectionState::Connecting {
            session.state = ConnectionState::ConnectedUnready;
            debug!("Proxy at {src} is talking before acknowledging");
        }
    }

    match msg_type {
        MsgType::ConnectAck => {
            if enter_ready(shared) {
                info!("Connected to proxy at {src}");
                shared.callbacks.connected();
            }
        }
        MsgType::Keepalive => {
            shared
                .send_with_id(MsgType::KeepaliveAck, vec![Value::Int(msg.id)], next_id(), src)
                .await?;
        }
        MsgType::KeepaliveAck => {
            let id = msg
                .params
                .first()
                .and_then(Value::as_i64)
                .ok_or_else(|| ClientError::InvalidParams("keepalive_ack without an id".into()))?;
            lock(&shared.session).acked.insert(id);
        }
        MsgType::VisualRange => {
            let size = parse_triple(&msg.params)?;
            let mut world = lock(&shared.world);
            if let Err(e) = world.set_visual_range(size) {
                error!("Rejected visual range from proxy: {e}");
                return Err(e);
            }
            world.mark_updated();
        }
        MsgType::VoxelUpdate => {
            let record = VoxelRecord::from_params(&msg.params)?;
            {
                let mut world = lock(&shared.world);
                if !world.set_voxel(record) {
                    return Err(ClientError::InvalidParams(format!(
                        "voxel {} is outside the storable height range",
                        record.pos()
                    )));
                }
                world.mark_updated();
            }
            shared.world_changed.notify_waiters();
            shared.callbacks.voxel_updated(&record);
        }
        MsgType::AvatarPos => {
            let pos = parse_position(&msg.params)?;
            let voxel = {
                let mut world = lock(&shared.world);
                let voxel = world.set_avatar_pos(pos)?;
                world.mark_updated();
                voxel
            };
            shared.callbacks.avatar_moved(voxel);
        }
        other => warn!("Ignoring {other} from proxy"),
    }
    Ok(())
}

/// `[x, y, z]` with integer or float components, kept unfloored.
fn parse_position(params: &[Value]) -> Result<(f64, f64, f64), ClientError> {
    match params {
        [x, y, z] => match (x.as_f64(), y.as_f64(), z.as_f64()) {
            (Some(x), Some(y), Some(z)) => Ok((x, y, z)),
            _ => Err(ClientError::InvalidParams(format!(
                "expected three numbers, got {}",
                Value::Array(params.to_vec())
            ))),
        },
        _ => Err(ClientError::InvalidParams(format!(
            "expected three params, got {}",
            params.len()
        ))),
    }
}

fn parse_triple(params: &[Value]) -> Result<[i32; 3], ClientError> {
    match params {
        [x, y, z] => match (x.as_i32(), y.as_i32(), z.as_i32()) {
            (Some(x), Some(y), Some(z)) => Ok([x, y, z]),
            _ => Err(ClientError::InvalidParams(format!(
                "expected three integers, got {}",
                Value::Array(params.to_vec())
            ))),
        },
        _ => Err(ClientError::InvalidParams(format!(
            "expected three params, got {}",
            params.len()
        ))),
    }
}

/// Move to `Ready` and start the keepalive task. Returns `false` if the
/// session was already ready or is shutting down.
fn enter_ready(shared: &Arc<Shared>) -> bool {
    // Lock order: connection, then session.
    let mut connection = lock(&shared.connection);
    let Some(conn) = connection.as_mut() else {
        return false;
    };
    if *conn.shutdown.borrow() {
        return false;
    }
    let epoch = {
        let mut session = lock(&shared.session);
        if session.state == ConnectionState::Ready {
            return false;
        }
        session.state = ConnectionState::Ready;
        session.epoch += 1;
        session.acked.clear();
        session.epoch
    };
    conn.tasks.push(tokio::spawn(keepalive_loop(
        shared.clone(),
        epoch,
        conn.shutdown.subscribe(),
    )));
    true
}

// ---------------------------------------------------------------------------
// Keepalive
// ---------------------------------------------------------------------------

async fn keepalive_loop(shared: Arc<Shared>, epoch: u64, mut shutdown: watch::Receiver<bool>) {
    let interval = shared.config.keepalive_interval();
    let mut last_keepalive: Option<i64> = None;

    loop {
        let peer = {
            let mut session = lock(&shared.session);
            if !session.is_ready(epoch) {
                break;
            }
            if let Some(id) = last_keepalive {
                session.acked.remove(&id);
            }
            session.peer
        };
        let Some(peer) = peer else { break };

        let keepalive_id = next_id();
        if let Err(e) = shared
            .send_with_id(MsgType::Keepalive, Vec::new(), keepalive_id, peer)
            .await
        {
            warn!("Failed to send keepalive to {peer}: {e}");
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }

        let was_ready = {
            let mut session = lock(&shared.session);
            if !session.is_ready(epoch) {
                break;
            }
            if session.acked.contains(&keepalive_id) {
                None
            } else {
                Some(session.disconnect())
            }
        };
        match was_ready {
            None => last_keepalive = Some(keepalive_id),
            Some(was_ready) => {
                warn!("{}", ClientError::LivenessTimeout { keepalive_id });
                shared.signal_shutdown();
                if was_ready {
                    shared.callbacks.disconnected();
                }
                break;
            }
        }
    }
    trace!("Keepalive for session {epoch} stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use yate_proto::{ActiveState, BasicType, IntactState};

    const RECV_WAIT: Duration = Duration::from_secs(2);

    struct FakeProxy {
        socket: UdpSocket,
    }

    impl FakeProxy {
        async fn bind() -> Self {
            Self {
                socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            }
        }

        fn addr(&self) -> SocketAddr {
            self.socket.local_addr().unwrap()
        }

        async fn try_recv(&self, wait: Duration) -> Option<(Message, SocketAddr)> {
            let mut buf = vec![0u8; 2048];
            let (len, from) = tokio::time::timeout(wait, self.socket.recv_from(&mut buf))
                .await
                .ok()?
                .unwrap();
            Some((Message::decode(&buf[..len]).unwrap(), from))
        }

        /// Next message of `msg_type`, skipping anything else.
        async fn try_recv_type(&self, msg_type: MsgType, wait: Duration) -> Option<(Message, SocketAddr)> {
            let until = Instant::now() + wait;
            loop {
                let left = until.saturating_duration_since(Instant::now());
                let (msg, from) = self.try_recv(left).await?;
                if msg.msg_type() == Some(msg_type) {
                    return Some((msg, from));
                }
            }
        }

        async fn recv_type(&self, msg_type: MsgType) -> (Message, SocketAddr) {
            self.try_recv_type(msg_type, RECV_WAIT)
                .await
                .unwrap_or_else(|| panic!("no {msg_type} received"))
        }

        async fn send(&self, msg_type: MsgType, params: Vec<Value>, to: SocketAddr) {
            let msg = Message::new(msg_type, params, next_id());
            self.socket.send_to(&msg.to_bytes(), to).await.unwrap();
        }
    }

    fn test_config(keepalive_interval_ms: u64) -> ClientSection {
        ClientSection {
            workers: 4,
            keepalive_interval_ms,
            ..ClientSection::default()
        }
    }

    async fn eventually(what: &str, check: impl Fn() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    async fn ready_client(proxy: &FakeProxy, callbacks: Callbacks, keepalive_ms: u64) -> YateClient {
        let client = YateClient::bind_with_callbacks(test_config(keepalive_ms), callbacks)
            .await
            .unwrap();
        client.connect(proxy.addr()).await.unwrap();
        let (_, from) = proxy.recv_type(MsgType::Connect).await;
        proxy.send(MsgType::ConnectAck, vec![], from).await;
        eventually("ready", || client.is_connected()).await;
        client
    }

    fn ints(values: [i64; 3]) -> Vec<Value> {
        values.iter().map(|&v| Value::Int(v)).collect()
    }

    /// Window (96,60,96)-(104,68,104) around an avatar at (100,64,100).
    async fn with_window(client: &YateClient, proxy: &FakeProxy) {
        let to = client.local_addr().unwrap();
        proxy.send(MsgType::VisualRange, ints([8, 8, 8]), to).await;
        eventually("visual range", || client.visual_range() == [8, 8, 8]).await;
        proxy.send(MsgType::AvatarPos, ints([100, 64, 100]), to).await;
        eventually("avatar", || client.avatar_pos() == BlockPos::new(100, 64, 100)).await;
    }

    #[tokio::test]
    async fn connect_handshake() {
        let proxy = FakeProxy::bind().await;
        let connects = counter();
        let seen = connects.clone();
        let client = YateClient::bind_with_callbacks(
            test_config(60_000),
            Callbacks::new().on_connect(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await
        .unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);

        client.connect(proxy.addr()).await.unwrap();
        assert_eq!(client.state(), ConnectionState::Connecting);
        let (msg, from) = proxy.recv_type(MsgType::Connect).await;
        assert!(msg.params.is_empty());
        assert_eq!(from, client.local_addr().unwrap());

        proxy.send(MsgType::ConnectAck, vec![], from).await;
        eventually("ready", || client.is_connected()).await;
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        // A duplicate ack changes nothing.
        proxy.send(MsgType::ConnectAck, vec![], from).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        assert!(matches!(
            client.connect(proxy.addr()).await,
            Err(ClientError::AlreadyConnected(ConnectionState::Ready))
        ));
        client.stop().await;
    }

    #[tokio::test]
    async fn traffic_before_ack_is_unready() {
        let proxy = FakeProxy::bind().await;
        let client = YateClient::bind(test_config(60_000)).await.unwrap();
        client.connect(proxy.addr()).await.unwrap();
        let (_, from) = proxy.recv_type(MsgType::Connect).await;

        proxy.send(MsgType::AvatarPos, ints([1, 70, 2]), from).await;
        eventually("unready", || client.state() == ConnectionState::ConnectedUnready).await;
        assert_eq!(client.avatar_pos(), BlockPos::new(1, 70, 2));

        proxy.send(MsgType::ConnectAck, vec![], from).await;
        eventually("ready", || client.is_connected()).await;
        client.stop().await;
    }

    #[tokio::test]
    async fn known_and_out_of_window_queries_answer_immediately() {
        let proxy = FakeProxy::bind().await;
        let client = ready_client(&proxy, Callbacks::new(), 60_000).await;
        with_window(&client, &proxy).await;

        let window = client.visual_window();
        assert_eq!(window.start, BlockPos::new(96, 60, 96));
        assert_eq!(window.end, BlockPos::new(104, 68, 104));
        assert!(client.last_update() > 0.0);

        let record = VoxelRecord::new(
            BlockPos::new(100, 64, 99),
            BasicType::EasyObstacle,
            0,
            ActiveState::Inactive,
            IntactState::Intact,
        );
        let to = client.local_addr().unwrap();
        proxy.send(MsgType::VoxelUpdate, record.to_params(), to).await;
        eventually("voxel", || client.known_voxel((100, 64, 99)).is_some()).await;
        let known = client
            .get_voxel((100, 64, 99), QueryOptions::new())
            .await
            .unwrap();
        assert_eq!(known, record);

        let record = client
            .get_voxel((100, 64, 50), QueryOptions::new())
            .await
            .unwrap();
        assert_eq!(record, VoxelRecord::unknown(BlockPos::new(100, 64, 50)));
        assert!(proxy
            .try_recv_type(MsgType::RequestVoxel, Duration::from_millis(200))
            .await
            .is_none());
        client.stop().await;
    }

    #[tokio::test]
    async fn query_inside_window_waits_for_update() {
        let proxy = FakeProxy::bind().await;
        let updates = counter();
        let seen = updates.clone();
        let client = ready_client(
            &proxy,
            Callbacks::new().on_voxel_update(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
            60_000,
        )
        .await;
        with_window(&client, &proxy).await;

        let query = {
            let client = client.clone();
            tokio::spawn(async move { client.get_voxel((100, 64, 99), QueryOptions::new()).await })
        };

        let (request, from) = proxy.recv_type(MsgType::RequestVoxel).await;
        assert_eq!(request.params[0].as_block_pos(), Some(BlockPos::new(100, 64, 99)));

        let record = VoxelRecord::new(
            BlockPos::new(100, 64, 99),
            BasicType::HardObstacle,
            1,
            ActiveState::Inactive,
            IntactState::Intact,
        );
        proxy.send(MsgType::VoxelUpdate, record.to_params(), from).await;

        let answer = tokio::time::timeout(RECV_WAIT, query).await.unwrap().unwrap().unwrap();
        assert_eq!(answer, record);
        assert_eq!(client.known_voxel((100, 64, 99)), Some(record));
        assert_eq!(updates.load(Ordering::SeqCst), 1);

        // Known now, so no second request goes out.
        let again = client.get_voxel((100, 64, 99), QueryOptions::new()).await.unwrap();
        assert_eq!(again, record);
        assert!(proxy
            .try_recv_type(MsgType::RequestVoxel, Duration::from_millis(100))
            .await
            .is_none());
        client.stop().await;
    }

    #[tokio::test]
    async fn query_deadline() {
        let proxy = FakeProxy::bind().await;
        let client = ready_client(&proxy, Callbacks::new(), 60_000).await;
        with_window(&client, &proxy).await;

        let result = client
            .get_voxel(
                (101, 65, 101),
                QueryOptions::new().with_timeout(Duration::from_millis(100)),
            )
            .await;
        assert!(matches!(result, Err(ClientError::QueryTimedOut(pos)) if pos == BlockPos::new(101, 65, 101)));
        client.stop().await;
    }

    #[tokio::test]
    async fn query_cancel() {
        let proxy = FakeProxy::bind().await;
        let client = ready_client(&proxy, Callbacks::new(), 60_000).await;
        with_window(&client, &proxy).await;

        let cancel = CancelHandle::new();
        let query = {
            let client = client.clone();
            let options = QueryOptions::new().with_cancel(cancel.clone());
            tokio::spawn(async move { client.get_voxel((99, 63, 97), options).await })
        };
        proxy.recv_type(MsgType::RequestVoxel).await;
        assert!(!cancel.is_cancelled());
        cancel.cancel();

        let result = tokio::time::timeout(RECV_WAIT, query).await.unwrap().unwrap();
        assert!(matches!(result, Err(ClientError::QueryCancelled(_))));
        client.stop().await;
    }

    #[tokio::test]
    async fn unacked_keepalive_disconnects_once() {
        let proxy = FakeProxy::bind().await;
        let disconnects = counter();
        let seen = disconnects.clone();
        let client = ready_client(
            &proxy,
            Callbacks::new().on_disconnect(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
            100,
        )
        .await;

        let (ping, _) = proxy.recv_type(MsgType::Keepalive).await;
        assert!(ping.params.is_empty());
        eventually("liveness timeout", || {
            client.state() == ConnectionState::Disconnected
        })
        .await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);

        client.stop().await;
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);

        // The client can dial again after a timeout.
        client.connect(proxy.addr()).await.unwrap();
        proxy.recv_type(MsgType::Connect).await;
        client.stop().await;
    }

    #[tokio::test]
    async fn acked_keepalives_stay_ready() {
        let proxy = FakeProxy::bind().await;
        let disconnects = counter();
        let seen = disconnects.clone();
        let client = ready_client(
            &proxy,
            Callbacks::new().on_disconnect(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
            100,
        )
        .await;

        let until = Instant::now() + Duration::from_millis(600);
        let mut pings = 0;
        while Instant::now() < until {
            let left = until.saturating_duration_since(Instant::now());
            if let Some((ping, from)) = proxy.try_recv_type(MsgType::Keepalive, left).await {
                proxy.send(MsgType::KeepaliveAck, vec![Value::Int(ping.id)], from).await;
                pings += 1;
            }
        }
        assert!(pings >= 3);
        assert!(client.is_connected());
        assert_eq!(disconnects.load(Ordering::SeqCst), 0);

        client.stop().await;
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn stranger_gets_unknown_peer() {
        let proxy = FakeProxy::bind().await;
        let client = ready_client(&proxy, Callbacks::new(), 60_000).await;
        let stranger = FakeProxy::bind().await;
        let to = client.local_addr().unwrap();

        stranger.send(MsgType::AvatarPos, ints([5, 6, 7]), to).await;
        let (reply, from) = stranger.recv_type(MsgType::UnknownPeer).await;
        assert!(reply.params.is_empty());
        assert_eq!(from, to);
        assert!(stranger.try_recv(Duration::from_millis(200)).await.is_none());

        assert_eq!(client.avatar_pos(), BlockPos::default());
        assert!(client.is_connected());
        client.stop().await;
    }

    #[tokio::test]
    async fn keepalive_from_proxy_is_acked() {
        let proxy = FakeProxy::bind().await;
        let client = ready_client(&proxy, Callbacks::new(), 60_000).await;
        let ping = Message::new(MsgType::Keepalive, vec![], 777);
        proxy
            .socket
            .send_to(&ping.to_bytes(), client.local_addr().unwrap())
            .await
            .unwrap();

        let (ack, _) = proxy.recv_type(MsgType::KeepaliveAck).await;
        assert_eq!(ack.params, vec![Value::Int(777)]);
        client.stop().await;
    }

    #[tokio::test]
    async fn garbage_does_not_stop_the_pipeline() {
        let proxy = FakeProxy::bind().await;
        let client = ready_client(&proxy, Callbacks::new(), 60_000).await;
        let to = client.local_addr().unwrap();

        proxy.socket.send_to(&[0xC1, 0x00], to).await.unwrap();
        let unregistered = Message {
            code: 42,
            params: vec![],
            id: 1,
        };
        proxy.socket.send_to(&unregistered.to_bytes(), to).await.unwrap();
        proxy.send(MsgType::AvatarPos, ints([3, 80, -4]), to).await;

        eventually("avatar", || client.avatar_pos() == BlockPos::new(3, 80, -4)).await;
        assert!(client.is_connected());
        client.stop().await;
    }

    #[tokio::test]
    async fn odd_visual_range_is_rejected() {
        let proxy = FakeProxy::bind().await;
        let client = ready_client(&proxy, Callbacks::new(), 60_000).await;
        with_window(&client, &proxy).await;
        let to = client.local_addr().unwrap();

        proxy.send(MsgType::VisualRange, ints([7, 8, 8]), to).await;
        proxy.send(MsgType::AvatarPos, ints([0, 64, 0]), to).await;
        eventually("avatar", || client.avatar_pos() == BlockPos::new(0, 64, 0)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.visual_range(), [8, 8, 8]);
        assert_eq!(client.visual_window().start, BlockPos::new(-4, 60, -4));
        client.stop().await;
    }

    #[tokio::test]
    async fn out_of_range_avatar_is_dropped_and_pipeline_survives() {
        let proxy = FakeProxy::bind().await;
        let moved = counter();
        let seen = moved.clone();
        let config = ClientSection {
            workers: 1,
            keepalive_interval_ms: 60_000,
            ..ClientSection::default()
        };
        let client = YateClient::bind_with_callbacks(
            config,
            Callbacks::new().on_avatar_pos(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await
        .unwrap();
        client.connect(proxy.addr()).await.unwrap();
        let (_, from) = proxy.recv_type(MsgType::Connect).await;
        proxy.send(MsgType::ConnectAck, vec![], from).await;
        eventually("ready", || client.is_connected()).await;

        proxy.send(MsgType::VisualRange, ints([8, 8, 8]), from).await;
        let max = i64::from(i32::MAX);
        proxy.send(MsgType::AvatarPos, ints([max, 64, 0]), from).await;
        let huge = vec![Value::Float(1e12), Value::Int(64), Value::Int(0)];
        proxy.send(MsgType::AvatarPos, huge, from).await;
        let fractional = vec![Value::Float(1.5), Value::Int(64), Value::Float(2.25)];
        proxy.send(MsgType::AvatarPos, fractional, from).await;

        eventually("avatar", || client.avatar_pos() == BlockPos::new(1, 64, 2)).await;
        assert_eq!(moved.load(Ordering::SeqCst), 1);
        let window = client.visual_window();
        // x spans [-2.5, 5.5), z spans [-1.75, 6.25)
        assert_eq!(window.start, BlockPos::new(-2, 60, -1));
        assert_eq!(window.end, BlockPos::new(6, 68, 7));
        client.stop().await;
    }

    #[tokio::test]
    async fn late_datagrams_do_not_reach_the_next_session() {
        let proxy = FakeProxy::bind().await;
        let client = YateClient::bind(test_config(60_000)).await.unwrap();
        let first = client.local_addr().unwrap();
        client.connect(proxy.addr()).await.unwrap();
        proxy.recv_type(MsgType::Connect).await;
        client.stop().await;
        assert!(matches!(client.local_addr(), Err(ClientError::NotConnected)));

        // An ack for the closed session arrives after stop.
        proxy.send(MsgType::ConnectAck, vec![], first).await;

        client.connect(proxy.addr()).await.unwrap();
        let (_, from) = proxy.recv_type(MsgType::Connect).await;
        assert_eq!(client.local_addr().unwrap(), from);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(client.state(), ConnectionState::Connecting);

        proxy.send(MsgType::ConnectAck, vec![], from).await;
        eventually("ready", || client.is_connected()).await;
        client.stop().await;
    }

    #[tokio::test]
    async fn avatar_callback_and_refresh_visual() {
        let proxy = FakeProxy::bind().await;
        let moved = Arc::new(Mutex::new(Vec::new()));
        let log = moved.clone();
        let client = ready_client(
            &proxy,
            Callbacks::new().on_avatar_pos(move |pos| log.lock().unwrap().push(pos)),
            60_000,
        )
        .await;
        with_window(&client, &proxy).await;
        assert_eq!(*moved.lock().unwrap(), vec![BlockPos::new(100, 64, 100)]);

        let since = client.last_update();
        let id = client.refresh_visual().await.unwrap();
        let (request, _) = proxy.recv_type(MsgType::RequestVisual).await;
        assert_eq!(request.id, id);
        assert_eq!(request.params, vec![Value::Float(since)]);

        client.refresh_voxel((1, 2, 3)).await.unwrap();
        let (request, _) = proxy.recv_type(MsgType::RequestVoxel).await;
        assert_eq!(request.params[0].as_block_pos(), Some(BlockPos::new(1, 2, 3)));

        assert!(matches!(
            client.send_by_name("teleport", vec![]).await,
            Err(ClientError::InvalidParams(_))
        ));
        client.stop().await;
    }

    #[tokio::test]
    async fn requests_need_a_peer() {
        let client = YateClient::bind(test_config(60_000)).await.unwrap();
        assert!(matches!(
            client.refresh_voxel((0, 0, 0)).await,
            Err(ClientError::NotConnected)
        ));
        // Nothing is visible before the proxy sends a range.
        let record = client.get_voxel((0, 0, 0), QueryOptions::new()).await.unwrap();
        assert_eq!(record.basic_type(), BasicType::Unknown);
    }
}
