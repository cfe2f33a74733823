//! In-process stream bus
//!
//! The engine-side registry of live streams and the fan-out path from
//! providers to consumers. One entry per registered stream, carrying the
//! fully host-assigned descriptor, a bounded backlog for late joiners and
//! a `tokio::sync::broadcast` channel for live fan-out.
//!
//! ```text
//!                             Arc<Bus>
//!                  ┌──────────────────────────────┐
//!                  │ streams: HashMap<uid,        │
//!                  │   BusStream {                │
//!                  │     backlog (bounded),       │
//!                  │     tx: broadcast::Tx,       │
//!                  │     consumers: AtomicU32,    │
//!                  │   }                          │
//!                  │ >                            │
//!                  └──────────────┬───────────────┘
//!                                 │
//!            ┌────────────────────┼────────────────────┐
//!            ▼                    ▼                    ▼
//!      [OutletHandle]       [InletHandle]        [resolvers]
//!      push()               pull()/catchup       snapshot()
//! ```
//!
//! `bytes::Bytes` payloads are reference counted, so fan-out to several
//! consumers clones the envelope but never the sample data.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::descriptor::{HostInfo, StreamDescriptor};
use crate::format::ChannelFormat;

use super::{local_clock, EngineError, POLL_INTERVAL, PROTOCOL_VERSION};

/// One encoded sample in flight
#[derive(Debug, Clone)]
pub(crate) struct Packet {
    /// Encoded elements, sample-major
    pub data: Bytes,
    /// Capture timestamp on the provider's clock
    pub timestamp: f64,
    /// Whether the provider asked for immediate transmission; the local
    /// bus always delivers immediately, the flag is carried for parity
    /// with buffering transports
    #[allow(dead_code)]
    pub pushthrough: bool,
}

/// Event fan-out to consumers
#[derive(Debug, Clone)]
pub(crate) enum BusEvent {
    /// A sample arrived
    Sample(Packet),
    /// The providing outlet was destroyed; wakes blocked pulls promptly
    Closed,
}

/// Per-stream entry on the bus
pub(crate) struct BusStream {
    /// Descriptor with host-assigned fields populated
    pub info: StreamDescriptor,
    /// Bounded backlog handed to late-joining consumers
    backlog: Mutex<Backlog>,
    /// Live fan-out channel
    tx: broadcast::Sender<BusEvent>,
    /// Number of currently subscribed consumers
    consumers: AtomicU32,
}

struct Backlog {
    packets: VecDeque<Packet>,
    capacity: usize,
}

impl BusStream {
    /// Append to the backlog and fan out to live consumers
    ///
    /// Backlog and broadcast are updated under one lock so a subscriber
    /// joining concurrently sees every packet exactly once.
    pub(crate) fn push(&self, packet: Packet) {
        let mut backlog = self.backlog.lock().unwrap();
        if backlog.packets.len() == backlog.capacity {
            backlog.packets.pop_front();
        }
        backlog.packets.push_back(packet.clone());
        // no receivers is fine; the backlog covers late joiners
        let _ = self.tx.send(BusEvent::Sample(packet));
    }

    /// Subscribe a consumer: live receiver plus backlog catch-up
    pub(crate) fn subscribe(&self) -> (broadcast::Receiver<BusEvent>, VecDeque<Packet>) {
        let backlog = self.backlog.lock().unwrap();
        let rx = self.tx.subscribe();
        let catchup = backlog.packets.clone();
        self.consumers.fetch_add(1, Ordering::Relaxed);
        (rx, catchup)
    }

    pub(crate) fn consumer_count(&self) -> u32 {
        self.consumers.load(Ordering::Relaxed)
    }

    fn close(&self) {
        let _backlog = self.backlog.lock().unwrap();
        let _ = self.tx.send(BusEvent::Closed);
    }
}

/// Engine-side registry of live streams
pub(crate) struct Bus {
    streams: RwLock<HashMap<String, Arc<BusStream>>>,
    session_id: String,
    hostname: String,
    next_uid: AtomicU64,
}

impl Bus {
    pub(crate) fn new() -> Arc<Self> {
        let hostname =
            std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let seed = format!(
            "{}-{}-{}",
            hostname,
            std::process::id(),
            local_clock().to_bits()
        );
        let digest = Sha256::digest(seed.as_bytes());
        let mut session_id = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            session_id.push_str(&format!("{:02x}", byte));
        }

        Arc::new(Self {
            streams: RwLock::new(HashMap::new()),
            session_id,
            hostname,
            next_uid: AtomicU64::new(1),
        })
    }

    /// Register a provider stream; assigns the host fields
    pub(crate) fn register(
        &self,
        mut info: StreamDescriptor,
        capacity: usize,
    ) -> Arc<BusStream> {
        let n = self.next_uid.fetch_add(1, Ordering::Relaxed);
        let uid = format!("{}:{:x}", self.session_id, n);
        info.host = Some(HostInfo {
            uid: uid.clone(),
            session_id: self.session_id.clone(),
            hostname: self.hostname.clone(),
            created_at: local_clock(),
            protocol_version: PROTOCOL_VERSION,
        });

        let (tx, _) = broadcast::channel(capacity.max(16));
        let stream = Arc::new(BusStream {
            info,
            backlog: Mutex::new(Backlog {
                packets: VecDeque::new(),
                capacity: capacity.max(16),
            }),
            tx,
            consumers: AtomicU32::new(0),
        });

        self.streams
            .write()
            .unwrap()
            .insert(uid.clone(), Arc::clone(&stream));
        tracing::info!(stream = %stream.info, uid = %uid, "Stream registered");
        stream
    }

    /// Remove a provider stream and wake its consumers
    pub(crate) fn unregister(&self, uid: &str) {
        let removed = self.streams.write().unwrap().remove(uid);
        if let Some(stream) = removed {
            stream.close();
            tracing::info!(stream = %stream.info, uid = %uid, "Stream unregistered");
        }
    }

    /// Independent snapshot of every live stream's descriptor
    pub(crate) fn snapshot(&self) -> Vec<StreamDescriptor> {
        self.streams
            .read()
            .unwrap()
            .values()
            .map(|s| s.info.clone())
            .collect()
    }

    /// First live stream matching `query`
    pub(crate) fn find(&self, query: &StreamQuery) -> Option<Arc<BusStream>> {
        self.streams
            .read()
            .unwrap()
            .values()
            .find(|s| query.matches(&s.info))
            .cloned()
    }

    pub(crate) fn stream_count(&self) -> usize {
        self.streams.read().unwrap().len()
    }
}

/// How an inlet identifies the stream it binds to
///
/// A resolved descriptor pins the exact instance by uid; an app-authored
/// one matches by source id, falling back to the structural fields.
#[derive(Debug, Clone)]
pub(crate) struct StreamQuery {
    uid: Option<String>,
    source_id: Option<String>,
    name: String,
    stream_type: String,
    channel_count: usize,
    channel_format: ChannelFormat,
}

impl StreamQuery {
    pub(crate) fn from_descriptor(desc: &StreamDescriptor) -> Self {
        Self {
            uid: desc.host.as_ref().map(|h| h.uid.clone()),
            source_id: if desc.source_id.is_empty() {
                None
            } else {
                Some(desc.source_id.clone())
            },
            name: desc.name.clone(),
            stream_type: desc.stream_type.clone(),
            channel_count: desc.channel_count,
            channel_format: desc.channel_format,
        }
    }

    /// Forget the pinned instance so a restarted provider can match again
    pub(crate) fn forget_instance(&mut self) {
        self.uid = None;
    }

    pub(crate) fn matches(&self, info: &StreamDescriptor) -> bool {
        if let Some(uid) = &self.uid {
            return info.uid() == uid;
        }
        if let Some(source_id) = &self.source_id {
            return info.source_id == *source_id;
        }
        info.name == self.name
            && info.stream_type == self.stream_type
            && info.channel_count == self.channel_count
            && info.channel_format == self.channel_format
    }
}

/// Engine handle owned by one outlet
pub(crate) struct OutletHandle {
    bus: Arc<Bus>,
    stream: Option<Arc<BusStream>>,
}

impl OutletHandle {
    pub(crate) fn create(
        bus: Arc<Bus>,
        info: StreamDescriptor,
        capacity: usize,
    ) -> Self {
        let stream = bus.register(info, capacity);
        Self {
            bus,
            stream: Some(stream),
        }
    }

    /// Descriptor with host fields populated
    pub(crate) fn info(&self) -> Result<&StreamDescriptor, EngineError> {
        self.stream
            .as_ref()
            .map(|s| &s.info)
            .ok_or_else(|| EngineError::Lost("outlet handle destroyed".into()))
    }

    pub(crate) fn push(&self, packet: Packet) -> Result<(), EngineError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| EngineError::Lost("outlet handle destroyed".into()))?;
        stream.push(packet);
        Ok(())
    }

    pub(crate) fn consumer_count(&self) -> u32 {
        self.stream
            .as_ref()
            .map(|s| s.consumer_count())
            .unwrap_or(0)
    }

    /// Poll for at least one consumer until `deadline`
    pub(crate) async fn wait_for_consumers(&self, deadline: Instant) -> bool {
        loop {
            if self.consumer_count() > 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - Instant::now())).await;
        }
    }

    /// Unregister the stream; consumers observe a prompt close
    pub(crate) fn destroy(&mut self) {
        if let Some(stream) = self.stream.take() {
            let uid = stream.info.uid().to_string();
            drop(stream);
            self.bus.unregister(&uid);
        }
    }
}

/// Engine handle owned by one inlet
pub(crate) struct InletHandle {
    bus: Arc<Bus>,
    query: StreamQuery,
    conn: Option<Connection>,
}

struct Connection {
    stream: Arc<BusStream>,
    rx: broadcast::Receiver<BusEvent>,
    catchup: VecDeque<Packet>,
    /// Set once a `Closed` event was observed, so the loss is still
    /// reported after a flush drained the event itself
    closed: bool,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.stream.consumers.fetch_sub(1, Ordering::Relaxed);
    }
}

impl InletHandle {
    pub(crate) fn create(bus: Arc<Bus>, desc: &StreamDescriptor) -> Self {
        Self {
            bus,
            query: StreamQuery::from_descriptor(desc),
            conn: None,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Bind to the matching stream, waiting for it to appear until `deadline`
    ///
    /// Returns the resolved descriptor. On timeout the handle stays
    /// unbound.
    pub(crate) async fn open(&mut self, deadline: Instant) -> Result<StreamDescriptor, EngineError> {
        if let Some(conn) = &self.conn {
            return Ok(conn.stream.info.clone());
        }
        loop {
            if let Some(stream) = self.bus.find(&self.query) {
                let (rx, catchup) = stream.subscribe();
                let info = stream.info.clone();
                tracing::debug!(stream = %info, catchup = catchup.len(), "Inlet bound");
                self.conn = Some(Connection {
                    stream,
                    rx,
                    catchup,
                    closed: false,
                });
                return Ok(info);
            }
            if Instant::now() >= deadline {
                return Err(EngineError::Timeout);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - Instant::now())).await;
        }
    }

    /// Unbind from the stream; a later `open` re-subscribes
    pub(crate) fn close(&mut self) {
        self.conn = None;
    }

    /// Drop the bound instance and match by source id on the next open
    pub(crate) fn reset_for_recovery(&mut self) {
        self.conn = None;
        self.query.forget_instance();
    }

    /// Next packet without waiting; `Ok(None)` when nothing is buffered
    pub(crate) fn try_pull(&mut self) -> Result<Option<Packet>, EngineError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| EngineError::Internal("pull on an unbound inlet handle".into()))?;

        if let Some(packet) = conn.catchup.pop_front() {
            return Ok(Some(packet));
        }
        if conn.closed {
            return Err(EngineError::Lost(conn.stream.info.to_string()));
        }
        loop {
            match conn.rx.try_recv() {
                Ok(BusEvent::Sample(packet)) => return Ok(Some(packet)),
                Ok(BusEvent::Closed) => {
                    conn.closed = true;
                    return Err(EngineError::Lost(conn.stream.info.to_string()));
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(dropped = n, "Inlet fell behind, samples dropped");
                    continue;
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    conn.closed = true;
                    return Err(EngineError::Lost(conn.stream.info.to_string()));
                }
            }
        }
    }

    /// Next packet, waiting until `deadline`; `Ok(None)` on timeout
    pub(crate) async fn pull(&mut self, deadline: Instant) -> Result<Option<Packet>, EngineError> {
        if let Some(packet) = self.try_pull()? {
            return Ok(Some(packet));
        }
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| EngineError::Internal("pull on an unbound inlet handle".into()))?;
        loop {
            match tokio::time::timeout_at(deadline, conn.rx.recv()).await {
                Err(_) => return Ok(None),
                Ok(Ok(BusEvent::Sample(packet))) => return Ok(Some(packet)),
                Ok(Ok(BusEvent::Closed)) => {
                    conn.closed = true;
                    return Err(EngineError::Lost(conn.stream.info.to_string()));
                }
                Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                    tracing::warn!(dropped = n, "Inlet fell behind, samples dropped");
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    conn.closed = true;
                    return Err(EngineError::Lost(conn.stream.info.to_string()));
                }
            }
        }
    }

    /// Buffered backlog depth, without waiting
    pub(crate) fn available(&self) -> usize {
        match &self.conn {
            Some(conn) => conn.catchup.len() + conn.rx.len(),
            None => 0,
        }
    }

    /// Discard the buffered backlog, returning the count discarded
    pub(crate) fn flush(&mut self) -> usize {
        let Some(conn) = self.conn.as_mut() else {
            return 0;
        };
        let mut discarded = conn.catchup.len();
        conn.catchup.clear();
        loop {
            match conn.rx.try_recv() {
                Ok(BusEvent::Sample(_)) => discarded += 1,
                Ok(BusEvent::Closed) => {
                    conn.closed = true;
                    break;
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => discarded += n as usize,
                Err(_) => break,
            }
        }
        discarded
    }

    /// Offset to add to remote timestamps for local alignment
    ///
    /// Consumers on the same bus share the provider's clock, so the
    /// correction is always zero; remote transports would measure it here.
    pub(crate) async fn time_correction(&self, _deadline: Instant) -> Result<f64, EngineError> {
        if self.conn.is_none() {
            return Err(EngineError::Internal(
                "time correction on an unbound inlet handle".into(),
            ));
        }
        Ok(0.0)
    }

    /// Whether the provider's clock jumped backwards since the last query
    pub(crate) fn was_clock_reset(&self) -> bool {
        // the shared process clock never resets
        false
    }
}
