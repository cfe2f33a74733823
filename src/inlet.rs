//! Stream inlet
//!
//! Consumer endpoint subscribed to one outlet's stream. An inlet moves
//! between two states: Created (constructed, codec selected, nothing on
//! the wire) and Open (bound to the matching stream). `open_stream` and
//! `close_stream` transition between them; destruction is terminal and
//! reachable from either.
//!
//! Pulls on a Created inlet implicitly open the stream first, using the
//! pull's own timeout. A pull with a zero timeout is a valid non-blocking
//! poll; "nothing there yet" is `Ok(None)` (or an empty chunk), never an
//! error.

use std::ops::BitOr;
use std::time::Duration;

use tokio::time::Instant;

use crate::descriptor::StreamDescriptor;
use crate::engine::bus::{InletHandle, Packet};
use crate::engine::{Engine, EngineError};
use crate::error::{Error, Result};
use crate::format::chunk::split_rows;
use crate::format::{codec_for, Sample, SampleCodec};
use crate::lifecycle::Lifecycle;

/// Fallback pull-chunk granularity when no cap was configured
const DEFAULT_CHUNKLEN: usize = 1024;

/// Inlet-side timestamp postprocessing, a combinable bitmask
///
/// Effects are deterministic only for pulls issued after the flags were
/// set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostProcessing(u8);

impl PostProcessing {
    /// No postprocessing; timestamps arrive as the provider stamped them
    pub const NONE: PostProcessing = PostProcessing(0);
    /// Add the current time-correction offset to every timestamp
    pub const CLOCK_SYNC: PostProcessing = PostProcessing(1);
    /// Smooth network-induced jitter on regular-rate streams
    pub const DEJITTER: PostProcessing = PostProcessing(2);
    /// Force timestamps to be non-decreasing
    pub const MONOTONIZE: PostProcessing = PostProcessing(4);
    /// Declare that multiple threads share this inlet
    pub const THREAD_SAFE: PostProcessing = PostProcessing(8);

    /// All four options combined
    pub fn all() -> PostProcessing {
        Self::CLOCK_SYNC | Self::DEJITTER | Self::MONOTONIZE | Self::THREAD_SAFE
    }

    /// Whether every flag in `other` is set
    pub fn contains(self, other: PostProcessing) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bitmask value
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for PostProcessing {
    type Output = PostProcessing;

    fn bitor(self, rhs: Self) -> Self {
        PostProcessing(self.0 | rhs.0)
    }
}

impl Default for PostProcessing {
    fn default() -> Self {
        Self::NONE
    }
}

/// Inlet configuration options
#[derive(Debug, Clone)]
pub struct InletOptions {
    /// How many seconds of data the consumer side is willing to buffer;
    /// must be positive
    pub max_buflen_secs: f64,

    /// Upper bound (in samples) on chunk granularity; 0 means no cap
    pub max_chunklen: usize,

    /// Silently re-bind to a restarted provider with the same source id
    /// instead of surfacing a lost-stream error
    pub recover: bool,

    /// Initial postprocessing flags
    pub postprocessing: PostProcessing,
}

impl Default for InletOptions {
    fn default() -> Self {
        Self {
            max_buflen_secs: 360.0,
            max_chunklen: 0,
            recover: true,
            postprocessing: PostProcessing::NONE,
        }
    }
}

impl InletOptions {
    /// Set the consumer-side buffered-duration window
    pub fn max_buflen_secs(mut self, secs: f64) -> Self {
        self.max_buflen_secs = secs;
        self
    }

    /// Set the chunk-granularity cap
    pub fn max_chunklen(mut self, samples: usize) -> Self {
        self.max_chunklen = samples;
        self
    }

    /// Enable or disable silent recovery of lost streams
    pub fn recover(mut self, recover: bool) -> Self {
        self.recover = recover;
        self
    }

    /// Set the initial postprocessing flags
    pub fn postprocessing(mut self, flags: PostProcessing) -> Self {
        self.postprocessing = flags;
        self
    }
}

/// Open/closed state of the inlet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InletState {
    /// Constructed; nothing subscribed yet
    Created,
    /// Bound to the matching stream
    Open,
}

/// Timestamp postprocessing pipeline, applied in arrival order
#[derive(Debug)]
struct Postprocessor {
    flags: PostProcessing,
    /// Offset added under CLOCK_SYNC
    correction: f64,
    /// Ideal inter-sample interval for DEJITTER; 0 for irregular streams
    interval: f64,
    /// Next expected timestamp while dejittering; NaN until primed
    next_expected: f64,
    /// Last emitted timestamp for MONOTONIZE
    last_out: f64,
}

impl Postprocessor {
    fn new(flags: PostProcessing, nominal_srate: f64) -> Self {
        Self {
            flags,
            correction: 0.0,
            interval: if nominal_srate > 0.0 {
                1.0 / nominal_srate
            } else {
                0.0
            },
            next_expected: f64::NAN,
            last_out: f64::NEG_INFINITY,
        }
    }

    fn set_flags(&mut self, flags: PostProcessing) {
        self.flags = flags;
        self.next_expected = f64::NAN;
    }

    fn process(&mut self, raw: f64) -> f64 {
        let mut ts = raw;
        if self.flags.contains(PostProcessing::CLOCK_SYNC) {
            ts += self.correction;
        }
        if self.flags.contains(PostProcessing::DEJITTER) && self.interval > 0.0 {
            if self.next_expected.is_finite() && (ts - self.next_expected).abs() <= self.interval / 2.0 {
                ts = self.next_expected;
            }
            self.next_expected = ts + self.interval;
        }
        if self.flags.contains(PostProcessing::MONOTONIZE) && ts < self.last_out {
            ts = self.last_out;
        }
        if ts > self.last_out {
            self.last_out = ts;
        }
        ts
    }
}

/// Consumer endpoint bound to exactly one resolved stream
pub struct Inlet {
    handle: InletHandle,
    codec: Box<dyn SampleCodec>,
    descriptor: StreamDescriptor,
    channel_count: usize,
    recover: bool,
    max_chunklen: usize,
    state: InletState,
    post: Postprocessor,
    /// Staging area for pulled packets, sized to the chunk cap and grown
    /// (never shrunk) on first oversized use
    packet_scratch: Vec<Packet>,
    lifecycle: Lifecycle,
}

impl Inlet {
    /// Create an inlet for a descriptor; does not open the stream
    ///
    /// The codec for the descriptor's channel format is selected here,
    /// once. Fails with a configuration error for an unsupported format or
    /// a non-positive buffer window.
    pub fn new(engine: &Engine, descriptor: &StreamDescriptor, options: InletOptions) -> Result<Self> {
        if !(options.max_buflen_secs > 0.0) {
            return Err(Error::Config(format!(
                "max_buflen_secs must be positive (got {})",
                options.max_buflen_secs
            )));
        }
        let codec = codec_for(descriptor.channel_format)?;
        let scratch_cap = if options.max_chunklen > 0 {
            options.max_chunklen
        } else {
            DEFAULT_CHUNKLEN
        };

        Ok(Self {
            handle: InletHandle::create(engine.bus().clone(), descriptor),
            codec,
            descriptor: descriptor.clone(),
            channel_count: descriptor.channel_count,
            recover: options.recover,
            max_chunklen: options.max_chunklen,
            state: InletState::Created,
            post: Postprocessor::new(options.postprocessing, descriptor.nominal_srate),
            packet_scratch: Vec::with_capacity(scratch_cap),
            lifecycle: Lifecycle::new("inlet"),
        })
    }

    /// Created → Open: bind to the stream, waiting up to `timeout`
    ///
    /// On timeout the inlet remains Created and a timeout error is
    /// raised. Opening an already-open inlet is a no-op.
    pub async fn open_stream(&mut self, timeout: Duration) -> Result<()> {
        self.lifecycle.ensure_alive()?;
        if self.state == InletState::Open {
            return Ok(());
        }
        let deadline = Instant::now() + timeout;
        match self.handle.open(deadline).await {
            Ok(resolved) => {
                self.descriptor = resolved;
                self.state = InletState::Open;
                self.post.correction = self.handle.time_correction(deadline).await?;
                Ok(())
            }
            Err(EngineError::Timeout) => Err(Error::Timeout("open_stream")),
            Err(err) => Err(err.into()),
        }
    }

    /// Open → Created: unsubscribe from the stream
    ///
    /// Idempotent no-op when already Created or destroyed.
    pub fn close_stream(&mut self) {
        if self.state == InletState::Open {
            self.handle.close();
            self.state = InletState::Created;
        }
    }

    /// Replace the postprocessing flags
    ///
    /// The effect is deterministic only for pulls issued after this call.
    pub fn set_postprocessing(&mut self, flags: PostProcessing) -> Result<()> {
        self.lifecycle.ensure_alive()?;
        self.post.set_flags(flags);
        Ok(())
    }

    /// Pull the next sample, waiting up to `timeout`
    ///
    /// `Ok(None)` means no sample arrived within the window — the steady
    /// state for polling pulls, including `timeout` zero. A lost stream
    /// surfaces as an error unless the inlet recovers silently.
    pub async fn pull_sample(&mut self, timeout: Duration) -> Result<Option<(Sample, f64)>> {
        self.lifecycle.ensure_alive()?;
        let deadline = Instant::now() + timeout;
        loop {
            if self.state == InletState::Created && !self.implicit_open(deadline).await? {
                return Ok(None);
            }
            match self.handle.pull(deadline).await {
                Ok(Some(packet)) => {
                    let sample = self.codec.decode(&packet.data)?;
                    let ts = self.post.process(packet.timestamp);
                    return Ok(Some((sample, ts)));
                }
                Ok(None) => return Ok(None),
                Err(EngineError::Lost(what)) => {
                    self.handle_loss(what)?;
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Pull a batch of samples, waiting up to `timeout` for the first one
    ///
    /// Returns up to `max_samples` rows (0 falls back to the configured
    /// chunk cap) with timestamps aligned 1:1 in arrival order. Only the
    /// first sample waits; the rest is whatever already arrived with it.
    pub async fn pull_chunk(
        &mut self,
        timeout: Duration,
        max_samples: usize,
    ) -> Result<(Vec<Sample>, Vec<f64>)> {
        self.lifecycle.ensure_alive()?;
        let cap = match (max_samples, self.max_chunklen) {
            (0, 0) => DEFAULT_CHUNKLEN,
            (0, configured) => configured,
            (explicit, _) => explicit,
        };
        let deadline = Instant::now() + timeout;

        self.packet_scratch.clear();
        loop {
            if self.state == InletState::Created && !self.implicit_open(deadline).await? {
                break;
            }
            let result = if self.packet_scratch.is_empty() {
                self.handle.pull(deadline).await
            } else {
                self.handle.try_pull()
            };
            match result {
                Ok(Some(packet)) => {
                    self.packet_scratch.push(packet);
                    if self.packet_scratch.len() >= cap {
                        break;
                    }
                }
                Ok(None) => break,
                Err(EngineError::Lost(what)) => {
                    if self.packet_scratch.is_empty() {
                        self.handle_loss(what)?;
                        continue;
                    }
                    // deliver what arrived; the loss resurfaces next pull
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }

        let mut rows = Vec::with_capacity(self.packet_scratch.len());
        let mut stamps = Vec::with_capacity(self.packet_scratch.len());
        for packet in self.packet_scratch.drain(..) {
            let flat = self.codec.decode(&packet.data)?;
            // floor division: a ragged tail short of one sample is dropped
            let mut sample_rows = split_rows(flat, self.channel_count);
            for row in sample_rows.drain(..) {
                rows.push(row);
            }
            stamps.push(packet.timestamp);
        }
        // packets carry whole samples on this engine, so counts align; a
        // chunking transport would expand stamps per decoded row here
        let stamps = stamps
            .into_iter()
            .map(|ts| self.post.process(ts))
            .collect();

        Ok((rows, stamps))
    }

    /// Buffered backlog depth; never blocks
    pub fn samples_available(&self) -> usize {
        if self.lifecycle.is_destroyed() {
            return 0;
        }
        self.handle.available()
    }

    /// Discard the buffered backlog, returning the count discarded
    pub fn flush(&mut self) -> usize {
        if self.lifecycle.is_destroyed() {
            return 0;
        }
        self.handle.flush()
    }

    /// Offset to add to provider timestamps for local-clock alignment
    ///
    /// May block up to `timeout` (opening the stream first if needed) and
    /// raises on timeout.
    pub async fn time_correction(&mut self, timeout: Duration) -> Result<f64> {
        self.lifecycle.ensure_alive()?;
        let deadline = Instant::now() + timeout;
        if self.state == InletState::Created {
            match self.handle.open(deadline).await {
                Ok(resolved) => {
                    self.descriptor = resolved;
                    self.state = InletState::Open;
                }
                Err(EngineError::Timeout) => return Err(Error::Timeout("time_correction")),
                Err(err) => return Err(err.into()),
            }
        }
        let correction = self.handle.time_correction(deadline).await?;
        self.post.correction = correction;
        Ok(correction)
    }

    /// Whether the provider's clock jumped backwards; sticky query
    pub fn was_clock_reset(&self) -> bool {
        self.handle.was_clock_reset()
    }

    /// The descriptor this inlet is bound to, resolved once opened
    pub fn info(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    /// Tear down the subscription
    ///
    /// Idempotent; further calls are no-ops. Dropping the inlet without
    /// calling this runs the same teardown exactly once.
    pub fn destroy(&mut self) {
        if self.lifecycle.begin_destroy() {
            self.handle.close();
            self.state = InletState::Created;
        }
    }

    /// Implicit open for pull paths: true when bound, false on timeout
    async fn implicit_open(&mut self, deadline: Instant) -> Result<bool> {
        match self.handle.open(deadline).await {
            Ok(resolved) => {
                self.descriptor = resolved;
                self.state = InletState::Open;
                Ok(true)
            }
            Err(EngineError::Timeout) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// React to a lost stream: rebind silently or surface the error
    fn handle_loss(&mut self, what: String) -> Result<()> {
        if self.recover {
            tracing::warn!(stream = %what, "Stream lost, attempting recovery");
            self.handle.reset_for_recovery();
            self.state = InletState::Created;
            Ok(())
        } else {
            self.state = InletState::Created;
            Err(Error::Lost(what))
        }
    }
}

impl Drop for Inlet {
    fn drop(&mut self) {
        self.destroy();
    }
}
