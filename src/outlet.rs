//! Stream outlet
//!
//! The network-visible publishing endpoint for one stream. Construction
//! registers the stream with the engine (assigning the host fields) and
//! selects the codec for the descriptor's channel format once; every push
//! then validates shape locally before any engine call.
//!
//! # Example
//! ```no_run
//! use pulselink::{ChannelFormat, Engine, Outlet, OutletOptions, Sample, StreamDescriptor};
//!
//! # fn example() -> pulselink::Result<()> {
//! let engine = Engine::new();
//! let desc = StreamDescriptor::new("BioSemi", "EEG", 8, 256.0, ChannelFormat::Float32, "")?;
//! let outlet = Outlet::new(&engine, desc, OutletOptions::default())?;
//!
//! outlet.push_sample(&Sample::Float32(vec![0.0; 8]))?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::time::Instant;

use crate::descriptor::StreamDescriptor;
use crate::engine::bus::{OutletHandle, Packet};
use crate::engine::{buffer_capacity, local_clock, Engine};
use crate::error::{Error, Result};
use crate::format::chunk::{validate_flat, validate_rows};
use crate::format::{codec_for, ChannelFormat, ChunkTimestamps, Sample, SampleCodec};
use crate::lifecycle::Lifecycle;

/// Outlet configuration options
#[derive(Debug, Clone)]
pub struct OutletOptions {
    /// Preferred granularity (in samples) for chunked transmission;
    /// 0 lets each push decide
    pub chunk_size: usize,

    /// How many seconds of data to keep buffered for slow or late
    /// consumers; must be positive
    pub max_buffered_secs: f64,
}

impl Default for OutletOptions {
    fn default() -> Self {
        Self {
            chunk_size: 0,
            max_buffered_secs: 360.0,
        }
    }
}

impl OutletOptions {
    /// Set the chunk-size hint
    pub fn chunk_size(mut self, samples: usize) -> Self {
        self.chunk_size = samples;
        self
    }

    /// Set the buffered-duration window
    pub fn max_buffered_secs(mut self, secs: f64) -> Self {
        self.max_buffered_secs = secs;
        self
    }
}

/// Publishing endpoint bound to exactly one stream descriptor
pub struct Outlet {
    handle: OutletHandle,
    codec: Box<dyn SampleCodec>,
    channel_count: usize,
    format: ChannelFormat,
    options: OutletOptions,
    lifecycle: Lifecycle,
}

impl Outlet {
    /// Bind a descriptor to the engine and start providing the stream
    ///
    /// Fails with a configuration error for an unsupported channel format
    /// or a non-positive buffered-duration window.
    pub fn new(engine: &Engine, descriptor: StreamDescriptor, options: OutletOptions) -> Result<Self> {
        if !(options.max_buffered_secs > 0.0) {
            return Err(Error::Config(format!(
                "max_buffered_secs must be positive (got {})",
                options.max_buffered_secs
            )));
        }
        let codec = codec_for(descriptor.channel_format)?;
        let channel_count = descriptor.channel_count;
        let format = descriptor.channel_format;

        let capacity = buffer_capacity(descriptor.nominal_srate, options.max_buffered_secs);
        let handle = OutletHandle::create(engine.bus().clone(), descriptor, capacity);

        Ok(Self {
            handle,
            codec,
            channel_count,
            format,
            options,
            lifecycle: Lifecycle::new("outlet"),
        })
    }

    /// The options this outlet was created with
    pub fn options(&self) -> &OutletOptions {
        &self.options
    }

    /// Push one sample stamped with the local clock
    pub fn push_sample(&self, sample: &Sample) -> Result<()> {
        self.push_sample_at(sample, local_clock(), true)
    }

    /// Push one sample with an explicit timestamp
    ///
    /// `pushthrough` requests immediate transmission instead of waiting to
    /// fill a chunk.
    pub fn push_sample_at(&self, sample: &Sample, timestamp: f64, pushthrough: bool) -> Result<()> {
        self.lifecycle.ensure_alive()?;
        if sample.len() != self.channel_count {
            return Err(Error::shape(
                "sample length",
                self.channel_count,
                sample.len(),
            ));
        }
        let data = self.codec.encode(sample)?;
        self.handle.push(Packet {
            data,
            timestamp,
            pushthrough,
        })?;
        Ok(())
    }

    /// Push an ordered batch of per-sample rows
    ///
    /// Every row is validated against the channel count before anything is
    /// handed to the engine; a bad row fails fast with its index. An empty
    /// batch is a no-op.
    pub fn push_chunk(&self, rows: &[Sample], timestamps: ChunkTimestamps) -> Result<()> {
        self.lifecycle.ensure_alive()?;
        if rows.is_empty() {
            return Ok(());
        }
        validate_rows(rows, self.format, self.channel_count)?;
        let stamps = timestamps.resolve(rows.len(), local_clock())?;

        for (index, (row, &timestamp)) in rows.iter().zip(stamps.iter()).enumerate() {
            let data = self.codec.encode(row)?;
            // only the final sample of a chunk forces transmission
            let pushthrough = index + 1 == rows.len();
            self.handle.push(Packet {
                data,
                timestamp,
                pushthrough,
            })?;
        }
        Ok(())
    }

    /// Push one pre-flattened, sample-major buffer
    ///
    /// The buffer length must be a whole multiple of the channel count.
    /// An empty buffer is a no-op.
    pub fn push_flat_chunk(&self, flat: &Sample, timestamps: ChunkTimestamps) -> Result<()> {
        self.lifecycle.ensure_alive()?;
        if flat.is_empty() {
            return Ok(());
        }
        let sample_count = validate_flat(flat, self.format, self.channel_count)?;
        let stamps = timestamps.resolve(sample_count, local_clock())?;

        let rows = crate::format::chunk::split_rows(flat.clone(), self.channel_count);
        for (index, (row, &timestamp)) in rows.iter().zip(stamps.iter()).enumerate() {
            let data = self.codec.encode(row)?;
            let pushthrough = index + 1 == rows.len();
            self.handle.push(Packet {
                data,
                timestamp,
                pushthrough,
            })?;
        }
        Ok(())
    }

    /// Whether at least one inlet is currently subscribed; never blocks
    pub fn have_consumers(&self) -> bool {
        !self.lifecycle.is_destroyed() && self.handle.consumer_count() > 0
    }

    /// Block until a consumer subscribes or the timeout elapses
    ///
    /// The only outlet operation that may suspend the caller. Returns
    /// whether a consumer is present.
    pub async fn wait_for_consumers(&self, timeout: Duration) -> Result<bool> {
        self.lifecycle.ensure_alive()?;
        Ok(self.handle.wait_for_consumers(Instant::now() + timeout).await)
    }

    /// The stream descriptor, host-assigned fields included
    pub fn info(&self) -> Result<&StreamDescriptor> {
        self.lifecycle.ensure_alive()?;
        Ok(self.handle.info()?)
    }

    /// Withdraw the stream from the network
    ///
    /// Idempotent; further calls are no-ops. Consumers observe the loss
    /// promptly. Dropping the outlet without calling this runs the same
    /// teardown exactly once.
    pub fn destroy(&mut self) {
        if self.lifecycle.begin_destroy() {
            self.handle.destroy();
        }
    }
}

impl Drop for Outlet {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_and_outlet(format: ChannelFormat, channels: usize) -> (Engine, Outlet) {
        let engine = Engine::new();
        let desc =
            StreamDescriptor::new("test", "EEG", channels, 100.0, format, "").unwrap();
        let outlet = Outlet::new(&engine, desc, OutletOptions::default()).unwrap();
        (engine, outlet)
    }

    #[tokio::test]
    async fn test_undefined_format_is_config_error() {
        let engine = Engine::new();
        let desc = StreamDescriptor {
            name: "x".into(),
            stream_type: "EEG".into(),
            channel_count: 1,
            nominal_srate: 0.0,
            channel_format: ChannelFormat::Undefined,
            source_id: "sid".into(),
            host: None,
        };
        assert!(matches!(
            Outlet::new(&engine, desc, OutletOptions::default()),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_non_positive_buffer_window_rejected() {
        let engine = Engine::new();
        let desc =
            StreamDescriptor::new("x", "EEG", 1, 0.0, ChannelFormat::Float32, "").unwrap();
        let result = Outlet::new(
            &engine,
            desc,
            OutletOptions::default().max_buffered_secs(0.0),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_info_has_host_fields_after_binding() {
        let (_engine, outlet) = engine_and_outlet(ChannelFormat::Float32, 4);
        let info = outlet.info().unwrap();
        let host = info.host.as_ref().unwrap();
        assert!(!host.uid.is_empty());
        assert!(host.created_at >= 0.0);
    }

    #[tokio::test]
    async fn test_push_sample_shape_validated() {
        let (_engine, outlet) = engine_and_outlet(ChannelFormat::Float32, 4);
        let short = Sample::Float32(vec![1.0, 2.0]);
        match outlet.push_sample(&short) {
            Err(Error::Validation {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 2);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_chunk_is_noop() {
        let (_engine, outlet) = engine_and_outlet(ChannelFormat::Int16, 2);
        outlet.push_chunk(&[], ChunkTimestamps::Now).unwrap();
        outlet
            .push_flat_chunk(&Sample::Int16(vec![]), ChunkTimestamps::Now)
            .unwrap();
    }

    #[tokio::test]
    async fn test_chunk_timestamp_length_mismatch_rejected() {
        let (_engine, outlet) = engine_and_outlet(ChannelFormat::Int16, 2);
        let rows = vec![Sample::Int16(vec![1, 2]), Sample::Int16(vec![3, 4])];
        let result = outlet.push_chunk(&rows, ChunkTimestamps::PerSample(vec![1.0]));
        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let (_engine, mut outlet) = engine_and_outlet(ChannelFormat::Float32, 1);
        outlet.destroy();
        outlet.destroy();
        // pushes after destroy fail, destroy itself never does
        assert!(matches!(
            outlet.push_sample(&Sample::Float32(vec![0.0])),
            Err(Error::Destroyed(_))
        ));
        assert!(!outlet.have_consumers());
    }

    #[tokio::test]
    async fn test_wait_for_consumers_times_out() {
        let (_engine, outlet) = engine_and_outlet(ChannelFormat::Float32, 1);
        let waited = outlet
            .wait_for_consumers(Duration::from_millis(40))
            .await
            .unwrap();
        assert!(!waited);
    }
}
