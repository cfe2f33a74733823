//! # pulselink
//!
//! Client library for exchanging multi-channel time-series streams over a
//! streaming engine: publish samples through an [`Outlet`], discover
//! streams with the one-shot [`resolve_streams`] family or a
//! [`ContinuousResolver`], and receive through an [`Inlet`].
//!
//! The typed layer lives here — per-format sample and chunk codecs,
//! outlet/inlet state management, discovery with time-based eviction and
//! the destroy-once resource discipline. Transport framing and the
//! discovery protocol live below the [`Engine`] surface.
//!
//! # Quick start
//! ```no_run
//! use std::time::Duration;
//! use pulselink::{
//!     ChannelFormat, Engine, Inlet, InletOptions, Outlet, OutletOptions, Sample,
//!     StreamDescriptor,
//! };
//!
//! # async fn example() -> pulselink::Result<()> {
//! let engine = Engine::new();
//!
//! // provider side
//! let desc = StreamDescriptor::new("BioSemi", "EEG", 8, 256.0, ChannelFormat::Float32, "")?;
//! let outlet = Outlet::new(&engine, desc.clone(), OutletOptions::default())?;
//! outlet.push_sample(&Sample::Float32(vec![0.0; 8]))?;
//!
//! // consumer side
//! let mut inlet = Inlet::new(&engine, &desc, InletOptions::default())?;
//! inlet.open_stream(Duration::from_secs(5)).await?;
//! if let Some((sample, timestamp)) = inlet.pull_sample(Duration::from_secs(1)).await? {
//!     println!("{:?} @ {}", sample, timestamp);
//! }
//! # Ok(())
//! # }
//! ```

pub mod descriptor;
pub mod engine;
pub mod error;
pub mod format;
pub mod inlet;
pub mod outlet;
pub mod resolve;

mod lifecycle;

pub use descriptor::{HostInfo, StreamDescriptor, StreamProperty, IRREGULAR_RATE};
pub use engine::{
    library_info, library_version, local_clock, protocol_version, Engine, LIBRARY_VERSION,
    PROTOCOL_VERSION,
};
pub use error::{Error, Result};
pub use format::{ChannelFormat, ChunkTimestamps, Sample};
pub use inlet::{Inlet, InletOptions, PostProcessing};
pub use outlet::{Outlet, OutletOptions};
pub use resolve::{
    resolve_by_pred, resolve_by_prop, resolve_streams, ContinuousResolver, StreamFilter,
};
