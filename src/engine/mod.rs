//! Streaming engine surface
//!
//! The call surface the client layer consumes: stream registration, push
//! and pull entry points, discovery queries, the local clock and version
//! constants. [`Engine`] is the process-wide handle; it routes everything
//! through an in-process stream bus, which plays the role of the opaque
//! transport (wire framing and multicast discovery live below this layer
//! and are not part of the contract).

pub(crate) mod bus;

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::error::Error;

use bus::Bus;

// Engine status codes, wire-stable.
/// Operation completed
pub const STATUS_OK: i32 = 0;
/// Deadline elapsed with no data or event
pub const STATUS_TIMEOUT: i32 = -1;
/// The stream this handle was bound to disappeared
pub const STATUS_LOST: i32 = -2;
/// An argument was rejected by the engine
pub const STATUS_INVALID_ARGUMENT: i32 = -3;
/// Engine-internal failure
pub const STATUS_INTERNAL: i32 = -4;

/// Protocol version spoken on the wire (major * 100 + minor)
pub const PROTOCOL_VERSION: i32 = 110;

/// Library version (major * 100 + minor)
pub const LIBRARY_VERSION: i32 = 102;

/// Assumed rate for sizing buffers of irregular-rate streams, in Hz
pub(crate) const ASSUMED_IRREGULAR_RATE: f64 = 100.0;

/// Polling cadence for discovery and consumer-wait loops
pub(crate) const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(20);

/// Engine-level failure, carrying the wire-stable status code
#[derive(Debug, Clone)]
pub(crate) enum EngineError {
    Timeout,
    Lost(String),
    InvalidArgument(String),
    Internal(String),
}

impl EngineError {
    /// The wire-stable status code for this failure
    #[allow(dead_code)]
    pub(crate) fn code(&self) -> i32 {
        match self {
            EngineError::Timeout => STATUS_TIMEOUT,
            EngineError::Lost(_) => STATUS_LOST,
            EngineError::InvalidArgument(_) => STATUS_INVALID_ARGUMENT,
            EngineError::Internal(_) => STATUS_INTERNAL,
        }
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Timeout => Error::Timeout("engine call"),
            EngineError::Lost(what) => Error::Lost(what),
            EngineError::InvalidArgument(msg) => Error::Config(msg),
            EngineError::Internal(msg) => Error::Internal(msg),
        }
    }
}

/// Handle to the streaming engine
///
/// Cheap to clone; all clones share one stream bus. Outlets, inlets and
/// resolvers are constructed against a handle and only ever see streams
/// registered through the same one.
#[derive(Clone)]
pub struct Engine {
    bus: Arc<Bus>,
}

impl Engine {
    /// Create an engine with its own private stream bus
    pub fn new() -> Self {
        Self { bus: Bus::new() }
    }

    pub(crate) fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("streams", &self.bus.stream_count())
            .finish()
    }
}

/// Reading of the local monotonic clock, in seconds
///
/// All sample timestamps and descriptor creation times are expressed on
/// this clock. The epoch is fixed at first use and shared process-wide.
pub fn local_clock() -> f64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}

/// Protocol version spoken on the wire
pub fn protocol_version() -> i32 {
    PROTOCOL_VERSION
}

/// Version of this library (major * 100 + minor)
pub fn library_version() -> i32 {
    LIBRARY_VERSION
}

/// Human-readable library build information
pub fn library_info() -> &'static str {
    concat!("pulselink ", env!("CARGO_PKG_VERSION"))
}

/// Buffer capacity (in samples) for a buffered-duration window
pub(crate) fn buffer_capacity(nominal_srate: f64, buffered_secs: f64) -> usize {
    let rate = if nominal_srate > 0.0 {
        nominal_srate
    } else {
        ASSUMED_IRREGULAR_RATE
    };
    ((rate * buffered_secs).ceil() as usize).clamp(16, 65_536)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_clock_is_monotonic() {
        let a = local_clock();
        let b = local_clock();
        assert!(b >= a);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(EngineError::Timeout.code(), STATUS_TIMEOUT);
        assert_eq!(EngineError::Lost("x".into()).code(), STATUS_LOST);
        assert_eq!(
            EngineError::InvalidArgument("x".into()).code(),
            STATUS_INVALID_ARGUMENT
        );
        assert_eq!(EngineError::Internal("x".into()).code(), STATUS_INTERNAL);
        assert_eq!(STATUS_OK, 0);
    }

    #[test]
    fn test_buffer_capacity_bounds() {
        assert_eq!(buffer_capacity(100.0, 1.0), 100);
        assert_eq!(buffer_capacity(0.0, 1.0), 100); // irregular rate assumption
        assert_eq!(buffer_capacity(1.0, 1.0), 16); // floor
        assert_eq!(buffer_capacity(1_000_000.0, 360.0), 65_536); // ceiling
    }

    #[test]
    fn test_version_surface() {
        assert_eq!(protocol_version(), 110);
        assert_eq!(library_version(), LIBRARY_VERSION);
        assert!(library_info().starts_with("pulselink"));
    }
}
