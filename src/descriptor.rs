//! Stream descriptors
//!
//! The metadata record identifying one stream: what an outlet advertises
//! and what resolvers hand back. Host-assigned fields (uid, session,
//! hostname, creation time, protocol version) only exist once a descriptor
//! has been bound to an outlet or resolved from the network; before that
//! they are `None`.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::format::ChannelFormat;

/// Sampling rate value meaning "irregular rate, no fixed interval"
pub const IRREGULAR_RATE: f64 = 0.0;

/// Queryable descriptor properties, used by property-based resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProperty {
    /// Human-readable stream name
    Name,
    /// Content type (e.g. "EEG", "Markers")
    Type,
    /// Channel count, matched against its decimal rendering
    ChannelCount,
    /// Channel format short name ("float32", "string", ...)
    ChannelFormat,
    /// Application-stable source id
    SourceId,
    /// Host-assigned unique id (resolved descriptors only)
    Uid,
    /// Hostname of the providing machine (resolved descriptors only)
    Hostname,
}

/// Fields assigned by the host side once a stream goes live
#[derive(Debug, Clone, PartialEq)]
pub struct HostInfo {
    /// Unique id of this stream instance; changes when the outlet restarts
    pub uid: String,
    /// Session id grouping streams from one provider run
    pub session_id: String,
    /// Hostname of the providing machine
    pub hostname: String,
    /// Creation time on the provider's local clock
    pub created_at: f64,
    /// Protocol version the provider speaks (major * 100 + minor)
    pub protocol_version: i32,
}

/// Metadata identifying one stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    /// Human-readable name, not required to be unique
    pub name: String,
    /// Content type of the stream
    pub stream_type: String,
    /// Number of channels per sample, at least 1
    pub channel_count: usize,
    /// Nominal sampling rate in Hz; [`IRREGULAR_RATE`] for irregular streams
    pub nominal_srate: f64,
    /// Element format of every channel
    pub channel_format: ChannelFormat,
    /// Application-stable id; derived from the other fields when empty
    pub source_id: String,
    /// Host-assigned fields, `None` until bound or resolved
    pub host: Option<HostInfo>,
}

impl StreamDescriptor {
    /// Create a descriptor for a stream this application provides
    ///
    /// `source_id` left empty is derived deterministically from the other
    /// five fields (see [`StreamDescriptor::fingerprint`]), so identical
    /// construction parameters always yield the same id.
    pub fn new(
        name: impl Into<String>,
        stream_type: impl Into<String>,
        channel_count: usize,
        nominal_srate: f64,
        channel_format: ChannelFormat,
        source_id: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let stream_type = stream_type.into();
        let source_id = source_id.into();

        if channel_count < 1 {
            return Err(Error::Config(
                "channel_count must be at least 1".into(),
            ));
        }
        if !nominal_srate.is_finite() || nominal_srate < 0.0 {
            return Err(Error::Config(format!(
                "nominal_srate must be finite and >= 0 (got {})",
                nominal_srate
            )));
        }

        let mut desc = Self {
            name,
            stream_type,
            channel_count,
            nominal_srate,
            channel_format,
            source_id,
            host: None,
        };
        if desc.source_id.is_empty() {
            desc.source_id = desc.fingerprint();
        }
        Ok(desc)
    }

    /// Stable fingerprint over the identifying fields
    ///
    /// Canonical encoding: name, type, channel count (decimal), the raw
    /// IEEE 754 bit pattern of the nominal rate (hex), and the wire format
    /// tag, joined by the unit separator byte 0x1F, hashed with SHA-256;
    /// the first 16 hex characters form the id. Stable across platforms
    /// and releases.
    pub fn fingerprint(&self) -> String {
        let canonical = format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{:016x}\u{1f}{}",
            self.name,
            self.stream_type,
            self.channel_count,
            self.nominal_srate.to_bits(),
            self.channel_format.tag()
        );
        let digest = Sha256::digest(canonical.as_bytes());
        let mut id = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            id.push_str(&format!("{:02x}", byte));
        }
        id
    }

    /// Host-assigned unique id, empty until bound or resolved
    pub fn uid(&self) -> &str {
        self.host.as_ref().map(|h| h.uid.as_str()).unwrap_or("")
    }

    /// Value of a queryable property as matched by property resolves
    pub fn property(&self, prop: StreamProperty) -> String {
        match prop {
            StreamProperty::Name => self.name.clone(),
            StreamProperty::Type => self.stream_type.clone(),
            StreamProperty::ChannelCount => self.channel_count.to_string(),
            StreamProperty::ChannelFormat => self.channel_format.name().to_string(),
            StreamProperty::SourceId => self.source_id.clone(),
            StreamProperty::Uid => self.uid().to_string(),
            StreamProperty::Hostname => self
                .host
                .as_ref()
                .map(|h| h.hostname.clone())
                .unwrap_or_default(),
        }
    }

    /// Whether `prop` equals `value` on this descriptor
    pub fn matches_property(&self, prop: StreamProperty, value: &str) -> bool {
        self.property(prop) == value
    }
}

impl std::fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, {} ch, {} Hz, {})",
            self.name, self.stream_type, self.channel_count, self.nominal_srate, self.channel_format
        )
    }
}
