//! Channel formats and sample values
//!
//! The seven element formats a stream can carry, their wire-stable numeric
//! tags, and the tagged [`Sample`] value that moves through outlets and
//! inlets. Numeric formats have a fixed byte width; `String` is
//! variable-length (u32-LE length prefix followed by UTF-8 bytes).
//!
//! Wire tags:
//! ```text
//! 0 - Undefined (not streamable)
//! 1 - Float32   (4 bytes, IEEE 754 single)
//! 2 - Double64  (8 bytes, IEEE 754 double)
//! 3 - String    (variable, length-prefixed UTF-8)
//! 4 - Int32     (4 bytes)
//! 5 - Int16     (2 bytes)
//! 6 - Int8      (1 byte)
//! 7 - Int64     (8 bytes)
//! ```

pub mod chunk;
pub mod codec;

pub use chunk::ChunkTimestamps;
pub use codec::{codec_for, SampleCodec};

use crate::error::{Error, Result};

/// Element format of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ChannelFormat {
    /// Unknown or unset; cannot be bound to an outlet or inlet
    Undefined = 0,
    /// 32-bit IEEE 754 float
    Float32 = 1,
    /// 64-bit IEEE 754 double
    Double64 = 2,
    /// Variable-length UTF-8 string
    String = 3,
    /// 32-bit signed integer
    Int32 = 4,
    /// 16-bit signed integer
    Int16 = 5,
    /// 8-bit signed integer
    Int8 = 6,
    /// 64-bit signed integer
    Int64 = 7,
}

impl ChannelFormat {
    /// Parse a wire tag back into a format
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(ChannelFormat::Undefined),
            1 => Some(ChannelFormat::Float32),
            2 => Some(ChannelFormat::Double64),
            3 => Some(ChannelFormat::String),
            4 => Some(ChannelFormat::Int32),
            5 => Some(ChannelFormat::Int16),
            6 => Some(ChannelFormat::Int8),
            7 => Some(ChannelFormat::Int64),
            _ => None,
        }
    }

    /// Wire-stable numeric tag
    pub fn tag(self) -> i32 {
        self as i32
    }

    /// Fixed byte width per element, or `None` for variable-length formats
    pub fn byte_width(self) -> Option<usize> {
        match self {
            ChannelFormat::Float32 => Some(4),
            ChannelFormat::Double64 => Some(8),
            ChannelFormat::Int32 => Some(4),
            ChannelFormat::Int16 => Some(2),
            ChannelFormat::Int8 => Some(1),
            ChannelFormat::Int64 => Some(8),
            ChannelFormat::String => None,
            ChannelFormat::Undefined => None,
        }
    }

    /// Short lowercase name, used in descriptor matching and logs
    pub fn name(self) -> &'static str {
        match self {
            ChannelFormat::Undefined => "undefined",
            ChannelFormat::Float32 => "float32",
            ChannelFormat::Double64 => "double64",
            ChannelFormat::String => "string",
            ChannelFormat::Int32 => "int32",
            ChannelFormat::Int16 => "int16",
            ChannelFormat::Int8 => "int8",
            ChannelFormat::Int64 => "int64",
        }
    }
}

impl std::fmt::Display for ChannelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One multi-channel sample (or a pre-flattened run of samples)
///
/// Homogeneous: one vector whose variant must match the stream's channel
/// format and whose length must equal the channel count (or a multiple of
/// it for flattened chunks).
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// 32-bit float elements
    Float32(Vec<f32>),
    /// 64-bit float elements
    Double64(Vec<f64>),
    /// String elements; each element is an independent owned copy
    String(Vec<String>),
    /// 32-bit integer elements
    Int32(Vec<i32>),
    /// 16-bit integer elements
    Int16(Vec<i16>),
    /// 8-bit integer elements
    Int8(Vec<i8>),
    /// 64-bit integer elements; values above 2^53 lose precision when a
    /// consumer converts them to double
    Int64(Vec<i64>),
}

impl Sample {
    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            Sample::Float32(v) => v.len(),
            Sample::Double64(v) => v.len(),
            Sample::String(v) => v.len(),
            Sample::Int32(v) => v.len(),
            Sample::Int16(v) => v.len(),
            Sample::Int8(v) => v.len(),
            Sample::Int64(v) => v.len(),
        }
    }

    /// True when there are no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The channel format this value belongs to
    pub fn format(&self) -> ChannelFormat {
        match self {
            Sample::Float32(_) => ChannelFormat::Float32,
            Sample::Double64(_) => ChannelFormat::Double64,
            Sample::String(_) => ChannelFormat::String,
            Sample::Int32(_) => ChannelFormat::Int32,
            Sample::Int16(_) => ChannelFormat::Int16,
            Sample::Int8(_) => ChannelFormat::Int8,
            Sample::Int64(_) => ChannelFormat::Int64,
        }
    }

    /// Check that the variant matches `format`, with a typed error otherwise
    pub(crate) fn expect_format(&self, format: ChannelFormat) -> Result<()> {
        if self.format() == format {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "sample format {} does not match stream format {}",
                self.format(),
                format
            )))
        }
    }
}
