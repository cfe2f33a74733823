//! Per-format sample encoding and decoding
//!
//! One codec is selected per outlet/inlet at construction time and reused
//! for every push or pull, so the format dispatch happens exactly once.
//! Numeric elements are copied into a width-sized contiguous little-endian
//! buffer; strings are length-prefixed (u32-LE) UTF-8 and each element is
//! an independent owned copy.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

use super::{ChannelFormat, Sample};

/// Encode/decode routine pair for one channel format
///
/// Implementations are stateless; the channel count travels with each call
/// because flattened chunk buffers carry a multiple of it.
pub trait SampleCodec: Send + Sync {
    /// The format this codec serves
    fn format(&self) -> ChannelFormat;

    /// Encode `count` elements of `sample` into a wire buffer
    ///
    /// `sample` length must already be validated by the caller; this only
    /// checks the variant.
    fn encode(&self, sample: &Sample) -> Result<Bytes>;

    /// Decode a wire buffer into a sample value
    ///
    /// For fixed-width formats the buffer length must be a multiple of the
    /// element width; for strings the length prefixes must be consistent.
    fn decode(&self, buf: &[u8]) -> Result<Sample>;

    /// Number of elements encoded in `buf`
    fn element_count(&self, buf: &[u8]) -> Result<usize>;
}

/// Select the codec for a format
///
/// `ChannelFormat::Undefined` is not streamable and fails with a
/// configuration error, as does any format this build does not support.
pub fn codec_for(format: ChannelFormat) -> Result<Box<dyn SampleCodec>> {
    match format {
        ChannelFormat::Undefined => Err(Error::Config(
            "channel format 'undefined' cannot be bound to an outlet or inlet".into(),
        )),
        ChannelFormat::String => Ok(Box::new(StringCodec)),
        numeric => Ok(Box::new(NumericCodec { format: numeric })),
    }
}

/// Codec for all fixed-width numeric formats
struct NumericCodec {
    format: ChannelFormat,
}

impl SampleCodec for NumericCodec {
    fn format(&self) -> ChannelFormat {
        self.format
    }

    fn encode(&self, sample: &Sample) -> Result<Bytes> {
        sample.expect_format(self.format)?;
        // width is always known for the numeric variants routed here
        let width = self.format.byte_width().unwrap_or(0);
        let mut buf = BytesMut::with_capacity(sample.len() * width);

        match sample {
            Sample::Float32(v) => {
                for &x in v {
                    buf.put_f32_le(x);
                }
            }
            Sample::Double64(v) => {
                for &x in v {
                    buf.put_f64_le(x);
                }
            }
            Sample::Int32(v) => {
                for &x in v {
                    buf.put_i32_le(x);
                }
            }
            Sample::Int16(v) => {
                for &x in v {
                    buf.put_i16_le(x);
                }
            }
            Sample::Int8(v) => {
                for &x in v {
                    buf.put_i8(x);
                }
            }
            Sample::Int64(v) => {
                for &x in v {
                    buf.put_i64_le(x);
                }
            }
            Sample::String(_) => unreachable!("string samples routed to StringCodec"),
        }

        Ok(buf.freeze())
    }

    fn decode(&self, buf: &[u8]) -> Result<Sample> {
        let width = self.format.byte_width().unwrap_or(1);
        if buf.len() % width != 0 {
            return Err(Error::Internal(format!(
                "wire buffer of {} bytes is not a multiple of element width {}",
                buf.len(),
                width
            )));
        }

        let count = buf.len() / width;
        let mut cursor = buf;
        let sample = match self.format {
            ChannelFormat::Float32 => {
                let mut v = Vec::with_capacity(count);
                for _ in 0..count {
                    v.push(cursor.get_f32_le());
                }
                Sample::Float32(v)
            }
            ChannelFormat::Double64 => {
                let mut v = Vec::with_capacity(count);
                for _ in 0..count {
                    v.push(cursor.get_f64_le());
                }
                Sample::Double64(v)
            }
            ChannelFormat::Int32 => {
                let mut v = Vec::with_capacity(count);
                for _ in 0..count {
                    v.push(cursor.get_i32_le());
                }
                Sample::Int32(v)
            }
            ChannelFormat::Int16 => {
                let mut v = Vec::with_capacity(count);
                for _ in 0..count {
                    v.push(cursor.get_i16_le());
                }
                Sample::Int16(v)
            }
            ChannelFormat::Int8 => {
                let mut v = Vec::with_capacity(count);
                for _ in 0..count {
                    v.push(cursor.get_i8());
                }
                Sample::Int8(v)
            }
            ChannelFormat::Int64 => {
                let mut v = Vec::with_capacity(count);
                for _ in 0..count {
                    v.push(cursor.get_i64_le());
                }
                Sample::Int64(v)
            }
            _ => unreachable!("non-numeric formats never construct NumericCodec"),
        };

        Ok(sample)
    }

    fn element_count(&self, buf: &[u8]) -> Result<usize> {
        let width = self.format.byte_width().unwrap_or(1);
        Ok(buf.len() / width)
    }
}

/// Codec for variable-length string channels
struct StringCodec;

impl SampleCodec for StringCodec {
    fn format(&self) -> ChannelFormat {
        ChannelFormat::String
    }

    fn encode(&self, sample: &Sample) -> Result<Bytes> {
        let strings = match sample {
            Sample::String(v) => v,
            other => {
                other.expect_format(ChannelFormat::String)?;
                unreachable!()
            }
        };

        let total: usize = strings.iter().map(|s| 4 + s.len()).sum();
        let mut buf = BytesMut::with_capacity(total);
        for s in strings {
            if s.len() > u32::MAX as usize {
                return Err(Error::Config(format!(
                    "string element of {} bytes exceeds the wire limit",
                    s.len()
                )));
            }
            buf.put_u32_le(s.len() as u32);
            buf.put_slice(s.as_bytes());
        }

        Ok(buf.freeze())
    }

    fn decode(&self, buf: &[u8]) -> Result<Sample> {
        let mut cursor = buf;
        let mut v = Vec::new();
        while cursor.has_remaining() {
            if cursor.remaining() < 4 {
                return Err(Error::Internal(
                    "truncated string length prefix in wire buffer".into(),
                ));
            }
            let len = cursor.get_u32_le() as usize;
            if cursor.remaining() < len {
                return Err(Error::Internal(format!(
                    "string element claims {} bytes but only {} remain",
                    len,
                    cursor.remaining()
                )));
            }
            let text = std::str::from_utf8(&cursor[..len])
                .map_err(|e| Error::Internal(format!("invalid UTF-8 in string element: {}", e)))?
                .to_owned();
            cursor.advance(len);
            v.push(text);
        }

        Ok(Sample::String(v))
    }

    fn element_count(&self, buf: &[u8]) -> Result<usize> {
        let mut cursor = buf;
        let mut count = 0;
        while cursor.has_remaining() {
            if cursor.remaining() < 4 {
                return Err(Error::Internal(
                    "truncated string length prefix in wire buffer".into(),
                ));
            }
            let len = cursor.get_u32_le() as usize;
            if cursor.remaining() < len {
                return Err(Error::Internal(
                    "truncated string element in wire buffer".into(),
                ));
            }
            cursor.advance(len);
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(format: ChannelFormat, sample: Sample) -> Sample {
        let codec = codec_for(format).unwrap();
        let wire = codec.encode(&sample).unwrap();
        assert_eq!(codec.element_count(&wire).unwrap(), sample.len());
        codec.decode(&wire).unwrap()
    }

    #[test]
    fn test_undefined_format_rejected() {
        assert!(matches!(
            codec_for(ChannelFormat::Undefined),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_float32_round_trip() {
        let sample = Sample::Float32(vec![1.5, -2.25, 0.0, f32::MAX]);
        assert_eq!(round_trip(ChannelFormat::Float32, sample.clone()), sample);
    }

    #[test]
    fn test_double64_round_trip() {
        let sample = Sample::Double64(vec![1.0e-300, 3.141592653589793]);
        assert_eq!(round_trip(ChannelFormat::Double64, sample.clone()), sample);
    }

    #[test]
    fn test_integer_round_trips_are_exact() {
        let s32 = Sample::Int32(vec![i32::MIN, -1, 0, i32::MAX]);
        assert_eq!(round_trip(ChannelFormat::Int32, s32.clone()), s32);

        let s16 = Sample::Int16(vec![i16::MIN, 0, i16::MAX]);
        assert_eq!(round_trip(ChannelFormat::Int16, s16.clone()), s16);

        let s8 = Sample::Int8(vec![i8::MIN, 0, i8::MAX]);
        assert_eq!(round_trip(ChannelFormat::Int8, s8.clone()), s8);

        // values above 2^53 survive: the wire format is integer end to end
        let s64 = Sample::Int64(vec![i64::MIN, (1 << 53) + 1, i64::MAX]);
        assert_eq!(round_trip(ChannelFormat::Int64, s64.clone()), s64);
    }

    #[test]
    fn test_string_round_trip() {
        let sample = Sample::String(vec!["hello".into(), "".into(), "δ wave".into()]);
        assert_eq!(round_trip(ChannelFormat::String, sample.clone()), sample);
    }

    #[test]
    fn test_string_decode_rejects_truncation() {
        let codec = codec_for(ChannelFormat::String).unwrap();
        let sample = Sample::String(vec!["marker".into()]);
        let wire = codec.encode(&sample).unwrap();
        let truncated = &wire[..wire.len() - 2];
        assert!(matches!(codec.decode(truncated), Err(Error::Internal(_))));
    }

    #[test]
    fn test_format_variant_mismatch_rejected() {
        let codec = codec_for(ChannelFormat::Int32).unwrap();
        let wrong = Sample::Float32(vec![1.0]);
        assert!(codec.encode(&wrong).is_err());
    }
}
