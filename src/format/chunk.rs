//! Chunk flattening and timestamp alignment
//!
//! A chunk travels on the wire as one flat, sample-major run of elements.
//! Pushing accepts either ordered per-sample rows (validated row by row,
//! failing fast with the offending row index) or one pre-flattened buffer
//! (validated to be a whole number of samples). Pulling splits a flat run
//! back into rows, with timestamps aligned 1:1 in arrival order.

use crate::error::{Error, Result};

use super::{ChannelFormat, Sample};

/// Timestamping for a pushed chunk
#[derive(Debug, Clone)]
pub enum ChunkTimestamps {
    /// Stamp every sample with the local clock at push time
    Now,
    /// One explicit value applied to the whole chunk
    Single(f64),
    /// One explicit value per sample, in row order; the length must equal
    /// the chunk's sample count
    PerSample(Vec<f64>),
}

impl ChunkTimestamps {
    /// Expand into one timestamp per sample
    ///
    /// Validated before any engine call, so a bad per-sample length never
    /// leaves partial state behind.
    pub(crate) fn resolve(&self, sample_count: usize, now: f64) -> Result<Vec<f64>> {
        match self {
            ChunkTimestamps::Now => Ok(vec![now; sample_count]),
            ChunkTimestamps::Single(ts) => Ok(vec![*ts; sample_count]),
            ChunkTimestamps::PerSample(stamps) => {
                if stamps.len() != sample_count {
                    return Err(Error::shape(
                        "timestamp array length",
                        sample_count,
                        stamps.len(),
                    ));
                }
                Ok(stamps.clone())
            }
        }
    }
}

/// Validate ordered rows against the stream shape without copying
///
/// Every row must match the stream's format and channel count; the first
/// offending row aborts with its index in the error.
pub(crate) fn validate_rows(
    rows: &[Sample],
    format: ChannelFormat,
    channel_count: usize,
) -> Result<()> {
    for (index, row) in rows.iter().enumerate() {
        row.expect_format(format)?;
        if row.len() != channel_count {
            return Err(Error::shape(
                format!("row {} length", index),
                channel_count,
                row.len(),
            ));
        }
    }
    Ok(())
}

/// Flatten ordered rows into one sample-major buffer
///
/// Every row must match the stream's format and channel count; the first
/// offending row aborts with its index in the error.
pub(crate) fn flatten_rows(
    rows: &[Sample],
    format: ChannelFormat,
    channel_count: usize,
) -> Result<Sample> {
    validate_rows(rows, format, channel_count)?;

    let total = rows.len() * channel_count;
    let flat = match format {
        ChannelFormat::Float32 => {
            let mut out = Vec::with_capacity(total);
            for row in rows {
                if let Sample::Float32(v) = row {
                    out.extend_from_slice(v);
                }
            }
            Sample::Float32(out)
        }
        ChannelFormat::Double64 => {
            let mut out = Vec::with_capacity(total);
            for row in rows {
                if let Sample::Double64(v) = row {
                    out.extend_from_slice(v);
                }
            }
            Sample::Double64(out)
        }
        ChannelFormat::String => {
            let mut out = Vec::with_capacity(total);
            for row in rows {
                if let Sample::String(v) = row {
                    out.extend(v.iter().cloned());
                }
            }
            Sample::String(out)
        }
        ChannelFormat::Int32 => {
            let mut out = Vec::with_capacity(total);
            for row in rows {
                if let Sample::Int32(v) = row {
                    out.extend_from_slice(v);
                }
            }
            Sample::Int32(out)
        }
        ChannelFormat::Int16 => {
            let mut out = Vec::with_capacity(total);
            for row in rows {
                if let Sample::Int16(v) = row {
                    out.extend_from_slice(v);
                }
            }
            Sample::Int16(out)
        }
        ChannelFormat::Int8 => {
            let mut out = Vec::with_capacity(total);
            for row in rows {
                if let Sample::Int8(v) = row {
                    out.extend_from_slice(v);
                }
            }
            Sample::Int8(out)
        }
        ChannelFormat::Int64 => {
            let mut out = Vec::with_capacity(total);
            for row in rows {
                if let Sample::Int64(v) = row {
                    out.extend_from_slice(v);
                }
            }
            Sample::Int64(out)
        }
        ChannelFormat::Undefined => {
            return Err(Error::Config(
                "channel format 'undefined' cannot carry chunks".into(),
            ))
        }
    };

    Ok(flat)
}

/// Validate a pre-flattened buffer and return its sample count
pub(crate) fn validate_flat(
    flat: &Sample,
    format: ChannelFormat,
    channel_count: usize,
) -> Result<usize> {
    flat.expect_format(format)?;
    if flat.len() % channel_count != 0 {
        return Err(Error::shape(
            "flat chunk length (must be a multiple of the channel count)",
            channel_count,
            flat.len(),
        ));
    }
    Ok(flat.len() / channel_count)
}

/// Split a flat sample-major buffer back into per-sample rows
///
/// The buffer length is expected to be a whole number of samples; a ragged
/// tail (fewer elements than one sample) is dropped, matching the floor
/// division the pull path uses for the sample count.
pub(crate) fn split_rows(flat: Sample, channel_count: usize) -> Vec<Sample> {
    let samples = flat.len() / channel_count;
    let mut rows = Vec::with_capacity(samples);

    match flat {
        Sample::Float32(v) => {
            for chunk in v.chunks_exact(channel_count) {
                rows.push(Sample::Float32(chunk.to_vec()));
            }
        }
        Sample::Double64(v) => {
            for chunk in v.chunks_exact(channel_count) {
                rows.push(Sample::Double64(chunk.to_vec()));
            }
        }
        Sample::String(v) => {
            let mut iter = v.into_iter();
            for _ in 0..samples {
                rows.push(Sample::String(iter.by_ref().take(channel_count).collect()));
            }
        }
        Sample::Int32(v) => {
            for chunk in v.chunks_exact(channel_count) {
                rows.push(Sample::Int32(chunk.to_vec()));
            }
        }
        Sample::Int16(v) => {
            for chunk in v.chunks_exact(channel_count) {
                rows.push(Sample::Int16(chunk.to_vec()));
            }
        }
        Sample::Int8(v) => {
            for chunk in v.chunks_exact(channel_count) {
                rows.push(Sample::Int8(chunk.to_vec()));
            }
        }
        Sample::Int64(v) => {
            for chunk in v.chunks_exact(channel_count) {
                rows.push(Sample::Int64(chunk.to_vec()));
            }
        }
    }

    rows
}
