//! Binary weight blob codec.
//!
//! Layout (all integers and floats little-endian):
//!
//! ```text
//! magic          [u8; 4]   b"FNNW"
//! format_version u16       1
//! float_width    u8        4 or 8
//! reserved       u8        0
//! layer_count    u32
//! layer_sizes    [u32; layer_count]
//! per layer pair, input side first:
//!     weights    [float; in * out]   row-major, one row per input neuron
//!     biases     [float; out]
//! checksum       [u8; 32]  SHA-256 of every preceding byte
//! ```
//!
//! The checksum is verified before anything else is parsed, so a torn write
//! is reported as corrupt instead of decoding into plausible weights.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::layers::Layer;
use crate::math::Matrix;
use crate::network::{ModelSpec, NetworkWeights};

pub const MAGIC: [u8; 4] = *b"FNNW";
pub const FORMAT_VERSION: u16 = 1;
const CHECKSUM_LEN: usize = 32;
const FIXED_HEADER_LEN: usize = 4 + 2 + 1 + 1 + 4;

/// Precision of the floats stored in a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloatWidth {
    F32,
    #[default]
    F64,
}

impl FloatWidth {
    pub fn bytes(self) -> usize {
        match self {
            FloatWidth::F32 => 4,
            FloatWidth::F64 => 8,
        }
    }

    fn from_tag(tag: u8) -> Option<FloatWidth> {
        match tag {
            4 => Some(FloatWidth::F32),
            8 => Some(FloatWidth::F64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobError {
    #[error("blob truncated: needed {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("bad magic {0:?}")]
    BadMagic([u8; 4]),

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    #[error("unsupported float width {0}")]
    UnsupportedFloatWidth(u8),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("layer sizes {got:?} do not match spec {expected:?}")]
    LayerMismatch { expected: Vec<usize>, got: Vec<usize> },
}

/// Parsed fixed part of a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHeader {
    pub format_version: u16,
    pub float_width: FloatWidth,
    pub layer_sizes: Vec<usize>,
}

/// Serializes `weights` into a self-describing, checksummed blob.
pub fn encode(weights: &NetworkWeights, width: FloatWidth) -> Vec<u8> {
    let sizes = weights.layer_sizes();
    let mut out = Vec::with_capacity(
        FIXED_HEADER_LEN + 4 * sizes.len() + width.bytes() * weights.parameter_count() + CHECKSUM_LEN,
    );

    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(width.bytes() as u8);
    out.push(0);
    out.extend_from_slice(&(sizes.len() as u32).to_le_bytes());
    for size in &sizes {
        out.extend_from_slice(&(*size as u32).to_le_bytes());
    }

    for layer in &weights.layers {
        for &value in layer.weights.as_slice().iter().chain(layer.biases.as_slice()) {
            match width {
                FloatWidth::F32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
                FloatWidth::F64 => out.extend_from_slice(&value.to_le_bytes()),
            }
        }
    }

    let checksum = Sha256::digest(&out);
    out.extend_from_slice(&checksum);
    out
}

/// Verifies the checksum and parses the header without decoding the floats.
pub fn read_header(bytes: &[u8]) -> Result<BlobHeader, BlobError> {
    let body = verified_body(bytes)?;
    let mut reader = Reader::new(body);
    parse_header(&mut reader)
}

/// Decodes a blob written by [`encode`] for the model described by `spec`.
///
/// The stored layer sizes must equal `spec.layers`; activations come from
/// the spec since the blob only carries numbers.
pub fn decode(bytes: &[u8], spec: &ModelSpec) -> Result<NetworkWeights, BlobError> {
    let body = verified_body(bytes)?;
    let mut reader = Reader::new(body);
    let header = parse_header(&mut reader)?;

    if header.layer_sizes != spec.layers {
        return Err(BlobError::LayerMismatch {
            expected: spec.layers.clone(),
            got: header.layer_sizes,
        });
    }

    let width = header.float_width;
    let payload: usize = header.layer_sizes
        .windows(2)
        .map(|pair| (pair[0] * pair[1] + pair[1]) * width.bytes())
        .sum();
    if reader.remaining() < payload {
        return Err(BlobError::Truncated {
            needed: reader.pos + payload,
            got: body.len(),
        });
    }
    if reader.remaining() > payload {
        return Err(BlobError::TrailingBytes(reader.remaining() - payload));
    }

    let mut layers = Vec::with_capacity(header.layer_sizes.len().saturating_sub(1));
    for pair in header.layer_sizes.windows(2) {
        let (fan_in, size) = (pair[0], pair[1]);
        let weights = reader.floats(fan_in * size, width)?;
        let biases = reader.floats(size, width)?;
        layers.push(Layer::from_parts(
            Matrix::from_flat(fan_in, size, weights),
            Matrix::row(biases),
            spec.activation,
        ));
    }
    Ok(NetworkWeights::from_layers(layers))
}

/// Hex form of the stored SHA-256 trailer, or `None` if `bytes` is too short
/// to carry one. The trailer is not verified here.
pub fn checksum_hex(bytes: &[u8]) -> Option<String> {
    let start = bytes.len().checked_sub(CHECKSUM_LEN)?;
    Some(bytes[start..].iter().map(|byte| format!("{byte:02x}")).collect())
}

fn verified_body(bytes: &[u8]) -> Result<&[u8], BlobError> {
    if bytes.len() < FIXED_HEADER_LEN + CHECKSUM_LEN {
        return Err(BlobError::Truncated {
            needed: FIXED_HEADER_LEN + CHECKSUM_LEN,
            got: bytes.len(),
        });
    }
    let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if Sha256::digest(body).as_slice() != checksum {
        return Err(BlobError::ChecksumMismatch);
    }
    Ok(body)
}

fn parse_header(reader: &mut Reader<'_>) -> Result<BlobHeader, BlobError> {
    let magic = reader.array::<4>()?;
    if magic != MAGIC {
        return Err(BlobError::BadMagic(magic));
    }

    let format_version = u16::from_le_bytes(reader.array()?);
    if format_version != FORMAT_VERSION {
        return Err(BlobError::UnsupportedVersion(format_version));
    }

    let [tag] = reader.array::<1>()?;
    let float_width = FloatWidth::from_tag(tag).ok_or(BlobError::UnsupportedFloatWidth(tag))?;
    let _reserved = reader.array::<1>()?;

    let layer_count = u32::from_le_bytes(reader.array()?) as usize;
    let sizes_len = layer_count.saturating_mul(4);
    if reader.remaining() < sizes_len {
        return Err(BlobError::Truncated {
            needed: reader.pos.saturating_add(sizes_len),
            got: reader.buf.len(),
        });
    }
    let mut layer_sizes = Vec::with_capacity(layer_count);
    for _ in 0..layer_count {
        layer_sizes.push(u32::from_le_bytes(reader.array()?) as usize);
    }

    Ok(BlobHeader { format_version, float_width, layer_sizes })
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Reader<'a> {
        Reader { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BlobError> {
        let end = self.pos.saturating_add(n);
        let slice = self.buf.get(self.pos..end).ok_or(BlobError::Truncated {
            needed: end,
            got: self.buf.len(),
        })?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], BlobError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn floats(&mut self, count: usize, width: FloatWidth) -> Result<Vec<f64>, BlobError> {
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let value = match width {
                FloatWidth::F32 => f32::from_le_bytes(self.array()?) as f64,
                FloatWidth::F64 => f64::from_le_bytes(self.array()?),
            };
            values.push(value);
        }
        Ok(values)
    }
}
