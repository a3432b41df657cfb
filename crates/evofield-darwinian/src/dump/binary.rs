//! Minimal binary dump
//!
//! Little-endian, fixed field order:
//!
//! ```text
//! magic       4 bytes  "EVFD"
//! version     u16
//! generation  u64
//! metrics     4 × f64  compactness, performance, energy, aggregate
//! energy      f64
//! code_hash   u64
//! count       u64
//! weights     count × f64  upper triangle, diagonal included
//! ```

use std::fs;
use std::path::Path;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use evofield_common::FitnessMetrics;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DUMP_MAGIC: &[u8; 4] = b"EVFD";
pub const DUMP_VERSION: u16 = 1;

/// Fixed-size prefix: magic, version, generation, 5 doubles, hash, count
const HEADER_LEN: usize = 4 + 2 + 8 + 5 * 8 + 8 + 8;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("Bad magic: {0:?}")]
    BadMagic([u8; 4]),

    #[error("Unsupported dump version {0}")]
    UnsupportedVersion(u16),

    #[error("Truncated dump: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("{0} trailing bytes after dump")]
    TrailingBytes(usize),

    #[error("Weight vector of length {len} does not fit a {nodes}-node lattice")]
    WeightShape { len: usize, nodes: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Minimal evolution record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpRecord {
    pub generation: u64,
    pub metrics: FitnessMetrics,
    pub energy_state: f64,
    pub code_hash: u64,
    /// Upper-triangle-compressed couplings
    pub weights: Vec<f64>,
}

impl DumpRecord {
    /// Serialized length in bytes
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.weights.len() * 8
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(DUMP_MAGIC);
        buf.put_u16_le(DUMP_VERSION);
        buf.put_u64_le(self.generation);
        for value in self.metrics.as_array() {
            buf.put_f64_le(value);
        }
        buf.put_f64_le(self.energy_state);
        buf.put_u64_le(self.code_hash);
        buf.put_u64_le(self.weights.len() as u64);
        for w in &self.weights {
            buf.put_f64_le(*w);
        }
        buf.freeze()
    }

    pub fn decode(mut data: &[u8]) -> Result<Self, DumpError> {
        ensure(data, HEADER_LEN)?;

        let mut magic = [0u8; 4];
        data.copy_to_slice(&mut magic);
        if &magic != DUMP_MAGIC {
            return Err(DumpError::BadMagic(magic));
        }
        let version = data.get_u16_le();
        if version != DUMP_VERSION {
            return Err(DumpError::UnsupportedVersion(version));
        }

        let generation = data.get_u64_le();
        let mut metrics = [0.0; 4];
        for value in metrics.iter_mut() {
            *value = data.get_f64_le();
        }
        let energy_state = data.get_f64_le();
        let code_hash = data.get_u64_le();
        let count = data.get_u64_le() as usize;

        let needed = count.checked_mul(8).ok_or(DumpError::Truncated {
            needed: usize::MAX,
            available: data.remaining(),
        })?;
        ensure(data, needed)?;
        let weights = (0..count).map(|_| data.get_f64_le()).collect();

        if data.has_remaining() {
            return Err(DumpError::TrailingBytes(data.remaining()));
        }

        Ok(Self {
            generation,
            metrics: FitnessMetrics::from_array(metrics),
            energy_state,
            code_hash,
            weights,
        })
    }

    pub fn write_to(&self, path: &Path) -> Result<(), DumpError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.encode())?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self, DumpError> {
        Self::decode(&fs::read(path)?)
    }
}

fn ensure(data: &[u8], needed: usize) -> Result<(), DumpError> {
    if data.len() < needed {
        return Err(DumpError::Truncated {
            needed,
            available: data.len(),
        });
    }
    Ok(())
}

/// Upper triangle of a row-major `n×n` matrix, diagonal included
pub fn compress_weights(weights: &[f64], n: usize) -> Result<Vec<f64>, DumpError> {
    if weights.len() != n * n {
        return Err(DumpError::WeightShape {
            len: weights.len(),
            nodes: n,
        });
    }
    let mut out = Vec::with_capacity(n * (n + 1) / 2);
    for i in 0..n {
        out.extend_from_slice(&weights[i * n + i..(i + 1) * n]);
    }
    Ok(out)
}

/// Rebuild a symmetric row-major `n×n` matrix from its upper triangle
pub fn expand_weights(compressed: &[f64], n: usize) -> Result<Vec<f64>, DumpError> {
    if compressed.len() != n * (n + 1) / 2 {
        return Err(DumpError::WeightShape {
            len: compressed.len(),
            nodes: n,
        });
    }
    let mut weights = vec![0.0; n * n];
    let mut values = compressed.iter();
    for i in 0..n {
        for j in i..n {
            if let Some(w) = values.next() {
                weights[i * n + j] = *w;
                weights[j * n + i] = *w;
            }
        }
    }
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DumpRecord {
        DumpRecord {
            generation: 3,
            metrics: FitnessMetrics::from_scores(0.9, 0.25, 0.123_456_789),
            energy_state: -0.000_123,
            code_hash: 0xDEAD_BEEF_0BAD_F00D,
            weights: vec![0.0, 0.05, -0.1, 0.0, f64::MIN_POSITIVE, 0.0],
        }
    }

    #[test]
    fn test_round_trip_is_bit_exact() {
        let written = record();
        let decoded = DumpRecord::decode(&written.encode()).unwrap();

        assert_eq!(decoded.generation, written.generation);
        assert_eq!(decoded.code_hash, written.code_hash);
        assert_eq!(decoded.energy_state.to_bits(), written.energy_state.to_bits());
        for (a, b) in decoded
            .metrics
            .as_array()
            .iter()
            .zip(written.metrics.as_array().iter())
        {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        let bits = |w: &[f64]| w.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&decoded.weights), bits(&written.weights));
    }

    #[test]
    fn test_layout_is_little_endian() {
        let bytes = record().encode();
        assert_eq!(&bytes[..4], DUMP_MAGIC);
        assert_eq!(&bytes[4..6], &DUMP_VERSION.to_le_bytes());
        assert_eq!(&bytes[6..14], &3u64.to_le_bytes());
        assert_eq!(bytes.len(), record().encoded_len());
    }

    #[test]
    fn test_rejects_bad_input() {
        let bytes = record().encode();

        let mut wrong_magic = bytes.to_vec();
        wrong_magic[0] = b'X';
        assert!(matches!(DumpRecord::decode(&wrong_magic), Err(DumpError::BadMagic(_))));

        let mut wrong_version = bytes.to_vec();
        wrong_version[4] = 9;
        assert!(matches!(
            DumpRecord::decode(&wrong_version),
            Err(DumpError::UnsupportedVersion(9))
        ));

        assert!(matches!(
            DumpRecord::decode(&bytes[..bytes.len() - 1]),
            Err(DumpError::Truncated { .. })
        ));

        let mut trailing = bytes.to_vec();
        trailing.push(0);
        assert!(matches!(DumpRecord::decode(&trailing), Err(DumpError::TrailingBytes(1))));
    }

    #[test]
    fn test_weight_compression() {
        // 3×3 symmetric
        let full = vec![0.0, 0.1, 0.2, 0.1, 0.0, 0.3, 0.2, 0.3, 0.0];
        let compressed = compress_weights(&full, 3).unwrap();
        assert_eq!(compressed, vec![0.0, 0.1, 0.2, 0.0, 0.3, 0.0]);
        assert_eq!(expand_weights(&compressed, 3).unwrap(), full);
        assert!(matches!(
            expand_weights(&compressed, 4),
            Err(DumpError::WeightShape { .. })
        ));
    }

    #[test]
    fn test_compress_rejects_short_matrix() {
        let full = vec![0.0, 0.1, 0.1, 0.0];
        assert!(matches!(
            compress_weights(&full, 3),
            Err(DumpError::WeightShape { len: 4, nodes: 3 })
        ));
        assert!(matches!(
            compress_weights(&full[..3], 2),
            Err(DumpError::WeightShape { len: 3, nodes: 2 })
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dumps/evolution.bin");
        record().write_to(&path).unwrap();
        assert_eq!(DumpRecord::read_from(&path).unwrap(), record());
    }
}
