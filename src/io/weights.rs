//! Safetensors reader for pretrained network weights.
//!
//! The feature extractor's convolution weights are stored in the
//! safetensors format (converted offline from the torchvision VGG-19
//! checkpoint, keeping the `features.{i}.weight` / `features.{i}.bias`
//! parameter names):
//!
//! ```text
//! file := header_len: u64 (little-endian)
//!         header: JSON { "tensor_name": { "dtype", "shape", "data_offsets" }, ... }
//!         tensor_data
//! ```
//!
//! Only F32 tensors are accepted; this is a weights reader, not a general
//! tensor store.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while reading a weight file.
#[derive(Debug, Error)]
pub enum WeightsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid safetensors header: {0}")]
    InvalidHeader(String),

    #[error("tensor '{0}' not found in weight file")]
    MissingTensor(String),

    #[error("tensor '{name}' has dtype {dtype}, only F32 is supported")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("tensor '{name}' has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        actual: Vec<usize>,
        expected: Vec<usize>,
    },
}

#[derive(Debug, Deserialize)]
struct TensorMeta {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

/// An in-memory named-tensor store.
#[derive(Debug, Clone, Default)]
pub struct WeightStore {
    tensors: HashMap<String, (Vec<usize>, Vec<f32>)>,
}

impl WeightStore {
    /// Read and parse a safetensors file from disk.
    pub fn load(path: &Path) -> Result<Self, WeightsError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Parse safetensors bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WeightsError> {
        let mut cursor = Cursor::new(bytes);
        let header_len = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| WeightsError::InvalidHeader("file shorter than 8 bytes".into()))?
            as usize;

        let header_end = 8usize
            .checked_add(header_len)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                WeightsError::InvalidHeader(format!(
                    "header length {header_len} exceeds file size {}",
                    bytes.len()
                ))
            })?;
        let header: HashMap<String, serde_json::Value> =
            serde_json::from_slice(&bytes[8..header_end])
                .map_err(|e| WeightsError::InvalidHeader(e.to_string()))?;

        let data = &bytes[header_end..];
        let mut tensors = HashMap::new();
        for (name, value) in header {
            if name == "__metadata__" {
                continue;
            }
            let meta: TensorMeta = serde_json::from_value(value)
                .map_err(|e| WeightsError::InvalidHeader(format!("tensor '{name}': {e}")))?;
            if meta.dtype != "F32" {
                return Err(WeightsError::UnsupportedDtype {
                    name,
                    dtype: meta.dtype,
                });
            }
            let [start, end] = meta.data_offsets;
            let numel: usize = meta.shape.iter().product();
            if end > data.len() || start > end || end - start != numel * 4 {
                return Err(WeightsError::InvalidHeader(format!(
                    "tensor '{name}' offsets [{start}, {end}) inconsistent with shape {:?}",
                    meta.shape
                )));
            }
            let mut values = vec![0.0f32; numel];
            Cursor::new(&data[start..end]).read_f32_into::<LittleEndian>(&mut values)?;
            tensors.insert(name, (meta.shape, values));
        }
        Ok(Self { tensors })
    }

    /// Insert a tensor directly; used to build synthetic stores in tests.
    pub fn insert(&mut self, name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) {
        assert_eq!(shape.iter().product::<usize>(), data.len());
        self.tensors.insert(name.into(), (shape, data));
    }

    /// Fetch a tensor by name, validating its shape.
    pub fn tensor(&self, name: &str, expected: &[usize]) -> Result<&[f32], WeightsError> {
        let (shape, data) = self
            .tensors
            .get(name)
            .ok_or_else(|| WeightsError::MissingTensor(name.to_string()))?;
        if shape != expected {
            return Err(WeightsError::ShapeMismatch {
                name: name.to_string(),
                actual: shape.clone(),
                expected: expected.to_vec(),
            });
        }
        Ok(data)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}
