//! Typed per-element attribute columns.
//!
//! A column is one contiguous byte buffer with a fixed number of bytes per
//! element, decided by its [`AttributeKind`]. Values go in and out through
//! `bytemuck` so the buffer never needs alignment guarantees.
//!
//! Invariant: `len() == byte_len() / kind.bytes_per_element()` at all times.
//!
//! Growing always builds a fresh buffer (zero-filled region at the requested
//! end) instead of extending in place; anything that cloned the column before
//! keeps an untouched snapshot.

use std::collections::HashSet;
use std::ops::Range;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Float,
    Int,
    Vec2,
    /// One byte per element, zero = absent
    Presence,
}

impl AttributeKind {
    pub const fn bytes_per_element(self) -> usize {
        match self {
            AttributeKind::Float | AttributeKind::Int => 4,
            AttributeKind::Vec2 => 8,
            AttributeKind::Presence => 1,
        }
    }

    /// Parse the lowercase tag used in node parameters.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "float" => Some(AttributeKind::Float),
            "int" => Some(AttributeKind::Int),
            "vec2" => Some(AttributeKind::Vec2),
            "presence" => Some(AttributeKind::Presence),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttributeError {
    #[error("index {index} out of range for column of length {len}")]
    OutOfRange { index: usize, len: usize },
    #[error("attribute kind mismatch: expected {expected:?}, found {found:?}")]
    KindMismatch {
        expected: AttributeKind,
        found: AttributeKind,
    },
    #[error("attribute '{0}' not found")]
    Missing(String),
}

/// Typed, resizable, filterable per-element buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeColumn {
    kind: AttributeKind,
    data: Vec<u8>,
}

impl AttributeColumn {
    /// Zero-filled column of `len` elements.
    pub fn new(kind: AttributeKind, len: usize) -> Self {
        Self {
            kind,
            data: vec![0; len * kind.bytes_per_element()],
        }
    }

    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.kind.bytes_per_element()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Raw bytes, for renderers that upload columns directly.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn slot(&self, index: usize, kind: AttributeKind) -> Result<Range<usize>, AttributeError> {
        if self.kind != kind {
            return Err(AttributeError::KindMismatch {
                expected: kind,
                found: self.kind,
            });
        }
        let len = self.len();
        if index >= len {
            return Err(AttributeError::OutOfRange { index, len });
        }
        let bpe = self.kind.bytes_per_element();
        Ok(index * bpe..(index + 1) * bpe)
    }

    // --- Typed access ---

    pub fn get_float(&self, index: usize) -> Result<f32, AttributeError> {
        let range = self.slot(index, AttributeKind::Float)?;
        Ok(bytemuck::pod_read_unaligned(&self.data[range]))
    }

    pub fn set_float(&mut self, index: usize, value: f32) -> Result<(), AttributeError> {
        let range = self.slot(index, AttributeKind::Float)?;
        self.data[range].copy_from_slice(bytemuck::bytes_of(&value));
        Ok(())
    }

    pub fn get_int(&self, index: usize) -> Result<i32, AttributeError> {
        let range = self.slot(index, AttributeKind::Int)?;
        Ok(bytemuck::pod_read_unaligned(&self.data[range]))
    }

    pub fn set_int(&mut self, index: usize, value: i32) -> Result<(), AttributeError> {
        let range = self.slot(index, AttributeKind::Int)?;
        self.data[range].copy_from_slice(bytemuck::bytes_of(&value));
        Ok(())
    }

    pub fn get_vec2(&self, index: usize) -> Result<Vec2, AttributeError> {
        let range = self.slot(index, AttributeKind::Vec2)?;
        let raw: [f32; 2] = bytemuck::pod_read_unaligned(&self.data[range]);
        Ok(Vec2::from_array(raw))
    }

    pub fn set_vec2(&mut self, index: usize, value: Vec2) -> Result<(), AttributeError> {
        let range = self.slot(index, AttributeKind::Vec2)?;
        self.data[range].copy_from_slice(bytemuck::bytes_of(&value.to_array()));
        Ok(())
    }

    pub fn is_present(&self, index: usize) -> Result<bool, AttributeError> {
        let range = self.slot(index, AttributeKind::Presence)?;
        Ok(self.data[range.start] != 0)
    }

    pub fn set_present(&mut self, index: usize, present: bool) -> Result<(), AttributeError> {
        let range = self.slot(index, AttributeKind::Presence)?;
        self.data[range.start] = u8::from(present);
        Ok(())
    }

    // --- Structural operations ---

    /// Resize to `len` elements.
    ///
    /// Growing zero-fills the new region at the front (`prepend`) or the back.
    /// Shrinking drops elements from the front (`prepend`) or the back.
    pub fn resize(&mut self, len: usize, prepend: bool) {
        let bpe = self.kind.bytes_per_element();
        let old_bytes = self.data.len();
        let new_bytes = len * bpe;

        if new_bytes == old_bytes {
            return;
        }

        if new_bytes < old_bytes {
            let live = if prepend {
                old_bytes - new_bytes..old_bytes
            } else {
                0..new_bytes
            };
            self.data = self.data[live].to_vec();
            return;
        }

        let mut grown = Vec::with_capacity(new_bytes);
        if prepend {
            grown.resize(new_bytes - old_bytes, 0);
            grown.extend_from_slice(&self.data);
        } else {
            grown.extend_from_slice(&self.data);
            grown.resize(new_bytes, 0);
        }
        self.data = grown;
    }

    /// Append another column of the same kind: grow by the donor's length,
    /// then overwrite the new tail with the donor's raw bytes.
    pub fn append(&mut self, other: &AttributeColumn) -> Result<(), AttributeError> {
        if other.kind != self.kind {
            return Err(AttributeError::KindMismatch {
                expected: self.kind,
                found: other.kind,
            });
        }
        let tail = self.data.len();
        self.resize(self.len() + other.len(), false);
        self.data[tail..].copy_from_slice(&other.data);
        Ok(())
    }

    /// Keep only the indices contained in `keep`, preserving relative order.
    pub fn filter_indexes(&mut self, keep: &HashSet<usize>) {
        let bpe = self.kind.bytes_per_element();
        let mut out = Vec::with_capacity(keep.len().min(self.len()) * bpe);
        for (index, chunk) in self.data.chunks_exact(bpe).enumerate() {
            if keep.contains(&index) {
                out.extend_from_slice(chunk);
            }
        }
        self.data = out;
    }
}
