//! Enumerates the scalar element types the bridge can describe to an engine.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Logical dtype identifier shared between registry entries and engine buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 32-bit signed integer, primarily for index buffers and counts.
    I32,
    /// Boolean, stored one byte per element.
    Bool,
    /// Complex number with f32 real and imaginary lanes.
    C64,
    /// Variable-length string; carries no numeric payload.
    Str,
}

impl DType {
    /// Produces a stable tag used when crossing the engine boundary.
    pub fn tag(self) -> u32 {
        match self {
            DType::F32 => 0,
            DType::I32 => 1,
            DType::Bool => 2,
            DType::C64 => 3,
            DType::Str => 4,
        }
    }

    /// Reconstructs a `DType` from its tag representation.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(DType::F32),
            1 => Some(DType::I32),
            2 => Some(DType::Bool),
            3 => Some(DType::C64),
            4 => Some(DType::Str),
            _ => None,
        }
    }

    /// Returns the number of bytes required per scalar element, when fixed.
    pub fn size_in_bytes(self) -> Option<usize> {
        match self {
            DType::F32 | DType::I32 => Some(4),
            DType::Bool => Some(1),
            DType::C64 => Some(8),
            DType::Str => None,
        }
    }

    /// Returns `true` when the dtype is a floating-point representation.
    pub fn is_float(self) -> bool {
        matches!(self, DType::F32)
    }

    /// Returns `true` when the dtype is an integer representation.
    pub fn is_integer(self) -> bool {
        matches!(self, DType::I32)
    }

    /// Returns `true` when the dtype is complex.
    pub fn is_complex(self) -> bool {
        matches!(self, DType::C64)
    }

    /// Position in the promotion order, `None` for dtypes outside it.
    fn promotion_rank(self) -> Option<u8> {
        match self {
            DType::Bool => Some(0),
            DType::I32 => Some(1),
            DType::F32 => Some(2),
            DType::C64 => Some(3),
            DType::Str => None,
        }
    }
}

/// Resolves two operand dtypes to their common promoted dtype.
///
/// The promotion order is total over the numeric dtypes
/// (`Bool < I32 < F32 < C64`); `Str` does not participate and fails.
pub fn upcast(a: DType, b: DType) -> BridgeResult<DType> {
    let rank_a = a.promotion_rank().ok_or(BridgeError::UnsupportedDtype {
        dtype: a,
        context: "dtype promotion",
    })?;
    let rank_b = b.promotion_rank().ok_or(BridgeError::UnsupportedDtype {
        dtype: b,
        context: "dtype promotion",
    })?;
    Ok(if rank_a >= rank_b { a } else { b })
}
