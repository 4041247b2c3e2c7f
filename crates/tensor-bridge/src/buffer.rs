//! Host-side payloads and shape bookkeeping for not-yet-materialized tensors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dtype::DType;
use crate::error::{BridgeError, BridgeResult};

/// Stores the logical dimensions of a tensor.
///
/// Rank 0 is admitted so scalar tensors can be registered; an empty dimension
/// list denotes a single-element scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Constructs a new shape from the provided dimensions.
    pub fn new<D: Into<Vec<usize>>>(dims: D) -> Self {
        Shape { dims: dims.into() }
    }

    /// Returns the shape of a rank-0 scalar.
    pub fn scalar() -> Self {
        Shape { dims: Vec::new() }
    }

    /// Borrow the raw dimension slice for downstream calculations.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the rank (number of axes) of the shape.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Computes the total number of elements implied by the shape.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims.to_vec())
    }
}

/// Typed in-memory payload held by a registry entry before materialization.
///
/// Boolean payloads ride in `U8`; complex64 payloads are interleaved
/// real/imaginary `F32` pairs, two lanes per logical element.
#[derive(Debug, Clone, PartialEq)]
pub enum HostBuffer {
    F32(Arc<[f32]>),
    I32(Arc<[i32]>),
    U8(Arc<[u8]>),
}

impl HostBuffer {
    /// Constructs an `F32` payload from raw values.
    pub fn from_f32(values: Vec<f32>) -> Self {
        HostBuffer::F32(Arc::from(values))
    }

    /// Constructs an `I32` payload from raw values.
    pub fn from_i32(values: Vec<i32>) -> Self {
        HostBuffer::I32(Arc::from(values))
    }

    /// Constructs a `U8` payload from raw values.
    pub fn from_u8(values: Vec<u8>) -> Self {
        HostBuffer::U8(Arc::from(values))
    }

    /// Returns the number of stored lanes (not logical elements).
    pub fn len(&self) -> usize {
        match self {
            HostBuffer::F32(values) => values.len(),
            HostBuffer::I32(values) => values.len(),
            HostBuffer::U8(values) => values.len(),
        }
    }

    /// Reports whether the payload holds zero lanes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of storage lanes one logical element of `dtype` occupies.
    fn lanes_per_element(dtype: DType) -> Option<usize> {
        match dtype {
            DType::F32 | DType::I32 | DType::Bool => Some(1),
            DType::C64 => Some(2),
            DType::Str => None,
        }
    }

    /// Reports whether the payload kind can carry values of `dtype`.
    fn carries(&self, dtype: DType) -> bool {
        matches!(
            (self, dtype),
            (HostBuffer::F32(_), DType::F32)
                | (HostBuffer::F32(_), DType::C64)
                | (HostBuffer::I32(_), DType::I32)
                | (HostBuffer::U8(_), DType::Bool)
        )
    }

    /// Validates that the payload can back a tensor of the given shape/dtype.
    ///
    /// Fails with [`BridgeError::UnsupportedDtype`] when the payload kind and
    /// dtype disagree, and with an execution diagnostic embedded in the error
    /// when the lane count does not match the shape.
    pub fn check_matches(&self, dtype: DType, shape: &Shape) -> BridgeResult<()> {
        let lanes = Self::lanes_per_element(dtype).ok_or(BridgeError::UnsupportedDtype {
            dtype,
            context: "host payload",
        })?;
        if !self.carries(dtype) {
            return Err(BridgeError::UnsupportedDtype {
                dtype,
                context: "host payload kind",
            });
        }
        let expected = shape.num_elements() * lanes;
        if self.len() != expected {
            return Err(BridgeError::InvalidPayload {
                message: format!(
                    "payload length {} does not match shape {:?} ({} lanes expected)",
                    self.len(),
                    shape.dims(),
                    expected
                ),
            });
        }
        Ok(())
    }
}
