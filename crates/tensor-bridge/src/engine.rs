//! The fixed call contract between the bridge and a native execution engine.
//!
//! Engines expose buffer allocation, release, readback, and a generic
//! attribute-described invocation entry point. The bridge treats every call
//! as blocking and never retries; engine failures surface through
//! [`EngineError`] and are mapped onto the bridge taxonomy by the caller.

use std::fmt;

use thiserror::Error;

use crate::attr::Attribute;
use crate::buffer::{HostBuffer, Shape};
use crate::dtype::DType;

/// Failure reported by an engine routine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine rejected or failed an invocation.
    #[error("engine execution failure: {message}")]
    Execution { message: String },

    /// The op (or an op/dtype combination) is not implemented by the engine.
    #[error("{op} is not implemented: {reason}")]
    Unimplemented { op: String, reason: String },

    /// Buffer allocation failed.
    #[error("engine out of memory: {message}")]
    OutOfMemory { message: String },

    /// A handle did not resolve in the engine's buffer table.
    #[error("invalid buffer handle: {message}")]
    InvalidHandle { message: String },
}

impl EngineError {
    pub fn execution(message: impl Into<String>) -> Self {
        EngineError::Execution {
            message: message.into(),
        }
    }

    pub fn unimplemented(op: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Unimplemented {
            op: op.into(),
            reason: reason.into(),
        }
    }

    pub fn out_of_memory(message: impl Into<String>) -> Self {
        EngineError::OutOfMemory {
            message: message.into(),
        }
    }

    pub fn invalid_handle(message: impl Into<String>) -> Self {
        EngineError::InvalidHandle {
            message: message.into(),
        }
    }
}

/// Convenience alias for results returned by engine routines.
pub type EngineResult<T> = Result<T, EngineError>;

/// Metadata and handle for one buffer returned by an invocation.
#[derive(Debug, Clone)]
pub struct BufferDescriptor<H> {
    pub shape: Shape,
    pub dtype: DType,
    pub handle: H,
}

impl<H> BufferDescriptor<H> {
    pub fn new(shape: Shape, dtype: DType, handle: H) -> Self {
        Self {
            shape,
            dtype,
            handle,
        }
    }
}

/// Native execution engine reachable through an opaque handle-based interface.
///
/// Buffer handles are exclusively owned by the registry entry that references
/// them; the bridge frees each handle exactly once, either at disposal or when
/// a rewrite displaces an already-materialized buffer.
pub trait NativeEngine: Send + Sync {
    type BufferHandle: Clone + Send + Sync + fmt::Debug + 'static;

    /// Returns a human-readable engine identifier (e.g. `"cpu"`).
    fn engine_name(&self) -> &str;

    /// Allocates a buffer from a host payload and returns its handle.
    fn allocate_buffer(
        &self,
        shape: &Shape,
        dtype: DType,
        payload: &HostBuffer,
    ) -> EngineResult<Self::BufferHandle>;

    /// Releases a buffer. Unknown or already-freed handles are an error.
    fn free_buffer(&self, handle: &Self::BufferHandle) -> EngineResult<()>;

    /// Reads a buffer's contents back into a host payload.
    fn read_buffer(&self, handle: &Self::BufferHandle) -> EngineResult<HostBuffer>;

    /// Executes one operation over already-materialized operand buffers.
    ///
    /// Returns exactly `num_outputs` descriptors in the engine's declared
    /// output order.
    fn invoke(
        &self,
        op_name: &str,
        attrs: &[Attribute],
        inputs: &[Self::BufferHandle],
        num_outputs: usize,
    ) -> EngineResult<Vec<BufferDescriptor<Self::BufferHandle>>>;
}
