//! Failure taxonomy surfaced by the bridge to the front end.

use thiserror::Error;

use crate::dtype::DType;
use crate::engine::EngineError;
use crate::registry::TensorId;

/// Error surfaced by registry, lifecycle, and dispatch entry points.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The caller referenced an identity with no registry entry.
    #[error("tensor {0:?} is not registered")]
    UnregisteredTensor(TensorId),

    /// The entry exists but was never written and never produced by an op.
    #[error("tensor {0:?} has no value; write a payload before first use")]
    MissingValue(TensorId),

    /// A dtype outside the supported set reached the marshaller.
    #[error("dtype {dtype:?} is not supported for {context}")]
    UnsupportedDtype {
        dtype: DType,
        context: &'static str,
    },

    /// A written payload does not agree with the entry's shape or dtype.
    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },

    /// The native engine rejected or failed an invocation.
    #[error("op '{op}' failed: {message}")]
    OpExecutionFailure { op: String, message: String },

    /// Native buffer allocation failed; never retried by the bridge.
    #[error("native buffer allocation failed: {message}")]
    ResourceExhaustion { message: String },
}

impl BridgeError {
    /// Maps an engine failure onto the bridge taxonomy, tagging the operation
    /// that was in flight. Allocation exhaustion keeps its own category.
    pub(crate) fn from_engine(op: &str, err: EngineError) -> Self {
        match err {
            EngineError::OutOfMemory { message } => BridgeError::ResourceExhaustion { message },
            other => BridgeError::OpExecutionFailure {
                op: op.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Convenience alias for results returned by bridge routines.
pub type BridgeResult<T> = Result<T, BridgeError>;
