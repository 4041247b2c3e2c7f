//! Handle-based bridge between a tensor front end and a native execution
//! engine.
//!
//! The bridge translates high-level tensor operations into generic,
//! attribute-described invocations of an engine reachable only through an
//! opaque handle interface, manages native buffer lifetime on behalf of
//! front-end tensor identities, and defers buffer creation until an identity
//! is first consumed as an operation input.

pub mod attr;
pub mod bridge;
pub mod buffer;
pub mod dtype;
pub mod engine;
pub mod engine_registry;
mod env;
pub mod error;
pub mod ops;
pub mod registry;

pub use attr::{AttrValue, Attribute};
pub use bridge::TensorBridge;
pub use buffer::{HostBuffer, Shape};
pub use dtype::{upcast, DType};
pub use engine::{BufferDescriptor, EngineError, EngineResult, NativeEngine};
pub use error::{BridgeError, BridgeResult};
pub use registry::{HandleRegistry, TensorId};
