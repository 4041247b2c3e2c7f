//! The coordination surface between the front end and a native engine.
//!
//! `TensorBridge` owns the handle registry and an engine, and is the only
//! place the two meet: lifecycle entry points (`register`, `write`, `read`,
//! `dispose`) manage entry state, while `execute_op` resolves identities to
//! native buffers (materializing pending payloads on first use) and wraps
//! engine results back into fresh identities.
//!
//! The bridge is single-threaded cooperative: one dispatch runs to completion
//! before the next can observe registry state, so no internal locking exists.

use std::future::{ready, Ready};
use std::sync::Arc;

use log::{debug, warn};
use smallvec::SmallVec;

use crate::attr::Attribute;
use crate::buffer::{HostBuffer, Shape};
use crate::dtype::DType;
use crate::engine::NativeEngine;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::{HandleRegistry, TensorId};

/// Handle-based bridge binding one engine instance to one handle registry.
pub struct TensorBridge<E: NativeEngine> {
    engine: Arc<E>,
    registry: HandleRegistry<E::BufferHandle>,
}

impl<E: NativeEngine> TensorBridge<E> {
    /// Binds a bridge to an engine instance.
    pub fn new(engine: Arc<E>) -> Self {
        TensorBridge {
            engine,
            registry: HandleRegistry::new(),
        }
    }

    /// Returns the engine instance the bridge dispatches to.
    pub fn engine(&self) -> Arc<E> {
        Arc::clone(&self.engine)
    }

    /// Declares an identity with shape and dtype but no value yet.
    /// Idempotent: re-registering an existing identity never overwrites it.
    pub fn register(&mut self, id: TensorId, shape: impl Into<Shape>, dtype: DType) {
        self.registry.register(id, shape.into(), dtype);
    }

    /// Attaches a host payload to `id` as its pending value.
    ///
    /// A payload written over an already-materialized entry displaces the
    /// stale native buffer, which is freed here rather than leaked.
    pub fn write(&mut self, id: TensorId, payload: HostBuffer) -> BridgeResult<()> {
        let displaced = self.registry.write(id, payload)?;
        if let Some(handle) = displaced {
            warn!(
                "write to {:?} displaced a materialized buffer {:?}; freeing it",
                id, handle
            );
            self.engine
                .free_buffer(&handle)
                .map_err(|err| BridgeError::from_engine("free_buffer", err))?;
        }
        if crate::env::eager_enabled() {
            self.resolve_input(id)?;
        }
        Ok(())
    }

    /// Returns the tensor's values: the pending payload when one exists,
    /// otherwise a readback through the native buffer. Read-only.
    pub fn read_sync(&self, id: TensorId) -> BridgeResult<HostBuffer> {
        if let Some(payload) = self.registry.pending_payload(id)? {
            return Ok(payload);
        }
        match self.registry.native_handle(id)? {
            Some(handle) => self
                .engine
                .read_buffer(&handle)
                .map_err(|err| BridgeError::from_engine("read_buffer", err)),
            None => Err(BridgeError::MissingValue(id)),
        }
    }

    /// Asynchronous flavor of [`read_sync`](Self::read_sync).
    ///
    /// Semantically synchronous underneath; the returned future resolves on
    /// its first poll. Exists so callers keep one calling convention across
    /// naturally asynchronous engines.
    pub fn read(&self, id: TensorId) -> Ready<BridgeResult<HostBuffer>> {
        ready(self.read_sync(id))
    }

    /// Releases the native buffer (if any) and removes the entry.
    /// Disposing an unknown identity is a no-op, not an error.
    pub fn dispose(&mut self, id: TensorId) -> BridgeResult<()> {
        let Some(entry) = self.registry.remove(id) else {
            return Ok(());
        };
        self.free_entry_buffer(id, entry.native)
    }

    /// Adds an outstanding reference to `id`.
    pub fn retain(&mut self, id: TensorId) -> BridgeResult<()> {
        self.registry.retain(id)
    }

    /// Drops one outstanding reference to `id`; the last release disposes.
    pub fn release(&mut self, id: TensorId) -> BridgeResult<()> {
        match self.registry.release(id) {
            Some(entry) => self.free_entry_buffer(id, entry.native),
            None => Ok(()),
        }
    }

    /// Returns the dtype recorded for `id`.
    pub fn dtype_of(&self, id: TensorId) -> BridgeResult<DType> {
        self.registry.dtype_of(id)
    }

    /// Returns the shape recorded for `id`.
    pub fn shape_of(&self, id: TensorId) -> BridgeResult<Shape> {
        self.registry.shape_of(id)
    }

    /// Reports whether `id` currently has a registry entry.
    pub fn is_registered(&self, id: TensorId) -> bool {
        self.registry.contains(id)
    }

    /// Number of live registry entries.
    pub fn live_entries(&self) -> usize {
        self.registry.len()
    }

    /// Dispatches one operation and registers its outputs.
    ///
    /// Inputs resolve to concrete native buffers first, materializing any
    /// pending payloads, so every failure in that phase surfaces before the
    /// engine sees the invocation. On engine failure no outputs are
    /// registered.
    pub fn execute_op(
        &mut self,
        op_name: &str,
        attrs: &[Attribute],
        inputs: &[TensorId],
        num_outputs: usize,
    ) -> BridgeResult<Vec<TensorId>> {
        let mut handles: SmallVec<[E::BufferHandle; 4]> = SmallVec::with_capacity(inputs.len());
        for id in inputs {
            handles.push(self.resolve_input(*id)?);
        }
        debug!(
            "dispatching '{}' with {} inputs, {} outputs",
            op_name,
            inputs.len(),
            num_outputs
        );
        let outputs = self
            .engine
            .invoke(op_name, attrs, &handles, num_outputs)
            .map_err(|err| BridgeError::from_engine(op_name, err))?;
        if outputs.len() != num_outputs {
            return Err(BridgeError::OpExecutionFailure {
                op: op_name.to_string(),
                message: format!(
                    "engine returned {} outputs, expected {}",
                    outputs.len(),
                    num_outputs
                ),
            });
        }
        let mut ids = Vec::with_capacity(num_outputs);
        for descriptor in outputs {
            let id = TensorId::fresh();
            self.registry
                .adopt(id, descriptor.shape, descriptor.dtype, descriptor.handle);
            ids.push(id);
        }
        Ok(ids)
    }

    /// Dispatches an operation producing exactly one output.
    pub fn execute_single_output(
        &mut self,
        op_name: &str,
        attrs: &[Attribute],
        inputs: &[TensorId],
    ) -> BridgeResult<TensorId> {
        let mut ids = self.execute_op(op_name, attrs, inputs, 1)?;
        Ok(ids.remove(0))
    }

    /// Dispatches an operation producing `num_outputs` outputs, preserving
    /// the engine's output ordering.
    pub fn execute_multiple_outputs(
        &mut self,
        op_name: &str,
        attrs: &[Attribute],
        inputs: &[TensorId],
        num_outputs: usize,
    ) -> BridgeResult<Vec<TensorId>> {
        self.execute_op(op_name, attrs, inputs, num_outputs)
    }

    /// Resolves an identity to a concrete native handle, materializing a
    /// pending payload if one exists.
    ///
    /// A failed allocation leaves the pending payload in place, so the caller
    /// can re-attempt materialization without having lost the value.
    fn resolve_input(&mut self, id: TensorId) -> BridgeResult<E::BufferHandle> {
        if let Some(handle) = self.registry.native_handle(id)? {
            return Ok(handle);
        }
        let Some(payload) = self.registry.pending_payload(id)? else {
            return Err(BridgeError::MissingValue(id));
        };
        let shape = self.registry.shape_of(id)?;
        let dtype = self.registry.dtype_of(id)?;
        let handle = self
            .engine
            .allocate_buffer(&shape, dtype, &payload)
            .map_err(|err| BridgeError::ResourceExhaustion {
                message: err.to_string(),
            })?;
        debug!(
            "materialized {:?} ({:?}, {:?}) into {:?}",
            id,
            shape.dims(),
            dtype,
            handle
        );
        self.registry.attach_native(id, handle.clone())?;
        Ok(handle)
    }

    fn free_entry_buffer(
        &mut self,
        id: TensorId,
        native: Option<E::BufferHandle>,
    ) -> BridgeResult<()> {
        if let Some(handle) = native {
            debug!("disposing {:?}, freeing buffer {:?}", id, handle);
            self.engine
                .free_buffer(&handle)
                .map_err(|err| BridgeError::from_engine("free_buffer", err))?;
        }
        Ok(())
    }
}
