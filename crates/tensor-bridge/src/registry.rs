//! Process-wide table mapping abstract tensor identities to native-binding
//! state.
//!
//! An entry tracks shape and dtype plus at most one source of truth for the
//! tensor's value: a native buffer handle or a pending host payload. Pending
//! payloads turn into native buffers lazily, the first time the identity is
//! consumed as an operation input; that transition is one-way.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::buffer::{HostBuffer, Shape};
use crate::dtype::DType;
use crate::error::{BridgeError, BridgeResult};

static TENSOR_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque token keying a registry entry. Carries no data of its own; shape,
/// dtype, and value state live in the entry it keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorId(u64);

impl TensorId {
    /// Mints a fresh process-unique identity.
    pub fn fresh() -> Self {
        TensorId(TENSOR_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps an externally assigned raw identity.
    pub fn from_raw(raw: u64) -> Self {
        TensorId(raw)
    }

    /// Returns the raw identity value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Native-binding state for one abstract tensor identity.
pub(crate) struct HandleEntry<H> {
    pub(crate) shape: Shape,
    pub(crate) dtype: DType,
    pub(crate) native: Option<H>,
    pub(crate) pending: Option<HostBuffer>,
    pub(crate) refs: usize,
}

/// Identity-keyed handle table. Mutated only by the bridge that owns it; all
/// access happens on one logical thread of control, so there is no locking.
pub struct HandleRegistry<H> {
    entries: HashMap<TensorId, HandleEntry<H>>,
}

impl<H: Clone> Default for HandleRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Clone> HandleRegistry<H> {
    pub fn new() -> Self {
        HandleRegistry {
            entries: HashMap::new(),
        }
    }

    /// Creates a value-less entry for `id` with one outstanding reference.
    ///
    /// Idempotent: an existing entry is left untouched so that a reissued
    /// register call cannot clobber a value written in between.
    pub fn register(&mut self, id: TensorId, shape: Shape, dtype: DType) {
        self.entries.entry(id).or_insert(HandleEntry {
            shape,
            dtype,
            native: None,
            pending: None,
            refs: 1,
        });
    }

    /// Registers an entry that is already backed by a native buffer, as when
    /// the dispatcher wraps an engine result.
    pub fn adopt(&mut self, id: TensorId, shape: Shape, dtype: DType, handle: H) {
        debug_assert!(
            !self.entries.contains_key(&id),
            "adopt must use a fresh identity"
        );
        self.entries.insert(
            id,
            HandleEntry {
                shape,
                dtype,
                native: Some(handle),
                pending: None,
                refs: 1,
            },
        );
    }

    /// Stores `payload` as the entry's pending value.
    ///
    /// Returns a native handle that the payload displaced, if the entry had
    /// already been materialized; the caller owns freeing it.
    pub fn write(&mut self, id: TensorId, payload: HostBuffer) -> BridgeResult<Option<H>> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(BridgeError::UnregisteredTensor(id))?;
        payload.check_matches(entry.dtype, &entry.shape)?;
        let displaced = entry.native.take();
        entry.pending = Some(payload);
        Ok(displaced)
    }

    /// Completes materialization: binds `handle` and clears the pending
    /// payload. One-way for the identity; the pending path never reopens.
    pub fn attach_native(&mut self, id: TensorId, handle: H) -> BridgeResult<()> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(BridgeError::UnregisteredTensor(id))?;
        entry.native = Some(handle);
        entry.pending = None;
        Ok(())
    }

    /// Returns a clone of the entry's native handle, when materialized.
    pub fn native_handle(&self, id: TensorId) -> BridgeResult<Option<H>> {
        let entry = self
            .entries
            .get(&id)
            .ok_or(BridgeError::UnregisteredTensor(id))?;
        Ok(entry.native.clone())
    }

    /// Returns a clone of the entry's pending payload, when present.
    pub fn pending_payload(&self, id: TensorId) -> BridgeResult<Option<HostBuffer>> {
        let entry = self
            .entries
            .get(&id)
            .ok_or(BridgeError::UnregisteredTensor(id))?;
        Ok(entry.pending.clone())
    }

    /// Returns the entry's dtype.
    pub fn dtype_of(&self, id: TensorId) -> BridgeResult<DType> {
        self.entries
            .get(&id)
            .map(|entry| entry.dtype)
            .ok_or(BridgeError::UnregisteredTensor(id))
    }

    /// Returns the entry's shape.
    pub fn shape_of(&self, id: TensorId) -> BridgeResult<Shape> {
        self.entries
            .get(&id)
            .map(|entry| entry.shape.clone())
            .ok_or(BridgeError::UnregisteredTensor(id))
    }

    /// Reports whether `id` has a registry entry.
    pub fn contains(&self, id: TensorId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Removes the entry unconditionally, returning it so the caller can
    /// free its native buffer. Unknown identities yield `None`.
    pub(crate) fn remove(&mut self, id: TensorId) -> Option<HandleEntry<H>> {
        self.entries.remove(&id)
    }

    /// Adds an outstanding reference to the entry.
    pub fn retain(&mut self, id: TensorId) -> BridgeResult<()> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(BridgeError::UnregisteredTensor(id))?;
        entry.refs += 1;
        Ok(())
    }

    /// Drops one outstanding reference. When the last reference goes, the
    /// entry is removed and returned so the caller can free its buffer.
    /// Releasing an unknown identity is a no-op, like disposal.
    pub(crate) fn release(&mut self, id: TensorId) -> Option<HandleEntry<H>> {
        let entry = self.entries.get_mut(&id)?;
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            return self.entries.remove(&id);
        }
        None
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
