//! Runtime engine registry for dynamic engine selection.
//!
//! Lets engine crates register themselves by name so front ends can pick an
//! execution engine at runtime without hardcoding concrete types. Each method
//! of the type-erased surface works with `Box<dyn Any>` handles that get
//! downcast internally.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::attr::Attribute;
use crate::buffer::{HostBuffer, Shape};
use crate::dtype::DType;
use crate::engine::{BufferDescriptor, EngineError, EngineResult, NativeEngine};

/// Type-erased buffer handle that can be downcast to a concrete handle type.
pub type ErasedHandle = Box<dyn Any + Send + Sync>;

/// Factory function that creates a new engine instance.
pub type EngineConstructor = Box<dyn Fn() -> Box<dyn ErasedEngine> + Send + Sync>;

/// Type-erased engine trait wrapping [`NativeEngine`] without generics.
pub trait ErasedEngine: Send + Sync {
    /// Returns a human-readable engine identifier.
    fn engine_name(&self) -> &str;

    /// Allocates a buffer from a host payload, returning an erased handle.
    fn allocate_buffer(
        &self,
        shape: &Shape,
        dtype: DType,
        payload: &HostBuffer,
    ) -> EngineResult<ErasedHandle>;

    /// Releases a buffer behind an erased handle.
    fn free_buffer(&self, handle: &ErasedHandle) -> EngineResult<()>;

    /// Reads a buffer's contents back into a host payload.
    fn read_buffer(&self, handle: &ErasedHandle) -> EngineResult<HostBuffer>;

    /// Executes one operation with type-erased operand handles.
    fn invoke(
        &self,
        op_name: &str,
        attrs: &[Attribute],
        inputs: &[ErasedHandle],
        num_outputs: usize,
    ) -> EngineResult<Vec<BufferDescriptor<ErasedHandle>>>;

    /// Downcast to `Any` for type recovery when needed.
    fn as_any(&self) -> &dyn Any;
}

/// Wrapper that implements [`ErasedEngine`] for any concrete [`NativeEngine`].
struct EngineWrapper<E: NativeEngine> {
    inner: Arc<E>,
}

impl<E: NativeEngine> EngineWrapper<E> {
    fn new(engine: E) -> Self {
        Self {
            inner: Arc::new(engine),
        }
    }

    fn engine(&self) -> &Arc<E> {
        &self.inner
    }

    fn downcast<'a>(&self, handle: &'a ErasedHandle) -> EngineResult<&'a E::BufferHandle> {
        handle.downcast_ref::<E::BufferHandle>().ok_or_else(|| {
            EngineError::invalid_handle(format!(
                "handle type mismatch for engine {}",
                self.inner.engine_name()
            ))
        })
    }
}

impl<E: NativeEngine + 'static> ErasedEngine for EngineWrapper<E> {
    fn engine_name(&self) -> &str {
        self.inner.engine_name()
    }

    fn allocate_buffer(
        &self,
        shape: &Shape,
        dtype: DType,
        payload: &HostBuffer,
    ) -> EngineResult<ErasedHandle> {
        let handle = self.inner.allocate_buffer(shape, dtype, payload)?;
        Ok(Box::new(handle) as ErasedHandle)
    }

    fn free_buffer(&self, handle: &ErasedHandle) -> EngineResult<()> {
        let typed = self.downcast(handle)?;
        self.inner.free_buffer(typed)
    }

    fn read_buffer(&self, handle: &ErasedHandle) -> EngineResult<HostBuffer> {
        let typed = self.downcast(handle)?;
        self.inner.read_buffer(typed)
    }

    fn invoke(
        &self,
        op_name: &str,
        attrs: &[Attribute],
        inputs: &[ErasedHandle],
        num_outputs: usize,
    ) -> EngineResult<Vec<BufferDescriptor<ErasedHandle>>> {
        let mut typed_inputs = Vec::with_capacity(inputs.len());
        for handle in inputs {
            typed_inputs.push(self.downcast(handle)?.clone());
        }
        let outputs = self
            .inner
            .invoke(op_name, attrs, &typed_inputs, num_outputs)?;
        Ok(outputs
            .into_iter()
            .map(|descriptor| BufferDescriptor {
                shape: descriptor.shape,
                dtype: descriptor.dtype,
                handle: Box::new(descriptor.handle) as ErasedHandle,
            })
            .collect())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct EngineRegistry {
    engines: RwLock<HashMap<String, EngineConstructor>>,
}

impl EngineRegistry {
    fn new() -> Self {
        Self {
            engines: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, name: String, constructor: EngineConstructor) {
        self.engines.write().unwrap().insert(name, constructor);
    }

    fn create(&self, name: &str) -> Option<Box<dyn ErasedEngine>> {
        let registry = self.engines.read().unwrap();
        let constructor = registry.get(name)?;
        Some(constructor())
    }

    fn list_engines(&self) -> Vec<String> {
        self.engines.read().unwrap().keys().cloned().collect()
    }

    fn has_engine(&self, name: &str) -> bool {
        self.engines.read().unwrap().contains_key(name)
    }
}

static GLOBAL_REGISTRY: OnceLock<EngineRegistry> = OnceLock::new();

fn global_registry() -> &'static EngineRegistry {
    GLOBAL_REGISTRY.get_or_init(EngineRegistry::new)
}

/// Register an engine by name with a constructor function.
///
/// The constructor is called each time the engine is requested via
/// [`create_engine`]. Engine crates register themselves from a module
/// initializer or an explicit registration entry point.
pub fn register_engine<F>(name: impl Into<String>, constructor: F)
where
    F: Fn() -> Box<dyn ErasedEngine> + Send + Sync + 'static,
{
    global_registry().register(name.into(), Box::new(constructor));
}

/// Register a concrete [`NativeEngine`] implementation.
///
/// Convenience wrapper that handles the `EngineWrapper` boilerplate.
pub fn register_native_engine<E, F>(name: impl Into<String>, constructor: F)
where
    E: NativeEngine + 'static,
    F: Fn() -> E + Send + Sync + 'static,
{
    register_engine(name, move || Box::new(EngineWrapper::new(constructor())));
}

/// Create an engine instance by name.
///
/// Returns `None` if no engine with the given name has been registered.
pub fn create_engine(name: &str) -> Option<Box<dyn ErasedEngine>> {
    global_registry().create(name)
}

/// List all registered engine names.
pub fn list_engines() -> Vec<String> {
    global_registry().list_engines()
}

/// Check whether an engine with the given name is registered.
pub fn has_engine(name: &str) -> bool {
    global_registry().has_engine(name)
}

/// Recovers the typed engine behind an [`ErasedEngine`], for callers that
/// need the concrete type, for example to build a `TensorBridge<E>`.
pub fn get_typed_engine<E: NativeEngine + 'static>(engine: &dyn ErasedEngine) -> Option<Arc<E>> {
    engine
        .as_any()
        .downcast_ref::<EngineWrapper<E>>()
        .map(|wrapper| Arc::clone(wrapper.engine()))
}
