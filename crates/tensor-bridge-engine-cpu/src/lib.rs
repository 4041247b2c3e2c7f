pub mod cpu;

pub use cpu::{CpuBuffer, CpuBufferHandle, CpuEngine, KernelInterceptor, NoopInterceptor};

/// Register the CPU engine with the global engine registry.
///
/// This function is called automatically via a static initializer, but can
/// also be called manually to ensure the engine is registered.
pub fn register_cpu_engine() {
    tensor_bridge::engine_registry::register_native_engine("cpu", CpuEngine::new);
}

// Auto-register on library load
#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_CPU_ENGINE: extern "C" fn() = {
    extern "C" fn register() {
        register_cpu_engine();
    }
    register
};
