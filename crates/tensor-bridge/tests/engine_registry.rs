use tensor_bridge::engine_registry::{create_engine, get_typed_engine, has_engine, list_engines};
use tensor_bridge::{DType, HostBuffer, Shape, TensorBridge, TensorId};
use tensor_bridge_engine_cpu::{CpuEngine, NoopInterceptor};

#[test]
fn cpu_engine_registers_and_resolves_by_name() {
    // Ensure the engine is registered (auto-registration via .init_array).
    tensor_bridge_engine_cpu::register_cpu_engine();

    let engines = list_engines();
    assert!(has_engine("cpu"), "cpu engine not registered");
    assert!(engines.contains(&"cpu".to_string()));

    let engine = create_engine("cpu").expect("failed to create cpu engine");
    assert_eq!(engine.engine_name(), "cpu");

    assert!(!has_engine("nonexistent"));
    assert!(create_engine("nonexistent").is_none());
}

#[test]
fn erased_engine_allocates_and_reads_back() {
    tensor_bridge_engine_cpu::register_cpu_engine();
    let engine = create_engine("cpu").expect("failed to create cpu engine");

    let payload = HostBuffer::from_f32(vec![1.0, 2.0]);
    let handle = engine
        .allocate_buffer(&Shape::new([2]), DType::F32, &payload)
        .unwrap();
    assert_eq!(engine.read_buffer(&handle).unwrap(), payload);
    engine.free_buffer(&handle).unwrap();
}

#[test]
fn typed_engine_recovers_for_bridge_construction() {
    tensor_bridge_engine_cpu::register_cpu_engine();
    let erased = create_engine("cpu").expect("failed to create cpu engine");
    let typed = get_typed_engine::<CpuEngine<NoopInterceptor>>(erased.as_ref())
        .expect("typed recovery failed");

    let mut bridge = TensorBridge::new(typed);
    let id = TensorId::fresh();
    bridge.register(id, Shape::new([1]), DType::I32);
    bridge.write(id, HostBuffer::from_i32(vec![42])).unwrap();
    assert_eq!(
        bridge.read_sync(id).unwrap(),
        HostBuffer::from_i32(vec![42])
    );
}
