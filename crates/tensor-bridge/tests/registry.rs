use tensor_bridge::{BridgeError, DType, HandleRegistry, HostBuffer, Shape, TensorId};

fn payload(values: &[i32]) -> HostBuffer {
    HostBuffer::from_i32(values.to_vec())
}

#[test]
fn register_is_idempotent_and_preserves_written_values() {
    let mut registry: HandleRegistry<u64> = HandleRegistry::new();
    let id = TensorId::fresh();

    registry.register(id, Shape::new([2]), DType::I32);
    registry.write(id, payload(&[3, 4])).unwrap();

    // A reissued register call with the same identity must not clobber state.
    registry.register(id, Shape::new([2]), DType::I32);
    assert_eq!(registry.pending_payload(id).unwrap(), Some(payload(&[3, 4])));
}

#[test]
fn write_to_unregistered_identity_fails() {
    let mut registry: HandleRegistry<u64> = HandleRegistry::new();
    let id = TensorId::fresh();

    let err = registry.write(id, payload(&[1])).unwrap_err();
    assert!(matches!(err, BridgeError::UnregisteredTensor(bad) if bad == id));
}

#[test]
fn write_rejects_mismatched_payload() {
    let mut registry: HandleRegistry<u64> = HandleRegistry::new();
    let id = TensorId::fresh();
    registry.register(id, Shape::new([2]), DType::I32);

    let err = registry.write(id, payload(&[1, 2, 3])).unwrap_err();
    assert!(matches!(err, BridgeError::InvalidPayload { .. }));

    let err = registry
        .write(id, HostBuffer::from_f32(vec![1.0, 2.0]))
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnsupportedDtype { .. }));
}

#[test]
fn attach_native_clears_pending_payload() {
    let mut registry: HandleRegistry<u64> = HandleRegistry::new();
    let id = TensorId::fresh();
    registry.register(id, Shape::new([2]), DType::I32);
    registry.write(id, payload(&[3, 4])).unwrap();

    registry.attach_native(id, 7).unwrap();
    assert_eq!(registry.native_handle(id).unwrap(), Some(7));
    assert_eq!(registry.pending_payload(id).unwrap(), None);
}

#[test]
fn write_after_materialization_hands_back_displaced_handle() {
    let mut registry: HandleRegistry<u64> = HandleRegistry::new();
    let id = TensorId::fresh();
    registry.register(id, Shape::new([2]), DType::I32);
    registry.write(id, payload(&[3, 4])).unwrap();
    registry.attach_native(id, 7).unwrap();

    let displaced = registry.write(id, payload(&[5, 6])).unwrap();
    assert_eq!(displaced, Some(7));
    assert_eq!(registry.native_handle(id).unwrap(), None);
    assert_eq!(registry.pending_payload(id).unwrap(), Some(payload(&[5, 6])));
}

#[test]
fn fresh_identities_are_unique() {
    let a = TensorId::fresh();
    let b = TensorId::fresh();
    assert_ne!(a, b);
    assert_eq!(TensorId::from_raw(a.raw()), a);
}

#[test]
fn adopt_registers_backed_entry() {
    let mut registry: HandleRegistry<u64> = HandleRegistry::new();
    let id = TensorId::fresh();
    registry.adopt(id, Shape::new([2, 2]), DType::F32, 11);

    assert_eq!(registry.native_handle(id).unwrap(), Some(11));
    assert_eq!(registry.pending_payload(id).unwrap(), None);
    assert_eq!(registry.dtype_of(id).unwrap(), DType::F32);
    assert_eq!(registry.shape_of(id).unwrap(), Shape::new([2, 2]));
}

#[test]
fn retain_requires_registration() {
    let mut registry: HandleRegistry<u64> = HandleRegistry::new();
    let err = registry.retain(TensorId::fresh()).unwrap_err();
    assert!(matches!(err, BridgeError::UnregisteredTensor(_)));
}
