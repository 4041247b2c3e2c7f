use std::sync::{Arc, Mutex};

use anyhow::Result;
use tensor_bridge::attr::{self, Attribute};
use tensor_bridge::ops::{elementwise, selection};
use tensor_bridge::{BridgeError, DType, HostBuffer, Shape, TensorBridge, TensorId};
use tensor_bridge_engine_cpu::{CpuBuffer, CpuEngine, KernelInterceptor, NoopInterceptor};

/// Records every invocation's attribute list, then falls through to the
/// built-in kernels.
#[derive(Default)]
struct RecordingInterceptor {
    seen: Mutex<Vec<(String, Vec<Attribute>)>>,
}

impl RecordingInterceptor {
    fn attrs_for(&self, op_name: &str) -> Option<Vec<Attribute>> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == op_name)
            .map(|(_, attrs)| attrs.clone())
    }
}

impl KernelInterceptor for RecordingInterceptor {
    fn try_invoke(
        &self,
        op_name: &str,
        attrs: &[Attribute],
        _inputs: &[CpuBuffer],
        _num_outputs: usize,
    ) -> Option<tensor_bridge::EngineResult<Vec<CpuBuffer>>> {
        self.seen
            .lock()
            .unwrap()
            .push((op_name.to_string(), attrs.to_vec()));
        None
    }
}

fn bridge() -> (TensorBridge<CpuEngine<NoopInterceptor>>, Arc<CpuEngine<NoopInterceptor>>) {
    let engine = Arc::new(CpuEngine::new());
    (TensorBridge::new(Arc::clone(&engine)), engine)
}

#[test]
fn add_scenario_end_to_end() -> Result<()> {
    let (mut bridge, engine) = bridge();
    let a = TensorId::fresh();
    bridge.register(a, Shape::new([2]), DType::I32);
    bridge.write(a, HostBuffer::from_i32(vec![3, 4]))?;

    let outputs = bridge.execute_op("Add", &[Attribute::dtype("T", DType::I32)], &[a, a], 1)?;
    assert_eq!(outputs.len(), 1);
    assert_eq!(
        bridge.read_sync(outputs[0])?,
        HostBuffer::from_i32(vec![6, 8])
    );

    // The input materialized on first use: its value now lives engine-side
    // (input buffer + result buffer), and a readback still round-trips.
    assert_eq!(engine.buffer_count(), 2);
    assert_eq!(bridge.read_sync(a)?, HostBuffer::from_i32(vec![3, 4]));
    Ok(())
}

#[test]
fn materialization_waits_for_first_use_as_input() -> Result<()> {
    let (mut bridge, engine) = bridge();
    let a = TensorId::fresh();
    bridge.register(a, Shape::new([2]), DType::F32);
    bridge.write(a, HostBuffer::from_f32(vec![1.5, 2.5]))?;

    // Written but never consumed: no native buffer may exist yet, and reads
    // are served from the pending payload.
    assert_eq!(engine.buffer_count(), 0);
    assert_eq!(bridge.read_sync(a)?, HostBuffer::from_f32(vec![1.5, 2.5]));
    assert_eq!(engine.buffer_count(), 0);

    let _ = bridge.execute_op("Neg", &[Attribute::dtype("T", DType::F32)], &[a], 1)?;
    assert!(engine.buffer_count() >= 1);

    // One-way transition: the readback now goes through the engine and still
    // returns the written values.
    assert_eq!(bridge.read_sync(a)?, HostBuffer::from_f32(vec![1.5, 2.5]));
    Ok(())
}

#[test]
fn multi_output_dispatch_preserves_engine_order() -> Result<()> {
    let (mut bridge, _engine) = bridge();
    let x = TensorId::fresh();
    bridge.register(x, Shape::new([4]), DType::F32);
    bridge.write(x, HostBuffer::from_f32(vec![1.0, 4.0, 2.0, 3.0]))?;

    let attrs = [
        Attribute::dtype("T", DType::F32),
        Attribute::int("k", 2),
        Attribute::bool("sorted", true),
    ];
    let outputs = bridge.execute_multiple_outputs("TopK", &attrs, &[x], 2)?;
    assert_eq!(outputs.len(), 2);

    // Engine declares values first, indices second.
    assert_eq!(
        bridge.read_sync(outputs[0])?,
        HostBuffer::from_f32(vec![4.0, 3.0])
    );
    assert_eq!(bridge.read_sync(outputs[1])?, HostBuffer::from_i32(vec![1, 3]));
    assert_eq!(bridge.dtype_of(outputs[1])?, DType::I32);
    Ok(())
}

#[test]
fn unregistered_input_fails_before_any_engine_call() {
    let (mut bridge, engine) = bridge();
    let ghost = TensorId::fresh();

    let err = bridge
        .execute_op("Add", &[Attribute::dtype("T", DType::I32)], &[ghost, ghost], 1)
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnregisteredTensor(bad) if bad == ghost));
    assert_eq!(engine.invocation_count(), 0);
    assert_eq!(engine.buffer_count(), 0);
}

#[test]
fn engine_failure_registers_no_outputs() -> Result<()> {
    let (mut bridge, engine) = bridge();
    let a = TensorId::fresh();
    bridge.register(a, Shape::new([2]), DType::F32);
    bridge.write(a, HostBuffer::from_f32(vec![1.0, 2.0]))?;

    let live_before = bridge.live_entries();
    let err = bridge
        .execute_op("DoesNotExist", &[], &[a], 1)
        .unwrap_err();
    match err {
        BridgeError::OpExecutionFailure { op, message } => {
            assert_eq!(op, "DoesNotExist");
            assert!(message.contains("not implemented"), "got: {message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(bridge.live_entries(), live_before);
    assert_eq!(engine.invocation_count(), 1);
    Ok(())
}

#[test]
fn output_count_mismatch_is_an_execution_failure() -> Result<()> {
    let (mut bridge, _engine) = bridge();
    let a = TensorId::fresh();
    bridge.register(a, Shape::new([1]), DType::F32);
    bridge.write(a, HostBuffer::from_f32(vec![1.0]))?;

    let err = bridge
        .execute_op("Neg", &[Attribute::dtype("T", DType::F32)], &[a], 3)
        .unwrap_err();
    assert!(matches!(err, BridgeError::OpExecutionFailure { .. }));
    Ok(())
}

#[test]
fn value_less_entry_cannot_be_consumed() {
    let (mut bridge, engine) = bridge();
    let a = TensorId::fresh();
    bridge.register(a, Shape::new([2]), DType::F32);

    let err = bridge
        .execute_op("Neg", &[Attribute::dtype("T", DType::F32)], &[a], 1)
        .unwrap_err();
    assert!(matches!(err, BridgeError::MissingValue(bad) if bad == a));
    assert_eq!(engine.invocation_count(), 0);
}

#[test]
fn binary_wrapper_marshals_promoted_dtype() -> Result<()> {
    let interceptor = Arc::new(RecordingInterceptor::default());
    let engine = Arc::new(CpuEngine::with_arc(Arc::clone(&interceptor)));
    let mut bridge = TensorBridge::new(Arc::clone(&engine));

    let ints = TensorId::fresh();
    bridge.register(ints, Shape::new([2]), DType::I32);
    bridge.write(ints, HostBuffer::from_i32(vec![1, 2]))?;
    let floats = TensorId::fresh();
    bridge.register(floats, Shape::new([2]), DType::F32);
    bridge.write(floats, HostBuffer::from_f32(vec![0.5, 0.25]))?;

    let out = elementwise::add(&mut bridge, ints, floats)?;
    assert_eq!(bridge.dtype_of(out)?, DType::F32);
    assert_eq!(
        bridge.read_sync(out)?,
        HostBuffer::from_f32(vec![1.5, 2.25])
    );

    let attrs = interceptor.attrs_for("Add").expect("Add was dispatched");
    assert_eq!(attr::get_dtype(&attrs, "T"), Some(DType::F32));
    Ok(())
}

#[test]
fn top_k_wrapper_unpacks_values_then_indices() -> Result<()> {
    let (mut bridge, _engine) = bridge();
    let x = TensorId::fresh();
    bridge.register(x, Shape::new([2, 3]), DType::I32);
    bridge.write(x, HostBuffer::from_i32(vec![5, 1, 3, 2, 9, 9]))?;

    let (values, indices) = selection::top_k(&mut bridge, x, 2, true)?;
    assert_eq!(
        bridge.read_sync(values)?,
        HostBuffer::from_i32(vec![5, 3, 9, 9])
    );
    assert_eq!(
        bridge.read_sync(indices)?,
        HostBuffer::from_i32(vec![0, 2, 1, 2])
    );
    assert_eq!(bridge.shape_of(values)?, Shape::new([2, 2]));
    Ok(())
}
