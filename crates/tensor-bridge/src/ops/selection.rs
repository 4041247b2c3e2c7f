//! Selection wrappers with multiple outputs.

use crate::attr::Attribute;
use crate::bridge::TensorBridge;
use crate::engine::NativeEngine;
use crate::error::BridgeResult;
use crate::registry::TensorId;

/// Returns the `k` largest entries of `x` along its last axis as a
/// `(values, indices)` pair, in the engine's declared output order.
pub fn top_k<E: NativeEngine>(
    bridge: &mut TensorBridge<E>,
    x: TensorId,
    k: usize,
    sorted: bool,
) -> BridgeResult<(TensorId, TensorId)> {
    let dtype = bridge.dtype_of(x)?;
    let attrs = [
        Attribute::dtype("T", dtype),
        Attribute::int("k", k as i64),
        Attribute::bool("sorted", sorted),
    ];
    let mut ids = bridge.execute_multiple_outputs("TopK", &attrs, &[x], 2)?;
    let indices = ids.pop().expect("TopK returns two outputs");
    let values = ids.pop().expect("TopK returns two outputs");
    Ok((values, indices))
}
