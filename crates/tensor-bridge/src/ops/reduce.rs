//! Reduction wrappers.

use crate::attr::Attribute;
use crate::bridge::TensorBridge;
use crate::engine::NativeEngine;
use crate::error::BridgeResult;
use crate::registry::TensorId;

/// Sums `x` over `axes`, optionally keeping reduced axes as size-1 dims.
pub fn sum<E: NativeEngine>(
    bridge: &mut TensorBridge<E>,
    x: TensorId,
    axes: &[i64],
    keep_dims: bool,
) -> BridgeResult<TensorId> {
    let dtype = bridge.dtype_of(x)?;
    let attrs = [
        Attribute::dtype("T", dtype),
        Attribute::int_list("axes", axes.to_vec()),
        Attribute::bool("keep_dims", keep_dims),
    ];
    bridge.execute_single_output("Sum", &attrs, &[x])
}
