//! Dtype and shape transformation wrappers.

use crate::attr::Attribute;
use crate::bridge::TensorBridge;
use crate::dtype::DType;
use crate::engine::NativeEngine;
use crate::error::BridgeResult;
use crate::registry::TensorId;

/// Casts `x` to `dst`, marshalling source and destination dtype attributes.
pub fn cast<E: NativeEngine>(
    bridge: &mut TensorBridge<E>,
    x: TensorId,
    dst: DType,
) -> BridgeResult<TensorId> {
    let src = bridge.dtype_of(x)?;
    let attrs = [Attribute::dtype("SrcT", src), Attribute::dtype("DstT", dst)];
    bridge.execute_single_output("Cast", &attrs, &[x])
}

/// Reshapes `x` to `new_dims`; element count must be preserved by the engine.
pub fn reshape<E: NativeEngine>(
    bridge: &mut TensorBridge<E>,
    x: TensorId,
    new_dims: &[usize],
) -> BridgeResult<TensorId> {
    let dtype = bridge.dtype_of(x)?;
    let dims: Vec<i64> = new_dims.iter().map(|dim| *dim as i64).collect();
    let attrs = [
        Attribute::dtype("T", dtype),
        Attribute::int_list("shape", dims),
    ];
    bridge.execute_single_output("Reshape", &attrs, &[x])
}
