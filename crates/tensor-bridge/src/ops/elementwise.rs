//! Elementwise arithmetic wrappers.

use crate::attr::Attribute;
use crate::bridge::TensorBridge;
use crate::dtype::upcast;
use crate::engine::NativeEngine;
use crate::error::BridgeResult;
use crate::registry::TensorId;

/// Dispatches a binary elementwise op, marshalling the common operand dtype
/// as the `T` attribute.
fn binary<E: NativeEngine>(
    bridge: &mut TensorBridge<E>,
    op_name: &str,
    lhs: TensorId,
    rhs: TensorId,
) -> BridgeResult<TensorId> {
    let dtype = upcast(bridge.dtype_of(lhs)?, bridge.dtype_of(rhs)?)?;
    bridge.execute_single_output(op_name, &[Attribute::dtype("T", dtype)], &[lhs, rhs])
}

/// Elementwise addition.
pub fn add<E: NativeEngine>(
    bridge: &mut TensorBridge<E>,
    lhs: TensorId,
    rhs: TensorId,
) -> BridgeResult<TensorId> {
    binary(bridge, "Add", lhs, rhs)
}

/// Elementwise subtraction.
pub fn sub<E: NativeEngine>(
    bridge: &mut TensorBridge<E>,
    lhs: TensorId,
    rhs: TensorId,
) -> BridgeResult<TensorId> {
    binary(bridge, "Sub", lhs, rhs)
}

/// Elementwise multiplication.
pub fn mul<E: NativeEngine>(
    bridge: &mut TensorBridge<E>,
    lhs: TensorId,
    rhs: TensorId,
) -> BridgeResult<TensorId> {
    binary(bridge, "Mul", lhs, rhs)
}

/// Elementwise division.
pub fn div<E: NativeEngine>(
    bridge: &mut TensorBridge<E>,
    lhs: TensorId,
    rhs: TensorId,
) -> BridgeResult<TensorId> {
    binary(bridge, "Div", lhs, rhs)
}

/// Elementwise negation.
pub fn neg<E: NativeEngine>(bridge: &mut TensorBridge<E>, x: TensorId) -> BridgeResult<TensorId> {
    let dtype = bridge.dtype_of(x)?;
    bridge.execute_single_output("Neg", &[Attribute::dtype("T", dtype)], &[x])
}
