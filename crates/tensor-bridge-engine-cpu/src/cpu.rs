//! In-memory reference engine backing the bridge's handle contract.
//!
//! Buffers live in a process-local table keyed by monotonically increasing
//! integer handles. Kernels cover the small op vocabulary the bridge's tests
//! and wrappers exercise; an interceptor hook lets embedders (and tests)
//! observe or replace kernel dispatch.

use std::collections::HashMap;
use std::ops::Add;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use log::debug;
use tensor_bridge::attr::{self, Attribute};
use tensor_bridge::{
    BufferDescriptor, DType, EngineError, EngineResult, HostBuffer, NativeEngine, Shape,
};

/// Integer handle into the engine's buffer table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuBufferHandle(u64);

impl CpuBufferHandle {
    /// Returns the raw table key.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// One allocated buffer: metadata plus its typed payload.
#[derive(Debug, Clone)]
pub struct CpuBuffer {
    pub shape: Shape,
    pub dtype: DType,
    pub data: HostBuffer,
}

/// Hook consulted before built-in kernel dispatch.
///
/// Returning `Some` short-circuits the built-in kernels with the provided
/// outputs; returning `None` falls through. Tests use this to count and
/// stub invocations.
pub trait KernelInterceptor: Send + Sync {
    fn try_invoke(
        &self,
        op_name: &str,
        attrs: &[Attribute],
        inputs: &[CpuBuffer],
        num_outputs: usize,
    ) -> Option<EngineResult<Vec<CpuBuffer>>>;
}

/// Interceptor that always falls through to the built-in kernels.
#[derive(Default)]
pub struct NoopInterceptor;

impl KernelInterceptor for NoopInterceptor {
    fn try_invoke(
        &self,
        _op_name: &str,
        _attrs: &[Attribute],
        _inputs: &[CpuBuffer],
        _num_outputs: usize,
    ) -> Option<EngineResult<Vec<CpuBuffer>>> {
        None
    }
}

/// Reference CPU engine with an in-process buffer table.
pub struct CpuEngine<I: KernelInterceptor> {
    interceptor: Arc<I>,
    buffers: RwLock<HashMap<u64, CpuBuffer>>,
    next_handle: AtomicU64,
    invocations: AtomicUsize,
}

impl CpuEngine<NoopInterceptor> {
    pub fn new() -> Self {
        Self::with_interceptor(NoopInterceptor)
    }
}

impl Default for CpuEngine<NoopInterceptor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: KernelInterceptor> CpuEngine<I> {
    pub fn with_interceptor(interceptor: I) -> Self {
        Self::with_arc(Arc::new(interceptor))
    }

    pub fn with_arc(interceptor: Arc<I>) -> Self {
        Self {
            interceptor,
            buffers: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn interceptor(&self) -> &I {
        self.interceptor.as_ref()
    }

    /// Number of live buffers in the table.
    pub fn buffer_count(&self) -> usize {
        self.buffers.read().unwrap().len()
    }

    /// Number of `invoke` calls the engine has received.
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }

    fn insert(&self, buffer: CpuBuffer) -> CpuBufferHandle {
        let handle = CpuBufferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.buffers.write().unwrap().insert(handle.0, buffer);
        handle
    }

    fn lookup(&self, handle: CpuBufferHandle) -> EngineResult<CpuBuffer> {
        self.buffers
            .read()
            .unwrap()
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| EngineError::invalid_handle(format!("no buffer for handle {}", handle.0)))
    }
}

impl<I: KernelInterceptor + 'static> NativeEngine for CpuEngine<I> {
    type BufferHandle = CpuBufferHandle;

    fn engine_name(&self) -> &str {
        "cpu"
    }

    fn allocate_buffer(
        &self,
        shape: &Shape,
        dtype: DType,
        payload: &HostBuffer,
    ) -> EngineResult<Self::BufferHandle> {
        validate_payload(shape, dtype, payload)?;
        let handle = self.insert(CpuBuffer {
            shape: shape.clone(),
            dtype,
            data: payload.clone(),
        });
        debug!(
            "allocated buffer {} ({:?}, {:?})",
            handle.0,
            shape.dims(),
            dtype
        );
        Ok(handle)
    }

    fn free_buffer(&self, handle: &Self::BufferHandle) -> EngineResult<()> {
        match self.buffers.write().unwrap().remove(&handle.0) {
            Some(_) => Ok(()),
            None => Err(EngineError::invalid_handle(format!(
                "free of unknown handle {}",
                handle.0
            ))),
        }
    }

    fn read_buffer(&self, handle: &Self::BufferHandle) -> EngineResult<HostBuffer> {
        self.lookup(*handle).map(|buffer| buffer.data)
    }

    fn invoke(
        &self,
        op_name: &str,
        attrs: &[Attribute],
        inputs: &[Self::BufferHandle],
        num_outputs: usize,
    ) -> EngineResult<Vec<BufferDescriptor<Self::BufferHandle>>> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let mut operands = Vec::with_capacity(inputs.len());
        for handle in inputs {
            operands.push(self.lookup(*handle)?);
        }
        let outputs = match self
            .interceptor
            .try_invoke(op_name, attrs, &operands, num_outputs)
        {
            Some(result) => result?,
            None => dispatch_kernel(op_name, attrs, &operands)?,
        };
        if outputs.len() != num_outputs {
            return Err(EngineError::execution(format!(
                "'{}' produced {} outputs, caller requested {}",
                op_name,
                outputs.len(),
                num_outputs
            )));
        }
        Ok(outputs
            .into_iter()
            .map(|buffer| {
                let shape = buffer.shape.clone();
                let dtype = buffer.dtype;
                let handle = self.insert(buffer);
                BufferDescriptor::new(shape, dtype, handle)
            })
            .collect())
    }
}

/// Storage lanes per logical element, `None` for dtypes without payloads.
fn lanes_per_element(dtype: DType) -> Option<usize> {
    match dtype {
        DType::F32 | DType::I32 | DType::Bool => Some(1),
        DType::C64 => Some(2),
        DType::Str => None,
    }
}

fn validate_payload(shape: &Shape, dtype: DType, payload: &HostBuffer) -> EngineResult<()> {
    let lanes = lanes_per_element(dtype).ok_or_else(|| {
        EngineError::unimplemented("allocate_buffer", format!("{dtype:?} buffers"))
    })?;
    let kind_ok = matches!(
        (payload, dtype),
        (HostBuffer::F32(_), DType::F32)
            | (HostBuffer::F32(_), DType::C64)
            | (HostBuffer::I32(_), DType::I32)
            | (HostBuffer::U8(_), DType::Bool)
    );
    if !kind_ok {
        return Err(EngineError::execution(format!(
            "payload kind does not carry {dtype:?} values"
        )));
    }
    let expected = shape.num_elements() * lanes;
    if payload.len() != expected {
        return Err(EngineError::execution(format!(
            "payload length {} does not match shape {:?} ({} lanes expected)",
            payload.len(),
            shape.dims(),
            expected
        )));
    }
    Ok(())
}

fn dispatch_kernel(
    op_name: &str,
    attrs: &[Attribute],
    inputs: &[CpuBuffer],
) -> EngineResult<Vec<CpuBuffer>> {
    match op_name {
        "Add" => binary_elementwise(op_name, attrs, inputs, |a, b| a + b, |a, b| a + b),
        "Sub" => binary_elementwise(op_name, attrs, inputs, |a, b| a - b, |a, b| a - b),
        "Mul" => binary_elementwise(op_name, attrs, inputs, |a, b| a * b, |a, b| a * b),
        "Div" => div_elementwise(op_name, attrs, inputs),
        "Neg" => neg_kernel(op_name, attrs, inputs),
        "Cast" => cast_kernel(op_name, attrs, inputs),
        "Sum" => sum_kernel(op_name, attrs, inputs),
        "Reshape" => reshape_kernel(op_name, attrs, inputs),
        "TopK" => top_k_kernel(op_name, attrs, inputs),
        other => Err(EngineError::unimplemented(
            other,
            "no kernel registered for this op",
        )),
    }
}

fn required_dtype_attr(op_name: &str, attrs: &[Attribute], name: &str) -> EngineResult<DType> {
    attr::get_dtype(attrs, name).ok_or_else(|| {
        EngineError::execution(format!("'{op_name}' requires a '{name}' dtype attribute"))
    })
}

fn expect_inputs<'a>(
    op_name: &str,
    inputs: &'a [CpuBuffer],
    count: usize,
) -> EngineResult<&'a [CpuBuffer]> {
    if inputs.len() != count {
        return Err(EngineError::execution(format!(
            "'{}' expects {} inputs, got {}",
            op_name,
            count,
            inputs.len()
        )));
    }
    Ok(inputs)
}

/// Widens a buffer's payload to f32 lanes. Only upward coercions are allowed.
fn lanes_f32(op_name: &str, buffer: &CpuBuffer) -> EngineResult<Vec<f32>> {
    match (&buffer.data, buffer.dtype) {
        (HostBuffer::F32(values), DType::F32) => Ok(values.to_vec()),
        (HostBuffer::I32(values), DType::I32) => {
            Ok(values.iter().map(|value| *value as f32).collect())
        }
        (HostBuffer::U8(values), DType::Bool) => Ok(values
            .iter()
            .map(|value| if *value != 0 { 1.0 } else { 0.0 })
            .collect()),
        _ => Err(EngineError::execution(format!(
            "'{}' cannot widen {:?} operand to f32",
            op_name, buffer.dtype
        ))),
    }
}

/// Widens a buffer's payload to i32 lanes. Narrowing from float is rejected.
fn lanes_i32(op_name: &str, buffer: &CpuBuffer) -> EngineResult<Vec<i32>> {
    match (&buffer.data, buffer.dtype) {
        (HostBuffer::I32(values), DType::I32) => Ok(values.to_vec()),
        (HostBuffer::U8(values), DType::Bool) => Ok(values
            .iter()
            .map(|value| if *value != 0 { 1 } else { 0 })
            .collect()),
        _ => Err(EngineError::execution(format!(
            "'{}' cannot widen {:?} operand to i32",
            op_name, buffer.dtype
        ))),
    }
}

fn ensure_same_shape(op_name: &str, lhs: &CpuBuffer, rhs: &CpuBuffer) -> EngineResult<()> {
    if lhs.shape != rhs.shape {
        return Err(EngineError::execution(format!(
            "'{}' operand shapes {:?} and {:?} do not match",
            op_name,
            lhs.shape.dims(),
            rhs.shape.dims()
        )));
    }
    Ok(())
}

fn binary_elementwise(
    op_name: &str,
    attrs: &[Attribute],
    inputs: &[CpuBuffer],
    apply_f32: impl Fn(f32, f32) -> f32,
    apply_i32: impl Fn(i32, i32) -> i32,
) -> EngineResult<Vec<CpuBuffer>> {
    let inputs = expect_inputs(op_name, inputs, 2)?;
    let dtype = required_dtype_attr(op_name, attrs, "T")?;
    ensure_same_shape(op_name, &inputs[0], &inputs[1])?;
    let shape = inputs[0].shape.clone();
    let data = match dtype {
        DType::F32 => {
            let lhs = lanes_f32(op_name, &inputs[0])?;
            let rhs = lanes_f32(op_name, &inputs[1])?;
            HostBuffer::from_f32(
                lhs.iter()
                    .zip(rhs.iter())
                    .map(|(a, b)| apply_f32(*a, *b))
                    .collect(),
            )
        }
        DType::I32 => {
            let lhs = lanes_i32(op_name, &inputs[0])?;
            let rhs = lanes_i32(op_name, &inputs[1])?;
            HostBuffer::from_i32(
                lhs.iter()
                    .zip(rhs.iter())
                    .map(|(a, b)| apply_i32(*a, *b))
                    .collect(),
            )
        }
        other => {
            return Err(EngineError::unimplemented(
                op_name,
                format!("elementwise arithmetic over {other:?}"),
            ))
        }
    };
    Ok(vec![CpuBuffer { shape, dtype, data }])
}

fn div_elementwise(
    op_name: &str,
    attrs: &[Attribute],
    inputs: &[CpuBuffer],
) -> EngineResult<Vec<CpuBuffer>> {
    let dtype = required_dtype_attr(op_name, attrs, "T")?;
    if dtype == DType::I32 {
        let inputs = expect_inputs(op_name, inputs, 2)?;
        let rhs = lanes_i32(op_name, &inputs[1])?;
        if rhs.contains(&0) {
            return Err(EngineError::execution("integer divide by zero"));
        }
    }
    binary_elementwise(op_name, attrs, inputs, |a, b| a / b, |a, b| a / b)
}

fn neg_kernel(
    op_name: &str,
    attrs: &[Attribute],
    inputs: &[CpuBuffer],
) -> EngineResult<Vec<CpuBuffer>> {
    let inputs = expect_inputs(op_name, inputs, 1)?;
    let dtype = required_dtype_attr(op_name, attrs, "T")?;
    let shape = inputs[0].shape.clone();
    let data = match dtype {
        DType::F32 => {
            HostBuffer::from_f32(lanes_f32(op_name, &inputs[0])?.iter().map(|v| -v).collect())
        }
        DType::I32 => {
            HostBuffer::from_i32(lanes_i32(op_name, &inputs[0])?.iter().map(|v| -v).collect())
        }
        other => {
            return Err(EngineError::unimplemented(
                op_name,
                format!("negation over {other:?}"),
            ))
        }
    };
    Ok(vec![CpuBuffer { shape, dtype, data }])
}

fn cast_kernel(
    op_name: &str,
    attrs: &[Attribute],
    inputs: &[CpuBuffer],
) -> EngineResult<Vec<CpuBuffer>> {
    let inputs = expect_inputs(op_name, inputs, 1)?;
    let src = required_dtype_attr(op_name, attrs, "SrcT")?;
    let dst = required_dtype_attr(op_name, attrs, "DstT")?;
    let input = &inputs[0];
    if input.dtype != src {
        return Err(EngineError::execution(format!(
            "'{}' SrcT {:?} does not match operand dtype {:?}",
            op_name, src, input.dtype
        )));
    }
    let as_f32 = match (&input.data, input.dtype) {
        (HostBuffer::F32(values), DType::F32) => values.to_vec(),
        (HostBuffer::I32(values), DType::I32) => values.iter().map(|v| *v as f32).collect(),
        (HostBuffer::U8(values), DType::Bool) => values
            .iter()
            .map(|v| if *v != 0 { 1.0 } else { 0.0 })
            .collect(),
        _ => {
            return Err(EngineError::unimplemented(
                op_name,
                format!("cast from {:?}", input.dtype),
            ))
        }
    };
    let data = match dst {
        DType::F32 => HostBuffer::from_f32(as_f32),
        DType::I32 => HostBuffer::from_i32(as_f32.iter().map(|v| *v as i32).collect()),
        DType::Bool => HostBuffer::from_u8(
            as_f32
                .iter()
                .map(|v| if *v != 0.0 { 1 } else { 0 })
                .collect(),
        ),
        other => {
            return Err(EngineError::unimplemented(
                op_name,
                format!("cast to {other:?}"),
            ))
        }
    };
    Ok(vec![CpuBuffer {
        shape: input.shape.clone(),
        dtype: dst,
        data,
    }])
}

/// Normalizes reduction axes (negative values count from the back) and
/// validates their range.
fn normalize_axes(op_name: &str, axes: &[i64], rank: usize) -> EngineResult<Vec<usize>> {
    let mut normalized = Vec::with_capacity(axes.len());
    for axis in axes {
        let resolved = if *axis < 0 {
            *axis + rank as i64
        } else {
            *axis
        };
        if resolved < 0 || resolved >= rank as i64 {
            return Err(EngineError::execution(format!(
                "'{}' axis {} out of range for rank {}",
                op_name, axis, rank
            )));
        }
        normalized.push(resolved as usize);
    }
    normalized.sort_unstable();
    normalized.dedup();
    Ok(normalized)
}

fn reduced_shape(dims: &[usize], axes: &[usize], keep_dims: bool) -> Vec<usize> {
    dims.iter()
        .enumerate()
        .filter_map(|(index, dim)| {
            if axes.contains(&index) {
                keep_dims.then_some(1)
            } else {
                Some(*dim)
            }
        })
        .collect()
}

/// Sums `data` over `axes` by scattering each input element into the slot
/// its non-reduced coordinates select.
fn sum_over_axes<T: Copy + Default + Add<Output = T>>(
    data: &[T],
    dims: &[usize],
    axes: &[usize],
) -> Vec<T> {
    let out_len: usize = dims
        .iter()
        .enumerate()
        .filter(|(index, _)| !axes.contains(index))
        .map(|(_, dim)| *dim)
        .product();
    let mut output = vec![T::default(); out_len];
    for (flat, value) in data.iter().enumerate() {
        let mut remainder = flat;
        let mut coords = vec![0usize; dims.len()];
        for (index, dim) in dims.iter().enumerate().rev() {
            coords[index] = remainder % dim;
            remainder /= dim;
        }
        let mut out_index = 0usize;
        for (index, dim) in dims.iter().enumerate() {
            if axes.contains(&index) {
                continue;
            }
            out_index = out_index * dim + coords[index];
        }
        output[out_index] = output[out_index] + *value;
    }
    output
}

fn sum_kernel(
    op_name: &str,
    attrs: &[Attribute],
    inputs: &[CpuBuffer],
) -> EngineResult<Vec<CpuBuffer>> {
    let inputs = expect_inputs(op_name, inputs, 1)?;
    let dtype = required_dtype_attr(op_name, attrs, "T")?;
    let axes = attr::get_int_list(attrs, "axes").ok_or_else(|| {
        EngineError::execution(format!("'{op_name}' requires an 'axes' attribute"))
    })?;
    let keep_dims = attr::get_bool(attrs, "keep_dims").unwrap_or(false);
    let input = &inputs[0];
    let dims = input.shape.dims();
    let axes = normalize_axes(op_name, axes, dims.len())?;
    let out_shape = Shape::new(reduced_shape(dims, &axes, keep_dims));
    let data = match dtype {
        DType::F32 => {
            HostBuffer::from_f32(sum_over_axes(&lanes_f32(op_name, input)?, dims, &axes))
        }
        DType::I32 => {
            HostBuffer::from_i32(sum_over_axes(&lanes_i32(op_name, input)?, dims, &axes))
        }
        other => {
            return Err(EngineError::unimplemented(
                op_name,
                format!("summation over {other:?}"),
            ))
        }
    };
    Ok(vec![CpuBuffer {
        shape: out_shape,
        dtype,
        data,
    }])
}

fn reshape_kernel(
    op_name: &str,
    attrs: &[Attribute],
    inputs: &[CpuBuffer],
) -> EngineResult<Vec<CpuBuffer>> {
    let inputs = expect_inputs(op_name, inputs, 1)?;
    let requested = attr::get_int_list(attrs, "shape").ok_or_else(|| {
        EngineError::execution(format!("'{op_name}' requires a 'shape' attribute"))
    })?;
    let input = &inputs[0];
    let mut dims = Vec::with_capacity(requested.len());
    for dim in requested {
        if *dim < 0 {
            return Err(EngineError::execution(format!(
                "'{}' does not support inferred dimensions (got {})",
                op_name, dim
            )));
        }
        dims.push(*dim as usize);
    }
    let new_shape = Shape::new(dims);
    if new_shape.num_elements() != input.shape.num_elements() {
        return Err(EngineError::execution(format!(
            "'{}' cannot reshape {:?} into {:?}",
            op_name,
            input.shape.dims(),
            new_shape.dims()
        )));
    }
    Ok(vec![CpuBuffer {
        shape: new_shape,
        dtype: input.dtype,
        data: input.data.clone(),
    }])
}

/// Selects the `k` largest entries of each row, descending, ties broken by
/// the lower index.
fn top_k_rows<T: Copy + PartialOrd>(data: &[T], cols: usize, k: usize) -> (Vec<T>, Vec<i32>) {
    let rows = data.len() / cols.max(1);
    let mut values = Vec::with_capacity(rows * k);
    let mut indices = Vec::with_capacity(rows * k);
    for row in 0..rows {
        let slice = &data[row * cols..(row + 1) * cols];
        let mut order: Vec<usize> = (0..cols).collect();
        order.sort_by(|a, b| {
            slice[*b]
                .partial_cmp(&slice[*a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(b))
        });
        for index in order.into_iter().take(k) {
            values.push(slice[index]);
            indices.push(index as i32);
        }
    }
    (values, indices)
}

fn top_k_kernel(
    op_name: &str,
    attrs: &[Attribute],
    inputs: &[CpuBuffer],
) -> EngineResult<Vec<CpuBuffer>> {
    let inputs = expect_inputs(op_name, inputs, 1)?;
    let k = attr::get_int(attrs, "k")
        .ok_or_else(|| EngineError::execution(format!("'{op_name}' requires a 'k' attribute")))?;
    let input = &inputs[0];
    let dims = input.shape.dims();
    if dims.is_empty() {
        return Err(EngineError::execution(format!(
            "'{op_name}' requires rank >= 1"
        )));
    }
    let cols = dims[dims.len() - 1];
    if k < 0 || k as usize > cols {
        return Err(EngineError::execution(format!(
            "'{}' k {} out of range for last axis {}",
            op_name, k, cols
        )));
    }
    let k = k as usize;
    let mut out_dims = dims.to_vec();
    *out_dims.last_mut().expect("rank checked above") = k;
    let out_shape = Shape::new(out_dims);
    let (values, indices) = match (&input.data, input.dtype) {
        (HostBuffer::F32(data), DType::F32) => {
            let (values, indices) = top_k_rows(data, cols, k);
            (HostBuffer::from_f32(values), indices)
        }
        (HostBuffer::I32(data), DType::I32) => {
            let (values, indices) = top_k_rows(data, cols, k);
            (HostBuffer::from_i32(values), indices)
        }
        _ => {
            return Err(EngineError::unimplemented(
                op_name,
                format!("selection over {:?}", input.dtype),
            ))
        }
    };
    Ok(vec![
        CpuBuffer {
            shape: out_shape.clone(),
            dtype: input.dtype,
            data: values,
        },
        CpuBuffer {
            shape: out_shape,
            dtype: DType::I32,
            data: HostBuffer::from_i32(indices),
        },
    ])
}
