//! Zero-copy exchange of externally owned arrays.
//!
//! An external runtime describes its buffers with an [`ArrayInterface`] and
//! keeps its own reference count. [`ForeignRef`] is the only place that count
//! is touched: it acquires once when created or cloned and releases once when
//! dropped.

use crate::{OwnershipError, TensorError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Element kind of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataTypeCode {
    Bool,
    Int,
    UInt,
    Float,
    Complex,
}

/// Element type: a kind plus its width in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub code: DataTypeCode,
    pub bits: u16,
}

impl DataType {
    pub const BOOL: DataType = DataType::new(DataTypeCode::Bool, 8);
    pub const U8: DataType = DataType::new(DataTypeCode::UInt, 8);
    pub const I32: DataType = DataType::new(DataTypeCode::Int, 32);
    pub const I64: DataType = DataType::new(DataTypeCode::Int, 64);
    pub const F32: DataType = DataType::new(DataTypeCode::Float, 32);
    pub const F64: DataType = DataType::new(DataTypeCode::Float, 64);

    pub const fn new(code: DataTypeCode, bits: u16) -> Self {
        Self { code, bits }
    }

    pub fn itemsize(&self) -> usize {
        (self.bits as usize) / 8
    }

    /// Array-interface type string, e.g. `<f4` or `|u1`
    pub fn typestr(&self) -> String {
        let kind = match self.code {
            DataTypeCode::Bool => 'b',
            DataTypeCode::Int => 'i',
            DataTypeCode::UInt => 'u',
            DataTypeCode::Float => 'f',
            DataTypeCode::Complex => 'c',
        };
        let order = if self.itemsize() == 1 { '|' } else { '<' };
        format!("{}{}{}", order, kind, self.itemsize())
    }
}

impl FromStr for DataType {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unsupported = || TensorError::UnsupportedDtype(s.to_string());
        let mut chars = s.chars();
        let order = chars.next().ok_or_else(unsupported)?;
        if order != '<' && order != '|' && order != '=' {
            return Err(unsupported());
        }
        let code = match chars.next().ok_or_else(unsupported)? {
            'b' => DataTypeCode::Bool,
            'i' => DataTypeCode::Int,
            'u' => DataTypeCode::UInt,
            'f' => DataTypeCode::Float,
            'c' => DataTypeCode::Complex,
            _ => return Err(unsupported()),
        };
        let bytes: u16 = chars.as_str().parse().map_err(|_| unsupported())?;
        let valid = match code {
            DataTypeCode::Bool => bytes == 1,
            DataTypeCode::Int | DataTypeCode::UInt => matches!(bytes, 1 | 2 | 4 | 8),
            DataTypeCode::Float => matches!(bytes, 2 | 4 | 8),
            DataTypeCode::Complex => matches!(bytes, 8 | 16),
        };
        if !valid {
            return Err(unsupported());
        }
        Ok(DataType::new(code, bytes * 8))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.typestr())
    }
}

/// Where a buffer lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Device {
    #[default]
    Host,
    Cuda { device_id: i32 },
}

/// Structural description of an array, version 3 of the array interface
/// protocol. `strides` is `None` for C-contiguous layouts; `data` is
/// `(pointer, readonly)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayInterface {
    pub version: u32,
    pub typestr: String,
    pub shape: Vec<usize>,
    pub strides: Option<Vec<isize>>,
    pub data: (usize, bool),
    #[serde(default)]
    pub device: Device,
}

impl ArrayInterface {
    pub fn dtype(&self) -> Result<DataType, TensorError> {
        self.typestr.parse()
    }

    /// Strides in bytes, filling in the C-contiguous layout when absent
    pub fn resolved_strides(&self) -> Result<Vec<isize>, TensorError> {
        match &self.strides {
            Some(strides) if strides.len() != self.shape.len() => Err(TensorError::StrideMismatch {
                shape: self.shape.len(),
                strides: strides.len(),
            }),
            Some(strides) => Ok(strides.clone()),
            None => Ok(contiguous_strides(&self.shape, self.dtype()?.itemsize())),
        }
    }

    pub fn validate(&self) -> Result<(), TensorError> {
        self.dtype()?;
        self.resolved_strides()?;
        let elements: usize = self.shape.iter().product();
        if elements > 0 && self.data.0 == 0 {
            return Err(TensorError::NullData);
        }
        Ok(())
    }
}

/// Row-major byte strides for `shape`
pub fn contiguous_strides(shape: &[usize], itemsize: usize) -> Vec<isize> {
    let mut strides = vec![0isize; shape.len()];
    let mut step = itemsize as isize;
    for (i, dim) in shape.iter().enumerate().rev() {
        strides[i] = step;
        step *= (*dim).max(1) as isize;
    }
    strides
}

/// An array owned by a runtime outside this crate.
///
/// `acquire`/`release` mirror that runtime's reference counting. Implementors
/// must keep the memory behind `array_interface().data` valid while their
/// count is positive.
pub trait ExternalArray: Send + Sync {
    fn array_interface(&self) -> ArrayInterface;

    fn acquire(&self);

    fn release(&self) -> Result<(), OwnershipError>;

    fn ref_count(&self) -> usize;

    /// Readable view of host-resident memory, if the owner allows one
    fn host_bytes(&self) -> Option<&[u8]> {
        None
    }

    /// Label used in diagnostics
    fn label(&self) -> String {
        "external array".to_string()
    }
}

/// Owning handle on an [`ExternalArray`]: one acquire per live handle.
///
/// The handle remembers the ledger that was current when it was created;
/// a failed release on drop is recorded there.
pub struct ForeignRef {
    object: Arc<dyn ExternalArray>,
    ledger: Option<Arc<OwnershipLedger>>,
}

impl ForeignRef {
    pub fn new(object: Arc<dyn ExternalArray>) -> Self {
        Self::with_ledger(object, OwnershipLedger::current())
    }

    fn with_ledger(object: Arc<dyn ExternalArray>, ledger: Option<Arc<OwnershipLedger>>) -> Self {
        object.acquire();
        tracing::trace!(
            "Acquired {} (refcount: {})",
            object.label(),
            object.ref_count()
        );
        Self { object, ledger }
    }

    pub fn object(&self) -> &Arc<dyn ExternalArray> {
        &self.object
    }

    pub fn ref_count(&self) -> usize {
        self.object.ref_count()
    }
}

impl Clone for ForeignRef {
    fn clone(&self) -> Self {
        ForeignRef::with_ledger(self.object.clone(), self.ledger.clone())
    }
}

impl Drop for ForeignRef {
    fn drop(&mut self) {
        match self.object.release() {
            Ok(()) => tracing::trace!(
                "Released {} (refcount: {})",
                self.object.label(),
                self.object.ref_count()
            ),
            Err(e) => match &self.ledger {
                Some(ledger) => ledger.record(e),
                None => record_violation(e),
            },
        }
    }
}

impl fmt::Debug for ForeignRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignRef")
            .field("object", &self.object.label())
            .field("ref_count", &self.object.ref_count())
            .finish()
    }
}

tokio::task_local! {
    static CURRENT_LEDGER: Arc<OwnershipLedger>;
}

/// Ownership violations detected where no error can be returned (inside
/// `Drop`). Each run owns one; executors poll it and abort.
#[derive(Debug)]
pub struct OwnershipLedger {
    violations: AtomicUsize,
    last: Mutex<Option<OwnershipError>>,
}

impl OwnershipLedger {
    pub const fn new() -> Self {
        Self {
            violations: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    /// Ledger of the surrounding [`OwnershipLedger::scope`], if any
    pub fn current() -> Option<Arc<OwnershipLedger>> {
        CURRENT_LEDGER.try_with(Arc::clone).ok()
    }

    /// Run `future` with `self` as the ledger of every handle it creates
    pub async fn scope<F: Future>(self: Arc<Self>, future: F) -> F::Output {
        CURRENT_LEDGER.scope(self, future).await
    }

    pub fn record(&self, error: OwnershipError) {
        tracing::error!("{}", error);
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
        self.violations.fetch_add(1, Ordering::SeqCst);
    }

    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }

    /// Most recently recorded violation
    pub fn last_violation(&self) -> Option<OwnershipError> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Default for OwnershipLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Catches violations of handles created outside any run
static PROCESS_LEDGER: OwnershipLedger = OwnershipLedger::new();

pub fn record_violation(error: OwnershipError) {
    PROCESS_LEDGER.record(error);
}

/// Violations of handles created outside any run
pub fn ownership_violations() -> usize {
    PROCESS_LEDGER.violations()
}

pub fn last_violation() -> Option<OwnershipError> {
    PROCESS_LEDGER.last_violation()
}

/// Host-memory array with its own reference count, standing in for an array
/// object of an embedding runtime. The creator holds the first reference.
pub struct HostArray {
    label: String,
    dtype: DataType,
    shape: Vec<usize>,
    strides: Vec<isize>,
    buffer: Box<[u8]>,
    readonly: bool,
    refcount: AtomicUsize,
}

impl HostArray {
    pub fn zeros(label: impl Into<String>, shape: Vec<usize>, dtype: DataType) -> Arc<Self> {
        let len = shape.iter().product::<usize>() * dtype.itemsize();
        Self::from_bytes(label, shape, dtype, vec![0u8; len])
    }

    /// `0.0, 1.0, ...` as `f32`, shaped like `shape`
    pub fn arange_f32(label: impl Into<String>, shape: Vec<usize>) -> Arc<Self> {
        let count: usize = shape.iter().product();
        let bytes = (0..count)
            .flat_map(|i| (i as f32).to_ne_bytes())
            .collect::<Vec<u8>>();
        Self::from_bytes(label, shape, DataType::F32, bytes)
    }

    pub fn from_bytes(
        label: impl Into<String>,
        shape: Vec<usize>,
        dtype: DataType,
        bytes: Vec<u8>,
    ) -> Arc<Self> {
        let strides = contiguous_strides(&shape, dtype.itemsize());
        Self::with_layout(label, shape, strides, dtype, bytes)
    }

    /// Buffer viewed through explicit byte strides (e.g. Fortran order)
    pub fn with_layout(
        label: impl Into<String>,
        shape: Vec<usize>,
        strides: Vec<isize>,
        dtype: DataType,
        bytes: Vec<u8>,
    ) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            dtype,
            shape,
            strides,
            buffer: bytes.into_boxed_slice(),
            readonly: false,
            refcount: AtomicUsize::new(1),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }
}

impl ExternalArray for HostArray {
    fn array_interface(&self) -> ArrayInterface {
        let contiguous = contiguous_strides(&self.shape, self.dtype.itemsize());
        ArrayInterface {
            version: 3,
            typestr: self.dtype.typestr(),
            shape: self.shape.clone(),
            strides: (self.strides != contiguous).then(|| self.strides.clone()),
            data: (self.buffer.as_ptr() as usize, self.readonly),
            device: Device::Host,
        }
    }

    fn acquire(&self) {
        self.refcount.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) -> Result<(), OwnershipError> {
        self.refcount
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1))
            .map(|_| ())
            .map_err(|_| OwnershipError::Underflow {
                object: self.label.clone(),
            })
    }

    fn ref_count(&self) -> usize {
        self.refcount.load(Ordering::SeqCst)
    }

    fn host_bytes(&self) -> Option<&[u8]> {
        Some(&self.buffer)
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

impl fmt::Debug for HostArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostArray")
            .field("label", &self.label)
            .field("dtype", &self.dtype)
            .field("shape", &self.shape)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
