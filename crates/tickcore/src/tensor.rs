use crate::interop::{contiguous_strides, ArrayInterface, DataType, Device, ExternalArray, ForeignRef};
use crate::resource::MemoryBlock;
use crate::TensorError;
use std::fmt;
use std::sync::Arc;

/// Backing memory of a tensor. Cloning a tensor shares the storage; it never
/// copies bytes or touches an external reference count.
#[derive(Clone)]
enum Storage {
    Native(Arc<[u8]>),
    Pooled(Arc<MemoryBlock>),
    Foreign(Arc<ForeignRef>),
}

/// N-dimensional array payload carried inside entities
#[derive(Clone)]
pub struct Tensor {
    dtype: DataType,
    shape: Vec<usize>,
    strides: Vec<isize>,
    device: Device,
    readonly: bool,
    storage: Storage,
}

impl Tensor {
    pub fn zeros(shape: Vec<usize>, dtype: DataType) -> Self {
        let len = shape.iter().product::<usize>() * dtype.itemsize();
        Self::native(shape, dtype, vec![0u8; len].into())
    }

    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Result<Self, TensorError> {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Self::from_bytes(shape, DataType::F32, bytes)
    }

    pub fn from_bytes(shape: Vec<usize>, dtype: DataType, bytes: Vec<u8>) -> Result<Self, TensorError> {
        let required = shape.iter().product::<usize>() * dtype.itemsize();
        if bytes.len() < required {
            return Err(TensorError::BufferTooSmall {
                required,
                actual: bytes.len(),
            });
        }
        Ok(Self::native(shape, dtype, bytes.into()))
    }

    /// Tensor laid out over a block taken from a memory pool. The block goes
    /// back to its pool once the last tensor sharing it is dropped.
    pub fn from_block(block: MemoryBlock, shape: Vec<usize>, dtype: DataType) -> Result<Self, TensorError> {
        let required = shape.iter().product::<usize>() * dtype.itemsize();
        if block.len() < required {
            return Err(TensorError::BufferTooSmall {
                required,
                actual: block.len(),
            });
        }
        Ok(Self {
            strides: contiguous_strides(&shape, dtype.itemsize()),
            dtype,
            shape,
            device: Device::Host,
            readonly: false,
            storage: Storage::Pooled(Arc::new(block)),
        })
    }

    /// Wrap an externally owned array without copying.
    ///
    /// The external reference count goes up by exactly one here and comes back
    /// down when the last clone of the returned tensor is dropped.
    pub fn as_tensor(object: Arc<dyn ExternalArray>) -> Result<Self, TensorError> {
        let interface = object.array_interface();
        interface.validate()?;
        let dtype = interface.dtype()?;
        let strides = interface.resolved_strides()?;

        Ok(Self {
            dtype,
            shape: interface.shape,
            strides,
            device: interface.device,
            readonly: interface.data.1,
            storage: Storage::Foreign(Arc::new(ForeignRef::new(object))),
        })
    }

    /// Import a capsule produced by [`Tensor::to_capsule`]
    pub fn from_capsule(capsule: TensorCapsule) -> Self {
        capsule.tensor
    }

    fn native(shape: Vec<usize>, dtype: DataType, bytes: Arc<[u8]>) -> Self {
        Self {
            strides: contiguous_strides(&shape, dtype.itemsize()),
            dtype,
            shape,
            device: Device::Host,
            readonly: false,
            storage: Storage::Native(bytes),
        }
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn itemsize(&self) -> usize {
        self.dtype.itemsize()
    }

    pub fn nbytes(&self) -> usize {
        self.size() * self.itemsize()
    }

    pub fn is_contiguous(&self) -> bool {
        self.strides == contiguous_strides(&self.shape, self.itemsize())
    }

    pub fn data_ptr(&self) -> usize {
        match &self.storage {
            Storage::Native(bytes) => bytes.as_ptr() as usize,
            Storage::Pooled(block) => block.as_ptr() as usize,
            Storage::Foreign(handle) => handle.object().array_interface().data.0,
        }
    }

    /// Host bytes behind the tensor; `None` for external arrays that do not
    /// expose their memory
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.storage {
            Storage::Native(bytes) => Some(&bytes[..self.nbytes()]),
            Storage::Pooled(block) => Some(&block.as_slice()[..self.nbytes()]),
            Storage::Foreign(handle) => handle.object().host_bytes(),
        }
    }

    /// Native-endian `f32` view of an owned contiguous `<f4` tensor
    pub fn to_f32_vec(&self) -> Option<Vec<f32>> {
        if self.dtype != DataType::F32 || !self.is_contiguous() {
            return None;
        }
        let bytes = self.as_bytes()?;
        Some(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    /// The wrapped external object, if this tensor came from [`Tensor::as_tensor`]
    pub fn external(&self) -> Option<&Arc<dyn ExternalArray>> {
        match &self.storage {
            Storage::Foreign(handle) => Some(handle.object()),
            _ => None,
        }
    }

    pub fn array_interface(&self) -> ArrayInterface {
        let strides = if self.is_contiguous() {
            None
        } else {
            Some(self.strides.clone())
        };
        ArrayInterface {
            version: 3,
            typestr: self.dtype.typestr(),
            shape: self.shape.clone(),
            strides,
            data: (self.data_ptr(), self.readonly),
            device: self.device,
        }
    }

    /// Export a handle that another runtime can import without a copy. The
    /// capsule keeps the storage alive until it is imported or dropped.
    pub fn to_capsule(&self) -> TensorCapsule {
        TensorCapsule {
            interface: self.array_interface(),
            tensor: self.clone(),
        }
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let storage = match &self.storage {
            Storage::Native(_) => "native",
            Storage::Pooled(_) => "pooled",
            Storage::Foreign(_) => "foreign",
        };
        f.debug_struct("Tensor")
            .field("dtype", &self.dtype.typestr())
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("device", &self.device)
            .field("storage", &storage)
            .finish()
    }
}

/// Exported tensor handle
pub struct TensorCapsule {
    interface: ArrayInterface,
    tensor: Tensor,
}

impl TensorCapsule {
    pub fn interface(&self) -> &ArrayInterface {
        &self.interface
    }

    pub fn device(&self) -> Device {
        self.interface.device
    }
}

impl fmt::Debug for TensorCapsule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorCapsule")
            .field("interface", &self.interface)
            .finish()
    }
}
