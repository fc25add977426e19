//! Shared helper objects attached to operators (memory pools, allocators).
//!
//! Resources are shared by `Arc`; each one does its own locking so any number
//! of operators may allocate from it concurrently.

use crate::ResourceError;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

pub trait Resource: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

/// Memory handed out by a pool or allocator
pub struct MemoryBlock {
    data: Box<[u8]>,
    home: Option<Arc<PoolShared>>,
}

impl MemoryBlock {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for MemoryBlock {
    fn drop(&mut self) {
        if let Some(home) = self.home.take() {
            let data = std::mem::take(&mut self.data);
            home.give_back(data);
        }
    }
}

impl fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBlock")
            .field("len", &self.data.len())
            .field("pooled", &self.home.is_some())
            .finish()
    }
}

struct PoolShared {
    free: Mutex<Vec<Box<[u8]>>>,
}

impl PoolShared {
    fn give_back(&self, mut data: Box<[u8]>) {
        data.fill(0);
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(data);
    }
}

/// Fixed number of equally sized blocks, allocated up front
pub struct BlockMemoryPool {
    name: String,
    block_size: usize,
    num_blocks: usize,
    shared: Arc<PoolShared>,
}

impl BlockMemoryPool {
    pub fn new(name: impl Into<String>, block_size: usize, num_blocks: usize) -> Self {
        let free = (0..num_blocks)
            .map(|_| vec![0u8; block_size].into_boxed_slice())
            .collect();
        Self {
            name: name.into(),
            block_size,
            num_blocks,
            shared: Arc::new(PoolShared {
                free: Mutex::new(free),
            }),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    pub fn available(&self) -> usize {
        self.shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Take one block able to hold `size` bytes
    pub fn allocate(&self, size: usize) -> Result<MemoryBlock, ResourceError> {
        if size > self.block_size {
            return Err(ResourceError::BlockTooSmall {
                requested: size,
                block_size: self.block_size,
            });
        }

        let data = self
            .shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or_else(|| ResourceError::Exhausted {
                pool: self.name.clone(),
                blocks: self.num_blocks,
            })?;

        tracing::trace!("Pool '{}' handed out a {}-byte block", self.name, self.block_size);

        Ok(MemoryBlock {
            data,
            home: Some(self.shared.clone()),
        })
    }
}

impl Resource for BlockMemoryPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for BlockMemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockMemoryPool")
            .field("name", &self.name)
            .field("block_size", &self.block_size)
            .field("num_blocks", &self.num_blocks)
            .field("available", &self.available())
            .finish()
    }
}

/// Allocator without a capacity limit; blocks are freed on drop
#[derive(Debug)]
pub struct UnboundedAllocator {
    name: String,
}

impl UnboundedAllocator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn allocate(&self, size: usize) -> MemoryBlock {
        MemoryBlock {
            data: vec![0u8; size].into_boxed_slice(),
            home: None,
        }
    }
}

impl Resource for UnboundedAllocator {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
