use {
    crate::{pretty_wrappers::PrettySize, MemoryDevice},
    ash::{prelude::VkResult, vk},
    std::{fmt::Debug, ptr::NonNull},
};

/// The single block of device memory owned by an arena.
///
/// When the memory type is HOST_VISIBLE the whole block is mapped exactly
/// once, right after allocation, and stays mapped until it is freed. Calling
/// vkMapMemory on memory which is already mapped is an error in Vulkan, so
/// resources never map anything themselves. They only receive a
/// [MappedRegion] sliced from this block.
pub struct DeviceMemory {
    memory: vk::DeviceMemory,
    size_in_bytes: vk::DeviceSize,
    mapped_ptr: Option<NonNull<u8>>,
}

impl DeviceMemory {
    /// Allocate a new block of device memory.
    ///
    /// # Safety
    ///
    /// Unsafe because the memory must be freed with [Self::free] before the
    /// device is destroyed.
    pub unsafe fn allocate(
        device: &dyn MemoryDevice,
        size_in_bytes: vk::DeviceSize,
        memory_type_index: usize,
    ) -> VkResult<Self> {
        let memory = device.allocate_memory(size_in_bytes, memory_type_index)?;
        Ok(Self {
            memory,
            size_in_bytes,
            mapped_ptr: None,
        })
    }

    /// The underlying Vulkan memory handle.
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// The size of the allocation in bytes.
    pub fn size_in_bytes(&self) -> vk::DeviceSize {
        self.size_in_bytes
    }

    /// Returns true once [Self::map] has succeeded.
    pub fn is_mapped(&self) -> bool {
        self.mapped_ptr.is_some()
    }

    /// Map the entire allocation into host memory.
    ///
    /// # Safety
    ///
    /// Unsafe because the memory type must be HOST_VISIBLE.
    pub unsafe fn map(&mut self, device: &dyn MemoryDevice) -> VkResult<()> {
        if self.mapped_ptr.is_some() {
            return Ok(());
        }
        let ptr = device.map_memory(self.memory, self.size_in_bytes)?;
        self.mapped_ptr = NonNull::new(ptr as *mut u8);
        if self.mapped_ptr.is_none() {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }
        Ok(())
    }

    /// Slice a region out of the mapped allocation.
    ///
    /// Returns None when the memory isn't mapped or the region doesn't fit.
    pub fn region(
        &self,
        offset: vk::DeviceSize,
        len: vk::DeviceSize,
    ) -> Option<MappedRegion> {
        let base = self.mapped_ptr?;
        let end = offset.checked_add(len)?;
        if end > self.size_in_bytes {
            return None;
        }
        // SAFE because the range was just checked against the mapping.
        let ptr = unsafe { base.as_ptr().add(offset as usize) };
        Some(MappedRegion {
            ptr: NonNull::new(ptr)?,
            len: len as usize,
        })
    }

    /// Unmap (if needed) and free the memory.
    ///
    /// # Safety
    ///
    /// Unsafe because:
    /// - every MappedRegion sliced from this memory must already be dropped
    /// - the GPU must no longer be using any resource bound to this memory
    pub unsafe fn free(self, device: &dyn MemoryDevice) {
        if self.mapped_ptr.is_some() {
            device.unmap_memory(self.memory);
        }
        device.free_memory(self.memory);
    }
}

impl Debug for DeviceMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceMemory")
            .field("memory", &self.memory)
            .field("size_in_bytes", &PrettySize(self.size_in_bytes))
            .field("mapped_ptr", &self.mapped_ptr)
            .finish()
    }
}

/// A resource's non-owning view into its arena's mapped memory.
///
/// Regions handed to resources in one arena never overlap. A region is only
/// valid until the arena repacks or closes, at which point the arena takes
/// it back from the resource before the memory is unmapped.
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl MappedRegion {
    /// The length of the region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when the region has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The region's bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFE because the arena keeps the memory mapped for as long as the
        // region exists and regions are disjoint.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The region's bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFE because the arena keeps the memory mapped for as long as the
        // region exists, regions are disjoint, and &mut self guarantees
        // exclusive access to this one.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("ptr", &self.ptr)
            .field("len", &PrettySize(self.len as u64))
            .finish()
    }
}
