use {
    super::device_object::DeviceObject,
    crate::MemoryDevice,
    ash::{prelude::VkResult, vk},
};

/// Everything needed to (re)create a buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BufferDescription {
    pub size_in_bytes: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

impl BufferDescription {
    pub fn new(size_in_bytes: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        Self {
            size_in_bytes,
            usage,
        }
    }
}

/// A Vulkan buffer. Buffers have no objects which depend on their binding.
#[derive(Debug)]
pub struct BufferObject {
    pub(crate) description: BufferDescription,
    pub(crate) buffer: Option<vk::Buffer>,
}

impl BufferObject {
    pub fn new(description: BufferDescription) -> Self {
        Self {
            description,
            buffer: None,
        }
    }
}

impl DeviceObject for BufferObject {
    fn requested_size(&self) -> Option<vk::DeviceSize> {
        Some(self.description.size_in_bytes)
    }

    unsafe fn create(&mut self, device: &dyn MemoryDevice) -> VkResult<()> {
        debug_assert!(self.buffer.is_none());
        let create_info = vk::BufferCreateInfo {
            size: self.description.size_in_bytes,
            usage: self.description.usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        self.buffer = Some(device.create_buffer(&create_info)?);
        Ok(())
    }

    unsafe fn memory_requirements(
        &self,
        device: &dyn MemoryDevice,
    ) -> vk::MemoryRequirements {
        self.buffer
            .map(|buffer| device.buffer_memory_requirements(buffer))
            .unwrap_or_default()
    }

    unsafe fn bind(
        &mut self,
        device: &dyn MemoryDevice,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        let buffer = self.buffer.ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
        device.bind_buffer_memory(buffer, memory, offset)
    }

    unsafe fn destroy_dependents(&mut self, _device: &dyn MemoryDevice) {}

    unsafe fn destroy(&mut self, device: &dyn MemoryDevice) {
        if let Some(buffer) = self.buffer.take() {
            device.destroy_buffer(buffer);
        }
    }
}
