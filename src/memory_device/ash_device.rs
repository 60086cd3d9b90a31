use {
    crate::{MemoryDevice, MemoryProperties},
    ash::{prelude::VkResult, vk},
    std::ffi::c_void,
};

/// A memory device backed by a real Vulkan logical device.
pub struct AshMemoryDevice {
    device: ash::Device,
    memory_properties: MemoryProperties,
    max_sampler_anisotropy: f32,
}

impl AshMemoryDevice {
    /// Create a new memory device.
    ///
    /// # Safety
    ///
    /// Unsafe because:
    ///  - the ash device must not be destroyed while this instance or any
    ///    arena created from it still exists
    ///  - `physical_device` must be the device `device` was created from
    pub unsafe fn new(
        instance: &ash::Instance,
        device: ash::Device,
        physical_device: vk::PhysicalDevice,
    ) -> Self {
        let memory_properties =
            MemoryProperties::new(instance, physical_device);
        log::trace!(
            "Memory device with memory properties\n{}",
            memory_properties
        );
        let limits = instance
            .get_physical_device_properties(physical_device)
            .limits;
        Self {
            device,
            memory_properties,
            max_sampler_anisotropy: limits.max_sampler_anisotropy,
        }
    }

    /// The wrapped logical device.
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }
}

impl MemoryDevice for AshMemoryDevice {
    fn memory_properties(&self) -> &MemoryProperties {
        &self.memory_properties
    }

    fn max_sampler_anisotropy(&self) -> f32 {
        self.max_sampler_anisotropy
    }

    unsafe fn create_buffer(
        &self,
        create_info: &vk::BufferCreateInfo,
    ) -> VkResult<vk::Buffer> {
        self.device.create_buffer(create_info, None)
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.device.destroy_buffer(buffer, None)
    }

    unsafe fn buffer_memory_requirements(
        &self,
        buffer: vk::Buffer,
    ) -> vk::MemoryRequirements {
        self.device.get_buffer_memory_requirements(buffer)
    }

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.device.bind_buffer_memory(buffer, memory, offset)
    }

    unsafe fn create_image(
        &self,
        create_info: &vk::ImageCreateInfo,
    ) -> VkResult<vk::Image> {
        self.device.create_image(create_info, None)
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        self.device.destroy_image(image, None)
    }

    unsafe fn image_memory_requirements(
        &self,
        image: vk::Image,
    ) -> vk::MemoryRequirements {
        self.device.get_image_memory_requirements(image)
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.device.bind_image_memory(image, memory, offset)
    }

    unsafe fn create_image_view(
        &self,
        create_info: &vk::ImageViewCreateInfo,
    ) -> VkResult<vk::ImageView> {
        self.device.create_image_view(create_info, None)
    }

    unsafe fn destroy_image_view(&self, image_view: vk::ImageView) {
        self.device.destroy_image_view(image_view, None)
    }

    unsafe fn create_sampler(
        &self,
        create_info: &vk::SamplerCreateInfo,
    ) -> VkResult<vk::Sampler> {
        self.device.create_sampler(create_info, None)
    }

    unsafe fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.device.destroy_sampler(sampler, None)
    }

    unsafe fn allocate_memory(
        &self,
        size_in_bytes: vk::DeviceSize,
        memory_type_index: usize,
    ) -> VkResult<vk::DeviceMemory> {
        let allocate_info = vk::MemoryAllocateInfo {
            allocation_size: size_in_bytes,
            memory_type_index: memory_type_index as u32,
            ..Default::default()
        };
        self.device.allocate_memory(&allocate_info, None)
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        self.device.free_memory(memory, None)
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        size_in_bytes: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        self.device.map_memory(
            memory,
            0,
            size_in_bytes,
            vk::MemoryMapFlags::empty(),
        )
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        self.device.unmap_memory(memory)
    }
}
