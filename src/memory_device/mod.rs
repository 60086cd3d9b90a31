mod ash_device;
mod fake_device;

use {crate::MemoryProperties, ash::prelude::VkResult, ash::vk, std::ffi::c_void};

pub use self::{ash_device::AshMemoryDevice, fake_device::FakeMemoryDevice};

/// Every device operation the arenas and resources need.
///
/// The arena core only ever talks to the GPU through this trait. Each method
/// maps to exactly one Vulkan entry point so the `ash` implementation stays a
/// thin shim, and tests can substitute an in-process device.
///
/// # Safety
///
/// All unsafe methods share the requirements of the Vulkan call they wrap:
/// handles must have been created by this device and must not be in use by
/// the GPU when destroyed, freed, or unmapped.
pub trait MemoryDevice {
    /// The memory types and heaps available on the device.
    fn memory_properties(&self) -> &MemoryProperties;

    /// The largest anisotropy a sampler may request.
    fn max_sampler_anisotropy(&self) -> f32;

    unsafe fn create_buffer(
        &self,
        create_info: &vk::BufferCreateInfo,
    ) -> VkResult<vk::Buffer>;

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer);

    unsafe fn buffer_memory_requirements(
        &self,
        buffer: vk::Buffer,
    ) -> vk::MemoryRequirements;

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()>;

    unsafe fn create_image(
        &self,
        create_info: &vk::ImageCreateInfo,
    ) -> VkResult<vk::Image>;

    unsafe fn destroy_image(&self, image: vk::Image);

    unsafe fn image_memory_requirements(
        &self,
        image: vk::Image,
    ) -> vk::MemoryRequirements;

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()>;

    unsafe fn create_image_view(
        &self,
        create_info: &vk::ImageViewCreateInfo,
    ) -> VkResult<vk::ImageView>;

    unsafe fn destroy_image_view(&self, image_view: vk::ImageView);

    unsafe fn create_sampler(
        &self,
        create_info: &vk::SamplerCreateInfo,
    ) -> VkResult<vk::Sampler>;

    unsafe fn destroy_sampler(&self, sampler: vk::Sampler);

    unsafe fn allocate_memory(
        &self,
        size_in_bytes: vk::DeviceSize,
        memory_type_index: usize,
    ) -> VkResult<vk::DeviceMemory>;

    unsafe fn free_memory(&self, memory: vk::DeviceMemory);

    /// Map the first `size_in_bytes` of the memory into host address space.
    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        size_in_bytes: vk::DeviceSize,
    ) -> VkResult<*mut c_void>;

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory);
}
