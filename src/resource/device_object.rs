use {
    super::{
        buffer::BufferObject,
        image::{ImageObject, SamplerImageObject},
        Resize,
    },
    crate::MemoryDevice,
    ash::{prelude::VkResult, vk},
};

/// The device-side half of a memory bound resource.
///
/// Implementations own the raw Vulkan handles for one kind of resource and
/// know how to create them, bind them to memory, and tear them down. They
/// never track lifecycle state, that is the job of MemoryBoundResource.
pub(crate) trait DeviceObject {
    /// The size the caller asked for, None when the driver decides.
    fn requested_size(&self) -> Option<vk::DeviceSize>;

    /// Create the base buffer or image from its description.
    unsafe fn create(&mut self, device: &dyn MemoryDevice) -> VkResult<()>;

    /// Query the driver for the base object's memory requirements.
    unsafe fn memory_requirements(
        &self,
        device: &dyn MemoryDevice,
    ) -> vk::MemoryRequirements;

    /// Bind the base object to memory, then create every object which needs
    /// a bound base object.
    unsafe fn bind(
        &mut self,
        device: &dyn MemoryDevice,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()>;

    /// Destroy the objects created by bind.
    unsafe fn destroy_dependents(&mut self, device: &dyn MemoryDevice);

    /// Destroy every owned object. Must be safe to call repeatedly.
    unsafe fn destroy(&mut self, device: &dyn MemoryDevice);
}

/// The closed set of resource kinds an arena can hold.
#[derive(Debug)]
pub(crate) enum ResourceObject {
    Buffer(BufferObject),
    Image(ImageObject),
    SamplerImage(SamplerImageObject),
}

impl ResourceObject {
    fn as_device_object(&self) -> &dyn DeviceObject {
        match self {
            ResourceObject::Buffer(buffer) => buffer,
            ResourceObject::Image(image) => image,
            ResourceObject::SamplerImage(sampler_image) => sampler_image,
        }
    }

    fn as_device_object_mut(&mut self) -> &mut dyn DeviceObject {
        match self {
            ResourceObject::Buffer(buffer) => buffer,
            ResourceObject::Image(image) => image,
            ResourceObject::SamplerImage(sampler_image) => sampler_image,
        }
    }

    /// Update the description for the next create.
    ///
    /// Returns false when the resize doesn't apply to this kind of object.
    pub fn apply_resize(&mut self, resize: Resize) -> bool {
        match (self, resize) {
            (ResourceObject::Buffer(buffer), Resize::BufferSize(size)) => {
                buffer.description.size_in_bytes = size;
                true
            }
            (ResourceObject::Image(image), Resize::ImageExtent(extent)) => {
                image.description.resize(extent);
                true
            }
            (
                ResourceObject::SamplerImage(sampler_image),
                Resize::ImageExtent(extent),
            ) => {
                sampler_image.image.description.resize(extent);
                true
            }
            _ => false,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ResourceObject::Buffer(_) => "buffer",
            ResourceObject::Image(_) => "image",
            ResourceObject::SamplerImage(_) => "sampler image",
        }
    }
}

impl DeviceObject for ResourceObject {
    fn requested_size(&self) -> Option<vk::DeviceSize> {
        self.as_device_object().requested_size()
    }

    unsafe fn create(&mut self, device: &dyn MemoryDevice) -> VkResult<()> {
        self.as_device_object_mut().create(device)
    }

    unsafe fn memory_requirements(
        &self,
        device: &dyn MemoryDevice,
    ) -> vk::MemoryRequirements {
        self.as_device_object().memory_requirements(device)
    }

    unsafe fn bind(
        &mut self,
        device: &dyn MemoryDevice,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.as_device_object_mut().bind(device, memory, offset)
    }

    unsafe fn destroy_dependents(&mut self, device: &dyn MemoryDevice) {
        self.as_device_object_mut().destroy_dependents(device)
    }

    unsafe fn destroy(&mut self, device: &dyn MemoryDevice) {
        self.as_device_object_mut().destroy(device)
    }
}
