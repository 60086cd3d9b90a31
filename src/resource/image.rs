use {
    super::device_object::DeviceObject,
    crate::MemoryDevice,
    ash::{prelude::VkResult, vk},
};

/// Everything needed to (re)create a 2D image and its view.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ImageDescription {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub aspect_mask: vk::ImageAspectFlags,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,

    /// The logical size in bytes, if the caller knows it. Most images leave
    /// this as None and let the driver decide.
    pub size_in_bytes: Option<vk::DeviceSize>,
}

impl Default for ImageDescription {
    fn default() -> Self {
        Self {
            extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            format: vk::Format::R8G8B8A8_SRGB,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_levels: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            size_in_bytes: None,
        }
    }
}

impl ImageDescription {
    /// The number of levels in a full mip chain for the extent.
    pub fn mip_levels_for(extent: vk::Extent2D) -> u32 {
        extent.width.max(extent.height).max(1).ilog2() + 1
    }

    /// Use a full mip chain for the current extent.
    pub fn with_full_mip_chain(mut self) -> Self {
        self.mip_levels = Self::mip_levels_for(self.extent);
        self
    }

    /// Returns true when the mip chain goes all the way down to 1x1.
    pub fn has_full_mip_chain(&self) -> bool {
        self.mip_levels > 1 && self.mip_levels == Self::mip_levels_for(self.extent)
    }

    /// Change the extent, keeping a full mip chain full.
    pub(crate) fn resize(&mut self, extent: vk::Extent2D) {
        let full_chain = self.has_full_mip_chain();
        self.extent = extent;
        if full_chain {
            self.mip_levels = Self::mip_levels_for(extent);
        }
    }
}

/// A 2D image and the view which is created once it is bound.
#[derive(Debug)]
pub struct ImageObject {
    pub(crate) description: ImageDescription,
    pub(crate) image: Option<vk::Image>,
    pub(crate) view: Option<vk::ImageView>,
}

impl ImageObject {
    pub fn new(description: ImageDescription) -> Self {
        Self {
            description,
            image: None,
            view: None,
        }
    }

    unsafe fn create_view(&mut self, device: &dyn MemoryDevice) -> VkResult<()> {
        debug_assert!(self.view.is_none());
        let image = self.image.ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
        let create_info = vk::ImageViewCreateInfo {
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: self.description.format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: self.description.aspect_mask,
                base_mip_level: 0,
                level_count: self.description.mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        self.view = Some(device.create_image_view(&create_info)?);
        Ok(())
    }
}

impl DeviceObject for ImageObject {
    fn requested_size(&self) -> Option<vk::DeviceSize> {
        self.description.size_in_bytes
    }

    unsafe fn create(&mut self, device: &dyn MemoryDevice) -> VkResult<()> {
        debug_assert!(self.image.is_none());
        let description = &self.description;
        let create_info = vk::ImageCreateInfo {
            image_type: vk::ImageType::TYPE_2D,
            extent: vk::Extent3D {
                width: description.extent.width,
                height: description.extent.height,
                depth: 1,
            },
            mip_levels: description.mip_levels,
            array_layers: 1,
            format: description.format,
            tiling: description.tiling,
            initial_layout: vk::ImageLayout::UNDEFINED,
            usage: description.usage,
            samples: description.samples,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        self.image = Some(device.create_image(&create_info)?);
        Ok(())
    }

    unsafe fn memory_requirements(
        &self,
        device: &dyn MemoryDevice,
    ) -> vk::MemoryRequirements {
        self.image
            .map(|image| device.image_memory_requirements(image))
            .unwrap_or_default()
    }

    unsafe fn bind(
        &mut self,
        device: &dyn MemoryDevice,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        let image = self.image.ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
        device.bind_image_memory(image, memory, offset)?;
        self.create_view(device)
    }

    unsafe fn destroy_dependents(&mut self, device: &dyn MemoryDevice) {
        if let Some(view) = self.view.take() {
            device.destroy_image_view(view);
        }
    }

    unsafe fn destroy(&mut self, device: &dyn MemoryDevice) {
        self.destroy_dependents(device);
        if let Some(image) = self.image.take() {
            device.destroy_image(image);
        }
    }
}

/// How a sampler-image samples its image.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SamplerDescription {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub border_color: vk::BorderColor,

    /// Anisotropic filtering is enabled when this is set.
    pub max_anisotropy: Option<f32>,
}

impl Default for SamplerDescription {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::NEAREST,
            min_filter: vk::Filter::NEAREST,
            address_mode: vk::SamplerAddressMode::REPEAT,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            max_anisotropy: None,
        }
    }
}

/// An image with a view and a sampler, both created once it is bound.
#[derive(Debug)]
pub struct SamplerImageObject {
    pub(crate) image: ImageObject,
    pub(crate) sampler_description: SamplerDescription,
    pub(crate) sampler: Option<vk::Sampler>,
}

impl SamplerImageObject {
    pub fn new(
        description: ImageDescription,
        sampler_description: SamplerDescription,
    ) -> Self {
        Self {
            image: ImageObject::new(description),
            sampler_description,
            sampler: None,
        }
    }

    unsafe fn create_sampler(
        &mut self,
        device: &dyn MemoryDevice,
    ) -> VkResult<()> {
        debug_assert!(self.sampler.is_none());
        let sampler = &self.sampler_description;
        let create_info = vk::SamplerCreateInfo {
            mag_filter: sampler.mag_filter,
            min_filter: sampler.min_filter,
            mipmap_mode: sampler.mipmap_mode,
            address_mode_u: sampler.address_mode,
            address_mode_v: sampler.address_mode,
            address_mode_w: sampler.address_mode,
            mip_lod_bias: 0.0,
            anisotropy_enable: if sampler.max_anisotropy.is_some() {
                vk::TRUE
            } else {
                vk::FALSE
            },
            max_anisotropy: sampler.max_anisotropy.unwrap_or(1.0),
            compare_enable: vk::FALSE,
            compare_op: vk::CompareOp::ALWAYS,
            min_lod: 0.0,
            max_lod: self.image.description.mip_levels as f32,
            border_color: sampler.border_color,
            unnormalized_coordinates: vk::FALSE,
            ..Default::default()
        };
        self.sampler = Some(device.create_sampler(&create_info)?);
        Ok(())
    }
}

impl DeviceObject for SamplerImageObject {
    fn requested_size(&self) -> Option<vk::DeviceSize> {
        self.image.requested_size()
    }

    unsafe fn create(&mut self, device: &dyn MemoryDevice) -> VkResult<()> {
        self.image.create(device)
    }

    unsafe fn memory_requirements(
        &self,
        device: &dyn MemoryDevice,
    ) -> vk::MemoryRequirements {
        self.image.memory_requirements(device)
    }

    unsafe fn bind(
        &mut self,
        device: &dyn MemoryDevice,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.image.bind(device, memory, offset)?;
        self.create_sampler(device)
    }

    unsafe fn destroy_dependents(&mut self, device: &dyn MemoryDevice) {
        if let Some(sampler) = self.sampler.take() {
            device.destroy_sampler(sampler);
        }
        self.image.destroy_dependents(device);
    }

    unsafe fn destroy(&mut self, device: &dyn MemoryDevice) {
        self.destroy_dependents(device);
        self.image.destroy(device);
    }
}
