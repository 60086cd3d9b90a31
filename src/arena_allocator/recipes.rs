//! Ready-made resources for the common cases: vertex, index, and uniform
//! buffers, plus sampled textures fed through a staging buffer.
//!
//! Staged resources come in pairs. The `-in` half is a host visible buffer the
//! application writes into, the `-out` half lives in device local memory and
//! is filled by a transfer command the application records.

use {
    super::{ArenaAllocator, ResourceHandle},
    crate::{
        AllocatorError, BufferDescription, ImageDescription,
        MemoryBoundResource, SamplerDescription,
    },
    anyhow::anyhow,
    ash::vk,
    bytemuck::Pod,
};

const HOST_VISIBLE: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw()
        | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);
const DEVICE_LOCAL: vk::MemoryPropertyFlags =
    vk::MemoryPropertyFlags::DEVICE_LOCAL;

/// A vertex buffer and how the pipeline should read it.
#[derive(Debug, Copy, Clone)]
pub struct VertexBuffer {
    /// The buffer the pipeline reads.
    pub buffer: ResourceHandle,

    /// The host visible buffer to copy from, for staged vertex buffers.
    pub staging: Option<ResourceHandle>,

    pub vertex_count: u32,
    pub stride: u32,
    pub binding: u32,
    pub input_rate: vk::VertexInputRate,
}

impl VertexBuffer {
    pub fn binding_description(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: self.binding,
            stride: self.stride,
            input_rate: self.input_rate,
        }
    }

    pub fn size_in_bytes(&self) -> vk::DeviceSize {
        self.vertex_count as vk::DeviceSize * self.stride as vk::DeviceSize
    }
}

/// A device local index buffer and the staging buffer which fills it.
#[derive(Debug, Copy, Clone)]
pub struct IndexBuffer {
    pub buffer: ResourceHandle,
    pub staging: ResourceHandle,
    pub index_count: u32,
    pub index_type: vk::IndexType,
}

impl IndexBuffer {
    /// The size of one index in bytes.
    pub fn index_size(index_type: vk::IndexType) -> vk::DeviceSize {
        match index_type {
            vk::IndexType::UINT16 => 2,
            _ => 4,
        }
    }

    pub fn size_in_bytes(&self) -> vk::DeviceSize {
        self.index_count as vk::DeviceSize * Self::index_size(self.index_type)
    }
}

/// One host visible uniform buffer per frame in flight.
#[derive(Debug, Clone)]
pub struct UniformBuffer {
    pub buffers: Vec<ResourceHandle>,
    pub size_in_bytes: vk::DeviceSize,
    pub binding: u32,
}

impl UniformBuffer {
    /// The buffer to use for a frame, wrapping around the available copies.
    /// There is always at least one copy.
    pub fn for_frame(&self, frame_index: usize) -> ResourceHandle {
        self.buffers[frame_index % self.buffers.len()]
    }
}

/// A sampled texture and the staging buffer which fills its first mip level.
#[derive(Debug, Copy, Clone)]
pub struct StagedSampler {
    pub staging: ResourceHandle,
    pub image: ResourceHandle,
    pub binding: u32,
    pub extent: vk::Extent2D,
    pub mip_levels: u32,
}

impl ArenaAllocator {
    /// Create a buffer resource and add it to the arena for `properties`.
    pub fn create_buffer(
        &mut self,
        debug_name: impl Into<String>,
        description: BufferDescription,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<ResourceHandle, AllocatorError> {
        let mut resource = MemoryBoundResource::buffer(
            self.device.clone(),
            debug_name,
            description,
        );
        resource.create()?;
        self.add(resource, properties)
    }

    /// A host visible buffer the application writes into before recording a
    /// transfer.
    pub fn create_staging_buffer(
        &mut self,
        debug_name: impl Into<String>,
        size_in_bytes: vk::DeviceSize,
    ) -> Result<ResourceHandle, AllocatorError> {
        self.create_buffer(
            debug_name,
            BufferDescription::new(
                size_in_bytes,
                vk::BufferUsageFlags::TRANSFER_SRC,
            ),
            HOST_VISIBLE,
        )
    }

    /// A host visible vertex buffer holding a copy of `vertices`.
    ///
    /// The vertices are copied in again every time the buffer is mapped, so
    /// the contents survive any repack of the arena.
    pub fn create_vertex_buffer<V: Pod>(
        &mut self,
        debug_name: impl Into<String>,
        vertices: &[V],
        binding: u32,
        input_rate: vk::VertexInputRate,
    ) -> Result<VertexBuffer, AllocatorError> {
        let debug_name = debug_name.into();
        let vertex_count = u32::try_from(vertices.len()).map_err(|_| {
            anyhow!("'{}' has too many vertices: {}", debug_name, vertices.len())
        })?;
        let stride = u32::try_from(std::mem::size_of::<V>()).map_err(|_| {
            anyhow!(
                "'{}' has a vertex stride which does not fit in a u32: {}",
                debug_name,
                std::mem::size_of::<V>()
            )
        })?;
        let contents: Vec<u8> = bytemuck::cast_slice(vertices).to_vec();
        let mut resource = MemoryBoundResource::buffer(
            self.device.clone(),
            debug_name,
            BufferDescription::new(
                contents.len() as vk::DeviceSize,
                vk::BufferUsageFlags::VERTEX_BUFFER,
            ),
        );
        resource.create()?;
        resource.set_mapping_listener(Box::new(move |bytes: &mut [u8]| {
            let len = contents.len().min(bytes.len());
            bytes[..len].copy_from_slice(&contents[..len]);
        }));
        let buffer = self.add(resource, HOST_VISIBLE)?;

        Ok(VertexBuffer {
            buffer,
            staging: None,
            vertex_count,
            stride,
            binding,
            input_rate,
        })
    }

    /// A device local vertex buffer with a host visible staging buffer.
    pub fn create_staged_vertex_buffer(
        &mut self,
        debug_name: &str,
        vertex_count: u32,
        stride: u32,
        binding: u32,
        input_rate: vk::VertexInputRate,
    ) -> Result<VertexBuffer, AllocatorError> {
        let size_in_bytes =
            vertex_count as vk::DeviceSize * stride as vk::DeviceSize;
        let staging = self
            .create_staging_buffer(format!("{}-in", debug_name), size_in_bytes)?;
        let buffer = self.create_buffer(
            format!("{}-out", debug_name),
            BufferDescription::new(
                size_in_bytes,
                vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::VERTEX_BUFFER,
            ),
            DEVICE_LOCAL,
        )?;

        Ok(VertexBuffer {
            buffer,
            staging: Some(staging),
            vertex_count,
            stride,
            binding,
            input_rate,
        })
    }

    /// A device local index buffer with a host visible staging buffer.
    pub fn create_staged_index_buffer(
        &mut self,
        debug_name: &str,
        index_count: u32,
        index_type: vk::IndexType,
    ) -> Result<IndexBuffer, AllocatorError> {
        let size_in_bytes =
            index_count as vk::DeviceSize * IndexBuffer::index_size(index_type);
        let staging = self
            .create_staging_buffer(format!("{}-in", debug_name), size_in_bytes)?;
        let buffer = self.create_buffer(
            format!("{}-out", debug_name),
            BufferDescription::new(
                size_in_bytes,
                vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::INDEX_BUFFER,
            ),
            DEVICE_LOCAL,
        )?;

        Ok(IndexBuffer {
            buffer,
            staging,
            index_count,
            index_type,
        })
    }

    /// `copies` host visible uniform buffers named `debug_name[i]`.
    pub fn create_uniform_buffer(
        &mut self,
        debug_name: &str,
        size_in_bytes: vk::DeviceSize,
        copies: usize,
        binding: u32,
    ) -> Result<UniformBuffer, AllocatorError> {
        if copies == 0 {
            return Err(anyhow!(
                "'{}' needs at least one uniform buffer copy",
                debug_name
            )
            .into());
        }
        let buffers = (0..copies)
            .map(|index| {
                self.create_buffer(
                    format!("{}[{}]", debug_name, index),
                    BufferDescription::new(
                        size_in_bytes,
                        vk::BufferUsageFlags::UNIFORM_BUFFER,
                    ),
                    HOST_VISIBLE,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(UniformBuffer {
            buffers,
            size_in_bytes,
            binding,
        })
    }

    /// A device local RGBA texture with a sampler, and a staging buffer
    /// sized for its first mip level.
    ///
    /// With `generate_mip_levels` the image gets a full mip chain and is
    /// usable as a blit source so the chain can be generated on the GPU.
    pub fn create_staged_sampler(
        &mut self,
        debug_name: &str,
        binding: u32,
        extent: vk::Extent2D,
        generate_mip_levels: bool,
    ) -> Result<StagedSampler, AllocatorError> {
        let staging_size = extent.width as vk::DeviceSize
            * extent.height as vk::DeviceSize
            * 4;
        let staging = self
            .create_staging_buffer(format!("{}-in", debug_name), staging_size)?;

        let mut description = ImageDescription {
            extent,
            ..Default::default()
        };
        if generate_mip_levels {
            description = description.with_full_mip_chain();
            description.usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        let sampler_description = SamplerDescription {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            max_anisotropy: Some(self.device.max_sampler_anisotropy()),
            ..Default::default()
        };

        let mut resource = MemoryBoundResource::sampler_image(
            self.device.clone(),
            format!("{}-out", debug_name),
            description,
            sampler_description,
        );
        resource.create()?;
        let image = self.add(resource, DEVICE_LOCAL)?;

        Ok(StagedSampler {
            staging,
            image,
            binding,
            extent,
            mip_levels: description.mip_levels,
        })
    }

    /// A device local image with a view, e.g. a depth or color attachment.
    pub fn create_device_local_image(
        &mut self,
        debug_name: impl Into<String>,
        description: ImageDescription,
    ) -> Result<ResourceHandle, AllocatorError> {
        let mut resource = MemoryBoundResource::image(
            self.device.clone(),
            debug_name,
            description,
        );
        resource.create()?;
        self.add(resource, DEVICE_LOCAL)
    }
}
