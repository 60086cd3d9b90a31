use {
    crate::{MemoryDevice, MemoryProperties},
    ash::{
        prelude::VkResult,
        vk::{self, Handle},
    },
    std::{
        collections::{HashMap, HashSet},
        ffi::c_void,
        sync::{Mutex, MutexGuard, PoisonError},
    },
};

/// Every fake texel is assumed to be 4 bytes wide regardless of format.
const BYTES_PER_TEXEL: u64 = 4;

/// A fake implementation of a memory device which keeps track of every object
/// it creates.
///
/// Memory allocations are backed by host bytes so mapping works for real and
/// tests can read back exactly what was written through a mapped region. The
/// device enforces the handful of Vulkan rules the arenas depend on:
///
/// * buffers and images can only be bound to memory once
/// * bind offsets must satisfy the reported alignment and fit the allocation
/// * image views can only be created for bound images
/// * only HOST_VISIBLE memory can be mapped
/// * allocations fail with ERROR_OUT_OF_DEVICE_MEMORY once a heap's budget
///   is exhausted
pub struct FakeMemoryDevice {
    memory_properties: MemoryProperties,
    default_buffer_alignment: u64,
    image_alignment: u64,
    memory_type_bits: u32,
    requirements: HashMap<u64, (u64, u64)>,
    heap_budgets: HashMap<u32, u64>,
    state: Mutex<FakeDeviceState>,
}

#[derive(Default)]
struct FakeDeviceState {
    next_handle: u64,
    allocation_count: u64,
    buffers: HashMap<vk::Buffer, FakeObject>,
    images: HashMap<vk::Image, FakeObject>,
    image_views: HashMap<vk::ImageView, vk::Image>,
    samplers: HashSet<vk::Sampler>,
    memory: HashMap<vk::DeviceMemory, FakeMemory>,
    heap_usage: HashMap<u32, u64>,
}

struct FakeObject {
    requirements: vk::MemoryRequirements,
    binding: Option<(vk::DeviceMemory, vk::DeviceSize)>,
}

struct FakeMemory {
    bytes: Vec<u8>,
    heap_index: u32,
    host_visible: bool,
    mapped: bool,
}

impl FakeMemoryDevice {
    /// Create a fake device with an explicit memory table.
    pub fn new(memory_properties: MemoryProperties) -> Self {
        let memory_type_bits =
            (0..memory_properties.types().len().min(32)).fold(0, |bits, index| {
                bits | (1_u32 << index)
            });
        Self {
            memory_properties,
            default_buffer_alignment: 4,
            image_alignment: 256,
            memory_type_bits,
            requirements: HashMap::new(),
            heap_budgets: HashMap::new(),
            state: Mutex::default(),
        }
    }

    /// A fake device which looks like a typical discrete GPU.
    ///
    /// * `[0]` DEVICE_LOCAL in heap 0
    /// * `[1]` HOST_VISIBLE | HOST_COHERENT in heap 1
    /// * `[2]` DEVICE_LOCAL | HOST_VISIBLE | HOST_COHERENT in heap 0
    pub fn discrete() -> Self {
        let heap_size = 256 * 1024 * 1024;
        Self::new(MemoryProperties::from_raw(
            vec![
                vk::MemoryType {
                    property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                    heap_index: 0,
                },
                vk::MemoryType {
                    property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                        | vk::MemoryPropertyFlags::HOST_COHERENT,
                    heap_index: 1,
                },
                vk::MemoryType {
                    property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL
                        | vk::MemoryPropertyFlags::HOST_VISIBLE
                        | vk::MemoryPropertyFlags::HOST_COHERENT,
                    heap_index: 0,
                },
            ],
            vec![
                vk::MemoryHeap {
                    size: heap_size,
                    flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
                },
                vk::MemoryHeap {
                    size: heap_size,
                    flags: vk::MemoryHeapFlags::empty(),
                },
            ],
        ))
    }

    /// The alignment reported for buffers without an explicit requirement.
    pub fn with_default_buffer_alignment(mut self, alignment: u64) -> Self {
        self.default_buffer_alignment = alignment;
        self
    }

    /// The alignment reported for every image.
    pub fn with_image_alignment(mut self, alignment: u64) -> Self {
        self.image_alignment = alignment;
        self
    }

    /// The compatible memory type bits reported for every buffer and image.
    pub fn with_memory_type_bits(mut self, memory_type_bits: u32) -> Self {
        self.memory_type_bits = memory_type_bits;
        self
    }

    /// Report `size_in_bytes` and `alignment` as the requirements of any
    /// buffer created with `requested_size` bytes.
    pub fn with_requirements(
        mut self,
        requested_size: u64,
        size_in_bytes: u64,
        alignment: u64,
    ) -> Self {
        self.requirements
            .insert(requested_size, (size_in_bytes, alignment));
        self
    }

    /// Limit the number of bytes which can be allocated from a heap.
    pub fn with_heap_budget(mut self, heap_index: u32, budget: u64) -> Self {
        self.heap_budgets.insert(heap_index, budget);
        self
    }

    /// The number of buffers which have not been destroyed.
    pub fn live_buffers(&self) -> usize {
        self.state().buffers.len()
    }

    /// The number of images which have not been destroyed.
    pub fn live_images(&self) -> usize {
        self.state().images.len()
    }

    /// The number of image views which have not been destroyed.
    pub fn live_image_views(&self) -> usize {
        self.state().image_views.len()
    }

    /// The number of samplers which have not been destroyed.
    pub fn live_samplers(&self) -> usize {
        self.state().samplers.len()
    }

    /// The number of device memory allocations which have not been freed.
    pub fn live_allocations(&self) -> usize {
        self.state().memory.len()
    }

    /// The total number of memory allocations ever made.
    pub fn allocation_count(&self) -> u64 {
        self.state().allocation_count
    }

    /// The memory and offset a buffer is bound to.
    pub fn buffer_binding(
        &self,
        buffer: vk::Buffer,
    ) -> Option<(vk::DeviceMemory, vk::DeviceSize)> {
        self.state()
            .buffers
            .get(&buffer)
            .and_then(|object| object.binding)
    }

    /// The memory and offset an image is bound to.
    pub fn image_binding(
        &self,
        image: vk::Image,
    ) -> Option<(vk::DeviceMemory, vk::DeviceSize)> {
        self.state()
            .images
            .get(&image)
            .and_then(|object| object.binding)
    }

    /// The size of a live allocation.
    pub fn memory_size(&self, memory: vk::DeviceMemory) -> Option<u64> {
        self.state()
            .memory
            .get(&memory)
            .map(|memory| memory.bytes.len() as u64)
    }

    /// Whether a live allocation is currently mapped.
    pub fn is_mapped(&self, memory: vk::DeviceMemory) -> bool {
        self.state()
            .memory
            .get(&memory)
            .map(|memory| memory.mapped)
            .unwrap_or(false)
    }

    /// Copy bytes out of a live allocation.
    pub fn read_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: u64,
        len: usize,
    ) -> Option<Vec<u8>> {
        let state = self.state();
        let bytes = &state.memory.get(&memory)?.bytes;
        let start = offset as usize;
        bytes.get(start..start + len).map(|slice| slice.to_vec())
    }
}

// Private API
// -----------

impl FakeMemoryDevice {
    fn state(&self) -> MutexGuard<'_, FakeDeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn buffer_requirements(&self, size: u64) -> vk::MemoryRequirements {
        let (size, alignment) = self
            .requirements
            .get(&size)
            .copied()
            .unwrap_or((size, self.default_buffer_alignment));
        vk::MemoryRequirements {
            size,
            alignment,
            memory_type_bits: self.memory_type_bits,
        }
    }

    fn image_requirements(
        &self,
        create_info: &vk::ImageCreateInfo,
    ) -> vk::MemoryRequirements {
        let extent = create_info.extent;
        let texels: u64 = (0..create_info.mip_levels)
            .map(|level| {
                let width = (extent.width >> level).max(1) as u64;
                let height = (extent.height >> level).max(1) as u64;
                width * height * extent.depth.max(1) as u64
            })
            .sum();
        let samples = create_info.samples.as_raw().max(1) as u64;
        let size = texels * BYTES_PER_TEXEL * samples;
        vk::MemoryRequirements {
            size: size.next_multiple_of(self.image_alignment),
            alignment: self.image_alignment,
            memory_type_bits: self.memory_type_bits,
        }
    }

    fn heap_budget(&self, heap_index: u32) -> u64 {
        self.heap_budgets.get(&heap_index).copied().unwrap_or_else(|| {
            self.memory_properties.heaps()[heap_index as usize].size
        })
    }
}

impl FakeDeviceState {
    fn next_raw_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn bind(
        object: Option<&mut FakeObject>,
        memory: Option<&FakeMemory>,
        memory_handle: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        let (Some(object), Some(memory)) = (object, memory) else {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        };
        let requirements = object.requirements;
        let fits =
            offset + requirements.size <= memory.bytes.len() as vk::DeviceSize;
        let aligned = offset % requirements.alignment.max(1) == 0;
        if object.binding.is_some() || !fits || !aligned {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        object.binding = Some((memory_handle, offset));
        Ok(())
    }
}

impl MemoryDevice for FakeMemoryDevice {
    fn memory_properties(&self) -> &MemoryProperties {
        &self.memory_properties
    }

    fn max_sampler_anisotropy(&self) -> f32 {
        16.0
    }

    unsafe fn create_buffer(
        &self,
        create_info: &vk::BufferCreateInfo,
    ) -> VkResult<vk::Buffer> {
        if create_info.size == 0 || create_info.usage.is_empty() {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        let requirements = self.buffer_requirements(create_info.size);
        let mut state = self.state();
        let buffer = vk::Buffer::from_raw(state.next_raw_handle());
        state.buffers.insert(
            buffer,
            FakeObject {
                requirements,
                binding: None,
            },
        );
        Ok(buffer)
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        let removed = self.state().buffers.remove(&buffer);
        debug_assert!(removed.is_some(), "Destroyed an unknown buffer!");
    }

    unsafe fn buffer_memory_requirements(
        &self,
        buffer: vk::Buffer,
    ) -> vk::MemoryRequirements {
        self.state()
            .buffers
            .get(&buffer)
            .map(|object| object.requirements)
            .unwrap_or_default()
    }

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        FakeDeviceState::bind(
            state.buffers.get_mut(&buffer),
            state.memory.get(&memory),
            memory,
            offset,
        )
    }

    unsafe fn create_image(
        &self,
        create_info: &vk::ImageCreateInfo,
    ) -> VkResult<vk::Image> {
        let extent = create_info.extent;
        if create_info.usage.is_empty()
            || extent.width == 0
            || extent.height == 0
            || create_info.mip_levels == 0
        {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        let requirements = self.image_requirements(create_info);
        let mut state = self.state();
        let image = vk::Image::from_raw(state.next_raw_handle());
        state.images.insert(
            image,
            FakeObject {
                requirements,
                binding: None,
            },
        );
        Ok(image)
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        let mut state = self.state();
        debug_assert!(
            !state.image_views.values().any(|viewed| *viewed == image),
            "Destroyed an image which still has a view!"
        );
        let removed = state.images.remove(&image);
        debug_assert!(removed.is_some(), "Destroyed an unknown image!");
    }

    unsafe fn image_memory_requirements(
        &self,
        image: vk::Image,
    ) -> vk::MemoryRequirements {
        self.state()
            .images
            .get(&image)
            .map(|object| object.requirements)
            .unwrap_or_default()
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        FakeDeviceState::bind(
            state.images.get_mut(&image),
            state.memory.get(&memory),
            memory,
            offset,
        )
    }

    unsafe fn create_image_view(
        &self,
        create_info: &vk::ImageViewCreateInfo,
    ) -> VkResult<vk::ImageView> {
        let mut state = self.state();
        let is_bound = state
            .images
            .get(&create_info.image)
            .map(|object| object.binding.is_some())
            .unwrap_or(false);
        if !is_bound {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        let image_view = vk::ImageView::from_raw(state.next_raw_handle());
        state.image_views.insert(image_view, create_info.image);
        Ok(image_view)
    }

    unsafe fn destroy_image_view(&self, image_view: vk::ImageView) {
        let removed = self.state().image_views.remove(&image_view);
        debug_assert!(removed.is_some(), "Destroyed an unknown image view!");
    }

    unsafe fn create_sampler(
        &self,
        create_info: &vk::SamplerCreateInfo,
    ) -> VkResult<vk::Sampler> {
        if create_info.max_anisotropy > self.max_sampler_anisotropy() {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        let mut state = self.state();
        let sampler = vk::Sampler::from_raw(state.next_raw_handle());
        state.samplers.insert(sampler);
        Ok(sampler)
    }

    unsafe fn destroy_sampler(&self, sampler: vk::Sampler) {
        let removed = self.state().samplers.remove(&sampler);
        debug_assert!(removed, "Destroyed an unknown sampler!");
    }

    unsafe fn allocate_memory(
        &self,
        size_in_bytes: vk::DeviceSize,
        memory_type_index: usize,
    ) -> VkResult<vk::DeviceMemory> {
        let memory_type = *self
            .memory_properties
            .types()
            .get(memory_type_index)
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
        let budget = self.heap_budget(memory_type.heap_index);

        let mut state = self.state();
        let used = state
            .heap_usage
            .get(&memory_type.heap_index)
            .copied()
            .unwrap_or(0);
        if size_in_bytes == 0 || used + size_in_bytes > budget {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }

        *state.heap_usage.entry(memory_type.heap_index).or_default() +=
            size_in_bytes;
        state.allocation_count += 1;
        let memory = vk::DeviceMemory::from_raw(state.next_raw_handle());
        state.memory.insert(
            memory,
            FakeMemory {
                bytes: vec![0; size_in_bytes as usize],
                heap_index: memory_type.heap_index,
                host_visible: memory_type
                    .property_flags
                    .contains(vk::MemoryPropertyFlags::HOST_VISIBLE),
                mapped: false,
            },
        );
        Ok(memory)
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state();
        let freed = state.memory.remove(&memory);
        debug_assert!(freed.is_some(), "Freed unknown device memory!");
        if let Some(freed) = freed {
            if let Some(used) = state.heap_usage.get_mut(&freed.heap_index) {
                *used -= freed.bytes.len() as u64;
            }
        }
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        size_in_bytes: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        let mut state = self.state();
        let memory = state
            .memory
            .get_mut(&memory)
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        if !memory.host_visible
            || memory.mapped
            || size_in_bytes > memory.bytes.len() as u64
        {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }
        memory.mapped = true;
        Ok(memory.bytes.as_mut_ptr() as *mut c_void)
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        if let Some(memory) = self.state().memory.get_mut(&memory) {
            debug_assert!(memory.mapped, "Unmapped memory which isn't mapped!");
            memory.mapped = false;
        }
    }
}
