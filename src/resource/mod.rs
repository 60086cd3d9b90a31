//! GPU memory bound resources and the lifecycle they move through.
//!
//! A resource is created against a device, routed into the arena for its
//! memory type, then bound (and maybe mapped) when the arena allocates.
//!
//! ```text
//! NotCreated --create--> Recreated --bind--> Bound --mapped--> Mapped
//!                            ^                 |                  |
//!                            +-----unbind------+------------------+
//! ```

mod buffer;
mod change;
mod device_object;
mod image;

use {
    self::device_object::{DeviceObject, ResourceObject},
    crate::{
        device_memory::MappedRegion,
        error::LifecycleStep,
        pretty_wrappers::{PrettyBitflag, PrettySize},
        AllocatorError, MemoryDevice,
    },
    anyhow::anyhow,
    ash::vk,
    std::sync::Arc,
};

pub use self::{
    buffer::BufferDescription,
    change::MemoryRequirementsChange,
    image::{ImageDescription, SamplerDescription},
};

/// Called with a resource's mapped bytes every time it is (re)mapped.
pub type MappingListener = Box<dyn FnMut(&mut [u8])>;

/// The lifecycle state of a resource. States are ordered, a resource which is
/// Mapped is also considered Bound.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum State {
    /// No device object exists.
    NotCreated,

    /// The device object exists and its memory requirements are known, but
    /// no memory is bound.
    Recreated,

    /// Memory is bound at the resource's offset. Image views and samplers
    /// exist from this state on.
    Bound,

    /// Memory is bound and the resource's byte range is mapped to the host.
    Mapped,
}

impl State {
    /// Returns true when this state is the given state or a later one.
    pub fn is_past(&self, state: State) -> bool {
        *self >= state
    }
}

/// The kind of device object behind a resource.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ResourceKind {
    Buffer,
    Image,
    SamplerImage,
}

/// A new logical size for a resource which is being recreated.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Resize {
    BufferSize(vk::DeviceSize),
    ImageExtent(vk::Extent2D),
}

/// A single buffer or image backed by a range of its arena's device memory.
pub struct MemoryBoundResource {
    debug_name: String,
    device: Arc<dyn MemoryDevice>,
    object: ResourceObject,
    state: State,
    requirements: vk::MemoryRequirements,
    offset: vk::DeviceSize,
    memory_type_index: Option<usize>,
    is_host_visible: bool,
    mapped_region: Option<MappedRegion>,
    arena: Option<usize>,
    mapping_listener: Option<MappingListener>,
}

// Public API
// ----------

impl MemoryBoundResource {
    /// A resource which will own a buffer.
    pub fn buffer(
        device: Arc<dyn MemoryDevice>,
        debug_name: impl Into<String>,
        description: BufferDescription,
    ) -> Self {
        Self::new(
            device,
            debug_name.into(),
            ResourceObject::Buffer(buffer::BufferObject::new(description)),
        )
    }

    /// A resource which will own an image and its view.
    pub fn image(
        device: Arc<dyn MemoryDevice>,
        debug_name: impl Into<String>,
        description: ImageDescription,
    ) -> Self {
        Self::new(
            device,
            debug_name.into(),
            ResourceObject::Image(image::ImageObject::new(description)),
        )
    }

    /// A resource which will own an image, its view, and a sampler.
    pub fn sampler_image(
        device: Arc<dyn MemoryDevice>,
        debug_name: impl Into<String>,
        description: ImageDescription,
        sampler_description: SamplerDescription,
    ) -> Self {
        Self::new(
            device,
            debug_name.into(),
            ResourceObject::SamplerImage(image::SamplerImageObject::new(
                description,
                sampler_description,
            )),
        )
    }

    /// Create the device object and query its memory requirements.
    ///
    /// Moves the resource from NotCreated to Recreated.
    pub fn create(&mut self) -> Result<(), AllocatorError> {
        self.require_state(State::NotCreated, "create")?;
        self.rebuild_object()
    }

    /// Resolve which memory type this resource must live in.
    ///
    /// The index is resolved once. Asking again with properties which resolve
    /// to a different memory type is an error.
    pub fn calculate_memory_type_index(
        &mut self,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<usize, AllocatorError> {
        self.require_state_past(State::Recreated, "resolve the memory type of")?;
        let memory_properties = self.device.memory_properties();
        let index = memory_properties.find_memory_type_index(
            &self.debug_name,
            self.requirements.memory_type_bits,
            properties,
        )?;
        if let Some(existing) = self.memory_type_index {
            if existing != index {
                return Err(anyhow!(
                    "'{}' already lives in memory type {}, cannot move it to {}",
                    self.debug_name,
                    existing,
                    index
                )
                .into());
            }
        }
        self.memory_type_index = Some(index);
        self.is_host_visible = memory_properties
            .property_flags(index)
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE);
        Ok(index)
    }

    /// Register a listener which receives the mapped bytes each time the
    /// resource is mapped. Fires immediately if the resource is mapped now.
    pub fn set_mapping_listener(&mut self, mut listener: MappingListener) {
        if let Some(region) = self.mapped_region.as_mut() {
            listener(region.as_mut_slice());
        }
        self.mapping_listener = Some(listener);
    }

    /// Destroy every device object owned by this resource.
    ///
    /// Resets the resource to NotCreated. Safe to call in any state and
    /// repeatedly.
    pub fn close(&mut self) {
        self.mapped_region = None;
        unsafe {
            self.object.destroy(self.device.as_ref());
        }
        self.state = State::NotCreated;
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn kind(&self) -> ResourceKind {
        match self.object {
            ResourceObject::Buffer(_) => ResourceKind::Buffer,
            ResourceObject::Image(_) => ResourceKind::Image,
            ResourceObject::SamplerImage(_) => ResourceKind::SamplerImage,
        }
    }

    /// The logical size the caller asked for. None means the driver decides,
    /// which is typical for images.
    pub fn requested_size(&self) -> Option<vk::DeviceSize> {
        self.object.requested_size()
    }

    /// The number of bytes the driver requires. Only meaningful once the
    /// resource is at least Recreated.
    pub fn actual_size(&self) -> vk::DeviceSize {
        self.requirements.size
    }

    /// The driver's alignment requirement for the resource's offset.
    pub fn required_alignment(&self) -> vk::DeviceSize {
        self.requirements.alignment
    }

    /// The memory types the driver allows for this resource.
    pub fn memory_type_bits(&self) -> u32 {
        self.requirements.memory_type_bits
    }

    /// The offset into the arena's memory. Only meaningful once Bound.
    pub fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    pub fn memory_type_index(&self) -> Option<usize> {
        self.memory_type_index
    }

    pub fn is_host_visible(&self) -> bool {
        self.is_host_visible
    }

    /// The memory type index of the arena which owns this resource.
    pub fn arena(&self) -> Option<usize> {
        self.arena
    }

    /// The number of bytes in the mapped region once the resource is mapped.
    pub fn mapped_len(&self) -> vk::DeviceSize {
        self.requested_size().unwrap_or(self.requirements.size)
    }

    /// The resource's mapped bytes, only available while Mapped.
    pub fn mapped_bytes(&self) -> Option<&[u8]> {
        self.mapped_region.as_ref().map(MappedRegion::as_slice)
    }

    /// The resource's mapped bytes, only available while Mapped.
    pub(crate) fn mapped_bytes_mut(&mut self) -> Option<&mut [u8]> {
        self.mapped_region.as_mut().map(MappedRegion::as_mut_slice)
    }

    /// The buffer handle, for buffer resources which have been created.
    pub fn buffer_handle(&self) -> Option<vk::Buffer> {
        match &self.object {
            ResourceObject::Buffer(buffer) => buffer.buffer,
            _ => None,
        }
    }

    /// The image handle, for image resources which have been created.
    pub fn image_handle(&self) -> Option<vk::Image> {
        match &self.object {
            ResourceObject::Image(image) => image.image,
            ResourceObject::SamplerImage(sampler_image) => {
                sampler_image.image.image
            }
            ResourceObject::Buffer(_) => None,
        }
    }

    /// The image view, for image resources which are bound.
    pub fn image_view(&self) -> Option<vk::ImageView> {
        match &self.object {
            ResourceObject::Image(image) => image.view,
            ResourceObject::SamplerImage(sampler_image) => {
                sampler_image.image.view
            }
            ResourceObject::Buffer(_) => None,
        }
    }

    /// The sampler, for sampler-image resources which are bound.
    pub fn sampler(&self) -> Option<vk::Sampler> {
        match &self.object {
            ResourceObject::SamplerImage(sampler_image) => {
                sampler_image.sampler
            }
            _ => None,
        }
    }

    /// The image description, for image resources.
    pub fn image_description(&self) -> Option<&ImageDescription> {
        match &self.object {
            ResourceObject::Image(image) => Some(&image.description),
            ResourceObject::SamplerImage(sampler_image) => {
                Some(&sampler_image.image.description)
            }
            ResourceObject::Buffer(_) => None,
        }
    }
}

impl std::fmt::Debug for MemoryBoundResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBoundResource")
            .field("debug_name", &self.debug_name)
            .field("kind", &self.object.kind_name())
            .field("state", &self.state)
            .field("requested_size", &self.requested_size().map(PrettySize))
            .field("actual_size", &PrettySize(self.requirements.size))
            .field("alignment", &self.requirements.alignment)
            .field(
                "memory_type_bits",
                &PrettyBitflag(self.requirements.memory_type_bits),
            )
            .field("memory_type_index", &self.memory_type_index)
            .field("offset", &self.offset)
            .field("mapped_region", &self.mapped_region)
            .finish()
    }
}

impl Drop for MemoryBoundResource {
    fn drop(&mut self) {
        self.close();
    }
}

// Arena API
// ---------

impl MemoryBoundResource {
    pub(crate) fn set_arena(&mut self, memory_type_index: usize) {
        self.arena = Some(memory_type_index);
    }

    /// Bind the resource at `offset` in `memory`.
    ///
    /// Moves the resource from Recreated to Bound. If binding fails the
    /// device object is rebuilt (a Vulkan object can only ever be bound once)
    /// and the resource stays Recreated.
    pub(crate) fn bind(
        &mut self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<(), AllocatorError> {
        self.require_state(State::Recreated, "bind")?;
        debug_assert!(
            offset % self.requirements.alignment.max(1) == 0,
            "'{}' bound at misaligned offset {}",
            self.debug_name,
            offset
        );

        log::debug!("Binding memory to '{}'. offset={}", self.debug_name, offset);
        let result = unsafe {
            self.object.bind(self.device.as_ref(), memory, offset)
        };
        if let Err(source) = result {
            self.rebuild_object()?;
            return Err(AllocatorError::Binding {
                debug_name: self.debug_name.clone(),
                step: LifecycleStep::Bind,
                source,
            });
        }

        self.offset = offset;
        self.state = State::Bound;
        Ok(())
    }

    /// Hand the resource its slice of the arena's mapped memory.
    ///
    /// Moves the resource from Bound to Mapped and notifies the mapping
    /// listener.
    pub(crate) fn mapped(
        &mut self,
        mut region: MappedRegion,
    ) -> Result<(), AllocatorError> {
        self.require_state(State::Bound, "map")?;
        if !self.is_host_visible {
            return Err(AllocatorError::Binding {
                debug_name: self.debug_name.clone(),
                step: LifecycleStep::Map,
                source: vk::Result::ERROR_MEMORY_MAP_FAILED,
            });
        }
        debug_assert!(region.len() as vk::DeviceSize == self.mapped_len());

        if let Some(listener) = self.mapping_listener.as_mut() {
            listener(region.as_mut_slice());
        }
        self.mapped_region = Some(region);
        self.state = State::Mapped;
        Ok(())
    }

    /// Release the resource's binding so its arena can repack.
    ///
    /// Binding dependent objects are destroyed along with the base object,
    /// which is then created again because Vulkan never allows a buffer or
    /// image to be bound twice. Leaves the resource Recreated.
    pub(crate) fn unbind(&mut self) -> Result<(), AllocatorError> {
        self.require_state_past(State::Bound, "unbind")?;
        self.mapped_region = None;
        unsafe {
            self.object.destroy_dependents(self.device.as_ref());
        }
        self.rebuild_object()
    }

    /// Recreate the device object, optionally with a new logical size.
    ///
    /// Returns the change in memory requirements when the resource had
    /// requirements before, None on first creation. The caller is
    /// responsible for passing the change along to the owning arena.
    pub(crate) fn recreate(
        &mut self,
        resize: Option<Resize>,
    ) -> Result<Option<MemoryRequirementsChange>, AllocatorError> {
        let mut change = self.state.is_past(State::Recreated).then(|| {
            MemoryRequirementsChange::capture(
                self.offset,
                self.requirements.size,
                self.requirements.alignment,
            )
        });

        if let Some(resize) = resize {
            if !self.object.apply_resize(resize) {
                return Err(anyhow!(
                    "Cannot apply {:?} to {} '{}'",
                    resize,
                    self.object.kind_name(),
                    self.debug_name
                )
                .into());
            }
        }

        self.rebuild_object()?;

        if let Some(change) = change.as_mut() {
            change.requirements_queried(&self.requirements);
        }
        Ok(change)
    }
}

// Private API
// -----------

impl MemoryBoundResource {
    fn new(
        device: Arc<dyn MemoryDevice>,
        debug_name: String,
        object: ResourceObject,
    ) -> Self {
        Self {
            debug_name,
            device,
            object,
            state: State::NotCreated,
            requirements: vk::MemoryRequirements::default(),
            offset: 0,
            memory_type_index: None,
            is_host_visible: false,
            mapped_region: None,
            arena: None,
            mapping_listener: None,
        }
    }

    /// Destroy whatever exists, create the base object from the current
    /// description, and query its requirements. Leaves the resource
    /// Recreated on success and NotCreated on failure.
    ///
    /// A requested size larger than the driver's requirement is a failure,
    /// the mapped slice would run past the resource's packed range.
    fn rebuild_object(&mut self) -> Result<(), AllocatorError> {
        self.close();

        let device = self.device.as_ref();
        unsafe { self.object.create(device) }.map_err(|source| {
            AllocatorError::DriverCreation {
                debug_name: self.debug_name.clone(),
                source,
            }
        })?;
        self.requirements = unsafe { self.object.memory_requirements(device) };
        self.state = State::Recreated;

        if let Some(requested_size) = self.requested_size() {
            if requested_size > self.requirements.size {
                let actual_size = self.requirements.size;
                self.close();
                return Err(anyhow!(
                    "'{}' asks for {} but the driver only requires {}",
                    self.debug_name,
                    PrettySize(requested_size),
                    PrettySize(actual_size)
                )
                .into());
            }
        }
        log::trace!(
            "Created {} '{}'. size={}, alignment={}",
            self.object.kind_name(),
            self.debug_name,
            PrettySize(self.requirements.size),
            self.requirements.alignment
        );
        Ok(())
    }

    fn require_state(
        &self,
        state: State,
        operation: &'static str,
    ) -> Result<(), AllocatorError> {
        if self.state == state {
            return Ok(());
        }
        Err(self.illegal_state(operation))
    }

    fn require_state_past(
        &self,
        state: State,
        operation: &'static str,
    ) -> Result<(), AllocatorError> {
        if self.state.is_past(state) {
            return Ok(());
        }
        Err(self.illegal_state(operation))
    }

    fn illegal_state(&self, operation: &'static str) -> AllocatorError {
        AllocatorError::IllegalState {
            debug_name: self.debug_name.clone(),
            operation,
            actual: self.state,
        }
    }
}
