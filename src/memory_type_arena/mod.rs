mod layout;

use {
    crate::{
        device_memory::DeviceMemory,
        error::LifecycleStep,
        pretty_wrappers::PrettySize,
        resource::{MemoryRequirementsChange, Resize},
        AllocatorError, MappingListener, MemoryBoundResource, MemoryDevice,
        State,
    },
    anyhow::anyhow,
    ash::vk,
    std::sync::Arc,
};

pub use self::layout::PackedLayout;

/// Every resource which lives in one memory type, backed by exactly one
/// device memory allocation.
///
/// Resources are packed in the order they were added. Any change to any
/// resource after allocation rebuilds the whole arena: every resource is
/// unbound, the memory is freed, and the full packing pass runs again.
pub struct MemoryTypeArena {
    debug_name: String,
    device: Arc<dyn MemoryDevice>,
    memory_type_index: usize,
    property_flags: vk::MemoryPropertyFlags,
    resources: Vec<MemoryBoundResource>,
    requires_allocation: bool,
    memory: Option<DeviceMemory>,
    layout: PackedLayout,
}

// Public API
// ----------

impl MemoryTypeArena {
    /// Create an empty arena for a memory type.
    pub fn new(
        device: Arc<dyn MemoryDevice>,
        debug_name: impl Into<String>,
        memory_type_index: usize,
    ) -> Self {
        let property_flags =
            device.memory_properties().property_flags(memory_type_index);
        Self {
            debug_name: debug_name.into(),
            device,
            memory_type_index,
            property_flags,
            resources: vec![],
            requires_allocation: true,
            memory: None,
            layout: PackedLayout::default(),
        }
    }

    /// Take ownership of a resource. Nothing is packed until
    /// [Self::allocate] is called.
    ///
    /// # Returns
    ///
    /// The resource's slot in this arena.
    pub fn add_resource(
        &mut self,
        mut resource: MemoryBoundResource,
    ) -> Result<usize, AllocatorError> {
        if let Some(owner) = resource.arena() {
            return Err(anyhow!(
                "'{}' already belongs to the arena for memory type {}",
                resource.debug_name(),
                owner
            )
            .into());
        }
        if resource.memory_type_index() != Some(self.memory_type_index) {
            return Err(anyhow!(
                "'{}' resolved to memory type {:?}, not {}",
                resource.debug_name(),
                resource.memory_type_index(),
                self.memory_type_index
            )
            .into());
        }
        if resource.state() != State::Recreated {
            return Err(AllocatorError::IllegalState {
                debug_name: resource.debug_name().to_owned(),
                operation: "add to an arena",
                actual: resource.state(),
            });
        }

        resource.set_arena(self.memory_type_index);
        self.resources.push(resource);
        self.requires_allocation = true;
        Ok(self.resources.len() - 1)
    }

    /// Pack, allocate, bind, and map every resource in the arena.
    ///
    /// Does nothing when no resource was added or changed since the last
    /// successful call. If any step fails, every resource is left unbound and
    /// the arena must be allocated again before use.
    pub fn allocate(&mut self) -> Result<(), AllocatorError> {
        if !self.requires_allocation {
            return Ok(());
        }
        self.release_memory()?;

        if let Some(resource) = self
            .resources
            .iter()
            .find(|resource| resource.state() != State::Recreated)
        {
            return Err(AllocatorError::IllegalState {
                debug_name: resource.debug_name().to_owned(),
                operation: "pack",
                actual: resource.state(),
            });
        }

        let layout = PackedLayout::pack(self.resources.iter().map(|resource| {
            (resource.actual_size(), resource.required_alignment())
        }));
        let size_in_bytes = layout.total_size_in_bytes();
        if size_in_bytes == 0 {
            self.requires_allocation = false;
            return Ok(());
        }

        log::debug!(
            "Start allocating {} for '{}'. index={}, properties={:?}",
            PrettySize(size_in_bytes),
            self.debug_name,
            self.memory_type_index,
            self.property_flags
        );
        let memory = unsafe {
            DeviceMemory::allocate(
                self.device.as_ref(),
                size_in_bytes,
                self.memory_type_index,
            )
        }
        .map_err(|source| AllocatorError::ArenaAllocation {
            memory_type_index: self.memory_type_index,
            size: PrettySize(size_in_bytes),
            source,
        })?;
        self.memory = Some(memory);
        self.layout = layout;

        if let Err(err) = self.bind_all() {
            if let Err(cleanup_err) = self.release_memory() {
                log::error!(
                    "Unable to clean up '{}' after a failed allocation: {}",
                    self.debug_name,
                    cleanup_err
                );
            }
            return Err(err);
        }

        self.requires_allocation = false;
        log::debug!(
            "Allocated {} for '{}' with {} resources, {} padding",
            PrettySize(size_in_bytes),
            self.debug_name,
            self.resources.len(),
            PrettySize(self.layout.padding_in_bytes())
        );
        Ok(())
    }

    /// Recreate one resource, optionally resizing it, then repack the arena
    /// if it was already allocated.
    pub fn recreate_resource(
        &mut self,
        slot: usize,
        resize: Option<Resize>,
    ) -> Result<(), AllocatorError> {
        let resource = self.resources.get_mut(slot).ok_or_else(|| {
            anyhow!("'{}' has no resource in slot {}", self.debug_name, slot)
        })?;
        let change = resource.recreate(resize)?;
        self.on_changed(slot, change)
    }

    pub fn resource(&self, slot: usize) -> Option<&MemoryBoundResource> {
        self.resources.get(slot)
    }

    /// Register a mapping listener on the resource in `slot`.
    pub fn set_mapping_listener(
        &mut self,
        slot: usize,
        listener: MappingListener,
    ) -> Result<(), AllocatorError> {
        let resource = self.resources.get_mut(slot).ok_or_else(|| {
            anyhow!("'{}' has no resource in slot {}", self.debug_name, slot)
        })?;
        resource.set_mapping_listener(listener);
        Ok(())
    }

    /// The mapped bytes of the resource in `slot`, only available while the
    /// resource is Mapped.
    pub fn mapped_bytes_mut(&mut self, slot: usize) -> Option<&mut [u8]> {
        self.resources
            .get_mut(slot)
            .and_then(MemoryBoundResource::mapped_bytes_mut)
    }

    /// Every resource in packing order.
    pub fn resources(&self) -> &[MemoryBoundResource] {
        &self.resources
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub fn memory_type_index(&self) -> usize {
        self.memory_type_index
    }

    pub fn property_flags(&self) -> vk::MemoryPropertyFlags {
        self.property_flags
    }

    pub fn is_host_visible(&self) -> bool {
        self.property_flags
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    /// Returns true when resources were added or changed since the last
    /// successful allocation.
    pub fn requires_allocation(&self) -> bool {
        self.requires_allocation
    }

    /// The arena's device memory, once allocated.
    pub fn memory(&self) -> Option<vk::DeviceMemory> {
        self.memory.as_ref().map(DeviceMemory::memory)
    }

    /// The size of the arena's device memory, 0 when nothing is allocated.
    pub fn size_in_bytes(&self) -> vk::DeviceSize {
        self.memory
            .as_ref()
            .map(DeviceMemory::size_in_bytes)
            .unwrap_or(0)
    }

    /// The layout from the last successful allocation.
    pub fn layout(&self) -> &PackedLayout {
        &self.layout
    }

    /// Destroy every resource's device objects, then free the memory.
    pub fn close(&mut self) {
        for resource in self.resources.iter_mut() {
            resource.close();
        }
        if let Some(memory) = self.memory.take() {
            unsafe { memory.free(self.device.as_ref()) };
        }
        self.layout = PackedLayout::default();
        self.requires_allocation = true;
    }
}

impl Drop for MemoryTypeArena {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MemoryTypeArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTypeArena")
            .field("debug_name", &self.debug_name)
            .field("memory_type_index", &self.memory_type_index)
            .field("property_flags", &self.property_flags)
            .field("requires_allocation", &self.requires_allocation)
            .field("memory", &self.memory)
            .field("resources", &self.resources)
            .finish()
    }
}

// Private API
// -----------

impl MemoryTypeArena {
    /// React to a resource which was recreated.
    ///
    /// Before the first allocation there's nothing to do, the resource is
    /// packed with everything else. After it, the arena is always rebuilt
    /// from scratch, even when the resource would still fit where it was.
    fn on_changed(
        &mut self,
        slot: usize,
        change: Option<MemoryRequirementsChange>,
    ) -> Result<(), AllocatorError> {
        if self.requires_allocation {
            return Ok(());
        }

        let debug_name = self.resources[slot].debug_name();
        match change {
            Some(change) if change.is_noop() => log::debug!(
                "'{}' was recreated with the same requirements, repacking '{}'",
                debug_name,
                self.debug_name
            ),
            Some(change) if change.fits_in_place() => log::warn!(
                "'{}' changed ({}) but still fits, repacking '{}' anyway",
                debug_name,
                change,
                self.debug_name
            ),
            Some(change) => log::debug!(
                "'{}' changed ({}), repacking '{}'",
                debug_name,
                change,
                self.debug_name
            ),
            None => log::debug!(
                "'{}' was created again, repacking '{}'",
                debug_name,
                self.debug_name
            ),
        }

        self.requires_allocation = true;
        self.allocate()
    }

    /// Bind every resource at its packed offset, mapping the memory first if
    /// the memory type is host visible.
    fn bind_all(&mut self) -> Result<(), AllocatorError> {
        self.check_mapped_ranges()?;
        let is_host_visible = self.is_host_visible();
        let Some(memory) = self.memory.as_mut() else {
            return Err(anyhow!("'{}' has no memory to bind", self.debug_name).into());
        };

        if is_host_visible {
            unsafe { memory.map(self.device.as_ref()) }.map_err(|source| {
                AllocatorError::Binding {
                    debug_name: self.debug_name.clone(),
                    step: LifecycleStep::Map,
                    source,
                }
            })?;
            log::trace!(
                "Memory mapped for '{}'. size={}",
                self.debug_name,
                memory.size_in_bytes()
            );
        }

        for (resource, &offset) in
            self.resources.iter_mut().zip(self.layout.offsets())
        {
            resource.bind(memory.memory(), offset)?;
            if memory.is_mapped() {
                let region = memory
                    .region(offset, resource.mapped_len())
                    .ok_or_else(|| {
                        anyhow!(
                            "'{}' does not fit in the mapped memory of '{}'",
                            resource.debug_name(),
                            self.debug_name
                        )
                    })?;
                resource.mapped(region)?;
            }
        }
        Ok(())
    }

    /// Every resource's mapped range must end before the next resource's
    /// packed offset.
    fn check_mapped_ranges(&self) -> Result<(), AllocatorError> {
        let offsets = self.layout.offsets();
        for (index, (resource, &start)) in
            self.resources.iter().zip(offsets).enumerate()
        {
            let end = offsets
                .get(index + 1)
                .copied()
                .unwrap_or(self.layout.total_size_in_bytes());
            if start + resource.mapped_len() > end {
                return Err(anyhow!(
                    "'{}' maps {} at offset {} in '{}', which overlaps the \
                     next resource at {}",
                    resource.debug_name(),
                    PrettySize(resource.mapped_len()),
                    start,
                    self.debug_name,
                    end
                )
                .into());
            }
        }
        Ok(())
    }

    /// Unbind every bound resource and free the memory.
    fn release_memory(&mut self) -> Result<(), AllocatorError> {
        let mut result = Ok(());
        for resource in self.resources.iter_mut() {
            if !resource.state().is_past(State::Bound) {
                continue;
            }
            if let Err(err) = resource.unbind() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        if let Some(memory) = self.memory.take() {
            log::trace!("Freeing {:?} for '{}'", memory, self.debug_name);
            unsafe { memory.free(self.device.as_ref()) };
        }
        self.layout = PackedLayout::default();
        result
    }
}
