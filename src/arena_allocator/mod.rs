mod recipes;

use {
    crate::{
        pretty_wrappers::PrettySize, AllocatorError, MappingListener,
        MemoryBoundResource, MemoryDevice, MemoryTypeArena, Resize, State,
    },
    anyhow::anyhow,
    ash::vk,
    bytemuck::Pod,
    indoc::indoc,
    std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

pub use self::recipes::{
    IndexBuffer, StagedSampler, UniformBuffer, VertexBuffer,
};

static NEXT_ALLOCATOR_ID: AtomicUsize = AtomicUsize::new(0);

/// Identifies a resource owned by an [ArenaAllocator].
///
/// Handles stay valid until the allocator is closed. A resource never moves
/// to another memory type, so the handle never changes either. A handle only
/// resolves in the allocator which issued it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ResourceHandle {
    allocator_id: usize,
    memory_type_index: usize,
    slot: usize,
}

impl ResourceHandle {
    /// The memory type of the arena which owns the resource.
    pub fn memory_type_index(&self) -> usize {
        self.memory_type_index
    }

    /// The resource's position in its arena's packing order.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Routes resources into one arena per memory type and drives allocation
/// across every arena.
///
/// Resources are only ever borrowed immutably. Anything which changes a
/// resource goes through the allocator so the owning arena can keep its
/// packing and mappings consistent.
///
/// ```compile_fail
/// # use ccthw_ash_arena::{ArenaAllocator, MemoryBoundResource, ResourceHandle};
/// fn swap(
///     allocator: &mut ArenaAllocator,
///     handle: ResourceHandle,
///     other: MemoryBoundResource,
/// ) -> MemoryBoundResource {
///     std::mem::replace(allocator.resource(handle).unwrap(), other)
/// }
/// ```
pub struct ArenaAllocator {
    id: usize,
    debug_name: String,
    device: Arc<dyn MemoryDevice>,
    arenas: Vec<Option<MemoryTypeArena>>,
}

// Public API
// ----------

impl ArenaAllocator {
    /// Create an allocator with no arenas. Arenas are created on demand the
    /// first time a resource resolves to their memory type.
    pub fn new(
        device: Arc<dyn MemoryDevice>,
        debug_name: impl Into<String>,
    ) -> Self {
        let memory_type_count = device.memory_properties().types().len();
        let mut arenas = Vec::with_capacity(memory_type_count);
        arenas.resize_with(memory_type_count, || None);
        Self {
            id: NEXT_ALLOCATOR_ID.fetch_add(1, Ordering::Relaxed),
            debug_name: debug_name.into(),
            device,
            arenas,
        }
    }

    /// The device every resource and arena is created with.
    pub fn device(&self) -> &Arc<dyn MemoryDevice> {
        &self.device
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    /// Resolve a created resource's memory type and hand it to the arena for
    /// that type.
    ///
    /// Nothing is bound until [Self::allocate] is called.
    pub fn add(
        &mut self,
        mut resource: MemoryBoundResource,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<ResourceHandle, AllocatorError> {
        if resource.arena().is_some() {
            return Err(AllocatorError::IllegalState {
                debug_name: resource.debug_name().to_owned(),
                operation: "add to a second arena",
                actual: resource.state(),
            });
        }
        let memory_type_index = resource.calculate_memory_type_index(properties)?;

        let arena = self.arena_for(memory_type_index)?;
        log::trace!(
            "Adding '{}' to '{}'",
            resource.debug_name(),
            arena.debug_name()
        );
        let slot = arena.add_resource(resource)?;
        Ok(ResourceHandle {
            allocator_id: self.id,
            memory_type_index,
            slot,
        })
    }

    /// Allocate every arena which has new or changed resources.
    ///
    /// Stops at the first arena which fails. Arenas which were already
    /// allocated stay allocated.
    pub fn allocate(&mut self) -> Result<(), AllocatorError> {
        for arena in self.arenas.iter_mut().flatten() {
            arena.allocate()?;
        }
        Ok(())
    }

    /// Recreate a resource, optionally resizing it. If its arena was already
    /// allocated the arena is repacked immediately.
    pub fn recreate(
        &mut self,
        handle: ResourceHandle,
        resize: Option<Resize>,
    ) -> Result<(), AllocatorError> {
        self.owning_arena_mut(handle)?
            .recreate_resource(handle.slot, resize)
    }

    pub fn resource(
        &self,
        handle: ResourceHandle,
    ) -> Result<&MemoryBoundResource, AllocatorError> {
        self.owning_arena(handle)?
            .resource(handle.slot)
            .ok_or(AllocatorError::UnknownResource(handle))
    }

    /// Register a listener which receives the resource's mapped bytes every
    /// time its arena maps it. Fires immediately if the resource is mapped.
    pub fn set_mapping_listener(
        &mut self,
        handle: ResourceHandle,
        listener: MappingListener,
    ) -> Result<(), AllocatorError> {
        self.owning_arena_mut(handle)?
            .set_mapping_listener(handle.slot, listener)
    }

    /// The arena for a memory type, if any resource resolved to it.
    pub fn arena(&self, memory_type_index: usize) -> Option<&MemoryTypeArena> {
        self.arenas
            .get(memory_type_index)
            .and_then(Option::as_ref)
    }

    /// Every arena which exists, ordered by memory type index.
    pub fn arenas(&self) -> impl Iterator<Item = &MemoryTypeArena> {
        self.arenas.iter().flatten()
    }

    /// Copy `data` to the start of a mapped resource.
    pub fn write<T: Pod>(
        &mut self,
        handle: ResourceHandle,
        data: &[T],
    ) -> Result<(), AllocatorError> {
        self.write_at(handle, 0, data)
    }

    /// Copy `data` into a mapped resource, starting `offset` bytes in.
    pub fn write_at<T: Pod>(
        &mut self,
        handle: ResourceHandle,
        offset: usize,
        data: &[T],
    ) -> Result<(), AllocatorError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let resource = self.resource(handle)?;
        let debug_name = resource.debug_name().to_owned();
        let state = resource.state();

        let mapped = self.owning_arena_mut(handle)?.mapped_bytes_mut(handle.slot);
        let Some(mapped) = mapped else {
            return Err(AllocatorError::IllegalState {
                debug_name,
                operation: "write to",
                actual: state,
            });
        };
        let end = offset.checked_add(bytes.len()).unwrap_or(usize::MAX);
        if end > mapped.len() {
            return Err(AllocatorError::MappedWriteOutOfRange {
                debug_name,
                write_size: PrettySize(end as u64),
                mapped_size: PrettySize(mapped.len() as u64),
            });
        }
        mapped[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// The mapped bytes of a resource.
    pub fn mapped_bytes(
        &self,
        handle: ResourceHandle,
    ) -> Result<&[u8], AllocatorError> {
        let resource = self.resource(handle)?;
        resource
            .mapped_bytes()
            .ok_or_else(|| AllocatorError::IllegalState {
                debug_name: resource.debug_name().to_owned(),
                operation: "read the mapped bytes of",
                actual: resource.state(),
            })
    }

    /// A summary of every arena, formatted as markdown.
    pub fn report(&self) -> String {
        let mut report = format!(
            indoc!(
                "
                # {} Arena Report

                arenas: {}
                allocated: {}

                "
            ),
            self.debug_name,
            self.arenas().count(),
            PrettySize(self.arenas().map(MemoryTypeArena::size_in_bytes).sum()),
        );

        for arena in self.arenas() {
            let bound = arena
                .resources()
                .iter()
                .filter(|resource| resource.state().is_past(State::Bound))
                .count();
            report.push_str(&format!(
                indoc!(
                    "
                    ## Memory Type {}
                    Properties: {:#?}

                    resources: {} ({} bound)
                    allocated: {}
                    padding: {}

                    "
                ),
                arena.memory_type_index(),
                arena.property_flags(),
                arena.resources().len(),
                bound,
                PrettySize(arena.size_in_bytes()),
                PrettySize(arena.layout().padding_in_bytes()),
            ));
        }
        report
    }

    /// Close every arena, destroying every resource and freeing all memory.
    /// Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.arenas.iter().all(Option::is_none) {
            return;
        }
        log::debug!("{}", self.report());
        for arena in self.arenas.iter_mut() {
            if let Some(mut arena) = arena.take() {
                arena.close();
            }
        }
    }
}

impl Drop for ArenaAllocator {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ArenaAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaAllocator")
            .field("debug_name", &self.debug_name)
            .field("arenas", &self.arenas().collect::<Vec<_>>())
            .finish()
    }
}

// Private API
// -----------

impl ArenaAllocator {
    /// The arena which owns the resource behind a handle issued by this
    /// allocator.
    fn owning_arena(
        &self,
        handle: ResourceHandle,
    ) -> Result<&MemoryTypeArena, AllocatorError> {
        Some(handle)
            .filter(|handle| handle.allocator_id == self.id)
            .and_then(|handle| self.arena(handle.memory_type_index))
            .filter(|arena| arena.resource(handle.slot).is_some())
            .ok_or(AllocatorError::UnknownResource(handle))
    }

    fn owning_arena_mut(
        &mut self,
        handle: ResourceHandle,
    ) -> Result<&mut MemoryTypeArena, AllocatorError> {
        if handle.allocator_id != self.id {
            return Err(AllocatorError::UnknownResource(handle));
        }
        self.arenas
            .get_mut(handle.memory_type_index)
            .and_then(Option::as_mut)
            .filter(|arena| arena.resource(handle.slot).is_some())
            .ok_or(AllocatorError::UnknownResource(handle))
    }

    fn arena_for(
        &mut self,
        memory_type_index: usize,
    ) -> Result<&mut MemoryTypeArena, AllocatorError> {
        let Some(entry) = self.arenas.get_mut(memory_type_index) else {
            return Err(anyhow!(
                "'{}' has no memory type {}",
                self.debug_name,
                memory_type_index
            )
            .into());
        };
        Ok(entry.get_or_insert_with(|| {
            MemoryTypeArena::new(
                self.device.clone(),
                format!("{}[{}]", self.debug_name, memory_type_index),
                memory_type_index,
            )
        }))
    }
}
