//! Arena style Vulkan memory management, written from scratch the hard way.
//!
//! Every buffer and image is routed into one arena per memory type. Each
//! arena owns exactly one device memory allocation, packs its resources into
//! it front to back, and repacks from scratch whenever a resource changes.

mod arena_allocator;
mod device_memory;
mod error;
mod memory_device;
mod memory_properties;
mod memory_type_arena;
mod pretty_wrappers;
mod resource;

use self::pretty_wrappers::{PrettyBitflag, PrettySize};
pub use self::{
    arena_allocator::{
        ArenaAllocator, IndexBuffer, ResourceHandle, StagedSampler,
        UniformBuffer, VertexBuffer,
    },
    device_memory::{DeviceMemory, MappedRegion},
    error::{AllocatorError, LifecycleStep},
    memory_device::{AshMemoryDevice, FakeMemoryDevice, MemoryDevice},
    memory_properties::MemoryProperties,
    memory_type_arena::{MemoryTypeArena, PackedLayout},
    resource::{
        BufferDescription, ImageDescription, MappingListener,
        MemoryBoundResource, MemoryRequirementsChange, ResourceKind, Resize,
        SamplerDescription, State,
    },
};
