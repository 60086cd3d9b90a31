use {
    crate::{
        pretty_wrappers::{PrettyBitflag, PrettySize},
        ResourceHandle, State,
    },
    ash::vk,
    thiserror::Error,
};

/// The step of a resource's lifecycle which failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LifecycleStep {
    Bind,
    Map,
}

impl std::fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleStep::Bind => "bind",
            LifecycleStep::Map => "map",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum AllocatorError {
    #[error("Unable to create the device object for '{debug_name}'")]
    DriverCreation {
        debug_name: String,
        #[source]
        source: vk::Result,
    },

    #[error(
        "Unable to resolve the memory type of '{debug_name}': no memory type \
         for bits {memory_type_bits} and flags {properties:?}"
    )]
    NoSuitableMemoryType {
        debug_name: String,
        memory_type_bits: PrettyBitflag,
        properties: vk::MemoryPropertyFlags,
    },

    #[error("Unable to allocate {size} for memory type {memory_type_index}")]
    ArenaAllocation {
        memory_type_index: usize,
        size: PrettySize,
        #[source]
        source: vk::Result,
    },

    #[error("Unable to {step} '{debug_name}'")]
    Binding {
        debug_name: String,
        step: LifecycleStep,
        #[source]
        source: vk::Result,
    },

    #[error("Cannot {operation} '{debug_name}' while it is {actual:?}")]
    IllegalState {
        debug_name: String,
        operation: &'static str,
        actual: State,
    },

    #[error("No resource exists for {0:?}")]
    UnknownResource(ResourceHandle),

    #[error(
        "Unable to write {write_size} into '{debug_name}', the mapped region \
         is {mapped_size}"
    )]
    MappedWriteOutOfRange {
        debug_name: String,
        write_size: PrettySize,
        mapped_size: PrettySize,
    },

    #[error(transparent)]
    RuntimeError(#[from] anyhow::Error),
}
