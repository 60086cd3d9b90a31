//! First-fit sequential packing.
//!
//! Resources are laid out one after another in insertion order. The only
//! padding is what it takes to move the running position up to the next
//! multiple of a resource's alignment. Nothing is reordered, so a resource
//! with a large alignment added after a few small ones can waste bytes.

use {ash::vk, num::Integer};

/// The offsets computed for an ordered list of resources.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PackedLayout {
    offsets: Vec<vk::DeviceSize>,
    total_size_in_bytes: vk::DeviceSize,
    padding_in_bytes: vk::DeviceSize,
}

impl PackedLayout {
    /// Pack `(size_in_bytes, alignment)` pairs in the order given.
    pub fn pack<I>(requirements: I) -> Self
    where
        I: IntoIterator<Item = (vk::DeviceSize, vk::DeviceSize)>,
    {
        let mut layout = Self::default();
        let mut position: vk::DeviceSize = 0;
        for (size_in_bytes, alignment) in requirements {
            let alignment = alignment.max(1);
            if !Integer::is_multiple_of(&position, &alignment) {
                let aligned = Integer::next_multiple_of(&position, &alignment);
                layout.padding_in_bytes += aligned - position;
                position = aligned;
            }
            layout.offsets.push(position);
            position += size_in_bytes;
        }
        layout.total_size_in_bytes = position;
        layout
    }

    /// The offset of each resource, in the order they were packed.
    pub fn offsets(&self) -> &[vk::DeviceSize] {
        &self.offsets
    }

    /// The number of bytes needed to hold every resource.
    pub fn total_size_in_bytes(&self) -> vk::DeviceSize {
        self.total_size_in_bytes
    }

    /// The number of bytes lost to alignment.
    pub fn padding_in_bytes(&self) -> vk::DeviceSize {
        self.padding_in_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}
