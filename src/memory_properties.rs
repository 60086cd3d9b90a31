use {
    crate::{AllocatorError, PrettyBitflag, PrettySize},
    ash::vk,
    indoc::indoc,
};

/// The memory types and heaps reported by a physical device.
#[derive(Debug, Clone)]
pub struct MemoryProperties {
    types: Vec<vk::MemoryType>,
    heaps: Vec<vk::MemoryHeap>,
}

impl MemoryProperties {
    /// Get the memory properties for the given physical device.
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> Self {
        let properties = unsafe {
            instance.get_physical_device_memory_properties(physical_device)
        };
        Self::from_raw(
            properties.memory_types
                [0..properties.memory_type_count as usize]
                .to_vec(),
            properties.memory_heaps
                [0..properties.memory_heap_count as usize]
                .to_vec(),
        )
    }

    /// Build the properties from an explicit memory type and heap table.
    pub fn from_raw(
        types: Vec<vk::MemoryType>,
        heaps: Vec<vk::MemoryHeap>,
    ) -> Self {
        debug_assert!(types.len() <= vk::MAX_MEMORY_TYPES);
        debug_assert!(types
            .iter()
            .all(|memory_type| (memory_type.heap_index as usize) < heaps.len()));
        Self { types, heaps }
    }

    /// All of the currently usable memory heaps on this system.
    pub fn heaps(&self) -> &[vk::MemoryHeap] {
        &self.heaps
    }

    /// All of the currently usable memory types on this system.
    pub fn types(&self) -> &[vk::MemoryType] {
        &self.types
    }

    /// The property flags for a memory type index.
    pub fn property_flags(
        &self,
        memory_type_index: usize,
    ) -> vk::MemoryPropertyFlags {
        self.types
            .get(memory_type_index)
            .map(|memory_type| memory_type.property_flags)
            .unwrap_or_default()
    }

    /// Pick the memory type for a resource.
    ///
    /// # Params
    ///
    /// * `debug_name` - the resource's name, only used in the error
    /// * `memory_type_bits` - the compatible types reported by the driver
    /// * `properties` - the properties the memory type must have
    pub fn find_memory_type_index(
        &self,
        debug_name: &str,
        memory_type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<usize, AllocatorError> {
        memory_type_index(&self.types, memory_type_bits, properties).ok_or_else(
            || AllocatorError::NoSuitableMemoryType {
                debug_name: debug_name.to_owned(),
                memory_type_bits: PrettyBitflag(memory_type_bits),
                properties,
            },
        )
    }
}

/// The first memory type, in driver order, which is both allowed by
/// `memory_type_bits` and has every flag in `properties`.
pub fn memory_type_index(
    types: &[vk::MemoryType],
    memory_type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<usize> {
    types
        .iter()
        .enumerate()
        .find(|(index, memory_type)| {
            let is_required_type = u32::try_from(*index)
                .ok()
                .and_then(|index| 1_u32.checked_shl(index))
                .is_some_and(|bit| bit & memory_type_bits != 0);
            let has_required_properties =
                memory_type.property_flags.contains(properties);
            is_required_type && has_required_properties
        })
        .map(|(index, _memory_type)| index)
}

impl std::fmt::Display for MemoryProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("# Memory Properties\n\n")?;
        f.write_str("## Memory Types\n\n")?;

        for (index, memory_type) in self.types.iter().enumerate() {
            f.write_fmt(format_args!(
                indoc!(
                    "
                        [{}] property_flags: {:?}
                                heap_index: {}

                        "
                ),
                index, memory_type.property_flags, memory_type.heap_index,
            ))?;
        }

        f.write_str("\n## Memory Heaps\n\n")?;

        for (index, heap) in self.heaps.iter().enumerate() {
            f.write_fmt(format_args!(
                indoc!(
                    "
                        [{}] flags: {:?}
                             size: {}

                        "
                ),
                index,
                heap.flags,
                PrettySize(heap.size),
            ))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use {super::*, pretty_assertions::assert_eq};

    fn memory_type(
        property_flags: vk::MemoryPropertyFlags,
    ) -> vk::MemoryType {
        vk::MemoryType {
            property_flags,
            heap_index: 0,
        }
    }

    fn table() -> Vec<vk::MemoryType> {
        vec![
            memory_type(vk::MemoryPropertyFlags::HOST_VISIBLE),
            memory_type(
                vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT,
            ),
            memory_type(vk::MemoryPropertyFlags::DEVICE_LOCAL),
        ]
    }

    #[test]
    fn picks_only_compatible_device_local_type() {
        let index = memory_type_index(
            &table(),
            0b100,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        );
        assert_eq!(index, Some(2));
    }

    #[test]
    fn picks_first_match_in_driver_order() {
        let index = memory_type_index(
            &table(),
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        );
        assert_eq!(index, Some(0));

        let index = memory_type_index(
            &table(),
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert_eq!(index, Some(1));
    }

    #[test]
    fn types_past_the_bitmask_are_never_picked() {
        let mut types =
            vec![memory_type(vk::MemoryPropertyFlags::HOST_VISIBLE); 40];
        types[35] = memory_type(vk::MemoryPropertyFlags::DEVICE_LOCAL);

        let index = memory_type_index(
            &types,
            u32::MAX,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        );
        assert_eq!(index, None);
    }

    #[test]
    fn no_overlap_is_an_error() {
        let properties = MemoryProperties::from_raw(
            table(),
            vec![vk::MemoryHeap {
                size: 1024,
                flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
            }],
        );
        let result = properties.find_memory_type_index(
            "uniforms",
            0b011,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        );
        assert!(matches!(
            result,
            Err(AllocatorError::NoSuitableMemoryType {
                memory_type_bits: PrettyBitflag(0b011),
                ..
            })
        ));
    }
}
