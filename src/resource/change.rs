use {crate::pretty_wrappers::PrettySize, ash::vk};

/// How a resource's memory requirements changed when it was recreated.
///
/// The old values are captured before the device object is destroyed and the
/// new values are filled in once the recreated object has been queried.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryRequirementsChange {
    pub old_offset: vk::DeviceSize,
    pub old_size: vk::DeviceSize,
    pub old_alignment: vk::DeviceSize,
    pub new_size: vk::DeviceSize,
    pub new_alignment: vk::DeviceSize,
}

impl MemoryRequirementsChange {
    pub(crate) fn capture(
        old_offset: vk::DeviceSize,
        old_size: vk::DeviceSize,
        old_alignment: vk::DeviceSize,
    ) -> Self {
        Self {
            old_offset,
            old_size,
            old_alignment,
            new_size: old_size,
            new_alignment: old_alignment,
        }
    }

    pub(crate) fn requirements_queried(
        &mut self,
        requirements: &vk::MemoryRequirements,
    ) {
        self.new_size = requirements.size;
        self.new_alignment = requirements.alignment;
    }

    /// Returns true when neither the size nor the alignment changed.
    pub fn is_noop(&self) -> bool {
        self.old_size == self.new_size
            && self.old_alignment == self.new_alignment
    }

    /// Returns true when the new requirements would still fit in the range
    /// the resource occupied before it changed.
    pub fn fits_in_place(&self) -> bool {
        let alignment = self.new_alignment.max(1);
        let alignment_fix = match self.old_offset % alignment {
            0 => 0,
            remainder => alignment - remainder,
        };
        self.new_size + alignment_fix <= self.old_size
    }
}

impl std::fmt::Display for MemoryRequirementsChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "size {} -> {}, alignment {} -> {} (was at offset {})",
            PrettySize(self.old_size),
            PrettySize(self.new_size),
            self.old_alignment,
            self.new_alignment,
            self.old_offset,
        ))
    }
}
