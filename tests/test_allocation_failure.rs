//! Tests for what an arena leaves behind when the device refuses to allocate.

use {
    anyhow::Result,
    ash::vk,
    assert2::check,
    ccthw_ash_arena::{
        AllocatorError, ArenaAllocator, BufferDescription, FakeMemoryDevice,
        Resize, ResourceHandle, State,
    },
    regex::Regex,
};

mod common;

fn host_buffer(
    allocator: &mut ArenaAllocator,
    name: &str,
    size_in_bytes: u64,
) -> Result<ResourceHandle> {
    Ok(allocator.create_buffer(
        name,
        BufferDescription::new(
            size_in_bytes,
            vk::BufferUsageFlags::TRANSFER_SRC,
        ),
        common::host_visible(),
    )?)
}

#[test]
pub fn test_out_of_memory_leaves_nothing_bound() -> Result<()> {
    let device =
        common::setup_with(FakeMemoryDevice::discrete().with_heap_budget(1, 1024));
    let mut allocator = ArenaAllocator::new(device.clone(), "oom");
    let handles = [
        host_buffer(&mut allocator, "first", 512)?,
        host_buffer(&mut allocator, "second", 1024)?,
    ];

    let result = allocator.allocate();

    let Err(err) = result else {
        panic!("allocating past the heap budget should fail");
    };
    check!(let AllocatorError::ArenaAllocation { memory_type_index: 1, .. } = &err);
    let message = format!("{}", err);
    let pattern = Regex::new(r"1\.50 kb \(1536 b\).*memory type 1")?;
    check!(pattern.is_match(&message));

    for handle in handles {
        check!(allocator.resource(handle).unwrap().state() == State::Recreated);
    }
    check!(device.live_allocations() == 0);
    check!(allocator.arena(1).unwrap().requires_allocation());
    Ok(())
}

#[test]
pub fn test_allocation_can_be_retried_after_shrinking() -> Result<()> {
    let device =
        common::setup_with(FakeMemoryDevice::discrete().with_heap_budget(1, 1024));
    let mut allocator = ArenaAllocator::new(device.clone(), "retry");
    let big = host_buffer(&mut allocator, "big", 2048)?;
    check!(allocator.allocate().is_err());

    allocator.recreate(big, Some(Resize::BufferSize(512)))?;
    allocator.allocate()?;

    check!(allocator.resource(big).unwrap().state() == State::Mapped);
    check!(device.live_allocations() == 1);
    Ok(())
}

#[test]
pub fn test_growing_past_the_budget_unbinds_the_arena() -> Result<()> {
    let device =
        common::setup_with(FakeMemoryDevice::discrete().with_heap_budget(1, 1024));
    let mut allocator = ArenaAllocator::new(device.clone(), "grow");
    let small = host_buffer(&mut allocator, "small", 256)?;
    let other = host_buffer(&mut allocator, "other", 256)?;
    allocator.allocate()?;
    check!(allocator.resource(other).unwrap().state() == State::Mapped);

    let result = allocator.recreate(small, Some(Resize::BufferSize(4096)));

    check!(let Err(AllocatorError::ArenaAllocation { .. }) = result);
    check!(allocator.resource(small).unwrap().state() == State::Recreated);
    check!(allocator.resource(other).unwrap().state() == State::Recreated);
    check!(allocator.resource(other).unwrap().mapped_bytes().is_none());
    check!(device.live_allocations() == 0);
    Ok(())
}

#[test]
pub fn test_unsupported_memory_properties() -> Result<()> {
    let device = common::setup_with(
        FakeMemoryDevice::discrete().with_memory_type_bits(0b001),
    );
    let mut allocator = ArenaAllocator::new(device.clone(), "unsupported");

    let result = allocator.create_buffer(
        "uploads",
        BufferDescription::new(64, vk::BufferUsageFlags::TRANSFER_SRC),
        common::host_visible(),
    );

    let Err(err) = result else {
        panic!("no memory type is host visible for these bits");
    };
    check!(let AllocatorError::NoSuitableMemoryType { .. } = &err);
    check!(format!("{}", err).contains("'uploads'"));
    check!(allocator.arenas().count() == 0);
    check!(device.live_buffers() == 0);
    Ok(())
}
