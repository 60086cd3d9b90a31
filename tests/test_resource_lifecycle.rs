//! Tests for how resources move through their lifecycle when driven by the
//! allocator, and for the errors raised when they are used out of order.

use {
    anyhow::Result,
    ash::vk,
    assert2::check,
    ccthw_ash_arena::{
        AllocatorError, ArenaAllocator, BufferDescription, MemoryBoundResource,
        State,
    },
    pretty_assertions::assert_eq,
    scopeguard::defer,
    std::{cell::Cell, rc::Rc},
};

mod common;

fn buffer(
    allocator: &ArenaAllocator,
    name: &str,
    size_in_bytes: u64,
) -> MemoryBoundResource {
    MemoryBoundResource::buffer(
        allocator.device().clone(),
        name,
        BufferDescription::new(
            size_in_bytes,
            vk::BufferUsageFlags::STORAGE_BUFFER,
        ),
    )
}

#[test]
pub fn test_resources_walk_through_every_state() -> Result<()> {
    let device = common::setup();
    let leak_check = device.clone();
    defer! {
        if !std::thread::panicking() {
            assert_eq!(leak_check.live_allocations(), 0);
            assert_eq!(leak_check.live_buffers(), 0);
        }
    }
    let mut allocator = ArenaAllocator::new(device.clone(), "states");

    let mut resource = buffer(&allocator, "walker", 128);
    check!(resource.state() == State::NotCreated);

    resource.create()?;
    check!(resource.state() == State::Recreated);
    check!(resource.buffer_handle().is_some());

    let handle = allocator.add(resource, common::host_visible())?;
    let resource = allocator.resource(handle)?;
    check!(resource.arena() == Some(1));
    check!(resource.memory_type_index() == Some(1));
    check!(resource.state() == State::Recreated);

    allocator.allocate()?;
    let resource = allocator.resource(handle)?;
    check!(resource.state() == State::Mapped);
    check!(resource.state().is_past(State::Bound));
    assert_eq!(resource.mapped_bytes().map(<[u8]>::len), Some(128));
    Ok(())
}

#[test]
pub fn test_resources_must_be_created_before_they_are_added() -> Result<()> {
    let device = common::setup();
    let mut allocator = ArenaAllocator::new(device.clone(), "uncreated");
    let resource = buffer(&allocator, "lazy", 64);

    let result = allocator.add(resource, common::host_visible());

    let Err(err) = result else {
        panic!("an uncreated resource has no memory requirements");
    };
    check!(let AllocatorError::IllegalState { actual: State::NotCreated, .. } = &err);
    check!(format!("{}", err).contains("'lazy'"));
    check!(allocator.arenas().count() == 0);
    Ok(())
}

#[test]
pub fn test_handles_from_another_allocator_are_unknown() -> Result<()> {
    let device = common::setup();
    let mut first = ArenaAllocator::new(device.clone(), "first");
    let mut second = ArenaAllocator::new(device.clone(), "second");
    let description =
        BufferDescription::new(64, vk::BufferUsageFlags::STORAGE_BUFFER);
    let handle = first.create_buffer(
        "only-in-first",
        description,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    let lookalike = second.create_buffer(
        "only-in-second",
        description,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    // same memory type and slot, different allocators
    check!(handle.memory_type_index() == lookalike.memory_type_index());
    check!(handle.slot() == lookalike.slot());
    check!(handle != lookalike);

    check!(let Err(AllocatorError::UnknownResource(_)) = second.resource(handle));
    check!(let Err(AllocatorError::UnknownResource(_)) = second.recreate(handle, None));
    check!(let Err(AllocatorError::UnknownResource(_)) = first.mapped_bytes(lookalike));
    check!(first.resource(handle).unwrap().debug_name() == "only-in-first");
    check!(second.resource(lookalike).unwrap().debug_name() == "only-in-second");
    Ok(())
}

#[test]
pub fn test_mapping_listener_fires_on_every_map() -> Result<()> {
    let device = common::setup();
    let mut allocator = ArenaAllocator::new(device.clone(), "listener");
    let handle = allocator.create_buffer(
        "watched",
        BufferDescription::new(32, vk::BufferUsageFlags::UNIFORM_BUFFER),
        common::host_visible(),
    )?;
    let other = allocator.create_buffer(
        "other",
        BufferDescription::new(32, vk::BufferUsageFlags::UNIFORM_BUFFER),
        common::host_visible(),
    )?;

    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    allocator.set_mapping_listener(
        handle,
        Box::new(move |bytes: &mut [u8]| {
            counter.set(counter.get() + 1);
            bytes.fill(0xAB);
        }),
    )?;
    check!(calls.get() == 0);

    allocator.allocate()?;
    check!(calls.get() == 1);
    check!(allocator.mapped_bytes(handle).unwrap() == &[0xAB_u8; 32]);

    // any change in the arena maps everything again
    allocator.recreate(other, None)?;
    check!(calls.get() == 2);

    // a listener set while mapped fires right away
    let late_calls = Rc::new(Cell::new(0));
    let late_counter = late_calls.clone();
    allocator.set_mapping_listener(
        other,
        Box::new(move |_: &mut [u8]| {
            late_counter.set(late_counter.get() + 1);
        }),
    )?;
    check!(late_calls.get() == 1);
    Ok(())
}

#[test]
pub fn test_closed_resources_cannot_be_reached() -> Result<()> {
    let device = common::setup();
    let mut allocator = ArenaAllocator::new(device.clone(), "closed");
    let handle = allocator.create_buffer(
        "mapped",
        BufferDescription::new(64, vk::BufferUsageFlags::UNIFORM_BUFFER),
        common::host_visible(),
    )?;
    allocator.allocate()?;
    check!(allocator.mapped_bytes(handle).is_ok());

    allocator.close();

    check!(device.live_allocations() == 0);
    check!(let Err(AllocatorError::UnknownResource(_)) = allocator.mapped_bytes(handle));
    check!(let Err(AllocatorError::UnknownResource(_)) = allocator.write(handle, &[0_u8; 4]));
    let result =
        allocator.set_mapping_listener(handle, Box::new(|_: &mut [u8]| {}));
    check!(let Err(AllocatorError::UnknownResource(_)) = result);
    Ok(())
}

#[test]
pub fn test_close_is_idempotent_and_resets_resources() -> Result<()> {
    let device = common::setup();
    let mut allocator = ArenaAllocator::new(device.clone(), "close");
    allocator.create_uniform_buffer("frame", 256, 2, 0)?;
    allocator.allocate()?;
    check!(device.live_allocations() == 1);

    allocator.close();
    allocator.close();

    check!(allocator.arenas().count() == 0);
    check!(device.live_allocations() == 0);
    check!(device.live_buffers() == 0);
    Ok(())
}

#[test]
pub fn test_report_names_every_arena() -> Result<()> {
    let device = common::setup();
    let mut allocator = ArenaAllocator::new(device, "Report");
    allocator.create_uniform_buffer("frame", 256, 2, 0)?;
    allocator.create_staged_index_buffer("indices", 64, vk::IndexType::UINT32)?;
    allocator.allocate()?;

    let report = allocator.report();
    log::info!("{}", report);

    check!(report.contains("# Report Arena Report"));
    check!(report.contains("## Memory Type 0"));
    check!(report.contains("## Memory Type 1"));
    check!(report.contains("resources: 3 (3 bound)"));
    check!(report.contains("resources: 1 (1 bound)"));
    Ok(())
}
