//! Tests for the ready-made vertex, index, uniform, and texture resources.

use {
    anyhow::Result,
    ash::vk,
    assert2::check,
    bytemuck::{Pod, Zeroable},
    ccthw_ash_arena::{ArenaAllocator, ImageDescription, ResourceKind, State},
    pretty_assertions::assert_eq,
    scopeguard::guard,
};

mod common;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Vertex {
    pos: [f32; 3],
    uv: [f32; 2],
}

#[test]
pub fn test_vertex_buffer() -> Result<()> {
    let device = common::setup();
    let mut allocator = guard(
        ArenaAllocator::new(device.clone(), "vertices"),
        |mut allocator| {
            log::info!("{}", allocator.report());
            allocator.close();
        },
    );

    let vertices = [
        Vertex {
            pos: [0.0, 0.5, 0.0],
            uv: [0.5, 0.0],
        },
        Vertex {
            pos: [0.5, -0.5, 0.0],
            uv: [1.0, 1.0],
        },
        Vertex {
            pos: [-0.5, -0.5, 0.0],
            uv: [0.0, 1.0],
        },
    ];
    let vertex_buffer = allocator.create_vertex_buffer(
        "triangle",
        &vertices,
        1,
        vk::VertexInputRate::VERTEX,
    )?;
    allocator.allocate()?;

    let description = vertex_buffer.binding_description();
    assert_eq!(description.binding, 1);
    assert_eq!(description.stride, 20);
    assert_eq!(description.input_rate, vk::VertexInputRate::VERTEX);
    assert_eq!(vertex_buffer.vertex_count, 3);
    assert_eq!(vertex_buffer.size_in_bytes(), 60);
    check!(vertex_buffer.staging.is_none());

    let expected: &[u8] = bytemuck::cast_slice(&vertices);
    assert_eq!(allocator.mapped_bytes(vertex_buffer.buffer)?, expected);
    Ok(())
}

#[test]
pub fn test_staged_vertex_and_index_buffers() -> Result<()> {
    let device = common::setup();
    let mut allocator = ArenaAllocator::new(device.clone(), "staged");

    let vertex_buffer = allocator.create_staged_vertex_buffer(
        "mesh",
        100,
        20,
        0,
        vk::VertexInputRate::VERTEX,
    )?;
    let index_buffer = allocator.create_staged_index_buffer(
        "mesh-indices",
        300,
        vk::IndexType::UINT16,
    )?;
    allocator.allocate()?;

    let staging = allocator.resource(vertex_buffer.staging.unwrap())?;
    let vertices = allocator.resource(vertex_buffer.buffer)?;
    assert_eq!(staging.debug_name(), "mesh-in");
    assert_eq!(vertices.debug_name(), "mesh-out");
    assert_eq!(staging.requested_size(), Some(2000));
    assert_eq!(vertices.requested_size(), Some(2000));
    check!(staging.state() == State::Mapped);
    check!(vertices.state() == State::Bound);

    assert_eq!(index_buffer.size_in_bytes(), 600);
    let indices = allocator.resource(index_buffer.buffer)?;
    assert_eq!(indices.requested_size(), Some(600));
    assert_eq!(index_buffer.buffer.memory_type_index(), 0);
    assert_eq!(index_buffer.staging.memory_type_index(), 1);

    // device local resources share one arena, staging buffers another
    assert_eq!(allocator.arena(0).unwrap().resources().len(), 2);
    assert_eq!(allocator.arena(1).unwrap().resources().len(), 2);
    Ok(())
}

#[test]
pub fn test_uniform_buffer_copies() -> Result<()> {
    let device = common::setup();
    let mut allocator = ArenaAllocator::new(device.clone(), "uniforms");

    let uniforms = allocator.create_uniform_buffer("camera", 64, 3, 2)?;
    allocator.allocate()?;

    assert_eq!(uniforms.buffers.len(), 3);
    assert_eq!(uniforms.binding, 2);
    for (index, &handle) in uniforms.buffers.iter().enumerate() {
        let resource = allocator.resource(handle)?;
        assert_eq!(resource.debug_name(), format!("camera[{}]", index));
        check!(resource.state() == State::Mapped);
    }
    assert_eq!(uniforms.for_frame(4), uniforms.buffers[1]);

    allocator.write(uniforms.for_frame(0), &[1.0_f32; 16])?;
    check!(allocator.mapped_bytes(uniforms.buffers[1]).unwrap() == &[0_u8; 64]);
    Ok(())
}

#[test]
pub fn test_staged_sampler() -> Result<()> {
    let device = common::setup();
    let mut allocator = ArenaAllocator::new(device.clone(), "textures");
    let extent = vk::Extent2D {
        width: 256,
        height: 128,
    };

    let with_mips = allocator.create_staged_sampler("brick", 0, extent, true)?;
    let without_mips =
        allocator.create_staged_sampler("grass", 1, extent, false)?;
    allocator.allocate()?;

    assert_eq!(with_mips.mip_levels, 9);
    assert_eq!(without_mips.mip_levels, 1);

    let staging = allocator.resource(with_mips.staging)?;
    assert_eq!(staging.requested_size(), Some(256 * 128 * 4));
    check!(staging.state() == State::Mapped);

    let image = allocator.resource(with_mips.image)?;
    check!(image.kind() == ResourceKind::SamplerImage);
    check!(image.state() == State::Bound);
    check!(image.sampler().is_some());
    check!(image.image_view().is_some());
    let description = image.image_description().unwrap();
    check!(description.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));

    let image = allocator.resource(without_mips.image)?;
    let description = image.image_description().unwrap();
    check!(!description.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));

    assert_eq!(device.live_samplers(), 2);
    assert_eq!(device.live_image_views(), 2);
    Ok(())
}

#[test]
pub fn test_device_local_image() -> Result<()> {
    let device = common::setup();
    let mut allocator = ArenaAllocator::new(device.clone(), "attachments");

    let depth = allocator.create_device_local_image(
        "depth",
        ImageDescription {
            extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
            format: vk::Format::D32_SFLOAT,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect_mask: vk::ImageAspectFlags::DEPTH,
            ..Default::default()
        },
    )?;
    allocator.allocate()?;

    let resource = allocator.resource(depth)?;
    check!(resource.kind() == ResourceKind::Image);
    check!(resource.state() == State::Bound);
    check!(resource.requested_size() == None);
    assert_eq!(resource.mapped_len(), resource.actual_size());
    assert_eq!(resource.actual_size(), 640 * 480 * 4);
    check!(
        device.image_binding(resource.image_handle().unwrap())
            == Some((allocator.arena(0).unwrap().memory().unwrap(), 0))
    );
    Ok(())
}

#[test]
pub fn test_uniform_buffers_need_at_least_one_copy() -> Result<()> {
    let device = common::setup();
    let mut allocator = ArenaAllocator::new(device.clone(), "no-copies");

    let result = allocator.create_uniform_buffer("ubo", 64, 0, 0);

    let Err(err) = result else {
        panic!("zero copies leaves no buffer for any frame");
    };
    check!(format!("{}", err).contains("'ubo'"));
    check!(allocator.arenas().count() == 0);
    check!(device.live_buffers() == 0);
    Ok(())
}

#[cfg(target_pointer_width = "64")]
#[test]
pub fn test_vertex_stride_must_fit_in_a_u32() -> Result<()> {
    // 4096 * 4096 * 256 bytes is one past u32::MAX
    type Enormous = [[[u8; 4096]; 4096]; 256];

    let device = common::setup();
    let mut allocator = ArenaAllocator::new(device.clone(), "enormous");

    let result = allocator.create_vertex_buffer::<Enormous>(
        "enormous",
        &[],
        0,
        vk::VertexInputRate::VERTEX,
    );

    let Err(err) = result else {
        panic!("the stride does not fit in a vertex binding");
    };
    check!(format!("{}", err).contains("'enormous'"));
    check!(device.live_buffers() == 0);
    Ok(())
}
