mod logging;

use {ccthw_ash_arena::FakeMemoryDevice, std::sync::Arc};

/// Setup logging and create a fake device which looks like a discrete GPU.
#[allow(dead_code)]
pub fn setup() -> Arc<FakeMemoryDevice> {
    setup_with(FakeMemoryDevice::discrete())
}

/// Setup logging and share a preconfigured fake device.
#[allow(dead_code)]
pub fn setup_with(device: FakeMemoryDevice) -> Arc<FakeMemoryDevice> {
    logging::setup_logger();
    Arc::new(device)
}

/// The flags every host visible test resource asks for.
#[allow(dead_code)]
pub fn host_visible() -> ash::vk::MemoryPropertyFlags {
    ash::vk::MemoryPropertyFlags::HOST_VISIBLE
        | ash::vk::MemoryPropertyFlags::HOST_COHERENT
}
