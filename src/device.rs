use candle_core::Device;
use once_cell::sync::Lazy;

/// Device the value table tensors are materialised on for persistence.
/// The table is read back into host memory, so this is always the CPU.
pub static DEVICE: Lazy<Device> = Lazy::new(|| {
    tracing::debug!("using CPU device for value table tensors");
    Device::Cpu
});
