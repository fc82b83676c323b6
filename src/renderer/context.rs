use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::renderer::ContextError;

/// Device and queue for off-screen shadow rendering.
///
/// Tracks device loss through wgpu's lost callback. The frame orchestrator
/// polls [`take_device_lost`](Self::take_device_lost) and forwards the signal
/// to every renderer.
pub struct ShadowContext {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    device_lost: Arc<AtomicBool>,
}

impl ShadowContext {
    pub async fn new_headless() -> Result<Self, ContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        log::info!("Using adapter: {:?}", adapter.get_info());
        log::info!("Using backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("ShadowDevice"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self::from_device(device, queue))
    }

    /// Wraps an existing device, e.g. one shared with the main renderer.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let device_lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&device_lost);
        device.set_device_lost_callback(move |reason, message| {
            log::warn!("GPU device lost ({reason:?}): {message}");
            flag.store(true, Ordering::Release);
        });

        Self {
            device,
            queue,
            device_lost,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Returns `true` once per device loss.
    pub fn take_device_lost(&self) -> bool {
        self.device_lost.swap(false, Ordering::AcqRel)
    }
}
