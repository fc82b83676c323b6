use batch_shadow::renderer::ContextError;
use batch_shadow::{
    BatchLayerState, BatchingShadowRenderer, FrameContext, IndexBuffer, SceneConfig, SectionPlane,
    ShadowContext, ShadowMap, ShadowSettings, WgpuShadowDevice,
};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

const SETTINGS_PATH: &str = "shadow_settings.json";

/// Quantized unit quad on the XZ plane, split in two triangles.
fn quad_layer(device: &wgpu::Device, height: f32) -> BatchLayerState<wgpu::Buffer> {
    let positions: [[u16; 4]; 4] = [
        [0, 0, 0, 0],
        [u16::MAX, 0, 0, 0],
        [u16::MAX, 0, u16::MAX, 0],
        [0, 0, u16::MAX, 0],
    ];
    let indices: [u16; 6] = [0, 2, 1, 0, 3, 2];

    let positions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("QuadPositions"),
        contents: bytemuck::cast_slice(&positions),
        usage: wgpu::BufferUsages::VERTEX,
    });
    let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("QuadIndices"),
        contents: bytemuck::cast_slice(&indices),
        usage: wgpu::BufferUsages::INDEX,
    });

    let scale = 10.0 / f32::from(u16::MAX);
    let decode = Mat4::from_translation(Vec3::new(-5.0, height, -5.0))
        * Mat4::from_scale(Vec3::splat(scale));

    BatchLayerState::new(
        positions,
        IndexBuffer {
            buffer: index_buffer,
            num_items: indices.len() as u32,
            format: wgpu::IndexFormat::Uint16,
        },
    )
    .with_decode_matrix(decode)
}

fn shadow_matrices() -> (Mat4, Mat4) {
    let view = Mat4::look_at_rh(Vec3::new(0.0, 20.0, 0.1), Vec3::ZERO, Vec3::Y);
    let proj = Mat4::orthographic_rh(-10.0, 10.0, -10.0, 10.0, 0.1, 40.0);
    (view, proj)
}

/// GPU resources tied to one `wgpu::Device`. Rebuilt wholesale after a
/// device loss.
struct Gpu {
    context: ShadowContext,
    device: WgpuShadowDevice,
    shadow_map: ShadowMap,
    layers: [BatchLayerState<wgpu::Buffer>; 2],
}

impl Gpu {
    fn new(settings: &ShadowSettings) -> Result<Self, ContextError> {
        let context = pollster::block_on(ShadowContext::new_headless())?;
        let device = WgpuShadowDevice::new(&context, settings);
        let shadow_map = ShadowMap::new(context.device(), settings.shadow_map_size);
        let layers = [
            quad_layer(context.device(), 0.0),
            quad_layer(context.device(), 2.0),
        ];

        Ok(Self {
            context,
            device,
            shadow_map,
            layers,
        })
    }
}

fn run() -> Result<(), ContextError> {
    let settings = ShadowSettings::load_from_path(SETTINGS_PATH);
    let mut gpu = Gpu::new(&settings)?;

    let mut config = SceneConfig::new()
        .with_section_planes([SectionPlane::new(Vec3::ZERO, Vec3::X)]);

    let (view, proj) = shadow_matrices();
    let mut frame = FrameContext::new(view, proj);
    let mut renderer = BatchingShadowRenderer::new(&mut gpu.device, &config);

    for frame_index in 0..3 {
        if frame_index == 2 {
            // A second plane changes the shader shape; the renderer rebuilds
            // on its next draw.
            config
                .section_planes
                .push(SectionPlane::new(Vec3::ZERO, Vec3::NEG_Z));
        }

        if gpu.context.take_device_lost() {
            log::warn!("Device lost, recreating GPU resources");
            renderer.on_device_context_lost();
            gpu = Gpu::new(&settings)?;
        }

        frame.begin_frame(view, proj);
        for layer in &gpu.layers {
            renderer.draw_layer(&mut gpu.device, &config, &mut frame, layer);
        }

        if let Some(err) = renderer.errors() {
            log::error!("Shadow layer disabled: {err}");
        }

        let mut encoder =
            gpu.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("ShadowEncoder"),
                });
        let draws = gpu.device.pending_draws();
        gpu.device.encode_pass(&mut encoder, &gpu.shadow_map);
        gpu.context.queue().submit(Some(encoder.finish()));

        log::info!(
            "Frame {}: {} shadow draws with program {:?}",
            frame_index,
            draws,
            renderer.program_id()
        );
    }

    renderer.destroy(&mut gpu.device);
    Ok(())
}

fn main() {
    batch_shadow::init_logging();
    log::info!("Starting headless batch shadow demo");

    if let Err(err) = run() {
        log::error!("Shadow demo failed: {err}");
        eprintln!("Application error: {err}");
    }

    log::info!("Shutdown complete");
}
