use std::collections::HashSet;

use batch_shadow::renderer::shader_source::{POSITION, POSITIONS_DECODE_MATRIX};
use batch_shadow::renderer::{
    AttributeLocation, BatchingShadowShaderSource, ProgramError, ShaderSource,
    ShaderSourceProvider, UniformLocation,
};
use batch_shadow::{
    BatchLayerState, BatchingShadowRenderer, FrameContext, IndexBuffer, SceneConfig, SectionPlane,
    ShadowDevice,
};
use glam::{Mat4, Vec3};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    CreateProgram(u32),
    DestroyProgram(u32),
    UseProgram(u32),
    Mat4(UniformLocation, Mat4),
    Vec3(UniformLocation, Vec3),
    Bool(UniformLocation, bool),
    BindAttribute(AttributeLocation, &'static str),
    BindIndex(&'static str),
    Draw(wgpu::PrimitiveTopology, u32, wgpu::IndexFormat),
}

struct TestProgram {
    handle: u32,
    source: ShaderSource,
}

/// Records every call; resolves locations from the declared layout.
#[derive(Default)]
struct RecordingDevice {
    calls: Vec<Call>,
    next_handle: u32,
    live: HashSet<u32>,
    fail_compile: bool,
}

impl RecordingDevice {
    fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    fn creates(&self) -> usize {
        self.count(|call| matches!(call, Call::CreateProgram(_)))
    }

    fn destroys(&self) -> usize {
        self.count(|call| matches!(call, Call::DestroyProgram(_)))
    }

    fn activations(&self) -> usize {
        self.count(|call| matches!(call, Call::UseProgram(_)))
    }

    fn draws(&self) -> usize {
        self.count(|call| matches!(call, Call::Draw(..)))
    }

    fn bound_buffers(&self) -> Vec<&'static str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::BindAttribute(_, name) => Some(*name),
                _ => None,
            })
            .collect()
    }
}

impl ShadowDevice for RecordingDevice {
    type Program = TestProgram;
    type Buffer = &'static str;

    fn create_program(&mut self, source: &ShaderSource) -> Result<TestProgram, ProgramError> {
        if self.fail_compile {
            return Err(ProgramError::Compile {
                label: source.label.clone(),
                message: "simulated compile error".to_owned(),
            });
        }
        self.next_handle += 1;
        let handle = self.next_handle;
        self.live.insert(handle);
        self.calls.push(Call::CreateProgram(handle));
        Ok(TestProgram {
            handle,
            source: source.clone(),
        })
    }

    fn destroy_program(&mut self, program: TestProgram) {
        assert!(
            self.live.remove(&program.handle),
            "program {} released twice",
            program.handle
        );
        self.calls.push(Call::DestroyProgram(program.handle));
    }

    fn uniform_location(&self, program: &TestProgram, name: &str) -> Option<UniformLocation> {
        program
            .source
            .uniform(name)
            .map(|decl| UniformLocation(decl.offset))
    }

    fn attribute_location(&self, program: &TestProgram, name: &str) -> Option<AttributeLocation> {
        program
            .source
            .attribute(name)
            .map(|decl| AttributeLocation(decl.location))
    }

    fn use_program(&mut self, program: &TestProgram) {
        self.calls.push(Call::UseProgram(program.handle));
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4) {
        self.calls.push(Call::Mat4(location, *value));
    }

    fn set_uniform_vec3(&mut self, location: UniformLocation, value: Vec3) {
        self.calls.push(Call::Vec3(location, value));
    }

    fn set_uniform_bool(&mut self, location: UniformLocation, value: bool) {
        self.calls.push(Call::Bool(location, value));
    }

    fn bind_attribute(&mut self, location: AttributeLocation, buffer: &&'static str) {
        self.calls.push(Call::BindAttribute(location, *buffer));
    }

    fn bind_index_buffer(&mut self, buffer: &&'static str) {
        self.calls.push(Call::BindIndex(*buffer));
    }

    fn draw_elements(
        &mut self,
        topology: wgpu::PrimitiveTopology,
        count: u32,
        format: wgpu::IndexFormat,
    ) {
        self.calls.push(Call::Draw(topology, count, format));
    }
}

fn layer() -> BatchLayerState<&'static str> {
    BatchLayerState::new(
        "positions",
        IndexBuffer {
            buffer: "indices",
            num_items: 36,
            format: wgpu::IndexFormat::Uint32,
        },
    )
}

fn planes(count: usize) -> SceneConfig {
    SceneConfig::new().with_section_planes(
        (0..count).map(|i| SectionPlane::new(Vec3::new(i as f32, 0.0, 0.0), Vec3::X)),
    )
}

fn frame() -> FrameContext {
    FrameContext::new(
        Mat4::from_translation(Vec3::new(0.0, -10.0, 0.0)),
        Mat4::orthographic_rh(-5.0, 5.0, -5.0, 5.0, 0.1, 20.0),
    )
}

#[test]
fn draws_from_one_renderer_activate_once() {
    let mut device = RecordingDevice::default();
    let config = planes(1);
    let mut frame = frame();
    let mut renderer = BatchingShadowRenderer::new(&mut device, &config);

    assert_eq!(frame.last_program_id, None);
    for _ in 0..4 {
        renderer.draw_layer(&mut device, &config, &mut frame, &layer());
    }

    assert_eq!(device.activations(), 1);
    assert_eq!(device.draws(), 4);
    assert_eq!(frame.last_program_id, renderer.program_id());

    renderer.destroy(&mut device);
}

#[test]
fn sibling_renderer_forces_reactivation() {
    let mut device = RecordingDevice::default();
    let config = planes(0);
    let mut frame = frame();
    let mut first = BatchingShadowRenderer::new(&mut device, &config);
    let mut second = BatchingShadowRenderer::new(&mut device, &config);
    assert_ne!(first.program_id(), second.program_id());

    first.draw_layer(&mut device, &config, &mut frame, &layer());
    first.draw_layer(&mut device, &config, &mut frame, &layer());
    second.draw_layer(&mut device, &config, &mut frame, &layer());
    second.draw_layer(&mut device, &config, &mut frame, &layer());
    first.draw_layer(&mut device, &config, &mut frame, &layer());

    assert_eq!(device.activations(), 3);
    assert_eq!(frame.last_program_id, first.program_id());

    first.destroy(&mut device);
    second.destroy(&mut device);
}

#[test]
fn new_frame_rebinds_with_fresh_matrices() {
    let mut device = RecordingDevice::default();
    let config = planes(0);
    let mut frame = frame();
    let mut renderer = BatchingShadowRenderer::new(&mut device, &config);

    renderer.draw_layer(&mut device, &config, &mut frame, &layer());
    let view = Mat4::from_rotation_x(0.5);
    frame.begin_frame(view, Mat4::IDENTITY);
    renderer.draw_layer(&mut device, &config, &mut frame, &layer());

    assert_eq!(device.activations(), 2);
    assert!(device
        .calls
        .iter()
        .any(|call| matches!(call, Call::Mat4(_, value) if *value == view)));

    renderer.destroy(&mut device);
}

#[test]
fn frame_uniforms_follow_plane_order() {
    let mut device = RecordingDevice::default();
    let mut config = planes(2);
    config.section_planes[1].active = false;
    let frame_ctx = frame();
    let mut frame = frame_ctx.clone();
    let mut renderer = BatchingShadowRenderer::new(&mut device, &config);
    device.calls.clear();

    renderer.draw_layer(&mut device, &config, &mut frame, &layer());

    let source = BatchingShadowShaderSource.source(&config);
    let location = |name: &str| UniformLocation(source.uniform(name).unwrap().offset);
    let plane0 = config.section_planes[0];
    let plane1 = config.section_planes[1];

    let expected = [
        Call::Mat4(location("shadowViewMatrix"), frame_ctx.shadow_view_matrix),
        Call::Mat4(location("shadowProjMatrix"), frame_ctx.shadow_proj_matrix),
        Call::Bool(location("sectionPlaneActive0"), true),
        Call::Vec3(location("sectionPlanePos0"), plane0.pos),
        Call::Vec3(location("sectionPlaneDir0"), plane0.dir),
        Call::Bool(location("sectionPlaneActive1"), false),
        Call::Vec3(location("sectionPlanePos1"), plane1.pos),
        Call::Vec3(location("sectionPlaneDir1"), plane1.dir),
        Call::Mat4(location(POSITIONS_DECODE_MATRIX), Mat4::IDENTITY),
    ];
    assert!(matches!(device.calls[0], Call::UseProgram(_)));
    assert_eq!(&device.calls[1..=expected.len()], &expected);

    renderer.destroy(&mut device);
}

#[test]
fn decode_matrix_is_uploaded_on_every_draw() {
    let mut device = RecordingDevice::default();
    let config = planes(0);
    let mut frame = frame();
    let mut renderer = BatchingShadowRenderer::new(&mut device, &config);

    let a = layer().with_decode_matrix(Mat4::from_scale(Vec3::splat(2.0)));
    let b = layer().with_decode_matrix(Mat4::from_scale(Vec3::splat(4.0)));
    renderer.draw_layer(&mut device, &config, &mut frame, &a);
    renderer.draw_layer(&mut device, &config, &mut frame, &b);

    let decode_uploads: Vec<Mat4> = device
        .calls
        .iter()
        .filter_map(|call| match call {
            Call::Mat4(UniformLocation(0), value) => Some(*value),
            _ => None,
        })
        .collect();
    assert_eq!(
        decode_uploads,
        vec![a.positions_decode_matrix, b.positions_decode_matrix]
    );
    assert_eq!(device.activations(), 1);

    renderer.destroy(&mut device);
}

#[test]
fn draw_binds_layer_buffers_and_issues_indexed_draw() {
    let mut device = RecordingDevice::default();
    let config = planes(1).with_entity_offsets(true);
    let mut frame = frame();
    let mut renderer = BatchingShadowRenderer::new(&mut device, &config);

    let full = layer()
        .with_colors("colors")
        .with_flags("flags")
        .with_flags2("flags2")
        .with_offsets("offsets")
        .with_primitive(wgpu::PrimitiveTopology::LineList);
    renderer.draw_layer(&mut device, &config, &mut frame, &full);

    assert_eq!(
        device.bound_buffers(),
        vec!["positions", "colors", "flags", "flags2", "offsets"]
    );
    let tail = &device.calls[device.calls.len() - 2..];
    assert_eq!(
        tail,
        &[
            Call::BindIndex("indices"),
            Call::Draw(
                wgpu::PrimitiveTopology::LineList,
                36,
                wgpu::IndexFormat::Uint32
            ),
        ]
    );

    renderer.destroy(&mut device);
}

#[test]
fn missing_color_buffer_is_not_bound() {
    let mut device = RecordingDevice::default();
    let config = planes(0);
    let mut frame = frame();
    let mut renderer = BatchingShadowRenderer::new(&mut device, &config);
    let attributes = *renderer.program().unwrap().attributes();
    assert!(attributes.color.is_some());

    renderer.draw_layer(&mut device, &config, &mut frame, &layer().with_flags("flags"));

    assert_eq!(device.bound_buffers(), vec!["positions", "flags"]);
    assert_eq!(device.draws(), 1);

    renderer.destroy(&mut device);
}

#[test]
fn buffers_without_resolved_location_are_skipped() {
    let mut device = RecordingDevice::default();
    // No planes: the shader declares no flags2; no offsets toggle: no offset.
    let config = planes(0);
    let mut frame = frame();
    let mut renderer = BatchingShadowRenderer::new(&mut device, &config);
    let attributes = *renderer.program().unwrap().attributes();
    assert_eq!(attributes.flags2, None);
    assert_eq!(attributes.offset, None);

    let layer = layer().with_flags2("flags2").with_offsets("offsets");
    renderer.draw_layer(&mut device, &config, &mut frame, &layer);

    assert_eq!(device.bound_buffers(), vec!["positions"]);
    assert_eq!(device.draws(), 1);

    renderer.destroy(&mut device);
}

#[test]
fn plane_count_change_rebuilds_and_releases_old_program() {
    let mut device = RecordingDevice::default();
    let mut config = planes(1);
    let mut frame = frame();
    let mut renderer = BatchingShadowRenderer::new(&mut device, &config);
    renderer.draw_layer(&mut device, &config, &mut frame, &layer());
    let old_id = renderer.program_id();

    config
        .section_planes
        .push(SectionPlane::new(Vec3::ZERO, Vec3::Y));
    assert!(!renderer.is_valid(&config));

    device.calls.clear();
    renderer.draw_layer(&mut device, &config, &mut frame, &layer());

    assert_eq!(
        &device.calls[..3],
        &[
            Call::CreateProgram(2),
            Call::DestroyProgram(1),
            Call::UseProgram(2)
        ]
    );
    assert_ne!(renderer.program_id(), old_id);
    assert!(renderer.is_valid(&config));
    assert_eq!(
        renderer.program().unwrap().uniforms().section_planes.len(),
        2
    );
    assert_eq!(device.draws(), 1);
    assert_eq!(device.live.len(), 1);

    renderer.destroy(&mut device);
}

#[test]
fn plane_value_change_keeps_program() {
    let mut device = RecordingDevice::default();
    let mut config = planes(2);
    let mut frame = frame();
    let mut renderer = BatchingShadowRenderer::new(&mut device, &config);
    renderer.draw_layer(&mut device, &config, &mut frame, &layer());

    config.section_planes[0].pos = Vec3::new(3.0, 2.0, 1.0);
    config.section_planes[1].dir = Vec3::NEG_Y;
    config.section_planes[1].active = false;
    renderer.draw_layer(&mut device, &config, &mut frame, &layer());

    assert!(renderer.is_valid(&config));
    assert_eq!(device.creates(), 1);
    assert_eq!(device.destroys(), 0);

    renderer.destroy(&mut device);
}

#[test]
fn context_loss_rebuilds_without_releasing_lost_program() {
    let mut device = RecordingDevice::default();
    let config = planes(1);
    let mut frame = frame();
    let mut renderer = BatchingShadowRenderer::new(&mut device, &config);
    renderer.draw_layer(&mut device, &config, &mut frame, &layer());
    let lost_id = renderer.program_id();

    renderer.on_device_context_lost();
    assert!(renderer.program_id().is_none());
    assert!(!renderer.is_valid(&config));

    device.calls.clear();
    renderer.draw_layer(&mut device, &config, &mut frame, &layer());
    renderer.draw_layer(&mut device, &config, &mut frame, &layer());

    assert_eq!(device.creates(), 1);
    assert_eq!(device.destroys(), 0);
    assert_eq!(device.activations(), 1);
    assert_eq!(device.draws(), 2);
    assert_ne!(renderer.program_id(), lost_id);

    // The lost handle was never released.
    assert!(device.live.contains(&1));
    renderer.destroy(&mut device);
}

#[test]
fn compile_failure_is_sticky_until_retried() {
    let mut device = RecordingDevice {
        fail_compile: true,
        ..Default::default()
    };
    let config = planes(1);
    let mut frame = frame();
    let mut renderer = BatchingShadowRenderer::new(&mut device, &config);

    assert!(matches!(
        renderer.errors(),
        Some(ProgramError::Compile { .. })
    ));
    assert!(renderer.program_id().is_none());

    device.fail_compile = false;
    for _ in 0..3 {
        renderer.draw_layer(&mut device, &config, &mut frame, &layer());
    }
    assert!(device.calls.is_empty());
    assert_eq!(frame.last_program_id, None);

    renderer.reallocate(&mut device, &config);
    assert!(renderer.errors().is_none());
    renderer.draw_layer(&mut device, &config, &mut frame, &layer());
    assert_eq!(device.creates(), 1);
    assert_eq!(device.draws(), 1);

    renderer.destroy(&mut device);
}

fn failed_renderer(
    device: &mut RecordingDevice,
    config: &SceneConfig,
) -> BatchingShadowRenderer<RecordingDevice> {
    device.fail_compile = true;
    let renderer = BatchingShadowRenderer::new(device, config);
    assert!(renderer.errors().is_some());
    device.fail_compile = false;
    renderer
}

#[test]
fn context_loss_clears_compile_failure() {
    let mut device = RecordingDevice::default();
    let config = planes(1);
    let mut frame = frame();
    let mut renderer = failed_renderer(&mut device, &config);

    renderer.on_device_context_lost();
    assert!(renderer.errors().is_none());
    assert!(device.calls.is_empty());

    renderer.draw_layer(&mut device, &config, &mut frame, &layer());

    assert_eq!(device.creates(), 1);
    assert_eq!(device.destroys(), 0);
    assert_eq!(device.draws(), 1);
    assert!(renderer.is_valid(&config));

    renderer.destroy(&mut device);
}

#[test]
fn destroy_clears_compile_failure() {
    let mut device = RecordingDevice::default();
    let config = planes(1);
    let mut frame = frame();
    let mut renderer = failed_renderer(&mut device, &config);

    renderer.destroy(&mut device);
    assert!(renderer.errors().is_none());
    assert_eq!(device.destroys(), 0);

    renderer.draw_layer(&mut device, &config, &mut frame, &layer());

    assert_eq!(device.creates(), 1);
    assert_eq!(device.draws(), 1);
    assert!(renderer.is_valid(&config));

    renderer.destroy(&mut device);
    assert!(device.live.is_empty());
}

#[test]
fn failed_rebuild_releases_previous_program() {
    let mut device = RecordingDevice::default();
    let mut config = planes(0);
    let mut frame = frame();
    let mut renderer = BatchingShadowRenderer::new(&mut device, &config);

    config = planes(3);
    device.fail_compile = true;
    renderer.draw_layer(&mut device, &config, &mut frame, &layer());

    assert!(renderer.errors().is_some());
    assert!(renderer.program_id().is_none());
    assert_eq!(device.destroys(), 1);
    assert!(device.live.is_empty());
    assert_eq!(device.draws(), 0);
}

#[test]
fn destroy_is_idempotent() {
    let mut device = RecordingDevice::default();
    let config = planes(1);
    let mut renderer = BatchingShadowRenderer::new(&mut device, &config);

    renderer.destroy(&mut device);
    renderer.destroy(&mut device);

    assert_eq!(device.destroys(), 1);
    assert!(device.live.is_empty());
    assert!(renderer.program_id().is_none());
}

#[test]
fn destroyed_renderer_rebuilds_on_next_draw() {
    let mut device = RecordingDevice::default();
    let config = planes(0);
    let mut frame = frame();
    let mut renderer = BatchingShadowRenderer::new(&mut device, &config);
    renderer.destroy(&mut device);

    renderer.draw_layer(&mut device, &config, &mut frame, &layer());

    assert_eq!(device.creates(), 2);
    assert_eq!(device.draws(), 1);
    renderer.destroy(&mut device);
}

/// Produces a layout without the mandatory `position` attribute.
struct NoPositionSource;

impl ShaderSourceProvider for NoPositionSource {
    fn source(&self, config: &SceneConfig) -> ShaderSource {
        let mut source = BatchingShadowShaderSource.source(config);
        source.attributes.retain(|decl| decl.name != POSITION);
        source
    }
}

#[test]
fn missing_position_attribute_fails_allocation() {
    let mut device = RecordingDevice::default();
    let config = planes(0);
    let mut frame = frame();
    let mut renderer =
        BatchingShadowRenderer::with_shader_source(NoPositionSource, &mut device, &config);

    assert!(matches!(
        renderer.errors(),
        Some(ProgramError::MissingAttribute { name, .. }) if *name == POSITION
    ));
    // The half-built program was released immediately.
    assert_eq!(device.creates(), 1);
    assert_eq!(device.destroys(), 1);

    renderer.draw_layer(&mut device, &config, &mut frame, &layer());
    assert_eq!(device.draws(), 0);
}
