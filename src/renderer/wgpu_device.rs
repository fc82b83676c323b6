// renderer/wgpu_device.rs

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;
use glam::{Mat4, Vec3};

use crate::renderer::internal::{FallbackAttributes, UniformRing};
use crate::renderer::shader_source::ATTRIBUTE_SLOTS;
use crate::renderer::uniforms::uniform_block_size;
use crate::renderer::{
    AttributeLocation, PipelineBuilder, ProgramError, ShaderSource, ShadowContext, ShadowDevice,
    ShadowMap, UniformLocation,
};
use crate::settings::ShadowSettings;

bitflags! {
    /// Attribute slots fed from a real per-vertex buffer (as opposed to a
    /// fallback constant).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct AttributeMask: u8 {
        const POSITION = 1 << 0;
        const COLOR = 1 << 1;
        const FLAGS = 1 << 2;
        const FLAGS2 = 1 << 3;
        const OFFSET = 1 << 4;
    }
}

impl AttributeMask {
    fn for_location(location: u32) -> Self {
        Self::from_bits_truncate(1 << location)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    per_vertex: AttributeMask,
    topology: wgpu::PrimitiveTopology,
    strip_index_format: Option<wgpu::IndexFormat>,
}

impl PipelineKey {
    fn new(
        per_vertex: AttributeMask,
        topology: wgpu::PrimitiveTopology,
        format: wgpu::IndexFormat,
    ) -> Self {
        Self {
            per_vertex,
            topology,
            strip_index_format: topology.is_strip().then_some(format),
        }
    }
}

/// A compiled shadow shader module plus the layout it declared.
#[derive(Clone)]
pub struct WgpuProgram {
    serial: u64,
    module: wgpu::ShaderModule,
    source: Arc<ShaderSource>,
}

impl WgpuProgram {
    pub fn label(&self) -> &str {
        &self.source.label
    }
}

struct DrawCommand {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    uniform_offset: u32,
    vertex_buffers: Vec<wgpu::Buffer>,
    index_buffer: wgpu::Buffer,
    index_format: wgpu::IndexFormat,
    index_count: u32,
}

/// [`ShadowDevice`] on top of wgpu.
///
/// wgpu has no immediate-mode program state, so this keeps one: the active
/// program, a CPU copy of its uniform block and the bound buffers. Each
/// `draw_elements` snapshots that state into a recorded command (uniforms go
/// to their own slot of a ring buffer) and [`encode_pass`](Self::encode_pass)
/// replays the commands, in order, into one depth-only render pass.
///
/// Bound to a single `wgpu::Device`. After a device loss every program,
/// pipeline and buffer it holds is dead: signal the renderers with
/// `on_device_context_lost` and build a new [`ShadowContext`] and
/// `WgpuShadowDevice` (and the layer buffers) before drawing again.
pub struct WgpuShadowDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    settings: ShadowSettings,
    bind_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniforms: UniformRing,
    fallback: FallbackAttributes,
    pipelines: HashMap<(u64, PipelineKey), wgpu::RenderPipeline>,
    next_serial: u64,
    current: Option<WgpuProgram>,
    block: Vec<u8>,
    attributes: [Option<wgpu::Buffer>; ATTRIBUTE_SLOTS],
    index_buffer: Option<wgpu::Buffer>,
    commands: Vec<DrawCommand>,
}

impl WgpuShadowDevice {
    pub fn new(context: &ShadowContext, settings: &ShadowSettings) -> Self {
        let device = context.device.clone();
        let queue = context.queue.clone();

        let bind_layout = UniformRing::bind_layout(&device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ShadowPipelineLayout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });

        let binding_limit = u64::from(device.limits().max_uniform_buffer_binding_size);
        let mut max_block = uniform_block_size(settings.max_section_planes as usize);
        if max_block > binding_limit {
            log::warn!(
                "{} section planes need a {}-byte uniform block, device allows {}; larger programs will be rejected",
                settings.max_section_planes,
                max_block,
                binding_limit
            );
            max_block = binding_limit;
        }
        let uniforms = UniformRing::new(
            &device,
            &bind_layout,
            max_block,
            settings.initial_uniform_slots,
        );
        let fallback = FallbackAttributes::new(&device);

        Self {
            device,
            queue,
            settings: settings.clone(),
            bind_layout,
            pipeline_layout,
            uniforms,
            fallback,
            pipelines: HashMap::new(),
            next_serial: 1,
            current: None,
            block: Vec::new(),
            attributes: Default::default(),
            index_buffer: None,
            commands: Vec::new(),
        }
    }

    /// Number of draws recorded since the last [`encode_pass`](Self::encode_pass).
    pub fn pending_draws(&self) -> usize {
        self.commands.len()
    }

    /// Clears `target` to the far plane and replays every recorded draw
    /// into it.
    pub fn encode_pass(&mut self, encoder: &mut wgpu::CommandEncoder, target: &ShadowMap) {
        let commands = std::mem::take(&mut self.commands);
        self.uniforms.reset();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ShadowPass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: target.view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for command in &commands {
            pass.set_pipeline(&command.pipeline);
            pass.set_bind_group(0, &command.bind_group, &[command.uniform_offset]);
            for (slot, buffer) in command.vertex_buffers.iter().enumerate() {
                pass.set_vertex_buffer(slot as u32, buffer.slice(..));
            }
            pass.set_index_buffer(command.index_buffer.slice(..), command.index_format);
            pass.draw_indexed(0..command.index_count, 0, 0..1);
        }

        log::debug!("Encoded shadow pass with {} draws", commands.len());
    }

    fn pipeline(&mut self, program: &WgpuProgram, key: PipelineKey) -> Option<wgpu::RenderPipeline> {
        if let Some(pipeline) = self.pipelines.get(&(program.serial, key)) {
            return Some(pipeline.clone());
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.build_pipeline(program, key);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!(
                "Failed to build shadow pipeline variant {:?} for `{}`: {}",
                key,
                program.label(),
                err
            );
            return None;
        }

        self.pipelines
            .insert((program.serial, key), pipeline.clone());
        Some(pipeline)
    }

    fn build_pipeline(&self, program: &WgpuProgram, key: PipelineKey) -> wgpu::RenderPipeline {
        let decls = &program.source.attributes;
        let attributes: Vec<[wgpu::VertexAttribute; 1]> = decls
            .iter()
            .map(|decl| {
                [wgpu::VertexAttribute {
                    format: decl.format,
                    offset: 0,
                    shader_location: decl.location,
                }]
            })
            .collect();

        let layouts = decls.iter().zip(&attributes).map(|(decl, attrs)| {
            let step_mode = if key.per_vertex.contains(AttributeMask::for_location(decl.location)) {
                wgpu::VertexStepMode::Vertex
            } else {
                wgpu::VertexStepMode::Instance
            };
            wgpu::VertexBufferLayout {
                array_stride: decl.format.size(),
                step_mode,
                attributes: attrs,
            }
        });

        let mut builder = PipelineBuilder::new(&self.device, &self.pipeline_layout, &program.module)
            .with_label(&program.source.label)
            .with_vertex_buffers(layouts)
            .with_topology(key.topology, key.strip_index_format)
            .with_depth_stencil_biased(
                ShadowMap::FORMAT,
                self.settings.depth_bias_constant,
                self.settings.depth_bias_slope,
            );
        if program.source.has_fragment_stage {
            builder = builder.with_fragment_entry("fs_main");
        }
        if !self.settings.cull_back_faces {
            builder = builder.with_no_culling();
        }
        builder.build()
    }

    fn write_block(&mut self, location: UniformLocation, bytes: &[u8]) {
        let start = location.0 as usize;
        let Some(dst) = self.block.get_mut(start..start + bytes.len()) else {
            log::warn!(
                "Uniform write at offset {} ({} bytes) outside the active block",
                start,
                bytes.len()
            );
            return;
        };
        dst.copy_from_slice(bytes);
    }
}

impl ShadowDevice for WgpuShadowDevice {
    type Program = WgpuProgram;
    type Buffer = wgpu::Buffer;

    fn create_program(&mut self, source: &ShaderSource) -> Result<WgpuProgram, ProgramError> {
        let limit = self.uniforms.slot_size();
        if source.uniform_block_size > limit {
            return Err(ProgramError::UniformBlockTooLarge {
                label: source.label.clone(),
                size: source.uniform_block_size,
                limit,
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(source.label.as_str()),
                source: wgpu::ShaderSource::Wgsl(source.wgsl.as_str().into()),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ProgramError::Compile {
                label: source.label.clone(),
                message: err.to_string(),
            });
        }

        let mut source = source.clone();
        source.attributes.sort_by_key(|decl| decl.location);

        let program = WgpuProgram {
            serial: self.next_serial,
            module,
            source: Arc::new(source),
        };
        self.next_serial += 1;

        // Build the all-per-vertex triangle variant up front so link errors
        // surface at allocation rather than at the first draw.
        let declared = program
            .source
            .attributes
            .iter()
            .fold(AttributeMask::empty(), |mask, decl| {
                mask | AttributeMask::for_location(decl.location)
            });
        let key = PipelineKey::new(
            declared,
            wgpu::PrimitiveTopology::TriangleList,
            wgpu::IndexFormat::Uint32,
        );
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.build_pipeline(&program, key);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ProgramError::Link {
                label: program.source.label.clone(),
                message: err.to_string(),
            });
        }
        self.pipelines.insert((program.serial, key), pipeline);

        log::info!(
            "Compiled shadow program #{} ({})",
            program.serial,
            program.label()
        );
        Ok(program)
    }

    fn destroy_program(&mut self, program: WgpuProgram) {
        self.pipelines.retain(|(serial, _), _| *serial != program.serial);
        if self
            .current
            .as_ref()
            .is_some_and(|current| current.serial == program.serial)
        {
            self.current = None;
            self.block.clear();
        }
        log::debug!("Destroyed shadow program #{}", program.serial);
    }

    fn uniform_location(&self, program: &WgpuProgram, name: &str) -> Option<UniformLocation> {
        program
            .source
            .uniform(name)
            .map(|decl| UniformLocation(decl.offset))
    }

    fn attribute_location(&self, program: &WgpuProgram, name: &str) -> Option<AttributeLocation> {
        program
            .source
            .attribute(name)
            .map(|decl| AttributeLocation(decl.location))
    }

    fn use_program(&mut self, program: &WgpuProgram) {
        self.block = vec![0; program.source.uniform_block_size as usize];
        self.current = Some(program.clone());
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4) {
        self.write_block(location, bytemuck::cast_slice(&value.to_cols_array()));
    }

    fn set_uniform_vec3(&mut self, location: UniformLocation, value: Vec3) {
        self.write_block(location, bytemuck::cast_slice(&value.to_array()));
    }

    fn set_uniform_bool(&mut self, location: UniformLocation, value: bool) {
        self.write_block(location, bytemuck::bytes_of(&u32::from(value)));
    }

    fn bind_attribute(&mut self, location: AttributeLocation, buffer: &wgpu::Buffer) {
        match self.attributes.get_mut(location.0 as usize) {
            Some(slot) => *slot = Some(buffer.clone()),
            None => log::warn!("Attribute location {} out of range", location.0),
        }
    }

    fn bind_index_buffer(&mut self, buffer: &wgpu::Buffer) {
        self.index_buffer = Some(buffer.clone());
    }

    fn draw_elements(
        &mut self,
        topology: wgpu::PrimitiveTopology,
        count: u32,
        format: wgpu::IndexFormat,
    ) {
        let bound = std::mem::take(&mut self.attributes);
        let index_buffer = self.index_buffer.take();

        let Some(program) = self.current.clone() else {
            log::warn!("draw_elements without an active shadow program");
            return;
        };
        let Some(index_buffer) = index_buffer else {
            log::warn!("draw_elements without a bound index buffer");
            return;
        };

        let mut per_vertex = AttributeMask::empty();
        let mut vertex_buffers = Vec::with_capacity(program.source.attributes.len());
        for decl in &program.source.attributes {
            let location = decl.location as usize;
            if let Some(buffer) = bound.get(location).and_then(Option::as_ref) {
                per_vertex |= AttributeMask::for_location(decl.location);
                vertex_buffers.push(buffer.clone());
            } else if let Some(buffer) = self.fallback.get(decl.location) {
                vertex_buffers.push(buffer.clone());
            } else {
                log::warn!(
                    "No buffer bound for attribute `{}` of `{}`, skipping draw",
                    decl.name,
                    program.label()
                );
                return;
            }
        }

        let key = PipelineKey::new(per_vertex, topology, format);
        let Some(pipeline) = self.pipeline(&program, key) else {
            return;
        };

        let (bind_group, uniform_offset) =
            self.uniforms
                .push(&self.device, &self.queue, &self.bind_layout, &self.block);

        self.commands.push(DrawCommand {
            pipeline,
            bind_group,
            uniform_offset,
            vertex_buffers,
            index_buffer,
            index_format: format,
            index_count: count,
        });
    }
}
