// renderer/shader_source.rs

use std::fmt::Write as _;

use crate::renderer::uniforms::{
    section_plane_offset, uniform_block_size, SectionPlaneUniform, ShadowUniformsHeader,
};
use crate::scene::SceneConfig;

pub const POSITION: &str = "position";
pub const COLOR: &str = "color";
pub const FLAGS: &str = "flags";
pub const FLAGS2: &str = "flags2";
pub const OFFSET: &str = "offset";

pub const POSITIONS_DECODE_MATRIX: &str = "positionsDecodeMatrix";
pub const SHADOW_VIEW_MATRIX: &str = "shadowViewMatrix";
pub const SHADOW_PROJ_MATRIX: &str = "shadowProjMatrix";

pub fn section_plane_active(index: usize) -> String {
    format!("sectionPlaneActive{index}")
}

pub fn section_plane_pos(index: usize) -> String {
    format!("sectionPlanePos{index}")
}

pub fn section_plane_dir(index: usize) -> String {
    format!("sectionPlaneDir{index}")
}

/// Number of vertex attribute slots a shadow shader may declare.
pub const ATTRIBUTE_SLOTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    /// Byte offset inside the uniform block.
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    pub name: &'static str,
    pub location: u32,
    pub format: wgpu::VertexFormat,
}

/// Shader text together with the binding layout it declares.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderSource {
    pub label: String,
    pub wgsl: String,
    pub uniforms: Vec<UniformDecl>,
    pub attributes: Vec<AttributeDecl>,
    pub uniform_block_size: u64,
    /// `false` for a depth-only program with no fragment entry point.
    pub has_fragment_stage: bool,
}

impl ShaderSource {
    pub fn uniform(&self, name: &str) -> Option<&UniformDecl> {
        self.uniforms.iter().find(|decl| decl.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.attributes.iter().find(|decl| decl.name == name)
    }
}

/// Produces shader source for a scene configuration. Must be a pure
/// function of the configuration's shape.
pub trait ShaderSourceProvider {
    fn source(&self, config: &SceneConfig) -> ShaderSource;
}

/// WGSL source for drawing batched geometry into a shadow map.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchingShadowShaderSource;

impl BatchingShadowShaderSource {
    pub fn new() -> Self {
        Self
    }

    fn uniforms(plane_count: usize) -> Vec<UniformDecl> {
        let mut uniforms = vec![
            UniformDecl {
                name: POSITIONS_DECODE_MATRIX.to_owned(),
                offset: ShadowUniformsHeader::POSITIONS_DECODE_MATRIX_OFFSET,
            },
            UniformDecl {
                name: SHADOW_VIEW_MATRIX.to_owned(),
                offset: ShadowUniformsHeader::SHADOW_VIEW_MATRIX_OFFSET,
            },
            UniformDecl {
                name: SHADOW_PROJ_MATRIX.to_owned(),
                offset: ShadowUniformsHeader::SHADOW_PROJ_MATRIX_OFFSET,
            },
        ];

        for index in 0..plane_count {
            // Blocks this large never fit a uniform slot and are rejected
            // when the program is created.
            let base = u32::try_from(section_plane_offset(index)).unwrap_or(u32::MAX);
            uniforms.push(UniformDecl {
                name: section_plane_active(index),
                offset: base.saturating_add(SectionPlaneUniform::ENABLED_OFFSET),
            });
            uniforms.push(UniformDecl {
                name: section_plane_pos(index),
                offset: base.saturating_add(SectionPlaneUniform::POS_OFFSET),
            });
            uniforms.push(UniformDecl {
                name: section_plane_dir(index),
                offset: base.saturating_add(SectionPlaneUniform::DIR_OFFSET),
            });
        }

        uniforms
    }

    fn attributes(clipping: bool, offsets: bool) -> Vec<AttributeDecl> {
        let mut attributes = vec![
            AttributeDecl {
                name: POSITION,
                location: 0,
                format: wgpu::VertexFormat::Uint16x4,
            },
            AttributeDecl {
                name: COLOR,
                location: 1,
                format: wgpu::VertexFormat::Unorm8x4,
            },
            AttributeDecl {
                name: FLAGS,
                location: 2,
                format: wgpu::VertexFormat::Uint8x4,
            },
        ];
        if clipping {
            attributes.push(AttributeDecl {
                name: FLAGS2,
                location: 3,
                format: wgpu::VertexFormat::Uint8x4,
            });
        }
        if offsets {
            attributes.push(AttributeDecl {
                name: OFFSET,
                location: 4,
                format: wgpu::VertexFormat::Float32x3,
            });
        }
        attributes
    }

    fn wgsl(plane_count: usize, offsets: bool) -> String {
        let clipping = plane_count > 0;
        let mut src = String::with_capacity(2048);

        src.push_str(
            "struct SectionPlane {\n    pos: vec3<f32>,\n    enabled: u32,\n    dir: vec3<f32>,\n    _padding: f32,\n};\n\n",
        );
        src.push_str("struct ShadowUniforms {\n");
        src.push_str("    positions_decode_matrix: mat4x4<f32>,\n");
        src.push_str("    shadow_view_matrix: mat4x4<f32>,\n");
        src.push_str("    shadow_proj_matrix: mat4x4<f32>,\n");
        if clipping {
            let _ = writeln!(src, "    section_planes: array<SectionPlane, {plane_count}>,");
        }
        src.push_str("};\n\n");
        src.push_str("@group(0) @binding(0) var<uniform> shadow: ShadowUniforms;\n\n");

        src.push_str("struct VertexInput {\n");
        src.push_str("    @location(0) position: vec4<u32>,\n");
        src.push_str("    @location(1) color: vec4<f32>,\n");
        src.push_str("    @location(2) flags: vec4<u32>,\n");
        if clipping {
            src.push_str("    @location(3) flags2: vec4<u32>,\n");
        }
        if offsets {
            src.push_str("    @location(4) offset: vec3<f32>,\n");
        }
        src.push_str("};\n\n");

        src.push_str("struct VertexOutput {\n");
        src.push_str("    @builtin(position) clip_position: vec4<f32>,\n");
        if clipping {
            src.push_str("    @location(0) world_position: vec3<f32>,\n");
            src.push_str("    @location(1) @interpolate(flat) clippable: u32,\n");
        }
        src.push_str("};\n\n");

        // Vertices of hidden or transparent entities are pushed outside the
        // clip volume so they never reach the depth buffer.
        src.push_str("@vertex\nfn vs_main(input: VertexInput) -> VertexOutput {\n");
        src.push_str("    var out: VertexOutput;\n");
        src.push_str("    if (input.flags.x == 0u || input.color.a < 1.0) {\n");
        src.push_str("        out.clip_position = vec4<f32>(3.0, 3.0, 3.0, 1.0);\n");
        src.push_str("        return out;\n");
        src.push_str("    }\n");
        src.push_str(
            "    var world = shadow.positions_decode_matrix * vec4<f32>(vec3<f32>(input.position.xyz), 1.0);\n",
        );
        if offsets {
            src.push_str("    world = vec4<f32>(world.xyz + input.offset, world.w);\n");
        }
        src.push_str(
            "    out.clip_position = shadow.shadow_proj_matrix * (shadow.shadow_view_matrix * world);\n",
        );
        if clipping {
            src.push_str("    out.world_position = world.xyz;\n");
            src.push_str("    out.clippable = input.flags2.x;\n");
        }
        src.push_str("    return out;\n}\n");

        if clipping {
            src.push_str("\n@fragment\nfn fs_main(input: VertexOutput) {\n");
            src.push_str("    if (input.clippable > 0u) {\n");
            src.push_str("        var dist = 0.0;\n");
            let _ = writeln!(
                src,
                "        for (var i = 0u; i < {plane_count}u; i = i + 1u) {{"
            );
            src.push_str("            let section = shadow.section_planes[i];\n");
            src.push_str("            if (section.enabled != 0u) {\n");
            src.push_str(
                "                dist = max(dist, dot(-section.dir, input.world_position - section.pos));\n",
            );
            src.push_str("            }\n");
            src.push_str("        }\n");
            src.push_str("        if (dist > 0.0) {\n");
            src.push_str("            discard;\n");
            src.push_str("        }\n");
            src.push_str("    }\n}\n");
        }

        src
    }
}

impl ShaderSourceProvider for BatchingShadowShaderSource {
    fn source(&self, config: &SceneConfig) -> ShaderSource {
        let plane_count = config.section_plane_count();
        let offsets = config.entity_offsets_enabled;

        ShaderSource {
            label: format!("BatchingShadowShader[planes={plane_count},offsets={offsets}]"),
            wgsl: Self::wgsl(plane_count, offsets),
            uniforms: Self::uniforms(plane_count),
            attributes: Self::attributes(plane_count > 0, offsets),
            uniform_block_size: uniform_block_size(plane_count),
            has_fragment_stage: plane_count > 0,
        }
    }
}
