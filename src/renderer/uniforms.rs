// renderer/uniforms.rs
use std::mem;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Fixed head of the shadow uniform block. Section planes follow it as an
/// array of [`SectionPlaneUniform`].
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct ShadowUniformsHeader {
    pub positions_decode_matrix: [[f32; 4]; 4],
    pub shadow_view_matrix: [[f32; 4]; 4],
    pub shadow_proj_matrix: [[f32; 4]; 4],
}

impl ShadowUniformsHeader {
    pub const POSITIONS_DECODE_MATRIX_OFFSET: u32 =
        mem::offset_of!(ShadowUniformsHeader, positions_decode_matrix) as u32;
    pub const SHADOW_VIEW_MATRIX_OFFSET: u32 =
        mem::offset_of!(ShadowUniformsHeader, shadow_view_matrix) as u32;
    pub const SHADOW_PROJ_MATRIX_OFFSET: u32 =
        mem::offset_of!(ShadowUniformsHeader, shadow_proj_matrix) as u32;
    pub const SIZE: u32 = mem::size_of::<ShadowUniformsHeader>() as u32;

    pub fn new() -> Self {
        Self {
            positions_decode_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            shadow_view_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            shadow_proj_matrix: Mat4::IDENTITY.to_cols_array_2d(),
        }
    }
}

impl Default for ShadowUniformsHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Mirrors the WGSL `SectionPlane` struct: `vec3` + `u32`, `vec3` + pad.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, PartialEq, Debug)]
pub struct SectionPlaneUniform {
    pub pos: [f32; 3],
    pub enabled: u32,
    pub dir: [f32; 3],
    pub _padding: f32,
}

impl SectionPlaneUniform {
    pub const POS_OFFSET: u32 = mem::offset_of!(SectionPlaneUniform, pos) as u32;
    pub const ENABLED_OFFSET: u32 = mem::offset_of!(SectionPlaneUniform, enabled) as u32;
    pub const DIR_OFFSET: u32 = mem::offset_of!(SectionPlaneUniform, dir) as u32;
    pub const STRIDE: u32 = mem::size_of::<SectionPlaneUniform>() as u32;
}

/// Byte offset of section plane `index` inside the uniform block.
pub fn section_plane_offset(index: usize) -> u64 {
    u64::from(ShadowUniformsHeader::SIZE) + index as u64 * u64::from(SectionPlaneUniform::STRIDE)
}

/// Total block size for a shader declaring `plane_count` planes.
pub fn uniform_block_size(plane_count: usize) -> u64 {
    section_plane_offset(plane_count)
}
