// renderer/device.rs

use glam::{Mat4, Vec3};

use crate::renderer::{ProgramError, ShaderSource};

/// Resolved uniform slot. For the wgpu backend this is a byte offset into
/// the program's uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Resolved vertex attribute slot (shader location).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeLocation(pub u32);

/// Immediate-mode GPU surface the shadow renderer draws through.
///
/// Calls are issued in order on a single thread; state set by one call
/// (active program, uniform values, bound buffers) is visible to the next
/// `draw_elements`. Attribute bindings are consumed by `draw_elements`, so
/// an attribute that is not bound before a draw is treated as unbound.
pub trait ShadowDevice {
    type Program;
    type Buffer;

    fn create_program(&mut self, source: &ShaderSource) -> Result<Self::Program, ProgramError>;

    /// Releases the device-side resources of a program. Never called for a
    /// program that outlived a device loss.
    fn destroy_program(&mut self, program: Self::Program);

    fn uniform_location(&self, program: &Self::Program, name: &str) -> Option<UniformLocation>;

    fn attribute_location(&self, program: &Self::Program, name: &str)
        -> Option<AttributeLocation>;

    fn use_program(&mut self, program: &Self::Program);

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4);

    fn set_uniform_vec3(&mut self, location: UniformLocation, value: Vec3);

    fn set_uniform_bool(&mut self, location: UniformLocation, value: bool);

    fn bind_attribute(&mut self, location: AttributeLocation, buffer: &Self::Buffer);

    fn bind_index_buffer(&mut self, buffer: &Self::Buffer);

    fn draw_elements(
        &mut self,
        topology: wgpu::PrimitiveTopology,
        count: u32,
        format: wgpu::IndexFormat,
    );
}
