pub mod context;
pub mod device;
pub mod error;
pub mod frame;
pub mod layer;
pub mod pipeline_builder;
pub mod program;
pub mod shader_source;
pub mod shadow_map;
pub mod shadow_renderer;
pub mod uniforms;
pub mod wgpu_device;

mod internal;

pub use context::ShadowContext;
pub use device::{AttributeLocation, ShadowDevice, UniformLocation};
pub use error::{ContextError, ProgramError};
pub use frame::FrameContext;
pub use layer::{BatchLayerState, IndexBuffer};
pub use pipeline_builder::PipelineBuilder;
pub use program::{Program, ProgramAttributes, ProgramId, ProgramUniforms, SectionPlaneUniforms};
pub use shader_source::{
    AttributeDecl, BatchingShadowShaderSource, ShaderSource, ShaderSourceProvider, UniformDecl,
};
pub use shadow_map::ShadowMap;
pub use shadow_renderer::BatchingShadowRenderer;
pub use wgpu_device::{WgpuProgram, WgpuShadowDevice};
