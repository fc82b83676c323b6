use thiserror::Error;

/// Why a shadow program could not be built.
///
/// Recorded on the renderer rather than propagated out of `draw`: a layer
/// whose program failed simply contributes nothing to the shadow map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("shader `{label}` failed to compile: {message}")]
    Compile { label: String, message: String },

    #[error("shader `{label}` failed to link: {message}")]
    Link { label: String, message: String },

    #[error("shader `{label}` does not expose mandatory attribute `{name}`")]
    MissingAttribute { label: String, name: &'static str },

    #[error("shader `{label}` needs a {size}-byte uniform block but the device slot holds {limit} bytes")]
    UniformBlockTooLarge { label: String, size: u64, limit: u64 },
}

/// Failure to bring up a GPU device for shadow rendering.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}
