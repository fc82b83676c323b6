// renderer/layer.rs

use glam::Mat4;

#[derive(Debug, Clone)]
pub struct IndexBuffer<B> {
    pub buffer: B,
    pub num_items: u32,
    pub format: wgpu::IndexFormat,
}

/// GPU buffers of one batch of merged entity geometry.
///
/// Owned by the batch layer; the renderer only reads it for the duration
/// of a single draw call.
#[derive(Debug, Clone)]
pub struct BatchLayerState<B> {
    /// Dequantizes the compressed positions into world space.
    pub positions_decode_matrix: Mat4,
    pub positions: B,
    pub colors: Option<B>,
    pub flags: Option<B>,
    pub flags2: Option<B>,
    pub offsets: Option<B>,
    pub indices: IndexBuffer<B>,
    pub primitive: wgpu::PrimitiveTopology,
}

impl<B> BatchLayerState<B> {
    pub fn new(positions: B, indices: IndexBuffer<B>) -> Self {
        Self {
            positions_decode_matrix: Mat4::IDENTITY,
            positions,
            colors: None,
            flags: None,
            flags2: None,
            offsets: None,
            indices,
            primitive: wgpu::PrimitiveTopology::TriangleList,
        }
    }

    pub fn with_decode_matrix(mut self, matrix: Mat4) -> Self {
        self.positions_decode_matrix = matrix;
        self
    }

    pub fn with_colors(mut self, buffer: B) -> Self {
        self.colors = Some(buffer);
        self
    }

    pub fn with_flags(mut self, buffer: B) -> Self {
        self.flags = Some(buffer);
        self
    }

    pub fn with_flags2(mut self, buffer: B) -> Self {
        self.flags2 = Some(buffer);
        self
    }

    pub fn with_offsets(mut self, buffer: B) -> Self {
        self.offsets = Some(buffer);
        self
    }

    pub fn with_primitive(mut self, primitive: wgpu::PrimitiveTopology) -> Self {
        self.primitive = primitive;
        self
    }
}
