use wgpu::util::DeviceExt;

use crate::renderer::shader_source::ATTRIBUTE_SLOTS;

/// One-element vertex buffers standing in for optional attributes a layer
/// does not provide. Bound with instance stepping, so every vertex reads
/// the same value.
pub(crate) struct FallbackAttributes {
    buffers: [Option<wgpu::Buffer>; ATTRIBUTE_SLOTS],
}

impl FallbackAttributes {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let create = |label: &str, contents: &[u8]| {
            Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::VERTEX,
            }))
        };

        // position has no fallback
        let buffers = [
            None,
            create("FallbackColor", &[255, 255, 255, 255]),
            create("FallbackFlags", &[1, 0, 0, 0]),
            create("FallbackFlags2", &[0, 0, 0, 0]),
            create("FallbackOffset", bytemuck::cast_slice(&[0.0f32; 3])),
        ];

        Self { buffers }
    }

    pub(crate) fn get(&self, location: u32) -> Option<&wgpu::Buffer> {
        self.buffers.get(location as usize)?.as_ref()
    }
}
