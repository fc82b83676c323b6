use std::num::NonZeroU64;

/// Per-draw snapshots of the active uniform block, addressed with dynamic
/// offsets. Every draw recorded in a pass gets its own slot; the ring is
/// rewound once the pass has been encoded.
pub(crate) struct UniformRing {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    slot_size: u64,
    capacity: u32,
    cursor: u32,
}

impl UniformRing {
    pub(crate) fn bind_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ShadowUniformLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        })
    }

    /// `block_size` is rounded up to the device's dynamic offset alignment.
    pub(crate) fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        block_size: u64,
        capacity: u32,
    ) -> Self {
        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let slot_size = block_size.max(1).div_ceil(alignment) * alignment;
        let capacity = capacity.max(1);
        let (buffer, bind_group) = Self::allocate(device, layout, slot_size, capacity);

        log::info!(
            "Created shadow uniform ring: {} slots of {} bytes",
            capacity,
            slot_size
        );

        Self {
            buffer,
            bind_group,
            slot_size,
            capacity,
            cursor: 0,
        }
    }

    pub(crate) fn slot_size(&self) -> u64 {
        self.slot_size
    }

    /// Uploads `block` into the next free slot and returns the bind group
    /// and dynamic offset addressing it.
    pub(crate) fn push(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        block: &[u8],
    ) -> (wgpu::BindGroup, u32) {
        if self.cursor == self.capacity {
            self.grow(device, layout);
        }

        let offset = u64::from(self.cursor) * self.slot_size;
        queue.write_buffer(&self.buffer, offset, block);
        self.cursor += 1;

        (self.bind_group.clone(), offset as u32)
    }

    pub(crate) fn reset(&mut self) {
        self.cursor = 0;
    }

    // Draws already recorded keep the old bind group, which keeps the old
    // buffer alive until they are encoded.
    fn grow(&mut self, device: &wgpu::Device, layout: &wgpu::BindGroupLayout) {
        let new_capacity = self.capacity * 2;
        log::info!(
            "Growing shadow uniform ring: {} -> {}",
            self.capacity,
            new_capacity
        );

        let (buffer, bind_group) = Self::allocate(device, layout, self.slot_size, new_capacity);
        self.buffer = buffer;
        self.bind_group = bind_group;
        self.capacity = new_capacity;
        self.cursor = 0;
    }

    fn allocate(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        slot_size: u64,
        capacity: u32,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ShadowUniformRing"),
            size: slot_size * u64::from(capacity),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ShadowUniformBindGroup"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(slot_size),
                }),
            }],
        });

        (buffer, bind_group)
    }
}
