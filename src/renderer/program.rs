// renderer/program.rs

use std::sync::atomic::{AtomicU64, Ordering};

use crate::renderer::shader_source::{
    section_plane_active, section_plane_dir, section_plane_pos, COLOR, FLAGS, FLAGS2, OFFSET,
    POSITION, POSITIONS_DECODE_MATRIX, SHADOW_PROJ_MATRIX, SHADOW_VIEW_MATRIX,
};
use crate::renderer::{
    AttributeLocation, BatchLayerState, FrameContext, ProgramError, ShaderSource, ShadowDevice,
    UniformLocation,
};
use crate::scene::{Fingerprint, SceneConfig};

static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a built program. Never reused, so a rebuilt
/// program can't be mistaken for the one it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(u64);

impl ProgramId {
    pub fn next() -> Self {
        Self(NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionPlaneUniforms {
    pub active: Option<UniformLocation>,
    pub pos: Option<UniformLocation>,
    pub dir: Option<UniformLocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramUniforms {
    pub positions_decode_matrix: Option<UniformLocation>,
    pub shadow_view_matrix: Option<UniformLocation>,
    pub shadow_proj_matrix: Option<UniformLocation>,
    /// One entry per section plane, in plane order.
    pub section_planes: Vec<SectionPlaneUniforms>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramAttributes {
    pub position: AttributeLocation,
    pub color: Option<AttributeLocation>,
    pub flags: Option<AttributeLocation>,
    pub flags2: Option<AttributeLocation>,
    pub offset: Option<AttributeLocation>,
}

/// A compiled shadow program with every binding slot resolved.
pub struct Program<D: ShadowDevice> {
    id: ProgramId,
    handle: D::Program,
    fingerprint: Fingerprint,
    uniforms: ProgramUniforms,
    attributes: ProgramAttributes,
}

impl<D: ShadowDevice> Program<D> {
    /// Compiles `source` and resolves its slots against `config`.
    ///
    /// Uniform and optional attribute slots that the compiled program does
    /// not expose resolve to `None`. A missing `position` attribute is an
    /// error; the half-built program is released before returning.
    pub fn build(
        device: &mut D,
        source: &ShaderSource,
        config: &SceneConfig,
    ) -> Result<Self, ProgramError> {
        let handle = device.create_program(source)?;

        let Some(position) = device.attribute_location(&handle, POSITION) else {
            device.destroy_program(handle);
            return Err(ProgramError::MissingAttribute {
                label: source.label.clone(),
                name: POSITION,
            });
        };

        let attributes = ProgramAttributes {
            position,
            color: device.attribute_location(&handle, COLOR),
            flags: device.attribute_location(&handle, FLAGS),
            flags2: device.attribute_location(&handle, FLAGS2),
            offset: device.attribute_location(&handle, OFFSET),
        };

        let section_planes = (0..config.section_plane_count())
            .map(|index| SectionPlaneUniforms {
                active: device.uniform_location(&handle, &section_plane_active(index)),
                pos: device.uniform_location(&handle, &section_plane_pos(index)),
                dir: device.uniform_location(&handle, &section_plane_dir(index)),
            })
            .collect();

        let uniforms = ProgramUniforms {
            positions_decode_matrix: device.uniform_location(&handle, POSITIONS_DECODE_MATRIX),
            shadow_view_matrix: device.uniform_location(&handle, SHADOW_VIEW_MATRIX),
            shadow_proj_matrix: device.uniform_location(&handle, SHADOW_PROJ_MATRIX),
            section_planes,
        };

        Ok(Self {
            id: ProgramId::next(),
            handle,
            fingerprint: config.fingerprint(),
            uniforms,
            attributes,
        })
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn uniforms(&self) -> &ProgramUniforms {
        &self.uniforms
    }

    pub fn attributes(&self) -> &ProgramAttributes {
        &self.attributes
    }

    /// Activates the program and uploads the uniforms shared by every layer
    /// of the frame: shadow matrices and section planes in plane order.
    pub fn bind(&self, device: &mut D, frame: &FrameContext, config: &SceneConfig) {
        device.use_program(&self.handle);

        if let Some(location) = self.uniforms.shadow_view_matrix {
            device.set_uniform_mat4(location, &frame.shadow_view_matrix);
        }
        if let Some(location) = self.uniforms.shadow_proj_matrix {
            device.set_uniform_mat4(location, &frame.shadow_proj_matrix);
        }

        for (slot, plane) in self.uniforms.section_planes.iter().zip(&config.section_planes) {
            if let Some(location) = slot.active {
                device.set_uniform_bool(location, plane.active);
            }
            if let Some(location) = slot.pos {
                device.set_uniform_vec3(location, plane.pos);
            }
            if let Some(location) = slot.dir {
                device.set_uniform_vec3(location, plane.dir);
            }
        }
    }

    /// Binds the layer's buffers and issues its indexed draw.
    pub fn draw_layer(&self, device: &mut D, layer: &BatchLayerState<D::Buffer>) {
        if let Some(location) = self.uniforms.positions_decode_matrix {
            device.set_uniform_mat4(location, &layer.positions_decode_matrix);
        }

        device.bind_attribute(self.attributes.position, &layer.positions);

        let optional = [
            (self.attributes.color, layer.colors.as_ref()),
            (self.attributes.flags, layer.flags.as_ref()),
            (self.attributes.flags2, layer.flags2.as_ref()),
            (self.attributes.offset, layer.offsets.as_ref()),
        ];
        for (location, buffer) in optional {
            if let (Some(location), Some(buffer)) = (location, buffer) {
                device.bind_attribute(location, buffer);
            }
        }

        device.bind_index_buffer(&layer.indices.buffer);
        device.draw_elements(layer.primitive, layer.indices.num_items, layer.indices.format);
    }

    /// Releases the device-side program.
    pub fn destroy(self, device: &mut D) {
        device.destroy_program(self.handle);
    }

    /// Forgets the program without touching the device. Used after a device
    /// loss, when the handle is already invalid.
    pub fn abandon(self) {
        log::debug!("Abandoning shadow program {:?} after device loss", self.id);
    }
}
