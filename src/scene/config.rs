// scene/config.rs
//
// Read-only snapshot of the scene state that changes the *shape* of the
// shadow shader (how many section planes it declares, whether it reads
// per-vertex offsets). Plane values are uploaded as uniforms and never
// change the shape.

use glam::Vec3;
use xxhash_rust::xxh3::xxh3_64;

/// A plane that culls fragments on the side its direction points away from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionPlane {
    pub active: bool,
    pub pos: Vec3,
    pub dir: Vec3,
}

impl SectionPlane {
    pub fn new(pos: Vec3, dir: Vec3) -> Self {
        Self {
            active: true,
            pos,
            dir,
        }
    }

    pub fn inactive(pos: Vec3, dir: Vec3) -> Self {
        Self {
            active: false,
            pos,
            dir,
        }
    }
}

/// Digest of the shape-affecting part of a [`SceneConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneConfig {
    /// Ordered planes; index `i` maps to uniform slot `i` in the shader.
    pub section_planes: Vec<SectionPlane>,
    pub entity_offsets_enabled: bool,
}

impl SceneConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_section_planes(mut self, planes: impl IntoIterator<Item = SectionPlane>) -> Self {
        self.section_planes = planes.into_iter().collect();
        self
    }

    pub fn with_entity_offsets(mut self, enabled: bool) -> Self {
        self.entity_offsets_enabled = enabled;
        self
    }

    pub fn section_plane_count(&self) -> usize {
        self.section_planes.len()
    }

    /// Hashes the plane count and feature toggles only.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut shape = [0u8; 9];
        shape[..8].copy_from_slice(&(self.section_planes.len() as u64).to_le_bytes());
        shape[8] = u8::from(self.entity_offsets_enabled);
        Fingerprint(xxh3_64(&shape))
    }
}
