// renderer/frame.rs

use glam::Mat4;

use crate::renderer::ProgramId;

/// State shared by every renderer drawing into the same shadow frame.
///
/// Owned by the frame orchestrator and handed to each draw call by `&mut`.
/// Renderers read the shadow matrices and record which program they left
/// bound so the next renderer can skip a redundant activation.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameContext {
    pub last_program_id: Option<ProgramId>,
    pub shadow_view_matrix: Mat4,
    pub shadow_proj_matrix: Mat4,
}

impl FrameContext {
    pub fn new(shadow_view_matrix: Mat4, shadow_proj_matrix: Mat4) -> Self {
        Self {
            last_program_id: None,
            shadow_view_matrix,
            shadow_proj_matrix,
        }
    }

    /// Starts a new frame. Forgets the bound program so the first draw
    /// re-uploads the new matrices.
    pub fn begin_frame(&mut self, shadow_view_matrix: Mat4, shadow_proj_matrix: Mat4) {
        self.last_program_id = None;
        self.shadow_view_matrix = shadow_view_matrix;
        self.shadow_proj_matrix = shadow_proj_matrix;
    }
}

impl Default for FrameContext {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}
