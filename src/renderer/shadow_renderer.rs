// renderer/shadow_renderer.rs

use crate::renderer::{
    BatchLayerState, BatchingShadowShaderSource, FrameContext, Program, ProgramError, ProgramId,
    ShaderSourceProvider, ShadowDevice,
};
use crate::scene::SceneConfig;

/// Draws batch layers into a shadow map.
///
/// Owns at most one [`Program`]. The program is checked against the scene
/// configuration fingerprint before every draw and rebuilt when the shape
/// changed. A failed build is sticky: draws are silently skipped until
/// [`reallocate`](Self::reallocate), [`on_device_context_lost`](Self::on_device_context_lost)
/// or [`destroy`](Self::destroy) is called.
pub struct BatchingShadowRenderer<D: ShadowDevice, S = BatchingShadowShaderSource> {
    shader_source: S,
    program: Option<Program<D>>,
    errors: Option<ProgramError>,
}

impl<D: ShadowDevice> BatchingShadowRenderer<D> {
    pub fn new(device: &mut D, config: &SceneConfig) -> Self {
        Self::with_shader_source(BatchingShadowShaderSource::new(), device, config)
    }
}

impl<D: ShadowDevice, S: ShaderSourceProvider> BatchingShadowRenderer<D, S> {
    pub fn with_shader_source(shader_source: S, device: &mut D, config: &SceneConfig) -> Self {
        let mut renderer = Self {
            shader_source,
            program: None,
            errors: None,
        };
        renderer.allocate(device, config);
        renderer
    }

    /// `true` while a program is held and was built for `config`'s shape.
    pub fn is_valid(&self, config: &SceneConfig) -> bool {
        self.program
            .as_ref()
            .is_some_and(|program| program.fingerprint() == config.fingerprint())
    }

    /// The recorded build failure, if the last allocation failed.
    pub fn errors(&self) -> Option<&ProgramError> {
        self.errors.as_ref()
    }

    pub fn program_id(&self) -> Option<ProgramId> {
        self.program.as_ref().map(Program::id)
    }

    pub fn program(&self) -> Option<&Program<D>> {
        self.program.as_ref()
    }

    pub fn draw_layer(
        &mut self,
        device: &mut D,
        config: &SceneConfig,
        frame: &mut FrameContext,
        layer: &BatchLayerState<D::Buffer>,
    ) {
        if self.errors.is_some() {
            return;
        }

        if self.program.is_some() && !self.is_valid(config) {
            log::debug!("Shadow program is stale for the current scene configuration, rebuilding");
            self.allocate(device, config);
        } else if self.program.is_none() {
            self.allocate(device, config);
        }

        let Some(program) = self.program.as_ref() else {
            return;
        };

        if frame.last_program_id != Some(program.id()) {
            frame.last_program_id = Some(program.id());
            program.bind(device, frame, config);
        }

        program.draw_layer(device, layer);
    }

    /// Clears any recorded failure and builds a fresh program.
    pub fn reallocate(&mut self, device: &mut D, config: &SceneConfig) {
        self.errors = None;
        self.allocate(device, config);
    }

    /// Drops the program without releasing it; its device resources died
    /// with the context. The next draw rebuilds.
    pub fn on_device_context_lost(&mut self) {
        if let Some(program) = self.program.take() {
            program.abandon();
        }
        self.errors = None;
    }

    /// Releases the held program, if any. Safe to call repeatedly.
    pub fn destroy(&mut self, device: &mut D) {
        if let Some(program) = self.program.take() {
            program.destroy(device);
        }
        self.errors = None;
    }

    // The replacement is built before the old program is released, so the
    // renderer never observes a half-swapped state.
    fn allocate(&mut self, device: &mut D, config: &SceneConfig) {
        let source = self.shader_source.source(config);
        let built = Program::build(device, &source, config);

        if let Some(old) = self.program.take() {
            old.destroy(device);
        }

        match built {
            Ok(program) => {
                log::debug!(
                    "Allocated shadow program {:?} ({})",
                    program.id(),
                    source.label
                );
                self.program = Some(program);
                self.errors = None;
            }
            Err(err) => {
                log::error!("Shadow program allocation failed: {err}");
                self.errors = Some(err);
            }
        }
    }
}

impl<D: ShadowDevice, S> Drop for BatchingShadowRenderer<D, S> {
    fn drop(&mut self) {
        if let Some(program) = &self.program {
            log::warn!(
                "BatchingShadowRenderer dropped while holding program {:?}; call destroy() to release it",
                program.id()
            );
        }
    }
}
