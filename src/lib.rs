pub mod renderer;
pub mod scene;
pub mod settings;

pub use renderer::{
    BatchLayerState, BatchingShadowRenderer, FrameContext, IndexBuffer, ProgramError, ShadowContext,
    ShadowDevice, ShadowMap, WgpuShadowDevice,
};
pub use scene::{SceneConfig, SectionPlane};
pub use settings::ShadowSettings;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
