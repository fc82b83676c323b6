// scene/mod.rs

pub mod config;

pub use config::{Fingerprint, SceneConfig, SectionPlane};
