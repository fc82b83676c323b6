use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowSettings {
    #[serde(default = "ShadowSettings::default_shadow_map_size")]
    pub shadow_map_size: u32,
    #[serde(default = "ShadowSettings::default_depth_bias_constant")]
    pub depth_bias_constant: i32,
    #[serde(default = "ShadowSettings::default_depth_bias_slope")]
    pub depth_bias_slope: f32,
    #[serde(default = "ShadowSettings::default_cull_back_faces")]
    pub cull_back_faces: bool,
    /// Largest section plane count a program may declare; sizes the
    /// per-draw uniform slot.
    #[serde(default = "ShadowSettings::default_max_section_planes")]
    pub max_section_planes: u32,
    #[serde(default = "ShadowSettings::default_initial_uniform_slots")]
    pub initial_uniform_slots: u32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            shadow_map_size: Self::default_shadow_map_size(),
            depth_bias_constant: Self::default_depth_bias_constant(),
            depth_bias_slope: Self::default_depth_bias_slope(),
            cull_back_faces: Self::default_cull_back_faces(),
            max_section_planes: Self::default_max_section_planes(),
            initial_uniform_slots: Self::default_initial_uniform_slots(),
        }
    }
}

impl ShadowSettings {
    /// Keeps the per-draw uniform slot within the 16 KiB uniform binding
    /// every wgpu backend guarantees.
    pub const MAX_SECTION_PLANES: u32 = 256;
    pub const MAX_INITIAL_UNIFORM_SLOTS: u32 = 4096;

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(settings) => {
                    info!("Loaded shadow settings from {:?}", path);
                    settings
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default shadow settings.",
                        path, err
                    );
                    ShadowSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Shadow settings file {:?} not found. Using default settings.",
                    path
                );
                ShadowSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default shadow settings.",
                    path, err
                );
                ShadowSettings::default()
            }
        }
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<ShadowSettings>(contents).map(Self::validate)
    }

    fn validate(mut self) -> Self {
        if self.shadow_map_size == 0 {
            warn!("Shadow map size must be greater than zero. Using default value.");
            self.shadow_map_size = Self::default_shadow_map_size();
        }

        if self.initial_uniform_slots == 0 {
            warn!("Uniform slot count must be greater than zero. Using default value.");
            self.initial_uniform_slots = Self::default_initial_uniform_slots();
        }

        if self.max_section_planes > Self::MAX_SECTION_PLANES {
            warn!(
                "Section plane limit {} exceeds {}. Clamping.",
                self.max_section_planes,
                Self::MAX_SECTION_PLANES
            );
            self.max_section_planes = Self::MAX_SECTION_PLANES;
        }

        if self.initial_uniform_slots > Self::MAX_INITIAL_UNIFORM_SLOTS {
            warn!(
                "Initial uniform slot count {} exceeds {}. Clamping.",
                self.initial_uniform_slots,
                Self::MAX_INITIAL_UNIFORM_SLOTS
            );
            self.initial_uniform_slots = Self::MAX_INITIAL_UNIFORM_SLOTS;
        }

        if !self.depth_bias_slope.is_finite() {
            warn!("Depth bias slope must be finite. Using default value.");
            self.depth_bias_slope = Self::default_depth_bias_slope();
        }

        self
    }

    const fn default_shadow_map_size() -> u32 {
        2048
    }

    const fn default_depth_bias_constant() -> i32 {
        2
    }

    const fn default_depth_bias_slope() -> f32 {
        2.0
    }

    const fn default_cull_back_faces() -> bool {
        true
    }

    const fn default_max_section_planes() -> u32 {
        16
    }

    const fn default_initial_uniform_slots() -> u32 {
        256
    }
}
