use serde::{Deserialize, Serialize};

use crate::scene::SceneObject;

pub const PROJECT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub version: u32,
    #[serde(default)]
    pub settings: EngineSettings,
    pub scene: SceneObject,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            version: PROJECT_VERSION,
            settings: EngineSettings::default(),
            scene: SceneObject::group("root"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub execution: ExecutionSettings,
    pub kernel: KernelSettings,
    pub contour: ContourSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    pub max_loop_passes: u32,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_loop_passes: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSettings {
    pub function_name: String,
    pub union_name: String,
    pub subtract_name: String,
    pub intersect_name: String,
    /// Density of a scene with no contributing pieces.
    pub empty_density: f32,
    pub include_library: bool,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            function_name: "evaluateDensity".to_string(),
            union_name: "CSGUnion".to_string(),
            subtract_name: "CSGSubtract".to_string(),
            intersect_name: "CSGIntersect".to_string(),
            empty_density: -1.0e6,
            include_library: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourSettings {
    /// Cells along the longest axis of the sampled bounds.
    pub resolution: u32,
    pub iso_level: f32,
    pub padding: f32,
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
}

impl Default for ContourSettings {
    fn default() -> Self {
        Self {
            resolution: 32,
            iso_level: 0.0,
            padding: 0.1,
            bounds_min: [-2.0, -2.0, -2.0],
            bounds_max: [2.0, 2.0, 2.0],
        }
    }
}
