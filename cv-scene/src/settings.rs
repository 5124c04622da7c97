use serde::{Deserialize, Serialize};

/// The thresholds used to clean up and normalize a reconstruction.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionSettings {
    /// The largest mean reprojection error in pixels a point may have
    #[serde(default = "default_max_reprojection_error")]
    pub max_reprojection_error: f64,
    /// The smallest triangulation angle in degrees a point must be seen under by two cameras
    #[serde(default = "default_min_triangulation_angle")]
    pub min_triangulation_angle: f64,
    /// The smallest plausible ratio of focal length to the largest image dimension
    #[serde(default = "default_min_focal_length_ratio")]
    pub min_focal_length_ratio: f64,
    /// The largest plausible ratio of focal length to the largest image dimension
    #[serde(default = "default_max_focal_length_ratio")]
    pub max_focal_length_ratio: f64,
    /// The largest plausible magnitude of a distortion parameter
    #[serde(default = "default_max_extra_param")]
    pub max_extra_param: f64,
    /// The size of the bounding box diagonal after normalization
    #[serde(default = "default_normalize_extent")]
    pub normalize_extent: f64,
    /// The lower percentile of the samples that bound the scene during normalization
    #[serde(default = "default_normalize_p0")]
    pub normalize_p0: f64,
    /// The upper percentile of the samples that bound the scene during normalization
    #[serde(default = "default_normalize_p1")]
    pub normalize_p1: f64,
    /// Normalize with respect to the camera centers instead of the points
    #[serde(default = "default_normalize_use_images")]
    pub normalize_use_images: bool,
    /// The number of times to run all filters during clean up
    #[serde(default = "default_clean_up_iterations")]
    pub clean_up_iterations: usize,
}

impl Default for ReconstructionSettings {
    fn default() -> Self {
        Self {
            max_reprojection_error: default_max_reprojection_error(),
            min_triangulation_angle: default_min_triangulation_angle(),
            min_focal_length_ratio: default_min_focal_length_ratio(),
            max_focal_length_ratio: default_max_focal_length_ratio(),
            max_extra_param: default_max_extra_param(),
            normalize_extent: default_normalize_extent(),
            normalize_p0: default_normalize_p0(),
            normalize_p1: default_normalize_p1(),
            normalize_use_images: default_normalize_use_images(),
            clean_up_iterations: default_clean_up_iterations(),
        }
    }
}

fn default_max_reprojection_error() -> f64 {
    4.0
}

fn default_min_triangulation_angle() -> f64 {
    1.5
}

fn default_min_focal_length_ratio() -> f64 {
    0.1
}

fn default_max_focal_length_ratio() -> f64 {
    10.0
}

fn default_max_extra_param() -> f64 {
    1.0
}

fn default_normalize_extent() -> f64 {
    10.0
}

fn default_normalize_p0() -> f64 {
    0.1
}

fn default_normalize_p1() -> f64 {
    0.9
}

fn default_normalize_use_images() -> bool {
    true
}

fn default_clean_up_iterations() -> usize {
    1
}
