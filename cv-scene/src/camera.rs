use crate::CameraId;
use cv_core::nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// The intrinsic model of a camera, which determines the layout of [`Camera::params`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraModelId {
    /// `f, cx, cy`
    SimplePinhole,
    /// `fx, fy, cx, cy`
    Pinhole,
    /// `f, cx, cy, k`
    SimpleRadial,
    /// `f, cx, cy, k1, k2`
    Radial,
    /// `fx, fy, cx, cy, k1, k2, p1, p2`
    OpenCv,
}

impl CameraModelId {
    /// The number of parameters the model expects.
    pub fn num_params(self) -> usize {
        match self {
            CameraModelId::SimplePinhole => 3,
            CameraModelId::Pinhole => 4,
            CameraModelId::SimpleRadial => 4,
            CameraModelId::Radial => 5,
            CameraModelId::OpenCv => 8,
        }
    }

    pub fn focal_length_idxs(self) -> &'static [usize] {
        match self {
            CameraModelId::SimplePinhole | CameraModelId::SimpleRadial | CameraModelId::Radial => {
                &[0]
            }
            CameraModelId::Pinhole | CameraModelId::OpenCv => &[0, 1],
        }
    }

    pub fn principal_point_idxs(self) -> [usize; 2] {
        match self {
            CameraModelId::SimplePinhole | CameraModelId::SimpleRadial | CameraModelId::Radial => {
                [1, 2]
            }
            CameraModelId::Pinhole | CameraModelId::OpenCv => [2, 3],
        }
    }

    /// Indices of the distortion parameters.
    pub fn extra_params_idxs(self) -> &'static [usize] {
        match self {
            CameraModelId::SimplePinhole | CameraModelId::Pinhole => &[],
            CameraModelId::SimpleRadial => &[3],
            CameraModelId::Radial => &[3, 4],
            CameraModelId::OpenCv => &[4, 5, 6, 7],
        }
    }
}

/// Camera intrinsics shared by one or more images.
///
/// The projection math lives outside of this crate. The scene graph only needs the
/// parameters to decide whether a calibration has gone bad.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub camera_id: CameraId,
    pub model: CameraModelId,
    pub width: u32,
    pub height: u32,
    pub params: Vec<f64>,
}

impl Camera {
    pub fn new(
        camera_id: CameraId,
        model: CameraModelId,
        width: u32,
        height: u32,
        params: Vec<f64>,
    ) -> Self {
        Self {
            camera_id,
            model,
            width,
            height,
            params,
        }
    }

    /// Creates a camera of the given model with a single focal length and the principal point
    /// in the middle of the image. Distortion parameters start at zero.
    pub fn with_focal_length(
        camera_id: CameraId,
        model: CameraModelId,
        focal_length: f64,
        width: u32,
        height: u32,
    ) -> Self {
        let mut params = vec![0.0; model.num_params()];
        for &ix in model.focal_length_idxs() {
            params[ix] = focal_length;
        }
        let [cx, cy] = model.principal_point_idxs();
        params[cx] = f64::from(width) / 2.0;
        params[cy] = f64::from(height) / 2.0;
        Self::new(camera_id, model, width, height, params)
    }

    /// Whether the parameter vector has the length the model expects.
    pub fn verify_params(&self) -> bool {
        self.params.len() == self.model.num_params()
    }

    pub fn focal_lengths(&self) -> impl Iterator<Item = f64> + '_ {
        self.model
            .focal_length_idxs()
            .iter()
            .filter_map(move |&ix| self.params.get(ix).copied())
    }

    pub fn principal_point(&self) -> Option<Point2<f64>> {
        let [cx, cy] = self.model.principal_point_idxs();
        Some(Point2::new(*self.params.get(cx)?, *self.params.get(cy)?))
    }

    pub fn extra_params(&self) -> impl Iterator<Item = f64> + '_ {
        self.model
            .extra_params_idxs()
            .iter()
            .filter_map(move |&ix| self.params.get(ix).copied())
    }

    /// Checks for a focal length ratio outside of `[min_focal_length_ratio, max_focal_length_ratio]`,
    /// a principal point outside of the image, or a distortion parameter whose magnitude exceeds
    /// `max_extra_param`.
    ///
    /// The focal length ratio is relative to the largest image dimension.
    pub fn has_bogus_params(
        &self,
        min_focal_length_ratio: f64,
        max_focal_length_ratio: f64,
        max_extra_param: f64,
    ) -> bool {
        if !self.verify_params() {
            return true;
        }
        let max_size = f64::from(self.width.max(self.height));
        let bogus_focal_length = self.focal_lengths().any(|focal_length| {
            let ratio = focal_length / max_size;
            !(min_focal_length_ratio..=max_focal_length_ratio).contains(&ratio)
        });
        let bogus_principal_point = self.principal_point().map_or(true, |pp| {
            pp.x < 0.0 || pp.x > f64::from(self.width) || pp.y < 0.0 || pp.y > f64::from(self.height)
        });
        let bogus_extra_params = self
            .extra_params()
            .any(|param| param.abs() > max_extra_param);
        bogus_focal_length || bogus_principal_point || bogus_extra_params
    }
}
