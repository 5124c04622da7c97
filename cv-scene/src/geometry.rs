use crate::{Error, Reconstruction, ReconstructionSettings, Result};
use cv_core::nalgebra::{IsometryMatrix3, Point3, Rotation3, Vector3};
use cv_core::{Pose, WorldToCamera};
use float_ord::FloatOrd;
use log::*;

/// A similarity transform of the world: `x' = scale * rotation * x + translation`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sim3 {
    pub scale: f64,
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl Default for Sim3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Sim3 {
    pub fn new(scale: f64, rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            scale,
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(1.0, Rotation3::identity(), Vector3::zeros())
    }

    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.scale * (self.rotation * point.coords) + self.translation)
    }

    /// Moves a camera along with the world so that it sees the transformed world as it saw the old one.
    ///
    /// The camera frame is scaled with the world.
    pub fn transform_pose(&self, pose: WorldToCamera) -> WorldToCamera {
        let isometry = pose.isometry();
        let rotation = isometry.rotation * self.rotation.inverse();
        let translation =
            self.scale * isometry.translation.vector - rotation * self.translation;
        WorldToCamera(IsometryMatrix3::from_parts(translation.into(), rotation))
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self::new(
            1.0 / self.scale,
            rotation,
            -(rotation * self.translation) / self.scale,
        )
    }

    /// The transform that applies `first` and then `self`.
    pub fn compose(&self, first: &Sim3) -> Self {
        Self::new(
            self.scale * first.scale,
            self.rotation * first.rotation,
            self.scale * (self.rotation * first.translation) + self.translation,
        )
    }
}

/// An axis aligned box, inclusive on all sides.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl BoundingBox {
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Whether every coordinate of `min` is at most the one of `max`.
    pub fn is_valid(&self) -> bool {
        (0..3).all(|axis| self.min[axis] <= self.max[axis])
    }

    pub fn contains(&self, point: &Point3<f64>) -> bool {
        (0..3).all(|axis| self.min[axis] <= point[axis] && point[axis] <= self.max[axis])
    }

    pub fn diagonal(&self) -> f64 {
        (self.max - self.min).norm()
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundsAndCentroid {
    pub bounds: BoundingBox,
    pub centroid: Point3<f64>,
}

fn check_percentiles(p0: f64, p1: f64) -> Result<()> {
    if (0.0..=1.0).contains(&p0) && (0.0..=1.0).contains(&p1) && p0 < p1 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "percentiles must satisfy 0 <= p0 < p1 <= 1, got p0 = {} and p1 = {}",
            p0, p1
        )))
    }
}

/// Per axis percentile bounds of the samples and the mean of the samples inside them.
fn bounds_and_centroid(samples: &[Point3<f64>], p0: f64, p1: f64) -> BoundsAndCentroid {
    let mut bounds = BoundingBox::new(Point3::origin(), Point3::origin());
    let mut centroid = Point3::origin();
    if samples.is_empty() {
        return BoundsAndCentroid { bounds, centroid };
    }

    let n = samples.len();
    let (lower, upper) = if n > 3 {
        (
            (p0 * (n - 1) as f64).floor() as usize,
            (p1 * (n - 1) as f64).floor() as usize,
        )
    } else {
        (0, n - 1)
    };
    for axis in 0..3 {
        let mut coords: Vec<f64> = samples.iter().map(|sample| sample[axis]).collect();
        coords.sort_unstable_by_key(|&coord| FloatOrd(coord));
        bounds.min[axis] = coords[lower];
        bounds.max[axis] = coords[upper];
        let inner = &coords[lower..=upper];
        centroid[axis] = inner.iter().sum::<f64>() / inner.len() as f64;
    }
    BoundsAndCentroid { bounds, centroid }
}

impl Reconstruction {
    /// Percentile bounds and the centroid of either the registered camera centers or the points.
    ///
    /// Each axis is handled separately: the sorted coordinates between the `p0` and `p1`
    /// percentiles span the bounds and their mean is the centroid.
    pub fn compute_bounds_and_centroid(
        &self,
        p0: f64,
        p1: f64,
        use_images: bool,
    ) -> Result<BoundsAndCentroid> {
        check_percentiles(p0, p1)?;
        let samples: Vec<Point3<f64>> = if use_images {
            self.reg_image_ids
                .iter()
                .filter_map(|image_id| self.images.get(image_id))
                .map(|image| image.projection_center())
                .collect()
        } else {
            self.points3d.values().map(|point| point.xyz).collect()
        };
        Ok(bounds_and_centroid(&samples, p0, p1))
    }

    /// The robust centroid of the points.
    pub fn compute_centroid(&self, p0: f64, p1: f64) -> Result<Point3<f64>> {
        Ok(self.compute_bounds_and_centroid(p0, p1, false)?.centroid)
    }

    /// The robust bounding box of the points.
    pub fn compute_bounding_box(&self, p0: f64, p1: f64) -> Result<BoundingBox> {
        Ok(self.compute_bounds_and_centroid(p0, p1, false)?.bounds)
    }

    /// Moves the centroid to the origin and scales the scene so the diagonal of its bounds is `extent`.
    ///
    /// With fewer than two samples nothing is changed. Returns the transform that was applied.
    pub fn normalize(&mut self, extent: f64, p0: f64, p1: f64, use_images: bool) -> Result<Sim3> {
        if !(extent > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "normalization extent must be positive, got {}",
                extent
            )));
        }
        check_percentiles(p0, p1)?;
        let num_samples = if use_images {
            self.reg_image_ids.len()
        } else {
            self.points3d.len()
        };
        if num_samples < 2 {
            debug!("skipping normalization of {} samples", num_samples);
            return Ok(Sim3::identity());
        }

        let BoundsAndCentroid { bounds, centroid } =
            self.compute_bounds_and_centroid(p0, p1, use_images)?;
        let old_extent = bounds.diagonal();
        let scale = if old_extent < f64::EPSILON {
            1.0
        } else {
            extent / old_extent
        };
        let sim3 = Sim3::new(scale, Rotation3::identity(), -scale * centroid.coords);
        self.transform(&sim3);
        info!(
            "normalized {} samples with scale {} around centroid {:?}",
            num_samples,
            scale,
            centroid.coords.as_slice()
        );
        Ok(sim3)
    }

    /// Normalizes with the configured extent and percentiles.
    pub fn normalize_with(&mut self, settings: &ReconstructionSettings) -> Result<Sim3> {
        self.normalize(
            settings.normalize_extent,
            settings.normalize_p0,
            settings.normalize_p1,
            settings.normalize_use_images,
        )
    }

    /// Applies a similarity transform to every image pose and every point.
    ///
    /// Unregistered images move too so they stay in the same frame if registered again.
    pub fn transform(&mut self, sim3: &Sim3) {
        for image in self.images.values_mut() {
            image.pose = sim3.transform_pose(image.pose);
        }
        for point in self.points3d.values_mut() {
            point.xyz = sim3.transform_point(&point.xyz);
        }
    }

    /// Builds a new reconstruction out of the points inside `bbox`.
    ///
    /// The result holds the points under their original ids, the images observing them and the
    /// cameras of those images. Images keep their registration and pair statistics are rebuilt.
    pub fn crop(&self, bbox: &BoundingBox) -> Result<Reconstruction> {
        if !bbox.is_valid() {
            return Err(Error::InvalidArgument(format!(
                "bounding box minimum {:?} exceeds its maximum {:?}",
                bbox.min.coords.as_slice(),
                bbox.max.coords.as_slice()
            )));
        }

        let point3d_ids: Vec<_> = self
            .point3d_ids()
            .into_iter()
            .filter(|point3d_id| {
                self.points3d
                    .get(point3d_id)
                    .map_or(false, |point| bbox.contains(&point.xyz))
            })
            .collect();

        let mut cropped = Reconstruction::new();
        for point3d_id in &point3d_ids {
            for element in self.point3d(*point3d_id)?.track().iter() {
                if cropped.exists_image(element.image_id) {
                    continue;
                }
                let image = self.image(element.image_id)?;
                if !cropped.exists_camera(image.camera_id()) {
                    cropped.add_camera(self.camera(image.camera_id())?.clone())?;
                }
                let mut image = image.clone();
                image.set_points2d(self.image(element.image_id)?.points2d());
                image.set_registered(false);
                cropped.add_image(image)?;
            }
        }
        for &image_id in &self.reg_image_ids {
            if cropped.exists_image(image_id) {
                cropped.register_image(image_id)?;
            }
        }

        if let Some(graph) = &self.correspondence_graph {
            cropped.seed_total_correspondences(graph);
            cropped.correspondence_graph = Some(graph.clone());
        }
        for point3d_id in &point3d_ids {
            let point = self.point3d(*point3d_id)?;
            cropped.add_point3d_with_id(*point3d_id, point.xyz, point.track().clone(), point.color)?;
            cropped.point3d_mut(*point3d_id)?.error = point.error;
        }
        cropped.max_point3d_id = self.max_point3d_id;
        info!(
            "cropped {} of {} 3d points and {} of {} images",
            cropped.num_points3d(),
            self.num_points3d(),
            cropped.num_images(),
            self.num_images()
        );
        Ok(cropped)
    }
}
