use crate::{Error, ImageId, Point3DId, Reconstruction, ReconstructionSettings, Result};
use cv_core::nalgebra::Point3;
use cv_core::Pose;
use itertools::Itertools;
use log::*;
use std::collections::BTreeSet;

/// The angle in radians that the rays from two camera centers subtend at a point.
///
/// The result is always in `[0, pi / 2]`, since a ray pointing the opposite way triangulates
/// just as well. Degenerate rays give an angle of zero.
pub fn calculate_triangulation_angle(
    center1: &Point3<f64>,
    center2: &Point3<f64>,
    point: &Point3<f64>,
) -> f64 {
    let baseline_squared = (center1 - center2).norm_squared();
    let ray1_squared = (point - center1).norm_squared();
    let ray2_squared = (point - center2).norm_squared();
    let denominator = 2.0 * (ray1_squared * ray2_squared).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }
    let nominator = ray1_squared + ray2_squared - baseline_squared;
    let angle = (nominator / denominator).clamp(-1.0, 1.0).acos();
    angle.min(std::f64::consts::PI - angle)
}

/// What one [`Reconstruction::clean_up`] pass removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanUpSummary {
    /// Observations removed by the reprojection error and triangulation angle filters.
    pub num_filtered_observations: usize,
    /// Observations removed because they were behind their camera.
    pub num_negative_depth_observations: usize,
    /// Images removed from the model.
    pub filtered_images: Vec<ImageId>,
}

impl Reconstruction {
    /// Deletes the points among `point3d_ids` whose mean reprojection error exceeds `max_reproj_error`.
    ///
    /// Points without a computed error are kept. Returns the number of removed observations.
    pub fn filter_points3d_with_large_reprojection_error(
        &mut self,
        max_reproj_error: f64,
        point3d_ids: impl IntoIterator<Item = Point3DId>,
    ) -> usize {
        let mut num_filtered = 0;
        for point3d_id in point3d_ids.into_iter().sorted().dedup() {
            let (error, track_len) = match self.points3d.get(&point3d_id) {
                Some(point) => (point.error, point.track().len()),
                None => continue,
            };
            if error.map_or(false, |error| error > max_reproj_error) {
                debug!(
                    "deleting 3d point {} with reprojection error {:?}",
                    point3d_id, error
                );
                if self.delete_point3d(point3d_id).is_ok() {
                    num_filtered += track_len;
                }
            }
        }
        num_filtered
    }

    /// Deletes the points among `point3d_ids` which no two observing cameras see under at least
    /// `min_tri_angle` degrees. Returns the number of removed observations.
    pub fn filter_points3d_with_small_triangulation_angle(
        &mut self,
        min_tri_angle: f64,
        point3d_ids: impl IntoIterator<Item = Point3DId>,
    ) -> usize {
        let min_tri_angle = min_tri_angle.to_radians();
        let mut num_filtered = 0;
        for point3d_id in point3d_ids.into_iter().sorted().dedup() {
            let point = match self.points3d.get(&point3d_id) {
                Some(point) => point,
                None => continue,
            };
            let centers: Vec<Point3<f64>> = point
                .track()
                .image_ids()
                .filter_map(|image_id| self.images.get(&image_id))
                .map(|image| image.projection_center())
                .collect();
            let keep = centers.iter().tuple_combinations().any(|(center1, center2)| {
                calculate_triangulation_angle(center1, center2, &point.xyz) >= min_tri_angle
            });
            if !keep {
                let track_len = point.track().len();
                debug!(
                    "deleting 3d point {} with insufficient triangulation angle",
                    point3d_id
                );
                if self.delete_point3d(point3d_id).is_ok() {
                    num_filtered += track_len;
                }
            }
        }
        num_filtered
    }

    /// Applies both point filters to the given points.
    pub fn filter_points3d(
        &mut self,
        max_reproj_error: f64,
        min_tri_angle: f64,
        point3d_ids: impl IntoIterator<Item = Point3DId>,
    ) -> usize {
        let point3d_ids: Vec<Point3DId> = point3d_ids.into_iter().collect();
        let num_filtered = self.filter_points3d_with_large_reprojection_error(
            max_reproj_error,
            point3d_ids.iter().copied(),
        ) + self.filter_points3d_with_small_triangulation_angle(min_tri_angle, point3d_ids);
        info!("filtered {} observations of 3d points", num_filtered);
        num_filtered
    }

    /// Applies both point filters to every point observed by one of the given images.
    pub fn filter_points3d_in_images(
        &mut self,
        max_reproj_error: f64,
        min_tri_angle: f64,
        image_ids: impl IntoIterator<Item = ImageId>,
    ) -> Result<usize> {
        let mut point3d_ids = BTreeSet::new();
        for image_id in image_ids {
            point3d_ids.extend(self.image(image_id)?.triangulated().map(|(_, id)| id));
        }
        Ok(self.filter_points3d(max_reproj_error, min_tri_angle, point3d_ids))
    }

    /// Applies both point filters to every point.
    pub fn filter_all_points3d(&mut self, max_reproj_error: f64, min_tri_angle: f64) -> usize {
        let point3d_ids = self.point3d_ids();
        self.filter_points3d(max_reproj_error, min_tri_angle, point3d_ids)
    }

    /// Deletes every observation of a registered image whose point lies behind that image's camera.
    ///
    /// Returns the number of removed observations.
    pub fn filter_observations_with_negative_depth(&mut self) -> usize {
        let mut behind = vec![];
        for &image_id in &self.reg_image_ids {
            let image = match self.images.get(&image_id) {
                Some(image) => image,
                None => continue,
            };
            let pose = image.pose.isometry();
            for (point2d_idx, point3d_id) in image.triangulated() {
                if let Some(point) = self.points3d.get(&point3d_id) {
                    if pose.transform_point(&point.xyz).z < f64::EPSILON {
                        behind.push((image_id, point2d_idx));
                    }
                }
            }
        }

        let mut num_filtered = 0;
        for (image_id, point2d_idx) in behind {
            // Deleting a short track also unbinds its other observations.
            if self.bound_point3d(image_id, point2d_idx).is_ok()
                && self.delete_observation(image_id, point2d_idx).is_ok()
            {
                num_filtered += 1;
            }
        }
        info!("filtered {} observations with negative depth", num_filtered);
        num_filtered
    }

    /// Removes registered images that observe no points or whose camera parameters are implausible.
    ///
    /// The observations of a removed image are deleted and the image is de-registered, but it stays
    /// in the reconstruction until [`tear_down`](Reconstruction::tear_down).
    pub fn filter_images(
        &mut self,
        min_focal_length_ratio: f64,
        max_focal_length_ratio: f64,
        max_extra_param: f64,
    ) -> Result<Vec<ImageId>> {
        let mut filtered = vec![];
        for &image_id in &self.reg_image_ids {
            let image = self.image(image_id)?;
            let camera = self.camera(image.camera_id())?;
            if image.num_points3d() == 0
                || camera.has_bogus_params(
                    min_focal_length_ratio,
                    max_focal_length_ratio,
                    max_extra_param,
                )
            {
                filtered.push(image_id);
            }
        }
        for &image_id in &filtered {
            debug!("filtering image {}", image_id);
            self.delete_observations_of_image(image_id)?;
            self.deregister_image(image_id)?;
        }
        info!("filtered {} images", filtered.len());
        Ok(filtered)
    }

    /// Runs the point, depth and image filters with the configured thresholds.
    pub fn clean_up(&mut self, settings: &ReconstructionSettings) -> Result<CleanUpSummary> {
        if settings.max_reprojection_error < 0.0 || settings.min_triangulation_angle < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "filter thresholds must not be negative, got {} px and {} degrees",
                settings.max_reprojection_error, settings.min_triangulation_angle
            )));
        }
        let mut summary = CleanUpSummary::default();
        for _ in 0..settings.clean_up_iterations {
            summary.num_filtered_observations += self.filter_all_points3d(
                settings.max_reprojection_error,
                settings.min_triangulation_angle,
            );
            summary.num_negative_depth_observations +=
                self.filter_observations_with_negative_depth();
            summary.filtered_images.extend(self.filter_images(
                settings.min_focal_length_ratio,
                settings.max_focal_length_ratio,
                settings.max_extra_param,
            )?);
        }
        info!(
            "clean up removed {} observations and {} images",
            summary.num_filtered_observations + summary.num_negative_depth_observations,
            summary.filtered_images.len()
        );
        Ok(summary)
    }
}
