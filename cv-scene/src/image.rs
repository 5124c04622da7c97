use crate::{CameraId, ImageId, Point3DId};
use cv_core::nalgebra::{Point2, Point3, Vector3};
use cv_core::{Pose, WorldToCamera};
use serde::{Deserialize, Serialize};

/// A 2d feature observed in an image, optionally bound to the 3d point it triangulates.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    /// The pixel location where the upper left pixel center is `(0.5, 0.5)`.
    #[serde(with = "crate::serialization::point2")]
    pub xy: Point2<f64>,
    /// The 3d point this observation belongs to, if it is triangulated.
    pub point3d_id: Option<Point3DId>,
}

impl Point2D {
    pub fn new(xy: Point2<f64>) -> Self {
        Self {
            xy,
            point3d_id: None,
        }
    }

    pub fn has_point3d(&self) -> bool {
        self.point3d_id.is_some()
    }
}

/// A posed image and its 2d observations.
///
/// The registration flag and the binding between 2d points and 3d points can only be changed
/// through the [`Reconstruction`](crate::Reconstruction), which keeps them consistent with the tracks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Image {
    image_id: ImageId,
    /// The file name relative to the image root directory.
    pub name: String,
    camera_id: CameraId,
    /// Pose of the world relative to the camera.
    #[serde(with = "crate::serialization::world_to_camera")]
    pub pose: WorldToCamera,
    registered: bool,
    points2d: Vec<Point2D>,
    num_points3d: usize,
    num_observations: usize,
    num_correspondences: usize,
    /// For every 2d point, how many of its correspondences are triangulated.
    num_correspondences_have_point3d: Vec<usize>,
}

impl Image {
    pub fn new(
        image_id: ImageId,
        name: impl Into<String>,
        camera_id: CameraId,
        pose: WorldToCamera,
        points2d: impl IntoIterator<Item = Point2<f64>>,
    ) -> Self {
        let points2d: Vec<Point2D> = points2d.into_iter().map(Point2D::new).collect();
        Self {
            image_id,
            name: name.into(),
            camera_id,
            pose,
            registered: false,
            num_points3d: 0,
            num_observations: 0,
            num_correspondences: 0,
            num_correspondences_have_point3d: vec![0; points2d.len()],
            points2d,
        }
    }

    pub fn image_id(&self) -> ImageId {
        self.image_id
    }

    pub fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn points2d(&self) -> &[Point2D] {
        &self.points2d
    }

    pub fn point2d(&self, point2d_idx: usize) -> Option<&Point2D> {
        self.points2d.get(point2d_idx)
    }

    pub fn num_points2d(&self) -> usize {
        self.points2d.len()
    }

    /// The number of 2d points which are triangulated.
    pub fn num_points3d(&self) -> usize {
        self.num_points3d
    }

    /// The number of 2d points which have at least one correspondence.
    pub fn num_observations(&self) -> usize {
        self.num_observations
    }

    /// The total number of correspondences of all 2d points.
    pub fn num_correspondences(&self) -> usize {
        self.num_correspondences
    }

    pub fn num_correspondences_have_point3d(&self, point2d_idx: usize) -> usize {
        self.num_correspondences_have_point3d
            .get(point2d_idx)
            .copied()
            .unwrap_or(0)
    }

    /// The number of 2d points that correspond to at least one triangulated observation in another image.
    pub fn num_visible_points3d(&self) -> usize {
        self.num_correspondences_have_point3d
            .iter()
            .filter(|&&n| n > 0)
            .count()
    }

    /// Iterates the `(point2d_idx, point3d)` pairs of every triangulated 2d point.
    pub fn triangulated(&self) -> impl Iterator<Item = (usize, Point3DId)> + '_ {
        self.points2d
            .iter()
            .enumerate()
            .filter_map(|(ix, point2d)| point2d.point3d_id.map(|point3d| (ix, point3d)))
    }

    /// The optical center in world coordinates.
    pub fn projection_center(&self) -> Point3<f64> {
        Point3::from(self.pose.inverse().isometry().translation.vector)
    }

    /// The direction of the positive z axis of the camera in world coordinates.
    pub fn viewing_direction(&self) -> Vector3<f64> {
        self.pose.isometry().rotation.matrix().row(2).transpose()
    }

    pub(crate) fn set_registered(&mut self, registered: bool) {
        self.registered = registered;
    }

    pub(crate) fn set_point3d_for_point2d(&mut self, point2d_idx: usize, point3d: Point3DId) {
        let point2d = &mut self.points2d[point2d_idx];
        if point2d.point3d_id.is_none() {
            self.num_points3d += 1;
        }
        point2d.point3d_id = Some(point3d);
    }

    pub(crate) fn reset_point3d_for_point2d(&mut self, point2d_idx: usize) {
        let point2d = &mut self.points2d[point2d_idx];
        if point2d.point3d_id.take().is_some() {
            self.num_points3d -= 1;
        }
    }

    pub(crate) fn increment_correspondence_has_point3d(&mut self, point2d_idx: usize) {
        if let Some(count) = self.num_correspondences_have_point3d.get_mut(point2d_idx) {
            *count += 1;
        }
    }

    pub(crate) fn decrement_correspondence_has_point3d(&mut self, point2d_idx: usize) {
        if let Some(count) = self.num_correspondences_have_point3d.get_mut(point2d_idx) {
            *count = count.saturating_sub(1);
        }
    }

    pub(crate) fn set_points2d(&mut self, points2d: &[Point2D]) {
        self.points2d = points2d
            .iter()
            .map(|point2d| Point2D::new(point2d.xy))
            .collect();
        self.num_correspondences_have_point3d = vec![0; self.points2d.len()];
        self.num_points3d = 0;
    }

    pub(crate) fn set_correspondence_counts(&mut self, num_observations: usize, num_correspondences: usize) {
        self.num_observations = num_observations;
        self.num_correspondences = num_correspondences;
    }

    /// Forgets every 2d point.
    pub(crate) fn clear_points2d(&mut self) {
        self.points2d.clear();
        self.num_correspondences_have_point3d.clear();
        self.num_points3d = 0;
    }

    /// Unbinds every 2d point and resets the visibility counts, keeping the 2d locations.
    pub(crate) fn clear_points3d(&mut self) {
        for point2d in &mut self.points2d {
            point2d.point3d_id = None;
        }
        for count in &mut self.num_correspondences_have_point3d {
            *count = 0;
        }
        self.num_points3d = 0;
    }

    pub(crate) fn reset_correspondence_has_point3d(&mut self) {
        for count in &mut self.num_correspondences_have_point3d {
            *count = 0;
        }
    }
}
