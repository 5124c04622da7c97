use crate::{
    Camera, CameraId, CorrespondenceGraph, Error, Image, ImageId, PairId, Point3D, Point3DId,
    Result, Track, TrackElement,
};
use cv_core::nalgebra::Point3;
use itertools::Itertools;
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Correspondence statistics of an unordered pair of images.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePairStat {
    /// The number of correspondences that are triangulated as the same 3d point.
    pub num_tri_corrs: usize,
    /// The number of correspondences between the two images.
    pub num_total_corrs: usize,
}

/// How a single observation enters or leaves a 3d point.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum TriangulationDelta {
    /// The observation is part of a newly created point.
    Add,
    /// The observation was appended to an existing point.
    Continue,
    /// The whole point is being deleted.
    Delete,
    /// The observation is leaving a point that survives.
    Remove,
}

impl TriangulationDelta {
    fn is_increment(self) -> bool {
        matches!(self, TriangulationDelta::Add | TriangulationDelta::Continue)
    }

    /// Whether every co-observing image is counted, rather than every unordered pair once.
    fn counts_every_pair(self) -> bool {
        matches!(
            self,
            TriangulationDelta::Continue | TriangulationDelta::Remove
        )
    }
}

/// Cameras, posed images and triangulated points that live in the same world frame.
///
/// Every mutation goes through this type so that tracks, the 2d point bindings of images,
/// the registration index and the image pair statistics never disagree.
#[derive(Clone, Debug, Default)]
pub struct Reconstruction {
    pub(crate) cameras: HashMap<CameraId, Camera>,
    pub(crate) images: HashMap<ImageId, Image>,
    pub(crate) points3d: HashMap<Point3DId, Point3D>,
    pub(crate) image_pair_stats: HashMap<PairId, ImagePairStat>,
    /// Registered images in the order they were registered.
    pub(crate) reg_image_ids: Vec<ImageId>,
    /// The largest 3d point id ever assigned.
    pub(crate) max_point3d_id: u64,
    pub(crate) correspondence_graph: Option<Arc<CorrespondenceGraph>>,
}

impl Reconstruction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_cameras(&self) -> usize {
        self.cameras.len()
    }

    pub fn num_images(&self) -> usize {
        self.images.len()
    }

    pub fn num_reg_images(&self) -> usize {
        self.reg_image_ids.len()
    }

    pub fn num_points3d(&self) -> usize {
        self.points3d.len()
    }

    pub fn num_image_pairs(&self) -> usize {
        self.image_pair_stats.len()
    }

    pub fn exists_camera(&self, camera_id: CameraId) -> bool {
        self.cameras.contains_key(&camera_id)
    }

    pub fn exists_image(&self, image_id: ImageId) -> bool {
        self.images.contains_key(&image_id)
    }

    pub fn exists_point3d(&self, point3d_id: Point3DId) -> bool {
        self.points3d.contains_key(&point3d_id)
    }

    pub fn exists_image_pair(&self, image_id1: ImageId, image_id2: ImageId) -> bool {
        self.image_pair_stats
            .contains_key(&PairId::new(image_id1, image_id2))
    }

    pub fn is_image_registered(&self, image_id: ImageId) -> Result<bool> {
        Ok(self.image(image_id)?.is_registered())
    }

    pub fn camera(&self, camera_id: CameraId) -> Result<&Camera> {
        self.cameras
            .get(&camera_id)
            .ok_or(Error::CameraNotFound(camera_id))
    }

    pub fn camera_mut(&mut self, camera_id: CameraId) -> Result<&mut Camera> {
        self.cameras
            .get_mut(&camera_id)
            .ok_or(Error::CameraNotFound(camera_id))
    }

    pub fn image(&self, image_id: ImageId) -> Result<&Image> {
        self.images
            .get(&image_id)
            .ok_or(Error::ImageNotFound(image_id))
    }

    /// Mutable access to the name and pose of an image.
    pub fn image_mut(&mut self, image_id: ImageId) -> Result<&mut Image> {
        self.images
            .get_mut(&image_id)
            .ok_or(Error::ImageNotFound(image_id))
    }

    pub fn point3d(&self, point3d_id: Point3DId) -> Result<&Point3D> {
        self.points3d
            .get(&point3d_id)
            .ok_or(Error::Point3DNotFound(point3d_id))
    }

    /// Mutable access to the position, color and error of a point.
    pub fn point3d_mut(&mut self, point3d_id: Point3DId) -> Result<&mut Point3D> {
        self.points3d
            .get_mut(&point3d_id)
            .ok_or(Error::Point3DNotFound(point3d_id))
    }

    pub fn image_pair(&self, image_id1: ImageId, image_id2: ImageId) -> Result<&ImagePairStat> {
        let pair_id = PairId::new(image_id1, image_id2);
        self.image_pair_stats
            .get(&pair_id)
            .ok_or(Error::ImagePairNotFound(pair_id))
    }

    pub fn cameras(&self) -> impl Iterator<Item = (CameraId, &Camera)> + '_ {
        self.cameras.iter().map(|(&id, camera)| (id, camera))
    }

    pub fn images(&self) -> impl Iterator<Item = (ImageId, &Image)> + '_ {
        self.images.iter().map(|(&id, image)| (id, image))
    }

    pub fn points3d(&self) -> impl Iterator<Item = (Point3DId, &Point3D)> + '_ {
        self.points3d.iter().map(|(&id, point)| (id, point))
    }

    pub fn image_pairs(&self) -> impl Iterator<Item = (PairId, &ImagePairStat)> + '_ {
        self.image_pair_stats.iter().map(|(&id, stat)| (id, stat))
    }

    /// Registered images in registration order.
    pub fn reg_image_ids(&self) -> &[ImageId] {
        &self.reg_image_ids
    }

    /// All point ids in ascending order.
    pub fn point3d_ids(&self) -> Vec<Point3DId> {
        self.points3d.keys().copied().sorted().collect()
    }

    pub fn correspondence_graph(&self) -> Option<&Arc<CorrespondenceGraph>> {
        self.correspondence_graph.as_ref()
    }

    pub fn add_camera(&mut self, camera: Camera) -> Result<()> {
        if self.cameras.contains_key(&camera.camera_id) {
            return Err(Error::DuplicateCamera(camera.camera_id));
        }
        debug!("adding camera {}", camera.camera_id);
        self.cameras.insert(camera.camera_id, camera);
        Ok(())
    }

    /// Adds an image whose camera is already part of the reconstruction.
    ///
    /// The 2d points of the image must not be bound to any 3d point yet. If the image is
    /// flagged as registered it is appended to the registration index.
    pub fn add_image(&mut self, mut image: Image) -> Result<()> {
        let image_id = image.image_id();
        if self.images.contains_key(&image_id) {
            return Err(Error::DuplicateImage(image_id));
        }
        if !self.cameras.contains_key(&image.camera_id()) {
            return Err(Error::CameraNotFound(image.camera_id()));
        }
        if let Some((point2d_idx, _)) = image.triangulated().next() {
            return Err(Error::InvalidTrack(format!(
                "2d point {} of new image {} is already triangulated",
                point2d_idx, image_id
            )));
        }
        image.reset_correspondence_has_point3d();
        if image.is_registered() {
            self.reg_image_ids.push(image_id);
        }
        debug!("adding image {} ({})", image_id, image.name);
        self.images.insert(image_id, image);
        Ok(())
    }

    /// Adds a point under a freshly assigned id, binding every observation of the track to it.
    pub fn add_point3d(
        &mut self,
        xyz: Point3<f64>,
        track: Track,
        color: [u8; 3],
    ) -> Result<Point3DId> {
        let point3d_id = Point3DId(self.max_point3d_id + 1);
        self.add_point3d_with_id(point3d_id, xyz, track, color)?;
        Ok(point3d_id)
    }

    /// Adds a point under an explicit id.
    ///
    /// Later automatic ids are always larger than `point3d_id`.
    pub fn add_point3d_with_id(
        &mut self,
        point3d_id: Point3DId,
        xyz: Point3<f64>,
        track: Track,
        color: [u8; 3],
    ) -> Result<()> {
        if self.points3d.contains_key(&point3d_id) {
            return Err(Error::DuplicatePoint3D(point3d_id));
        }
        self.validate_new_track(&track)?;

        for element in track.iter() {
            self.images
                .get_mut(&element.image_id)
                .ok_or(Error::ImageNotFound(element.image_id))?
                .set_point3d_for_point2d(element.point2d_idx, point3d_id);
        }
        let elements = track.elements().to_vec();
        self.points3d
            .insert(point3d_id, Point3D::new(xyz, color, track));
        self.max_point3d_id = self.max_point3d_id.max(point3d_id.0);
        for element in elements {
            self.apply_triangulation_delta(element, point3d_id, TriangulationDelta::Add);
        }
        Ok(())
    }

    /// Adds one observation to an existing point.
    pub fn add_observation(&mut self, point3d_id: Point3DId, element: TrackElement) -> Result<()> {
        if !self.points3d.contains_key(&point3d_id) {
            return Err(Error::Point3DNotFound(point3d_id));
        }
        self.validate_untriangulated(element)?;

        self.images
            .get_mut(&element.image_id)
            .ok_or(Error::ImageNotFound(element.image_id))?
            .set_point3d_for_point2d(element.point2d_idx, point3d_id);
        self.points3d
            .get_mut(&point3d_id)
            .ok_or(Error::Point3DNotFound(point3d_id))?
            .track_mut()
            .add_element(element);
        self.apply_triangulation_delta(element, point3d_id, TriangulationDelta::Continue);
        Ok(())
    }

    /// Merges two points into a new one and returns its id.
    ///
    /// The position and color are averaged weighted by track length, or equally when neither
    /// point has observations. Both originals are deleted.
    pub fn merge_points3d(
        &mut self,
        point3d_id1: Point3DId,
        point3d_id2: Point3DId,
    ) -> Result<Point3DId> {
        if point3d_id1 == point3d_id2 {
            return Err(Error::InvalidArgument(format!(
                "cannot merge 3d point {} with itself",
                point3d_id1
            )));
        }
        let point1 = self.point3d(point3d_id1)?;
        let point2 = self.point3d(point3d_id2)?;

        // Points without observations, as imported from a point cloud, weigh equally.
        let (weight1, weight2) = match (point1.track().len(), point2.track().len()) {
            (0, 0) => (1.0, 1.0),
            (n1, n2) => (n1 as f64, n2 as f64),
        };
        let total = weight1 + weight2;
        let xyz = Point3::from((weight1 * point1.xyz.coords + weight2 * point2.xyz.coords) / total);
        let mut color = [0u8; 3];
        for (channel, (&c1, &c2)) in color
            .iter_mut()
            .zip(point1.color.iter().zip(point2.color.iter()))
        {
            *channel = ((weight1 * f64::from(c1) + weight2 * f64::from(c2)) / total)
                .round()
                .clamp(0.0, 255.0) as u8;
        }
        let error = match (point1.error, point2.error) {
            (Some(e1), Some(e2)) => Some((weight1 * e1 + weight2 * e2) / total),
            _ => None,
        };
        let track: Track = point1.track().iter().chain(point2.track().iter()).collect();

        self.delete_point3d(point3d_id1)?;
        self.delete_point3d(point3d_id2)?;
        let merged_id = self.add_point3d(xyz, track, color)?;
        self.point3d_mut(merged_id)?.error = error;
        debug!(
            "merged 3d points {} and {} into {}",
            point3d_id1, point3d_id2, merged_id
        );
        Ok(merged_id)
    }

    /// Deletes a point and unbinds all of its observations.
    pub fn delete_point3d(&mut self, point3d_id: Point3DId) -> Result<()> {
        let elements = self.point3d(point3d_id)?.track().elements().to_vec();
        for &element in &elements {
            self.apply_triangulation_delta(element, point3d_id, TriangulationDelta::Delete);
        }
        for element in elements {
            if let Some(image) = self.images.get_mut(&element.image_id) {
                image.reset_point3d_for_point2d(element.point2d_idx);
            }
        }
        self.points3d.remove(&point3d_id);
        Ok(())
    }

    /// Removes the observation at `point2d_idx` of an image from the point it belongs to.
    ///
    /// A point left with fewer than two observations is deleted entirely.
    pub fn delete_observation(&mut self, image_id: ImageId, point2d_idx: usize) -> Result<()> {
        let point3d_id = self.bound_point3d(image_id, point2d_idx)?;
        if self.point3d(point3d_id)?.track().len() <= 2 {
            return self.delete_point3d(point3d_id);
        }

        let element = TrackElement::new(image_id, point2d_idx);
        self.apply_triangulation_delta(element, point3d_id, TriangulationDelta::Remove);
        self.points3d
            .get_mut(&point3d_id)
            .ok_or(Error::Point3DNotFound(point3d_id))?
            .track_mut()
            .delete_element(element);
        self.images
            .get_mut(&image_id)
            .ok_or(Error::ImageNotFound(image_id))?
            .reset_point3d_for_point2d(point2d_idx);
        Ok(())
    }

    /// Deletes every observation of an image, returning how many there were.
    pub fn delete_observations_of_image(&mut self, image_id: ImageId) -> Result<usize> {
        let observations: Vec<usize> = self
            .image(image_id)?
            .triangulated()
            .map(|(point2d_idx, _)| point2d_idx)
            .collect();
        for &point2d_idx in &observations {
            // The observation may already be gone when an earlier deletion collapsed its point.
            if self.bound_point3d(image_id, point2d_idx).is_ok() {
                self.delete_observation(image_id, point2d_idx)?;
            }
        }
        Ok(observations.len())
    }

    /// Marks an image as part of the model. Registering twice has no effect.
    pub fn register_image(&mut self, image_id: ImageId) -> Result<()> {
        let image = self.image_mut(image_id)?;
        if !image.is_registered() {
            image.set_registered(true);
            self.reg_image_ids.push(image_id);
        }
        Ok(())
    }

    /// Removes an image from the model without touching its observations.
    pub fn deregister_image(&mut self, image_id: ImageId) -> Result<()> {
        let image = self.image_mut(image_id)?;
        if image.is_registered() {
            image.set_registered(false);
            self.reg_image_ids.retain(|&id| id != image_id);
        }
        Ok(())
    }

    /// Forgets every 2d point of every image and every 3d point.
    pub fn delete_all_points2d_and_points3d(&mut self) {
        info!(
            "deleting {} 3d points and the 2d points of {} images",
            self.points3d.len(),
            self.images.len()
        );
        self.points3d.clear();
        self.image_pair_stats.clear();
        for image in self.images.values_mut() {
            image.clear_points2d();
            image.set_correspondence_counts(0, 0);
        }
    }

    /// Verifies that tracks, image bindings and the registration index agree with each other.
    pub fn check_consistency(&self) -> Result<()> {
        let inconsistent = |message: String| Err(Error::Inconsistent(message));

        let mut registered = HashSet::new();
        for &image_id in &self.reg_image_ids {
            if !registered.insert(image_id) {
                return inconsistent(format!("image {} is registered twice", image_id));
            }
            match self.images.get(&image_id) {
                Some(image) if image.is_registered() => {}
                Some(_) => {
                    return inconsistent(format!(
                        "image {} is indexed but not flagged as registered",
                        image_id
                    ))
                }
                None => {
                    return inconsistent(format!("registered image {} does not exist", image_id))
                }
            }
        }

        for (&image_id, image) in &self.images {
            if image.image_id() != image_id {
                return inconsistent(format!("image {} is stored under id {}", image.image_id(), image_id));
            }
            if image.is_registered() && !registered.contains(&image_id) {
                return inconsistent(format!("registered image {} is not indexed", image_id));
            }
            if !self.cameras.contains_key(&image.camera_id()) {
                return inconsistent(format!(
                    "image {} refers to missing camera {}",
                    image_id,
                    image.camera_id()
                ));
            }
            let mut num_points3d = 0;
            for (point2d_idx, point3d_id) in image.triangulated() {
                num_points3d += 1;
                let element = TrackElement::new(image_id, point2d_idx);
                match self.points3d.get(&point3d_id) {
                    Some(point) if point.track().contains(element) => {}
                    Some(_) => {
                        return inconsistent(format!(
                            "2d point {} of image {} is bound to 3d point {} which does not observe it",
                            point2d_idx, image_id, point3d_id
                        ))
                    }
                    None => {
                        return inconsistent(format!(
                            "2d point {} of image {} is bound to missing 3d point {}",
                            point2d_idx, image_id, point3d_id
                        ))
                    }
                }
            }
            if num_points3d != image.num_points3d() {
                return inconsistent(format!(
                    "image {} counts {} 3d points but binds {}",
                    image_id,
                    image.num_points3d(),
                    num_points3d
                ));
            }
        }

        for (&point3d_id, point) in &self.points3d {
            if point3d_id.0 > self.max_point3d_id {
                return inconsistent(format!(
                    "3d point {} exceeds the largest assigned id {}",
                    point3d_id, self.max_point3d_id
                ));
            }
            if !point.track().iter().all_unique() {
                return inconsistent(format!("3d point {} has duplicate observations", point3d_id));
            }
            for element in point.track().iter() {
                let bound = self
                    .images
                    .get(&element.image_id)
                    .and_then(|image| image.point2d(element.point2d_idx))
                    .and_then(|point2d| point2d.point3d_id);
                if bound != Some(point3d_id) {
                    return inconsistent(format!(
                        "3d point {} observes 2d point {} of image {} which is not bound to it",
                        point3d_id, element.point2d_idx, element.image_id
                    ));
                }
            }
        }
        Ok(())
    }

    /// The point bound to an observation.
    pub(crate) fn bound_point3d(&self, image_id: ImageId, point2d_idx: usize) -> Result<Point3DId> {
        self.image(image_id)?
            .point2d(point2d_idx)
            .ok_or(Error::Point2DNotFound {
                image_id,
                point2d_idx,
            })?
            .point3d_id
            .ok_or(Error::ObservationNotTriangulated {
                image_id,
                point2d_idx,
            })
    }

    fn validate_untriangulated(&self, element: TrackElement) -> Result<()> {
        let point2d = self
            .image(element.image_id)?
            .point2d(element.point2d_idx)
            .ok_or(Error::Point2DNotFound {
                image_id: element.image_id,
                point2d_idx: element.point2d_idx,
            })?;
        if let Some(point3d_id) = point2d.point3d_id {
            return Err(Error::InvalidTrack(format!(
                "2d point {} of image {} is already triangulated as 3d point {}",
                element.point2d_idx, element.image_id, point3d_id
            )));
        }
        Ok(())
    }

    fn validate_new_track(&self, track: &Track) -> Result<()> {
        if !track.iter().all_unique() {
            return Err(Error::InvalidTrack(
                "track observes the same 2d point twice".to_string(),
            ));
        }
        for element in track.iter() {
            self.validate_untriangulated(element)?;
        }
        Ok(())
    }

    /// Updates visibility counts and pair statistics for one observation entering or leaving a point.
    ///
    /// Must be called while the observation is still bound to the point when removing, and after
    /// it is bound when adding. Without a correspondence graph the point's own track stands in
    /// for the correspondences.
    pub(crate) fn apply_triangulation_delta(
        &mut self,
        element: TrackElement,
        point3d_id: Point3DId,
        delta: TriangulationDelta,
    ) {
        let graph = self.correspondence_graph.clone();
        let corrs: Vec<TrackElement> = match graph.as_deref() {
            Some(graph) => graph
                .find_correspondences(element.image_id, element.point2d_idx)
                .to_vec(),
            None => self
                .points3d
                .get(&point3d_id)
                .map(|point| {
                    point
                        .track()
                        .iter()
                        .filter(|other| other.image_id != element.image_id)
                        .collect()
                })
                .unwrap_or_default(),
        };

        for corr in corrs {
            let corr_image = match self.images.get_mut(&corr.image_id) {
                Some(image) => image,
                None => continue,
            };
            if graph.is_some() {
                if delta.is_increment() {
                    corr_image.increment_correspondence_has_point3d(corr.point2d_idx);
                } else {
                    corr_image.decrement_correspondence_has_point3d(corr.point2d_idx);
                }
            }
            let same_point = corr_image
                .point2d(corr.point2d_idx)
                .and_then(|point2d| point2d.point3d_id)
                == Some(point3d_id);
            if !same_point || !(delta.counts_every_pair() || element.image_id < corr.image_id) {
                continue;
            }
            let pair_id = PairId::new(element.image_id, corr.image_id);
            if delta.is_increment() {
                self.image_pair_stats.entry(pair_id).or_default().num_tri_corrs += 1;
            } else {
                match self.image_pair_stats.get_mut(&pair_id) {
                    Some(stat) if stat.num_tri_corrs > 0 => stat.num_tri_corrs -= 1,
                    _ => warn!(
                        "image pair {} has no triangulated correspondence left to remove for 3d point {}",
                        pair_id, point3d_id
                    ),
                }
            }
        }
    }
}
