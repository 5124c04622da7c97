use crate::reconstruction::TriangulationDelta;
use crate::{
    Camera, CorrespondenceGraph, DatabaseCache, Error, Image, ImageId, ImagePairStat, Point2D,
    Reconstruction, Result, TrackElement,
};
use cv_core::nalgebra::Point3;
use log::*;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

impl Reconstruction {
    /// Populates cameras, images and pair statistics from a database cache.
    ///
    /// Images already in the reconstruction keep their pose and observations, but must carry
    /// the same name as in the cache. New images are added unregistered.
    pub fn load(&mut self, cache: &DatabaseCache) -> Result<()> {
        let graph = &cache.correspondence_graph;
        for (&image_id, image) in &cache.images {
            if !self.cameras.contains_key(&image.camera_id())
                && !cache.cameras.contains_key(&image.camera_id())
            {
                return Err(Error::CameraNotFound(image.camera_id()));
            }
            if let Some(existing) = self.images.get(&image_id) {
                if existing.name != image.name {
                    return Err(Error::InvalidArgument(format!(
                        "image {} is named {:?} but the database calls it {:?}",
                        image_id, existing.name, image.name
                    )));
                }
                if existing.num_points2d() != 0 && existing.num_points2d() != image.num_points2d() {
                    return Err(Error::InvalidArgument(format!(
                        "image {} has {} 2d points but the database has {}",
                        image_id,
                        existing.num_points2d(),
                        image.num_points2d()
                    )));
                }
            }
        }

        for (&camera_id, camera) in &cache.cameras {
            self.cameras
                .entry(camera_id)
                .or_insert_with(|| camera.clone());
        }

        for (&image_id, image) in &cache.images {
            let counts = (
                graph.num_observations_for_image(image_id),
                graph.num_correspondences_for_image(image_id),
            );
            match self.images.get_mut(&image_id) {
                Some(existing) => {
                    if existing.num_points2d() == 0 {
                        existing.set_points2d(image.points2d());
                    }
                    existing.set_correspondence_counts(counts.0, counts.1);
                }
                None => {
                    let mut new_image = image.clone();
                    new_image.set_points2d(image.points2d());
                    new_image.set_registered(false);
                    new_image.set_correspondence_counts(counts.0, counts.1);
                    self.images.insert(image_id, new_image);
                }
            }
        }

        self.seed_total_correspondences(graph);
        info!(
            "loaded {} cameras, {} images and {} image pairs",
            cache.cameras.len(),
            cache.images.len(),
            self.image_pair_stats.len()
        );
        Ok(())
    }

    /// Attaches the correspondence graph and rebuilds the pair statistics from it.
    pub fn set_up(&mut self, graph: Arc<CorrespondenceGraph>) -> Result<()> {
        if self.correspondence_graph.is_some() {
            return Err(Error::AlreadySetUp);
        }
        for (&image_id, image) in self.images.iter_mut() {
            image.reset_correspondence_has_point3d();
            image.set_correspondence_counts(
                graph.num_observations_for_image(image_id),
                graph.num_correspondences_for_image(image_id),
            );
        }
        self.image_pair_stats.clear();
        self.seed_total_correspondences(&graph);
        self.correspondence_graph = Some(graph);

        let observations: Vec<_> = self
            .reg_image_ids
            .iter()
            .filter_map(|image_id| self.images.get(image_id))
            .flat_map(|image| {
                let image_id = image.image_id();
                image
                    .triangulated()
                    .map(move |(point2d_idx, point3d_id)| {
                        (TrackElement::new(image_id, point2d_idx), point3d_id)
                    })
            })
            .collect();
        for &(element, point3d_id) in &observations {
            self.apply_triangulation_delta(element, point3d_id, TriangulationDelta::Add);
        }
        info!(
            "set up correspondence graph with {} images, re-triangulated {} observations",
            self.correspondence_graph
                .as_ref()
                .map_or(0, |graph| graph.num_images()),
            observations.len()
        );
        Ok(())
    }

    /// Drops every unregistered image, every camera no image uses anymore and the correspondence graph.
    pub fn tear_down(&mut self) -> Result<()> {
        let unregistered: Vec<ImageId> = self
            .images
            .values()
            .filter(|image| !image.is_registered())
            .map(Image::image_id)
            .collect();
        for &image_id in &unregistered {
            self.delete_observations_of_image(image_id)?;
        }
        for image_id in &unregistered {
            self.images.remove(image_id);
        }

        let used_cameras: HashSet<_> = self.images.values().map(Image::camera_id).collect();
        let num_cameras = self.cameras.len();
        self.cameras
            .retain(|camera_id, _| used_cameras.contains(camera_id));

        let images = &self.images;
        self.image_pair_stats.retain(|pair_id, _| {
            let (image_id1, image_id2) = pair_id.images();
            images.contains_key(&image_id1) && images.contains_key(&image_id2)
        });
        self.correspondence_graph = None;
        info!(
            "tore down {} unregistered images and {} unused cameras",
            unregistered.len(),
            num_cameras - self.cameras.len()
        );
        Ok(())
    }

    /// Sets `num_total_corrs` for every graph pair whose images are both present.
    pub(crate) fn seed_total_correspondences(&mut self, graph: &CorrespondenceGraph) {
        for (pair_id, num_corrs) in graph.image_pairs() {
            let (image_id1, image_id2) = pair_id.images();
            if self.images.contains_key(&image_id1) && self.images.contains_key(&image_id2) {
                self.image_pair_stats
                    .entry(pair_id)
                    .or_insert_with(ImagePairStat::default)
                    .num_total_corrs = num_corrs;
            }
        }
    }

    /// The total length of all tracks.
    pub fn compute_num_observations(&self) -> usize {
        self.points3d
            .values()
            .map(|point| point.track().len())
            .sum()
    }

    pub fn compute_mean_track_length(&self) -> f64 {
        if self.points3d.is_empty() {
            0.0
        } else {
            self.compute_num_observations() as f64 / self.points3d.len() as f64
        }
    }

    pub fn compute_mean_observations_per_reg_image(&self) -> f64 {
        if self.reg_image_ids.is_empty() {
            return 0.0;
        }
        let num_observations: usize = self
            .reg_image_ids
            .iter()
            .filter_map(|image_id| self.images.get(image_id))
            .map(Image::num_points3d)
            .sum();
        num_observations as f64 / self.reg_image_ids.len() as f64
    }

    /// The mean over all points whose error has been computed.
    pub fn compute_mean_reprojection_error(&self) -> f64 {
        let (sum, count) = self
            .points3d
            .values()
            .filter_map(|point| point.error)
            .fold((0.0, 0usize), |(sum, count), error| (sum + error, count + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// Stores in every point the mean of `residual` over its track.
    ///
    /// `residual` receives the camera and image of the observation, the observed 2d point and the
    /// 3d position, and returns the reprojection error in pixels.
    pub fn update_point3d_errors(
        &mut self,
        mut residual: impl FnMut(&Camera, &Image, &Point2D, &Point3<f64>) -> f64,
    ) {
        let cameras = &self.cameras;
        let images = &self.images;
        for point in self.points3d.values_mut() {
            let mut sum = 0.0;
            let mut count = 0usize;
            for element in point.track().iter() {
                let observation = images.get(&element.image_id).and_then(|image| {
                    let camera = cameras.get(&image.camera_id())?;
                    let point2d = image.point2d(element.point2d_idx)?;
                    Some((camera, image, point2d))
                });
                if let Some((camera, image, point2d)) = observation {
                    sum += residual(camera, image, point2d, &point.xyz);
                    count += 1;
                }
            }
            point.error = if count == 0 {
                None
            } else {
                Some(sum / count as f64)
            };
        }
    }

    pub fn find_image_with_name(&self, name: &str) -> Option<&Image> {
        self.images.values().find(|image| image.name == name)
    }

    /// Pairs up images registered in both reconstructions by name.
    ///
    /// Returns `(id in self, id in other)` in the registration order of `self`, since ids of
    /// independently built reconstructions need not agree.
    pub fn find_common_reg_image_ids(&self, other: &Reconstruction) -> Vec<(ImageId, ImageId)> {
        self.reg_image_ids
            .iter()
            .filter_map(|image_id| self.images.get(image_id))
            .filter_map(|image| {
                other
                    .find_image_with_name(&image.name)
                    .filter(|other_image| other_image.is_registered())
                    .map(|other_image| (image.image_id(), other_image.image_id()))
            })
            .collect()
    }

    /// Creates the directories under `root` that the image names refer to.
    pub fn create_image_dirs(&self, root: impl AsRef<Path>) -> Result<()> {
        let root = root.as_ref();
        let dirs: HashSet<_> = self
            .images
            .values()
            .filter_map(|image| root.join(&image.name).parent().map(Path::to_path_buf))
            .collect();
        for dir in &dirs {
            std::fs::create_dir_all(dir)?;
        }
        debug!("created {} image directories under {}", dirs.len(), root.display());
        Ok(())
    }
}

/// Summary numbers of a reconstruction, as printed by tools.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ReconstructionStatistics {
    pub num_cameras: usize,
    pub num_images: usize,
    pub num_reg_images: usize,
    pub num_points3d: usize,
    pub num_observations: usize,
    pub mean_track_length: f64,
    pub mean_observations_per_reg_image: f64,
    pub mean_reprojection_error: f64,
}

impl Reconstruction {
    pub fn statistics(&self) -> ReconstructionStatistics {
        ReconstructionStatistics {
            num_cameras: self.num_cameras(),
            num_images: self.num_images(),
            num_reg_images: self.num_reg_images(),
            num_points3d: self.num_points3d(),
            num_observations: self.compute_num_observations(),
            mean_track_length: self.compute_mean_track_length(),
            mean_observations_per_reg_image: self.compute_mean_observations_per_reg_image(),
            mean_reprojection_error: self.compute_mean_reprojection_error(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{CameraId, CameraModelId, Point3DId, Track};
    use cv_core::nalgebra::Point2;
    use cv_core::{Pose, WorldToCamera};

    /// Three images with three 2d points each, where slot `i` of every image corresponds to
    /// slot `i` of every other image. Camera 2 is only used by image 3.
    fn cache() -> DatabaseCache {
        let cameras = vec![
            Camera::with_focal_length(CameraId(1), CameraModelId::SimplePinhole, 100.0, 100, 100),
            Camera::with_focal_length(CameraId(2), CameraModelId::SimplePinhole, 100.0, 100, 100),
        ];
        let images = (1..=3u32).map(|id| {
            Image::new(
                ImageId(id),
                format!("dir{}/{}.png", id, id),
                CameraId(if id == 3 { 2 } else { 1 }),
                WorldToCamera::identity(),
                (0..3).map(|ix| Point2::new(ix as f64, 0.0)),
            )
        });
        let mut graph = CorrespondenceGraph::new();
        for id in 1..=3 {
            graph.add_image(ImageId(id), 3).unwrap();
        }
        let all = [(0, 0), (1, 1), (2, 2)];
        graph.add_correspondences(ImageId(1), ImageId(2), &all).unwrap();
        graph.add_correspondences(ImageId(1), ImageId(3), &all).unwrap();
        graph.add_correspondences(ImageId(2), ImageId(3), &all[..1]).unwrap();
        DatabaseCache::new(cameras, images, graph)
    }

    fn loaded() -> Reconstruction {
        let cache = cache();
        let mut reconstruction = Reconstruction::new();
        reconstruction.load(&cache).unwrap();
        reconstruction
            .set_up(cache.correspondence_graph.clone())
            .unwrap();
        reconstruction
    }

    fn track(elements: &[(u32, usize)]) -> Track {
        elements
            .iter()
            .map(|&(image_id, ix)| TrackElement::new(ImageId(image_id), ix))
            .collect()
    }

    #[test]
    fn load_seeds_counts_from_graph() {
        let reconstruction = loaded();
        assert_eq!(reconstruction.num_images(), 3);
        assert_eq!(reconstruction.num_reg_images(), 0);
        let image = reconstruction.image(ImageId(1)).unwrap();
        assert_eq!(image.num_observations(), 3);
        assert_eq!(image.num_correspondences(), 6);
        let stat = reconstruction.image_pair(ImageId(2), ImageId(1)).unwrap();
        assert_eq!(stat.num_total_corrs, 3);
        assert_eq!(stat.num_tri_corrs, 0);
        assert_eq!(
            reconstruction
                .image_pair(ImageId(2), ImageId(3))
                .unwrap()
                .num_total_corrs,
            1
        );
    }

    #[test]
    fn load_rejects_renamed_image() {
        let mut cache = cache();
        let mut reconstruction = Reconstruction::new();
        reconstruction.load(&cache).unwrap();
        if let Some(image) = cache.images.get_mut(&ImageId(2)) {
            image.name = "other.png".to_string();
        }
        assert!(matches!(
            reconstruction.load(&cache),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn set_up_twice_fails() {
        let mut reconstruction = loaded();
        let graph = Arc::new(CorrespondenceGraph::new());
        assert!(matches!(
            reconstruction.set_up(graph),
            Err(Error::AlreadySetUp)
        ));
        reconstruction.tear_down().unwrap();
        reconstruction
            .set_up(Arc::new(CorrespondenceGraph::new()))
            .unwrap();
    }

    #[test]
    fn triangulation_updates_visibility_through_graph() {
        let mut reconstruction = loaded();
        for id in 1..=3 {
            reconstruction.register_image(ImageId(id)).unwrap();
        }
        let id = reconstruction
            .add_point3d(Point3::origin(), track(&[(1, 0), (2, 0)]), [0; 3])
            .unwrap();
        // Slot 0 of image 3 corresponds to both observations.
        let image3 = reconstruction.image(ImageId(3)).unwrap();
        assert_eq!(image3.num_correspondences_have_point3d(0), 2);
        assert_eq!(image3.num_visible_points3d(), 1);
        assert_eq!(
            reconstruction
                .image_pair(ImageId(1), ImageId(2))
                .unwrap()
                .num_tri_corrs,
            1
        );

        reconstruction
            .add_observation(id, TrackElement::new(ImageId(3), 0))
            .unwrap();
        for (a, b) in [(1, 2), (1, 3), (2, 3)] {
            assert_eq!(
                reconstruction
                    .image_pair(ImageId(a), ImageId(b))
                    .unwrap()
                    .num_tri_corrs,
                1
            );
        }

        reconstruction.delete_observation(ImageId(3), 0).unwrap();
        assert_eq!(
            reconstruction
                .image_pair(ImageId(1), ImageId(3))
                .unwrap()
                .num_tri_corrs,
            0
        );
        reconstruction.delete_point3d(id).unwrap();
        let image1 = reconstruction.image(ImageId(1)).unwrap();
        assert_eq!(image1.num_visible_points3d(), 0);
        assert_eq!(
            reconstruction
                .image_pair(ImageId(1), ImageId(2))
                .unwrap()
                .num_tri_corrs,
            0
        );
        reconstruction.check_consistency().unwrap();
    }

    #[test]
    fn set_up_rebuilds_pair_statistics() {
        let cache = cache();
        let mut reconstruction = Reconstruction::new();
        reconstruction.load(&cache).unwrap();
        for id in 1..=3 {
            reconstruction.register_image(ImageId(id)).unwrap();
        }
        reconstruction
            .add_point3d(Point3::origin(), track(&[(1, 1), (2, 1)]), [0; 3])
            .unwrap();
        reconstruction
            .set_up(cache.correspondence_graph.clone())
            .unwrap();
        let stat = reconstruction.image_pair(ImageId(1), ImageId(2)).unwrap();
        assert_eq!(stat.num_tri_corrs, 1);
        assert_eq!(stat.num_total_corrs, 3);
        assert_eq!(
            reconstruction
                .image(ImageId(1))
                .unwrap()
                .num_correspondences_have_point3d(1),
            1
        );
    }

    #[test]
    fn tear_down_drops_unregistered_images_and_unused_cameras() {
        let mut reconstruction = loaded();
        reconstruction.register_image(ImageId(1)).unwrap();
        reconstruction.register_image(ImageId(2)).unwrap();
        reconstruction
            .add_point3d(Point3::origin(), track(&[(1, 0), (2, 0), (3, 0)]), [0; 3])
            .unwrap();
        reconstruction.tear_down().unwrap();
        assert_eq!(reconstruction.num_images(), 2);
        assert!(!reconstruction.exists_camera(CameraId(2)));
        assert!(reconstruction.correspondence_graph().is_none());
        let point = reconstruction.point3d(Point3DId(1)).unwrap();
        assert_eq!(point.track().len(), 2);
        assert!(!reconstruction.exists_image_pair(ImageId(1), ImageId(3)));
        reconstruction.check_consistency().unwrap();
    }

    #[test]
    fn deleting_after_tear_down_keeps_pair_counts_from_underflowing() {
        let mut reconstruction = loaded();
        reconstruction.register_image(ImageId(2)).unwrap();
        reconstruction.register_image(ImageId(3)).unwrap();
        // Slot 1 of images 2 and 3 do not correspond, so the graph counts nothing for the pair.
        let id = reconstruction
            .add_point3d(Point3::origin(), track(&[(2, 1), (3, 1)]), [0; 3])
            .unwrap();
        let stat = *reconstruction.image_pair(ImageId(2), ImageId(3)).unwrap();
        assert_eq!(stat.num_tri_corrs, 0);

        reconstruction.tear_down().unwrap();
        reconstruction.delete_point3d(id).unwrap();
        let stat = reconstruction.image_pair(ImageId(2), ImageId(3)).unwrap();
        assert_eq!(stat.num_tri_corrs, 0);
        assert_eq!(stat.num_total_corrs, 1);
        reconstruction.check_consistency().unwrap();
    }

    #[test]
    fn statistics_and_errors() {
        let mut reconstruction = loaded();
        for id in 1..=2 {
            reconstruction.register_image(ImageId(id)).unwrap();
        }
        reconstruction
            .add_point3d(Point3::new(0.0, 0.0, 1.0), track(&[(1, 0), (2, 0)]), [0; 3])
            .unwrap();
        reconstruction
            .add_point3d(
                Point3::new(0.0, 0.0, 2.0),
                track(&[(1, 1), (2, 1), (3, 1)]),
                [0; 3],
            )
            .unwrap();
        assert_eq!(reconstruction.compute_num_observations(), 5);
        assert!((reconstruction.compute_mean_track_length() - 2.5).abs() < 1e-12);
        assert!((reconstruction.compute_mean_observations_per_reg_image() - 2.0).abs() < 1e-12);
        assert_eq!(reconstruction.compute_mean_reprojection_error(), 0.0);

        reconstruction.update_point3d_errors(|_, _, point2d, xyz| point2d.xy.x + xyz.z);
        assert_eq!(reconstruction.point3d(Point3DId(1)).unwrap().error, Some(1.0));
        assert_eq!(reconstruction.point3d(Point3DId(2)).unwrap().error, Some(3.0));
        assert!((reconstruction.compute_mean_reprojection_error() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn finds_images_by_name() {
        let reconstruction = loaded();
        assert_eq!(
            reconstruction
                .find_image_with_name("dir2/2.png")
                .map(Image::image_id),
            Some(ImageId(2))
        );
        assert!(reconstruction.find_image_with_name("missing.png").is_none());
    }

    #[test]
    fn common_images_are_matched_by_name() {
        let mut registered = loaded();
        for id in [3, 1, 2] {
            registered.register_image(ImageId(id)).unwrap();
        }

        // The same files under different ids, and image 2's file is not registered.
        let mut other = Reconstruction::new();
        other
            .add_camera(Camera::with_focal_length(
                CameraId(7),
                CameraModelId::SimplePinhole,
                100.0,
                100,
                100,
            ))
            .unwrap();
        for (id, name) in [(10, "dir2/2.png"), (11, "dir1/1.png"), (12, "dir3/3.png")] {
            other
                .add_image(Image::new(
                    ImageId(id),
                    name,
                    CameraId(7),
                    WorldToCamera::identity(),
                    vec![],
                ))
                .unwrap();
        }
        other.register_image(ImageId(12)).unwrap();
        other.register_image(ImageId(11)).unwrap();

        assert_eq!(
            registered.find_common_reg_image_ids(&other),
            vec![(ImageId(3), ImageId(12)), (ImageId(1), ImageId(11))]
        );
        assert!(other.find_common_reg_image_ids(&Reconstruction::new()).is_empty());
    }

    #[test]
    fn creates_image_dirs() {
        let dir = tempfile::tempdir().unwrap();
        loaded().create_image_dirs(dir.path()).unwrap();
        assert!(dir.path().join("dir1").is_dir());
        assert!(dir.path().join("dir3").is_dir());
    }
}
