use crate::{Error, ImageId, PairId, Result, TrackElement};
use log::*;
use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
struct CorrespondenceImage {
    /// The number of 2d points with at least one correspondence.
    num_observations: usize,
    /// The total number of correspondences over all 2d points.
    num_correspondences: usize,
    /// Corresponding observations in other images for every 2d point.
    corrs: Vec<Vec<TrackElement>>,
}

/// Which 2d points across images are believed to depict the same physical point.
///
/// The graph is built once by the matching stage and then shared read-only with
/// any number of reconstructions.
#[derive(Clone, Debug, Default)]
pub struct CorrespondenceGraph {
    images: HashMap<ImageId, CorrespondenceImage>,
    pairs: HashMap<PairId, usize>,
}

impl CorrespondenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_images(&self) -> usize {
        self.images.len()
    }

    pub fn num_image_pairs(&self) -> usize {
        self.pairs.len()
    }

    pub fn exists_image(&self, image_id: ImageId) -> bool {
        self.images.contains_key(&image_id)
    }

    /// Adds an image with `num_points2d` slots and no correspondences.
    pub fn add_image(&mut self, image_id: ImageId, num_points2d: usize) -> Result<()> {
        if self.images.contains_key(&image_id) {
            return Err(Error::DuplicateImage(image_id));
        }
        self.images.insert(
            image_id,
            CorrespondenceImage {
                corrs: vec![vec![]; num_points2d],
                ..Default::default()
            },
        );
        Ok(())
    }

    /// Adds symmetric correspondences `(idx1, idx2)` between two images.
    ///
    /// Correspondences between an image and itself and ones that already exist are skipped.
    /// Returns the number of correspondences that were added.
    pub fn add_correspondences(
        &mut self,
        image_id1: ImageId,
        image_id2: ImageId,
        matches: &[(usize, usize)],
    ) -> Result<usize> {
        if image_id1 == image_id2 {
            warn!(
                "skipping {} correspondences of image {} with itself",
                matches.len(),
                image_id1
            );
            return Ok(0);
        }
        let len1 = self.slot_count(image_id1)?;
        let len2 = self.slot_count(image_id2)?;
        for &(idx1, idx2) in matches {
            if idx1 >= len1 {
                return Err(Error::Point2DNotFound {
                    image_id: image_id1,
                    point2d_idx: idx1,
                });
            }
            if idx2 >= len2 {
                return Err(Error::Point2DNotFound {
                    image_id: image_id2,
                    point2d_idx: idx2,
                });
            }
        }

        let mut added = 0;
        for &(idx1, idx2) in matches {
            let element1 = TrackElement::new(image_id1, idx1);
            let element2 = TrackElement::new(image_id2, idx2);
            if !self.link(element1, element2) {
                continue;
            }
            self.link(element2, element1);
            added += 1;
        }
        if added > 0 {
            *self.pairs.entry(PairId::new(image_id1, image_id2)).or_default() += added;
        }
        debug!(
            "added {} of {} correspondences between images {} and {}",
            added,
            matches.len(),
            image_id1,
            image_id2
        );
        Ok(added)
    }

    /// All observations in other images that correspond to the given one.
    pub fn find_correspondences(&self, image_id: ImageId, point2d_idx: usize) -> &[TrackElement] {
        self.images
            .get(&image_id)
            .and_then(|image| image.corrs.get(point2d_idx))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_correspondences(&self, image_id: ImageId, point2d_idx: usize) -> bool {
        !self.find_correspondences(image_id, point2d_idx).is_empty()
    }

    pub fn num_correspondences_between_images(&self, image_id1: ImageId, image_id2: ImageId) -> usize {
        self.pairs
            .get(&PairId::new(image_id1, image_id2))
            .copied()
            .unwrap_or(0)
    }

    pub fn num_observations_for_image(&self, image_id: ImageId) -> usize {
        self.images
            .get(&image_id)
            .map_or(0, |image| image.num_observations)
    }

    pub fn num_correspondences_for_image(&self, image_id: ImageId) -> usize {
        self.images
            .get(&image_id)
            .map_or(0, |image| image.num_correspondences)
    }

    /// Every image pair with at least one correspondence and its correspondence count.
    pub fn image_pairs(&self) -> impl Iterator<Item = (PairId, usize)> + '_ {
        self.pairs.iter().map(|(&pair_id, &count)| (pair_id, count))
    }

    fn slot_count(&self, image_id: ImageId) -> Result<usize> {
        self.images
            .get(&image_id)
            .map(|image| image.corrs.len())
            .ok_or(Error::ImageNotFound(image_id))
    }

    /// Records that `from` corresponds to `to`. Returns `false` if it was already known.
    fn link(&mut self, from: TrackElement, to: TrackElement) -> bool {
        let image = match self.images.get_mut(&from.image_id) {
            Some(image) => image,
            None => return false,
        };
        let corrs = &mut image.corrs[from.point2d_idx];
        if corrs.contains(&to) {
            return false;
        }
        if corrs.is_empty() {
            image.num_observations += 1;
        }
        corrs.push(to);
        image.num_correspondences += 1;
        true
    }
}
