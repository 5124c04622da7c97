use crate::{ImageId, TrackElement};
use cv_core::nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// The observations of one physical point across images.
///
/// Elements are kept in insertion order. A track never holds the same (image, point2d) twice.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    elements: Vec<TrackElement>,
}

impl Track {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elements(&self) -> &[TrackElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, element: TrackElement) -> bool {
        self.elements.contains(&element)
    }

    /// Appends an element unless it is already part of the track.
    ///
    /// Returns `true` if the element was added.
    pub fn add_element(&mut self, element: TrackElement) -> bool {
        if self.contains(element) {
            false
        } else {
            self.elements.push(element);
            true
        }
    }

    /// Removes the element, returning `true` if it was present.
    pub fn delete_element(&mut self, element: TrackElement) -> bool {
        if let Some(pos) = self.elements.iter().position(|&e| e == element) {
            self.elements.remove(pos);
            true
        } else {
            false
        }
    }

    /// Iterates over the images in the track, one entry per observation.
    pub fn image_ids(&self) -> impl Iterator<Item = ImageId> + '_ {
        self.elements.iter().map(|element| element.image_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = TrackElement> + '_ {
        self.elements.iter().copied()
    }
}

impl FromIterator<TrackElement> for Track {
    fn from_iter<I: IntoIterator<Item = TrackElement>>(iter: I) -> Self {
        let mut track = Track::new();
        for element in iter {
            track.add_element(element);
        }
        track
    }
}

impl<'a> IntoIterator for &'a Track {
    type Item = &'a TrackElement;
    type IntoIter = std::slice::Iter<'a, TrackElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

/// A triangulated point in the world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    #[serde(with = "crate::serialization::point3")]
    pub xyz: Point3<f64>,
    /// Black (`[0, 0, 0]`) means the color has not been extracted yet.
    pub color: [u8; 3],
    /// Mean reprojection error over the track in pixels, `None` if it was never computed.
    pub error: Option<f64>,
    track: Track,
}

impl Point3D {
    pub fn new(xyz: Point3<f64>, color: [u8; 3], track: Track) -> Self {
        Self {
            xyz,
            color,
            error: None,
            track,
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// The observations of this point. Only the [`Reconstruction`](crate::Reconstruction) may change them.
    pub fn track(&self) -> &Track {
        &self.track
    }

    pub(crate) fn track_mut(&mut self) -> &mut Track {
        &mut self.track
    }
}
