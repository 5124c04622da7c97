use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// The largest number of images a pair identifier can encode.
///
/// This matches the database encoding so pair identifiers can be shared with it.
pub const MAX_NUM_IMAGES: u64 = 2_147_483_647;

/// Identifies a [`Camera`](crate::Camera) in a reconstruction.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into, Serialize, Deserialize,
)]
pub struct CameraId(pub u32);

/// Identifies an [`Image`](crate::Image) in a reconstruction.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into, Serialize, Deserialize,
)]
pub struct ImageId(pub u32);

/// Identifies a [`Point3D`](crate::Point3D) in a reconstruction.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into, Serialize, Deserialize,
)]
pub struct Point3DId(pub u64);

/// Identifies an unordered pair of images.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into, Serialize, Deserialize,
)]
pub struct PairId(pub u64);

impl PairId {
    /// Creates a new pair, cannonicalizing the order of the pair.
    pub fn new(a: ImageId, b: ImageId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self(MAX_NUM_IMAGES * u64::from(low.0) + u64::from(high.0))
    }

    /// Decodes the two images of the pair, smallest first.
    pub fn images(self) -> (ImageId, ImageId) {
        let high = self.0 % MAX_NUM_IMAGES;
        let low = (self.0 - high) / MAX_NUM_IMAGES;
        (ImageId(low as u32), ImageId(high as u32))
    }
}

/// A single observation of a 3d point: the image and the index of the 2d point in it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackElement {
    pub image_id: ImageId,
    pub point2d_idx: usize,
}

impl TrackElement {
    pub fn new(image_id: ImageId, point2d_idx: usize) -> Self {
        Self {
            image_id,
            point2d_idx,
        }
    }
}
