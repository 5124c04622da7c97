use crate::{CameraId, ImageId, PairId, Point3DId};
use thiserror::Error;

/// Everything that can go wrong while mutating, querying or persisting a [`Reconstruction`](crate::Reconstruction).
#[derive(Debug, Error)]
pub enum Error {
    #[error("camera {0} does not exist")]
    CameraNotFound(CameraId),
    #[error("image {0} does not exist")]
    ImageNotFound(ImageId),
    #[error("3d point {0} does not exist")]
    Point3DNotFound(Point3DId),
    #[error("image pair {0} has no statistics")]
    ImagePairNotFound(PairId),
    #[error("image {image_id} has no 2d point {point2d_idx}")]
    Point2DNotFound {
        image_id: ImageId,
        point2d_idx: usize,
    },
    #[error("2d point {point2d_idx} of image {image_id} is not triangulated")]
    ObservationNotTriangulated {
        image_id: ImageId,
        point2d_idx: usize,
    },
    #[error("camera {0} already exists")]
    DuplicateCamera(CameraId),
    #[error("image {0} already exists")]
    DuplicateImage(ImageId),
    #[error("3d point {0} already exists")]
    DuplicatePoint3D(Point3DId),
    #[error("invalid track: {0}")]
    InvalidTrack(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("a correspondence graph is already attached; call tear_down first")]
    AlreadySetUp,
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("binary model codec failure: {0}")]
    Binary(#[from] bincode::Error),
    #[error("text model codec failure: {0}")]
    Text(#[from] serde_json::Error),
    #[error("model on disk is inconsistent: {0}")]
    Inconsistent(String),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
