use crate::{Camera, CameraId, CorrespondenceGraph, Image, ImageId};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a reconstruction is bulk loaded from: cameras, images and the correspondences between images.
#[derive(Clone, Debug, Default)]
pub struct DatabaseCache {
    pub cameras: HashMap<CameraId, Camera>,
    pub images: HashMap<ImageId, Image>,
    pub correspondence_graph: Arc<CorrespondenceGraph>,
}

impl DatabaseCache {
    pub fn new(
        cameras: impl IntoIterator<Item = Camera>,
        images: impl IntoIterator<Item = Image>,
        correspondence_graph: CorrespondenceGraph,
    ) -> Self {
        Self {
            cameras: cameras
                .into_iter()
                .map(|camera| (camera.camera_id, camera))
                .collect(),
            images: images
                .into_iter()
                .map(|image| (image.image_id(), image))
                .collect(),
            correspondence_graph: Arc::new(correspondence_graph),
        }
    }

    pub fn find_image_with_name(&self, name: &str) -> Option<&Image> {
        self.images.values().find(|image| image.name == name)
    }
}
