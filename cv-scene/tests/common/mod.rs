#![allow(dead_code)]

use cv_scene::nalgebra::{IsometryMatrix3, Point2, Rotation3, Vector3};
use cv_scene::{
    Camera, CameraId, CameraModelId, Image, ImageId, Reconstruction, Track, TrackElement,
};
use cv_scene::cv_core::WorldToCamera;

/// An image whose camera sits at `center` looking down the +z axis.
pub fn image_at(id: u32, camera_id: u32, center: Vector3<f64>, num_points2d: usize) -> Image {
    let pose = WorldToCamera(IsometryMatrix3::from_parts(
        (-center).into(),
        Rotation3::identity(),
    ));
    Image::new(
        ImageId(id),
        format!("image{}.png", id),
        CameraId(camera_id),
        pose,
        (0..num_points2d).map(|ix| Point2::new(2.0 + ix as f64, 2.0)),
    )
}

pub fn camera(id: u32) -> Camera {
    Camera::with_focal_length(CameraId(id), CameraModelId::SimpleRadial, 640.0, 640, 480)
}

/// Registered images at the given centers, alternating between two cameras.
pub fn scene(centers: &[[f64; 3]], num_points2d: usize) -> Reconstruction {
    let mut reconstruction = Reconstruction::new();
    reconstruction.add_camera(camera(1)).unwrap();
    reconstruction.add_camera(camera(2)).unwrap();
    for (ix, &[x, y, z]) in centers.iter().enumerate() {
        let id = ix as u32 + 1;
        reconstruction
            .add_image(image_at(id, 1 + id % 2, Vector3::new(x, y, z), num_points2d))
            .unwrap();
        reconstruction.register_image(ImageId(id)).unwrap();
    }
    reconstruction
}

pub fn track(elements: &[(u32, usize)]) -> Track {
    elements
        .iter()
        .map(|&(image_id, ix)| TrackElement::new(ImageId(image_id), ix))
        .collect()
}
