mod common;

use approx::assert_relative_eq;
use common::{scene, track};
use cv_scene::nalgebra::{Point3, Rotation3, Vector3};
use cv_scene::{BoundingBox, ImageId, Reconstruction, Sim3};

const CENTERS: [[f64; 3]; 6] = [
    [-3.0, 0.5, 0.0],
    [-1.0, 0.0, 0.2],
    [0.0, 1.0, -0.1],
    [1.5, -0.5, 0.0],
    [3.0, 0.0, 0.4],
    [40.0, 30.0, 2.0],
];

/// Points on a grid in front of the cameras, each seen by two neighbouring images.
fn populated() -> Reconstruction {
    let mut reconstruction = scene(&CENTERS, 9);
    for ix in 0..9 {
        let image = (ix % 5) as u32 + 1;
        reconstruction
            .add_point3d(
                Point3::new((ix % 3) as f64 - 1.0, (ix / 3) as f64 - 1.0, 6.0 + ix as f64),
                track(&[(image, ix), (image + 1, ix)]),
                [ix as u8; 3],
            )
            .unwrap();
    }
    reconstruction
}

#[test]
fn full_percentile_range_is_min_max_and_mean() {
    let reconstruction = populated();
    let points: Vec<Point3<f64>> = reconstruction.points3d().map(|(_, p)| p.xyz).collect();
    let result = reconstruction
        .compute_bounds_and_centroid(0.0, 1.0, false)
        .unwrap();
    for axis in 0..3 {
        let coords = points.iter().map(|p| p[axis]);
        let min = coords.clone().fold(f64::INFINITY, f64::min);
        let max = coords.clone().fold(f64::NEG_INFINITY, f64::max);
        let mean = coords.sum::<f64>() / points.len() as f64;
        assert_eq!(result.bounds.min[axis], min);
        assert_eq!(result.bounds.max[axis], max);
        assert_relative_eq!(result.centroid[axis], mean, epsilon = 1e-12);
    }
    assert_eq!(
        reconstruction.compute_centroid(0.0, 1.0).unwrap(),
        result.centroid
    );
    assert_eq!(
        reconstruction.compute_bounding_box(0.0, 1.0).unwrap(),
        result.bounds
    );
}

#[test]
fn camera_centers_ignore_the_outlier() {
    let reconstruction = populated();
    // Six samples put the 0.1 and 0.9 percentiles at indices 0 and 4 of each axis.
    let result = reconstruction
        .compute_bounds_and_centroid(0.1, 0.9, true)
        .unwrap();
    assert_relative_eq!(result.bounds.max, Point3::new(3.0, 1.0, 0.4), epsilon = 1e-12);
    assert_relative_eq!(result.bounds.min, Point3::new(-3.0, -0.5, -0.1), epsilon = 1e-12);
    assert_relative_eq!(result.centroid.x, 0.1, epsilon = 1e-12);
}

#[test]
fn normalize_twice_is_idempotent() {
    let mut reconstruction = populated();
    let first = reconstruction.normalize(10.0, 0.1, 0.9, true).unwrap();
    assert!((first.scale - 1.0).abs() > 1e-3);
    let bounds = reconstruction
        .compute_bounds_and_centroid(0.1, 0.9, true)
        .unwrap();
    assert_relative_eq!(bounds.bounds.diagonal(), 10.0, epsilon = 1e-9);
    assert_relative_eq!(bounds.centroid, Point3::origin(), epsilon = 1e-9);

    let before: Vec<_> = reconstruction.convert_to_ply();
    let second = reconstruction.normalize(10.0, 0.1, 0.9, true).unwrap();
    assert_relative_eq!(second.scale, 1.0, epsilon = 1e-9);
    assert_relative_eq!(second.translation, Vector3::zeros(), epsilon = 1e-9);
    for (a, b) in before.iter().zip(reconstruction.convert_to_ply()) {
        assert_relative_eq!(a.xyz, b.xyz, epsilon = 1e-9);
    }
}

#[test]
fn transform_keeps_points_in_front_of_their_cameras() {
    let mut reconstruction = populated();
    let sim3 = Sim3::new(
        0.25,
        Rotation3::from_euler_angles(0.3, 1.2, -0.4),
        Vector3::new(10.0, -5.0, 2.0),
    );
    reconstruction.transform(&sim3);
    assert_eq!(reconstruction.filter_observations_with_negative_depth(), 0);
    let image = reconstruction.image(ImageId(2)).unwrap();
    assert_relative_eq!(
        image.projection_center(),
        sim3.transform_point(&Point3::new(-1.0, 0.0, 0.2)),
        epsilon = 1e-9
    );
    reconstruction.check_consistency().unwrap();
}

#[test]
fn crop_keeps_only_points_inside() {
    let mut reconstruction = populated();
    reconstruction.deregister_image(ImageId(2)).unwrap();
    let bbox = BoundingBox::new(Point3::new(-1.0, -1.0, 5.0), Point3::new(0.0, 1.0, 12.0));
    let cropped = reconstruction.crop(&bbox).unwrap();

    let expected: Vec<_> = reconstruction
        .points3d()
        .filter(|(_, point)| bbox.contains(&point.xyz))
        .map(|(id, _)| id)
        .collect();
    assert!(!expected.is_empty());
    assert!(expected.len() < reconstruction.num_points3d());
    assert_eq!(cropped.num_points3d(), expected.len());
    for (id, point) in cropped.points3d() {
        assert!(bbox.contains(&point.xyz));
        assert_eq!(
            point.xyz,
            reconstruction.point3d(id).unwrap().xyz,
            "point {} moved",
            id
        );
    }
    for (image_id, image) in cropped.images() {
        if image.is_registered() {
            assert!(reconstruction.is_image_registered(image_id).unwrap());
        }
        assert!(image.num_points3d() > 0);
        assert!(cropped.exists_camera(image.camera_id()));
    }
    assert!(cropped.exists_image(ImageId(2)));
    assert!(!cropped.is_image_registered(ImageId(2)).unwrap());
    cropped.check_consistency().unwrap();

    // The source is untouched.
    assert_eq!(reconstruction.num_points3d(), 9);
}
