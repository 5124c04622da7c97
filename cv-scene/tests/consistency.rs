mod common;

use approx::assert_relative_eq;
use common::{scene, track};
use cv_scene::nalgebra::Point3;
use cv_scene::{Error, ImageId, PairId, Point3DId, TrackElement};
use maplit::hashmap;
use std::collections::HashMap;

const LINE: [[f64; 3]; 4] = [
    [-1.0, 0.0, 0.0],
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [2.0, 0.0, 0.0],
];

fn tri_corrs(reconstruction: &cv_scene::Reconstruction) -> HashMap<PairId, usize> {
    reconstruction
        .image_pairs()
        .map(|(pair_id, stat)| (pair_id, stat.num_tri_corrs))
        .collect()
}

#[test]
fn small_triangulation_angles_remove_every_point() {
    let mut reconstruction = scene(&[[-0.1, 0.0, 0.0], [0.0, 0.0, 0.0], [0.1, 0.0, 0.0]], 2);
    assert_eq!(reconstruction.num_cameras(), 2);
    for ix in 0..2 {
        reconstruction
            .add_point3d(
                Point3::new(ix as f64, 0.0, 10.0),
                track(&[(1, ix), (2, ix), (3, ix)]),
                [0; 3],
            )
            .unwrap();
    }
    // The widest baseline sees the points under roughly 1.1 degrees.
    let removed = reconstruction
        .filter_points3d_with_small_triangulation_angle(5.0, reconstruction.point3d_ids());
    assert_eq!(removed, 6);
    assert_eq!(reconstruction.num_points3d(), 0);
    for image_id in 1..=3 {
        assert_eq!(
            reconstruction.image(ImageId(image_id)).unwrap().num_points3d(),
            0
        );
    }
    reconstruction.check_consistency().unwrap();
}

#[test]
fn merge_weights_by_track_length() {
    let mut reconstruction = scene(&LINE, 2);
    let a = reconstruction
        .add_point3d(Point3::new(0.0, 0.0, 5.0), track(&[(1, 0), (2, 0)]), [100, 0, 0])
        .unwrap();
    let b = reconstruction
        .add_point3d(
            Point3::new(5.0, 0.0, 10.0),
            track(&[(1, 1), (3, 0), (4, 0)]),
            [0, 200, 0],
        )
        .unwrap();
    let merged = reconstruction.merge_points3d(a, b).unwrap();

    assert!(merged > b);
    assert!(!reconstruction.exists_point3d(a));
    assert!(!reconstruction.exists_point3d(b));
    let point = reconstruction.point3d(merged).unwrap();
    assert_relative_eq!(point.xyz, Point3::new(3.0, 0.0, 8.0), epsilon = 1e-12);
    assert_eq!(point.color, [40, 120, 0]);
    assert_eq!(point.track().len(), 5);
    assert_eq!(
        reconstruction.image(ImageId(1)).unwrap().points2d()[1].point3d_id,
        Some(merged)
    );
    // Both observations in image 1 now pair with the one in image 3.
    assert_eq!(
        reconstruction
            .image_pair(ImageId(1), ImageId(3))
            .unwrap()
            .num_tri_corrs,
        2
    );
    reconstruction.check_consistency().unwrap();

    assert!(matches!(
        reconstruction.merge_points3d(merged, merged),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        reconstruction.merge_points3d(merged, a),
        Err(Error::Point3DNotFound(id)) if id == a
    ));
}

#[test]
fn deleting_from_a_two_view_track_deletes_the_point() {
    let mut reconstruction = scene(&LINE, 1);
    let id = reconstruction
        .add_point3d(Point3::new(0.0, 0.0, 5.0), track(&[(1, 0), (2, 0)]), [0; 3])
        .unwrap();
    reconstruction.delete_observation(ImageId(2), 0).unwrap();
    assert!(!reconstruction.exists_point3d(id));
    assert_eq!(reconstruction.image(ImageId(1)).unwrap().num_points3d(), 0);
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
fn deleting_from_a_long_track_decrements_each_pair_once() {
    let mut reconstruction = scene(&LINE, 1);
    let id = reconstruction
        .add_point3d(
            Point3::new(0.0, 0.0, 5.0),
            track(&[(1, 0), (2, 0), (3, 0), (4, 0)]),
            [0; 3],
        )
        .unwrap();
    let pair = |a, b| PairId::new(ImageId(a), ImageId(b));
    assert_eq!(
        tri_corrs(&reconstruction),
        hashmap! {
            pair(1, 2) => 1, pair(1, 3) => 1, pair(1, 4) => 1,
            pair(2, 3) => 1, pair(2, 4) => 1, pair(3, 4) => 1,
        }
    );

    reconstruction.delete_observation(ImageId(1), 0).unwrap();
    let point = reconstruction.point3d(id).unwrap();
    assert_eq!(point.track().len(), 3);
    assert!(!point.track().contains(TrackElement::new(ImageId(1), 0)));
    assert_eq!(
        tri_corrs(&reconstruction),
        hashmap! {
            pair(1, 2) => 0, pair(1, 3) => 0, pair(1, 4) => 0,
            pair(2, 3) => 1, pair(2, 4) => 1, pair(3, 4) => 1,
        }
    );
    reconstruction.check_consistency().unwrap();
}

#[test]
fn bindings_stay_consistent_over_mixed_edits() {
    let num_images = 4;
    let num_points2d = 12;
    let mut reconstruction = scene(&LINE, num_points2d);
    let mut ids: Vec<Point3DId> = vec![];
    for ix in 0..num_points2d {
        // Tracks of two to four images, starting at varying images.
        let len = 2 + ix % 3;
        let elements: Vec<(u32, usize)> = (0..len)
            .map(|k| (((ix + k) % num_images) as u32 + 1, ix))
            .collect();
        let id = reconstruction
            .add_point3d(Point3::new(ix as f64, 0.0, 5.0), track(&elements), [0; 3])
            .unwrap();
        ids.push(id);
        reconstruction.check_consistency().unwrap();
    }

    for (step, &id) in ids.iter().enumerate() {
        if !reconstruction.exists_point3d(id) {
            continue;
        }
        match step % 3 {
            0 => reconstruction.delete_point3d(id).unwrap(),
            1 => {
                let element = reconstruction.point3d(id).unwrap().track().elements()[0];
                reconstruction
                    .delete_observation(element.image_id, element.point2d_idx)
                    .unwrap();
            }
            _ => {
                let free = (1..=num_images as u32)
                    .map(ImageId)
                    .find(|&image_id| {
                        reconstruction
                            .image(image_id)
                            .unwrap()
                            .point2d(step)
                            .map_or(false, |point2d| !point2d.has_point3d())
                    });
                if let Some(image_id) = free {
                    reconstruction
                        .add_observation(id, TrackElement::new(image_id, step))
                        .unwrap();
                }
            }
        }
        reconstruction.check_consistency().unwrap();
    }

    let num_triangulated: usize = reconstruction
        .images()
        .map(|(_, image)| image.num_points3d())
        .sum();
    assert_eq!(num_triangulated, reconstruction.compute_num_observations());
}

#[test]
fn failed_mutations_leave_no_trace() {
    let mut reconstruction = scene(&LINE, 2);
    reconstruction
        .add_point3d(Point3::origin(), track(&[(1, 0), (2, 0)]), [0; 3])
        .unwrap();
    let before = tri_corrs(&reconstruction);

    // The second element collides, so the first must not be bound either.
    assert!(matches!(
        reconstruction.add_point3d(Point3::origin(), track(&[(3, 0), (1, 0)]), [0; 3]),
        Err(Error::InvalidTrack(_))
    ));
    assert!(matches!(
        reconstruction.add_point3d(Point3::origin(), track(&[(3, 0), (9, 0)]), [0; 3]),
        Err(Error::ImageNotFound(ImageId(9)))
    ));
    assert!(matches!(
        reconstruction.add_point3d(Point3::origin(), track(&[(3, 0), (4, 5)]), [0; 3]),
        Err(Error::Point2DNotFound { point2d_idx: 5, .. })
    ));
    assert_eq!(reconstruction.num_points3d(), 1);
    assert!(!reconstruction.image(ImageId(3)).unwrap().points2d()[0].has_point3d());
    assert_eq!(tri_corrs(&reconstruction), before);
    reconstruction.check_consistency().unwrap();
}
