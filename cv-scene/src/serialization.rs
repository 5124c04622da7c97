//! Plain array forms of the geometric types stored in a model.
//!
//! Used through `#[serde(with = "...")]` so the on-disk layout does not depend on the serde
//! support of the linear algebra crate.

pub(crate) mod point2 {
    use cv_core::nalgebra::Point2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(point: &Point2<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        [point.x, point.y].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Point2<f64>, D::Error> {
        let [x, y] = <[f64; 2]>::deserialize(deserializer)?;
        Ok(Point2::new(x, y))
    }
}

pub(crate) mod point3 {
    use cv_core::nalgebra::Point3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(point: &Point3<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        [point.x, point.y, point.z].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Point3<f64>, D::Error> {
        let [x, y, z] = <[f64; 3]>::deserialize(deserializer)?;
        Ok(Point3::new(x, y, z))
    }
}

pub(crate) mod world_to_camera {
    use cv_core::nalgebra::{IsometryMatrix3, Matrix3, Rotation3, Translation3};
    use cv_core::WorldToCamera;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Row major rotation matrix and translation.
    #[derive(Serialize, Deserialize)]
    struct PoseForm {
        rotation: [[f64; 3]; 3],
        translation: [f64; 3],
    }

    pub fn serialize<S: Serializer>(pose: &WorldToCamera, serializer: S) -> Result<S::Ok, S::Error> {
        let m = pose.0.rotation.matrix();
        let row = |r: usize| [m[(r, 0)], m[(r, 1)], m[(r, 2)]];
        let t = &pose.0.translation.vector;
        PoseForm {
            rotation: [row(0), row(1), row(2)],
            translation: [t.x, t.y, t.z],
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<WorldToCamera, D::Error> {
        let PoseForm {
            rotation: [r0, r1, r2],
            translation: [x, y, z],
        } = PoseForm::deserialize(deserializer)?;
        let rotation = Rotation3::from_matrix_unchecked(Matrix3::new(
            r0[0], r0[1], r0[2], r1[0], r1[1], r1[2], r2[0], r2[1], r2[2],
        ));
        Ok(WorldToCamera(IsometryMatrix3::from_parts(
            Translation3::new(x, y, z),
            rotation,
        )))
    }
}
