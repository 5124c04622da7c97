use crate::reconstruction::TriangulationDelta;
use crate::{Camera, Error, Image, ImageId, Point3D, Point3DId, Reconstruction, Result};
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name of the binary model inside a model directory.
pub const BINARY_MODEL_FILE: &str = "reconstruction.bin";
/// File name of the text model inside a model directory.
pub const TEXT_MODEL_FILE: &str = "reconstruction.json";

/// The on-disk form of a reconstruction. Pair statistics are derived and not stored.
#[derive(Serialize, Deserialize)]
struct ModelRecord {
    cameras: Vec<Camera>,
    images: Vec<Image>,
    points3d: Vec<(Point3DId, Point3D)>,
    reg_image_ids: Vec<ImageId>,
    max_point3d_id: u64,
}

impl From<&Reconstruction> for ModelRecord {
    fn from(reconstruction: &Reconstruction) -> Self {
        let mut cameras: Vec<Camera> = reconstruction.cameras.values().cloned().collect();
        cameras.sort_unstable_by_key(|camera| camera.camera_id);
        let mut images: Vec<Image> = reconstruction.images.values().cloned().collect();
        images.sort_unstable_by_key(Image::image_id);
        let mut points3d: Vec<(Point3DId, Point3D)> = reconstruction
            .points3d
            .iter()
            .map(|(&id, point)| (id, point.clone()))
            .collect();
        points3d.sort_unstable_by_key(|&(id, _)| id);
        Self {
            cameras,
            images,
            points3d,
            reg_image_ids: reconstruction.reg_image_ids.clone(),
            max_point3d_id: reconstruction.max_point3d_id,
        }
    }
}

impl TryFrom<ModelRecord> for Reconstruction {
    type Error = Error;

    fn try_from(record: ModelRecord) -> Result<Self> {
        let mut reconstruction = Reconstruction::new();
        for camera in record.cameras {
            reconstruction.add_camera(camera)?;
        }
        let mut images = HashMap::new();
        for image in record.images {
            let image_id = image.image_id();
            if images.insert(image_id, image).is_some() {
                return Err(Error::DuplicateImage(image_id));
            }
        }
        reconstruction.images = images;
        let mut points3d = HashMap::new();
        for (point3d_id, point) in record.points3d {
            if points3d.insert(point3d_id, point).is_some() {
                return Err(Error::DuplicatePoint3D(point3d_id));
            }
        }
        reconstruction.points3d = points3d;
        reconstruction.reg_image_ids = record.reg_image_ids;
        reconstruction.max_point3d_id = record.max_point3d_id;
        reconstruction.check_consistency()?;

        for point3d_id in reconstruction.point3d_ids() {
            let elements = reconstruction.point3d(point3d_id)?.track().elements().to_vec();
            for element in elements {
                reconstruction.apply_triangulation_delta(element, point3d_id, TriangulationDelta::Add);
            }
        }
        Ok(reconstruction)
    }
}

fn model_file(path: &Path, name: &str) -> PathBuf {
    path.join(name)
}

impl Reconstruction {
    /// Reads the model in `path`, preferring the binary file if both forms exist.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if model_file(path, BINARY_MODEL_FILE).is_file() {
            Self::read_binary(path)
        } else if model_file(path, TEXT_MODEL_FILE).is_file() {
            Self::read_text(path)
        } else {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no model found in {}", path.display()),
            )))
        }
    }

    /// Writes the binary model into the directory `path`, creating it if needed.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_binary(path)
    }

    pub fn read_binary(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(model_file(path.as_ref(), BINARY_MODEL_FILE))?;
        let record: ModelRecord = bincode::deserialize_from(BufReader::new(file))?;
        let reconstruction = Self::try_from(record)?;
        reconstruction.log_read(path.as_ref());
        Ok(reconstruction)
    }

    pub fn read_text(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(model_file(path.as_ref(), TEXT_MODEL_FILE))?;
        let record: ModelRecord = serde_json::from_reader(BufReader::new(file))?;
        let reconstruction = Self::try_from(record)?;
        reconstruction.log_read(path.as_ref());
        Ok(reconstruction)
    }

    pub fn write_binary(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let mut writer = BufWriter::new(File::create(model_file(path, BINARY_MODEL_FILE))?);
        bincode::serialize_into(&mut writer, &ModelRecord::from(self))?;
        writer.flush()?;
        self.log_write(path);
        Ok(())
    }

    pub fn write_text(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let mut writer = BufWriter::new(File::create(model_file(path, TEXT_MODEL_FILE))?);
        serde_json::to_writer_pretty(&mut writer, &ModelRecord::from(self))?;
        writer.flush()?;
        self.log_write(path);
        Ok(())
    }

    fn log_read(&self, path: &Path) {
        info!(
            "read {} cameras, {} images and {} 3d points from {}",
            self.num_cameras(),
            self.num_images(),
            self.num_points3d(),
            path.display()
        );
    }

    fn log_write(&self, path: &Path) {
        info!(
            "wrote {} cameras, {} images and {} 3d points to {}",
            self.num_cameras(),
            self.num_images(),
            self.num_points3d(),
            path.display()
        );
    }
}
