use crate::bilinear::interpolate_bilinear;
use crate::{ImageId, Point3DId, Reconstruction, Result};
use image::RgbImage;
use log::*;
use std::collections::HashMap;
use std::path::Path;

const BLACK: [u8; 3] = [0, 0, 0];

fn open_rgb(path: &Path) -> Option<RgbImage> {
    match image::open(path) {
        Ok(image) => Some(image.to_rgb8()),
        Err(e) => {
            warn!("unable to read image {}: {}", path.display(), e);
            None
        }
    }
}

fn to_color(rgb: [f64; 3]) -> [u8; 3] {
    rgb.map(|channel| channel.round().clamp(0.0, 255.0) as u8)
}

impl Reconstruction {
    /// Colors the still black points observed by one image from its pixels.
    ///
    /// Returns `false` if the image file under `root` could not be read.
    pub fn extract_colors_for_image(
        &mut self,
        image_id: ImageId,
        root: impl AsRef<Path>,
    ) -> Result<bool> {
        let image = self.image(image_id)?;
        let bitmap = match open_rgb(&root.as_ref().join(&image.name)) {
            Some(bitmap) => bitmap,
            None => return Ok(false),
        };

        let samples: Vec<(Point3DId, [f64; 3])> = image
            .triangulated()
            .filter_map(|(point2d_idx, point3d_id)| {
                let xy = image.points2d()[point2d_idx].xy;
                interpolate_bilinear(&bitmap, xy.x - 0.5, xy.y - 0.5).map(|rgb| (point3d_id, rgb))
            })
            .collect();
        let mut num_colored = 0;
        for (point3d_id, rgb) in samples {
            let point = self.point3d_mut(point3d_id)?;
            if point.color == BLACK {
                point.color = to_color(rgb);
                num_colored += 1;
            }
        }
        debug!("colored {} points from image {}", num_colored, image_id);
        Ok(true)
    }

    /// Colors every point with the mean of its samples over all registered images.
    ///
    /// Points without any sample become black. Returns the number of images that could be read.
    pub fn extract_colors_for_all_images(&mut self, root: impl AsRef<Path>) -> usize {
        let mut sums: HashMap<Point3DId, ([f64; 3], usize)> = HashMap::new();
        let mut num_read = 0;
        for image_id in &self.reg_image_ids {
            let image = match self.images.get(image_id) {
                Some(image) => image,
                None => continue,
            };
            let bitmap = match open_rgb(&root.as_ref().join(&image.name)) {
                Some(bitmap) => bitmap,
                None => continue,
            };
            num_read += 1;
            for (point2d_idx, point3d_id) in image.triangulated() {
                let xy = image.points2d()[point2d_idx].xy;
                if let Some(rgb) = interpolate_bilinear(&bitmap, xy.x - 0.5, xy.y - 0.5) {
                    let (sum, count) = sums.entry(point3d_id).or_insert(([0.0; 3], 0));
                    for (total, channel) in sum.iter_mut().zip(rgb) {
                        *total += channel;
                    }
                    *count += 1;
                }
            }
        }

        for (point3d_id, point) in self.points3d.iter_mut() {
            point.color = match sums.get(point3d_id) {
                Some(&(sum, count)) if count > 0 => to_color(sum.map(|total| total / count as f64)),
                _ => BLACK,
            };
        }
        info!(
            "extracted colors of {} points from {} of {} registered images",
            sums.len(),
            num_read,
            self.reg_image_ids.len()
        );
        num_read
    }
}
