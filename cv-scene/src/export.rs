use crate::{Error, Reconstruction, Result, Track};
use cv_core::nalgebra::Point3;
use log::*;
use ply_rs::{
    parser::Parser,
    ply::{
        Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
        ScalarType,
    },
    writer::Writer,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// A colored point as stored in a PLY file.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlyPoint {
    pub xyz: Point3<f64>,
    pub color: [u8; 3],
}

/// Writes the points as the `vertex` element of an ASCII PLY file.
pub fn write_ply(mut writer: impl Write, points: &[PlyPoint]) -> Result<()> {
    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;
    ply.header
        .comments
        .push("Exported from rust-cv/cv-scene".to_string());

    let mut point_element = ElementDef::new("vertex".to_string());
    for axis in ["x", "y", "z"] {
        let p = PropertyDef::new(axis.to_string(), PropertyType::Scalar(ScalarType::Double));
        point_element.properties.add(p);
    }
    for channel in ["red", "green", "blue"] {
        let p = PropertyDef::new(channel.to_string(), PropertyType::Scalar(ScalarType::UChar));
        point_element.properties.add(p);
    }
    ply.header.elements.add(point_element);

    let vertices = points
        .iter()
        .map(|&PlyPoint { xyz, color: [r, g, b] }| {
            let mut point = DefaultElement::new();
            point.insert("x".to_string(), Property::Double(xyz.x));
            point.insert("y".to_string(), Property::Double(xyz.y));
            point.insert("z".to_string(), Property::Double(xyz.z));
            point.insert("red".to_string(), Property::UChar(r));
            point.insert("green".to_string(), Property::UChar(g));
            point.insert("blue".to_string(), Property::UChar(b));
            point
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertices);

    let w = Writer::new();
    w.write_ply(&mut writer, &mut ply)?;
    Ok(())
}

fn scalar(element: &DefaultElement, name: &str) -> Result<f64> {
    match element.get(name) {
        Some(&Property::Double(v)) => Ok(v),
        Some(&Property::Float(v)) => Ok(f64::from(v)),
        Some(&Property::Int(v)) => Ok(f64::from(v)),
        Some(&Property::UInt(v)) => Ok(f64::from(v)),
        Some(&Property::Short(v)) => Ok(f64::from(v)),
        Some(&Property::UShort(v)) => Ok(f64::from(v)),
        Some(&Property::Char(v)) => Ok(f64::from(v)),
        Some(&Property::UChar(v)) => Ok(f64::from(v)),
        _ => Err(Error::Inconsistent(format!(
            "PLY vertex has no scalar property {:?}",
            name
        ))),
    }
}

fn channel(element: &DefaultElement, name: &str) -> u8 {
    match element.get(name) {
        Some(&Property::UChar(v)) => v,
        Some(&Property::Float(v)) => (v.clamp(0.0, 1.0) * 255.0).round() as u8,
        Some(&Property::Double(v)) => (v.clamp(0.0, 1.0) * 255.0).round() as u8,
        _ => 0,
    }
}

/// Reads the `vertex` element of a PLY file. Missing colors are black.
pub fn read_ply(mut reader: impl Read) -> Result<Vec<PlyPoint>> {
    let mut reader = BufReader::new(&mut reader);
    let ply = Parser::<DefaultElement>::new().read_ply(&mut reader)?;
    let vertices = match ply.payload.get("vertex") {
        Some(vertices) => vertices,
        None => return Ok(vec![]),
    };
    vertices
        .iter()
        .map(|vertex| {
            Ok(PlyPoint {
                xyz: Point3::new(
                    scalar(vertex, "x")?,
                    scalar(vertex, "y")?,
                    scalar(vertex, "z")?,
                ),
                color: [
                    channel(vertex, "red"),
                    channel(vertex, "green"),
                    channel(vertex, "blue"),
                ],
            })
        })
        .collect()
}

impl Reconstruction {
    /// Every point with its color, ordered by point id.
    pub fn convert_to_ply(&self) -> Vec<PlyPoint> {
        self.point3d_ids()
            .into_iter()
            .filter_map(|point3d_id| self.points3d.get(&point3d_id))
            .map(|point| PlyPoint {
                xyz: point.xyz,
                color: point.color,
            })
            .collect()
    }

    pub fn export_ply(&self, path: impl AsRef<Path>) -> Result<()> {
        let points = self.convert_to_ply();
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        write_ply(&mut writer, &points)?;
        writer.flush()?;
        info!(
            "exported {} points to {}",
            points.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    /// Replaces all points with the ones in a PLY file. Returns the number of imported points.
    pub fn import_ply(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let points = read_ply(File::open(path.as_ref())?)?;
        let num_points = self.import_ply_points(&points)?;
        info!(
            "imported {} points from {}",
            num_points,
            path.as_ref().display()
        );
        Ok(num_points)
    }

    /// Replaces all points with untracked points at the given positions.
    pub fn import_ply_points(&mut self, points: &[PlyPoint]) -> Result<usize> {
        for point3d_id in self.point3d_ids() {
            self.delete_point3d(point3d_id)?;
        }
        for point in points {
            self.add_point3d(point.xyz, Track::new(), point.color)?;
        }
        Ok(points.len())
    }
}
