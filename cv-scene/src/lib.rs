//! A scene graph for multi-view reconstruction.
//!
//! A [`Reconstruction`] owns cameras, posed images and triangulated 3d points. Every point has a
//! [`Track`] of the 2d observations it was triangulated from, and every observation knows the point
//! it belongs to. All mutations go through the reconstruction so that the two sides, the
//! registration index and the per image pair statistics stay in agreement.
//!
//! The correspondence graph produced by feature matching is shared into a reconstruction with
//! [`Reconstruction::set_up`] and released again with [`Reconstruction::tear_down`].

mod bilinear;
mod camera;
mod colors;
mod correspondence_graph;
mod database_cache;
mod error;
mod export;
mod filter;
mod geometry;
mod ids;
mod image;
mod lifecycle;
mod persistence;
mod point;
mod reconstruction;
mod serialization;
mod settings;

pub use crate::image::{Image, Point2D};
pub use camera::*;
pub use correspondence_graph::*;
pub use database_cache::*;
pub use error::*;
pub use export::*;
pub use filter::*;
pub use geometry::*;
pub use ids::*;
pub use lifecycle::*;
pub use persistence::{BINARY_MODEL_FILE, TEXT_MODEL_FILE};
pub use point::*;
pub use reconstruction::ImagePairStat;
pub use reconstruction::Reconstruction;
pub use settings::*;

pub use cv_core::{self, nalgebra};
