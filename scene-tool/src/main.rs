use cv_scene::nalgebra::Point3;
use cv_scene::{BoundingBox, Error, Reconstruction, ReconstructionSettings, Result};
use log::*;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

#[derive(StructOpt, Clone)]
#[structopt(name = "scene-tool", about = "A tool for inspecting and editing reconstructions")]
struct Opt {
    /// The file where settings are specified.
    ///
    /// This is in the format of `cv_scene::ReconstructionSettings`.
    #[structopt(short, long, default_value = "scene-settings.json")]
    settings: PathBuf,
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Clone)]
enum Command {
    /// Rewrites a model in the binary or the text form
    Convert {
        /// The model directory to read
        #[structopt(parse(from_os_str))]
        input: PathBuf,
        /// The model directory to write
        #[structopt(parse(from_os_str))]
        output: PathBuf,
        /// Write the human readable text form instead of the binary form
        #[structopt(long)]
        text: bool,
    },
    /// Exports the points of a model as a PLY point cloud
    ExportPly {
        #[structopt(parse(from_os_str))]
        input: PathBuf,
        /// The PLY file to write
        #[structopt(parse(from_os_str))]
        output: PathBuf,
    },
    /// Replaces the points of a model with the ones of a PLY point cloud
    ImportPly {
        #[structopt(parse(from_os_str))]
        input: PathBuf,
        /// The PLY file to read
        #[structopt(parse(from_os_str))]
        ply: PathBuf,
        #[structopt(parse(from_os_str))]
        output: PathBuf,
    },
    /// Filters points, observations and images with the configured thresholds
    CleanUp {
        #[structopt(parse(from_os_str))]
        input: PathBuf,
        #[structopt(parse(from_os_str))]
        output: PathBuf,
    },
    /// Centers and scales a model with the configured extent and percentiles
    Normalize {
        #[structopt(parse(from_os_str))]
        input: PathBuf,
        #[structopt(parse(from_os_str))]
        output: PathBuf,
    },
    /// Keeps only the points inside a bounding box
    Crop {
        #[structopt(parse(from_os_str))]
        input: PathBuf,
        #[structopt(parse(from_os_str))]
        output: PathBuf,
        /// The minimum corner as `x y z`
        #[structopt(long, number_of_values = 3, allow_hyphen_values = true)]
        min: Vec<f64>,
        /// The maximum corner as `x y z`
        #[structopt(long, number_of_values = 3, allow_hyphen_values = true)]
        max: Vec<f64>,
    },
    /// Colors the points from the images they were observed in
    Colors {
        #[structopt(parse(from_os_str))]
        input: PathBuf,
        /// The directory image names are relative to
        #[structopt(parse(from_os_str))]
        image_root: PathBuf,
        #[structopt(parse(from_os_str))]
        output: PathBuf,
    },
    /// Prints summary statistics of a model
    Stats {
        #[structopt(parse(from_os_str))]
        input: PathBuf,
    },
}

fn load_settings(path: &Path) -> ReconstructionSettings {
    let settings: Option<ReconstructionSettings> = std::fs::File::open(path)
        .ok()
        .and_then(|file| serde_json::from_reader(file).ok());
    if settings.is_some() {
        info!("loaded existing settings");
    } else {
        info!("used default settings");
    }
    settings.unwrap_or_default()
}

fn corner(coords: &[f64]) -> Result<Point3<f64>> {
    match *coords {
        [x, y, z] => Ok(Point3::new(x, y, z)),
        _ => Err(Error::InvalidArgument(format!(
            "a corner needs three coordinates, got {}",
            coords.len()
        ))),
    }
}

fn run(opt: Opt) -> Result<()> {
    let settings = load_settings(&opt.settings);
    match opt.command {
        Command::Convert {
            input,
            output,
            text,
        } => {
            let reconstruction = Reconstruction::read(input)?;
            if text {
                reconstruction.write_text(output)
            } else {
                reconstruction.write_binary(output)
            }
        }
        Command::ExportPly { input, output } => Reconstruction::read(input)?.export_ply(output),
        Command::ImportPly { input, ply, output } => {
            let mut reconstruction = Reconstruction::read(input)?;
            reconstruction.import_ply(ply)?;
            reconstruction.write(output)
        }
        Command::CleanUp { input, output } => {
            let mut reconstruction = Reconstruction::read(input)?;
            let summary = reconstruction.clean_up(&settings)?;
            info!(
                "removed {} filtered observations, {} observations behind cameras and images {:?}",
                summary.num_filtered_observations,
                summary.num_negative_depth_observations,
                summary.filtered_images
            );
            reconstruction.write(output)
        }
        Command::Normalize { input, output } => {
            let mut reconstruction = Reconstruction::read(input)?;
            let sim3 = reconstruction.normalize_with(&settings)?;
            info!("applied scale {} and translation {:?}", sim3.scale, sim3.translation.as_slice());
            reconstruction.write(output)
        }
        Command::Crop {
            input,
            output,
            min,
            max,
        } => {
            let bbox = BoundingBox::new(corner(&min)?, corner(&max)?);
            Reconstruction::read(input)?.crop(&bbox)?.write(output)
        }
        Command::Colors {
            input,
            image_root,
            output,
        } => {
            let mut reconstruction = Reconstruction::read(input)?;
            reconstruction.extract_colors_for_all_images(image_root);
            reconstruction.write(output)
        }
        Command::Stats { input } => {
            let stats = Reconstruction::read(input)?.statistics();
            println!("Cameras: {}", stats.num_cameras);
            println!("Images: {}", stats.num_images);
            println!("Registered images: {}", stats.num_reg_images);
            println!("Points: {}", stats.num_points3d);
            println!("Observations: {}", stats.num_observations);
            println!("Mean track length: {:.6}", stats.mean_track_length);
            println!(
                "Mean observations per image: {:.6}",
                stats.mean_observations_per_reg_image
            );
            println!("Mean reprojection error: {:.6}px", stats.mean_reprojection_error);
            Ok(())
        }
    }
}

fn main() {
    pretty_env_logger::init_timed();
    let opt = Opt::from_args();
    if let Err(e) = run(opt) {
        error!("{}", e);
        std::process::exit(1);
    }
}
