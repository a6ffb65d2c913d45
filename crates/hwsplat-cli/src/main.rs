use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hwsplat_raster::synthetic::{axis_camera, axis_line, random_cloud};
use hwsplat_raster::{render_reference, FrameCamera, FrameReport, GaussianStore, OrbitCamera, RenderSettings, SceneIngest};
use hwsplat_render::{HeadlessConfig, HeadlessRenderer};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hwsplat")]
#[command(about = "Hardware-rasterized 3D Gaussian splatting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive viewer window
    View {
        #[command(flatten)]
        scene: SceneArgs,
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Render one frame on the GPU and write it as PNG
    Snapshot {
        #[command(flatten)]
        scene: SceneArgs,
        #[command(flatten)]
        settings: SettingsArgs,
        #[command(flatten)]
        camera: CameraArgs,
        #[arg(short, long, default_value = "snapshot.png")]
        output: PathBuf,
    },

    /// Render one frame with the CPU reference and write it as PNG
    Reference {
        #[command(flatten)]
        scene: SceneArgs,
        #[command(flatten)]
        settings: SettingsArgs,
        #[command(flatten)]
        camera: CameraArgs,
        #[arg(short, long, default_value = "reference.png")]
        output: PathBuf,
    },

    /// Print scene statistics and the effective settings
    Info {
        #[command(flatten)]
        scene: SceneArgs,
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Write the default settings as JSON
    WriteSettings {
        #[arg(short, long, default_value = "settings.json")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct SceneArgs {
    /// Scene file (JSON with raw, unactivated attributes)
    #[arg(long)]
    scene: Option<PathBuf>,
    /// Gaussians along the viewing axis at these depths, e.g. "1,2,3"
    #[arg(long, value_delimiter = ',')]
    line: Option<Vec<f32>>,
    /// Synthetic cloud size when no scene is given
    #[arg(short, long, default_value = "10000")]
    count: usize,
    #[arg(long, default_value = "42")]
    seed: u64,
}

#[derive(Args)]
struct SettingsArgs {
    /// Settings file (JSON); flags below override it
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Draw gaussians as blended quads
    #[arg(long)]
    quads: bool,
    /// Skip the point path
    #[arg(long)]
    no_points: bool,
    #[arg(long)]
    back_to_front: bool,
    /// Ordered per-pixel compositing instead of fixed-function blending
    #[arg(long)]
    software_blending: bool,
    #[arg(long)]
    antialiasing: bool,
    #[arg(long)]
    scale_modifier: Option<f32>,
    #[arg(long)]
    min_opacity: Option<f32>,
    /// Gaussian to report in the log
    #[arg(long)]
    selected: Option<u32>,
}

#[derive(Args)]
struct CameraArgs {
    #[arg(long, default_value = "1280")]
    width: u32,
    #[arg(long, default_value = "720")]
    height: u32,
    /// Orbit azimuth in degrees
    #[arg(long, default_value = "0")]
    theta: f32,
    /// Orbit elevation in degrees
    #[arg(long, default_value = "0")]
    phi: f32,
    /// Orbit distance; fitted to the scene when omitted
    #[arg(long)]
    distance: Option<f32>,
    /// Turn the scene half a revolution about +x (scenes stored with y down)
    #[arg(long)]
    flip_scene: bool,
}

impl SceneArgs {
    fn load(&self) -> Result<GaussianStore> {
        if let Some(path) = &self.scene {
            let ingest = SceneIngest::load_json(path)
                .with_context(|| format!("Failed to read scene {}", path.display()))?;
            return Ok(GaussianStore::from_ingest(&ingest)?);
        }
        if let Some(depths) = &self.line {
            return Ok(axis_line(depths, 0.5));
        }
        tracing::info!("Generating {} synthetic gaussians (seed {})", self.count, self.seed);
        Ok(random_cloud(self.count, self.seed))
    }
}

impl SettingsArgs {
    fn resolve(&self) -> Result<RenderSettings> {
        let mut s = match &self.settings {
            Some(path) => RenderSettings::load(path)
                .with_context(|| format!("Failed to read settings {}", path.display()))?,
            None => RenderSettings::default(),
        };
        s.render_quads |= self.quads;
        s.render_points &= !self.no_points;
        s.front_to_back &= !self.back_to_front;
        s.software_blending |= self.software_blending;
        s.antialiasing |= self.antialiasing;
        if let Some(v) = self.scale_modifier {
            s.scale_modifier = v;
        }
        if let Some(v) = self.min_opacity {
            s.min_opacity = v;
        }
        if self.selected.is_some() {
            s.selected_gaussian = self.selected;
        }
        Ok(s.sanitized())
    }
}

impl CameraArgs {
    fn frame(&self, scene: &SceneArgs, store: &GaussianStore) -> FrameCamera {
        if scene.scene.is_none() && scene.line.is_some() {
            let camera = axis_camera(self.width, self.height);
            return if self.flip_scene { camera.flipped_upright() } else { camera };
        }
        let mut camera = store
            .bounds()
            .map(|(min, max)| OrbitCamera::fit_bounds(min, max))
            .unwrap_or_default();
        if self.flip_scene {
            camera.toggle_flip();
        }
        camera.theta = self.theta.to_radians();
        camera.phi = self.phi.to_radians();
        if let Some(d) = self.distance {
            camera.distance = d;
        }
        camera.frame(self.width, self.height)
    }
}

fn write_png(path: &Path, width: u32, height: u32, rgba: Vec<u8>) -> Result<()> {
    let image = image::RgbaImage::from_raw(width, height, rgba)
        .context("Pixel buffer does not match image size")?;
    image
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}x{} image to {}", width, height, path.display());
    Ok(())
}

fn print_report(report: &FrameReport) {
    println!("Visible gaussians: {}", report.visible_count);
    for (stage, time) in &report.stages {
        println!("  {:<10} {:>8.3} ms", stage.to_string(), time.as_secs_f64() * 1e3);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::View { scene, settings } => {
            let store = scene.load()?;
            let settings = settings.resolve()?;
            hwsplat_render::run(store, settings)?;
        }

        Commands::Snapshot {
            scene: scene_args,
            settings,
            camera,
            output,
        } => {
            let store = scene_args.load()?;
            let settings = settings.resolve()?;
            let frame_camera = camera.frame(&scene_args, &store);

            let config = HeadlessConfig {
                width: camera.width,
                height: camera.height,
            };
            let mut renderer = pollster::block_on(HeadlessRenderer::new(config, &store))
                .context("Failed to create headless renderer")?;
            let (report, frame) = renderer.render(&frame_camera, &settings)?;
            if let Some(selected) = &report.selected {
                println!("Selected: gaussian {} at slot {}", selected.index, selected.slot);
                println!("Footprint: {:?}", selected.footprint);
            }

            print_report(&report);
            write_png(&output, frame.width, frame.height, frame.data)?;
        }

        Commands::Reference {
            scene: scene_args,
            settings,
            camera,
            output,
        } => {
            let store = scene_args.load()?;
            let settings = settings.resolve()?;
            let frame_camera = camera.frame(&scene_args, &store);

            let frame = render_reference(&store, &frame_camera, &settings);
            if let Some((gaussian, footprint)) = &frame.selected {
                println!("Selected: {:?}", gaussian);
                println!("Footprint: {:?}", footprint);
            }

            print_report(&frame.report);
            write_png(&output, frame.image.width, frame.image.height, frame.image.to_rgba8())?;
        }

        Commands::Info { scene, settings } => {
            let store = scene.load()?;
            let settings = settings.resolve()?;

            println!("Gaussians: {}", store.len());
            if let Some((min, max)) = store.bounds() {
                println!("Bounds:");
                println!("  Min: ({:.4}, {:.4}, {:.4})", min.x, min.y, min.z);
                println!("  Max: ({:.4}, {:.4}, {:.4})", max.x, max.y, max.z);
            }
            if !store.is_empty() {
                let mean_opacity = store.opacities.iter().sum::<f32>() / store.len() as f32;
                println!("Mean opacity: {:.4}", mean_opacity);
            }
            println!("\nSettings:");
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }

        Commands::WriteSettings { output } => {
            RenderSettings::default()
                .save(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote default settings to {}", output.display());
        }
    }

    Ok(())
}
