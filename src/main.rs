//! # wlframe - headless frame-loop simulator
//!
//! Drives the damage tracker and the renderer against a headless output with
//! a recording GPU backend. Surfaces move around the output, the tracker turns
//! their movement into damage, and every frame reports how much of the output
//! had to be repainted for the buffer age the swapchain handed out.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};

use wlframe::compositor::{render_output, FrameStats, PlacedSurface};
use wlframe::config::FrameConfig;
use wlframe::damage::OutputDamage;
use wlframe::output::{HeadlessOutput, Output};
use wlframe::region::Rect;
use wlframe::renderer::{PixelFormat, RecordingGpu, Renderer, Surface};

#[derive(Parser)]
#[command(name = "wlframe")]
#[command(about = "Simulates damage-tracked frame composition on a headless output")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Number of frames to simulate (overrides the configuration)
    #[arg(short, long)]
    frames: Option<u32>,

    /// Output width in pixels (overrides the configuration)
    #[arg(long)]
    width: Option<i32>,

    /// Output height in pixels (overrides the configuration)
    #[arg(long)]
    height: Option<i32>,
}

/// A client surface with fixed contents
struct SimSurface {
    format: PixelFormat,
    geometry: Cell<Rect>,
    binds: Cell<u64>,
}

impl Surface for SimSurface {
    fn format(&self) -> u32 {
        self.format.to_gl()
    }

    fn is_valid(&self) -> bool {
        true
    }

    fn bind(&self) {
        self.binds.set(self.binds.get() + 1);
    }
}

fn load_config(cli: &Cli) -> Result<FrameConfig> {
    let mut config = match &cli.config {
        Some(path) => FrameConfig::load(path)?,
        None => FrameConfig::default(),
    };
    if let Some(frames) = cli.frames {
        config.simulation.frames = frames;
    }
    if let Some(width) = cli.width {
        config.output.width = width;
    }
    if let Some(height) = cli.height {
        config.output.height = height;
    }
    config.validate().context("Invalid configuration after CLI overrides")?;
    Ok(config)
}

/// Lays surfaces out diagonally, alternating pixel formats
fn spawn_surfaces(config: &FrameConfig) -> Vec<SimSurface> {
    let size = config.simulation.surface_size;
    (0..config.simulation.surfaces as i32)
        .map(|i| SimSurface {
            format: if i % 2 == 0 { PixelFormat::Rgba } else { PixelFormat::Rgb },
            geometry: Cell::new(Rect::new(i * size / 2, i * size / 2, size, size)),
            binds: Cell::new(0),
        })
        .collect()
}

/// Moves animated surfaces and damages both their old and new position
fn animate(
    surfaces: &[SimSurface],
    animated: usize,
    damage: &OutputDamage<HeadlessOutput>,
    bounds: (i32, i32),
) {
    for (i, surface) in surfaces.iter().take(animated).enumerate() {
        let old = surface.geometry.get();
        let step = 8 + i as i32 * 4;
        let x = (old.x + step).rem_euclid(bounds.0.max(1));
        let new = Rect::new(x, old.y, old.width, old.height);
        surface.geometry.set(new);

        damage.add_box(old);
        damage.add_box(new);
    }
}

fn run(config: &FrameConfig) -> Result<Vec<FrameStats>> {
    let output = Rc::new(HeadlessOutput::with_buffer_count(
        config.output.width,
        config.output.height,
        config.output.buffer_count,
    ));
    output.set_transform(config.output.transform);
    output.set_scale(config.output.scale);

    let damage = OutputDamage::new(&output);
    let mut renderer = Renderer::with_clear_color(RecordingGpu::new(), config.renderer.clear_color);
    renderer.init().context("Failed to initialize renderer")?;

    let frame_pending = Rc::new(Cell::new(false));
    {
        let frame_pending = Rc::clone(&frame_pending);
        damage.events().frame.add(move |_| frame_pending.set(true));
    }

    let surfaces = spawn_surfaces(config);
    let animated = config.simulation.animated_surfaces as usize;
    damage.add_whole();

    let mut history = Vec::with_capacity(config.simulation.frames as usize);
    for frame in 1..=config.simulation.frames {
        if frame == config.simulation.mode_change_at {
            let (w, h) = (output.width(), output.height());
            info!("🔁 Frame {}: switching mode to {}x{}", frame, h, w);
            output.set_mode(h, w);
        }

        animate(&surfaces, animated, &damage, output.transformed_resolution());

        // Vblank: the output asks for a frame, the tracker forwards it
        output.send_frame();
        if !frame_pending.replace(false) {
            continue;
        }

        let placed: Vec<PlacedSurface<'_>> = surfaces
            .iter()
            .map(|s| PlacedSurface {
                surface: s as &dyn Surface,
                geometry: s.geometry.get(),
            })
            .collect();

        let stats = match render_output(&damage, &mut renderer, &placed) {
            Ok(stats) => stats,
            Err(e) => {
                warn!("⚠️ Frame {} failed: {}", frame, e);
                continue;
            }
        };
        debug!(
            "Frame {}: age={} damage={}px drawn={} presented={}",
            frame, stats.buffer_age, stats.damage_area, stats.drawn, stats.presented
        );
        history.push(stats);
    }

    info!(
        "🎨 GPU recorded {} draws across {} frames ({} texture binds)",
        renderer.gpu().draw_count(),
        renderer.frames_rendered(),
        surfaces.iter().map(|s| s.binds.get()).sum::<u64>()
    );
    Ok(history)
}

fn summarize(config: &FrameConfig, history: &[FrameStats]) {
    let full = (config.output.width as u64) * (config.output.height as u64);
    let presented = history.iter().filter(|s| s.presented).count();
    let repainted: u64 = history.iter().map(|s| s.damage_area).sum();
    let worst_case = full * presented as u64;

    info!("📊 Presented {} of {} frames", presented, config.simulation.frames);
    if worst_case > 0 {
        info!(
            "📉 Repainted {} px, {:.1}% of full redraws",
            repainted,
            repainted as f64 * 100.0 / worst_case as f64
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("🚀 Starting wlframe {}", wlframe::VERSION);
    info!(
        "📄 Built {} from {}",
        env!("WLFRAME_BUILD_DATE"),
        env!("WLFRAME_GIT_COMMIT")
    );

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Failed to load configuration: {:#}", e);
            return Err(e);
        }
    };

    let history = run(&config)?;
    summarize(&config, &history);

    info!("👋 Simulation finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["wlframe"]).unwrap();
        assert!(!cli.debug);
        assert!(cli.config.is_none());
        assert!(cli.frames.is_none());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from(["wlframe", "--debug", "--frames", "5", "--width", "640"])
            .unwrap();
        assert!(cli.debug);
        assert_eq!(cli.frames, Some(5));
        assert_eq!(cli.width, Some(640));
    }

    #[test]
    fn test_cli_overrides_are_validated() {
        let cli = Cli::try_parse_from(["wlframe", "--width", "0"]).unwrap();
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_simulation_presents_every_frame_with_animation() {
        let mut config = FrameConfig::default();
        config.output.width = 320;
        config.output.height = 240;
        config.simulation.frames = 6;
        config.simulation.surfaces = 2;
        config.simulation.surface_size = 32;

        let history = run(&config).unwrap();
        assert_eq!(history.len(), 6);
        assert!(history.iter().all(|s| s.presented));
        // Warm-up frames have unknown buffer ages and repaint everything
        assert_eq!(history[0].damage_area, 320 * 240);
        // Afterwards only the moving surface is repainted
        assert!(history[5].damage_area < 320 * 240);
    }

    #[test]
    fn test_static_scene_stops_presenting() {
        let mut config = FrameConfig::default();
        config.output.width = 100;
        config.output.height = 100;
        config.simulation.frames = 6;
        config.simulation.surfaces = 1;
        config.simulation.animated_surfaces = 0;

        let history = run(&config).unwrap();
        // Every frame is forwarded while the output is enabled
        assert_eq!(history.len(), 6);
        // Both buffers start with unknown age and get a full repaint; after
        // that nothing is damaged, so no swap is needed
        let presented: Vec<bool> = history.iter().map(|s| s.presented).collect();
        assert_eq!(presented, [true, true, false, false, false, false]);
        assert_eq!(history[2].buffer_age, 2);
        assert_eq!(history[2].damage_area, 0);
    }
}
