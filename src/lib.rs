//! # wlframe
//!
//! Frame composition core for Wayland compositors.
//!
//! ## Architecture
//!
//! - `region`: rectangle and region set algebra in output pixel space
//! - `signal`: single-threaded publish/subscribe used for lifecycle events
//! - `output`: the output abstraction plus a headless implementation
//! - `damage`: buffer-age driven damage tracking per output
//! - `renderer`: GLES program setup and per-surface drawing
//! - `compositor`: one frame of damage-aware rendering for an output
//! - `config`: TOML configuration
//!
//! ## Usage
//!
//! ```rust
//! use std::rc::Rc;
//! use wlframe::compositor::render_output;
//! use wlframe::damage::OutputDamage;
//! use wlframe::output::HeadlessOutput;
//! use wlframe::region::Rect;
//! use wlframe::renderer::{RecordingGpu, Renderer};
//!
//! let output = Rc::new(HeadlessOutput::new(1280, 720));
//! let damage = OutputDamage::new(&output);
//! let mut renderer = Renderer::new(RecordingGpu::new());
//!
//! damage.add_box(Rect::new(0, 0, 64, 64));
//! let stats = render_output(&damage, &mut renderer, &[])?;
//! assert!(stats.presented);
//! # Ok::<(), wlframe::damage::DamageError>(())
//! ```

pub mod compositor;
pub mod config;
pub mod damage;
pub mod output;
pub mod region;
pub mod renderer;
pub mod signal;

// Re-export main types for easy access
pub use config::FrameConfig;
pub use damage::{DamageError, OutputDamage, HISTORY_LEN};
pub use output::{HeadlessOutput, Output, OutputError, Transform};
pub use region::{Rect, Region};
pub use renderer::{PixelFormat, RenderError, Renderer, Surface};

/// Version information for wlframe
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
