//! Output abstraction consumed by the damage tracker and renderer
//!
//! An output is a display the compositor presents frames to. The frame core
//! does not own outputs; it only needs to query their geometry, make their
//! rendering context current, present buffers and listen to their lifecycle
//! signals. [`HeadlessOutput`] is a software implementation used by the
//! simulator and the test suite.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::region::{Rect, Region};
use crate::signal::Signal;

pub mod headless;

pub use headless::HeadlessOutput;

/// Errors reported by an output backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputError {
    /// No rendering context could be made current
    #[error("output has no rendering context available")]
    NoContext,
    /// The backend refused to present the frame
    #[error("failed to swap output buffers: {0}")]
    SwapFailed(String),
    /// The output was destroyed while still referenced
    #[error("output is gone")]
    Gone,
}

/// The eight `wl_output` transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transform {
    #[default]
    Normal,
    Rotated90,
    Rotated180,
    Rotated270,
    Flipped,
    Flipped90,
    Flipped180,
    Flipped270,
}

impl Transform {
    /// Whether the transform swaps the horizontal and vertical axes
    pub fn swaps_axes(&self) -> bool {
        matches!(
            self,
            Transform::Rotated90 | Transform::Rotated270 | Transform::Flipped90 | Transform::Flipped270
        )
    }

    /// Counter-clockwise rotation in degrees, applied after any flip
    pub fn rotation_degrees(&self) -> f32 {
        match self {
            Transform::Normal | Transform::Flipped => 0.0,
            Transform::Rotated90 | Transform::Flipped90 => 90.0,
            Transform::Rotated180 | Transform::Flipped180 => 180.0,
            Transform::Rotated270 | Transform::Flipped270 => 270.0,
        }
    }

    /// Whether the transform mirrors around the vertical axis
    pub fn is_flipped(&self) -> bool {
        matches!(
            self,
            Transform::Flipped | Transform::Flipped90 | Transform::Flipped180 | Transform::Flipped270
        )
    }

    /// Applies the transform to a mode size
    pub fn apply_to_size(&self, width: i32, height: i32) -> (i32, i32) {
        if self.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

/// Lifecycle signals emitted by an output
#[derive(Debug, Default)]
pub struct OutputEvents {
    pub destroy: Signal<()>,
    pub mode: Signal<()>,
    pub transform: Signal<()>,
    pub scale: Signal<()>,
    pub needs_swap: Signal<()>,
    pub frame: Signal<()>,
}

/// A display output as seen by the frame core
///
/// Methods take `&self`: outputs are shared between the compositor, the
/// damage tracker and signal listeners, all on one thread.
pub trait Output {
    /// Mode width in pixels
    fn width(&self) -> i32;

    /// Mode height in pixels
    fn height(&self) -> i32;

    fn transform(&self) -> Transform;

    fn scale(&self) -> f32;

    fn enabled(&self) -> bool;

    /// Whether the backend wants a swap regardless of tracked damage
    fn needs_swap(&self) -> bool;

    /// Damage the backend accumulated on its own
    fn pending_damage(&self) -> Region;

    /// Makes the rendering context current and returns the back buffer's age
    ///
    /// An age of `0` or less means the buffer contents are unknown.
    fn make_current(&self) -> Result<i32, OutputError>;

    /// Presents the back buffer
    fn swap_buffers(&self, when: Option<SystemTime>, damage: Option<&Region>)
        -> Result<(), OutputError>;

    /// Asks the backend to emit a `frame` signal on a later loop iteration
    fn schedule_frame(&self);

    fn events(&self) -> &OutputEvents;

    /// Mode size after applying the transform, in output pixels
    fn transformed_resolution(&self) -> (i32, i32) {
        self.transform().apply_to_size(self.width(), self.height())
    }

    /// Transformed resolution divided by the scale factor
    fn effective_resolution(&self) -> (i32, i32) {
        let (width, height) = self.transformed_resolution();
        let scale = self.scale();
        if scale <= 0.0 {
            return (width, height);
        }
        (
            (width as f32 / scale).round() as i32,
            (height as f32 / scale).round() as i32,
        )
    }

    /// The rectangle `[0,0] x transformed_resolution`
    fn transformed_box(&self) -> Rect {
        let (width, height) = self.transformed_resolution();
        Rect::new(0, 0, width, height)
    }
}
