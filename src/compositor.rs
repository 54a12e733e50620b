//! Per-output frame composition
//!
//! Ties the damage tracker and the renderer together the way a compositor's
//! render loop uses them: compute the damaged area of the back buffer, draw
//! every surface that intersects it, then present and commit the damage.

use std::time::SystemTime;

use cgmath::{Deg, Matrix4, Vector3};
use log::{debug, warn};

use crate::damage::{DamageError, OutputDamage};
use crate::output::{Output, OutputError, Transform};
use crate::region::Rect;
use crate::renderer::{self, Gpu, Matrix, Renderer, Surface};

/// A surface placed on an output
#[derive(Clone, Copy)]
pub struct PlacedSurface<'a> {
    pub surface: &'a dyn Surface,
    /// Position and size in output pixels
    pub geometry: Rect,
}

/// What happened while rendering one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub buffer_age: i32,
    /// Pixels repainted
    pub damage_area: u64,
    /// Surfaces drawn
    pub drawn: usize,
    /// Surfaces that failed to draw
    pub skipped: usize,
    /// Whether a buffer was presented
    pub presented: bool,
}

/// Clip-space rotation and flip taking the transformed layout to the buffer
fn output_transform_matrix(transform: Transform) -> Matrix4<f32> {
    let flip = if transform.is_flipped() { -1.0 } else { 1.0 };
    Matrix4::from_angle_z(Deg(transform.rotation_degrees()))
        * Matrix4::from_nonuniform_scale(flip, 1.0, 1.0)
}

/// Transform mapping the unit quad onto `geometry` of an output
///
/// `output_size` is the transformed resolution and `geometry` lives in that
/// space, top-left origin. The result addresses the untransformed buffer,
/// matching the viewport [`Renderer::begin`] sets.
pub fn surface_matrix(transform: Transform, output_size: (i32, i32), geometry: Rect) -> Matrix {
    let (width, height) = output_size;
    let projection = cgmath::ortho(0.0, width as f32, height as f32, 0.0, -1.0, 1.0);
    let placement = Matrix4::from_translation(Vector3::new(geometry.x as f32, geometry.y as f32, 0.0))
        * Matrix4::from_nonuniform_scale(geometry.width as f32, geometry.height as f32, 1.0);
    renderer::row_major(&(output_transform_matrix(transform) * projection * placement))
}

/// Renders one frame of `surfaces` (bottom to top) to the tracker's output
///
/// Surfaces outside the damaged area are not drawn. Nothing is presented if
/// the tracker reports that no swap is needed. Draw failures skip the
/// surface; only output failures abort the frame.
pub fn render_output<O, G>(
    damage: &OutputDamage<O>,
    renderer: &mut Renderer<G>,
    surfaces: &[PlacedSurface<'_>],
) -> Result<FrameStats, DamageError>
where
    O: Output + ?Sized + 'static,
    G: Gpu,
{
    let output = damage.output().ok_or(DamageError::Output(OutputError::Gone))?;
    let frame = damage.make_current()?;

    let mut stats = FrameStats {
        buffer_age: frame.buffer_age,
        damage_area: frame.damage.area(),
        ..FrameStats::default()
    };
    if !frame.needs_swap {
        debug!("Nothing to present");
        return Ok(stats);
    }

    {
        let mut render = renderer.begin(&*output);
        let (transform, size) = (output.transform(), output.transformed_resolution());
        for placed in surfaces {
            let mut visible = frame.damage.clone();
            visible.intersect_rect(placed.geometry);
            if visible.is_empty() {
                continue;
            }

            match render.draw_surface(placed.surface, &surface_matrix(transform, size, placed.geometry)) {
                Ok(()) => stats.drawn += 1,
                Err(e) => {
                    warn!("⚠️ Skipping surface at {}: {}", placed.geometry, e);
                    stats.skipped += 1;
                }
            }
        }
    }

    damage.swap_buffers(Some(SystemTime::now()), Some(&frame.damage))?;
    stats.presented = true;
    Ok(stats)
}
