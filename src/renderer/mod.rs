//! Surface renderer
//!
//! The renderer owns one GPU program per supported pixel format and a shared
//! unit quad. Every surface is drawn as that quad, placed on the output by a
//! caller-supplied matrix that already combines projection and placement.
//!
//! ```
//! use wlframe::output::HeadlessOutput;
//! use wlframe::renderer::gpu::RecordingGpu;
//! use wlframe::renderer::{Renderer, IDENTITY};
//! # use wlframe::renderer::Surface;
//! # struct Opaque;
//! # impl Surface for Opaque {
//! #     fn format(&self) -> u32 { gl::RGB }
//! #     fn is_valid(&self) -> bool { true }
//! #     fn bind(&self) {}
//! # }
//! # let surface = Opaque;
//!
//! let output = HeadlessOutput::new(640, 480);
//! let mut renderer = Renderer::new(RecordingGpu::new());
//!
//! let mut frame = renderer.begin(&output);
//! frame.draw_surface(&surface, &IDENTITY)?;
//! frame.finish();
//! # Ok::<(), wlframe::renderer::RenderError>(())
//! ```

use std::fmt;

use log::{debug, error, info, trace};
use thiserror::Error;

use crate::output::Output;

pub mod gpu;
pub mod shaders;

pub use gpu::{GlGpu, Gpu, QuadVertex, RecordingGpu, ShaderStage};

/// Row-major 4x4 matrix
pub type Matrix = [f32; 16];

/// The identity transform
pub const IDENTITY: Matrix = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0, //
];

/// Background color used by [`Renderer::new`]
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.25, 0.25, 0.25, 1.0];

/// Unit square covering `[0,1]²` in both position and texture space
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { position: [1.0, 1.0], tex_coords: [1.0, 1.0] }, // bottom right
    QuadVertex { position: [1.0, 0.0], tex_coords: [1.0, 0.0] }, // top right
    QuadVertex { position: [0.0, 0.0], tex_coords: [0.0, 0.0] }, // top left
    QuadVertex { position: [0.0, 1.0], tex_coords: [0.0, 1.0] }, // bottom left
];

/// Two triangles sharing the top-right to bottom-left diagonal
pub const QUAD_INDICES: [u32; 6] = [0, 1, 3, 1, 2, 3];

/// Converts a column-major `cgmath` matrix into the renderer's row-major layout
pub fn row_major(matrix: &cgmath::Matrix4<f32>) -> Matrix {
    use cgmath::Matrix as _;
    let rows: [[f32; 4]; 4] = matrix.transpose().into();
    bytemuck::cast(rows)
}

/// Pixel formats the renderer has programs for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 2] = [PixelFormat::Rgb, PixelFormat::Rgba];

    /// Maps a GL texture format; anything else is unsupported
    pub fn from_gl(format: u32) -> Option<Self> {
        match format {
            gl::RGB => Some(PixelFormat::Rgb),
            gl::RGBA => Some(PixelFormat::Rgba),
            _ => None,
        }
    }

    pub fn to_gl(self) -> u32 {
        match self {
            PixelFormat::Rgb => gl::RGB,
            PixelFormat::Rgba => gl::RGBA,
        }
    }

    fn fragment_source(self) -> &'static str {
        match self {
            PixelFormat::Rgb => shaders::RGB_FRAGMENT_SHADER,
            PixelFormat::Rgba => shaders::RGBA_FRAGMENT_SHADER,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Rgb => f.write_str("RGB"),
            PixelFormat::Rgba => f.write_str("RGBA"),
        }
    }
}

/// Pixel storage the renderer can draw
///
/// The renderer never allocates or frees surfaces.
pub trait Surface {
    /// GL texture format of the surface contents
    fn format(&self) -> u32;

    fn is_valid(&self) -> bool;

    /// Makes the surface's pixels the active texture
    fn bind(&self);
}

/// Renderer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("failed to compile {stage} shader: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },
    #[error("failed to link {format} program: {log}")]
    ProgramLink { format: PixelFormat, log: String },
    #[error("renderer is unusable after a failed initialization")]
    Unusable,
    #[error("surface is not valid")]
    InvalidSurface,
    #[error("unsupported surface format {0:#x}")]
    UnsupportedFormat(u32),
}

#[derive(Debug, Clone, Copy)]
struct Programs<P> {
    rgb: P,
    rgba: P,
}

impl<P: Copy> Programs<P> {
    fn get(&self, format: PixelFormat) -> P {
        match format {
            PixelFormat::Rgb => self.rgb,
            PixelFormat::Rgba => self.rgba,
        }
    }
}

enum State<G: Gpu> {
    Uninitialized,
    Ready {
        programs: Programs<G::Program>,
        quad: G::Quad,
    },
    /// Initialization failed; never retried
    Failed,
    Destroyed,
}

/// Draws surfaces onto the current output
pub struct Renderer<G: Gpu> {
    gpu: G,
    state: State<G>,
    clear_color: [f32; 4],
    in_frame: bool,
    frames: u64,
}

impl<G: Gpu> Renderer<G> {
    pub fn new(gpu: G) -> Self {
        Self::with_clear_color(gpu, DEFAULT_CLEAR_COLOR)
    }

    pub fn with_clear_color(gpu: G, clear_color: [f32; 4]) -> Self {
        Self {
            gpu,
            state: State::Uninitialized,
            clear_color,
            in_frame: false,
            frames: 0,
        }
    }

    /// Compiles the programs and uploads the quad
    ///
    /// Only the first call does any work. A failure leaves the renderer
    /// permanently unusable and later calls return [`RenderError::Unusable`].
    pub fn init(&mut self) -> Result<(), RenderError> {
        match self.state {
            State::Ready { .. } => return Ok(()),
            State::Failed | State::Destroyed => return Err(RenderError::Unusable),
            State::Uninitialized => {}
        }

        info!("🎨 Setting up default shaders");
        match self.build() {
            Ok((programs, quad)) => {
                self.state = State::Ready { programs, quad };
                info!("✅ Renderer ready");
                Ok(())
            }
            Err(e) => {
                error!("❌ Failed to set up default shaders: {}", e);
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    fn build(&mut self) -> Result<(Programs<G::Program>, G::Quad), RenderError> {
        let rgb = self.compile_program(PixelFormat::Rgb)?;
        let rgba = match self.compile_program(PixelFormat::Rgba) {
            Ok(program) => program,
            Err(e) => {
                self.gpu.delete_program(rgb);
                return Err(e);
            }
        };
        let quad = self.gpu.create_quad(&QUAD_VERTICES, &QUAD_INDICES);
        Ok((Programs { rgb, rgba }, quad))
    }

    fn compile_program(&mut self, format: PixelFormat) -> Result<G::Program, RenderError> {
        let vertex = self
            .gpu
            .compile_shader(ShaderStage::Vertex, shaders::QUAD_VERTEX_SHADER)
            .map_err(|log| RenderError::ShaderCompile {
                stage: ShaderStage::Vertex,
                log,
            })?;
        let fragment = match self
            .gpu
            .compile_shader(ShaderStage::Fragment, format.fragment_source())
        {
            Ok(shader) => shader,
            Err(log) => {
                self.gpu.delete_shader(vertex);
                return Err(RenderError::ShaderCompile {
                    stage: ShaderStage::Fragment,
                    log,
                });
            }
        };

        let program = self.gpu.link_program(vertex, fragment);
        self.gpu.delete_shader(vertex);
        self.gpu.delete_shader(fragment);
        let program = program.map_err(|log| RenderError::ProgramLink { format, log })?;
        debug!("Linked {} program {:?}", format, program);
        Ok(program)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready { .. })
    }

    /// Starts a frame: clears to the background color and sets the viewport
    ///
    /// The returned guard ends the frame when finished or dropped.
    pub fn begin<O: Output + ?Sized>(&mut self, output: &O) -> RenderFrame<'_, G> {
        if let Err(e) = self.init() {
            debug!("Beginning frame on unusable renderer: {}", e);
        }
        debug_assert!(!self.in_frame, "begin called inside a frame");
        self.in_frame = true;

        self.gpu.clear(self.clear_color);
        self.gpu.viewport(0, 0, output.width(), output.height());
        RenderFrame { renderer: self }
    }

    fn end(&mut self) {
        self.in_frame = false;
        self.frames += 1;
        trace!("Frame {} ended", self.frames);
    }

    /// Draws one surface with the given row-major transform
    ///
    /// Fails without touching GPU state if the surface is invalid or its
    /// format has no program. On success the surface's program and the quad
    /// stay bound.
    pub fn draw_surface(&mut self, surface: &dyn Surface, matrix: &Matrix) -> Result<(), RenderError> {
        if !surface.is_valid() {
            return Err(RenderError::InvalidSurface);
        }
        let raw = surface.format();
        let format = PixelFormat::from_gl(raw).ok_or(RenderError::UnsupportedFormat(raw))?;

        self.init()?;
        let State::Ready { programs, quad } = &self.state else {
            return Err(RenderError::Unusable);
        };
        let (program, quad) = (programs.get(format), *quad);

        self.gpu.use_program(program);
        self.gpu.bind_quad(quad);
        surface.bind();
        self.gpu.set_transform(matrix);
        self.gpu.draw_quad(QUAD_INDICES.len() as i32);
        Ok(())
    }

    /// Frees the programs and the quad
    ///
    /// Only needed when the GL context goes away before the process does.
    pub fn destroy(&mut self) {
        if let State::Ready { programs, quad } = std::mem::replace(&mut self.state, State::Destroyed) {
            self.gpu.delete_program(programs.rgb);
            self.gpu.delete_program(programs.rgba);
            self.gpu.delete_quad(quad);
            info!("🗑️ Renderer resources released");
        }
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Number of frames begun and ended
    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }
}

impl<G: Gpu> fmt::Debug for Renderer<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Uninitialized => "uninitialized",
            State::Ready { .. } => "ready",
            State::Failed => "failed",
            State::Destroyed => "destroyed",
        };
        f.debug_struct("Renderer")
            .field("state", &state)
            .field("clear_color", &self.clear_color)
            .field("frames", &self.frames)
            .finish()
    }
}

/// A frame in progress
///
/// Dropping the frame ends it, so every `begin` is matched by exactly one end
/// even when drawing bails out early.
pub struct RenderFrame<'r, G: Gpu> {
    renderer: &'r mut Renderer<G>,
}

impl<G: Gpu> RenderFrame<'_, G> {
    pub fn draw_surface(&mut self, surface: &dyn Surface, matrix: &Matrix) -> Result<(), RenderError> {
        self.renderer.draw_surface(surface, matrix)
    }

    pub fn finish(self) {}
}

impl<G: Gpu> Drop for RenderFrame<'_, G> {
    fn drop(&mut self) {
        self.renderer.end();
    }
}
