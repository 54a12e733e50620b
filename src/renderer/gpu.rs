//! GPU command seam used by the renderer
//!
//! [`Gpu`] covers exactly the commands surface rendering needs. [`GlGpu`]
//! issues them through OpenGL ES 3 via the `gl` crate; [`RecordingGpu`]
//! executes nothing and records every call, which drives the headless
//! simulator and the renderer tests.

use std::ffi::{c_void, CString};
use std::fmt;
use std::ptr;

use gl::types::{GLchar, GLenum, GLint, GLsizei, GLsizeiptr, GLuint};
use log::debug;

use super::Matrix;

/// Pipeline stage a shader is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Vertex data for the unit quad
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub tex_coords: [f32; 2],
}

/// The commands the renderer issues to the GPU
///
/// Compile and link failures carry the driver's info log.
pub trait Gpu {
    type Shader: Copy + fmt::Debug;
    type Program: Copy + fmt::Debug;
    type Quad: Copy + fmt::Debug;

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<Self::Shader, String>;

    fn link_program(
        &mut self,
        vertex: Self::Shader,
        fragment: Self::Shader,
    ) -> Result<Self::Program, String>;

    fn delete_shader(&mut self, shader: Self::Shader);

    fn delete_program(&mut self, program: Self::Program);

    /// Uploads static vertex and index buffers
    fn create_quad(&mut self, vertices: &[QuadVertex], indices: &[u32]) -> Self::Quad;

    fn delete_quad(&mut self, quad: Self::Quad);

    fn use_program(&mut self, program: Self::Program);

    fn bind_quad(&mut self, quad: Self::Quad);

    /// Uploads a row-major matrix to the bound program's `transform` uniform
    fn set_transform(&mut self, matrix: &Matrix);

    /// Draws `index_count` indices of the bound quad as triangles
    fn draw_quad(&mut self, index_count: i32);

    fn clear(&mut self, color: [f32; 4]);

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
}

/// A linked GL program and its transform uniform location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlProgram {
    pub id: GLuint,
    transform: GLint,
}

/// Vertex array plus vertex and element buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlQuad {
    vao: GLuint,
    vbo: GLuint,
    ebo: GLuint,
}

/// OpenGL ES 3 backend
///
/// Requires a current GL context whose function pointers are loaded.
#[derive(Debug, Default)]
pub struct GlGpu {
    current: Option<GlProgram>,
}

impl GlGpu {
    /// Loads GL function pointers through `loader` (e.g. `eglGetProcAddress`)
    pub fn load_with<F>(loader: F) -> Self
    where
        F: FnMut(&'static str) -> *const c_void,
    {
        gl::load_with(loader);
        debug!("Loaded GL function pointers");
        Self { current: None }
    }
}

fn stage_enum(stage: ShaderStage) -> GLenum {
    match stage {
        ShaderStage::Vertex => gl::VERTEX_SHADER,
        ShaderStage::Fragment => gl::FRAGMENT_SHADER,
    }
}

/// Reads a shader or program info log
///
/// # Safety
///
/// `object` must be a live object of the kind the two entry points expect.
unsafe fn info_log(
    object: GLuint,
    get_iv: unsafe fn(GLuint, GLenum, *mut GLint),
    get_log: unsafe fn(GLuint, GLsizei, *mut GLsizei, *mut GLchar),
) -> String {
    let mut len: GLint = 0;
    get_iv(object, gl::INFO_LOG_LENGTH, &mut len);
    let mut buf = vec![0u8; len.max(1) as usize];
    let mut written: GLsizei = 0;
    get_log(object, len, &mut written, buf.as_mut_ptr() as *mut GLchar);
    buf.truncate(written.max(0) as usize);
    String::from_utf8_lossy(&buf).into_owned()
}

impl Gpu for GlGpu {
    type Shader = GLuint;
    type Program = GlProgram;
    type Quad = GlQuad;

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<GLuint, String> {
        let source = CString::new(source).map_err(|e| e.to_string())?;
        // SAFETY: a GL context is current (GlGpu contract) and `source` is a
        // NUL-terminated string that outlives the ShaderSource call.
        unsafe {
            let shader = gl::CreateShader(stage_enum(stage));
            gl::ShaderSource(shader, 1, &source.as_ptr(), ptr::null());
            gl::CompileShader(shader);

            let mut status = GLint::from(gl::FALSE);
            gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status);
            if status != GLint::from(gl::TRUE) {
                let log = info_log(shader, gl::GetShaderiv, gl::GetShaderInfoLog);
                gl::DeleteShader(shader);
                return Err(log);
            }
            Ok(shader)
        }
    }

    fn link_program(&mut self, vertex: GLuint, fragment: GLuint) -> Result<GlProgram, String> {
        // SAFETY: both shaders were returned by compile_shader on this context.
        unsafe {
            let id = gl::CreateProgram();
            gl::AttachShader(id, vertex);
            gl::AttachShader(id, fragment);
            gl::LinkProgram(id);

            let mut status = GLint::from(gl::FALSE);
            gl::GetProgramiv(id, gl::LINK_STATUS, &mut status);
            if status != GLint::from(gl::TRUE) {
                let log = info_log(id, gl::GetProgramiv, gl::GetProgramInfoLog);
                gl::DeleteProgram(id);
                return Err(log);
            }

            let transform = gl::GetUniformLocation(id, b"transform\0".as_ptr() as *const GLchar);
            Ok(GlProgram { id, transform })
        }
    }

    fn delete_shader(&mut self, shader: GLuint) {
        // SAFETY: deleting a name is valid even if it is attached to a program.
        unsafe { gl::DeleteShader(shader) }
    }

    fn delete_program(&mut self, program: GlProgram) {
        if self.current == Some(program) {
            self.current = None;
        }
        // SAFETY: the program was created on this context.
        unsafe { gl::DeleteProgram(program.id) }
    }

    fn create_quad(&mut self, vertices: &[QuadVertex], indices: &[u32]) -> GlQuad {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);
        let stride = std::mem::size_of::<QuadVertex>() as GLsizei;
        let tex_offset = std::mem::size_of::<[f32; 2]>();

        let mut quad = GlQuad { vao: 0, vbo: 0, ebo: 0 };
        // SAFETY: buffer sizes and pointers come from live slices, and the
        // attribute layout matches the repr(C) QuadVertex.
        unsafe {
            gl::GenVertexArrays(1, &mut quad.vao);
            gl::GenBuffers(1, &mut quad.vbo);
            gl::BindVertexArray(quad.vao);
            gl::BindBuffer(gl::ARRAY_BUFFER, quad.vbo);

            gl::EnableVertexAttribArray(0);
            gl::EnableVertexAttribArray(1);
            gl::VertexAttribPointer(0, 2, gl::FLOAT, gl::FALSE, stride, ptr::null());
            gl::VertexAttribPointer(1, 2, gl::FLOAT, gl::FALSE, stride, tex_offset as *const c_void);
            gl::BufferData(
                gl::ARRAY_BUFFER,
                vertex_bytes.len() as GLsizeiptr,
                vertex_bytes.as_ptr() as *const c_void,
                gl::STATIC_DRAW,
            );

            gl::GenBuffers(1, &mut quad.ebo);
            gl::BindBuffer(gl::ELEMENT_ARRAY_BUFFER, quad.ebo);
            gl::BufferData(
                gl::ELEMENT_ARRAY_BUFFER,
                index_bytes.len() as GLsizeiptr,
                index_bytes.as_ptr() as *const c_void,
                gl::STATIC_DRAW,
            );
        }
        quad
    }

    fn delete_quad(&mut self, quad: GlQuad) {
        // SAFETY: the names were generated by create_quad on this context.
        unsafe {
            gl::DeleteBuffers(1, &quad.ebo);
            gl::DeleteBuffers(1, &quad.vbo);
            gl::DeleteVertexArrays(1, &quad.vao);
        }
    }

    fn use_program(&mut self, program: GlProgram) {
        self.current = Some(program);
        // SAFETY: the program was linked on this context.
        unsafe { gl::UseProgram(program.id) }
    }

    fn bind_quad(&mut self, quad: GlQuad) {
        // SAFETY: the names were generated by create_quad on this context.
        unsafe {
            gl::BindVertexArray(quad.vao);
            gl::BindBuffer(gl::ARRAY_BUFFER, quad.vbo);
            gl::BindBuffer(gl::ELEMENT_ARRAY_BUFFER, quad.ebo);
        }
    }

    fn set_transform(&mut self, matrix: &Matrix) {
        let Some(program) = self.current else {
            return;
        };
        // SAFETY: `matrix` holds 16 floats; GL transposes the row-major data.
        unsafe { gl::UniformMatrix4fv(program.transform, 1, gl::TRUE, matrix.as_ptr()) }
    }

    fn draw_quad(&mut self, index_count: i32) {
        // SAFETY: a quad with an element buffer is bound.
        unsafe { gl::DrawElements(gl::TRIANGLES, index_count, gl::UNSIGNED_INT, ptr::null()) }
    }

    fn clear(&mut self, color: [f32; 4]) {
        // SAFETY: plain state calls on the current context.
        unsafe {
            gl::ClearColor(color[0], color[1], color[2], color[3]);
            gl::Clear(gl::COLOR_BUFFER_BIT);
        }
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        // SAFETY: plain state call on the current context.
        unsafe { gl::Viewport(x, y, width, height) }
    }
}

/// A call observed by [`RecordingGpu`]
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CompileShader(ShaderStage),
    LinkProgram(u32),
    DeleteShader(u32),
    DeleteProgram(u32),
    CreateQuad { vertices: usize, indices: usize },
    DeleteQuad,
    UseProgram(u32),
    BindQuad,
    SetTransform(Matrix),
    DrawQuad(i32),
    Clear([f32; 4]),
    Viewport(i32, i32, i32, i32),
}

/// Backend that records calls instead of executing them
///
/// Compile and link calls are numbered from zero; [`RecordingGpu::fail_compile`]
/// and [`RecordingGpu::fail_link`] make a given call fail.
#[derive(Debug, Default)]
pub struct RecordingGpu {
    calls: Vec<GpuCall>,
    next_name: u32,
    compiles: usize,
    links: usize,
    fail_compile: Option<usize>,
    fail_link: Option<usize>,
}

impl RecordingGpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `nth` compile call fail
    pub fn fail_compile(mut self, nth: usize) -> Self {
        self.fail_compile = Some(nth);
        self
    }

    /// Makes the `nth` link call fail
    pub fn fail_link(mut self, nth: usize) -> Self {
        self.fail_link = Some(nth);
        self
    }

    pub fn calls(&self) -> &[GpuCall] {
        &self.calls
    }

    /// Returns and forgets the calls recorded so far
    pub fn take_calls(&mut self) -> Vec<GpuCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn draw_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, GpuCall::DrawQuad(_)))
            .count()
    }

    fn name(&mut self) -> u32 {
        self.next_name += 1;
        self.next_name
    }
}

impl Gpu for RecordingGpu {
    type Shader = u32;
    type Program = u32;
    type Quad = u32;

    fn compile_shader(&mut self, stage: ShaderStage, _source: &str) -> Result<u32, String> {
        self.calls.push(GpuCall::CompileShader(stage));
        let nth = self.compiles;
        self.compiles += 1;
        if self.fail_compile == Some(nth) {
            return Err(format!("0:1({}): error: injected compile failure", stage));
        }
        Ok(self.name())
    }

    fn link_program(&mut self, _vertex: u32, _fragment: u32) -> Result<u32, String> {
        let nth = self.links;
        self.links += 1;
        if self.fail_link == Some(nth) {
            return Err(String::from("error: injected link failure"));
        }
        let program = self.name();
        self.calls.push(GpuCall::LinkProgram(program));
        Ok(program)
    }

    fn delete_shader(&mut self, shader: u32) {
        self.calls.push(GpuCall::DeleteShader(shader));
    }

    fn delete_program(&mut self, program: u32) {
        self.calls.push(GpuCall::DeleteProgram(program));
    }

    fn create_quad(&mut self, vertices: &[QuadVertex], indices: &[u32]) -> u32 {
        self.calls.push(GpuCall::CreateQuad {
            vertices: vertices.len(),
            indices: indices.len(),
        });
        self.name()
    }

    fn delete_quad(&mut self, _quad: u32) {
        self.calls.push(GpuCall::DeleteQuad);
    }

    fn use_program(&mut self, program: u32) {
        self.calls.push(GpuCall::UseProgram(program));
    }

    fn bind_quad(&mut self, _quad: u32) {
        self.calls.push(GpuCall::BindQuad);
    }

    fn set_transform(&mut self, matrix: &Matrix) {
        self.calls.push(GpuCall::SetTransform(*matrix));
    }

    fn draw_quad(&mut self, index_count: i32) {
        self.calls.push(GpuCall::DrawQuad(index_count));
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.calls.push(GpuCall::Clear(color));
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.calls.push(GpuCall::Viewport(x, y, width, height));
    }
}
