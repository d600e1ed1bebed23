//! The GPU seam.
//!
//! Everything the pipeline does to GPU state goes through [`Gpu`]. The
//! OpenGL implementation is [`crate::render::GpuContext`] (feature
//! `render`); [`recording::RecordingGpu`] records calls and simulates
//! framebuffer completeness for headless runs and tests.
//!
//! Methods take `&self`: a context is used from exactly one thread and GL
//! state is interior to the driver anyway.

pub mod recording;

use std::fmt;
use std::hash::Hash;
use std::thread::ThreadId;

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::error::PipelineError;
use crate::render::shader::ShaderError;
use crate::render::texture::TextureConfig;

/// Which framebuffer binding point a bind affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferTarget {
    /// Both read and draw.
    Both,
    Read,
    Draw,
}

/// Result of a framebuffer completeness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    /// Incomplete, with the backend's raw status code.
    Incomplete(u32),
}

/// Fixed-function toggles the pipeline flips between passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CullFace,
    DepthTest,
    Blend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

/// A value written to a uniform location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl fmt::Display for UniformValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformValue::Float(v) => write!(f, "{v}"),
            UniformValue::Int(v) => write!(f, "{v}"),
            UniformValue::Vec2(v) => write!(f, "{v}"),
            UniformValue::Vec3(v) => write!(f, "{v}"),
            UniformValue::Vec4(v) => write!(f, "{v}"),
            UniformValue::Mat4(_) => f.write_str("mat4"),
        }
    }
}

/// Handle-based access to one GPU context.
///
/// Handles are plain `Copy` values; ownership of the objects they name is
/// tracked by whoever created them (a render-target set, a program handle).
pub trait Gpu {
    type Texture: Copy + Eq + Hash + fmt::Debug;
    type Framebuffer: Copy + Eq + Hash + fmt::Debug;
    type Program: Copy + Eq + Hash + fmt::Debug;
    type UniformLocation: Clone + fmt::Debug;

    /// The thread that created and owns this context.
    fn render_thread(&self) -> ThreadId;

    fn create_texture(&self, config: &TextureConfig) -> Result<Self::Texture, PipelineError>;
    fn delete_texture(&self, texture: Self::Texture);

    fn create_framebuffer(&self) -> Result<Self::Framebuffer, PipelineError>;
    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer);
    /// `None` binds the default framebuffer.
    fn bind_framebuffer(&self, target: FramebufferTarget, framebuffer: Option<Self::Framebuffer>);
    /// Attaches to the framebuffer bound for drawing.
    fn attach_color(&self, index: u32, texture: Self::Texture);
    fn attach_depth(&self, texture: Self::Texture);
    /// Declares color attachments `0..count` as draw buffers, in order.
    fn set_draw_buffers(&self, count: u32);
    fn framebuffer_status(&self) -> FramebufferStatus;
    fn viewport(&self, width: u32, height: u32);

    fn clear_color_attachment(&self, index: u32, color: [f32; 4]);
    fn clear_depth(&self);
    /// Copies depth from the read framebuffer to the draw framebuffer with
    /// nearest filtering.
    fn blit_depth(&self, src: (u32, u32), dst: (u32, u32));

    fn set_capability(&self, capability: Capability, enabled: bool);
    fn set_depth_mask(&self, write: bool);
    fn set_blend_func_attachment(&self, index: u32, src: BlendFactor, dst: BlendFactor);

    fn compile_program(&self, vertex: &str, fragment: &str) -> Result<Self::Program, ShaderError>;
    fn delete_program(&self, program: Self::Program);
    fn use_program(&self, program: Option<Self::Program>);
    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::UniformLocation>;
    /// Writes to a location of the program currently in use.
    fn set_uniform(&self, location: &Self::UniformLocation, value: UniformValue);
    fn bind_texture_unit(&self, unit: u32, texture: Self::Texture);

    fn draw_fullscreen_triangle(&self);

    /// Pops the oldest pending error code, if any.
    fn take_error(&self) -> Option<u32>;
}

/// Fails with [`PipelineError::WrongThread`] unless called on the thread
/// that owns `gpu`.
pub fn ensure_render_thread<G: Gpu + ?Sized>(gpu: &G) -> Result<(), PipelineError> {
    if std::thread::current().id() == gpu.render_thread() {
        Ok(())
    } else {
        Err(PipelineError::WrongThread)
    }
}

/// Drains pending GPU errors, logging each at `warn`. Returns how many there were.
///
/// Error codes after a pass are recoverable: the frame keeps going.
pub fn check_gpu_error<G: Gpu + ?Sized>(gpu: &G, context: &str) -> usize {
    let mut count = 0;
    while let Some(code) = gpu.take_error() {
        log::warn!("GPU error 0x{code:04X} while {context}");
        count += 1;
    }
    count
}
