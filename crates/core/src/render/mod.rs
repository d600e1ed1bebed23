//! Render-target, shader and program infrastructure.
//!
//! Everything here is written against the [`crate::gpu::Gpu`] seam. Only
//! [`context`] and the GL compile helpers in [`shader`] need the `render`
//! feature.
//!
//! # Module overview
//!
//! - [`texture`] -- Texture formats and configuration.
//! - [`target`] -- Multi-attachment render-target sets and their lifecycle.
//! - [`shader`] -- Shader stages, build errors, GL compile/link helpers.
//! - [`program`] -- Program handles with uniform tables, per-pass program tables.
//! - [`fullscreen`] -- Fullscreen triangle vertex shader.
//! - [`context`] -- The OpenGL `Gpu` implementation.

#[cfg(feature = "render")]
pub mod context;
pub mod fullscreen;
pub mod program;
pub mod shader;
pub mod target;
pub mod texture;

#[cfg(feature = "render")]
pub use context::GpuContext;
pub use fullscreen::FULLSCREEN_VERTEX_SHADER;
pub use program::{RenderPassTable, ShaderProgramHandle};
pub use shader::{format_shader_error, ShaderError, ShaderStage};
pub use target::{
    scaled_size, AttachmentSpec, DepthSpec, FramebufferLifecycle, RenderTargetSet, TargetSpec,
    NO_SAMPLE_BORDER,
};
pub use texture::{Filter, TextureConfig, TextureFormat, Wrap};
