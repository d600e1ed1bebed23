//! Error types for the voxshade core.

use thiserror::Error;

use crate::inject::InjectionError;
use crate::render::shader::ShaderError;
use crate::settings::SettingsError;

/// Errors produced by pipeline operations.
///
/// Framebuffer incompleteness and shader failures are fatal to the effect
/// that hit them, never to the frame loop. Injection errors for effect
/// shaders are programming errors and abort pipeline construction.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Viewport width or height was zero, or the supersampling factor was
    /// not a finite positive number.
    #[error("invalid dimensions {width}x{height} at supersampling {supersampling}: width and height must be non-zero")]
    InvalidDimensions {
        width: u32,
        height: u32,
        supersampling: f32,
    },

    /// A framebuffer failed its completeness check right after allocation.
    #[error("framebuffer '{label}' incomplete: status 0x{status:04X}")]
    FramebufferIncomplete { label: String, status: u32 },

    /// The backend refused to create a GPU object.
    #[error("failed to create {kind}: {message}")]
    ResourceCreation { kind: &'static str, message: String },

    /// GPU state was touched from a thread other than the one owning the context.
    #[error("GPU objects may only be touched from the render thread")]
    WrongThread,

    /// A program failed to compile or link.
    #[error("program '{program}' failed to build: {source}")]
    Shader {
        program: String,
        #[source]
        source: ShaderError,
    },

    /// Shader source preprocessing failed.
    #[error(transparent)]
    Injection(#[from] InjectionError),

    /// Settings could not be loaded, stored or applied.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// An effect name was not found in the registry.
    #[error("unknown effect: {0}")]
    UnknownEffect(String),

    /// A lifecycle transition was requested from a state that does not allow it.
    #[error("cannot move pipeline from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}

impl PipelineError {
    /// Whether this error disables the effect that produced it.
    ///
    /// Everything except injection errors is contained by the effect; those
    /// bubble up because no settings change can repair them.
    pub fn is_fatal_to_feature(&self) -> bool {
        !matches!(self, PipelineError::Injection(_))
    }
}
