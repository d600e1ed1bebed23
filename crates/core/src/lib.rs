#![deny(unsafe_code)]
//! Core types for the voxshade post-processing pipeline.
//!
//! Provides the `Gpu` seam with an OpenGL backend (feature `render`) and a
//! recording backend, render-target sets and their lifecycle, the shader
//! source injector, program handles and per-pass tables, the host boundary
//! (`Host`, `FrameInputs`, `HostTargets`, `UniformSink`), the settings
//! store and JSON tuning helpers.

pub mod error;
pub mod gpu;
pub mod host;
pub mod inject;
pub mod params;
pub mod render;
pub mod settings;

pub use error::PipelineError;
pub use gpu::recording::{RecordingGpu, RecordingHost};
pub use gpu::{Gpu, UniformValue};
pub use host::{ChunkRenderPass, FrameInputs, FrameStage, Host, HostTargets, UniformSink};
pub use inject::{InjectedSource, InjectionError, PropertyAccessor, PropertyRegistry, ShaderInjector};
pub use render::{FramebufferLifecycle, RenderTargetSet, ShaderProgramHandle, ShaderStage};
pub use settings::{SettingChange, SettingKey, SettingValue, Settings, SettingsHandle, SettingsStore};
