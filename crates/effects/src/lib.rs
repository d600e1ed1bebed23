#![deny(unsafe_code)]
//! Effect registry, stage manager and the `Pipeline` facade.
//!
//! This crate sits on top of `voxshade-core` (GPU seam, render targets,
//! injector, settings) and holds the effects themselves. Hosts construct a
//! [`Pipeline`] and drive its hooks; the CLI uses [`EffectKind`] and
//! [`build_injector`] to inspect effects without a GPU.

pub mod effect;
pub mod environment;
pub mod overexposure;
pub mod pipeline;
pub mod shaders;
pub mod shadow_tweaks;
pub mod ssdo;
pub mod ssr;
pub mod stage;
pub mod volumetric;

#[cfg(test)]
pub(crate) mod testing;

use serde_json::Value;
use voxshade_core::host::{FrameInputs, FrameStage, Host, UniformSink};
use voxshade_core::settings::{SettingChange, SettingKey, Settings};
use voxshade_core::{Gpu, InjectionError, PipelineError, PropertyRegistry, ShaderInjector};

pub use effect::{EffectContext, EffectModule};
pub use pipeline::Pipeline;
pub use stage::{CompositingStageManager, EffectId, EffectStatus, PipelineState};

use overexposure::Overexposure;
use shadow_tweaks::ShadowTweaks;
use ssdo::DirectionalOcclusion;
use ssr::Ssr;
use volumetric::VolumetricLighting;

/// All available effect names, in dispatch order.
const EFFECT_NAMES: &[&str] = &["ssr", "volumetric-lighting", "overexposure", "shadow-tweaks", "ssdo"];

/// Every effect's property registry, in registry order.
pub fn property_registries() -> Result<Vec<PropertyRegistry>, InjectionError> {
    Ok(vec![
        ssr::properties()?,
        volumetric::properties()?,
        overexposure::properties()?,
        shadow_tweaks::properties()?,
        ssdo::properties()?,
    ])
}

/// An injector knowing every effect property, as a pipeline would build it.
pub fn build_injector() -> Result<ShaderInjector, InjectionError> {
    let mut injector = ShaderInjector::new();
    for registry in property_registries()? {
        injector.add_registry(registry);
    }
    Ok(injector)
}

/// Enumeration of all post-processing effects.
///
/// Wraps each effect and delegates `EffectModule` methods.
/// Use [`EffectKind::from_name`] for string-based construction.
pub enum EffectKind<G: Gpu> {
    /// Screen-space reflections and caustics.
    Ssr(Ssr<G>),
    /// God-ray uniforms and shadow/god-ray quality coupling.
    VolumetricLighting(VolumetricLighting),
    /// Overexposure and sun bloom.
    Overexposure(Overexposure),
    /// Peter-panning offsets and near shadow width.
    ShadowTweaks(ShadowTweaks),
    /// Directional occlusion toggle.
    DirectionalOcclusion(DirectionalOcclusion),
}

impl<G: Gpu> EffectKind<G> {
    /// Constructs an effect by name.
    ///
    /// Returns `PipelineError::UnknownEffect` if the name is not recognized.
    pub fn from_name(name: &str, settings: &Settings, params: &Value) -> Result<Self, PipelineError> {
        match name {
            "ssr" => Ok(EffectKind::Ssr(Ssr::from_json(params))),
            "volumetric-lighting" => Ok(EffectKind::VolumetricLighting(VolumetricLighting::new())),
            "overexposure" => Ok(EffectKind::Overexposure(Overexposure)),
            "shadow-tweaks" => Ok(EffectKind::ShadowTweaks(ShadowTweaks::from_settings(settings))),
            "ssdo" => Ok(EffectKind::DirectionalOcclusion(DirectionalOcclusion)),
            _ => Err(PipelineError::UnknownEffect(name.to_string())),
        }
    }

    /// Returns a slice of all recognized effect names.
    pub fn list_effects() -> &'static [&'static str] {
        EFFECT_NAMES
    }
}

macro_rules! delegate {
    ($self:expr, $effect:ident => $call:expr) => {
        match $self {
            EffectKind::Ssr($effect) => $call,
            EffectKind::VolumetricLighting($effect) => $call,
            EffectKind::Overexposure($effect) => $call,
            EffectKind::ShadowTweaks($effect) => $call,
            EffectKind::DirectionalOcclusion($effect) => $call,
        }
    };
}

impl<G: Gpu> EffectModule<G> for EffectKind<G> {
    fn name(&self) -> &'static str {
        delegate!(self, e => EffectModule::<G>::name(e))
    }

    fn properties(&self) -> Result<PropertyRegistry, InjectionError> {
        delegate!(self, e => EffectModule::<G>::properties(e))
    }

    fn params(&self) -> Value {
        delegate!(self, e => EffectModule::<G>::params(e))
    }

    fn renderers(&self) -> &'static [(FrameStage, &'static str)] {
        delegate!(self, e => EffectModule::<G>::renderers(e))
    }

    fn watched_settings(&self) -> &'static [SettingKey] {
        delegate!(self, e => EffectModule::<G>::watched_settings(e))
    }

    fn is_enabled(&self, settings: &Settings) -> bool {
        delegate!(self, e => EffectModule::<G>::is_enabled(e, settings))
    }

    fn reload_shaders(&mut self, ctx: &EffectContext<'_, G>) -> Result<(), PipelineError> {
        delegate!(self, e => EffectModule::<G>::reload_shaders(e, ctx))
    }

    fn rebuild_framebuffers(&mut self, ctx: &EffectContext<'_, G>) -> Result<(), PipelineError> {
        delegate!(self, e => EffectModule::<G>::rebuild_framebuffers(e, ctx))
    }

    fn render_stage(&mut self, ctx: &EffectContext<'_, G>, host: &mut dyn Host<G>, stage: FrameStage) {
        delegate!(self, e => EffectModule::<G>::render_stage(e, ctx, host, stage))
    }

    fn on_setting_changed(
        &mut self,
        ctx: &EffectContext<'_, G>,
        host: &mut dyn Host<G>,
        change: SettingChange,
    ) -> Result<(), PipelineError> {
        delegate!(self, e => EffectModule::<G>::on_setting_changed(e, ctx, host, change))
    }

    fn bind_final_uniforms(&self, sink: &mut dyn UniformSink<G::Texture>) {
        delegate!(self, e => EffectModule::<G>::bind_final_uniforms(e, sink))
    }

    fn on_pre_godrays(&self, inputs: &FrameInputs, sink: &mut dyn UniformSink<G::Texture>) {
        delegate!(self, e => EffectModule::<G>::on_pre_godrays(e, inputs, sink))
    }

    fn on_pre_sun_render(&self, settings: &Settings, sink: &mut dyn UniformSink<G::Texture>) {
        delegate!(self, e => EffectModule::<G>::on_pre_sun_render(e, settings, sink))
    }

    fn on_sun_rendered(&self, sink: &mut dyn UniformSink<G::Texture>) {
        delegate!(self, e => EffectModule::<G>::on_sun_rendered(e, sink))
    }

    fn dispose(&mut self, ctx: &EffectContext<'_, G>) {
        delegate!(self, e => EffectModule::<G>::dispose(e, ctx))
    }
}
