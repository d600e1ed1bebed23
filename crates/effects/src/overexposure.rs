//! Overexposure and sun bloom.

use serde_json::{json, Value};
use voxshade_core::host::UniformSink;
use voxshade_core::settings::Settings;
use voxshade_core::{Gpu, InjectionError, PropertyRegistry, UniformValue};

use crate::effect::EffectModule;

pub const NAMESPACE: &str = "OVEREXPOSURE_";

/// Uniform of the host's standard program that brightens the sun sprite.
pub const GLOW_UNIFORM: &str = "extraOutGlow";

pub fn properties() -> Result<PropertyRegistry, InjectionError> {
    let mut registry = PropertyRegistry::new(NAMESPACE);
    registry.register_float("OVEREXPOSURE_INTENSITY", |s| s.overexposure_intensity as f32 / 100.0)?;
    registry.register_float("OVEREXPOSURE_SUN_BLOOM", sun_bloom)?;
    Ok(registry)
}

fn sun_bloom(settings: &Settings) -> f32 {
    settings.sun_bloom_intensity as f32 / 100.0
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Overexposure;

impl<G: Gpu> EffectModule<G> for Overexposure {
    fn name(&self) -> &'static str {
        "overexposure"
    }

    fn properties(&self) -> Result<PropertyRegistry, InjectionError> {
        properties()
    }

    fn params(&self) -> Value {
        json!({})
    }

    fn on_pre_sun_render(&self, settings: &Settings, sink: &mut dyn UniformSink<G::Texture>) {
        sink.uniform(GLOW_UNIFORM, UniformValue::Float(sun_bloom(settings)));
    }

    fn on_sun_rendered(&self, sink: &mut dyn UniformSink<G::Texture>) {
        sink.uniform(GLOW_UNIFORM, UniformValue::Float(0.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxshade_core::gpu::recording::UniformCapture;
    use voxshade_core::inject::PropertyValue;
    use voxshade_core::RecordingGpu;

    #[test]
    fn properties_scale_percentages() {
        let registry = properties().expect("properties register");
        let settings = Settings {
            overexposure_intensity: 150,
            ..Settings::default()
        };
        assert_eq!(
            registry.get("OVEREXPOSURE_INTENSITY").map(|p| p.evaluate(&settings)),
            Some(PropertyValue::Float(1.5))
        );
        assert_eq!(
            registry.get("OVEREXPOSURE_SUN_BLOOM").map(|p| p.evaluate(&settings)),
            Some(PropertyValue::Float(0.49))
        );
    }

    #[test]
    fn sun_glow_is_raised_then_reset() {
        let effect = Overexposure;
        let settings = Settings::default();
        let mut sink = UniformCapture::default();

        EffectModule::<RecordingGpu>::on_pre_sun_render(&effect, &settings, &mut sink);
        assert_eq!(sink.get(GLOW_UNIFORM), Some(UniformValue::Float(0.49)));

        EffectModule::<RecordingGpu>::on_sun_rendered(&effect, &mut sink);
        assert_eq!(sink.get(GLOW_UNIFORM), Some(UniformValue::Float(0.0)), "glow must not leak past the sun");
    }
}
