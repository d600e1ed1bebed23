//! Volumetric lighting (god-rays).
//!
//! The god-ray pass itself belongs to the host; this effect injects its
//! tuning, feeds the calendar and fog uniforms right before the pass, and
//! keeps the host's god-ray and shadow-map quality settings consistent,
//! since god-rays are traced through the shadow map.

use serde_json::{json, Value};
use voxshade_core::host::{FrameInputs, Host, UniformSink};
use voxshade_core::settings::{SettingChange, SettingKey};
use voxshade_core::{Gpu, InjectionError, PipelineError, PropertyRegistry, UniformValue};

use crate::effect::{EffectContext, EffectModule};

pub const NAMESPACE: &str = "VOLUMETRIC_";

pub fn properties() -> Result<PropertyRegistry, InjectionError> {
    let mut registry = PropertyRegistry::new(NAMESPACE);
    registry.register_float("VOLUMETRIC_FLATNESS", |s| (200 - s.volumetric_flatness) as f32 / 100.0)?;
    registry.register_float("VOLUMETRIC_INTENSITY", |s| s.volumetric_intensity as f32 / 100.0)?;
    Ok(registry)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VolumetricLighting {
    forced_shadow_maps: u32,
}

impl VolumetricLighting {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times enabling god-rays had to switch shadow mapping on.
    pub fn forced_shadow_maps(&self) -> u32 {
        self.forced_shadow_maps
    }
}

impl<G: Gpu> EffectModule<G> for VolumetricLighting {
    fn name(&self) -> &'static str {
        "volumetric-lighting"
    }

    fn properties(&self) -> Result<PropertyRegistry, InjectionError> {
        properties()
    }

    fn params(&self) -> Value {
        json!({"forced_shadow_maps": self.forced_shadow_maps})
    }

    fn watched_settings(&self) -> &'static [SettingKey] {
        &[SettingKey::GodRayQuality, SettingKey::ShadowMapQuality]
    }

    fn on_setting_changed(
        &mut self,
        _ctx: &EffectContext<'_, G>,
        host: &mut dyn Host<G>,
        change: SettingChange,
    ) -> Result<(), PipelineError> {
        let quality = change.value.as_int().unwrap_or(0);
        match change.key {
            SettingKey::GodRayQuality if quality > 0 && host.shadow_map_quality() == 0 => {
                log::info!("god-rays need shadow maps, raising shadow map quality to 1");
                host.set_shadow_map_quality(1);
                host.request_framebuffer_rebuild();
                self.forced_shadow_maps += 1;
            }
            SettingKey::ShadowMapQuality if quality == 0 && host.god_ray_quality() > 0 => {
                log::info!("shadow maps off, disabling god-rays");
                host.set_god_ray_quality(0);
            }
            _ => {}
        }
        Ok(())
    }

    fn on_pre_godrays(&self, inputs: &FrameInputs, sink: &mut dyn UniformSink<G::Texture>) {
        let Some(shadow_intensity) = inputs.drop_shadow_intensity else {
            log::error!("drop-shadow intensity unavailable, god-ray uniforms not set");
            return;
        };
        let uniforms = [
            ("moonLightStrength", inputs.moon_light_strength),
            ("sunLightStrength", inputs.sun_light_strength),
            ("dayLightStrength", inputs.day_light_strength),
            ("shadowIntensity", shadow_intensity),
            ("flatFogDensity", inputs.flat_fog_density),
        ];
        for (name, value) in uniforms {
            sink.uniform(name, UniformValue::Float(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use voxshade_core::gpu::recording::UniformCapture;
    use voxshade_core::inject::PropertyValue;
    use voxshade_core::settings::{SettingValue, Settings};
    use voxshade_core::RecordingGpu;

    fn change(key: SettingKey, quality: i32) -> SettingChange {
        SettingChange {
            key,
            value: SettingValue::Int(quality),
        }
    }

    #[test]
    fn properties_follow_documented_formulas() {
        let registry = properties().expect("properties register");
        let settings = Settings::default();
        assert_eq!(
            registry.get("VOLUMETRIC_FLATNESS").map(|p| p.evaluate(&settings)),
            Some(PropertyValue::Float(1.24))
        );
        assert_eq!(
            registry.get("VOLUMETRIC_INTENSITY").map(|p| p.evaluate(&settings)),
            Some(PropertyValue::Float(0.33))
        );
    }

    #[test]
    fn enabling_god_rays_forces_shadow_maps_on() {
        let mut fixture = Fixture::new(64, 64);
        let mut effect = VolumetricLighting::new();
        let (ctx, host) = fixture.split();

        EffectModule::<RecordingGpu>::on_setting_changed(
            &mut effect,
            &ctx,
            host,
            change(SettingKey::GodRayQuality, 2),
        )
        .expect("handled");

        assert_eq!(fixture.host.shadow_map_quality, 1);
        assert_eq!(fixture.host.rebuild_requests, 1, "a framebuffer rebuild is requested");
        assert_eq!(effect.forced_shadow_maps(), 1);
    }

    #[test]
    fn god_rays_with_shadow_maps_already_on_change_nothing() {
        let mut fixture = Fixture::new(64, 64);
        fixture.host.shadow_map_quality = 3;
        let mut effect = VolumetricLighting::new();
        let (ctx, host) = fixture.split();

        EffectModule::<RecordingGpu>::on_setting_changed(
            &mut effect,
            &ctx,
            host,
            change(SettingKey::GodRayQuality, 1),
        )
        .expect("handled");

        assert_eq!(fixture.host.shadow_map_quality, 3);
        assert_eq!(fixture.host.rebuild_requests, 0);
    }

    #[test]
    fn disabling_shadow_maps_disables_god_rays() {
        let mut fixture = Fixture::new(64, 64);
        fixture.host.god_ray_quality = 2;
        let mut effect = VolumetricLighting::new();
        let (ctx, host) = fixture.split();

        EffectModule::<RecordingGpu>::on_setting_changed(
            &mut effect,
            &ctx,
            host,
            change(SettingKey::ShadowMapQuality, 0),
        )
        .expect("handled");

        assert_eq!(fixture.host.god_ray_quality, 0);
    }

    #[test]
    fn pre_godrays_pushes_calendar_and_fog() {
        let inputs = FrameInputs {
            moon_light_strength: 0.25,
            sun_light_strength: 0.75,
            day_light_strength: 0.5,
            drop_shadow_intensity: Some(0.4),
            flat_fog_density: 0.02,
            ..FrameInputs::default()
        };
        let mut sink = UniformCapture::default();
        EffectModule::<RecordingGpu>::on_pre_godrays(&VolumetricLighting::new(), &inputs, &mut sink);

        assert_eq!(sink.get("moonLightStrength"), Some(UniformValue::Float(0.25)));
        assert_eq!(sink.get("sunLightStrength"), Some(UniformValue::Float(0.75)));
        assert_eq!(sink.get("dayLightStrength"), Some(UniformValue::Float(0.5)));
        assert_eq!(sink.get("shadowIntensity"), Some(UniformValue::Float(0.4)));
        assert_eq!(sink.get("flatFogDensity"), Some(UniformValue::Float(0.02)));
    }

    #[test]
    fn missing_drop_shadow_pushes_nothing() {
        let inputs = FrameInputs {
            drop_shadow_intensity: None,
            ..FrameInputs::default()
        };
        let mut sink = UniformCapture::default();
        EffectModule::<RecordingGpu>::on_pre_godrays(&VolumetricLighting::new(), &inputs, &mut sink);
        assert!(sink.uniforms.is_empty(), "no partial uniform set: {:?}", sink.uniforms);
    }
}
