//! Shadow-map tweaks: peter-panning offsets and the near cascade's width.
//!
//! The host reads [`ShadowTweaks::near_shadow_base_width`] and
//! [`NEAR_SHADOW_Z_EXTENSION`] when it sizes the near shadow frustum.

use serde_json::{json, Value};
use voxshade_core::host::Host;
use voxshade_core::settings::{SettingChange, SettingKey, Settings};
use voxshade_core::{Gpu, InjectionError, PipelineError, PropertyRegistry};

use crate::effect::{EffectContext, EffectModule};

pub const NAMESPACE: &str = "SHADOW_";

/// Depth added to both ends of the near shadow frustum, in world units.
pub const NEAR_SHADOW_Z_EXTENSION: f32 = 32.0;

pub fn properties() -> Result<PropertyRegistry, InjectionError> {
    let mut registry = PropertyRegistry::new(NAMESPACE);
    registry.register_float("SHADOW_NEAR_OFFSET", |s| s.near_peter_panning_adjustment as f32)?;
    registry.register_float("SHADOW_FAR_OFFSET", |s| s.far_peter_panning_adjustment as f32)?;
    Ok(registry)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowTweaks {
    near_shadow_base_width: i32,
}

impl Default for ShadowTweaks {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ShadowTweaks {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            near_shadow_base_width: settings.near_shadow_base_width,
        }
    }

    pub fn near_shadow_base_width(&self) -> i32 {
        self.near_shadow_base_width
    }
}

impl<G: Gpu> EffectModule<G> for ShadowTweaks {
    fn name(&self) -> &'static str {
        "shadow-tweaks"
    }

    fn properties(&self) -> Result<PropertyRegistry, InjectionError> {
        properties()
    }

    fn params(&self) -> Value {
        json!({
            "near_shadow_base_width": self.near_shadow_base_width,
            "near_shadow_z_extension": NEAR_SHADOW_Z_EXTENSION,
        })
    }

    fn watched_settings(&self) -> &'static [SettingKey] {
        &[SettingKey::NearShadowBaseWidth]
    }

    fn on_setting_changed(
        &mut self,
        _ctx: &EffectContext<'_, G>,
        _host: &mut dyn Host<G>,
        change: SettingChange,
    ) -> Result<(), PipelineError> {
        if let (SettingKey::NearShadowBaseWidth, Some(width)) = (change.key, change.value.as_int()) {
            log::debug!("near shadow base width now {width}");
            self.near_shadow_base_width = width;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use voxshade_core::inject::PropertyValue;
    use voxshade_core::settings::SettingValue;
    use voxshade_core::RecordingGpu;

    #[test]
    fn offsets_are_raw_adjustments() {
        let registry = properties().expect("properties register");
        let settings = Settings::default();
        assert_eq!(
            registry.get("SHADOW_NEAR_OFFSET").map(|p| p.evaluate(&settings)),
            Some(PropertyValue::Float(2.0))
        );
        assert_eq!(
            registry.get("SHADOW_FAR_OFFSET").map(|p| p.evaluate(&settings)),
            Some(PropertyValue::Float(5.0))
        );
    }

    #[test]
    fn tracks_near_shadow_base_width() {
        let mut fixture = Fixture::new(32, 32);
        let mut tweaks = ShadowTweaks::default();
        assert_eq!(tweaks.near_shadow_base_width(), 15);

        let (ctx, host) = fixture.split();
        let change = SettingChange {
            key: SettingKey::NearShadowBaseWidth,
            value: SettingValue::Int(24),
        };
        EffectModule::<RecordingGpu>::on_setting_changed(&mut tweaks, &ctx, host, change).expect("handled");
        assert_eq!(tweaks.near_shadow_base_width(), 24);
    }
}
