//! Screen-space directional occlusion toggle.
//!
//! The occlusion pass is part of the host's lighting shaders; this effect
//! only switches it through `SSDO_ENABLED`.

use serde_json::{json, Value};
use voxshade_core::settings::Settings;
use voxshade_core::{Gpu, InjectionError, PropertyRegistry};

use crate::effect::EffectModule;

pub const NAMESPACE: &str = "SSDO_";

pub fn properties() -> Result<PropertyRegistry, InjectionError> {
    let mut registry = PropertyRegistry::new(NAMESPACE);
    registry.register_bool("SSDO_ENABLED", |s| s.ssdo_enabled)?;
    Ok(registry)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirectionalOcclusion;

impl<G: Gpu> EffectModule<G> for DirectionalOcclusion {
    fn name(&self) -> &'static str {
        "ssdo"
    }

    fn properties(&self) -> Result<PropertyRegistry, InjectionError> {
        properties()
    }

    fn params(&self) -> Value {
        json!({})
    }

    fn is_enabled(&self, settings: &Settings) -> bool {
        settings.ssdo_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxshade_core::inject::PropertyValue;
    use voxshade_core::RecordingGpu;

    #[test]
    fn follows_ssdo_setting() {
        let on = Settings::default();
        let off = Settings {
            ssdo_enabled: false,
            ..Settings::default()
        };
        let effect = DirectionalOcclusion;
        assert!(EffectModule::<RecordingGpu>::is_enabled(&effect, &on));
        assert!(!EffectModule::<RecordingGpu>::is_enabled(&effect, &off));

        let registry = properties().expect("properties register");
        assert_eq!(
            registry.get("SSDO_ENABLED").map(|p| p.evaluate(&off)),
            Some(PropertyValue::Bool(false))
        );
    }
}
