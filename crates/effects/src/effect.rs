//! The `EffectModule` trait every post-processing effect implements.
//!
//! The trait is object-safe; the pipeline stores effects as
//! [`crate::EffectKind`] but tests and hosts may also use
//! `Box<dyn EffectModule<G>>`.

use serde_json::Value;
use voxshade_core::host::{FrameInputs, FrameStage, Host, HostTargets, UniformSink};
use voxshade_core::render::{FramebufferLifecycle, ShaderProgramHandle};
use voxshade_core::settings::{SettingChange, SettingKey, Settings};
use voxshade_core::{Gpu, InjectedSource, InjectionError, PipelineError, PropertyRegistry, ShaderInjector, ShaderStage};

use crate::shaders::ProgramSource;

/// Everything an effect may read during a callback.
///
/// Built fresh by the pipeline for each call; effects never hold on to it.
pub struct EffectContext<'a, G: Gpu> {
    pub gpu: &'a G,
    pub settings: &'a Settings,
    pub injector: &'a ShaderInjector,
    pub lifecycle: &'a FramebufferLifecycle,
    pub targets: &'a HostTargets<G>,
}

impl<G: Gpu> EffectContext<'_, G> {
    /// Runs `source` through the injector with the current settings.
    pub fn inject(&self, source: &str, stage: ShaderStage) -> Result<InjectedSource, PipelineError> {
        Ok(self.injector.on_shader_loaded(source, stage, self.settings)?)
    }

    /// Injects and compiles both stages of `program` under `name`.
    pub fn compile(&self, name: &str, program: &ProgramSource) -> Result<ShaderProgramHandle<G>, PipelineError> {
        let vertex = self.inject(program.vertex, ShaderStage::Vertex)?;
        let fragment = self.inject(program.fragment, ShaderStage::Fragment)?;
        ShaderProgramHandle::compile(self.gpu, name, &vertex, &fragment)
    }
}

/// A post-processing effect driven by host stage callbacks.
///
/// Every method except [`EffectModule::name`], [`EffectModule::properties`]
/// and [`EffectModule::params`] has a no-op default, so an effect only
/// implements the hooks it takes part in.
pub trait EffectModule<G: Gpu> {
    /// Registry name, e.g. `"ssr"`.
    fn name(&self) -> &'static str;

    /// The shader properties this effect injects.
    ///
    /// # Errors
    ///
    /// Fails only if a property name is malformed, which is a programming error.
    fn properties(&self) -> Result<PropertyRegistry, InjectionError>;

    /// Current tuning values as a JSON object.
    fn params(&self) -> Value;

    /// Named renderers this effect registers, one per stage it draws in.
    fn renderers(&self) -> &'static [(FrameStage, &'static str)] {
        &[]
    }

    /// Settings whose changes are routed to [`EffectModule::on_setting_changed`].
    fn watched_settings(&self) -> &'static [SettingKey] {
        &[]
    }

    /// Whether the effect should hold GPU resources and render.
    fn is_enabled(&self, _settings: &Settings) -> bool {
        true
    }

    /// Recompiles every program. The old programs are deleted only after
    /// all new ones compiled.
    fn reload_shaders(&mut self, _ctx: &EffectContext<'_, G>) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Re-creates render targets at the lifecycle's current size.
    fn rebuild_framebuffers(&mut self, _ctx: &EffectContext<'_, G>) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Renders this effect's passes for `stage`. GPU error codes are logged,
    /// never returned.
    fn render_stage(&mut self, _ctx: &EffectContext<'_, G>, _host: &mut dyn Host<G>, _stage: FrameStage) {}

    fn on_setting_changed(
        &mut self,
        _ctx: &EffectContext<'_, G>,
        _host: &mut dyn Host<G>,
        _change: SettingChange,
    ) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Attaches this effect's outputs to the host's final-composition program.
    fn bind_final_uniforms(&self, _sink: &mut dyn UniformSink<G::Texture>) {}

    fn on_pre_godrays(&self, _inputs: &FrameInputs, _sink: &mut dyn UniformSink<G::Texture>) {}

    fn on_pre_sun_render(&self, _settings: &Settings, _sink: &mut dyn UniformSink<G::Texture>) {}

    fn on_sun_rendered(&self, _sink: &mut dyn UniformSink<G::Texture>) {}

    /// Releases every GPU object. The effect may be re-activated afterwards.
    fn dispose(&mut self, _ctx: &EffectContext<'_, G>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use voxshade_core::gpu::recording::UniformCapture;
    use voxshade_core::{RecordingGpu, RecordingHost, UniformValue};

    /// Minimal effect used to verify object safety and the default hooks.
    struct MockEffect {
        frames: usize,
    }

    impl<G: Gpu> EffectModule<G> for MockEffect {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn properties(&self) -> Result<PropertyRegistry, InjectionError> {
            let mut registry = PropertyRegistry::new("MOCK_");
            registry.register_bool("MOCK_ON", |_| true)?;
            Ok(registry)
        }

        fn params(&self) -> Value {
            json!({"frames": self.frames})
        }

        fn render_stage(&mut self, _ctx: &EffectContext<'_, G>, _host: &mut dyn Host<G>, _stage: FrameStage) {
            self.frames += 1;
        }

        fn on_sun_rendered(&self, sink: &mut dyn UniformSink<G::Texture>) {
            sink.uniform("mockFrames", UniformValue::Int(self.frames as i32));
        }
    }

    #[test]
    fn effect_module_is_object_safe() {
        let gpu = RecordingGpu::new();
        let mut host = RecordingHost::new(&gpu, 64, 64, 1.0).expect("host");
        let targets = host.targets();
        let lifecycle = FramebufferLifecycle::new(64, 64, 1.0).expect("lifecycle");
        let settings = Settings::default();
        let injector = ShaderInjector::new();
        let ctx = EffectContext {
            gpu: &gpu,
            settings: &settings,
            injector: &injector,
            lifecycle: &lifecycle,
            targets: &targets,
        };

        let mut effect: Box<dyn EffectModule<RecordingGpu>> = Box::new(MockEffect { frames: 0 });
        effect.render_stage(&ctx, &mut host, FrameStage::Opaque);
        effect.render_stage(&ctx, &mut host, FrameStage::AfterPostProcessing);

        assert_eq!(effect.name(), "mock");
        assert_eq!(effect.params(), json!({"frames": 2}));
        assert!(effect.is_enabled(&settings), "effects are enabled by default");
        assert!(effect.renderers().is_empty());
        assert!(effect.reload_shaders(&ctx).is_ok());

        let mut sink = UniformCapture::default();
        effect.on_sun_rendered(&mut sink);
        assert_eq!(sink.get("mockFrames"), Some(UniformValue::Int(2)));
    }

    #[test]
    fn context_compile_injects_before_compiling() {
        let gpu = RecordingGpu::new();
        let host = RecordingHost::new(&gpu, 32, 32, 1.0).expect("host");
        let targets = host.targets();
        let lifecycle = FramebufferLifecycle::new(32, 32, 1.0).expect("lifecycle");
        let settings = Settings::default();
        let mut injector = ShaderInjector::new();
        let mut registry = PropertyRegistry::new("MOCK_");
        registry.register_float("MOCK_SCALE", |_| 2.0).expect("valid name");
        injector.add_registry(registry);
        let ctx = EffectContext {
            gpu: &gpu,
            settings: &settings,
            injector: &injector,
            lifecycle: &lifecycle,
            targets: &targets,
        };

        let source = ProgramSource {
            name: "mock",
            vertex: "#version 330 core\nvoid main() {}\n",
            fragment: "#version 330 core\nuniform float scale;\nvoid main() { float s = ${MOCK_SCALE}; }\n",
        };
        let program = ctx.compile("mock", &source).expect("placeholder resolves");
        assert!(program.has_uniform("scale"));
        program.delete(&gpu);
    }

    #[test]
    fn context_compile_reports_unresolved_placeholders() {
        let gpu = RecordingGpu::new();
        let host = RecordingHost::new(&gpu, 32, 32, 1.0).expect("host");
        let targets = host.targets();
        let lifecycle = FramebufferLifecycle::new(32, 32, 1.0).expect("lifecycle");
        let settings = Settings::default();
        let injector = ShaderInjector::new();
        let ctx = EffectContext {
            gpu: &gpu,
            settings: &settings,
            injector: &injector,
            lifecycle: &lifecycle,
            targets: &targets,
        };

        let source = ProgramSource {
            name: "mock",
            vertex: "void main() {}",
            fragment: "void main() { float s = ${MOCK_MISSING}; }",
        };
        let err = ctx.compile("mock", &source).err().expect("should fail");
        assert!(matches!(err, PipelineError::Injection(_)), "got {err}");
    }
}
