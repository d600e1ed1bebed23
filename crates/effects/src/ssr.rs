//! Screen-space reflections and underwater caustics.
//!
//! At the opaque stage the effect renders reflective chunk geometry into a
//! five-attachment geometry buffer (view position, normal, tint, light,
//! diffraction). After post-processing it resolves reflections into
//! `ssrScene`/`diffraction` and draws caustics into their own target; the
//! host's final composition samples all three.

use std::collections::HashSet;
use std::mem;

use serde_json::{json, Value};
use voxshade_core::gpu::{check_gpu_error, BlendFactor, Capability, FramebufferTarget};
use voxshade_core::host::{ChunkRenderPass, FrameStage, Host, HostTargets, UniformSink};
use voxshade_core::params::{param_bool, param_f32};
use voxshade_core::render::{
    AttachmentSpec, DepthSpec, RenderPassTable, RenderTargetSet, ShaderProgramHandle, TargetSpec,
    NO_SAMPLE_BORDER,
};
use voxshade_core::settings::Settings;
use voxshade_core::{Gpu, InjectionError, PipelineError, PropertyRegistry, UniformValue};

use crate::effect::{EffectContext, EffectModule};
use crate::environment::{day_light, player_underwater, WindSmoother, DEFAULT_WIND_SMOOTHING};
use crate::shaders::{CAUSTICS, SSR_OUT, SSR_WORLD};

/// Macro prefix of every SSR property.
pub const NAMESPACE: &str = "SSR_";

/// Host texture holding the caustics pattern.
pub const CAUSTICS_TEXTURE: &str = "environment/caustics";

/// Water ripple samplers: sampler name, host texture name, texture unit.
/// Unit 0 is the terrain atlas.
const WATER_TEXTURES: [(&str, &str, u32); 4] = [
    ("water1", "environment/water/1", 1),
    ("water2", "environment/water/2", 2),
    ("water3", "environment/water/3", 3),
    ("imperfect", "environment/imperfect", 4),
];

const OPAQUE_BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Registers the SSR shader properties.
pub fn properties() -> Result<PropertyRegistry, InjectionError> {
    let mut registry = PropertyRegistry::new(NAMESPACE);
    registry.register_bool("SSR_ENABLED", |s| s.ssr_enabled)?;
    registry.register_bool("SSR_DIFFRACTION", |s| s.ssr_diffraction)?;
    registry.register_bool("SSR_BLURRED_NORMAL", |s| s.ssr_blurred_normal)?;
    registry.register_float("SSR_WATER_TRANSPARENCY", |s| {
        (100 - s.ssr_water_transparency) as f32 / 100.0
    })?;
    registry.register_float("SSR_SPLASH_TRANSPARENCY", |s| {
        (100 - s.ssr_splash_transparency) as f32 / 100.0
    })?;
    registry.register_float("SSR_REFLECTION_DIMMING", |s| s.ssr_reflection_dimming as f32 / 100.0)?;
    registry.register_float("SSR_TINT_INFLUENCE", |s| s.ssr_tint_influence as f32 / 100.0)?;
    registry.register_float("SSR_SKY_MIXIN", |s| s.ssr_sky_mixin as f32 / 100.0)?;
    Ok(registry)
}

/// Tuning that is not exposed as a user setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SsrConfig {
    /// Per-frame wind smoothing factor.
    pub wind_smoothing: f32,
    /// Attach the host's primary depth instead of blitting into an own copy.
    pub share_primary_depth: bool,
}

impl Default for SsrConfig {
    fn default() -> Self {
        Self {
            wind_smoothing: DEFAULT_WIND_SMOOTHING,
            share_primary_depth: false,
        }
    }
}

impl SsrConfig {
    /// Reads `wind_smoothing` and `share_primary_depth`; missing keys default.
    pub fn from_json(params: &Value) -> Self {
        let defaults = Self::default();
        Self {
            wind_smoothing: param_f32(params, "wind_smoothing", defaults.wind_smoothing, 0.0..=1.0),
            share_primary_depth: param_bool(params, "share_primary_depth", defaults.share_primary_depth),
        }
    }
}

struct Programs<G: Gpu> {
    world: RenderPassTable<G>,
    resolve: Option<ShaderProgramHandle<G>>,
    caustics: Option<ShaderProgramHandle<G>>,
}

impl<G: Gpu> Programs<G> {
    fn empty() -> Self {
        Self {
            world: RenderPassTable::new(),
            resolve: None,
            caustics: None,
        }
    }

    fn compile(ctx: &EffectContext<'_, G>) -> Result<Self, PipelineError> {
        let mut programs = Self::empty();
        match programs.compile_into(ctx) {
            Ok(()) => Ok(programs),
            Err(err) => {
                programs.delete(ctx.gpu);
                Err(err)
            }
        }
    }

    fn compile_into(&mut self, ctx: &EffectContext<'_, G>) -> Result<(), PipelineError> {
        for pass in ChunkRenderPass::ALL {
            let name = format!("{}/{pass}", SSR_WORLD.name);
            self.world.insert(pass, ctx.compile(&name, &SSR_WORLD)?);
        }
        self.resolve = Some(ctx.compile(SSR_OUT.name, &SSR_OUT)?);
        self.caustics = Some(ctx.compile(CAUSTICS.name, &CAUSTICS)?);
        Ok(())
    }

    fn delete(&mut self, gpu: &G) {
        self.world.clear(gpu);
        for program in [self.resolve.take(), self.caustics.take()].into_iter().flatten() {
            program.delete(gpu);
        }
    }

    fn is_empty(&self) -> bool {
        self.world.is_empty() && self.resolve.is_none() && self.caustics.is_none()
    }
}

/// The SSR and caustics effect.
pub struct Ssr<G: Gpu> {
    config: SsrConfig,
    wind: WindSmoother,
    geometry: Option<RenderTargetSet<G>>,
    output: Option<RenderTargetSet<G>>,
    caustics: Option<RenderTargetSet<G>>,
    programs: Programs<G>,
    missing_textures: HashSet<&'static str>,
}

impl<G: Gpu> Ssr<G> {
    pub fn new(config: SsrConfig) -> Self {
        Self {
            config,
            wind: WindSmoother::new(config.wind_smoothing),
            geometry: None,
            output: None,
            caustics: None,
            programs: Programs::empty(),
            missing_textures: HashSet::new(),
        }
    }

    pub fn from_json(params: &Value) -> Self {
        Self::new(SsrConfig::from_json(params))
    }

    pub fn config(&self) -> SsrConfig {
        self.config
    }

    /// Smoothed wind speed as last pushed to `windIntensity`.
    pub fn wind_intensity(&self) -> f32 {
        self.wind.current()
    }

    pub fn geometry_targets(&self) -> Option<&RenderTargetSet<G>> {
        self.geometry.as_ref()
    }

    pub fn output_targets(&self) -> Option<&RenderTargetSet<G>> {
        self.output.as_ref()
    }

    pub fn caustics_targets(&self) -> Option<&RenderTargetSet<G>> {
        self.caustics.as_ref()
    }

    /// Whether every target set and program is allocated.
    pub fn is_allocated(&self) -> bool {
        self.geometry.is_some()
            && self.output.is_some()
            && self.caustics.is_some()
            && self.programs.resolve.is_some()
            && self.programs.caustics.is_some()
    }

    fn geometry_spec(&self, targets: &HostTargets<G>) -> TargetSpec<G::Texture> {
        TargetSpec {
            label: "ssr-geometry".into(),
            colors: vec![
                AttachmentSpec::hdr("gPosition")
                    .with_border(NO_SAMPLE_BORDER)
                    .with_clear(OPAQUE_BLACK),
                AttachmentSpec::hdr("gNormal")
                    .with_border(NO_SAMPLE_BORDER)
                    .with_clear(OPAQUE_BLACK),
                AttachmentSpec::color("gTint"),
                AttachmentSpec::color("gLight"),
                AttachmentSpec::hdr("gDiffraction")
                    .with_border(NO_SAMPLE_BORDER)
                    .with_clear(OPAQUE_BLACK),
            ],
            depth: if self.config.share_primary_depth {
                DepthSpec::Shared(targets.primary_depth)
            } else {
                DepthSpec::Owned
            },
        }
    }

    fn output_spec() -> TargetSpec<G::Texture> {
        TargetSpec {
            label: "ssr-out".into(),
            colors: vec![
                AttachmentSpec::color("ssrScene"),
                AttachmentSpec::hdr("diffraction").with_border(NO_SAMPLE_BORDER),
            ],
            depth: DepthSpec::None,
        }
    }

    fn caustics_spec() -> TargetSpec<G::Texture> {
        TargetSpec {
            label: "caustics".into(),
            colors: vec![AttachmentSpec::color("caustics")],
            depth: DepthSpec::None,
        }
    }

    fn rebuild_sets(
        ctx: &EffectContext<'_, G>,
        sets: [(&mut Option<RenderTargetSet<G>>, TargetSpec<G::Texture>); 3],
    ) -> Result<(), PipelineError> {
        for (slot, spec) in sets {
            match slot {
                Some(set) => ctx.lifecycle.rebuild(ctx.gpu, set, &spec)?,
                None => *slot = Some(ctx.lifecycle.allocate(ctx.gpu, &spec)?),
            }
        }
        Ok(())
    }

    fn release_targets(&mut self, ctx: &EffectContext<'_, G>) {
        for set in [self.geometry.take(), self.output.take(), self.caustics.take()]
            .into_iter()
            .flatten()
        {
            ctx.lifecycle.release(ctx.gpu, set);
        }
    }

    /// Looks up a host texture, warning once per name if it is missing.
    fn host_texture(
        &mut self,
        ctx: &EffectContext<'_, G>,
        host: &mut dyn Host<G>,
        name: &'static str,
    ) -> Option<G::Texture> {
        let texture = host.texture(ctx.gpu, name);
        if texture.is_none() && self.missing_textures.insert(name) {
            log::warn!("host texture '{name}' is missing; its sampler stays unbound");
        }
        texture
    }

    fn render_geometry(&mut self, ctx: &EffectContext<'_, G>, host: &mut dyn Host<G>) {
        let inputs = host.frame_inputs();
        let wind = self.wind.update(inputs.wind_speed);
        let water: Vec<_> = WATER_TEXTURES
            .iter()
            .map(|&(sampler, asset, unit)| (sampler, unit, self.host_texture(ctx, host, asset)))
            .collect();

        let Some(geometry) = &self.geometry else {
            return;
        };
        let gpu = ctx.gpu;
        let targets = ctx.targets;

        if geometry.owns_depth() {
            gpu.bind_framebuffer(FramebufferTarget::Read, Some(targets.primary_framebuffer));
            gpu.bind_framebuffer(FramebufferTarget::Draw, Some(geometry.framebuffer()));
            gpu.clear_depth();
            gpu.blit_depth(targets.scaled_size(), geometry.size());
        }

        geometry.bind(gpu);
        geometry.clear(gpu);
        gpu.set_capability(Capability::CullFace, true);
        gpu.set_depth_mask(false);
        gpu.set_capability(Capability::DepthTest, true);
        gpu.set_capability(Capability::Blend, true);
        for index in 0..geometry.colors().len() as u32 {
            gpu.set_blend_func_attachment(index, BlendFactor::OneMinusSrcAlpha, BlendFactor::SrcAlpha);
        }

        let uniforms = [
            ("projectionMatrix", UniformValue::Mat4(inputs.projection)),
            ("modelViewMatrix", UniformValue::Mat4(inputs.modelview)),
            ("dropletIntensity", UniformValue::Float(inputs.rain_intensity)),
            ("windIntensity", UniformValue::Float(wind)),
            (
                "playerUnderwater",
                UniformValue::Float(player_underwater(inputs.eyes_in_water_depth)),
            ),
            ("rgbaAmbientIn", UniformValue::Vec3(inputs.ambient_color)),
        ];

        for (atlas_index, atlas) in host.terrain_atlases().into_iter().enumerate() {
            for (pass, program) in self.programs.world.iter() {
                gpu.set_capability(Capability::CullFace, pass.culls_faces());
                let Some(program) = program else {
                    continue;
                };
                program.use_program(gpu);
                program.bind_texture(gpu, "terrainTex", atlas, 0);
                set_uniforms(gpu, program, &uniforms);
                for &(sampler, unit, texture) in &water {
                    if let Some(texture) = texture {
                        program.bind_texture(gpu, sampler, texture, unit);
                    }
                }
                program.uniform(gpu, "renderPass", UniformValue::Int(pass.index() as i32));
                host.render_chunk_batches(gpu, pass, atlas_index);
            }
        }

        gpu.use_program(None);
        rebind_primary(gpu, targets);
        gpu.set_depth_mask(false);
        gpu.set_capability(Capability::Blend, true);
        check_gpu_error(gpu, "rendering SSR geometry");
    }

    fn render_resolve(&mut self, ctx: &EffectContext<'_, G>, host: &mut dyn Host<G>) {
        let inputs = host.frame_inputs();
        let shadows_active = host.shadow_map_quality() > 0;
        let caustics_texture = self.host_texture(ctx, host, CAUSTICS_TEXTURE);

        let (Some(geometry), Some(output), Some(resolve)) =
            (&self.geometry, &self.output, &self.programs.resolve)
        else {
            return;
        };
        let gpu = ctx.gpu;
        let targets = ctx.targets;
        let inv_projection = inputs.projection.inverse();
        let inv_modelview = inputs.camera_origin_view.inverse();
        let day_light = day_light(inputs.day_light_strength, inputs.moon_light_strength);
        let fog = [
            ("fogDensityIn", UniformValue::Float(inputs.fog_density)),
            ("fogMinIn", UniformValue::Float(inputs.fog_min)),
            ("rgbaFog", UniformValue::Vec4(inputs.fog_color)),
        ];

        output.bind(gpu);
        output.clear(gpu);
        resolve.use_program(gpu);
        gpu.set_capability(Capability::Blend, true);
        bind_samplers(
            gpu,
            resolve,
            0,
            &[
                ("primaryScene", Some(targets.primary_color)),
                ("gPosition", geometry.color_by_name("gPosition")),
                ("gNormal", geometry.color_by_name("gNormal")),
                ("gDepth", Some(targets.primary_depth)),
                ("gTint", geometry.color_by_name("gTint")),
                ("gLight", geometry.color_by_name("gLight")),
                ("gDiffraction", geometry.color_by_name("gDiffraction")),
            ],
        );
        set_uniforms(
            gpu,
            resolve,
            &[
                ("projectionMatrix", UniformValue::Mat4(inputs.projection)),
                ("invProjectionMatrix", UniformValue::Mat4(inv_projection)),
                ("invModelViewMatrix", UniformValue::Mat4(inv_modelview)),
                ("zNear", UniformValue::Float(inputs.z_near)),
                ("zFar", UniformValue::Float(inputs.z_far)),
                ("sunPosition", UniformValue::Vec3(inputs.sun_position)),
                ("dayLight", UniformValue::Float(day_light)),
                ("horizonFog", UniformValue::Float(inputs.cloud_density)),
            ],
        );
        set_uniforms(gpu, resolve, &fog);
        gpu.draw_fullscreen_triangle();

        if let (Some(caustics), Some(program)) = (&self.caustics, &self.programs.caustics) {
            caustics.bind(gpu);
            caustics.clear(gpu);
            program.use_program(gpu);
            bind_samplers(
                gpu,
                program,
                0,
                &[
                    ("gDepth", Some(targets.primary_depth)),
                    ("gNormal", geometry.color_by_name("gNormal")),
                    ("caustics", caustics_texture),
                    ("gLight", geometry.color_by_name("gLight")),
                ],
            );
            set_uniforms(
                gpu,
                program,
                &[
                    ("invProjectionMatrix", UniformValue::Mat4(inv_projection)),
                    ("invModelViewMatrix", UniformValue::Mat4(inv_modelview)),
                    ("dayLight", UniformValue::Float(day_light)),
                    ("playerPos", UniformValue::Vec3(inputs.player_position)),
                    ("sunPosition", UniformValue::Vec3(inputs.sun_position_3d)),
                    ("waterFlowCounter", UniformValue::Float(inputs.water_flow_counter)),
                ],
            );
            if let (true, Some(maps), Some(shadow)) = (shadows_active, targets.shadow_maps, inputs.shadow) {
                bind_samplers(
                    gpu,
                    program,
                    4,
                    &[("shadowMapFar", Some(maps.far)), ("shadowMapNear", Some(maps.near))],
                );
                set_uniforms(
                    gpu,
                    program,
                    &[
                        ("shadowMapWidthInv", UniformValue::Float(1.0 / maps.far_width.max(1) as f32)),
                        ("shadowMapHeightInv", UniformValue::Float(1.0 / maps.far_height.max(1) as f32)),
                        ("shadowRangeFar", UniformValue::Float(shadow.range_far)),
                        ("shadowRangeNear", UniformValue::Float(shadow.range_near)),
                        ("toShadowMapSpaceMatrixFar", UniformValue::Mat4(shadow.to_shadow_space_far)),
                        ("toShadowMapSpaceMatrixNear", UniformValue::Mat4(shadow.to_shadow_space_near)),
                    ],
                );
            }
            set_uniforms(gpu, program, &fog);
            gpu.draw_fullscreen_triangle();
            check_gpu_error(gpu, "calculating caustics");
        }

        gpu.use_program(None);
        rebind_primary(gpu, targets);
        check_gpu_error(gpu, "calculating SSR");
    }
}

fn set_uniforms<G: Gpu>(gpu: &G, program: &ShaderProgramHandle<G>, uniforms: &[(&str, UniformValue)]) {
    for &(name, value) in uniforms {
        program.uniform(gpu, name, value);
    }
}

/// Binds each present texture to consecutive units starting at `first_unit`.
fn bind_samplers<G: Gpu>(
    gpu: &G,
    program: &ShaderProgramHandle<G>,
    first_unit: u32,
    samplers: &[(&str, Option<G::Texture>)],
) {
    for (offset, &(name, texture)) in samplers.iter().enumerate() {
        if let Some(texture) = texture {
            program.bind_texture(gpu, name, texture, first_unit + offset as u32);
        }
    }
}

fn rebind_primary<G: Gpu>(gpu: &G, targets: &HostTargets<G>) {
    gpu.bind_framebuffer(FramebufferTarget::Both, Some(targets.primary_framebuffer));
    let (width, height) = targets.scaled_size();
    gpu.viewport(width, height);
}

impl<G: Gpu> EffectModule<G> for Ssr<G> {
    fn name(&self) -> &'static str {
        "ssr"
    }

    fn properties(&self) -> Result<PropertyRegistry, InjectionError> {
        properties()
    }

    fn params(&self) -> Value {
        json!({
            "wind_smoothing": self.config.wind_smoothing,
            "share_primary_depth": self.config.share_primary_depth,
            "wind_intensity": self.wind.current(),
        })
    }

    fn renderers(&self) -> &'static [(FrameStage, &'static str)] {
        &[
            (FrameStage::Opaque, "ssr-world"),
            (FrameStage::AfterPostProcessing, "ssr-out"),
        ]
    }

    fn is_enabled(&self, settings: &Settings) -> bool {
        settings.ssr_enabled
    }

    fn reload_shaders(&mut self, ctx: &EffectContext<'_, G>) -> Result<(), PipelineError> {
        let fresh = Programs::compile(ctx)?;
        let mut old = mem::replace(&mut self.programs, fresh);
        if !old.is_empty() {
            old.delete(ctx.gpu);
        }
        log::info!("ssr: compiled {} world programs plus resolve and caustics", self.programs.world.len());
        Ok(())
    }

    fn rebuild_framebuffers(&mut self, ctx: &EffectContext<'_, G>) -> Result<(), PipelineError> {
        let geometry = self.geometry_spec(ctx.targets);
        let result = Self::rebuild_sets(
            ctx,
            [
                (&mut self.geometry, geometry),
                (&mut self.output, Self::output_spec()),
                (&mut self.caustics, Self::caustics_spec()),
            ],
        );
        match result {
            Ok(()) => {
                let (width, height) = ctx.lifecycle.scaled_size();
                log::info!("ssr: framebuffers at {width}x{height}");
                Ok(())
            }
            Err(err) => {
                self.release_targets(ctx);
                Err(err)
            }
        }
    }

    fn render_stage(&mut self, ctx: &EffectContext<'_, G>, host: &mut dyn Host<G>, stage: FrameStage) {
        if !ctx.settings.ssr_enabled {
            return;
        }
        match stage {
            FrameStage::Opaque => self.render_geometry(ctx, host),
            FrameStage::AfterPostProcessing => self.render_resolve(ctx, host),
        }
    }

    fn bind_final_uniforms(&self, sink: &mut dyn UniformSink<G::Texture>) {
        let (Some(output), Some(caustics)) = (&self.output, &self.caustics) else {
            return;
        };
        let bindings = [
            ("ssrScene", output.color_by_name("ssrScene")),
            ("diffraction", output.color_by_name("diffraction")),
            ("caustics", caustics.color_by_name("caustics")),
        ];
        for (name, texture) in bindings {
            if let Some(texture) = texture {
                sink.bind_texture(name, texture);
            }
        }
    }

    fn dispose(&mut self, ctx: &EffectContext<'_, G>) {
        self.release_targets(ctx);
        self.programs.delete(ctx.gpu);
        self.missing_textures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use voxshade_core::gpu::recording::{GpuCall, UniformCapture};
    use voxshade_core::inject::PropertyValue;
    use voxshade_core::render::TextureFormat;
    use voxshade_core::RecordingGpu;

    fn float_property(settings: &Settings, name: &str) -> f32 {
        let registry = properties().expect("properties register");
        match registry.get(name).expect("registered").evaluate(settings) {
            PropertyValue::Float(v) => v,
            other => panic!("{name} is not a float: {other:?}"),
        }
    }

    fn ready(fixture: &mut Fixture, config: SsrConfig) -> Ssr<RecordingGpu> {
        let (ctx, _) = fixture.split();
        let mut ssr = Ssr::new(config);
        ssr.reload_shaders(&ctx).expect("shaders compile");
        ssr.rebuild_framebuffers(&ctx).expect("targets complete");
        ssr
    }

    #[test]
    fn float_properties_follow_documented_formulas() {
        let settings = Settings::default();
        let cases = [
            ("SSR_WATER_TRANSPARENCY", 1.0),
            ("SSR_SPLASH_TRANSPARENCY", 0.35),
            ("SSR_REFLECTION_DIMMING", 1.05),
            ("SSR_TINT_INFLUENCE", 0.7),
            ("SSR_SKY_MIXIN", 0.22),
        ];
        for (name, expected) in cases {
            let value = float_property(&settings, name);
            assert!((value - expected).abs() < 1e-6, "{name} = {value}, expected {expected}");
        }
    }

    #[test]
    fn bool_properties_mirror_settings() {
        let registry = properties().expect("properties register");
        let settings = Settings {
            ssr_blurred_normal: true,
            ssr_diffraction: false,
            ..Settings::default()
        };
        let eval = |name: &str| registry.get(name).expect("registered").evaluate(&settings);
        assert_eq!(eval("SSR_ENABLED"), PropertyValue::Bool(true));
        assert_eq!(eval("SSR_BLURRED_NORMAL"), PropertyValue::Bool(true));
        assert_eq!(eval("SSR_DIFFRACTION"), PropertyValue::Bool(false));
        assert_eq!(registry.len(), 8);
    }

    #[test]
    fn config_reads_tuning_object() {
        let config = SsrConfig::from_json(&json!({"wind_smoothing": 0.05, "share_primary_depth": true}));
        assert!((config.wind_smoothing - 0.05).abs() < f32::EPSILON);
        assert!(config.share_primary_depth);
        assert_eq!(SsrConfig::from_json(&json!({})), SsrConfig::default());
    }

    #[test]
    fn rebuild_allocates_complete_sets_at_viewport_size() {
        let mut fixture = Fixture::new(800, 600);
        let ssr = ready(&mut fixture, SsrConfig::default());
        assert!(ssr.is_allocated());

        let geometry = ssr.geometry_targets().expect("geometry set");
        assert_eq!(geometry.size(), (800, 600));
        assert_eq!(geometry.colors().len(), 5);
        assert!(geometry.owns_depth(), "geometry owns its depth by default");
        assert_eq!(fixture.gpu.color_attachments(geometry.framebuffer()).len(), 5);

        let position = fixture
            .gpu
            .texture_config(geometry.color(0).expect("position"))
            .expect("live texture");
        assert_eq!(position.format, TextureFormat::Rgba16F);
        let tint = fixture
            .gpu
            .texture_config(geometry.color(2).expect("tint"))
            .expect("live texture");
        assert_eq!(tint.format, TextureFormat::Rgba8);

        let output = ssr.output_targets().expect("output set");
        assert_eq!(output.colors().len(), 2);
        assert_eq!(output.depth_texture(), None);
        assert_eq!(ssr.caustics_targets().expect("caustics set").colors().len(), 1);
    }

    #[test]
    fn shared_depth_aliases_primary_depth() {
        let mut fixture = Fixture::new(320, 240);
        let config = SsrConfig {
            share_primary_depth: true,
            ..SsrConfig::default()
        };
        let mut ssr = ready(&mut fixture, config);
        let geometry = ssr.geometry_targets().expect("geometry set");
        assert!(!geometry.owns_depth());
        assert_eq!(geometry.depth_texture(), Some(fixture.targets.primary_depth));

        fixture.gpu.clear_calls();
        let (ctx, host) = fixture.split();
        ssr.render_stage(&ctx, host, FrameStage::Opaque);
        assert!(
            !fixture.gpu.calls().iter().any(|c| matches!(c, GpuCall::BlitDepth { .. })),
            "shared depth must not be blitted"
        );
    }

    #[test]
    fn opaque_stage_fills_geometry_buffer() {
        let mut fixture = Fixture::new(400, 300);
        fixture.host.inputs.wind_speed = 1.0;
        fixture.host.inputs.rain_intensity = 0.6;
        let mut ssr = ready(&mut fixture, SsrConfig::default());
        fixture.gpu.clear_calls();

        let (ctx, host) = fixture.split();
        ssr.render_stage(&ctx, host, FrameStage::Opaque);
        let calls = fixture.gpu.calls();

        assert!(calls.contains(&GpuCall::BlitDepth {
            src: (400, 300),
            dst: (400, 300)
        }));
        let clears = calls.iter().filter(|c| matches!(c, GpuCall::ClearColor { .. })).count();
        assert_eq!(clears, 5, "every attachment is cleared to its sentinel");
        assert!(calls.contains(&GpuCall::ClearColor {
            index: 0,
            color: OPAQUE_BLACK
        }));
        let blends = calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    GpuCall::BlendFunc {
                        src: BlendFactor::OneMinusSrcAlpha,
                        dst: BlendFactor::SrcAlpha,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(blends, 5);

        let batches = calls.iter().filter(|c| matches!(c, GpuCall::DrawBatches { .. })).count();
        assert_eq!(
            batches,
            voxshade_core::RecordingHost::ATLAS_COUNT * ChunkRenderPass::COUNT,
            "one batch draw per atlas and pass"
        );
        assert!(calls.contains(&GpuCall::Capability {
            capability: Capability::CullFace,
            enabled: false
        }));

        let wind = fixture.gpu.uniform_writes("windIntensity");
        assert!(wind
            .iter()
            .all(|v| *v == UniformValue::Float(DEFAULT_WIND_SMOOTHING)));
        assert_eq!(fixture.gpu.uniform_writes("dropletIntensity")[0], UniformValue::Float(0.6));
        let passes = fixture.gpu.uniform_writes("renderPass");
        assert_eq!(passes.len(), 2 * ChunkRenderPass::COUNT);
        assert_eq!(passes[4], UniformValue::Int(ChunkRenderPass::Liquid.index() as i32));

        assert!(
            matches!(
                calls.last(),
                Some(GpuCall::Capability {
                    capability: Capability::Blend,
                    enabled: true
                })
            ),
            "blending is restored last"
        );
        assert!(calls.contains(&GpuCall::BindFramebuffer {
            target: FramebufferTarget::Both,
            framebuffer: Some(fixture.targets.primary_framebuffer)
        }));
    }

    #[test]
    fn wind_updates_once_per_frame() {
        let mut fixture = Fixture::new(64, 64);
        fixture.host.inputs.wind_speed = 1.0;
        let mut ssr = ready(&mut fixture, SsrConfig::default());
        for _ in 0..3 {
            let (ctx, host) = fixture.split();
            ssr.render_stage(&ctx, &mut *host, FrameStage::Opaque);
            ssr.render_stage(&ctx, host, FrameStage::AfterPostProcessing);
        }
        let expected = 1.0 - (1.0 - DEFAULT_WIND_SMOOTHING).powi(3);
        assert!((ssr.wind_intensity() - expected).abs() < 1e-6);
    }

    #[test]
    fn resolve_binds_real_far_plane_and_day_light() {
        let mut fixture = Fixture::new(256, 256);
        fixture.host.inputs.day_light_strength = 0.4;
        fixture.host.inputs.moon_light_strength = 0.2;
        let mut ssr = ready(&mut fixture, SsrConfig::default());
        fixture.gpu.clear_calls();

        let (ctx, host) = fixture.split();
        ssr.render_stage(&ctx, host, FrameStage::AfterPostProcessing);

        assert_eq!(fixture.gpu.uniform_writes("zNear"), vec![UniformValue::Float(0.1)]);
        assert_eq!(fixture.gpu.uniform_writes("zFar"), vec![UniformValue::Float(1500.0)]);
        for value in fixture.gpu.uniform_writes("dayLight") {
            match value {
                UniformValue::Float(v) => assert!((v - 0.375).abs() < 1e-6, "dayLight = {v}"),
                other => panic!("dayLight written as {other:?}"),
            }
        }
        let calls = fixture.gpu.calls();
        let draws = calls.iter().filter(|c| **c == GpuCall::DrawFullscreen).count();
        assert_eq!(draws, 2, "resolve and caustics");
        assert!(fixture.gpu.uniform_writes("shadowRangeFar").is_empty());
        assert!(
            calls.iter().rev().find(|c| matches!(c, GpuCall::BindFramebuffer { .. }))
                == Some(&GpuCall::BindFramebuffer {
                    target: FramebufferTarget::Both,
                    framebuffer: Some(fixture.targets.primary_framebuffer)
                }),
            "host primary framebuffer is rebound last"
        );
    }

    #[test]
    fn caustics_sample_shadow_maps_when_shadows_are_on() {
        let mut fixture = Fixture::new(128, 128);
        fixture.host.shadow_map_quality = 1;
        fixture.host.inputs.shadow = Some(voxshade_core::host::ShadowInputs {
            range_near: 32.0,
            range_far: 256.0,
            to_shadow_space_near: glam::Mat4::IDENTITY,
            to_shadow_space_far: glam::Mat4::IDENTITY,
        });
        fixture.targets = fixture.host.targets();
        let mut ssr = ready(&mut fixture, SsrConfig::default());

        let (ctx, host) = fixture.split();
        ssr.render_stage(&ctx, host, FrameStage::AfterPostProcessing);

        assert_eq!(fixture.gpu.uniform_writes("shadowRangeFar"), vec![UniformValue::Float(256.0)]);
        let inv = 1.0 / voxshade_core::RecordingHost::SHADOW_MAP_SIZE as f32;
        assert_eq!(fixture.gpu.uniform_writes("shadowMapWidthInv"), vec![UniformValue::Float(inv)]);
    }

    #[test]
    fn missing_host_textures_skip_their_samplers() {
        let mut fixture = Fixture::new(64, 64);
        fixture.host.missing_textures.insert("environment/water/1".to_string());
        let mut ssr = ready(&mut fixture, SsrConfig::default());
        fixture.gpu.clear_calls();

        let (ctx, host) = fixture.split();
        ssr.render_stage(&ctx, host, FrameStage::Opaque);

        assert!(fixture.gpu.uniform_writes("water1").is_empty());
        assert!(!fixture.gpu.uniform_writes("water2").is_empty());
        assert!(fixture.gpu.draw_calls() > 0, "geometry still renders");
    }

    #[test]
    fn incomplete_targets_leave_nothing_allocated() {
        let mut fixture = Fixture::new(64, 64);
        let baseline = fixture.gpu.live_handles();
        fixture.gpu.force_incomplete_framebuffers(true);

        let (ctx, _) = fixture.split();
        let mut ssr: Ssr<RecordingGpu> = Ssr::new(SsrConfig::default());
        let err = ssr.rebuild_framebuffers(&ctx).err().expect("should fail");
        assert!(matches!(err, PipelineError::FramebufferIncomplete { .. }), "got {err}");
        assert!(ssr.geometry_targets().is_none());
        assert_eq!(fixture.gpu.live_handles(), baseline);
    }

    #[test]
    fn rebuild_after_resize_releases_previous_generation() {
        let mut fixture = Fixture::new(800, 600);
        let mut ssr = ready(&mut fixture, SsrConfig::default());
        let old: Vec<u32> = ssr
            .geometry_targets()
            .map(|set| set.owned_textures())
            .unwrap_or_default();

        fixture.lifecycle.resize(1024, 768, 1.5).expect("valid size");
        let (ctx, _) = fixture.split();
        ssr.rebuild_framebuffers(&ctx).expect("rebuild");

        assert_eq!(ssr.geometry_targets().map(|s| s.size()), Some((1536, 1152)));
        assert!(old.iter().all(|t| !fixture.gpu.is_live_texture(*t)));
    }

    #[test]
    fn final_composition_receives_outputs() {
        let mut fixture = Fixture::new(64, 64);
        let ssr = ready(&mut fixture, SsrConfig::default());
        let mut sink = UniformCapture::default();
        ssr.bind_final_uniforms(&mut sink);

        let output = ssr.output_targets().expect("output");
        assert_eq!(sink.texture("ssrScene"), output.color(0));
        assert_eq!(sink.texture("diffraction"), output.color(1));
        assert_eq!(
            sink.texture("caustics"),
            ssr.caustics_targets().and_then(|c| c.color(0))
        );
    }

    #[test]
    fn dispose_returns_to_baseline() {
        let mut fixture = Fixture::new(800, 600);
        let baseline = fixture.gpu.live_handles();
        let mut ssr = ready(&mut fixture, SsrConfig::default());
        assert!(fixture.gpu.live_handles() > baseline);

        let (ctx, _) = fixture.split();
        ssr.dispose(&ctx);
        assert!(!ssr.is_allocated());
        assert_eq!(fixture.gpu.live_handles(), baseline);

        let mut sink = UniformCapture::default();
        ssr.bind_final_uniforms(&mut sink);
        assert!(sink.textures.is_empty(), "disposed effect binds nothing");
    }

    #[test]
    fn failed_reload_keeps_previous_programs() {
        let mut fixture = Fixture::new(64, 64);
        let mut ssr = ready(&mut fixture, SsrConfig::default());
        let before = fixture.gpu.live_programs();

        fixture.gpu.fail_compiles_containing("outCaustics");
        let (ctx, _) = fixture.split();
        let err = ssr.reload_shaders(&ctx).err().expect("caustics fails");
        assert!(matches!(err, PipelineError::Shader { ref program, .. } if program == "caustics"));
        assert_eq!(fixture.gpu.live_programs(), before, "partial compile was cleaned up");
        assert!(ssr.is_allocated());
    }
}
