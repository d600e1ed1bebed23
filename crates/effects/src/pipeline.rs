//! The object the host drives.
//!
//! A [`Pipeline`] owns the GPU backend, the settings store, the shader
//! injector, every effect and the host's current targets. The host calls
//! its `on_*` hooks from the render thread at the matching points of its
//! frame; nothing here spawns threads or blocks.
//!
//! Settings scheduled through a [`SettingsHandle`] are drained at the start
//! of each stage callback, persisted, routed to the effects watching them,
//! and may activate or deactivate effects before anything renders.

use serde_json::Value;
use voxshade_core::gpu::ensure_render_thread;
use voxshade_core::host::{FrameStage, Host, HostTargets, UniformSink};
use voxshade_core::render::FramebufferLifecycle;
use voxshade_core::settings::{SettingChange, SettingKey, SettingValue, Settings, SettingsWatchers};
use voxshade_core::{
    Gpu, InjectionError, PipelineError, SettingsHandle, SettingsStore, ShaderInjector, ShaderStage,
};

use crate::effect::{EffectContext, EffectModule};
use crate::shadow_tweaks::NEAR_SHADOW_Z_EXTENSION;
use crate::stage::{CompositingStageManager, EffectId, EffectStatus, PipelineState};
use crate::EffectKind;

macro_rules! context {
    ($pipeline:expr) => {
        EffectContext {
            gpu: &$pipeline.gpu,
            settings: $pipeline.store.settings(),
            injector: &$pipeline.injector,
            lifecycle: &$pipeline.lifecycle,
            targets: &$pipeline.targets,
        }
    };
}

pub struct Pipeline<G: Gpu> {
    gpu: G,
    store: SettingsStore,
    injector: ShaderInjector,
    lifecycle: FramebufferLifecycle,
    targets: HostTargets<G>,
    manager: CompositingStageManager<G>,
    watchers: SettingsWatchers<EffectId>,
    state: PipelineState,
}

impl<G: Gpu> Pipeline<G> {
    /// Builds every effect with default tuning.
    pub fn new(gpu: G, store: SettingsStore, targets: HostTargets<G>) -> Result<Self, PipelineError> {
        Self::with_params(gpu, store, targets, &Value::Null)
    }

    /// Builds every effect, passing `params[<effect name>]` as its tuning
    /// object, then compiles and allocates the enabled ones.
    ///
    /// # Errors
    ///
    /// `WrongThread` off the render thread, `InvalidDimensions` for bad
    /// targets, or `Injection` if an effect shader references an unknown
    /// property. Compile failures and incomplete framebuffers only mark the
    /// affected effect broken.
    pub fn with_params(
        gpu: G,
        store: SettingsStore,
        targets: HostTargets<G>,
        params: &Value,
    ) -> Result<Self, PipelineError> {
        ensure_render_thread(&gpu)?;
        let lifecycle = FramebufferLifecycle::new(targets.width, targets.height, targets.supersampling)?;

        let mut injector = ShaderInjector::new();
        let mut manager = CompositingStageManager::new();
        let mut watchers = SettingsWatchers::new();
        for &name in EffectKind::<G>::list_effects() {
            let tuning = params.get(name).unwrap_or(&Value::Null);
            let effect = EffectKind::from_name(name, store.settings(), tuning)?;
            injector.add_registry(effect.properties()?);
            let renderers = effect.renderers();
            let watched = effect.watched_settings();

            let id = manager.add(effect);
            for &(stage, renderer) in renderers {
                manager.register_renderer(id, stage, renderer);
            }
            for &key in watched {
                watchers.watch(key, id);
            }
        }

        let mut pipeline = Self {
            gpu,
            store,
            injector,
            lifecycle,
            targets,
            manager,
            watchers,
            state: PipelineState::Uninitialized,
        };
        let ctx = context!(pipeline);
        if let Err(err) = pipeline.manager.sync_enabled(&ctx) {
            pipeline.manager.dispose_all(&ctx);
            return Err(err);
        }
        pipeline.state = pipeline.state.transition(PipelineState::Ready)?;
        log::info!(
            "pipeline ready with {} effects at {}x{}",
            pipeline.manager.len(),
            pipeline.targets.width,
            pipeline.targets.height
        );
        Ok(pipeline)
    }

    /// Rewrites a host shader with the current property values.
    pub fn on_shader_source_load(&self, source: &str, stage: ShaderStage) -> Result<String, InjectionError> {
        self.injector
            .on_shader_loaded(source, stage, self.store.settings())
            .map(|injected| injected.source)
    }

    /// Recompiles every effect program with the current settings.
    pub fn on_shader_reload(&mut self) -> Result<(), PipelineError> {
        self.state = self.state.transition(PipelineState::Reloading)?;
        let ctx = context!(self);
        let result = self.manager.reload_all(&ctx);
        self.state = self.state.transition(PipelineState::Ready)?;
        log::info!("shader reload finished");
        result
    }

    /// Applies pending settings, then runs every renderer of `stage`.
    /// A no-op unless the pipeline is ready.
    pub fn on_frame_stage(&mut self, host: &mut dyn Host<G>, stage: FrameStage) {
        if self.state != PipelineState::Ready {
            return;
        }
        let changes = self.store.drain_pending();
        if let Err(err) = self.apply_changes(host, &changes) {
            log::error!("applying settings failed: {err}");
        }
        let ctx = context!(self);
        self.manager.render_stage(&ctx, host, stage);
    }

    /// Re-sizes to the host's new targets and rebuilds every effect's sets.
    ///
    /// # Errors
    ///
    /// `InvalidDimensions` leaves the previous targets in place.
    pub fn on_framebuffers_rebuilt(&mut self, targets: HostTargets<G>) -> Result<(), PipelineError> {
        if self.state == PipelineState::Disposed {
            return Err(PipelineError::InvalidTransition {
                from: self.state.name(),
                to: PipelineState::Ready.name(),
            });
        }
        self.lifecycle
            .resize(targets.width, targets.height, targets.supersampling)?;
        self.targets = targets;
        let ctx = context!(self);
        self.manager.rebuild_all(&ctx)
    }

    pub fn on_final_composition_bind(&self, sink: &mut dyn UniformSink<G::Texture>) {
        self.manager.bind_final(self.store.settings(), sink);
    }

    pub fn on_pre_godrays(&self, host: &dyn Host<G>, sink: &mut dyn UniformSink<G::Texture>) {
        let inputs = host.frame_inputs();
        self.manager.pre_godrays(self.store.settings(), &inputs, sink);
    }

    pub fn on_pre_sun_render(&self, sink: &mut dyn UniformSink<G::Texture>) {
        self.manager.pre_sun_render(self.store.settings(), sink);
    }

    pub fn on_sun_rendered(&self, sink: &mut dyn UniformSink<G::Texture>) {
        self.manager.sun_rendered(self.store.settings(), sink);
    }

    /// Reports a setting change made on the host side.
    ///
    /// Host-owned keys (shadow-map and god-ray quality) are only routed to
    /// watchers; every other key is stored and persisted first.
    pub fn on_host_setting_changed(
        &mut self,
        host: &mut dyn Host<G>,
        key: SettingKey,
        value: SettingValue,
    ) -> Result<(), PipelineError> {
        let change = if key.is_host_owned() {
            SettingChange { key, value }
        } else {
            self.store.set(key, value)?
        };
        if self.state != PipelineState::Ready {
            return Ok(());
        }
        self.apply_changes(host, &[change])
    }

    fn apply_changes(&mut self, host: &mut dyn Host<G>, changes: &[SettingChange]) -> Result<(), PipelineError> {
        let ctx = context!(self);
        let manager = &mut self.manager;
        let routed = route_changes(&self.watchers, changes, |id, change| {
            manager.notify(id, &ctx, &mut *host, change)
        });
        let synced = manager.sync_enabled(&ctx);
        routed.and(synced)
    }

    /// Releases every GPU object the effects hold. Later hooks are no-ops.
    pub fn dispose(&mut self) {
        if self.state == PipelineState::Disposed {
            return;
        }
        let ctx = context!(self);
        self.manager.dispose_all(&ctx);
        self.state = PipelineState::Disposed;
        log::info!("pipeline disposed");
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn settings(&self) -> &Settings {
        self.store.settings()
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    /// A handle other threads can schedule changes through.
    pub fn settings_handle(&self) -> SettingsHandle {
        self.store.handle()
    }

    pub fn injector(&self) -> &ShaderInjector {
        &self.injector
    }

    pub fn lifecycle(&self) -> &FramebufferLifecycle {
        &self.lifecycle
    }

    pub fn targets(&self) -> &HostTargets<G> {
        &self.targets
    }

    pub fn effect(&self, name: &str) -> Option<&EffectKind<G>> {
        self.manager.find(name).and_then(|id| self.manager.effect(id))
    }

    pub fn status(&self, name: &str) -> Option<EffectStatus> {
        self.manager.find(name).and_then(|id| self.manager.status(id))
    }

    /// Every effect name with its status, in registration order.
    pub fn statuses(&self) -> Vec<(&'static str, EffectStatus)> {
        self.manager
            .ids()
            .filter_map(|id| Some((self.manager.effect(id)?.name(), self.manager.status(id)?)))
            .collect()
    }

    /// Width of the near shadow cascade, as tracked by the shadow tweaks.
    pub fn near_shadow_base_width(&self) -> i32 {
        match self.effect("shadow-tweaks") {
            Some(EffectKind::ShadowTweaks(tweaks)) => tweaks.near_shadow_base_width(),
            _ => self.store.settings().near_shadow_base_width,
        }
    }

    pub fn near_shadow_z_extension(&self) -> f32 {
        NEAR_SHADOW_Z_EXTENSION
    }
}

/// Hands every change to each of its watchers. A failing watcher does not
/// stop the rest; the first error is returned once all have run.
fn route_changes<W: Copy + PartialEq>(
    watchers: &SettingsWatchers<W>,
    changes: &[SettingChange],
    mut notify: impl FnMut(W, SettingChange) -> Result<(), PipelineError>,
) -> Result<(), PipelineError> {
    let mut first_error = None;
    for &change in changes {
        for &watcher in watchers.watchers(change.key) {
            if let Err(err) = notify(watcher, change) {
                log::error!("{}: routing change failed: {err}", change.key);
                first_error.get_or_insert(err);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}
