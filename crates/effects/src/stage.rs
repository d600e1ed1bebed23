//! Stage dispatch and per-effect health tracking.
//!
//! The manager owns every effect in registration order. Each slot carries
//! two flags: `active` (the effect is enabled and should hold GPU resources)
//! and `healthy` (its last reload and rebuild succeeded). Only slots that
//! are both, and whose effect still reports itself enabled, receive stage
//! callbacks, so a disabled or broken effect issues no GPU calls.

use std::fmt;

use voxshade_core::host::{FrameInputs, FrameStage, Host, UniformSink};
use voxshade_core::settings::{SettingChange, Settings};
use voxshade_core::{Gpu, PipelineError};

use crate::effect::{EffectContext, EffectModule};
use crate::EffectKind;

/// Index of an effect inside its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(usize);

impl EffectId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect#{}", self.0)
    }
}

/// Lifecycle of the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    Reloading,
    Disposed,
}

impl PipelineState {
    pub fn name(self) -> &'static str {
        match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::Ready => "ready",
            PipelineState::Reloading => "reloading",
            PipelineState::Disposed => "disposed",
        }
    }

    /// Validates a move to `to`.
    ///
    /// # Errors
    ///
    /// `PipelineError::InvalidTransition` for anything but
    /// `Uninitialized → Ready`, `Ready ⇄ Reloading` and `* → Disposed`
    /// (from a state other than `Disposed`).
    pub fn transition(self, to: PipelineState) -> Result<PipelineState, PipelineError> {
        use PipelineState::*;
        match (self, to) {
            (Uninitialized, Ready) | (Ready, Reloading) | (Reloading, Ready) => Ok(to),
            (Uninitialized | Ready | Reloading, Disposed) => Ok(to),
            _ => Err(PipelineError::InvalidTransition {
                from: self.name(),
                to: to.name(),
            }),
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an effect is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectStatus {
    /// Disabled by settings; holds no GPU resources.
    Inactive,
    /// Enabled, allocated and rendering.
    Active,
    /// Enabled, but its last reload or rebuild failed. Retried on the next
    /// shader reload or framebuffer rebuild.
    Broken,
}

impl EffectStatus {
    pub fn name(self) -> &'static str {
        match self {
            EffectStatus::Inactive => "inactive",
            EffectStatus::Active => "active",
            EffectStatus::Broken => "broken",
        }
    }
}

impl fmt::Display for EffectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct Slot<G: Gpu> {
    effect: EffectKind<G>,
    active: bool,
    healthy: bool,
}

impl<G: Gpu> Slot<G> {
    fn dispatchable(&self, settings: &Settings) -> bool {
        self.active && self.healthy && self.effect.is_enabled(settings)
    }

    /// Disposes a failed effect. Injection errors are programming errors
    /// and are returned; everything else only breaks this effect.
    fn contain(&mut self, ctx: &EffectContext<'_, G>, action: &str, err: PipelineError) -> Result<(), PipelineError> {
        self.effect.dispose(ctx);
        self.healthy = false;
        if !err.is_fatal_to_feature() {
            return Err(err);
        }
        log::error!("{}: {action} failed, effect disabled: {err}", self.effect.name());
        Ok(())
    }
}

fn stage_slot(stage: FrameStage) -> usize {
    match stage {
        FrameStage::Opaque => 0,
        FrameStage::AfterPostProcessing => 1,
    }
}

/// Dispatches host stage callbacks to the effects registered for them.
pub struct CompositingStageManager<G: Gpu> {
    slots: Vec<Slot<G>>,
    renderers: [Vec<(EffectId, &'static str)>; 2],
}

impl<G: Gpu> Default for CompositingStageManager<G> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            renderers: [Vec::new(), Vec::new()],
        }
    }
}

impl<G: Gpu> CompositingStageManager<G> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `effect`. It starts inactive.
    pub fn add(&mut self, effect: EffectKind<G>) -> EffectId {
        self.slots.push(Slot {
            effect,
            active: false,
            healthy: false,
        });
        EffectId(self.slots.len() - 1)
    }

    /// Registers a named renderer of `id` for `stage`. Renderers run in
    /// registration order.
    pub fn register_renderer(&mut self, id: EffectId, stage: FrameStage, name: &'static str) {
        let list = &mut self.renderers[stage_slot(stage)];
        if !list.contains(&(id, name)) {
            log::debug!("registered renderer '{name}' of {id} for {stage}");
            list.push((id, name));
        }
    }

    pub fn renderers(&self, stage: FrameStage) -> &[(EffectId, &'static str)] {
        &self.renderers[stage_slot(stage)]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = EffectId> {
        (0..self.slots.len()).map(EffectId)
    }

    pub fn effect(&self, id: EffectId) -> Option<&EffectKind<G>> {
        self.slots.get(id.0).map(|slot| &slot.effect)
    }

    pub fn find(&self, name: &str) -> Option<EffectId> {
        self.slots
            .iter()
            .position(|slot| slot.effect.name() == name)
            .map(EffectId)
    }

    pub fn status(&self, id: EffectId) -> Option<EffectStatus> {
        self.slots.get(id.0).map(|slot| match (slot.active, slot.healthy) {
            (false, _) => EffectStatus::Inactive,
            (true, true) => EffectStatus::Active,
            (true, false) => EffectStatus::Broken,
        })
    }

    /// Compiles and allocates `id`. A feature-fatal failure leaves it
    /// [`EffectStatus::Broken`] and returns `Ok`.
    pub fn activate(&mut self, id: EffectId, ctx: &EffectContext<'_, G>) -> Result<(), PipelineError> {
        let Some(slot) = self.slots.get_mut(id.0) else {
            return Ok(());
        };
        slot.active = true;
        let result = slot
            .effect
            .reload_shaders(ctx)
            .and_then(|()| slot.effect.rebuild_framebuffers(ctx));
        match result {
            Ok(()) => {
                slot.healthy = true;
                log::info!("{} enabled", slot.effect.name());
                Ok(())
            }
            Err(err) => slot.contain(ctx, "activation", err),
        }
    }

    /// Releases every GPU object of `id`.
    pub fn deactivate(&mut self, id: EffectId, ctx: &EffectContext<'_, G>) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.effect.dispose(ctx);
            slot.active = false;
            slot.healthy = false;
            log::info!("{} disabled", slot.effect.name());
        }
    }

    /// Activates effects that became enabled and deactivates those that
    /// became disabled.
    pub fn sync_enabled(&mut self, ctx: &EffectContext<'_, G>) -> Result<(), PipelineError> {
        for id in (0..self.slots.len()).map(EffectId) {
            let slot = &self.slots[id.0];
            match (slot.effect.is_enabled(ctx.settings), slot.active) {
                (true, false) => self.activate(id, ctx)?,
                (false, true) => self.deactivate(id, ctx),
                _ => {}
            }
        }
        Ok(())
    }

    /// Routes one setting change to `id`. Inactive effects still hear
    /// about it so host-owned settings stay consistent.
    pub fn notify(
        &mut self,
        id: EffectId,
        ctx: &EffectContext<'_, G>,
        host: &mut dyn Host<G>,
        change: SettingChange,
    ) -> Result<(), PipelineError> {
        let Some(slot) = self.slots.get_mut(id.0) else {
            return Ok(());
        };
        match slot.effect.on_setting_changed(ctx, host, change) {
            Ok(()) => Ok(()),
            Err(err) => slot.contain(ctx, "setting change", err),
        }
    }

    /// Runs every renderer registered for `stage`.
    pub fn render_stage(&mut self, ctx: &EffectContext<'_, G>, host: &mut dyn Host<G>, stage: FrameStage) {
        for &(id, name) in &self.renderers[stage_slot(stage)] {
            let Some(slot) = self.slots.get_mut(id.0) else {
                continue;
            };
            if !slot.dispatchable(ctx.settings) {
                continue;
            }
            log::trace!("{stage}: running {name}");
            slot.effect.render_stage(ctx, host, stage);
        }
    }

    fn dispatchable<'a>(&'a self, settings: &'a Settings) -> impl Iterator<Item = &'a EffectKind<G>> + 'a {
        self.slots
            .iter()
            .filter(move |slot| slot.dispatchable(settings))
            .map(|slot| &slot.effect)
    }

    pub fn bind_final(&self, settings: &Settings, sink: &mut dyn UniformSink<G::Texture>) {
        for effect in self.dispatchable(settings) {
            effect.bind_final_uniforms(sink);
        }
    }

    pub fn pre_godrays(&self, settings: &Settings, inputs: &FrameInputs, sink: &mut dyn UniformSink<G::Texture>) {
        for effect in self.dispatchable(settings) {
            effect.on_pre_godrays(inputs, sink);
        }
    }

    pub fn pre_sun_render(&self, settings: &Settings, sink: &mut dyn UniformSink<G::Texture>) {
        for effect in self.dispatchable(settings) {
            effect.on_pre_sun_render(settings, sink);
        }
    }

    pub fn sun_rendered(&self, settings: &Settings, sink: &mut dyn UniformSink<G::Texture>) {
        for effect in self.dispatchable(settings) {
            effect.on_sun_rendered(sink);
        }
    }

    /// Recompiles every active effect. Broken effects get a full
    /// activation attempt.
    pub fn reload_all(&mut self, ctx: &EffectContext<'_, G>) -> Result<(), PipelineError> {
        for id in (0..self.slots.len()).map(EffectId) {
            let slot = &mut self.slots[id.0];
            if !slot.active {
                continue;
            }
            if !slot.healthy {
                self.activate(id, ctx)?;
                continue;
            }
            if let Err(err) = slot.effect.reload_shaders(ctx) {
                slot.contain(ctx, "shader reload", err)?;
            }
        }
        Ok(())
    }

    /// Re-creates the targets of every active effect at the lifecycle's
    /// current size. Broken effects get a full activation attempt.
    pub fn rebuild_all(&mut self, ctx: &EffectContext<'_, G>) -> Result<(), PipelineError> {
        for id in (0..self.slots.len()).map(EffectId) {
            let slot = &mut self.slots[id.0];
            if !slot.active {
                continue;
            }
            if !slot.healthy {
                self.activate(id, ctx)?;
                continue;
            }
            if let Err(err) = slot.effect.rebuild_framebuffers(ctx) {
                slot.contain(ctx, "framebuffer rebuild", err)?;
            }
        }
        Ok(())
    }

    /// Disposes every effect that holds resources.
    pub fn dispose_all(&mut self, ctx: &EffectContext<'_, G>) {
        for slot in self.slots.iter_mut().filter(|slot| slot.active) {
            slot.effect.dispose(ctx);
            slot.active = false;
            slot.healthy = false;
        }
    }
}
