//! Headless frame simulation against the recording backend.
//!
//! Drives a [`Pipeline`] through the same hook sequence a host would use
//! each frame and reports what the GPU saw.

use serde_json::{json, Value};
use voxshade_core::gpu::recording::UniformCapture;
use voxshade_core::host::FrameStage;
use voxshade_core::{PipelineError, RecordingGpu, RecordingHost, SettingsStore};
use voxshade_effects::{EffectKind, Pipeline};

/// What to simulate.
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub width: u32,
    pub height: u32,
    pub supersampling: f32,
    pub frames: usize,
    /// Host resize applied before the middle frame, if any.
    pub resize_to: Option<(u32, u32)>,
    pub params: Value,
}

/// Totals gathered over a simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub frames: usize,
    pub gpu_calls: usize,
    pub draw_calls: usize,
    pub statuses: Vec<(&'static str, String)>,
    pub ssr_size: Option<(u32, u32)>,
    pub wind_intensity: Option<f32>,
    pub final_bindings: Vec<String>,
    /// Handles still alive after the pipeline and host were disposed.
    pub leaked_handles: usize,
}

impl SimulationReport {
    pub fn to_json(&self) -> Value {
        let statuses: serde_json::Map<String, Value> = self
            .statuses
            .iter()
            .map(|(name, status)| (name.to_string(), Value::from(status.as_str())))
            .collect();
        json!({
            "frames": self.frames,
            "gpu_calls": self.gpu_calls,
            "draw_calls": self.draw_calls,
            "effects": statuses,
            "ssr_size": self.ssr_size.map(|(w, h)| json!([w, h])),
            "wind_intensity": self.wind_intensity,
            "final_bindings": self.final_bindings,
            "leaked_handles": self.leaked_handles,
        })
    }
}

/// Runs `simulation` with the settings in `store`.
pub fn run(simulation: &Simulation, store: SettingsStore) -> Result<SimulationReport, PipelineError> {
    let gpu = RecordingGpu::new();
    let mut host = RecordingHost::new(&gpu, simulation.width, simulation.height, simulation.supersampling)?;
    let mut pipeline = Pipeline::with_params(gpu, store, host.targets(), &simulation.params)?;

    let mut final_bindings = Vec::new();
    for frame in 0..simulation.frames {
        if let Some((width, height)) = simulation.resize_to.filter(|_| frame == simulation.frames / 2) {
            let targets = host.resize(pipeline.gpu(), width, height, simulation.supersampling)?;
            pipeline.on_framebuffers_rebuilt(targets)?;
            log::info!("frame {frame}: resized to {width}x{height}");
        }

        let mut sink = UniformCapture::default();
        pipeline.on_frame_stage(&mut host, FrameStage::Opaque);
        pipeline.on_pre_godrays(&host, &mut sink);
        pipeline.on_pre_sun_render(&mut sink);
        pipeline.on_sun_rendered(&mut sink);
        pipeline.on_frame_stage(&mut host, FrameStage::AfterPostProcessing);
        pipeline.on_final_composition_bind(&mut sink);
        final_bindings = sink.textures.into_iter().map(|(name, _)| name).collect();
    }

    let gpu_calls = pipeline.gpu().call_count();
    let draw_calls = pipeline.gpu().draw_calls();
    let statuses = pipeline
        .statuses()
        .into_iter()
        .map(|(name, status)| (name, status.to_string()))
        .collect();
    let (ssr_size, wind_intensity) = match pipeline.effect("ssr") {
        Some(EffectKind::Ssr(ssr)) => (
            ssr.geometry_targets().map(|set| set.size()),
            Some(ssr.wind_intensity()),
        ),
        _ => (None, None),
    };

    pipeline.dispose();
    host.dispose(pipeline.gpu());
    let leaked_handles = pipeline.gpu().live_handles();
    if leaked_handles > 0 {
        log::warn!("{leaked_handles} GPU handles leaked");
    }

    Ok(SimulationReport {
        frames: simulation.frames,
        gpu_calls,
        draw_calls,
        statuses,
        ssr_size,
        wind_intensity,
        final_bindings,
        leaked_handles,
    })
}
