//! Shared fixture for effect tests: a recording GPU, a synthetic host and
//! everything an [`EffectContext`] borrows.

use voxshade_core::render::FramebufferLifecycle;
use voxshade_core::settings::Settings;
use voxshade_core::{HostTargets, RecordingGpu, RecordingHost, ShaderInjector};

use crate::effect::EffectContext;

pub(crate) struct Fixture {
    pub gpu: RecordingGpu,
    pub host: RecordingHost,
    pub targets: HostTargets<RecordingGpu>,
    pub lifecycle: FramebufferLifecycle,
    pub settings: Settings,
    pub injector: ShaderInjector,
}

impl Fixture {
    pub fn new(width: u32, height: u32) -> Self {
        let gpu = RecordingGpu::new();
        let host = RecordingHost::new(&gpu, width, height, 1.0).expect("host targets");
        let targets = host.targets();
        Self {
            gpu,
            host,
            targets,
            lifecycle: FramebufferLifecycle::new(width, height, 1.0).expect("valid size"),
            settings: Settings::default(),
            injector: crate::build_injector().expect("effect properties register"),
        }
    }

    /// Borrows a context and the host at the same time.
    pub fn split(&mut self) -> (EffectContext<'_, RecordingGpu>, &mut RecordingHost) {
        (
            EffectContext {
                gpu: &self.gpu,
                settings: &self.settings,
                injector: &self.injector,
                lifecycle: &self.lifecycle,
                targets: &self.targets,
            },
            &mut self.host,
        )
    }
}
