//! A [`Gpu`] that records calls instead of issuing them.
//!
//! Used for headless simulation and tests. It tracks live handles, the
//! attachments of each framebuffer, and which uniforms each program declares
//! so completeness checks and uniform lookups behave like a driver would.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::thread::{self, ThreadId};

use super::{
    BlendFactor, Capability, FramebufferStatus, FramebufferTarget, Gpu, UniformValue,
};
use crate::error::PipelineError;
use crate::host::{ChunkRenderPass, FrameInputs, Host, HostTargets, ShadowMaps, UniformSink};
use crate::inject::scan_uniforms;
use crate::render::shader::{format_shader_error, ShaderError, ShaderStage};
use crate::render::target::{AttachmentSpec, DepthSpec, FramebufferLifecycle, RenderTargetSet, TargetSpec};
use crate::render::texture::TextureConfig;

pub const FRAMEBUFFER_INCOMPLETE_ATTACHMENT: u32 = 0x8CD6;
pub const FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT: u32 = 0x8CD7;
pub const FRAMEBUFFER_INCOMPLETE_DIMENSIONS: u32 = 0x8CD9;
pub const FRAMEBUFFER_INCOMPLETE_DRAW_BUFFER: u32 = 0x8CDB;
pub const FRAMEBUFFER_UNSUPPORTED: u32 = 0x8CDD;
pub const INVALID_OPERATION: u32 = 0x0502;

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateTexture { texture: u32, config: TextureConfig },
    DeleteTexture(u32),
    CreateFramebuffer(u32),
    DeleteFramebuffer(u32),
    BindFramebuffer { target: FramebufferTarget, framebuffer: Option<u32> },
    AttachColor { index: u32, texture: u32 },
    AttachDepth(u32),
    DrawBuffers(u32),
    Viewport { width: u32, height: u32 },
    ClearColor { index: u32, color: [f32; 4] },
    ClearDepth,
    BlitDepth { src: (u32, u32), dst: (u32, u32) },
    Capability { capability: Capability, enabled: bool },
    DepthMask(bool),
    BlendFunc { index: u32, src: BlendFactor, dst: BlendFactor },
    CompileProgram(u32),
    DeleteProgram(u32),
    UseProgram(Option<u32>),
    Uniform { program: u32, name: String, value: UniformValue },
    BindTexture { unit: u32, texture: u32 },
    DrawFullscreen,
    DrawBatches { pass: ChunkRenderPass, atlas: usize, count: usize },
}

impl GpuCall {
    pub fn is_draw(&self) -> bool {
        matches!(self, GpuCall::DrawFullscreen | GpuCall::DrawBatches { .. })
    }
}

/// Location handle: the program and the uniform's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordedUniform {
    pub program: u32,
    pub name: String,
}

#[derive(Debug, Default)]
struct FramebufferState {
    colors: BTreeMap<u32, u32>,
    depth: Option<u32>,
    draw_buffers: u32,
}

#[derive(Debug, Default)]
struct State {
    next_handle: u32,
    textures: HashMap<u32, TextureConfig>,
    framebuffers: HashMap<u32, FramebufferState>,
    programs: HashMap<u32, BTreeSet<String>>,
    draw_binding: Option<u32>,
    current_program: Option<u32>,
    calls: Vec<GpuCall>,
    errors: VecDeque<u32>,
    force_incomplete: bool,
    compile_failures: Vec<String>,
}

impl State {
    fn allocate_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn status_of(&self, framebuffer: u32) -> FramebufferStatus {
        use FramebufferStatus::Incomplete;

        let Some(fb) = self.framebuffers.get(&framebuffer) else {
            return Incomplete(FRAMEBUFFER_UNSUPPORTED);
        };
        if self.force_incomplete {
            return Incomplete(FRAMEBUFFER_UNSUPPORTED);
        }
        if fb.colors.is_empty() && fb.depth.is_none() {
            return Incomplete(FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT);
        }

        let mut sizes = HashSet::new();
        for (is_depth, texture) in fb
            .colors
            .values()
            .map(|t| (false, *t))
            .chain(fb.depth.map(|t| (true, t)))
        {
            match self.textures.get(&texture) {
                Some(config) if config.format.is_depth() == is_depth => {
                    sizes.insert((config.width, config.height));
                }
                _ => return Incomplete(FRAMEBUFFER_INCOMPLETE_ATTACHMENT),
            }
        }
        if sizes.len() > 1 {
            return Incomplete(FRAMEBUFFER_INCOMPLETE_DIMENSIONS);
        }
        if (0..fb.draw_buffers).any(|i| !fb.colors.contains_key(&i)) {
            return Incomplete(FRAMEBUFFER_INCOMPLETE_DRAW_BUFFER);
        }
        FramebufferStatus::Complete
    }
}

/// Records every call; see the module docs.
#[derive(Debug)]
pub struct RecordingGpu {
    thread: ThreadId,
    state: RefCell<State>,
}

impl Default for RecordingGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingGpu {
    /// A context owned by the calling thread.
    pub fn new() -> Self {
        Self::owned_by(thread::current().id())
    }

    /// A context that claims to be owned by `thread`.
    pub fn owned_by(thread: ThreadId) -> Self {
        Self {
            thread,
            state: RefCell::new(State::default()),
        }
    }

    /// Makes every completeness check fail with `FRAMEBUFFER_UNSUPPORTED`.
    pub fn force_incomplete_framebuffers(&self, enabled: bool) {
        self.state.borrow_mut().force_incomplete = enabled;
    }

    /// Fails compilation of any stage whose source contains `pattern`.
    ///
    /// Sources containing `#error` or a leftover `${` always fail.
    pub fn fail_compiles_containing(&self, pattern: impl Into<String>) {
        self.state.borrow_mut().compile_failures.push(pattern.into());
    }

    /// Queues an error code for the next [`Gpu::take_error`].
    pub fn inject_error(&self, code: u32) {
        self.state.borrow_mut().errors.push_back(code);
    }

    /// Records a host chunk-batch draw.
    pub fn draw_batches(&self, pass: ChunkRenderPass, atlas: usize, count: usize) {
        self.record(GpuCall::DrawBatches { pass, atlas, count });
    }

    pub fn calls(&self) -> Vec<GpuCall> {
        self.state.borrow().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.borrow().calls.len()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn draw_calls(&self) -> usize {
        self.state.borrow().calls.iter().filter(|c| c.is_draw()).count()
    }

    /// Every value written to uniforms called `name`, oldest first.
    pub fn uniform_writes(&self, name: &str) -> Vec<UniformValue> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                GpuCall::Uniform { name: n, value, .. } if n == name => Some(*value),
                _ => None,
            })
            .collect()
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state.borrow().framebuffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    pub fn live_handles(&self) -> usize {
        self.live_textures() + self.live_framebuffers() + self.live_programs()
    }

    pub fn is_live_texture(&self, texture: u32) -> bool {
        self.state.borrow().textures.contains_key(&texture)
    }

    pub fn is_live_framebuffer(&self, framebuffer: u32) -> bool {
        self.state.borrow().framebuffers.contains_key(&framebuffer)
    }

    pub fn is_live_program(&self, program: u32) -> bool {
        self.state.borrow().programs.contains_key(&program)
    }

    pub fn texture_config(&self, texture: u32) -> Option<TextureConfig> {
        self.state.borrow().textures.get(&texture).copied()
    }

    /// Color attachments of `framebuffer` in attachment order.
    pub fn color_attachments(&self, framebuffer: u32) -> Vec<u32> {
        self.state
            .borrow()
            .framebuffers
            .get(&framebuffer)
            .map(|fb| fb.colors.values().copied().collect())
            .unwrap_or_default()
    }

    fn record(&self, call: GpuCall) {
        self.state.borrow_mut().calls.push(call);
    }

    fn with_draw_framebuffer(&self, f: impl FnOnce(&mut FramebufferState)) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        match state.draw_binding.and_then(|id| state.framebuffers.get_mut(&id)) {
            Some(fb) => f(fb),
            None => state.errors.push_back(INVALID_OPERATION),
        }
    }

    fn check_compiles(&self, stage: ShaderStage, source: &str) -> Result<(), ShaderError> {
        let state = self.state.borrow();
        let failing = ["#error", "${"]
            .into_iter()
            .chain(state.compile_failures.iter().map(String::as_str))
            .find_map(|pattern| {
                source
                    .lines()
                    .position(|line| line.contains(pattern))
                    .map(|line| (pattern, line + 1))
            });
        match failing {
            None => Ok(()),
            Some((pattern, line)) => Err(ShaderError::CompileError {
                stage,
                log: format_shader_error(source, &format!("ERROR: 0:{line}: '{pattern}' rejected")),
            }),
        }
    }
}

impl Gpu for RecordingGpu {
    type Texture = u32;
    type Framebuffer = u32;
    type Program = u32;
    type UniformLocation = RecordedUniform;

    fn render_thread(&self) -> ThreadId {
        self.thread
    }

    fn create_texture(&self, config: &TextureConfig) -> Result<u32, PipelineError> {
        if config.width == 0 || config.height == 0 {
            return Err(PipelineError::ResourceCreation {
                kind: "texture",
                message: format!("zero-sized texture {}x{}", config.width, config.height),
            });
        }
        let mut state = self.state.borrow_mut();
        let texture = state.allocate_handle();
        state.textures.insert(texture, *config);
        state.calls.push(GpuCall::CreateTexture {
            texture,
            config: *config,
        });
        Ok(texture)
    }

    fn delete_texture(&self, texture: u32) {
        let mut state = self.state.borrow_mut();
        if state.textures.remove(&texture).is_none() {
            state.errors.push_back(INVALID_OPERATION);
        }
        state.calls.push(GpuCall::DeleteTexture(texture));
    }

    fn create_framebuffer(&self) -> Result<u32, PipelineError> {
        let mut state = self.state.borrow_mut();
        let framebuffer = state.allocate_handle();
        state.framebuffers.insert(framebuffer, FramebufferState::default());
        state.calls.push(GpuCall::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn delete_framebuffer(&self, framebuffer: u32) {
        let mut state = self.state.borrow_mut();
        if state.framebuffers.remove(&framebuffer).is_none() {
            state.errors.push_back(INVALID_OPERATION);
        }
        if state.draw_binding == Some(framebuffer) {
            state.draw_binding = None;
        }
        state.calls.push(GpuCall::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&self, target: FramebufferTarget, framebuffer: Option<u32>) {
        let mut state = self.state.borrow_mut();
        if matches!(target, FramebufferTarget::Both | FramebufferTarget::Draw) {
            state.draw_binding = framebuffer;
        }
        state.calls.push(GpuCall::BindFramebuffer {
            target,
            framebuffer,
        });
    }

    fn attach_color(&self, index: u32, texture: u32) {
        self.with_draw_framebuffer(|fb| {
            fb.colors.insert(index, texture);
        });
        self.record(GpuCall::AttachColor { index, texture });
    }

    fn attach_depth(&self, texture: u32) {
        self.with_draw_framebuffer(|fb| fb.depth = Some(texture));
        self.record(GpuCall::AttachDepth(texture));
    }

    fn set_draw_buffers(&self, count: u32) {
        self.with_draw_framebuffer(|fb| fb.draw_buffers = count);
        self.record(GpuCall::DrawBuffers(count));
    }

    fn framebuffer_status(&self) -> FramebufferStatus {
        let state = self.state.borrow();
        match state.draw_binding {
            Some(framebuffer) => state.status_of(framebuffer),
            None => FramebufferStatus::Complete,
        }
    }

    fn viewport(&self, width: u32, height: u32) {
        self.record(GpuCall::Viewport { width, height });
    }

    fn clear_color_attachment(&self, index: u32, color: [f32; 4]) {
        self.record(GpuCall::ClearColor { index, color });
    }

    fn clear_depth(&self) {
        self.record(GpuCall::ClearDepth);
    }

    fn blit_depth(&self, src: (u32, u32), dst: (u32, u32)) {
        self.record(GpuCall::BlitDepth { src, dst });
    }

    fn set_capability(&self, capability: Capability, enabled: bool) {
        self.record(GpuCall::Capability {
            capability,
            enabled,
        });
    }

    fn set_depth_mask(&self, write: bool) {
        self.record(GpuCall::DepthMask(write));
    }

    fn set_blend_func_attachment(&self, index: u32, src: BlendFactor, dst: BlendFactor) {
        self.record(GpuCall::BlendFunc { index, src, dst });
    }

    fn compile_program(&self, vertex: &str, fragment: &str) -> Result<u32, ShaderError> {
        self.check_compiles(ShaderStage::Vertex, vertex)?;
        self.check_compiles(ShaderStage::Fragment, fragment)?;

        let uniforms = scan_uniforms(vertex)
            .into_iter()
            .chain(scan_uniforms(fragment))
            .map(|u| u.name)
            .collect();
        let mut state = self.state.borrow_mut();
        let program = state.allocate_handle();
        state.programs.insert(program, uniforms);
        state.calls.push(GpuCall::CompileProgram(program));
        Ok(program)
    }

    fn delete_program(&self, program: u32) {
        let mut state = self.state.borrow_mut();
        if state.programs.remove(&program).is_none() {
            state.errors.push_back(INVALID_OPERATION);
        }
        if state.current_program == Some(program) {
            state.current_program = None;
        }
        state.calls.push(GpuCall::DeleteProgram(program));
    }

    fn use_program(&self, program: Option<u32>) {
        let mut state = self.state.borrow_mut();
        state.current_program = program;
        state.calls.push(GpuCall::UseProgram(program));
    }

    fn uniform_location(&self, program: u32, name: &str) -> Option<RecordedUniform> {
        let state = self.state.borrow();
        state
            .programs
            .get(&program)
            .filter(|uniforms| uniforms.contains(name))
            .map(|_| RecordedUniform {
                program,
                name: name.to_string(),
            })
    }

    fn set_uniform(&self, location: &RecordedUniform, value: UniformValue) {
        let mut state = self.state.borrow_mut();
        if state.current_program != Some(location.program) {
            state.errors.push_back(INVALID_OPERATION);
        }
        state.calls.push(GpuCall::Uniform {
            program: location.program,
            name: location.name.clone(),
            value,
        });
    }

    fn bind_texture_unit(&self, unit: u32, texture: u32) {
        self.record(GpuCall::BindTexture { unit, texture });
    }

    fn draw_fullscreen_triangle(&self) {
        self.record(GpuCall::DrawFullscreen);
    }

    fn take_error(&self) -> Option<u32> {
        self.state.borrow_mut().errors.pop_front()
    }
}

/// Captures what the pipeline pushes into a host program.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UniformCapture {
    pub uniforms: Vec<(String, UniformValue)>,
    pub textures: Vec<(String, u32)>,
}

impl UniformCapture {
    /// Last value written to `name`.
    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.uniforms
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn texture(&self, name: &str) -> Option<u32> {
        self.textures
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }
}

impl UniformSink<u32> for UniformCapture {
    fn uniform(&mut self, name: &str, value: UniformValue) {
        self.uniforms.push((name.to_string(), value));
    }

    fn bind_texture(&mut self, name: &str, texture: u32) {
        self.textures.push((name.to_string(), texture));
    }
}

/// A synthetic host for the recording backend.
///
/// Owns a primary framebuffer at the supersampled size, two terrain atlases,
/// near/far shadow maps and any named texture asked for (unless listed in
/// `missing_textures`).
pub struct RecordingHost {
    pub inputs: FrameInputs,
    pub batches_per_pass: usize,
    pub shadow_map_quality: u32,
    pub god_ray_quality: u32,
    pub rebuild_requests: usize,
    pub missing_textures: HashSet<String>,
    lifecycle: FramebufferLifecycle,
    primary: RenderTargetSet<RecordingGpu>,
    atlases: Vec<u32>,
    shadow_maps: ShadowMaps<RecordingGpu>,
    textures: BTreeMap<String, u32>,
}

impl RecordingHost {
    pub const SHADOW_MAP_SIZE: u32 = 2048;
    pub const ATLAS_COUNT: usize = 2;

    pub fn new(gpu: &RecordingGpu, width: u32, height: u32, supersampling: f32) -> Result<Self, PipelineError> {
        let lifecycle = FramebufferLifecycle::new(width, height, supersampling)?;
        let primary = lifecycle.allocate(gpu, &Self::primary_spec())?;
        let atlases = (0..Self::ATLAS_COUNT)
            .map(|_| gpu.create_texture(&TextureConfig::rgba8(1024, 1024)))
            .collect::<Result<Vec<_>, _>>()?;
        let shadow_config = TextureConfig::depth(Self::SHADOW_MAP_SIZE, Self::SHADOW_MAP_SIZE);
        let shadow_maps = ShadowMaps {
            near: gpu.create_texture(&shadow_config)?,
            far: gpu.create_texture(&shadow_config)?,
            far_width: Self::SHADOW_MAP_SIZE,
            far_height: Self::SHADOW_MAP_SIZE,
        };
        Ok(Self {
            inputs: FrameInputs::default(),
            batches_per_pass: 4,
            shadow_map_quality: 0,
            god_ray_quality: 0,
            rebuild_requests: 0,
            missing_textures: HashSet::new(),
            lifecycle,
            primary,
            atlases,
            shadow_maps,
            textures: BTreeMap::new(),
        })
    }

    fn primary_spec() -> TargetSpec<u32> {
        TargetSpec {
            label: "primary".into(),
            colors: vec![AttachmentSpec::color("primary")],
            depth: DepthSpec::Owned,
        }
    }

    /// The targets as the host reports them after a framebuffer rebuild.
    pub fn targets(&self) -> HostTargets<RecordingGpu> {
        let (width, height) = self.lifecycle.viewport();
        HostTargets {
            primary_framebuffer: self.primary.framebuffer(),
            primary_color: self.primary.color(0).unwrap_or_default(),
            primary_depth: self.primary.depth_texture().unwrap_or_default(),
            width,
            height,
            supersampling: self.lifecycle.supersampling(),
            shadow_maps: (self.shadow_map_quality > 0).then_some(self.shadow_maps),
        }
    }

    /// Rebuilds the primary framebuffer at a new size.
    pub fn resize(
        &mut self,
        gpu: &RecordingGpu,
        width: u32,
        height: u32,
        supersampling: f32,
    ) -> Result<HostTargets<RecordingGpu>, PipelineError> {
        self.lifecycle.resize(width, height, supersampling)?;
        self.lifecycle.rebuild(gpu, &mut self.primary, &Self::primary_spec())?;
        Ok(self.targets())
    }

    /// Deletes everything the host created.
    pub fn dispose(self, gpu: &RecordingGpu) {
        self.lifecycle.release(gpu, self.primary);
        for texture in self
            .atlases
            .into_iter()
            .chain([self.shadow_maps.near, self.shadow_maps.far])
            .chain(self.textures.into_values())
        {
            gpu.delete_texture(texture);
        }
    }
}

impl Host<RecordingGpu> for RecordingHost {
    fn frame_inputs(&self) -> FrameInputs {
        self.inputs
    }

    fn terrain_atlases(&self) -> Vec<u32> {
        self.atlases.clone()
    }

    fn render_chunk_batches(&mut self, gpu: &RecordingGpu, pass: ChunkRenderPass, atlas: usize) -> usize {
        gpu.draw_batches(pass, atlas, self.batches_per_pass);
        self.batches_per_pass
    }

    fn texture(&mut self, gpu: &RecordingGpu, name: &str) -> Option<u32> {
        if self.missing_textures.contains(name) {
            return None;
        }
        if let Some(texture) = self.textures.get(name) {
            return Some(*texture);
        }
        let texture = gpu.create_texture(&TextureConfig::rgba8(256, 256)).ok()?;
        self.textures.insert(name.to_string(), texture);
        Some(texture)
    }

    fn shadow_map_quality(&self) -> u32 {
        self.shadow_map_quality
    }

    fn set_shadow_map_quality(&mut self, quality: u32) {
        self.shadow_map_quality = quality;
    }

    fn god_ray_quality(&self) -> u32 {
        self.god_ray_quality
    }

    fn set_god_ray_quality(&mut self, quality: u32) {
        self.god_ray_quality = quality;
    }

    fn request_framebuffer_rebuild(&mut self) {
        self.rebuild_requests += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framebuffer_without_attachments_is_incomplete() {
        let gpu = RecordingGpu::new();
        let fb = gpu.create_framebuffer().expect("framebuffer");
        gpu.bind_framebuffer(FramebufferTarget::Both, Some(fb));
        assert_eq!(
            gpu.framebuffer_status(),
            FramebufferStatus::Incomplete(FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT)
        );
    }

    #[test]
    fn draw_buffer_without_attachment_is_incomplete() {
        let gpu = RecordingGpu::new();
        let fb = gpu.create_framebuffer().expect("framebuffer");
        let tex = gpu.create_texture(&TextureConfig::rgba8(4, 4)).expect("texture");
        gpu.bind_framebuffer(FramebufferTarget::Both, Some(fb));
        gpu.attach_color(0, tex);
        gpu.set_draw_buffers(2);
        assert_eq!(
            gpu.framebuffer_status(),
            FramebufferStatus::Incomplete(FRAMEBUFFER_INCOMPLETE_DRAW_BUFFER)
        );
        gpu.set_draw_buffers(1);
        assert_eq!(gpu.framebuffer_status(), FramebufferStatus::Complete);
    }

    #[test]
    fn depth_texture_as_color_attachment_is_incomplete() {
        let gpu = RecordingGpu::new();
        let fb = gpu.create_framebuffer().expect("framebuffer");
        let depth = gpu.create_texture(&TextureConfig::depth(4, 4)).expect("texture");
        gpu.bind_framebuffer(FramebufferTarget::Both, Some(fb));
        gpu.attach_color(0, depth);
        gpu.set_draw_buffers(1);
        assert_eq!(
            gpu.framebuffer_status(),
            FramebufferStatus::Incomplete(FRAMEBUFFER_INCOMPLETE_ATTACHMENT)
        );
    }

    #[test]
    fn uniform_locations_exist_only_for_declared_uniforms() {
        let gpu = RecordingGpu::new();
        let program = gpu
            .compile_program("uniform mat4 projectionMatrix;", "uniform sampler2D terrainTex;")
            .expect("compile should succeed");
        assert!(gpu.uniform_location(program, "terrainTex").is_some());
        assert!(gpu.uniform_location(program, "projectionMatrix").is_some());
        assert!(gpu.uniform_location(program, "zFar").is_none());
    }

    #[test]
    fn uniform_write_without_program_in_use_raises_error() {
        let gpu = RecordingGpu::new();
        let program = gpu
            .compile_program("", "uniform float zNear;")
            .expect("compile should succeed");
        let location = gpu.uniform_location(program, "zNear").expect("declared");
        gpu.set_uniform(&location, UniformValue::Float(0.1));
        assert_eq!(gpu.take_error(), Some(INVALID_OPERATION));
        gpu.use_program(Some(program));
        gpu.set_uniform(&location, UniformValue::Float(0.1));
        assert_eq!(gpu.take_error(), None);
        assert_eq!(gpu.uniform_writes("zNear").len(), 2);
    }

    #[test]
    fn leftover_placeholder_fails_compilation_with_line() {
        let gpu = RecordingGpu::new();
        let err = gpu
            .compile_program("void main() {}", "void main() {\n float x = ${SSR_X};\n}")
            .err()
            .expect("compile should fail");
        match err {
            ShaderError::CompileError { stage, log } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(log.contains("0:2"), "expected line 2 in log: {log}");
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(gpu.live_programs(), 0);
    }

    #[test]
    fn configured_compile_failures_match_substrings() {
        let gpu = RecordingGpu::new();
        gpu.fail_compiles_containing("caustics");
        assert!(gpu.compile_program("", "// caustics").is_err());
        assert!(gpu.compile_program("", "// reflections").is_ok());
    }

    #[test]
    fn deleting_unknown_handles_raises_error() {
        let gpu = RecordingGpu::new();
        gpu.delete_texture(42);
        assert_eq!(gpu.take_error(), Some(INVALID_OPERATION));
    }

    #[test]
    fn host_primary_is_supersampled_and_disposal_frees_everything() {
        let gpu = RecordingGpu::new();
        let mut host = RecordingHost::new(&gpu, 800, 600, 1.5).expect("host");
        let targets = host.targets();
        assert_eq!(targets.scaled_size(), (1200, 900));
        assert_eq!(
            gpu.texture_config(targets.primary_depth).map(|c| (c.width, c.height)),
            Some((1200, 900))
        );
        let water = host.texture(&gpu, "water/1").expect("texture");
        assert_eq!(host.texture(&gpu, "water/1"), Some(water), "textures are cached");

        host.missing_textures.insert("caustics".into());
        assert_eq!(host.texture(&gpu, "caustics"), None);

        let resized = host.resize(&gpu, 640, 480, 1.0).expect("resize");
        assert!(!gpu.is_live_texture(targets.primary_color));
        assert_eq!(resized.scaled_size(), (640, 480));

        host.dispose(&gpu);
        assert_eq!(gpu.live_handles(), 0);
    }

    #[test]
    fn host_exposes_shadow_maps_only_when_shadows_are_on() {
        let gpu = RecordingGpu::new();
        let mut host = RecordingHost::new(&gpu, 64, 64, 1.0).expect("host");
        assert!(host.targets().shadow_maps.is_none());
        host.set_shadow_map_quality(1);
        assert!(host.targets().shadow_maps.is_some());
    }

    #[test]
    fn capture_returns_last_write() {
        let mut capture = UniformCapture::default();
        capture.uniform("extraOutGlow", UniformValue::Float(0.49));
        capture.uniform("extraOutGlow", UniformValue::Float(0.0));
        capture.bind_texture("ssrScene", 7);
        assert_eq!(capture.get("extraOutGlow"), Some(UniformValue::Float(0.0)));
        assert_eq!(capture.texture("ssrScene"), Some(7));
        assert_eq!(capture.get("missing"), None);
    }
}
