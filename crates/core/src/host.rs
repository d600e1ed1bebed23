//! The boundary between the pipeline and the host renderer.
//!
//! The host owns the scene, the chunk meshes, the primary framebuffer and its
//! own final-composition program. The pipeline reaches back into it only
//! through [`Host`] and [`UniformSink`].

use std::fmt;

use glam::{Mat4, Vec3, Vec4};

use crate::gpu::{Gpu, UniformValue};

/// Host frame stages the pipeline renders at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameStage {
    /// After the host's opaque pass; geometry-buffer producers run here.
    Opaque,
    /// After the host's post-processing; consumers run here, before the
    /// final composite.
    AfterPostProcessing,
}

impl FrameStage {
    /// All stages in the order the host emits them each frame.
    pub const ORDER: [FrameStage; 2] = [FrameStage::Opaque, FrameStage::AfterPostProcessing];

    pub fn name(self) -> &'static str {
        match self {
            FrameStage::Opaque => "opaque",
            FrameStage::AfterPostProcessing => "after-post-processing",
        }
    }
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The host's chunk render passes, in the order it draws them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChunkRenderPass {
    Opaque,
    OpaqueNoCull,
    BlendNoCull,
    Transparent,
    Liquid,
    TopSoil,
    Meta,
}

impl ChunkRenderPass {
    pub const COUNT: usize = 7;

    pub const ALL: [ChunkRenderPass; Self::COUNT] = [
        ChunkRenderPass::Opaque,
        ChunkRenderPass::OpaqueNoCull,
        ChunkRenderPass::BlendNoCull,
        ChunkRenderPass::Transparent,
        ChunkRenderPass::Liquid,
        ChunkRenderPass::TopSoil,
        ChunkRenderPass::Meta,
    ];

    /// Position in [`ChunkRenderPass::ALL`]; also the value of the
    /// `renderPass` uniform.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether back faces are culled while drawing this pass.
    pub fn culls_faces(self) -> bool {
        !matches!(self, ChunkRenderPass::OpaqueNoCull | ChunkRenderPass::BlendNoCull)
    }

    pub fn name(self) -> &'static str {
        match self {
            ChunkRenderPass::Opaque => "opaque",
            ChunkRenderPass::OpaqueNoCull => "opaque-no-cull",
            ChunkRenderPass::BlendNoCull => "blend-no-cull",
            ChunkRenderPass::Transparent => "transparent",
            ChunkRenderPass::Liquid => "liquid",
            ChunkRenderPass::TopSoil => "top-soil",
            ChunkRenderPass::Meta => "meta",
        }
    }
}

impl fmt::Display for ChunkRenderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shadow-map state the host exposes while shadow mapping is active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowInputs {
    pub range_near: f32,
    pub range_far: f32,
    pub to_shadow_space_near: Mat4,
    pub to_shadow_space_far: Mat4,
}

/// Everything the effects read from the host once per stage callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    pub projection: Mat4,
    pub modelview: Mat4,
    /// World-to-view with the camera at the origin.
    pub camera_origin_view: Mat4,
    pub z_near: f32,
    pub z_far: f32,
    /// Normalized sun direction.
    pub sun_position: Vec3,
    /// Sun position in world space relative to the camera.
    pub sun_position_3d: Vec3,
    pub day_light_strength: f32,
    pub moon_light_strength: f32,
    pub sun_light_strength: f32,
    pub fog_color: Vec4,
    pub fog_density: f32,
    pub fog_min: f32,
    pub flat_fog_density: f32,
    pub cloud_density: f32,
    pub ambient_color: Vec3,
    pub rain_intensity: f32,
    /// Target wind speed, above 1 in storms; effects smooth it.
    pub wind_speed: f32,
    pub eyes_in_water_depth: f32,
    pub player_position: Vec3,
    pub water_flow_counter: f32,
    /// `None` when the host's ambient state has no drop-shadow value.
    pub drop_shadow_intensity: Option<f32>,
    pub shadow: Option<ShadowInputs>,
}

impl Default for FrameInputs {
    fn default() -> Self {
        Self {
            projection: Mat4::perspective_rh_gl(70f32.to_radians(), 4.0 / 3.0, 0.1, 1500.0),
            modelview: Mat4::IDENTITY,
            camera_origin_view: Mat4::IDENTITY,
            z_near: 0.1,
            z_far: 1500.0,
            sun_position: Vec3::Y,
            sun_position_3d: Vec3::new(0.0, 1000.0, 0.0),
            day_light_strength: 1.0,
            moon_light_strength: 0.0,
            sun_light_strength: 1.0,
            fog_color: Vec4::new(0.7, 0.8, 0.9, 1.0),
            fog_density: 0.00125,
            fog_min: 0.0,
            flat_fog_density: 0.0,
            cloud_density: 0.0,
            ambient_color: Vec3::ONE,
            rain_intensity: 0.0,
            wind_speed: 0.0,
            eyes_in_water_depth: 0.0,
            player_position: Vec3::ZERO,
            water_flow_counter: 0.0,
            drop_shadow_intensity: Some(0.5),
            shadow: None,
        }
    }
}

/// Primary near/far shadow maps owned by the host.
pub struct ShadowMaps<G: Gpu> {
    pub near: G::Texture,
    pub far: G::Texture,
    pub far_width: u32,
    pub far_height: u32,
}

impl<G: Gpu> Clone for ShadowMaps<G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G: Gpu> Copy for ShadowMaps<G> {}

/// The host's primary targets as of its last framebuffer rebuild.
///
/// `width`/`height` are the window size; the primary textures themselves are
/// allocated at the supersampled size.
pub struct HostTargets<G: Gpu> {
    pub primary_framebuffer: G::Framebuffer,
    pub primary_color: G::Texture,
    pub primary_depth: G::Texture,
    pub width: u32,
    pub height: u32,
    pub supersampling: f32,
    pub shadow_maps: Option<ShadowMaps<G>>,
}

impl<G: Gpu> HostTargets<G> {
    /// Size of the primary textures.
    pub fn scaled_size(&self) -> (u32, u32) {
        crate::render::target::scaled_size(self.width, self.height, self.supersampling)
    }
}

impl<G: Gpu> Clone for HostTargets<G> {
    fn clone(&self) -> Self {
        Self {
            primary_framebuffer: self.primary_framebuffer,
            primary_color: self.primary_color,
            primary_depth: self.primary_depth,
            width: self.width,
            height: self.height,
            supersampling: self.supersampling,
            shadow_maps: self.shadow_maps,
        }
    }
}

impl<G: Gpu> fmt::Debug for HostTargets<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostTargets")
            .field("primary_framebuffer", &self.primary_framebuffer)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("supersampling", &self.supersampling)
            .field("shadow_maps", &self.shadow_maps.is_some())
            .finish()
    }
}

/// A host program the pipeline may push uniforms and samplers into.
///
/// The host picks texture units; the pipeline only names samplers.
pub trait UniformSink<T> {
    fn uniform(&mut self, name: &str, value: UniformValue);
    fn bind_texture(&mut self, name: &str, texture: T);
}

/// What the pipeline needs from the host renderer.
pub trait Host<G: Gpu> {
    fn frame_inputs(&self) -> FrameInputs;

    /// Terrain atlas textures; geometry passes run once per atlas.
    fn terrain_atlases(&self) -> Vec<G::Texture>;

    /// Draws the host's chunk batches for one pass and atlas with whatever
    /// program is in use. Returns the number of batches drawn.
    fn render_chunk_batches(&mut self, gpu: &G, pass: ChunkRenderPass, atlas: usize) -> usize;

    /// Looks up (loading on first use) a named host texture.
    fn texture(&mut self, gpu: &G, name: &str) -> Option<G::Texture>;

    fn shadow_map_quality(&self) -> u32;
    fn set_shadow_map_quality(&mut self, quality: u32);
    fn god_ray_quality(&self) -> u32;
    fn set_god_ray_quality(&mut self, quality: u32);

    /// Asks the host to rebuild its framebuffers, which in turn arrives back
    /// as `on_framebuffers_rebuilt`.
    fn request_framebuffer_rebuild(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_pass_indices_follow_declaration_order() {
        for (i, pass) in ChunkRenderPass::ALL.iter().enumerate() {
            assert_eq!(pass.index(), i, "{pass} has the wrong index");
        }
    }

    #[test]
    fn only_no_cull_passes_disable_culling() {
        let no_cull: Vec<_> = ChunkRenderPass::ALL
            .iter()
            .filter(|p| !p.culls_faces())
            .collect();
        assert_eq!(
            no_cull,
            vec![&ChunkRenderPass::OpaqueNoCull, &ChunkRenderPass::BlendNoCull]
        );
    }

    #[test]
    fn frame_stages_are_ordered_producer_first() {
        assert!(FrameStage::Opaque < FrameStage::AfterPostProcessing);
        assert_eq!(FrameStage::ORDER[0], FrameStage::Opaque);
    }

    #[test]
    fn default_inputs_have_sane_clip_planes() {
        let inputs = FrameInputs::default();
        assert!(inputs.z_near > 0.0 && inputs.z_far > inputs.z_near);
        assert!(inputs.shadow.is_none());
    }
}
