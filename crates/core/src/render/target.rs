//! Multi-target framebuffers and their lifecycle.
//!
//! A [`RenderTargetSet`] pairs one framebuffer with N color attachments and
//! an optional depth attachment, all at the supersampled viewport size.
//! [`FramebufferLifecycle`] knows the current size and creates, releases and
//! atomically rebuilds sets.

use std::mem;

use crate::error::PipelineError;
use crate::gpu::{ensure_render_thread, FramebufferStatus, FramebufferTarget, Gpu};

use super::texture::{TextureConfig, TextureFormat};

/// Border color meaning "no valid sample here".
pub const NO_SAMPLE_BORDER: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Supersampled size: `max(1, trunc(viewport * supersampling))` per axis.
pub fn scaled_size(width: u32, height: u32, supersampling: f32) -> (u32, u32) {
    let scale = |v: u32| ((v as f32 * supersampling) as u32).max(1);
    (scale(width), scale(height))
}

/// One color attachment of a [`TargetSpec`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachmentSpec {
    pub name: &'static str,
    pub format: TextureFormat,
    pub border: Option<[f32; 4]>,
    /// Color the attachment is cleared to at the start of each pass.
    pub clear: [f32; 4],
}

impl AttachmentSpec {
    /// Half-float attachment cleared to transparent black.
    pub fn hdr(name: &'static str) -> Self {
        Self {
            name,
            format: TextureFormat::Rgba16F,
            border: None,
            clear: [0.0; 4],
        }
    }

    /// 8-bit attachment cleared to transparent black.
    pub fn color(name: &'static str) -> Self {
        Self {
            format: TextureFormat::Rgba8,
            ..Self::hdr(name)
        }
    }

    pub fn with_border(mut self, color: [f32; 4]) -> Self {
        self.border = Some(color);
        self
    }

    pub fn with_clear(mut self, clear: [f32; 4]) -> Self {
        self.clear = clear;
        self
    }

    fn texture_config(&self, width: u32, height: u32) -> TextureConfig {
        let config = match self.format {
            TextureFormat::Rgba16F => TextureConfig::rgba16f(width, height),
            TextureFormat::Rgba8 => TextureConfig::rgba8(width, height),
            TextureFormat::Depth32F => TextureConfig::depth(width, height),
        };
        match self.border {
            Some(color) => config.with_border(color),
            None => config,
        }
    }
}

/// Depth attachment of a [`TargetSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthSpec<T> {
    None,
    /// A fresh depth texture owned by the set.
    Owned,
    /// Read-only alias of someone else's depth texture; never deleted by the set.
    Shared(T),
}

/// What to allocate for one render-target set.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSpec<T> {
    pub label: String,
    pub colors: Vec<AttachmentSpec>,
    pub depth: DepthSpec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DepthAttachment<T> {
    Owned(T),
    Shared(T),
}

/// A framebuffer with its color and depth attachments.
///
/// Owned exclusively by the effect that allocated it. Dropping a set without
/// [`FramebufferLifecycle::release`] leaks its GPU objects.
pub struct RenderTargetSet<G: Gpu> {
    label: String,
    framebuffer: G::Framebuffer,
    colors: Vec<G::Texture>,
    attachments: Vec<AttachmentSpec>,
    depth: Option<DepthAttachment<G::Texture>>,
    width: u32,
    height: u32,
    generation: u64,
}

impl<G: Gpu> RenderTargetSet<G> {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn framebuffer(&self) -> G::Framebuffer {
        self.framebuffer
    }

    pub fn color(&self, index: usize) -> Option<G::Texture> {
        self.colors.get(index).copied()
    }

    /// Color attachment by the name given in its [`AttachmentSpec`].
    pub fn color_by_name(&self, name: &str) -> Option<G::Texture> {
        self.attachments
            .iter()
            .position(|a| a.name == name)
            .and_then(|i| self.color(i))
    }

    pub fn colors(&self) -> &[G::Texture] {
        &self.colors
    }

    pub fn depth_texture(&self) -> Option<G::Texture> {
        self.depth.map(|d| match d {
            DepthAttachment::Owned(t) | DepthAttachment::Shared(t) => t,
        })
    }

    pub fn owns_depth(&self) -> bool {
        matches!(self.depth, Some(DepthAttachment::Owned(_)))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Lifecycle generation this set was allocated in.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Textures this set deletes on release (colors and an owned depth).
    pub fn owned_textures(&self) -> Vec<G::Texture> {
        let mut owned = self.colors.clone();
        if let Some(DepthAttachment::Owned(t)) = self.depth {
            owned.push(t);
        }
        owned
    }

    /// Binds the framebuffer for reading and drawing and sets the viewport
    /// to the set's size.
    pub fn bind(&self, gpu: &G) {
        gpu.bind_framebuffer(FramebufferTarget::Both, Some(self.framebuffer));
        gpu.viewport(self.width, self.height);
    }

    /// Clears every color attachment to its sentinel clear color.
    pub fn clear(&self, gpu: &G) {
        for (index, attachment) in self.attachments.iter().enumerate() {
            gpu.clear_color_attachment(index as u32, attachment.clear);
        }
    }
}

/// Tracks the viewport and supersampling factor render targets are sized to.
#[derive(Debug, Clone, PartialEq)]
pub struct FramebufferLifecycle {
    width: u32,
    height: u32,
    supersampling: f32,
    generation: u64,
}

impl FramebufferLifecycle {
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidDimensions` for a zero-sized viewport
    /// or a supersampling factor that is not finite and positive.
    pub fn new(width: u32, height: u32, supersampling: f32) -> Result<Self, PipelineError> {
        validate(width, height, supersampling)?;
        Ok(Self {
            width,
            height,
            supersampling,
            generation: 0,
        })
    }

    /// Records a new viewport size. Returns whether anything changed; the
    /// generation advances on every call so a rebuild is always distinguishable.
    pub fn resize(&mut self, width: u32, height: u32, supersampling: f32) -> Result<bool, PipelineError> {
        validate(width, height, supersampling)?;
        let changed = (width, height, supersampling) != (self.width, self.height, self.supersampling);
        self.width = width;
        self.height = height;
        self.supersampling = supersampling;
        self.generation += 1;
        Ok(changed)
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn supersampling(&self) -> f32 {
        self.supersampling
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn scaled_size(&self) -> (u32, u32) {
        scaled_size(self.width, self.height, self.supersampling)
    }

    /// Creates a framebuffer with every attachment in `spec`, declares the
    /// color attachments as draw buffers in order and checks completeness.
    ///
    /// # Errors
    ///
    /// `WrongThread` off the render thread; `FramebufferIncomplete` or a
    /// creation error otherwise, after deleting everything created so far.
    pub fn allocate<G: Gpu>(
        &self,
        gpu: &G,
        spec: &TargetSpec<G::Texture>,
    ) -> Result<RenderTargetSet<G>, PipelineError> {
        ensure_render_thread(gpu)?;

        let (width, height) = self.scaled_size();
        let framebuffer = gpu.create_framebuffer()?;
        gpu.bind_framebuffer(FramebufferTarget::Both, Some(framebuffer));

        let mut created = Vec::with_capacity(spec.colors.len() + 1);
        let attached = attach_all(gpu, spec, width, height, &mut created);
        gpu.bind_framebuffer(FramebufferTarget::Both, None);

        match attached {
            Ok((colors, depth)) => {
                log::debug!(
                    "allocated '{}' at {width}x{height} with {} color attachments",
                    spec.label,
                    colors.len()
                );
                Ok(RenderTargetSet {
                    label: spec.label.clone(),
                    framebuffer,
                    colors,
                    attachments: spec.colors.clone(),
                    depth,
                    width,
                    height,
                    generation: self.generation,
                })
            }
            Err(err) => {
                for texture in created {
                    gpu.delete_texture(texture);
                }
                gpu.delete_framebuffer(framebuffer);
                Err(err)
            }
        }
    }

    /// Deletes the set's framebuffer and owned textures. A shared depth
    /// texture is left alone.
    pub fn release<G: Gpu>(&self, gpu: &G, set: RenderTargetSet<G>) {
        for texture in set.owned_textures() {
            gpu.delete_texture(texture);
        }
        gpu.delete_framebuffer(set.framebuffer);
        log::debug!("released '{}' (generation {})", set.label, set.generation);
    }

    /// Allocates a replacement for `set` at the current size and only then
    /// releases the old one. On failure `set` is untouched.
    pub fn rebuild<G: Gpu>(
        &self,
        gpu: &G,
        set: &mut RenderTargetSet<G>,
        spec: &TargetSpec<G::Texture>,
    ) -> Result<(), PipelineError> {
        let fresh = self.allocate(gpu, spec)?;
        let old = mem::replace(set, fresh);
        self.release(gpu, old);
        Ok(())
    }
}

fn validate(width: u32, height: u32, supersampling: f32) -> Result<(), PipelineError> {
    if width == 0 || height == 0 || !supersampling.is_finite() || supersampling <= 0.0 {
        return Err(PipelineError::InvalidDimensions {
            width,
            height,
            supersampling,
        });
    }
    Ok(())
}

type Attached<T> = (Vec<T>, Option<DepthAttachment<T>>);

fn attach_all<G: Gpu>(
    gpu: &G,
    spec: &TargetSpec<G::Texture>,
    width: u32,
    height: u32,
    created: &mut Vec<G::Texture>,
) -> Result<Attached<G::Texture>, PipelineError> {
    let depth = match spec.depth {
        DepthSpec::None => None,
        DepthSpec::Owned => {
            let texture = gpu.create_texture(&TextureConfig::depth(width, height))?;
            created.push(texture);
            gpu.attach_depth(texture);
            Some(DepthAttachment::Owned(texture))
        }
        DepthSpec::Shared(texture) => {
            gpu.attach_depth(texture);
            Some(DepthAttachment::Shared(texture))
        }
    };

    let mut colors = Vec::with_capacity(spec.colors.len());
    for (index, attachment) in spec.colors.iter().enumerate() {
        let texture = gpu.create_texture(&attachment.texture_config(width, height))?;
        created.push(texture);
        gpu.attach_color(index as u32, texture);
        colors.push(texture);
    }
    gpu.set_draw_buffers(colors.len() as u32);

    match gpu.framebuffer_status() {
        FramebufferStatus::Complete => Ok((colors, depth)),
        FramebufferStatus::Incomplete(status) => Err(PipelineError::FramebufferIncomplete {
            label: spec.label.clone(),
            status,
        }),
    }
}
