//! The OpenGL implementation of [`Gpu`].
//!
//! `GpuContext` wraps a `glow::Context` created by the host on its render
//! thread. It owns the empty vertex array fullscreen draws need in a core
//! profile and remembers which thread it was created on.

use std::thread::{self, ThreadId};

use crate::error::PipelineError;
use crate::gpu::{BlendFactor, Capability, FramebufferStatus, FramebufferTarget, Gpu, UniformValue};

use super::shader::{compile_program, ShaderError};
use super::texture::{create_texture, TextureConfig};

/// A `glow::Context` plus what the pipeline needs to drive it.
pub struct GpuContext {
    gl: glow::Context,
    empty_vertex_array: glow::VertexArray,
    render_thread: ThreadId,
}

impl GpuContext {
    /// Wraps `gl`, which must be current on the calling thread.
    ///
    /// # Errors
    ///
    /// Fails if the context is older than OpenGL 3.3 / OpenGL ES 3.0, since
    /// float color attachments and per-attachment blending are required, or
    /// if the vertex array cannot be created.
    #[allow(unsafe_code)]
    pub fn new(gl: glow::Context) -> Result<Self, PipelineError> {
        use glow::HasContext;

        let version = gl.version();
        let supported = if version.is_embedded {
            version.major >= 3
        } else {
            (version.major, version.minor) >= (3, 3)
        };
        if !supported {
            return Err(PipelineError::ResourceCreation {
                kind: "context",
                message: format!(
                    "OpenGL {}.{} is too old, 3.3 or newer is required",
                    version.major, version.minor
                ),
            });
        }

        // SAFETY: creating a vertex array has no preconditions beyond a current context.
        let empty_vertex_array = unsafe { gl.create_vertex_array() }.map_err(|message| {
            PipelineError::ResourceCreation {
                kind: "vertex array",
                message,
            }
        })?;

        log::info!("GPU context ready: {}", version.vendor_info);
        Ok(Self {
            gl,
            empty_vertex_array,
            render_thread: thread::current().id(),
        })
    }

    /// Returns a reference to the underlying `glow::Context`.
    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    /// Deletes the context's own objects and returns the `glow::Context`.
    #[allow(unsafe_code)]
    pub fn into_gl(self) -> glow::Context {
        use glow::HasContext;

        // SAFETY: the vertex array was created by this context and is not bound elsewhere.
        unsafe { self.gl.delete_vertex_array(self.empty_vertex_array) };
        self.gl
    }
}

fn framebuffer_target(target: FramebufferTarget) -> u32 {
    match target {
        FramebufferTarget::Both => glow::FRAMEBUFFER,
        FramebufferTarget::Read => glow::READ_FRAMEBUFFER,
        FramebufferTarget::Draw => glow::DRAW_FRAMEBUFFER,
    }
}

fn blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
    }
}

// SAFETY (all methods below): glow exposes raw GL entry points as unsafe.
// Every handle passed in was created by this context, enums come from
// closed Rust enums, and the trait is only used on the render thread.
#[allow(unsafe_code)]
impl Gpu for GpuContext {
    type Texture = glow::Texture;
    type Framebuffer = glow::Framebuffer;
    type Program = glow::Program;
    type UniformLocation = glow::UniformLocation;

    fn render_thread(&self) -> ThreadId {
        self.render_thread
    }

    fn create_texture(&self, config: &TextureConfig) -> Result<glow::Texture, PipelineError> {
        create_texture(&self.gl, config).map_err(|message| PipelineError::ResourceCreation {
            kind: "texture",
            message,
        })
    }

    fn delete_texture(&self, texture: glow::Texture) {
        use glow::HasContext;
        unsafe { self.gl.delete_texture(texture) }
    }

    fn create_framebuffer(&self) -> Result<glow::Framebuffer, PipelineError> {
        use glow::HasContext;
        unsafe { self.gl.create_framebuffer() }.map_err(|message| PipelineError::ResourceCreation {
            kind: "framebuffer",
            message,
        })
    }

    fn delete_framebuffer(&self, framebuffer: glow::Framebuffer) {
        use glow::HasContext;
        unsafe { self.gl.delete_framebuffer(framebuffer) }
    }

    fn bind_framebuffer(&self, target: FramebufferTarget, framebuffer: Option<glow::Framebuffer>) {
        use glow::HasContext;
        unsafe { self.gl.bind_framebuffer(framebuffer_target(target), framebuffer) }
    }

    fn attach_color(&self, index: u32, texture: glow::Texture) {
        use glow::HasContext;
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::DRAW_FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0 + index,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            )
        }
    }

    fn attach_depth(&self, texture: glow::Texture) {
        use glow::HasContext;
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::DRAW_FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::TEXTURE_2D,
                Some(texture),
                0,
            )
        }
    }

    fn set_draw_buffers(&self, count: u32) {
        use glow::HasContext;
        let buffers: Vec<u32> = (0..count).map(|i| glow::COLOR_ATTACHMENT0 + i).collect();
        unsafe { self.gl.draw_buffers(&buffers) }
    }

    fn framebuffer_status(&self) -> FramebufferStatus {
        use glow::HasContext;
        match unsafe { self.gl.check_framebuffer_status(glow::DRAW_FRAMEBUFFER) } {
            glow::FRAMEBUFFER_COMPLETE => FramebufferStatus::Complete,
            status => FramebufferStatus::Incomplete(status),
        }
    }

    fn viewport(&self, width: u32, height: u32) {
        use glow::HasContext;
        unsafe { self.gl.viewport(0, 0, width as i32, height as i32) }
    }

    fn clear_color_attachment(&self, index: u32, color: [f32; 4]) {
        use glow::HasContext;
        unsafe { self.gl.clear_buffer_f32_slice(glow::COLOR, index, &color) }
    }

    fn clear_depth(&self) {
        use glow::HasContext;
        unsafe {
            self.gl.depth_mask(true);
            self.gl.clear(glow::DEPTH_BUFFER_BIT);
        }
    }

    fn blit_depth(&self, src: (u32, u32), dst: (u32, u32)) {
        use glow::HasContext;
        unsafe {
            self.gl.blit_framebuffer(
                0,
                0,
                src.0 as i32,
                src.1 as i32,
                0,
                0,
                dst.0 as i32,
                dst.1 as i32,
                glow::DEPTH_BUFFER_BIT,
                glow::NEAREST,
            )
        }
    }

    fn set_capability(&self, capability: Capability, enabled: bool) {
        use glow::HasContext;
        let cap = match capability {
            Capability::CullFace => glow::CULL_FACE,
            Capability::DepthTest => glow::DEPTH_TEST,
            Capability::Blend => glow::BLEND,
        };
        unsafe {
            if enabled {
                self.gl.enable(cap);
            } else {
                self.gl.disable(cap);
            }
        }
    }

    fn set_depth_mask(&self, write: bool) {
        use glow::HasContext;
        unsafe { self.gl.depth_mask(write) }
    }

    fn set_blend_func_attachment(&self, index: u32, src: BlendFactor, dst: BlendFactor) {
        use glow::HasContext;
        unsafe {
            self.gl
                .blend_func_draw_buffer(index, blend_factor(src), blend_factor(dst))
        }
    }

    fn compile_program(&self, vertex: &str, fragment: &str) -> Result<glow::Program, ShaderError> {
        compile_program(&self.gl, vertex, fragment)
    }

    fn delete_program(&self, program: glow::Program) {
        use glow::HasContext;
        unsafe { self.gl.delete_program(program) }
    }

    fn use_program(&self, program: Option<glow::Program>) {
        use glow::HasContext;
        unsafe { self.gl.use_program(program) }
    }

    fn uniform_location(&self, program: glow::Program, name: &str) -> Option<glow::UniformLocation> {
        use glow::HasContext;
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn set_uniform(&self, location: &glow::UniformLocation, value: UniformValue) {
        use glow::HasContext;
        let location = Some(location);
        unsafe {
            match value {
                UniformValue::Float(v) => self.gl.uniform_1_f32(location, v),
                UniformValue::Int(v) => self.gl.uniform_1_i32(location, v),
                UniformValue::Vec2(v) => self.gl.uniform_2_f32(location, v.x, v.y),
                UniformValue::Vec3(v) => self.gl.uniform_3_f32(location, v.x, v.y, v.z),
                UniformValue::Vec4(v) => self.gl.uniform_4_f32(location, v.x, v.y, v.z, v.w),
                UniformValue::Mat4(m) => {
                    self.gl
                        .uniform_matrix_4_f32_slice(location, false, &m.to_cols_array())
                }
            }
        }
    }

    fn bind_texture_unit(&self, unit: u32, texture: glow::Texture) {
        use glow::HasContext;
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
        }
    }

    fn draw_fullscreen_triangle(&self) {
        use glow::HasContext;
        unsafe {
            self.gl.bind_vertex_array(Some(self.empty_vertex_array));
            self.gl.draw_arrays(glow::TRIANGLES, 0, 3);
            self.gl.bind_vertex_array(None);
        }
    }

    fn take_error(&self) -> Option<u32> {
        use glow::HasContext;
        match unsafe { self.gl.get_error() } {
            glow::NO_ERROR => None,
            code => Some(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_context_implements_the_gpu_seam() {
        fn assert_gpu<G: Gpu>() {}
        assert_gpu::<GpuContext>();
    }

    #[test]
    fn blend_factors_map_to_gl_enums() {
        assert_eq!(blend_factor(BlendFactor::OneMinusSrcAlpha), glow::ONE_MINUS_SRC_ALPHA);
        assert_eq!(blend_factor(BlendFactor::SrcAlpha), glow::SRC_ALPHA);
        assert_eq!(framebuffer_target(FramebufferTarget::Read), glow::READ_FRAMEBUFFER);
    }

    #[test]
    #[ignore = "requires GL context"]
    fn new_succeeds_with_valid_context() {
        // Would test: GpuContext::new(gl) on a 3.3 core context returns Ok.
    }

    #[test]
    #[ignore = "requires GL context"]
    fn ssr_geometry_set_is_complete_on_real_driver() {
        // Would test: FramebufferLifecycle::allocate with the SSR geometry
        // target spec returns a complete five-attachment framebuffer.
    }
}
