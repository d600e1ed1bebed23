//! Texture configuration for render-target attachments.
//!
//! `TextureConfig` is backend-independent; the GL enum mapping lives behind
//! the `render` feature next to it.

/// Storage class of a render-target texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Half-float HDR color, used for positions, normals and diffraction.
    Rgba16F,
    /// 8-bit normalized color, used for tint, light and composited color.
    Rgba8,
    /// 32-bit float depth.
    Depth32F,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32F)
    }

    pub fn name(self) -> &'static str {
        match self {
            TextureFormat::Rgba16F => "rgba16f",
            TextureFormat::Rgba8 => "rgba8",
            TextureFormat::Depth32F => "depth32f",
        }
    }
}

/// Min/mag filter applied to both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Linear,
    Nearest,
}

/// Wrap mode applied to both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Wrap {
    ClampToEdge,
    /// Samples outside `[0, 1]` return the given border color.
    ClampToBorder([f32; 4]),
}

/// Configuration for creating a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureConfig {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub filter: Filter,
    pub wrap: Wrap,
}

impl TextureConfig {
    /// RGBA16F with linear filtering, clamped to edge.
    pub fn rgba16f(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Rgba16F,
            filter: Filter::Linear,
            wrap: Wrap::ClampToEdge,
        }
    }

    /// RGBA8 with linear filtering, clamped to edge.
    pub fn rgba8(width: u32, height: u32) -> Self {
        Self {
            format: TextureFormat::Rgba8,
            ..Self::rgba16f(width, height)
        }
    }

    /// Depth32F with nearest filtering, clamped to edge.
    pub fn depth(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Depth32F,
            filter: Filter::Nearest,
            wrap: Wrap::ClampToEdge,
        }
    }

    pub fn with_border(mut self, color: [f32; 4]) -> Self {
        self.wrap = Wrap::ClampToBorder(color);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }
}

/// GL `(internal format, format, pixel type)` for a texture format.
#[cfg(feature = "render")]
pub fn gl_format(format: TextureFormat) -> (u32, u32, u32) {
    match format {
        TextureFormat::Rgba16F => (glow::RGBA16F, glow::RGBA, glow::FLOAT),
        TextureFormat::Rgba8 => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
        TextureFormat::Depth32F => (glow::DEPTH_COMPONENT32F, glow::DEPTH_COMPONENT, glow::FLOAT),
    }
}

/// Creates a GPU texture and allocates uninitialized storage for it.
///
/// # Errors
///
/// Returns the driver's message if the texture object cannot be created.
#[cfg(feature = "render")]
#[allow(unsafe_code)]
pub fn create_texture(gl: &glow::Context, config: &TextureConfig) -> Result<glow::Texture, String> {
    use glow::HasContext;

    let (internal, format, pixel_type) = gl_format(config.format);
    let filter = match config.filter {
        Filter::Linear => glow::LINEAR,
        Filter::Nearest => glow::NEAREST,
    };

    // SAFETY: glow wraps raw GL calls as unsafe. All parameters derive from
    // TextureConfig and the texture is unbound before returning.
    unsafe {
        let texture = gl.create_texture()?;
        gl.bind_texture(glow::TEXTURE_2D, Some(texture));

        let wrap = match config.wrap {
            Wrap::ClampToEdge => glow::CLAMP_TO_EDGE,
            Wrap::ClampToBorder(color) => {
                gl.tex_parameter_f32_slice(glow::TEXTURE_2D, glow::TEXTURE_BORDER_COLOR, &color);
                glow::CLAMP_TO_BORDER
            }
        };
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, wrap as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, wrap as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter as i32);

        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            internal as i32,
            config.width as i32,
            config.height as i32,
            0,
            format,
            pixel_type,
            glow::PixelUnpackData::Slice(None),
        );

        gl.bind_texture(glow::TEXTURE_2D, None);
        Ok(texture)
    }
}
