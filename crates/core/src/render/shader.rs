//! Shader stages, build errors and the OpenGL compile/link helpers.
//!
//! The stage and error types are backend-independent and shared with the
//! recording backend. The compile/link functions need a `glow::Context` and
//! exist only with the `render` feature.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// A programmable pipeline stage a source file is loaded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }

    /// Parses `"vertex"`/`"fragment"` (and the short forms `vs`/`fs`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "vertex" | "vert" | "vs" => Some(ShaderStage::Vertex),
            "fragment" | "frag" | "fs" => Some(ShaderStage::Fragment),
            _ => None,
        }
    }

    /// Infers the stage from a file extension such as `.vsh` or `.frag`.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "vsh" | "vert" | "vs" => Some(ShaderStage::Vertex),
            "fsh" | "frag" | "fs" => Some(ShaderStage::Fragment),
            _ => None,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur during shader compilation or program linking.
#[derive(Debug, Clone, Error)]
pub enum ShaderError {
    /// A shader stage failed to compile.
    #[error("shader compile error ({stage}):\n{log}")]
    CompileError {
        stage: ShaderStage,
        /// The driver's info log, prefixed with the numbered source.
        log: String,
    },
    /// A program failed to link.
    #[error("shader link error:\n{0}")]
    LinkError(String),
}

/// Formats a shader compilation error for human-readable debugging.
///
/// Prepends right-aligned line numbers to each line of `source`, then
/// appends the driver's error `log`. Injected `#define` lines shift the
/// driver's line numbers, so the numbered listing is of the injected source.
pub fn format_shader_error(source: &str, log: &str) -> String {
    let source_lines: Vec<&str> = source.lines().collect();
    let width = source_lines.len().max(1).to_string().len();

    let numbered = source_lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:>width$}: {line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    match (numbered.is_empty(), log.is_empty()) {
        (true, true) => String::new(),
        (true, false) => log.to_string(),
        (false, true) => numbered,
        (false, false) => format!("{numbered}\n\n{log}"),
    }
}

/// Compiles a single shader stage.
///
/// # Errors
///
/// Returns `ShaderError::CompileError` if the GLSL source fails to compile.
#[cfg(feature = "render")]
#[allow(unsafe_code)]
pub fn compile_shader(
    gl: &glow::Context,
    stage: ShaderStage,
    source: &str,
) -> Result<glow::Shader, ShaderError> {
    use glow::HasContext;

    let shader_type = match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
    };

    // SAFETY: glow wraps raw GL calls as unsafe. The shader type comes from
    // a closed enum and the handle is deleted on the failure path.
    unsafe {
        let shader = gl
            .create_shader(shader_type)
            .map_err(|log| ShaderError::CompileError { stage, log })?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);

        if gl.get_shader_compile_status(shader) {
            return Ok(shader);
        }

        let info_log = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        Err(ShaderError::CompileError {
            stage,
            log: format_shader_error(source, &info_log),
        })
    }
}

/// Compiles vertex and fragment sources and links them into a program.
///
/// Stage objects are deleted after linking whether or not it succeeded.
///
/// # Errors
///
/// Returns `ShaderError::CompileError` if either stage fails to compile,
/// or `ShaderError::LinkError` if linking fails.
#[cfg(feature = "render")]
#[allow(unsafe_code)]
pub fn compile_program(
    gl: &glow::Context,
    vertex_src: &str,
    fragment_src: &str,
) -> Result<glow::Program, ShaderError> {
    use glow::HasContext;

    let vert = compile_shader(gl, ShaderStage::Vertex, vertex_src)?;
    let frag = match compile_shader(gl, ShaderStage::Fragment, fragment_src) {
        Ok(f) => f,
        Err(e) => {
            // SAFETY: vert is a live handle from the successful compile above.
            unsafe { gl.delete_shader(vert) };
            return Err(e);
        }
    };

    // SAFETY: both stage handles are live; the program keeps its own copies
    // once linked, so detaching and deleting them afterwards is correct.
    unsafe {
        let program = match gl.create_program() {
            Ok(p) => p,
            Err(log) => {
                gl.delete_shader(vert);
                gl.delete_shader(frag);
                return Err(ShaderError::LinkError(log));
            }
        };
        gl.attach_shader(program, vert);
        gl.attach_shader(program, frag);
        gl.link_program(program);
        gl.detach_shader(program, vert);
        gl.detach_shader(program, frag);
        gl.delete_shader(vert);
        gl.delete_shader(frag);

        if gl.get_program_link_status(program) {
            Ok(program)
        } else {
            let info_log = gl.get_program_info_log(program);
            gl.delete_program(program);
            Err(ShaderError::LinkError(info_log))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_shader_error_prepends_line_numbers() {
        let source = "#version 330 core\n#define SSR_ENABLED 1\nvoid main() {\n}\n";
        let log = "ERROR: 0:3: syntax error";
        let formatted = format_shader_error(source, log);

        assert!(
            formatted.contains("1: #version 330 core"),
            "expected line 1 with content, got:\n{formatted}"
        );
        assert!(
            formatted.contains("2: #define SSR_ENABLED 1"),
            "expected injected define on line 2, got:\n{formatted}"
        );
        assert!(
            formatted.contains(log),
            "expected original log in output, got:\n{formatted}"
        );
    }

    #[test]
    fn format_shader_error_handles_empty_inputs() {
        assert_eq!(format_shader_error("", "some error"), "some error");
        assert_eq!(format_shader_error("void main() {}", ""), "1: void main() {}");
        assert!(format_shader_error("", "").is_empty());
    }

    #[test]
    fn format_shader_error_right_aligns_line_numbers() {
        let source = (1..=12)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let formatted = format_shader_error(&source, "err");
        let lines: Vec<&str> = formatted.lines().collect();

        assert!(
            lines[0].starts_with(" 1: "),
            "expected right-aligned single digit, got: '{}'",
            lines[0]
        );
        assert!(
            lines[9].starts_with("10: "),
            "expected no padding for double digit, got: '{}'",
            lines[9]
        );
    }

    #[test]
    fn stage_parses_names_and_extensions() {
        assert_eq!(ShaderStage::from_name("Vertex"), Some(ShaderStage::Vertex));
        assert_eq!(ShaderStage::from_name("fs"), Some(ShaderStage::Fragment));
        assert_eq!(ShaderStage::from_name("geometry"), None);
        assert_eq!(
            ShaderStage::from_path(Path::new("shaders/chunkopaque.vsh")),
            Some(ShaderStage::Vertex)
        );
        assert_eq!(
            ShaderStage::from_path(Path::new("ssr_out.frag")),
            Some(ShaderStage::Fragment)
        );
        assert_eq!(ShaderStage::from_path(Path::new("README")), None);
    }

    #[test]
    fn shader_compile_error_display_includes_stage_and_log() {
        let err = ShaderError::CompileError {
            stage: ShaderStage::Fragment,
            log: "undeclared identifier".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("fragment"), "missing stage in: {msg}");
        assert!(
            msg.contains("undeclared identifier"),
            "missing log in: {msg}"
        );
    }

    #[test]
    fn shader_error_implements_std_error() {
        fn assert_error<T: std::error::Error>() {}
        assert_error::<ShaderError>();
    }
}
