//! Vertex shader for fullscreen post-processing passes.

/// GLSL 3.30 vertex shader that covers the screen with one triangle.
///
/// Positions and UVs come from `gl_VertexID`; draw three vertices with an
/// empty vertex array bound. The triangle is twice the screen size and the
/// rasterizer clips it. Also outputs `v_ray`, the view-space ray through the
/// fragment, which needs `invProjectionMatrix`.
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"#version 330 core
uniform mat4 invProjectionMatrix;
out vec2 v_uv;
out vec3 v_ray;
void main() {
    v_uv = vec2((gl_VertexID << 1) & 2, gl_VertexID & 2);
    vec4 clip = vec4(v_uv * 2.0 - 1.0, 0.0, 1.0);
    vec4 view = invProjectionMatrix * clip;
    v_ray = view.xyz / view.w;
    gl_Position = clip;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::scan_uniforms;

    #[test]
    fn fullscreen_vertex_shader_targets_glsl_330() {
        assert!(
            FULLSCREEN_VERTEX_SHADER.starts_with("#version 330 core"),
            "expected GLSL 3.30 version directive first in:\n{FULLSCREEN_VERTEX_SHADER}"
        );
    }

    #[test]
    fn fullscreen_vertex_shader_needs_no_vertex_buffer() {
        assert!(FULLSCREEN_VERTEX_SHADER.contains("gl_VertexID"));
        assert!(!FULLSCREEN_VERTEX_SHADER.contains(" in "), "no vertex attributes expected");
    }

    #[test]
    fn fullscreen_vertex_shader_declares_only_inverse_projection() {
        let uniforms: Vec<_> = scan_uniforms(FULLSCREEN_VERTEX_SHADER)
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(uniforms, vec!["invProjectionMatrix".to_string()]);
    }
}
