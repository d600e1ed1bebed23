//! Embedded GLSL for the effect programs.
//!
//! Sources are preprocessed by the shader injector before compilation, so
//! they may use `${NAME}` placeholders and `#if NAME` on registered
//! properties. Fullscreen passes pair their fragment shader with
//! [`FULLSCREEN_VERTEX_SHADER`].

use voxshade_core::render::FULLSCREEN_VERTEX_SHADER;

pub const SSR_WORLD_VERTEX: &str = include_str!("../shaders/ssr_world.vert");
pub const SSR_WORLD_FRAGMENT: &str = include_str!("../shaders/ssr_world.frag");
pub const SSR_OUT_FRAGMENT: &str = include_str!("../shaders/ssr_out.frag");
pub const CAUSTICS_FRAGMENT: &str = include_str!("../shaders/caustics.frag");

/// Vertex and fragment source of one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramSource {
    pub name: &'static str,
    pub vertex: &'static str,
    pub fragment: &'static str,
}

/// Geometry-buffer producer, compiled once per chunk render pass.
pub const SSR_WORLD: ProgramSource = ProgramSource {
    name: "ssr_world",
    vertex: SSR_WORLD_VERTEX,
    fragment: SSR_WORLD_FRAGMENT,
};

/// Reflection resolve over the geometry buffer.
pub const SSR_OUT: ProgramSource = ProgramSource {
    name: "ssr_out",
    vertex: FULLSCREEN_VERTEX_SHADER,
    fragment: SSR_OUT_FRAGMENT,
};

/// Underwater caustics.
pub const CAUSTICS: ProgramSource = ProgramSource {
    name: "caustics",
    vertex: FULLSCREEN_VERTEX_SHADER,
    fragment: CAUSTICS_FRAGMENT,
};

pub const ALL_PROGRAMS: [ProgramSource; 3] = [SSR_WORLD, SSR_OUT, CAUSTICS];

#[cfg(test)]
mod tests {
    use super::*;
    use voxshade_core::inject::scan_uniforms;

    fn declares(source: &str, name: &str) -> bool {
        scan_uniforms(source).iter().any(|u| u.name == name)
    }

    #[test]
    fn every_program_targets_glsl_330() {
        for program in ALL_PROGRAMS {
            for source in [program.vertex, program.fragment] {
                assert!(
                    source.starts_with("#version 330 core"),
                    "{} does not start with a version directive",
                    program.name
                );
            }
        }
    }

    #[test]
    fn world_program_declares_geometry_uniforms() {
        for name in [
            "terrainTex",
            "projectionMatrix",
            "modelViewMatrix",
            "dropletIntensity",
            "windIntensity",
            "playerUnderwater",
            "water1",
            "water2",
            "water3",
            "imperfect",
            "rgbaAmbientIn",
            "renderPass",
        ] {
            assert!(
                declares(SSR_WORLD_VERTEX, name) || declares(SSR_WORLD_FRAGMENT, name),
                "ssr_world is missing uniform {name}"
            );
        }
    }

    #[test]
    fn out_program_declares_resolve_uniforms() {
        for name in [
            "primaryScene",
            "gPosition",
            "gNormal",
            "gDepth",
            "gTint",
            "gLight",
            "gDiffraction",
            "zNear",
            "zFar",
            "dayLight",
            "horizonFog",
            "rgbaFog",
        ] {
            assert!(declares(SSR_OUT_FRAGMENT, name), "ssr_out is missing uniform {name}");
        }
    }

    #[test]
    fn caustics_program_declares_shadow_uniforms() {
        for name in [
            "shadowMapFar",
            "shadowMapNear",
            "shadowMapWidthInv",
            "shadowRangeNear",
            "toShadowMapSpaceMatrixFar",
            "waterFlowCounter",
        ] {
            assert!(declares(CAUSTICS_FRAGMENT, name), "caustics is missing uniform {name}");
        }
    }

    #[test]
    fn geometry_fragment_uses_injected_properties() {
        assert!(SSR_WORLD_FRAGMENT.contains("#if SSR_DIFFRACTION"));
        assert!(SSR_WORLD_FRAGMENT.contains("${SSR_WATER_TRANSPARENCY}"));
        assert!(SSR_OUT_FRAGMENT.contains("${SSR_SKY_MIXIN}"));
    }
}
