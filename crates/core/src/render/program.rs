//! Compiled programs with their uniform-location tables, and the per-pass
//! program table for chunk rendering.

use std::collections::HashMap;

use crate::error::PipelineError;
use crate::gpu::{Gpu, UniformValue};
use crate::host::ChunkRenderPass;
use crate::inject::InjectedSource;

/// A linked program plus the locations of every uniform its injected
/// sources declared and the driver kept.
///
/// Never patched: a reload compiles a fresh handle and deletes this one.
pub struct ShaderProgramHandle<G: Gpu> {
    name: String,
    program: G::Program,
    locations: HashMap<String, G::UniformLocation>,
}

impl<G: Gpu> ShaderProgramHandle<G> {
    /// Compiles and links the injected sources, then resolves the location of
    /// every scanned uniform. Uniforms the driver optimized away are dropped.
    pub fn compile(
        gpu: &G,
        name: &str,
        vertex: &InjectedSource,
        fragment: &InjectedSource,
    ) -> Result<Self, PipelineError> {
        let program = gpu
            .compile_program(&vertex.source, &fragment.source)
            .map_err(|source| PipelineError::Shader {
                program: name.to_string(),
                source,
            })?;

        let mut locations = HashMap::new();
        for decl in vertex.uniforms.iter().chain(&fragment.uniforms) {
            if locations.contains_key(&decl.name) {
                continue;
            }
            match gpu.uniform_location(program, &decl.name) {
                Some(location) => {
                    locations.insert(decl.name.clone(), location);
                }
                None => log::trace!("{name}: uniform {} is inactive", decl.name),
            }
        }
        log::debug!("compiled {name} with {} active uniforms", locations.len());

        Ok(Self {
            name: name.to_string(),
            program,
            locations,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> G::Program {
        self.program
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.locations.contains_key(name)
    }

    pub fn use_program(&self, gpu: &G) {
        gpu.use_program(Some(self.program));
    }

    /// Writes a uniform of this (in-use) program. Returns `false` if the
    /// program has no such active uniform.
    pub fn uniform(&self, gpu: &G, name: &str, value: UniformValue) -> bool {
        match self.locations.get(name) {
            Some(location) => {
                gpu.set_uniform(location, value);
                true
            }
            None => false,
        }
    }

    /// Binds `texture` to `unit` and points sampler `name` at that unit.
    pub fn bind_texture(&self, gpu: &G, name: &str, texture: G::Texture, unit: u32) -> bool {
        if !self.has_uniform(name) {
            return false;
        }
        gpu.bind_texture_unit(unit, texture);
        self.uniform(gpu, name, UniformValue::Int(unit as i32))
    }

    pub fn delete(self, gpu: &G) {
        gpu.delete_program(self.program);
    }
}

/// At most one program per chunk render pass; a missing entry means the
/// pass is skipped.
pub struct RenderPassTable<G: Gpu> {
    programs: [Option<ShaderProgramHandle<G>>; ChunkRenderPass::COUNT],
}

impl<G: Gpu> Default for RenderPassTable<G> {
    fn default() -> Self {
        Self {
            programs: std::array::from_fn(|_| None),
        }
    }
}

impl<G: Gpu> RenderPassTable<G> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `program` for `pass`, returning the one it replaces.
    pub fn insert(&mut self, pass: ChunkRenderPass, program: ShaderProgramHandle<G>) -> Option<ShaderProgramHandle<G>> {
        self.programs[pass.index()].replace(program)
    }

    pub fn get(&self, pass: ChunkRenderPass) -> Option<&ShaderProgramHandle<G>> {
        self.programs[pass.index()].as_ref()
    }

    /// Every pass in draw order with its program, if any.
    pub fn iter(&self) -> impl Iterator<Item = (ChunkRenderPass, Option<&ShaderProgramHandle<G>>)> {
        ChunkRenderPass::ALL
            .into_iter()
            .map(move |pass| (pass, self.get(pass)))
    }

    pub fn len(&self) -> usize {
        self.programs.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deletes every program and empties the table.
    pub fn clear(&mut self, gpu: &G) {
        for program in self.programs.iter_mut().filter_map(Option::take) {
            program.delete(gpu);
        }
    }
}
