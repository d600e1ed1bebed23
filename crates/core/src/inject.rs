//! Load-time shader source preprocessing.
//!
//! Effects register named properties whose values come from [`Settings`].
//! When a shader is loaded, [`ShaderInjector::on_shader_loaded`]:
//!
//! 1. replaces every `${NAME}` placeholder with the property's literal,
//! 2. rewrites existing `#define NAME ...` lines for registered names,
//! 3. inserts `#define NAME value` after `#version` for every registered
//!    name a conditional directive mentions but the source never defines,
//! 4. scans the result for uniform declarations.
//!
//! A referenced property is always defined; shaders test its value with
//! `#if NAME`, not its existence. Values are evaluated once per load, so the
//! output for a given source and settings snapshot is byte-identical, and
//! injecting already-injected source changes nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;

use crate::render::shader::ShaderStage;
use crate::settings::Settings;

/// Errors raised while preprocessing shader source.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InjectionError {
    /// A `${NAME}` placeholder names no registered property.
    #[error("unresolved placeholder ${{{name}}} on line {line} of {stage} shader")]
    UnresolvedPlaceholder {
        name: String,
        line: usize,
        stage: ShaderStage,
    },

    /// A `${` with no closing brace on the same line.
    #[error("unterminated placeholder on line {line}")]
    UnterminatedPlaceholder { line: usize },

    /// A float property evaluated to NaN or infinity.
    #[error("property {name} evaluated to non-finite value {value}")]
    NonFiniteValue { name: String, value: f32 },

    /// A property name does not carry its registry's namespace prefix.
    #[error("property {name} is outside namespace {namespace}")]
    OutsideNamespace { name: String, namespace: String },

    /// A property name is not a valid preprocessor identifier.
    #[error("invalid property name '{0}'")]
    InvalidName(String),
}

/// Reads a property's current value from the settings.
#[derive(Clone, Copy)]
pub enum PropertyAccessor {
    Bool(fn(&Settings) -> bool),
    Float(fn(&Settings) -> f32),
}

impl PropertyAccessor {
    pub fn evaluate(&self, settings: &Settings) -> PropertyValue {
        match self {
            PropertyAccessor::Bool(read) => PropertyValue::Bool(read(settings)),
            PropertyAccessor::Float(read) => PropertyValue::Float(read(settings)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PropertyAccessor::Bool(_) => "bool",
            PropertyAccessor::Float(_) => "float",
        }
    }
}

impl fmt::Debug for PropertyAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyAccessor::{}", self.kind())
    }
}

/// An evaluated property value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Float(f32),
}

impl PropertyValue {
    /// GLSL literal: `0`/`1` for booleans, a decimal that always contains a
    /// `.` for floats.
    pub fn to_glsl(self, name: &str) -> Result<String, InjectionError> {
        match self {
            PropertyValue::Bool(v) => Ok(if v { "1" } else { "0" }.to_string()),
            PropertyValue::Float(v) if !v.is_finite() => Err(InjectionError::NonFiniteValue {
                name: name.to_string(),
                value: v,
            }),
            PropertyValue::Float(v) => {
                let text = v.to_string();
                Ok(if text.contains('.') { text } else { format!("{text}.0") })
            }
        }
    }
}

/// A registered property: macro name plus accessor.
#[derive(Debug, Clone)]
pub struct ShaderProperty {
    pub name: String,
    pub accessor: PropertyAccessor,
}

/// Properties of one effect, all sharing a macro-name prefix.
#[derive(Debug, Clone)]
pub struct PropertyRegistry {
    namespace: String,
    properties: BTreeMap<String, PropertyAccessor>,
}

impl PropertyRegistry {
    /// `namespace` is the prefix every property name must start with, e.g. `"SSR_"`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Registers `name`. A second registration of the same name replaces the first.
    ///
    /// # Errors
    ///
    /// `InvalidName` if `name` is not an identifier, `OutsideNamespace` if it
    /// lacks the registry prefix.
    pub fn register_property(
        &mut self,
        name: &str,
        accessor: PropertyAccessor,
    ) -> Result<(), InjectionError> {
        if !is_identifier(name) {
            return Err(InjectionError::InvalidName(name.to_string()));
        }
        if !name.starts_with(&self.namespace) {
            return Err(InjectionError::OutsideNamespace {
                name: name.to_string(),
                namespace: self.namespace.clone(),
            });
        }
        if self.properties.insert(name.to_string(), accessor).is_some() {
            log::debug!("property {name} re-registered; last registration wins");
        }
        Ok(())
    }

    pub fn register_bool(&mut self, name: &str, read: fn(&Settings) -> bool) -> Result<(), InjectionError> {
        self.register_property(name, PropertyAccessor::Bool(read))
    }

    pub fn register_float(&mut self, name: &str, read: fn(&Settings) -> f32) -> Result<(), InjectionError> {
        self.register_property(name, PropertyAccessor::Float(read))
    }

    pub fn get(&self, name: &str) -> Option<PropertyAccessor> {
        self.properties.get(name).copied()
    }

    pub fn properties(&self) -> impl Iterator<Item = ShaderProperty> + '_ {
        self.properties.iter().map(|(name, accessor)| ShaderProperty {
            name: name.clone(),
            accessor: *accessor,
        })
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// A uniform declaration found in shader source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniformDecl {
    pub ty: String,
    pub name: String,
    /// Array length text, if declared as an array.
    pub array_len: Option<String>,
}

/// Shader source after injection, with the uniforms it declares.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectedSource {
    pub stage: ShaderStage,
    pub source: String,
    pub uniforms: Vec<UniformDecl>,
    /// Registered names defined in the output, whether inserted or rewritten.
    pub defined: Vec<String>,
}

/// Holds every effect's property registry and rewrites shader sources.
#[derive(Debug, Clone, Default)]
pub struct ShaderInjector {
    registries: Vec<PropertyRegistry>,
}

impl ShaderInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a registry, merging into an existing one with the same namespace.
    pub fn add_registry(&mut self, registry: PropertyRegistry) {
        match self
            .registries
            .iter_mut()
            .find(|r| r.namespace == registry.namespace)
        {
            Some(existing) => existing.properties.extend(registry.properties),
            None => self.registries.push(registry),
        }
    }

    pub fn registries(&self) -> &[PropertyRegistry] {
        &self.registries
    }

    /// Looks a property up across all registries; later registries win.
    pub fn resolve(&self, name: &str) -> Option<PropertyAccessor> {
        self.registries.iter().rev().find_map(|r| r.get(name))
    }

    /// Evaluates every property into its GLSL literal.
    ///
    /// # Errors
    ///
    /// `NonFiniteValue` if a float property is NaN or infinite.
    pub fn evaluate(&self, settings: &Settings) -> Result<BTreeMap<String, String>, InjectionError> {
        let mut values = BTreeMap::new();
        for registry in &self.registries {
            for (name, accessor) in &registry.properties {
                values.insert(name.clone(), accessor.evaluate(settings).to_glsl(name)?);
            }
        }
        Ok(values)
    }

    /// Rewrites `source` with the current property values and scans its uniforms.
    ///
    /// # Errors
    ///
    /// `UnresolvedPlaceholder` for a `${NAME}` naming no property,
    /// `UnterminatedPlaceholder` for a `${` without `}`, `NonFiniteValue`
    /// for a NaN or infinite float property.
    pub fn on_shader_loaded(
        &self,
        source: &str,
        stage: ShaderStage,
        settings: &Settings,
    ) -> Result<InjectedSource, InjectionError> {
        let values = self.evaluate(settings)?;
        let substituted = substitute_placeholders(source, stage, &values)?;
        let (source, defined) = inject_defines(&substituted, &values);
        let uniforms = scan_uniforms(&source);
        Ok(InjectedSource {
            stage,
            source,
            uniforms,
            defined,
        })
    }
}

fn substitute_placeholders(
    source: &str,
    stage: ShaderStage,
    values: &BTreeMap<String, String>,
) -> Result<String, InjectionError> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let line = source[..source.len() - rest.len() + start].matches('\n').count() + 1;
        let after = &rest[start + 2..];
        let end = match after.find('}') {
            Some(end) if !after[..end].contains('\n') => end,
            _ => return Err(InjectionError::UnterminatedPlaceholder { line }),
        };
        let name = after[..end].trim();
        match values.get(name) {
            Some(value) => out.push_str(value),
            None => {
                return Err(InjectionError::UnresolvedPlaceholder {
                    name: name.to_string(),
                    line,
                    stage,
                })
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Splits a preprocessor line into its directive keyword and the remainder,
/// with any `//` comment removed.
fn directive(line: &str) -> Option<(&str, &str)> {
    let body = line.trim_start().strip_prefix('#')?.trim_start();
    let body = match body.find("//") {
        Some(i) => &body[..i],
        None => body,
    };
    let end = body
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(body.len());
    Some((&body[..end], &body[end..]))
}

fn inject_defines(source: &str, values: &BTreeMap<String, String>) -> (String, Vec<String>) {
    let mut lines: Vec<String> = Vec::new();
    let mut referenced: BTreeSet<&str> = BTreeSet::new();
    let mut defined: BTreeSet<String> = BTreeSet::new();
    let mut version_line = None;

    for line in source.lines() {
        match directive(line) {
            Some(("version", _)) if version_line.is_none() => {
                version_line = Some(lines.len());
            }
            Some(("define", rest)) => {
                let name = identifiers(rest).next();
                if let Some((name, value)) = name.and_then(|n| values.get_key_value(n)) {
                    defined.insert(name.clone());
                    lines.push(format!("#define {name} {value}"));
                    continue;
                }
            }
            Some(("if" | "elif" | "ifdef" | "ifndef", rest)) => {
                // A define further down does not reach this conditional.
                referenced.extend(identifiers(rest).filter(|n| values.contains_key(*n) && !defined.contains(*n)));
            }
            _ => {}
        }
        lines.push(line.to_string());
    }

    let missing: Vec<String> = referenced.into_iter().map(str::to_string).collect();
    let insert_at = version_line.map_or(0, |i| i + 1);
    for (offset, name) in missing.iter().enumerate() {
        lines.insert(insert_at + offset, format!("#define {name} {}", values[name]));
    }

    let mut out = lines.join("\n");
    if source.ends_with('\n') {
        out.push('\n');
    }
    defined.extend(missing);
    (out, defined.into_iter().collect())
}

fn identifiers(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| is_identifier(t))
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Uniform types whose declarations are collected.
pub const UNIFORM_TYPES: [&str; 14] = [
    "float",
    "int",
    "ivec2",
    "ivec3",
    "ivec4",
    "vec2",
    "vec3",
    "vec4",
    "sampler2DArray",
    "sampler2DShadow",
    "sampler2D",
    "samplerCube",
    "mat3",
    "mat4",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Word(&'a str),
    Punct(char),
}

fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c.is_ascii_alphanumeric() || c == '_' {
            let mut end = start + c.len_utf8();
            while let Some(&(i, next)) = chars.peek() {
                if !(next.is_ascii_alphanumeric() || next == '_') {
                    break;
                }
                end = i + next.len_utf8();
                chars.next();
            }
            tokens.push(Token::Word(&line[start..end]));
        } else if !c.is_whitespace() {
            tokens.push(Token::Punct(c));
        }
    }
    tokens
}

/// Reads `[ len ]` at `tokens[at]`, returning the length text and the index after `]`.
fn array_suffix(tokens: &[Token<'_>], at: usize) -> Option<(String, usize)> {
    if tokens.get(at) != Some(&Token::Punct('[')) {
        return None;
    }
    let mut len = String::new();
    for (offset, token) in tokens[at + 1..].iter().enumerate() {
        match token {
            Token::Punct(']') => return Some((len, at + offset + 2)),
            Token::Word(w) => len.push_str(w),
            Token::Punct(c) => len.push(*c),
        }
    }
    None
}

/// Collects `uniform <type> [len]? <name> [len]?` declarations, including
/// comma-separated declarators, in source order. Line comments are ignored.
pub fn scan_uniforms(source: &str) -> Vec<UniformDecl> {
    let mut found = Vec::new();
    for line in source.lines() {
        let code = match line.find("//") {
            Some(i) => &line[..i],
            None => line,
        };
        let tokens = tokenize(code);
        let mut i = 0;
        while i < tokens.len() {
            if tokens[i] != Token::Word("uniform") {
                i += 1;
                continue;
            }
            let mut at = i + 1;
            if let Some(Token::Word("lowp" | "mediump" | "highp")) = tokens.get(at) {
                at += 1;
            }
            let ty = match tokens.get(at) {
                Some(Token::Word(ty)) if UNIFORM_TYPES.contains(ty) => *ty,
                _ => {
                    i = at;
                    continue;
                }
            };
            at += 1;
            let type_len = array_suffix(&tokens, at).map(|(len, next)| {
                at = next;
                len
            });
            loop {
                let Some(Token::Word(name)) = tokens.get(at) else { break };
                at += 1;
                let name_len = array_suffix(&tokens, at).map(|(len, next)| {
                    at = next;
                    len
                });
                found.push(UniformDecl {
                    ty: ty.to_string(),
                    name: name.to_string(),
                    array_len: name_len.or_else(|| type_len.clone()),
                });
                if tokens.get(at) != Some(&Token::Punct(',')) {
                    break;
                }
                at += 1;
            }
            i = at.max(i + 1);
        }
    }
    found
}
