#![deny(unsafe_code)]
//! CLI binary for the voxshade post-processing pipeline.
//!
//! Subcommands:
//! - `inject <file>`: rewrite a shader with the current property values
//! - `settings show|reset|set`: inspect or edit the settings blob
//! - `list`: print effects and the shader properties they register
//! - `simulate`: drive the pipeline headless and report GPU usage

mod error;
mod simulate;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use error::CliError;
use simulate::Simulation;
use voxshade_core::{RecordingGpu, SettingKey, Settings, SettingsStore, ShaderStage};
use voxshade_effects::{build_injector, property_registries, EffectKind};

#[derive(Parser)]
#[command(name = "voxshade", about = "Deferred-shading post-processing pipeline CLI")]
struct Cli {
    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Settings file; defaults are used in memory when omitted.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inject property values into a shader source file.
    Inject {
        /// Shader file (.vsh/.fsh/.vert/.frag).
        file: PathBuf,

        /// Shader stage; inferred from the extension when omitted.
        #[arg(long)]
        stage: Option<String>,

        /// Output file path; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Inspect or edit settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// List effects and their shader properties.
    List,
    /// Run the pipeline against a recording GPU for N frames.
    Simulate {
        /// Viewport width in pixels.
        #[arg(short = 'W', long, default_value_t = 1280)]
        width: u32,

        /// Viewport height in pixels.
        #[arg(short = 'H', long, default_value_t = 720)]
        height: u32,

        /// Supersampling factor applied to the viewport.
        #[arg(long, default_value_t = 1.0)]
        supersampling: f32,

        /// Number of frames to simulate.
        #[arg(short, long, default_value_t = 8)]
        frames: usize,

        /// Resize the host halfway through, e.g. "1920x1080".
        #[arg(long)]
        resize_to: Option<String>,

        /// Per-effect tuning as a JSON object keyed by effect name.
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print every setting.
    Show,
    /// Restore defaults and write them back.
    Reset,
    /// Change one setting and write it back.
    Set {
        /// Setting name, e.g. "ssr_enabled".
        key: String,
        /// New value ("true"/"false" or an integer).
        value: String,
    },
}

/// Parses a `WIDTHxHEIGHT` size.
fn parse_size(text: &str) -> Result<(u32, u32), CliError> {
    let invalid = || CliError::Input(format!("invalid size {text:?}, expected WIDTHxHEIGHT"));
    let (w, h) = text.split_once(['x', 'X']).ok_or_else(invalid)?;
    let width = w.trim().parse().map_err(|_| invalid())?;
    let height = h.trim().parse().map_err(|_| invalid())?;
    Ok((width, height))
}

/// Resolves the stage from `--stage`, then the file extension, then fragment.
fn resolve_stage(stage: Option<&str>, file: &Path) -> Result<ShaderStage, CliError> {
    match stage {
        Some(name) => {
            ShaderStage::from_name(name).ok_or_else(|| CliError::Input(format!("unknown shader stage {name:?}")))
        }
        None => Ok(ShaderStage::from_path(file).unwrap_or(ShaderStage::Fragment)),
    }
}

fn open_store(path: Option<&Path>) -> Result<SettingsStore, CliError> {
    match path {
        Some(path) => Ok(SettingsStore::load(path)?),
        None => Ok(SettingsStore::in_memory(Settings::default())),
    }
}

fn require_file(path: Option<&Path>, action: &str) -> Result<(), CliError> {
    match path {
        Some(_) => Ok(()),
        None => Err(CliError::Input(format!("settings {action} needs --settings <path>"))),
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let settings_path = cli.settings.as_deref();
    match cli.command {
        Command::List => {
            let registries = property_registries()?;
            let effects = EffectKind::<RecordingGpu>::list_effects();
            if cli.json {
                let info: serde_json::Map<String, serde_json::Value> = effects
                    .iter()
                    .zip(&registries)
                    .map(|(name, registry)| {
                        let props: serde_json::Map<String, serde_json::Value> = registry
                            .properties()
                            .map(|p| (p.name, serde_json::Value::from(p.accessor.kind())))
                            .collect();
                        (name.to_string(), props.into())
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                for (name, registry) in effects.iter().zip(&registries) {
                    println!("{name}");
                    for property in registry.properties() {
                        println!("  {} ({})", property.name, property.accessor.kind());
                    }
                }
            }
        }
        Command::Settings { action } => {
            let mut store = open_store(settings_path)?;
            match action {
                SettingsAction::Show => {}
                SettingsAction::Reset => {
                    require_file(settings_path, "reset")?;
                    store.reset()?;
                }
                SettingsAction::Set { key, value } => {
                    require_file(settings_path, "set")?;
                    let key =
                        SettingKey::from_name(&key).ok_or_else(|| CliError::Input(format!("unknown setting {key:?}")))?;
                    let change = store.set(key, key.parse_value(&value)?)?;
                    if !cli.json {
                        eprintln!("{} = {}", change.key, change.value);
                    }
                }
            }
            if cli.json {
                println!("{}", store.settings().to_json_pretty()?);
            } else {
                for key in SettingKey::ALL.into_iter().filter(|k| !k.is_host_owned()) {
                    println!("{key} = {}", store.settings().get(key));
                }
            }
        }
        Command::Inject { file, stage, output } => {
            let stage = resolve_stage(stage.as_deref(), &file)?;
            let source = fs::read_to_string(&file)
                .map_err(|e| CliError::Io(format!("failed to read {}: {e}", file.display())))?;
            let store = open_store(settings_path)?;
            let injected = build_injector()?.on_shader_loaded(&source, stage, store.settings())?;

            match &output {
                Some(path) => fs::write(path, &injected.source)
                    .map_err(|e| CliError::Io(format!("failed to write {}: {e}", path.display())))?,
                None if !cli.json => print!("{}", injected.source),
                None => {}
            }

            if cli.json {
                let uniforms: Vec<&str> = injected.uniforms.iter().map(|u| u.name.as_str()).collect();
                let mut info = serde_json::json!({
                    "file": file.display().to_string(),
                    "stage": stage.name(),
                    "defined": injected.defined,
                    "uniforms": uniforms,
                });
                match &output {
                    Some(path) => info["output"] = path.display().to_string().into(),
                    None => info["source"] = injected.source.clone().into(),
                }
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else if let Some(path) = &output {
                eprintln!(
                    "injected {} properties into {} ({stage}) -> {}",
                    injected.defined.len(),
                    file.display(),
                    path.display()
                );
            }
        }
        Command::Simulate {
            width,
            height,
            supersampling,
            frames,
            resize_to,
            params,
        } => {
            let params: serde_json::Value = serde_json::from_str(&params)
                .map_err(|e| CliError::Input(format!("invalid --params JSON: {e}")))?;
            let resize_to = resize_to.as_deref().map(parse_size).transpose()?;
            let simulation = Simulation {
                width,
                height,
                supersampling,
                frames,
                resize_to,
                params,
            };
            let report = simulate::run(&simulation, open_store(settings_path)?)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report.to_json())?);
            } else {
                eprintln!(
                    "simulated {frames} frames at {width}x{height}: {} GPU calls, {} draws, {} leaked handles",
                    report.gpu_calls, report.draw_calls, report.leaked_handles
                );
                for (name, status) in &report.statuses {
                    println!("  {name}: {status}");
                }
            }
        }
    }

    Ok(())
}

fn main() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_secs()
        .try_init();

    let cli = Cli::parse();
    let json_mode = cli.json;
    if let Err(e) = run(cli) {
        if json_mode {
            let j = serde_json::json!({"error": e.to_string(), "exit_code": e.exit_code()});
            eprintln!("{}", serde_json::to_string_pretty(&j).unwrap_or_default());
        } else {
            eprintln!("error: {e}");
        }
        process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("voxshade").chain(args.iter().copied())).expect("valid args")
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_size_accepts_both_separators() {
        assert_eq!(parse_size("1920x1080").ok(), Some((1920, 1080)));
        assert_eq!(parse_size("640X480").ok(), Some((640, 480)));
    }

    #[test]
    fn parse_size_rejects_garbage() {
        for text in ["1920", "x1080", "wide x tall", "-1x5"] {
            let err = parse_size(text).err().expect("should fail");
            assert_eq!(err.exit_code(), 12, "{text}");
        }
    }

    #[test]
    fn stage_falls_back_to_extension_then_fragment() {
        let vsh = Path::new("chunk.vsh");
        assert_eq!(resolve_stage(None, vsh).ok(), Some(ShaderStage::Vertex));
        assert_eq!(resolve_stage(Some("fragment"), vsh).ok(), Some(ShaderStage::Fragment));
        assert_eq!(resolve_stage(None, Path::new("shader.glsl")).ok(), Some(ShaderStage::Fragment));
        assert!(resolve_stage(Some("geometry"), vsh).is_err());
    }

    #[test]
    fn settings_set_requires_a_file() {
        let err = run(cli(&["settings", "set", "ssr_enabled", "false"])).err().expect("no file");
        assert_eq!(err.exit_code(), 12);
    }

    #[test]
    fn settings_set_persists_to_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        let path_arg = path.to_str().expect("utf-8 path");

        run(cli(&["--settings", path_arg, "settings", "set", "ssr_enabled", "false"])).expect("set");

        let store = SettingsStore::load(&path).expect("reload");
        assert!(!store.settings().ssr_enabled, "ssr.enabled should be persisted as false");
    }

    #[test]
    fn settings_set_rejects_unknown_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        let path_arg = path.to_str().expect("utf-8 path");
        let err = run(cli(&["--settings", path_arg, "settings", "set", "bloom_enabled", "true"]))
            .err()
            .expect("unknown key");
        assert_eq!(err.exit_code(), 12);
    }

    #[test]
    fn inject_writes_resolved_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shader = dir.path().join("ssr_out.fsh");
        let output = dir.path().join("out.fsh");
        fs::write(&shader, "#version 330\nfloat f = ${VOLUMETRIC_FLATNESS};\n").expect("write shader");

        run(cli(&[
            "inject",
            shader.to_str().expect("utf-8"),
            "-o",
            output.to_str().expect("utf-8"),
        ]))
        .expect("inject");

        let written = fs::read_to_string(&output).expect("read output");
        assert!(written.starts_with("#version 330"), "version line stays first");
        assert!(!written.contains("${"), "placeholders must be resolved: {written}");
    }

    #[test]
    fn inject_unknown_placeholder_is_input_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shader = dir.path().join("bad.fsh");
        fs::write(&shader, "float f = ${NOT_A_PROPERTY};\n").expect("write shader");
        let err = run(cli(&["inject", shader.to_str().expect("utf-8")])).err().expect("unresolved");
        assert_eq!(err.exit_code(), 12);
    }

    #[test]
    fn inject_missing_file_is_io_error() {
        let err = run(cli(&["inject", "/nonexistent/shader.fsh"])).err().expect("missing");
        assert_eq!(err.exit_code(), 11);
    }

    #[test]
    fn simulate_rejects_bad_params() {
        let err = run(cli(&["simulate", "--params", "{not json"])).err().expect("bad params");
        assert_eq!(err.exit_code(), 12);
    }

    #[test]
    fn simulate_rejects_zero_size() {
        let err = run(cli(&["simulate", "-W", "0", "-H", "10", "--frames", "1"]))
            .err()
            .expect("zero width");
        assert_eq!(err.exit_code(), 10);
    }
}
