use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{CommandFactory, Parser};

use docxgen::config::{resolve_config, CONFIG_ENV_VAR, CONFIG_FILE_NAME};
use docxgen::{Docx, PlaceholderMap, PlaceholderRenderer, SanitizeMode};

#[derive(Parser, Debug)]
#[command(name = "docxgen")]
#[command(about = "Fill {{placeholders}} in .docx templates and attach images", long_about = None)]
struct Args {
    /// Template .docx
    #[arg(value_name = "DOCX")]
    input: Option<PathBuf>,

    /// Output .docx (default: <input_stem>_rendered.docx)
    #[arg(short, long, value_name = "DOCX")]
    output: Option<PathBuf>,

    /// JSON object with placeholder values
    #[arg(long, value_name = "JSON")]
    data: Option<PathBuf>,

    /// Single placeholder value (repeatable; overrides --data)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Image to embed (repeatable)
    #[arg(long = "image", value_name = "REF=PATH")]
    image: Vec<String>,

    /// When to sanitize document XML: off, before or after substitution
    #[arg(long, value_name = "MODE")]
    sanitize: Option<String>,

    /// Leave the extracted workspace on disk
    #[arg(long)]
    keep_workspace: bool,

    /// Config file path (default: search for docxgen.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the placeholders found in the template, then exit
    #[arg(long)]
    inspect: bool,

    /// Sanitize document XML and repack without substitution
    #[arg(long)]
    sanitize_only: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let input = match args.input {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  docxgen <template.docx> -o <out.docx> --data values.json\n\nTIPS:\n  - Default config search: {CONFIG_FILE_NAME} (upwards), or set {CONFIG_ENV_VAR}.\n"
            );
            return Ok(());
        }
    };
    let output = match args.output {
        Some(p) => p,
        None => {
            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output")
                .to_string();
            input.with_file_name(format!("{stem}_rendered.docx"))
        }
    };

    let workdir = input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let (cfg, cfg_path) = resolve_config(args.config.as_deref(), workdir)?;
    let config_dir = cfg_path.as_deref().and_then(Path::parent);

    let mut options = cfg.render_options(config_dir).context("build render options")?;
    if let Some(mode) = args.sanitize.as_deref() {
        options.sanitize = SanitizeMode::parse(mode)
            .ok_or_else(|| anyhow!("invalid --sanitize: {mode} (off|before|after)"))?;
    }
    if args.keep_workspace {
        options.keep_workspace = true;
    }
    let mut renderer = cfg.renderer();

    if args.inspect {
        let report = Docx::with_options(options)
            .inspect(&input)
            .with_context(|| format!("inspect {}", input.display()))?;
        for name in &report.placeholders {
            if report.split.contains(name) {
                println!("{name}\t(split across runs)");
            } else {
                println!("{name}");
            }
        }
        for w in &report.warnings {
            eprintln!("warning: {w}");
        }
        return Ok(());
    }

    let mut data = PlaceholderMap::new();
    let mut images: Vec<(String, PathBuf)> = Vec::new();
    if args.sanitize_only {
        options.sanitize = SanitizeMode::Before;
        renderer = PlaceholderRenderer {
            keep_unknown: true,
            ..renderer
        };
    } else {
        if let Some(path) = args.data.as_deref() {
            data = load_data(path)?;
        }
        for kv in &args.set {
            let (k, v) = split_pair(kv).with_context(|| format!("--set {kv}"))?;
            data.insert(k.to_string(), v.to_string());
        }
        for kv in &args.image {
            let (k, v) = split_pair(kv).with_context(|| format!("--image {kv}"))?;
            images.push((k.to_string(), PathBuf::from(v)));
        }
    }

    let mut docx = Docx::with_options(options).with_renderer(renderer);
    docx.render(&input, &data, &images)
        .with_context(|| format!("render {}", input.display()))?;
    docx.save(&output)
        .with_context(|| format!("save {}", output.display()))?;
    if let Some(ws) = docx.workspace_path().filter(|_| args.keep_workspace) {
        eprintln!("Workspace kept: {}", ws.display());
    }
    eprintln!("Wrote: {}", output.display());
    Ok(())
}

fn split_pair(s: &str) -> anyhow::Result<(&str, &str)> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE"))?;
    let k = k.trim();
    if k.is_empty() {
        return Err(anyhow!("empty key"));
    }
    Ok((k, v))
}

fn load_data(path: &Path) -> anyhow::Result<PlaceholderMap> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read data: {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("parse data json: {}", path.display()))?;
    data_from_json(value)
}

fn data_from_json(value: serde_json::Value) -> anyhow::Result<PlaceholderMap> {
    let serde_json::Value::Object(map) = value else {
        return Err(anyhow!("data json must be an object"));
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let text = match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, text)
        })
        .collect())
}
