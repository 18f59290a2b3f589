//! Command-line front end for the Lua obfuscator.
//!
//! Reads one or more Lua files, runs each through its own obfuscation
//! pipeline (in parallel when there are several) and writes the results to
//! stdout, a single output file or an output directory.

use anyhow::{bail, Context, Result};
use clap::Parser;
use luacloak_core::{parse, Obfuscator, ObfuscatorConfig, OutputFormat};
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "luacloak", version, about = "Lua source-to-source obfuscator")]
struct Cli {
    /// Lua files to obfuscate
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output file (single input only)
    #[arg(short = 'o', long = "output", conflicts_with = "out_dir")]
    output: Option<PathBuf>,

    /// Directory to write outputs to, keeping the input file names
    #[arg(long = "out-dir")]
    out_dir: Option<PathBuf>,

    /// YAML configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Fixed RNG seed; with several inputs, file N uses seed + N
    #[arg(long)]
    seed: Option<u64>,

    /// Indented multi-line output (skips the anti-tamper check)
    #[arg(long)]
    beautify: bool,

    /// Switch a pass off (repeatable)
    #[arg(long = "disable", value_name = "PASS")]
    disabled: Vec<String>,

    /// Print the parsed tree as JSON and exit
    #[arg(long = "emit-ast")]
    emit_ast: bool,

    /// Debug logging on stderr
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Configuration file (or defaults) with the command-line overrides applied.
fn build_config(cli: &Cli) -> Result<ObfuscatorConfig> {
    let mut config = match &cli.config {
        Some(path) => ObfuscatorConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ObfuscatorConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    if cli.beautify {
        config.output_format = OutputFormat::Readable;
    }
    for pass in &cli.disabled {
        config.passes.set(pass, false)?;
    }
    Ok(config)
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn emit_ast(inputs: &[PathBuf]) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    for path in inputs {
        let block = parse(&read_source(path)?)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        serde_json::to_writer_pretty(&mut stdout, &block)?;
        writeln!(stdout)?;
    }
    Ok(())
}

/// Obfuscate every input; file `index` gets `seed + index` when seeded.
fn obfuscate_all(inputs: &[PathBuf], config: &ObfuscatorConfig) -> Result<Vec<String>> {
    inputs
        .par_iter()
        .enumerate()
        .map(|(index, path)| {
            let mut config = config.clone();
            config.seed = config.seed.map(|seed| seed.wrapping_add(index as u64));
            let source = read_source(path)?;
            debug!(file = %path.display(), bytes = source.len(), "obfuscating");
            Obfuscator::new(config)
                .obfuscate(&source)
                .with_context(|| format!("Failed to obfuscate {}", path.display()))
        })
        .collect()
}

fn write_outputs(cli: &Cli, outputs: &[String]) -> Result<()> {
    if let Some(output) = &cli.output {
        fs::write(output, &outputs[0])
            .with_context(|| format!("Failed to write {}", output.display()))?;
        info!("wrote {}", output.display());
        return Ok(());
    }

    if let Some(dir) = &cli.out_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        for (input, text) in cli.inputs.iter().zip(outputs) {
            let Some(file_name) = input.file_name() else {
                bail!("input {} has no file name", input.display());
            };
            let target = dir.join(file_name);
            fs::write(&target, text)
                .with_context(|| format!("Failed to write {}", target.display()))?;
            info!("wrote {}", target.display());
        }
        return Ok(());
    }

    let mut stdout = std::io::stdout().lock();
    for text in outputs {
        stdout.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.emit_ast {
        return emit_ast(&cli.inputs);
    }

    let config = build_config(&cli)?;
    if cli.output.is_some() && cli.inputs.len() > 1 {
        bail!("--output takes a single input; use --out-dir for several");
    }
    let outputs = obfuscate_all(&cli.inputs, &config)?;
    write_outputs(&cli, &outputs)
}
