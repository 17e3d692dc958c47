// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! x3d-proto developer CLI.
//!
//! - `replay <trace.jsonl>` feeds a recorded event trace through the
//!   prototype builder and tabulates the declarations it produced.
//! - `types` lists every field type with its multiplicity and VRML97 support.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use x3d_proto::{BuilderConfig, FieldType, ProtoBuilder, StandardNodeFactory, Template};

mod trace;

use trace::TraceLine;

#[derive(Parser, Debug)]
#[command(name = "x3d-proto", author, version, about = "Inspect VRML97/X3D prototype declarations")]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. `debug`, `x3d_proto=trace`)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a JSON-lines event trace through the builder
    Replay {
        /// Trace file, one tagged event per line
        trace: PathBuf,
        /// Builder configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List field types
    Types,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;
    let mut out = std::io::stdout().lock();
    match cli.command {
        Command::Replay { trace, config } => replay(&trace, config.as_deref(), &mut out),
        Command::Types => types(&mut out),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log level `{level}`"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn replay(path: &Path, config: Option<&Path>, out: &mut impl Write) -> Result<()> {
    let config = match config {
        Some(p) => BuilderConfig::load(p)
            .with_context(|| format!("failed to load config {}", p.display()))?,
        None => BuilderConfig::default(),
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read trace {}", path.display()))?;

    let mut builder = ProtoBuilder::with_config(StandardNodeFactory::new(), config);
    let mut events = 0usize;
    for (n, raw) in text.lines().enumerate() {
        let number = n + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let TraceLine {
            line,
            column,
            event,
        } = serde_json::from_str(raw)
            .with_context(|| format!("trace line {number}: malformed event"))?;
        let name = event.name();
        let line = line.unwrap_or_else(|| u32::try_from(number).unwrap_or(u32::MAX));
        builder.set_location(line, column.unwrap_or(0));
        debug!(number, event = name, "replaying");
        event
            .apply(&mut builder)
            .with_context(|| format!("trace line {number}: {name} failed"))?;
        events += 1;
    }
    info!(events, templates = builder.templates().len(), "replay finished");

    writeln!(out, "{}", summary(builder.templates()))?;
    writeln!(
        out,
        "{events} events, {} top-level templates",
        builder.templates().len()
    )?;
    Ok(())
}

fn summary(templates: &[Template]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec![
            "Name", "Kind", "Fields", "Children", "IS", "Routes", "Nested", "URIs",
        ]);
    for template in templates {
        let fields = template.fields().live_count().to_string();
        let row = match template {
            Template::Proto(p) => vec![
                p.name().to_owned(),
                "PROTO".to_owned(),
                fields,
                p.body().child_count().to_string(),
                p.is_bindings().values().map(Vec::len).sum::<usize>().to_string(),
                p.routes().len().to_string(),
                p.nested().len().to_string(),
                "-".to_owned(),
            ],
            Template::Extern(e) => vec![
                e.name().to_owned(),
                "EXTERNPROTO".to_owned(),
                fields,
                "-".to_owned(),
                "-".to_owned(),
                "-".to_owned(),
                "-".to_owned(),
                e.uri_list().join(" "),
            ],
        };
        table.add_row(row);
    }
    table
}

fn types(out: &mut impl Write) -> Result<()> {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Type", "Multiple", "Components", "VRML97"]);
    for ty in FieldType::ALL {
        let components = ty
            .components()
            .map_or_else(|| "-".to_owned(), |c| c.to_string());
        table.add_row(vec![
            ty.name().to_owned(),
            yes_no(ty.is_multi()),
            components,
            yes_no(ty.is_legacy_supported()),
        ]);
    }
    writeln!(out, "{table}")?;
    Ok(())
}

fn yes_no(flag: bool) -> String {
    let text = if flag { "yes" } else { "no" };
    text.to_owned()
}
