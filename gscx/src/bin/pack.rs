//! `gscx-pack`: build a GSCore bundle from module files.
//!
//! ```text
//! gscx-pack modules.gscb cpu libgscx_cpu_cell.so build/libgscx_cpu_cell.so \
//!                        3   recovery/libgscx_recovery.so build/libgscx_recovery.so
//! ```

use anyhow::{Context, bail};
use clap::Parser;
use gscx::bundle::{self, PackInput, kinds};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "gscx-pack")]
#[command(about = "Pack native GSCX modules into a GSCore bundle", long_about = None)]
struct Cli {
    /// Bundle file to write.
    out: PathBuf,

    /// Entries as `<kind> <name> <file>` triples.
    ///
    /// `kind` is a number or one of `cpu`, `gpu`, `recovery`. `name` is the
    /// path inside the bundle and may contain `/`.
    #[arg(required = true, num_args = 3.., value_names = ["KIND", "NAME", "FILE"])]
    entries: Vec<String>,

    /// Format version written to the header.
    #[arg(long, default_value_t = bundle::GSCORE_VERSION)]
    format_version: u16,
}

fn parse_kind(kind: &str) -> anyhow::Result<u16> {
    match kind.to_ascii_lowercase().as_str() {
        "cpu" => Ok(kinds::CPU_CELL),
        "gpu" => Ok(kinds::GPU_RSX),
        "recovery" => Ok(kinds::RECOVERY),
        other => other
            .parse()
            .with_context(|| format!("invalid entry kind: {}", kind)),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.entries.len() % 3 != 0 {
        bail!(
            "entries must be <kind> <name> <file> triples, got {} values",
            cli.entries.len()
        );
    }

    let mut inputs = Vec::with_capacity(cli.entries.len() / 3);
    for triple in cli.entries.chunks(3) {
        let kind = parse_kind(&triple[0])?;
        let name = triple[1].clone();
        let data = std::fs::read(&triple[2]).with_context(|| format!("reading {}", triple[2]))?;
        inputs.push(PackInput::new(kind, name, data));
    }

    let bytes = bundle::pack(cli.format_version, &inputs)?;
    std::fs::write(&cli.out, &bytes).with_context(|| format!("writing {}", cli.out.display()))?;

    println!(
        "Packed {} entries into {} ({} bytes)",
        inputs.len(),
        cli.out.display(),
        bytes.len()
    );
    Ok(())
}
