use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use minitax::table::load_table;
use minitax::types::{FeatureCount, TaxDepth, TaxId};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Decode {
    /// signature <tab> raw 64-bit value
    Raw,
    /// signature <tab> taxon
    Lca,
    /// signature <tab> taxon <tab> depth
    Taxdepth,
    /// signature <tab> taxon <tab> count
    Counts,
}

/// Render a saved signature map table as tab-separated text.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Map table written by build_db
    table: PathBuf,

    #[arg(long, value_enum, default_value_t = Decode::Raw)]
    decode: Decode,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let map = load_table(&args.table)
        .with_context(|| format!("reading map table {}", args.table.display()))?;
    let mut entries: Vec<_> = map.into_iter().collect();
    entries.sort_unstable();

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for (sig, value) in entries {
        match args.decode {
            Decode::Raw => writeln!(out, "{}\t{}", sig, value)?,
            Decode::Lca => writeln!(out, "{}\t{}", sig, value as TaxId)?,
            Decode::Taxdepth => {
                let td = TaxDepth::decode(value);
                writeln!(out, "{}\t{}\t{}", sig, td.taxon, td.depth)?
            }
            Decode::Counts => {
                let fc = FeatureCount::decode(value);
                writeln!(out, "{}\t{}\t{}", sig, fc.taxon, fc.count)?
            }
        }
    }
    out.flush()?;
    Ok(())
}
