use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use minitax::build_map::{BuildOptions, MapBuilder};
use minitax::encoder::{MinimizerEncoder, SpacerConfig};
use minitax::name_map::NameResolver;
use minitax::reduce::{FeatureCountUpdate, LcaUpdate, MinimizedUpdate, TaxDepthUpdate};
use minitax::table::write_table;
use minitax::taxonomy::Taxonomy;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    /// Signature -> lowest common ancestor of all carrying genomes
    Lca,
    /// Signature -> (depth, taxon), shallower taxon winning collisions
    Taxdepth,
    /// Signature -> (occurrence count, first-seen taxon)
    Counts,
    /// LCA map restricted to the key set of a first counting pass
    Minimized,
}

/// Build a taxonomic signature database from reference genomes.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// NCBI-style nodes dump defining the taxonomy
    #[arg(short = 'n', long)]
    nodes: PathBuf,

    /// Tab-separated genome name -> taxid map
    #[arg(short = 'm', long)]
    name_map: PathBuf,

    /// Output path for the signature map table
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Also save the taxonomy tree (binary) to this path
    #[arg(short = 't', long)]
    taxonomy_out: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Strategy::Lca)]
    strategy: Strategy,

    /// Length of k-mers
    #[arg(short, default_value_t = 31)]
    k: u8,

    /// Minimizer window size; defaults to k (every k-mer kept)
    #[arg(short, long)]
    window: Option<u8>,

    /// Emit strand-independent (canonical) signatures
    #[arg(short = 'C', long)]
    canonical: bool,

    /// Number of worker threads; defaults to the available cores
    #[arg(short = 'p', long)]
    threads: Option<usize>,

    /// Presize hint for the global map
    #[arg(long, default_value_t = 1 << 10)]
    initial_capacity: usize,

    /// Taxonomy node capacity ceiling; 0 derives it from the input size
    #[arg(long, default_value_t = 0)]
    ceiling: u32,

    /// Reference genome files (FASTA/FASTQ, optionally gzipped)
    #[arg(required = true)]
    genomes: Vec<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut tax = Taxonomy::from_nodes_dump(&args.nodes, args.ceiling)
        .with_context(|| format!("reading nodes dump {}", args.nodes.display()))?;
    let resolver = NameResolver::from_file(&args.name_map)
        .with_context(|| format!("reading name map {}", args.name_map.display()))?;
    for (name, id) in resolver.iter() {
        tax.bind_name(name, id);
    }
    info!(
        "Taxonomy loaded: {} nodes, {} genome names ({} synonyms)",
        tax.node_count(),
        resolver.len(),
        resolver.synonym_count()
    );

    let config = SpacerConfig::new(args.k, args.window.unwrap_or(args.k));
    let threads = args.threads.unwrap_or_else(num_cpus::get);
    let opts = BuildOptions {
        concurrency_limit: threads as i32,
        initial_capacity: args.initial_capacity,
    };
    let make_encoder = || MinimizerEncoder::new(config, args.canonical);

    let map = match args.strategy {
        Strategy::Lca => MapBuilder::new(&tax, &resolver, &LcaUpdate)
            .with_options(opts)
            .build(&args.genomes, make_encoder)?,
        Strategy::Taxdepth => MapBuilder::new(&tax, &resolver, &TaxDepthUpdate)
            .with_options(opts)
            .build(&args.genomes, make_encoder)?,
        Strategy::Counts => MapBuilder::new(&tax, &resolver, &FeatureCountUpdate)
            .with_options(opts)
            .build(&args.genomes, make_encoder)?,
        Strategy::Minimized => {
            let counts = MapBuilder::new(&tax, &resolver, &FeatureCountUpdate)
                .with_options(opts)
                .build(&args.genomes, make_encoder)?;
            info!("Counting pass done: {} candidate signatures", counts.len());
            let minimized = MinimizedUpdate::from_map_keys(&counts);
            MapBuilder::new(&tax, &resolver, &minimized)
                .with_options(opts)
                .build(&args.genomes, make_encoder)?
        }
    };
    info!(
        "Built map with {} entries from {} genomes",
        map.len(),
        args.genomes.len()
    );

    write_table(&map, &args.output)
        .with_context(|| format!("writing map table {}", args.output.display()))?;
    if let Some(path) = &args.taxonomy_out {
        tax.save(path)
            .with_context(|| format!("writing taxonomy {}", path.display()))?;
    }
    Ok(())
}
