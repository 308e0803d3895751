use std::path::PathBuf;

use thiserror::Error;

use crate::types::TaxId;

#[derive(Debug, Error)]
pub enum Error {
    /// An id was absent from the parent map while walking an ancestor chain.
    #[error("unknown taxon id {0}")]
    UnknownTaxon(TaxId),

    /// An explicit insertion reused an id already present in the tree.
    /// Tree integrity cannot be locally repaired; callers abort on this.
    #[error("indistinct taxon id {0} given")]
    DuplicateTaxonId(TaxId),

    /// `add_node` attempted on a tree that already holds `ceiling` nodes.
    #[error("taxonomy holds {size} nodes, at capacity ceiling {ceiling}")]
    CapacityExceeded { size: usize, ceiling: u32 },

    /// Random id probing failed to find a free id within the retry budget.
    #[error("no free taxon id found after {0} probes")]
    IdSpaceExhausted(u32),

    /// A completed file index was observed twice, or a build finished with
    /// the wrong number of reductions. Signals a scheduler bug.
    #[error("scheduler invariant violated: {0}")]
    SchedulerInvariant(String),

    #[error("{}: malformed record at line {}", path.display(), line)]
    Parse { path: PathBuf, line: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
