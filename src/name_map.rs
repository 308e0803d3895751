use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::errors::{Error, Result};
use crate::types::{TaxId, TAX_UNKNOWN};

/// Reads a tab-separated `(name, taxid)` file, counting duplicate names as
/// synonyms (first binding wins). Blank lines and lines starting with `#`
/// are skipped; extra tab-separated columns after the taxid are ignored.
pub fn read_name_map<R: Read>(reader: R, path: &Path) -> Result<(HashMap<String, TaxId>, u64)> {
    let mut map = HashMap::new();
    let mut n_syn = 0;
    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parse = || -> Option<(&str, TaxId)> {
            let (name, rest) = line.split_once('\t')?;
            let field = rest.split('\t').next().unwrap_or(rest);
            Some((name, field.trim().parse().ok()?))
        };
        let (name, id) = parse().ok_or_else(|| Error::Parse {
            path: path.to_path_buf(),
            line: lineno + 1,
        })?;
        if map.contains_key(name) {
            n_syn += 1;
        } else {
            map.insert(name.to_string(), id);
        }
    }
    Ok((map, n_syn))
}

/// Maps genome identifiers to taxon ids, used to attach a taxon to each
/// processed genome file.
#[derive(Debug)]
pub struct NameResolver {
    map: HashMap<String, TaxId>,
    n_syn: u64,
}

impl NameResolver {
    pub fn new(map: HashMap<String, TaxId>) -> Self {
        Self { map, n_syn: 0 }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let (map, n_syn) = read_name_map(file, path.as_ref())?;
        Ok(Self { map, n_syn })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn synonym_count(&self) -> u64 {
        self.n_syn
    }

    pub fn get(&self, name: &str) -> Option<TaxId> {
        self.map.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TaxId)> {
        self.map.iter().map(|(name, &id)| (name.as_str(), id))
    }

    /// Resolves the taxon for a genome file: tries the full path as written,
    /// then the file name, then the file stem. `None` for a genome missing
    /// from the map (callers log and skip, the miss is not fatal), and also
    /// for an entry carrying the reserved unknown sentinel.
    pub fn resolve_path(&self, path: &Path) -> Option<TaxId> {
        let full = path.to_string_lossy();
        self.get(full.as_ref())
            .or_else(|| path.file_name().and_then(|n| self.get(&n.to_string_lossy())))
            .or_else(|| path.file_stem().and_then(|n| self.get(&n.to_string_lossy())))
            .filter(|&id| id != TAX_UNKNOWN)
    }
}
