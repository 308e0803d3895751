use std::path::PathBuf;
use std::thread;

use crossbeam_channel::bounded;
use log::{debug, warn};

use crate::encoder::{SequenceEncoder, SignatureSetBuilder};
use crate::errors::{Error, Result};
use crate::name_map::NameResolver;
use crate::reduce::ReduceStrategy;
use crate::taxonomy::Taxonomy;
use crate::types::{GlobalMap, SignatureSet};

const DEFAULT_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// In-flight worker count; non-positive selects the default of 16.
    /// Always clamped to the number of input files.
    pub concurrency_limit: i32,
    /// Presize hint for the global map.
    pub initial_capacity: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: -1,
            initial_capacity: 1 << 10,
        }
    }
}

impl BuildOptions {
    fn workers(&self, file_count: usize) -> usize {
        let limit = if self.concurrency_limit < 1 {
            DEFAULT_CONCURRENCY
        } else {
            self.concurrency_limit as usize
        };
        limit.min(file_count)
    }
}

/// Drives genome files through parallel signature extraction and folds each
/// completed set into one global map.
///
/// Worker threads pull `(file_index, path)` jobs from a shared channel; each
/// worker owns one reusable encoder for its lifetime. Completed sets flow
/// through a bounded results channel and are reduced strictly one at a time
/// on the calling thread, in completion order, so the map needs no lock.
/// Workers never touch the map.
pub struct MapBuilder<'a, S: ReduceStrategy> {
    taxonomy: &'a Taxonomy,
    resolver: &'a NameResolver,
    strategy: &'a S,
    opts: BuildOptions,
}

impl<'a, S: ReduceStrategy> MapBuilder<'a, S> {
    pub fn new(taxonomy: &'a Taxonomy, resolver: &'a NameResolver, strategy: &'a S) -> Self {
        Self {
            taxonomy,
            resolver,
            strategy,
            opts: BuildOptions::default(),
        }
    }

    pub fn with_options(mut self, opts: BuildOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Processes every file exactly once and returns the finished map.
    ///
    /// `make_encoder` is invoked once per worker; the encoder moves into that
    /// worker and is reused across all files the worker picks up. A genome
    /// whose taxon cannot be resolved is logged and skipped; any I/O or
    /// encoder failure aborts the whole build.
    pub fn build<E, F>(&self, files: &[PathBuf], mut make_encoder: F) -> Result<GlobalMap>
    where
        E: SequenceEncoder,
        F: FnMut() -> E,
    {
        let todo = files.len();
        if todo == 0 {
            return Ok(GlobalMap::with_capacity(self.opts.initial_capacity));
        }
        let workers = self.opts.workers(todo);
        debug!("Building map over {} files with {} workers", todo, workers);

        let mut builders: Vec<SignatureSetBuilder<E>> = (0..workers)
            .map(|_| SignatureSetBuilder::new(make_encoder()))
            .collect();

        thread::scope(|s| {
            let (job_tx, job_rx) = bounded::<(usize, &PathBuf)>(todo);
            for job in files.iter().enumerate() {
                job_tx.send(job).expect("job channel sized to file count");
            }
            drop(job_tx);

            // Completed-but-unreduced sets are capped at the worker count.
            let (res_tx, res_rx) = bounded::<(usize, Result<SignatureSet>)>(workers);

            for mut builder in builders.drain(..) {
                let job_rx = job_rx.clone();
                let res_tx = res_tx.clone();
                s.spawn(move || {
                    while let Ok((index, path)) = job_rx.recv() {
                        let result = builder.build(path);
                        let errored = result.is_err();
                        if res_tx.send((index, result)).is_err() || errored {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(res_tx);

            let mut map = GlobalMap::with_capacity(self.opts.initial_capacity);
            let mut consumed = vec![false; todo];
            let mut n_consumed = 0usize;

            for (index, result) in res_rx.iter() {
                if std::mem::replace(&mut consumed[index], true) {
                    return Err(Error::SchedulerInvariant(format!(
                        "file index {} completed twice",
                        index
                    )));
                }
                let set = result?;
                n_consumed += 1;
                debug!(
                    "Set of size {} filled from genome at {} ({}/{} done, map size {})",
                    set.len(),
                    files[index].display(),
                    n_consumed,
                    todo,
                    map.len()
                );
                match self.resolver.resolve_path(&files[index]) {
                    Some(taxid) => {
                        self.strategy.update(self.taxonomy, &set, taxid, &mut map)?
                    }
                    None => warn!(
                        "Taxid for {} not listed in name map. Not including.",
                        files[index].display()
                    ),
                }
                drop(set);
            }

            if n_consumed != todo {
                return Err(Error::SchedulerInvariant(format!(
                    "consumed {} of {} results",
                    n_consumed, todo
                )));
            }
            Ok(map)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::{FeatureCountUpdate, LcaUpdate};
    use crate::types::{FeatureCount, Signature, TaxId};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test double emitting a fixed signature list per path.
    struct FixedEncoder {
        table: HashMap<PathBuf, Vec<Signature>>,
    }

    impl SequenceEncoder for FixedEncoder {
        fn fill_set(&mut self, path: &Path, set: &mut SignatureSet) -> Result<()> {
            let sigs = self.table.get(path).ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    path.display().to_string(),
                ))
            })?;
            set.extend(sigs.iter().copied());
            Ok(())
        }
    }

    struct CountingStrategy(AtomicUsize);

    impl ReduceStrategy for CountingStrategy {
        fn update(
            &self,
            _tax: &Taxonomy,
            _set: &SignatureSet,
            _taxid: TaxId,
            _map: &mut GlobalMap,
        ) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fixture_tax() -> Taxonomy {
        Taxonomy::from_parent_map(HashMap::from([(2, 1), (3, 1), (4, 2), (5, 2)]), 64)
    }

    fn scenario(
        genomes: &[(&str, TaxId, &[Signature])],
    ) -> (Vec<PathBuf>, NameResolver, HashMap<PathBuf, Vec<Signature>>) {
        let mut files = Vec::new();
        let mut names = HashMap::new();
        let mut table = HashMap::new();
        for &(name, taxid, sigs) in genomes {
            let path = PathBuf::from(name);
            names.insert(name.to_string(), taxid);
            table.insert(path.clone(), sigs.to_vec());
            files.push(path);
        }
        (files, NameResolver::new(names), table)
    }

    fn opts(limit: i32) -> BuildOptions {
        BuildOptions {
            concurrency_limit: limit,
            ..BuildOptions::default()
        }
    }

    #[test]
    fn test_empty_file_list() {
        let tax = fixture_tax();
        let (_, resolver, table) = scenario(&[]);
        let map = MapBuilder::new(&tax, &resolver, &LcaUpdate)
            .build(&[], || FixedEncoder { table: table.clone() })
            .unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_lca_build_is_concurrency_independent() {
        let tax = fixture_tax();
        let genomes: &[(&str, TaxId, &[Signature])] = &[
            ("a.fa", 4, &[10, 20, 30]),
            ("b.fa", 5, &[10, 40]),
            ("c.fa", 3, &[20, 40, 50]),
            ("d.fa", 2, &[30, 50]),
            ("e.fa", 4, &[60]),
            ("f.fa", 5, &[60, 10]),
        ];
        let (files, resolver, table) = scenario(genomes);

        let serial = MapBuilder::new(&tax, &resolver, &LcaUpdate)
            .with_options(opts(1))
            .build(&files, || FixedEncoder { table: table.clone() })
            .unwrap();
        let parallel = MapBuilder::new(&tax, &resolver, &LcaUpdate)
            .with_options(opts(8))
            .build(&files, || FixedEncoder { table: table.clone() })
            .unwrap();

        assert_eq!(serial, parallel);
        assert_eq!(serial[&20], 1); // 4 and 3 only share the root
        assert_eq!(serial[&10], 2); // 4, 5, 5 fold to their parent
    }

    #[test]
    fn test_feature_counts_match_genome_multiplicity() {
        let tax = fixture_tax();
        let genomes: &[(&str, TaxId, &[Signature])] = &[
            ("a.fa", 4, &[10, 20]),
            ("b.fa", 5, &[10]),
            ("c.fa", 3, &[10, 20]),
        ];
        let (files, resolver, table) = scenario(genomes);

        let map = MapBuilder::new(&tax, &resolver, &FeatureCountUpdate)
            .with_options(opts(2))
            .build(&files, || FixedEncoder { table: table.clone() })
            .unwrap();

        assert_eq!(FeatureCount::decode(map[&10]).count, 3);
        assert_eq!(FeatureCount::decode(map[&20]).count, 2);
    }

    #[test]
    fn test_exactly_one_reduction_per_file() {
        let tax = fixture_tax();
        let genomes: Vec<(String, TaxId, Vec<Signature>)> = (0..7)
            .map(|i| (format!("g{}.fa", i), 2 + (i % 4) as TaxId, vec![i as u64]))
            .collect();
        let borrowed: Vec<(&str, TaxId, &[Signature])> = genomes
            .iter()
            .map(|(n, t, s)| (n.as_str(), *t, s.as_slice()))
            .collect();
        let (files, resolver, table) = scenario(&borrowed);

        for limit in [1, files.len() as i32, files.len() as i32 * 10] {
            let strategy = CountingStrategy(AtomicUsize::new(0));
            MapBuilder::new(&tax, &resolver, &strategy)
                .with_options(opts(limit))
                .build(&files, || FixedEncoder { table: table.clone() })
                .unwrap();
            assert_eq!(strategy.0.load(Ordering::SeqCst), files.len());
        }
    }

    #[test]
    fn test_unresolved_name_is_skipped() {
        let tax = fixture_tax();
        let (mut files, resolver, mut table) =
            scenario(&[("a.fa", 4, &[10][..]), ("b.fa", 5, &[20][..])]);
        // A genome absent from the name map still gets processed, but its
        // signatures are not included.
        files.push(PathBuf::from("stranger.fa"));
        table.insert(PathBuf::from("stranger.fa"), vec![30]);

        let map = MapBuilder::new(&tax, &resolver, &LcaUpdate)
            .with_options(opts(2))
            .build(&files, || FixedEncoder { table: table.clone() })
            .unwrap();
        assert_eq!(map.len(), 2);
        assert!(!map.contains_key(&30));
    }

    #[test]
    fn test_worker_failure_aborts_build() {
        let tax = fixture_tax();
        let (mut files, resolver, table) = scenario(&[("a.fa", 4, &[10][..])]);
        files.push(PathBuf::from("missing.fa")); // not in the encoder table

        let err = MapBuilder::new(&tax, &resolver, &LcaUpdate)
            .with_options(opts(2))
            .build(&files, || FixedEncoder { table: table.clone() })
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
