use std::collections::hash_map::Entry;

use crate::errors::Result;
use crate::taxonomy::Taxonomy;
use crate::types::{FeatureCount, GlobalMap, Signature, SignatureSet, TaxDepth, TaxId};

/// One rule for folding a genome's signature set into the shared global map.
///
/// `update` combines an annotation derived from `taxid` into `map[signature]`
/// for every signature in `set`. The orchestrator guarantees each genome is
/// reduced exactly once; feature counting is not idempotent under
/// re-application.
pub trait ReduceStrategy: Sync {
    fn update(
        &self,
        tax: &Taxonomy,
        set: &SignatureSet,
        taxid: TaxId,
        map: &mut GlobalMap,
    ) -> Result<()>;
}

/// Values are raw taxon ids; a collision stores the lowest common ancestor
/// of the stored taxon and the incoming one.
pub struct LcaUpdate;

impl ReduceStrategy for LcaUpdate {
    fn update(
        &self,
        tax: &Taxonomy,
        set: &SignatureSet,
        taxid: TaxId,
        map: &mut GlobalMap,
    ) -> Result<()> {
        for &sig in set {
            match map.entry(sig) {
                Entry::Vacant(v) => {
                    v.insert(taxid as u64);
                }
                Entry::Occupied(mut o) => {
                    let stored = *o.get() as TaxId;
                    o.insert(tax.lowest_common_ancestor(stored, taxid)? as u64);
                }
            }
        }
        Ok(())
    }
}

/// Values are `TaxDepth` encodings. On collision the shallower (more
/// conservative) taxon wins; on a depth tie the entry becomes the LCA of the
/// two taxa, re-annotated with its own depth.
pub struct TaxDepthUpdate;

impl ReduceStrategy for TaxDepthUpdate {
    fn update(
        &self,
        tax: &Taxonomy,
        set: &SignatureSet,
        taxid: TaxId,
        map: &mut GlobalMap,
    ) -> Result<()> {
        let depth = tax.depth(taxid)?;
        let encoded = TaxDepth::new(depth, taxid).encode();
        for &sig in set {
            match map.entry(sig) {
                Entry::Vacant(v) => {
                    v.insert(encoded);
                }
                Entry::Occupied(mut o) => {
                    let stored = TaxDepth::decode(*o.get());
                    if depth < stored.depth {
                        o.insert(encoded);
                    } else if depth == stored.depth && stored.taxon != taxid {
                        let anc = tax.lowest_common_ancestor(stored.taxon, taxid)?;
                        o.insert(TaxDepth::new(tax.depth(anc)?, anc).encode());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Values are `FeatureCount` encodings: occurrence count across genomes in
/// the high bits, first-seen taxon in the low bits.
pub struct FeatureCountUpdate;

impl ReduceStrategy for FeatureCountUpdate {
    fn update(
        &self,
        _tax: &Taxonomy,
        set: &SignatureSet,
        taxid: TaxId,
        map: &mut GlobalMap,
    ) -> Result<()> {
        for &sig in set {
            match map.entry(sig) {
                Entry::Vacant(v) => {
                    v.insert(FeatureCount::new(1, taxid).encode());
                }
                Entry::Occupied(mut o) => {
                    let mut fc = FeatureCount::decode(*o.get());
                    fc.count = fc.count.saturating_add(1);
                    o.insert(fc.encode());
                }
            }
        }
        Ok(())
    }
}

/// LCA update restricted to a fixed candidate domain (typically the key set
/// of a feature-count map); signatures outside it are ignored.
pub struct MinimizedUpdate {
    candidates: SignatureSet,
}

impl MinimizedUpdate {
    pub fn new(candidates: SignatureSet) -> Self {
        Self { candidates }
    }

    pub fn from_map_keys(full_map: &GlobalMap) -> Self {
        Self {
            candidates: full_map.keys().copied().collect(),
        }
    }
}

impl ReduceStrategy for MinimizedUpdate {
    fn update(
        &self,
        tax: &Taxonomy,
        set: &SignatureSet,
        taxid: TaxId,
        map: &mut GlobalMap,
    ) -> Result<()> {
        for &sig in set {
            if !self.candidates.contains(&sig) {
                continue;
            }
            match map.entry(sig) {
                Entry::Vacant(v) => {
                    v.insert(taxid as u64);
                }
                Entry::Occupied(mut o) => {
                    let stored = *o.get() as TaxId;
                    o.insert(tax.lowest_common_ancestor(stored, taxid)? as u64);
                }
            }
        }
        Ok(())
    }
}

/// Re-annotates an LCA map with taxonomic depths, producing a `TaxDepth`
/// encoded map for the same key set.
pub fn taxdepth_from_lca(lca_map: &GlobalMap, tax: &Taxonomy) -> Result<GlobalMap> {
    let mut out = GlobalMap::with_capacity(lca_map.len());
    for (&sig, &value) in lca_map {
        let taxid = value as TaxId;
        out.insert(sig, TaxDepth::new(tax.depth(taxid)?, taxid).encode());
    }
    Ok(out)
}
