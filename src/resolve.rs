use std::collections::BTreeSet;

use crate::errors::{Error, Result};
use crate::taxonomy::Taxonomy;
use crate::types::{HitCounts, TaxId, TAX_NO_PARENT};

/// Resolves a set of per-taxon hit weights to the best-supported taxon.
///
/// Each taxon with a nonzero count is scored by its leaf-to-root path: the
/// sum of the counts of the taxon and every ancestor (absent nodes
/// contribute 0). The highest-scoring taxon wins; if several paths tie for
/// the maximum, the answer is the LCA folded across all of them. An empty
/// input resolves to `0`.
pub fn resolve_tree(hit_counts: &HitCounts, tax: &Taxonomy) -> Result<TaxId> {
    let mut max_taxa = BTreeSet::new();
    let mut max_taxon: TaxId = 0;
    let mut max_score: u64 = 0;

    // Sum each taxon's leaf-to-root path.
    for (&taxon, &count) in hit_counts {
        if count == 0 {
            continue;
        }
        let mut score: u64 = 0;
        let mut node = taxon;
        while node != TAX_NO_PARENT {
            score += *hit_counts.get(&node).unwrap_or(&0) as u64;
            node = tax.parent(node).ok_or(Error::UnknownTaxon(node))?;
        }

        if score > max_score {
            max_taxa.clear();
            max_score = score;
            max_taxon = taxon;
        } else if score == max_score {
            if max_taxa.is_empty() {
                max_taxa.insert(max_taxon);
            }
            max_taxa.insert(taxon);
        }
    }

    // If paths are tied for max, return the LCA of all of them.
    if !max_taxa.is_empty() {
        let mut it = max_taxa.iter();
        max_taxon = *it.next().expect("nonempty tie set");
        for &taxon in it {
            max_taxon = tax.lowest_common_ancestor(max_taxon, taxon)?;
        }
    }

    Ok(max_taxon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn fixture() -> Taxonomy {
        // 1 <- 2 (P) <- {4 (A), 5 (B)}, 1 <- 3
        let map = HashMap::from([(2, 1), (3, 1), (4, 2), (5, 2)]);
        Taxonomy::from_parent_map(map, 64)
    }

    #[test]
    fn test_empty_hits_resolve_to_zero() {
        let tax = fixture();
        assert_eq!(resolve_tree(&HitCounts::new(), &tax).unwrap(), 0);
    }

    #[test]
    fn test_single_taxon() {
        let tax = fixture();
        let hits = HitCounts::from([(4, 3)]);
        assert_eq!(resolve_tree(&hits, &tax).unwrap(), 4);
    }

    #[test]
    fn test_sibling_tie_resolves_to_parent() {
        let tax = fixture();
        let hits = HitCounts::from([(4, 5), (5, 5)]);
        assert_eq!(resolve_tree(&hits, &tax).unwrap(), 2);
    }

    #[test]
    fn test_ancestor_counts_feed_descendant_path() {
        let tax = fixture();
        // 2 is an ancestor of 4: path(4) = 10 + 1 = 11, path(2) = 1.
        let hits = HitCounts::from([(4, 10), (2, 1)]);
        assert_eq!(resolve_tree(&hits, &tax).unwrap(), 4);
    }

    #[test]
    fn test_deep_path_beats_shallow() {
        let tax = fixture();
        // path(4) = 4 + 2 = 6, path(3) = 5.
        let hits = HitCounts::from([(4, 4), (2, 2), (3, 5)]);
        assert_eq!(resolve_tree(&hits, &tax).unwrap(), 4);
    }

    #[test]
    fn test_cross_subtree_tie_folds_to_root() {
        let tax = fixture();
        let hits = HitCounts::from([(4, 5), (3, 5)]);
        assert_eq!(resolve_tree(&hits, &tax).unwrap(), 1);
    }

    #[test]
    fn test_unknown_taxon_in_hits() {
        let tax = fixture();
        let hits = HitCounts::from([(99, 5)]);
        assert!(matches!(
            resolve_tree(&hits, &tax),
            Err(Error::UnknownTaxon(99))
        ));
    }
}
