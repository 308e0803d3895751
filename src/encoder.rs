use std::collections::VecDeque;
use std::path::Path;

use crate::errors::Result;
use crate::seqreader::{Sequence, SequenceReader};
use crate::types::SignatureSet;

const BITS_PER_CHAR: u32 = 2;

/// MurmurHash3 finalizer, applied to each selected minimizer so that the
/// stored signatures are well mixed regardless of base composition.
pub fn murmur_hash3(key: u64) -> u64 {
    let mut k = key;
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51afd7ed558ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ceb9fe1a85ec53);
    k ^= k >> 33;
    k
}

/// Window configuration for signature extraction: `k`-mer length and the
/// number of consecutive bases per minimizer window. `window == k` emits
/// every k-mer.
#[derive(Debug, Clone, Copy)]
pub struct SpacerConfig {
    pub k: u8,
    pub window: u8,
}

impl SpacerConfig {
    pub fn new(k: u8, window: u8) -> Self {
        if k == 0 || k > 31 {
            panic!("k exceeds size limits for 2-bit packed minimizer scanner");
        }
        if window < k {
            panic!("window must be at least k");
        }
        Self { k, window }
    }

    fn kmer_mask(&self) -> u64 {
        (1u64 << (BITS_PER_CHAR * self.k as u32)) - 1
    }

    /// k-mers spanned by one window.
    fn kmers_per_window(&self) -> usize {
        (self.window - self.k) as usize + 1
    }
}

impl Default for SpacerConfig {
    fn default() -> Self {
        Self { k: 31, window: 31 }
    }
}

/// The sequence-to-signature collaborator: streams one genome file and feeds
/// every emitted signature into the given set. Implementations own their
/// scratch state so one encoder value can process many files sequentially.
pub trait SequenceEncoder: Send {
    fn fill_set(&mut self, path: &Path, set: &mut SignatureSet) -> Result<()>;
}

struct MinimizerData {
    hash: u64,
    pos: usize,
}

/// Default encoder: 2-bit packed k-mers, sliding-window minimizer selection,
/// optional strand-independent (canonical) form, MurmurHash3 finalizer.
pub struct MinimizerEncoder {
    config: SpacerConfig,
    canonical: bool,
    lookup_table: [u8; 256],
    queue: VecDeque<MinimizerData>,
    seq: Sequence,
}

impl MinimizerEncoder {
    pub fn new(config: SpacerConfig, canonical: bool) -> Self {
        let mut lookup_table = [u8::MAX; 256];
        for (ch, code) in [(b'A', 0u8), (b'C', 1), (b'G', 2), (b'T', 3)] {
            lookup_table[ch as usize] = code;
            lookup_table[ch.to_ascii_lowercase() as usize] = code;
        }
        Self {
            config,
            canonical,
            lookup_table,
            queue: VecDeque::new(),
            seq: Sequence::default(),
        }
    }

    fn scan_sequence(&mut self, bases: &[u8], set: &mut SignatureSet) {
        let k = self.config.k as u32;
        let mask = self.config.kmer_mask();
        let m = self.config.kmers_per_window();

        let mut fwd: u64 = 0;
        let mut rc: u64 = 0;
        let mut run: u32 = 0; // valid bases in the current unambiguous run
        let mut kmer_idx: usize = 0;
        self.queue.clear();

        for &b in bases {
            let code = self.lookup_table[b as usize];
            if code == u8::MAX {
                // Ambiguous base: restart the window.
                run = 0;
                kmer_idx = 0;
                self.queue.clear();
                continue;
            }
            fwd = ((fwd << BITS_PER_CHAR) | code as u64) & mask;
            rc = (rc >> BITS_PER_CHAR) | (((3 ^ code) as u64) << (BITS_PER_CHAR * (k - 1)));
            run += 1;
            if run < k {
                continue;
            }

            let key = if self.canonical { fwd.min(rc) } else { fwd };
            let hash = murmur_hash3(key);

            while self.queue.back().is_some_and(|d| d.hash > hash) {
                self.queue.pop_back();
            }
            self.queue.push_back(MinimizerData {
                hash,
                pos: kmer_idx,
            });
            while self.queue.front().is_some_and(|d| d.pos + m <= kmer_idx) {
                self.queue.pop_front();
            }
            if kmer_idx + 1 >= m {
                set.insert(self.queue.front().expect("window nonempty").hash);
            }
            kmer_idx += 1;
        }
    }
}

impl SequenceEncoder for MinimizerEncoder {
    fn fill_set(&mut self, path: &Path, set: &mut SignatureSet) -> Result<()> {
        let mut reader = SequenceReader::open(path)?;
        let mut seq = std::mem::take(&mut self.seq);
        while reader.next_sequence(&mut seq)? {
            self.scan_sequence(&seq.seq, set);
        }
        self.seq = seq;
        Ok(())
    }
}

/// Builds the unique signature set of one genome file. Owns the encoder (and
/// its reusable scratch) for its lifetime, matching the one-builder-per-slot
/// resource model of the concurrent build.
pub struct SignatureSetBuilder<E: SequenceEncoder> {
    encoder: E,
}

impl<E: SequenceEncoder> SignatureSetBuilder<E> {
    pub fn new(encoder: E) -> Self {
        Self { encoder }
    }

    /// Streams `path` through the encoder; duplicate signatures within one
    /// genome collapse. Peak memory is O(distinct signatures in the file).
    pub fn build<P: AsRef<Path>>(&mut self, path: P) -> Result<SignatureSet> {
        let mut set = SignatureSet::new();
        self.encoder.fill_set(path.as_ref(), &mut set)?;
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn encode_kmer(s: &[u8]) -> u64 {
        s.iter().fold(0u64, |acc, &b| {
            (acc << 2)
                | match b {
                    b'A' => 0,
                    b'C' => 1,
                    b'G' => 2,
                    b'T' => 3,
                    _ => unreachable!(),
                }
        })
    }

    fn revcomp(s: &[u8]) -> Vec<u8> {
        s.iter()
            .rev()
            .map(|&b| match b {
                b'A' => b'T',
                b'C' => b'G',
                b'G' => b'C',
                b'T' => b'A',
                _ => b,
            })
            .collect()
    }

    fn scan(config: SpacerConfig, canonical: bool, bases: &[u8]) -> SignatureSet {
        let mut enc = MinimizerEncoder::new(config, canonical);
        let mut set = SignatureSet::new();
        enc.scan_sequence(bases, &mut set);
        set
    }

    #[test]
    fn test_single_kmer() {
        let set = scan(SpacerConfig::new(4, 4), false, b"ACGT");
        assert_eq!(set.len(), 1);
        assert!(set.contains(&murmur_hash3(encode_kmer(b"ACGT"))));
    }

    #[test]
    fn test_duplicates_collapse() {
        let set = scan(SpacerConfig::new(4, 4), false, b"AAAAAA");
        assert_eq!(set.len(), 1);
        assert!(set.contains(&murmur_hash3(0)));
    }

    #[test]
    fn test_ambiguous_base_resets_window() {
        let set = scan(SpacerConfig::new(4, 4), false, b"ACGTNACGT");
        // Both runs yield only the ACGT k-mer.
        assert_eq!(set.len(), 1);
        assert!(set.contains(&murmur_hash3(encode_kmer(b"ACGT"))));
    }

    #[test]
    fn test_window_minimizer_matches_brute_force() {
        let config = SpacerConfig::new(4, 8);
        let bases = b"ACGTACGGTTACGATCCGA";
        let set = scan(config, false, bases);

        let k = 4;
        let m = config.kmers_per_window();
        let hashes: Vec<u64> = (0..=bases.len() - k)
            .map(|i| murmur_hash3(encode_kmer(&bases[i..i + k])))
            .collect();
        let mut expected = SignatureSet::new();
        for w in hashes.windows(m) {
            expected.insert(*w.iter().min().unwrap());
        }
        assert_eq!(set, expected);
    }

    #[test]
    fn test_canonical_is_strand_independent() {
        let config = SpacerConfig::new(5, 9);
        let bases = b"ACGGTTACGATCCGAACGT";
        let fwd = scan(config, true, bases);
        let rev = scan(config, true, &revcomp(bases));
        assert_eq!(fwd, rev);
    }

    #[test]
    fn test_builder_is_deterministic_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.fa");
        fs::write(&path, ">g\nACGTACGGTTACGATCCGA\n").unwrap();

        let mut builder =
            SignatureSetBuilder::new(MinimizerEncoder::new(SpacerConfig::new(6, 10), true));
        let first = builder.build(&path).unwrap();
        let second = builder.build(&path).unwrap();
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_builder_missing_file() {
        let mut builder =
            SignatureSetBuilder::new(MinimizerEncoder::new(SpacerConfig::default(), false));
        assert!(builder.build("no/such/genome.fa").is_err());
    }
}
