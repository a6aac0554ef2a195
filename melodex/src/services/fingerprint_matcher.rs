//! Acoustic fingerprint matcher (C5).
//!
//! Chromaprint fingerprints are parsed once per track, compared pairwise in
//! parallel, and unioned under a single mutex-guarded disjoint-set. Grounded
//! on the atomic-counter/parallel-batch style of
//! `services/workflow_orchestrator/phase_scanning.rs`; the non-reentrant
//! shared-resource-under-a-lock pattern follows `fingerprinter.rs`'s
//! `CHROMAPRINT_LOCK`.

use rayon::prelude::*;
use std::fmt;
use std::sync::Mutex;

/// Minimum fingerprint length (in integers) required for two fingerprints
/// to be compared at all.
pub const MIN_FINGERPRINT_LEN: usize = 10;

/// Default duplicate threshold for fingerprint similarity, in [0,1].
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Parse a Chromaprint raw fingerprint — comma-separated tokens — into
/// signed 32-bit integers. Tokens may be written as unsigned 32-bit values
/// that overflow `i32`; these wrap rather than error, matching
/// Chromaprint's raw integer encoding.
pub fn parse_fingerprint(raw: &str) -> Vec<i32> {
    raw.split(',')
        .filter_map(|tok| {
            let tok = tok.trim();
            if tok.is_empty() {
                return None;
            }
            tok.parse::<i64>().ok().map(|v| v as i32)
        })
        .collect()
}

/// Serialize fingerprint integers back into the comma-separated storage
/// format.
pub fn format_fingerprint(ints: &[i32]) -> String {
    ints.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

/// Pairwise similarity in [0,1]: mean over the shared prefix of
/// `(32 - popcount(a[i] ^ b[i])) / 32`. Fingerprints shorter than
/// `MIN_FINGERPRINT_LEN` are not comparable and yield `None`.
pub fn similarity(a: &[i32], b: &[i32]) -> Option<f64> {
    if a.len() < MIN_FINGERPRINT_LEN || b.len() < MIN_FINGERPRINT_LEN {
        return None;
    }
    let n = a.len().min(b.len());
    let total: f64 = (0..n)
        .map(|i| {
            let xor = (a[i] ^ b[i]) as u32;
            (32 - xor.count_ones()) as f64 / 32.0
        })
        .sum();
    Some(total / n as f64)
}

/// Human-readable comparison trace for a single pair, per §4.5's
/// "comparison breakdown reporter".
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonBreakdown {
    pub len_a: usize,
    pub len_b: usize,
    pub compared_len: usize,
    pub similarity: Option<f64>,
    pub threshold: f64,
    pub duplicate: bool,
}

impl fmt::Display for ComparisonBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.similarity {
            Some(sim) => {
                writeln!(f, "lengths: {} vs {} (compared {})", self.len_a, self.len_b, self.compared_len)?;
                writeln!(f, "similarity: {:.2}%", sim * 100.0)?;
                write!(
                    f,
                    "verdict: {} (threshold {:.2}%)",
                    if self.duplicate { "DUPLICATE" } else { "not duplicate" },
                    self.threshold * 100.0
                )
            }
            None => write!(
                f,
                "lengths: {} vs {} — below minimum comparable length ({})",
                self.len_a, self.len_b, MIN_FINGERPRINT_LEN
            ),
        }
    }
}

pub fn compare(a: &[i32], b: &[i32], threshold: f64) -> ComparisonBreakdown {
    let sim = similarity(a, b);
    ComparisonBreakdown {
        len_a: a.len(),
        len_b: b.len(),
        compared_len: a.len().min(b.len()),
        similarity: sim,
        threshold,
        duplicate: sim.is_some_and(|s| s >= threshold),
    }
}

/// Disjoint-set over index space `[0, n)` with path compression and
/// union-by-rank. All mutation happens under the owning `Mutex` in
/// `group_fingerprints`; `find`/`union` themselves are not `Sync`-safe on
/// their own.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Worker-pool size per §4.5: `min(20, max(2*cores, 8))`.
pub fn worker_count() -> usize {
    let cores = num_cpus::get();
    20.min((2 * cores).max(8))
}

/// One fingerprinted track as seen by the matcher: an index into the
/// caller's track list plus its parsed fingerprint.
pub struct FingerprintedEntry<'a> {
    pub index: usize,
    pub fingerprint: &'a [i32],
}

/// A formed group: original indices bucketed by union-find root, with
/// per-member similarity to the group's first (representative) index.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintGroup {
    pub indices: Vec<usize>,
    /// Aligned with `indices`; `indices[0]` always has similarity `1.0`.
    pub similarities: Vec<f64>,
}

/// Run union-find over all fingerprinted entries, comparing unordered pairs
/// in parallel across `worker_count()` workers, and bucket the result into
/// groups of size >= 2. Pairs below `MIN_FINGERPRINT_LEN` are skipped by
/// `similarity`'s own `None` return, not the caller.
pub fn group_fingerprints(entries: &[FingerprintedEntry<'_>], threshold: f64) -> Vec<FingerprintGroup> {
    let n = entries.len();
    if n < 2 {
        return Vec::new();
    }

    let uf = Mutex::new(UnionFind::new(n));

    let mut pairs = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push((i, j));
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count())
        .build()
        .unwrap_or_else(|_| rayon::ThreadPoolBuilder::new().build().expect("default rayon pool"));

    pool.install(|| {
        pairs.par_iter().for_each(|&(i, j)| {
            if let Some(sim) = similarity(entries[i].fingerprint, entries[j].fingerprint) {
                if sim >= threshold {
                    let mut guard = uf.lock().expect("union-find mutex poisoned");
                    guard.union(i, j);
                }
            }
        });
    });

    let mut guard = uf.lock().expect("union-find mutex poisoned");
    let mut buckets: std::collections::HashMap<usize, Vec<usize>> = std::collections::HashMap::new();
    for i in 0..n {
        let root = guard.find(i);
        buckets.entry(root).or_default().push(entries[i].index);
    }
    drop(guard);

    buckets
        .into_values()
        .filter(|members| members.len() >= 2)
        .map(|mut members| {
            members.sort_unstable();
            let rep = members[0];
            let rep_fp = entries.iter().find(|e| e.index == rep).unwrap().fingerprint;
            let similarities = members
                .iter()
                .map(|&idx| {
                    if idx == rep {
                        1.0
                    } else {
                        let fp = entries.iter().find(|e| e.index == idx).unwrap().fingerprint;
                        similarity(rep_fp, fp).unwrap_or(0.0)
                    }
                })
                .collect();
            FingerprintGroup { indices: members, similarities }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_3_identical_fingerprints_have_similarity_one() {
        let fp = vec![0i32; 12];
        assert_eq!(similarity(&fp, &fp), Some(1.0));
    }

    #[test]
    fn scenario_3_single_bit_flip_reduces_similarity_by_one_over_32n() {
        let a = vec![0i32; 12];
        let mut b = a.clone();
        b[0] = 1; // single low bit flipped
        let sim = similarity(&a, &b).unwrap();
        let expected = 1.0 - (1.0 / 32.0) / 12.0;
        assert!((sim - expected).abs() < 1e-9);
    }

    #[test]
    fn fingerprints_shorter_than_minimum_are_not_compared() {
        let short = vec![0i32; 5];
        let long = vec![0i32; 12];
        assert_eq!(similarity(&short, &long), None);
    }

    #[test]
    fn parse_handles_overflowing_unsigned_tokens() {
        let ints = parse_fingerprint("0,4294967295,123");
        assert_eq!(ints.len(), 3);
        assert_eq!(ints[1], -1i32);
        assert_eq!(ints[2], 123);
    }

    #[test]
    fn format_round_trips_with_parse() {
        let ints = vec![1, -2, 3, i32::MIN, i32::MAX];
        let formatted = format_fingerprint(&ints);
        assert_eq!(parse_fingerprint(&formatted), ints);
    }

    #[test]
    fn scenario_4_transitive_union_forms_one_group_below_pairwise_threshold() {
        // fp0 all zero. fp1 differs from fp0 by 8 bits (lower byte) in each
        // of 4 ints out of 10 -> sim(0,1) = 1 - (32/10)/32 = 0.9 exactly.
        // fp2 differs from fp1 by a disjoint 8 bits (upper byte) in the
        // same 4 ints -> sim(1,2) = 0.9 exactly, and since the two deltas
        // are disjoint, fp0 vs fp2 differs by 16 bits in those 4 ints ->
        // sim(0,2) = 1 - (64/10)/32 = 0.8 exactly. A threshold of 0.85
        // unions (0,1) and (1,2) but not (0,2) directly; the group must
        // still contain all three via transitivity.
        let fp0 = vec![0i32; 10];
        let mut fp1 = fp0.clone();
        for v in fp1.iter_mut().take(4) {
            *v = 0xFF;
        }
        let mut fp2 = fp1.clone();
        for v in fp2.iter_mut().take(4) {
            *v ^= 0xFF00;
        }

        let sim_01 = similarity(&fp0, &fp1).unwrap();
        let sim_12 = similarity(&fp1, &fp2).unwrap();
        let sim_02 = similarity(&fp0, &fp2).unwrap();
        assert!((sim_01 - 0.9).abs() < 1e-9);
        assert!((sim_12 - 0.9).abs() < 1e-9);
        assert!((sim_02 - 0.8).abs() < 1e-9);

        let entries = vec![
            FingerprintedEntry { index: 0, fingerprint: &fp0 },
            FingerprintedEntry { index: 1, fingerprint: &fp1 },
            FingerprintedEntry { index: 2, fingerprint: &fp2 },
        ];
        let groups = group_fingerprints(&entries, 0.85);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].indices, vec![0, 1, 2]);
    }

    #[test]
    fn groups_of_one_are_not_emitted() {
        let a = vec![0i32; 12];
        let mut b = a.clone();
        for v in b.iter_mut() {
            *v = i32::MAX;
        }
        let entries = vec![
            FingerprintedEntry { index: 0, fingerprint: &a },
            FingerprintedEntry { index: 1, fingerprint: &b },
        ];
        let groups = group_fingerprints(&entries, 0.99);
        assert!(groups.is_empty());
    }

    #[test]
    fn representative_always_has_similarity_one() {
        let a = vec![5i32; 15];
        let b = vec![5i32; 15];
        let entries = vec![
            FingerprintedEntry { index: 0, fingerprint: &a },
            FingerprintedEntry { index: 1, fingerprint: &b },
        ];
        let groups = group_fingerprints(&entries, 0.5);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].similarities[0], 1.0);
    }
}
