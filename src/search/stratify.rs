//! Stratification of a weighted soft stream into ordered partitions.
//!
//! Partitions are solved highest-weight-first; locking in the optimum of the
//! heavy partitions before touching the light ones approximates the
//! lexicographic decomposition of the weighted objective. Two modes exist:
//! the literal-to-distinct-weight ratio walk, and a fixed quantile split.

use crate::encoding::SoftTerm;
use crate::solver::Lit;
use crate::util::options::Options;
use itertools::Itertools;

/// One ordered bucket of soft terms.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    /// Soft terms of this bucket, in descending weight order.
    pub terms: Vec<SoftTerm>,
}

impl Partition {
    /// The soft literals of this bucket.
    pub fn literals(&self) -> Vec<Lit> {
        self.terms.iter().map(|t| t.lit).collect()
    }

    /// Sum of the weights of this bucket.
    pub fn weight(&self) -> u64 {
        self.terms.iter().map(|t| t.weight).sum()
    }
}

/// Partition a soft stream according to the stratification options.
///
/// With `partition_number > 0`, the stream is split into that many
/// near-equal cumulative-weight buckets. Otherwise the literal-to-weight
/// ratio walk applies: weight classes are accumulated in descending order
/// and a partition closes once `literals / distinct weights` reaches
/// `lit_weight_ratio`. Weight classes are never split across partitions in
/// ratio mode.
pub fn stratify(mut terms: Vec<SoftTerm>, options: &Options) -> Vec<Partition> {
    sort_descending(&mut terms);
    if terms.is_empty() {
        return Vec::new();
    }
    if *options.partition_number > 0 {
        fixed_split(terms, *options.partition_number)
    } else {
        ratio_walk(terms, *options.lit_weight_ratio)
    }
}

/// A single partition holding the whole stream, for unstratified runs.
pub fn single_partition(mut terms: Vec<SoftTerm>) -> Vec<Partition> {
    sort_descending(&mut terms);
    if terms.is_empty() {
        Vec::new()
    } else {
        vec![Partition { terms }]
    }
}

fn sort_descending(terms: &mut [SoftTerm]) {
    // stable tie-break on the literal keeps runs reproducible
    terms.sort_by(|a, b| b.weight.cmp(&a.weight).then(a.lit.cmp(&b.lit)));
}

fn ratio_walk(terms: Vec<SoftTerm>, ratio: f64) -> Vec<Partition> {
    let mut out = Vec::new();
    let mut current = Partition::default();
    let mut distinct = 0usize;
    for (_, class) in &terms.into_iter().chunk_by(|t| t.weight) {
        current.terms.extend(class);
        distinct += 1;
        if current.terms.len() as f64 / distinct as f64 >= ratio {
            out.push(std::mem::take(&mut current));
            distinct = 0;
        }
    }
    if !current.terms.is_empty() {
        out.push(current);
    }
    out
}

fn fixed_split(terms: Vec<SoftTerm>, parts: usize) -> Vec<Partition> {
    let total: u64 = terms.iter().map(|t| t.weight).sum();
    let mut out: Vec<Partition> = Vec::with_capacity(parts);
    let mut current = Partition::default();
    let mut consumed = 0u64;
    for term in terms {
        consumed += term.weight;
        current.terms.push(term);
        let filled = out.len() + 1;
        // close once the cumulative weight reaches this bucket's quantile
        if filled < parts && consumed as u128 * parts as u128 >= total as u128 * filled as u128 {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.terms.is_empty() {
        out.push(current);
    }
    out
}
