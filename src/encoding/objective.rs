//! Linear objective functions over the encoded model.
//!
//! Each objective is a weighted sum of literals with integer numerator
//! weights over one common denominator. Wastage is carried as two
//! objectives, a minimized numerator and a maximized denominator; how the
//! two are linearised for the search is decided here (merged into one soft
//! stream, or split into two streams the driver alternates between).

use crate::error::{CoreError, Result};
use crate::model::ObjectiveVector;
use crate::solver::{Lit, Var};
use crate::util::rational::{lcm, Rational};
use crate::util::options::Options;
use enum_map::{Enum, EnumMap};

/// The objective dimensions of the encoded model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum ObjectiveKind {
    /// Total energy cost. Minimized.
    Energy,
    /// Wastage numerator (resource imbalance). Minimized.
    WastageNum,
    /// Wastage denominator (resource utilization). Maximized.
    WastageDen,
    /// Total memory moved. Minimized.
    Migration,
}

impl ObjectiveKind {
    /// Whether larger sums are better for this dimension.
    pub fn is_maximized(self) -> bool {
        matches!(self, ObjectiveKind::WastageDen)
    }
}

/// One soft literal: satisfying `lit` improves the owning objective by
/// `weight` on the stream's common scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftTerm {
    /// The literal whose satisfaction improves the objective.
    pub lit: Lit,
    /// Improvement granted, always positive.
    pub weight: u64,
}

/// A weighted sum `Σ termᵢ / denominator` with non-negative integer
/// numerator weights.
#[derive(Debug, Clone, Default)]
pub struct Objective {
    /// Weighted literals; weights are positive.
    pub terms: Vec<(Lit, i64)>,
    /// Common denominator, positive.
    pub denominator: i64,
}

impl Objective {
    /// Build from rational weights by clearing to the least common
    /// denominator. Zero-weight terms are dropped; overflow is an error.
    pub fn from_rational_terms(terms: Vec<(Lit, Rational)>) -> Result<Objective> {
        let mut den = 1i64;
        for (_, w) in &terms {
            den = lcm(den, w.denominator()).ok_or(CoreError::EncodingOverflow)?;
        }
        let mut out = Vec::new();
        let mut total: i128 = 0;
        for (lit, w) in terms {
            debug_assert!(w.numerator() >= 0);
            if w.is_zero() {
                continue;
            }
            let num = w
                .numerator()
                .checked_mul(den / w.denominator())
                .ok_or(CoreError::EncodingOverflow)?;
            total += num as i128;
            out.push((lit, num));
        }
        if total > i64::MAX as i128 {
            return Err(CoreError::EncodingOverflow);
        }
        Ok(Objective { terms: out, denominator: den })
    }

    /// The equivalent integer-weight objective, denominators multiplied
    /// through.
    pub fn reduce(&self) -> Vec<(Lit, i64)> {
        self.terms.clone()
    }

    /// Integer numerator value under a model.
    pub fn integer_value<F: Fn(Var) -> bool>(&self, model: &F) -> i64 {
        self.terms
            .iter()
            .filter(|(l, _)| l.is_negative() != model(l.var()))
            .map(|(_, w)| w)
            .sum()
    }

    /// Whether the objective has no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// The objectives of one encoded instance.
#[derive(Debug, Clone)]
pub struct ObjectiveSet {
    objectives: EnumMap<ObjectiveKind, Option<Objective>>,
}

impl ObjectiveSet {
    /// Assemble the set. `migration` is absent when the instance carries no
    /// current mapping.
    pub fn new(
        energy: Objective,
        wastage_num: Objective,
        wastage_den: Objective,
        migration: Option<Objective>,
    ) -> ObjectiveSet {
        let mut objectives: EnumMap<ObjectiveKind, Option<Objective>> = EnumMap::default();
        objectives[ObjectiveKind::Energy] = Some(energy);
        objectives[ObjectiveKind::WastageNum] = Some(wastage_num);
        objectives[ObjectiveKind::WastageDen] = Some(wastage_den);
        objectives[ObjectiveKind::Migration] = migration;
        ObjectiveSet { objectives }
    }

    /// The objective of a dimension, if present.
    pub fn get(&self, kind: ObjectiveKind) -> Option<&Objective> {
        self.objectives[kind].as_ref()
    }

    /// Whether migration is an objective of this instance.
    pub fn has_migration(&self) -> bool {
        self.objectives[ObjectiveKind::Migration].is_some()
    }

    /// Evaluate all dimensions under a model, applying the reference
    /// semantics: wastage is the numerator-to-denominator ratio unless
    /// `ignore_den_eval` reduces it to the numerator alone.
    pub fn evaluate<F: Fn(Var) -> bool>(
        &self,
        model: &F,
        ignore_den_eval: bool,
    ) -> Result<ObjectiveVector> {
        let energy = self.objectives[ObjectiveKind::Energy].as_ref().unwrap();
        let num = self.objectives[ObjectiveKind::WastageNum].as_ref().unwrap();
        let den = self.objectives[ObjectiveKind::WastageDen].as_ref().unwrap();

        let energy_value = Rational::new(energy.integer_value(model), energy.denominator);
        let n = num.integer_value(model);
        let d = den.integer_value(model);
        let wastage_value = if ignore_den_eval {
            Rational::new(n, num.denominator)
        } else if d == 0 {
            Rational::ZERO
        } else {
            // (n/den_n) / (d/den_d) with the intermediate products checked
            let lhs = (n as i128) * (den.denominator as i128);
            let rhs = (d as i128) * (num.denominator as i128);
            let lhs = i64::try_from(lhs).map_err(|_| CoreError::EncodingOverflow)?;
            let rhs = i64::try_from(rhs).map_err(|_| CoreError::EncodingOverflow)?;
            Rational::new(lhs, rhs)
        };
        let migration = self.objectives[ObjectiveKind::Migration]
            .as_ref()
            .map(|m| m.integer_value(model) as u64);
        Ok(ObjectiveVector { energy: energy_value, wastage: wastage_value, migration })
    }

    /// Soft terms of one dimension: the literal polarity whose satisfaction
    /// improves the dimension.
    pub fn soft_terms(&self, kind: ObjectiveKind) -> Vec<SoftTerm> {
        let Some(obj) = self.objectives[kind].as_ref() else {
            return Vec::new();
        };
        obj.terms
            .iter()
            .map(|&(lit, w)| SoftTerm {
                lit: if kind.is_maximized() { lit } else { !lit },
                weight: w as u64,
            })
            .collect()
    }

    /// One soft stream with every dimension on a common weight scale
    /// (the *merged* division strategy).
    pub fn division_merged(&self, options: &Options) -> Result<Vec<SoftTerm>> {
        let mut streams = vec![
            self.scaled_softs(ObjectiveKind::Energy)?,
            self.scaled_softs(ObjectiveKind::WastageNum)?,
        ];
        if !*options.ignore_den_alloc {
            streams.push(self.scaled_softs(ObjectiveKind::WastageDen)?);
        }
        if self.has_migration() {
            streams.push(self.scaled_softs(ObjectiveKind::Migration)?);
        }
        Ok(merge_scaled(streams)?)
    }

    /// Two independent soft streams, minimization-side and
    /// denominator-side, for the *split* division strategy.
    pub fn division_split(&self, options: &Options) -> Result<(Vec<SoftTerm>, Vec<SoftTerm>)> {
        let mut minimized = vec![
            self.scaled_softs(ObjectiveKind::Energy)?,
            self.scaled_softs(ObjectiveKind::WastageNum)?,
        ];
        if self.has_migration() {
            minimized.push(self.scaled_softs(ObjectiveKind::Migration)?);
        }
        let denominator = if *options.ignore_den_alloc {
            Vec::new()
        } else {
            self.scaled_softs(ObjectiveKind::WastageDen)?.0
        };
        Ok((merge_scaled(minimized)?, denominator))
    }

    fn scaled_softs(&self, kind: ObjectiveKind) -> Result<(Vec<SoftTerm>, i64)> {
        let den = self.objectives[kind].as_ref().map(|o| o.denominator).unwrap_or(1);
        Ok((self.soft_terms(kind), den))
    }
}

/// Rescale per-objective soft streams onto one common denominator and
/// concatenate them.
fn merge_scaled(streams: Vec<(Vec<SoftTerm>, i64)>) -> Result<Vec<SoftTerm>> {
    let mut common = 1i64;
    for (_, den) in &streams {
        common = lcm(common, *den).ok_or(CoreError::EncodingOverflow)?;
    }
    let mut out = Vec::new();
    for (softs, den) in streams {
        let factor = (common / den) as u64;
        for s in softs {
            let weight = s.weight.checked_mul(factor).ok_or(CoreError::EncodingOverflow)?;
            out.push(SoftTerm { lit: s.lit, weight });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::Var;

    fn lit(v: u32) -> Lit {
        Lit::positive(Var(v))
    }

    #[test]
    fn rational_terms_share_a_denominator() {
        let obj = Objective::from_rational_terms(vec![
            (lit(0), Rational::new(1, 2)),
            (lit(1), Rational::new(1, 3)),
            (lit(2), Rational::ZERO),
        ])
        .unwrap();
        assert_eq!(obj.denominator, 6);
        assert_eq!(obj.terms, vec![(lit(0), 3), (lit(1), 2)]);
    }

    #[test]
    fn integer_value_counts_true_literals() {
        let obj = Objective { terms: vec![(lit(0), 3), (!lit(1), 2)], denominator: 1 };
        let model = |v: Var| v == Var(0);
        // lit(0) true contributes 3; !lit(1) true (var 1 false) contributes 2
        assert_eq!(obj.integer_value(&model), 5);
    }

    #[test]
    fn soft_polarity_follows_sense() {
        let energy = Objective { terms: vec![(lit(0), 1)], denominator: 1 };
        let num = Objective { terms: vec![(lit(1), 1)], denominator: 1 };
        let den = Objective { terms: vec![(lit(2), 1)], denominator: 1 };
        let set = ObjectiveSet::new(energy, num, den, None);
        assert_eq!(set.soft_terms(ObjectiveKind::Energy)[0].lit, !lit(0));
        assert_eq!(set.soft_terms(ObjectiveKind::WastageDen)[0].lit, lit(2));
    }

    #[test]
    fn merged_stream_rescales_weights() {
        let energy = Objective { terms: vec![(lit(0), 1)], denominator: 2 };
        let num = Objective { terms: vec![(lit(1), 1)], denominator: 3 };
        let den = Objective { terms: vec![(lit(2), 5)], denominator: 6 };
        let set = ObjectiveSet::new(energy, num, den, None);
        let options = Options::default();
        let merged = set.division_merged(&options).unwrap();
        // common denominator 6: weights 3, 2, 5
        let weights: Vec<u64> = merged.iter().map(|s| s.weight).collect();
        assert_eq!(weights, vec![3, 2, 5]);
    }

    #[test]
    fn evaluate_forms_the_ratio() {
        let energy = Objective { terms: vec![(lit(0), 3)], denominator: 2 };
        let num = Objective { terms: vec![(lit(1), 1)], denominator: 1 };
        let den = Objective { terms: vec![(lit(1), 4)], denominator: 1 };
        let set = ObjectiveSet::new(energy, num, den, None);
        let model = |_: Var| true;
        let v = set.evaluate(&model, false).unwrap();
        assert_eq!(v.energy, Rational::new(3, 2));
        assert_eq!(v.wastage, Rational::new(1, 4));
        assert_eq!(v.migration, None);
        let relaxed = set.evaluate(&model, true).unwrap();
        assert_eq!(relaxed.wastage, Rational::new(1, 1));
    }
}
