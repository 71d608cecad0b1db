//! The non-dominated archive.
//!
//! An insertion-ordered set of objective vectors, each with a placement
//! witness. Insertion prunes entries the newcomer dominates and rejects
//! newcomers that are dominated or already present; the archive is therefore
//! an antichain under Pareto dominance at all times. The dump format uses
//! exact rationals so that reload preserves every entry bit for bit.

use crate::error::{CoreError, Result};
use crate::model::{ObjectiveVector, Placement};
use crate::util::rational::Rational;
use rand::Rng;
use std::io::Write;

/// Result of one insertion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The entry was added; dominated entries were pruned.
    Inserted,
    /// An existing entry dominates the candidate.
    Dominated,
    /// Vector and witness are already present.
    Duplicate,
}

/// One archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// The objective vector.
    pub vector: ObjectiveVector,
    /// A placement achieving it.
    pub witness: Placement,
}

/// The ordered non-dominated set.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    entries: Vec<ArchiveEntry>,
}

impl Archive {
    /// An empty archive.
    pub fn new() -> Archive {
        Archive::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry exists.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.iter()
    }

    /// Whether a vector is present.
    pub fn contains(&self, vector: &ObjectiveVector) -> bool {
        self.entries.iter().any(|e| e.vector == *vector)
    }

    /// Insert a vector with its witness, pruning dominated entries.
    pub fn insert(&mut self, vector: ObjectiveVector, witness: Placement) -> InsertOutcome {
        if self
            .entries
            .iter()
            .any(|e| e.vector == vector && e.witness == witness)
        {
            return InsertOutcome::Duplicate;
        }
        if self.entries.iter().any(|e| e.vector.dominates(&vector)) {
            return InsertOutcome::Dominated;
        }
        self.entries.retain(|e| !vector.dominates(&e.vector));
        self.entries.push(ArchiveEntry { vector, witness });
        InsertOutcome::Inserted
    }

    /// A uniformly sampled entry, used to seed path diversification.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<&ArchiveEntry> {
        if self.entries.is_empty() {
            None
        } else {
            Some(&self.entries[rng.random_range(0..self.entries.len())])
        }
    }

    /// Serialise every entry, one `v` line each.
    pub fn dump<W: Write>(&self, w: &mut W) -> Result<()> {
        for e in &self.entries {
            write!(
                w,
                "v {}/{} {}/{}",
                e.vector.energy.numerator(),
                e.vector.energy.denominator(),
                e.vector.wastage.numerator(),
                e.vector.wastage.denominator()
            )?;
            if let Some(m) = e.vector.migration {
                write!(w, " {m}")?;
            }
            write!(w, " p")?;
            for &pm in &e.witness.0 {
                write!(w, " {pm}")?;
            }
            writeln!(w)?;
        }
        Ok(())
    }

    /// Reload a dump produced by [`dump`](Archive::dump).
    pub fn load(text: &str) -> Result<Archive> {
        let mut archive = Archive::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = lineno + 1;
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let mut fields = raw.split_ascii_whitespace();
            if fields.next() != Some("v") {
                return Err(CoreError::Parse { line, msg: "expected a v line".into() });
            }
            let energy = parse_rational(line, fields.next())?;
            let wastage = parse_rational(line, fields.next())?;
            let mut fields = fields.peekable();
            let migration = match fields.peek() {
                Some(&"p") => None,
                Some(_) => {
                    let m = fields.next().unwrap();
                    Some(m.parse().map_err(|_| CoreError::Parse {
                        line,
                        msg: format!("bad migration value {m:?}"),
                    })?)
                }
                None => return Err(CoreError::Parse { line, msg: "truncated entry".into() }),
            };
            if fields.next() != Some("p") {
                return Err(CoreError::Parse { line, msg: "missing placement marker".into() });
            }
            let mut witness = Vec::new();
            for f in fields {
                witness.push(f.parse().map_err(|_| CoreError::Parse {
                    line,
                    msg: format!("bad placement field {f:?}"),
                })?);
            }
            archive
                .entries
                .push(ArchiveEntry {
                    vector: ObjectiveVector { energy, wastage, migration },
                    witness: Placement(witness),
                });
        }
        Ok(archive)
    }
}

fn parse_rational(line: usize, field: Option<&str>) -> Result<Rational> {
    let field = field.ok_or(CoreError::Parse { line, msg: "truncated entry".into() })?;
    let (num, den) = field
        .split_once('/')
        .ok_or_else(|| CoreError::Parse { line, msg: format!("bad rational {field:?}") })?;
    let num = num
        .parse()
        .map_err(|_| CoreError::Parse { line, msg: format!("bad rational {field:?}") })?;
    let den = den
        .parse()
        .map_err(|_| CoreError::Parse { line, msg: format!("bad rational {field:?}") })?;
    if den == 0 {
        return Err(CoreError::Parse { line, msg: format!("bad rational {field:?}") });
    }
    Ok(Rational::new(num, den))
}
