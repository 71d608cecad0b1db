//! Multi-objective OPB serialisation of an encoded instance.
//!
//! The dump carries one `min:` line per objective (the maximized wastage
//! denominator is emitted with negated coefficients), followed by the hard
//! set: clauses as `>= 1` rows over literals, linear constraints verbatim.
//! Negated literals use the `~x` syntax. By default coefficients are the
//! denominator-cleared integers; `decimal_coefficients` prints the rational
//! weights as decimals instead.

use crate::encoding::encoder::Encoding;
use crate::encoding::objective::ObjectiveKind;
use crate::error::Result;
use crate::solver::Lit;
use crate::util::constants::OBJECTIVE_DECIMALS;
use crate::util::options::Options;
use std::io::Write;

fn lit_token(l: Lit) -> String {
    if l.is_negative() {
        format!("~x{}", l.var().0 + 1)
    } else {
        format!("x{}", l.var().0 + 1)
    }
}

fn objective_line<W: Write>(
    w: &mut W,
    terms: &[(Lit, i64)],
    denominator: i64,
    negate: bool,
    decimal: bool,
) -> Result<()> {
    write!(w, "min:")?;
    for &(lit, num) in terms {
        let num = if negate { -num } else { num };
        if decimal {
            let value = num as f64 / denominator as f64;
            write!(w, " {}{:.*} {}", if value >= 0.0 { "+" } else { "" }, OBJECTIVE_DECIMALS, value, lit_token(lit))?;
        } else {
            write!(w, " {}{} {}", if num >= 0 { "+" } else { "" }, num, lit_token(lit))?;
        }
    }
    writeln!(w, " ;")?;
    Ok(())
}

/// Serialise the encoded problem as a multi-objective OPB document.
pub fn write_mopb<W: Write>(encoding: &Encoding, options: &Options, w: &mut W) -> Result<()> {
    writeln!(
        w,
        "* #variable= {} #constraint= {}",
        encoding.num_vars(),
        encoding.clauses.len() + encoding.pbs.len()
    )?;

    let decimal = *options.decimal_coefficients;
    let mut kinds = vec![ObjectiveKind::Energy, ObjectiveKind::WastageNum];
    if !*options.ignore_den_eval {
        kinds.push(ObjectiveKind::WastageDen);
    }
    kinds.push(ObjectiveKind::Migration);
    for kind in kinds {
        if let Some(obj) = encoding.objectives.get(kind) {
            objective_line(w, &obj.terms, obj.denominator, kind.is_maximized(), decimal)?;
        }
    }

    for clause in &encoding.clauses {
        for &lit in clause {
            write!(w, "+1 {} ", lit_token(lit))?;
        }
        writeln!(w, ">= 1 ;")?;
    }
    for pb in &encoding.pbs {
        for &(lit, a) in &pb.terms {
            write!(w, "+{} {} ", a, lit_token(lit))?;
        }
        writeln!(w, ">= {} ;", pb.bound)?;
    }
    Ok(())
}
