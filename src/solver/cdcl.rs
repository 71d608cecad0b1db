//! A conflict-driven clause-learning solver with native linear
//! pseudo-Boolean constraints.
//!
//! Clauses use two-watched-literal propagation. Linear constraints use
//! counter-based propagation: each constraint tracks the weight of its
//! falsified terms, and propagation or conflict explanations are materialized
//! as plain clauses so that first-UIP analysis works uniformly. XOR parities
//! are translated to CNF chains at add time; an optional activation literal
//! lets the caller retract a parity group by retiring the literal.

use crate::solver::{ConstraintSolver, Lit, PbLin, SolverVerdict, Var};
use crate::util::constants::{MAX_VARS, RESTART_BASE, VAR_DECAY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LBool {
    True,
    False,
    Undef,
}

struct Clause {
    lits: Vec<Lit>,
}

#[derive(Clone, Copy)]
struct Watch {
    cref: u32,
    blocker: Lit,
}

struct PbState {
    terms: Vec<(Lit, u64)>,
    bound: u64,
    total: u64,
    falsified: u64,
}

/// The CDCL implementation of [`ConstraintSolver`].
pub struct CdclSolver {
    ok: bool,
    assigns: Vec<LBool>,
    phase: Vec<bool>,
    activity: Vec<f64>,
    var_inc: f64,
    level: Vec<u32>,
    reason: Vec<Option<u32>>,
    trail: Vec<Lit>,
    trail_lim: Vec<usize>,
    qhead: usize,
    clauses: Vec<Clause>,
    watches: Vec<Vec<Watch>>,
    pbs: Vec<PbState>,
    pb_occ: Vec<Vec<(u32, u64)>>,
    seen: Vec<bool>,
    model: Vec<bool>,
    budget: Option<u64>,
    call_conflicts: u64,
    quiet: bool,
}

impl Default for CdclSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CdclSolver {
    /// An empty solver.
    pub fn new() -> CdclSolver {
        CdclSolver {
            ok: true,
            assigns: Vec::new(),
            phase: Vec::new(),
            activity: Vec::new(),
            var_inc: 1.0,
            level: Vec::new(),
            reason: Vec::new(),
            trail: Vec::new(),
            trail_lim: Vec::new(),
            qhead: 0,
            clauses: Vec::new(),
            watches: Vec::new(),
            pbs: Vec::new(),
            pb_occ: Vec::new(),
            seen: Vec::new(),
            model: Vec::new(),
            budget: None,
            call_conflicts: 0,
            quiet: false,
        }
    }

    fn lit_value(&self, l: Lit) -> LBool {
        match self.assigns[l.var().index()] {
            LBool::Undef => LBool::Undef,
            LBool::True => {
                if l.is_negative() {
                    LBool::False
                } else {
                    LBool::True
                }
            }
            LBool::False => {
                if l.is_negative() {
                    LBool::True
                } else {
                    LBool::False
                }
            }
        }
    }

    fn decision_level(&self) -> usize {
        self.trail_lim.len()
    }

    fn enqueue(&mut self, l: Lit, reason: Option<u32>) {
        debug_assert_eq!(self.lit_value(l), LBool::Undef);
        let v = l.var().index();
        self.assigns[v] = if l.is_negative() { LBool::False } else { LBool::True };
        self.level[v] = self.decision_level() as u32;
        self.reason[v] = reason;
        self.trail.push(l);
        // Counter updates are symmetric with cancel_until: applied on push,
        // reverted on pop, regardless of whether the literal is ever
        // dequeued by propagate.
        for oi in 0..self.pb_occ[l.index()].len() {
            let (pbi, a) = self.pb_occ[l.index()][oi];
            self.pbs[pbi as usize].falsified += a;
        }
    }

    fn push_clause(&mut self, lits: Vec<Lit>) -> u32 {
        let cref = self.clauses.len() as u32;
        self.clauses.push(Clause { lits });
        cref
    }

    fn attach_clause(&mut self, cref: u32) {
        let (l0, l1) = {
            let c = &self.clauses[cref as usize];
            (c.lits[0], c.lits[1])
        };
        self.watches[(!l0).index()].push(Watch { cref, blocker: l1 });
        self.watches[(!l1).index()].push(Watch { cref, blocker: l0 });
    }

    fn bump(&mut self, v: Var) {
        self.activity[v.index()] += self.var_inc;
        if self.activity[v.index()] > 1e100 {
            for a in &mut self.activity {
                *a *= 1e-100;
            }
            self.var_inc *= 1e-100;
        }
    }

    /// Propagate until fixpoint; returns the conflicting clause, if any.
    fn propagate(&mut self) -> Option<u32> {
        while self.qhead < self.trail.len() {
            let p = self.trail[self.qhead];
            self.qhead += 1;

            let ws = std::mem::take(&mut self.watches[p.index()]);
            let mut kept: Vec<Watch> = Vec::with_capacity(ws.len());
            let mut conflict: Option<u32> = None;
            for (wi, w) in ws.iter().enumerate() {
                if conflict.is_some() {
                    kept.extend_from_slice(&ws[wi..]);
                    break;
                }
                if self.lit_value(w.blocker) == LBool::True {
                    kept.push(*w);
                    continue;
                }
                let cref = w.cref as usize;
                let false_lit = !p;
                if self.clauses[cref].lits[0] == false_lit {
                    self.clauses[cref].lits.swap(0, 1);
                }
                debug_assert_eq!(self.clauses[cref].lits[1], false_lit);
                let first = self.clauses[cref].lits[0];
                if self.lit_value(first) == LBool::True {
                    kept.push(Watch { cref: w.cref, blocker: first });
                    continue;
                }
                let len = self.clauses[cref].lits.len();
                let mut replaced = false;
                for k in 2..len {
                    let lk = self.clauses[cref].lits[k];
                    if self.lit_value(lk) != LBool::False {
                        self.clauses[cref].lits.swap(1, k);
                        self.watches[(!lk).index()].push(Watch { cref: w.cref, blocker: first });
                        replaced = true;
                        break;
                    }
                }
                if replaced {
                    continue;
                }
                kept.push(Watch { cref: w.cref, blocker: first });
                if self.lit_value(first) == LBool::False {
                    conflict = Some(w.cref);
                } else {
                    self.enqueue(first, Some(w.cref));
                }
            }
            debug_assert!(self.watches[p.index()].is_empty());
            self.watches[p.index()] = kept;
            if let Some(c) = conflict {
                self.qhead = self.trail.len();
                return Some(c);
            }

            // Linear constraints touched by p. Counters were already bumped
            // at enqueue time; this is the detection pass.
            for oi in 0..self.pb_occ[p.index()].len() {
                let (pbi, _) = self.pb_occ[p.index()][oi];
                if let Some(confl) = self.check_pb(pbi as usize) {
                    self.qhead = self.trail.len();
                    return Some(confl);
                }
            }
        }
        None
    }

    /// Check one linear constraint for conflict or forced literals,
    /// materializing explanation clauses as needed.
    fn check_pb(&mut self, pbi: usize) -> Option<u32> {
        let reachable = self.pbs[pbi].total - self.pbs[pbi].falsified;
        if reachable < self.pbs[pbi].bound {
            let mut lits = Vec::new();
            for i in 0..self.pbs[pbi].terms.len() {
                let (l, _) = self.pbs[pbi].terms[i];
                if self.lit_value(l) == LBool::False {
                    lits.push(l);
                }
            }
            return Some(self.push_clause(lits));
        }
        let margin = reachable - self.pbs[pbi].bound;
        let mut forced = Vec::new();
        for i in 0..self.pbs[pbi].terms.len() {
            let (l, a) = self.pbs[pbi].terms[i];
            if a > margin && self.lit_value(l) == LBool::Undef {
                forced.push(l);
            }
        }
        if !forced.is_empty() {
            let mut false_set = Vec::new();
            for i in 0..self.pbs[pbi].terms.len() {
                let (l, _) = self.pbs[pbi].terms[i];
                if self.lit_value(l) == LBool::False {
                    false_set.push(l);
                }
            }
            for l in forced {
                let mut lits = Vec::with_capacity(false_set.len() + 1);
                lits.push(l);
                lits.extend_from_slice(&false_set);
                let cref = self.push_clause(lits);
                if self.decision_level() == 0 {
                    self.enqueue(l, None);
                } else {
                    self.enqueue(l, Some(cref));
                }
            }
        }
        None
    }

    fn analyze(&mut self, confl: u32) -> (Vec<Lit>, usize) {
        let mut learnt: Vec<Lit> = vec![Lit::positive(Var(0))];
        let mut path_c = 0usize;
        let mut p: Option<Lit> = None;
        let mut index = self.trail.len();
        let mut confl = confl as usize;
        let mut to_clear: Vec<usize> = Vec::new();
        let current = self.decision_level() as u32;

        loop {
            let start = usize::from(p.is_some());
            for i in start..self.clauses[confl].lits.len() {
                let q = self.clauses[confl].lits[i];
                let v = q.var().index();
                if !self.seen[v] && self.level[v] > 0 {
                    self.seen[v] = true;
                    to_clear.push(v);
                    self.bump(q.var());
                    if self.level[v] >= current {
                        path_c += 1;
                    } else {
                        learnt.push(q);
                    }
                }
            }
            loop {
                index -= 1;
                if self.seen[self.trail[index].var().index()] {
                    break;
                }
            }
            let pl = self.trail[index];
            let v = pl.var().index();
            p = Some(pl);
            path_c -= 1;
            self.seen[v] = false;
            if path_c == 0 {
                learnt[0] = !pl;
                break;
            }
            confl = self.reason[v].expect("propagated literal without a reason") as usize;
        }

        let bt = if learnt.len() == 1 {
            0
        } else {
            let mut max_i = 1;
            for i in 2..learnt.len() {
                if self.level[learnt[i].var().index()] > self.level[learnt[max_i].var().index()] {
                    max_i = i;
                }
            }
            learnt.swap(1, max_i);
            self.level[learnt[1].var().index()] as usize
        };
        for v in to_clear {
            self.seen[v] = false;
        }
        (learnt, bt)
    }

    fn cancel_until(&mut self, target: usize) {
        if self.decision_level() <= target {
            return;
        }
        let keep = self.trail_lim[target];
        for i in (keep..self.trail.len()).rev() {
            let l = self.trail[i];
            let v = l.var().index();
            for oi in 0..self.pb_occ[l.index()].len() {
                let (pbi, a) = self.pb_occ[l.index()][oi];
                self.pbs[pbi as usize].falsified -= a;
            }
            self.phase[v] = !l.is_negative();
            self.assigns[v] = LBool::Undef;
            self.reason[v] = None;
        }
        self.trail.truncate(keep);
        self.qhead = keep;
        self.trail_lim.truncate(target);
    }

    fn record_learnt(&mut self, learnt: Vec<Lit>) {
        if learnt.len() == 1 {
            self.enqueue(learnt[0], None);
        } else {
            let asserting = learnt[0];
            let cref = self.push_clause(learnt);
            self.attach_clause(cref);
            self.enqueue(asserting, Some(cref));
        }
    }

    fn pick_branch(&self) -> Option<Var> {
        let mut best: Option<usize> = None;
        for v in 0..self.assigns.len() {
            if self.assigns[v] == LBool::Undef {
                match best {
                    Some(b) if self.activity[v] <= self.activity[b] => {}
                    _ => best = Some(v),
                }
            }
        }
        best.map(|v| Var(v as u32))
    }

    fn save_model(&mut self) {
        self.model.clear();
        self.model.extend(self.assigns.iter().map(|a| *a == LBool::True));
    }

    /// Luby restart sequence: 1 1 2 1 1 2 4 1 1 2 ...
    fn luby(x: u32) -> u64 {
        let mut x = x as u64;
        let (mut size, mut seq) = (1u64, 0u32);
        while size < x + 1 {
            seq += 1;
            size = 2 * size + 1;
        }
        while size - 1 != x {
            size = (size - 1) / 2;
            seq -= 1;
            x %= size;
        }
        1u64 << seq
    }
}

impl ConstraintSolver for CdclSolver {
    fn new_var(&mut self) -> Var {
        assert!(self.assigns.len() < MAX_VARS, "variable budget exhausted");
        let v = Var(self.assigns.len() as u32);
        self.assigns.push(LBool::Undef);
        self.phase.push(false);
        self.activity.push(0.0);
        self.level.push(0);
        self.reason.push(None);
        self.seen.push(false);
        self.watches.push(Vec::new());
        self.watches.push(Vec::new());
        self.pb_occ.push(Vec::new());
        self.pb_occ.push(Vec::new());
        v
    }

    fn num_vars(&self) -> usize {
        self.assigns.len()
    }

    fn add_clause(&mut self, lits: &[Lit]) {
        if !self.ok {
            return;
        }
        debug_assert_eq!(self.decision_level(), 0);
        let mut c: Vec<Lit> = Vec::with_capacity(lits.len());
        for &l in lits {
            match self.lit_value(l) {
                LBool::True => return,
                LBool::False => {}
                LBool::Undef => c.push(l),
            }
        }
        c.sort_unstable();
        c.dedup();
        // adjacent after sorting: l and !l share a variable
        if c.windows(2).any(|w| w[0] == !w[1]) {
            return;
        }
        match c.len() {
            0 => self.ok = false,
            1 => self.enqueue(c[0], None),
            _ => {
                let cref = self.push_clause(c);
                self.attach_clause(cref);
            }
        }
    }

    fn add_pb(&mut self, pb: PbLin) {
        if !self.ok {
            return;
        }
        debug_assert_eq!(self.decision_level(), 0);
        let mut terms: Vec<(Lit, u64)> = Vec::with_capacity(pb.terms.len());
        let mut bound = pb.bound;
        for (l, a) in pb.terms {
            if a == 0 {
                continue;
            }
            match self.lit_value(l) {
                LBool::True => bound = bound.saturating_sub(a),
                LBool::False => {}
                LBool::Undef => terms.push((l, a)),
            }
        }
        if bound == 0 {
            return;
        }
        for t in &mut terms {
            if t.1 > bound {
                t.1 = bound;
            }
        }
        let total: u64 = terms.iter().map(|t| t.1).sum();
        if total < bound {
            self.ok = false;
            return;
        }
        let idx = self.pbs.len() as u32;
        for &(l, a) in &terms {
            self.pb_occ[(!l).index()].push((idx, a));
        }
        self.pbs.push(PbState { terms, bound, total, falsified: 0 });
        self.check_pb(idx as usize);
    }

    fn add_xor(&mut self, vars: &[Var], rhs: bool, activation: Option<Lit>) {
        if vars.is_empty() {
            if rhs {
                match activation {
                    Some(a) => self.add_clause(&[!a]),
                    None => self.ok = false,
                }
            }
            return;
        }
        let mut acc = Lit::positive(vars[0]);
        for &v in &vars[1..] {
            let t = Lit::positive(self.new_var());
            let b = Lit::positive(v);
            // t <-> acc xor b
            self.add_clause(&[!t, acc, b]);
            self.add_clause(&[!t, !acc, !b]);
            self.add_clause(&[t, !acc, b]);
            self.add_clause(&[t, acc, !b]);
            acc = t;
        }
        let assert_lit = if rhs { acc } else { !acc };
        match activation {
            Some(a) => self.add_clause(&[!a, assert_lit]),
            None => self.add_clause(&[assert_lit]),
        }
    }

    fn solve(&mut self, assumptions: &[Lit]) -> SolverVerdict {
        self.call_conflicts = 0;
        if !self.ok {
            return SolverVerdict::Unsat;
        }
        debug_assert_eq!(self.decision_level(), 0);
        if self.propagate().is_some() {
            self.ok = false;
            return SolverVerdict::Unsat;
        }
        if !self.quiet {
            trace!(
                "solve: {} vars, {} clauses, {} pbs, {} assumptions",
                self.num_vars(),
                self.clauses.len(),
                self.pbs.len(),
                assumptions.len()
            );
        }
        let mut restart_num = 0u32;
        let mut since_restart = 0u64;
        let mut limit = Self::luby(restart_num) * RESTART_BASE;
        loop {
            if let Some(confl) = self.propagate() {
                self.call_conflicts += 1;
                since_restart += 1;
                if self.decision_level() == 0 {
                    self.ok = false;
                    return SolverVerdict::Unsat;
                }
                let (learnt, bt) = self.analyze(confl);
                self.cancel_until(bt);
                self.record_learnt(learnt);
                self.var_inc /= VAR_DECAY;
                if let Some(b) = self.budget {
                    if self.call_conflicts >= b {
                        self.cancel_until(0);
                        return SolverVerdict::BudgetExceeded;
                    }
                }
            } else {
                if since_restart >= limit {
                    since_restart = 0;
                    restart_num += 1;
                    limit = Self::luby(restart_num) * RESTART_BASE;
                    self.cancel_until(0);
                    continue;
                }
                if self.decision_level() < assumptions.len() {
                    let p = assumptions[self.decision_level()];
                    match self.lit_value(p) {
                        LBool::True => {
                            self.trail_lim.push(self.trail.len());
                        }
                        LBool::False => {
                            self.cancel_until(0);
                            return SolverVerdict::Unsat;
                        }
                        LBool::Undef => {
                            self.trail_lim.push(self.trail.len());
                            self.enqueue(p, None);
                        }
                    }
                    continue;
                }
                match self.pick_branch() {
                    None => {
                        self.save_model();
                        self.cancel_until(0);
                        return SolverVerdict::Sat;
                    }
                    Some(v) => {
                        self.trail_lim.push(self.trail.len());
                        let l = if self.phase[v.index()] {
                            Lit::positive(v)
                        } else {
                            Lit::negative(v)
                        };
                        self.enqueue(l, None);
                    }
                }
            }
        }
    }

    fn value(&self, var: Var) -> bool {
        self.model.get(var.index()).copied().unwrap_or(false)
    }

    fn set_conflict_budget(&mut self, budget: Option<u64>) {
        self.budget = budget;
    }

    fn set_polarity_hint(&mut self, var: Var, phase: bool) {
        self.phase[var.index()] = phase;
    }

    fn retire(&mut self, activation: Lit) {
        self.add_clause(&[!activation]);
    }

    fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    fn last_call_conflicts(&self) -> u64 {
        self.call_conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(s: &mut CdclSolver, n: usize) -> Vec<Lit> {
        (0..n).map(|_| Lit::positive(s.new_var())).collect()
    }

    #[test]
    fn trivially_sat_and_unsat() {
        let mut s = CdclSolver::new();
        let x = vars(&mut s, 2);
        s.add_clause(&[x[0], x[1]]);
        assert_eq!(s.solve(&[]), SolverVerdict::Sat);
        s.add_clause(&[!x[0]]);
        s.add_clause(&[!x[1]]);
        assert_eq!(s.solve(&[]), SolverVerdict::Unsat);
    }

    #[test]
    fn unit_propagation_chain() {
        let mut s = CdclSolver::new();
        let x = vars(&mut s, 4);
        s.add_clause(&[x[0]]);
        s.add_clause(&[!x[0], x[1]]);
        s.add_clause(&[!x[1], x[2]]);
        s.add_clause(&[!x[2], x[3]]);
        assert_eq!(s.solve(&[]), SolverVerdict::Sat);
        for l in &x {
            assert!(s.value(l.var()));
        }
    }

    #[test]
    fn assumptions_are_per_call() {
        let mut s = CdclSolver::new();
        let x = vars(&mut s, 2);
        s.add_clause(&[x[0], x[1]]);
        assert_eq!(s.solve(&[!x[0], !x[1]]), SolverVerdict::Unsat);
        // the refutation above must not poison later calls
        assert_eq!(s.solve(&[!x[0]]), SolverVerdict::Sat);
        assert!(s.value(x[1].var()));
    }

    #[test]
    fn pigeonhole_three_into_two() {
        // 3 pigeons, 2 holes: forces real conflict analysis.
        let mut s = CdclSolver::new();
        let mut x = vec![];
        for _ in 0..3 {
            x.push(vars(&mut s, 2));
        }
        for p in &x {
            s.add_clause(&[p[0], p[1]]);
        }
        for h in 0..2 {
            for a in 0..3 {
                for b in (a + 1)..3 {
                    s.add_clause(&[!x[a][h], !x[b][h]]);
                }
            }
        }
        assert_eq!(s.solve(&[]), SolverVerdict::Unsat);
    }

    #[test]
    fn pb_cardinality_propagates() {
        let mut s = CdclSolver::new();
        let x = vars(&mut s, 3);
        // at most one true: !x0 + !x1 + !x2 >= 2
        s.add_pb(PbLin { terms: x.iter().map(|&l| (!l, 1)).collect(), bound: 2 });
        assert_eq!(s.solve(&[x[0]]), SolverVerdict::Sat);
        assert!(!s.value(x[1].var()));
        assert!(!s.value(x[2].var()));
        assert_eq!(s.solve(&[x[0], x[1]]), SolverVerdict::Unsat);
    }

    #[test]
    fn pb_weighted_bound() {
        let mut s = CdclSolver::new();
        let x = vars(&mut s, 3);
        // 3a + 2b + 2c <= 4, as 3!a + 2!b + 2!c >= 3
        s.add_pb(PbLin { terms: vec![(!x[0], 3), (!x[1], 2), (!x[2], 2)], bound: 3 });
        assert_eq!(s.solve(&[x[1], x[2]]), SolverVerdict::Sat);
        assert!(!s.value(x[0].var()));
        assert_eq!(s.solve(&[x[0], x[1]]), SolverVerdict::Unsat);
    }

    #[test]
    fn xor_parity() {
        let mut s = CdclSolver::new();
        let v: Vec<Var> = (0..3).map(|_| s.new_var()).collect();
        s.add_xor(&v, true, None);
        assert_eq!(s.solve(&[]), SolverVerdict::Sat);
        let parity = v.iter().filter(|&&var| s.value(var)).count() % 2;
        assert_eq!(parity, 1);
        // odd parity forbids the all-false point
        let all_false: Vec<Lit> = v.iter().map(|&var| Lit::negative(var)).collect();
        assert_eq!(s.solve(&all_false), SolverVerdict::Unsat);
    }

    #[test]
    fn activation_retirement() {
        let mut s = CdclSolver::new();
        let v: Vec<Var> = (0..2).map(|_| s.new_var()).collect();
        let act = Lit::positive(s.new_var());
        // x0 xor x1 under activation
        s.add_xor(&v, true, Some(act));
        let both = [Lit::positive(v[0]), Lit::positive(v[1])];
        assert_eq!(s.solve(&[act, both[0], both[1]]), SolverVerdict::Unsat);
        s.retire(act);
        assert_eq!(s.solve(&[both[0], both[1]]), SolverVerdict::Sat);
    }

    #[test]
    fn conflict_budget_is_per_call() {
        let mut s = CdclSolver::new();
        let mut x = vec![];
        for _ in 0..5 {
            x.push(vars(&mut s, 4));
        }
        for p in &x {
            s.add_clause(&[p[0], p[1], p[2], p[3]]);
        }
        for h in 0..4 {
            for a in 0..5 {
                for b in (a + 1)..5 {
                    s.add_clause(&[!x[a][h], !x[b][h]]);
                }
            }
        }
        s.set_conflict_budget(Some(1));
        assert_eq!(s.solve(&[]), SolverVerdict::BudgetExceeded);
        s.set_conflict_budget(None);
        assert_eq!(s.solve(&[]), SolverVerdict::Unsat);
    }

    #[test]
    fn polarity_hints_steer_models() {
        let mut s = CdclSolver::new();
        let x = vars(&mut s, 2);
        s.add_clause(&[x[0], x[1]]);
        s.set_polarity_hint(x[0].var(), true);
        s.set_polarity_hint(x[1].var(), false);
        assert_eq!(s.solve(&[]), SolverVerdict::Sat);
        assert!(s.value(x[0].var()));
        assert!(!s.value(x[1].var()));
    }
}
