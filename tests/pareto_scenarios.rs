//! End-to-end scenarios over the public API.

use vmctk::model::parser::parse_str;
use vmctk::model::Instance;
use vmctk::search::SearchStatus;
use vmctk::util::rational::Rational;
use vmctk::{Consolidator, ConsolidatorBuilder, SearchOutcome};

fn solve(text: &str, options: &str) -> (Consolidator, SearchOutcome) {
    let instance = parse_str(text).unwrap();
    let mut builder = ConsolidatorBuilder::new_no_env_vars();
    assert!(builder.set_options_bulk_by_str(options));
    let consolidator = builder.build(instance).unwrap();
    let outcome = consolidator.solve().unwrap();
    (consolidator, outcome)
}

fn assert_all_feasible(instance: &Instance, outcome: &SearchOutcome) {
    for entry in outcome.archive.iter() {
        instance
            .check_placement(&entry.witness, instance.max_migration_memory(None))
            .unwrap();
        assert_eq!(instance.evaluate(&entry.witness).unwrap(), entry.vector);
    }
}

#[test]
fn singleton_machine_and_vm() {
    let text = "pm 0 4 4 1 3\njob 0\nvm 0 1 1\n";
    for algorithm in ["MCS", "PCLD", "PLBX", "GIA", "PBO", "LS", "HE"] {
        let (consolidator, outcome) = solve(text, &format!("algorithm={algorithm} seed=5"));
        assert_eq!(outcome.status, SearchStatus::Complete, "{algorithm}");
        assert_eq!(outcome.archive.len(), 1, "{algorithm}");
        let entry = outcome.archive.iter().next().unwrap();
        assert_eq!(entry.vector.energy, Rational::new(3, 2), "{algorithm}");
        assert_eq!(entry.vector.wastage, Rational::ZERO, "{algorithm}");
        assert_eq!(entry.vector.migration, None, "{algorithm}");
        assert_eq!(entry.witness.0, vec![0], "{algorithm}");
        assert_all_feasible(consolidator.instance(), &outcome);
    }
}

#[test]
fn tight_capacity_with_anti_colocation() {
    let text = "\
pm 0 2 2 1 2
pm 1 2 2 1 2
job 0
vm 0 2 2 anti
vm 0 2 2 anti
";
    let (consolidator, outcome) = solve(text, "algorithm=PCLD");
    assert_eq!(outcome.status, SearchStatus::Complete);
    assert_eq!(outcome.archive.len(), 1);
    let entry = outcome.archive.iter().next().unwrap();
    assert_eq!(entry.vector.energy, Rational::from_integer(4));
    assert_eq!(entry.vector.wastage, Rational::ZERO);
    assert_ne!(entry.witness.pm_of(0), entry.witness.pm_of(1));
    assert_all_feasible(consolidator.instance(), &outcome);
}

#[test]
fn platform_constraint_overrides_cost() {
    // machine 1 is far cheaper, but the VM is only allowed on machine 2
    let text = "\
pm 1 4 4 0.1 0.2
pm 2 4 4 5 9
job 0
vm 0 1 1 allowed=2
";
    let (consolidator, outcome) = solve(text, "algorithm=PCLD");
    assert_eq!(outcome.status, SearchStatus::Complete);
    assert!(!outcome.archive.is_empty());
    let pm2 = consolidator.instance().pm_position(2).unwrap();
    for entry in outcome.archive.iter() {
        assert_eq!(entry.witness.pm_of(0), pm2);
    }
    // with the platform constraint dropped, the cheap machine wins
    let (_, relaxed) = solve(text, "algorithm=PCLD ignore_platform=true");
    let cheapest = relaxed
        .archive
        .iter()
        .map(|e| e.vector.energy)
        .min()
        .unwrap();
    assert!(cheapest < Rational::from_integer(5));
}

#[test]
fn zero_migration_budget_freezes_the_mapping() {
    let text = "\
pm 1 4 4 1 3
pm 2 4 4 1 3
job 0
vm 0 1 1
map 0 0 1
budget 0
";
    for algorithm in ["PCLD", "GIA", "PBO"] {
        let (consolidator, outcome) = solve(text, &format!("algorithm={algorithm}"));
        assert!(!outcome.archive.is_empty(), "{algorithm}");
        let pm1 = consolidator.instance().pm_position(1).unwrap();
        for entry in outcome.archive.iter() {
            assert_eq!(entry.witness.pm_of(0), pm1, "{algorithm}");
            assert_eq!(entry.vector.migration, Some(0), "{algorithm}");
        }
    }
}

#[test]
fn heterogeneous_machines_trade_energy_for_wastage() {
    let text = "\
pm 0 4 4 1 3
pm 1 8 2 0.5 1.5
job 0
vm 0 1 1
job 1
vm 1 1 1
job 2
vm 2 1 1
";
    let (consolidator, outcome) = solve(text, "algorithm=PCLD seed=2");
    assert_eq!(outcome.status, SearchStatus::Complete);
    assert!(outcome.archive.len() >= 2, "expected a trade-off front");
    let entries: Vec<_> = outcome.archive.iter().collect();
    for a in &entries {
        for b in &entries {
            assert!(!a.vector.dominates(&b.vector));
        }
    }
    assert_all_feasible(consolidator.instance(), &outcome);
}

#[test]
fn relaxation_flags_reduce_to_bin_packing() {
    let text = "\
pm 0 2 2 1 2
pm 1 2 2 1 2
job 0
vm 0 1 1 anti allowed=0
vm 0 1 1 anti allowed=0
";
    // with both relaxations the two VMs may share the banned machine
    let (_, outcome) = solve(
        text,
        "algorithm=PCLD ignore_platform=true ignore_anti_colocation=true",
    );
    assert_eq!(outcome.status, SearchStatus::Complete);
    assert!(outcome
        .archive
        .iter()
        .any(|e| e.witness.pm_of(0) == e.witness.pm_of(1)));
}

#[test]
fn stratification_modes_agree_on_the_front() {
    let text = "\
pm 0 4 4 1 3
pm 1 8 2 0.5 1.5
job 0
vm 0 1 1
vm 0 2 1
";
    let (_, plain) = solve(text, "algorithm=PCLD seed=4");
    let mut plain_vectors: Vec<_> = plain.archive.iter().map(|e| e.vector.clone()).collect();
    plain_vectors.sort_by(|a, b| a.energy.cmp(&b.energy).then(a.wastage.cmp(&b.wastage)));
    for options in [
        "algorithm=PCLD seed=4 stratify=Merged lit_weight_ratio=2",
        "algorithm=PCLD seed=4 stratify=Split lit_weight_ratio=2",
        "algorithm=PCLD seed=4 stratify=Merged partition_number=3",
    ] {
        let (_, outcome) = solve(text, options);
        assert_eq!(outcome.status, SearchStatus::Complete, "{options}");
        let mut vectors: Vec<_> = outcome.archive.iter().map(|e| e.vector.clone()).collect();
        vectors.sort_by(|a, b| a.energy.cmp(&b.energy).then(a.wastage.cmp(&b.wastage)));
        assert_eq!(vectors, plain_vectors, "{options}");
    }
}

#[test]
fn hash_enumeration_augments_the_archive() {
    let text = "\
pm 0 4 4 1 3
pm 1 4 4 1 3
job 0
vm 0 1 1
vm 0 1 1
";
    let (consolidator, outcome) = solve(text, "algorithm=HE hash_functions=2 seed=9 time_limit=30");
    assert!(!outcome.archive.is_empty());
    assert_all_feasible(consolidator.instance(), &outcome);
}

#[test]
fn archive_dump_round_trips_through_text() {
    let text = "\
pm 0 4 4 1 3
pm 1 8 2 0.5 1.5
job 0
vm 0 1 1
vm 0 2 2
map 0 0 0
budget 1.0
";
    let (_, outcome) = solve(text, "algorithm=PCLD seed=6");
    assert!(!outcome.archive.is_empty());
    let mut dumped = Vec::new();
    outcome.archive.dump(&mut dumped).unwrap();
    let reloaded = vmctk::search::Archive::load(&String::from_utf8(dumped).unwrap()).unwrap();
    assert_eq!(reloaded.len(), outcome.archive.len());
    for (a, b) in outcome.archive.iter().zip(reloaded.iter()) {
        assert_eq!(a, b);
    }
}
