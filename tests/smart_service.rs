//! The smart-mutation / smart-improvement contract, as the evolutionary
//! callers consume it.

use vmctk::model::parser::parse_str;
use vmctk::model::Placement;
use vmctk::search::SmartOutcome;
use vmctk::ConsolidatorBuilder;

#[test]
fn repair_stays_close_to_the_candidate() {
    // two CPU-overflowing VMs crammed onto one machine; with half the
    // variables unfixed a repair must exist and may touch at most one VM
    let text = "\
pm 0 2 2 1 2
pm 1 2 2 1 2
job 0
vm 0 2 2
vm 0 2 2
";
    let candidate = Placement(vec![0, 0]);
    let mut moved_total = 0usize;
    let seeds = 100u64;
    for seed in 0..seeds {
        let instance = parse_str(text).unwrap();
        let mut builder = ConsolidatorBuilder::new_no_env_vars();
        assert!(builder.set_options_bulk_by_str(&format!(
            "smart_mutation_rate=0.5 max_conflicts=100000 seed={seed}"
        )));
        let consolidator = builder.build(instance).unwrap();
        let mut service = consolidator.smart_service();
        match service.mutate(&candidate).unwrap() {
            SmartOutcome::Repaired(p) => {
                consolidator.instance().check_placement(&p, 0).unwrap();
                let moved = (0..2).filter(|&v| p.pm_of(v) != candidate.pm_of(v)).count();
                assert!(moved >= 1, "a repair must change something");
                moved_total += moved;
            }
            other => panic!("seed {seed}: expected a repair, got {other:?}"),
        }
    }
    // on average no more than ceil(0.5 × 2) = 1 VM moves
    assert!(moved_total as f64 / seeds as f64 <= 1.0 + f64::EPSILON);
}

#[test]
fn feasible_candidates_pass_through_without_improvement() {
    let text = "\
pm 0 2 2 1 2
pm 1 2 2 1 2
job 0
vm 0 2 2
vm 0 2 2
";
    let instance = parse_str(text).unwrap();
    let builder = ConsolidatorBuilder::new_no_env_vars();
    let consolidator = builder.build(instance).unwrap();
    let mut service = consolidator.smart_service();
    assert_eq!(
        service.mutate(&Placement(vec![0, 1])).unwrap(),
        SmartOutcome::Unchanged
    );
}

#[test]
fn improvement_finds_a_dominating_neighbour() {
    // the second machine is strictly cheaper at equal balance
    let text = "\
pm 0 4 4 2 4
pm 1 4 4 1 2
job 0
vm 0 2 2
";
    let instance = parse_str(text).unwrap();
    let mut builder = ConsolidatorBuilder::new_no_env_vars();
    assert!(builder.set_options_bulk_by_str(
        "smart_improvement=true improve_relax_rate=1.0 lit_weight_ratio=1 seed=3"
    ));
    let consolidator = builder.build(instance).unwrap();
    let mut service = consolidator.smart_service();
    let candidate = Placement(vec![0]);
    match service.mutate(&candidate).unwrap() {
        SmartOutcome::Improved(p) => {
            let before = consolidator.instance().evaluate(&candidate).unwrap();
            let after = consolidator.instance().evaluate(&p).unwrap();
            assert!(after.dominates(&before));
        }
        other => panic!("expected an improvement, got {other:?}"),
    }
}

#[test]
fn hopeless_candidates_are_discarded() {
    let text = "\
pm 0 2 2 1 2
job 0
vm 0 1 1 anti
vm 0 1 1 anti
";
    let instance = parse_str(text).unwrap();
    let builder = ConsolidatorBuilder::new_no_env_vars();
    let consolidator = builder.build(instance).unwrap();
    let mut service = consolidator.smart_service();
    assert_eq!(
        service.mutate(&Placement(vec![0, 0])).unwrap(),
        SmartOutcome::Infeasible
    );
}

#[test]
fn zero_budget_returns_best_effort() {
    let text = "\
pm 0 2 2 1 2
pm 1 2 2 1 2
job 0
vm 0 2 2
vm 0 2 2
";
    let instance = parse_str(text).unwrap();
    let mut builder = ConsolidatorBuilder::new_no_env_vars();
    // max_conflicts must be positive; 1 is as close to nothing as allowed
    assert!(builder.set_options_bulk_by_str("max_conflicts=1 smart_mutation_rate=0.5"));
    let consolidator = builder.build(instance).unwrap();
    let mut service = consolidator.smart_service();
    // whatever happens, the call must come back with a usable outcome
    match service.mutate(&Placement(vec![0, 0])).unwrap() {
        SmartOutcome::Repaired(p) => {
            consolidator.instance().check_placement(&p, 0).unwrap();
        }
        SmartOutcome::BudgetExceeded | SmartOutcome::Unchanged => {}
        other => panic!("unexpected outcome {other:?}"),
    }
}
