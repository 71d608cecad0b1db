use criterion::{criterion_group, criterion_main, Criterion};

use vmctk::model::parser::parse_str;
use vmctk::model::{ObjectiveVector, Placement};
use vmctk::search::Archive;
use vmctk::util::rational::Rational;
use vmctk::ConsolidatorBuilder;

fn archive_insertion(c: &mut Criterion) {
    c.bench_function("archive_insert_1k", |b| {
        b.iter(|| {
            let mut archive = Archive::new();
            for i in 0..1000i64 {
                let vector = ObjectiveVector {
                    energy: Rational::new(i % 97, 7),
                    wastage: Rational::new((i * 31) % 89, 13),
                    migration: Some((i % 11) as u64),
                };
                archive.insert(vector, Placement(vec![i as usize % 5]));
            }
            archive.len()
        })
    });
}

fn small_search(c: &mut Criterion) {
    let text = "\
pm 0 8 4 1 3
pm 1 4 8 1 2
pm 2 6 6 2 4
job 0
vm 0 2 1
vm 0 1 2
vm 0 2 2
job 1
vm 1 1 1
";
    c.bench_function("pcld_small_instance", |b| {
        b.iter(|| {
            let instance = parse_str(text).unwrap();
            let mut builder = ConsolidatorBuilder::new_no_env_vars();
            assert!(builder.set_options_bulk_by_str("algorithm=PCLD seed=1 time_limit=30"));
            let consolidator = builder.build(instance).unwrap();
            consolidator.solve().unwrap().archive.len()
        })
    });
}

criterion_group!(benches, archive_insertion, small_search);
criterion_main!(benches);
