//! The line-oriented instance text format.
//!
//! ```text
//! # comment
//! pm <id> <cpu> <mem> <idle> <full>
//! job <id>
//! vm <job> <cpu> <mem> [anti] [allowed=<pm,pm,...>]
//! map <job> <index> <pm>
//! budget <fraction>
//! ```
//!
//! `vm` lines append to the named job; the VM's index is its position within
//! the job. Cost fields accept decimal literals. `budget` defaults to 1.0
//! when absent.

use crate::error::{CoreError, Result};
use crate::model::instance::Instance;
use crate::model::machine::{Job, Mappings, PhysicalMachine, VirtualMachine, VmRef};
use crate::util::rational::Rational;
use std::fs;
use std::path::Path;

/// Parse an instance from a file.
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Instance> {
    parse_str(&fs::read_to_string(path)?)
}

/// Parse an instance from text.
pub fn parse_str(text: &str) -> Result<Instance> {
    let mut pms = Vec::new();
    let mut jobs: Vec<Job> = Vec::new();
    let mut mappings = Mappings::new();
    let mut budget = 1.0f64;

    for (lineno, raw) in text.lines().enumerate() {
        let line = lineno + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let mut fields = text.split_ascii_whitespace();
        let keyword = fields.next().unwrap();
        let rest: Vec<&str> = fields.collect();
        match keyword {
            "pm" => {
                if rest.len() != 5 {
                    return err(line, "pm expects <id> <cpu> <mem> <idle> <full>");
                }
                pms.push(PhysicalMachine {
                    id: parse_num(line, rest[0])?,
                    cpu: parse_num(line, rest[1])?,
                    mem: parse_num(line, rest[2])?,
                    idle_cost: parse_cost(line, rest[3])?,
                    full_cost: parse_cost(line, rest[4])?,
                });
            }
            "job" => {
                if rest.len() != 1 {
                    return err(line, "job expects <id>");
                }
                let id: usize = parse_num(line, rest[0])?;
                if jobs.iter().any(|j| j.id == id) {
                    return err(line, &format!("duplicate job id {id}"));
                }
                jobs.push(Job { id, vms: Vec::new() });
            }
            "vm" => {
                if rest.len() < 3 {
                    return err(line, "vm expects <job> <cpu> <mem> [anti] [allowed=...]");
                }
                let job_id: usize = parse_num(line, rest[0])?;
                let job = match jobs.iter_mut().find(|j| j.id == job_id) {
                    Some(job) => job,
                    None => return err(line, &format!("vm names undeclared job {job_id}")),
                };
                let mut vm = VirtualMachine {
                    job: job_id,
                    index: job.vms.len(),
                    cpu: parse_num(line, rest[1])?,
                    mem: parse_num(line, rest[2])?,
                    allowed: vec![],
                    anti_colocatable: false,
                };
                for extra in &rest[3..] {
                    if *extra == "anti" {
                        vm.anti_colocatable = true;
                    } else if let Some(list) = extra.strip_prefix("allowed=") {
                        for id in list.split(',').filter(|s| !s.is_empty()) {
                            vm.allowed.push(parse_num(line, id)?);
                        }
                    } else {
                        return err(line, &format!("unrecognized vm attribute {extra:?}"));
                    }
                }
                job.vms.push(vm);
            }
            "map" => {
                if rest.len() != 3 {
                    return err(line, "map expects <job> <index> <pm>");
                }
                let vm = VmRef { job: parse_num(line, rest[0])?, index: parse_num(line, rest[1])? };
                if mappings.insert(vm, parse_num(line, rest[2])?).is_some() {
                    return err(line, &format!("duplicate mapping for VM {}-{}", vm.job, vm.index));
                }
            }
            "budget" => {
                if rest.len() != 1 {
                    return err(line, "budget expects <fraction>");
                }
                budget = rest[0]
                    .parse()
                    .map_err(|_| CoreError::Parse { line, msg: format!("bad fraction {:?}", rest[0]) })?;
            }
            other => return err(line, &format!("unknown keyword {other:?}")),
        }
    }

    Instance::new(pms, jobs, mappings, budget)
}

fn err<T>(line: usize, msg: &str) -> Result<T> {
    Err(CoreError::Parse { line, msg: msg.to_string() })
}

fn parse_num<T: std::str::FromStr>(line: usize, field: &str) -> Result<T> {
    field
        .parse()
        .map_err(|_| CoreError::Parse { line, msg: format!("bad numeric field {field:?}") })
}

fn parse_cost(line: usize, field: &str) -> Result<Rational> {
    Rational::from_decimal_str(field).map_err(|msg| CoreError::Parse { line, msg })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::instance::Placement;

    #[test]
    fn parses_a_full_instance() {
        let instance = parse_str(
            "# two machines, one job\n\
             pm 0 4 4 1 3\n\
             pm 1 2 2 0.5 1.5\n\
             job 0\n\
             vm 0 1 1\n\
             vm 0 1 1 anti allowed=1\n\
             map 0 0 0\n\
             budget 0.5\n",
        )
        .unwrap();
        assert_eq!(instance.pms().len(), 2);
        assert_eq!(instance.vm_count(), 2);
        assert_eq!(instance.pms()[1].idle_cost, Rational::new(1, 2));
        let second = instance.vm_at(1);
        assert!(second.anti_colocatable);
        assert_eq!(second.allowed, vec![1]);
        assert_eq!(instance.current_pm_position(0), Some(0));
        assert_eq!(instance.migration_percentile(), 0.5);
        instance.check_placement(&Placement(vec![0, 1]), 0).unwrap();
    }

    #[test]
    fn reports_line_numbers() {
        let e = parse_str("pm 0 4 4 1 3\nvm 9 1 1\n").unwrap_err();
        match e {
            CoreError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_str("pm 0 4 4\n").is_err());
        assert!(parse_str("job 0\njob 0\n").is_err());
        assert!(parse_str("wat 1 2\n").is_err());
        assert!(parse_str("job 0\nvm 0 1 1 frobnicate\n").is_err());
    }

    #[test]
    fn empty_text_is_an_empty_instance() {
        let instance = parse_str("").unwrap();
        assert_eq!(instance.vm_count(), 0);
        assert_eq!(instance.pms().len(), 0);
    }

    #[test]
    fn reads_instances_from_disk() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "pm 0 4 4 1 3\njob 0\nvm 0 1 1\n").unwrap();
        let instance = parse_file(file.path()).unwrap();
        assert_eq!(instance.vm_count(), 1);
        assert!(parse_file(file.path().join("missing")).is_err());
    }
}
