//! Orders passes from their declared tag sets.
//!
//! Pass `a` must run before pass `b` when `a` introduces a tag `b` uses or
//! deletes, or when `a` uses a tag `b` deletes. A pass that introduces a
//! tag it also deletes depends on itself.

use rand::seq::SliceRandom;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};

use crate::errors::{CompileError, ErrorKind, Result};
use crate::passes::{Pass, PassInfo};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleOptions {
    /// Visit passes in declaration order. When false, roots and
    /// dependencies are visited in a shuffled order.
    pub deterministic: bool,
    /// Seed for the shuffled order; random when absent.
    pub seed: Option<u64>,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            deterministic: true,
            seed: None,
        }
    }
}

fn intersects(a: &[&str], b: &[&str]) -> bool {
    a.iter().any(|tag| b.contains(tag))
}

/// Whether `before` has to run before `after`.
pub fn must_precede(before: &PassInfo, after: &PassInfo) -> bool {
    if before.name == after.name {
        return intersects(before.introduces, before.deletes);
    }
    intersects(before.introduces, after.uses)
        || intersects(before.introduces, after.deletes)
        || intersects(before.uses, after.deletes)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

struct Sorter<'a> {
    infos: &'a [PassInfo],
    dependencies: Vec<Vec<usize>>,
    marks: Vec<Mark>,
    path: Vec<usize>,
    order: Vec<usize>,
}

impl Sorter<'_> {
    fn visit(&mut self, index: usize) -> Result<()> {
        match self.marks[index] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let from = self.path.iter().position(|p| *p == index).unwrap_or(0);
                let mut cycle: Vec<String> = self.path[from..]
                    .iter()
                    .map(|p| self.infos[*p].name.to_string())
                    .collect();
                cycle.push(self.infos[index].name.to_string());
                return Err(CompileError::new(ErrorKind::Topology { cycle }));
            }
            Mark::Unvisited => {}
        }

        self.marks[index] = Mark::InProgress;
        self.path.push(index);
        for dependency in self.dependencies[index].clone() {
            self.visit(dependency)?;
        }
        self.path.pop();
        self.marks[index] = Mark::Done;
        self.order.push(index);
        Ok(())
    }
}

/// Indices of `infos` in an order that satisfies every dependency.
pub fn order(infos: &[PassInfo], options: &ScheduleOptions) -> Result<Vec<usize>> {
    let mut dependencies: Vec<Vec<usize>> = (0..infos.len())
        .map(|after| {
            (0..infos.len())
                .filter(|before| must_precede(&infos[*before], &infos[after]))
                .collect()
        })
        .collect();
    let mut roots: Vec<usize> = (0..infos.len()).collect();

    if !options.deterministic {
        let seed = options.seed.unwrap_or_else(rand::random);
        tracing::debug!(seed, "shuffling pass order");
        let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
        roots.shuffle(&mut rng);
        for list in &mut dependencies {
            list.shuffle(&mut rng);
        }
    }

    let mut sorter = Sorter {
        infos,
        dependencies,
        marks: vec![Mark::Unvisited; infos.len()],
        path: Vec::new(),
        order: Vec::new(),
    };
    for root in roots {
        sorter.visit(root)?;
    }
    Ok(sorter.order)
}

/// Sorts `passes` into execution order.
pub fn schedule(passes: Vec<Box<dyn Pass>>, options: &ScheduleOptions) -> Result<Vec<Box<dyn Pass>>> {
    let infos: Vec<PassInfo> = passes.iter().map(|p| p.info()).collect();
    let order = order(&infos, options)?;

    let mut slots: Vec<Option<Box<dyn Pass>>> = passes.into_iter().map(Some).collect();
    let scheduled: Vec<Box<dyn Pass>> = order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect();
    tracing::debug!(
        order = %scheduled.iter().map(|p| p.name()).collect::<Vec<_>>().join(" "),
        "scheduled passes"
    );
    Ok(scheduled)
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn info(
        name: &'static str,
        introduces: &'static [&'static str],
        uses: &'static [&'static str],
        deletes: &'static [&'static str],
    ) -> PassInfo {
        PassInfo {
            name,
            introduces,
            uses,
            deletes,
        }
    }

    #[test]
    fn introducer_runs_before_user() {
        let infos = [info("use_b", &[], &["b"], &[]), info("make_b", &["b"], &[], &[])];
        let order = order(&infos, &ScheduleOptions::default()).unwrap();
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn self_cycle_is_reported() {
        let infos = [info("churn", &["x"], &[], &["x"])];
        let err = order(&infos, &ScheduleOptions::default()).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Topology {
                cycle: vec!["churn".into(), "churn".into()]
            }
        );
    }
}
