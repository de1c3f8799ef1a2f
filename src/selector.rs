use std::collections::BTreeSet;

use crate::maze::Task;
use crate::rng::Rng;

#[derive(Debug, PartialEq, Eq)]
pub enum Selection<'a> {
    Task(&'a Task),
    Exhausted,
}

/// Draws a not-yet-completed task uniformly at random and marks it
/// completed. Returns [`Selection::Exhausted`] once every task id is in
/// `completed`; the caller owns the policy for what happens next.
pub fn next_task<'a>(
    all_tasks: &'a [Task],
    completed: &mut BTreeSet<String>,
    rng: &mut Rng,
) -> Selection<'a> {
    let mut available: Vec<&Task> = all_tasks
        .iter()
        .filter(|task| !completed.contains(&task.id))
        .collect();
    if available.is_empty() {
        return Selection::Exhausted;
    }

    rng.shuffle(&mut available);
    let task = available[0];
    completed.insert(task.id.clone());
    Selection::Task(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maze::{CellKind, Grid};

    fn make_tasks(count: usize) -> Vec<Task> {
        let mut rows = vec![vec![CellKind::Empty; 10]; 10];
        rows[0][0] = CellKind::PlayerStart;
        rows[9][9] = CellKind::Exit;
        let maze = Grid::from_rows("t", &rows).expect("valid grid");
        (0..count)
            .map(|idx| Task {
                id: format!("task-{idx}"),
                maze: maze.clone(),
                help: None,
                difficulty: None,
                enemies: Vec::new(),
            })
            .collect()
    }

    #[test]
    fn every_task_once_per_cycle_then_exhausted() {
        let tasks = make_tasks(6);
        for seed in 0..50u32 {
            let mut rng = Rng::new(seed);
            let mut completed = BTreeSet::new();
            let mut drawn = Vec::new();
            while let Selection::Task(task) = next_task(&tasks, &mut completed, &mut rng) {
                assert!(!drawn.contains(&task.id), "repeat within cycle: {}", task.id);
                drawn.push(task.id.clone());
            }
            assert_eq!(drawn.len(), tasks.len());
            assert_eq!(completed.len(), tasks.len());
            assert_eq!(
                next_task(&tasks, &mut completed, &mut rng),
                Selection::Exhausted
            );
        }
    }

    #[test]
    fn never_returns_an_already_completed_task() {
        let tasks = make_tasks(4);
        let mut completed: BTreeSet<String> =
            ["task-0", "task-2"].iter().map(|id| id.to_string()).collect();
        let mut rng = Rng::new(9);
        for _ in 0..2 {
            let Selection::Task(task) = next_task(&tasks, &mut completed, &mut rng) else {
                panic!("two tasks remain");
            };
            assert!(task.id == "task-1" || task.id == "task-3");
        }
        assert_eq!(
            next_task(&tasks, &mut completed, &mut rng),
            Selection::Exhausted
        );
    }

    #[test]
    fn first_draw_is_spread_across_tasks() {
        let tasks = make_tasks(3);
        let mut counts = [0usize; 3];
        for seed in 0..3_000u32 {
            let mut rng = Rng::new(seed.wrapping_mul(2_654_435_761));
            let mut completed = BTreeSet::new();
            if let Selection::Task(task) = next_task(&tasks, &mut completed, &mut rng) {
                let idx: usize = task.id["task-".len()..].parse().expect("numeric suffix");
                counts[idx] += 1;
            }
        }
        assert!(counts.iter().all(|count| *count > 800), "{counts:?}");
    }

    #[test]
    fn empty_pool_is_exhausted() {
        let mut completed = BTreeSet::new();
        assert_eq!(
            next_task(&[], &mut completed, &mut Rng::new(1)),
            Selection::Exhausted
        );
    }
}
