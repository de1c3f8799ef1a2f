use crate::maze::EnemyDef;
use crate::types::Coord;

/// Catch-up cap for one `due_steps` call after a long host stall.
const MAX_STEPS_PER_CALL: u32 = 8;

/// An enemy walking its authored path back and forth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveEnemy {
    pub path: Vec<Coord>,
    pub position: Coord,
    pub index: usize,
    pub moving_forward: bool,
}

impl LiveEnemy {
    /// `None` for an empty path.
    pub fn from_def(def: &EnemyDef) -> Option<Self> {
        let first = *def.path.first()?;
        Some(Self {
            path: def.path.clone(),
            position: first,
            index: 0,
            moving_forward: true,
        })
    }

    /// One ping-pong step. The direction flips on reaching either end of
    /// the path, so `index` never leaves `0..path.len()`.
    pub fn advance(&mut self) {
        let last = self.path.len().saturating_sub(1);
        if last == 0 {
            self.index = 0;
            self.moving_forward = true;
        } else if self.moving_forward {
            self.index = (self.index + 1).min(last);
            if self.index == last {
                self.moving_forward = false;
            }
        } else {
            self.index = self.index.saturating_sub(1).min(last);
            if self.index == 0 {
                self.moving_forward = true;
            }
        }
        if let Some(at) = self.path.get(self.index) {
            self.position = *at;
        }
    }
}

/// Converts host time deltas into whole enemy steps.
#[derive(Clone, Copy, Debug)]
pub struct EnemyScheduler {
    period_ms: u64,
    accumulator_ms: u64,
}

impl EnemyScheduler {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            accumulator_ms: 0,
        }
    }

    pub fn reset(&mut self) {
        self.accumulator_ms = 0;
    }

    pub fn due_steps(&mut self, delta_ms: u64) -> u32 {
        self.accumulator_ms = self.accumulator_ms.saturating_add(delta_ms);
        let mut steps = 0;
        while self.accumulator_ms >= self.period_ms {
            self.accumulator_ms -= self.period_ms;
            steps += 1;
            if steps >= MAX_STEPS_PER_CALL {
                self.accumulator_ms = 0;
                break;
            }
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enemy(path: &[(i32, i32)]) -> LiveEnemy {
        LiveEnemy::from_def(&EnemyDef {
            path: path.iter().map(|(x, y)| Coord::new(*x, *y)).collect(),
        })
        .expect("non-empty path")
    }

    #[test]
    fn three_cell_path_ping_pongs() {
        let mut e = enemy(&[(1, 0), (2, 0), (3, 0)]);
        let mut indices = Vec::new();
        for _ in 0..5 {
            e.advance();
            indices.push(e.index);
        }
        assert_eq!(indices, vec![1, 2, 1, 0, 1]);
        assert!(e.moving_forward);
        assert_eq!(e.position, Coord::new(2, 0));
    }

    #[test]
    fn index_stays_in_bounds_for_any_path_length() {
        for len in 1..=6usize {
            let path: Vec<(i32, i32)> = (0..len as i32).map(|x| (x, 0)).collect();
            let mut e = enemy(&path);
            for _ in 0..100 {
                e.advance();
                assert!(e.index < len, "len={len} index={}", e.index);
                assert_eq!(e.position, e.path[e.index]);
            }
        }
    }

    #[test]
    fn single_cell_path_stays_put() {
        let mut e = enemy(&[(4, 4)]);
        for _ in 0..3 {
            e.advance();
            assert_eq!(e.index, 0);
            assert_eq!(e.position, Coord::new(4, 4));
        }
    }

    #[test]
    fn empty_path_yields_no_enemy() {
        assert!(LiveEnemy::from_def(&EnemyDef { path: Vec::new() }).is_none());
    }

    #[test]
    fn scheduler_emits_whole_periods_and_keeps_remainder() {
        let mut scheduler = EnemyScheduler::new(500);
        assert_eq!(scheduler.due_steps(300), 0);
        assert_eq!(scheduler.due_steps(300), 1);
        assert_eq!(scheduler.due_steps(400), 1);
        assert_eq!(scheduler.due_steps(1_000), 2);
        scheduler.reset();
        assert_eq!(scheduler.due_steps(499), 0);
    }

    #[test]
    fn scheduler_caps_catch_up_after_a_stall() {
        let mut scheduler = EnemyScheduler::new(500);
        assert_eq!(scheduler.due_steps(60_000), MAX_STEPS_PER_CALL);
        assert_eq!(scheduler.due_steps(0), 0);
    }
}
