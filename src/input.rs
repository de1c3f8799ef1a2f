//! Turns raw player input into single-cell moves.
//!
//! Keys and taps map one-to-one onto steps. Device tilt is continuous, so
//! each axis accumulates scaled readings and fires one step whenever it
//! crosses the threshold, then starts over from zero.

use crate::constants::{TILT_SCALE_FACTOR, TILT_STEP_THRESHOLD};
use crate::types::{Coord, Direction};

pub fn key_direction(key: &str) -> Option<Direction> {
    match key {
        "ArrowUp" | "w" => Some(Direction::Up),
        "ArrowDown" | "s" => Some(Direction::Down),
        "ArrowLeft" | "a" => Some(Direction::Left),
        "ArrowRight" | "d" => Some(Direction::Right),
        _ => None,
    }
}

/// A tap only counts when it lands on an orthogonal neighbour of the player.
pub fn click_direction(player: Coord, target: Coord) -> Option<Direction> {
    let dx = target.x - player.x;
    let dy = target.y - player.y;
    if dx.abs() + dy.abs() != 1 {
        return None;
    }
    Direction::from_delta(dx, dy)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TiltAccumulator {
    scale: f64,
    x: f64,
    y: f64,
}

impl Default for TiltAccumulator {
    fn default() -> Self {
        Self::new(TILT_SCALE_FACTOR)
    }
}

impl TiltAccumulator {
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            x: 0.0,
            y: 0.0,
        }
    }

    pub fn totals(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn reset(&mut self) {
        self.x = 0.0;
        self.y = 0.0;
    }

    /// `gamma` (left/right tilt) drives x, `beta` (front/back) drives y.
    /// Returns at most one step per axis, x first.
    pub fn feed(&mut self, beta: f64, gamma: f64) -> Vec<Direction> {
        let mut steps = Vec::with_capacity(2);
        self.x += gamma * self.scale;
        self.y += beta * self.scale;

        if let Some(dir) = fire(&mut self.x, Direction::Right, Direction::Left) {
            steps.push(dir);
        }
        if let Some(dir) = fire(&mut self.y, Direction::Down, Direction::Up) {
            steps.push(dir);
        }
        steps
    }
}

fn fire(total: &mut f64, positive: Direction, negative: Direction) -> Option<Direction> {
    let dir = if *total >= TILT_STEP_THRESHOLD {
        positive
    } else if *total <= -TILT_STEP_THRESHOLD {
        negative
    } else {
        return None;
    };
    *total = 0.0;
    Some(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_single_steps() {
        assert_eq!(key_direction("ArrowUp"), Some(Direction::Up));
        assert_eq!(key_direction("w"), Some(Direction::Up));
        assert_eq!(key_direction("s"), Some(Direction::Down));
        assert_eq!(key_direction("a"), Some(Direction::Left));
        assert_eq!(key_direction("ArrowRight"), Some(Direction::Right));
        assert_eq!(key_direction("Enter"), None);
        assert_eq!(key_direction("q"), None);
    }

    #[test]
    fn clicks_require_manhattan_distance_one() {
        let player = Coord::new(4, 4);
        assert_eq!(
            click_direction(player, Coord::new(5, 4)),
            Some(Direction::Right)
        );
        assert_eq!(click_direction(player, Coord::new(4, 3)), Some(Direction::Up));
        assert_eq!(click_direction(player, Coord::new(5, 5)), None);
        assert_eq!(click_direction(player, Coord::new(6, 4)), None);
        assert_eq!(click_direction(player, player), None);
    }

    #[test]
    fn gamma_fires_one_right_step_and_resets_x() {
        let mut tilt = TiltAccumulator::new(0.003);
        let gamma = 0.4 / 0.003;
        let mut steps = Vec::new();
        let mut readings = 0;
        while steps.is_empty() {
            steps = tilt.feed(0.0, gamma);
            readings += 1;
            assert!(readings <= 3, "threshold should be crossed by the third reading");
        }
        assert_eq!(steps, vec![Direction::Right]);
        assert_eq!(readings, 3);
        assert_eq!(tilt.totals().0, 0.0);
    }

    #[test]
    fn axes_accumulate_and_fire_independently() {
        let mut tilt = TiltAccumulator::new(0.01);
        assert!(tilt.feed(-60.0, 50.0).is_empty());
        let steps = tilt.feed(-60.0, 50.0);
        assert_eq!(steps, vec![Direction::Right, Direction::Up]);
        assert_eq!(tilt.totals(), (0.0, 0.0));

        assert!(tilt.feed(50.0, 0.0).is_empty());
        let steps = tilt.feed(50.0, -100.0);
        assert_eq!(steps, vec![Direction::Left, Direction::Down]);
    }

    #[test]
    fn opposite_readings_cancel_out() {
        let mut tilt = TiltAccumulator::new(0.01);
        for _ in 0..50 {
            assert!(tilt.feed(0.0, 60.0).is_empty());
            assert!(tilt.feed(0.0, -60.0).is_empty());
        }
        assert!(tilt.totals().0.abs() < 1e-9);
        tilt.reset();
        assert_eq!(tilt.totals(), (0.0, 0.0));
    }
}
