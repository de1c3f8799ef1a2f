pub const MAZE_SIZE: i32 = 10;

pub const ENEMY_TICK_MS: u64 = 500;
pub const CLOCK_TICK_MS: u64 = 1_000;

pub const TILT_SCALE_FACTOR: f64 = 0.003;
pub const TILT_STEP_THRESHOLD: f64 = 1.0;

pub const COLLECTIBLE_TARGET: u32 = 25;

pub const SESSION_STORE_VERSION: u8 = 1;

pub const NO_HELP_TEXT: &str = "No help available for this level.";

/// Upper bound on queued render events between two snapshots.
pub const MAX_PENDING_EVENTS: usize = 256;

pub fn in_bounds(x: i32, y: i32) -> bool {
    (0..MAZE_SIZE).contains(&x) && (0..MAZE_SIZE).contains(&y)
}
