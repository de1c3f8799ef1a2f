use std::path::PathBuf;

use crate::constants::{COLLECTIBLE_TARGET, ENEMY_TICK_MS, TILT_SCALE_FACTOR};
use crate::server_utils::{parse_flag, parse_port, parse_seed};

/// What happens when every task of the pool has been played.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CyclePolicy {
    /// Report the session summary and stop.
    #[default]
    EndSession,
    /// Clear the completed set and keep drawing.
    LoopForever,
}

#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    pub cycle_policy: CyclePolicy,
    pub enemy_tick_ms: u64,
    pub tilt_scale: f64,
    pub collectible_target: u32,
    /// Keep a copy of the task pack in the saved session.
    pub persist_task_snapshot: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cycle_policy: CyclePolicy::EndSession,
            enemy_tick_ms: ENEMY_TICK_MS,
            tilt_scale: TILT_SCALE_FACTOR,
            collectible_target: COLLECTIBLE_TARGET,
            persist_task_snapshot: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub tasks_path: PathBuf,
    pub session_path: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub seed: Option<u32>,
    pub session: SessionOptions,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let cycle_policy = if parse_flag(lookup("LOOP_TASKS").as_deref()) {
            CyclePolicy::LoopForever
        } else {
            CyclePolicy::EndSession
        };
        Self {
            port: parse_port(lookup("PORT").as_deref()).unwrap_or(8080),
            tasks_path: lookup("TASKS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/tasks.json")),
            session_path: lookup("SESSION_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".data/session.json")),
            static_dir: lookup("STATIC_DIR").map(PathBuf::from),
            seed: parse_seed(lookup("SEED").as_deref()),
            session: SessionOptions {
                cycle_policy,
                ..SessionOptions::default()
            },
        }
    }
}
