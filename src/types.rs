use serde::{Deserialize, Serialize};

use crate::maze::CellKind;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn parse_move(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    /// Screen coordinates: `y` grows downward.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }

    pub fn from_delta(dx: i32, dy: i32) -> Option<Self> {
        match (dx, dy) {
            (0, -1) => Some(Self::Up),
            (0, 1) => Some(Self::Down),
            (-1, 0) => Some(Self::Left),
            (1, 0) => Some(Self::Right),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Loading,
    Ready,
    Playing,
    Won,
    SessionComplete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrapCause {
    TrapCell,
    Enemy,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    LevelStarted {
        #[serde(rename = "taskId")]
        task_id: String,
    },
    PlayerMoved {
        x: i32,
        y: i32,
    },
    CollectiblePicked {
        x: i32,
        y: i32,
    },
    KeyPicked {
        x: i32,
        y: i32,
    },
    ExitOpened {
        x: i32,
        y: i32,
    },
    PlayerTrapped {
        cause: TrapCause,
        deaths: u32,
    },
    LevelWon {
        #[serde(rename = "taskId")]
        task_id: String,
        #[serde(rename = "elapsedMs")]
        elapsed_ms: u64,
    },
    SessionComplete,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelResult {
    #[serde(rename = "taskId")]
    pub task_id: String,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
    pub collectibles: u32,
    #[serde(rename = "collectibleTotal")]
    pub collectible_total: u32,
    pub keys: u32,
    #[serde(rename = "keyTotal")]
    pub key_total: u32,
    pub deaths: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    #[serde(rename = "totalTimeMs")]
    pub total_time_ms: u64,
    pub clock: String,
    pub collectibles: u32,
    #[serde(rename = "collectibleTarget")]
    pub collectible_target: u32,
    pub deaths: u32,
    pub levels: Vec<LevelResult>,
}

/// Everything a renderer needs for one frame. Built from the engine, never
/// read back into it.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub active: bool,
    #[serde(rename = "taskId")]
    pub task_id: Option<String>,
    pub difficulty: Option<String>,
    pub help: String,
    pub tiles: Vec<Vec<CellKind>>,
    pub player: Coord,
    pub exit: Coord,
    #[serde(rename = "exitOpen")]
    pub exit_open: bool,
    pub enemies: Vec<Coord>,
    pub collectibles: u32,
    #[serde(rename = "collectibleTotal")]
    pub collectible_total: u32,
    pub keys: u32,
    #[serde(rename = "keyTotal")]
    pub key_total: u32,
    pub deaths: u32,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
    pub clock: String,
    #[serde(rename = "completedTasks")]
    pub completed_tasks: usize,
    #[serde(rename = "totalTasks")]
    pub total_tasks: usize,
    #[serde(rename = "lastLevel")]
    pub last_level: Option<LevelResult>,
    pub summary: Option<SessionSummary>,
    pub events: Vec<SessionEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_delta_round_trips_through_from_delta() {
        for dir in [
            Direction::Up,
            Direction::Down,
            Direction::Left,
            Direction::Right,
        ] {
            let (dx, dy) = dir.delta();
            assert_eq!(Direction::from_delta(dx, dy), Some(dir));
        }
        assert_eq!(Direction::from_delta(1, 1), None);
        assert_eq!(Direction::from_delta(0, 0), None);
        assert_eq!(Direction::from_delta(2, 0), None);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let value = serde_json::to_value(SessionEvent::PlayerTrapped {
            cause: TrapCause::Enemy,
            deaths: 3,
        })
        .expect("event serializes");
        assert_eq!(value["type"], "player_trapped");
        assert_eq!(value["cause"], "enemy");
        assert_eq!(value["deaths"], 3);
    }
}
