//! Loading and validation of the authored task pack.
//!
//! The resource is a JSON document `{ "tasks": [ ... ] }`. The document as a
//! whole must parse and carry a non-empty task list; individual tasks that
//! fail validation are reported as [`InvalidTaskError`] and left out.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::constants::in_bounds;
use crate::error::{InvalidTaskError, LoadError};
use crate::maze::{CellKind, EnemyDef, Grid, Task};
use crate::types::Coord;

#[derive(Debug, Deserialize)]
struct RawTaskFile {
    tasks: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    id: Option<Value>,
    maze: Option<Vec<Vec<CellKind>>>,
    help: Option<Value>,
    difficulty: Option<Value>,
    #[serde(default)]
    enemies: Option<Vec<RawEnemy>>,
}

#[derive(Debug, Deserialize)]
struct RawEnemy {
    #[serde(default)]
    path: Vec<Coord>,
}

/// Result of a lenient load: the playable tasks in authored order plus the
/// ones that were rejected.
#[derive(Clone, Debug, Default)]
pub struct TaskCatalog {
    pub tasks: Vec<Task>,
    pub rejected: Vec<InvalidTaskError>,
}

impl TaskCatalog {
    /// Fails on the first rejected task instead of skipping it.
    pub fn into_strict(self) -> Result<Vec<Task>, LoadError> {
        if let Some(first) = self.rejected.into_iter().next() {
            return Err(LoadError::Malformed(first.to_string()));
        }
        Ok(self.tasks)
    }
}

/// Reads the pack and requires every task in it to be valid.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>, LoadError> {
    load_catalog(path)?.into_strict()
}

/// Reads the pack, skipping invalid tasks. Fails only when the file cannot
/// be read, does not parse, or leaves no playable task.
pub fn load_catalog(path: &Path) -> Result<TaskCatalog, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::Unavailable {
        path: path.display().to_string(),
        source,
    })?;
    let catalog = parse_tasks(&text)?;
    info!(
        path = %path.display(),
        tasks = catalog.tasks.len(),
        rejected = catalog.rejected.len(),
        "task pack loaded"
    );
    Ok(catalog)
}

pub fn parse_tasks(text: &str) -> Result<TaskCatalog, LoadError> {
    let parsed: RawTaskFile = serde_json::from_str(text)
        .map_err(|error| LoadError::Malformed(format!("invalid JSON: {error}")))?;
    let values = match parsed.tasks {
        Some(values) if !values.is_empty() => values,
        _ => return Err(LoadError::Malformed("task list is missing or empty".to_string())),
    };
    let catalog = parse_task_values(values);
    if catalog.tasks.is_empty() {
        return Err(LoadError::Malformed(format!(
            "no valid task among {} entries",
            catalog.rejected.len()
        )));
    }
    Ok(catalog)
}

/// Validates already-decoded task objects, such as the snapshot kept in a
/// saved session.
pub fn parse_task_values(values: Vec<Value>) -> TaskCatalog {
    let mut catalog = TaskCatalog::default();
    let mut seen_ids = HashSet::new();
    for (index, value) in values.into_iter().enumerate() {
        match validate_task(index, value, &mut seen_ids) {
            Ok(task) => catalog.tasks.push(task),
            Err(error) => {
                warn!(%error, "skipping invalid task");
                catalog.rejected.push(error);
            }
        }
    }
    catalog
}

fn validate_task(
    index: usize,
    value: Value,
    seen_ids: &mut HashSet<String>,
) -> Result<Task, InvalidTaskError> {
    let fallback_id = value
        .get("id")
        .and_then(scalar_text)
        .unwrap_or_else(|| format!("#{index}"));
    let raw: RawTask = serde_json::from_value(value).map_err(|error| InvalidTaskError::Shape {
        id: fallback_id,
        reason: error.to_string(),
    })?;

    let id = raw
        .id
        .as_ref()
        .and_then(scalar_text)
        .filter(|id| !id.trim().is_empty())
        .ok_or(InvalidTaskError::MissingId { index })?;

    let rows = raw.maze.unwrap_or_default();
    let maze = Grid::from_rows(&id, &rows)?;

    let starts = maze.count(CellKind::PlayerStart);
    if starts != 1 {
        return Err(InvalidTaskError::PlayerStartCount { id, count: starts });
    }
    let exits = maze.count(CellKind::Exit);
    if exits != 1 {
        return Err(InvalidTaskError::ExitCount { id, count: exits });
    }

    let mut enemies = Vec::new();
    for (enemy, raw_enemy) in raw.enemies.unwrap_or_default().into_iter().enumerate() {
        if raw_enemy.path.is_empty() {
            return Err(InvalidTaskError::EmptyEnemyPath { id, enemy });
        }
        if let Some(outside) = raw_enemy.path.iter().find(|at| !in_bounds(at.x, at.y)) {
            return Err(InvalidTaskError::EnemyOutOfBounds {
                id,
                enemy,
                x: outside.x,
                y: outside.y,
            });
        }
        enemies.push(EnemyDef {
            path: raw_enemy.path,
        });
    }

    if !seen_ids.insert(id.clone()) {
        return Err(InvalidTaskError::DuplicateId { id });
    }

    Ok(Task {
        id,
        maze,
        help: raw.help.as_ref().and_then(scalar_text),
        difficulty: raw.difficulty.as_ref().and_then(scalar_text),
        enemies,
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
