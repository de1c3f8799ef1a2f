//! Error types for task loading, validation and session persistence.

use thiserror::Error;

/// The task resource could not be turned into a playable task list.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("task resource {path} is unavailable: {source}")]
    Unavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("task resource is malformed: {0}")]
    Malformed(String),
}

/// A single authored task failed validation and is left out of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTaskError {
    #[error("task #{index} has no id")]
    MissingId { index: usize },

    #[error("task '{id}' appears more than once")]
    DuplicateId { id: String },

    #[error("task '{id}' is not a task object: {reason}")]
    Shape { id: String, reason: String },

    #[error("task '{id}' maze has {rows} rows, expected {expected}")]
    RowCount {
        id: String,
        rows: usize,
        expected: usize,
    },

    #[error("task '{id}' maze row {row} has {cols} cells, expected {expected}")]
    RowLength {
        id: String,
        row: usize,
        cols: usize,
        expected: usize,
    },

    #[error("task '{id}' has {count} player-start cells, expected 1")]
    PlayerStartCount { id: String, count: usize },

    #[error("task '{id}' has {count} exit cells, expected 1")]
    ExitCount { id: String, count: usize },

    #[error("task '{id}' enemy #{enemy} has an empty path")]
    EmptyEnemyPath { id: String, enemy: usize },

    #[error("task '{id}' enemy #{enemy} path leaves the maze at ({x},{y})")]
    EnemyOutOfBounds {
        id: String,
        enemy: usize,
        x: i32,
        y: i32,
    },
}

/// Saved session data could not be read or written.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt session data: {0}")]
    Corrupt(String),

    #[error("unsupported session version {0}")]
    UnsupportedVersion(u8),
}
