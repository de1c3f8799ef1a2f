use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{in_bounds, MAZE_SIZE};
use crate::error::InvalidTaskError;
use crate::types::Coord;

const SIDE: usize = MAZE_SIZE as usize;

/// Authored content of one maze cell.
///
/// The task file spells these as `"wall"`, `"player"`, `"collectible"`,
/// `"key"`, `"trap"`, `"exit"` and `"enemy"`. Anything else, including
/// `null`, is open floor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CellKind {
    #[default]
    Empty,
    Wall,
    PlayerStart,
    Collectible,
    Key,
    Trap,
    Exit,
    /// Cosmetic marker only; enemies are placed from their path data.
    EnemySpawn,
}

impl CellKind {
    pub fn parse(token: &str) -> Self {
        match token {
            "wall" => Self::Wall,
            "player" => Self::PlayerStart,
            "collectible" => Self::Collectible,
            "key" => Self::Key,
            "trap" => Self::Trap,
            "exit" => Self::Exit,
            "enemy" => Self::EnemySpawn,
            _ => Self::Empty,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Wall => "wall",
            Self::PlayerStart => "player",
            Self::Collectible => "collectible",
            Self::Key => "key",
            Self::Trap => "trap",
            Self::Exit => "exit",
            Self::EnemySpawn => "enemy",
        }
    }
}

impl Serialize for CellKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

impl<'de> Deserialize<'de> for CellKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = Option::<String>::deserialize(deserializer)?;
        Ok(token.as_deref().map(CellKind::parse).unwrap_or_default())
    }
}

/// Fixed 10x10 cell matrix, indexed `[y][x]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Grid {
    cells: [[CellKind; SIDE]; SIDE],
}

impl Grid {
    pub fn from_rows(task_id: &str, rows: &[Vec<CellKind>]) -> Result<Self, InvalidTaskError> {
        if rows.len() != SIDE {
            return Err(InvalidTaskError::RowCount {
                id: task_id.to_string(),
                rows: rows.len(),
                expected: SIDE,
            });
        }
        let mut grid = Self::default();
        for (y, row) in rows.iter().enumerate() {
            if row.len() != SIDE {
                return Err(InvalidTaskError::RowLength {
                    id: task_id.to_string(),
                    row: y,
                    cols: row.len(),
                    expected: SIDE,
                });
            }
            grid.cells[y].copy_from_slice(row);
        }
        Ok(grid)
    }

    pub fn get(&self, at: Coord) -> Option<CellKind> {
        if !in_bounds(at.x, at.y) {
            return None;
        }
        Some(self.cells[at.y as usize][at.x as usize])
    }

    /// Out-of-bounds writes are ignored.
    pub fn set(&mut self, at: Coord, kind: CellKind) {
        if in_bounds(at.x, at.y) {
            self.cells[at.y as usize][at.x as usize] = kind;
        }
    }

    /// Row-major walk over every cell.
    pub fn iter(&self) -> impl Iterator<Item = (Coord, CellKind)> + '_ {
        self.cells.iter().enumerate().flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .map(move |(x, kind)| (Coord::new(x as i32, y as i32), *kind))
        })
    }

    pub fn positions_of(&self, kind: CellKind) -> Vec<Coord> {
        self.iter()
            .filter(|(_, cell)| *cell == kind)
            .map(|(at, _)| at)
            .collect()
    }

    pub fn count(&self, kind: CellKind) -> usize {
        self.iter().filter(|(_, cell)| *cell == kind).count()
    }

    pub fn to_rows(&self) -> Vec<Vec<CellKind>> {
        self.cells.iter().map(|row| row.to_vec()).collect()
    }
}

impl Serialize for Grid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.cells.iter().map(|row| row.as_slice()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EnemyDef {
    pub path: Vec<Coord>,
}

/// A validated, immutable level definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: String,
    pub maze: Grid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    pub enemies: Vec<EnemyDef>,
}

impl Task {
    pub fn player_start(&self) -> Coord {
        self.maze
            .positions_of(CellKind::PlayerStart)
            .first()
            .copied()
            .unwrap_or_default()
    }

    pub fn exit(&self) -> Coord {
        self.maze
            .positions_of(CellKind::Exit)
            .first()
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_rows() -> Vec<Vec<CellKind>> {
        vec![vec![CellKind::Empty; SIDE]; SIDE]
    }

    #[test]
    fn unknown_and_null_tokens_are_open_floor() {
        let cells: Vec<CellKind> =
            serde_json::from_str(r#"["wall", "", null, "path", "exit", "enemy"]"#)
                .expect("cells parse");
        assert_eq!(
            cells,
            vec![
                CellKind::Wall,
                CellKind::Empty,
                CellKind::Empty,
                CellKind::Empty,
                CellKind::Exit,
                CellKind::EnemySpawn,
            ]
        );
    }

    #[test]
    fn short_rows_are_rejected() {
        let mut rows = open_rows();
        rows[4].pop();
        let err = Grid::from_rows("t1", &rows).expect_err("short row");
        assert_eq!(
            err,
            InvalidTaskError::RowLength {
                id: "t1".to_string(),
                row: 4,
                cols: 9,
                expected: 10,
            }
        );

        let err = Grid::from_rows("t1", &rows[..9]).expect_err("missing row");
        assert!(matches!(err, InvalidTaskError::RowCount { rows: 9, .. }));
    }

    #[test]
    fn get_and_set_use_x_as_column() {
        let mut rows = open_rows();
        rows[2][7] = CellKind::Key;
        let mut grid = Grid::from_rows("t", &rows).expect("valid grid");
        assert_eq!(grid.get(Coord::new(7, 2)), Some(CellKind::Key));
        assert_eq!(grid.get(Coord::new(2, 7)), Some(CellKind::Empty));
        assert_eq!(grid.get(Coord::new(10, 0)), None);

        grid.set(Coord::new(7, 2), CellKind::Empty);
        grid.set(Coord::new(-1, 0), CellKind::Wall);
        assert_eq!(grid.count(CellKind::Key), 0);
        assert_eq!(grid.count(CellKind::Wall), 0);
    }

    #[test]
    fn grid_serializes_back_to_authoring_tokens() {
        let mut rows = open_rows();
        rows[0][0] = CellKind::PlayerStart;
        rows[9][9] = CellKind::Exit;
        let grid = Grid::from_rows("t", &rows).expect("valid grid");
        let value = serde_json::to_value(&grid).expect("grid serializes");
        assert_eq!(value[0][0], "player");
        assert_eq!(value[9][9], "exit");
        assert_eq!(value[5][5], "empty");
        assert_eq!(grid.to_rows(), rows);
    }
}
