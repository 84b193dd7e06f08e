use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Position;

/// Map symbol for a free cell.
pub const FREE_SYMBOL: char = '0';
/// Map symbol for a wall cell.
pub const WALL_SYMBOL: char = '1';

/// Represents errors that can occur while loading a map.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("Unknown preset map '{name}'")]
    UnknownPreset { name: String },
    #[error("Map has no rows or zero width")]
    EmptyMap,
    #[error("Row {row} has length {found}, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Invalid symbol '{symbol}' at ({x}, {y}), expected '0' or '1'")]
    InvalidSymbol { symbol: char, x: usize, y: usize },
}

/// A read-only occupancy grid of wall cells.
///
/// Stores the wall mask in a flat vector using row-major order. Dimensions
/// and walls are fixed at construction; one `GridMap` is shared by every
/// agent and every step of an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridMap {
    width: usize,
    height: usize,
    walls: Vec<bool>,
}

impl GridMap {
    /// Parses a map from a list of equal-length row strings over `'0'`
    /// (free) and `'1'` (wall). Row index is `y`, character index is `x`.
    ///
    /// Fails if the list is empty, the first row is empty, any row differs
    /// in length, or any character is not one of the two symbols.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self, MapError> {
        if rows.is_empty() {
            return Err(MapError::EmptyMap);
        }
        let width = rows[0].as_ref().chars().count();
        if width == 0 {
            return Err(MapError::EmptyMap);
        }

        let height = rows.len();
        let mut walls = Vec::with_capacity(width * height);
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            let found = row.chars().count();
            if found != width {
                return Err(MapError::RaggedRow {
                    row: y,
                    expected: width,
                    found,
                });
            }
            for (x, symbol) in row.chars().enumerate() {
                match symbol {
                    FREE_SYMBOL => walls.push(false),
                    WALL_SYMBOL => walls.push(true),
                    symbol => return Err(MapError::InvalidSymbol { symbol, x, y }),
                }
            }
        }

        Ok(GridMap {
            width,
            height,
            walls,
        })
    }

    /// Loads a named preset map from the given catalog.
    pub fn from_preset(catalog: &MapCatalog, name: &str) -> Result<Self, MapError> {
        let rows = catalog.get(name).ok_or_else(|| MapError::UnknownPreset {
            name: name.to_string(),
        })?;
        Self::from_rows(rows)
    }

    /// Returns the width of the grid.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the height of the grid.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Checks if the given position is within the grid boundaries.
    #[inline]
    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    /// True iff the position is in bounds and marked as a wall.
    #[inline]
    pub fn is_wall(&self, pos: Position) -> bool {
        self.in_bounds(pos) && self.walls[pos.y * self.width + pos.x]
    }

    /// True iff the position is in bounds and not a wall. Out-of-bounds
    /// cells are never free, so callers need no separate bounds check.
    #[inline]
    pub fn is_free(&self, pos: Position) -> bool {
        self.in_bounds(pos) && !self.walls[pos.y * self.width + pos.x]
    }
}

/// Registry of named preset maps.
///
/// The default catalog carries the built-in "4x4" and "8x8" maps; tests and
/// callers can register their own row lists via [`MapCatalog::insert`].
#[derive(Debug, Clone)]
pub struct MapCatalog {
    presets: HashMap<String, Vec<String>>,
}

impl MapCatalog {
    /// Creates an empty catalog.
    pub fn empty() -> Self {
        MapCatalog {
            presets: HashMap::new(),
        }
    }

    /// Registers (or replaces) a preset under the given name.
    pub fn insert<S: Into<String>, R: Into<String>>(
        &mut self,
        name: S,
        rows: impl IntoIterator<Item = R>,
    ) {
        self.presets
            .insert(name.into(), rows.into_iter().map(Into::into).collect());
    }

    /// Looks up the row strings registered under `name`.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.presets.get(name).map(Vec::as_slice)
    }

    /// Returns the registered preset names in unspecified order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }
}

impl Default for MapCatalog {
    fn default() -> Self {
        let mut catalog = MapCatalog::empty();
        catalog.insert("4x4", ["0000", "0101", "0001", "1000"]);
        catalog.insert(
            "8x8",
            [
                "00000000", "00000000", "00010000", "00000100", "00010000", "01100010", "01001010",
                "00010000",
            ],
        );
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_custom_rows() {
        let map = GridMap::from_rows(&["001", "010", "011"]).unwrap();
        assert_eq!(map.width(), 3);
        assert_eq!(map.height(), 3);
        assert!(map.is_free(Position::new(0, 0)));
        assert!(map.is_wall(Position::new(2, 0)));
        assert!(map.is_wall(Position::new(1, 1)));
        assert!(map.is_free(Position::new(0, 2)));
    }

    #[test]
    fn out_of_bounds_is_never_free() {
        let map = GridMap::from_rows(&["00", "00"]).unwrap();
        assert!(!map.is_free(Position::new(2, 0)));
        assert!(!map.is_free(Position::new(0, 2)));
        assert!(!map.is_wall(Position::new(2, 2)));
    }

    #[test]
    fn rejects_empty_map() {
        assert_eq!(GridMap::from_rows::<&str>(&[]), Err(MapError::EmptyMap));
        assert_eq!(GridMap::from_rows(&[""]), Err(MapError::EmptyMap));
    }

    #[test]
    fn rejects_ragged_rows() {
        assert_eq!(
            GridMap::from_rows(&["000", "00"]),
            Err(MapError::RaggedRow {
                row: 1,
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn rejects_invalid_symbol() {
        assert_eq!(
            GridMap::from_rows(&["010", "0x0"]),
            Err(MapError::InvalidSymbol {
                symbol: 'x',
                x: 1,
                y: 1
            })
        );
    }

    #[test]
    fn loads_builtin_presets() {
        let catalog = MapCatalog::default();
        let small = GridMap::from_preset(&catalog, "4x4").unwrap();
        assert_eq!((small.width(), small.height()), (4, 4));
        assert!(small.is_wall(Position::new(1, 1)));
        assert!(small.is_wall(Position::new(3, 1)));
        assert!(small.is_wall(Position::new(3, 2)));
        assert!(small.is_wall(Position::new(0, 3)));

        let large = GridMap::from_preset(&catalog, "8x8").unwrap();
        assert_eq!((large.width(), large.height()), (8, 8));
        assert!(large.is_wall(Position::new(3, 2)));
        assert!(large.is_free(Position::new(0, 0)));
    }

    #[test]
    fn unknown_preset_fails() {
        let catalog = MapCatalog::default();
        assert_eq!(
            GridMap::from_preset(&catalog, "16x16"),
            Err(MapError::UnknownPreset {
                name: "16x16".to_string()
            })
        );
    }

    #[test]
    fn synthetic_catalog() {
        let mut catalog = MapCatalog::empty();
        catalog.insert("corridor", ["000", "111"]);
        let map = GridMap::from_preset(&catalog, "corridor").unwrap();
        assert!(map.is_free(Position::new(2, 0)));
        assert!(map.is_wall(Position::new(2, 1)));
    }
}
