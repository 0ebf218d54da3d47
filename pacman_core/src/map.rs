use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::{PacmanError, Position, Result};

/// A 2D grid stored as a flat vector in row-major order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Builds a grid by calling `f(position)` for every cell, row by row.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn from_generator<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(Position) -> T,
    {
        let size = width.checked_mul(height).expect("Grid size overflow");
        let mut cells = Vec::with_capacity(size);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(Position { x, y }));
            }
        }
        Grid {
            width,
            height,
            cells,
        }
    }

    /// Number of columns.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Flat index of `position`, or `None` when out of bounds.
    #[inline]
    pub fn index_of(&self, position: Position) -> Option<usize> {
        self.contains(position)
            .then(|| position.y * self.width + position.x)
    }

    /// Whether `position` lies inside the grid.
    #[inline]
    pub fn contains(&self, position: Position) -> bool {
        position.x < self.width && position.y < self.height
    }

    /// Cell at `position`, or `None` when out of bounds.
    pub fn get(&self, position: Position) -> Option<&T> {
        self.index_of(position).map(|index| &self.cells[index])
    }

    /// Cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.cells.iter()
    }

    /// Yields `(position, &cell)` in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let width = self.width;
        self.cells.iter().enumerate().map(move |(index, cell)| {
            (
                Position {
                    x: index % width,
                    y: index / width,
                },
                cell,
            )
        })
    }

    /// Rows of the grid, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        // chunks() panics on zero; an empty grid has no rows anyway
        self.cells.chunks(self.width.max(1))
    }
}

impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, position: Position) -> &Self::Output {
        match self.index_of(position) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                position.x, position.y, self.width, self.height
            ),
        }
    }
}

impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, position: Position) -> &mut Self::Output {
        match self.index_of(position) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                position.x, position.y, self.width, self.height
            ),
        }
    }
}

/// One character of the level format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapSymbol {
    Floor,
    Wall,
    Food,
    Powerup,
    PacmanSpawn,
    GhostSpawn,
}

impl MapSymbol {
    /// Parses the symbol found at `(x, y)`; the coordinates only feed the error.
    pub fn parse(symbol: char, x: usize, y: usize) -> Result<Self> {
        match symbol {
            ' ' => Ok(MapSymbol::Floor),
            '#' => Ok(MapSymbol::Wall),
            '*' => Ok(MapSymbol::Food),
            '@' => Ok(MapSymbol::Powerup),
            'P' => Ok(MapSymbol::PacmanSpawn),
            'M' => Ok(MapSymbol::GhostSpawn),
            unknown => Err(PacmanError::InvalidMapSymbol {
                symbol: unknown,
                x,
                y,
            }),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            MapSymbol::Floor => ' ',
            MapSymbol::Wall => '#',
            MapSymbol::Food => '*',
            MapSymbol::Powerup => '@',
            MapSymbol::PacmanSpawn => 'P',
            MapSymbol::GhostSpawn => 'M',
        }
    }
}

/// A level as handed to the simulation: dimensions plus the flattened symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    /// Namespace used for saved models
    pub id: String,
    pub width: usize,
    pub height: usize,
    /// Row-major symbols, exactly `width * height` characters
    pub symbols: String,
}

impl Level {
    /// Loads a level from its text form, one map row per line.
    ///
    /// Shorter rows are padded with floor up to the widest row. Symbols are
    /// validated later, when a game state is built from the level.
    pub fn parse(id: impl Into<String>, text: &str) -> Result<Self> {
        let rows: Vec<&str> = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .collect();
        // Drop trailing blank lines; blank lines inside the map are floor rows.
        let height = rows
            .iter()
            .rposition(|row| !row.trim().is_empty())
            .map_or(0, |last| last + 1);
        let rows = &rows[..height];

        let width = rows.iter().map(|row| row.chars().count()).max().unwrap_or(0);
        if width == 0 || height == 0 {
            return Err(PacmanError::EmptyMap);
        }

        let mut symbols = String::with_capacity(width * height);
        for row in rows {
            let len = row.chars().count();
            symbols.push_str(row);
            symbols.extend(std::iter::repeat_n(' ', width - len));
        }

        Ok(Level {
            id: id.into(),
            width,
            height,
            symbols,
        })
    }
}
