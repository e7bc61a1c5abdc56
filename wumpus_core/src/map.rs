use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::Position;

/// The four orthogonal steps, in the order neighbours are visited.
const DIRECTIONS: [(isize, isize); 4] = [
    (1, 0),  // Right
    (-1, 0), // Left
    (0, 1),  // Down
    (0, -1), // Up
];

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order.
/// Every hazard board and belief layer in the crate is a `Grid` of some
/// per-cell record, addressed by [`Position`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled with default values.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn new(width: usize, height: usize) -> Self
    where
        T: Default + Clone,
    {
        let size = width.checked_mul(height).expect("Grid size overflow");
        Grid {
            width,
            height,
            cells: vec![T::default(); size],
        }
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

    #[inline]
    fn index_of(&self, position: Position) -> Option<usize> {
        if self.contains(position) {
            Some(position.y * self.width + position.x)
        } else {
            None
        }
    }

    /// Checks if the given position is within the grid boundaries.
    #[inline]
    pub fn contains(&self, position: Position) -> bool {
        position.x < self.width && position.y < self.height
    }

    /// Gets an immutable reference to the cell at the given position.
    ///
    /// Returns `None` if the position is out of bounds.
    pub fn get(&self, position: Position) -> Option<&T> {
        let index = self.index_of(position)?;
        self.cells.get(index)
    }

    /// Gets a mutable reference to the cell at the given position.
    ///
    /// Returns `None` if the position is out of bounds.
    pub fn get_mut(&mut self, position: Position) -> Option<&mut T> {
        let index = self.index_of(position)?;
        self.cells.get_mut(index)
    }

    /// Returns an iterator over every position of the grid in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = Position> + use<T> {
        let width = self.width;
        (0..self.cells.len()).map(move |index| Position {
            x: index % width,
            y: index / width,
        })
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell.
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

    /// Returns the in-bounds orthogonal neighbours of `position`.
    pub fn neighbors(&self, position: Position) -> impl Iterator<Item = Position> + use<T> {
        let (width, height) = (self.width, self.height);
        DIRECTIONS.iter().filter_map(move |(dx, dy)| {
            let x = position.x.checked_add_signed(*dx)?;
            let y = position.y.checked_add_signed(*dy)?;
            (x < width && y < height).then_some(Position { x, y })
        })
    }
}

/// Indexing using Position coordinates for access
impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: Position) -> &Self::Output {
        match self.index_of(index) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index {} out of bounds for grid size ({}, {})",
                index, self.width, self.height
            ),
        }
    }
}

/// Indexing using Position coordinates for mutable access
impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, index: Position) -> &mut Self::Output {
        let (width, height) = (self.width, self.height);
        match self.index_of(index) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Grid index {} out of bounds for grid size ({}, {})",
                index, width, height
            ),
        }
    }
}
