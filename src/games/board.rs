//! Game board: a square grid of concealed bomb/safe cells
//!
//! Bomb placement is fixed at generation. Each cell is an independent
//! Bernoulli trial, so the realized bomb count varies around
//! `size² × probability / 100` and callers must not assume an exact count.

use crate::common::traits::RandomSource;
use crate::common::types::CellPosition;
use crate::errors::{GameError, GameResult};
use serde::{Deserialize, Serialize};

pub const MIN_BOARD_SIZE: usize = 3;
pub const MAX_BOARD_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    is_bomb: bool,
    revealed: bool,
}

impl Cell {
    pub fn position(&self) -> CellPosition {
        CellPosition::new(self.row, self.col)
    }

    pub fn is_bomb(&self) -> bool {
        self.is_bomb
    }

    pub fn is_revealed(&self) -> bool {
        self.revealed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    size: usize,
    bomb_probability: f64,
    /// Row-major
    cells: Vec<Cell>,
    safe_cells: usize,
}

impl Board {
    /// Generate a board, sampling every cell in row-major order
    pub fn generate<R: RandomSource + ?Sized>(
        size: usize,
        bomb_probability: f64,
        random: &mut R,
    ) -> GameResult<Self> {
        if !(MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&size) {
            return Err(GameError::InvalidConfiguration(format!(
                "grid size {} outside {}..={}",
                size, MIN_BOARD_SIZE, MAX_BOARD_SIZE
            )));
        }
        if !bomb_probability.is_finite() || !(0.0..=100.0).contains(&bomb_probability) {
            return Err(GameError::InvalidConfiguration(format!(
                "bomb probability {} outside 0..=100",
                bomb_probability
            )));
        }

        let mut cells = Vec::with_capacity(size * size);
        for row in 0..size {
            for col in 0..size {
                let is_bomb = random.next_unit() * 100.0 < bomb_probability;
                cells.push(Cell {
                    row,
                    col,
                    is_bomb,
                    revealed: false,
                });
            }
        }
        let safe_cells = cells.iter().filter(|cell| !cell.is_bomb).count();

        tracing::debug!(
            size,
            bomb_probability,
            bombs = cells.len() - safe_cells,
            "Generated board"
        );

        Ok(Self {
            size,
            bomb_probability,
            cells,
            safe_cells,
        })
    }

    /// Reveal a cell; returns `true` if it was a bomb
    pub fn reveal(&mut self, row: usize, col: usize) -> GameResult<bool> {
        let index = self.index(row, col)?;
        let cell = &mut self.cells[index];
        if cell.revealed {
            return Err(GameError::CellAlreadyRevealed(CellPosition::new(row, col)));
        }
        cell.revealed = true;
        Ok(cell.is_bomb)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bomb_probability(&self) -> f64 {
        self.bomb_probability
    }

    pub fn safe_cell_count(&self) -> usize {
        self.safe_cells
    }

    pub fn bomb_count(&self) -> usize {
        self.cells.len() - self.safe_cells
    }

    pub fn revealed_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.revealed).count()
    }

    pub fn cell(&self, row: usize, col: usize) -> GameResult<&Cell> {
        self.index(row, col).map(|index| &self.cells[index])
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Revealed positions in row-major order
    pub fn revealed_positions(&self) -> Vec<CellPosition> {
        self.cells
            .iter()
            .filter(|cell| cell.revealed)
            .map(Cell::position)
            .collect()
    }

    fn index(&self, row: usize, col: usize) -> GameResult<usize> {
        if row >= self.size || col >= self.size {
            return Err(GameError::OutOfBounds {
                row,
                col,
                size: self.size,
            });
        }
        Ok(row * self.size + col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::random::{SequenceRandom, StdRandom};

    #[test]
    fn test_generate_rejects_bad_configuration() {
        let mut random = SequenceRandom::constant(0.5);
        assert!(matches!(
            Board::generate(2, 20.0, &mut random),
            Err(GameError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Board::generate(11, 20.0, &mut random),
            Err(GameError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Board::generate(5, 100.5, &mut random),
            Err(GameError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Board::generate(5, f64::NAN, &mut random),
            Err(GameError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_bomb_placement_follows_samples() {
        // 0.1 * 100 = 10 < 25 -> bomb, 0.9 * 100 = 90 -> safe
        let mut random = SequenceRandom::new(vec![0.1, 0.9, 0.9]);
        let board = Board::generate(3, 25.0, &mut random).unwrap();

        let bombs: Vec<bool> = board.cells().iter().map(Cell::is_bomb).collect();
        assert_eq!(bombs, vec![true, false, false, true, false, false, true, false, false]);
        assert_eq!(board.bomb_count(), 3);
        assert_eq!(board.safe_cell_count(), 6);
    }

    #[test]
    fn test_probability_extremes() {
        let mut random = StdRandom::seeded(7);
        let board = Board::generate(10, 0.0, &mut random).unwrap();
        assert_eq!(board.bomb_count(), 0);

        let board = Board::generate(10, 100.0, &mut random).unwrap();
        assert_eq!(board.safe_cell_count(), 0);
    }

    #[test]
    fn test_reveal_once_only() {
        let mut random = SequenceRandom::constant(0.99);
        let mut board = Board::generate(3, 50.0, &mut random).unwrap();

        assert_eq!(board.reveal(1, 2), Ok(false));
        assert_eq!(
            board.reveal(1, 2),
            Err(GameError::CellAlreadyRevealed(CellPosition::new(1, 2)))
        );
        assert!(board.cell(1, 2).unwrap().is_revealed());
        assert_eq!(board.revealed_count(), 1);
    }

    #[test]
    fn test_reveal_out_of_bounds() {
        let mut random = SequenceRandom::constant(0.99);
        let mut board = Board::generate(4, 10.0, &mut random).unwrap();

        assert_eq!(
            board.reveal(4, 0),
            Err(GameError::OutOfBounds { row: 4, col: 0, size: 4 })
        );
        assert_eq!(board.revealed_count(), 0);
    }

    #[test]
    fn test_same_seed_same_board() {
        let a = Board::generate(6, 30.0, &mut StdRandom::seeded(1234)).unwrap();
        let b = Board::generate(6, 30.0, &mut StdRandom::seeded(1234)).unwrap();
        assert_eq!(a.cells(), b.cells());
    }

    #[test]
    fn test_bomb_rate_converges_to_probability() {
        let mut random = StdRandom::seeded(2024);
        let trials = 2_000;
        let size = 5;
        let probability = 25.0;

        let total_bombs: usize = (0..trials)
            .map(|_| Board::generate(size, probability, &mut random).unwrap().bomb_count())
            .sum();

        let observed = total_bombs as f64 / (trials * size * size) as f64;
        // 50_000 Bernoulli trials: standard error ~0.0019
        assert!((observed - 0.25).abs() < 0.01, "observed rate {}", observed);
    }
}
