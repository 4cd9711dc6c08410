//! Key matrix scanning.
//!
//! A matrix wires every key between one column line and one row line. Driving a single column
//! high and sampling the rows tells which keys of that column are closed; sweeping all columns
//! yields a [ScanFrame].
mod gpio;
mod scripted;

use crate::timing::Clock;
use crate::{GpioError, GpioResult};
use bitvec::vec::BitVec;
use log::trace;
use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;
pub use gpio::*;
pub use scripted::*;

/// A single key position in the matrix.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub const fn new(row: usize, col: usize) -> Self {
        Cell { row, col }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}C{}", self.row, self.col)
    }
}

/// Electrical level a column line is driven to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Level {
    High,
    Low,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

/// The electrical side of a key matrix: column outputs and row inputs.
///
/// Setting one column must never change the level of any other column, and a row read taken
/// after the settle delay must reflect the contacts of the currently driven columns.
pub trait MatrixIo: Debug {
    /// Gets the amount of row lines.
    fn rows(&self) -> usize;

    /// Gets the amount of column lines.
    fn columns(&self) -> usize;

    /// Drives a single column line.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the column does not exist.
    fn set_column(&mut self, col: usize, level: Level) -> GpioResult<()>;

    /// Reads whether the row line is active.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the row does not exist.
    fn read_row(&self, row: usize) -> GpioResult<bool>;
}

impl<M: MatrixIo + ?Sized> MatrixIo for &mut M {
    fn rows(&self) -> usize {
        (**self).rows()
    }

    fn columns(&self) -> usize {
        (**self).columns()
    }

    fn set_column(&mut self, col: usize, level: Level) -> GpioResult<()> {
        (**self).set_column(col, level)
    }

    fn read_row(&self, row: usize) -> GpioResult<bool> {
        (**self).read_row(row)
    }
}

impl<M: MatrixIo + ?Sized> MatrixIo for Box<M> {
    fn rows(&self) -> usize {
        (**self).rows()
    }

    fn columns(&self) -> usize {
        (**self).columns()
    }

    fn set_column(&mut self, col: usize, level: Level) -> GpioResult<()> {
        (**self).set_column(col, level)
    }

    fn read_row(&self, row: usize) -> GpioResult<bool> {
        (**self).read_row(row)
    }
}

/// The result of one full matrix sweep: which cells were electrically active.
#[derive(Clone, Eq, PartialEq)]
pub struct ScanFrame {
    rows: usize,
    cols: usize,
    active: BitVec,
}

impl ScanFrame {
    /// Creates a frame with every cell inactive.
    pub fn new(rows: usize, cols: usize) -> Self {
        ScanFrame {
            rows,
            cols,
            active: BitVec::repeat(false, rows * cols),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.cols
    }

    fn index(&self, cell: Cell) -> Option<usize> {
        if cell.row < self.rows && cell.col < self.cols {
            Some(cell.row * self.cols + cell.col)
        } else {
            None
        }
    }

    /// Gets whether the cell was active. Cells outside the frame are never active.
    pub fn is_active(&self, cell: Cell) -> bool {
        self.index(cell).is_some_and(|i| self.active[i])
    }

    /// Marks the cell as active or inactive.
    ///
    /// # Panics
    /// If the cell lies outside the frame.
    pub fn set(&mut self, cell: Cell, active: bool) {
        let index = self.index(cell)
            .unwrap_or_else(|| panic!("{} outside of a {}x{} frame", cell, self.rows, self.cols));
        self.active.set(index, active);
    }

    pub fn with(mut self, cell: Cell, active: bool) -> Self {
        self.set(cell, active);
        self
    }

    /// Iterates over the active cells, row by row.
    pub fn active_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.active
            .iter_ones()
            .map(|i| Cell::new(i / self.cols, i % self.cols))
    }

    pub fn active_count(&self) -> usize {
        self.active.count_ones()
    }
}

impl Debug for ScanFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanFrame")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("active", &self.active_cells().collect::<Vec<_>>())
            .finish()
    }
}

/// Draws the frame as a grid, `#` for active cells and `.` for the rest.
impl Display for ScanFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for row in 0..self.rows {
            if row > 0 {
                writeln!(f)?;
            }
            for col in 0..self.cols {
                let c = if self.is_active(Cell::new(row, col)) { '#' } else { '.' };
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

/// Sweeps a [MatrixIo] column by column.
///
/// The scanner does not pace itself; the caller decides how often to scan.
#[derive(Debug)]
pub struct MatrixScanner<M> {
    io: M,
    settle_delay: Duration,
}

impl<M: MatrixIo> MatrixScanner<M> {
    pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1);

    pub fn new(io: M) -> Self {
        MatrixScanner {
            io,
            settle_delay: Self::DEFAULT_SETTLE_DELAY,
        }
    }

    /// Sets how long to wait between driving a column and sampling the rows.
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Gets the time one [Self::scan] spends waiting on settle delays.
    pub fn scan_latency(&self) -> Duration {
        self.settle_delay * self.io.columns() as u32
    }

    pub fn rows(&self) -> usize {
        self.io.rows()
    }

    pub fn columns(&self) -> usize {
        self.io.columns()
    }

    pub fn io(&self) -> &M {
        &self.io
    }

    /// Performs one full pass over the matrix.
    ///
    /// Columns are visited in ascending order. Each one is driven high while all others are
    /// driven low, then the rows are sampled in ascending order after the settle delay. All
    /// columns are left low afterwards.
    pub fn scan(&mut self, clock: &dyn Clock) -> GpioResult<ScanFrame> {
        let rows = self.io.rows();
        let cols = self.io.columns();
        let mut frame = ScanFrame::new(rows, cols);

        for col in 0..cols {
            for other in 0..cols {
                self.io.set_column(other, Level::from(other == col))?;
            }

            clock.sleep(self.settle_delay);

            for row in 0..rows {
                frame.set(Cell::new(row, col), self.io.read_row(row)?);
            }
        }

        self.release_all()?;

        trace!("Scanned {} active cell(s)", frame.active_count());
        Ok(frame)
    }

    /// Samples a single cell: drives its column high, waits for it to settle, reads its row and
    /// drives the column low again.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the cell lies outside the matrix.
    pub fn poll_cell(&mut self, cell: Cell, clock: &dyn Clock) -> GpioResult<bool> {
        if cell.row >= self.io.rows() || cell.col >= self.io.columns() {
            return Err(GpioError::InvalidArgument);
        }

        self.io.set_column(cell.col, Level::High)?;
        clock.sleep(self.settle_delay);
        let active = self.io.read_row(cell.row)?;
        self.io.set_column(cell.col, Level::Low)?;

        Ok(active)
    }

    /// Drives every column low, the idle-safe state of the matrix.
    pub fn release_all(&mut self) -> GpioResult<()> {
        for col in 0..self.io.columns() {
            self.io.set_column(col, Level::Low)?;
        }
        Ok(())
    }
}

/// Parses a list of pin numbers separated by commas, spaces or semicolons.
///
/// # Errors
/// - `GpioError::InvalidArgument` if the list is empty or contains something else than numbers.
pub fn parse_pin_list(pin_str: &str) -> GpioResult<Vec<usize>> {
    let pins = pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| GpioError::InvalidArgument))
        .collect::<GpioResult<Vec<usize>>>()?;

    if pins.is_empty() {
        return Err(GpioError::InvalidArgument);
    }
    Ok(pins)
}
