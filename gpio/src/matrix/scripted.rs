use crate::matrix::{Cell, Level, MatrixIo};
use crate::timing::Clock;
use crate::{GpioError, GpioResult};
use bitvec::vec::BitVec;
use std::fmt::{Debug, Formatter};
use std::time::{Duration, Instant};

/// A closed contact of one key over a span of time, relative to the matrix origin.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct Contact {
    cell: Cell,
    from: Duration,
    until: Option<Duration>,
}

impl Contact {
    fn is_closed_at(&self, at: Duration) -> bool {
        at >= self.from && self.until.is_none_or(|until| at < until)
    }
}

/// A matrix without hardware behind it, playing back a script of key presses.
///
/// Presses are given as spans of time since the matrix was created, measured on the supplied
/// [Clock]. A row reads active while any driven column has a closed contact on that row, just
/// like a real diode matrix. Paired with a [crate::timing::ManualClock] this makes scanning
/// fully deterministic.
pub struct ScriptedMatrix<'a> {
    clock: &'a dyn Clock,
    origin: Instant,
    rows: usize,
    cols: usize,
    driven: BitVec,
    contacts: Vec<Contact>,
    drive_log: Vec<(usize, Level)>,
}

impl<'a> ScriptedMatrix<'a> {
    pub fn new(rows: usize, cols: usize, clock: &'a dyn Clock) -> Self {
        ScriptedMatrix {
            clock,
            origin: clock.now(),
            rows,
            cols,
            driven: BitVec::repeat(false, cols),
            contacts: Vec::new(),
            drive_log: Vec::new(),
        }
    }

    /// Closes the contact of the cell from `from` until right before `until`.
    pub fn press(&mut self, cell: Cell, from: Duration, until: Duration) -> &mut Self {
        self.contacts.push(Contact { cell, from, until: Some(until) });
        self
    }

    /// Closes the contact of the cell from `from` on, never releasing it.
    pub fn hold(&mut self, cell: Cell, from: Duration) -> &mut Self {
        self.contacts.push(Contact { cell, from, until: None });
        self
    }

    /// Presses the cell `count` times, each press lasting `down` and followed by `up` released.
    pub fn tap_repeatedly(
        &mut self,
        cell: Cell,
        start: Duration,
        count: u32,
        down: Duration,
        up: Duration,
    ) -> &mut Self {
        for i in 0..count {
            let from = start + (down + up) * i;
            self.press(cell, from, from + down);
        }
        self
    }

    /// Gets whether the cell's contact is closed at the given time since the origin.
    pub fn is_closed(&self, cell: Cell, at: Duration) -> bool {
        self.contacts
            .iter()
            .any(|c| c.cell == cell && c.is_closed_at(at))
    }

    /// Gets the columns currently driven high.
    pub fn driven_columns(&self) -> Vec<usize> {
        self.driven.iter_ones().collect()
    }

    /// Gets every [MatrixIo::set_column] call so far, in order.
    pub fn drive_log(&self) -> &[(usize, Level)] {
        &self.drive_log
    }
}

impl Debug for ScriptedMatrix<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScriptedMatrix({}x{}, {} contacts)", self.rows, self.cols, self.contacts.len())
    }
}

impl MatrixIo for ScriptedMatrix<'_> {
    fn rows(&self) -> usize {
        self.rows
    }

    fn columns(&self) -> usize {
        self.cols
    }

    fn set_column(&mut self, col: usize, level: Level) -> GpioResult<()> {
        if col >= self.cols {
            return Err(GpioError::InvalidArgument);
        }
        self.driven.set(col, level.is_high());
        self.drive_log.push((col, level));
        Ok(())
    }

    fn read_row(&self, row: usize) -> GpioResult<bool> {
        if row >= self.rows {
            return Err(GpioError::InvalidArgument);
        }
        let at = self.clock.now().saturating_duration_since(self.origin);
        Ok(self.driven
            .iter_ones()
            .any(|col| self.is_closed(Cell::new(row, col), at)))
    }
}
