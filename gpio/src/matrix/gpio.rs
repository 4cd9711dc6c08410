use crate::matrix::{Level, MatrixIo};
use crate::{GpioBias, GpioDriver, GpioError, GpioInput, GpioOutput, GpioResult};
use std::fmt::{Debug, Formatter};

/// A key matrix wired straight to GPIO lines.
///
/// Columns are push-pull outputs, idle low. Rows are inputs pulled down, so a row only reads
/// high through a closed key on a column that is driven high.
pub struct GpioMatrix<'a> {
    columns: Vec<Box<dyn GpioOutput + 'a>>,
    rows: Vec<Box<dyn GpioInput + 'a>>,
}

impl<'a> GpioMatrix<'a> {
    /// Creates a new `GpioMatrix` from already configured lines.
    pub fn new(columns: Vec<Box<dyn GpioOutput + 'a>>, rows: Vec<Box<dyn GpioInput + 'a>>) -> Self {
        GpioMatrix { columns, rows }
    }

    /// Claims the given pins from the driver: columns as outputs driven low, rows as
    /// pulled-down inputs.
    pub fn open<D: GpioDriver + ?Sized>(
        driver: &'a D,
        column_pins: &[usize],
        row_pins: &[usize],
    ) -> GpioResult<Self> {
        let columns = column_pins
            .iter()
            .map(|&pin| driver.output(pin, false))
            .collect::<GpioResult<Vec<_>>>()?;
        let rows = row_pins
            .iter()
            .map(|&pin| driver.input(pin, GpioBias::PullDown))
            .collect::<GpioResult<Vec<_>>>()?;

        Ok(GpioMatrix::new(columns, rows))
    }
}

impl Debug for GpioMatrix<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpioMatrix(cols: {:?}, rows: {:?})", self.columns, self.rows)
    }
}

impl MatrixIo for GpioMatrix<'_> {
    fn rows(&self) -> usize {
        self.rows.len()
    }

    fn columns(&self) -> usize {
        self.columns.len()
    }

    fn set_column(&mut self, col: usize, level: Level) -> GpioResult<()> {
        self.columns
            .get(col)
            .ok_or(GpioError::InvalidArgument)?
            .write(level.is_high())
    }

    fn read_row(&self, row: usize) -> GpioResult<bool> {
        self.rows
            .get(row)
            .ok_or(GpioError::InvalidArgument)?
            .read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Lines backed by a plain vector of levels.
    #[derive(Debug)]
    struct FakeDriver {
        levels: RefCell<Vec<bool>>,
        claims: RefCell<Vec<(usize, Option<GpioBias>)>>,
    }

    impl FakeDriver {
        fn new(count: usize) -> Self {
            FakeDriver {
                levels: RefCell::new(vec![false; count]),
                claims: RefCell::new(Vec::new()),
            }
        }

        fn claim(&self, index: usize, bias: Option<GpioBias>) -> GpioResult<()> {
            if index >= self.levels.borrow().len() {
                return Err(GpioError::InvalidArgument);
            }
            if self.claims.borrow().iter().any(|(i, _)| *i == index) {
                return Err(GpioError::AlreadyInUse);
            }
            self.claims.borrow_mut().push((index, bias));
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FakeLine<'a> {
        driver: &'a FakeDriver,
        index: usize,
    }

    impl GpioInput for FakeLine<'_> {
        fn read(&self) -> GpioResult<bool> {
            Ok(self.driver.levels.borrow()[self.index])
        }
    }

    impl GpioOutput for FakeLine<'_> {
        fn write(&self, value: bool) -> GpioResult<()> {
            self.driver.levels.borrow_mut()[self.index] = value;
            Ok(())
        }
    }

    impl GpioDriver for FakeDriver {
        fn count(&self) -> GpioResult<usize> {
            Ok(self.levels.borrow().len())
        }

        fn input(&self, index: usize, bias: GpioBias) -> GpioResult<Box<dyn GpioInput + '_>> {
            self.claim(index, Some(bias))?;
            Ok(Box::new(FakeLine { driver: self, index }))
        }

        fn output(&self, index: usize, initial: bool) -> GpioResult<Box<dyn GpioOutput + '_>> {
            self.claim(index, None)?;
            self.levels.borrow_mut()[index] = initial;
            Ok(Box::new(FakeLine { driver: self, index }))
        }
    }

    #[test]
    fn open_claims_columns_as_outputs_and_rows_pulled_down() {
        let driver = FakeDriver::new(12);
        let matrix = GpioMatrix::open(&driver, &[5, 6, 7, 8], &[9, 10, 11]).unwrap();

        assert_eq!(matrix.columns(), 4);
        assert_eq!(matrix.rows(), 3);
        let claims = driver.claims.borrow();
        assert!(claims[..4].iter().all(|(_, bias)| bias.is_none()));
        assert!(claims[4..].iter().all(|(_, bias)| *bias == Some(GpioBias::PullDown)));
    }

    #[test]
    fn columns_and_rows_map_to_their_pins() {
        let driver = FakeDriver::new(12);
        let mut matrix = GpioMatrix::open(&driver, &[5, 6, 7, 8], &[9, 10, 11]).unwrap();

        matrix.set_column(3, Level::High).unwrap();
        assert!(driver.levels.borrow()[8]);
        matrix.set_column(3, Level::Low).unwrap();
        assert!(!driver.levels.borrow()[8]);

        driver.levels.borrow_mut()[11] = true;
        assert!(matrix.read_row(2).unwrap());
        assert!(!matrix.read_row(0).unwrap());

        assert_eq!(matrix.set_column(4, Level::High), Err(GpioError::InvalidArgument));
        assert_eq!(matrix.read_row(3), Err(GpioError::InvalidArgument));
    }

    #[test]
    fn shared_pins_are_refused() {
        let driver = FakeDriver::new(12);
        let result = GpioMatrix::open(&driver, &[5, 6], &[6]);
        assert_eq!(result.err(), Some(GpioError::AlreadyInUse));
    }
}
