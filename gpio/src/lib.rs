pub mod gpiod;
pub mod raw;
pub mod timing;
pub mod matrix;
pub mod debounce;

use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

/// Specifies the bias of an input line.
///
/// Key matrices read their rows through pull-down resistors, so that a row only reads high
/// while a closed contact connects it to the driven column.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioBias {
    #[default] None,
    PullUp,
    PullDown,
}

/// A source of GPIO lines.
///
/// Every line can be claimed once; claiming it again before the previous handle is dropped
/// fails with [GpioError::AlreadyInUse].
pub trait GpioDriver: Debug {
    /// Gets the amount of GPIO lines available.
    fn count(&self) -> GpioResult<usize>;

    /// Claims the line at the given index as an input with the given bias.
    fn input(&self, index: usize, bias: GpioBias) -> GpioResult<Box<dyn GpioInput + '_>>;

    /// Claims the line at the given index as an output, driven to `initial` right away.
    fn output(&self, index: usize, initial: bool) -> GpioResult<Box<dyn GpioOutput + '_>>;
}

pub trait GpioInput: Debug {
    /// Reads the state of the GPIO line.
    fn read(&self) -> GpioResult<bool>;
}

pub trait GpioOutput: Debug {
    /// Writes the state of the GPIO line.
    fn write(&self, value: bool) -> GpioResult<()>;
}
