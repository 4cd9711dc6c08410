//! GPIO driver backed by the Linux GPIO character device, via the gpiod library.
//!
//! This is the default backend: it needs no elevated privileges beyond access to
//! `/dev/gpiochipN`, and the kernel releases the lines if the process dies.
use crate::{GpioBias, GpioDriver, GpioError, GpioInput, GpioOutput, GpioResult};
use bitvec::vec::BitVec;
use log::trace;
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::atomic::AtomicU8;

/// GpiodDriver is a GPIO driver that uses the gpiod library to manage GPIO lines.
pub struct GpiodDriver {
    chip: gpiod::Chip,
    used_lines: BitVec<AtomicU8>,
}

impl GpiodDriver {
    pub fn new(chip: gpiod::Chip) -> Self {
        let n = chip.num_lines() as usize;
        Self {
            chip,
            used_lines: BitVec::repeat(false, n),
        }
    }

    /// Opens the GPIO chip at the given device path, e.g. `/dev/gpiochip0`.
    pub fn open(path: impl AsRef<Path>) -> GpioResult<Self> {
        let chip = gpiod::Chip::new(path)?;
        Ok(Self::new(chip))
    }

    fn claim(&self, index: usize) -> GpioResult<()> {
        if index >= self.count()? {
            return Err(GpioError::InvalidArgument);
        }

        if self.used_lines[index] {
            return Err(GpioError::AlreadyInUse);
        }

        self.used_lines.set_aliased(index, true);
        Ok(())
    }

    fn release(&self, index: usize) {
        self.used_lines.set_aliased(index, false);
    }
}

impl Debug for GpiodDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodDriver({})", self.chip.name())
    }
}

impl From<GpioBias> for gpiod::Bias {
    fn from(bias: GpioBias) -> Self {
        match bias {
            GpioBias::None => gpiod::Bias::Disable,
            GpioBias::PullUp => gpiod::Bias::PullUp,
            GpioBias::PullDown => gpiod::Bias::PullDown,
        }
    }
}

impl GpioDriver for GpiodDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.chip.num_lines() as usize)
    }

    fn input(&self, index: usize, bias: GpioBias) -> GpioResult<Box<dyn GpioInput + '_>> {
        self.claim(index)?;

        let request = self.chip.request_lines(
            gpiod::Options::input([index as u32])
                .consumer(env!("CARGO_PKG_NAME"))
                .bias(bias.into()),
        );
        let line = match request {
            Ok(line) => line,
            Err(e) => {
                self.release(index);
                return Err(e.into());
            }
        };

        trace!("{:?}: line {} claimed as input ({:?})", self, index, bias);
        Ok(Box::new(GpiodInput { driver: self, index, line }))
    }

    fn output(&self, index: usize, initial: bool) -> GpioResult<Box<dyn GpioOutput + '_>> {
        self.claim(index)?;

        let request = self.chip.request_lines(
            gpiod::Options::output([index as u32])
                .values([initial])
                .consumer(env!("CARGO_PKG_NAME")),
        );
        let line = match request {
            Ok(line) => line,
            Err(e) => {
                self.release(index);
                return Err(e.into());
            }
        };

        trace!("{:?}: line {} claimed as output", self, index);
        Ok(Box::new(GpiodOutput { driver: self, index, line }))
    }
}

struct GpiodInput<'a> {
    driver: &'a GpiodDriver,
    index: usize,
    line: gpiod::Lines<gpiod::Input>,
}

impl Debug for GpiodInput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}][input]", self.driver, self.index)
    }
}

impl GpioInput for GpiodInput<'_> {
    fn read(&self) -> GpioResult<bool> {
        let values = self.line.get_values([false])?;
        Ok(values[0])
    }
}

impl Drop for GpiodInput<'_> {
    fn drop(&mut self) {
        self.driver.release(self.index);
    }
}

struct GpiodOutput<'a> {
    driver: &'a GpiodDriver,
    index: usize,
    line: gpiod::Lines<gpiod::Output>,
}

impl Debug for GpiodOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}][output]", self.driver, self.index)
    }
}

impl GpioOutput for GpiodOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.line.set_values([value])?;
        Ok(())
    }
}

impl Drop for GpiodOutput<'_> {
    fn drop(&mut self) {
        // Hand the line back low.
        _ = self.line.set_values([false]);
        self.driver.release(self.index);
    }
}
