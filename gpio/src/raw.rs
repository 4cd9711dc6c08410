//! GPIO driver poking the BCM283x/BCM2711 GPIO registers directly through a memory mapping.
//!
//! Faster than [crate::gpiod] (no syscall per access), which keeps the settle delay the dominant
//! part of a matrix scan. Bias control uses the `GPIO_PUP_PDN_CNTRL` registers, which only
//! exist on the BCM2711 (Raspberry Pi 4). On any other SoC pulled inputs are refused.
use crate::{GpioBias, GpioDriver, GpioError, GpioInput, GpioOutput, GpioResult};
use bitvec::vec::BitVec;
use log::{trace, warn};
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use std::sync::atomic::AtomicU8;

pub struct RawGpioDriver {
    mmap: MmapRaw,
    used_pins: BitVec<AtomicU8>,
    pull_control: bool,
}

/// Gets whether a device tree `compatible` list names a SoC with the BCM2711 pull registers.
fn has_pull_control(compatible: &[u8]) -> bool {
    compatible
        .split(|&b| b == 0)
        .any(|entry| entry == b"brcm,bcm2711")
}

impl RawGpioDriver {
    const DEVICE_TREE_COMPATIBLE: &'static str = "/proc/device-tree/compatible";

    const PIN_COUNT: usize = 58;

    // Register offsets, in bytes
    const GPFSEL0: usize = 0x00;
    const GPSET0: usize = 0x1c;
    const GPCLR0: usize = 0x28;
    const GPLEV0: usize = 0x34;
    const GPIO_PUP_PDN_CNTRL_REG0: usize = 0xe4;

    const FUNCTION_INPUT: u32 = 0b000;
    const FUNCTION_OUTPUT: u32 = 0b001;

    /// Maps `/dev/gpiomem`, which exposes the GPIO block alone and needs no root.
    pub fn new_gpiomem() -> GpioResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/gpiomem")?;

        let mmap = MmapOptions::new()
            .len(4096)
            .map_raw(&file)?;

        let pull_control = std::fs::read(Self::DEVICE_TREE_COMPATIBLE)
            .map(|compatible| has_pull_control(&compatible))
            .unwrap_or(false);
        if !pull_control {
            warn!("Not a BCM2711, inputs with pull resistors will be refused.");
        }

        Ok(RawGpioDriver {
            mmap,
            used_pins: BitVec::repeat(false, Self::PIN_COUNT),
            pull_control,
        })
    }

    fn register(&self, byte_offset: usize) -> *mut u32 {
        let base = self.mmap.as_mut_ptr() as *mut u32;
        // SAFETY: every offset used below stays within the 4 KiB mapping.
        unsafe { base.add(byte_offset / 4) }
    }

    fn check_pin(pin_index: usize) -> GpioResult<()> {
        if pin_index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }
        Ok(())
    }

    fn set_function(&self, pin_index: usize, function: u32) -> GpioResult<()> {
        Self::check_pin(pin_index)?;

        let register = self.register(Self::GPFSEL0 + (pin_index / 10) * 4);
        let shift = (pin_index % 10) * 3;

        unsafe {
            let mut value = register.read_volatile();
            value &= !(0b111 << shift);
            value |= function << shift;
            register.write_volatile(value);
        }

        Ok(())
    }

    fn set_level(&self, pin_index: usize, high: bool) -> GpioResult<()> {
        Self::check_pin(pin_index)?;

        let bank = if high { Self::GPSET0 } else { Self::GPCLR0 };
        let register = self.register(bank + (pin_index / 32) * 4);

        unsafe { register.write_volatile(1 << (pin_index % 32)) };

        Ok(())
    }

    fn level(&self, pin_index: usize) -> GpioResult<bool> {
        Self::check_pin(pin_index)?;

        let register = self.register(Self::GPLEV0 + (pin_index / 32) * 4);
        let value = unsafe { register.read_volatile() };

        Ok((value >> (pin_index % 32)) & 1 != 0)
    }

    fn set_bias(&self, pin_index: usize, bias: GpioBias) -> GpioResult<()> {
        Self::check_pin(pin_index)?;

        // Older SoCs keep something else at this offset.
        if !self.pull_control {
            return match bias {
                GpioBias::None => Ok(()),
                _ => Err(GpioError::InvalidArgument),
            };
        }

        let bias_value = match bias {
            GpioBias::None => 0b00,
            GpioBias::PullUp => 0b01,
            GpioBias::PullDown => 0b10,
        };

        let register = self.register(Self::GPIO_PUP_PDN_CNTRL_REG0 + (pin_index / 16) * 4);
        let shift = (pin_index % 16) * 2;

        unsafe {
            let mut value = register.read_volatile();
            value &= !(0b11 << shift);
            value |= bias_value << shift;
            register.write_volatile(value);
        }

        Ok(())
    }

    fn claim(&self, index: usize) -> GpioResult<()> {
        Self::check_pin(index)?;

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        self.used_pins.set_aliased(index, true);
        Ok(())
    }

    /// Puts the pin back into a floating input and marks it free.
    fn release(&self, index: usize) {
        _ = self.set_function(index, Self::FUNCTION_INPUT);
        _ = self.set_bias(index, GpioBias::None);
        self.used_pins.set_aliased(index, false);
    }
}

impl Debug for RawGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawGpioDriver({:?})", self.mmap.as_ptr().addr())
    }
}

impl GpioDriver for RawGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(Self::PIN_COUNT)
    }

    fn input(&self, index: usize, bias: GpioBias) -> GpioResult<Box<dyn GpioInput + '_>> {
        self.claim(index)?;

        let configured = self.set_function(index, Self::FUNCTION_INPUT)
            .and_then(|_| self.set_bias(index, bias));
        if let Err(e) = configured {
            self.release(index);
            return Err(e);
        }

        trace!("{:?}: pin {} configured as input ({:?})", self, index, bias);
        Ok(Box::new(RawGpioInput { driver: self, index }))
    }

    fn output(&self, index: usize, initial: bool) -> GpioResult<Box<dyn GpioOutput + '_>> {
        self.claim(index)?;

        // Latch the level first so the pin never glitches to the opposite state.
        let configured = self.set_level(index, initial)
            .and_then(|_| self.set_function(index, Self::FUNCTION_OUTPUT));
        if let Err(e) = configured {
            self.release(index);
            return Err(e);
        }

        trace!("{:?}: pin {} configured as output", self, index);
        Ok(Box::new(RawGpioOutput { driver: self, index }))
    }
}

struct RawGpioInput<'a> {
    driver: &'a RawGpioDriver,
    index: usize,
}

impl Debug for RawGpioInput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}][input]", self.driver, self.index)
    }
}

impl GpioInput for RawGpioInput<'_> {
    fn read(&self) -> GpioResult<bool> {
        self.driver.level(self.index)
    }
}

impl Drop for RawGpioInput<'_> {
    fn drop(&mut self) {
        self.driver.release(self.index);
    }
}

struct RawGpioOutput<'a> {
    driver: &'a RawGpioDriver,
    index: usize,
}

impl Debug for RawGpioOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}][output]", self.driver, self.index)
    }
}

impl GpioOutput for RawGpioOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.driver.set_level(self.index, value)
    }
}

impl Drop for RawGpioOutput<'_> {
    fn drop(&mut self) {
        _ = self.driver.set_level(self.index, false);
        self.driver.release(self.index);
    }
}
