//! Bring-up helper: prints the host, then every change of the raw matrix state.

use std::time::Duration;
use dotenv::{dotenv, var};
use log::{debug, info};
use sysinfo::System;
use keymash_gpio::GpioDriver;
use keymash_gpio::gpiod::GpiodDriver;
use keymash_gpio::matrix::{parse_pin_list, GpioMatrix, MatrixScanner};
use keymash_gpio::raw::RawGpioDriver;
use keymash_gpio::timing::{Clock, SystemClock};

const UNKNOWN_STR: &str = "???";
const SCAN_INTERVAL: Duration = Duration::from_millis(5);

fn main() -> eyre::Result<()> {
    dotenv().ok();
    pretty_env_logger::init();

    info!(
        "Hello, {}!",
        System::name().as_deref().unwrap_or(UNKNOWN_STR)
    );
    info!(
        "System ver {} kernel ver {}",
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );
    info!(
        "Hostname {}",
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR)
    );
    info!("Architecture {}", System::cpu_arch());

    let column_pins = parse_pin_list(&var("KEYMASH_PINS_COLS").unwrap_or_else(|_| "5,6,7,8".to_string()))?;
    let row_pins = parse_pin_list(&var("KEYMASH_PINS_ROWS").unwrap_or_else(|_| "9,10,11".to_string()))?;
    info!("Probing Cols: {:?}, Rows: {:?}", column_pins, row_pins);

    let driver: Box<dyn GpioDriver> = match var("KEYMASH_BACKEND").as_deref() {
        Ok("raw") => Box::new(RawGpioDriver::new_gpiomem()?),
        _ => Box::new(GpiodDriver::open("/dev/gpiochip0")?),
    };
    debug!("{:?} initialized, {} lines.", driver, driver.count()?);

    let matrix = GpioMatrix::open(&*driver, &column_pins, &row_pins)?;
    let mut scanner = MatrixScanner::new(matrix);
    let clock = SystemClock;

    let mut last = None;
    loop {
        let frame = scanner.scan(&clock)?;
        if last.as_ref() != Some(&frame) {
            info!("{} active:\n{}", frame.active_count(), frame);
            last = Some(frame);
        }
        clock.sleep(SCAN_INTERVAL);
    }
}
