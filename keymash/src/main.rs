mod config;
mod display;
mod indicator;
mod session;
mod utils;

use std::io::stdout;
use dotenv::dotenv;
use log::{debug, info, warn};
use keymash_gpio::GpioDriver;
use keymash_gpio::debounce::EdgeDetector;
use keymash_gpio::gpiod::GpiodDriver;
use keymash_gpio::matrix::{GpioMatrix, MatrixScanner};
use keymash_gpio::raw::RawGpioDriver;
use keymash_gpio::timing::SystemClock;
use crate::config::{Backend, Config, DisplayKind};
use crate::display::{LogSink, PresentationSink, TerminalSink};
use crate::indicator::{startup_pattern, Indicator, LogIndicator};
use crate::session::Session;

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    info!("Keymash starting...");

    let mut config = match Config::try_load()? {
        Some(config) => config,
        None => {
            warn!("No config file at {}, saving the defaults.", Config::path().display());
            let config = Config::default();
            config.save()?;
            config
        }
    };
    config.apply_overrides(|key| dotenv::var(key).ok())?;
    config.validate()?;

    info!("Matrix @ Cols: {:?}, Rows: {:?}", config.column_pins, config.row_pins);
    info!(
        "Start key {}, counting for {} ms",
        config.start_cell(), config.test_duration_ms,
    );

    let mut indicator = LogIndicator::default();
    indicator.set_pixel_colors(&startup_pattern(
        config.indicator.pixels,
        config.indicator.lit_pixel,
        config.indicator.color(),
    ))?;

    let mut sink: Box<dyn PresentationSink> = match config.display {
        DisplayKind::Terminal => Box::new(TerminalSink::new(stdout())),
        DisplayKind::Log => Box::new(LogSink::default()),
    };

    debug!("Initializing GPIO driver...");
    let driver: Box<dyn GpioDriver> = match config.backend {
        Backend::Gpiod => Box::new(GpiodDriver::open(&config.gpio_chip)?),
        Backend::Raw => Box::new(RawGpioDriver::new_gpiomem()?),
    };
    debug!("{:?} initialized.", driver);

    let matrix = GpioMatrix::open(&*driver, &config.column_pins, &config.row_pins)?;
    debug!("{:?} claimed.", matrix);

    let scanner = MatrixScanner::new(matrix).with_settle_delay(config.settle_delay());
    let detector = EdgeDetector::new(config.rows(), config.columns())
        .with_debounce_threshold(config.debounce_threshold());
    let clock = SystemClock;

    let mut session = Session::new(
        scanner,
        detector,
        config.start_cell(),
        config.timings(),
        &mut *sink,
        &clock,
    )?;

    info!("Ready.");
    loop {
        session.step()?;
    }
}
