use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use dotenv::var;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use keymash_gpio::matrix::{parse_pin_list, Cell};
use crate::display::Rgb;
use crate::session::SessionTimings;
use crate::utils::{CollectionExt, WithinExt};

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("no column pins configured")]
    NoColumns,
    #[error("no row pins configured")]
    NoRows,
    #[error("pin {0} is used more than once")]
    DuplicatePin(usize),
    #[error("start key R{row}C{col} lies outside the {rows}x{cols} matrix")]
    StartKeyOutside { row: usize, col: usize, rows: usize, cols: usize },
    #[error("test duration must not be zero")]
    ZeroDuration,
    #[error("invalid pin list in {0}")]
    InvalidPins(String),
    #[error("unknown GPIO backend {0:?}")]
    UnknownBackend(String),
}

/// The config file exists but cannot be used.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("cannot access config file: {0}")]
    Io(#[from] io::Error),
    #[error("malformed config file: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Which GPIO driver the matrix is wired through.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The GPIO character device.
    #[default]
    Gpiod,
    /// Memory-mapped GPIO registers through `/dev/gpiomem`.
    Raw,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gpiod" => Ok(Backend::Gpiod),
            "raw" => Ok(Backend::Raw),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

/// Where the screens are shown.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum DisplayKind {
    #[default]
    Terminal,
    Log,
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Eq, PartialEq)]
pub struct StartKey {
    pub row: usize,
    pub col: usize,
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Eq, PartialEq)]
#[serde(default)]
pub struct IndicatorConfig {
    pub pixels: usize,
    pub lit_pixel: Option<usize>,
    pub color: [u8; 3],
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            pixels: 12,
            lit_pixel: Some(11),
            color: [0xFF, 0x00, 0x00],
        }
    }
}

impl IndicatorConfig {
    pub fn color(&self) -> Rgb {
        self.color.into()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    /// GPIO chip device used by the gpiod backend.
    pub gpio_chip: String,
    pub column_pins: Vec<usize>,
    pub row_pins: Vec<usize>,
    /// The key that starts a round.
    pub start_key: StartKey,
    pub test_duration_ms: u64,
    pub settle_delay_ms: u64,
    pub debounce_threshold_ms: u64,
    pub poll_interval_ms: u64,
    pub rearm_delay_ms: u64,
    pub result_dwell_ms: u64,
    pub display: DisplayKind,
    pub indicator: IndicatorConfig,
}

impl Config {
    pub const ENV_PINS_COLS: &'static str = "KEYMASH_PINS_COLS";
    pub const ENV_PINS_ROWS: &'static str = "KEYMASH_PINS_ROWS";
    pub const ENV_BACKEND: &'static str = "KEYMASH_BACKEND";

    /// Gets the config file path, `CONFIG_FILE` or `keymash.json`.
    pub fn path() -> PathBuf {
        var("CONFIG_FILE")
            .unwrap_or_else(|_| "keymash.json".to_string())
            .into()
    }

    /// Loads the config file at [Self::path].
    ///
    /// Returns `Ok(None)` only if there is no file at all.
    pub fn try_load() -> Result<Option<Self>, ConfigFileError> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigFileError> {
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let reader = io::BufReader::new(file);
        Ok(Some(serde_json::from_reader(reader)?))
    }

    /// Writes the config to [Self::path].
    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        let file = std::fs::File::create(path)?;
        let writer = io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Applies the environment overrides, looking variables up through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(pins) = lookup(Self::ENV_PINS_COLS) {
            self.column_pins = parse_pin_list(&pins)
                .map_err(|_| ConfigError::InvalidPins(Self::ENV_PINS_COLS.to_string()))?;
        }
        if let Some(pins) = lookup(Self::ENV_PINS_ROWS) {
            self.row_pins = parse_pin_list(&pins)
                .map_err(|_| ConfigError::InvalidPins(Self::ENV_PINS_ROWS.to_string()))?;
        }
        if let Some(backend) = lookup(Self::ENV_BACKEND) {
            self.backend = backend.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.column_pins.is_empty() {
            return Err(ConfigError::NoColumns);
        }
        if self.row_pins.is_empty() {
            return Err(ConfigError::NoRows);
        }

        let all_pins: Vec<usize> = self.column_pins.iter().chain(&self.row_pins).copied().collect();
        if let Some(&pin) = all_pins.first_duplicate() {
            return Err(ConfigError::DuplicatePin(pin));
        }

        let StartKey { row, col } = self.start_key;
        if !row.within(0..self.rows()) || !col.within(0..self.columns()) {
            return Err(ConfigError::StartKeyOutside {
                row,
                col,
                rows: self.rows(),
                cols: self.columns(),
            });
        }

        if self.test_duration_ms == 0 {
            return Err(ConfigError::ZeroDuration);
        }

        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.row_pins.len()
    }

    pub fn columns(&self) -> usize {
        self.column_pins.len()
    }

    pub fn start_cell(&self) -> Cell {
        Cell::new(self.start_key.row, self.start_key.col)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn debounce_threshold(&self) -> Duration {
        Duration::from_millis(self.debounce_threshold_ms)
    }

    pub fn timings(&self) -> SessionTimings {
        SessionTimings {
            test_duration: Duration::from_millis(self.test_duration_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            rearm_delay: Duration::from_millis(self.rearm_delay_ms),
            result_dwell: Duration::from_millis(self.result_dwell_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: Backend::default(),
            gpio_chip: "/dev/gpiochip0".to_string(),
            column_pins: vec![5, 6, 7, 8],
            row_pins: vec![9, 10, 11],
            start_key: StartKey { row: 2, col: 3 },
            test_duration_ms: 10_000,
            settle_delay_ms: 1,
            debounce_threshold_ms: 50,
            poll_interval_ms: 10,
            rearm_delay_ms: 100,
            result_dwell_ms: 3_000,
            display: DisplayKind::default(),
            indicator: IndicatorConfig::default(),
        }
    }
}
