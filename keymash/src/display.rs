//! What the device shows, and where it gets shown.
//!
//! The session only ever talks to a [PresentationSink] in whole frames: clear, a batch of
//! [PresentationSink::write_line] calls, then [PresentationSink::flush].

use std::fmt::{Debug, Display, Formatter};
use std::io::Write;
use log::info;
use keymash_gpio::GpioResult;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0x00, 0x00, 0x00);
    pub const WHITE: Rgb = Rgb::new(0xFF, 0xFF, 0xFF);
    pub const RED: Rgb = Rgb::new(0xFF, 0x00, 0x00);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// Packs the color the way WS2812-style LEDs shift it in: `0xGGRRBB00`, most significant
    /// bit first.
    pub fn to_grb(self) -> u32 {
        (self.g as u32) << 24 | (self.r as u32) << 16 | (self.b as u32) << 8
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Rgb::new(r, g, b)
    }
}

impl Display for Rgb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Anything able to show lines of text.
///
/// Coordinates are in pixels of the reference 128x64 screen, `y` being the text baseline.
pub trait PresentationSink: Debug {
    /// Starts a new frame, dropping everything written since the last flush.
    fn clear(&mut self) -> GpioResult<()>;

    fn write_line(&mut self, x: i16, y: i16, text: &str, color: Rgb) -> GpioResult<()>;

    /// Makes the current frame visible.
    fn flush(&mut self) -> GpioResult<()>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Line {
    pub x: i16,
    pub y: i16,
    pub text: String,
    pub color: Rgb,
}

impl Line {
    fn new(y: i16, text: String) -> Self {
        Line { x: 5, y, text, color: Rgb::WHITE }
    }
}

/// A full screen worth of content.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Screen {
    /// Waiting for the start key.
    Invitation,
    /// A round is running.
    Countdown { remaining_secs: u64, key_count: u32 },
    /// A round just ended.
    Finished { key_count: u32, speed: String },
}

impl Screen {
    pub fn lines(&self) -> Vec<Line> {
        match self {
            Screen::Invitation => vec![
                Line::new(12, "Mash the red key!!".to_string()),
            ],
            Screen::Countdown { remaining_secs, key_count } => vec![
                Line::new(12, format!("Time left: {}s", remaining_secs)),
                Line::new(30, format!("Keys: {}", key_count)),
            ],
            Screen::Finished { key_count, speed } => vec![
                Line::new(12, "Test finished!".to_string()),
                Line::new(30, format!("Total keys: {}", key_count)),
                Line::new(48, format!("Speed: {} keys/s", speed)),
            ],
        }
    }

    /// Draws the screen as one frame.
    pub fn render(&self, sink: &mut dyn PresentationSink) -> GpioResult<()> {
        sink.clear()?;
        for line in self.lines() {
            sink.write_line(line.x, line.y, &line.text, line.color)?;
        }
        sink.flush()
    }
}

/// Paints frames onto an ANSI terminal.
pub struct TerminalSink<W: Write> {
    out: W,
    frame: Vec<Line>,
}

impl<W: Write> TerminalSink<W> {
    /// Pixel height of one text line on the reference screen.
    const LINE_HEIGHT: i16 = 18;
    /// Pixel width of one glyph on the reference screen.
    const GLYPH_WIDTH: i16 = 6;

    pub fn new(out: W) -> Self {
        TerminalSink { out, frame: Vec::new() }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Debug for TerminalSink<W> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TerminalSink({} lines pending)", self.frame.len())
    }
}

impl<W: Write> PresentationSink for TerminalSink<W> {
    fn clear(&mut self) -> GpioResult<()> {
        self.frame.clear();
        Ok(())
    }

    fn write_line(&mut self, x: i16, y: i16, text: &str, color: Rgb) -> GpioResult<()> {
        self.frame.push(Line { x, y, text: text.to_string(), color });
        Ok(())
    }

    fn flush(&mut self) -> GpioResult<()> {
        write!(self.out, "\x1b[2J")?;
        for line in &self.frame {
            let row = (line.y / Self::LINE_HEIGHT).max(0) + 1;
            let col = (line.x / Self::GLYPH_WIDTH).max(0) + 1;
            write!(
                self.out,
                "\x1b[{};{}H\x1b[38;2;{};{};{}m{}\x1b[0m",
                row, col, line.color.r, line.color.g, line.color.b, line.text,
            )?;
        }
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Reports every frame through the logger, for headless runs.
#[derive(Debug, Default)]
pub struct LogSink {
    frame: Vec<String>,
}

impl PresentationSink for LogSink {
    fn clear(&mut self) -> GpioResult<()> {
        self.frame.clear();
        Ok(())
    }

    fn write_line(&mut self, _x: i16, _y: i16, text: &str, _color: Rgb) -> GpioResult<()> {
        self.frame.push(text.to_string());
        Ok(())
    }

    fn flush(&mut self) -> GpioResult<()> {
        info!("[screen] {}", self.frame.join(" | "));
        Ok(())
    }
}

/// Keeps every flushed frame for later inspection.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    pending: Option<Vec<String>>,
    pub frames: Vec<Vec<String>>,
}

#[cfg(test)]
impl PresentationSink for RecordingSink {
    fn clear(&mut self) -> GpioResult<()> {
        self.pending = Some(Vec::new());
        Ok(())
    }

    fn write_line(&mut self, _x: i16, _y: i16, text: &str, _color: Rgb) -> GpioResult<()> {
        self.pending
            .as_mut()
            .expect("write_line without clear")
            .push(text.to_string());
        Ok(())
    }

    fn flush(&mut self) -> GpioResult<()> {
        let frame = self.pending.take().expect("flush without clear");
        self.frames.push(frame);
        Ok(())
    }
}
