//! The addressable LED strip next to the keys.
//!
//! Purely decorative: nothing in a round depends on it.

use std::fmt::Debug;
use log::info;
use keymash_gpio::GpioResult;
use crate::display::Rgb;

pub trait Indicator: Debug {
    /// Sets the color of every pixel of the strip, first pixel first.
    fn set_pixel_colors(&mut self, colors: &[Rgb]) -> GpioResult<()>;
}

/// Builds the startup pattern: every pixel off except `lit`, which gets `color`.
pub fn startup_pattern(pixels: usize, lit: Option<usize>, color: Rgb) -> Vec<Rgb> {
    let mut colors = vec![Rgb::BLACK; pixels];
    if let Some(pixel) = lit.and_then(|i| colors.get_mut(i)) {
        *pixel = color;
    }
    colors
}

/// Reports the strip contents through the logger, as the raw GRB words a WS2812 chain would
/// receive.
#[derive(Debug, Default)]
pub struct LogIndicator {
    colors: Vec<Rgb>,
}

impl LogIndicator {
    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }
}

impl Indicator for LogIndicator {
    fn set_pixel_colors(&mut self, colors: &[Rgb]) -> GpioResult<()> {
        let words: Vec<String> = colors
            .iter()
            .map(|c| format!("{:08X}", c.to_grb()))
            .collect();
        info!("Indicator: [{}]", words.join(" "));
        self.colors = colors.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_pattern_lights_a_single_pixel() {
        let pattern = startup_pattern(12, Some(11), Rgb::RED);
        assert_eq!(pattern.len(), 12);
        assert_eq!(pattern[11], Rgb::RED);
        assert!(pattern[..11].iter().all(|c| *c == Rgb::BLACK));
    }

    #[test]
    fn startup_pattern_ignores_pixels_past_the_strip() {
        assert_eq!(startup_pattern(3, Some(7), Rgb::RED), vec![Rgb::BLACK; 3]);
        assert_eq!(startup_pattern(2, None, Rgb::RED), vec![Rgb::BLACK; 2]);
    }

    #[test]
    fn log_indicator_keeps_the_last_colors() {
        let mut indicator = LogIndicator::default();
        indicator.set_pixel_colors(&startup_pattern(4, Some(0), Rgb::WHITE)).unwrap();
        assert_eq!(indicator.colors()[0], Rgb::WHITE);
    }
}
