//! Sunrise color table.
//!
//! Fifteen discrete stops from deep night to full daylight. Progress picks a
//! stop directly; there is no blending between neighbours.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#rrggbb` notation.
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

pub const SUNRISE_COLORS: [Rgb; 15] = [
    Rgb::new(10, 10, 20),    // deep night
    Rgb::new(20, 20, 40),    // night
    Rgb::new(30, 30, 60),    // pre-dawn
    Rgb::new(40, 40, 80),    // early dawn
    Rgb::new(60, 50, 100),   // dawn blue
    Rgb::new(80, 60, 110),   // dawn
    Rgb::new(120, 70, 100),  // early morning purple
    Rgb::new(160, 80, 80),   // morning pink
    Rgb::new(200, 100, 60),  // sunrise orange
    Rgb::new(230, 140, 70),  // sunrise
    Rgb::new(250, 180, 80),  // golden hour
    Rgb::new(255, 220, 120), // bright morning
    Rgb::new(255, 240, 180), // day
    Rgb::new(255, 255, 230), // bright day
    Rgb::new(255, 255, 255), // full daylight
];

/// Maps a progress fraction onto [`SUNRISE_COLORS`].
pub struct ColorRamp;

impl ColorRamp {
    pub const LEN: usize = SUNRISE_COLORS.len();

    /// `min(floor(p * N), N - 1)`, with `p` clamped to `[0, 1]` first.
    /// NaN maps to the first stop.
    pub fn stop_index(progress: f64) -> usize {
        let p = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        ((p * Self::LEN as f64).floor() as usize).min(Self::LEN - 1)
    }

    pub fn sample(progress: f64) -> Rgb {
        SUNRISE_COLORS[Self::stop_index(progress)]
    }
}
