// Log-compressed magnitude to RGBA8 color mapping.

use crate::util::lerp;
use serde::{Deserialize, Serialize};

/// Floor applied before the log so silence maps to a finite value.
pub const MAG_EPSILON: f32 = 1.0e-4;

// normalized-intensity breakpoints of the "hot" ramp
const HOT_RED_END: f32 = 0.33;
const HOT_YELLOW_END: f32 = 0.66;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Colormap {
    /// Black through red and yellow to white.
    #[default]
    Hot,
}

impl Colormap {
    pub fn shade(self, magnitude: f32) -> [u8; 4] {
        match self {
            Self::Hot => hot(magnitude),
        }
    }
}

fn hot(magnitude: f32) -> [u8; 4] {
    let log_mag = magnitude.max(MAG_EPSILON).ln();
    let normalized =
        ((log_mag - MAG_EPSILON.ln()) / (10.0f32.ln() - MAG_EPSILON.ln())).clamp(0.0, 1.0);
    let intensity = normalized.sqrt();

    let (r, g, b) = if intensity < HOT_RED_END {
        (lerp(0.0, 1.0, intensity / HOT_RED_END), 0.0, 0.0)
    } else if intensity < HOT_YELLOW_END {
        let t = (intensity - HOT_RED_END) / (HOT_YELLOW_END - HOT_RED_END);
        (1.0, lerp(0.0, 1.0, t), 0.0)
    } else {
        let t = (intensity - HOT_YELLOW_END) / (1.0 - HOT_YELLOW_END);
        (1.0, 1.0, lerp(0.0, 1.0, t))
    };
    [quantize(r), quantize(g), quantize(b), 255]
}

#[inline]
fn quantize(channel: f32) -> u8 {
    (channel * 255.0).round() as u8
}
