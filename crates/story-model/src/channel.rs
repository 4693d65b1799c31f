//! Channels and their render settings.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Default upper bound for 16-bit channels.
pub const DEFAULT_MAX_RANGE: u32 = 65535;

/// Colors handed to channels that have no saved settings, in channel order.
const DEFAULT_PALETTE: [[u8; 3]; 8] = [
    [0, 0, 255],
    [0, 255, 0],
    [255, 0, 0],
    [255, 255, 0],
    [0, 255, 255],
    [255, 0, 255],
    [255, 127, 0],
    [255, 255, 255],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const WHITE: Rgb = Rgb([255, 255, 255]);
    pub const RED: Rgb = Rgb([255, 0, 0]);
    pub const GREEN: Rgb = Rgb([0, 255, 0]);
    pub const BLUE: Rgb = Rgb([0, 0, 255]);

    pub fn palette(index: usize) -> Rgb {
        Rgb(DEFAULT_PALETTE[index % DEFAULT_PALETTE.len()])
    }

    /// Lowercase six-digit hex without a leading `#`.
    pub fn to_hex(self) -> String {
        let [r, g, b] = self.0;
        format!("{r:02x}{g:02x}{b:02x}")
    }

    pub fn from_hex(hex: &str) -> ModelResult<Rgb> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(ModelError::InvalidInput(format!("bad hex color '{hex}'")));
        }
        let mut out = [0u8; 3];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
                .map_err(|_| ModelError::InvalidInput(format!("bad hex color '{hex}'")))?;
        }
        Ok(Rgb(out))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntensityRange {
    pub min: u32,
    pub max: u32,
}

/// How one channel is drawn: color, intensity window and visibility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChanRender {
    pub color: Rgb,
    pub range: IntensityRange,
    pub max_range: u32,
    pub visible: bool,
}

impl ChanRender {
    pub fn with_color(color: Rgb, max_range: u32) -> Self {
        Self {
            color,
            range: IntensityRange {
                min: 0,
                max: max_range,
            },
            max_range,
            visible: true,
        }
    }

    /// Window bounds as fractions of `max_range`.
    pub fn normalized(&self) -> (f64, f64) {
        let max_range = f64::from(self.max_range.max(1));
        (
            f64::from(self.range.min) / max_range,
            f64::from(self.range.max) / max_range,
        )
    }

    pub fn check_range(range: IntensityRange, max_range: u32) -> ModelResult<()> {
        if range.min >= range.max || range.max > max_range {
            return Err(ModelError::validation(format!(
                "range {}..{} must satisfy 0 <= min < max <= {max_range}",
                range.min, range.max
            )));
        }
        Ok(())
    }

    /// Apply `patch`, rejecting an invalid range without touching `self`.
    pub fn patched(&self, patch: &RenderPatch) -> ModelResult<ChanRender> {
        let mut next = *self;
        if let Some(color) = patch.color {
            next.color = color;
        }
        if let Some(range) = patch.range {
            Self::check_range(range, next.max_range)?;
            next.range = range;
        }
        if let Some(visible) = patch.visible {
            next.visible = visible;
        }
        Ok(next)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderPatch {
    #[serde(default)]
    pub color: Option<Rgb>,
    #[serde(default)]
    pub range: Option<IntensityRange>,
    #[serde(default)]
    pub visible: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub label: String,
    pub render: ChanRender,
}

impl Channel {
    pub fn new(index: usize, label: impl Into<String>, max_range: u32) -> Self {
        Self {
            label: label.into(),
            render: ChanRender::with_color(Rgb::palette(index), max_range),
        }
    }
}
