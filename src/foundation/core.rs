use std::fmt;

use crate::foundation::error::{CoverError, CoverResult};

/// 8-bit RGB triple as sent to the matrix and to ambient devices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "ColorRepr")]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    pub const BLACK: Rgb8 = Rgb8 { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rgb` or `#rrggbb` (the leading `#` is optional).
    pub fn parse_hex(s: &str) -> CoverResult<Self> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoverError::validation(format!("invalid hex color '{s}'")));
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => {
                return Err(CoverError::validation(format!(
                    "hex color '{s}' must have 3 or 6 digits"
                )));
            }
        };
        let channel = |i: usize| {
            u8::from_str_radix(&expanded[i..i + 2], 16)
                .map_err(|e| CoverError::validation(format!("invalid hex color '{s}': {e}")))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Per-channel linear interpolation, rounded. `t` is clamped to `[0, 1]`.
    pub fn lerp(self, other: Rgb8, t: f32) -> Rgb8 {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| {
            let a = f32::from(a);
            let b = f32::from(b);
            (a + (b - a) * t).round().clamp(0.0, 255.0) as u8
        };
        Rgb8::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }

    /// Scale every channel by `factor` (clamped to `[0, 1]`), rounded.
    pub fn scale(self, factor: f32) -> Rgb8 {
        let f = factor.clamp(0.0, 1.0);
        let s = |c: u8| (f32::from(c) * f).round().clamp(0.0, 255.0) as u8;
        Rgb8::new(s(self.r), s(self.g), s(self.b))
    }

    /// Software brightness in percent (0-100); used by sinks that cannot dim in hardware.
    pub fn apply_brightness(self, brightness: u8) -> Rgb8 {
        if brightness >= 100 {
            return self;
        }
        let s = |c: u8| ((u16::from(c) * u16::from(brightness)) / 100) as u8;
        Rgb8::new(s(self.r), s(self.g), s(self.b))
    }
}

impl fmt::Display for Rgb8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ColorRepr {
    Hex(String),
    Channels { r: i64, g: i64, b: i64 },
}

impl TryFrom<ColorRepr> for Rgb8 {
    type Error = CoverError;

    fn try_from(value: ColorRepr) -> Result<Self, Self::Error> {
        match value {
            ColorRepr::Hex(s) => Rgb8::parse_hex(&s),
            ColorRepr::Channels { r, g, b } => {
                let ch = |name: &str, v: i64| {
                    u8::try_from(v).map_err(|_| {
                        CoverError::validation(format!("color channel {name}={v} is outside 0..=255"))
                    })
                };
                Ok(Rgb8::new(ch("r", r)?, ch("g", g)?, ch("b", b)?))
            }
        }
    }
}

/// Parse a color given either as `{r,g,b}` or as a hex string.
pub fn parse_color_value(value: &serde_json::Value) -> CoverResult<Rgb8> {
    let repr: ColorRepr = serde_json::from_value(value.clone())
        .map_err(|_| CoverError::validation("color must be {r,g,b} or a hex string"))?;
    Rgb8::try_from(repr)
}

/// One full display frame: `width * height` RGB pixels in row-major order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    pixels: Vec<Rgb8>,
}

impl PixelGrid {
    /// A black grid.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, Rgb8::BLACK)
    }

    pub fn filled(width: u32, height: u32, color: Rgb8) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; (width as usize) * (height as usize)],
        }
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Rgb8>) -> CoverResult<Self> {
        if width == 0 || height == 0 {
            return Err(CoverError::validation("grid width/height must be non-zero"));
        }
        if pixels.len() != (width as usize) * (height as usize) {
            return Err(CoverError::validation(format!(
                "grid pixel count mismatch: got {}, expected {}x{}",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn same_size(&self, other: &PixelGrid) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    /// Pixel at `(x, y)`; coordinates are clamped into the grid.
    pub fn get(&self, x: u32, y: u32) -> Rgb8 {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        self.pixels[self.index(x, y)]
    }

    /// Writes outside the grid are ignored.
    pub fn set(&mut self, x: u32, y: u32, color: Rgb8) {
        if x < self.width && y < self.height {
            let i = self.index(x, y);
            self.pixels[i] = color;
        }
    }

    pub fn pixels(&self) -> &[Rgb8] {
        &self.pixels
    }

    pub fn fill(&mut self, color: Rgb8) {
        self.pixels.fill(color);
    }

    pub fn is_black(&self) -> bool {
        self.pixels.iter().all(|p| *p == Rgb8::BLACK)
    }

    pub fn to_rgb_image(&self) -> image::RgbImage {
        image::RgbImage::from_fn(self.width, self.height, |x, y| {
            let p = self.get(x, y);
            image::Rgb([p.r, p.g, p.b])
        })
    }
}

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32, // must be > 0
}

impl Fps {
    pub fn new(num: u32, den: u32) -> CoverResult<Self> {
        if den == 0 {
            return Err(CoverError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(CoverError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn whole(num: u32) -> CoverResult<Self> {
        Self::new(num, 1)
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Convert seconds to frame count using floor semantics.
    pub fn secs_to_frames_floor(self, secs: f64) -> u64 {
        (secs * self.as_f64()).floor().max(0.0) as u64
    }
}

impl Default for Fps {
    fn default() -> Self {
        Self { num: 30, den: 1 }
    }
}
