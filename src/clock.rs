use chrono::Timelike;

use crate::foundation::core::{PixelGrid, Rgb8};

const SCALE: u32 = 2;
const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
const SPACING: u32 = 2;
const COLON_DIM: f32 = 0.2;

/// Rows of each digit, most significant of the low 5 bits is the leftmost column.
const DIGITS: [[u8; 7]; 10] = [
    [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
    [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
    [0b01110, 0b10001, 0b00001, 0b00110, 0b01000, 0b10000, 0b11111],
    [0b01110, 0b10001, 0b00001, 0b00110, 0b00001, 0b10001, 0b01110],
    [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
    [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
    [0b01110, 0b10000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
    [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
    [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
    [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00001, 0b01110],
];

const COLON: [u8; 7] = [0, 1, 0, 0, 0, 1, 0];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl ClockTime {
    pub fn now() -> Self {
        Self::from_time(&chrono::Local::now())
    }

    pub fn from_time<T: Timelike>(t: &T) -> Self {
        Self {
            hour: t.hour(),
            minute: t.minute(),
            second: t.second(),
        }
    }
}

pub fn render_clock(time: ClockTime, color: Rgb8, width: u32, height: u32) -> PixelGrid {
    let mut grid = PixelGrid::new(width, height);

    let digit_w = GLYPH_W * SCALE;
    let colon_w = SCALE;
    let total_w = 4 * digit_w + colon_w + 4 * SPACING;
    let total_h = GLYPH_H * SCALE;
    let start_x = width.saturating_sub(total_w) / 2;
    let start_y = height.saturating_sub(total_h) / 2;

    let digits = [
        (time.hour / 10) % 10,
        time.hour % 10,
        (time.minute / 10) % 10,
        time.minute % 10,
    ];
    let colon_color = if time.second % 2 == 0 {
        color
    } else {
        color.scale(COLON_DIM)
    };

    let mut x = start_x;
    for (i, d) in digits.iter().enumerate() {
        draw_glyph(&mut grid, &DIGITS[*d as usize], GLYPH_W, x, start_y, color);
        x += digit_w + SPACING;
        if i == 1 {
            draw_glyph(&mut grid, &COLON, 1, x, start_y, colon_color);
            x += colon_w + SPACING;
        }
    }
    grid
}

fn draw_glyph(grid: &mut PixelGrid, rows: &[u8; 7], cols: u32, x0: u32, y0: u32, color: Rgb8) {
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..cols {
            if (bits >> (cols - 1 - col)) & 1 == 0 {
                continue;
            }
            for sy in 0..SCALE {
                for sx in 0..SCALE {
                    grid.set(x0 + col * SCALE + sx, y0 + row as u32 * SCALE + sy, color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PURPLE: Rgb8 = Rgb8::new(120, 80, 200);

    fn t(hour: u32, minute: u32, second: u32) -> ClockTime {
        ClockTime {
            hour,
            minute,
            second,
        }
    }

    #[test]
    fn clock_is_centred_on_a_64_grid() {
        let g = render_clock(t(18, 8, 0), PURPLE, 64, 64);
        let lit: Vec<(u32, u32)> = (0..64)
            .flat_map(|y| (0..64).map(move |x| (x, y)))
            .filter(|(x, y)| g.get(*x, *y) != Rgb8::BLACK)
            .collect();
        let min_x = lit.iter().map(|p| p.0).min().unwrap();
        let max_x = lit.iter().map(|p| p.0).max().unwrap();
        let min_y = lit.iter().map(|p| p.1).min().unwrap();
        let max_y = lit.iter().map(|p| p.1).max().unwrap();
        assert!(min_x >= 7 && max_x <= 56);
        assert_eq!((min_y, max_y), (25, 38));
    }

    #[test]
    fn colon_blinks_dim_on_odd_seconds() {
        // Upper colon dot sits at x = 7 + 2 * (10 + 2) = 31, y = 25 + 2.
        let even = render_clock(t(12, 34, 10), PURPLE, 64, 64);
        let odd = render_clock(t(12, 34, 11), PURPLE, 64, 64);
        assert_eq!(even.get(31, 27), PURPLE);
        assert_eq!(odd.get(31, 27), PURPLE.scale(0.2));
    }

    #[test]
    fn digit_one_has_its_stem_lit() {
        let g = render_clock(t(11, 11, 0), PURPLE, 64, 64);
        // First "1": glyph column 2 (x = 7 + 4) on the second row (y = 25 + 2).
        assert_eq!(g.get(11, 27), PURPLE);
        assert_eq!(g.get(7, 27), Rgb8::BLACK);
    }

    #[test]
    fn tiny_grids_do_not_panic() {
        let g = render_clock(t(23, 59, 59), PURPLE, 8, 8);
        assert_eq!(g.width(), 8);
    }
}
