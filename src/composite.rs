use std::{f64::consts::TAU, sync::Arc};

use kurbo::{Point, Vec2};
use rand::{Rng, seq::SliceRandom};

use crate::{
    foundation::core::{PixelGrid, Rgb8},
    foundation::error::{CoverError, CoverResult},
    transitions::{Direction, Orientation, TransitionKind},
};

pub const BLIND_BANDS: u32 = 8;
pub const CHECKER_TILE: u32 = 8;

pub struct FrameCompositor {
    kind: TransitionKind,
    width: u32,
    height: u32,
    source: Option<Arc<PixelGrid>>,
    target: Option<Arc<PixelGrid>>,
    /// Reveal rank per pixel index (dissolve and spiral).
    rank: Vec<u32>,
    max_distance: f64,
}

impl FrameCompositor {
    pub fn new<R: Rng + ?Sized>(
        kind: TransitionKind,
        source: Option<Arc<PixelGrid>>,
        target: Option<Arc<PixelGrid>>,
        rng: &mut R,
    ) -> CoverResult<Self> {
        let (width, height) = match (&source, &target) {
            (Some(s), Some(t)) => {
                if !s.same_size(t) {
                    return Err(CoverError::validation(format!(
                        "transition grids differ in size: {}x{} vs {}x{}",
                        s.width(),
                        s.height(),
                        t.width(),
                        t.height()
                    )));
                }
                (s.width(), s.height())
            }
            (Some(g), None) | (None, Some(g)) => (g.width(), g.height()),
            (None, None) => {
                return Err(CoverError::validation(
                    "transition needs a source or a target grid",
                ));
            }
        };

        let rank = match kind {
            TransitionKind::Dissolve => shuffled_rank(width, height, rng),
            TransitionKind::Spiral => spiral_rank(width, height),
            _ => Vec::new(),
        };

        let max_distance = match kind {
            TransitionKind::Circle => max_over_grid(width, height, |v| v.length()),
            TransitionKind::Diamond => max_over_grid(width, height, manhattan),
            _ => 0.0,
        };

        Ok(Self {
            kind,
            width,
            height,
            source,
            target,
            rank,
            max_distance,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame_at(&self, t: f64) -> PixelGrid {
        let mut out = PixelGrid::new(self.width, self.height);
        self.render_into(t, &mut out);
        out
    }

    /// Write the frame at progress `t` (clamped to `[0, 1]`) into `out`.
    pub fn render_into(&self, t: f64, out: &mut PixelGrid) {
        let t = t.clamp(0.0, 1.0);
        let revealed = (t * (self.width as f64 * self.height as f64)).floor() as u64;

        for y in 0..self.height {
            for x in 0..self.width {
                let color = match self.kind {
                    TransitionKind::Crossfade => self.src(x, y).lerp(self.dst(x, y), t as f32),
                    TransitionKind::FadeOut => self.src(x, y).scale((1.0 - t) as f32),
                    TransitionKind::Slide(dir) => self.slide(x, y, t, dir),
                    TransitionKind::Dissolve | TransitionKind::Spiral => {
                        let idx = self.index(x, y);
                        self.pick(u64::from(self.rank[idx]) < revealed, x, y)
                    }
                    TransitionKind::Wipe(dir) => self.pick(self.wiped(x, y, t, dir), x, y),
                    TransitionKind::Blinds(o) => self.pick(self.blind_open(x, y, t, o), x, y),
                    TransitionKind::Circle => {
                        let d = self.offset_from_center(x, y).length();
                        self.pick(d <= t * self.max_distance, x, y)
                    }
                    TransitionKind::Diamond => {
                        let d = manhattan(self.offset_from_center(x, y));
                        self.pick(d <= t * self.max_distance, x, y)
                    }
                    TransitionKind::Checkerboard => self.pick(self.checker_open(x, y, t), x, y),
                };
                out.set(x, y, color);
            }
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    fn src(&self, x: u32, y: u32) -> Rgb8 {
        self.source.as_ref().map_or(Rgb8::BLACK, |g| g.get(x, y))
    }

    fn dst(&self, x: u32, y: u32) -> Rgb8 {
        self.target.as_ref().map_or(Rgb8::BLACK, |g| g.get(x, y))
    }

    fn pick(&self, use_target: bool, x: u32, y: u32) -> Rgb8 {
        if use_target {
            self.dst(x, y)
        } else {
            self.src(x, y)
        }
    }

    fn slide(&self, x: u32, y: u32, t: f64, dir: Direction) -> Rgb8 {
        let (w, h) = (i64::from(self.width), i64::from(self.height));
        let (x, y) = (i64::from(x), i64::from(y));
        let size = match dir {
            Direction::Left | Direction::Right => w,
            Direction::Up | Direction::Down => h,
        };
        let offset = (t * size as f64).round() as i64;

        let (sx, sy, from_target) = match dir {
            Direction::Left => {
                let sx = x + offset;
                if sx >= w { (sx - w, y, true) } else { (sx, y, false) }
            }
            Direction::Right => {
                let sx = x - offset;
                if sx < 0 { (sx + w, y, true) } else { (sx, y, false) }
            }
            Direction::Up => {
                let sy = y + offset;
                if sy >= h { (x, sy - h, true) } else { (x, sy, false) }
            }
            Direction::Down => {
                let sy = y - offset;
                if sy < 0 { (x, sy + h, true) } else { (x, sy, false) }
            }
        };

        let sx = sx.clamp(0, w - 1) as u32;
        let sy = sy.clamp(0, h - 1) as u32;
        self.pick(from_target, sx, sy)
    }

    fn wiped(&self, x: u32, y: u32, t: f64, dir: Direction) -> bool {
        match dir {
            Direction::Left => {
                let edge = (t * f64::from(self.width)).round() as u32;
                x >= self.width.saturating_sub(edge)
            }
            Direction::Right => x < (t * f64::from(self.width)).round() as u32,
            Direction::Up => {
                let edge = (t * f64::from(self.height)).round() as u32;
                y >= self.height.saturating_sub(edge)
            }
            Direction::Down => y < (t * f64::from(self.height)).round() as u32,
        }
    }

    fn blind_open(&self, x: u32, y: u32, t: f64, orientation: Orientation) -> bool {
        let (pos, size) = match orientation {
            Orientation::Horizontal => (y, self.height),
            Orientation::Vertical => (x, self.width),
        };
        let bands = BLIND_BANDS.min(size).max(1);
        let band = pos * bands / size;
        let start = band * size / bands;
        let end = (band + 1) * size / bands;
        let local = f64::from(pos - start);
        local < t * f64::from(end - start)
    }

    fn checker_open(&self, x: u32, y: u32, t: f64) -> bool {
        let (tx, ty) = (x / CHECKER_TILE, y / CHECKER_TILE);
        let even = (tx + ty) % 2 == 0;
        let phase = (if even { t / 0.5 } else { (t - 0.5) / 0.5 }).clamp(0.0, 1.0);
        let tile_top = ty * CHECKER_TILE;
        let tile_h = CHECKER_TILE.min(self.height - tile_top);
        f64::from(y - tile_top) < phase * f64::from(tile_h)
    }

    fn offset_from_center(&self, x: u32, y: u32) -> Vec2 {
        offset_from_center(self.width, self.height, x, y)
    }
}

fn center(width: u32, height: u32) -> Point {
    Point::new(
        f64::from(width.saturating_sub(1)) / 2.0,
        f64::from(height.saturating_sub(1)) / 2.0,
    )
}

fn offset_from_center(width: u32, height: u32, x: u32, y: u32) -> Vec2 {
    Point::new(f64::from(x), f64::from(y)) - center(width, height)
}

fn manhattan(v: Vec2) -> f64 {
    v.x.abs() + v.y.abs()
}

fn max_over_grid(width: u32, height: u32, metric: impl Fn(Vec2) -> f64) -> f64 {
    let mut max = 0.0f64;
    for y in 0..height {
        for x in 0..width {
            max = max.max(metric(offset_from_center(width, height, x, y)));
        }
    }
    max
}

fn shuffled_rank<R: Rng + ?Sized>(width: u32, height: u32, rng: &mut R) -> Vec<u32> {
    let total = (width as usize) * (height as usize);
    let mut order: Vec<u32> = (0..total as u32).collect();
    order.shuffle(rng);
    rank_from_order(&order)
}

/// Order pixels by `distance + angle / 2π`: one revolution per pixel of radius.
fn spiral_rank(width: u32, height: u32) -> Vec<u32> {
    let mut keyed: Vec<(f64, u32)> = Vec::with_capacity((width as usize) * (height as usize));
    for y in 0..height {
        for x in 0..width {
            let v = offset_from_center(width, height, x, y);
            let mut angle = v.atan2();
            if angle < 0.0 {
                angle += TAU;
            }
            keyed.push((v.length() + angle / TAU, y * width + x));
        }
    }
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    let order: Vec<u32> = keyed.into_iter().map(|(_, idx)| idx).collect();
    rank_from_order(&order)
}

fn rank_from_order(order: &[u32]) -> Vec<u32> {
    let mut rank = vec![0u32; order.len()];
    for (position, &idx) in order.iter().enumerate() {
        rank[idx as usize] = position as u32;
    }
    rank
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn solid(c: Rgb8) -> Arc<PixelGrid> {
        Arc::new(PixelGrid::filled(16, 16, c))
    }

    fn compositor(kind: TransitionKind) -> FrameCompositor {
        let mut rng = StdRng::seed_from_u64(7);
        FrameCompositor::new(
            kind,
            Some(solid(Rgb8::new(255, 0, 0))),
            Some(solid(Rgb8::new(0, 0, 255))),
            &mut rng,
        )
        .unwrap()
    }

    fn target_count(frame: &PixelGrid) -> usize {
        frame
            .pixels()
            .iter()
            .filter(|p| **p == Rgb8::new(0, 0, 255))
            .count()
    }

    #[test]
    fn mismatched_sizes_are_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = Arc::new(PixelGrid::new(4, 4));
        let b = Arc::new(PixelGrid::new(8, 8));
        assert!(
            FrameCompositor::new(TransitionKind::Crossfade, Some(a), Some(b), &mut rng).is_err()
        );
        assert!(FrameCompositor::new(TransitionKind::Crossfade, None, None, &mut rng).is_err());
    }

    #[test]
    fn crossfade_midpoint_blends_channels() {
        let c = compositor(TransitionKind::Crossfade);
        assert_eq!(c.frame_at(0.5).get(3, 3), Rgb8::new(128, 0, 128));
    }

    #[test]
    fn slide_left_moves_target_in_from_the_right() {
        let c = compositor(TransitionKind::Slide(Direction::Left));
        let f = c.frame_at(0.25);
        // offset = 4: columns 12..16 come from the target.
        assert_eq!(f.get(11, 0), Rgb8::new(255, 0, 0));
        assert_eq!(f.get(12, 0), Rgb8::new(0, 0, 255));
    }

    #[test]
    fn slide_from_nothing_leaves_black_behind() {
        let mut rng = StdRng::seed_from_u64(1);
        let c = FrameCompositor::new(
            TransitionKind::Slide(Direction::Down),
            None,
            Some(solid(Rgb8::new(9, 9, 9))),
            &mut rng,
        )
        .unwrap();
        let f = c.frame_at(0.5);
        assert_eq!(f.get(0, 0), Rgb8::new(9, 9, 9));
        assert_eq!(f.get(0, 15), Rgb8::BLACK);
    }

    #[test]
    fn wipe_right_edge_tracks_progress() {
        let c = compositor(TransitionKind::Wipe(Direction::Right));
        let f = c.frame_at(0.5);
        assert_eq!(f.get(7, 5), Rgb8::new(0, 0, 255));
        assert_eq!(f.get(8, 5), Rgb8::new(255, 0, 0));
    }

    #[test]
    fn blinds_open_every_band_in_step() {
        let c = compositor(TransitionKind::Blinds(Orientation::Horizontal));
        let f = c.frame_at(0.5);
        // 16 rows / 8 bands = 2 rows per band; half of each band is open.
        for band in 0..8 {
            assert_eq!(f.get(0, band * 2), Rgb8::new(0, 0, 255));
            assert_eq!(f.get(0, band * 2 + 1), Rgb8::new(255, 0, 0));
        }
    }

    #[test]
    fn circle_grows_from_the_center() {
        let c = compositor(TransitionKind::Circle);
        let f = c.frame_at(0.3);
        assert_eq!(f.get(8, 8), Rgb8::new(0, 0, 255));
        assert_eq!(f.get(0, 0), Rgb8::new(255, 0, 0));
    }

    #[test]
    fn spiral_starts_at_the_center() {
        let c = compositor(TransitionKind::Spiral);
        let first = c.frame_at(4.0 / 256.0);
        assert_eq!(target_count(&first), 4);
        for (x, y) in [(7, 7), (8, 7), (7, 8), (8, 8)] {
            assert_eq!(first.get(x, y), Rgb8::new(0, 0, 255));
        }
    }

    #[test]
    fn dissolve_reveals_floor_of_progress() {
        let c = compositor(TransitionKind::Dissolve);
        assert_eq!(target_count(&c.frame_at(0.0)), 0);
        assert_eq!(target_count(&c.frame_at(0.1)), 25);
        assert_eq!(target_count(&c.frame_at(1.0)), 256);
    }

    #[test]
    fn fade_out_reaches_black() {
        let mut rng = StdRng::seed_from_u64(1);
        let c = FrameCompositor::new(
            TransitionKind::FadeOut,
            Some(solid(Rgb8::new(200, 100, 50))),
            None,
            &mut rng,
        )
        .unwrap();
        assert_eq!(c.frame_at(0.5).get(0, 0), Rgb8::new(100, 50, 25));
        assert!(c.frame_at(1.0).is_black());
    }
}
