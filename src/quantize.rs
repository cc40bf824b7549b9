use rand::{Rng, seq::SliceRandom};

use crate::foundation::{
    core::{PixelGrid, Rgb8},
    error::{CoverError, CoverResult},
};

const MAX_ITERATIONS: usize = 24;
const CONVERGED_SHIFT: f32 = 0.5;

/// The two colours sent to every ambient device for one cover.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AmbientColorPair {
    pub primary: Rgb8,
    pub secondary: Rgb8,
}

type Point3 = [f32; 3];

fn to_point(c: Rgb8) -> Point3 {
    [f32::from(c.r), f32::from(c.g), f32::from(c.b)]
}

fn to_color(p: Point3) -> Rgb8 {
    let ch = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    Rgb8::new(ch(p[0]), ch(p[1]), ch(p[2]))
}

fn dist2(a: Point3, b: Point3) -> f32 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d0 * d0 + d1 * d1 + d2 * d2
}

fn nearest(p: Point3, centroids: &[Point3]) -> (usize, f32) {
    let mut best = (0usize, f32::INFINITY);
    for (i, c) in centroids.iter().enumerate() {
        let d = dist2(p, *c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

/// Reduce `grid` to exactly `k` colours, most populated cluster first.
///
/// Colours are distinct whenever the grid holds at least `k` distinct colours. A single-colour
/// grid yields `k` copies of that colour.
pub fn quantize<R: Rng + ?Sized>(grid: &PixelGrid, k: usize, rng: &mut R) -> CoverResult<Vec<Rgb8>> {
    if k < 2 {
        return Err(CoverError::validation("colour count must be at least 2"));
    }
    if grid.is_empty() {
        return Err(CoverError::validation("cannot quantize an empty grid"));
    }

    let points: Vec<Point3> = grid.pixels().iter().map(|c| to_point(*c)).collect();
    let mut centroids = seed_plus_plus(&points, k, rng);
    let mut assignment = vec![0usize; points.len()];

    for _ in 0..MAX_ITERATIONS {
        for (slot, p) in assignment.iter_mut().zip(&points) {
            *slot = nearest(*p, &centroids).0;
        }

        let mut sums = vec![[0f32; 3]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for (p, &cluster) in points.iter().zip(&assignment) {
            for ch in 0..3 {
                sums[cluster][ch] += p[ch];
            }
            counts[cluster] += 1;
        }

        let mut shift = 0f32;
        for i in 0..centroids.len() {
            let next = if counts[i] == 0 {
                farthest_point(&points, &centroids)
            } else {
                let n = counts[i] as f32;
                [sums[i][0] / n, sums[i][1] / n, sums[i][2] / n]
            };
            shift = shift.max(dist2(centroids[i], next));
            centroids[i] = next;
        }
        if shift < CONVERGED_SHIFT * CONVERGED_SHIFT {
            break;
        }
    }

    let mut populations = vec![0usize; centroids.len()];
    for p in &points {
        populations[nearest(*p, &centroids).0] += 1;
    }
    let mut ranked: Vec<(usize, Rgb8)> = populations
        .into_iter()
        .zip(centroids.iter().map(|c| to_color(*c)))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));

    let mut palette: Vec<Rgb8> = Vec::with_capacity(k);
    for (_, color) in ranked {
        if !palette.contains(&color) {
            palette.push(color);
        }
    }
    fill_distinct(&mut palette, grid, k);
    Ok(palette)
}

fn seed_plus_plus<R: Rng + ?Sized>(points: &[Point3], k: usize, rng: &mut R) -> Vec<Point3> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.random_range(0..points.len())]);
    let mut weights = vec![0f32; points.len()];

    while centroids.len() < k {
        let mut total = 0f64;
        for (w, p) in weights.iter_mut().zip(points) {
            *w = nearest(*p, &centroids).1;
            total += f64::from(*w);
        }
        if total <= 0.0 {
            // Fewer distinct colours than clusters.
            centroids.push(centroids[0]);
            continue;
        }
        let mut target = rng.random::<f64>() * total;
        let mut chosen = points.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            target -= f64::from(*w);
            if target <= 0.0 && *w > 0.0 {
                chosen = i;
                break;
            }
        }
        centroids.push(points[chosen]);
    }
    centroids
}

fn farthest_point(points: &[Point3], centroids: &[Point3]) -> Point3 {
    points
        .iter()
        .copied()
        .max_by(|a, b| nearest(*a, centroids).1.total_cmp(&nearest(*b, centroids).1))
        .unwrap_or([0.0; 3])
}

/// Top the palette up to `k` entries, preferring unused grid colours far from the palette.
fn fill_distinct(palette: &mut Vec<Rgb8>, grid: &PixelGrid, k: usize) {
    while palette.len() < k {
        let chosen: Vec<Point3> = palette.iter().map(|c| to_point(*c)).collect();
        let candidate = grid
            .pixels()
            .iter()
            .filter(|c| !palette.contains(c))
            .max_by(|a, b| {
                nearest(to_point(**a), &chosen)
                    .1
                    .total_cmp(&nearest(to_point(**b), &chosen).1)
            })
            .copied();
        match candidate {
            Some(c) => palette.push(c),
            None => {
                let repeat = palette.first().copied().unwrap_or(Rgb8::BLACK);
                palette.push(repeat);
            }
        }
    }
    palette.truncate(k);
}

/// Shuffle the palette and take the first two colours.
pub fn pick_ambient_pair<R: Rng + ?Sized>(
    palette: &[Rgb8],
    rng: &mut R,
) -> CoverResult<AmbientColorPair> {
    if palette.len() < 2 {
        return Err(CoverError::validation(
            "ambient pair needs at least two colours",
        ));
    }
    let mut shuffled = palette.to_vec();
    shuffled.shuffle(rng);
    Ok(AmbientColorPair {
        primary: shuffled[0],
        secondary: shuffled[1],
    })
}
