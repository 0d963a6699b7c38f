//! Line rasterization.
//!
//! Clients render `drawLine` replies cell by cell, so the exact cell sequence
//! produced here is part of the protocol. Steep lines round the accumulated x
//! to nearest while shallow lines truncate the accumulated y, and the stepping
//! walk is half-open with the endpoint appended afterwards. Both quirks are
//! relied upon by existing clients.

use std::collections::HashSet;

/// Grid points on the segment from `(x1, y1)` to `(x2, y2)`, in walk order.
///
/// Accumulation is done in `f32` so that the rounding of every step matches
/// what clients expect.
pub fn points_on_line(x1: usize, y1: usize, x2: usize, y2: usize) -> Vec<(usize, usize)> {
    let (x1, y1, x2, y2) = (x1 as i64, y1 as i64, x2 as i64, y2 as i64);
    let mut points = Vec::new();

    if x1 == x2 {
        let step = if y2 < y1 { -1 } else { 1 };
        let mut y = y1;
        while y != y2 {
            points.push((x1, y));
            y += step;
        }
    } else {
        let slope = (y2 - y1) as f32 / (x2 - x1) as f32;

        if slope.abs() >= 1.0 {
            // One point per row.
            let mut dx = (x2 - x1) as f32 / (y2 - y1) as f32;
            let step = if y2 < y1 {
                dx = -dx;
                -1
            } else {
                1
            };
            let mut x = x1 as f32;
            let mut y = y1;
            while y != y2 {
                points.push(((x + 0.5).floor() as i64, y));
                x += dx;
                y += step;
            }
        } else {
            // One point per column.
            let mut dy = slope;
            let step = if x2 < x1 {
                dy = -dy;
                -1
            } else {
                1
            };
            let mut x = x1;
            let mut y = y1 as f32;
            while x != x2 {
                points.push((x, y as i64));
                y += dy;
                x += step;
            }
        }
    }

    points.push((x2, y2));

    points
        .into_iter()
        .map(|(x, y)| (x.max(0) as usize, y.max(0) as usize))
        .collect()
}

/// Expand each walked point into a square of half-width `thickness / 2`,
/// clipped to a `width` x `height` grid.
///
/// Cells come out in the order they are first reached (x outer, y inner for
/// each square); a cell reached again by a later square is skipped.
pub fn thicken(
    points: &[(usize, usize)],
    thickness: usize,
    width: usize,
    height: usize,
) -> Vec<(usize, usize)> {
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let half = thickness / 2;
    let mut seen = HashSet::new();
    let mut cells = Vec::new();

    for &(px, py) in points {
        let x_min = px.saturating_sub(half);
        let x_max = px.saturating_add(half).min(width - 1);
        let y_min = py.saturating_sub(half);
        let y_max = py.saturating_add(half).min(height - 1);

        for x in x_min..=x_max {
            for y in y_min..=y_max {
                if seen.insert((x, y)) {
                    cells.push((x, y));
                }
            }
        }
    }

    cells
}
