use glam::DVec2;

use crate::braille::BrailleCanvas;
use crate::color::Rgb;

/// Walk the pixels of a line using Bresenham's algorithm
fn bresenham(x0: i32, y0: i32, x1: i32, y1: i32, mut plot: impl FnMut(i32, i32)) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let mut x = x0;
    let mut y = y0;

    loop {
        plot(x, y);

        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;

        if e2 >= dy {
            if x == x1 {
                break;
            }
            err += dy;
            x += sx;
        }

        if e2 <= dx {
            if y == y1 {
                break;
            }
            err += dx;
            y += sy;
        }
    }
}

/// Draw a line using Bresenham's algorithm
pub fn draw_line(canvas: &mut BrailleCanvas, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb) {
    bresenham(x0, y0, x1, y1, |x, y| canvas.set_pixel_signed(x, y, color));
}

/// Erase a line, used to carve borders between filled regions
pub fn clear_line(canvas: &mut BrailleCanvas, x0: i32, y0: i32, x1: i32, y1: i32) {
    bresenham(x0, y0, x1, y1, |x, y| canvas.clear_pixel_signed(x, y));
}

/// Draw a filled circle (for point markers)
pub fn draw_circle(canvas: &mut BrailleCanvas, cx: i32, cy: i32, radius: i32, color: Rgb) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                canvas.set_pixel_signed(cx + dx, cy + dy, color);
            }
        }
    }
}

/// Draw the outline of an axis-aligned rectangle
pub fn draw_rect(canvas: &mut BrailleCanvas, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb) {
    draw_line(canvas, x0, y0, x1, y0, color);
    draw_line(canvas, x1, y0, x1, y1, color);
    draw_line(canvas, x1, y1, x0, y1, color);
    draw_line(canvas, x0, y1, x0, y0, color);
}

/// Fill polygons (even-odd rule) by scanning pixel centres row by row.
/// `sparse` fills every other dot, for hatched pattern fills.
pub fn fill_polygon(canvas: &mut BrailleCanvas, rings: &[Vec<DVec2>], color: Rgb, sparse: bool) {
    let Some((min_y, max_y)) = rings
        .iter()
        .flatten()
        .fold(None, |acc: Option<(f64, f64)>, p| Some(acc.map_or((p.y, p.y), |(lo, hi)| (lo.min(p.y), hi.max(p.y)))))
    else {
        return;
    };
    let pixel_rows = (canvas.height() * 4) as i32;
    let pixel_cols = (canvas.width() * 2) as i32;
    let first = (min_y.floor() as i32).max(0);
    let last = (max_y.ceil() as i32).min(pixel_rows - 1);

    let mut crossings = Vec::new();
    for y in first..=last {
        let sy = y as f64 + 0.5;
        crossings.clear();
        for ring in rings {
            for edge in ring.windows(2) {
                let (a, b) = (edge[0], edge[1]);
                if (a.y > sy) != (b.y > sy) {
                    crossings.push(a.x + (sy - a.y) / (b.y - a.y) * (b.x - a.x));
                }
            }
        }
        crossings.sort_by(f64::total_cmp);
        for span in crossings.chunks_exact(2) {
            let x0 = ((span[0] - 0.5).ceil() as i32).max(0);
            let x1 = ((span[1] - 0.5).floor() as i32).min(pixel_cols - 1);
            for x in x0..=x1 {
                if !sparse || (x + y) % 2 == 0 {
                    canvas.set_pixel_signed(x, y, color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb = Rgb::new(255, 255, 255);

    #[test]
    fn test_horizontal_line() {
        let mut canvas = BrailleCanvas::new(5, 1);
        draw_line(&mut canvas, 0, 0, 9, 0, WHITE);
        // Top dots across every cell
        assert_eq!(canvas.to_string(), "⠉⠉⠉⠉⠉");
    }

    #[test]
    fn test_vertical_line() {
        let mut canvas = BrailleCanvas::new(1, 2);
        draw_line(&mut canvas, 0, 0, 0, 7, WHITE);
        assert_eq!(canvas.to_string(), "⡇\n⡇");
    }

    #[test]
    fn test_fill_square() {
        let mut canvas = BrailleCanvas::new(2, 1);
        let square = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(2.0, 0.0),
            DVec2::new(2.0, 4.0),
            DVec2::new(0.0, 4.0),
            DVec2::new(0.0, 0.0),
        ];
        fill_polygon(&mut canvas, &[square], WHITE, false);
        assert_eq!(canvas.to_string(), "⣿\u{2800}");
    }

    #[test]
    fn test_fill_respects_holes() {
        let mut canvas = BrailleCanvas::new(3, 2);
        let outer = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(6.0, 0.0),
            DVec2::new(6.0, 8.0),
            DVec2::new(0.0, 8.0),
            DVec2::new(0.0, 0.0),
        ];
        let hole = vec![
            DVec2::new(2.0, 2.0),
            DVec2::new(4.0, 2.0),
            DVec2::new(4.0, 6.0),
            DVec2::new(2.0, 6.0),
            DVec2::new(2.0, 2.0),
        ];
        fill_polygon(&mut canvas, &[outer, hole], WHITE, false);
        assert!(canvas.is_set(0, 0));
        assert!(!canvas.is_set(3, 3));
        assert!(canvas.is_set(5, 7));
    }

    #[test]
    fn test_clear_line_carves_gap() {
        let mut canvas = BrailleCanvas::new(2, 1);
        draw_line(&mut canvas, 0, 1, 3, 1, WHITE);
        clear_line(&mut canvas, 2, 0, 2, 3);
        assert!(canvas.is_set(1, 1));
        assert!(!canvas.is_set(2, 1));
    }
}
