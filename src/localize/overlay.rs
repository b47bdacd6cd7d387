/// Grid overlay rendering for grid-narrowing localization.
///
/// Draws grid lines over a search rectangle, prints each cell's row-major
/// index at the cell centre, and outlines the previous step's rectangle.
use image::{Rgba, RgbaImage};

use crate::localize::geometry::{partition, BoundingBox, GridCell};

const LINE_COLOUR: [u8; 4] = [255, 0, 0, 255];
const LABEL_COLOUR: [u8; 4] = [255, 0, 0, 200];
const OUTLINE_COLOUR: [u8; 4] = [255, 0, 0, 255];

// ── Minimal 5×5 bitmap font (digits only) ────────────────────────────────────
// Each glyph: 5 rows, each row is a u8 where bit4=leftmost pixel, bit0=rightmost.
const DIGITS_5X5: [[u8; 5]; 10] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // 0
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110], // 1
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111], // 2
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110], // 3
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010], // 4
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110], // 5
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110], // 6
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100], // 7
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110], // 8
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110], // 9
];

/// Render the grid for one refinement step.
///
/// `target` is the current search rectangle (`None` = whole image). Returns
/// the annotated copy and the `rows × cols` cells in absolute coordinates.
/// A degenerate target gets only its outline; every cell is that target.
pub fn annotate_grid(
    image: &RgbaImage,
    target: Option<BoundingBox>,
    rows: u32,
    cols: u32,
) -> (RgbaImage, Vec<GridCell>) {
    let mut canvas = image.clone();
    let (w, h) = canvas.dimensions();

    let search = match target {
        Some(rect) => {
            let rect = rect.normalized();
            draw_rect(&mut canvas, rect, OUTLINE_COLOUR, 1);
            rect
        }
        None => BoundingBox::full(w, h),
    };

    let cells = partition(search, rows, cols);
    if search.is_degenerate() {
        tracing::warn!(rect = %search, "search rectangle is degenerate; grid not drawn");
        return (canvas, cells);
    }

    // Interior grid lines; edges are shared so the first row/col's leading edge
    // and the last row/col's trailing edge are skipped.
    for cell in cells.iter().filter(|c| c.rect.x1 > search.x1 && c.index < cols as usize) {
        vline(&mut canvas, cell.rect.x1, search.y1, search.y2, LINE_COLOUR);
    }
    for cell in cells
        .iter()
        .filter(|c| c.rect.y1 > search.y1 && c.index % cols.max(1) as usize == 0)
    {
        hline(&mut canvas, cell.rect.y1, search.x1, search.x2, LINE_COLOUR);
    }

    for cell in &cells {
        let (cw, ch) = (cell.rect.width(), cell.rect.height());
        if cw < 1 || ch < 1 {
            continue;
        }
        let scale = label_scale(cw, ch);
        let (cx, cy) = cell.rect.midpoint();
        draw_label(&mut canvas, &cell.index.to_string(), cx, cy, scale, LABEL_COLOUR);
    }

    (canvas, cells)
}

/// Red 2-px outline used when highlighting a resolved element.
pub fn draw_bounding_box(image: &mut RgbaImage, bbox: BoundingBox) {
    draw_rect(image, bbox.normalized(), [255, 0, 0, 255], 2);
}

/// Glyph scale that keeps labels legible but inside the cell.
fn label_scale(cell_w: i32, cell_h: i32) -> u32 {
    (cell_w.min(cell_h) / 25).clamp(1, 4) as u32
}

// ── Drawing primitives ──────────────────────────────────────────────────────

fn put(canvas: &mut RgbaImage, x: i32, y: i32, col: [u8; 4]) {
    let (w, h) = canvas.dimensions();
    if x < 0 || y < 0 || x >= w as i32 || y >= h as i32 {
        return;
    }
    blend_pixel(canvas.get_pixel_mut(x as u32, y as u32), col);
}

fn blend_pixel(pixel: &mut Rgba<u8>, col: [u8; 4]) {
    let a = col[3] as f32 / 255.0;
    pixel[0] = (pixel[0] as f32 * (1.0 - a) + col[0] as f32 * a).round() as u8;
    pixel[1] = (pixel[1] as f32 * (1.0 - a) + col[1] as f32 * a).round() as u8;
    pixel[2] = (pixel[2] as f32 * (1.0 - a) + col[2] as f32 * a).round() as u8;
    pixel[3] = 255;
}

fn vline(canvas: &mut RgbaImage, x: i32, y1: i32, y2: i32, col: [u8; 4]) {
    let (w, h) = canvas.dimensions();
    if x < 0 || x >= w as i32 || h == 0 {
        return;
    }
    for y in y1.max(0)..=y2.min(h as i32 - 1) {
        put(canvas, x, y, col);
    }
}

fn hline(canvas: &mut RgbaImage, y: i32, x1: i32, x2: i32, col: [u8; 4]) {
    let (w, h) = canvas.dimensions();
    if y < 0 || y >= h as i32 || w == 0 {
        return;
    }
    for x in x1.max(0)..=x2.min(w as i32 - 1) {
        put(canvas, x, y, col);
    }
}

fn draw_rect(canvas: &mut RgbaImage, r: BoundingBox, col: [u8; 4], thickness: i32) {
    for t in 0..thickness {
        let (top, bottom) = (r.y1.saturating_add(t), r.y2.saturating_sub(t));
        let (left, right) = (r.x1.saturating_add(t), r.x2.saturating_sub(t));
        hline(canvas, top, r.x1, r.x2, col);
        if bottom != top {
            hline(canvas, bottom, r.x1, r.x2, col);
        }
        vline(canvas, left, r.y1, r.y2, col);
        if right != left {
            vline(canvas, right, r.y1, r.y2, col);
        }
    }
}

/// Draw `text` centred on (cx, cy) over a darkened backing box.
fn draw_label(canvas: &mut RgbaImage, text: &str, cx: i32, cy: i32, scale: u32, col: [u8; 4]) {
    let scale = scale as i32;
    let step = 5 * scale + scale;
    let text_w = text.len() as i32 * step - scale;
    let text_h = 5 * scale;
    let x0 = cx - text_w / 2;
    let y0 = cy - text_h / 2;

    let (w, h) = canvas.dimensions();
    for y in (y0 - 1)..=(y0 + text_h) {
        for x in (x0 - 1)..=(x0 + text_w) {
            if x >= 0 && y >= 0 && x < w as i32 && y < h as i32 {
                let p = canvas.get_pixel_mut(x as u32, y as u32);
                p[0] = (p[0] as f32 * 0.35) as u8;
                p[1] = (p[1] as f32 * 0.35) as u8;
                p[2] = (p[2] as f32 * 0.35) as u8;
            }
        }
    }

    for (i, c) in text.chars().enumerate() {
        let Some(d) = c.to_digit(10) else { continue };
        let glyph = &DIGITS_5X5[d as usize];
        let gx = x0 + i as i32 * step;
        for (row, &bits) in glyph.iter().enumerate() {
            for bit in 0..5 {
                if (bits >> (4 - bit)) & 1 == 0 {
                    continue;
                }
                for sy in 0..scale {
                    for sx in 0..scale {
                        put(canvas, gx + bit * scale + sx, y0 + row as i32 * scale + sy, col);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
    }

    #[test]
    fn whole_image_grid_draws_lines() {
        let img = white(400, 400);
        let (out, cells) = annotate_grid(&img, None, 4, 4);
        assert_eq!(cells.len(), 16);
        assert_eq!(cells[15].rect, BoundingBox::new(300, 300, 400, 400));
        // Interior vertical line at x=100, away from any label.
        assert_eq!(out.get_pixel(100, 5), &Rgba([255, 0, 0, 255]));
        // Corner pixel untouched.
        assert_eq!(out.get_pixel(1, 1), &Rgba([255, 255, 255, 255]));
        // Centre of cell 0 carries a label (darkened or red).
        assert_ne!(out.get_pixel(50, 50), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn target_rect_is_outlined_and_subdivided() {
        let img = white(400, 400);
        let target = BoundingBox::new(200, 100, 100, 0);
        let (out, cells) = annotate_grid(&img, Some(target), 2, 2);
        assert_eq!(cells[0].rect, BoundingBox::new(100, 0, 150, 50));
        assert_eq!(cells[3].rect, BoundingBox::new(150, 50, 200, 100));
        assert_eq!(out.get_pixel(100, 80), &Rgba([255, 0, 0, 255]));
        // Outside the target nothing changes.
        assert_eq!(out.get_pixel(300, 300), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn degenerate_target_does_not_panic() {
        let img = white(50, 50);
        let flat = BoundingBox::new(10, 20, 30, 20);
        let (out, cells) = annotate_grid(&img, Some(flat), 4, 4);
        assert_eq!(cells.len(), 16);
        assert!(cells.iter().all(|c| c.rect == flat));
        assert_eq!(out.get_pixel(15, 20), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn out_of_bounds_target_is_clipped() {
        let img = white(20, 20);
        let (_, cells) = annotate_grid(&img, Some(BoundingBox::new(-10, -10, 60, 60)), 3, 3);
        assert_eq!(cells.len(), 9);
    }

    #[test]
    fn bounding_box_is_red() {
        let mut img = white(40, 40);
        draw_bounding_box(&mut img, BoundingBox::new(30, 30, 5, 5));
        assert_eq!(img.get_pixel(5, 20), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(6, 20), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(20, 20), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn huge_bounding_box_is_clipped_to_canvas() {
        let mut img = white(100, 100);
        let started = std::time::Instant::now();
        draw_bounding_box(&mut img, BoundingBox::new(0, 0, i32::MAX, 10));
        draw_bounding_box(&mut img, BoundingBox::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        // Top edge drawn across the visible width, right edge off-canvas.
        assert_eq!(img.get_pixel(99, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(50, 50), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn box_entirely_off_canvas_draws_nothing() {
        let mut img = white(10, 10);
        draw_bounding_box(&mut img, BoundingBox::new(500, 500, 900, 900));
        assert!(img.pixels().all(|p| *p == Rgba([255, 255, 255, 255])));
    }
}
