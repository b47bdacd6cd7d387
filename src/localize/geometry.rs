use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in absolute image coordinates, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Build from raw corners in any order; the result is normalized.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }.normalized()
    }

    /// Whole image of the given size.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    /// A zero-area box at one point.
    pub fn point(x: i32, y: i32) -> Self {
        Self { x1: x, y1: y, x2: x, y2: y }
    }

    pub fn normalized(self) -> Self {
        Self {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Actionable point: floor of the corner average on each axis.
    pub fn midpoint(&self) -> (i32, i32) {
        let b = self.normalized();
        (
            (b.x1 as i64 + b.x2 as i64).div_euclid(2) as i32,
            (b.y1 as i64 + b.y2 as i64).div_euclid(2) as i32,
        )
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x1, self.y1, self.x2, self.y2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    /// Row-major: `row * cols + col`.
    pub index: usize,
    pub rect: BoundingBox,
}

/// Split `rect` into `rows × cols` cells in row-major order.
///
/// Cell edges are rounded to the nearest pixel and shared between
/// neighbours, so non-degenerate rectangles are tiled exactly. A degenerate
/// rectangle yields `rows × cols` copies of itself.
pub fn partition(rect: BoundingBox, rows: u32, cols: u32) -> Vec<GridCell> {
    let rect = rect.normalized();
    let rows = rows.max(1);
    let cols = cols.max(1);
    let total = (rows * cols) as usize;

    if rect.is_degenerate() {
        return (0..total).map(|index| GridCell { index, rect }).collect();
    }

    let xs: Vec<i32> = (0..=cols).map(|i| edge(rect.x1, rect.width(), i, cols)).collect();
    let ys: Vec<i32> = (0..=rows).map(|i| edge(rect.y1, rect.height(), i, rows)).collect();

    let mut cells = Vec::with_capacity(total);
    for r in 0..rows as usize {
        for c in 0..cols as usize {
            cells.push(GridCell {
                index: r * cols as usize + c,
                rect: BoundingBox { x1: xs[c], y1: ys[r], x2: xs[c + 1], y2: ys[r + 1] },
            });
        }
    }
    cells
}

/// `origin + round(span * i / n)` for `span > 0`.
fn edge(origin: i32, span: i32, i: u32, n: u32) -> i32 {
    let num = 2 * span as i64 * i as i64 + n as i64;
    origin + (num / (2 * n as i64)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(b: &BoundingBox) -> i64 {
        b.width() as i64 * b.height() as i64
    }

    #[test]
    fn normalization_ignores_corner_order() {
        let a = BoundingBox { x1: 10, y1: 20, x2: 30, y2: 40 }.normalized();
        let b = BoundingBox { x1: 30, y1: 20, x2: 10, y2: 40 }.normalized();
        let c = BoundingBox { x1: 30, y1: 40, x2: 10, y2: 20 }.normalized();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(BoundingBox::new(30, 40, 10, 20), a);
    }

    #[test]
    fn midpoint_floors_and_survives_swaps() {
        assert_eq!(BoundingBox::new(10, 20, 30, 40).midpoint(), (20, 30));
        assert_eq!(BoundingBox::new(0, 0, 5, 5).midpoint(), (2, 2));
        assert_eq!(BoundingBox::new(-3, -3, 0, 0).midpoint(), (-2, -2));

        let raw = BoundingBox { x1: 7, y1: 3, x2: 2, y2: 10 };
        let swapped = BoundingBox { x1: raw.x2, y1: raw.y2, x2: raw.x1, y2: raw.y1 };
        assert_eq!(raw.midpoint(), swapped.midpoint());
    }

    #[test]
    fn partition_tiles_rectangle_exactly() {
        let rects = [
            BoundingBox::new(0, 0, 1920, 1080),
            BoundingBox::new(13, 7, 113, 50),
            BoundingBox::new(5, 5, 8, 6),
        ];
        for rect in rects {
            for rows in 1..=6u32 {
                for cols in 1..=6u32 {
                    let cells = partition(rect, rows, cols);
                    assert_eq!(cells.len(), (rows * cols) as usize);

                    let total: i64 = cells.iter().map(|c| area(&c.rect)).sum();
                    assert_eq!(total, area(&rect), "{rect} {rows}x{cols}");

                    for (i, cell) in cells.iter().enumerate() {
                        assert_eq!(cell.index, i);
                        let (r, c) = (i / cols as usize, i % cols as usize);
                        if c + 1 < cols as usize {
                            assert_eq!(cell.rect.x2, cells[i + 1].rect.x1);
                        } else {
                            assert_eq!(cell.rect.x2, rect.x2);
                        }
                        if r + 1 < rows as usize {
                            assert_eq!(cell.rect.y2, cells[i + cols as usize].rect.y1);
                        } else {
                            assert_eq!(cell.rect.y2, rect.y2);
                        }
                        if c == 0 {
                            assert_eq!(cell.rect.x1, rect.x1);
                        }
                        if r == 0 {
                            assert_eq!(cell.rect.y1, rect.y1);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn quarter_grid_cells() {
        let cells = partition(BoundingBox::full(400, 200), 4, 4);
        assert_eq!(cells[0].rect, BoundingBox::new(0, 0, 100, 50));
        assert_eq!(cells[5].rect, BoundingBox::new(100, 50, 200, 100));
        assert_eq!(cells[15].rect, BoundingBox::new(300, 150, 400, 200));
    }

    #[test]
    fn degenerate_rect_repeats_itself() {
        let flat = BoundingBox::new(10, 10, 40, 10);
        let cells = partition(flat, 4, 4);
        assert_eq!(cells.len(), 16);
        assert!(cells.iter().all(|c| c.rect == flat));
        assert_eq!(cells[15].index, 15);
    }
}
