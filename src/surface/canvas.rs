use super::encode;
use crate::error::CanvasError;
use crate::transport::StrokePoint;
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_circle_mut;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Transparent raster that strokes are inked onto
pub struct InkCanvas {
    image: RgbaImage,
    ink: Rgba<u8>,
    pen_width: f32,
    /// End of the current sub-path, None after a pen lift
    cursor: Option<(f32, f32)>,
    has_ink: bool,
}

impl InkCanvas {
    pub fn new(width: u32, height: u32, ink: Rgba<u8>, pen_width: f32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width.max(1), height.max(1), TRANSPARENT),
            ink,
            pen_width: pen_width.max(1.0),
            cursor: None,
            has_ink: false,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn is_empty(&self) -> bool {
        !self.has_ink
    }

    pub fn has_ink_at(&self, x: u32, y: u32) -> bool {
        x < self.image.width() && y < self.image.height() && self.image.get_pixel(x, y)[3] > 0
    }

    pub fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = TRANSPARENT;
        }
        self.cursor = None;
        self.has_ink = false;
    }

    /// Change the raster size; the content is dropped
    pub fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::from_pixel(width.max(1), height.max(1), TRANSPARENT);
        self.cursor = None;
        self.has_ink = false;
    }

    /// Start a new sub-path without inking
    pub fn move_to(&mut self, x: f32, y: f32) {
        self.cursor = Some((x, y));
    }

    /// Ink from the cursor to (x, y), or a dot when no sub-path is open
    pub fn line_to(&mut self, x: f32, y: f32) {
        match self.cursor {
            Some(from) => self.stamp_segment(from, (x, y)),
            None => self.stamp(x, y),
        }
        self.cursor = Some((x, y));
    }

    pub fn end_stroke(&mut self) {
        self.cursor = None;
    }

    /// Render one hardware sample. Zero pressure lifts the pen.
    pub fn paint(&mut self, point: StrokePoint) {
        let (x, y) = (point.x as f32, point.y as f32);
        if point.is_pen_lift() {
            self.move_to(x, y);
        } else {
            self.line_to(x, y);
        }
    }

    fn stamp_segment(&mut self, from: (f32, f32), to: (f32, f32)) {
        let margin = self.pen_width / 2.0 + 1.0;
        let bounds = (
            -margin,
            -margin,
            self.image.width() as f32 + margin,
            self.image.height() as f32 + margin,
        );
        let Some((from, to)) = clip_segment(from, to, bounds) else {
            return;
        };

        let (dx, dy) = (to.0 - from.0, to.1 - from.1);
        let length = (dx * dx + dy * dy).sqrt();
        let spacing = (self.pen_width / 4.0).max(0.5);
        let steps = (length / spacing).ceil().max(1.0) as usize;

        for step in 0..=steps {
            let t = step as f32 / steps as f32;
            self.stamp(from.0 + dx * t, from.1 + dy * t);
        }
    }

    fn stamp(&mut self, x: f32, y: f32) {
        let center = (x.round() as i32, y.round() as i32);
        let radius = (self.pen_width / 2.0).round() as i32;
        if radius <= 0 {
            if center.0 >= 0 && center.1 >= 0 {
                let (px, py) = (center.0 as u32, center.1 as u32);
                if px < self.image.width() && py < self.image.height() {
                    self.image.put_pixel(px, py, self.ink);
                    self.has_ink = true;
                }
            }
            return;
        }

        draw_filled_circle_mut(&mut self.image, center, radius, self.ink);
        let (width, height) = (self.image.width() as i32, self.image.height() as i32);
        if center.0 + radius >= 0
            && center.1 + radius >= 0
            && center.0 - radius < width
            && center.1 - radius < height
        {
            self.has_ink = true;
        }
    }

    pub fn to_data_url(&self) -> Result<String, CanvasError> {
        encode::to_png_data_url(&self.image)
    }

    /// Replace the content with a decoded data URL stretched to the current size
    pub fn load_data_url(&mut self, data_url: &str) -> Result<(), CanvasError> {
        let (width, height) = self.dimensions();
        let decoded = encode::from_png_data_url(data_url)?;
        self.image = encode::fit_to(decoded, width, height);
        self.cursor = None;
        self.has_ink = self.image.pixels().any(|p| p[3] > 0);
        Ok(())
    }
}

/// Liang-Barsky clip of a segment to `(min_x, min_y, max_x, max_y)`
fn clip_segment(
    from: (f32, f32),
    to: (f32, f32),
    bounds: (f32, f32, f32, f32),
) -> Option<((f32, f32), (f32, f32))> {
    if !(from.0.is_finite() && from.1.is_finite() && to.0.is_finite() && to.1.is_finite()) {
        return None;
    }

    let (min_x, min_y, max_x, max_y) = bounds;
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let (mut t0, mut t1) = (0.0f32, 1.0f32);

    for (p, q) in [
        (-dx, from.0 - min_x),
        (dx, max_x - from.0),
        (-dy, from.1 - min_y),
        (dy, max_y - from.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }

    Some((
        (from.0 + dx * t0, from.1 + dy * t0),
        (from.0 + dx * t1, from.1 + dy * t1),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn black_canvas() -> InkCanvas {
        InkCanvas::new(100, 50, Rgba([0, 0, 0, 255]), 2.0)
    }

    #[test]
    fn test_new_canvas_is_transparent() {
        let canvas = black_canvas();
        assert!(canvas.is_empty());
        assert_eq!(canvas.dimensions(), (100, 50));
        assert!(canvas.image().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_line_inks_along_segment() {
        let mut canvas = black_canvas();
        canvas.move_to(10.0, 10.0);
        canvas.line_to(50.0, 10.0);

        assert!(!canvas.is_empty());
        for x in 10..=50 {
            assert!(canvas.has_ink_at(x, 10), "gap at x={}", x);
        }
        assert!(!canvas.has_ink_at(80, 40));
    }

    #[test]
    fn test_pen_lift_starts_new_subpath() {
        let mut canvas = black_canvas();
        canvas.paint(StrokePoint::new(10.0, 10.0, 500));
        canvas.paint(StrokePoint::new(20.0, 10.0, 500));
        canvas.paint(StrokePoint::new(80.0, 40.0, 0));
        canvas.paint(StrokePoint::new(90.0, 40.0, 500));

        assert!(canvas.has_ink_at(10, 10));
        assert!(canvas.has_ink_at(20, 10));
        assert!(canvas.has_ink_at(90, 40));
        // Nothing joins the two strokes
        assert!(!canvas.has_ink_at(50, 25));
        assert!(!canvas.has_ink_at(80, 40));
    }

    #[test]
    fn test_far_segment_is_clipped() {
        let mut canvas = black_canvas();
        let started = std::time::Instant::now();
        canvas.move_to(10.0, 10.0);
        canvas.line_to(1e6, 1e6);
        assert!(started.elapsed() < std::time::Duration::from_millis(250));

        // the visible part is still inked up to the edge
        assert!(canvas.has_ink_at(10, 10));
        assert!(canvas.has_ink_at(40, 40));
        assert!(canvas.has_ink_at(49, 49));

        // a segment that never crosses the raster leaves it untouched
        let mut other = black_canvas();
        other.move_to(-1e6, -500.0);
        other.line_to(1e6, -500.0);
        assert!(other.is_empty());
        other.line_to(5.0, 5.0);
        assert!(other.has_ink_at(5, 5));
    }

    #[test]
    fn test_clear_and_resize() {
        let mut canvas = black_canvas();
        canvas.line_to(5.0, 5.0);
        assert!(!canvas.is_empty());

        canvas.clear();
        assert!(canvas.is_empty());
        assert!(!canvas.has_ink_at(5, 5));

        canvas.line_to(5.0, 5.0);
        canvas.resize(200, 80);
        assert!(canvas.is_empty());
        assert_eq!(canvas.dimensions(), (200, 80));
    }

    #[test]
    fn test_reload_data_url() {
        let mut canvas = black_canvas();
        canvas.move_to(0.0, 25.0);
        canvas.line_to(99.0, 25.0);
        let url = canvas.to_data_url().unwrap();

        let mut other = InkCanvas::new(200, 100, Rgba([0, 0, 0, 255]), 2.0);
        other.load_data_url(&url).unwrap();
        assert!(!other.is_empty());
        assert_eq!(other.dimensions(), (200, 100));
        assert!(other.has_ink_at(100, 50));
    }
}
