use super::canvas::InkCanvas;

/// Pointer and touch drawing onto an [`InkCanvas`]
#[derive(Debug, Default)]
pub struct FreehandPad {
    enabled: bool,
    drawing: bool,
}

impl FreehandPad {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            drawing: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn on(&mut self) {
        self.enabled = true;
    }

    /// Stop accepting input; a stroke in progress is abandoned
    pub fn off(&mut self) {
        self.enabled = false;
        self.drawing = false;
    }

    pub fn pointer_down(&mut self, canvas: &mut InkCanvas, x: f32, y: f32) -> bool {
        if !self.enabled {
            return false;
        }
        canvas.move_to(x, y);
        canvas.line_to(x, y);
        self.drawing = true;
        true
    }

    pub fn pointer_move(&mut self, canvas: &mut InkCanvas, x: f32, y: f32) -> bool {
        if !self.enabled || !self.drawing {
            return false;
        }
        canvas.line_to(x, y);
        true
    }

    /// Returns true when this completes a stroke
    pub fn pointer_up(&mut self, canvas: &mut InkCanvas) -> bool {
        if !self.enabled || !self.drawing {
            return false;
        }
        canvas.end_stroke();
        self.drawing = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_stroke_lifecycle() {
        let mut canvas = InkCanvas::new(50, 50, Rgba([0, 0, 0, 255]), 2.0);
        let mut pad = FreehandPad::new(true);

        assert!(!pad.pointer_up(&mut canvas));
        assert!(pad.pointer_down(&mut canvas, 5.0, 5.0));
        assert!(pad.pointer_move(&mut canvas, 30.0, 5.0));
        assert!(pad.pointer_up(&mut canvas));
        assert!(canvas.has_ink_at(20, 5));

        // Moves without a press draw nothing
        assert!(!pad.pointer_move(&mut canvas, 30.0, 40.0));
        assert!(!canvas.has_ink_at(30, 40));
    }

    #[test]
    fn test_disabled_pad_ignores_input() {
        let mut canvas = InkCanvas::new(50, 50, Rgba([0, 0, 0, 255]), 2.0);
        let mut pad = FreehandPad::new(false);

        assert!(!pad.pointer_down(&mut canvas, 5.0, 5.0));
        assert!(canvas.is_empty());

        pad.on();
        pad.pointer_down(&mut canvas, 5.0, 5.0);
        pad.off();
        assert!(!pad.pointer_up(&mut canvas));
    }
}
