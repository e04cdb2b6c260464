//! SVG output surface

use geo::Point;
use std::fmt::Write;
use track_dots_lib::{Canvas, Color, DotShape};

/// A [`Canvas`] that accumulates one SVG document
pub struct SvgCanvas {
    body: String,
    width: u32,
    height: u32,
    background: Color,
}

impl SvgCanvas {
    pub fn new(width: u32, height: u32, background: Color) -> Self {
        Self {
            body: String::new(),
            width,
            height,
            background,
        }
    }

    /// The complete document
    pub fn finish(self) -> String {
        format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n\
             <rect width=\"100%\" height=\"100%\" fill=\"{bg}\"/>\n{body}</svg>\n",
            w = self.width,
            h = self.height,
            bg = self.background,
            body = self.body,
        )
    }
}

impl Canvas for SvgCanvas {
    fn begin_path(&mut self, color: Color, width: f64) {
        let _ = write!(
            self.body,
            "<path fill=\"none\" stroke=\"{color}\" stroke-width=\"{width}\" stroke-linecap=\"round\" stroke-linejoin=\"round\" d=\""
        );
    }

    fn move_to(&mut self, p: Point<f64>) {
        let _ = write!(self.body, "M{:.1} {:.1}", p.x(), p.y());
    }

    fn line_to(&mut self, p: Point<f64>) {
        let _ = write!(self.body, "L{:.1} {:.1}", p.x(), p.y());
    }

    fn stroke(&mut self) {
        self.body.push_str("\"/>\n");
    }

    fn set_fill(&mut self, color: Color) {
        let _ = writeln!(self.body, "<g fill=\"{color}\">");
    }

    fn dot(&mut self, p: Point<f64>, size: f64, shape: DotShape) {
        let half = size / 2.0;
        let _ = match shape {
            DotShape::Circle => writeln!(
                self.body,
                "<circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"{half}\"/>",
                p.x(),
                p.y()
            ),
            DotShape::Square => writeln!(
                self.body,
                "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"{size}\" height=\"{size}\"/>",
                p.x() - half,
                p.y() - half
            ),
        };
    }

    fn fill(&mut self) {
        self.body.push_str("</g>\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document() {
        let mut canvas = SvgCanvas::new(10, 20, Color::WHITE);
        canvas.begin_path(Color::BLACK, 2.0);
        canvas.move_to(Point::new(1.0, 2.0));
        canvas.line_to(Point::new(3.0, 4.0));
        canvas.stroke();
        canvas.set_fill(Color::rgb(255, 0, 0));
        canvas.dot(Point::new(5.0, 5.0), 4.0, DotShape::Circle);
        canvas.dot(Point::new(5.0, 5.0), 4.0, DotShape::Square);
        canvas.fill();

        let svg = canvas.finish();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("viewBox=\"0 0 10 20\""));
        assert!(svg.contains("fill=\"#ffffff\""));
        assert!(svg.contains("stroke=\"#000000\""));
        assert!(svg.contains("d=\"M1.0 2.0L3.0 4.0\"/>"));
        assert!(svg.contains("<g fill=\"#ff0000\">\n<circle cx=\"5.0\" cy=\"5.0\" r=\"2\"/>"));
        assert!(svg.contains("<rect x=\"3.0\" y=\"3.0\" width=\"4\" height=\"4\"/>\n</g>"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }
}
