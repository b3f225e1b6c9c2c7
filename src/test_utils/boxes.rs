use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use lopdf::content::Content;
use lopdf::Object;

use crate::pdf::raster::{thumbnail_size, RasterError, Rasterizer};
use crate::pdf::PdfDocument;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Paints only the filled rectangles of a page's content stream. Fast and
/// deterministic, which is all the fixtures need.
#[derive(Debug, Clone)]
pub struct BoxRasterizer {
    dpi: f32,
    max_dimension: u32,
}

impl BoxRasterizer {
    pub fn new(dpi: f32, max_dimension: u32) -> Self {
        Self { dpi, max_dimension }
    }
}

impl Rasterizer for BoxRasterizer {
    fn rasterize(&self, doc: &PdfDocument, index: usize) -> Result<Vec<u8>, RasterError> {
        let media_box = doc.media_box(index)?;
        let bytes = doc.page_content(index)?;
        let content = Content::decode(&bytes)
            .map_err(|e| RasterError::generic(format!("undecodable content stream: {e}")))?;

        let (width, height, scale) = thumbnail_size(
            media_box[2] - media_box[0],
            media_box[3] - media_box[1],
            self.dpi,
            self.max_dimension,
        );
        let mut canvas = Canvas {
            image: RgbImage::from_pixel(width, height, WHITE),
            origin: (media_box[0], media_box[1]),
            scale,
        };
        paint(&content, &mut canvas);

        let mut png = Vec::new();
        canvas
            .image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(png)
    }
}

/// Affine transform `[a b c d e f]`, as in the `cm` operator.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    /// Apply `self` first, then `other`.
    fn then(self, other: Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [oa, ob, oc, od, oe, of] = other.0;
        Matrix([
            a * oa + b * oc,
            a * ob + b * od,
            c * oa + d * oc,
            c * ob + d * od,
            e * oa + f * oc + oe,
            e * ob + f * od + of,
        ])
    }

    fn apply(self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }
}

#[derive(Debug, Clone, Copy)]
struct GraphicsState {
    ctm: Matrix,
    fill: Rgb<u8>,
}

struct Canvas {
    image: RgbImage,
    origin: (f32, f32),
    scale: f32,
}

impl Canvas {
    /// Fill the device-space bounding box of a user-space rectangle.
    fn fill_rect(&mut self, rect: [f32; 4], ctm: Matrix, color: Rgb<u8>) {
        let [x, y, w, h] = rect;
        let corners = [(x, y), (x + w, y), (x, y + h), (x + w, y + h)].map(|(px, py)| {
            let (ux, uy) = ctm.apply(px, py);
            let dx = (ux - self.origin.0) * self.scale;
            // image rows grow downwards
            let dy = self.image.height() as f32 - (uy - self.origin.1) * self.scale;
            (dx, dy)
        });

        let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max);
        let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min);
        let max_y = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max);

        let x0 = min_x.round().max(0.0) as u32;
        let y0 = min_y.round().max(0.0) as u32;
        let x1 = (max_x.round().max(0.0) as u32).min(self.image.width());
        let y1 = (max_y.round().max(0.0) as u32).min(self.image.height());

        for py in y0..y1 {
            for px in x0..x1 {
                self.image.put_pixel(px, py, color);
            }
        }
    }
}

fn to_byte(component: f32) -> u8 {
    (component.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn cmyk_to_rgb(c: f32, m: f32, y: f32, k: f32) -> Rgb<u8> {
    let k = k.clamp(0.0, 1.0);
    Rgb([
        to_byte((1.0 - c) * (1.0 - k)),
        to_byte((1.0 - m) * (1.0 - k)),
        to_byte((1.0 - y) * (1.0 - k)),
    ])
}

/// Operators with missing or non-numeric operands are skipped.
fn paint(content: &Content, canvas: &mut Canvas) {
    let mut state = GraphicsState {
        ctm: Matrix::IDENTITY,
        fill: BLACK,
    };
    let mut saved: Vec<GraphicsState> = Vec::new();
    let mut path: Vec<[f32; 4]> = Vec::new();

    for op in &content.operations {
        let nums: Option<Vec<f32>> = op.operands.iter().map(|o| Object::as_float(o).ok()).collect();
        match (op.operator.as_str(), nums.as_deref()) {
            ("q", _) => saved.push(state),
            ("Q", _) => {
                if let Some(prev) = saved.pop() {
                    state = prev;
                }
            }
            ("cm", Some(&[a, b, c, d, e, f])) => {
                state.ctm = Matrix([a, b, c, d, e, f]).then(state.ctm);
            }
            ("g", Some(&[gray])) => {
                let v = to_byte(gray);
                state.fill = Rgb([v, v, v]);
            }
            ("rg", Some(&[r, g, b])) => {
                state.fill = Rgb([to_byte(r), to_byte(g), to_byte(b)]);
            }
            ("k", Some(&[c, m, y, k])) => state.fill = cmyk_to_rgb(c, m, y, k),
            ("re", Some(&[x, y, w, h])) => path.push([x, y, w, h]),
            ("f" | "F" | "f*" | "B" | "B*" | "b" | "b*", _) => {
                for rect in path.drain(..) {
                    canvas.fill_rect(rect, state.ctm, state.fill);
                }
            }
            ("n" | "S" | "s", _) => path.clear(),
            _ => {}
        }
    }
}
