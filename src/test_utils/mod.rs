use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::pdf::raster::{RasterError, Rasterizer};
use crate::pdf::PdfDocument;

mod boxes;

pub use boxes::BoxRasterizer;

/// Builds small PDFs where every page paints a block at a position and
/// shade unique to its index, so thumbnails tell pages apart.
pub struct FixtureBuilder {
    pages: usize,
    media_box: [f32; 4],
}

impl FixtureBuilder {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            media_box: [0.0, 0.0, 200.0, 100.0],
        }
    }

    /// MediaBox set on the root of the page tree and inherited by pages.
    pub fn media_box(mut self, x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        self.media_box = [x0, y0, x1, y1];
        self
    }

    fn page_content(index: usize) -> Content {
        let shade = (index % 4) as f32 * 0.2;
        let x = 10 + (index * 17) % 150;
        Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new("g", vec![Object::Real(shade)]),
                Operation::new(
                    "re",
                    vec![
                        Object::Integer(x as i64),
                        Object::Integer(10),
                        Object::Integer(30),
                        Object::Integer(80),
                    ],
                ),
                Operation::new("f", vec![]),
                // a strip whose width encodes the index
                Operation::new(
                    "re",
                    vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(index as i64 + 1),
                        Object::Integer(5),
                    ],
                ),
                Operation::new("f", vec![]),
                Operation::new("Q", vec![]),
            ],
        }
    }

    pub fn build_document(&self) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids = Vec::with_capacity(self.pages);
        for index in 0..self.pages {
            let bytes = Self::page_content(index)
                .encode()
                .unwrap_or_default();
            let content_id = doc.add_object(Stream::new(dictionary! {}, bytes));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let [x0, y0, x1, y1] = self.media_box;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => self.pages as i64,
            "Resources" => dictionary! {},
            "MediaBox" => vec![Object::Real(x0), Object::Real(y0), Object::Real(x1), Object::Real(y1)],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    pub fn build(&self) -> PdfDocument {
        PdfDocument::from_document(self.build_document(), PathBuf::from("fixture.pdf"))
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref().to_path_buf();
        self.build_document()
            .save(&path)
            .unwrap_or_else(|e| panic!("failed to write fixture {}: {e}", path.display()));
        path
    }
}

/// Small thumbnails, to keep tests fast.
pub fn test_rasterizer() -> Arc<dyn Rasterizer> {
    Arc::new(BoxRasterizer::new(36.0, 400))
}

/// Fails on one page and renders the rest normally.
pub struct FailingRasterizer {
    pub fail_at: usize,
    inner: BoxRasterizer,
}

impl FailingRasterizer {
    pub fn new(fail_at: usize) -> Self {
        Self {
            fail_at,
            inner: BoxRasterizer::new(36.0, 400),
        }
    }
}

impl Rasterizer for FailingRasterizer {
    fn rasterize(&self, doc: &PdfDocument, index: usize) -> Result<Vec<u8>, RasterError> {
        if index == self.fail_at {
            return Err(RasterError::generic(format!("unreadable page {}", index + 1)));
        }
        self.inner.rasterize(doc, index)
    }
}

#[derive(Default)]
struct GateState {
    open: bool,
    waiting: usize,
}

/// Blocks every page until [`Gate::open`] is called, so a test can observe
/// a load while it is still running.
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (lock, cvar) = &*self.inner;
        if let Ok(mut state) = lock.lock() {
            state.open = true;
        }
        cvar.notify_all();
    }

    /// Block until some worker is waiting at the gate.
    pub fn wait_for_worker(&self) {
        let (lock, cvar) = &*self.inner;
        let Ok(mut state) = lock.lock() else { return };
        while state.waiting == 0 && !state.open {
            state = match cvar.wait(state) {
                Ok(s) => s,
                Err(_) => return,
            };
        }
    }

    fn pass(&self) {
        let (lock, cvar) = &*self.inner;
        let Ok(mut state) = lock.lock() else { return };
        state.waiting += 1;
        cvar.notify_all();
        while !state.open {
            state = match cvar.wait(state) {
                Ok(s) => s,
                Err(_) => return,
            };
        }
        state.waiting -= 1;
    }
}

pub struct GatedRasterizer {
    gate: Gate,
    inner: BoxRasterizer,
}

impl GatedRasterizer {
    pub fn new(gate: Gate) -> Self {
        Self {
            gate,
            inner: BoxRasterizer::new(36.0, 400),
        }
    }
}

impl Rasterizer for GatedRasterizer {
    fn rasterize(&self, doc: &PdfDocument, index: usize) -> Result<Vec<u8>, RasterError> {
        self.gate.pass();
        self.inner.rasterize(doc, index)
    }
}
