use std::collections::HashSet;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use lopdf::{Document, Object, ObjectId};
use thiserror::Error;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic `Parent` chains in broken files.
const MAX_TREE_DEPTH: usize = 64;

/// US Letter, used when no MediaBox can be found.
pub const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to open PDF {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    #[error("page {page} is out of range (1-{total})")]
    PageOutOfRange { page: usize, total: usize },

    #[error("page {page} appears more than once")]
    DuplicatePage { page: usize },

    #[error("malformed page tree: {0}")]
    PageTree(#[from] lopdf::Error),

    #[error("failed to write PDF {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An opened source document. Pages are addressed by zero-based index.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    pub doc: Document,
    pub path: PathBuf,
    pages: Vec<ObjectId>,
}

impl PdfDocument {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DocumentError> {
        let path = path.as_ref().to_path_buf();
        let doc = Document::load(&path).map_err(|source| DocumentError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self::from_document(doc, path))
    }

    pub fn from_document(doc: Document, path: PathBuf) -> Self {
        // get_pages is keyed by one-based page number, already in order
        let pages = doc.get_pages().into_values().collect();
        PdfDocument { doc, path, pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_id(&self, index: usize) -> Result<ObjectId, DocumentError> {
        self.pages
            .get(index)
            .copied()
            .ok_or(DocumentError::PageOutOfRange {
                page: index + 1,
                total: self.pages.len(),
            })
    }

    /// Look up `key` on the page or the nearest ancestor that defines it.
    pub fn inherited_attribute(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut node = self.doc.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_TREE_DEPTH {
            if let Ok(value) = node.get(key) {
                return Some(self.resolve(value));
            }
            let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
            node = self.doc.get_dictionary(parent).ok()?;
        }
        None
    }

    fn resolve<'a>(&'a self, object: &'a Object) -> &'a Object {
        match object {
            Object::Reference(id) => self.doc.get_object(*id).unwrap_or(object),
            other => other,
        }
    }

    /// The page's MediaBox as `[llx, lly, urx, ury]`, normalised so the
    /// lower-left corner comes first.
    pub fn media_box(&self, index: usize) -> Result<[f32; 4], DocumentError> {
        let page_id = self.page_id(index)?;
        let Some(Object::Array(values)) = self.inherited_attribute(page_id, b"MediaBox") else {
            return Ok(DEFAULT_MEDIA_BOX);
        };
        let nums: Vec<f32> = values
            .iter()
            .filter_map(|v| self.resolve(v).as_float().ok())
            .collect();
        let &[x0, y0, x1, y1] = nums.as_slice() else {
            return Ok(DEFAULT_MEDIA_BOX);
        };
        Ok([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)])
    }

    /// Raw (decoded) content stream bytes of a page.
    pub fn page_content(&self, index: usize) -> Result<Vec<u8>, DocumentError> {
        let page_id = self.page_id(index)?;
        Ok(self.doc.get_page_content(page_id)?)
    }

    /// Start assembling a new document made of pages from this one.
    pub fn extraction(&self) -> Result<PageExtraction<'_>, DocumentError> {
        PageExtraction::new(self)
    }
}

/// Builds a copy of a document whose page tree lists only chosen pages,
/// in the order they were pushed.
pub struct PageExtraction<'a> {
    source: &'a PdfDocument,
    doc: Document,
    root_pages: ObjectId,
    kids: Vec<ObjectId>,
    seen: HashSet<usize>,
}

impl<'a> PageExtraction<'a> {
    fn new(source: &'a PdfDocument) -> Result<Self, DocumentError> {
        let doc = source.doc.clone();
        let root_pages = doc.catalog()?.get(b"Pages")?.as_reference()?;
        Ok(PageExtraction {
            source,
            doc,
            root_pages,
            kids: Vec::new(),
            seen: HashSet::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.kids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kids.is_empty()
    }

    pub fn push(&mut self, index: usize) -> Result<(), DocumentError> {
        let page_id = self.source.page_id(index)?;
        if !self.seen.insert(index) {
            return Err(DocumentError::DuplicatePage { page: index + 1 });
        }

        // The page tree is flattened, so anything the page inherited has to
        // be copied onto the page itself first.
        let inherited: Vec<(&[u8], Object)> = INHERITABLE
            .iter()
            .filter_map(|key| {
                self.source
                    .inherited_attribute(page_id, key)
                    .map(|value| (*key, value.clone()))
            })
            .collect();

        let page = self.doc.get_dictionary_mut(page_id)?;
        for (key, value) in inherited {
            if !page.has(key) {
                page.set(key.to_vec(), value);
            }
        }
        page.set("Parent", Object::Reference(self.root_pages));
        self.kids.push(page_id);
        Ok(())
    }

    pub fn finish(mut self) -> Result<Document, DocumentError> {
        let kids: Vec<Object> = self.kids.iter().copied().map(Object::Reference).collect();
        let count = kids.len() as i64;

        let root = self.doc.get_dictionary_mut(self.root_pages)?;
        root.set("Kids", Object::Array(kids));
        root.set("Count", Object::Integer(count));

        // Outlines and page labels describe the old page numbering.
        let catalog_id = self.doc.trailer.get(b"Root")?.as_reference()?;
        let catalog = self.doc.get_dictionary_mut(catalog_id)?;
        catalog.remove(b"Outlines");
        catalog.remove(b"PageLabels");

        self.doc.prune_objects();
        Ok(self.doc)
    }
}

/// Write `doc` to `path` without ever leaving a partial file there: the
/// bytes go to a temporary file in the same directory, which is renamed
/// into place only once it is complete.
pub fn save_atomic(doc: &mut Document, path: &Path) -> Result<(), DocumentError> {
    let write_err = |source: std::io::Error| DocumentError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".pdfpick-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(write_err)?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        doc.save_to(&mut writer)
            .map_err(|e| write_err(std::io::Error::other(e.to_string())))?;
        writer.flush().map_err(write_err)?;
    }
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
