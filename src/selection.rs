use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::page_range::{self, RangeError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageEntry {
    pub source_index: usize,
    pub raster_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error(transparent)]
    Range(#[from] RangeError),

    #[error("page {page} has been removed from the page list")]
    NotInRoster { page: usize },
}

/// Which roster entries a caller wants to see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    SelectedOnly,
}

/// What happens to the selection when the roster is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterChange {
    /// A different document was opened.
    NewDocument,
    /// The same document was loaded again.
    Refresh,
}

/// Pages are keyed by zero-based source index, never by roster position.
/// The selection is always a subset of the roster.
#[derive(Debug, Default)]
pub struct SelectionModel {
    page_count: usize,
    roster: Vec<PageEntry>,
    selected: BTreeSet<usize>,
}

impl SelectionModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages in the source document, fixed when it was opened.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn set_roster(&mut self, mut entries: Vec<PageEntry>, page_count: usize, change: RosterChange) {
        entries.sort_by_key(|e| e.source_index);
        entries.dedup_by_key(|e| e.source_index);
        entries.retain(|e| e.source_index < page_count);

        self.page_count = page_count;
        self.roster = entries;
        match change {
            RosterChange::NewDocument => self.selected.clear(),
            RosterChange::Refresh => {
                let roster = &self.roster;
                self.selected
                    .retain(|idx| roster.binary_search_by_key(idx, |e| e.source_index).is_ok());
            }
        }
    }

    /// Drop everything, as when the session closes.
    pub fn clear(&mut self) {
        self.page_count = 0;
        self.roster.clear();
        self.selected.clear();
    }

    pub fn contains(&self, source_index: usize) -> bool {
        self.position(source_index).is_some()
    }

    fn position(&self, source_index: usize) -> Option<usize> {
        self.roster
            .binary_search_by_key(&source_index, |e| e.source_index)
            .ok()
    }

    pub fn entry(&self, source_index: usize) -> Option<&PageEntry> {
        self.position(source_index).map(|pos| &self.roster[pos])
    }

    pub fn is_selected(&self, source_index: usize) -> bool {
        self.selected.contains(&source_index)
    }

    /// Returns whether the selection changed.
    pub fn toggle_select(&mut self, source_index: usize, selected: bool) -> Result<bool, SelectionError> {
        if !selected {
            return Ok(self.selected.remove(&source_index));
        }
        if !self.contains(source_index) {
            return Err(SelectionError::NotInRoster {
                page: source_index + 1,
            });
        }
        Ok(self.selected.insert(source_index))
    }

    /// Replace the selection with exactly one page.
    pub fn select_only(&mut self, source_index: usize) -> Result<(), SelectionError> {
        if !self.contains(source_index) {
            return Err(SelectionError::NotInRoster {
                page: source_index + 1,
            });
        }
        self.selected.clear();
        self.selected.insert(source_index);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Add every page named by `text` to the selection. Nothing is applied
    /// unless every page is valid. Returns the resolved pages; an empty set
    /// means the text named no pages.
    pub fn select_from_ranges(&mut self, text: &str) -> Result<BTreeSet<usize>, SelectionError> {
        let pages = page_range::resolve(text, self.page_count)?;
        if let Some(&missing) = pages.iter().find(|&&p| !self.contains(p)) {
            return Err(SelectionError::NotInRoster { page: missing + 1 });
        }
        self.selected.extend(pages.iter().copied());
        Ok(pages)
    }

    /// Remove pages from the roster and the selection. Unknown indices are
    /// ignored. Returns how many entries were removed.
    pub fn delete_from_roster(&mut self, source_indices: &[usize]) -> usize {
        let doomed: BTreeSet<usize> = source_indices.iter().copied().collect();
        let before = self.roster.len();
        self.roster.retain(|e| !doomed.contains(&e.source_index));
        for idx in &doomed {
            self.selected.remove(idx);
        }
        before - self.roster.len()
    }

    pub fn project_all(&self) -> &[PageEntry] {
        &self.roster
    }

    pub fn project_selected_only(&self) -> Vec<&PageEntry> {
        self.roster
            .iter()
            .filter(|e| self.selected.contains(&e.source_index))
            .collect()
    }

    pub fn project(&self, projection: Projection) -> Vec<&PageEntry> {
        match projection {
            Projection::All => self.roster.iter().collect(),
            Projection::SelectedOnly => self.project_selected_only(),
        }
    }

    /// Selected indices in ascending order, the order pages are extracted in.
    pub fn selected_indices(&self) -> Vec<usize> {
        self.selected.iter().copied().collect()
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    #[cfg(test)]
    fn invariant_holds(&self) -> bool {
        self.selected.iter().all(|&idx| self.contains(idx))
    }
}
