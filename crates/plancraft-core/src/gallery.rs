//! Navigable selection over a render batch.

use serde::{Deserialize, Serialize};

/// Cursor over a batch of `len` items.
///
/// Navigation clamps to `[0, len - 1]`; on an empty batch the index stays 0
/// and there is no current item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryCursor {
    index: usize,
    len: usize,
}

impl GalleryCursor {
    pub fn new(len: usize) -> Self {
        Self { index: 0, len }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current index, or `None` on an empty batch.
    pub fn current(&self) -> Option<usize> {
        (self.len > 0).then_some(self.index)
    }

    pub fn next(&mut self) -> usize {
        if self.index + 1 < self.len {
            self.index += 1;
        }
        self.index
    }

    pub fn previous(&mut self) -> usize {
        self.index = self.index.saturating_sub(1);
        self.index
    }

    pub fn select(&mut self, index: usize) -> usize {
        self.index = index.min(self.len.saturating_sub(1));
        self.index
    }
}

/// Export of the currently selected gallery image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadItem {
    pub image_ref: String,
    pub file_name: String,
}

impl DownloadItem {
    pub fn new(index: usize, image_ref: impl Into<String>) -> Self {
        Self {
            image_ref: image_ref.into(),
            file_name: format!("render-{}.png", index + 1),
        }
    }
}
