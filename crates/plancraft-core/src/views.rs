//! Camera views and the mapping from requested views to rendered images.

use serde::{Deserialize, Serialize};

/// Fixed virtual-camera positions offered for rendering.
///
/// Declaration order is the canonical order used for requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CameraView {
    #[serde(rename = "main")]
    Main,
    #[serde(rename = "side")]
    Side,
    #[serde(rename = "topA")]
    TopA,
}

impl CameraView {
    pub const ALL: [CameraView; 3] = [CameraView::Main, CameraView::Side, CameraView::TopA];

    /// Wire key of the view.
    pub fn key(&self) -> &'static str {
        match self {
            CameraView::Main => "main",
            CameraView::Side => "side",
            CameraView::TopA => "topA",
        }
    }

    /// Human label shown in the gallery.
    pub fn label(&self) -> &'static str {
        match self {
            CameraView::Main => "Main view",
            CameraView::Side => "Side view",
            CameraView::TopA => "Elevation A",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.key().eq_ignore_ascii_case(key))
    }
}

impl std::fmt::Display for CameraView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A set of selected camera views, always in canonical order without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSelection(Vec<CameraView>);

impl ViewSelection {
    pub fn new(views: impl IntoIterator<Item = CameraView>) -> Self {
        let mut views: Vec<CameraView> = views.into_iter().collect();
        views.sort();
        views.dedup();
        Self(views)
    }

    pub fn views(&self) -> &[CameraView] {
        &self.0
    }

    pub fn contains(&self, view: CameraView) -> bool {
        self.0.contains(&view)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tag each of `image_count` results with the view that produced it.
    pub fn tag_results(&self, image_count: usize) -> Vec<CameraView> {
        resolve_view_tags(&self.0, image_count)
    }
}

impl FromIterator<CameraView> for ViewSelection {
    fn from_iter<I: IntoIterator<Item = CameraView>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Tag result `i` with `selected[i mod |selected|]`.
///
/// The remote renderer is expected to return images in request order; when it
/// returns more or fewer images than views, tags wrap around positionally.
/// An empty selection yields no tags.
pub fn resolve_view_tags(selected: &[CameraView], image_count: usize) -> Vec<CameraView> {
    if selected.is_empty() {
        return Vec::new();
    }
    (0..image_count)
        .map(|i| selected[i % selected.len()])
        .collect()
}
