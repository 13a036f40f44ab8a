//! Catalog value types.

use serde::{Deserialize, Serialize};

use crate::dsl::Selector;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

/// Coarse page region an entry belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Nav,
    Form,
    Action,
    Content,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct EntryState {
    pub disabled: bool,
    pub selected: bool,
    pub expanded: bool,
    pub visible: bool,
}

/// One interactable element with its stable index and selector ladder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub index: usize,
    pub role: String,
    pub label: String,
    pub tag: String,
    pub section: Section,
    pub primary: Selector,
    pub fallbacks: Vec<Selector>,
    pub bbox: BBox,
    pub state: EntryState,
    pub near_text: String,
}

/// A versioned, position-ordered enumeration of the page's interactable
/// surface. Pure value: rebuilt, never mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Catalog {
    pub version: String,
    pub url: String,
    pub viewport: (u32, u32),
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn entry(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
