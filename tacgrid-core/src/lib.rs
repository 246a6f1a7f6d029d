//! Passive data model for the tacgrid frame timeline.
//!
//! A session's shared state is a numbered sequence of frames; each frame
//! holds one raster drawing, a set of placed elements, and a text note.
//! [`FrameStore`] owns the frame table and the current-frame pointer.
//! Replication and playback live in `tacgrid-collab`; nothing here talks
//! to the network.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Frame numbers are 1-based; there is no frame 0.
pub type FrameNumber = u32;

/// Upper bound of the timeline, inclusive.
pub const MAX_FRAMES: FrameNumber = 2000;

/// Whether `n` is a valid frame number.
pub fn frame_in_range(n: FrameNumber) -> bool {
    (1..=MAX_FRAMES).contains(&n)
}

/// Position in frame-local pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub left: f32,
    pub top: f32,
}

impl Point {
    pub fn new(left: f32, top: f32) -> Self {
        Self { left, top }
    }
}

/// Variant-specific payload of a placed element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ElementKind {
    /// An image token placed on the map.
    Unit { image_ref: String, width: f32 },
    /// A point-of-interest pin.
    Marker,
    /// A free-floating text label.
    Text { content: String },
}

/// A placed graphical element, owned by exactly one frame at a time.
///
/// `element_id` is an opaque globally-unique string; two elements in one
/// frame never share an id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub element_id: String,
    pub position: Point,
    pub kind: ElementKind,
}

impl Element {
    fn with_kind(position: Point, kind: ElementKind) -> Self {
        Self {
            element_id: Uuid::new_v4().to_string(),
            position,
            kind,
        }
    }

    pub fn unit(image_ref: impl Into<String>, position: Point, width: f32) -> Self {
        Self::with_kind(
            position,
            ElementKind::Unit {
                image_ref: image_ref.into(),
                width,
            },
        )
    }

    pub fn marker(position: Point) -> Self {
        Self::with_kind(position, ElementKind::Marker)
    }

    pub fn text(content: impl Into<String>, position: Point) -> Self {
        Self::with_kind(
            position,
            ElementKind::Text {
                content: content.into(),
            },
        )
    }
}

/// The materialized contents of one frame.
///
/// `raster` is an opaque encoded image (or `None` when nothing has been
/// drawn); the store never inspects the bytes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub raster: Option<Vec<u8>>,
    pub elements: Vec<Element>,
    pub note: String,
}

impl FrameSnapshot {
    /// Whether the snapshot carries no content at all.
    pub fn is_empty(&self) -> bool {
        self.raster.is_none() && self.elements.is_empty() && self.note.is_empty()
    }
}

/// Frame table plus the current-frame pointer.
///
/// Entries are created lazily on first reference and never destroyed for
/// the lifetime of the session. One store instance per session; all
/// components receive an explicit reference.
#[derive(Clone, Debug)]
pub struct FrameStore {
    frames: HashMap<FrameNumber, FrameSnapshot>,
    current: FrameNumber,
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStore {
    /// Create a store positioned on frame 1 (materialized immediately).
    pub fn new() -> Self {
        let mut frames = HashMap::new();
        frames.insert(1, FrameSnapshot::default());
        Self { frames, current: 1 }
    }

    pub fn current_frame(&self) -> FrameNumber {
        self.current
    }

    /// Move the current-frame pointer, materializing the target.
    ///
    /// Range validation is the navigation layer's job; the store accepts
    /// any frame number it is handed.
    pub fn set_current(&mut self, n: FrameNumber) {
        self.frames.entry(n).or_default();
        self.current = n;
    }

    /// Snapshot for frame `n`, creating an empty one first if absent.
    pub fn get(&mut self, n: FrameNumber) -> &FrameSnapshot {
        self.frames.entry(n).or_default()
    }

    /// Non-materializing lookup.
    pub fn peek(&self, n: FrameNumber) -> Option<&FrameSnapshot> {
        self.frames.get(&n)
    }

    /// Unconditional overwrite — the authoritative remote-update path.
    pub fn replace_snapshot(&mut self, n: FrameNumber, snapshot: FrameSnapshot) {
        self.frames.insert(n, snapshot);
    }

    /// Bootstrap merge for a newly delivered full snapshot set.
    ///
    /// Adopts a remote frame only when the local entry is absent or has a
    /// null raster; a frame with locally-authored raster content is never
    /// clobbered. Element sets on frames both sides have touched are not
    /// reconciled.
    pub fn merge_missing(&mut self, remote_frames: HashMap<FrameNumber, FrameSnapshot>) {
        for (n, snapshot) in remote_frames {
            let adopt = match self.frames.get(&n) {
                None => true,
                Some(local) => local.raster.is_none(),
            };
            if adopt {
                self.frames.insert(n, snapshot);
            } else {
                log::debug!("merge: keeping local frame {n} over remote");
            }
        }
    }

    /// Append `element` to frame `n` unless that id is already present.
    pub fn upsert_element(&mut self, n: FrameNumber, element: Element) {
        let snapshot = self.frames.entry(n).or_default();
        if snapshot
            .elements
            .iter()
            .any(|e| e.element_id == element.element_id)
        {
            return;
        }
        snapshot.elements.push(element);
    }

    /// Reposition an element by id; no-op if absent.
    pub fn update_element_position(&mut self, n: FrameNumber, element_id: &str, position: Point) {
        if let Some(snapshot) = self.frames.get_mut(&n) {
            if let Some(element) = snapshot
                .elements
                .iter_mut()
                .find(|e| e.element_id == element_id)
            {
                element.position = position;
            }
        }
    }

    /// Remove an element by id; no-op if absent.
    pub fn remove_element(&mut self, n: FrameNumber, element_id: &str) {
        if let Some(snapshot) = self.frames.get_mut(&n) {
            snapshot.elements.retain(|e| e.element_id != element_id);
        }
    }

    /// Set frame `n`'s note, materializing the frame.
    pub fn set_note(&mut self, n: FrameNumber, text: impl Into<String>) {
        self.frames.entry(n).or_default().note = text.into();
    }

    /// Reset frame `n` to an empty snapshot (the frame stays materialized).
    pub fn clear_frame(&mut self, n: FrameNumber) {
        self.frames.insert(n, FrameSnapshot::default());
    }

    /// Clone of the whole frame table, for bootstrapping a new peer.
    pub fn export(&self) -> HashMap<FrameNumber, FrameSnapshot> {
        self.frames.clone()
    }

    /// Number of materialized frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}
