//! Small helpers over `lopdf` shared by the overlay and merge stages.

use lopdf::{Dictionary, Document, Object, ObjectId};

/// CSS pixels per inch, as used by Chromium when printing.
const PX_PER_INCH: f32 = 96.0;
/// PDF user space units per inch.
pub const PT_PER_INCH: f32 = 72.0;

/// Page dimensions in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        PageSize { width, height }
    }

    /// Paper size Chromium produces for a viewport when printing it 1:1.
    pub fn from_viewport(width_px: u32, height_px: u32) -> Self {
        PageSize {
            width: width_px as f32 / PX_PER_INCH * PT_PER_INCH,
            height: height_px as f32 / PX_PER_INCH * PT_PER_INCH,
        }
    }

    pub fn width_inches(&self) -> f64 {
        f64::from(self.width / PT_PER_INCH)
    }

    pub fn height_inches(&self) -> f64 {
        f64::from(self.height / PT_PER_INCH)
    }
}

/// A page rectangle `[llx lly urx ury]` in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Rect {
    pub fn size(&self) -> PageSize {
        PageSize::new(self.right - self.left, self.top - self.bottom)
    }
}

pub fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Looks up `key` on a page, following the `Parent` chain for inheritable
/// attributes.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    // Bounded so that a cyclic page tree cannot hang us.
    for _ in 0..64 {
        if let Ok(value) = node.get(key) {
            return resolve(doc, value);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

pub fn media_box(doc: &Document, page_id: ObjectId) -> Option<Rect> {
    let values = inherited(doc, page_id, b"MediaBox")?.as_array().ok()?;
    if values.len() != 4 {
        return None;
    }
    let mut coords = [0f32; 4];
    for (coord, value) in coords.iter_mut().zip(values) {
        *coord = number(resolve(doc, value)?)?;
    }
    // Normalise in case the corners are given in a different order.
    Some(Rect {
        left: coords[0].min(coords[2]),
        bottom: coords[1].min(coords[3]),
        right: coords[0].max(coords[2]),
        top: coords[1].max(coords[3]),
    })
}

/// Size of the first page of a serialized PDF, if it can be determined.
pub fn first_page_size(bytes: &[u8]) -> Option<PageSize> {
    let doc = Document::load_mem(bytes).ok()?;
    let (_, page_id) = doc.get_pages().into_iter().next()?;
    media_box(&doc, page_id).map(|rect| rect.size())
}

/// The resource dictionary in effect for a page, cloned. Empty when the page
/// and its ancestors carry none.
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    inherited(doc, page_id, b"Resources")
        .and_then(|resources| resources.as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

/// Content stream ids of a page, in drawing order.
pub fn content_ids(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let contents = match doc.get_dictionary(page_id).and_then(|page| page.get(b"Contents")) {
        Ok(contents) => contents,
        Err(_) => return Vec::new(),
    };
    let array = match contents {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Array(array)) => array,
            _ => return vec![*id],
        },
        Object::Array(array) => array,
        _ => return Vec::new(),
    };
    array
        .iter()
        .filter_map(|item| item.as_reference().ok())
        .collect()
}
