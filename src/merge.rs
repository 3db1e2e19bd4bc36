//! Stamping the header overlay onto every page of a captured document.

use crate::error::StampError;
use crate::overlay::{self, HeaderOverlay};
use crate::pdf::{self, PageSize, Rect};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

/// Resource name of the header form on stamped pages.
pub const HEADER_XOBJECT: &str = "WebStampHeader";
/// Resource name of the font used for page numbers.
pub const FOOTER_FONT: &str = "WebStampFooter";

/// Footer position relative to the bottom-right page corner.
const FOOTER_FROM_RIGHT: f32 = 72.0;
const FOOTER_FROM_BOTTOM: f32 = 36.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Also print "Page N of M" in the bottom-right corner of every page.
    pub page_numbers: bool,
}

/// The stamped document, ready to be written out.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDocument {
    pub pdf: Vec<u8>,
    pub page_count: usize,
}

/// Draws the overlay page on top of every page of `base`.
///
/// The overlay becomes a form XObject shared by all pages. Page count and
/// order are unchanged. Pages whose size differs from the overlay's get the
/// header anchored at their own top-left corner.
pub fn merge_overlay(
    base: &[u8],
    overlay: &HeaderOverlay,
    options: MergeOptions,
) -> Result<OutputDocument, StampError> {
    let mut doc = Document::load_mem(base).map_err(StampError::render)?;
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(StampError::EmptyDocument);
    }
    let page_count = pages.len();

    let form_id = import_overlay(&mut doc, overlay)?;
    let font_id = options
        .page_numbers
        .then(|| doc.add_object(overlay::helvetica()));
    let save_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));

    for (&number, &page_id) in &pages {
        let merge_error = |source| StampError::Merge {
            page: number,
            source,
        };
        let media = pdf::media_box(&doc, page_id).unwrap_or(Rect {
            left: 0.0,
            bottom: 0.0,
            right: overlay.page_size.width,
            top: overlay.page_size.height,
        });
        let footer = font_id.map(|_| format!("Page {number} of {page_count}"));

        insert_resource(&mut doc, page_id, b"XObject", HEADER_XOBJECT, form_id)
            .map_err(merge_error)?;
        if let Some(font_id) = font_id {
            insert_resource(&mut doc, page_id, b"Font", FOOTER_FONT, font_id)
                .map_err(merge_error)?;
        }

        // Streams are concatenated when drawn; keep the first token separate
        // from whatever the previous stream ends with.
        let mut stamp = b"\n".to_vec();
        stamp.extend(
            stamp_content(media, overlay.page_size, footer.as_deref())
                .encode()
                .map_err(merge_error)?,
        );
        let stamp_id = doc.add_object(Stream::new(dictionary! {}, stamp));

        let mut contents: Vec<Object> = vec![save_id.into()];
        contents.extend(pdf::content_ids(&doc, page_id).into_iter().map(Object::from));
        contents.push(stamp_id.into());
        doc.get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(merge_error)?
            .set("Contents", contents);
    }
    tracing::debug!("stamped {page_count} page(s)");

    let mut pdf = Vec::new();
    doc.save_to(&mut pdf).map_err(StampError::render)?;
    Ok(OutputDocument { pdf, page_count })
}

/// Copies the overlay's objects into `doc` and wraps its page as a form
/// XObject. Returns the form's id.
fn import_overlay(doc: &mut Document, overlay: &HeaderOverlay) -> Result<ObjectId, StampError> {
    let overlay_error = |err: lopdf::Error| StampError::OverlayGeneration(err.to_string());

    let mut source = Document::load_mem(&overlay.pdf).map_err(overlay_error)?;
    source.renumber_objects_with(doc.max_id + 1);
    let (_, page_id) = source
        .get_pages()
        .into_iter()
        .next()
        .ok_or_else(|| StampError::OverlayGeneration("overlay has no page".to_string()))?;
    let content = source.get_page_content(page_id).map_err(overlay_error)?;
    let resources = pdf::page_resources(&source, page_id);
    let content_ids = pdf::content_ids(&source, page_id);

    for (id, object) in source.objects {
        if content_ids.contains(&id) || is_page_tree_node(&object) {
            continue;
        }
        doc.max_id = doc.max_id.max(id.0);
        doc.objects.insert(id, object);
    }

    let PageSize { width, height } = overlay.page_size;
    let form = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Resources" => resources,
        },
        content,
    );
    Ok(doc.add_object(form))
}

fn is_page_tree_node(object: &Object) -> bool {
    let kind = match object {
        Object::Dictionary(dict) => dict.get(b"Type").and_then(Object::as_name),
        _ => return false,
    };
    matches!(kind, Ok(b"Catalog") | Ok(b"Pages") | Ok(b"Page"))
}

/// Content appended after a page's own content streams, which have been
/// opened with `q` so that their graphics state is discarded here.
fn stamp_content(media: Rect, overlay: PageSize, footer: Option<&str>) -> Content {
    let dy = media.top - overlay.height;
    let mut operations = vec![
        Operation::new("Q", vec![]),
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                1.into(),
                0.into(),
                0.into(),
                1.into(),
                media.left.into(),
                dy.into(),
            ],
        ),
        Operation::new("Do", vec![Object::Name(HEADER_XOBJECT.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ];
    if let Some(footer) = footer {
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new("g", vec![0.into()]));
        operations.extend(overlay::text_operations(
            FOOTER_FONT,
            media.right - FOOTER_FROM_RIGHT,
            media.bottom + FOOTER_FROM_BOTTOM,
            footer,
        ));
        operations.push(Operation::new("Q", vec![]));
    }
    Content { operations }
}

enum Location {
    Inline,
    Shared(ObjectId),
}

/// Adds `name -> target` to the `category` subdictionary of the page's
/// resources. Inherited resources are first copied onto the page so that
/// siblings are not affected; indirect resource dictionaries are shared and
/// amended in place.
fn insert_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &[u8],
    name: &str,
    target: ObjectId,
) -> lopdf::Result<()> {
    let resources = match doc.get_dictionary(page_id)?.get(b"Resources") {
        Ok(Object::Reference(id)) => Some(Location::Shared(*id)),
        Ok(Object::Dictionary(_)) => Some(Location::Inline),
        _ => None,
    };
    let resources = match resources {
        Some(location) => location,
        None => {
            let inherited = pdf::page_resources(doc, page_id);
            doc.get_object_mut(page_id)?
                .as_dict_mut()?
                .set("Resources", inherited);
            Location::Inline
        }
    };

    let category_ref = match resource_dict(doc, page_id, &resources)?.get(category) {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };
    if let Some(id) = category_ref {
        doc.get_object_mut(id)?.as_dict_mut()?.set(name, target);
        return Ok(());
    }

    let dict = resource_dict(doc, page_id, &resources)?;
    if !matches!(dict.get(category), Ok(Object::Dictionary(_))) {
        dict.set(category, Dictionary::new());
    }
    dict.get_mut(category)?.as_dict_mut()?.set(name, target);
    Ok(())
}

fn resource_dict<'a>(
    doc: &'a mut Document,
    page_id: ObjectId,
    location: &Location,
) -> lopdf::Result<&'a mut Dictionary> {
    match location {
        Location::Inline => doc
            .get_object_mut(page_id)?
            .as_dict_mut()?
            .get_mut(b"Resources")?
            .as_dict_mut(),
        Location::Shared(id) => doc.get_object_mut(*id)?.as_dict_mut(),
    }
}
