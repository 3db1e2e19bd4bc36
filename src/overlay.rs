//! Generation of the one-page header PDF that gets stamped onto every page.

use crate::error::StampError;
use crate::pdf::{PageSize, PT_PER_INCH};
use chrono::NaiveDateTime;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, StringFormat, Stream};

pub const FONT_SIZE: f32 = 8.0;
/// Distance of the header from the left page edge.
pub const LEFT: f32 = 0.5 * PT_PER_INCH;
/// Distance of the header baseline from the top page edge.
pub const BASELINE_FROM_TOP: f32 = 0.5 * PT_PER_INCH;
/// Distance of the separator rule from the top page edge.
pub const RULE_FROM_TOP: f32 = 45.0;

const FONT_NAME: &str = "F1";

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A serialized single-page PDF holding only the header.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderOverlay {
    pub pdf: Vec<u8>,
    pub page_size: PageSize,
}

pub fn header_text(url: &str, fetched_at: &NaiveDateTime) -> String {
    format!(
        "{url} \u{2014} fetched {}",
        fetched_at.format(TIMESTAMP_FORMAT)
    )
}

/// The standard Helvetica font; needs no embedding.
pub fn helvetica() -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Encodes text for a simple font using WinAnsiEncoding. Characters that
/// have no code in that encoding become `?`.
pub fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u8,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2026}' => 0x85,
            '\u{20ac}' => 0x80,
            _ => b'?',
        })
        .collect()
}

/// Operations drawing `text` at (`x`, `y`) in the given font resource.
pub fn text_operations(font: &str, x: f32, y: f32, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), FONT_SIZE.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new(
            "Tj",
            vec![Object::String(win_ansi(text), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
    ]
}

fn check_size(size: PageSize) -> Result<(), StampError> {
    let valid = |value: f32| value.is_finite() && value > 0.0;
    if !valid(size.width) || !valid(size.height) {
        return Err(StampError::OverlayGeneration(format!(
            "invalid page size {} x {}",
            size.width, size.height
        )));
    }
    if size.width < 2.0 * LEFT || size.height < RULE_FROM_TOP {
        return Err(StampError::OverlayGeneration(format!(
            "page of {} x {} pt is too small for the header",
            size.width, size.height
        )));
    }
    Ok(())
}

fn header_content(text: &str, size: PageSize) -> Content {
    let baseline = size.height - BASELINE_FROM_TOP;
    let rule = size.height - RULE_FROM_TOP;

    let mut operations = vec![
        Operation::new("q", vec![]),
        Operation::new("g", vec![0.into()]),
        Operation::new("G", vec![0.into()]),
    ];
    operations.extend(text_operations(FONT_NAME, LEFT, baseline, text));
    operations.extend([
        Operation::new("w", vec![0.5f32.into()]),
        Operation::new("m", vec![LEFT.into(), rule.into()]),
        Operation::new("l", vec![(size.width - LEFT).into(), rule.into()]),
        Operation::new("S", vec![]),
        Operation::new("Q", vec![]),
    ]);
    Content { operations }
}

/// Renders `text` as a header on a single page of `size`.
///
/// The output only depends on the arguments, so stamping the same capture
/// twice yields identical bytes.
pub fn render_header_page(text: &str, size: PageSize) -> Result<HeaderOverlay, StampError> {
    check_size(size)?;
    let overlay_error = |err: lopdf::Error| StampError::OverlayGeneration(err.to_string());

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(helvetica());
    let content = header_content(text, size).encode().map_err(overlay_error)?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), size.width.into(), size.height.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { FONT_NAME => font_id },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut pdf = Vec::new();
    doc.save_to(&mut pdf).map_err(|err| StampError::OverlayGeneration(err.to_string()))?;
    tracing::debug!("header overlay is {} bytes", pdf.len());

    Ok(HeaderOverlay {
        pdf,
        page_size: size,
    })
}
