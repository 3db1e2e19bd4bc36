//! Fixtures shared by the unit tests.

use crate::capture::{CaptureRequest, CapturedDocument, PageLoader};
use crate::error::StampError;
use crate::pdf::PageSize;
use chrono::{NaiveDate, NaiveDateTime};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

pub fn fetch_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

/// Builds a document with one page per entry in `sizes`, each with a filled
/// rectangle as its only content and a direct resource dictionary.
pub fn sample_document(sizes: &[(f32, f32)]) -> Document {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for &(width, height) in sizes {
        let content = Content {
            operations: vec![
                Operation::new("rg", vec![1.into(), 0.into(), 0.into()]),
                Operation::new(
                    "re",
                    vec![0.into(), 0.into(), width.into(), height.into()],
                ),
                Operation::new("f", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {},
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

pub fn save(mut doc: Document) -> Vec<u8> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

pub fn sample_pdf(sizes: &[(f32, f32)]) -> Vec<u8> {
    save(sample_document(sizes))
}

/// Text shown by `Tj` operators in a content stream, decoded as Latin-1.
pub fn shown_text(content: &[u8]) -> Vec<String> {
    Content::decode(content)
        .unwrap()
        .operations
        .into_iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| match op.operands.first() {
            Some(Object::String(bytes, _)) => {
                Some(bytes.iter().map(|&b| b as char).collect::<String>())
            }
            _ => None,
        })
        .collect()
}

/// Content of the form XObject registered under `name` in a page's resources.
pub fn xobject_content(doc: &Document, page_id: ObjectId, name: &[u8]) -> Vec<u8> {
    let resources = crate::pdf::page_resources(doc, page_id);
    let xobjects = match resources.get(b"XObject").unwrap() {
        Object::Reference(id) => doc.get_dictionary(*id).unwrap().clone(),
        Object::Dictionary(dict) => dict.clone(),
        other => panic!("unexpected XObject entry {other:?}"),
    };
    let form_id = xobjects.get(name).unwrap().as_reference().unwrap();
    let stream = doc.get_object(form_id).unwrap().as_stream().unwrap();
    stream.content.clone()
}

/// A loader that hands out a canned document instead of starting a browser.
pub struct FakeLoader {
    pub pages: Vec<(f32, f32)>,
}

impl PageLoader for FakeLoader {
    fn load(&self, request: &CaptureRequest) -> Result<CapturedDocument, StampError> {
        let page_size = match self.pages.first() {
            Some(&(width, height)) => PageSize::new(width, height),
            None => request.paper_size(),
        };
        Ok(CapturedDocument {
            pdf: sample_pdf(&self.pages),
            page_size,
            fetched_at: fetch_time(),
        })
    }
}

/// A loader that always fails the way an unresolvable host does.
pub struct UnreachableLoader;

impl PageLoader for UnreachableLoader {
    fn load(&self, request: &CaptureRequest) -> Result<CapturedDocument, StampError> {
        Err(StampError::navigation(
            request.url.as_str(),
            "net::ERR_NAME_NOT_RESOLVED",
        ))
    }
}
