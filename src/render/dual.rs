//! Bilingual output: original and translated pages in one document.

use lopdf::{dictionary, Document as LopdfDocument, Object, ObjectId};

use crate::error::{Error, Result};
use crate::model::Rect;
use crate::parser::backend::format_real;

use super::pdf::{deref_dict, flate_stream, materialize_inherited, rect_array, rect_of};

const LETTER: Rect = Rect {
    x: 0.0,
    y: 0.0,
    x2: 612.0,
    y2: 792.0,
};

/// Original and translated page ids of a merged document, in page order.
struct Merged {
    doc: LopdfDocument,
    pages_root: ObjectId,
    pairs: Vec<(ObjectId, ObjectId)>,
}

fn pages_root(doc: &LopdfDocument) -> Result<ObjectId> {
    let root = doc.trailer.get(b"Root")?.as_reference()?;
    Ok(doc.get_dictionary(root)?.get(b"Pages")?.as_reference()?)
}

/// Copy the original's objects into the translated document under fresh ids.
fn merge(original: &LopdfDocument, translated: LopdfDocument) -> Result<Merged> {
    let mut doc = translated;
    let translated_pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for id in &translated_pages {
        materialize_inherited(&mut doc, *id)?;
    }

    let mut orig = original.clone();
    for id in orig.get_pages().into_values().collect::<Vec<_>>() {
        materialize_inherited(&mut orig, id)?;
    }
    orig.renumber_objects_with(doc.max_id + 1);
    let original_pages: Vec<ObjectId> = orig.get_pages().into_values().collect();
    doc.objects.extend(orig.objects);
    doc.max_id = doc.objects.keys().map(|id| id.0).max().unwrap_or(0);

    if original_pages.len() != translated_pages.len() {
        log::warn!(
            "original has {} pages but translation has {}, pairing the first {}",
            original_pages.len(),
            translated_pages.len(),
            original_pages.len().min(translated_pages.len())
        );
    }
    let pages_root = pages_root(&doc)?;
    Ok(Merged {
        doc,
        pages_root,
        pairs: original_pages.into_iter().zip(translated_pages).collect(),
    })
}

fn set_kids(doc: &mut LopdfDocument, pages_root: ObjectId, kids: Vec<ObjectId>) -> Result<()> {
    for kid in &kids {
        doc.get_object_mut(*kid)?
            .as_dict_mut()?
            .set("Parent", pages_root);
    }
    let root = doc.get_object_mut(pages_root)?.as_dict_mut()?;
    root.set("Count", Object::Integer(kids.len() as i64));
    root.set(
        "Kids",
        Object::Array(kids.into_iter().map(Object::Reference).collect()),
    );
    Ok(())
}

/// Wrap a page's content and resources into a Form XObject.
fn page_form(doc: &mut LopdfDocument, page_id: ObjectId) -> Result<(ObjectId, Rect)> {
    let dict = doc.get_dictionary(page_id)?;
    let bbox = dict
        .get(b"MediaBox")
        .ok()
        .and_then(|o| rect_of(doc, o))
        .unwrap_or(LETTER);
    let resources = dict
        .get(b"Resources")
        .ok()
        .and_then(|o| deref_dict(doc, o))
        .cloned()
        .unwrap_or_default();
    let content = doc.get_page_content(page_id).unwrap_or_else(|e| {
        log::warn!("unreadable content on page object {} {} R: {}", page_id.0, page_id.1, e);
        Vec::new()
    });
    let form = flate_stream(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => rect_array(bbox),
            "Resources" => resources,
        },
        &content,
    )?;
    Ok((doc.add_object(form), bbox))
}

/// Each output page shows the original and the translation next to each
/// other; `translate_first` puts the translation on the left.
pub fn side_by_side(
    original: &LopdfDocument,
    translated: LopdfDocument,
    translate_first: bool,
) -> Result<LopdfDocument> {
    let Merged {
        mut doc,
        pages_root,
        pairs,
    } = merge(original, translated)?;
    if pairs.is_empty() {
        return Err(Error::Render("no pages to combine into a dual PDF".into()));
    }

    let mut kids = Vec::with_capacity(pairs.len());
    for (orig, trans) in pairs {
        let (left, right) = if translate_first { (trans, orig) } else { (orig, trans) };
        let (left_form, lbox) = page_form(&mut doc, left)?;
        let (right_form, rbox) = page_form(&mut doc, right)?;

        let width = lbox.width() + rbox.width();
        let height = lbox.height().max(rbox.height());
        let ops = format!(
            "q 1 0 0 1 {} {} cm /Left Do Q q 1 0 0 1 {} {} cm /Right Do Q",
            format_real(-lbox.x),
            format_real(-lbox.y),
            format_real(lbox.width() - rbox.x),
            format_real(-rbox.y)
        );
        let content = doc.add_object(flate_stream(lopdf::Dictionary::new(), ops.as_bytes())?);
        let page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_root,
            "MediaBox" => rect_array(Rect::new(0.0, 0.0, width, height)),
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Left" => left_form,
                    "Right" => right_form,
                },
            },
            "Contents" => content,
        });
        kids.push(page);
    }
    set_kids(&mut doc, pages_root, kids)?;
    Ok(doc)
}

/// Original and translated pages alternate; `translate_first` starts each
/// pair with the translation.
pub fn alternating_pages(
    original: &LopdfDocument,
    translated: LopdfDocument,
    translate_first: bool,
) -> Result<LopdfDocument> {
    let Merged {
        mut doc,
        pages_root,
        pairs,
    } = merge(original, translated)?;
    if pairs.is_empty() {
        return Err(Error::Render("no pages to combine into a dual PDF".into()));
    }

    let kids = pairs
        .into_iter()
        .flat_map(|(orig, trans)| {
            if translate_first {
                [trans, orig]
            } else {
                [orig, trans]
            }
        })
        .collect();
    set_kids(&mut doc, pages_root, kids)?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::Stream;

    fn one_page_doc(text: &str, width: i64) -> LopdfDocument {
        let mut doc = LopdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), width.into(), 800.into()],
                "Resources" => dictionary! {},
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn page_text(doc: &LopdfDocument, page: ObjectId) -> String {
        String::from_utf8_lossy(&doc.get_page_content(page).unwrap()).into_owned()
    }

    #[test]
    fn test_alternating_pages_order() {
        let original = one_page_doc("orig", 600);
        let translated = one_page_doc("trans", 600);
        let dual = alternating_pages(&original, translated, false).unwrap();
        let pages: Vec<ObjectId> = dual.get_pages().into_values().collect();
        assert_eq!(pages.len(), 2);
        assert!(page_text(&dual, pages[0]).contains("orig"));
        assert!(page_text(&dual, pages[1]).contains("trans"));
        // inherited media box survives re-parenting
        let media = dual.get_dictionary(pages[0]).unwrap().get(b"MediaBox").unwrap();
        assert_eq!(rect_of(&dual, media), Some(Rect::new(0.0, 0.0, 600.0, 800.0)));
    }

    #[test]
    fn test_alternating_translate_first() {
        let dual = alternating_pages(&one_page_doc("orig", 600), one_page_doc("trans", 600), true).unwrap();
        let pages: Vec<ObjectId> = dual.get_pages().into_values().collect();
        assert!(page_text(&dual, pages[0]).contains("trans"));
    }

    #[test]
    fn test_side_by_side_page_width() {
        let dual = side_by_side(&one_page_doc("orig", 600), one_page_doc("trans", 500), false).unwrap();
        let pages: Vec<ObjectId> = dual.get_pages().into_values().collect();
        assert_eq!(pages.len(), 1);
        let dict = dual.get_dictionary(pages[0]).unwrap();
        let media = rect_of(&dual, dict.get(b"MediaBox").unwrap()).unwrap();
        assert_eq!(media.width(), 1100.0);
        assert_eq!(media.height(), 800.0);
        assert!(page_text(&dual, pages[0]).contains("1 0 0 1 600 0 cm /Right Do"));
    }
}
