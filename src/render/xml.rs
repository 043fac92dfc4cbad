//! XML form of the IL, for debugging and for hand-editing a run.
//!
//! The mapping is structural: an object becomes an element whose scalar
//! fields are attributes and whose nested objects and lists are child
//! elements named after the field. Lists carry `kind="list"` and hold `item`
//! elements (objects), nested lists, `value` elements (scalars) or `null`.
//! A missing attribute is a null field. String attributes that would read
//! back as a number or a boolean are prefixed with `'`.

use std::borrow::Cow;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};
use crate::model::Document;

const ROOT: &str = "document";
const KIND: &str = "kind";
const LIST: &str = "list";
const ITEM: &str = "item";
const VALUE: &str = "value";
const VALUE_ATTR: &str = "v";
const NULL: &str = "null";
const STRING_MARK: char = '\'';

/// Serialize the IL as XML.
pub fn to_xml(doc: &Document) -> Result<String> {
    let value = serde_json::to_value(doc)?;
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_element(&mut writer, ROOT, &value)?;
    String::from_utf8(writer.into_inner()).map_err(|e| Error::Render(e.to_string()))
}

/// Read an IL written by [`to_xml`].
pub fn from_xml(xml: &str) -> Result<Document> {
    let value = read_value(xml)?;
    Ok(serde_json::from_value(value)?)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let ambiguous = s.starts_with(STRING_MARK)
                || s == "true"
                || s == "false"
                || s.parse::<f64>().is_ok();
            Some(if ambiguous {
                format!("{}{}", STRING_MARK, s)
            } else {
                s.clone()
            })
        }
        _ => None,
    }
}

/// Escape an attribute value, keeping line breaks and tabs intact through
/// attribute-value normalization.
fn escape_attr(text: &str) -> Vec<u8> {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            c => out.push(c),
        }
    }
    out.into_bytes()
}

fn push_attr(start: &mut BytesStart<'_>, key: &str, text: &str) {
    start.push_attribute(Attribute {
        key: QName(key.as_bytes()),
        value: Cow::Owned(escape_attr(text)),
    });
}

fn write_children<W: std::io::Write>(
    writer: &mut Writer<W>,
    start: BytesStart<'_>,
    children: &[(&str, &Value)],
) -> Result<()> {
    if children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    let end = BytesEnd::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    writer.write_event(Event::Start(start))?;
    for (name, child) in children {
        write_element(writer, name, child)?;
    }
    writer.write_event(Event::End(end))?;
    Ok(())
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, name: &str, value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut start = BytesStart::new(name);
            let mut children = Vec::new();
            for (key, field) in map {
                match field {
                    Value::Null => {}
                    Value::Object(_) | Value::Array(_) => children.push((key.as_str(), field)),
                    scalar => {
                        if let Some(text) = scalar_text(scalar) {
                            push_attr(&mut start, key, &text);
                        }
                    }
                }
            }
            write_children(writer, start, &children)
        }
        Value::Array(items) => {
            let mut start = BytesStart::new(name);
            push_attr(&mut start, KIND, LIST);
            let children: Vec<(&str, &Value)> = items
                .iter()
                .map(|item| match item {
                    Value::Object(_) | Value::Array(_) => (ITEM, item),
                    Value::Null => (NULL, item),
                    _ => (VALUE, item),
                })
                .collect();
            write_children(writer, start, &children)
        }
        Value::Null => {
            writer.write_event(Event::Empty(BytesStart::new(name)))?;
            Ok(())
        }
        scalar => {
            let mut start = BytesStart::new(name);
            if let Some(text) = scalar_text(scalar) {
                push_attr(&mut start, VALUE_ATTR, &text);
            }
            writer.write_event(Event::Empty(start))?;
            Ok(())
        }
    }
}

fn parse_scalar(text: &str) -> Value {
    if let Some(rest) = text.strip_prefix(STRING_MARK) {
        return Value::String(rest.to_string());
    }
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = text.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(n) = text.parse::<u64>() {
        return Value::Number(n.into());
    }
    if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(text.to_string())
}

/// An element being read, before its end tag.
struct Frame {
    name: String,
    value: Value,
}

fn open_frame(start: &BytesStart<'_>) -> Result<Frame> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Map::new();
    let mut is_list = false;
    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::Render(format!("bad XML attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let text = attr.unescape_value()?;
        if key == KIND && text == LIST {
            is_list = true;
        } else {
            attrs.insert(key, parse_scalar(&text));
        }
    }

    let value = if is_list {
        Value::Array(Vec::new())
    } else if name == NULL {
        Value::Null
    } else if name == VALUE {
        attrs.remove(VALUE_ATTR).unwrap_or(Value::Null)
    } else {
        Value::Object(attrs)
    };
    Ok(Frame { name, value })
}

fn close_frame(stack: &mut Vec<Frame>, frame: Frame) -> Option<Value> {
    match stack.last_mut() {
        None => Some(frame.value),
        Some(parent) => {
            match &mut parent.value {
                Value::Array(items) => items.push(frame.value),
                Value::Object(map) => {
                    map.insert(frame.name, frame.value);
                }
                _ => log::warn!("XML element <{}> inside a scalar is ignored", frame.name),
            }
            None
        }
    }
}

fn read_value(xml: &str) -> Result<Value> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut stack: Vec<Frame> = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(open_frame(&start)?),
            Event::Empty(start) => {
                let frame = open_frame(&start)?;
                if let Some(root) = close_frame(&mut stack, frame) {
                    return Ok(root);
                }
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| Error::Render("unbalanced XML end tag".into()))?;
                if let Some(root) = close_frame(&mut stack, frame) {
                    return Ok(root);
                }
            }
            Event::Eof => return Err(Error::Render("XML ended before the root element closed".into())),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Composition, GraphicState, Page, PdfCharacter, PdfFormula, PdfParagraph, PdfRectangle,
        PdfSameStyleUnicodeCharacters, PdfStyle, Rect,
    };

    fn sample() -> Document {
        let style = PdfStyle::new("F1", 10.5, GraphicState::with_passthrough("0 g\n1 0 0 RG"));
        let mut page = Page::new(0);
        page.base_operations = "q 1 0 0 1 0 0 cm\tQ".into();
        page.pdf_character.push(
            PdfCharacter::new("1", Rect::new(0.0, 0.0, 5.0, 10.0), style.clone()).with_code(49),
        );
        page.pdf_rectangle.push(PdfRectangle {
            bbox: Rect::new(1.0, 2.0, 3.0, 4.0),
            graphic_state: None,
            debug_info: true,
        });
        let mut para = PdfParagraph::with_compositions(vec![
            Composition::Character(PdfCharacter::new(
                "<&\"'>",
                Rect::new(0.0, 0.0, 5.0, 10.0),
                style.clone(),
            )),
            Composition::Formula(PdfFormula::from_chars(vec![PdfCharacter::new(
                "x",
                Rect::new(5.0, 0.0, 9.0, 10.0),
                style.clone(),
            )])),
            Composition::SameStyleUnicodeCharacters(PdfSameStyleUnicodeCharacters {
                pdf_style: Some(style),
                unicode: "true".into(),
                debug_info: false,
            }),
        ]);
        para.unicode = "'quoted' 3.5".into();
        page.pdf_paragraph.push(para);

        let mut doc = Document::new(3);
        doc.page.push(page);
        doc
    }

    #[test]
    fn test_xml_round_trip() {
        let doc = sample();
        let xml = to_xml(&doc).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<document"));
        assert_eq!(from_xml(&xml).unwrap(), doc);
    }

    #[test]
    fn test_ambiguous_strings_are_marked() {
        let xml = to_xml(&sample()).unwrap();
        assert!(xml.contains("char_unicode=\"'1\""));
        assert!(xml.contains("unicode=\"'true\""));
        assert!(xml.contains("&#10;"));
    }

    #[test]
    fn test_empty_lists_survive() {
        let mut doc = Document::new(1);
        doc.page.push(Page::new(0));
        assert_eq!(from_xml(&to_xml(&doc).unwrap()).unwrap(), doc);
    }

    #[test]
    fn test_truncated_xml_is_an_error() {
        assert!(from_xml("<document total_pages=\"1\"><page kind=\"list\">").is_err());
    }
}
