//! PDF backend abstraction layer.
//!
//! Provides a trait-based interface for PDF operations, isolating
//! the concrete PDF library (lopdf) from the content-stream interpreter.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::model::{Matrix, Rect};
use crate::parser::font::LoadedFont;

/// Page identifier: (object number, generation number).
pub type PageId = (u32, u16);

/// Indirect object identifier.
pub type ObjectId = (u32, u16);

/// A value from a PDF content stream operand.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f32),
    Name(Vec<u8>),
    Str(Vec<u8>),
    Array(Vec<PdfValue>),
    Dict(Vec<(Vec<u8>, PdfValue)>),
    Other,
}

impl PdfValue {
    pub fn as_number(&self) -> Option<f32> {
        get_number_from_value(self)
    }

    pub fn as_name(&self) -> Option<&[u8]> {
        match self {
            PdfValue::Name(n) => Some(n),
            _ => None,
        }
    }
}

/// Serializes the operand back into content-stream syntax.
impl fmt::Display for PdfValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdfValue::Null => write!(f, "null"),
            PdfValue::Boolean(b) => write!(f, "{}", b),
            PdfValue::Integer(i) => write!(f, "{}", i),
            PdfValue::Real(r) => write!(f, "{}", format_real(*r)),
            PdfValue::Name(n) => write!(f, "/{}", escape_name(n)),
            PdfValue::Str(s) => {
                if s.iter().all(|&b| (0x20..0x7f).contains(&b)) {
                    write!(f, "(")?;
                    for &b in s {
                        match b {
                            b'(' | b')' | b'\\' => write!(f, "\\{}", b as char)?,
                            _ => write!(f, "{}", b as char)?,
                        }
                    }
                    write!(f, ")")
                } else {
                    write!(f, "<")?;
                    for b in s {
                        write!(f, "{:02X}", b)?;
                    }
                    write!(f, ">")
                }
            }
            PdfValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            PdfValue::Dict(entries) => {
                write!(f, "<<")?;
                for (k, v) in entries {
                    write!(f, "/{} {} ", escape_name(k), v)?;
                }
                write!(f, ">>")
            }
            PdfValue::Other => Ok(()),
        }
    }
}

/// Format a real operand without exponent notation.
pub fn format_real(r: f32) -> String {
    if r.is_finite() {
        format!("{:.6}", r)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        "0".to_string()
    }
}

pub fn escape_name(name: &[u8]) -> String {
    let mut out = String::with_capacity(name.len());
    for &b in name {
        let regular = (0x21..0x7f).contains(&b)
            && !matches!(
                b,
                b'#' | b'/' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'%'
            );
        if regular {
            out.push(b as char);
        } else {
            out.push_str(&format!("#{:02X}", b));
        }
    }
    out
}

/// A single operation from a PDF content stream.
#[derive(Debug, Clone)]
pub struct ContentOp {
    pub operator: String,
    pub operands: Vec<PdfValue>,
}

/// Geometry of a page as declared in its dictionary.
#[derive(Debug, Clone, Copy)]
pub struct PageInfo {
    pub media_box: Rect,
    pub crop_box: Rect,
    /// Rotation in degrees, normalized to 0/90/180/270
    pub rotation: i64,
}

/// Where resource names are resolved: the page, then nested Form XObjects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceScope {
    pub page: PageId,
    /// Form XObjects entered, outermost first
    pub forms: Vec<ObjectId>,
}

impl ResourceScope {
    pub fn page(page: PageId) -> Self {
        Self {
            page,
            forms: Vec::new(),
        }
    }

    /// Scope for a Form XObject nested in this one.
    pub fn enter(&self, form: ObjectId) -> Self {
        let mut forms = self.forms.clone();
        forms.push(form);
        Self {
            page: self.page,
            forms,
        }
    }
}

/// A Form XObject ready to be interpreted.
#[derive(Debug, Clone)]
pub struct FormXObject {
    pub id: ObjectId,
    pub bbox: Rect,
    pub matrix: Matrix,
    pub content: Vec<u8>,
}

/// A resolved `/XObject` resource.
#[derive(Debug, Clone)]
pub enum XObject {
    Form(FormXObject),
    Image,
    Unsupported,
}

/// Abstract interface for PDF document access.
///
/// Implementations provide page enumeration, page geometry, content stream
/// decoding and resource lookup without exposing any concrete PDF library types.
pub trait PdfBackend {
    /// Return all pages as (page_number → PageId), 1-based.
    fn pages(&self) -> BTreeMap<u32, PageId>;

    /// Media box, crop box and rotation of a page.
    fn page_info(&self, page: PageId) -> Result<PageInfo>;

    /// Return the raw (decompressed) content streams of a page.
    fn page_contents(&self, page: PageId) -> Result<Vec<Vec<u8>>>;

    /// Parse raw content stream bytes into a sequence of operations.
    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>>;

    /// Fonts of the innermost scope that declares resources.
    fn fonts(&self, scope: &ResourceScope) -> Result<Vec<LoadedFont>>;

    /// Number of colour components of a named colour space, if declared.
    fn color_space_components(&self, scope: &ResourceScope, name: &[u8]) -> Option<usize>;

    /// Resolve a named XObject.
    fn xobject(&self, scope: &ResourceScope, name: &[u8]) -> Result<XObject>;
}

/// Simple text decoding fallback when no encoding is available.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    // Try UTF-16BE first (BOM marker)
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter_map(|c| {
                if c.len() == 2 {
                    Some(u16::from_be_bytes([c[0], c[1]]))
                } else {
                    None
                }
            })
            .collect();
        return String::from_utf16(&utf16).unwrap_or_default();
    }

    if let Ok(s) = String::from_utf8(bytes.to_vec()) {
        return s;
    }

    // Latin-1
    bytes.iter().map(|&b| b as char).collect()
}

// ---------------------------------------------------------------------------
// LopdfBackend: the lopdf implementation
// ---------------------------------------------------------------------------

use lopdf::{Dictionary, Document as LopdfDocument, Object, Stream};

/// Depth limit when following `/Parent` for inherited page attributes.
const MAX_INHERIT_DEPTH: usize = 32;

/// Concrete [`PdfBackend`] backed by `lopdf::Document`.
pub struct LopdfBackend {
    doc: LopdfDocument,
}

impl LopdfBackend {
    /// Load from a file path.
    pub fn load_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let doc = LopdfDocument::load(path)?;
        Self::from_document(doc)
    }

    /// Load from an in-memory byte slice.
    pub fn load_bytes(data: &[u8]) -> Result<Self> {
        let doc = LopdfDocument::load_mem(data)?;
        Self::from_document(doc)
    }

    /// Wrap an already loaded document.
    pub fn from_document(doc: LopdfDocument) -> Result<Self> {
        if doc.is_encrypted() {
            return Err(Error::Encrypted);
        }
        Ok(Self { doc })
    }

    /// Direct access to the underlying `lopdf::Document`.
    pub fn raw_doc(&self) -> &LopdfDocument {
        &self.doc
    }

    /// Take back the underlying document.
    pub fn into_inner(self) -> LopdfDocument {
        self.doc
    }

    /// Get PDF version string.
    pub fn version(&self) -> String {
        self.doc.version.to_string()
    }

    fn deref<'a>(&'a self, obj: &'a Object) -> &'a Object {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).unwrap_or(obj),
            _ => obj,
        }
    }

    fn deref_dict<'a>(&'a self, obj: &'a Object) -> Option<&'a Dictionary> {
        match self.deref(obj) {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    /// Look up a page attribute, following `/Parent` for inheritable keys.
    fn inherited<'a>(&'a self, page: PageId, key: &[u8]) -> Option<&'a Object> {
        let mut dict = self.doc.get_dictionary(page).ok()?;
        for _ in 0..MAX_INHERIT_DEPTH {
            if let Ok(value) = dict.get(key) {
                return Some(self.deref(value));
            }
            let parent = dict.get(b"Parent").ok()?;
            dict = self.deref_dict(parent)?;
        }
        None
    }

    fn rect_attr(&self, page: PageId, key: &[u8]) -> Option<Rect> {
        let arr = self.inherited(page, key)?.as_array().ok()?;
        let nums: Vec<f32> = arr
            .iter()
            .filter_map(|o| number(self.deref(o)))
            .collect();
        if nums.len() < 4 {
            return None;
        }
        Some(Rect::from_corners(nums[0], nums[1], nums[2], nums[3]))
    }

    /// The resource dictionary governing `scope`.
    fn resources(&self, scope: &ResourceScope) -> Option<&Dictionary> {
        for form in scope.forms.iter().rev() {
            if let Ok(Object::Stream(s)) = self.doc.get_object(*form) {
                if let Some(res) = s.dict.get(b"Resources").ok().and_then(|o| self.deref_dict(o)) {
                    return Some(res);
                }
            }
        }
        self.inherited(scope.page, b"Resources")
            .and_then(|o| self.deref_dict(o))
    }

    fn resource_category(&self, scope: &ResourceScope, category: &[u8]) -> Option<&Dictionary> {
        let res = self.resources(scope)?;
        self.deref_dict(res.get(category).ok()?)
    }
}

/// Decoded bytes of a stream, raw bytes when it carries no filter.
pub fn stream_bytes(stream: &Stream) -> Vec<u8> {
    if stream.dict.has(b"Filter") {
        match stream.decompressed_content() {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Failed to decompress stream: {}", e);
                stream.content.clone()
            }
        }
    } else {
        stream.content.clone()
    }
}

impl PdfBackend for LopdfBackend {
    fn pages(&self) -> BTreeMap<u32, PageId> {
        self.doc.get_pages()
    }

    fn page_info(&self, page: PageId) -> Result<PageInfo> {
        let media_box = self
            .rect_attr(page, b"MediaBox")
            .unwrap_or(Rect::new(0.0, 0.0, 612.0, 792.0));
        let crop_box = self.rect_attr(page, b"CropBox").unwrap_or(media_box);
        let rotation = self
            .inherited(page, b"Rotate")
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(0)
            .rem_euclid(360);
        Ok(PageInfo {
            media_box,
            crop_box,
            rotation,
        })
    }

    fn page_contents(&self, page_id: PageId) -> Result<Vec<Vec<u8>>> {
        let page_dict = self
            .doc
            .get_dictionary(page_id)
            .map_err(|e| Error::PdfParse(e.to_string()))?;

        let contents = match page_dict.get(b"Contents") {
            Ok(c) => c,
            // A page without content is valid
            Err(_) => return Ok(Vec::new()),
        };

        match self.deref(contents) {
            Object::Stream(s) => Ok(vec![stream_bytes(s)]),
            Object::Array(arr) => {
                let mut streams = Vec::with_capacity(arr.len());
                for obj in arr {
                    if let Object::Stream(s) = self.deref(obj) {
                        streams.push(stream_bytes(s));
                    }
                }
                Ok(streams)
            }
            _ => Err(Error::PdfParse("Invalid content stream".to_string())),
        }
    }

    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>> {
        let content =
            lopdf::content::Content::decode(data).map_err(|e| Error::PdfParse(e.to_string()))?;

        Ok(content
            .operations
            .into_iter()
            .map(|op| ContentOp {
                operator: op.operator,
                operands: op.operands.iter().map(convert_object).collect(),
            })
            .collect())
    }

    fn fonts(&self, scope: &ResourceScope) -> Result<Vec<LoadedFont>> {
        let Some(fonts) = self.resource_category(scope, b"Font") else {
            return Ok(Vec::new());
        };
        let mut result = Vec::with_capacity(fonts.len());
        for (name, value) in fonts.iter() {
            let xref = match value {
                Object::Reference(id) => Some(*id),
                _ => None,
            };
            let Some(dict) = self.deref_dict(value) else {
                log::debug!("Font resource {} is not a dictionary", String::from_utf8_lossy(name));
                continue;
            };
            result.push(LoadedFont::load(&self.doc, name, xref, dict));
        }
        Ok(result)
    }

    fn color_space_components(&self, scope: &ResourceScope, name: &[u8]) -> Option<usize> {
        if let Some(n) = predefined_components(name) {
            return Some(n);
        }
        let spaces = self.resource_category(scope, b"ColorSpace")?;
        let spec = self.deref(spaces.get(name).ok()?);
        match spec {
            Object::Name(n) => predefined_components(n),
            Object::Array(arr) => {
                let family = arr.first().and_then(|o| o.as_name().ok())?;
                match family {
                    b"ICCBased" => {
                        let stream = self.deref_dict(arr.get(1)?)?;
                        stream.get(b"N").ok().and_then(|n| n.as_i64().ok()).map(|n| n as usize)
                    }
                    b"DeviceN" => self
                        .deref(arr.get(1)?)
                        .as_array()
                        .ok()
                        .map(|names| names.len()),
                    other => predefined_components(other),
                }
            }
            _ => None,
        }
    }

    fn xobject(&self, scope: &ResourceScope, name: &[u8]) -> Result<XObject> {
        let xobjects = self.resource_category(scope, b"XObject").ok_or_else(|| {
            Error::PdfParse(format!(
                "Undefined xobject id: {}",
                String::from_utf8_lossy(name)
            ))
        })?;
        let entry = xobjects.get(name).map_err(|_| {
            Error::PdfParse(format!(
                "Undefined xobject id: {}",
                String::from_utf8_lossy(name)
            ))
        })?;
        let Object::Reference(id) = entry else {
            return Ok(XObject::Unsupported);
        };
        let stream = match self.doc.get_object(*id)? {
            Object::Stream(s) => s,
            _ => return Ok(XObject::Unsupported),
        };
        let subtype = stream.dict.get(b"Subtype").and_then(Object::as_name).ok();
        match subtype {
            Some(b"Form") if stream.dict.has(b"BBox") => {
                // A stray null can sneak into the array, e.g. [0 3.05 null 274.9 157.3]
                let nums: Vec<f32> = stream
                    .dict
                    .get(b"BBox")
                    .and_then(Object::as_array)
                    .map(|arr| arr.iter().filter_map(|o| number(self.deref(o))).collect())
                    .unwrap_or_default();
                if nums.len() < 4 {
                    return Ok(XObject::Unsupported);
                }
                let matrix = stream
                    .dict
                    .get(b"Matrix")
                    .and_then(Object::as_array)
                    .ok()
                    .and_then(|arr| {
                        let m: Vec<f32> = arr.iter().filter_map(number).collect();
                        (m.len() == 6).then(|| Matrix::new(m[0], m[1], m[2], m[3], m[4], m[5]))
                    })
                    .unwrap_or(Matrix::IDENTITY);
                Ok(XObject::Form(FormXObject {
                    id: *id,
                    bbox: Rect::new(nums[0], nums[1], nums[2], nums[3]),
                    matrix,
                    content: stream_bytes(stream),
                }))
            }
            Some(b"Image") if stream.dict.has(b"Width") && stream.dict.has(b"Height") => {
                Ok(XObject::Image)
            }
            _ => Ok(XObject::Unsupported),
        }
    }
}

fn predefined_components(name: &[u8]) -> Option<usize> {
    match name {
        b"DeviceGray" | b"CalGray" | b"G" | b"Indexed" | b"I" | b"Pattern" | b"Separation" => {
            Some(1)
        }
        b"DeviceRGB" | b"CalRGB" | b"RGB" | b"Lab" => Some(3),
        b"DeviceCMYK" | b"CMYK" => Some(4),
        _ => None,
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Convert a `lopdf::Object` to [`PdfValue`].
fn convert_object(obj: &Object) -> PdfValue {
    match obj {
        Object::Null => PdfValue::Null,
        Object::Boolean(b) => PdfValue::Boolean(*b),
        Object::Integer(i) => PdfValue::Integer(*i),
        Object::Real(r) => PdfValue::Real(*r),
        Object::Name(n) => PdfValue::Name(n.clone()),
        Object::String(b, _) => PdfValue::Str(b.clone()),
        Object::Array(arr) => PdfValue::Array(arr.iter().map(convert_object).collect()),
        Object::Dictionary(d) => PdfValue::Dict(
            d.iter()
                .map(|(k, v)| (k.clone(), convert_object(v)))
                .collect(),
        ),
        _ => PdfValue::Other,
    }
}

/// Helper: extract a number from a [`PdfValue`].
pub fn get_number_from_value(val: &PdfValue) -> Option<f32> {
    match val {
        PdfValue::Integer(i) => Some(*i as f32),
        PdfValue::Real(r) => Some(*r),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_simple_latin1() {
        // 0xE9 = 'é' in Latin-1
        let bytes = vec![0x48, 0x65, 0x6C, 0x6C, 0xE9];
        assert_eq!(decode_text_simple(&bytes), "Hellé");
    }

    #[test]
    fn test_decode_text_simple_utf16be() {
        // UTF-16BE BOM + "Hi"
        let bytes = vec![0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69];
        assert_eq!(decode_text_simple(&bytes), "Hi");
    }

    #[test]
    fn test_operand_serialization() {
        assert_eq!(PdfValue::Real(0.5).to_string(), "0.5");
        assert_eq!(PdfValue::Real(2.0).to_string(), "2");
        assert_eq!(PdfValue::Name(b"GS 1".to_vec()).to_string(), "/GS#201");
        assert_eq!(PdfValue::Str(b"a(b)".to_vec()).to_string(), "(a\\(b\\))");
        assert_eq!(PdfValue::Str(vec![0, 1]).to_string(), "<0001>");
        let arr = PdfValue::Array(vec![PdfValue::Integer(3), PdfValue::Integer(2)]);
        assert_eq!(arr.to_string(), "[3 2]");
    }

    #[test]
    fn test_get_number_from_value() {
        assert_eq!(get_number_from_value(&PdfValue::Integer(42)), Some(42.0));
        assert_eq!(get_number_from_value(&PdfValue::Real(1.5)), Some(1.5));
        assert_eq!(get_number_from_value(&PdfValue::Other), None);
    }

    #[test]
    fn test_resource_scope_nesting() {
        let scope = ResourceScope::page((1, 0)).enter((5, 0)).enter((7, 0));
        assert_eq!(scope.forms, vec![(5, 0), (7, 0)]);
        assert_eq!(scope.page, (1, 0));
    }
}
