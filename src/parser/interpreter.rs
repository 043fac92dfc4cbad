//! Content-stream interpreter.
//!
//! Walks page and Form XObject operator streams, tracking the graphics and
//! text state, and reports glyphs, figures and XObject boundaries to an
//! [`InterpreterSink`]. Every operator that is not text showing or marked
//! content is echoed into the returned base operation string so the page can
//! be redrawn without its text.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;
use crate::model::{Matrix, Rect};
use crate::parser::backend::{
    ContentOp, ObjectId, PageId, PageInfo, PdfBackend, PdfValue, ResourceScope, XObject,
};
use crate::parser::font::LoadedFont;
use crate::parser::options::{ErrorMode, ParseOptions};

/// Receiver of interpreter events.
pub trait InterpreterSink {
    /// A new content stream starts; per-stream state is reset.
    fn on_new_stream(&mut self);

    /// `q`: snapshot the per-character passthrough instructions.
    fn push_passthrough(&mut self);

    /// `Q`: restore the last snapshot.
    fn pop_passthrough(&mut self);

    /// A colour/state operator to replay before each following glyph.
    fn on_passthrough(&mut self, operator: &str, args: &[PdfValue]);

    /// Drop the most recent passthrough instruction.
    fn remove_latest_passthrough(&mut self);

    fn on_stroking_color_space(&mut self, name: &str);

    fn on_non_stroking_color_space(&mut self, name: &str);

    /// A font declared in the current resource scope.
    fn on_font(&mut self, font: &LoadedFont);

    /// A glyph was shown.
    fn on_char(&mut self, ch: CharEvent);

    /// A two-point horizontal black stroke.
    fn on_line(&mut self, bbox: Rect, linewidth: f32);

    /// An image was drawn.
    fn on_figure(&mut self, bbox: Rect);

    /// A Form XObject starts; returns its document-wide id.
    fn on_xobj_begin(&mut self, bbox: Rect, xref: ObjectId) -> u32;

    /// A Form XObject ends with its non-text operators.
    fn on_xobj_end(&mut self, xobj_id: u32, base_operations: String);
}

/// Graphic attributes captured with a glyph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphicSnapshot {
    pub linewidth: f32,
    pub dash: Vec<f32>,
    pub scolor: Vec<f32>,
    pub ncolor: Vec<f32>,
}

/// A shown glyph in page space.
#[derive(Debug, Clone)]
pub struct CharEvent {
    pub font_id: String,
    pub code: u32,
    pub unicode: String,
    pub bbox: Rect,
    /// Glyph-to-page matrix
    pub matrix: Matrix,
    pub size: f32,
    pub advance: f32,
    pub graphic: GraphicSnapshot,
}

#[derive(Debug, Clone)]
struct TextState {
    font: Option<Rc<LoadedFont>>,
    size: f32,
    char_space: f32,
    word_space: f32,
    scaling: f32,
    leading: f32,
    rise: f32,
    matrix: Matrix,
    line_matrix: Matrix,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            size: 0.0,
            char_space: 0.0,
            word_space: 0.0,
            scaling: 100.0,
            leading: 0.0,
            rise: 0.0,
            matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).multiply(&self.line_matrix);
        self.matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    linewidth: f32,
    dash: Vec<f32>,
    scolor: Vec<f32>,
    ncolor: Vec<f32>,
    text: TextState,
}

impl GraphicsState {
    fn new(ctm: Matrix) -> Self {
        Self {
            ctm,
            linewidth: 1.0,
            dash: Vec::new(),
            scolor: vec![0.0],
            ncolor: vec![0.0],
            text: TextState::default(),
        }
    }

    fn snapshot(&self) -> GraphicSnapshot {
        GraphicSnapshot {
            linewidth: self.linewidth,
            dash: self.dash.clone(),
            scolor: self.scolor.clone(),
            ncolor: self.ncolor.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PathSegment {
    Move(f32, f32),
    Line(f32, f32),
    Other,
}

/// Execution context of one content stream scope (page or XObject).
struct ExecState {
    gs: GraphicsState,
    stack: Vec<GraphicsState>,
    fonts: HashMap<String, Rc<LoadedFont>>,
    scope: ResourceScope,
    path: Vec<PathSegment>,
    depth: usize,
}

/// Whether an operator is replayed before each glyph.
pub fn is_passthrough_per_char_operation(operator: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(sc|scn|g|rg|k|cs|gs|ri)$").unwrap())
        .is_match(operator)
}

/// Operators the interpreter understands; anything else is skipped.
const KNOWN_OPERATORS: &[&str] = &[
    "b", "B", "b*", "B*", "BDC", "BI", "BMC", "BT", "BX", "c", "cm", "CS", "cs", "d", "d0", "d1",
    "Do", "DP", "EI", "EMC", "ET", "EX", "f", "F", "f*", "G", "g", "gs", "h", "i", "ID", "j", "J",
    "K", "k", "l", "m", "M", "MP", "n", "q", "Q", "re", "RG", "rg", "ri", "s", "S", "SC", "sc",
    "SCN", "scn", "sh", "T*", "Tc", "TD", "Td", "Tf", "TJ", "Tj", "TL", "Tm", "Tr", "Ts", "Tw",
    "Tz", "v", "w", "W", "W*", "y", "'", "\"",
];

/// Whether an operator is echoed into the base stream.
fn echoes(name: &str, has_operands: bool) -> bool {
    if name.starts_with('T') {
        return false;
    }
    if has_operands {
        !matches!(name, "\"" | "'" | "EI" | "MP" | "DP" | "BMC" | "BDC")
    } else {
        !matches!(name, "BI" | "ID" | "EMC")
    }
}

fn numbers(operands: &[PdfValue]) -> Vec<f32> {
    operands.iter().filter_map(PdfValue::as_number).collect()
}

fn matrix_from(operands: &[PdfValue]) -> Option<Matrix> {
    let n = numbers(operands);
    (n.len() == 6).then(|| Matrix::new(n[0], n[1], n[2], n[3], n[4], n[5]))
}

/// Initial CTM for a page: rotation folded in, crop box origin removed.
pub fn page_ctm(info: &PageInfo) -> Matrix {
    let Rect {
        x: x0,
        y: y0,
        x2: x1,
        y2: y1,
    } = info.crop_box;
    match info.rotation {
        90 => Matrix::new(0.0, -1.0, 1.0, 0.0, -y0, x1),
        180 => Matrix::new(-1.0, 0.0, 0.0, -1.0, x1, y1),
        270 => Matrix::new(0.0, 1.0, -1.0, 0.0, y1, -x0),
        _ => Matrix::new(1.0, 0.0, 0.0, 1.0, -x0, -y0),
    }
}

/// Interprets the content of one page.
pub struct Interpreter<'a, B: PdfBackend + ?Sized, S: InterpreterSink> {
    backend: &'a B,
    sink: &'a mut S,
    options: &'a ParseOptions,
}

impl<'a, B: PdfBackend + ?Sized, S: InterpreterSink> Interpreter<'a, B, S> {
    pub fn new(backend: &'a B, sink: &'a mut S, options: &'a ParseOptions) -> Self {
        Self {
            backend,
            sink,
            options,
        }
    }

    /// Interpret a page and return its base operations.
    pub fn process_page(&mut self, page: PageId, info: &PageInfo) -> Result<String> {
        let ctm = page_ctm(info);
        let streams = self.backend.page_contents(page)?;
        self.render_contents(ResourceScope::page(page), &streams, ctm, 0)
    }

    fn render_contents(
        &mut self,
        scope: ResourceScope,
        streams: &[Vec<u8>],
        ctm: Matrix,
        depth: usize,
    ) -> Result<String> {
        let mut state = ExecState {
            gs: GraphicsState::new(ctm),
            stack: Vec::new(),
            fonts: HashMap::new(),
            scope,
            path: Vec::new(),
            depth,
        };
        for font in self.backend.fonts(&state.scope)? {
            self.sink.on_font(&font);
            state
                .fonts
                .insert(font.resource_name.clone(), Rc::new(font));
        }

        let mut out = String::new();
        for data in streams {
            self.sink.on_new_stream();
            let ops = match self.backend.decode_content(data) {
                Ok(ops) => ops,
                Err(e) if self.options.error_mode == ErrorMode::Lenient => {
                    log::warn!("Skipping undecodable content stream: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            for op in &ops {
                self.execute(&mut state, op, &mut out)?;
            }
        }
        Ok(out)
    }

    fn execute(&mut self, state: &mut ExecState, op: &ContentOp, out: &mut String) -> Result<()> {
        let name = op.operator.as_str();
        if !KNOWN_OPERATORS.contains(&name) {
            log::debug!("Unknown operator: {:?}", name);
            return Ok(());
        }
        let args = &op.operands;

        match name {
            "q" => {
                state.stack.push(state.gs.clone());
                self.sink.push_passthrough();
            }
            "Q" => {
                if let Some(gs) = state.stack.pop() {
                    state.gs = gs;
                }
                self.sink.pop_passthrough();
            }
            "cm" => {
                if let Some(m) = matrix_from(args) {
                    state.gs.ctm = m.multiply(&state.gs.ctm);
                }
            }
            "w" => {
                if let Some(w) = args.first().and_then(PdfValue::as_number) {
                    state.gs.linewidth = w;
                }
            }
            "d" => {
                if let Some(PdfValue::Array(arr)) = args.first() {
                    state.gs.dash = numbers(arr);
                }
            }
            "CS" | "cs" => {
                if let Some(cs) = args.first().and_then(PdfValue::as_name) {
                    let cs = String::from_utf8_lossy(cs).to_string();
                    if self
                        .backend
                        .color_space_components(&state.scope, cs.as_bytes())
                        .is_none()
                    {
                        log::debug!("Undefined ColorSpace: {}", cs);
                    }
                    if name == "CS" {
                        self.sink.on_stroking_color_space(&cs);
                    } else {
                        self.sink.on_non_stroking_color_space(&cs);
                    }
                }
            }
            "SC" | "SCN" => {
                state.gs.scolor = numbers(args);
                if name == "SC" {
                    self.sink.on_passthrough("SCN", args);
                    self.sink.remove_latest_passthrough();
                }
            }
            "sc" | "scn" => {
                state.gs.ncolor = numbers(args);
                if name == "sc" {
                    self.sink.on_passthrough("scn", args);
                    self.sink.remove_latest_passthrough();
                }
            }
            "G" | "RG" | "K" => state.gs.scolor = numbers(args),
            "g" | "rg" | "k" => state.gs.ncolor = numbers(args),
            "m" => {
                let n = numbers(args);
                if n.len() == 2 {
                    state.path = vec![PathSegment::Move(n[0], n[1])];
                }
            }
            "l" => {
                let n = numbers(args);
                if n.len() == 2 {
                    state.path.push(PathSegment::Line(n[0], n[1]));
                }
            }
            "c" | "v" | "y" | "h" | "re" => state.path.push(PathSegment::Other),
            "S" => {
                self.stroke(state);
                state.path.clear();
            }
            "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" | "n" => state.path.clear(),
            "BT" => {
                state.gs.text.matrix = Matrix::IDENTITY;
                state.gs.text.line_matrix = Matrix::IDENTITY;
            }
            "Tc" => set_number(args, &mut state.gs.text.char_space),
            "Tw" => set_number(args, &mut state.gs.text.word_space),
            "Tz" => set_number(args, &mut state.gs.text.scaling),
            "TL" => set_number(args, &mut state.gs.text.leading),
            "Ts" => set_number(args, &mut state.gs.text.rise),
            "Tf" => {
                let font_name = args
                    .first()
                    .and_then(PdfValue::as_name)
                    .map(|n| String::from_utf8_lossy(n).to_string());
                if let Some(font_name) = font_name {
                    state.gs.text.font = state.fonts.get(&font_name).cloned();
                    if state.gs.text.font.is_none() {
                        log::debug!("Undefined font: {}", font_name);
                    }
                }
                if let Some(size) = args.get(1).and_then(PdfValue::as_number) {
                    state.gs.text.size = size;
                }
            }
            "Td" | "TD" => {
                let n = numbers(args);
                if n.len() == 2 {
                    if name == "TD" {
                        state.gs.text.leading = -n[1];
                    }
                    state.gs.text.move_line(n[0], n[1]);
                }
            }
            "Tm" => {
                if let Some(m) = matrix_from(args) {
                    state.gs.text.matrix = m;
                    state.gs.text.line_matrix = m;
                }
            }
            "T*" => state.gs.text.next_line(),
            "Tj" => {
                if let Some(s) = args.first() {
                    self.show_text(state, std::slice::from_ref(s));
                }
            }
            "TJ" => {
                if let Some(PdfValue::Array(seq)) = args.first() {
                    self.show_text(state, seq);
                }
            }
            "'" => {
                state.gs.text.next_line();
                if let Some(s) = args.first() {
                    self.show_text(state, std::slice::from_ref(s));
                }
            }
            "\"" => {
                let n = numbers(args);
                if n.len() >= 2 {
                    state.gs.text.word_space = n[0];
                    state.gs.text.char_space = n[1];
                }
                state.gs.text.next_line();
                if let Some(s) = args.get(2) {
                    self.show_text(state, std::slice::from_ref(s));
                }
            }
            "Do" => {
                if let Some(xobj) = args.first().and_then(PdfValue::as_name) {
                    let xobj = xobj.to_vec();
                    self.do_xobject(state, &xobj)?;
                }
            }
            _ => {}
        }

        if !args.is_empty() && is_passthrough_per_char_operation(name) {
            self.sink.on_passthrough(name, args);
        }
        self.echo(name, args, out);
        Ok(())
    }

    fn echo(&self, name: &str, args: &[PdfValue], out: &mut String) {
        if !echoes(name, !args.is_empty()) {
            return;
        }
        if name == "d" {
            let dash = args.first().map(|a| a.to_string()).unwrap_or_else(|| "[]".into());
            let phase = args.get(1).map(|a| a.to_string()).unwrap_or_else(|| "0".into());
            out.push_str(&format!("{} {} d ", dash, phase));
            return;
        }
        for arg in args {
            out.push_str(&arg.to_string());
            out.push(' ');
        }
        out.push_str(name);
        out.push(' ');
    }

    /// Report a two-point horizontal black stroke.
    fn stroke(&mut self, state: &ExecState) {
        let is_black = state.gs.scolor.iter().sum::<f32>() == 0.0;
        if let [PathSegment::Move(x0, y0), PathSegment::Line(x1, y1)] = state.path[..] {
            let (px0, py0) = state.gs.ctm.apply(x0, y0);
            let (px1, py1) = state.gs.ctm.apply(x1, y1);
            if py0 == py1 && is_black {
                self.sink.on_line(
                    Rect::from_corners(px0, py0, px1, py1),
                    state.gs.linewidth,
                );
            }
        }
    }

    fn show_text(&mut self, state: &mut ExecState, seq: &[PdfValue]) {
        let Some(font) = state.gs.text.font.clone() else {
            log::debug!("Text shown without a font");
            return;
        };
        let ts = &state.gs.text;
        let hscale = ts.scaling / 100.0;
        let size = ts.size;
        let rise = ts.rise;
        let char_space = ts.char_space * hscale;
        let word_space = ts.word_space * hscale;
        let matrix = ts.matrix.multiply(&state.gs.ctm);
        let vertical = font.is_vertical();
        let graphic = state.gs.snapshot();

        let mut pos = 0.0f32;
        let mut need_char_space = false;
        for item in seq {
            match item {
                PdfValue::Str(bytes) => {
                    for code in font.codes(bytes) {
                        if need_char_space {
                            pos += if vertical { -char_space } else { char_space };
                        }
                        let width = font.width(code) / 1000.0;
                        let (char_matrix, local, advance) = if vertical {
                            let adv = -size;
                            let vx = width * size * 0.5;
                            let vy = 0.88 * size;
                            (
                                Matrix::translate(0.0, pos).multiply(&matrix),
                                Rect::from_corners(-vx, vy + rise + adv, -vx + size, vy + rise),
                                adv,
                            )
                        } else {
                            let adv = width * size * hscale;
                            (
                                Matrix::translate(pos, 0.0).multiply(&matrix),
                                Rect::new(0.0, rise, adv, rise + size),
                                adv,
                            )
                        };
                        let bbox = local.transform(&char_matrix);
                        let glyph_size = if vertical { bbox.width() } else { bbox.height() };
                        self.sink.on_char(CharEvent {
                            font_id: font.resource_name.clone(),
                            code,
                            unicode: font.unicode(code),
                            bbox,
                            matrix: char_matrix,
                            size: glyph_size,
                            advance: advance.abs(),
                            graphic: graphic.clone(),
                        });
                        pos += advance;
                        if font.word_space_applies(code) && word_space != 0.0 {
                            pos += if vertical { -word_space } else { word_space };
                        }
                        need_char_space = true;
                    }
                }
                other => {
                    if let Some(n) = other.as_number() {
                        let shift = n * size / 1000.0;
                        if vertical {
                            pos += shift;
                        } else {
                            pos -= shift * hscale;
                        }
                        need_char_space = false;
                    }
                }
            }
        }
        let advance = if vertical {
            Matrix::translate(0.0, pos)
        } else {
            Matrix::translate(pos, 0.0)
        };
        state.gs.text.matrix = advance.multiply(&state.gs.text.matrix);
    }

    fn do_xobject(&mut self, state: &mut ExecState, name: &[u8]) -> Result<()> {
        let xobject = match self.backend.xobject(&state.scope, name) {
            Ok(x) => x,
            Err(e) => {
                log::warn!("{}", e);
                return Ok(());
            }
        };
        match xobject {
            XObject::Form(form) => {
                if state.depth >= self.options.max_xobject_depth {
                    log::warn!(
                        "Form XObject nesting deeper than {}, skipping {}",
                        self.options.max_xobject_depth,
                        String::from_utf8_lossy(name)
                    );
                    return Ok(());
                }
                let ctm = form.matrix.multiply(&state.gs.ctm);
                let bbox = form.bbox.transform(&ctm);
                let xobj_id = self.sink.on_xobj_begin(bbox, form.id);
                let inv = ctm.invert().unwrap_or_else(|| {
                    log::warn!("Singular XObject matrix, content kept untransformed");
                    Matrix::IDENTITY
                });
                let scope = state.scope.enter(form.id);
                let base = self.render_contents(
                    scope,
                    std::slice::from_ref(&form.content),
                    ctm,
                    state.depth + 1,
                );
                let base = match base {
                    Ok(base) => base,
                    Err(e) => {
                        self.sink.on_xobj_end(xobj_id, String::new());
                        return Err(e);
                    }
                };
                let [a, b, c, d, e, f] = inv.to_array();
                self.sink.on_xobj_end(
                    xobj_id,
                    format!(
                        "q {}Q {} {} {} {} {} {} cm ",
                        base,
                        PdfValue::Real(a),
                        PdfValue::Real(b),
                        PdfValue::Real(c),
                        PdfValue::Real(d),
                        PdfValue::Real(e),
                        PdfValue::Real(f)
                    ),
                );
            }
            XObject::Image => {
                let bbox = Rect::new(0.0, 0.0, 1.0, 1.0).transform(&state.gs.ctm);
                self.sink.on_figure(bbox);
            }
            XObject::Unsupported => {}
        }
        Ok(())
    }
}

fn set_number(args: &[PdfValue], target: &mut f32) {
    if let Some(v) = args.first().and_then(PdfValue::as_number) {
        *target = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_operator_match() {
        for op in ["sc", "SCN", "g", "RG", "k", "cs", "gs", "ri"] {
            assert!(is_passthrough_per_char_operation(op), "{}", op);
        }
        for op in ["Tf", "re", "scnx", "w"] {
            assert!(!is_passthrough_per_char_operation(op), "{}", op);
        }
    }

    #[test]
    fn test_echo_filter() {
        assert!(!echoes("Tj", true));
        assert!(!echoes("BDC", true));
        assert!(!echoes("EMC", false));
        assert!(echoes("re", true));
        assert!(echoes("q", false));
        assert!(echoes("Do", true));
    }

    #[test]
    fn test_page_ctm_rotations() {
        let info = |rotation| PageInfo {
            media_box: Rect::new(0.0, 0.0, 600.0, 800.0),
            crop_box: Rect::new(10.0, 20.0, 600.0, 800.0),
            rotation,
        };
        assert_eq!(page_ctm(&info(0)), Matrix::new(1.0, 0.0, 0.0, 1.0, -10.0, -20.0));
        assert_eq!(page_ctm(&info(90)), Matrix::new(0.0, -1.0, 1.0, 0.0, -20.0, 600.0));
        assert_eq!(page_ctm(&info(180)), Matrix::new(-1.0, 0.0, 0.0, -1.0, 600.0, 800.0));
        assert_eq!(page_ctm(&info(270)), Matrix::new(0.0, 1.0, -1.0, 0.0, 800.0, -10.0));
    }
}
