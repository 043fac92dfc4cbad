//! IL document builder.
//!
//! Receives interpreter events and accumulates them into [`Document`] pages.
//! Owns XObject id allocation and the per-scope font maps.

use std::collections::HashMap;

use crate::config::PageSelection;
use crate::model::{
    Document, GraphicState, Page, PdfCharacter, PdfFigure, PdfRectangle, PdfStyle, PdfXobject,
    Rect,
};
use crate::parser::backend::{ObjectId, PdfValue};
use crate::parser::font::LoadedFont;
use crate::parser::interpreter::{is_passthrough_per_char_operation, CharEvent, InterpreterSink};

/// Accumulates interpreter events into an IL document.
pub struct ILBuilder {
    docs: Document,
    pages: PageSelection,
    current_page: Option<Page>,
    stroking_color_space_name: Option<String>,
    non_stroking_color_space_name: Option<String>,
    passthrough: Vec<(String, String)>,
    passthrough_stack: Vec<Vec<(String, String)>>,
    /// Current XObject, `None` for page content
    xobj_id: Option<u32>,
    xobj_inc: u32,
    font_name_id_map: HashMap<String, String>,
    xobj_stack: Vec<(HashMap<String, String>, Option<u32>)>,
}

impl ILBuilder {
    pub fn new(pages: PageSelection) -> Self {
        Self {
            docs: Document::new(0),
            pages,
            current_page: None,
            stroking_color_space_name: None,
            non_stroking_color_space_name: None,
            passthrough: Vec::new(),
            passthrough_stack: Vec::new(),
            xobj_id: None,
            xobj_inc: 0,
            font_name_id_map: HashMap::new(),
            xobj_stack: Vec::new(),
        }
    }

    pub fn on_total_pages(&mut self, total_pages: u32) {
        self.docs.total_pages = total_pages;
    }

    /// Start a page. `page_number` is 0-based.
    pub fn on_page_start(&mut self, page_number: u32) {
        if self.current_page.is_some() {
            log::warn!("page {} started before the previous one ended", page_number + 1);
            self.on_page_end();
        }
        self.current_page = Some(Page::new(page_number));
        self.font_name_id_map.clear();
        self.passthrough_stack.clear();
        self.xobj_stack.clear();
        self.xobj_id = None;
        self.stroking_color_space_name = None;
        self.non_stroking_color_space_name = None;
    }

    pub fn on_page_crop_box(&mut self, bbox: Rect) {
        if let Some(page) = self.current_page.as_mut() {
            page.cropbox = bbox;
        }
    }

    pub fn on_page_media_box(&mut self, bbox: Rect) {
        if let Some(page) = self.current_page.as_mut() {
            page.mediabox = bbox;
        }
    }

    pub fn on_page_base_operation(&mut self, operations: String) {
        if let Some(page) = self.current_page.as_mut() {
            page.base_operations = operations;
        }
    }

    /// Finish the current page and append it to the document.
    pub fn on_page_end(&mut self) {
        if let Some(page) = self.current_page.take() {
            self.docs.page.push(page);
        }
    }

    /// Drop the page in progress, e.g. after an interpreter failure.
    pub fn abandon_page(&mut self) {
        self.current_page = None;
        self.xobj_id = None;
        self.xobj_stack.clear();
    }

    /// Resource key already registered for a font name in the current scope.
    pub fn font_id_for(&self, font_name: &str) -> Option<&str> {
        self.font_name_id_map.get(font_name).map(String::as_str)
    }

    /// Finish building; keeps only selected pages.
    pub fn create_il(mut self) -> Document {
        self.on_page_end();
        let pages = &self.pages;
        self.docs
            .page
            .retain(|page| pages.includes(page.page_number + 1));
        self.docs
    }

    fn create_graphic_state(&self, ch: &CharEvent) -> GraphicState {
        let passthrough = self
            .passthrough
            .iter()
            .map(|(op, args)| format!("{} {}", args, op))
            .collect::<Vec<_>>()
            .join(" ");
        GraphicState {
            linewidth: Some(ch.graphic.linewidth),
            dash: ch.graphic.dash.clone(),
            scolor: ch.graphic.scolor.clone(),
            ncolor: ch.graphic.ncolor.clone(),
            stroking_color_space_name: self.stroking_color_space_name.clone(),
            non_stroking_color_space_name: self.non_stroking_color_space_name.clone(),
            ..GraphicState::with_passthrough(passthrough)
        }
    }

    fn scope_xobject(&mut self) -> Option<&mut PdfXobject> {
        let id = self.xobj_id?;
        self.current_page
            .as_mut()?
            .pdf_xobject
            .iter_mut()
            .find(|x| x.xobj_id == id)
    }
}

impl InterpreterSink for ILBuilder {
    fn on_new_stream(&mut self) {
        self.stroking_color_space_name = None;
        self.non_stroking_color_space_name = None;
        self.passthrough.clear();
    }

    fn push_passthrough(&mut self) {
        self.passthrough_stack.push(self.passthrough.clone());
    }

    fn pop_passthrough(&mut self) {
        match self.passthrough_stack.pop() {
            Some(saved) => self.passthrough = saved,
            None => {
                self.passthrough.clear();
                log::error!(
                    "unbalanced passthrough restore on page {}",
                    self.current_page.as_ref().map_or(0, |p| p.page_number + 1)
                );
            }
        }
    }

    fn on_passthrough(&mut self, operator: &str, args: &[PdfValue]) {
        if !is_passthrough_per_char_operation(operator) {
            log::error!("Unknown passthrough_per_char operation: {}", operator);
            return;
        }
        let args = args
            .iter()
            .map(PdfValue::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(pos) = self.passthrough.iter().position(|(op, _)| op == operator) {
            self.passthrough.remove(pos);
        }
        self.passthrough.push((operator.to_string(), args));
    }

    fn remove_latest_passthrough(&mut self) {
        self.passthrough.pop();
    }

    fn on_stroking_color_space(&mut self, name: &str) {
        self.stroking_color_space_name = Some(name.to_string());
    }

    fn on_non_stroking_color_space(&mut self, name: &str) {
        self.non_stroking_color_space_name = Some(name.to_string());
    }

    fn on_font(&mut self, font: &LoadedFont) {
        let pdf_font = font.to_pdf_font();
        self.font_name_id_map
            .insert(pdf_font.name.clone(), pdf_font.font_id.clone());
        if let Some(xobj) = self.scope_xobject() {
            xobj.pdf_font.push(pdf_font);
        } else if let Some(page) = self.current_page.as_mut() {
            page.pdf_font.push(pdf_font);
        }
    }

    fn on_char(&mut self, ch: CharEvent) {
        let graphic_state = self.create_graphic_state(&ch);
        let xobj_id = self.xobj_id;
        let Some(page) = self.current_page.as_mut() else {
            return;
        };

        let fonts = match xobj_id.and_then(|id| page.xobject(id)) {
            Some(xobj) => &xobj.pdf_font,
            None => &page.pdf_font,
        };
        let descent = fonts
            .iter()
            .find(|f| f.font_id == ch.font_id)
            .map_or(0.0, |f| f.descent_offset(ch.size));

        if !ch.unicode.starts_with("(cid:") && ch.unicode.chars().count() > 1 {
            return;
        }

        let vertical = ch.matrix.a == 0.0 && ch.matrix.d == 0.0;
        let bbox = if vertical {
            ch.bbox.offset(-descent, 0.0)
        } else {
            ch.bbox.offset(0.0, descent)
        };

        if ch.size == 0.0 {
            log::warn!("Font size is 0.0 for character {}. Skip it.", ch.unicode);
            return;
        }

        let style = PdfStyle::new(ch.font_id, ch.size, graphic_state);
        let mut pdf_char = PdfCharacter::new(ch.unicode, bbox, style)
            .with_code(ch.code)
            .with_advance(ch.advance)
            .with_xobj(xobj_id);
        pdf_char.vertical = vertical;
        page.pdf_character.push(pdf_char);
    }

    fn on_line(&mut self, bbox: Rect, linewidth: f32) {
        if let Some(page) = self.current_page.as_mut() {
            page.pdf_rectangle.push(PdfRectangle {
                bbox,
                graphic_state: Some(GraphicState {
                    linewidth: Some(linewidth),
                    ..Default::default()
                }),
                debug_info: false,
            });
        }
    }

    fn on_figure(&mut self, bbox: Rect) {
        if let Some(page) = self.current_page.as_mut() {
            page.pdf_figure.push(PdfFigure { bbox });
        }
    }

    fn on_xobj_begin(&mut self, bbox: Rect, xref: ObjectId) -> u32 {
        self.push_passthrough();
        self.xobj_stack
            .push((std::mem::take(&mut self.font_name_id_map), self.xobj_id));
        self.xobj_inc += 1;
        let id = self.xobj_inc;
        self.xobj_id = Some(id);
        if let Some(page) = self.current_page.as_mut() {
            page.pdf_xobject.push(PdfXobject {
                bbox,
                xobj_id: id,
                xref_id: xref.0,
                xref_gen: xref.1,
                ..Default::default()
            });
        }
        id
    }

    fn on_xobj_end(&mut self, xobj_id: u32, base_operations: String) {
        self.pop_passthrough();
        if let Some((fonts, parent)) = self.xobj_stack.pop() {
            self.font_name_id_map = fonts;
            self.xobj_id = parent;
        }
        if let Some(xobj) = self
            .current_page
            .as_mut()
            .and_then(|p| p.pdf_xobject.iter_mut().find(|x| x.xobj_id == xobj_id))
        {
            xobj.base_operations = base_operations;
        }
        self.xobj_inc += 1;
    }
}
