//! Graphic state and character styles.

use serde::{Deserialize, Serialize};

/// Font sizes within this distance are considered the same.
pub const FONT_SIZE_TOLERANCE: f32 = 0.02;

/// Graphic state attached to a character or rectangle.
///
/// Only `passthrough_per_char_instruction` is consumed during re-emission;
/// it holds the exact colour and state operators (`"0 g 1 0 0 RG"`) that were
/// active when the glyph was drawn.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphicState {
    pub linewidth: Option<f32>,
    pub dash: Vec<f32>,
    pub flatness: Option<f32>,
    pub intent: Option<String>,
    pub linecap: Option<i32>,
    pub linejoin: Option<i32>,
    pub miterlimit: Option<f32>,
    pub ncolor: Vec<f32>,
    pub scolor: Vec<f32>,
    pub stroking_color_space_name: Option<String>,
    pub non_stroking_color_space_name: Option<String>,
    pub passthrough_per_char_instruction: Option<String>,
}

impl GraphicState {
    /// Create a graphic state carrying only a passthrough instruction.
    pub fn with_passthrough(instruction: impl Into<String>) -> Self {
        let instruction = instruction.into();
        Self {
            passthrough_per_char_instruction: if instruction.is_empty() {
                None
            } else {
                Some(instruction)
            },
            ..Default::default()
        }
    }

    /// The passthrough instruction, or an empty string.
    pub fn passthrough(&self) -> &str {
        self.passthrough_per_char_instruction.as_deref().unwrap_or("")
    }
}

/// Font reference, size and graphic state of a glyph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PdfStyle {
    pub font_id: String,
    pub font_size: f32,
    pub graphic_state: GraphicState,
}

impl PdfStyle {
    /// Create a new style.
    pub fn new(font_id: impl Into<String>, font_size: f32, graphic_state: GraphicState) -> Self {
        Self {
            font_id: font_id.into(),
            font_size,
            graphic_state,
        }
    }

    /// Same font, near-equal size and identical graphic state.
    pub fn is_close(&self, other: &PdfStyle) -> bool {
        self.font_id == other.font_id
            && (self.font_size - other.font_size).abs() < FONT_SIZE_TOLERANCE
            && self.graphic_state == other.graphic_state
    }

    /// Same font id and graphic state, ignoring size.
    pub fn same_face(&self, other: &PdfStyle) -> bool {
        self.font_id == other.font_id && self.graphic_state == other.graphic_state
    }
}
