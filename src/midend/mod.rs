//! IL transformation stages between parsing and PDF emission.
//!
//! Each stage mutates the [`Document`](crate::model::Document) in place and
//! polls the cancellation token once per page.

pub mod debug_info;
pub mod descent;
pub mod helpers;
pub mod layout;
pub mod paragraph_finder;
pub mod scanned;
pub mod styles_and_formulas;
pub mod typesetting;

pub use debug_info::AddDebugInformation;
pub use descent::RemoveDescent;
pub use layout::{
    FullPageLayoutModel, LayoutDetection, LayoutModel, LayoutParser, PageImage, PageRasterizer,
};
pub use paragraph_finder::ParagraphFinder;
pub use scanned::DetectScannedFile;
pub use styles_and_formulas::StylesAndFormulas;
pub use typesetting::{Typesetting, TypesettingUnit};
