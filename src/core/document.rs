//! Purpose: The stored document model and its rendering to PDF.
//! Exports: `Document`, `DocumentId`.
//! Role: Wire format for the document service and the bridge from lengths to typesetting props.
//! Invariants: JSON field names are stable (`Font`, `Text`, `FontSize`, ..., `id`).
//! Invariants: Fields missing from incoming JSON take the default document's values.
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::length::Length;
use crate::core::text::{PdfTextWriter, TextObject, TypesettingProps};

pub type DocumentId = u64;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Document {
    pub font: String,
    pub text: String,
    pub font_size: Length,
    pub baseline_skip: Length,
    pub left_margin: Length,
    pub right_margin: Length,
    pub top_margin: Length,
    pub bottom_margin: Length,
    pub page_height: Length,
    pub page_width: Length,
    #[serde(rename = "id", skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            font: "Adobe Garamond Pro".to_string(),
            text: "Lorem Ipsum".to_string(),
            font_size: Length::from_points(12.0),
            baseline_skip: Length::from_points(15.0),
            left_margin: Length::from_points(72.0),
            right_margin: Length::from_points(72.0),
            top_margin: Length::from_points(72.0),
            bottom_margin: Length::from_points(72.0),
            page_height: fixed_length("11in", 792.0),
            page_width: fixed_length("8.5\"", 612.0),
            id: None,
        }
    }
}

fn fixed_length(definition: &str, points: f64) -> Length {
    definition
        .parse()
        .unwrap_or_else(|_| Length::from_points(points))
}

impl Document {
    pub fn typesetting_props(&self) -> TypesettingProps {
        TypesettingProps {
            font_name: self.font.clone(),
            font_size: self.font_size.points(),
            baseline_skip: self.baseline_skip.points(),
            top_margin: self.top_margin.points(),
            left_margin: self.left_margin.points(),
            bottom_margin: self.bottom_margin.points(),
            right_margin: self.right_margin.points(),
            page_width: self.page_width.points(),
            page_height: self.page_height.points(),
        }
    }

    /// Typesets the document into `writer` and returns it once the PDF is complete.
    pub fn render_pdf<W: Write>(&self, writer: W) -> Result<W, Error> {
        let props = self.typesetting_props();
        let mut pdf = PdfTextWriter::new(writer, props.page_width, props.page_height)?;
        pdf.write_at(&self.text, &props, props.left_margin, props.first_baseline())?;
        tracing::debug!(id = ?self.id, pages = pdf.pages(), "rendered document");
        pdf.finish()
    }
}
