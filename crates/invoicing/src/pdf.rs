//! PDF rendering with the builtin Helvetica font (A4, paginated).

use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point,
};

use crate::html::route_line;
use crate::{InvoiceDocument, InvoiceError};

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 15.0;
const ROW_H: f32 = 6.5;
const BODY_SIZE: f32 = 9.0;
/// Lowest y a table row may be drawn at before breaking the page.
const BOTTOM: f32 = 30.0;

// Column x positions (mm).
const COL_NO: f32 = MARGIN;
const COL_REF: f32 = 24.0;
const COL_NAME: f32 = 56.0;
const COL_QTY: f32 = 128.0;
const COL_PRICE: f32 = 148.0;
const COL_TOTAL: f32 = 174.0;

fn pdf_err(e: impl core::fmt::Debug) -> InvoiceError {
    InvoiceError::Pdf(format!("{e:?}"))
}

fn rule(layer: &PdfLayerReference, y: f32) {
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(MARGIN), Mm(y)), false),
            (Point::new(Mm(PAGE_W - MARGIN), Mm(y)), false),
        ],
        is_closed: false,
    });
}

/// Clip long cells so they do not run into the next column.
fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    clipped.push('.');
    clipped
}

struct Writer<'a> {
    layer: PdfLayerReference,
    font: &'a IndirectFontRef,
    bold: &'a IndirectFontRef,
}

impl Writer<'_> {
    fn text(&self, text: &str, size: f32, x: f32, y: f32) {
        self.layer.use_text(text, size, Mm(x), Mm(y), self.font);
    }

    fn strong(&self, text: &str, size: f32, x: f32, y: f32) {
        self.layer.use_text(text, size, Mm(x), Mm(y), self.bold);
    }

    fn table_header(&self, y: f32) {
        self.strong("#", BODY_SIZE, COL_NO, y);
        self.strong("Reference", BODY_SIZE, COL_REF, y);
        self.strong("Product", BODY_SIZE, COL_NAME, y);
        self.strong("Qty", BODY_SIZE, COL_QTY, y);
        self.strong("Unit price", BODY_SIZE, COL_PRICE, y);
        self.strong("Total", BODY_SIZE, COL_TOTAL, y);
        rule(&self.layer, y - 2.0);
    }
}

/// Render the invoice as PDF bytes.
pub fn render_pdf(doc: &InvoiceDocument) -> Result<Vec<u8>, InvoiceError> {
    let title = format!("{} {}", doc.title, doc.number);
    let (pdf, page, layer) = PdfDocument::new(title.as_str(), Mm(PAGE_W), Mm(PAGE_H), "content");
    let font = pdf.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?;
    let bold = pdf
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_err)?;

    let mut w = Writer {
        layer: pdf.get_page(page).get_layer(layer),
        font: &font,
        bold: &bold,
    };

    // Header block.
    let mut y = PAGE_H - MARGIN - 5.0;
    w.strong(&doc.company.name, 14.0, MARGIN, y);
    w.strong(&doc.title, 14.0, 120.0, y);
    y -= 6.0;
    if let Some(address) = &doc.company.address {
        w.text(address, BODY_SIZE, MARGIN, y);
    }
    w.text(&format!("No. {}", doc.number), BODY_SIZE, 120.0, y);
    y -= 5.0;
    w.text(&format!("Date: {}", doc.date), BODY_SIZE, 120.0, y);
    if doc.proforma {
        y -= 6.0;
        w.strong("PROFORMA", 12.0, 120.0, y);
    }

    y -= 12.0;
    if let Some(party) = &doc.party {
        w.strong(&doc.party_label, BODY_SIZE, MARGIN, y);
        y -= 5.0;
        w.text(&party.name, BODY_SIZE, MARGIN, y);
        for extra in [&party.address, &party.phone, &party.email].into_iter().flatten() {
            y -= 4.5;
            w.text(extra, BODY_SIZE, MARGIN, y);
        }
        if let Some(tax_id) = &party.tax_id {
            y -= 4.5;
            w.text(&format!("Tax ID: {tax_id}"), BODY_SIZE, MARGIN, y);
        }
        y -= 6.0;
    }
    let route = route_line(doc);
    if !route.is_empty() {
        w.text(&route, BODY_SIZE, MARGIN, y);
        y -= 8.0;
    }

    w.table_header(y);
    y -= ROW_H + 1.0;

    let mut page_no = 1;
    for row in &doc.rows {
        if y < BOTTOM {
            page_no += 1;
            let (next_page, next_layer) =
                pdf.add_page(Mm(PAGE_W), Mm(PAGE_H), format!("page {page_no}"));
            w.layer = pdf.get_page(next_page).get_layer(next_layer);
            y = PAGE_H - MARGIN - 5.0;
            w.text(&format!("{} (continued)", title), BODY_SIZE, MARGIN, y);
            y -= 10.0;
            w.table_header(y);
            y -= ROW_H + 1.0;
        }

        w.text(&row.line_no.to_string(), BODY_SIZE, COL_NO, y);
        w.text(&clip(&row.product_reference, 16), BODY_SIZE, COL_REF, y);
        w.text(&clip(&row.product_name, 38), BODY_SIZE, COL_NAME, y);
        w.text(&row.quantity.to_string(), BODY_SIZE, COL_QTY, y);
        w.text(&row.unit_price_display, BODY_SIZE, COL_PRICE, y);
        w.text(&row.line_total_display, BODY_SIZE, COL_TOTAL, y);
        y -= ROW_H;
    }

    rule(&w.layer, y + 2.0);
    y -= 4.0;
    w.strong("Total", 11.0, COL_PRICE, y);
    w.strong(&doc.total_display, 11.0, COL_TOTAL, y);

    if let Some(notes) = &doc.notes {
        y -= 12.0;
        w.text(&clip(notes, 110), BODY_SIZE, MARGIN, y.max(MARGIN));
    }

    pdf.save_to_bytes().map_err(pdf_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_invoice;
    use crate::invoice::tests::{company, source, source_line};
    use stockbook_inventory::MovementStatus;

    #[test]
    fn produces_a_pdf() {
        let doc = build_invoice(
            &source(MovementStatus::Completed, vec![source_line(1, 2, Some(500), 0)]),
            &company(),
        )
        .unwrap();
        let bytes = render_pdf(&doc).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_invoices_paginate() {
        let lines = (1..=120).map(|n| source_line(n, 1, None, 100)).collect();
        let doc = build_invoice(&source(MovementStatus::Completed, lines), &company()).unwrap();
        let bytes = render_pdf(&doc).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn clip_marks_truncation() {
        assert_eq!(clip("abcdef", 4), "abc.");
        assert_eq!(clip("abc", 4), "abc");
    }
}
