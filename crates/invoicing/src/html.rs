use askama::Template;

use crate::{InvoiceDocument, InvoiceError, InvoiceRow};

/// HTML preview of an invoice (`templates/invoice.html`).
#[derive(Template)]
#[template(path = "invoice.html")]
struct InvoiceTemplate<'a> {
    doc: &'a InvoiceDocument,
    rows: &'a [InvoiceRow],
    company_lines: Vec<String>,
    party_lines: Vec<String>,
    route: String,
    notes: String,
}

fn party_lines(doc: &InvoiceDocument) -> Vec<String> {
    let Some(party) = &doc.party else {
        return Vec::new();
    };
    let mut lines = vec![party.name.clone()];
    lines.extend(party.address.clone());
    lines.extend(party.phone.clone());
    lines.extend(party.email.clone());
    if let Some(tax_id) = &party.tax_id {
        lines.push(format!("Tax ID: {tax_id}"));
    }
    lines
}

/// Warehouse routing line, e.g. `"Main depot -> Annex"`.
pub(crate) fn route_line(doc: &InvoiceDocument) -> String {
    match (&doc.from_warehouse, &doc.to_warehouse) {
        (Some(from), Some(to)) => format!("{from} -> {to}"),
        (Some(from), None) => format!("From {from}"),
        (None, Some(to)) => format!("To {to}"),
        (None, None) => String::new(),
    }
}

pub fn render_html(doc: &InvoiceDocument) -> Result<String, InvoiceError> {
    let mut company_lines = vec![doc.company.name.clone()];
    company_lines.extend(doc.company.address.clone());

    let template = InvoiceTemplate {
        doc,
        rows: &doc.rows,
        company_lines,
        party_lines: party_lines(doc),
        route: route_line(doc),
        notes: doc.notes.clone().unwrap_or_default(),
    };
    Ok(template.render()?)
}
