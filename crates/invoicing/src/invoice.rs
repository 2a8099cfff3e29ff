use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use stockbook_inventory::{MovementStatus, MovementType};

use crate::money::format_minor;

#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("no invoice for a {0} movement")]
    NotAvailable(&'static str),

    #[error("invoice amount overflow on line {line_no}")]
    Overflow { line_no: u32 },

    #[error("html rendering failed: {0}")]
    Html(#[from] askama::Error),

    #[error("pdf rendering failed: {0}")]
    Pdf(String),
}

/// Issuer printed in the invoice header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Company {
    pub name: String,
    pub address: Option<String>,
    pub currency: String,
}

/// Counterparty (supplier for incoming, customer for outgoing).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvoiceParty {
    pub name: String,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub tax_id: Option<String>,
}

/// One movement line joined with its product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceSourceLine {
    pub line_no: u32,
    pub product_reference: String,
    pub product_name: String,
    pub quantity_in_base_unit: u64,
    pub entered_quantity: Decimal,
    pub entered_unit: String,
    /// Price recorded on the movement line, if any.
    pub item_price: Option<u64>,
    /// Fallback when the line has no price.
    pub purchase_price: u64,
}

/// Snapshot of a movement with names resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceSource {
    pub reference: String,
    pub movement_type: MovementType,
    pub status: MovementStatus,
    pub moved_at: DateTime<Utc>,
    pub from_warehouse: Option<String>,
    pub to_warehouse: Option<String>,
    pub party: Option<InvoiceParty>,
    pub notes: Option<String>,
    pub lines: Vec<InvoiceSourceLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceRow {
    pub line_no: u32,
    pub product_reference: String,
    pub product_name: String,
    pub quantity: u64,
    /// Quantity as entered on the form, e.g. `"3 carton"`.
    pub entered: String,
    pub unit_price: u64,
    pub line_total: u64,
    pub unit_price_display: String,
    pub line_total_display: String,
}

/// Rendered-ready invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceDocument {
    pub title: String,
    pub number: String,
    pub proforma: bool,
    pub date: String,
    pub company: Company,
    pub party_label: String,
    pub party: Option<InvoiceParty>,
    pub from_warehouse: Option<String>,
    pub to_warehouse: Option<String>,
    pub notes: Option<String>,
    pub rows: Vec<InvoiceRow>,
    pub total: u64,
    pub total_display: String,
}

impl InvoiceDocument {
    /// Suggested download name, e.g. `invoice-IN-20240101-0001.pdf`.
    pub fn file_name(&self) -> String {
        let safe: String = self
            .number
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("invoice-{safe}.pdf")
    }
}

/// Build the invoice for a movement.
///
/// One row per line in line order; `line_total = quantity × unit_price` where
/// the unit price falls back to the product purchase price. Draft movements
/// produce a proforma, cancelled ones have no invoice.
pub fn build_invoice(source: &InvoiceSource, company: &Company) -> Result<InvoiceDocument, InvoiceError> {
    let proforma = match source.status {
        MovementStatus::Completed => false,
        MovementStatus::Draft => true,
        MovementStatus::Cancelled => return Err(InvoiceError::NotAvailable("cancelled")),
    };

    let mut lines: Vec<&InvoiceSourceLine> = source.lines.iter().collect();
    lines.sort_by_key(|l| l.line_no);

    let currency = company.currency.as_str();
    let mut total: u64 = 0;
    let mut rows = Vec::with_capacity(lines.len());
    for line in lines {
        let unit_price = line.item_price.unwrap_or(line.purchase_price);
        let line_total = line
            .quantity_in_base_unit
            .checked_mul(unit_price)
            .ok_or(InvoiceError::Overflow { line_no: line.line_no })?;
        total = total
            .checked_add(line_total)
            .ok_or(InvoiceError::Overflow { line_no: line.line_no })?;

        rows.push(InvoiceRow {
            line_no: line.line_no,
            product_reference: line.product_reference.clone(),
            product_name: line.product_name.clone(),
            quantity: line.quantity_in_base_unit,
            entered: format!("{} {}", line.entered_quantity.normalize(), line.entered_unit),
            unit_price,
            line_total,
            unit_price_display: format_minor(unit_price, currency),
            line_total_display: format_minor(line_total, currency),
        });
    }

    let (title, party_label) = match source.movement_type {
        MovementType::In => ("Purchase invoice", "Supplier"),
        MovementType::Out => ("Sales invoice", "Customer"),
        MovementType::Transfer => ("Transfer note", ""),
    };
    let title = if proforma {
        format!("Proforma {}", title.to_lowercase())
    } else {
        title.to_string()
    };

    Ok(InvoiceDocument {
        title,
        number: source.reference.clone(),
        proforma,
        date: source.moved_at.format("%Y-%m-%d").to_string(),
        company: company.clone(),
        party_label: party_label.to_string(),
        party: source.party.clone(),
        from_warehouse: source.from_warehouse.clone(),
        to_warehouse: source.to_warehouse.clone(),
        notes: source.notes.clone(),
        rows,
        total,
        total_display: format_minor(total, currency),
    })
}
