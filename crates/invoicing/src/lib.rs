//! Invoices for stock movements.
//!
//! An [`InvoiceDocument`] is built from a movement snapshot plus catalog and
//! party lookups, then rendered as HTML (preview) or PDF (download). Nothing
//! here is persisted: invoices are always derived from the current movement.

pub mod html;
pub mod invoice;
pub mod money;
pub mod pdf;

pub use html::render_html;
pub use invoice::{
    build_invoice, Company, InvoiceDocument, InvoiceError, InvoiceParty, InvoiceRow,
    InvoiceSource, InvoiceSourceLine,
};
pub use money::format_minor;
pub use pdf::render_pdf;
