//! Built-in readers.
//!
//! - [`generic::GenericExcelReader`]: any spreadsheet, one table per sheet
//! - [`templates`]: keyword-driven readers for known document families (BOM, quotation, sales
//!   report, SDM), built on [`extract`]

pub mod extract;
pub mod generic;
pub mod templates;

pub use generic::GenericExcelReader;
pub use templates::{BOMReader, QuotationReader, SDMReader, SalesReportReader};
