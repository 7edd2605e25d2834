//! Stateless format helpers shared by readers, writers, and the kernel.
//!
//! - [`excel`]: workbook access, raw cell grids, header detection, cleaning, type sniffing, and
//!   schema validation
//! - [`parquet`]: table ↔ Parquet conversion and file inspection

pub mod excel;
pub mod parquet;
