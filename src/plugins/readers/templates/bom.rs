//! Bill of materials documents.

use crate::plugins::PluginMetadata;
use crate::plugins::readers::extract::{Category, Extraction, Label, Marker, Scope, Template};
use crate::plugins::registry::PluginProvider;

/// Extracts materials, quantities, descriptions, and part numbers from BOM sheets.
///
/// Matches files named like `BOM`/`BILL OF MATERIAL`/`LISTA DE MATERIALES`, or workbooks with
/// a sheet named like `BOM`/`MATERIAL`/`MATERIALES`.
#[derive(Debug)]
pub struct BOMReader {
    meta: PluginMetadata,
    template: Template,
}

impl Default for BOMReader {
    fn default() -> Self {
        let template = Template {
            document_kind: "bom",
            file_keywords: &["BOM", "BILL OF MATERIAL", "LISTA DE MATERIALES"],
            sheet_keywords: &["BOM", "MATERIAL", "MATERIALES"],
            categories: vec![
                Category {
                    name: "materials",
                    extraction: Extraction::RowsAfterHeader {
                        header_keywords: &["PART NUMBER", "PARTIDA"],
                        search_rows: 20,
                    },
                },
                below("quantities", "quantity_type", "quantity_value", &["CANTIDAD", "QTY", "QUANTITY"]),
                below(
                    "descriptions",
                    "description_type",
                    "description_value",
                    &["DESCRIPCIÓN", "DESCRIPTION", "DESCRIPCION"],
                ),
                below(
                    "part_numbers",
                    "part_number_type",
                    "part_number_value",
                    &["PART NUMBER", "NO. DE PARTIDA"],
                ),
            ],
        };
        Self {
            meta: super::template_metadata(
                "BOMReader",
                "BOM (Bill of Materials) reader for material lists",
                &["materials", "quantities", "descriptions", "part_numbers"],
            ),
            template,
        }
    }
}

fn below(
    name: &'static str,
    label_column: &'static str,
    value_column: &'static str,
    keywords: &'static [&'static str],
) -> Category {
    Category {
        name,
        extraction: Extraction::Markers {
            label_column,
            value_column,
            markers: vec![Marker::new(keywords, Scope::Below, Label::CellText)],
        },
    }
}

template_reader!(BOMReader);

/// Discovery entry.
pub fn provider() -> PluginProvider {
    PluginProvider::reader::<BOMReader>("plugins/readers/templates/bom")
}
