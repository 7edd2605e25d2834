//! SDM specification documents.

use crate::plugins::PluginMetadata;
use crate::plugins::readers::extract::{Category, Extraction, Label, Marker, Scope, Template};
use crate::plugins::registry::PluginProvider;

/// Extracts company, date, and specification rows from SDM sheets.
///
/// Specification rows are everything after the first row (within 20) mentioning `FECHA`.
#[derive(Debug)]
pub struct SDMReader {
    meta: PluginMetadata,
    template: Template,
}

impl Default for SDMReader {
    fn default() -> Self {
        let template = Template {
            document_kind: "sdm",
            file_keywords: &["SDM"],
            sheet_keywords: &["SDM", "13127"],
            categories: vec![
                Category {
                    name: "company_info",
                    extraction: Extraction::Markers {
                        label_column: "type",
                        value_column: "value",
                        markers: vec![
                            Marker::new(&["INDUSTRIAL ACURA"], Scope::Cell, Label::Fixed("company_name"))
                                .within_rows(10),
                        ],
                    },
                },
                Category {
                    name: "dates",
                    extraction: Extraction::Markers {
                        label_column: "date_type",
                        value_column: "date_value",
                        markers: vec![Marker::new(&["FECHA"], Scope::Neighbors, Label::CellText)],
                    },
                },
                Category {
                    name: "specifications",
                    extraction: Extraction::RowsAfterHeader {
                        header_keywords: &["FECHA"],
                        search_rows: 20,
                    },
                },
            ],
        };
        Self {
            meta: super::template_metadata(
                "SDMReader",
                "SDM (specification document) reader for technical specifications",
                &["company_info", "dates", "specifications"],
            ),
            template,
        }
    }
}

template_reader!(SDMReader);

/// Discovery entry.
pub fn provider() -> PluginProvider {
    PluginProvider::reader::<SDMReader>("plugins/readers/templates/sdm")
}
