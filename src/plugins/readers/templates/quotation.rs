//! Quotation cover sheets ("Carátula de Cotización").

use crate::plugins::PluginMetadata;
use crate::plugins::readers::extract::{Category, Extraction, Label, Marker, Scope, Template};
use crate::plugins::registry::PluginProvider;

/// Extracts company, client, quotation, and design-code details from quotation sheets.
#[derive(Debug)]
pub struct QuotationReader {
    meta: PluginMetadata,
    template: Template,
}

const KEYWORDS: &[&str] = &["COTIZACION", "COTIZACIÓN", "QUOTATION"];

impl Default for QuotationReader {
    fn default() -> Self {
        let template = Template {
            document_kind: "quotation",
            file_keywords: KEYWORDS,
            sheet_keywords: KEYWORDS,
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
                    name: "client_info",
                    extraction: Extraction::Markers {
                        label_column: "field_type",
                        value_column: "client_value",
                        markers: vec![Marker::new(&["CLIENTE"], Scope::Neighbors, Label::CellText)],
                    },
                },
                Category {
                    name: "quotation_details",
                    extraction: Extraction::Markers {
                        label_column: "type",
                        value_column: "value",
                        markers: vec![
                            Marker::new(&["FORMATO DE COTIZACIÓN"], Scope::Cell, Label::Fixed("quotation_format")),
                            Marker::new(&["FOLIO"], Scope::Neighbors, Label::Fixed("folio")),
                        ],
                    },
                },
                Category {
                    name: "design_codes",
                    extraction: Extraction::Markers {
                        label_column: "type",
                        value_column: "value",
                        markers: vec![Marker::new(
                            &["CÓDIGO DE DISEÑO", "CODIGO DE DISEÑO"],
                            Scope::Neighbors,
                            Label::Fixed("design_code"),
                        )],
                    },
                },
            ],
        };
        Self {
            meta: super::template_metadata(
                "QuotationReader",
                "Quotation reader for Carátula de Cotización sheets",
                &["company_info", "client_info", "quotation_details", "design_codes"],
            ),
            template,
        }
    }
}

template_reader!(QuotationReader);

/// Discovery entry.
pub fn provider() -> PluginProvider {
    PluginProvider::reader::<QuotationReader>("plugins/readers/templates/quotation")
}
