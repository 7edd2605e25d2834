//! Sales reports ("Hoja de Ventas" / technical reports).

use crate::plugins::PluginMetadata;
use crate::plugins::readers::extract::{Category, Extraction, Label, Marker, Scope, Template};
use crate::plugins::registry::PluginProvider;

/// Extracts client, project, date, and vendor fields from sales report sheets.
#[derive(Debug)]
pub struct SalesReportReader {
    meta: PluginMetadata,
    template: Template,
}

impl Default for SalesReportReader {
    fn default() -> Self {
        let template = Template {
            document_kind: "sales_report",
            file_keywords: &["VENTAS", "SALES", "INFORME TECNICO", "TECHNICAL REPORT"],
            sheet_keywords: &["VENTAS", "SALES", "INFORME", "REPORT"],
            categories: vec![
                beside("client_info", "field_type", "client_value", &["NOMBRE DEL CLIENTE"]),
                beside("project_info", "field_type", "project_value", &["NOMBRE DEL PROYECTO"]),
                beside(
                    "dates",
                    "date_type",
                    "date_value",
                    &["FECHA REQUERIDA", "FECHA DE SOLICITUD", "FECHA DE COTIZACIÓN"],
                ),
                beside("vendor_info", "field_type", "vendor_value", &["NOMBRE DEL VENDEDOR"]),
            ],
        };
        Self {
            meta: super::template_metadata(
                "SalesReportReader",
                "Sales report reader for Hoja de Ventas sheets",
                &["client_info", "project_info", "dates", "vendor_info"],
            ),
            template,
        }
    }
}

fn beside(
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
            markers: vec![Marker::new(keywords, Scope::Neighbors, Label::CellText)],
        },
    }
}

template_reader!(SalesReportReader);

/// Discovery entry.
pub fn provider() -> PluginProvider {
    PluginProvider::reader::<SalesReportReader>("plugins/readers/templates/sales")
}
