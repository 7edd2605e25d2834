//! Template readers for known document families.
//!
//! Each reader wraps an [`extract::Template`](super::extract::Template) and only contributes its
//! metadata, keywords, and categories.

use serde_json::json;

use crate::plugins::{PluginKind, PluginMetadata};

/// Implements [`Plugin`](crate::plugins::Plugin) and
/// [`ReaderPlugin`](crate::plugins::ReaderPlugin) for a struct with `meta: PluginMetadata` and
/// `template: Template` fields.
macro_rules! template_reader {
    ($ty:ty) => {
        impl $crate::plugins::Plugin for $ty {
            fn metadata(&self) -> &$crate::plugins::PluginMetadata {
                &self.meta
            }
        }

        impl $crate::plugins::ReaderPlugin for $ty {
            fn can_handle(&self, path: &std::path::Path) -> bool {
                self.template.matches(path)
            }

            fn read(
                &self,
                path: &std::path::Path,
                config: &$crate::config::ReaderConfig,
            ) -> $crate::error::XlsResult<Vec<$crate::types::Table>> {
                self.template.read(path, config)
            }

            fn schema(&self) -> $crate::types::SchemaDescriptor {
                self.template.schema()
            }
        }
    };
}

pub mod bom;
pub mod quotation;
pub mod sales;
pub mod sdm;

pub use bom::BOMReader;
pub use quotation::QuotationReader;
pub use sales::SalesReportReader;
pub use sdm::SDMReader;

pub(crate) const AUTHOR: &str = "XLS Reader Team";

/// Metadata shared by the template readers; the configuration schema lists one boolean toggle
/// per category under `categories`.
pub(crate) fn template_metadata(name: &str, description: &str, categories: &[&str]) -> PluginMetadata {
    let toggles: serde_json::Map<String, serde_json::Value> = categories
        .iter()
        .map(|c| (c.to_string(), json!({"type": "boolean", "default": true})))
        .collect();
    PluginMetadata {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        description: description.to_string(),
        author: AUTHOR.to_string(),
        kind: PluginKind::Reader,
        supported_formats: vec!["xlsx".to_string(), "xls".to_string()],
        configuration_schema: Some(json!({
            "type": "object",
            "properties": {
                "sheet_names": {"type": "array"},
                "categories": {"type": "object", "properties": toggles}
            }
        })),
    }
}
