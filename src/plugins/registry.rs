//! Plugin discovery and first-match selection.
//!
//! Plugins are made discoverable by listing a [`PluginProvider`] in a [`PluginCatalog`]. Each
//! provider has a logical path (`plugins/readers/templates/bom`, ...) and a factory.
//! [`PluginRegistry::discover`] walks its search paths in order and instantiates every provider
//! living under one of them, so search-path order decides selection order.
//!
//! Selection is first-match in registration order: template readers are listed before the
//! generic fallback so their narrower predicates get a chance first.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{XlsReaderError, XlsResult};
use crate::plugins::{Plugin, PluginKind, PluginMetadata, ReaderPlugin, WriterPlugin};

/// Search paths used when the configuration names none.
pub const DEFAULT_SEARCH_PATHS: [&str; 2] = ["plugins/readers", "plugins/writers"];

/// A live plugin from either partition.
#[derive(Clone)]
pub enum PluginInstance {
    /// Reader partition entry.
    Reader(Arc<dyn ReaderPlugin>),
    /// Writer partition entry.
    Writer(Arc<dyn WriterPlugin>),
}

impl PluginInstance {
    /// Partition this instance belongs to.
    pub fn kind(&self) -> PluginKind {
        match self {
            PluginInstance::Reader(_) => PluginKind::Reader,
            PluginInstance::Writer(_) => PluginKind::Writer,
        }
    }

    /// The plugin's metadata.
    pub fn metadata(&self) -> &PluginMetadata {
        match self {
            PluginInstance::Reader(r) => r.metadata(),
            PluginInstance::Writer(w) => w.metadata(),
        }
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("kind", &self.kind())
            .field("name", &self.metadata().name)
            .finish()
    }
}

type Factory = Box<dyn Fn() -> XlsResult<PluginInstance> + Send + Sync>;

/// A discoverable plugin: logical location plus a no-argument constructor.
pub struct PluginProvider {
    path: String,
    type_name: String,
    factory: Factory,
}

impl PluginProvider {
    /// Provider with an arbitrary (possibly failing) factory.
    pub fn new(
        path: impl Into<String>,
        type_name: impl Into<String>,
        factory: impl Fn() -> XlsResult<PluginInstance> + Send + Sync + 'static,
    ) -> Self {
        Self {
            path: normalize_path(&path.into()),
            type_name: type_name.into(),
            factory: Box::new(factory),
        }
    }

    /// Provider constructing `R::default()`.
    pub fn reader<R: ReaderPlugin + Default + 'static>(path: impl Into<String>) -> Self {
        Self::new(path, short_type_name::<R>(), || {
            Ok(PluginInstance::Reader(Arc::new(R::default())))
        })
    }

    /// Provider constructing `W::default()`.
    pub fn writer<W: WriterPlugin + Default + 'static>(path: impl Into<String>) -> Self {
        Self::new(path, short_type_name::<W>(), || {
            Ok(PluginInstance::Writer(Arc::new(W::default())))
        })
    }

    /// Logical location, `/`-separated.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Implementing type, for diagnostics.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Run the factory.
    pub fn instantiate(&self) -> XlsResult<PluginInstance> {
        (self.factory)()
    }
}

impl fmt::Debug for PluginProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginProvider")
            .field("path", &self.path)
            .field("type_name", &self.type_name)
            .finish()
    }
}

fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full).to_string()
}

fn normalize_path(p: &str) -> String {
    let p = p.replace('\\', "/");
    let p = p.trim_start_matches("./").trim_end_matches('/');
    p.to_string()
}

/// Ordered set of providers known at build time.
#[derive(Debug, Default)]
pub struct PluginCatalog {
    providers: Vec<PluginProvider>,
}

impl PluginCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The crate's own readers and writers, template readers ahead of the generic fallback.
    pub fn builtin() -> Self {
        use crate::plugins::readers::{generic, templates};
        use crate::plugins::writers::sqlite;

        Self {
            providers: vec![
                templates::sdm::provider(),
                templates::quotation::provider(),
                templates::bom::provider(),
                templates::sales::provider(),
                generic::provider(),
                sqlite::provider(),
            ],
        }
    }

    /// Append a provider.
    pub fn push(&mut self, provider: PluginProvider) {
        self.providers.push(provider);
    }

    /// Builder-style [`PluginCatalog::push`].
    pub fn with(mut self, provider: PluginProvider) -> Self {
        self.push(provider);
        self
    }

    /// Providers in catalog order.
    pub fn providers(&self) -> &[PluginProvider] {
        &self.providers
    }
}

/// One provider that could not be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFailure {
    /// Provider path.
    pub path: String,
    /// Implementing type.
    pub type_name: String,
    /// What went wrong.
    pub error: String,
}

/// Outcome of a discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Registered plugins, in registration order.
    pub registered: Vec<(PluginKind, String)>,
    /// Providers skipped because construction or validation failed.
    pub failures: Vec<DiscoveryFailure>,
}

/// Two ordered name-keyed partitions of live plugins.
#[derive(Default)]
pub struct PluginRegistry {
    search_paths: Vec<String>,
    readers: Vec<Arc<dyn ReaderPlugin>>,
    writers: Vec<Arc<dyn WriterPlugin>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("search_paths", &self.search_paths)
            .field("readers", &self.reader_names())
            .field("writers", &self.writer_names())
            .finish()
    }
}

impl PluginRegistry {
    /// Empty registry with no search paths.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a search path unless already present.
    pub fn add_search_path(&mut self, path: impl AsRef<str>) {
        let path = normalize_path(path.as_ref());
        if !self.search_paths.contains(&path) {
            self.search_paths.push(path);
        }
    }

    /// Configured search paths, in order.
    pub fn search_paths(&self) -> &[String] {
        &self.search_paths
    }

    /// Register every catalog provider under a search path.
    ///
    /// Search paths are visited in order, providers in catalog order within each. Providers
    /// under hidden (`.`) or cache (`__`) segments are ignored. A provider that fails to
    /// construct or validate is logged and reported; discovery carries on with the rest.
    pub fn discover(&mut self, catalog: &PluginCatalog) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        let mut visited = vec![false; catalog.providers().len()];

        for search_path in self.search_paths.clone() {
            for (idx, provider) in catalog.providers().iter().enumerate() {
                if visited[idx] || !is_under(provider.path(), &search_path) || is_hidden(provider.path()) {
                    continue;
                }
                visited[idx] = true;

                let outcome = provider.instantiate().and_then(|instance| {
                    let entry = (instance.kind(), instance.metadata().name.clone());
                    self.register(instance).map(|()| entry)
                });
                match outcome {
                    Ok(entry) => {
                        debug!(path = provider.path(), kind = %entry.0, name = %entry.1, "discovered plugin");
                        report.registered.push(entry);
                    }
                    Err(e) => {
                        warn!(path = provider.path(), type_name = provider.type_name(), error = %e, "skipping plugin");
                        report.failures.push(DiscoveryFailure {
                            path: provider.path().to_string(),
                            type_name: provider.type_name().to_string(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            readers = self.readers.len(),
            writers = self.writers.len(),
            failures = report.failures.len(),
            "plugin discovery finished"
        );
        report
    }

    /// Register an instance into its partition.
    pub fn register(&mut self, instance: PluginInstance) -> XlsResult<()> {
        match instance {
            PluginInstance::Reader(r) => self.register_reader(r),
            PluginInstance::Writer(w) => self.register_writer(w),
        }
    }

    /// Validate and register a reader. A reader with the same name is replaced in place.
    pub fn register_reader(&mut self, reader: Arc<dyn ReaderPlugin>) -> XlsResult<()> {
        validate_metadata(reader.metadata(), PluginKind::Reader)?;
        upsert(&mut self.readers, reader);
        Ok(())
    }

    /// Validate and register a writer. A writer with the same name is replaced in place.
    pub fn register_writer(&mut self, writer: Arc<dyn WriterPlugin>) -> XlsResult<()> {
        validate_metadata(writer.metadata(), PluginKind::Writer)?;
        upsert(&mut self.writers, writer);
        Ok(())
    }

    /// First reader (registration order) whose predicate accepts `path`.
    pub fn select_reader(&self, path: &Path) -> Option<Arc<dyn ReaderPlugin>> {
        self.readers.iter().find(|r| r.can_handle(path)).cloned()
    }

    /// First writer (registration order) whose predicate accepts `connection_string`.
    pub fn select_writer(&self, connection_string: &str) -> Option<Arc<dyn WriterPlugin>> {
        self.writers
            .iter()
            .find(|w| w.can_handle(connection_string))
            .cloned()
    }

    /// Snapshot of registered readers.
    pub fn list_readers(&self) -> Vec<Arc<dyn ReaderPlugin>> {
        self.readers.clone()
    }

    /// Snapshot of registered writers.
    pub fn list_writers(&self) -> Vec<Arc<dyn WriterPlugin>> {
        self.writers.clone()
    }

    /// Reader names in registration order.
    pub fn reader_names(&self) -> Vec<String> {
        self.readers.iter().map(|r| r.name().to_string()).collect()
    }

    /// Writer names in registration order.
    pub fn writer_names(&self) -> Vec<String> {
        self.writers.iter().map(|w| w.name().to_string()).collect()
    }

    /// Reader by name.
    pub fn get_reader(&self, name: &str) -> Option<Arc<dyn ReaderPlugin>> {
        self.readers.iter().find(|r| r.name() == name).cloned()
    }

    /// Writer by name.
    pub fn get_writer(&self, name: &str) -> Option<Arc<dyn WriterPlugin>> {
        self.writers.iter().find(|w| w.name() == name).cloned()
    }

    /// Plugin by name within one partition.
    pub fn get_by_name(&self, name: &str, kind: PluginKind) -> Option<PluginInstance> {
        match kind {
            PluginKind::Reader => self.get_reader(name).map(PluginInstance::Reader),
            PluginKind::Writer => self.get_writer(name).map(PluginInstance::Writer),
        }
    }

    /// Remove a plugin; returns whether one was removed.
    pub fn unregister(&mut self, name: &str, kind: PluginKind) -> bool {
        let removed = match kind {
            PluginKind::Reader => remove_named(&mut self.readers, name),
            PluginKind::Writer => remove_named(&mut self.writers, name),
        };
        if removed {
            debug!(%kind, name, "unregistered plugin");
        }
        removed
    }
}

fn validate_metadata(meta: &PluginMetadata, kind: PluginKind) -> XlsResult<()> {
    let errors = meta.validate(kind);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(XlsReaderError::PluginValidation {
            plugin: meta.name.clone(),
            errors,
        })
    }
}

fn upsert<P: Plugin + ?Sized>(entries: &mut Vec<Arc<P>>, plugin: Arc<P>) {
    match entries.iter().position(|e| e.name() == plugin.name()) {
        Some(idx) => {
            debug!(name = plugin.name(), "replacing registered plugin");
            entries[idx] = plugin;
        }
        None => entries.push(plugin),
    }
}

fn remove_named<P: Plugin + ?Sized>(entries: &mut Vec<Arc<P>>, name: &str) -> bool {
    let before = entries.len();
    entries.retain(|e| e.name() != name);
    entries.len() != before
}

fn is_under(provider_path: &str, search_path: &str) -> bool {
    provider_path == search_path
        || search_path.is_empty()
        || provider_path
            .strip_prefix(search_path)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn is_hidden(path: &str) -> bool {
    path.split('/')
        .any(|seg| seg.starts_with('.') || seg.starts_with("__"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReaderConfig;
    use crate::types::{SchemaDescriptor, Table};

    struct ExtReader {
        meta: PluginMetadata,
        ext: &'static str,
    }

    impl ExtReader {
        fn new(name: &str, version: &str, ext: &'static str) -> Self {
            Self {
                meta: PluginMetadata {
                    name: name.to_string(),
                    version: version.to_string(),
                    description: String::new(),
                    author: String::new(),
                    kind: PluginKind::Reader,
                    supported_formats: vec![ext.to_string()],
                    configuration_schema: None,
                },
                ext,
            }
        }
    }

    impl Plugin for ExtReader {
        fn metadata(&self) -> &PluginMetadata {
            &self.meta
        }
    }

    impl ReaderPlugin for ExtReader {
        fn can_handle(&self, path: &Path) -> bool {
            path.extension().is_some_and(|e| e == self.ext)
        }

        fn read(&self, _path: &Path, _config: &ReaderConfig) -> XlsResult<Vec<Table>> {
            Ok(Vec::new())
        }

        fn schema(&self) -> SchemaDescriptor {
            SchemaDescriptor::default()
        }
    }

    fn reader_provider(path: &str, name: &'static str, ext: &'static str) -> PluginProvider {
        PluginProvider::new(path, "ExtReader", move || {
            Ok(PluginInstance::Reader(Arc::new(ExtReader::new(name, "1.0.0", ext))))
        })
    }

    #[test]
    fn add_search_path_is_idempotent() {
        let mut reg = PluginRegistry::new();
        reg.add_search_path("plugins/readers");
        reg.add_search_path("./plugins/readers/");
        assert_eq!(reg.search_paths(), ["plugins/readers"]);
    }

    #[test]
    fn discovery_isolates_failing_providers() {
        let catalog = PluginCatalog::new()
            .with(reader_provider("plugins/readers/a", "A", "aaa"))
            .with(PluginProvider::new("plugins/readers/broken", "Broken", || {
                Err(XlsReaderError::PluginLoad {
                    plugin: "Broken".into(),
                    message: "boom".into(),
                })
            }))
            .with(PluginProvider::new("plugins/readers/nameless", "Nameless", || {
                Ok(PluginInstance::Reader(Arc::new(ExtReader::new("", "1.0.0", "x"))))
            }))
            .with(reader_provider("plugins/readers/b", "B", "bbb"));

        let mut reg = PluginRegistry::new();
        reg.add_search_path("plugins/readers");
        let report = reg.discover(&catalog);

        assert_eq!(reg.reader_names(), vec!["A", "B"]);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].type_name, "Broken");
        assert!(report.failures[1].error.contains("name must not be empty"));
    }

    #[test]
    fn discovery_follows_search_path_order_and_skips_hidden() {
        let catalog = PluginCatalog::new()
            .with(reader_provider("plugins/readers/generic", "Generic", "g"))
            .with(reader_provider("plugins/readers/templates/t", "Template", "t"))
            .with(reader_provider("plugins/readers/__cache__/c", "Cached", "c"))
            .with(reader_provider("plugins/readers/.hidden", "Hidden", "h"))
            .with(reader_provider("plugins/readersx/other", "Other", "o"));

        let mut reg = PluginRegistry::new();
        reg.add_search_path("plugins/readers/templates");
        reg.add_search_path("plugins/readers");
        reg.discover(&catalog);

        assert_eq!(reg.reader_names(), vec!["Template", "Generic"]);
    }

    #[test]
    fn same_name_registration_replaces_in_place() {
        let mut reg = PluginRegistry::new();
        reg.register_reader(Arc::new(ExtReader::new("A", "1.0.0", "a"))).unwrap();
        reg.register_reader(Arc::new(ExtReader::new("B", "1.0.0", "b"))).unwrap();
        reg.register_reader(Arc::new(ExtReader::new("A", "2.0.0", "z"))).unwrap();

        assert_eq!(reg.reader_names(), vec!["A", "B"]);
        assert_eq!(reg.get_reader("A").unwrap().metadata().version, "2.0.0");
        assert!(reg.select_reader(Path::new("f.a")).is_none());
        assert_eq!(reg.select_reader(Path::new("f.z")).unwrap().name(), "A");
    }

    #[test]
    fn selection_is_first_match_and_deterministic() {
        let mut reg = PluginRegistry::new();
        reg.register_reader(Arc::new(ExtReader::new("First", "1", "x"))).unwrap();
        reg.register_reader(Arc::new(ExtReader::new("Second", "1", "x"))).unwrap();
        for _ in 0..3 {
            assert_eq!(reg.select_reader(Path::new("f.x")).unwrap().name(), "First");
        }
    }

    #[test]
    fn registering_with_wrong_kind_or_version_fails() {
        let mut reg = PluginRegistry::new();
        let mut bad = ExtReader::new("Bad", "", "x");
        bad.meta.kind = PluginKind::Writer;
        let err = reg.register_reader(Arc::new(bad)).unwrap_err();
        match err {
            XlsReaderError::PluginValidation { plugin, errors } => {
                assert_eq!(plugin, "Bad");
                assert_eq!(errors.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unregister_and_lookup_by_kind() {
        let mut reg = PluginRegistry::new();
        reg.register_reader(Arc::new(ExtReader::new("A", "1", "a"))).unwrap();
        assert!(reg.get_by_name("A", PluginKind::Reader).is_some());
        assert!(reg.get_by_name("A", PluginKind::Writer).is_none());
        assert!(!reg.unregister("A", PluginKind::Writer));
        assert!(reg.unregister("A", PluginKind::Reader));
        assert!(reg.list_readers().is_empty());
    }
}
