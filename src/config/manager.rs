//! Layered configuration sources
// (c) 2024 Ross Younger

use std::{
    collections::BTreeSet,
    fmt::{self, Display},
    path::{Path, PathBuf},
};

use figment::{
    providers::{Format as _, Serialized, Toml},
    value::{Dict, Map, Value},
    Figment, Metadata, Profile, Provider,
};
use serde::Deserialize;
use struct_field_names_as_array::FieldNamesAsSlice;
use tabled::{settings::style::Style, Table, Tabled};
use tracing::{debug, warn};

use super::{Configuration, BASE_CONFIG_FILENAME};

/// The configuration files [`Manager::new`] looks for, lowest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StandardFile {
    System,
    User,
}

impl StandardFile {
    const ALL: [StandardFile; 2] = [StandardFile::System, StandardFile::User];

    fn path(self) -> Option<PathBuf> {
        match self {
            StandardFile::System => Some(Path::new("/etc").join(BASE_CONFIG_FILENAME)),
            StandardFile::User => {
                let home = dirs::home_dir();
                if home.is_none() {
                    warn!("could not determine home directory; skipping user configuration");
                }
                home.map(|h| h.join(format!(".{BASE_CONFIG_FILENAME}")))
            }
        }
    }
}

/// The hard-wired defaults, labelled as such in `--show-config`
#[derive(Debug, Clone, Copy)]
struct Defaults;

impl Provider for Defaults {
    fn metadata(&self) -> Metadata {
        Metadata::named("default")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        Serialized::defaults(Configuration::default()).data()
    }
}

/// Gathers configuration from every source.
///
/// Each merge takes priority over what came before. [`Manager::new`] starts from the
/// defaults and the standard files; the CLI then merges any `--config` file and the
/// options given on the command line.
#[derive(Debug)]
pub struct Manager {
    figment: Figment,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    /// Defaults plus whichever standard configuration files exist
    #[must_use]
    pub fn new() -> Self {
        let mut manager = Self::without_files();
        for path in StandardFile::ALL.into_iter().filter_map(StandardFile::path) {
            if path.is_file() {
                debug!("reading {}", path.display());
                // An unparseable file fuses the figment; the error surfaces from get()
                manager.merge_toml_file(path);
            }
        }
        manager
    }

    /// Defaults only. Mostly useful for testing.
    #[must_use]
    pub fn without_files() -> Self {
        Self {
            figment: Figment::from(Defaults),
        }
    }

    /// Paths of the standard configuration files, whether or not they exist
    #[must_use]
    pub fn config_files() -> Vec<String> {
        StandardFile::ALL
            .into_iter()
            .filter_map(StandardFile::path)
            .map(|p| p.display().to_string())
            .collect()
    }

    /// Merges any figment provider over the current data
    pub fn merge_provider<T: Provider>(&mut self, provider: T) {
        self.figment = std::mem::take(&mut self.figment).merge(provider);
    }

    /// Merges a TOML file, which must exist
    pub fn merge_toml_file<P: AsRef<Path>>(&mut self, path: P) {
        self.merge_provider(Toml::file_exact(path.as_ref()));
    }

    /// Extracts the merged result
    pub fn get<'de, T: Deserialize<'de>>(&self) -> Result<T, figment::Error> {
        self.figment.extract()
    }

    fn keys(&self) -> BTreeSet<String> {
        let Ok(data) = self.figment.data() else {
            return BTreeSet::new();
        };
        data.values().flat_map(|dict| dict.keys().cloned()).collect()
    }

    /// Keys found in some source which `T` has no field for
    #[must_use]
    pub fn unrecognised_fields<T: FieldNamesAsSlice>(&self) -> Vec<String> {
        self.keys()
            .into_iter()
            .filter(|k| !T::FIELD_NAMES_AS_SLICE.contains(&k.as_str()))
            .collect()
    }

    /// A table of `T`'s fields with their values and where each came from
    #[must_use]
    pub fn to_display_adapter<T: FieldNamesAsSlice>(&self) -> DisplayAdapter<'_> {
        DisplayAdapter {
            manager: self,
            fields: T::FIELD_NAMES_AS_SLICE,
        }
    }
}

#[derive(Tabled)]
struct Row {
    field: &'static str,
    value: String,
    source: String,
}

fn render_value(value: &Value) -> String {
    match value.deserialize::<serde_json::Value>() {
        Ok(serde_json::Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(e) => format!("<{e}>"),
    }
}

fn render_source(meta: &Metadata) -> String {
    meta.source
        .as_ref()
        .map_or_else(|| meta.name.to_string(), ToString::to_string)
}

/// Displays the merged configuration as a table
#[derive(Debug)]
pub struct DisplayAdapter<'a> {
    manager: &'a Manager,
    fields: &'static [&'static str],
}

impl Display for DisplayAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let figment = &self.manager.figment;
        if let Err(e) = figment.data() {
            return write!(f, "error: {e}");
        }
        let rows: Vec<Row> = self
            .fields
            .iter()
            .filter_map(|&field| {
                let value = figment.find_value(field).ok()?;
                Some(Row {
                    field,
                    source: figment
                        .find_metadata(field)
                        .map(render_source)
                        .unwrap_or_default(),
                    value: render_value(&value),
                })
            })
            .collect();
        write!(f, "{}", Table::new(rows).with(Style::sharp()))
    }
}

#[cfg(test)]
mod test {
    use assertables::assert_contains;
    use figment::providers::Serialized;

    use super::render_value;
    use crate::config::{Configuration, Configuration_Optional, Manager};
    use crate::util::{make_test_tempfile, ByteQuantity};

    #[test]
    fn defaults() {
        let mgr = Manager::without_files();
        let result: Configuration = mgr.get().unwrap();
        assert_eq!(result, Configuration::default());
    }

    #[test]
    fn cli_overrides_file() {
        let (path, _tempdir) = make_test_tempfile(
            r#"
            remote_host = "lab@file-host"
            server_port = 5544
            careful_resume_cwnd = "800k"
            ssh_options = ["-i", "/dev/null"]
        "#,
            "test.toml",
        );
        let cli = Configuration_Optional {
            remote_host: Some("lab@cli-host".into()),
            ..Default::default()
        };
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(path);
        mgr.merge_provider(cli);
        let result: Configuration = mgr.get().unwrap();
        assert_eq!(result.remote_host, "lab@cli-host");
        assert_eq!(result.server_port, 5544);
        assert_eq!(result.careful_resume_cwnd, ByteQuantity::new(800_000));
        assert_eq!(result.ssh_options, vec!["-i", "/dev/null"]);
        assert_eq!(result.page_path, "/player.html");
    }

    #[test]
    fn positional_destination_wins() {
        let cli = Configuration_Optional {
            dest_server: Some("from-option:1".into()),
            ..Default::default()
        };
        let mut mgr = Manager::without_files();
        mgr.merge_provider(cli);
        mgr.merge_provider(Serialized::global("dest_server", "positional:2"));
        let result: Configuration = mgr.get().unwrap();
        assert_eq!(result.dest_server, "positional:2");
    }

    #[test]
    fn unparseable_toml() {
        let (path, _tempdir) = make_test_tempfile(
            r"
            a = 1
            server_port 123 # syntax error
        ",
            "test.toml",
        );
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(path);
        assert!(mgr.get::<Configuration>().is_err());
    }

    #[test]
    fn type_error() {
        let (path, _tempdir) = make_test_tempfile(
            r#"
            server_port = "not a port"
        "#,
            "test.toml",
        );
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(path);
        let err = mgr.get::<Configuration>().unwrap_err();
        assert_contains!(err.to_string(), "server_port");
    }

    #[test]
    fn display_and_unrecognised() {
        let (path, _tempdir) = make_test_tempfile(
            r#"
            session_wait = 30
            sesion_wait = 31
        "#,
            "test.toml",
        );
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(&path);
        mgr.merge_provider(Configuration_Optional {
            remote_host: Some("lab@box".into()),
            ..Default::default()
        });
        assert_eq!(mgr.unrecognised_fields::<Configuration>(), vec!["sesion_wait"]);
        let shown = mgr.to_display_adapter::<Configuration>().to_string();
        assert_contains!(shown, "session_wait");
        assert_contains!(shown, "test.toml");
        assert_contains!(shown, "command-line");
        assert!(!shown.contains("sesion_wait"));
    }

    #[test]
    fn values_render_plainly() {
        use figment::value::Value;
        assert_eq!(render_value(&Value::from("abc")), "abc");
        assert_eq!(render_value(&Value::from(42u16)), "42");
        assert_eq!(
            render_value(&Value::from(vec!["-i".to_string(), "k".to_string()])),
            r#"["-i","k"]"#
        );
    }
}
