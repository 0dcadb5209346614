// Filesystem helpers
// (c) 2024 Ross Younger

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

/// Indentation used for every JSON file we write
const JSON_INDENT: &[u8] = b"    ";

/// Renders a value as pretty-printed JSON with four-space indentation
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut ser = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(JSON_INDENT));
    value.serialize(&mut ser)?;
    Ok(out)
}

/// Writes a value as pretty-printed JSON, replacing any existing file of the same name
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let data = to_pretty_json(value)?;
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

/// Expands a leading `~` in a configured path
pub fn expand_path(path: &str) -> anyhow::Result<PathBuf> {
    expanduser::expanduser(path).with_context(|| format!("expanding path {path:?}"))
}

/// Creates a directory (and parents). An existing directory is not an error.
pub async fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("creating directory {}", path.display()))
}

/// The local hostname, as used to label result directories
#[must_use]
pub fn hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}
