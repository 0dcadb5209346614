#![allow(missing_docs)]

use std::process::Command;

/// Exports `DASHQOE_VERSION_STRING` for `--version`.
///
/// Release builds in CI are tagged `v<version>`; the tag must match Cargo.toml.
/// Anything else is `<version>+g<git hash>`.
fn main() {
    println!("cargo:rerun-if-env-changed=GITHUB_REF_NAME");
    let cargo_version = env!("CARGO_PKG_VERSION");
    let version = match release_tag() {
        Some(tag) => {
            assert_eq!(
                tag.trim_start_matches('v'),
                cargo_version,
                "release tag {tag} does not match the crate version"
            );
            tag
        }
        // No git metadata in a packaged crate
        None => format!(
            "{cargo_version}+g{}",
            git_hash().as_deref().unwrap_or("unknown")
        ),
    };
    println!("cargo:rustc-env=DASHQOE_VERSION_STRING={version}");
}

fn release_tag() -> Option<String> {
    if std::env::var("GITHUB_REF_TYPE").ok()? != "tag" {
        return None;
    }
    std::env::var("GITHUB_REF_NAME").ok()
}

fn git_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    let hash = String::from_utf8(output.stdout).ok()?.trim().to_owned();
    (output.status.success() && !hash.is_empty()).then_some(hash)
}
