//! CLI commands

pub mod crd;
pub mod diff;
pub mod render;
pub mod run;

use appop_core::App;
use std::path::Path;

use crate::error::Result;

/// Namespace used when neither the manifest nor `--namespace` names one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Stand-in owner uid for Apps that were never stored in a cluster
pub const PLACEHOLDER_UID: &str = "00000000-0000-0000-0000-000000000000";

/// Load an App manifest for offline commands
///
/// Offline Apps carry no server-assigned metadata, so a missing namespace
/// and uid are filled in.
pub fn load_app(path: &Path, namespace: Option<&str>) -> Result<App> {
    let mut app = App::load(path)?;

    if let Some(ns) = namespace {
        app.metadata.namespace = Some(ns.to_string());
    } else if app.metadata.namespace.is_none() {
        app.metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
    }
    if app.metadata.uid.is_none() {
        app.metadata.uid = Some(PLACEHOLDER_UID.to_string());
    }

    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn manifest(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_app_fills_offline_metadata() {
        let file = manifest(
            "apiVersion: app.example.com/v1\nkind: App\nmetadata:\n  name: web\nspec:\n  image: nginx:1.0\n",
        );
        let app = load_app(file.path(), None).unwrap();
        assert_eq!(app.metadata.namespace.as_deref(), Some(DEFAULT_NAMESPACE));
        assert_eq!(app.metadata.uid.as_deref(), Some(PLACEHOLDER_UID));
    }

    #[test]
    fn test_load_app_namespace_override() {
        let file = manifest(
            "apiVersion: app.example.com/v1\nkind: App\nmetadata:\n  name: web\n  namespace: prod\n  uid: abc\nspec:\n  image: nginx:1.0\n",
        );
        let app = load_app(file.path(), Some("staging")).unwrap();
        assert_eq!(app.metadata.namespace.as_deref(), Some("staging"));
        assert_eq!(app.metadata.uid.as_deref(), Some("abc"));
    }
}
