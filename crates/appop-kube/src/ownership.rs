//! Identity and owner linkage of managed resources
//!
//! A managed resource has exactly the identity of its App: same name, same
//! namespace. It carries a controller owner reference back to the App so the
//! garbage collector removes it once the App is deleted. The reference is
//! stamped when the resource is created and never rewritten afterwards.

use appop_core::{App, BuilderError, ObjectIdentity};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;

/// Identity of every resource managed on behalf of an App
pub fn managed_identity(app: &App) -> Result<ObjectIdentity, BuilderError> {
    let name = app
        .metadata
        .name
        .as_ref()
        .ok_or(BuilderError::MissingOwnerField("name"))?;
    let namespace = app
        .metadata
        .namespace
        .as_ref()
        .ok_or(BuilderError::MissingOwnerField("namespace"))?;
    Ok(ObjectIdentity::new(namespace, name))
}

/// Controller owner reference pointing at an App
pub fn owner_reference(app: &App) -> Result<OwnerReference, BuilderError> {
    let name = app
        .metadata
        .name
        .clone()
        .ok_or(BuilderError::MissingOwnerField("name"))?;
    let uid = app
        .metadata
        .uid
        .clone()
        .ok_or(BuilderError::MissingOwnerField("uid"))?;

    Ok(OwnerReference {
        api_version: App::api_version(&()).into_owned(),
        kind: App::kind(&()).into_owned(),
        name,
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// Metadata of a freshly built managed resource
pub fn managed_metadata(app: &App) -> Result<ObjectMeta, BuilderError> {
    let identity = managed_identity(app)?;
    Ok(ObjectMeta {
        name: Some(identity.name),
        namespace: Some(identity.namespace),
        owner_references: Some(vec![owner_reference(app)?]),
        ..Default::default()
    })
}

/// Whether `meta` carries a controller reference to `app`
pub fn is_owned_by(meta: &ObjectMeta, app: &App) -> bool {
    let Some(uid) = app.metadata.uid.as_deref() else {
        return false;
    };
    meta.owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|r| r.uid == uid && r.controller == Some(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use appop_core::AppSpec;

    fn app() -> App {
        let mut app = App::new("web", AppSpec::default());
        app.metadata.namespace = Some("default".to_string());
        app.metadata.uid = Some("7c1f0d7e-0000-4000-8000-000000000001".to_string());
        app
    }

    #[test]
    fn test_managed_identity_matches_owner() {
        assert_eq!(
            managed_identity(&app()).unwrap(),
            ObjectIdentity::new("default", "web")
        );
    }

    #[test]
    fn test_managed_identity_requires_namespace() {
        let mut app = app();
        app.metadata.namespace = None;
        assert_eq!(
            managed_identity(&app),
            Err(BuilderError::MissingOwnerField("namespace"))
        );
    }

    #[test]
    fn test_owner_reference() {
        let reference = owner_reference(&app()).unwrap();
        assert_eq!(reference.api_version, "app.example.com/v1");
        assert_eq!(reference.kind, "App");
        assert_eq!(reference.name, "web");
        assert_eq!(reference.uid, "7c1f0d7e-0000-4000-8000-000000000001");
        assert_eq!(reference.controller, Some(true));
        assert_eq!(reference.block_owner_deletion, Some(true));
    }

    #[test]
    fn test_owner_reference_requires_uid() {
        let mut app = app();
        app.metadata.uid = None;
        assert_eq!(
            owner_reference(&app),
            Err(BuilderError::MissingOwnerField("uid"))
        );
    }

    #[test]
    fn test_managed_metadata_is_owned() {
        let app = app();
        let meta = managed_metadata(&app).unwrap();
        assert_eq!(meta.name.as_deref(), Some("web"));
        assert_eq!(meta.namespace.as_deref(), Some("default"));
        assert!(is_owned_by(&meta, &app));
    }

    #[test]
    fn test_is_owned_by_other_uid() {
        let meta = managed_metadata(&app()).unwrap();
        let mut other = app();
        other.metadata.uid = Some("another".to_string());
        assert!(!is_owned_by(&meta, &other));
    }
}
