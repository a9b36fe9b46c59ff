//! Kubernetes API server store

use appop_core::{App, ObjectIdentity};
use async_trait::async_trait;
use kube::Client;
use kube::api::{Api, PostParams};
use tracing::debug;

use super::{FIELD_MANAGER, ObjectStore, identity_of};
use crate::diff::ManagedResource;
use crate::error::{KubeError, Result};

/// Store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a store from the default kubeconfig / in-cluster config
    pub async fn new() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Create with an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Get the underlying Kubernetes client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_owner(&self, id: &ObjectIdentity) -> Result<Option<App>> {
        let api: Api<App> = Api::namespaced(self.client.clone(), &id.namespace);
        api.get_opt(&id.name)
            .await
            .map_err(|e| KubeError::from_api("App", id, e))
    }

    async fn update_owner_status(&self, app: &App) -> Result<App> {
        let id = identity_of(app, "App")?;
        let api: Api<App> = Api::namespaced(self.client.clone(), &id.namespace);
        let data = serde_json::to_vec(app)?;

        debug!(app = %id, "replacing App status");
        api.replace_status(&id.name, &Self::post_params(), data)
            .await
            .map_err(|e| KubeError::from_api("App", &id, e))
    }

    async fn get<K: ManagedResource>(&self, id: &ObjectIdentity) -> Result<Option<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), &id.namespace);
        api.get_opt(&id.name)
            .await
            .map_err(|e| KubeError::from_api(&K::kind_name(), id, e))
    }

    async fn create<K: ManagedResource>(&self, obj: &K) -> Result<K> {
        let kind = K::kind_name();
        let id = identity_of(obj, &kind)?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &id.namespace);
        api.create(&Self::post_params(), obj)
            .await
            .map_err(|e| KubeError::from_api(&kind, &id, e))
    }

    async fn update<K: ManagedResource>(&self, obj: &K) -> Result<K> {
        let kind = K::kind_name();
        let id = identity_of(obj, &kind)?;
        let api: Api<K> = Api::namespaced(self.client.clone(), &id.namespace);
        api.replace(&id.name, &Self::post_params(), obj)
            .await
            .map_err(|e| KubeError::from_api(&kind, &id, e))
    }
}
