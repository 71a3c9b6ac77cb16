use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Create/update/delete/list access to one namespaced resource kind.
#[async_trait]
pub trait ResourceClient<K>: Send + Sync {
    /// Lists objects in every namespace matching a label selector.
    async fn list(&self, selector: &str) -> Result<Vec<K>, kube::Error>;
    async fn create(&self, obj: &K) -> Result<K, kube::Error>;
    async fn update(&self, obj: &K) -> Result<K, kube::Error>;
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;
}

/// Whether `err` is an API server response with the given status code.
pub fn is_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == code)
}

#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    pub fn new(client: Client) -> Self {
        KubeResourceClient { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl<K> ResourceClient<K> for KubeResourceClient
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    async fn list(&self, selector: &str) -> Result<Vec<K>, kube::Error> {
        let api: Api<K> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default().labels(selector)).await?;
        Ok(list.items)
    }

    async fn create(&self, obj: &K) -> Result<K, kube::Error> {
        let namespace = obj.namespace().unwrap_or_default();
        self.namespaced::<K>(&namespace)
            .create(&PostParams::default(), obj)
            .await
    }

    async fn update(&self, obj: &K) -> Result<K, kube::Error> {
        let namespace = obj.namespace().unwrap_or_default();
        self.namespaced::<K>(&namespace)
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        self.namespaced::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
    }
}
