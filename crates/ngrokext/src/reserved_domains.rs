use crate::{ApiResponse, Client};
use reqwest::Method;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservedDomain {
    pub id: String,
    pub domain: String,
    #[serde(default)]
    pub cname_target: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: String,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct CreateParams<'a> {
    pub domain: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub description: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub metadata: &'a str,
}

#[allow(async_fn_in_trait)]
pub trait ReservedDomains: Send + Sync {
    async fn create_domain(&self, params: &CreateParams<'_>) -> ApiResponse<ReservedDomain>;
    async fn get_domain(&self, id: &str) -> ApiResponse<ReservedDomain>;
    async fn delete_domain(&self, id: &str) -> ApiResponse<()>;
}

impl ReservedDomains for Client {
    async fn create_domain(&self, params: &CreateParams<'_>) -> ApiResponse<ReservedDomain> {
        self.request(Method::POST, "/reserved_domains", Some(params))
            .await
    }

    async fn get_domain(&self, id: &str) -> ApiResponse<ReservedDomain> {
        self.request::<(), _>(Method::GET, &format!("/reserved_domains/{id}"), None)
            .await
    }

    async fn delete_domain(&self, id: &str) -> ApiResponse<()> {
        self.request_empty(Method::DELETE, &format!("/reserved_domains/{id}"))
            .await
    }
}
