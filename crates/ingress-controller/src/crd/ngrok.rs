use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const GROUP: &str = "ngrok.k8s.ngrok.com";

#[derive(CustomResource, Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "ngrok.k8s.ngrok.com",
    version = "v1alpha1",
    kind = "CloudEndpoint",
    doc = "Publicly reachable ngrok endpoint with an attached traffic policy",
    derive = "PartialEq",
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".spec.url"}"#,
    namespaced
)]
pub struct CloudEndpointCrd {
    pub url: String,
    #[serde(default)]
    pub pooling_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_policy: Option<CloudEndpointTrafficPolicy>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
pub struct CloudEndpointTrafficPolicy {
    #[schemars(schema_with = "crate::crd::preserve_unknown_fields")]
    pub policy: Value,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "ngrok.k8s.ngrok.com",
    version = "v1alpha1",
    kind = "AgentEndpoint",
    doc = "Internal ngrok endpoint forwarding to an in-cluster upstream",
    derive = "PartialEq",
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".spec.url"}"#,
    printcolumn = r#"{"name":"Upstream","type":"string","jsonPath":".spec.upstream.url"}"#,
    namespaced
)]
pub struct AgentEndpointCrd {
    pub url: String,
    pub upstream: EndpointUpstream,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_policy: Option<AgentEndpointTrafficPolicy>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, JsonSchema)]
pub struct EndpointUpstream {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
pub struct AgentEndpointTrafficPolicy {
    #[schemars(schema_with = "crate::crd::preserve_unknown_fields")]
    pub inline: Value,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "ngrok.k8s.ngrok.com",
    version = "v1alpha1",
    kind = "NgrokTrafficPolicy",
    doc = "Reusable traffic policy document referenced by ingresses and routes",
    derive = "PartialEq",
    namespaced
)]
pub struct NgrokTrafficPolicyCrd {
    #[schemars(schema_with = "crate::crd::preserve_unknown_fields")]
    pub policy: Value,
}
