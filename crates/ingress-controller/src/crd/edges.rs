use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const MATCH_TYPE_EXACT: &str = "exact_path";
pub const MATCH_TYPE_PREFIX: &str = "path_prefix";

#[derive(CustomResource, Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "ingress.k8s.ngrok.com",
    version = "v1alpha1",
    kind = "HTTPSEdge",
    plural = "httpsedges",
    doc = "Legacy ngrok HTTPS edge routing requests to labeled tunnels",
    derive = "PartialEq",
    namespaced
)]
pub struct HTTPSEdgeCrd {
    pub hostports: Vec<String>,
    #[serde(default)]
    pub routes: Vec<HTTPSEdgeRoute>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPSEdgeRoute {
    pub match_type: String,
    #[serde(rename = "match")]
    pub match_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<TunnelGroupBackend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::crd::preserve_unknown_fields")]
    pub policy: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default, JsonSchema)]
pub struct TunnelGroupBackend {
    pub labels: BTreeMap<String, String>,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "ingress.k8s.ngrok.com",
    version = "v1alpha1",
    kind = "Tunnel",
    doc = "Legacy ngrok tunnel forwarding labeled edge traffic to a service",
    derive = "PartialEq",
    printcolumn = r#"{"name":"ForwardsTo","type":"string","jsonPath":".spec.forwardsTo"}"#,
    namespaced
)]
pub struct TunnelCrd {
    pub forwards_to: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub backend: TunnelBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_protocol: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default, JsonSchema)]
pub struct TunnelBackend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}
