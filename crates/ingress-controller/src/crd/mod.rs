pub mod edges;
pub mod gateway;
pub mod ngrok;

pub use edges::{HTTPSEdge, HTTPSEdgeCrd, HTTPSEdgeRoute, Tunnel, TunnelCrd};
pub use gateway::{Gateway, GatewayClass, HTTPRoute, ReferenceGrant};
pub use ngrok::{
    AgentEndpoint, AgentEndpointCrd, CloudEndpoint, CloudEndpointCrd, NgrokTrafficPolicy,
    NgrokTrafficPolicyCrd,
};

/// Free-form JSON object kept as is by the API server.
pub fn preserve_unknown_fields(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    serde_json::from_value(serde_json::json!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true,
    }))
    .unwrap_or(schemars::schema::Schema::Bool(true))
}
