use crate::crd::gateway::HTTPBackendRef;
use crate::crd::ngrok::GROUP as NGROK_GROUP;
use crate::ir::{Ir, IrDestination, IrService, UpstreamProtocol};
use crate::store::Snapshot;
use k8s_openapi::api::networking::v1::IngressBackend;
use kube::ResourceExt;
use traffic_policy::TrafficPolicy;

pub const TRAFFIC_POLICY_KIND: &str = "NgrokTrafficPolicy";
const SERVICE_KIND: &str = "Service";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortRef {
    Number(i32),
    Name(String),
}

/// Every backend shape either translator can point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendRef {
    Service {
        namespace: String,
        name: String,
        port: Option<PortRef>,
    },
    TrafficPolicy {
        namespace: String,
        name: String,
    },
    Unsupported {
        group: String,
        kind: String,
        name: String,
    },
}

impl BackendRef {
    pub fn from_ingress(namespace: &str, backend: &IngressBackend) -> Self {
        if let Some(service) = &backend.service {
            let port = service.port.as_ref().and_then(|port| {
                port.number
                    .map(PortRef::Number)
                    .or_else(|| port.name.clone().map(PortRef::Name))
            });
            return BackendRef::Service {
                namespace: namespace.to_owned(),
                name: service.name.clone(),
                port,
            };
        }

        match &backend.resource {
            Some(resource) => {
                let group = resource.api_group.clone().unwrap_or_default();
                if group == NGROK_GROUP && resource.kind == TRAFFIC_POLICY_KIND {
                    BackendRef::TrafficPolicy {
                        namespace: namespace.to_owned(),
                        name: resource.name.clone(),
                    }
                } else {
                    BackendRef::Unsupported {
                        group,
                        kind: resource.kind.clone(),
                        name: resource.name.clone(),
                    }
                }
            }
            None => BackendRef::Unsupported {
                group: String::new(),
                kind: String::new(),
                name: String::new(),
            },
        }
    }

    pub fn from_http_route(route_namespace: &str, backend: &HTTPBackendRef) -> Self {
        let group = backend.group.clone().unwrap_or_default();
        let kind = backend
            .kind
            .clone()
            .unwrap_or_else(|| SERVICE_KIND.to_owned());
        let namespace = backend
            .namespace
            .clone()
            .unwrap_or_else(|| route_namespace.to_owned());

        match (group.as_str(), kind.as_str()) {
            ("", SERVICE_KIND) => BackendRef::Service {
                namespace,
                name: backend.name.clone(),
                port: backend.port.map(PortRef::Number),
            },
            (NGROK_GROUP, TRAFFIC_POLICY_KIND) => BackendRef::TrafficPolicy {
                namespace,
                name: backend.name.clone(),
            },
            _ => BackendRef::Unsupported {
                group,
                kind,
                name: backend.name.clone(),
            },
        }
    }

    /// `(group, kind, namespace, name)` of the referenced object, for
    /// reference grant checks.
    pub fn target(&self) -> Option<(&str, &str, &str, &str)> {
        match self {
            BackendRef::Service {
                namespace, name, ..
            } => Some(("", SERVICE_KIND, namespace, name)),
            BackendRef::TrafficPolicy { namespace, name } => {
                Some((NGROK_GROUP, TRAFFIC_POLICY_KIND, namespace, name))
            }
            BackendRef::Unsupported { .. } => None,
        }
    }

    pub fn resolve(&self, snapshot: &Snapshot, ir: &mut Ir) -> Result<IrDestination, String> {
        match self {
            BackendRef::Service {
                namespace,
                name,
                port,
            } => resolve_service(snapshot, ir, namespace, name, port.as_ref())
                .map(IrDestination::Upstream),
            BackendRef::TrafficPolicy { namespace, name } => {
                traffic_policy(snapshot, namespace, name).map(IrDestination::Policy)
            }
            BackendRef::Unsupported { group, kind, name } => Err(format!(
                "unsupported backend kind {kind:?} in group {group:?} ({name})"
            )),
        }
    }
}

/// Loads and parses an `NgrokTrafficPolicy` by name.
pub fn traffic_policy(snapshot: &Snapshot, namespace: &str, name: &str) -> Result<TrafficPolicy, String> {
    let policy = snapshot
        .traffic_policies
        .get(namespace, name)
        .ok_or_else(|| format!("traffic policy {namespace}/{name} not found"))?;
    TrafficPolicy::from_value(policy.spec.policy.clone())
        .map_err(|err| format!("traffic policy {namespace}/{name} is invalid: {err}"))
}

fn scheme_and_protocol(app_protocol: Option<&str>) -> (&'static str, UpstreamProtocol) {
    match app_protocol {
        Some("https") | Some("k8s.ngrok.com/https") => ("https", UpstreamProtocol::Http1),
        Some("k8s.ngrok.com/http2") => ("https", UpstreamProtocol::Http2),
        Some("kubernetes.io/h2c") => ("http", UpstreamProtocol::Http2),
        _ => ("http", UpstreamProtocol::Http1),
    }
}

fn resolve_service(
    snapshot: &Snapshot,
    ir: &mut Ir,
    namespace: &str,
    name: &str,
    port: Option<&PortRef>,
) -> Result<std::sync::Arc<IrService>, String> {
    let service = snapshot
        .services
        .get(namespace, name)
        .ok_or_else(|| format!("service {namespace}/{name} not found"))?;
    let ports = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .map(Vec::as_slice)
        .unwrap_or_default();

    let service_port = match port {
        Some(PortRef::Number(number)) => ports.iter().find(|p| p.port == *number),
        Some(PortRef::Name(port_name)) => ports
            .iter()
            .find(|p| p.name.as_deref() == Some(port_name.as_str())),
        None if ports.len() == 1 => ports.first(),
        None => None,
    }
    .ok_or_else(|| format!("service {namespace}/{name} has no matching port {port:?}"))?;

    let (scheme, protocol) = scheme_and_protocol(service_port.app_protocol.as_deref());
    Ok(ir.upstream(IrService {
        uid: service
            .uid()
            .unwrap_or_else(|| format!("{namespace}/{name}")),
        namespace: namespace.to_owned(),
        name: name.to_owned(),
        port: service_port.port,
        scheme: scheme.to_owned(),
        protocol,
    }))
}
