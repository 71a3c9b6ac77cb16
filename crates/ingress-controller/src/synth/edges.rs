use super::{description, diagnose, endpoint_key, naming, object_meta, DesiredState, SynthConfig};
use crate::crd::edges::{TunnelBackend, TunnelGroupBackend, MATCH_TYPE_EXACT, MATCH_TYPE_PREFIX};
use crate::crd::{HTTPSEdge, HTTPSEdgeCrd, HTTPSEdgeRoute, Tunnel, TunnelCrd};
use crate::diagnostics::Diagnostics;
use crate::ir::{IrDestination, IrService, IrVirtualHost, PathType, UpstreamProtocol};
use crate::labels::{TUNNEL_NAMESPACE_LABEL, TUNNEL_PORT_LABEL, TUNNEL_SERVICE_LABEL};
use crate::store::ObjectKey;
use std::collections::BTreeMap;
use traffic_policy::{merge_all, TrafficPolicy};

const EDGE_PORT: i32 = 443;

pub(super) fn synthesize(
    vhost: &IrVirtualHost,
    config: &SynthConfig,
    desired: &mut DesiredState,
    diagnostics: &mut Diagnostics,
) {
    let Some((name, key)) = endpoint_key(&desired.edges, vhost, diagnostics) else {
        return;
    };
    if vhost.tls_termination.is_some() {
        diagnose(
            vhost,
            diagnostics,
            "tls secrets are not used with the edges mapping strategy",
        );
    }

    let mut routes = Vec::new();
    for route in &vhost.routes {
        let match_type = match route.matcher.path_type {
            PathType::Exact => MATCH_TYPE_EXACT,
            PathType::Prefix => MATCH_TYPE_PREFIX,
            PathType::Regex => {
                diagnose(
                    vhost,
                    diagnostics,
                    &format!("regex path {} is not supported by edges", route.matcher.path),
                );
                continue;
            }
        };
        if !route.matcher.is_path_only() {
            diagnose(
                vhost,
                diagnostics,
                &format!(
                    "path {} matches on headers, query or method, which edges do not support",
                    route.matcher.path
                ),
            );
            continue;
        }
        routes.push(edge_route(
            vhost,
            match_type,
            &route.matcher.path,
            &route.policies,
            &route.destination,
            config,
            desired,
        ));
    }

    let has_root = routes
        .iter()
        .any(|r| r.match_type == MATCH_TYPE_PREFIX && r.match_ == "/");
    if let Some(destination) = &vhost.default_destination {
        if !has_root {
            routes.push(edge_route(
                vhost,
                MATCH_TYPE_PREFIX,
                "/",
                &[],
                destination,
                config,
                desired,
            ));
        }
    }

    let mut edge = HTTPSEdge::new(
        &name,
        HTTPSEdgeCrd {
            hostports: vec![format!("{}:{EDGE_PORT}", vhost.key.hostname)],
            routes,
            description: description(vhost),
        },
    );
    edge.metadata = object_meta(&name, &vhost.namespace, config, Some(vhost));
    desired.edges.insert(key, edge);
}

fn edge_route(
    vhost: &IrVirtualHost,
    match_type: &str,
    path: &str,
    fragments: &[TrafficPolicy],
    destination: &IrDestination,
    config: &SynthConfig,
    desired: &mut DesiredState,
) -> HTTPSEdgeRoute {
    let mut policies: Vec<&TrafficPolicy> = vhost.traffic_policy.iter().collect();
    policies.extend(fragments);

    let backend = match destination {
        IrDestination::Upstream(service) => Some(TunnelGroupBackend {
            labels: tunnel(service, config, desired),
        }),
        IrDestination::Policy(policy) => {
            policies.push(policy);
            None
        }
    };

    HTTPSEdgeRoute {
        match_type: match_type.to_owned(),
        match_: path.to_owned(),
        backend,
        policy: merge_all(policies).map(|policy| policy.to_persisted()),
    }
}

fn tunnel_labels(service: &IrService) -> BTreeMap<String, String> {
    BTreeMap::from([
        (TUNNEL_NAMESPACE_LABEL.to_owned(), service.namespace.clone()),
        (TUNNEL_SERVICE_LABEL.to_owned(), service.name.clone()),
        (TUNNEL_PORT_LABEL.to_owned(), service.port.to_string()),
    ])
}

/// Registers the tunnel for `service` and returns the labels edges select
/// it by.
fn tunnel(
    service: &IrService,
    config: &SynthConfig,
    desired: &mut DesiredState,
) -> BTreeMap<String, String> {
    let labels = tunnel_labels(service);
    let name = naming::upstream_name(service);

    desired
        .tunnels
        .entry(ObjectKey::new(&service.namespace, &name))
        .or_insert_with(|| {
            let mut tunnel = Tunnel::new(
                &name,
                TunnelCrd {
                    forwards_to: naming::forwards_to(service, &config.cluster_domain),
                    labels: labels.clone(),
                    backend: TunnelBackend {
                        protocol: Some(service.scheme.to_ascii_uppercase()),
                    },
                    app_protocol: match service.protocol {
                        UpstreamProtocol::Http2 => Some(service.protocol.as_str().to_owned()),
                        UpstreamProtocol::Http1 => None,
                    },
                },
            );
            tunnel.metadata = object_meta(&name, &service.namespace, config, None);
            tunnel
        });
    labels
}

#[cfg(test)]
mod tests {
    use crate::diagnostics::Diagnostics;
    use crate::ir::MappingStrategy;
    use crate::labels::{MAPPING_STRATEGY_ANNOTATION, TUNNEL_SERVICE_LABEL};
    use crate::store::{ObjectKey, Snapshot};
    use crate::synth::{synthesize, SynthConfig};
    use crate::testutil::{ingress, ingress_class, service, traffic_policy};
    use crate::translate::{translate, TranslateConfig};
    use serde_json::json;

    fn snapshot() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot
            .ingress_classes
            .insert(ingress_class("ngrok", "k8s.ngrok.com/ingress-controller", true));
        snapshot.services.insert(service("default", "web", &[("http", 80, None)]));
        snapshot.services.insert(service("default", "h2c", &[("grpc", 50051, Some("kubernetes.io/h2c"))]));
        snapshot
    }

    #[test]
    fn edges_route_to_labeled_tunnels() {
        let mut snapshot = snapshot();
        snapshot.ingresses.insert(
            ingress("default", "web")
                .annotate(MAPPING_STRATEGY_ANNOTATION, "edges")
                .default_backend("web", 80)
                .rule("a.example.com", "/grpc", "Prefix", "h2c", 50051)
                .rule("a.example.com", "/healthz", "Exact", "web", 80)
                .build(),
        );

        let translation = translate(&snapshot, &TranslateConfig::default());
        let mut diagnostics = translation.diagnostics;
        let desired = synthesize(&translation.ir, &SynthConfig::default(), &mut diagnostics);
        assert!(diagnostics.is_empty());
        assert!(desired.cloud_endpoints.is_empty());
        assert_eq!(desired.domains.len(), 1);

        let edge = &desired.edges[&ObjectKey::new("default", "a.example.com")];
        assert_eq!(edge.spec.hostports, vec!["a.example.com:443"]);
        let routes: Vec<_> = edge
            .spec
            .routes
            .iter()
            .map(|r| (r.match_type.as_str(), r.match_.as_str()))
            .collect();
        assert_eq!(
            routes,
            vec![("exact_path", "/healthz"), ("path_prefix", "/grpc"), ("path_prefix", "/")]
        );

        assert_eq!(desired.tunnels.len(), 2);
        let h2c = desired
            .tunnels
            .values()
            .find(|t| t.spec.labels[TUNNEL_SERVICE_LABEL] == "h2c")
            .unwrap();
        assert_eq!(h2c.spec.forwards_to, "h2c.default.svc.cluster.local:50051");
        assert_eq!(h2c.spec.backend.protocol.as_deref(), Some("HTTP"));
        assert_eq!(h2c.spec.app_protocol.as_deref(), Some("http2"));
        assert_eq!(
            edge.spec.routes[1].backend.as_ref().map(|b| &b.labels),
            Some(&h2c.spec.labels)
        );
    }

    #[test]
    fn host_policy_is_attached_to_every_route() {
        let mut snapshot = snapshot();
        snapshot.traffic_policies.insert(traffic_policy(
            "default",
            "auth",
            json!({"on_http_request": [{"actions": [{"type": "basic-auth"}]}]}),
        ));
        snapshot.ingresses.insert(
            ingress("default", "web")
                .annotate(MAPPING_STRATEGY_ANNOTATION, "edges")
                .annotate(crate::labels::TRAFFIC_POLICY_ANNOTATION, "auth")
                .rule("a.example.com", "/a", "Prefix", "web", 80)
                .rule("a.example.com", "/b", "Prefix", "web", 80)
                .build(),
        );

        let translation = translate(&snapshot, &TranslateConfig::default());
        assert_eq!(
            translation.ir.virtual_hosts().next().unwrap().mapping_strategy,
            MappingStrategy::Edges
        );
        let desired = synthesize(&translation.ir, &SynthConfig::default(), &mut Diagnostics::default());
        let edge = desired.edges.values().next().unwrap();
        for route in &edge.spec.routes {
            assert_eq!(
                route.policy.as_ref().unwrap()["on_http_request"][0]["actions"][0]["type"],
                "basic-auth"
            );
        }
        assert_eq!(desired.tunnels.len(), 1);
    }
}
