use super::annotations::{self, ObjectAnnotations};
use super::backend::BackendRef;
use super::filters::RouteFilter;
use super::hostname::{intersect, is_routable_listener_hostname};
use super::refgrant::{is_permitted, RefEnd};
use super::{keep_first, tls_secret, TranslateConfig};
use crate::crd::gateway::{
    HTTPRouteMatch, HTTPRouteRule, HTTPValueMatch, Listener, ParentReference, GROUP,
};
use crate::crd::{Gateway, HTTPRoute};
use crate::diagnostics::Diagnostics;
use crate::ir::{
    Ir, IrDestination, IrHttpMatch, IrListener, IrRoute, IrTlsTermination, ListenerProtocol,
    OwnerRef, StringMatch, ValueMatch, VirtualHostKey,
};
use crate::store::{ObjectKey, Snapshot};
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};

pub const GATEWAY_KIND: &str = "Gateway";
pub const ROUTE_KIND: &str = "HTTPRoute";

const SECRET_KIND: &str = "Secret";

struct ResolvedListener<'a> {
    listener: &'a Listener,
    hostname: String,
    ir: IrListener,
    tls: Option<IrTlsTermination>,
}

pub(crate) fn translate(
    snapshot: &Snapshot,
    config: &TranslateConfig,
    ir: &mut Ir,
    diagnostics: &mut Diagnostics,
) {
    let classes: BTreeSet<String> = snapshot
        .gateway_classes
        .iter()
        .filter(|class| class.spec.controller_name == config.gateway_controller_name)
        .map(|class| class.name_any())
        .collect();

    let routes = snapshot.http_routes.by_creation();
    let mut compiled: BTreeMap<ObjectKey, Vec<IrRoute>> = BTreeMap::new();

    for gateway in snapshot.gateways.by_creation() {
        if !classes.contains(&gateway.spec.gateway_class_name) {
            continue;
        }
        let gateway_key = ObjectKey::of::<Gateway>(gateway);

        let annotations = match annotations::parse::<Gateway>(gateway, snapshot) {
            Ok(annotations) => annotations,
            Err(message) => {
                diagnostics.push(GATEWAY_KIND, &gateway_key, message);
                continue;
            }
        };
        let listeners = resolve_listeners(gateway, snapshot, &gateway_key, diagnostics);

        for route in &routes {
            let route_key = ObjectKey::of::<HTTPRoute>(route);
            let mut attached = BTreeSet::new();

            for parent in route
                .spec
                .parent_refs
                .iter()
                .filter(|parent| refers_to(parent, &route_key.namespace, &gateway_key))
            {
                for listener in listeners
                    .iter()
                    .filter(|l| selects_listener(parent, l.listener))
                {
                    if !attached.insert(listener.listener.name.as_str()) {
                        continue;
                    }
                    if !route_allowed(snapshot, listener.listener, &gateway_key.namespace, &route_key.namespace) {
                        diagnostics.push(
                            ROUTE_KIND,
                            &route_key,
                            format!(
                                "not allowed to attach to listener {} of gateway {gateway_key}",
                                listener.listener.name
                            ),
                        );
                        continue;
                    }

                    let hostnames = route_hostnames(&route.spec.hostnames, &listener.hostname);
                    if hostnames.is_empty() {
                        diagnostics.push(
                            ROUTE_KIND,
                            &route_key,
                            format!(
                                "no hostname matches listener {} ({})",
                                listener.listener.name, listener.hostname
                            ),
                        );
                        continue;
                    }

                    if !compiled.contains_key(&route_key) {
                        let rules = compile_rules(route, &route_key, snapshot, ir, diagnostics);
                        compiled.insert(route_key.clone(), rules);
                    }
                    let rules = compiled.get(&route_key).cloned().unwrap_or_default();

                    for hostname in hostnames {
                        let target = Attachment {
                            gateway,
                            gateway_key: &gateway_key,
                            route_key: &route_key,
                            annotations: &annotations,
                            listener,
                        };
                        attach(target, hostname, &rules, config, ir, diagnostics);
                    }
                }
            }
        }
    }
}

fn refers_to(parent: &ParentReference, route_namespace: &str, gateway: &ObjectKey) -> bool {
    parent.group.as_deref().unwrap_or(GROUP) == GROUP
        && parent.kind.as_deref().unwrap_or(GATEWAY_KIND) == GATEWAY_KIND
        && parent.namespace.as_deref().unwrap_or(route_namespace) == gateway.namespace
        && parent.name == gateway.name
}

fn selects_listener(parent: &ParentReference, listener: &Listener) -> bool {
    parent
        .section_name
        .as_ref()
        .map_or(true, |section| section == &listener.name)
        && parent.port.map_or(true, |port| port == listener.port)
}

fn route_allowed(
    snapshot: &Snapshot,
    listener: &Listener,
    gateway_namespace: &str,
    route_namespace: &str,
) -> bool {
    let namespaces = listener
        .allowed_routes
        .as_ref()
        .and_then(|allowed| allowed.namespaces.as_ref());

    match namespaces.and_then(|n| n.from.as_deref()).unwrap_or("Same") {
        "All" => true,
        "Selector" => {
            let Some(selector) = namespaces.and_then(|n| n.selector.as_ref()) else {
                return false;
            };
            let Some(namespace) = snapshot.namespaces.get("", route_namespace) else {
                return false;
            };
            let labels = namespace.labels();
            selector
                .match_labels
                .iter()
                .all(|(key, value)| labels.get(key) == Some(value))
        }
        _ => gateway_namespace == route_namespace,
    }
}

fn route_hostnames(route_hostnames: &[String], listener_hostname: &str) -> Vec<String> {
    if route_hostnames.is_empty() {
        return vec![listener_hostname.to_owned()];
    }
    let hostnames: BTreeSet<String> = route_hostnames
        .iter()
        .filter_map(|hostname| intersect(listener_hostname, hostname))
        .collect();
    hostnames.into_iter().collect()
}

fn resolve_listeners<'a>(
    gateway: &'a Gateway,
    snapshot: &Snapshot,
    key: &ObjectKey,
    diagnostics: &mut Diagnostics,
) -> Vec<ResolvedListener<'a>> {
    let mut resolved = Vec::new();
    for listener in &gateway.spec.listeners {
        if !is_routable_listener_hostname(listener.hostname.as_deref()) {
            diagnostics.push(
                GATEWAY_KIND,
                key,
                format!(
                    "listener {}: hostname must be set and must not be `*`",
                    listener.name
                ),
            );
            continue;
        }

        let protocol = match listener.protocol.as_str() {
            "HTTP" => ListenerProtocol::Http,
            "HTTPS" => ListenerProtocol::Https,
            other => {
                diagnostics.push(
                    GATEWAY_KIND,
                    key,
                    format!("listener {}: unsupported protocol {other}", listener.name),
                );
                continue;
            }
        };

        let tls = match protocol {
            ListenerProtocol::Https => match listener_tls(snapshot, listener, &key.namespace) {
                Ok(tls) => Some(tls),
                Err(message) => {
                    diagnostics.push(
                        GATEWAY_KIND,
                        key,
                        format!("listener {}: {message}", listener.name),
                    );
                    continue;
                }
            },
            ListenerProtocol::Http => None,
        };

        resolved.push(ResolvedListener {
            listener,
            hostname: listener
                .hostname
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase(),
            ir: IrListener {
                port: listener.port,
                protocol,
            },
            tls,
        });
    }
    resolved
}

fn listener_tls(
    snapshot: &Snapshot,
    listener: &Listener,
    gateway_namespace: &str,
) -> Result<IrTlsTermination, String> {
    let tls = listener
        .tls
        .as_ref()
        .ok_or("HTTPS listener without tls configuration")?;
    if let Some(mode) = tls.mode.as_deref().filter(|mode| *mode != "Terminate") {
        return Err(format!("tls mode {mode} is not supported"));
    }
    let cert = tls
        .certificate_refs
        .first()
        .ok_or("HTTPS listener without certificateRefs")?;

    let group = cert.group.as_deref().unwrap_or_default();
    let kind = cert.kind.as_deref().unwrap_or(SECRET_KIND);
    if !group.is_empty() || kind != SECRET_KIND {
        return Err(format!("certificate reference kind {group}/{kind} is not supported"));
    }

    let namespace = cert.namespace.as_deref().unwrap_or(gateway_namespace);
    let permitted = is_permitted(
        snapshot,
        RefEnd {
            group: GROUP,
            kind: GATEWAY_KIND,
            namespace: gateway_namespace,
        },
        RefEnd {
            group: "",
            kind: SECRET_KIND,
            namespace,
        },
        &cert.name,
    );
    if !permitted {
        return Err(format!(
            "certificate {namespace}/{} is not permitted by any ReferenceGrant",
            cert.name
        ));
    }
    tls_secret(snapshot, namespace, &cert.name)
}

fn value_match(kind: &str, value: &HTTPValueMatch) -> Result<ValueMatch, String> {
    let matched = match value.type_.as_deref().unwrap_or("Exact") {
        "Exact" => StringMatch::Exact(value.value.clone()),
        "RegularExpression" => StringMatch::Regex(value.value.clone()),
        other => return Err(format!("unsupported {kind} match type {other}")),
    };
    Ok(ValueMatch {
        name: value.name.clone(),
        value: matched,
    })
}

fn route_match(m: &HTTPRouteMatch) -> Result<IrHttpMatch, String> {
    let (path_type, path) = match &m.path {
        Some(path) => (
            path.type_.as_deref().unwrap_or("PathPrefix"),
            path.value.clone().unwrap_or_else(|| "/".to_owned()),
        ),
        None => ("PathPrefix", "/".to_owned()),
    };

    let mut matcher = match path_type {
        "Exact" => IrHttpMatch::exact(path),
        "PathPrefix" => IrHttpMatch::prefix(path),
        "RegularExpression" => IrHttpMatch::regex(path),
        other => return Err(format!("unsupported path match type {other}")),
    };
    for header in &m.headers {
        matcher = matcher.with_header(value_match("header", header)?);
    }
    for param in &m.query_params {
        matcher = matcher.with_query_param(value_match("query parameter", param)?);
    }
    if let Some(method) = &m.method {
        matcher = matcher.with_method(method.to_ascii_uppercase());
    }
    Ok(matcher)
}

fn compile_rules(
    route: &HTTPRoute,
    key: &ObjectKey,
    snapshot: &Snapshot,
    ir: &mut Ir,
    diagnostics: &mut Diagnostics,
) -> Vec<IrRoute> {
    let mut compiled = Vec::new();
    for (index, rule) in route.spec.rules.iter().enumerate() {
        match compile_rule(rule, key, snapshot, ir, diagnostics) {
            Ok(routes) => compiled.extend(routes),
            Err(message) => diagnostics.push(ROUTE_KIND, key, format!("rule {index}: {message}")),
        }
    }
    compiled
}

fn compile_rule(
    rule: &HTTPRouteRule,
    key: &ObjectKey,
    snapshot: &Snapshot,
    ir: &mut Ir,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<IrRoute>, String> {
    let filters: Vec<RouteFilter> = rule
        .filters
        .iter()
        .map(|filter| RouteFilter::from_http_route(&key.namespace, filter))
        .collect();
    if let Some(RouteFilter::Unsupported(kind)) = filters
        .iter()
        .find(|filter| matches!(filter, RouteFilter::Unsupported(_)))
    {
        return Err(format!("unsupported filter {kind}"));
    }

    let backends: Vec<_> = rule
        .backend_refs
        .iter()
        .filter(|backend| backend.weight != Some(0))
        .collect();
    if backends.len() > 1 {
        diagnostics.push(
            ROUTE_KIND,
            key,
            "traffic splitting is not supported, only the first weighted backend is used",
        );
    }

    let destination = match backends.first() {
        Some(backend) => {
            let backend = BackendRef::from_http_route(&key.namespace, backend);
            if let Some((group, kind, namespace, name)) = backend.target() {
                let from = RefEnd {
                    group: GROUP,
                    kind: ROUTE_KIND,
                    namespace: &key.namespace,
                };
                if !is_permitted(snapshot, from, RefEnd { group, kind, namespace }, name) {
                    return Err(format!(
                        "backend {namespace}/{name} is not permitted by any ReferenceGrant"
                    ));
                }
            }
            Some(backend.resolve(snapshot, ir)?)
        }
        None => None,
    };

    let matchers = if rule.matches.is_empty() {
        vec![IrHttpMatch::prefix("/")]
    } else {
        rule.matches
            .iter()
            .map(route_match)
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut routes = Vec::with_capacity(matchers.len());
    for matcher in matchers {
        let mut policies = Vec::new();
        let mut redirect = None;
        for filter in &filters {
            let policy = filter.to_policy(snapshot, &matcher)?;
            if filter.is_redirect() && destination.is_none() {
                redirect = Some(policy);
            } else {
                policies.push(policy);
            }
        }

        let destination = match (&destination, redirect) {
            (Some(destination), _) => destination.clone(),
            (None, Some(redirect)) => IrDestination::Policy(redirect),
            (None, None) => return Err("rule has no usable backend".to_owned()),
        };
        routes.push(IrRoute {
            matcher,
            policies,
            destination,
        });
    }
    Ok(routes)
}

struct Attachment<'a> {
    gateway: &'a Gateway,
    gateway_key: &'a ObjectKey,
    route_key: &'a ObjectKey,
    annotations: &'a ObjectAnnotations,
    listener: &'a ResolvedListener<'a>,
}

fn attach(
    target: Attachment<'_>,
    hostname: String,
    rules: &[IrRoute],
    config: &TranslateConfig,
    ir: &mut Ir,
    diagnostics: &mut Diagnostics,
) {
    let Attachment {
        gateway,
        gateway_key,
        route_key,
        annotations,
        listener,
    } = target;

    if let Err(owner_namespace) = ir.claim_hostname(&hostname, &gateway_key.namespace) {
        diagnostics.push(
            GATEWAY_KIND,
            gateway_key,
            format!("hostname {hostname} is already used in namespace {owner_namespace}"),
        );
        return;
    }

    let key = VirtualHostKey {
        hostname: hostname.clone(),
        listener: Some(listener.ir),
    };
    let (vhost, created) = ir.virtual_host(key, &gateway_key.namespace);
    if created {
        vhost.mapping_strategy = annotations
            .mapping_strategy
            .unwrap_or(config.default_mapping_strategy);
        if let Some(infrastructure) = &gateway.spec.infrastructure {
            vhost.labels = infrastructure.labels.clone();
            vhost.annotations = infrastructure.annotations.clone();
        }
    }
    vhost.add_owner(OwnerRef {
        kind: GATEWAY_KIND,
        key: gateway_key.clone(),
    });
    vhost.add_owner(OwnerRef {
        kind: ROUTE_KIND,
        key: route_key.clone(),
    });

    let conflicts = [
        (
            "traffic policy",
            keep_first(&mut vhost.traffic_policy, annotations.traffic_policy.clone()),
        ),
        (
            "pooling setting",
            keep_first(&mut vhost.pooling_enabled, annotations.pooling_enabled),
        ),
        (
            "tls certificate",
            keep_first(&mut vhost.tls_termination, listener.tls.clone()),
        ),
    ];
    for (what, conflict) in conflicts {
        if conflict {
            diagnostics.push(
                GATEWAY_KIND,
                gateway_key,
                format!("host {hostname}: conflicting {what} ignored"),
            );
        }
    }

    for route in rules {
        if let Err(route) = vhost.add_route(route.clone()) {
            diagnostics.push(
                ROUTE_KIND,
                route_key,
                format!(
                    "host {hostname}: duplicate match for path {} ignored",
                    route.matcher.path
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::gateway::{
        AllowedRoutes, HTTPBackendRef, HTTPPathMatch, HTTPRouteFilter, HTTPRequestRedirectFilter,
        LabelSelector, ListenerTls, ReferenceGrantFrom, ReferenceGrantSpec, ReferenceGrantTo,
        RouteNamespaces, SecretObjectReference,
    };
    use crate::crd::ReferenceGrant;
    use crate::ir::PathType;
    use crate::testutil::{
        gateway, gateway_class, http_route, namespace, service, tls_secret as secret,
    };
    use crate::translate::translate;

    const CONTROLLER: &str = "ngrok.com/gateway-controller";

    fn config() -> TranslateConfig {
        TranslateConfig {
            enable_gateway_api: true,
            ..TranslateConfig::default()
        }
    }

    fn listener(name: &str, hostname: Option<&str>, port: i32, protocol: &str) -> Listener {
        Listener {
            name: name.into(),
            hostname: hostname.map(str::to_owned),
            port,
            protocol: protocol.into(),
            ..Listener::default()
        }
    }

    fn backend(name: &str, port: i32) -> HTTPBackendRef {
        HTTPBackendRef {
            name: name.into(),
            port: Some(port),
            ..HTTPBackendRef::default()
        }
    }

    fn rule(path: &str, backends: Vec<HTTPBackendRef>) -> HTTPRouteRule {
        HTTPRouteRule {
            matches: vec![HTTPRouteMatch {
                path: Some(HTTPPathMatch {
                    type_: Some("PathPrefix".into()),
                    value: Some(path.into()),
                }),
                ..HTTPRouteMatch::default()
            }],
            filters: Vec::new(),
            backend_refs: backends,
        }
    }

    fn base_snapshot(listeners: Vec<Listener>) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.gateway_classes.insert(gateway_class("ngrok", CONTROLLER));
        snapshot.gateway_classes.insert(gateway_class("other", "example.com/gateway"));
        snapshot.gateways.insert(gateway("default", "gw", "ngrok", listeners));
        for ns in ["default", "apps"] {
            snapshot.services.insert(service(ns, "web", &[("http", 80, None)]));
            snapshot.namespaces.insert(namespace(ns, &[("team", ns)]));
        }
        snapshot
    }

    fn hosts(ir: &Ir) -> Vec<(String, i32)> {
        ir.virtual_hosts()
            .map(|v| {
                (
                    v.key.hostname.clone(),
                    v.key.listener.map(|l| l.port).unwrap_or_default(),
                )
            })
            .collect()
    }

    #[test]
    fn catch_all_listeners_are_rejected() {
        let mut snapshot = base_snapshot(vec![
            listener("any", Some("*"), 80, "HTTP"),
            listener("none", None, 8080, "HTTP"),
            listener("web", Some("*.example.com"), 80, "HTTP"),
        ]);
        snapshot.http_routes.insert(
            http_route("default", "web", "gw")
                .hostnames(&["a.example.com"])
                .rule(rule("/", vec![backend("web", 80)]))
                .build(),
        );

        let translation = translate(&snapshot, &config());
        assert_eq!(hosts(&translation.ir), vec![("a.example.com".into(), 80)]);
        assert_eq!(
            translation
                .diagnostics
                .for_object(GATEWAY_KIND, &ObjectKey::new("default", "gw"))
                .count(),
            2
        );
    }

    #[test]
    fn route_without_hostnames_inherits_listener() {
        let mut snapshot = base_snapshot(vec![listener("web", Some("a.example.com"), 8080, "HTTP")]);
        snapshot.http_routes.insert(
            http_route("default", "web", "gw")
                .rule(rule("/", vec![backend("web", 80)]))
                .build(),
        );

        let translation = translate(&snapshot, &config());
        assert_eq!(hosts(&translation.ir), vec![("a.example.com".into(), 8080)]);
    }

    #[test]
    fn section_name_narrows_listeners() {
        let mut snapshot = base_snapshot(vec![
            listener("a", Some("a.example.com"), 80, "HTTP"),
            listener("b", Some("b.example.com"), 80, "HTTP"),
        ]);
        snapshot.http_routes.insert(
            http_route("default", "web", "gw")
                .section("b")
                .rule(rule("/", vec![backend("web", 80)]))
                .build(),
        );

        let translation = translate(&snapshot, &config());
        assert_eq!(hosts(&translation.ir), vec![("b.example.com".into(), 80)]);
    }

    #[test]
    fn cross_namespace_backend_needs_a_grant() {
        let mut listener = listener("web", Some("*.example.com"), 80, "HTTP");
        listener.allowed_routes = Some(AllowedRoutes {
            namespaces: Some(RouteNamespaces {
                from: Some("All".into()),
                selector: None,
            }),
        });
        let mut snapshot = base_snapshot(vec![listener]);

        let mut remote = backend("web", 80);
        remote.namespace = Some("apps".into());
        snapshot.http_routes.insert(
            http_route("default", "web", "gw")
                .hostnames(&["a.example.com"])
                .rule(rule("/remote", vec![remote]))
                .rule(rule("/local", vec![backend("web", 80)]))
                .build(),
        );

        let translation = translate(&snapshot, &config());
        let vhost = translation.ir.virtual_hosts().next().unwrap();
        assert_eq!(vhost.routes.len(), 1);
        assert_eq!(vhost.routes[0].matcher.path, "/local");
        assert_eq!(translation.diagnostics.len(), 1);

        let mut grant = ReferenceGrant::new(
            "from-default",
            ReferenceGrantSpec {
                from: vec![ReferenceGrantFrom {
                    group: GROUP.into(),
                    kind: ROUTE_KIND.into(),
                    namespace: "default".into(),
                }],
                to: vec![ReferenceGrantTo {
                    group: "".into(),
                    kind: "Service".into(),
                    name: None,
                }],
            },
        );
        grant.metadata.namespace = Some("apps".into());
        snapshot.reference_grants.insert(grant);

        let translation = translate(&snapshot, &config());
        let vhost = translation.ir.virtual_hosts().next().unwrap();
        assert_eq!(vhost.routes.len(), 2);
        assert!(translation.diagnostics.is_empty());
    }

    #[test]
    fn allowed_routes_selector_checks_namespace_labels() {
        let mut listener = listener("web", Some("*.example.com"), 80, "HTTP");
        listener.allowed_routes = Some(AllowedRoutes {
            namespaces: Some(RouteNamespaces {
                from: Some("Selector".into()),
                selector: Some(LabelSelector {
                    match_labels: [("team".to_owned(), "apps".to_owned())].into(),
                }),
            }),
        });
        let mut snapshot = base_snapshot(vec![listener]);
        snapshot.http_routes.insert(
            http_route("apps", "allowed", "gw")
                .parent_namespace("default")
                .hostnames(&["a.example.com"])
                .rule(rule("/", vec![backend("web", 80)]))
                .build(),
        );
        snapshot.http_routes.insert(
            http_route("default", "denied", "gw")
                .hostnames(&["b.example.com"])
                .rule(rule("/", vec![backend("web", 80)]))
                .build(),
        );

        let translation = translate(&snapshot, &config());
        assert_eq!(hosts(&translation.ir), vec![("a.example.com".into(), 80)]);
        assert_eq!(
            translation
                .diagnostics
                .for_object(ROUTE_KIND, &ObjectKey::new("default", "denied"))
                .count(),
            1
        );
    }

    #[test]
    fn https_listener_terminates_tls() {
        let mut https = listener("tls", Some("a.example.com"), 443, "HTTPS");
        https.tls = Some(ListenerTls {
            mode: None,
            certificate_refs: vec![SecretObjectReference {
                name: "a-cert".into(),
                ..SecretObjectReference::default()
            }],
        });
        let mut missing = listener("missing", Some("b.example.com"), 443, "HTTPS");
        missing.tls = Some(ListenerTls {
            mode: None,
            certificate_refs: vec![SecretObjectReference {
                name: "b-cert".into(),
                namespace: Some("apps".into()),
                ..SecretObjectReference::default()
            }],
        });
        let mut snapshot = base_snapshot(vec![https, missing]);
        snapshot.secrets.insert(secret("default", "a-cert"));
        snapshot.secrets.insert(secret("apps", "b-cert"));
        snapshot.http_routes.insert(
            http_route("default", "web", "gw")
                .rule(rule("/", vec![backend("web", 80)]))
                .build(),
        );

        let translation = translate(&snapshot, &config());
        let vhosts: Vec<_> = translation.ir.virtual_hosts().collect();
        assert_eq!(vhosts.len(), 1);
        assert!(vhosts[0].tls_termination.is_some());
        // b-cert lives in another namespace without a grant
        assert_eq!(translation.diagnostics.len(), 1);
    }

    #[test]
    fn redirect_only_rule_becomes_policy_destination() {
        let mut snapshot = base_snapshot(vec![listener("web", Some("a.example.com"), 80, "HTTP")]);
        let mut redirect = rule("/old", Vec::new());
        redirect.filters.push(HTTPRouteFilter {
            type_: "RequestRedirect".into(),
            request_redirect: Some(HTTPRequestRedirectFilter {
                scheme: Some("https".into()),
                status_code: Some(301),
                ..HTTPRequestRedirectFilter::default()
            }),
            ..HTTPRouteFilter::default()
        });
        let mut regex = rule("/", vec![backend("web", 80)]);
        regex.matches[0].path = Some(HTTPPathMatch {
            type_: Some("RegularExpression".into()),
            value: Some("^/v[0-9]+".into()),
        });
        snapshot.http_routes.insert(
            http_route("default", "web", "gw")
                .rule(redirect)
                .rule(regex)
                .rule(rule("/none", Vec::new()))
                .build(),
        );

        let translation = translate(&snapshot, &config());
        let vhost = translation.ir.virtual_hosts().next().unwrap();
        assert_eq!(vhost.routes.len(), 2);
        assert!(matches!(
            vhost.routes[0].destination,
            IrDestination::Policy(ref p) if p.on_http_request.len() == 1
        ));
        assert_eq!(vhost.routes[1].matcher.path_type, PathType::Regex);
        // the rule without backends or redirect
        assert_eq!(translation.diagnostics.len(), 1);
    }

    #[test]
    fn foreign_gateway_classes_are_ignored() {
        let mut snapshot = base_snapshot(vec![]);
        snapshot.gateways.insert(gateway(
            "default",
            "theirs",
            "other",
            vec![listener("web", Some("a.example.com"), 80, "HTTP")],
        ));
        snapshot.http_routes.insert(
            http_route("default", "web", "theirs")
                .rule(rule("/", vec![backend("web", 80)]))
                .build(),
        );

        let translation = translate(&snapshot, &config());
        assert_eq!(translation.ir.virtual_hosts().count(), 0);
    }
}
