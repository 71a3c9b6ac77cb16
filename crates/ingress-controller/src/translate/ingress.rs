use super::{annotations, keep_first, tls_secret, TranslateConfig};
use crate::diagnostics::Diagnostics;
use crate::ir::{Ir, IrHttpMatch, IrRoute, IrTlsTermination, OwnerRef, VirtualHostKey};
use crate::labels::{DEFAULT_CLASS_ANNOTATION, INGRESS_CLASS_ANNOTATION};
use crate::store::{ObjectKey, Snapshot};
use crate::translate::backend::BackendRef;
use k8s_openapi::api::networking::v1::{HTTPIngressPath, Ingress, IngressClass, IngressSpec};
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};

pub const KIND: &str = "Ingress";

pub trait IngressClassExt {
    fn controller_name(&self) -> Option<&String>;
    fn is_default_class(&self) -> bool;
}

pub trait IngressExt {
    fn ingress_class_name(&self) -> Option<&String>;
}

impl IngressClassExt for IngressClass {
    fn controller_name(&self) -> Option<&String> {
        self.spec
            .as_ref()
            .and_then(|spec| spec.controller.as_ref())
    }

    fn is_default_class(&self) -> bool {
        self.annotations()
            .get(DEFAULT_CLASS_ANNOTATION)
            .is_some_and(|v| v == "true")
    }
}

impl IngressExt for Ingress {
    fn ingress_class_name(&self) -> Option<&String> {
        self.spec
            .as_ref()
            .and_then(|spec| spec.ingress_class_name.as_ref())
            .or_else(|| self.annotations().get(INGRESS_CLASS_ANNOTATION))
    }
}

/// Ingress classes handled by this controller.
#[derive(Debug, Clone, Default)]
pub struct ManagedClasses {
    names: BTreeSet<String>,
    has_default: bool,
}

impl ManagedClasses {
    pub fn new<'a, I>(classes: I, controller_name: &str) -> Self
    where
        I: IntoIterator<Item = &'a IngressClass>,
    {
        let mut managed = ManagedClasses::default();
        for class in classes {
            if class.controller_name().map(String::as_str) == Some(controller_name) {
                managed.names.insert(class.name_any());
                managed.has_default |= class.is_default_class();
            }
        }
        managed
    }

    pub fn manages(&self, ingress: &Ingress) -> bool {
        match ingress.ingress_class_name() {
            Some(name) => self.names.contains(name),
            None => self.has_default,
        }
    }
}

pub(crate) fn translate(
    snapshot: &Snapshot,
    config: &TranslateConfig,
    ir: &mut Ir,
    diagnostics: &mut Diagnostics,
) {
    let classes = ManagedClasses::new(
        snapshot.ingress_classes.iter().map(|c| &**c),
        &config.ingress_controller_name,
    );

    for ingress in snapshot.ingresses.by_creation() {
        if classes.manages(ingress) {
            translate_ingress(ingress, snapshot, config, ir, diagnostics);
        }
    }
}

fn path_match(path: &HTTPIngressPath) -> IrHttpMatch {
    let value = path
        .path
        .clone()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "/".to_owned());
    match path.path_type.as_str() {
        "Exact" => IrHttpMatch::exact(value),
        // Prefix and ImplementationSpecific
        _ => IrHttpMatch::prefix(value),
    }
}

fn tls_by_host(
    spec: &IngressSpec,
    snapshot: &Snapshot,
    key: &ObjectKey,
    diagnostics: &mut Diagnostics,
) -> BTreeMap<String, IrTlsTermination> {
    let mut by_host = BTreeMap::new();
    for tls in spec.tls.iter().flatten() {
        let Some(secret_name) = tls.secret_name.as_deref() else {
            diagnostics.push(KIND, key, "tls entry without secretName ignored");
            continue;
        };
        match tls_secret(snapshot, &key.namespace, secret_name) {
            Ok(termination) => {
                for host in tls.hosts.iter().flatten() {
                    by_host
                        .entry(host.clone())
                        .or_insert_with(|| termination.clone());
                }
            }
            Err(message) => diagnostics.push(KIND, key, message),
        }
    }
    by_host
}

fn translate_ingress(
    ingress: &Ingress,
    snapshot: &Snapshot,
    config: &TranslateConfig,
    ir: &mut Ir,
    diagnostics: &mut Diagnostics,
) {
    let key = ObjectKey::of(ingress);
    let Some(spec) = ingress.spec.as_ref() else {
        return;
    };

    let annotations = match annotations::parse(ingress, snapshot) {
        Ok(annotations) => annotations,
        Err(message) => {
            diagnostics.push(KIND, &key, message);
            return;
        }
    };

    let mut tls = tls_by_host(spec, snapshot, &key, diagnostics);

    let default_destination = spec.default_backend.as_ref().and_then(|backend| {
        match BackendRef::from_ingress(&key.namespace, backend).resolve(snapshot, ir) {
            Ok(destination) => Some(destination),
            Err(message) => {
                diagnostics.push(KIND, &key, format!("default backend: {message}"));
                None
            }
        }
    });

    let owner = OwnerRef {
        kind: KIND,
        key: key.clone(),
    };

    for rule in spec.rules.iter().flatten() {
        let Some(host) = rule
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
        else {
            continue;
        };

        if let Err(owner_namespace) = ir.claim_hostname(host, &key.namespace) {
            diagnostics.push(
                KIND,
                &key,
                format!("hostname {host} is already used in namespace {owner_namespace}"),
            );
            continue;
        }

        let mut routes = Vec::new();
        for path in rule.http.iter().flat_map(|http| http.paths.iter()) {
            let matcher = path_match(path);
            match BackendRef::from_ingress(&key.namespace, &path.backend).resolve(snapshot, ir) {
                Ok(destination) => routes.push(IrRoute {
                    matcher,
                    policies: Vec::new(),
                    destination,
                }),
                Err(message) => diagnostics.push(
                    KIND,
                    &key,
                    format!("host {host} path {}: {message}", matcher.path),
                ),
            }
        }

        let (vhost, created) = ir.virtual_host(VirtualHostKey::hostname(host), &key.namespace);
        vhost.add_owner(owner.clone());

        if created {
            vhost.mapping_strategy = annotations
                .mapping_strategy
                .unwrap_or(config.default_mapping_strategy);
        } else if annotations
            .mapping_strategy
            .is_some_and(|strategy| strategy != vhost.mapping_strategy)
        {
            diagnostics.push(
                KIND,
                &key,
                format!("host {host}: conflicting mapping strategy ignored"),
            );
        }

        if keep_first(&mut vhost.default_destination, default_destination.clone()) {
            diagnostics.push(
                KIND,
                &key,
                format!("host {host}: conflicting default backend ignored"),
            );
        }
        if keep_first(&mut vhost.traffic_policy, annotations.traffic_policy.clone()) {
            diagnostics.push(
                KIND,
                &key,
                format!("host {host}: conflicting traffic policy ignored"),
            );
        }
        if keep_first(&mut vhost.pooling_enabled, annotations.pooling_enabled) {
            diagnostics.push(
                KIND,
                &key,
                format!("host {host}: conflicting pooling setting ignored"),
            );
        }
        if keep_first(&mut vhost.tls_termination, tls.remove(host)) {
            diagnostics.push(
                KIND,
                &key,
                format!("host {host}: conflicting tls secret ignored"),
            );
        }

        for route in routes {
            if let Err(route) = vhost.add_route(route) {
                diagnostics.push(
                    KIND,
                    &key,
                    format!(
                        "host {host}: duplicate match for path {} ignored",
                        route.matcher.path
                    ),
                );
            }
        }
    }
}
