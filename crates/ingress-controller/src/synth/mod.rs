//! Synthesis of the output resources a compiled [`Ir`] calls for.
//!
//! Virtual hosts using [`MappingStrategy::Endpoints`] become a CloudEndpoint
//! plus one AgentEndpoint per upstream; [`MappingStrategy::Edges`] hosts
//! become an HTTPSEdge plus one Tunnel per upstream. Every public hostname
//! also gets a Domain.

use crate::crd::{AgentEndpoint, CloudEndpoint, HTTPSEdge, Tunnel};
use crate::diagnostics::Diagnostics;
use crate::ir::{Ir, IrVirtualHost, MappingStrategy};
use crate::labels::Ownership;
use crate::store::ObjectKey;
use domain_controller::crd::{Domain, DomainCrd, ReclaimPolicy};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

mod edges;
mod endpoints;
pub mod expressions;
pub mod naming;

pub const DEFAULT_CLUSTER_DOMAIN: &str = "svc.cluster.local";

const INTERNAL_SUFFIX: &str = ".internal";

#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub cluster_domain: String,
    pub default_domain_reclaim_policy: ReclaimPolicy,
    pub ownership: Ownership,
}

impl Default for SynthConfig {
    fn default() -> Self {
        SynthConfig {
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_owned(),
            default_domain_reclaim_policy: ReclaimPolicy::default(),
            ownership: Ownership::new("ngrok-ingress-controller", "ngrok-operator"),
        }
    }
}

/// Everything one pass wants to exist, keyed by `namespace/name`.
#[derive(Debug, Clone, Default)]
pub struct DesiredState {
    pub domains: BTreeMap<ObjectKey, Domain>,
    pub tunnels: BTreeMap<ObjectKey, Tunnel>,
    pub edges: BTreeMap<ObjectKey, HTTPSEdge>,
    pub agent_endpoints: BTreeMap<ObjectKey, AgentEndpoint>,
    pub cloud_endpoints: BTreeMap<ObjectKey, CloudEndpoint>,
}

pub fn synthesize(ir: &Ir, config: &SynthConfig, diagnostics: &mut Diagnostics) -> DesiredState {
    let mut desired = DesiredState::default();
    for vhost in ir.virtual_hosts() {
        match vhost.mapping_strategy {
            MappingStrategy::Endpoints => {
                endpoints::synthesize(vhost, config, &mut desired, diagnostics)
            }
            MappingStrategy::Edges => edges::synthesize(vhost, config, &mut desired, diagnostics),
        }
        domain(vhost, config, &mut desired, diagnostics);
    }
    desired
}

/// Name and key of the endpoint `vhost` produces, unless an earlier virtual
/// host in the same namespace already produced one under that name.
fn endpoint_key<T>(
    produced: &BTreeMap<ObjectKey, T>,
    vhost: &IrVirtualHost,
    diagnostics: &mut Diagnostics,
) -> Option<(String, ObjectKey)> {
    let name = naming::endpoint_name(&vhost.key);
    let key = ObjectKey::new(&vhost.namespace, &name);
    if produced.contains_key(&key) {
        diagnose(
            vhost,
            diagnostics,
            &format!("endpoint {key} is already produced for another listener, skipping"),
        );
        return None;
    }
    Some((name, key))
}

fn domain(
    vhost: &IrVirtualHost,
    config: &SynthConfig,
    desired: &mut DesiredState,
    diagnostics: &mut Diagnostics,
) {
    let hostname = &vhost.key.hostname;
    if hostname.ends_with(INTERNAL_SUFFIX) {
        return;
    }
    let name = naming::domain_name(hostname);
    let key = ObjectKey::new(&vhost.namespace, &name);
    if let Some(existing) = desired.domains.get(&key) {
        if &existing.spec.domain != hostname {
            diagnose(
                vhost,
                diagnostics,
                &format!("domain {key} is already used for {}", existing.spec.domain),
            );
        }
        return;
    }
    let mut domain = Domain::new(
        &name,
        DomainCrd {
            domain: hostname.clone(),
            reclaim_policy: config.default_domain_reclaim_policy,
            description: String::new(),
            metadata: String::new(),
        },
    );
    domain.metadata = object_meta(&name, &vhost.namespace, config, None);
    desired.domains.insert(key, domain);
}

/// Metadata for a produced resource. Ownership labels always win over the
/// virtual host's own labels.
fn object_meta(
    name: &str,
    namespace: &str,
    config: &SynthConfig,
    vhost: Option<&IrVirtualHost>,
) -> ObjectMeta {
    let mut labels = vhost.map(|v| v.labels.clone()).unwrap_or_default();
    labels.extend(config.ownership.labels());
    let annotations = vhost
        .map(|v| v.annotations.clone())
        .filter(|annotations| !annotations.is_empty());

    ObjectMeta {
        name: Some(name.to_owned()),
        namespace: Some(namespace.to_owned()),
        labels: Some(labels),
        annotations,
        ..ObjectMeta::default()
    }
}

fn description(vhost: &IrVirtualHost) -> String {
    let owners: Vec<String> = vhost.owners.iter().map(ToString::to_string).collect();
    format!("Managed for {}", owners.join(", "))
}

/// Records a problem with a virtual host against every object that fed it.
fn diagnose(vhost: &IrVirtualHost, diagnostics: &mut Diagnostics, message: &str) {
    for owner in &vhost.owners {
        diagnostics.push(
            owner.kind,
            &owner.key,
            format!("host {}: {message}", vhost.key.hostname),
        );
    }
}
