//! Read-only, per-pass view of the watched cluster objects.

use crate::crd::{Gateway, GatewayClass, HTTPRoute, NgrokTrafficPolicy, ReferenceGrant};
use k8s_openapi::api::core::v1::{Namespace, Secret, Service};
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use k8s_openapi::chrono::{DateTime, Utc};
use kube::runtime::reflector::Store;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// `namespace/name` identity. Cluster scoped objects use an empty namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        ObjectKey {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn of<K: Resource>(obj: &K) -> Self {
        ObjectKey {
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Orders objects the way they were first created, so "first seen" does not
/// depend on watch delivery order.
pub fn creation_order<K: Resource>(obj: &K) -> (Option<DateTime<Utc>>, String, String) {
    (
        obj.creation_timestamp().map(|t| t.0),
        obj.namespace().unwrap_or_default(),
        obj.name_any(),
    )
}

/// Objects of one kind indexed by [`ObjectKey`].
#[derive(Debug, Clone)]
pub struct Indexed<K>(BTreeMap<ObjectKey, Arc<K>>);

impl<K> Default for Indexed<K> {
    fn default() -> Self {
        Indexed(BTreeMap::new())
    }
}

impl<K: Resource> Indexed<K> {
    pub fn get(&self, namespace: &str, name: &str) -> Option<&Arc<K>> {
        self.0.get(&ObjectKey::new(namespace, name))
    }

    pub fn insert(&mut self, obj: K) {
        self.0.insert(ObjectKey::of(&obj), Arc::new(obj));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<K>> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Live objects sorted by [`creation_order`].
    pub fn by_creation(&self) -> Vec<&Arc<K>> {
        let mut objects: Vec<&Arc<K>> = self
            .0
            .values()
            .filter(|obj| obj.meta().deletion_timestamp.is_none())
            .collect();
        objects.sort_by_cached_key(|obj| creation_order::<K>(obj));
        objects
    }
}

impl<K: Resource> FromIterator<Arc<K>> for Indexed<K> {
    fn from_iter<I: IntoIterator<Item = Arc<K>>>(iter: I) -> Self {
        Indexed(
            iter.into_iter()
                .map(|obj| (ObjectKey::of::<K>(&obj), obj))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub ingresses: Indexed<Ingress>,
    pub ingress_classes: Indexed<IngressClass>,
    pub gateway_classes: Indexed<GatewayClass>,
    pub gateways: Indexed<Gateway>,
    pub http_routes: Indexed<HTTPRoute>,
    pub reference_grants: Indexed<ReferenceGrant>,
    pub services: Indexed<Service>,
    pub secrets: Indexed<Secret>,
    pub namespaces: Indexed<Namespace>,
    pub traffic_policies: Indexed<NgrokTrafficPolicy>,
}

/// Anything able to hand out a consistent [`Snapshot`].
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self) -> Snapshot;
}

#[derive(Clone)]
pub struct GatewayStores {
    pub gateway_classes: Store<GatewayClass>,
    pub gateways: Store<Gateway>,
    pub http_routes: Store<HTTPRoute>,
    pub reference_grants: Store<ReferenceGrant>,
}

/// Reflector backed snapshot source.
#[derive(Clone)]
pub struct Stores {
    pub ingresses: Store<Ingress>,
    pub ingress_classes: Store<IngressClass>,
    pub services: Store<Service>,
    pub secrets: Store<Secret>,
    pub namespaces: Store<Namespace>,
    pub traffic_policies: Store<NgrokTrafficPolicy>,
    pub gateway: Option<GatewayStores>,
}

impl SnapshotSource for Stores {
    fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot {
            ingresses: self.ingresses.state().into_iter().collect(),
            ingress_classes: self.ingress_classes.state().into_iter().collect(),
            services: self.services.state().into_iter().collect(),
            secrets: self.secrets.state().into_iter().collect(),
            namespaces: self.namespaces.state().into_iter().collect(),
            traffic_policies: self.traffic_policies.state().into_iter().collect(),
            ..Snapshot::default()
        };

        if let Some(gateway) = &self.gateway {
            snapshot.gateway_classes = gateway.gateway_classes.state().into_iter().collect();
            snapshot.gateways = gateway.gateways.state().into_iter().collect();
            snapshot.http_routes = gateway.http_routes.state().into_iter().collect();
            snapshot.reference_grants = gateway.reference_grants.state().into_iter().collect();
        }

        snapshot
    }
}
