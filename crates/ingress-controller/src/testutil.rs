//! Object builders and an in-memory API for tests.

use crate::crd::gateway::{
    GatewayClassSpec, GatewaySpec, HTTPBackendRef, HTTPRouteRule, HTTPRouteSpec, Listener,
    ParentReference,
};
use crate::crd::{Gateway, GatewayClass, HTTPRoute, NgrokTrafficPolicy, NgrokTrafficPolicyCrd};
use crate::driver::ResourceClient;
use crate::labels::DEFAULT_CLASS_ANNOTATION;
use crate::store::{ObjectKey, Snapshot, SnapshotSource};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret, Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressClass, IngressClassSpec,
    IngressRule, IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::chrono::DateTime;
use k8s_openapi::ByteString;
use kube::core::ErrorResponse;
use kube::{Resource, ResourceExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_owned()),
        namespace: (!namespace.is_empty()).then(|| namespace.to_owned()),
        ..ObjectMeta::default()
    }
}

fn service_backend(service: &str, port: i32) -> IngressBackend {
    IngressBackend {
        service: Some(IngressServiceBackend {
            name: service.to_owned(),
            port: Some(ServiceBackendPort {
                number: Some(port),
                name: None,
            }),
        }),
        resource: None,
    }
}

pub struct IngressBuilder {
    ingress: Ingress,
}

pub fn ingress(namespace: &str, name: &str) -> IngressBuilder {
    IngressBuilder {
        ingress: Ingress {
            metadata: meta(namespace, name),
            spec: Some(IngressSpec::default()),
            status: None,
        },
    }
}

impl IngressBuilder {
    fn spec(&mut self) -> &mut IngressSpec {
        self.ingress.spec.get_or_insert_with(IngressSpec::default)
    }

    pub fn class(mut self, class: &str) -> Self {
        self.spec().ingress_class_name = Some(class.to_owned());
        self
    }

    /// Adds a path under `host`; an empty host makes a hostless rule.
    pub fn rule(mut self, host: &str, path: &str, path_type: &str, service: &str, port: i32) -> Self {
        let host = (!host.is_empty()).then(|| host.to_owned());
        let path = HTTPIngressPath {
            path: Some(path.to_owned()),
            path_type: path_type.to_owned(),
            backend: service_backend(service, port),
        };
        let rules = self.spec().rules.get_or_insert_with(Vec::new);
        match rules.iter_mut().find(|rule| rule.host == host) {
            Some(rule) => rule
                .http
                .get_or_insert_with(HTTPIngressRuleValue::default)
                .paths
                .push(path),
            None => rules.push(IngressRule {
                host,
                http: Some(HTTPIngressRuleValue { paths: vec![path] }),
            }),
        }
        self
    }

    pub fn default_backend(mut self, service: &str, port: i32) -> Self {
        self.spec().default_backend = Some(service_backend(service, port));
        self
    }

    pub fn tls(mut self, secret: &str, hosts: &[&str]) -> Self {
        self.spec().tls.get_or_insert_with(Vec::new).push(IngressTLS {
            secret_name: Some(secret.to_owned()),
            hosts: Some(hosts.iter().map(|h| h.to_string()).collect()),
        });
        self
    }

    pub fn annotate(mut self, key: &str, value: &str) -> Self {
        self.ingress
            .annotations_mut()
            .insert(key.to_owned(), value.to_owned());
        self
    }

    /// Sets the creation timestamp to `seconds` past the epoch.
    pub fn created(mut self, seconds: i64) -> Self {
        self.ingress.metadata.creation_timestamp = DateTime::from_timestamp(seconds, 0).map(Time);
        self
    }

    pub fn build(self) -> Ingress {
        self.ingress
    }
}

pub fn ingress_class(name: &str, controller: &str, is_default: bool) -> IngressClass {
    let mut class = IngressClass {
        metadata: meta("", name),
        spec: Some(IngressClassSpec {
            controller: Some(controller.to_owned()),
            parameters: None,
        }),
    };
    if is_default {
        class
            .annotations_mut()
            .insert(DEFAULT_CLASS_ANNOTATION.to_owned(), "true".to_owned());
    }
    class
}

/// A service with `(port name, port, app protocol)` ports.
pub fn service(namespace: &str, name: &str, ports: &[(&str, i32, Option<&str>)]) -> Service {
    let mut metadata = meta(namespace, name);
    metadata.uid = Some(format!("{namespace}-{name}-uid"));
    Service {
        metadata,
        spec: Some(ServiceSpec {
            ports: Some(
                ports
                    .iter()
                    .map(|(port_name, port, app_protocol)| ServicePort {
                        name: Some(port_name.to_string()),
                        port: *port,
                        app_protocol: app_protocol.map(str::to_owned),
                        ..ServicePort::default()
                    })
                    .collect(),
            ),
            ..ServiceSpec::default()
        }),
        status: None,
    }
}

pub fn tls_secret(namespace: &str, name: &str) -> Secret {
    Secret {
        metadata: meta(namespace, name),
        type_: Some("kubernetes.io/tls".to_owned()),
        data: Some(BTreeMap::from([
            ("tls.crt".to_owned(), ByteString(b"CERT".to_vec())),
            ("tls.key".to_owned(), ByteString(b"KEY".to_vec())),
        ])),
        ..Secret::default()
    }
}

pub fn traffic_policy(namespace: &str, name: &str, policy: Value) -> NgrokTrafficPolicy {
    let mut object = NgrokTrafficPolicy::new(name, NgrokTrafficPolicyCrd { policy });
    object.metadata.namespace = Some(namespace.to_owned());
    object
}

pub fn namespace(name: &str, labels: &[(&str, &str)]) -> Namespace {
    let mut metadata = meta("", name);
    metadata.labels = Some(
        labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    );
    Namespace {
        metadata,
        ..Namespace::default()
    }
}

pub fn gateway_class(name: &str, controller: &str) -> GatewayClass {
    GatewayClass::new(
        name,
        GatewayClassSpec {
            controller_name: controller.to_owned(),
        },
    )
}

pub fn gateway(namespace: &str, name: &str, class: &str, listeners: Vec<Listener>) -> Gateway {
    let mut gateway = Gateway::new(
        name,
        GatewaySpec {
            gateway_class_name: class.to_owned(),
            listeners,
            infrastructure: None,
        },
    );
    gateway.metadata.namespace = Some(namespace.to_owned());
    gateway
}

pub struct HttpRouteBuilder {
    route: HTTPRoute,
}

/// An HTTPRoute attached to `gateway` in the route's own namespace.
pub fn http_route(namespace: &str, name: &str, gateway: &str) -> HttpRouteBuilder {
    let mut route = HTTPRoute::new(
        name,
        HTTPRouteSpec {
            parent_refs: vec![ParentReference {
                name: gateway.to_owned(),
                ..ParentReference::default()
            }],
            ..HTTPRouteSpec::default()
        },
    );
    route.metadata.namespace = Some(namespace.to_owned());
    HttpRouteBuilder { route }
}

impl HttpRouteBuilder {
    fn parent(&mut self) -> &mut ParentReference {
        &mut self.route.spec.parent_refs[0]
    }

    pub fn hostnames(mut self, hostnames: &[&str]) -> Self {
        self.route.spec.hostnames = hostnames.iter().map(|h| h.to_string()).collect();
        self
    }

    pub fn section(mut self, section: &str) -> Self {
        self.parent().section_name = Some(section.to_owned());
        self
    }

    pub fn parent_namespace(mut self, namespace: &str) -> Self {
        self.parent().namespace = Some(namespace.to_owned());
        self
    }

    pub fn rule(mut self, rule: HTTPRouteRule) -> Self {
        self.route.spec.rules.push(rule);
        self
    }

    /// Adds a rule matching everything and sending it to `service`.
    pub fn backend(self, service: &str, port: i32) -> Self {
        self.rule(HTTPRouteRule {
            backend_refs: vec![HTTPBackendRef {
                name: service.to_owned(),
                port: Some(port),
                ..HTTPBackendRef::default()
            }],
            ..HTTPRouteRule::default()
        })
    }

    pub fn build(self) -> HTTPRoute {
        self.route
    }
}

/// A [`SnapshotSource`] returning whatever was last stored in it.
#[derive(Default)]
pub struct StaticSource(Mutex<Snapshot>);

impl StaticSource {
    pub fn new(snapshot: Snapshot) -> Self {
        StaticSource(Mutex::new(snapshot))
    }

    pub fn replace(&self, snapshot: Snapshot) {
        *self.0.lock().unwrap() = snapshot;
    }
}

impl SnapshotSource for StaticSource {
    fn snapshot(&self) -> Snapshot {
        self.0.lock().unwrap().clone()
    }
}

fn api_error(code: u16, reason: &str, message: String) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_owned(),
        message,
        reason: reason.to_owned(),
        code,
    })
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
            None => labels.contains_key(term),
        })
}

/// In-memory stand-in for the API server with optimistic concurrency.
pub struct FakeClient<K> {
    objects: Mutex<BTreeMap<ObjectKey, K>>,
    versions: AtomicUsize,
    writes: AtomicUsize,
}

impl<K> Default for FakeClient<K> {
    fn default() -> Self {
        FakeClient {
            objects: Mutex::new(BTreeMap::new()),
            versions: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }
}

impl<K: Resource + Clone> FakeClient<K> {
    fn stamp(&self, obj: &mut K) {
        let version = self.versions.fetch_add(1, Ordering::SeqCst) + 1;
        obj.meta_mut().resource_version = Some(version.to_string());
    }

    /// Stores `obj` directly, bypassing conflict checks.
    pub fn seed(&self, mut obj: K) {
        self.stamp(&mut obj);
        self.objects
            .lock()
            .unwrap()
            .insert(ObjectKey::of(&obj), obj);
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&ObjectKey::new(namespace, name))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Creates, updates and deletes that reached the store.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<K> ResourceClient<K> for FakeClient<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    async fn list(&self, selector: &str) -> Result<Vec<K>, kube::Error> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .values()
            .filter(|obj| matches_selector(obj.labels(), selector))
            .cloned()
            .collect())
    }

    async fn create(&self, obj: &K) -> Result<K, kube::Error> {
        let key = ObjectKey::of(obj);
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists", format!("{key} already exists")));
        }
        let mut created = obj.clone();
        self.stamp(&mut created);
        objects.insert(key, created.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(created)
    }

    async fn update(&self, obj: &K) -> Result<K, kube::Error> {
        let key = ObjectKey::of(obj);
        let mut objects = self.objects.lock().unwrap();
        let current = objects
            .get(&key)
            .ok_or_else(|| api_error(404, "NotFound", format!("{key} not found")))?;
        if current.meta().resource_version != obj.meta().resource_version {
            return Err(api_error(409, "Conflict", format!("{key} was modified")));
        }
        let mut updated = obj.clone();
        self.stamp(&mut updated);
        objects.insert(key, updated.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        let key = ObjectKey::new(namespace, name);
        self.objects
            .lock()
            .unwrap()
            .remove(&key)
            .ok_or_else(|| api_error(404, "NotFound", format!("{key} not found")))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
