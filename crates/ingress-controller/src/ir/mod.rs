//! Intermediate representation shared by the Ingress and Gateway translators.
//!
//! An [`Ir`] is rebuilt from scratch on every pass. Its lookup tables are keyed
//! by value identity so repeated references to the same hostname or backend
//! resolve to one entry.

use crate::store::ObjectKey;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use traffic_policy::TrafficPolicy;

mod matcher;

pub use matcher::{IrHttpMatch, PathType, StringMatch, ValueMatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListenerProtocol {
    Http,
    Https,
}

impl ListenerProtocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            ListenerProtocol::Http => "http",
            ListenerProtocol::Https => "https",
        }
    }

    pub fn default_port(&self) -> i32 {
        match self {
            ListenerProtocol::Http => 80,
            ListenerProtocol::Https => 443,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IrListener {
    pub port: i32,
    pub protocol: ListenerProtocol,
}

/// Identity of a virtual host. Ingress mode leaves `listener` unset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualHostKey {
    pub hostname: String,
    pub listener: Option<IrListener>,
}

impl VirtualHostKey {
    pub fn hostname(hostname: impl Into<String>) -> Self {
        VirtualHostKey {
            hostname: hostname.into(),
            listener: None,
        }
    }

    pub fn protocol(&self) -> ListenerProtocol {
        self.listener
            .map(|l| l.protocol)
            .unwrap_or(ListenerProtocol::Https)
    }

    /// Port when it differs from the protocol's default.
    pub fn explicit_port(&self) -> Option<i32> {
        self.listener
            .filter(|l| l.port != l.protocol.default_port())
            .map(|l| l.port)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MappingStrategy {
    #[default]
    Endpoints,
    Edges,
}

impl FromStr for MappingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "endpoints" => Ok(MappingStrategy::Endpoints),
            "edges" => Ok(MappingStrategy::Edges),
            other => Err(format!("unknown mapping strategy {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpstreamProtocol {
    #[default]
    Http1,
    Http2,
}

impl UpstreamProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamProtocol::Http1 => "http1",
            UpstreamProtocol::Http2 => "http2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IrService {
    pub uid: String,
    pub namespace: String,
    pub name: String,
    pub port: i32,
    pub scheme: String,
    pub protocol: UpstreamProtocol,
}

impl IrService {
    fn cache_key(&self) -> (String, String, i32) {
        (self.uid.clone(), self.namespace.clone(), self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrDestination {
    Upstream(Arc<IrService>),
    Policy(TrafficPolicy),
}

impl IrDestination {
    /// Stable identity used only to make route ordering total.
    pub fn sort_key(&self) -> String {
        match self {
            IrDestination::Upstream(svc) => {
                format!("upstream:{}/{}:{}", svc.namespace, svc.name, svc.port)
            }
            IrDestination::Policy(policy) => format!("policy:{}", policy.to_value()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrTlsTermination {
    pub secret: ObjectKey,
    pub certificate: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OwnerRef {
    pub kind: &'static str,
    pub key: ObjectKey,
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrRoute {
    pub matcher: IrHttpMatch,
    /// Route scoped fragments applied before the destination.
    pub policies: Vec<TrafficPolicy>,
    pub destination: IrDestination,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrVirtualHost {
    pub key: VirtualHostKey,
    pub namespace: String,
    pub routes: Vec<IrRoute>,
    pub default_destination: Option<IrDestination>,
    pub traffic_policy: Option<TrafficPolicy>,
    pub tls_termination: Option<IrTlsTermination>,
    pub pooling_enabled: Option<bool>,
    pub mapping_strategy: MappingStrategy,
    pub owners: Vec<OwnerRef>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl IrVirtualHost {
    pub fn new(key: VirtualHostKey, namespace: impl Into<String>) -> Self {
        IrVirtualHost {
            key,
            namespace: namespace.into(),
            routes: Vec::new(),
            default_destination: None,
            traffic_policy: None,
            tls_termination: None,
            pooling_enabled: None,
            mapping_strategy: MappingStrategy::default(),
            owners: Vec::new(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn add_owner(&mut self, owner: OwnerRef) {
        if !self.owners.contains(&owner) {
            self.owners.push(owner);
        }
    }

    /// Adds a route unless one with identical match criteria is present.
    pub fn add_route(&mut self, route: IrRoute) -> Result<(), IrRoute> {
        if self.routes.iter().any(|r| r.matcher == route.matcher) {
            return Err(route);
        }
        self.routes.push(route);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ir {
    virtual_hosts: BTreeMap<VirtualHostKey, IrVirtualHost>,
    hostnames: BTreeMap<String, String>,
    upstreams: BTreeMap<(String, String, i32), Arc<IrService>>,
}

impl Ir {
    /// Records `namespace` as the owner of `hostname`. Returns the owning
    /// namespace when another namespace claimed it first.
    pub fn claim_hostname(&mut self, hostname: &str, namespace: &str) -> Result<(), String> {
        match self.hostnames.entry(hostname.to_owned()) {
            Entry::Vacant(entry) => {
                entry.insert(namespace.to_owned());
                Ok(())
            }
            Entry::Occupied(entry) if entry.get() == namespace => Ok(()),
            Entry::Occupied(entry) => Err(entry.get().clone()),
        }
    }

    /// Returns the virtual host for `key`, creating it on first use. The
    /// boolean is true when the host was just created.
    pub fn virtual_host(
        &mut self,
        key: VirtualHostKey,
        namespace: &str,
    ) -> (&mut IrVirtualHost, bool) {
        match self.virtual_hosts.entry(key) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => {
                let vhost = IrVirtualHost::new(entry.key().clone(), namespace);
                (entry.insert(vhost), true)
            }
        }
    }

    /// Interns `service`, returning the shared instance for its identity.
    pub fn upstream(&mut self, service: IrService) -> Arc<IrService> {
        self.upstreams
            .entry(service.cache_key())
            .or_insert_with(|| Arc::new(service))
            .clone()
    }

    pub fn virtual_hosts(&self) -> impl Iterator<Item = &IrVirtualHost> {
        self.virtual_hosts.values()
    }

    pub fn virtual_hosts_mut(&mut self) -> impl Iterator<Item = &mut IrVirtualHost> {
        self.virtual_hosts.values_mut()
    }

    pub fn get(&self, key: &VirtualHostKey) -> Option<&IrVirtualHost> {
        self.virtual_hosts.get(key)
    }

    pub fn upstreams(&self) -> impl Iterator<Item = &Arc<IrService>> {
        self.upstreams.values()
    }
}
