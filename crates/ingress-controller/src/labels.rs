use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

pub const CONTROLLER_NAME_LABEL: &str = "k8s.ngrok.com/controller-name";
pub const CONTROLLER_NAMESPACE_LABEL: &str = "k8s.ngrok.com/controller-namespace";

pub const TRAFFIC_POLICY_ANNOTATION: &str = "k8s.ngrok.com/traffic-policy";
pub const POOLING_ENABLED_ANNOTATION: &str = "k8s.ngrok.com/pooling-enabled";
pub const MAPPING_STRATEGY_ANNOTATION: &str = "k8s.ngrok.com/mapping-strategy";

pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";
pub const DEFAULT_CLASS_ANNOTATION: &str = "ingressclass.kubernetes.io/is-default-class";

// Labels put on tunnels so edges can select them.
pub const TUNNEL_NAMESPACE_LABEL: &str = "k8s.ngrok.com/namespace";
pub const TUNNEL_SERVICE_LABEL: &str = "k8s.ngrok.com/service";
pub const TUNNEL_PORT_LABEL: &str = "k8s.ngrok.com/port";

/// Identity stamped on every resource this controller produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub controller_name: String,
    pub controller_namespace: String,
}

impl Ownership {
    pub fn new(controller_name: impl Into<String>, controller_namespace: impl Into<String>) -> Self {
        Ownership {
            controller_name: controller_name.into(),
            controller_namespace: controller_namespace.into(),
        }
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (CONTROLLER_NAME_LABEL.to_owned(), self.controller_name.clone()),
            (
                CONTROLLER_NAMESPACE_LABEL.to_owned(),
                self.controller_namespace.clone(),
            ),
        ])
    }

    /// Label selector matching resources stamped by [`Ownership::labels`].
    pub fn selector(&self) -> String {
        format!(
            "{CONTROLLER_NAME_LABEL}={},{CONTROLLER_NAMESPACE_LABEL}={}",
            self.controller_name, self.controller_namespace
        )
    }

    pub fn owns<K: Resource>(&self, obj: &K) -> bool {
        let labels = obj.labels();
        labels.get(CONTROLLER_NAME_LABEL) == Some(&self.controller_name)
            && labels.get(CONTROLLER_NAMESPACE_LABEL) == Some(&self.controller_namespace)
    }
}
