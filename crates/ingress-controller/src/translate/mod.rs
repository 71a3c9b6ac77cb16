//! Translation of cluster objects into the [`Ir`].
//!
//! Ingresses are visited first, then Gateway API objects when enabled. Each
//! source is taken in creation order so that "first wins" conflicts resolve
//! the same way on every pass. Problems are recorded as diagnostics and never
//! abort the pass.

use crate::diagnostics::Diagnostics;
use crate::ir::{Ir, IrTlsTermination, MappingStrategy};
use crate::store::{ObjectKey, Snapshot};

pub mod annotations;
pub mod backend;
pub mod filters;
pub mod gateway;
pub mod hostname;
pub mod ingress;
pub mod refgrant;
pub mod sort;

pub const DEFAULT_INGRESS_CONTROLLER_NAME: &str = "k8s.ngrok.com/ingress-controller";
pub const DEFAULT_GATEWAY_CONTROLLER_NAME: &str = "ngrok.com/gateway-controller";

const TLS_CERT_KEY: &str = "tls.crt";
const TLS_PRIVATE_KEY: &str = "tls.key";

#[derive(Debug, Clone)]
pub struct TranslateConfig {
    pub ingress_controller_name: String,
    pub gateway_controller_name: String,
    pub enable_gateway_api: bool,
    pub default_mapping_strategy: MappingStrategy,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        TranslateConfig {
            ingress_controller_name: DEFAULT_INGRESS_CONTROLLER_NAME.to_owned(),
            gateway_controller_name: DEFAULT_GATEWAY_CONTROLLER_NAME.to_owned(),
            enable_gateway_api: false,
            default_mapping_strategy: MappingStrategy::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Translation {
    pub ir: Ir,
    pub diagnostics: Diagnostics,
}

pub fn translate(snapshot: &Snapshot, config: &TranslateConfig) -> Translation {
    let mut ir = Ir::default();
    let mut diagnostics = Diagnostics::default();

    ingress::translate(snapshot, config, &mut ir, &mut diagnostics);
    if config.enable_gateway_api {
        gateway::translate(snapshot, config, &mut ir, &mut diagnostics);
    }

    for vhost in ir.virtual_hosts_mut() {
        sort::sort_routes(&mut vhost.routes);
    }

    Translation { ir, diagnostics }
}

/// Stores `value` unless the slot already holds something. Returns true when
/// a different value was discarded.
pub(crate) fn keep_first<T: PartialEq>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match (slot.as_ref(), value) {
        (_, None) => false,
        (None, Some(value)) => {
            *slot = Some(value);
            false
        }
        (Some(current), Some(value)) => *current != value,
    }
}

/// Reads a `kubernetes.io/tls` secret.
pub(crate) fn tls_secret(
    snapshot: &Snapshot,
    namespace: &str,
    name: &str,
) -> Result<IrTlsTermination, String> {
    let secret = snapshot
        .secrets
        .get(namespace, name)
        .ok_or_else(|| format!("tls secret {namespace}/{name} not found"))?;
    let data = secret.data.as_ref();

    let field = |key: &str| -> Result<String, String> {
        let bytes = data
            .and_then(|data| data.get(key))
            .ok_or_else(|| format!("tls secret {namespace}/{name} has no {key}"))?;
        String::from_utf8(bytes.0.clone())
            .map_err(|_| format!("tls secret {namespace}/{name}: {key} is not valid UTF-8"))
    };

    Ok(IrTlsTermination {
        secret: ObjectKey::new(namespace, name),
        certificate: field(TLS_CERT_KEY)?,
        key: field(TLS_PRIVATE_KEY)?,
    })
}
