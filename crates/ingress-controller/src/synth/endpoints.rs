use super::expressions::match_expressions;
use super::{description, endpoint_key, naming, object_meta, DesiredState, SynthConfig};
use crate::crd::ngrok::{CloudEndpointTrafficPolicy, EndpointUpstream};
use crate::crd::{AgentEndpoint, AgentEndpointCrd, CloudEndpoint, CloudEndpointCrd};
use crate::diagnostics::Diagnostics;
use crate::ir::{IrDestination, IrService, IrVirtualHost};
use crate::store::ObjectKey;
use traffic_policy::{actions, Phase, Rule};

const NOT_FOUND: &str = "Not Found";

pub(super) fn synthesize(
    vhost: &IrVirtualHost,
    config: &SynthConfig,
    desired: &mut DesiredState,
    diagnostics: &mut Diagnostics,
) {
    let Some((name, key)) = endpoint_key(&desired.cloud_endpoints, vhost, diagnostics) else {
        return;
    };
    let mut policy = vhost.traffic_policy.clone().unwrap_or_default();

    if let Some(tls) = &vhost.tls_termination {
        policy.on_tcp_connect.insert(
            0,
            Rule::new("terminate-tls").with_action(actions::terminate_tls(&tls.certificate, &tls.key)),
        );
    }

    for (index, route) in vhost.routes.iter().enumerate() {
        let gate = match_expressions(&route.matcher);
        for fragment in &route.policies {
            policy.merge(&fragment.gated(&gate));
        }
        match &route.destination {
            IrDestination::Upstream(service) => {
                let url = agent_endpoint(service, config, desired);
                policy.push(
                    Phase::OnHttpRequest,
                    Rule::new(format!("route {index} {}", route.matcher.path))
                        .with_expressions(gate)
                        .with_action(actions::forward_internal(&url)),
                );
            }
            IrDestination::Policy(fragment) => policy.merge(&fragment.gated(&gate)),
        }
    }

    match &vhost.default_destination {
        Some(IrDestination::Upstream(service)) => {
            let url = agent_endpoint(service, config, desired);
            policy.push(
                Phase::OnHttpRequest,
                Rule::new("default backend").with_action(actions::forward_internal(&url)),
            );
        }
        Some(IrDestination::Policy(fragment)) => policy.merge(fragment),
        None => policy.push(
            Phase::OnHttpRequest,
            Rule::new("not found").with_action(actions::custom_response(404, NOT_FOUND)),
        ),
    }

    let mut endpoint = CloudEndpoint::new(
        &name,
        CloudEndpointCrd {
            url: naming::endpoint_url(&vhost.key),
            pooling_enabled: vhost.pooling_enabled.unwrap_or(false),
            traffic_policy: Some(CloudEndpointTrafficPolicy {
                policy: policy.to_persisted(),
            }),
            description: description(vhost),
        },
    );
    endpoint.metadata = object_meta(&name, &vhost.namespace, config, Some(vhost));
    desired.cloud_endpoints.insert(key, endpoint);
}

/// Registers the internal endpoint for `service` and returns its URL.
fn agent_endpoint(service: &IrService, config: &SynthConfig, desired: &mut DesiredState) -> String {
    let name = naming::upstream_name(service);
    let url = naming::internal_url(&name);

    desired
        .agent_endpoints
        .entry(ObjectKey::new(&service.namespace, &name))
        .or_insert_with(|| {
            let mut endpoint = AgentEndpoint::new(
                &name,
                AgentEndpointCrd {
                    url: url.clone(),
                    upstream: EndpointUpstream {
                        url: naming::upstream_url(service, &config.cluster_domain),
                        protocol: Some(service.protocol.as_str().to_owned()),
                    },
                    traffic_policy: None,
                    description: format!("Upstream {}/{}:{}", service.namespace, service.name, service.port),
                },
            );
            endpoint.metadata = object_meta(&name, &service.namespace, config, None);
            endpoint
        });
    url
}
