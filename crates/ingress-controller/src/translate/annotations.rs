use super::backend::traffic_policy;
use crate::ir::MappingStrategy;
use crate::labels::{
    MAPPING_STRATEGY_ANNOTATION, POOLING_ENABLED_ANNOTATION, TRAFFIC_POLICY_ANNOTATION,
};
use crate::store::Snapshot;
use kube::{Resource, ResourceExt};
use traffic_policy::TrafficPolicy;

/// Controller annotations found on an Ingress or Gateway.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectAnnotations {
    pub traffic_policy: Option<TrafficPolicy>,
    pub pooling_enabled: Option<bool>,
    pub mapping_strategy: Option<MappingStrategy>,
}

pub fn parse<K: Resource>(obj: &K, snapshot: &Snapshot) -> Result<ObjectAnnotations, String> {
    let annotations = obj.annotations();
    let namespace = obj.namespace().unwrap_or_default();

    let traffic_policy = match annotations.get(TRAFFIC_POLICY_ANNOTATION) {
        Some(name) => Some(traffic_policy(snapshot, &namespace, name.trim())?),
        None => None,
    };

    let pooling_enabled = match annotations.get(POOLING_ENABLED_ANNOTATION) {
        Some(value) => Some(value.trim().parse::<bool>().map_err(|_| {
            format!("annotation {POOLING_ENABLED_ANNOTATION} must be true or false, got {value:?}")
        })?),
        None => None,
    };

    let mapping_strategy = match annotations.get(MAPPING_STRATEGY_ANNOTATION) {
        Some(value) => Some(
            value
                .trim()
                .parse::<MappingStrategy>()
                .map_err(|err| format!("annotation {MAPPING_STRATEGY_ANNOTATION}: {err}"))?,
        ),
        None => None,
    };

    Ok(ObjectAnnotations {
        traffic_policy,
        pooling_enabled,
        mapping_strategy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ingress, traffic_policy as policy_object};
    use serde_json::json;

    #[test]
    fn parses_known_annotations() {
        let mut snapshot = Snapshot::default();
        snapshot.traffic_policies.insert(policy_object(
            "default",
            "auth",
            json!({"inbound": [{"actions": [{"type": "basic-auth"}]}], "enabled": true}),
        ));
        let ing = ingress("default", "web")
            .annotate(TRAFFIC_POLICY_ANNOTATION, "auth")
            .annotate(POOLING_ENABLED_ANNOTATION, "true")
            .annotate(MAPPING_STRATEGY_ANNOTATION, "Edges")
            .build();

        let parsed = parse(&ing, &snapshot).unwrap();
        let policy = parsed.traffic_policy.unwrap();
        assert_eq!(policy.on_http_request.len(), 1);
        assert_eq!(policy.enabled, Some(true));
        assert_eq!(parsed.pooling_enabled, Some(true));
        assert_eq!(parsed.mapping_strategy, Some(MappingStrategy::Edges));
    }

    #[test]
    fn malformed_annotations_are_errors() {
        let snapshot = Snapshot::default();
        let bad_bool = ingress("default", "web")
            .annotate(POOLING_ENABLED_ANNOTATION, "yes")
            .build();
        assert!(parse(&bad_bool, &snapshot).is_err());

        let missing_policy = ingress("default", "web")
            .annotate(TRAFFIC_POLICY_ANNOTATION, "nope")
            .build();
        assert!(parse(&missing_policy, &snapshot).is_err());
    }
}
