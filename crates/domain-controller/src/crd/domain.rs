use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use k8s_openapi::chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};
use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const FINALIZER_NAME: &str = "k8s.ngrok.com/finalizer";
pub const CONDITION_READY: &str = "Ready";

#[derive(Serialize, Deserialize, Eq, PartialEq, Debug, Clone, Copy, Default, JsonSchema)]
pub enum ReclaimPolicy {
    #[default]
    Delete,
    Retain,
}

impl std::str::FromStr for ReclaimPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delete" => Ok(ReclaimPolicy::Delete),
            "retain" => Ok(ReclaimPolicy::Retain),
            other => Err(format!("unknown reclaim policy {other}")),
        }
    }
}

#[derive(CustomResource, Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "ingress.k8s.ngrok.com",
    version = "v1alpha1",
    kind = "Domain",
    doc = "Custom resource representation of a reserved ngrok domain",
    status = "DomainStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Domain","type":"string","jsonPath":".spec.domain"}"#,
    printcolumn = r#"{"name":"CNAME Target","type":"string","jsonPath":".status.cnameTarget"}"#,
    namespaced
)]
pub struct DomainCrd {
    pub domain: String,
    #[serde(default)]
    pub reclaim_policy: ReclaimPolicy,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cname_target: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(schema_with = "conditions")]
    pub conditions: Vec<Condition>,
}

/// Whether a domain reservation has completed on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainCondition {
    Ready,
    Creating,
}

impl Domain {
    // INFO: a domain counts as ready once the platform assigned it an id.
    pub fn condition(&self) -> DomainCondition {
        match self.status.as_ref().and_then(|status| status.id.as_ref()) {
            Some(_) => DomainCondition::Ready,
            None => DomainCondition::Creating,
        }
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER_NAME)
    }

    pub async fn add_finalizer(&self, kubernetes_client: kube::Client) -> Result<Domain, kube::Error> {
        let domain_api: Api<Domain> =
            Api::namespaced(kubernetes_client, &self.namespace().unwrap_or_default());

        let mut finalizers = self.finalizers().to_vec();
        finalizers.push(FINALIZER_NAME.to_owned());
        let patch: Value = json!({
            "metadata": {
                "finalizers": finalizers
            }
        });

        let patch: Patch<&Value> = Patch::Merge(&patch);
        domain_api
            .patch(&self.name_any(), &PatchParams::default(), &patch)
            .await
    }

    pub async fn remove_finalizer(
        &self,
        kubernetes_client: kube::Client,
    ) -> Result<Domain, kube::Error> {
        let domain_api: Api<Domain> =
            Api::namespaced(kubernetes_client, &self.namespace().unwrap_or_default());

        let finalizers: Vec<&String> = self
            .finalizers()
            .iter()
            .filter(|f| *f != FINALIZER_NAME)
            .collect();
        let patch: Value = json!({
            "metadata": {
                "finalizers": finalizers,
            }
        });

        let patch: Patch<&Value> = Patch::Merge(&patch);
        domain_api
            .patch(&self.name_any(), &PatchParams::default(), &patch)
            .await
    }

    pub async fn patch_status(
        &self,
        kubernetes_client: kube::Client,
        status: &DomainStatus,
    ) -> Result<Domain, kube::Error> {
        let domain_api: Api<Domain> =
            Api::namespaced(kubernetes_client, &self.namespace().unwrap_or_default());
        let patch: Value = json!({ "status": status });
        domain_api
            .patch_status(&self.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
    }
}

pub fn ready_condition(status: bool, reason: &str, message: &str, generation: Option<i64>) -> Condition {
    Condition {
        type_: CONDITION_READY.to_owned(),
        status: if status { "True" } else { "False" }.to_owned(),
        reason: reason.to_owned(),
        message: message.to_owned(),
        observed_generation: generation,
        last_transition_time: Time(Utc::now()),
    }
}

pub fn conditions(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    serde_json::from_value(serde_json::json!({
        "type": "array",
        "x-kubernetes-list-type": "map",
        "x-kubernetes-list-map-keys": ["type"],
        "items": {
            "type": "object",
            "properties": {
                "lastTransitionTime": { "format": "date-time", "type": "string" },
                "message": { "type": "string" },
                "observedGeneration": { "type": "integer", "format": "int64", "default": 0 },
                "reason": { "type": "string" },
                "status": { "type": "string" },
                "type": { "type": "string" }
            },
            "required": [
                "lastTransitionTime",
                "message",
                "reason",
                "status",
                "type"
            ],
        },
    }))
    .unwrap_or(schemars::schema::Schema::Bool(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_is_creating_until_it_has_an_id() {
        let mut domain = Domain::new(
            "a-example-com",
            DomainCrd {
                domain: "a.example.com".into(),
                reclaim_policy: ReclaimPolicy::Retain,
                description: String::new(),
                metadata: String::new(),
            },
        );
        assert_eq!(domain.condition(), DomainCondition::Creating);

        domain.status = Some(DomainStatus {
            id: Some("rd_1".into()),
            ..DomainStatus::default()
        });
        assert_eq!(domain.condition(), DomainCondition::Ready);
    }

    #[test]
    fn reclaim_policy_parses_case_insensitively() {
        assert_eq!("retain".parse::<ReclaimPolicy>(), Ok(ReclaimPolicy::Retain));
        assert_eq!("Delete".parse::<ReclaimPolicy>(), Ok(ReclaimPolicy::Delete));
        assert!("keep".parse::<ReclaimPolicy>().is_err());
    }
}
