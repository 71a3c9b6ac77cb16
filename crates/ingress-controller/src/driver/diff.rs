//! Plans and applies the operations moving observed resources towards the
//! desired ones.

use super::client::{is_status, ResourceClient};
use crate::crd::{AgentEndpoint, CloudEndpoint, HTTPSEdge, Tunnel};
use crate::labels::Ownership;
use crate::store::ObjectKey;
use crate::Error;
use domain_controller::crd::{Domain, DomainCrd};
use futures::{stream, TryStreamExt};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A produced resource kind the driver knows how to compare and update.
pub trait Reconcilable: Resource<DynamicType = ()> + Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn spec_matches(&self, observed: &Self) -> bool;

    /// The object to send when updating `observed` to match `self`.
    fn merge_for_update(&self, observed: &Self) -> Self;
}

fn is_subset(want: Option<&BTreeMap<String, String>>, have: Option<&BTreeMap<String, String>>) -> bool {
    want.into_iter()
        .flatten()
        .all(|(key, value)| have.and_then(|have| have.get(key)) == Some(value))
}

fn merged(
    observed: Option<&BTreeMap<String, String>>,
    desired: Option<&BTreeMap<String, String>>,
) -> Option<BTreeMap<String, String>> {
    match (observed, desired) {
        (None, None) => None,
        _ => {
            let mut merged = observed.cloned().unwrap_or_default();
            merged.extend(desired.cloned().unwrap_or_default());
            Some(merged)
        }
    }
}

/// Observed metadata with the desired labels and annotations laid over it.
/// Keeps `resourceVersion`, finalizers and anything else set by others.
fn update_meta(desired: &ObjectMeta, observed: &ObjectMeta) -> ObjectMeta {
    ObjectMeta {
        labels: merged(observed.labels.as_ref(), desired.labels.as_ref()),
        annotations: merged(observed.annotations.as_ref(), desired.annotations.as_ref()),
        managed_fields: None,
        ..observed.clone()
    }
}

macro_rules! reconcilable {
    ($kind:ty, $name:literal) => {
        impl Reconcilable for $kind {
            const KIND: &'static str = $name;

            fn spec_matches(&self, observed: &Self) -> bool {
                self.spec == observed.spec
            }

            fn merge_for_update(&self, observed: &Self) -> Self {
                let mut updated = observed.clone();
                updated.metadata = update_meta(&self.metadata, &observed.metadata);
                updated.spec = self.spec.clone();
                updated
            }
        }
    };
}

reconcilable!(Tunnel, "Tunnel");
reconcilable!(HTTPSEdge, "HTTPSEdge");
reconcilable!(AgentEndpoint, "AgentEndpoint");
reconcilable!(CloudEndpoint, "CloudEndpoint");

// The reclaim policy is fixed when a domain is created.
impl Reconcilable for Domain {
    const KIND: &'static str = "Domain";

    fn spec_matches(&self, observed: &Self) -> bool {
        DomainCrd {
            reclaim_policy: observed.spec.reclaim_policy,
            ..self.spec.clone()
        } == observed.spec
    }

    fn merge_for_update(&self, observed: &Self) -> Self {
        let mut updated = observed.clone();
        updated.metadata = update_meta(&self.metadata, &observed.metadata);
        updated.spec = DomainCrd {
            reclaim_policy: observed.spec.reclaim_policy,
            ..self.spec.clone()
        };
        updated
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op<K> {
    Create(K),
    Update(K),
    Delete(ObjectKey),
}

impl<K: Resource> Op<K> {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Create(_) => "create",
            Op::Update(_) => "update",
            Op::Delete(_) => "delete",
        }
    }

    pub fn key(&self) -> ObjectKey {
        match self {
            Op::Create(obj) | Op::Update(obj) => ObjectKey::of::<K>(obj),
            Op::Delete(key) => key.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Creates skipped because an object not owned by us holds the name.
    pub skipped: usize,
}

impl OpCounts {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

fn needs_update<K: Reconcilable>(desired: &K, observed: &K) -> bool {
    !desired.spec_matches(observed)
        || !is_subset(desired.meta().labels.as_ref(), observed.meta().labels.as_ref())
        || !is_subset(
            desired.meta().annotations.as_ref(),
            observed.meta().annotations.as_ref(),
        )
}

/// Operations turning `observed` into `desired`. Observed objects without
/// our ownership labels are never touched.
pub fn plan<K: Reconcilable>(
    desired: &BTreeMap<ObjectKey, K>,
    observed: &[K],
    ownership: &Ownership,
) -> Vec<Op<K>> {
    let mut unclaimed: BTreeMap<&ObjectKey, &K> = desired.iter().collect();
    let mut ops = Vec::new();

    for current in observed.iter().filter(|obj| ownership.owns::<K>(obj)) {
        let key = ObjectKey::of::<K>(current);
        match unclaimed.remove(&key) {
            Some(want) if needs_update(want, current) => {
                ops.push(Op::Update(want.merge_for_update(current)))
            }
            Some(_) => {}
            None if current.meta().deletion_timestamp.is_none() => ops.push(Op::Delete(key)),
            None => {}
        }
    }

    ops.extend(unclaimed.into_values().map(|obj| Op::Create(obj.clone())));
    ops
}

/// Lists the objects carrying `selector`, giving up when `cancel` fires.
pub async fn list<K: Reconcilable>(
    client: &dyn ResourceClient<K>,
    selector: &str,
    cancel: &CancellationToken,
) -> Result<Vec<K>, Error> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = client.list(selector) => result.map_err(|source| Error::Apply {
            op: "list",
            kind: K::KIND,
            key: selector.to_owned(),
            source,
        }),
    }
}

async fn apply_one<K: Reconcilable>(
    client: &dyn ResourceClient<K>,
    op: &Op<K>,
    cancel: &CancellationToken,
) -> Result<bool, Error> {
    let key = op.key();
    let request = async {
        match op {
            Op::Create(obj) => client.create(obj).await.map(|_| ()),
            Op::Update(obj) => client.update(obj).await.map(|_| ()),
            Op::Delete(key) => client.delete(&key.namespace, &key.name).await,
        }
    };
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        result = request => result,
    };

    match result {
        Ok(()) => {
            debug!(kind = K::KIND, op = op.name(), object = %key, "applied");
            Ok(false)
        }
        Err(err) if matches!(op, Op::Create(_)) && is_status(&err, 409) => {
            warn!(
                kind = K::KIND,
                object = %key,
                "name is taken by an object this controller does not own, skipping"
            );
            Ok(true)
        }
        Err(err) if matches!(op, Op::Delete(_)) && is_status(&err, 404) => Ok(false),
        Err(source) => Err(Error::Apply {
            op: op.name(),
            kind: K::KIND,
            key: key.to_string(),
            source,
        }),
    }
}

/// Runs `ops` with at most `max_concurrent` in flight. Stops at the first
/// failure; operations already done stay done.
pub async fn apply<K: Reconcilable>(
    client: &dyn ResourceClient<K>,
    ops: Vec<Op<K>>,
    max_concurrent: usize,
    cancel: &CancellationToken,
) -> Result<OpCounts, Error> {
    let mut counts = OpCounts::default();
    for op in &ops {
        match op {
            Op::Create(_) => counts.created += 1,
            Op::Update(_) => counts.updated += 1,
            Op::Delete(_) => counts.deleted += 1,
        }
    }

    let skipped = AtomicUsize::new(0);
    stream::iter(ops.iter().map(Ok))
        .try_for_each_concurrent(max_concurrent.max(1), |op| {
            let skipped = &skipped;
            async move {
                if apply_one(client, op, cancel).await? {
                    skipped.fetch_add(1, Ordering::Relaxed);
                }
                Ok::<_, Error>(())
            }
        })
        .await?;

    counts.skipped = skipped.into_inner();
    counts.created -= counts.skipped;
    Ok(counts)
}
