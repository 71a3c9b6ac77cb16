//! Compile-and-apply passes.
//!
//! A pass takes a [`Snapshot`], compiles it to a [`DesiredState`] and then,
//! kind by kind in dependency order, lists the resources carrying our
//! ownership labels and creates, updates or deletes until they match.

use crate::crd::{AgentEndpoint, CloudEndpoint, HTTPSEdge, Tunnel};
use crate::diagnostics::Diagnostics;
use crate::store::{ObjectKey, SnapshotSource};
use crate::synth::{synthesize, DesiredState, SynthConfig};
use crate::translate::{translate, TranslateConfig, Translation};
use crate::Error;
use domain_controller::crd::{Domain, DomainCondition};
use kube::Client;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod client;
pub mod diff;
pub mod singleflight;

pub use client::{KubeResourceClient, ResourceClient};
pub use diff::{OpCounts, Reconcilable};

use diff::{apply, list, plan};
use singleflight::{Coordinator, Outcome};

pub const DEFAULT_MAX_CONCURRENT_OPS: usize = 8;

/// Output kinds in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    Domains,
    Tunnels,
    Edges,
    AgentEndpoints,
    CloudEndpoints,
}

impl Kind {
    pub const ALL: [Kind; 5] = [
        Kind::Domains,
        Kind::Tunnels,
        Kind::Edges,
        Kind::AgentEndpoints,
        Kind::CloudEndpoints,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Domains => "domains",
            Kind::Tunnels => "tunnels",
            Kind::Edges => "edges",
            Kind::AgentEndpoints => "agent-endpoints",
            Kind::CloudEndpoints => "cloud-endpoints",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    Full,
    Partial(BTreeSet<Kind>),
}

impl SyncScope {
    pub fn is_full(&self) -> bool {
        matches!(self, SyncScope::Full)
    }

    pub fn includes(&self, kind: Kind) -> bool {
        match self {
            SyncScope::Full => true,
            SyncScope::Partial(kinds) => kinds.contains(&kind),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub counts: BTreeMap<Kind, OpCounts>,
    /// Desired domains the platform has not finished reserving.
    pub pending_domains: Vec<ObjectKey>,
    pub diagnostics: Diagnostics,
    /// The request was folded into a newer one and no pass ran for it.
    pub superseded: bool,
}

impl SyncReport {
    pub fn total_ops(&self) -> usize {
        self.counts.values().map(OpCounts::total).sum()
    }
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub translate: TranslateConfig,
    pub synth: SynthConfig,
    pub max_concurrent_ops: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            translate: TranslateConfig::default(),
            synth: SynthConfig::default(),
            max_concurrent_ops: DEFAULT_MAX_CONCURRENT_OPS,
        }
    }
}

#[derive(Clone)]
pub struct Clients {
    pub domains: Arc<dyn ResourceClient<Domain>>,
    pub tunnels: Arc<dyn ResourceClient<Tunnel>>,
    pub edges: Arc<dyn ResourceClient<HTTPSEdge>>,
    pub agent_endpoints: Arc<dyn ResourceClient<AgentEndpoint>>,
    pub cloud_endpoints: Arc<dyn ResourceClient<CloudEndpoint>>,
}

impl Clients {
    pub fn kube(client: Client) -> Self {
        let client = Arc::new(KubeResourceClient::new(client));
        Clients {
            domains: client.clone(),
            tunnels: client.clone(),
            edges: client.clone(),
            agent_endpoints: client.clone(),
            cloud_endpoints: client,
        }
    }
}

type PassResult = Result<SyncReport, Arc<Error>>;

pub struct Driver {
    source: Arc<dyn SnapshotSource>,
    clients: Clients,
    config: DriverConfig,
    coordinator: Coordinator<PassResult>,
}

fn pending_domains(desired: &BTreeMap<ObjectKey, Domain>, observed: &[Domain]) -> Vec<ObjectKey> {
    let ready: BTreeSet<ObjectKey> = observed
        .iter()
        .filter(|domain| domain.condition() == DomainCondition::Ready)
        .map(ObjectKey::of)
        .collect();
    desired
        .keys()
        .filter(|key| !ready.contains(key))
        .cloned()
        .collect()
}

impl Driver {
    pub fn new(source: Arc<dyn SnapshotSource>, clients: Clients, config: DriverConfig) -> Self {
        Driver {
            source,
            clients,
            config,
            coordinator: Coordinator::new(),
        }
    }

    /// Compiles the current snapshot and applies it. Concurrent callers are
    /// coalesced; a caller whose request was folded into a newer one gets a
    /// report with `superseded` set.
    pub async fn sync(&self, scope: SyncScope, cancel: &CancellationToken) -> PassResult {
        let full = scope.is_full();
        match self
            .coordinator
            .run(full, move || self.pass(scope, cancel))
            .await
        {
            Outcome::Ran(result) => result,
            Outcome::Shared(result) => {
                debug!("sync request covered by a concurrent pass");
                result
            }
            Outcome::Superseded => {
                debug!("sync request superseded by a newer one");
                Ok(SyncReport {
                    superseded: true,
                    ..SyncReport::default()
                })
            }
        }
    }

    async fn pass(&self, scope: SyncScope, cancel: &CancellationToken) -> PassResult {
        match self.run_pass(&scope, cancel).await {
            Ok(report) => {
                info!(
                    full = scope.is_full(),
                    ops = report.total_ops(),
                    diagnostics = report.diagnostics.len(),
                    pending_domains = report.pending_domains.len(),
                    "sync pass finished"
                );
                Ok(report)
            }
            Err(err) => {
                warn!(error = %err, "sync pass failed");
                Err(Arc::new(err))
            }
        }
    }

    /// Compiles the current snapshot without applying anything.
    pub fn compile(&self) -> (DesiredState, Diagnostics) {
        let snapshot = self.source.snapshot();
        let Translation {
            ir,
            mut diagnostics,
        } = translate(&snapshot, &self.config.translate);
        let desired = synthesize(&ir, &self.config.synth, &mut diagnostics);
        (desired, diagnostics)
    }

    async fn run_pass(&self, scope: &SyncScope, cancel: &CancellationToken) -> Result<SyncReport, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (desired, diagnostics) = self.compile();
        diagnostics.emit();

        let mut report = SyncReport {
            diagnostics,
            ..SyncReport::default()
        };
        let selector = self.config.synth.ownership.selector();

        for kind in Kind::ALL.into_iter().filter(|kind| scope.includes(*kind)) {
            let counts = match kind {
                Kind::Domains => {
                    let observed = list(&*self.clients.domains, &selector, cancel).await?;
                    report.pending_domains = pending_domains(&desired.domains, &observed);
                    self.reconcile(&*self.clients.domains, &desired.domains, observed, cancel)
                        .await?
                }
                Kind::Tunnels => {
                    let observed = list(&*self.clients.tunnels, &selector, cancel).await?;
                    self.reconcile(&*self.clients.tunnels, &desired.tunnels, observed, cancel)
                        .await?
                }
                Kind::Edges => {
                    let observed = list(&*self.clients.edges, &selector, cancel).await?;
                    self.reconcile(&*self.clients.edges, &desired.edges, observed, cancel)
                        .await?
                }
                Kind::AgentEndpoints => {
                    let client = &*self.clients.agent_endpoints;
                    let observed = list(client, &selector, cancel).await?;
                    self.reconcile(client, &desired.agent_endpoints, observed, cancel)
                        .await?
                }
                Kind::CloudEndpoints => {
                    let client = &*self.clients.cloud_endpoints;
                    let observed = list(client, &selector, cancel).await?;
                    self.reconcile(client, &desired.cloud_endpoints, observed, cancel)
                        .await?
                }
            };
            report.counts.insert(kind, counts);
        }

        Ok(report)
    }

    async fn reconcile<K: Reconcilable>(
        &self,
        client: &dyn ResourceClient<K>,
        desired: &BTreeMap<ObjectKey, K>,
        observed: Vec<K>,
        cancel: &CancellationToken,
    ) -> Result<OpCounts, Error> {
        let ops = plan(desired, &observed, &self.config.synth.ownership);
        let counts = apply(client, ops, self.config.max_concurrent_ops, cancel).await?;
        if counts != OpCounts::default() {
            info!(
                kind = K::KIND,
                created = counts.created,
                updated = counts.updated,
                deleted = counts.deleted,
                skipped = counts.skipped,
                "reconciled"
            );
        }
        Ok(counts)
    }

    /// Runs a full pass every `interval` until cancelled. Failures are logged
    /// and retried on the next tick.
    pub async fn run_cleanup_sweep(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and startup already syncs.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("cleanup sweep stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }
            match self.sync(SyncScope::Full, &cancel).await {
                Ok(report) => debug!(ops = report.total_ops(), "cleanup sweep finished"),
                Err(err) => warn!(error = %err, "cleanup sweep failed, retrying next interval"),
            }
        }
    }
}
