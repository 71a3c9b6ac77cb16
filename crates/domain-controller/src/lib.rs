use crate::crd::domain::{ready_condition, Domain, DomainStatus, ReclaimPolicy};
use futures::{Future, StreamExt};
use kube::runtime::controller::Action;
use kube::{client::Client, runtime::watcher::Config, runtime::Controller as KubeController, Api};
use kube::{Resource, ResourceExt};
use ngrokext::reserved_domains::CreateParams;
use ngrokext::{classify, ApiFailure, Client as NgrokClient, ReservedDomain, ReservedDomains, Retry};
use std::future::IntoFuture;
use std::pin::Pin;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, info, warn};

pub mod crd;

const RECONCILE_TIMER: u64 = 60 * 5;
const STATUS_RETRY_TIMER: u64 = 5;

/// All errors possible to occur during reconciliation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Any error originating from the `kube-rs` crate
    #[error("Kubernetes reported error: {0}")]
    KubeError(#[from] kube::Error),
    // Any error that the ngrok api returns
    #[error("ngrok api returned an error: {0}")]
    ApiFailure(#[from] ApiFailure),
    #[error("missing namespace for resource {0}")]
    MissingNamespace(&'static str),
    // The platform change went through but recording it on the resource failed.
    #[error("domain {domain} was reserved but its status could not be recorded: {source}")]
    StatusUpdate {
        domain: String,
        #[source]
        source: kube::Error,
    },
}

pub struct DomainController {
    kubernetes_client: Client,
    ngrok_client: NgrokClient,
    domain_api: Api<Domain>,
}

pub struct Context {
    kubernetes_client: Client,
    ngrok_client: NgrokClient,
}

#[derive(Debug, PartialEq, Eq)]
enum DomainAction {
    Delete,
    Create,
    Sync,
}

impl From<&Domain> for DomainAction {
    fn from(s: &Domain) -> DomainAction {
        if s.meta().deletion_timestamp.is_some() {
            DomainAction::Delete
        } else if !s.has_finalizer() {
            DomainAction::Create
        } else {
            DomainAction::Sync
        }
    }
}

fn status_for(reserved: &ReservedDomain, generation: Option<i64>) -> DomainStatus {
    DomainStatus {
        id: Some(reserved.id.clone()),
        domain: Some(reserved.domain.clone()),
        cname_target: reserved.cname_target.clone(),
        conditions: vec![ready_condition(
            true,
            "DomainReserved",
            "domain is reserved",
            generation,
        )],
    }
}

async fn reserve(domain: &Domain, ctx: &Context) -> Result<ReservedDomain, Error> {
    if let Some(id) = domain.status.as_ref().and_then(|s| s.id.as_deref()) {
        match ctx.ngrok_client.get_domain(id).await {
            Ok(reserved) => return Ok(reserved),
            // INFO: reserved domain was removed out of band, reserve it again.
            Err(err) if err.is_not_found() => {
                warn!(domain = %domain.spec.domain, id, "reserved domain disappeared, recreating");
            }
            Err(err) => return Err(Error::ApiFailure(err)),
        }
    }

    let params = CreateParams {
        domain: &domain.spec.domain,
        description: &domain.spec.description,
        metadata: &domain.spec.metadata,
    };
    let reserved = ctx.ngrok_client.create_domain(&params).await?;
    info!(domain = %reserved.domain, id = %reserved.id, "reserved domain");
    Ok(reserved)
}

async fn sync_domain(domain: Arc<Domain>, ctx: Arc<Context>) -> Result<Action, Error> {
    let reserved = reserve(&domain, &ctx).await?;

    let status = status_for(&reserved, domain.meta().generation);
    let current = domain.status.clone().unwrap_or_default();
    let changed = current.id != status.id
        || current.domain != status.domain
        || current.cname_target != status.cname_target;

    if changed {
        if let Err(source) = domain
            .patch_status(ctx.kubernetes_client.clone(), &status)
            .await
        {
            return Err(Error::StatusUpdate {
                domain: domain.spec.domain.clone(),
                source,
            });
        }
    }

    Ok(Action::requeue(Duration::from_secs(RECONCILE_TIMER)))
}

async fn delete_domain(domain: Arc<Domain>, ctx: Arc<Context>) -> Result<Action, Error> {
    let id = domain.status.as_ref().and_then(|s| s.id.clone());
    match (domain.spec.reclaim_policy, id) {
        (ReclaimPolicy::Delete, Some(id)) => {
            if let Err(err) = ctx.ngrok_client.delete_domain(&id).await {
                if err.is_not_found() {
                    debug!(id, "ignoring not found while deleting reserved domain");
                } else {
                    return Err(Error::ApiFailure(err));
                }
            }
            info!(domain = %domain.spec.domain, id, "released reserved domain");
        }
        (ReclaimPolicy::Retain, Some(id)) => {
            info!(domain = %domain.spec.domain, id, "retaining reserved domain");
        }
        (_, None) => {}
    }

    // This should be the last thing we do as the controller wont requeue this resource
    // again
    domain
        .remove_finalizer(ctx.kubernetes_client.clone())
        .await?;
    Ok(Action::await_change())
}

pub async fn reconciler(domain: Arc<Domain>, ctx: Arc<Context>) -> Result<Action, Error> {
    if domain.namespace().is_none() {
        return Err(Error::MissingNamespace("Domain"));
    }

    let action = DomainAction::from(domain.as_ref());
    debug!(name = %domain.name_any(), ?action, "reconciling domain");
    match action {
        DomainAction::Create => {
            let domain = domain.add_finalizer(ctx.kubernetes_client.clone()).await?;
            sync_domain(Arc::new(domain), ctx).await
        }
        DomainAction::Delete => delete_domain(domain, ctx).await,
        DomainAction::Sync => sync_domain(domain, ctx).await,
    }
}

/// Maps an error onto the requeue schedule its classification asks for.
pub fn requeue_for(error: &Error) -> Action {
    match error {
        Error::ApiFailure(failure) => match classify(failure) {
            Retry::Backoff => Action::requeue(Duration::from_secs(30)),
            Retry::After(window) => Action::requeue(window),
            Retry::Never => Action::await_change(),
        },
        Error::StatusUpdate { .. } => Action::requeue(Duration::from_secs(STATUS_RETRY_TIMER)),
        Error::KubeError(_) => Action::requeue(Duration::from_secs(60)),
        Error::MissingNamespace(_) => Action::await_change(),
    }
}

pub fn on_err(domain: Arc<Domain>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(name = %domain.name_any(), %error, "failed to reconcile domain");
    requeue_for(error)
}

impl DomainController {
    pub async fn start(self) -> anyhow::Result<()> {
        info!("starting domain controller");

        let ctx = Arc::new(Context {
            kubernetes_client: self.kubernetes_client,
            ngrok_client: self.ngrok_client,
        });

        KubeController::new(self.domain_api, Config::default())
            .run(reconciler, on_err, ctx)
            .for_each(|result| async move {
                match result {
                    Ok((domain, _)) => debug!(name = %domain.name, "reconciled domain"),
                    Err(err) => debug!(%err, "domain reconcile loop error"),
                }
            })
            .await;

        Ok(())
    }

    pub fn try_new(
        kubernetes_client: Client,
        ngrok_client: NgrokClient,
    ) -> anyhow::Result<DomainController> {
        let domain_api: Api<Domain> = Api::all(kubernetes_client.clone());

        Ok(Self {
            kubernetes_client,
            ngrok_client,
            domain_api,
        })
    }
}

impl IntoFuture for DomainController {
    type Output = anyhow::Result<()>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.start())
    }
}
