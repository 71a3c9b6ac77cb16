use crate::crd::{Gateway, GatewayClass, HTTPRoute, NgrokTrafficPolicy, ReferenceGrant};
use crate::driver::{Clients, Driver, DriverConfig, SyncScope};
use crate::store::{GatewayStores, ObjectKey, Stores};
use crate::translate::ingress::{ManagedClasses, KIND as INGRESS_KIND};
use crate::Error;
use futures::channel::mpsc;
use futures::stream::{self, BoxStream};
use futures::{future, Future, Stream, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Namespace, Secret, Service};
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use kube::runtime::controller::Action;
use kube::runtime::reflector::{self, Store};
use kube::runtime::watcher::{self, watcher, Event};
use kube::runtime::{Controller, WatchStreamExt};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::IntoFuture;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const RESYNC_TIMER: Duration = Duration::from_secs(60 * 5);
const DOMAIN_POLL_TIMER: Duration = Duration::from_secs(10);
const ERROR_RETRY_TIMER: Duration = Duration::from_secs(30);

/// Watches ingress intent and the objects it refers to, and runs a sync pass
/// whenever any of them change.
pub struct IngressController {
    kubernetes_client: Client,
    config: DriverConfig,
    sweep_interval: Duration,
    cancel: CancellationToken,
}

struct Context {
    driver: Arc<Driver>,
    ingresses: Store<Ingress>,
    cancel: CancellationToken,
}

type ChangeFeed = BoxStream<'static, ()>;

fn changed<K: Resource<DynamicType = ()>>(event: Result<Event<K>, watcher::Error>) -> Option<()> {
    match event {
        Ok(Event::Apply(_) | Event::Delete(_) | Event::InitDone) => Some(()),
        Ok(Event::Init | Event::InitApply(_)) => None,
        Err(err) => {
            warn!(kind = %K::kind(&()), error = %err, "watch failed");
            None
        }
    }
}

/// Starts a reflector for `K` and returns its store with a stream that
/// yields once per change.
fn reflect<K>(client: &Client, wc: &watcher::Config) -> (Store<K>, ChangeFeed)
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    let (store, writer) = reflector::store();
    let feed = watcher(Api::<K>::all(client.clone()), wc.clone())
        .default_backoff()
        .reflect(writer)
        .filter_map(|event| future::ready(changed(event)))
        .boxed();
    (store, feed)
}

fn managed(classes: &Store<IngressClass>, controller_name: &str, ingress: &Ingress) -> bool {
    let state = classes.state();
    ManagedClasses::new(state.iter().map(|class| &**class), controller_name).manages(ingress)
}

async fn reconcile(ingress: Arc<Ingress>, ctx: Arc<Context>) -> Result<Action, Arc<Error>> {
    // Compiling from a partial listing would delete resources of ingresses not seen yet.
    if ctx.ingresses.wait_until_ready().await.is_err() {
        return Ok(Action::await_change());
    }

    let key = ObjectKey::of::<Ingress>(&ingress);
    let report = ctx.driver.sync(SyncScope::Full, &ctx.cancel).await?;
    for diagnostic in report.diagnostics.for_object(INGRESS_KIND, &key) {
        debug!(ingress = %key, "{}", diagnostic.message);
    }

    if report.pending_domains.is_empty() {
        Ok(Action::requeue(RESYNC_TIMER))
    } else {
        debug!(
            ingress = %key,
            pending = report.pending_domains.len(),
            "domains still being reserved"
        );
        Ok(Action::requeue(DOMAIN_POLL_TIMER))
    }
}

fn error_policy(ingress: Arc<Ingress>, error: &Arc<Error>, _ctx: Arc<Context>) -> Action {
    match error.as_ref() {
        Error::Cancelled => Action::await_change(),
        _ => {
            warn!(ingress = %ObjectKey::of::<Ingress>(&ingress), %error, "failed to sync ingress");
            Action::requeue(ERROR_RETRY_TIMER)
        }
    }
}

/// Runs a full pass for every change on `feed` once `synced` is set.
async fn change_feed<S>(
    mut feed: S,
    driver: Arc<Driver>,
    synced: Arc<AtomicBool>,
    cancel: CancellationToken,
) where
    S: Stream<Item = ()> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = feed.next() => if next.is_none() {
                return;
            },
        }
        if !synced.load(Ordering::Acquire) {
            continue;
        }
        let (driver, cancel) = (driver.clone(), cancel.clone());
        tokio::spawn(async move {
            if let Err(err) = driver.sync(SyncScope::Full, &cancel).await {
                debug!(error = %err, "change triggered sync failed");
            }
        });
    }
}

impl IngressController {
    pub async fn start(self) -> anyhow::Result<()> {
        let wc = watcher::Config::default();
        let client = self.kubernetes_client;
        let cancel = self.cancel;
        info!(
            gateway_api = self.config.translate.enable_gateway_api,
            "starting ingress controller"
        );

        let (ingress_classes, class_feed) = reflect::<IngressClass>(&client, &wc);
        let (services, service_feed) = reflect::<Service>(&client, &wc);
        let (secrets, secret_feed) = reflect::<Secret>(&client, &wc);
        let (namespaces, namespace_feed) = reflect::<Namespace>(&client, &wc);
        let (traffic_policies, policy_feed) = reflect::<NgrokTrafficPolicy>(&client, &wc);
        let mut feeds = vec![class_feed, service_feed, secret_feed, namespace_feed, policy_feed];

        let gateway = if self.config.translate.enable_gateway_api {
            let (gateway_classes, gateway_class_feed) = reflect::<GatewayClass>(&client, &wc);
            let (gateways, gateway_feed) = reflect::<Gateway>(&client, &wc);
            let (http_routes, route_feed) = reflect::<HTTPRoute>(&client, &wc);
            let (reference_grants, grant_feed) = reflect::<ReferenceGrant>(&client, &wc);
            feeds.extend([gateway_class_feed, gateway_feed, route_feed, grant_feed]);
            Some(GatewayStores {
                gateway_classes,
                gateways,
                http_routes,
                reference_grants,
            })
        } else {
            None
        };

        // Deleted ingresses never reach the reconciler, so they go through the
        // change feed instead.
        let (deleted_tx, deleted_rx) = mpsc::unbounded();
        feeds.push(deleted_rx.boxed());

        let (ingress_store, ingress_writer) = reflector::store();
        let classes = ingress_classes.clone();
        let controller_name = self.config.translate.ingress_controller_name.clone();
        let ingress_watcher = watcher(Api::<Ingress>::all(client.clone()), wc.clone())
            .default_backoff()
            .reflect(ingress_writer)
            .inspect_ok(move |event| {
                if let Event::Delete(_) = event {
                    let _ = deleted_tx.unbounded_send(());
                }
            })
            .applied_objects()
            .try_filter(move |ingress| future::ready(managed(&classes, &controller_name, ingress)));

        let stores = Stores {
            ingresses: ingress_store.clone(),
            ingress_classes: ingress_classes.clone(),
            services: services.clone(),
            secrets: secrets.clone(),
            namespaces: namespaces.clone(),
            traffic_policies: traffic_policies.clone(),
            gateway: gateway.clone(),
        };
        let driver = Arc::new(Driver::new(
            Arc::new(stores),
            Clients::kube(client),
            self.config,
        ));

        let synced = Arc::new(AtomicBool::new(false));
        let feed = tokio::spawn(change_feed(
            stream::select_all(feeds),
            driver.clone(),
            synced.clone(),
            cancel.clone(),
        ));

        // NOTE: the change feed drives these reflectors, so it has to be running first.
        ingress_classes.wait_until_ready().await?;
        services.wait_until_ready().await?;
        secrets.wait_until_ready().await?;
        namespaces.wait_until_ready().await?;
        traffic_policies.wait_until_ready().await?;
        if let Some(gateway) = &gateway {
            gateway.gateway_classes.wait_until_ready().await?;
            gateway.gateways.wait_until_ready().await?;
            gateway.http_routes.wait_until_ready().await?;
            gateway.reference_grants.wait_until_ready().await?;
        }
        debug!("support reflectors are ready");

        let startup = {
            let (driver, ingresses, cancel) = (driver.clone(), ingress_store.clone(), cancel.clone());
            let sweep_interval = self.sweep_interval;
            tokio::spawn(async move {
                if ingresses.wait_until_ready().await.is_err() {
                    return;
                }
                synced.store(true, Ordering::Release);
                // Catches resources left behind by ingresses deleted while we were down.
                if let Err(err) = driver.sync(SyncScope::Full, &cancel).await {
                    warn!(error = %err, "initial sync failed");
                }
                driver.run_cleanup_sweep(sweep_interval, cancel).await;
            })
        };

        let ctx = Arc::new(Context {
            driver,
            ingresses: ingress_store.clone(),
            cancel: cancel.clone(),
        });

        Controller::for_stream(ingress_watcher, ingress_store)
            .graceful_shutdown_on(cancel.cancelled_owned())
            .run(reconcile, error_policy, ctx)
            .for_each(|result| async move {
                match result {
                    Ok((ingress, _)) => debug!(ingress = %ingress, "reconciled ingress"),
                    Err(err) => debug!(%err, "ingress reconcile loop error"),
                }
            })
            .await;

        startup.abort();
        feed.abort();
        info!("ingress controller stopped");
        Ok(())
    }

    pub fn try_new(
        kubernetes_client: Client,
        config: DriverConfig,
        sweep_interval: Duration,
        cancel: CancellationToken,
    ) -> anyhow::Result<IngressController> {
        if sweep_interval.is_zero() {
            anyhow::bail!("sweep interval must be greater than zero");
        }
        Ok(IngressController {
            kubernetes_client,
            config,
            sweep_interval,
            cancel,
        })
    }
}

impl IntoFuture for IngressController {
    type Output = anyhow::Result<()>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.start())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::INGRESS_CLASS_ANNOTATION;
    use crate::testutil::{ingress, ingress_class};
    use kube::runtime::reflector::store::Writer;

    fn class_store(classes: Vec<IngressClass>) -> Store<IngressClass> {
        let mut writer = Writer::default();
        for class in classes {
            writer.apply_watcher_event(&Event::Apply(class));
        }
        writer.as_reader()
    }

    #[test]
    fn ingresses_are_filtered_by_managed_class() {
        let classes = class_store(vec![
            ingress_class("ngrok", "k8s.ngrok.com/ingress-controller", false),
            ingress_class("nginx", "k8s.io/ingress-nginx", true),
        ]);
        let controller = "k8s.ngrok.com/ingress-controller";

        assert!(managed(&classes, controller, &ingress("default", "a").class("ngrok").build()));
        assert!(!managed(&classes, controller, &ingress("default", "b").class("nginx").build()));
        assert!(!managed(&classes, controller, &ingress("default", "c").build()));
        assert!(managed(
            &classes,
            controller,
            &ingress("default", "d")
                .annotate(INGRESS_CLASS_ANNOTATION, "ngrok")
                .build()
        ));
    }

    #[test]
    fn only_settled_events_count_as_changes() {
        let class = ingress_class("ngrok", "k8s.ngrok.com/ingress-controller", false);
        assert_eq!(changed(Ok(Event::Apply(class.clone()))), Some(()));
        assert_eq!(changed(Ok(Event::Delete(class.clone()))), Some(()));
        assert_eq!(changed::<IngressClass>(Ok(Event::InitDone)), Some(()));
        assert_eq!(changed(Ok(Event::InitApply(class))), None);
        assert_eq!(changed::<IngressClass>(Ok(Event::Init)), None);
    }
}
