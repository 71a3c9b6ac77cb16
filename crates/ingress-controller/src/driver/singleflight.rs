//! Keeps at most one sync pass in flight and folds bursts of requests into a
//! single trailing pass.
//!
//! States: idle, running, and running with waiters. While a pass runs, at most
//! one full request waits to go next; a newer full request releases the older
//! one (and whatever was attached to it) as superseded. Partial requests
//! attach to a waiting full request, or else queue in arrival order.

use std::collections::VecDeque;
use std::future::Future;
use std::mem;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The caller's own pass ran.
    Ran(T),
    /// Another caller's pass covered this request.
    Shared(T),
    /// A newer request replaced this one before it ran.
    Superseded,
}

enum Signal<T> {
    Run,
    Superseded,
    Done(T),
}

type Waiter<T> = oneshot::Sender<Signal<T>>;

struct PendingFull<T> {
    leader: Waiter<T>,
    followers: Vec<Waiter<T>>,
}

struct State<T> {
    running: bool,
    /// Callers waiting for the outcome of the running pass.
    attached: Vec<Waiter<T>>,
    pending_full: Option<PendingFull<T>>,
    pending_partials: VecDeque<Waiter<T>>,
}

impl<T> State<T> {
    fn park(&mut self, full: bool) -> oneshot::Receiver<Signal<T>> {
        let (tx, rx) = oneshot::channel();
        if full {
            let newer = PendingFull {
                leader: tx,
                followers: Vec::new(),
            };
            if let Some(older) = self.pending_full.replace(newer) {
                debug!(
                    released = older.followers.len() + 1,
                    "newer full sync supersedes the pending one"
                );
                for waiter in std::iter::once(older.leader).chain(older.followers) {
                    let _ = waiter.send(Signal::Superseded);
                }
            }
        } else if let Some(pending) = self.pending_full.as_mut() {
            pending.followers.push(tx);
        } else {
            self.pending_partials.push_back(tx);
        }
        rx
    }

    /// Hands the pass to the next waiter, or goes idle.
    fn promote(&mut self) {
        if let Some(pending) = self.pending_full.take() {
            let mut followers = pending.followers;
            followers.extend(self.pending_partials.drain(..));
            if pending.leader.send(Signal::Run).is_ok() {
                self.attached = followers;
                return;
            }
            self.pending_partials = followers.into();
        }
        while let Some(next) = self.pending_partials.pop_front() {
            if next.send(Signal::Run).is_ok() {
                return;
            }
        }
        self.running = false;
    }
}

pub struct Coordinator<T> {
    state: Mutex<State<T>>,
}

impl<T> Default for Coordinator<T> {
    fn default() -> Self {
        Coordinator {
            state: Mutex::new(State {
                running: false,
                attached: Vec::new(),
                pending_full: None,
                pending_partials: VecDeque::new(),
            }),
        }
    }
}

/// Returns the pass to the coordinator when the running caller finishes or
/// is dropped midway.
struct RunGuard<'a, T> {
    coordinator: &'a Coordinator<T>,
    finished: bool,
}

impl<T: Clone> RunGuard<'_, T> {
    fn finish(mut self, value: &T) {
        self.finished = true;
        let mut state = self.coordinator.lock();
        for waiter in mem::take(&mut state.attached) {
            let _ = waiter.send(Signal::Done(value.clone()));
        }
        state.promote();
    }
}

impl<T> Drop for RunGuard<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            self.coordinator.abandon();
        }
    }
}

/// A caller waiting for its turn. If it is dropped after the turn was
/// handed to it, the turn moves on to the next waiter.
struct Parked<'a, T> {
    coordinator: &'a Coordinator<T>,
    rx: oneshot::Receiver<Signal<T>>,
    settled: bool,
}

impl<T> Parked<'_, T> {
    async fn signal(mut self) -> Result<Signal<T>, oneshot::error::RecvError> {
        let signal = (&mut self.rx).await;
        self.settled = true;
        signal
    }
}

impl<T> Drop for Parked<'_, T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // Closing first means no turn can arrive after the check below.
        self.rx.close();
        if let Ok(Signal::Run) = self.rx.try_recv() {
            self.coordinator.abandon();
        }
    }
}

impl<T> Coordinator<T> {
    pub fn new() -> Self {
        Coordinator::default()
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // No holder leaves the state half updated, so poisoning is ignored.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Gives up a turn that produced no outcome.
    fn abandon(&self) {
        let mut state = self.lock();
        // Nobody produced an outcome for these, so they run on their own.
        let attached = mem::take(&mut state.attached);
        for waiter in attached.into_iter().rev() {
            state.pending_partials.push_front(waiter);
        }
        state.promote();
    }
}

impl<T: Clone> Coordinator<T> {
    /// Runs `pass` once it is this caller's turn, unless another pass ends up
    /// covering the request first.
    pub async fn run<F, Fut>(&self, full: bool, pass: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            let parked = {
                let mut state = self.lock();
                if state.running {
                    Some(Parked {
                        coordinator: self,
                        rx: state.park(full),
                        settled: false,
                    })
                } else {
                    state.running = true;
                    None
                }
            };

            if let Some(parked) = parked {
                match parked.signal().await {
                    Ok(Signal::Run) => {}
                    Ok(Signal::Superseded) => return Outcome::Superseded,
                    Ok(Signal::Done(value)) => return Outcome::Shared(value),
                    Err(_) => continue,
                }
            }

            let guard = RunGuard {
                coordinator: self,
                finished: false,
            };
            let value = pass().await;
            guard.finish(&value);
            return Outcome::Ran(value);
        }
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        let state = self.lock();
        state
            .pending_full
            .as_ref()
            .map_or(0, |pending| pending.followers.len() + 1)
            + state.pending_partials.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;
    use tokio::task::JoinHandle;

    struct Harness {
        coordinator: Arc<Coordinator<usize>>,
        runs: Arc<AtomicUsize>,
        gate: Arc<Notify>,
    }

    impl Harness {
        fn new() -> Self {
            Harness {
                coordinator: Arc::new(Coordinator::new()),
                runs: Arc::new(AtomicUsize::new(0)),
                gate: Arc::new(Notify::new()),
            }
        }

        /// Starts a pass that blocks until the gate opens.
        async fn start_slow(&self) -> JoinHandle<Outcome<usize>> {
            let (coordinator, runs, gate) =
                (self.coordinator.clone(), self.runs.clone(), self.gate.clone());
            let handle = tokio::spawn(async move {
                coordinator
                    .run(true, || async move {
                        let run = runs.fetch_add(1, Ordering::SeqCst) + 1;
                        gate.notified().await;
                        run
                    })
                    .await
            });
            while self.runs.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
            handle
        }

        fn trigger(&self, full: bool) -> JoinHandle<Outcome<usize>> {
            let (coordinator, runs) = (self.coordinator.clone(), self.runs.clone());
            tokio::spawn(async move {
                coordinator
                    .run(full, || async move { runs.fetch_add(1, Ordering::SeqCst) + 1 })
                    .await
            })
        }
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn outcomes(handles: Vec<JoinHandle<Outcome<usize>>>) -> Vec<Outcome<usize>> {
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }
        outcomes
    }

    #[tokio::test]
    async fn bursts_coalesce_into_one_trailing_pass() {
        let harness = Harness::new();
        let first = harness.start_slow().await;

        let triggers: Vec<_> = (0..10).map(|i| harness.trigger(i % 2 == 0)).collect();
        settle().await;
        assert_eq!(harness.coordinator.queued(), 2);

        harness.gate.notify_one();
        assert_eq!(first.await.unwrap(), Outcome::Ran(1));
        let outcomes = outcomes(triggers).await;

        assert_eq!(harness.runs.load(Ordering::SeqCst), 2);
        assert_eq!(outcomes[8], Outcome::Ran(2));
        assert_eq!(outcomes[9], Outcome::Shared(2));
        assert!(outcomes[..8].iter().all(|o| *o == Outcome::Superseded));
        assert_eq!(harness.coordinator.queued(), 0);
    }

    #[tokio::test]
    async fn partials_queue_in_order() {
        let harness = Harness::new();
        let first = harness.start_slow().await;

        let triggers = vec![harness.trigger(false), harness.trigger(false)];
        settle().await;
        assert_eq!(harness.coordinator.queued(), 2);

        harness.gate.notify_one();
        first.await.unwrap();
        assert_eq!(
            outcomes(triggers).await,
            vec![Outcome::Ran(2), Outcome::Ran(3)]
        );
    }

    #[tokio::test]
    async fn full_pass_preempts_queued_partials() {
        let harness = Harness::new();
        let first = harness.start_slow().await;

        let partial = harness.trigger(false);
        settle().await;
        let full = harness.trigger(true);
        settle().await;

        harness.gate.notify_one();
        first.await.unwrap();
        assert_eq!(
            outcomes(vec![full, partial]).await,
            vec![Outcome::Ran(2), Outcome::Shared(2)]
        );
        assert_eq!(harness.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropped_pass_hands_over() {
        let harness = Harness::new();
        let first = harness.start_slow().await;
        let next = harness.trigger(true);
        settle().await;

        first.abort();
        let _ = first.await;
        assert_eq!(outcomes(vec![next]).await, vec![Outcome::Ran(2)]);
    }

    #[tokio::test]
    async fn dropped_waiter_passes_its_turn_on() {
        let harness = Harness::new();
        let first = harness.start_slow().await;

        let mut waiter = Box::pin(harness.coordinator.run(true, || async { 0 }));
        assert!(futures::poll!(waiter.as_mut()).is_pending());
        assert_eq!(harness.coordinator.queued(), 1);

        harness.gate.notify_one();
        assert_eq!(first.await.unwrap(), Outcome::Ran(1));
        // The turn was handed over but never taken.
        drop(waiter);

        let later = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            harness.coordinator.run(true, || async { 7 }),
        )
        .await;
        assert_eq!(later.unwrap(), Outcome::Ran(7));
    }

    #[tokio::test]
    async fn dropped_waiter_is_skipped_before_its_turn() {
        let harness = Harness::new();
        let first = harness.start_slow().await;

        let mut waiter = Box::pin(harness.coordinator.run(false, || async { 0 }));
        assert!(futures::poll!(waiter.as_mut()).is_pending());
        drop(waiter);
        let next = harness.trigger(false);
        settle().await;

        harness.gate.notify_one();
        first.await.unwrap();
        assert_eq!(outcomes(vec![next]).await, vec![Outcome::Ran(2)]);
    }
}
