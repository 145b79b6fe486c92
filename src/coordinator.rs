use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::{
    classify::{classify, Outcome},
    BatchRequest, Completion, CoordinatorOptions, Dialog, DialogButton, DialogReply,
    DismissDialog, EndpointConfig, EndpointRegistry, EndpointTable, HttpTransport, RequestError,
    RequestResult, RetryDecision, RetryPolicy, RetryPrompt, RetryState, Scheduler, Settled,
    TimerCallback, TimerHandle, TokioScheduler, Transport,
};

const DIALOG_CHECK_TIMER: &str = "schedule_retry_dialog_check";
const DIALOG_RESET_TIMER: &str = "reset_retry_dialog";

fn retry_timer_key(key: &str) -> String {
    format!("retry_request_{key}")
}

/// Hook observing the final outcome of a replayed request.
type SettleHook = Arc<dyn Fn(&RequestResult) + Send + Sync>;

/// Where the outcome of one request chain goes. Moves from attempt to
/// attempt so the chain delivers exactly once however many it takes.
struct Delivery {
    completion: Completion,
    hook: Option<SettleHook>,
}

impl Delivery {
    fn new(completion: Completion) -> Self {
        Self {
            completion,
            hook: None,
        }
    }

    fn deliver(&self, outcome: RequestResult) {
        (self.completion)(outcome.clone());
        if let Some(hook) = &self.hook {
            hook(&outcome);
        }
    }
}

/// Latest call per endpoint key, replayed by a confirmed retry prompt.
#[derive(Clone)]
struct PendingRequest {
    params: serde_json::Value,
    completion: Completion,
}

/// Request chain waiting on its backoff timer.
struct ArmedRetry {
    attempt: u32,
    timer: TimerHandle,
    params: serde_json::Value,
    delivery: Delivery,
}

#[derive(Default)]
struct SessionState {
    /// Bumped by `cleanup`; outcomes and timers from older generations are dropped.
    generation: u64,
    retry: HashMap<String, RetryState>,
    pending: HashMap<String, PendingRequest>,
    armed: HashMap<String, ArmedRetry>,
    failed: BTreeSet<String>,
    dialog_shown: bool,
}

struct Inner {
    runtime: Option<Handle>,
    registry: Arc<dyn EndpointRegistry>,
    transport: Option<Arc<dyn Transport>>,
    scheduler: Arc<dyn Scheduler>,
    dialog: Arc<dyn Dialog>,
    policy: RetryPolicy,
    dialog_debounce: Duration,
    dialog_reset_delay: Duration,
    state: Mutex<SessionState>,
}

/// Dispatches requests to logical endpoints with per-endpoint backoff,
/// batch sessions and a single aggregated retry prompt.
///
/// Cloning is cheap; clones share state. Work is spawned on the tokio
/// runtime captured when the coordinator was built, so requests and prompt
/// replies may come from threads outside it.
#[derive(Clone)]
pub struct RequestCoordinator {
    inner: Arc<Inner>,
}

impl fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("RequestCoordinator")
            .field("ready", &self.inner.transport.is_some())
            .field("policy", &self.inner.policy)
            .field("failed", &state.failed)
            .field("dialog_shown", &state.dialog_shown)
            .finish()
    }
}

/// Assembles a [`RequestCoordinator`] from its collaborators.
///
/// Unset collaborators default to the built-in endpoint table, a reqwest
/// transport, a tokio scheduler and [`DismissDialog`]. The runtime defaults
/// to the one current at [`build`](Self::build).
#[derive(Default)]
pub struct CoordinatorBuilder {
    options: CoordinatorOptions,
    runtime: Option<Handle>,
    registry: Option<Arc<dyn EndpointRegistry>>,
    transport: Option<Arc<dyn Transport>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    dialog: Option<Arc<dyn Dialog>>,
}

impl CoordinatorBuilder {
    pub fn options(mut self, options: CoordinatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn registry(mut self, registry: impl EndpointRegistry + 'static) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    pub fn dialog(mut self, dialog: impl Dialog + 'static) -> Self {
        self.dialog = Some(Arc::new(dialog));
        self
    }

    /// Builds the coordinator. Readiness is decided here: if no transport
    /// was given and the HTTP client cannot be built, every request fails
    /// with [`RequestError::NotReady`].
    pub fn build(self) -> RequestCoordinator {
        let options = self.options;
        let runtime = self.runtime.or_else(|| Handle::try_current().ok());
        let transport = self.transport.or_else(|| match HttpTransport::new(&options) {
            Ok(transport) => Some(Arc::new(transport) as Arc<dyn Transport>),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %_err, "http transport unavailable; requests will fail");
                None
            }
        });

        let scheduler: Arc<dyn Scheduler> = match (self.scheduler, &runtime) {
            (Some(scheduler), _) => scheduler,
            (None, Some(handle)) => Arc::new(TokioScheduler::with_handle(handle.clone())),
            (None, None) => Arc::new(TokioScheduler::new()),
        };

        RequestCoordinator {
            inner: Arc::new(Inner {
                scheduler,
                runtime,
                registry: self
                    .registry
                    .unwrap_or_else(|| Arc::new(EndpointTable::builtin())),
                transport,
                dialog: self.dialog.unwrap_or_else(|| Arc::new(DismissDialog)),
                policy: RetryPolicy::from(&options),
                dialog_debounce: Duration::from_millis(options.dialog_debounce_ms),
                dialog_reset_delay: Duration::from_millis(options.dialog_reset_delay_ms),
                state: Mutex::new(SessionState::default()),
            }),
        }
    }
}

impl RequestCoordinator {
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    /// Coordinator for the built-in endpoints over HTTP.
    pub fn new(options: CoordinatorOptions) -> Self {
        Self::builder().options(options).build()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.transport.is_some()
    }

    /// Issues a request; the outcome is delivered to `on_complete`.
    ///
    /// Unknown endpoints and an unready transport are reported before this
    /// returns. Retryable failures stay invisible until the endpoint's
    /// retries are exhausted.
    pub fn request<F>(&self, key: &str, params: serde_json::Value, on_complete: F)
    where
        F: Fn(RequestResult) + Send + Sync + 'static,
    {
        self.inner
            .start(key, params, Delivery::new(Arc::new(on_complete)));
    }

    /// Awaitable form of [`request`](Self::request).
    ///
    /// Resolves to [`RequestError::Abandoned`] if [`cleanup`](Self::cleanup)
    /// discards the request first.
    pub async fn call(&self, key: &str, params: serde_json::Value) -> RequestResult {
        let (completion, receiver) = completion_channel(None);
        self.inner.start(key, params, Delivery::new(completion));
        receiver.await.unwrap_or(Err(RequestError::Abandoned))
    }

    /// Runs several requests as one session and waits for every entry to
    /// settle. Previous failure tracking and prompt state are discarded
    /// first. The aggregate never fails; each entry settles on its own
    /// terminal outcome.
    pub async fn batch_request(&self, requests: Vec<BatchRequest>) -> Vec<Settled> {
        if !self.is_ready() {
            return requests
                .into_iter()
                .map(|request| {
                    if let Some(callback) = &request.on_complete {
                        callback(Err(RequestError::NotReady));
                    }
                    Settled::Rejected(RequestError::NotReady)
                })
                .collect();
        }

        {
            let mut state = self.inner.state();
            state.failed.clear();
            state.dialog_shown = false;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(count = requests.len(), "starting batch session");

        let receivers: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let (completion, receiver) = completion_channel(request.on_complete);
                self.inner
                    .start(&request.key, request.params, Delivery::new(completion));
                receiver
            })
            .collect();

        let mut settled = Vec::with_capacity(receivers.len());
        for receiver in receivers {
            let outcome = receiver.await.unwrap_or(Err(RequestError::Abandoned));
            settled.push(Settled::from(outcome));
        }
        settled
    }

    /// Hard reset of all retry, replay, failure and prompt state. Pending
    /// retry timers are cancelled and their requests abandoned; outcomes of
    /// requests still in flight are dropped.
    pub fn cleanup(&self) {
        let armed: Vec<ArmedRetry> = {
            let mut state = self.inner.state();
            state.generation = state.generation.wrapping_add(1);
            state.retry.clear();
            state.pending.clear();
            state.failed.clear();
            state.dialog_shown = false;

            #[cfg(feature = "tracing")]
            tracing::debug!(
                generation = state.generation,
                cancelled = state.armed.len(),
                "request coordinator reset"
            );
            state.armed.drain().map(|(_, armed)| armed).collect()
        };
        for armed in armed {
            armed.timer.cancel();
        }
    }

    /// Endpoint keys whose retries are exhausted, in key order.
    pub fn failed_requests(&self) -> Vec<String> {
        self.inner.state().failed.iter().cloned().collect()
    }

    pub fn retry_state(&self, key: &str) -> Option<RetryState> {
        self.inner.state().retry.get(key).copied()
    }

    pub fn is_dialog_shown(&self) -> bool {
        self.inner.state().dialog_shown
    }
}

/// Completion forwarding the first outcome into a oneshot channel, after
/// invoking the caller's own continuation.
fn completion_channel(
    user: Option<Completion>,
) -> (Completion, oneshot::Receiver<RequestResult>) {
    let (sender, receiver) = oneshot::channel();
    let sender = Mutex::new(Some(sender));
    let completion: Completion = Arc::new(move |outcome: RequestResult| {
        if let Some(callback) = &user {
            callback(outcome.clone());
        }
        let sender = sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            // The receiver may already be gone; nothing to report then.
            let _ = sender.send(outcome);
        }
    });
    (completion, receiver)
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(self: &Arc<Self>, key: &str, params: serde_json::Value, delivery: Delivery) {
        let Some(transport) = self.transport.clone() else {
            delivery.deliver(Err(RequestError::NotReady));
            return;
        };
        let Some(endpoint) = self.registry.lookup(key) else {
            #[cfg(feature = "tracing")]
            tracing::warn!(key, "request for unknown endpoint");
            delivery.deliver(Err(RequestError::Config {
                key: key.to_owned(),
            }));
            return;
        };
        let Some(runtime) = self
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
        else {
            #[cfg(feature = "tracing")]
            tracing::error!(key, "request issued outside a tokio runtime");
            delivery.deliver(Err(RequestError::NotReady));
            return;
        };

        let generation = {
            let mut state = self.state();
            if endpoint.retry_enabled {
                state.retry.entry(key.to_owned()).or_default();
            }
            state.pending.insert(
                key.to_owned(),
                PendingRequest {
                    params: params.clone(),
                    completion: Arc::clone(&delivery.completion),
                },
            );
            state.generation
        };

        let inner = Arc::clone(self);
        let key = key.to_owned();
        runtime.spawn(async move {
            let result = transport
                .send(endpoint.method, &endpoint.path, &params)
                .await;
            inner.settle(&key, &endpoint, params, delivery, generation, classify(result));
        });
    }

    fn settle(
        self: &Arc<Self>,
        key: &str,
        endpoint: &EndpointConfig,
        params: serde_json::Value,
        delivery: Delivery,
        generation: u64,
        outcome: Outcome,
    ) {
        if self.state().generation != generation {
            #[cfg(feature = "tracing")]
            tracing::debug!(key, "dropping outcome from before cleanup");
            return;
        }

        match outcome {
            Outcome::Success(data) => {
                let superseded = {
                    let mut state = self.state();
                    state.failed.remove(key);
                    if endpoint.retry_enabled {
                        state.retry.insert(key.to_owned(), RetryState::default());
                        state.armed.remove(key)
                    } else {
                        None
                    }
                };
                delivery.deliver(Ok(data));

                // The endpoint answered; a chain still waiting out its backoff
                // goes now, and its timer key is free for the next failure.
                if let Some(armed) = superseded {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(key, attempt = armed.attempt, "replaying backed-off request early");
                    armed.timer.cancel();
                    self.start(key, armed.params, armed.delivery);
                }
            }
            Outcome::Terminal(err) => delivery.deliver(Err(err)),
            Outcome::Retryable(err) => self.retry_or_fail(key, endpoint, params, delivery, err),
        }
    }

    fn retry_or_fail(
        self: &Arc<Self>,
        key: &str,
        endpoint: &EndpointConfig,
        params: serde_json::Value,
        delivery: Delivery,
        err: RequestError,
    ) {
        if !endpoint.retry_enabled {
            delivery.deliver(Err(err));
            return;
        }

        let (decision, generation) = {
            let mut state = self.state();
            let generation = state.generation;
            let decision = state
                .retry
                .get_mut(key)
                .map(|retry| retry.on_retryable_failure(&self.policy));
            (decision, generation)
        };

        match decision {
            None => delivery.deliver(Err(err)),
            Some(RetryDecision::AlreadyRetrying) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(key, error = %err, "retry already pending; dropping failure");
                // Retry-all bookkeeping still needs to see this chain end.
                if let Some(hook) = &delivery.hook {
                    hook(&Err(err));
                }
            }
            Some(RetryDecision::Exhausted) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    key,
                    max_attempts = self.policy.max_attempts,
                    error = %err,
                    "retries exhausted"
                );
                self.state().failed.insert(key.to_owned());
                self.schedule_dialog_check();
                delivery.deliver(Err(err));
            }
            Some(RetryDecision::Schedule { attempt, delay }) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "scheduling retry"
                );
                let weak = Arc::downgrade(self);
                let owned_key = key.to_owned();
                let callback: TimerCallback = Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_retry_timer(&owned_key, attempt, generation);
                    }
                });

                // Armed under the state lock so the timer cannot look for its
                // chain before the chain is stored.
                let unarmed = {
                    let mut state = self.state();
                    if state.generation != generation {
                        return;
                    }
                    match self.scheduler.delay(&retry_timer_key(key), callback, delay) {
                        Ok(timer) => {
                            state.armed.insert(
                                key.to_owned(),
                                ArmedRetry {
                                    attempt,
                                    timer,
                                    params,
                                    delivery,
                                },
                            );
                            None
                        }
                        Err(schedule_err) => {
                            if let Some(retry) = state.retry.get_mut(key) {
                                retry.abandon_retry();
                            }
                            Some((delivery, schedule_err))
                        }
                    }
                };

                if let Some((delivery, _schedule_err)) = unarmed {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(key, error = %_schedule_err, "could not arm retry timer");
                    delivery.deliver(Err(err));
                }
            }
        }
    }

    fn on_retry_timer(self: &Arc<Self>, key: &str, attempt: u32, generation: u64) {
        let armed = {
            let mut state = self.state();
            if state.generation != generation {
                #[cfg(feature = "tracing")]
                tracing::debug!(key, attempt, "ignoring retry timer from before cleanup");
                return;
            }
            match state.armed.remove(key) {
                Some(armed) if armed.attempt == attempt => {
                    if let Some(retry) = state.retry.get_mut(key) {
                        retry.on_timer_fired(attempt);
                    }
                    armed
                }
                Some(other) => {
                    state.armed.insert(key.to_owned(), other);
                    return;
                }
                // Taken over by an early replay or cleanup.
                None => return,
            }
        };
        self.start(key, armed.params, armed.delivery);
    }

    fn schedule_dialog_check(self: &Arc<Self>) {
        let failed = {
            let state = self.state();
            if state.dialog_shown {
                return;
            }
            state.failed.len()
        };
        if failed == 0 {
            return;
        }

        // The first failure is checked on the next tick so that failures
        // landing at the same instant are reported together.
        let delay = if failed == 1 {
            Duration::ZERO
        } else {
            self.dialog_debounce
        };
        let weak = Arc::downgrade(self);
        let scheduled = self.scheduler.delay(
            DIALOG_CHECK_TIMER,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.check_and_show_dialog();
                }
            }),
            delay,
        );
        if scheduled.is_err() {
            #[cfg(feature = "tracing")]
            tracing::trace!(failed, "retry prompt check already pending");
        }
    }

    fn check_and_show_dialog(self: &Arc<Self>) {
        let failed = {
            let mut state = self.state();
            if state.failed.is_empty() || state.dialog_shown {
                return;
            }
            state.dialog_shown = true;
            state.failed.len()
        };

        #[cfg(feature = "tracing")]
        tracing::info!(failed, "showing retry prompt");

        let weak = Arc::downgrade(self);
        self.dialog.confirm(
            RetryPrompt::for_failures(failed),
            DialogReply::new(move |button| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_dialog_choice(button);
                }
            }),
        );
    }

    fn on_dialog_choice(self: &Arc<Self>, button: DialogButton) {
        #[cfg(feature = "tracing")]
        tracing::info!(?button, "retry prompt answered");

        match button {
            DialogButton::Left => {
                let mut state = self.state();
                state.failed.clear();
                state.dialog_shown = false;
            }
            DialogButton::Right => self.retry_all_failed(),
        }
    }

    fn retry_all_failed(self: &Arc<Self>) {
        let snapshot: Vec<String> = {
            let mut state = self.state();
            if state.failed.is_empty() {
                state.dialog_shown = false;
                return;
            }
            state.failed.iter().cloned().collect()
        };

        let total = snapshot.len();
        let completed = Arc::new(AtomicUsize::new(0));

        for key in snapshot {
            let replayable = self
                .registry
                .lookup(&key)
                .is_some_and(|endpoint| endpoint.retry_enabled);
            let replay = if replayable {
                let mut state = self.state();
                let pending = state.pending.get(&key).cloned();
                if pending.is_some() {
                    state.retry.insert(key.clone(), RetryState::default());
                }
                pending
            } else {
                None
            };

            let Some(pending) = replay else {
                self.on_retry_completed(completed.fetch_add(1, Ordering::SeqCst) + 1, total);
                continue;
            };

            let weak = Arc::downgrade(self);
            let hook_key = key.clone();
            let hook_completed = Arc::clone(&completed);
            let hook: SettleHook = Arc::new(move |outcome: &RequestResult| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if outcome.is_ok() {
                    inner.state().failed.remove(&hook_key);
                }
                inner.on_retry_completed(hook_completed.fetch_add(1, Ordering::SeqCst) + 1, total);
            });

            self.start(
                &key,
                pending.params,
                Delivery {
                    completion: pending.completion,
                    hook: Some(hook),
                },
            );
        }
    }

    fn on_retry_completed(self: &Arc<Self>, completed: usize, total: usize) {
        if completed != total {
            return;
        }

        let remaining = self.state().failed.len();
        if remaining == 0 {
            self.state().dialog_shown = false;
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(remaining, "retry-all finished with failures");

        let weak = Arc::downgrade(self);
        let scheduled = self.scheduler.delay(
            DIALOG_RESET_TIMER,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.state().dialog_shown = false;
                }
            }),
            self.dialog_reset_delay,
        );
        if scheduled.is_err() {
            #[cfg(feature = "tracing")]
            tracing::trace!("retry prompt reset already pending");
        }
    }
}
