use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, OnceLock},
};

#[cfg(doc)]
use crate::Error;
use crate::{
    cache::SnapshotCache,
    event_queue::EventQueue,
    events::{Event, EventValue},
    snapshot_store::SnapshotStore,
    transport::{Endpoint, Transport},
    ClientConfig, DynamicConfig, InitHandle, Result, SdkMetadata, Snapshot, User,
};

/// Readiness of the client, derived from its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// No snapshot: not initialized yet, or initialization finished without any snapshot.
    NotReady,
    /// A snapshot (fresh or cached) is available.
    Ready,
    /// A user update invalidated the snapshot and the new one has not arrived yet.
    Pending,
}

/// Options for [`Client::initialize()`].
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Use this stable id instead of the persisted one.
    pub override_stable_id: Option<String>,
}

/// Lifecycle of the client. Readiness is derived from this and the presence of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Uninitialized,
    /// `initialize()` has set up the event queue and identity. A fetch may still be running.
    Initialized,
    /// `update_user()` dropped the snapshot and the replacement fetch has not finished.
    Invalidated,
}

struct ClientState {
    status: Status,
    user: Arc<User>,
    metadata: Option<SdkMetadata>,
    /// Incremented every time a fetch is started. Results of older fetches are discarded.
    generation: u64,
    shut_down: bool,
}

struct Shared {
    config: ClientConfig,
    cache: SnapshotCache,
    snapshot: SnapshotStore,
    state: Mutex<ClientState>,
    transport: OnceLock<Arc<dyn Transport>>,
    queue: OnceLock<EventQueue>,
}

/// Parameters of a fetch, captured under the state lock.
struct FetchRequest {
    generation: u64,
    user: Arc<User>,
    metadata: SdkMetadata,
    since_time: Option<i64>,
}

/// A client for the gatekit API.
///
/// In order to create a client instance, first create [`ClientConfig`]. The client is inert until
/// [`Client::initialize()`] is called: all gates are off, configs are absent and logged events
/// are dropped.
///
/// # Examples
/// ```no_run
/// # use gatekit::{ClientConfig, InitOptions, User};
/// let client = ClientConfig::from_api_key("client-key").to_client();
/// client.initialize(User::with_user_id("user-123"), InitOptions::default())?;
///
/// if client.check_gate("new_checkout") {
///     // ...
/// }
/// client.log_event_with_value("purchase", 9.99, None);
///
/// client.shutdown()?;
/// # Ok::<(), gatekit::Error>(())
/// ```
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Create a new `Client` using the specified configuration.
    ///
    /// ```
    /// # use gatekit::{ClientConfig, Client};
    /// let client = Client::new(ClientConfig::from_api_key("client-key"));
    /// ```
    pub fn new(config: ClientConfig) -> Self {
        Client {
            shared: Arc::new(Shared {
                cache: SnapshotCache::new(config.storage.clone()),
                config,
                snapshot: SnapshotStore::new(),
                state: Mutex::new(ClientState {
                    status: Status::Uninitialized,
                    user: Arc::new(User::default()),
                    metadata: None,
                    generation: 0,
                    shut_down: false,
                }),
                transport: OnceLock::new(),
                queue: OnceLock::new(),
            }),
        }
    }

    /// Initialize the client for `user`.
    ///
    /// A snapshot cached by a previous session for the same user is loaded synchronously, so
    /// lookups made before the network round trip completes return best-effort cached values.
    /// A fresh snapshot is then fetched in the background; the returned [`InitHandle`] resolves
    /// once it is stored (or once the fetch fails).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidApiKey`] or [`Error::InvalidBaseUrl`] if the configuration is invalid.
    /// - [`Error::AlreadyInitialized`] if `initialize()` has already been called. The client is
    ///   left untouched.
    /// - IO Error if the background threads failed to start.
    pub fn initialize(&self, user: User, options: InitOptions) -> Result<InitHandle> {
        let shared = &self.shared;
        let transport = shared.config.build_transport()?;

        let request = {
            let mut state = shared.lock_state();
            if state.status != Status::Uninitialized {
                log::debug!(target: "gatekit", "initialize() called more than once, ignoring");
                return Err(crate::Error::AlreadyInitialized);
            }

            let identity = &shared.config.identity_provider;
            let stable_id = match options.override_stable_id {
                Some(stable_id) => stable_id,
                None => identity.stable_id(&*shared.config.storage),
            };
            let metadata = shared.metadata(stable_id, identity.new_session_id());

            let queue = EventQueue::new(
                shared.config.event_queue.clone(),
                transport.clone(),
                metadata.clone(),
            )?;
            // Both slots are empty: they are only set here, guarded by the status check.
            let _ = shared.queue.set(queue);
            let _ = shared.transport.set(transport);

            let since_time = shared.cache.load(&user).map(|cached| {
                log::debug!(target: "gatekit", "loaded cached snapshot");
                let since_time = cached.time;
                shared.snapshot.set(Arc::new(cached));
                since_time
            });

            state.status = Status::Initialized;
            state.user = Arc::new(user);
            state.metadata = Some(metadata.clone());
            state.generation += 1;

            FetchRequest {
                generation: state.generation,
                user: state.user.clone(),
                metadata,
                since_time,
            }
        };

        Ok(Shared::start_fetch(shared, request))
    }

    /// Switch the client to `user`.
    ///
    /// The current snapshot and the on-disk cache are dropped immediately, so lookups behave as
    /// not ready ([`Readiness::Pending`]) until the new snapshot arrives. Pending events are
    /// flushed. If the user identity (`user_id`) changed, the stable id is rotated and exposures
    /// become reportable again; attribute-only updates keep exposure deduplication. The session
    /// id is always rotated.
    ///
    /// If the client is not initialized, the returned handle resolves to
    /// [`Error::NotInitialized`] and nothing changes.
    pub fn update_user(&self, user: User) -> InitHandle {
        let shared = &self.shared;

        let request = {
            let mut state = shared.lock_state();
            let (Some(queue), Some(metadata)) = (shared.queue.get(), state.metadata.clone())
            else {
                log::warn!(target: "gatekit", "update_user() called before initialize()");
                return InitHandle::completed(Err(crate::Error::NotInitialized));
            };

            // Clear the cache first: a crash during the update must not resurrect the previous
            // user's snapshot on next cold start.
            shared.cache.clear();
            shared.snapshot.clear();
            state.status = Status::Invalidated;

            let identity = &shared.config.identity_provider;
            let stable_id = if state.user.same_identity(&user) {
                queue.flush();
                metadata.stable_id
            } else {
                queue.reset();
                identity.new_stable_id(&*shared.config.storage)
            };
            let metadata = shared.metadata(stable_id, identity.new_session_id());
            queue.set_metadata(metadata.clone());

            log::debug!(target: "gatekit", "updating user");
            state.user = Arc::new(user);
            state.metadata = Some(metadata.clone());
            state.generation += 1;

            FetchRequest {
                generation: state.generation,
                user: state.user.clone(),
                metadata,
                since_time: None,
            }
        };

        Shared::start_fetch(shared, request)
    }

    /// Check the value of a gate for the current user, logging an exposure.
    ///
    /// Returns `false` if the client is not ready or the gate does not exist.
    pub fn check_gate(&self, name: &str) -> bool {
        self.check_gate_inner(name, true)
    }

    /// Check the value of a gate without logging an exposure.
    pub fn check_gate_without_exposure(&self, name: &str) -> bool {
        self.check_gate_inner(name, false)
    }

    /// Get a dynamic config for the current user, logging an exposure if the config exists.
    ///
    /// Returns `None` if the client is not ready or the config does not exist.
    pub fn get_config(&self, name: &str) -> Option<DynamicConfig> {
        self.get_config_inner(name, true)
    }

    /// Get a dynamic config without logging an exposure.
    pub fn get_config_without_exposure(&self, name: &str) -> Option<DynamicConfig> {
        self.get_config_inner(name, false)
    }

    /// Get an experiment for the current user. Experiments are served as dynamic configs.
    pub fn get_experiment(&self, name: &str) -> Option<DynamicConfig> {
        self.get_config_inner(name, true)
    }

    /// Log a custom event for the current user.
    ///
    /// Events logged while the client is not ready are dropped, not buffered.
    pub fn log_event(
        &self,
        name: &str,
        value: Option<EventValue>,
        metadata: Option<HashMap<String, String>>,
    ) {
        let shared = &self.shared;
        let state = shared.lock_state();
        if state.shut_down || shared.snapshot.get().is_none() {
            log::trace!(target: "gatekit", event_name = name; "client is not ready, dropping event");
            return;
        }
        let Some(queue) = shared.queue.get() else {
            return;
        };
        queue.enqueue(Event::new(name, value, metadata, Some(&*state.user)));
    }

    /// Log a custom event with a numeric or string value.
    ///
    /// ```
    /// # fn test(client: &gatekit::Client) {
    /// client.log_event_with_value("purchase", 9.99, None);
    /// client.log_event_with_value("add_to_cart", "SKU-123", None);
    /// # }
    /// ```
    pub fn log_event_with_value(
        &self,
        name: &str,
        value: impl Into<EventValue>,
        metadata: Option<HashMap<String, String>>,
    ) {
        self.log_event(name, Some(value.into()), metadata);
    }

    /// Log a custom event with metadata only.
    pub fn log_event_with_metadata(&self, name: &str, metadata: HashMap<String, String>) {
        self.log_event(name, None, Some(metadata));
    }

    /// Current readiness of the client.
    pub fn readiness(&self) -> Readiness {
        let state = self.shared.lock_state();
        match (self.shared.snapshot.get(), state.status) {
            (Some(_), _) => Readiness::Ready,
            (None, Status::Invalidated) => Readiness::Pending,
            (None, _) => Readiness::NotReady,
        }
    }

    /// Returns `true` if lookups are served from a snapshot.
    pub fn is_ready(&self) -> bool {
        self.readiness() == Readiness::Ready
    }

    /// The user lookups are evaluated for.
    pub fn current_user(&self) -> User {
        (*self.shared.lock_state().user).clone()
    }

    /// Stable id attached to telemetry. `None` before initialization.
    pub fn stable_id(&self) -> Option<String> {
        let state = self.shared.lock_state();
        state.metadata.as_ref().map(|m| m.stable_id.clone())
    }

    /// Session id attached to telemetry. `None` before initialization.
    pub fn session_id(&self) -> Option<String> {
        let state = self.shared.lock_state();
        state.metadata.as_ref().map(|m| m.session_id.clone())
    }

    /// Flush buffered events and stop the event queue.
    ///
    /// Call this on process (or activity) teardown to avoid losing buffered events. Readiness is
    /// not affected: lookups keep working, but exposures and events are no longer logged.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerPanicked`] if the event queue worker has panicked.
    pub fn shutdown(&self) -> Result<()> {
        self.shared.lock_state().shut_down = true;
        match self.shared.queue.get() {
            Some(queue) => queue.shutdown(),
            None => Ok(()),
        }
    }

    fn check_gate_inner(&self, name: &str, log_exposure: bool) -> bool {
        let shared = &self.shared;
        let state = shared.lock_state();
        let Some(snapshot) = shared.snapshot.get() else {
            log::trace!(target: "gatekit", gate = name; "checking a gate before the client is ready");
            return false;
        };

        let gate = snapshot.gate(&*shared.config.key_hasher, name);
        let value = gate.map(|gate| gate.value).unwrap_or(false);
        log::trace!(target: "gatekit", gate = name, value = value; "checked gate");

        if log_exposure && !state.shut_down {
            if let Some(queue) = shared.queue.get() {
                let rule_id = gate.map(|gate| gate.rule_id.as_str()).unwrap_or_default();
                queue.log_gate_exposure(name, value, rule_id, &state.user);
            }
        }
        value
    }

    fn get_config_inner(&self, name: &str, log_exposure: bool) -> Option<DynamicConfig> {
        let shared = &self.shared;
        let state = shared.lock_state();
        let Some(snapshot) = shared.snapshot.get() else {
            log::trace!(target: "gatekit", config = name; "getting a config before the client is ready");
            return None;
        };

        let config = snapshot.config(&*shared.config.key_hasher, name)?;

        if log_exposure && !state.shut_down {
            if let Some(queue) = shared.queue.get() {
                queue.log_config_exposure(name, &config.group, &config.rule_id, &state.user);
            }
        }
        Some(DynamicConfig::new(name, config))
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.state
            .lock()
            .expect("thread holding client state lock should not panic")
    }

    fn metadata(&self, stable_id: String, session_id: String) -> SdkMetadata {
        SdkMetadata::new(
            stable_id,
            session_id,
            self.config.app_identifier.clone(),
            self.config.app_version.clone(),
        )
    }

    /// Fetch a snapshot on a background thread.
    fn start_fetch(shared: &Arc<Shared>, request: FetchRequest) -> InitHandle {
        let handle = InitHandle::new();

        let spawned = {
            let shared = shared.clone();
            let handle = handle.clone();
            std::thread::Builder::new()
                .name("gatekit-fetch".to_owned())
                .spawn(move || {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        shared.fetch(&request)
                    }))
                    .unwrap_or(Err(crate::Error::WorkerPanicked));
                    let result = shared.complete_fetch(request, result);
                    handle.complete(result);
                })
        };

        if let Err(err) = spawned {
            log::warn!(target: "gatekit", "failed to start fetch thread: {:?}", err);
            shared.finish_without_snapshot();
            handle.complete(Err(err.into()));
        }
        handle
    }

    fn fetch(&self, request: &FetchRequest) -> Result<Snapshot> {
        let Some(transport) = self.transport.get() else {
            return Err(crate::Error::NotInitialized);
        };

        let mut body = serde_json::json!({
            "user": &*request.user,
            "gatekitMetadata": &request.metadata,
        });
        if let Some(since_time) = request.since_time {
            body["sinceTime"] = since_time.into();
        }
        if let Some(environment) = &self.config.environment {
            body["gatekitEnvironment"] = serde_json::json!({ "tier": environment });
        }

        log::debug!(target: "gatekit", "fetching snapshot");
        let response = transport.post(Endpoint::Initialize, &body)?;
        Ok(serde_json::from_value(response)?)
    }

    /// Apply the fetch result, unless the fetch was superseded by a user update.
    fn complete_fetch(&self, request: FetchRequest, result: Result<Snapshot>) -> Result<()> {
        let mut state = self.lock_state();
        if request.generation != state.generation {
            log::debug!(target: "gatekit", "discarding snapshot fetched for a previous user");
            return result.map(|_| ());
        }
        state.status = Status::Initialized;

        let mut snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log::warn!(target: "gatekit", "failed to fetch snapshot, using cached values: {:?}", err);
                return Err(err);
            }
        };

        if !snapshot.has_updates && self.snapshot.get().is_some() {
            log::debug!(target: "gatekit", "cached snapshot is up to date");
            return Ok(());
        }

        snapshot.metadata = Some(request.metadata);
        if let Err(err) = self.cache.save(&snapshot, &request.user) {
            log::warn!(target: "gatekit", "failed to cache snapshot: {:?}", err);
        }
        self.snapshot.set(Arc::new(snapshot));
        log::debug!(target: "gatekit", "snapshot updated");
        Ok(())
    }

    /// Leave the invalidated state when no fetch could be started. Lookups stay not ready.
    fn finish_without_snapshot(&self) {
        let mut state = self.lock_state();
        if state.status == Status::Invalidated {
            state.status = Status::Initialized;
        }
    }
}
