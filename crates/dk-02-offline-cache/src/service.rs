//! Service worker: lifecycle state plus the five event handlers.

use crate::domain::lifecycle::is_valid_transition;
use crate::domain::{
    CacheControllerConfig, CacheError, CacheRequest, CachedResponse, Notification,
    PrecacheManifest, RequestMethod, RoutingTable, WorkerState,
};
use crate::notifications::{on_notification_click, on_push, ClickOutcome};
use crate::precache::{cleanup_outdated_caches, InstallReport, PrecacheController};
use crate::ports::{CacheStorage, Clock, Network, NotificationHost};
use crate::strategy::StrategyHandler;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Host capabilities handed to the worker.
#[derive(Clone)]
pub struct WorkerPorts {
    pub storage: Arc<dyn CacheStorage>,
    pub network: Arc<dyn Network>,
    pub clock: Arc<dyn Clock>,
    pub notifications: Arc<dyn NotificationHost>,
}

/// Result of `activate`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    /// Precache keys no longer in the manifest
    pub purged_entries: Vec<String>,
    /// Precache caches of older generations
    pub deleted_caches: Vec<String>,
}

/// How a fetch event was answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Handled {
        cache_name: String,
        response: CachedResponse,
    },
    /// No route; the browser performs the request itself
    Passthrough,
    /// Neither network nor cache could answer
    Failed {
        cache_name: String,
        error: CacheError,
    },
}

/// Lifecycle and functional events
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install(PrecacheManifest),
    Activate,
    Fetch(CacheRequest),
    Push(Option<Vec<u8>>),
    NotificationClick(Notification),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetch(FetchOutcome),
    Push(Option<Notification>),
    NotificationClick(ClickOutcome),
    /// A lifecycle event failed; the worker is redundant or unchanged
    Failed(CacheError),
}

/// The offline cache controller as one worker instance.
pub struct ServiceWorker {
    config: CacheControllerConfig,
    scope: Url,
    routes: RoutingTable,
    precache: RwLock<PrecacheController>,
    ports: WorkerPorts,
    state: RwLock<WorkerState>,
}

impl ServiceWorker {
    pub fn new(config: CacheControllerConfig, ports: WorkerPorts) -> Result<Self, CacheError> {
        config.validate()?;
        let scope = config.scope_url()?;
        let routes = RoutingTable::from_config(&config);
        let precache = PrecacheController::new(config.precache_cache.clone(), scope.clone());

        Ok(Self {
            config,
            scope,
            routes,
            precache: RwLock::new(precache),
            ports,
            state: RwLock::new(WorkerState::Parsed),
        })
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn config(&self) -> &CacheControllerConfig {
        &self.config
    }

    fn transition(&self, to: WorkerState) -> Result<(), CacheError> {
        let mut state = self.state.write();
        if !is_valid_transition(*state, to) {
            return Err(CacheError::InvalidState { from: *state, to });
        }
        debug!(from = ?*state, to = ?to, "Worker state change");
        *state = to;
        Ok(())
    }

    /// Precache the build manifest. A failure makes the worker redundant.
    pub async fn install(&self, manifest: &PrecacheManifest) -> Result<InstallReport, CacheError> {
        self.transition(WorkerState::Installing)?;

        let result = async {
            let mut controller =
                PrecacheController::new(self.config.precache_cache.clone(), self.scope.clone());
            controller.add_to_cache_list(manifest)?;
            let report = controller
                .install(
                    self.ports.storage.as_ref(),
                    self.ports.network.as_ref(),
                    self.ports.clock.as_ref(),
                )
                .await?;
            Ok::<_, CacheError>((controller, report))
        }
        .await;

        match result {
            Ok((controller, report)) => {
                *self.precache.write() = controller;
                self.transition(WorkerState::Installed)?;
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Install failed");
                self.transition(WorkerState::Redundant)?;
                Err(e)
            }
        }
    }

    /// Purge stale precache entries and older precache generations.
    pub async fn activate(&self) -> Result<ActivateReport, CacheError> {
        self.transition(WorkerState::Activating)?;

        let storage = self.ports.storage.as_ref();
        let result = self.precache.read().activate(storage).and_then(|purged_entries| {
            let deleted_caches = cleanup_outdated_caches(storage, &self.config.precache_cache)?;
            Ok(ActivateReport {
                purged_entries,
                deleted_caches,
            })
        });

        match result {
            Ok(report) => {
                self.transition(WorkerState::Activated)?;
                info!(
                    purged = report.purged_entries.len(),
                    deleted_caches = report.deleted_caches.len(),
                    "Worker activated"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Activate failed");
                self.transition(WorkerState::Redundant)?;
                Err(e)
            }
        }
    }

    /// Answer a fetch: precache first, then the routing table.
    pub async fn handle_fetch(&self, request: &CacheRequest) -> FetchOutcome {
        if !self.state().controls_fetches() || request.method != RequestMethod::Get {
            return FetchOutcome::Passthrough;
        }

        let precache_key = self
            .precache
            .read()
            .key_for_url(&request.url)
            .map(str::to_string);
        if let Some(key) = precache_key {
            return self.serve_precached(request, &key).await;
        }

        let Some(rule) = self.routes.route(request) else {
            return FetchOutcome::Passthrough;
        };

        let handler = StrategyHandler::new(
            self.ports.storage.as_ref(),
            self.ports.network.as_ref(),
            self.ports.clock.as_ref(),
        );
        match handler.handle(rule, request).await {
            Ok(response) => FetchOutcome::Handled {
                cache_name: rule.cache_name.clone(),
                response,
            },
            Err(error) => {
                warn!(cache = %rule.cache_name, url = %request.url, error = %error, "No response from network or cache");
                FetchOutcome::Failed {
                    cache_name: rule.cache_name.clone(),
                    error,
                }
            }
        }
    }

    async fn serve_precached(&self, request: &CacheRequest, key: &str) -> FetchOutcome {
        let cache_name = self.config.precache_cache.clone();
        match self.ports.storage.get(&cache_name, key) {
            Ok(Some(entry)) => {
                return FetchOutcome::Handled {
                    cache_name,
                    response: entry.response,
                }
            }
            Ok(None) => warn!(url = %request.url, "Precached entry missing, using network"),
            Err(e) => warn!(url = %request.url, error = %e, "Precache read failed, using network"),
        }

        match self.ports.network.fetch(request).await {
            Ok(response) => FetchOutcome::Handled {
                cache_name,
                response,
            },
            Err(error) => FetchOutcome::Failed { cache_name, error },
        }
    }

    pub async fn handle_push(&self, data: Option<&[u8]>) -> Option<Notification> {
        on_push(self.ports.notifications.as_ref(), data).await
    }

    pub async fn handle_notification_click(&self, notification: &Notification) -> ClickOutcome {
        on_notification_click(self.ports.notifications.as_ref(), notification).await
    }

    /// Run one event to completion. Never panics or propagates an error.
    pub async fn dispatch(&self, event: WorkerEvent) -> EventOutcome {
        match event {
            WorkerEvent::Install(manifest) => match self.install(&manifest).await {
                Ok(report) => EventOutcome::Installed(report),
                Err(e) => EventOutcome::Failed(e),
            },
            WorkerEvent::Activate => match self.activate().await {
                Ok(report) => EventOutcome::Activated(report),
                Err(e) => EventOutcome::Failed(e),
            },
            WorkerEvent::Fetch(request) => EventOutcome::Fetch(self.handle_fetch(&request).await),
            WorkerEvent::Push(data) => EventOutcome::Push(self.handle_push(data.as_deref()).await),
            WorkerEvent::NotificationClick(notification) => {
                EventOutcome::NotificationClick(self.handle_notification_click(&notification).await)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryCacheStorage;
    use crate::domain::{PrecacheEntry, RequestDestination};
    use crate::ports::{InMemoryNotificationHost, ManualClock};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Echoes the request path; can be taken offline.
    #[derive(Default)]
    struct FakeOrigin {
        offline: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Network for FakeOrigin {
        async fn fetch(&self, request: &CacheRequest) -> Result<CachedResponse, CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(CacheError::Network("offline".into()));
            }
            Ok(CachedResponse::new(200, request.url.path().to_string()))
        }
    }

    struct Harness {
        worker: ServiceWorker,
        storage: Arc<MemoryCacheStorage>,
        origin: Arc<FakeOrigin>,
        host: Arc<InMemoryNotificationHost>,
    }

    fn harness() -> Harness {
        let storage = Arc::new(MemoryCacheStorage::new());
        let origin = Arc::new(FakeOrigin::default());
        let host = Arc::new(InMemoryNotificationHost::new());
        let config = CacheControllerConfig {
            scope: "https://app.example.com/".into(),
            ..Default::default()
        };
        let ports = WorkerPorts {
            storage: storage.clone(),
            network: origin.clone(),
            clock: Arc::new(ManualClock::new(1_000)),
            notifications: host.clone(),
        };
        Harness {
            worker: ServiceWorker::new(config, ports).unwrap(),
            storage,
            origin,
            host,
        }
    }

    fn manifest(rev: &str) -> PrecacheManifest {
        PrecacheManifest::new(vec![
            PrecacheEntry::new("/assets/app.js", Some(rev.into())),
            PrecacheEntry::new("/favicon.ico", Some(rev.into())),
        ])
    }

    async fn activated() -> Harness {
        let h = harness();
        h.worker.install(&manifest("r1")).await.unwrap();
        h.worker.activate().await.unwrap();
        h
    }

    #[tokio::test]
    async fn test_lifecycle_reaches_activated() {
        let h = harness();
        assert_eq!(h.worker.state(), WorkerState::Parsed);
        let report = h.worker.install(&manifest("r1")).await.unwrap();
        assert_eq!(report.updated.len(), 2);
        assert_eq!(h.worker.state(), WorkerState::Installed);
        h.worker.activate().await.unwrap();
        assert_eq!(h.worker.state(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_failed_install_is_redundant() {
        let h = harness();
        h.origin.offline.store(true, Ordering::SeqCst);
        let outcome = h.worker.dispatch(WorkerEvent::Install(manifest("r1"))).await;
        assert!(matches!(outcome, EventOutcome::Failed(CacheError::Network(_))));
        assert_eq!(h.worker.state(), WorkerState::Redundant);
    }

    #[tokio::test]
    async fn test_activate_before_install_rejected() {
        let h = harness();
        let outcome = h.worker.dispatch(WorkerEvent::Activate).await;
        assert!(matches!(
            outcome,
            EventOutcome::Failed(CacheError::InvalidState { .. })
        ));
        assert_eq!(h.worker.state(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_precached_asset_served_without_network() {
        let h = activated().await;
        let calls = h.origin.calls.load(Ordering::SeqCst);

        let request = CacheRequest::get("https://app.example.com/assets/app.js")
            .unwrap()
            .with_destination(RequestDestination::Script);
        let outcome = h.worker.handle_fetch(&request).await;

        match outcome {
            FetchOutcome::Handled { cache_name, response } => {
                assert_eq!(cache_name, "workbox-precache-v2");
                assert_eq!(response.body, "/assets/app.js");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.origin.calls.load(Ordering::SeqCst), calls);
        assert_eq!(h.storage.len("static-assets"), 0);
    }

    #[tokio::test]
    async fn test_navigation_offline_served_from_pages_cache() {
        let h = activated().await;
        let request = CacheRequest::get("https://app.example.com/dashboard")
            .unwrap()
            .navigate();

        let online = h.worker.handle_fetch(&request).await;
        assert!(matches!(online, FetchOutcome::Handled { ref cache_name, .. } if cache_name == "pages-cache"));

        h.origin.offline.store(true, Ordering::SeqCst);
        match h.worker.handle_fetch(&request).await {
            FetchOutcome::Handled { response, .. } => assert_eq!(response.body, "/dashboard"),
            other => panic!("unexpected {:?}", other),
        }

        let unseen = CacheRequest::get("https://app.example.com/settings")
            .unwrap()
            .navigate();
        assert!(matches!(
            h.worker.handle_fetch(&unseen).await,
            FetchOutcome::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_unrouted_and_mutations_pass_through() {
        let h = activated().await;
        let post = CacheRequest::get("https://app.example.com/api/habits")
            .unwrap()
            .with_method(RequestMethod::Post);
        assert_eq!(h.worker.handle_fetch(&post).await, FetchOutcome::Passthrough);

        let manifest = CacheRequest::get("https://app.example.com/manifest.webmanifest")
            .unwrap()
            .with_destination(RequestDestination::Manifest);
        assert_eq!(h.worker.handle_fetch(&manifest).await, FetchOutcome::Passthrough);
    }

    #[tokio::test]
    async fn test_fetch_before_activation_passes_through() {
        let h = harness();
        let request = CacheRequest::get("https://app.example.com/api/habits").unwrap();
        assert_eq!(h.worker.handle_fetch(&request).await, FetchOutcome::Passthrough);
    }

    #[tokio::test]
    async fn test_new_build_purges_old_revisions() {
        let h = activated().await;

        // Next deployment: a fresh worker over the same storage
        let ports = WorkerPorts {
            storage: h.storage.clone(),
            network: h.origin.clone(),
            clock: Arc::new(ManualClock::new(2_000)),
            notifications: h.host.clone(),
        };
        let config = CacheControllerConfig {
            scope: "https://app.example.com/".into(),
            ..Default::default()
        };
        let next = ServiceWorker::new(config, ports).unwrap();
        next.install(&PrecacheManifest::new(vec![PrecacheEntry::new(
            "/assets/app.js",
            Some("r2".into()),
        )]))
        .await
        .unwrap();
        let report = next.activate().await.unwrap();

        assert_eq!(report.purged_entries.len(), 2);
        assert_eq!(h.storage.len("workbox-precache-v2"), 1);
    }

    #[tokio::test]
    async fn test_push_and_click_events() {
        let h = harness();
        let outcome = h
            .worker
            .dispatch(WorkerEvent::Push(Some(br#"{"data":{"habitId":"h1"}}"#.to_vec())))
            .await;
        let EventOutcome::Push(Some(notification)) = outcome else {
            panic!("expected a notification");
        };
        assert_eq!(notification.tag(), "h1");

        assert_eq!(
            h.worker.dispatch(WorkerEvent::Push(None)).await,
            EventOutcome::Push(None)
        );

        let click = h
            .worker
            .dispatch(WorkerEvent::NotificationClick(notification))
            .await;
        assert_eq!(
            click,
            EventOutcome::NotificationClick(ClickOutcome::Opened {
                url: "/dashboard".into()
            })
        );
        assert_eq!(h.host.opened().len(), 1);
    }
}
