//! Client-side data-consistency core for the clinical dashboard.
//!
//! Two guarantees hold across network partitions: local writes are never
//! silently lost (durable write log + background sync with at-least-once
//! delivery), and real-time consumers keep receiving updates (SSE push with
//! automatic polling fallback and reconnect).
//!
//! Services are plain dependency-injected objects; the host application's
//! composition root wires and owns them:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use caresync::config::CoreConfig;
//! use caresync::offline::OfflineWriteService;
//! use caresync::realtime::{RealtimeChannel, Topic};
//! use caresync::remote::{ApiClient, StaticTokenProvider, TokenProvider};
//! use caresync::store::{Database, LocalStore};
//! use caresync::sync::{ConnectivityMonitor, SyncCoordinator};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = CoreConfig::default();
//! let db = Database::new(&config.database_path).await?;
//! let offline = OfflineWriteService::new(LocalStore::new(db));
//!
//! let tokens: Arc<dyn TokenProvider> = Arc::new(StaticTokenProvider::new("token"));
//! let api = Arc::new(ApiClient::new(&config.api_base_url, tokens.clone())?);
//!
//! let connectivity = ConnectivityMonitor::new(true);
//! let sync = SyncCoordinator::new(
//!     offline.clone(),
//!     api.clone(),
//!     tokens.clone(),
//!     connectivity.subscribe(),
//!     config.sync_config(),
//! );
//! sync.start();
//!
//! let realtime = RealtimeChannel::new(config.realtime_config(), api, tokens);
//! let _activity = realtime.subscribe(Topic::Activity, |event| {
//!     println!("activity: {}", event);
//! });
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod offline;
pub mod realtime;
pub mod remote;
pub mod store;
pub mod sync;
