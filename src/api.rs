//! Entry point that wires the SafeNet components together.

use std::sync::Arc;

use chrono::Utc;
use log::info;

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::graph::{FriendGraph, GraphStorage};
use crate::identity::IdentityDirectory;
use crate::location::{GeoLocation, LocationStorage};
use crate::notify::{DeliveryChannel, NotificationFanout};
use crate::proximity::ProximityNotifier;

/// Core interface for SafeNet.
///
/// Owns the friend graph, the location service and the notification
/// fan-out, and exposes them through a [`ProximityNotifier`] so that every
/// state change produces its notifications.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use safenet_core::identity::{Actor, InMemoryDirectory};
/// use safenet_core::notify::InProcessChannel;
/// use safenet_core::{CoreConfig, SafeNetCore};
///
/// let dir = tempfile::tempdir().unwrap();
/// let directory = InMemoryDirectory::with_actors([Actor::new("alice", "alice")]);
/// let core = SafeNetCore::open(
///     CoreConfig::with_data_dir(dir.path()),
///     Arc::new(directory),
///     Arc::new(InProcessChannel::new()),
/// )
/// .unwrap();
///
/// assert_eq!(core.graph().friend_count(&"alice".into()).unwrap(), 0);
/// ```
pub struct SafeNetCore {
    config: CoreConfig,
    graph: Arc<FriendGraph>,
    locations: Arc<GeoLocation>,
    fanout: Arc<NotificationFanout>,
    notifier: ProximityNotifier,
}

impl SafeNetCore {
    /// Opens (or creates) the databases under `config.data_dir`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Config`] if the configuration is invalid
    /// - [`CoreError::DataDir`] if the data directory cannot be created
    /// - A storage error if either database cannot be opened
    pub fn open(
        config: CoreConfig,
        identities: Arc<dyn IdentityDirectory>,
        channel: Arc<dyn DeliveryChannel>,
    ) -> CoreResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir).map_err(|e| CoreError::DataDir {
            path: config.data_dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let graph = GraphStorage::new(&config.graph_db_path())?;
        let locations = LocationStorage::new(&config.location_db_path())?;
        info!("SafeNet core opened at {}", config.data_dir.display());

        Ok(Self::assemble(config, graph, locations, identities, channel))
    }

    /// Creates a core backed by in-memory databases.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a database
    /// cannot be created.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn in_memory(
        config: CoreConfig,
        identities: Arc<dyn IdentityDirectory>,
        channel: Arc<dyn DeliveryChannel>,
    ) -> CoreResult<Self> {
        config.validate()?;
        let graph = GraphStorage::in_memory()?;
        let locations = LocationStorage::in_memory()?;
        Ok(Self::assemble(config, graph, locations, identities, channel))
    }

    fn assemble(
        config: CoreConfig,
        graph: GraphStorage,
        locations: LocationStorage,
        identities: Arc<dyn IdentityDirectory>,
        channel: Arc<dyn DeliveryChannel>,
    ) -> Self {
        let graph = Arc::new(FriendGraph::new(graph, identities));
        let locations = Arc::new(GeoLocation::new(locations));
        let fanout = Arc::new(NotificationFanout::with_timeout(
            channel,
            config.delivery_timeout(),
        ));
        let notifier = ProximityNotifier::new(graph.clone(), locations.clone(), fanout.clone())
            .with_emergency_message(config.default_emergency_message.clone());

        Self {
            config,
            graph,
            locations,
            fanout,
            notifier,
        }
    }

    /// The configuration the core was opened with.
    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Friend graph, for queries and notification-free transitions.
    #[must_use]
    pub fn graph(&self) -> &FriendGraph {
        &self.graph
    }

    /// Location service, for queries.
    #[must_use]
    pub fn locations(&self) -> &GeoLocation {
        &self.locations
    }

    /// Notification fan-out, for delivery statistics and direct sends.
    #[must_use]
    pub fn fanout(&self) -> &NotificationFanout {
        &self.fanout
    }

    /// Operations that notify the affected friends.
    #[must_use]
    pub const fn notifier(&self) -> &ProximityNotifier {
        &self.notifier
    }

    /// Removes positions older than the configured retention window.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage write fails.
    pub fn purge_expired_positions(&self) -> CoreResult<usize> {
        let cutoff = Utc::now() - self.config.location_retention();
        Ok(self.locations.purge_older_than(cutoff)?)
    }
}
