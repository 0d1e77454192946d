use std::sync::Arc;

use redis::aio::ConnectionManager;

use crate::config::{Config, ProtocolSettings};
use crate::error::{AppError, Result};
use crate::repositories::{
    attendance::PgAttendanceRepository,
    device::PgDeviceRepository,
    memory::MemoryStore,
    session::PgSessionRepository,
    store::{AttendanceStore, DeviceBindingStore, SessionStore},
};
use crate::services::{
    devices::DeviceExclusivityManager,
    issuer::SessionIssuer,
    ledger::AttendanceLedger,
    scan::ScanHandler,
    verifier::CredentialVerifier,
};

/// The two orchestrators the transport talks to, wired over one set of stores.
#[derive(Clone)]
pub struct Protocol {
    /// Session lifecycle and credential issuance.
    pub issuer: SessionIssuer,
    /// The bearer-facing scan flow.
    pub scanner: ScanHandler,
}

impl Protocol {
    /// Wires the protocol over the given stores.
    pub fn with_stores(
        sessions: Arc<dyn SessionStore>,
        devices: Arc<dyn DeviceBindingStore>,
        attendance: Arc<dyn AttendanceStore>,
        settings: ProtocolSettings,
    ) -> Self {
        let issuer = SessionIssuer::new(sessions.clone(), settings);
        let scanner = ScanHandler::new(
            DeviceExclusivityManager::new(devices),
            CredentialVerifier::new(sessions, settings),
            AttendanceLedger::new(attendance),
        );
        Self { issuer, scanner }
    }

    /// Wires the protocol over a single in-memory store.
    pub fn in_memory(store: MemoryStore, settings: ProtocolSettings) -> Self {
        let store = Arc::new(store);
        Self::with_stores(store.clone(), store.clone(), store, settings)
    }
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The Redis connection manager (identities and rate-limit counters).
    pub redis: ConnectionManager,
    /// The application's configuration.
    pub config: Config,
    /// The credential protocol.
    pub protocol: Protocol,
}

impl AppState {
    /// Creates a new `AppState`, applying the schema before wiring the stores.
    ///
    /// # Arguments
    ///
    /// * `config` - The loaded configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`. Fails when the pool, the schema,
    /// Redis or the master key cannot be set up.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("✅ PostgreSQL Pool initialized");

        crate::db::apply_schema(&db).await?;
        tracing::info!("✅ Schema applied");

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis Connection Manager initialized (pooled)");

        let master_key = config
            .master_key_array()
            .map_err(|e| AppError::Encryption(e.to_string()))?;

        let protocol = Protocol::with_stores(
            Arc::new(PgSessionRepository::new(db.clone(), master_key)),
            Arc::new(PgDeviceRepository::new(db.clone())),
            Arc::new(PgAttendanceRepository::new(db.clone())),
            config.protocol,
        );
        tracing::info!(
            "✅ Protocol wired (cadence {}ms, tolerance {} windows)",
            config.protocol.cadence_ms,
            config.protocol.tolerance_windows
        );

        Ok(AppState {
            redis,
            config: config.clone(),
            protocol,
        })
    }
}
