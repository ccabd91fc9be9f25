//! Test server harness for E2E testing
//!
//! Provides TestPassportServer for spawning real Passport instances in tests.

use crate::schedules::{test_custodian, test_schedule_yaml};
use chrono::{DateTime, Utc};
use common::clock::FixedClock;
use passport_service::app::{self, Collaborators};
use passport_service::config::{Config, KeyScheduleFile};
use passport_service::custodian::mock::MockCustodian;
use passport_service::routes::{self, AppState};
use passport_service::services::recipient_keys::KeySetSource;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning Passport in E2E tests
///
/// The server runs the schedule from [`test_schedule_yaml`] on a mock
/// custodian, against a clock the test controls.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_jwks_e2e() -> Result<()> {
///     let key_sets = Arc::new(CountingKeySetSource::new());
///     let server = TestPassportServer::spawn(utc(2025, 3, 1), "http://unused", key_sets).await?;
///
///     let response = reqwest::get(format!("{}/.well-known/jwks", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestPassportServer {
    addr: SocketAddr,
    clock: Arc<FixedClock>,
    custodian: Arc<MockCustodian>,
    state: Arc<AppState>,
    handle: JoinHandle<()>,
}

impl TestPassportServer {
    /// Spawn a new test server instance
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Load every scheduled key from the mock custodian
    /// - Resolve `partnerA` to a key set at `key_set_url`, fetched through `key_sets`
    /// - Start the HTTP server in the background
    pub async fn spawn(
        now: DateTime<Utc>,
        key_set_url: &str,
        key_sets: Arc<dyn KeySetSource>,
    ) -> Result<Self, anyhow::Error> {
        let mut config = Config::from_vars(&HashMap::new())
            .map_err(|e| anyhow::anyhow!("Failed to build default config: {}", e))?;
        config.bind_address = "127.0.0.1:0".to_string();

        let schedule = KeyScheduleFile::from_yaml_str(&test_schedule_yaml(key_set_url))
            .map_err(|e| anyhow::anyhow!("Failed to parse test schedule: {}", e))?;

        let clock = Arc::new(FixedClock::new(now));
        let custodian = Arc::new(test_custodian()?);

        let state = app::build_state(
            config,
            &schedule,
            Collaborators {
                custodian: custodian.clone(),
                key_sets,
                clock: clock.clone(),
            },
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to build state: {}", e))?;
        let state = Arc::new(state);

        // Initialize metrics recorder for test server
        // Note: This may fail if already installed in the test process.
        // In that case, we create a new recorder without installing it globally.
        let metrics_handle = match routes::init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                let recorder = PrometheusBuilder::new().build_recorder();
                recorder.handle()
            }
        };

        // Build routes using passport-service's real route builder
        let app = routes::build_routes(state.clone(), metrics_handle);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            clock,
            custodian,
            state,
            handle,
        })
    }

    /// Get the base URL of the test server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The clock every component of the server reads
    pub fn clock(&self) -> &Arc<FixedClock> {
        &self.clock
    }

    /// The mock custodian, for call counts and failure injection
    pub fn custodian(&self) -> &Arc<MockCustodian> {
        &self.custodian
    }

    /// Shared state, for calling services directly
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

impl Drop for TestPassportServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
