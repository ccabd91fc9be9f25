//! Liveness probe.

use tracing::instrument;

/// Handler for GET /health
///
/// The process is up and serving; key availability is not checked.
#[instrument(skip_all, name = "passport.health.check")]
pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check_returns_ok() {
        assert_eq!(health_check().await, "OK");
    }
}
