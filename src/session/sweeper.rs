use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::store::SessionStore;

/// Spawns the idle-session sweep. A tab closed before its unload beacon
/// fires leaves the session active with no further signal activity; the
/// sweep reclaims those once they exceed the TTL.
pub fn spawn(store: Arc<SessionStore>, ttl: Duration, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let reclaimed = store.sweep_idle(ttl).await;
            for session_id in &reclaimed {
                tracing::info!(session_id = %session_id, "Reclaimed idle session");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::SessionStatus;

    #[tokio::test]
    async fn test_sweeper_ends_abandoned_session() {
        let store = SessionStore::new();
        store.start_session("abandoned").await;

        let handle = spawn(
            store.clone(),
            Duration::from_millis(20),
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        let info = store.session_info("abandoned").await.unwrap();
        assert_eq!(info.status, SessionStatus::Ended);
    }
}
