use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::reconcile::ReconcileMode;
use super::session::Session;

/// Owns the lifetime of every live session, keyed by session id.
///
/// Lock order is always registry before session, never the reverse: the
/// deletion path takes the registry write lock, then the session lock,
/// and re-checks emptiness there. A lookup racing a deletion either gets
/// the entry before removal (and the session itself reports not-found
/// once closed) or misses it entirely, never a half-deleted object.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a fresh session. Always succeeds; the random 128-bit id
    /// makes collisions with live or past sessions negligible.
    pub async fn create(&self, media_reference: String, mode: ReconcileMode) -> Arc<Session> {
        let session_id = Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(session_id.clone(), media_reference, mode));
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session.clone());
        info!("Session created: {}", session_id);
        session
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Remove the session when and only when its member set is empty.
    /// Idempotent; a no-op if the session is gone or has members again.
    pub async fn delete_if_empty(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(session_id) {
            if session.close_if_empty().await {
                sessions.remove(session_id);
                info!("Session deleted: {}", session_id);
            }
        }
    }

    /// Session, participant and authority-session totals for diagnostics.
    pub async fn counts(&self) -> (u32, u32, u32) {
        let sessions = self.sessions.read().await;
        let n_sessions = sessions.len() as u32;
        let mut n_participants = 0u32;
        let mut n_authority_sessions = 0u32;
        for session in sessions.values() {
            n_participants += session.member_count().await as u32;
            if session.mode == ReconcileMode::Authority {
                n_authority_sessions += 1;
            }
        }
        (n_sessions, n_participants, n_authority_sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncError;

    #[tokio::test]
    async fn created_sessions_are_retrievable_with_initial_state() {
        let registry = SessionRegistry::new();
        let session = registry.create("A".to_string(), ReconcileMode::Consensus).await;

        let found = registry.get(&session.session_id).await.unwrap();
        assert_eq!(found.session_id, session.session_id);
        assert_eq!(found.snapshot().await.media_reference, "A");
        assert_eq!(found.snapshot().await.position_seconds, 0.0);

        assert!(registry.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn session_ids_are_unique() {
        let registry = SessionRegistry::new();
        let a = registry.create("A".to_string(), ReconcileMode::Consensus).await;
        let b = registry.create("A".to_string(), ReconcileMode::Consensus).await;
        assert_ne!(a.session_id, b.session_id);
    }

    #[tokio::test]
    async fn emptied_session_is_not_retrievable() {
        let registry = SessionRegistry::new();
        let session = registry.create("A".to_string(), ReconcileMode::Consensus).await;
        let session_id = session.session_id.clone();

        let (_, _rx1) = session.join("p1", "conn1").await.unwrap();
        let (_, _rx2) = session.join("p2", "conn2").await.unwrap();

        assert!(!session.leave("p1", false).await);
        assert!(session.leave("p2", false).await);
        registry.delete_if_empty(&session_id).await;

        assert!(registry.get(&session_id).await.is_none());
        // a retained handle cannot be joined either
        assert_eq!(
            session.join("p3", "conn3").await.err(),
            Some(SyncError::SessionNotFound)
        );
    }

    #[tokio::test]
    async fn delete_if_empty_spares_populated_sessions() {
        let registry = SessionRegistry::new();
        let session = registry.create("A".to_string(), ReconcileMode::Consensus).await;
        let (_, _rx) = session.join("p1", "conn1").await.unwrap();

        registry.delete_if_empty(&session.session_id).await;
        assert!(registry.get(&session.session_id).await.is_some());
    }

    #[tokio::test]
    async fn delete_if_empty_is_idempotent() {
        let registry = SessionRegistry::new();
        let session = registry.create("A".to_string(), ReconcileMode::Consensus).await;
        let session_id = session.session_id.clone();

        registry.delete_if_empty(&session_id).await;
        registry.delete_if_empty(&session_id).await;
        registry.delete_if_empty("never-existed").await;
        assert!(registry.get(&session_id).await.is_none());
    }

    #[tokio::test]
    async fn counts_aggregate_sessions_and_members() {
        let registry = SessionRegistry::new();
        let a = registry.create("A".to_string(), ReconcileMode::Consensus).await;
        let b = registry.create("B".to_string(), ReconcileMode::Authority).await;
        let (_, _rx1) = a.join("p1", "conn1").await.unwrap();
        let (_, _rx2) = a.join("p2", "conn2").await.unwrap();
        let (_, _rx3) = b.join("p3", "conn3").await.unwrap();

        assert_eq!(registry.counts().await, (2, 3, 1));
    }
}
