//! In-process store
//!
//! Implements the persistence contract on top of locked hash maps. Used by
//! tests and local runs without a database. Every operation, including
//! rotation, completes under a single write lock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::auth::identity::{Email, Username};
use crate::core::auth::session::Session;
use crate::core::db::models::User;
use crate::core::db::store::{
    EMAIL_CONSTRAINT, RotationError, SessionStore, StoreError, TOKEN_HASH_CONSTRAINT,
    USERNAME_CONSTRAINT, UserStore,
};

// ============================================================================
// Users
// ============================================================================

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_unique(users: &HashMap<Uuid, User>, user: &User) -> Result<(), StoreError> {
        for other in users.values().filter(|other| other.id != user.id) {
            if other.username == user.username {
                return Err(StoreError::Duplicate(USERNAME_CONSTRAINT.to_string()));
            }
            if other.email == user.email {
                return Err(StoreError::Duplicate(EMAIL_CONSTRAINT.to_string()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(StoreError::Duplicate("users_pkey".to_string()));
        }
        Self::check_unique(&users, user)?;
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Err(StoreError::NotFound);
        }
        Self::check_unique(&users, user)?;
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn get_user_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|user| user.username == username.as_str())
            .cloned())
    }

    async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|user| user.email == email.as_str())
            .cloned())
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// Sessions keyed by token hash
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    fn apply_update(
        sessions: &mut HashMap<String, Session>,
        session: &Session,
    ) -> Result<(), StoreError> {
        let stored = sessions
            .get_mut(&session.token_hash)
            .filter(|stored| stored.id == session.id)
            .ok_or(StoreError::NotFound)?;

        if stored.revoked_at.is_some() {
            return Err(StoreError::Conflict);
        }

        *stored = session.clone();
        Ok(())
    }

    fn apply_insert(
        sessions: &mut HashMap<String, Session>,
        session: &Session,
    ) -> Result<(), StoreError> {
        if sessions.contains_key(&session.token_hash) {
            return Err(StoreError::Duplicate(TOKEN_HASH_CONSTRAINT.to_string()));
        }
        sessions.insert(session.token_hash.clone(), session.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        Self::apply_insert(&mut sessions, session)
    }

    async fn get_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(token_hash).cloned())
    }

    async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        Self::apply_update(&mut sessions, session)
    }

    async fn sessions_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut found: Vec<Session> = sessions
            .values()
            .filter(|session| session.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|session| session.created_at);
        Ok(found)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        Ok((before - sessions.len()) as u64)
    }

    async fn rotate_session(
        &self,
        revoked: &Session,
        replacement: &Session,
    ) -> Result<(), RotationError> {
        let mut sessions = self.sessions.write().await;

        if sessions.contains_key(&replacement.token_hash) {
            return Err(RotationError::Insert(StoreError::Duplicate(
                TOKEN_HASH_CONSTRAINT.to_string(),
            )));
        }

        Self::apply_update(&mut sessions, revoked).map_err(RotationError::Revoke)?;
        Self::apply_insert(&mut sessions, replacement).map_err(RotationError::Insert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::password::PasswordHasher;
    use chrono::Duration;

    fn user(username: &str, email: &str) -> User {
        User::new(
            Username::parse(username).unwrap(),
            Email::parse(email).unwrap(),
            PasswordHasher::new(4).hash("Password123").unwrap(),
            "Test",
            "User",
        )
        .unwrap()
    }

    fn session(user_id: Uuid, hash: &str) -> Session {
        Session::new(user_id, hash, "agent", "127.0.0.1", Utc::now() + Duration::hours(1)).unwrap()
    }

    // ========================================================================
    // User Store Tests
    // ========================================================================

    #[tokio::test]
    async fn test_save_and_lookup_user() {
        let store = MemoryUserStore::new();
        let alice = user("alice", "alice@example.com");
        store.save_user(&alice).await.unwrap();

        let by_id = store.get_user_by_id(alice.id).await.unwrap();
        let by_name = store
            .get_user_by_username(&Username::parse("alice").unwrap())
            .await
            .unwrap();
        let by_email = store
            .get_user_by_email(&Email::parse("alice@example.com").unwrap())
            .await
            .unwrap();

        assert_eq!(by_id.map(|u| u.id), Some(alice.id));
        assert_eq!(by_name.map(|u| u.id), Some(alice.id));
        assert_eq!(by_email.map(|u| u.id), Some(alice.id));
    }

    #[tokio::test]
    async fn test_duplicate_username_and_email() {
        let store = MemoryUserStore::new();
        store
            .save_user(&user("alice", "alice@example.com"))
            .await
            .unwrap();

        let err = store
            .save_user(&user("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(ref c) if c == USERNAME_CONSTRAINT));

        let err = store
            .save_user(&user("bob", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(ref c) if c == EMAIL_CONSTRAINT));
    }

    #[tokio::test]
    async fn test_exists_helpers() {
        let store = MemoryUserStore::new();
        store
            .save_user(&user("alice", "alice@example.com"))
            .await
            .unwrap();

        assert!(
            store
                .username_exists(&Username::parse("alice").unwrap())
                .await
                .unwrap()
        );
        assert!(
            !store
                .email_exists(&Email::parse("bob@example.com").unwrap())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_update_user() {
        let store = MemoryUserStore::new();
        let mut alice = user("alice", "alice@example.com");
        store.save_user(&alice).await.unwrap();

        alice.verify().unwrap();
        store.update_user(&alice).await.unwrap();

        let stored = store.get_user_by_id(alice.id).await.unwrap().unwrap();
        assert!(stored.is_verified());

        let stranger = user("carol", "carol@example.com");
        assert!(matches!(
            store.update_user(&stranger).await,
            Err(StoreError::NotFound)
        ));
    }

    // ========================================================================
    // Session Store Tests
    // ========================================================================

    #[tokio::test]
    async fn test_save_and_find_session() {
        let store = MemorySessionStore::new();
        let s = session(Uuid::new_v4(), "hash-a");
        store.save_session(&s).await.unwrap();

        let found = store.get_session_by_token_hash("hash-a").await.unwrap();
        assert_eq!(found, Some(s));
        assert!(
            store
                .get_session_by_token_hash("missing")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_duplicate_token_hash_rejected() {
        let store = MemorySessionStore::new();
        let user_id = Uuid::new_v4();
        store.save_session(&session(user_id, "hash-a")).await.unwrap();

        let err = store
            .save_session(&session(user_id, "hash-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_update_is_compare_and_set() {
        let store = MemorySessionStore::new();
        let s = session(Uuid::new_v4(), "hash-a");
        store.save_session(&s).await.unwrap();

        let mut first = s.clone();
        first.revoke().unwrap();
        store.update_session(&first).await.unwrap();

        // A second writer holding the stale, unrevoked copy loses
        let mut second = s.clone();
        second.revoke().unwrap();
        assert!(matches!(
            store.update_session(&second).await,
            Err(StoreError::Conflict)
        ));
    }

    #[tokio::test]
    async fn test_rotate_session_applies_both_writes() {
        let store = MemorySessionStore::new();
        let mut old = session(Uuid::new_v4(), "hash-a");
        store.save_session(&old).await.unwrap();

        let new = old
            .rotate("hash-b", Utc::now() + Duration::hours(1), None, None)
            .unwrap();
        store.rotate_session(&old, &new).await.unwrap();

        let stored_old = store.get_session_by_token_hash("hash-a").await.unwrap().unwrap();
        let stored_new = store.get_session_by_token_hash("hash-b").await.unwrap().unwrap();
        assert!(stored_old.is_revoked());
        assert!(stored_new.is_active());
    }

    #[tokio::test]
    async fn test_rotate_session_is_all_or_nothing() {
        let store = MemorySessionStore::new();
        let user_id = Uuid::new_v4();
        let mut old = session(user_id, "hash-a");
        store.save_session(&old).await.unwrap();
        store.save_session(&session(user_id, "hash-b")).await.unwrap();

        // Replacement collides with an existing hash
        let new = old
            .rotate("hash-b", Utc::now() + Duration::hours(1), None, None)
            .unwrap();
        let err = store.rotate_session(&old, &new).await.unwrap_err();
        assert!(matches!(err, RotationError::Insert(StoreError::Duplicate(_))));

        let stored_old = store.get_session_by_token_hash("hash-a").await.unwrap().unwrap();
        assert!(stored_old.is_active());
    }

    #[tokio::test]
    async fn test_rotate_already_revoked_conflicts() {
        let store = MemorySessionStore::new();
        let original = session(Uuid::new_v4(), "hash-a");
        store.save_session(&original).await.unwrap();

        let mut winner = original.clone();
        let winner_next = winner
            .rotate("hash-b", Utc::now() + Duration::hours(1), None, None)
            .unwrap();
        store.rotate_session(&winner, &winner_next).await.unwrap();

        let mut loser = original.clone();
        let loser_next = loser
            .rotate("hash-c", Utc::now() + Duration::hours(1), None, None)
            .unwrap();
        let err = store.rotate_session(&loser, &loser_next).await.unwrap_err();

        assert!(matches!(err, RotationError::Revoke(StoreError::Conflict)));
        assert!(
            store
                .get_session_by_token_hash("hash-c")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_sessions_for_user_and_delete_expired() {
        let store = MemorySessionStore::new();
        let user_id = Uuid::new_v4();
        store.save_session(&session(user_id, "hash-a")).await.unwrap();
        store.save_session(&session(user_id, "hash-b")).await.unwrap();
        store
            .save_session(&session(Uuid::new_v4(), "hash-c"))
            .await
            .unwrap();

        assert_eq!(store.sessions_for_user(user_id).await.unwrap().len(), 2);

        let removed = store
            .delete_expired(Utc::now() + Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(removed, 3);
        assert!(store.is_empty().await);
    }
}
