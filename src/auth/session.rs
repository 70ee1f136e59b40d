//! Server-side console sessions
//!
//! A session owns the signed-in Firebase user and acts as its ID-token change source:
//! sign-in, refreshes and sign-out are pushed to the session's [`ClaimsSync`].

use chrono::{DateTime, Duration, Utc};
use futures::channel::mpsc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::{sync::watch, task::JoinHandle};
use uuid::Uuid;

use super::sync::{ClaimsSnapshot, ClaimsSource, ClaimsSync, IdTokenEvent};
use super::{AuthClaims, JwksCache};
use crate::services::{FirebaseUser, IdentityClient, IdentityError};

/// Tokens this close to expiry are refreshed before use
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// An ID token to decode, verified against the project's JWKS
pub struct VerifiedIdToken {
    token: String,
    jwks: JwksCache,
}

impl ClaimsSource for VerifiedIdToken {
    async fn fetch_claims(&self) -> anyhow::Result<AuthClaims> {
        self.jwks.verify_token(&self.token).await
    }
}

pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    last_seen: Mutex<DateTime<Utc>>,
    /// Set once the refresh token is refused; the store drops the session on next lookup
    revoked: AtomicBool,
    user: Mutex<FirebaseUser>,
    token_events: mpsc::UnboundedSender<IdTokenEvent<VerifiedIdToken>>,
    claims: ClaimsSync,
    identity: IdentityClient,
    jwks: JwksCache,
}

impl Session {
    /// Open a session for a freshly signed-in user
    pub fn start(user: FirebaseUser, identity: IdentityClient, jwks: JwksCache) -> Arc<Self> {
        let (token_events, events) = mpsc::unbounded();
        let id_token = user.id_token.clone();
        let now = Utc::now();

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_seen: Mutex::new(now),
            revoked: AtomicBool::new(false),
            user: Mutex::new(user),
            token_events,
            claims: ClaimsSync::spawn(events),
            identity,
            jwks,
        });

        session.token_changed(id_token);
        tracing::info!(session_id = %session.id, uid = %session.uid(), "Session started");
        session
    }

    fn emit(&self, event: IdTokenEvent<VerifiedIdToken>) {
        if self.token_events.unbounded_send(event).is_err() {
            tracing::debug!(session_id = %self.id, "Claims listener already closed");
        }
    }

    fn token_changed(&self, token: String) {
        self.emit(IdTokenEvent::Changed(Some(VerifiedIdToken {
            token,
            jwks: self.jwks.clone(),
        })));
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn uid(&self) -> String {
        self.user.lock().uid.clone()
    }

    pub fn email(&self) -> Option<String> {
        self.user.lock().email.clone()
    }

    pub fn display_name(&self) -> Option<String> {
        self.user.lock().display_name.clone()
    }

    /// Identity provider the user signed in with (`microsoft.com`)
    pub fn provider_id(&self) -> Option<String> {
        self.user.lock().provider_id.clone()
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }

    pub fn revoke(&self) {
        if !self.revoked.swap(true, Ordering::AcqRel) {
            tracing::info!(session_id = %self.id, "Session revoked");
        }
    }

    fn is_expired(&self, limits: &SessionLimits, now: DateTime<Utc>) -> bool {
        self.is_revoked()
            || now - self.created_at >= limits.max_age
            || now - *self.last_seen.lock() >= limits.idle
    }

    fn touch(&self, now: DateTime<Utc>) {
        *self.last_seen.lock() = now;
    }

    pub fn claims(&self) -> ClaimsSnapshot {
        self.claims.current()
    }

    pub fn subscribe_claims(&self) -> watch::Receiver<ClaimsSnapshot> {
        self.claims.subscribe()
    }

    /// Current ID token, refreshed first when it is about to expire
    pub async fn id_token(&self) -> Result<String, IdentityError> {
        let current = {
            let user = self.user.lock();
            (!user.token_expires_within(Duration::minutes(REFRESH_MARGIN_MINUTES), Utc::now()))
                .then(|| user.id_token.clone())
        };

        match current {
            Some(token) => Ok(token),
            None => self.force_refresh().await,
        }
    }

    /// Fetch a new ID token regardless of expiry, so newly granted claims show up
    pub async fn force_refresh(&self) -> Result<String, IdentityError> {
        let refresh_token = self.user.lock().refresh_token.clone();

        match self.identity.refresh(&refresh_token).await {
            Ok(refreshed) => {
                let token = refreshed.id_token.clone();
                self.user.lock().apply_refresh(refreshed, Utc::now());
                self.token_changed(token.clone());
                Ok(token)
            }
            Err(e) => {
                if e.is_revoked_credential() {
                    self.revoke();
                }
                self.emit(IdTokenEvent::Failed(anyhow::anyhow!("token refresh failed: {e}")));
                Err(e)
            }
        }
    }

    pub fn sign_out(&self) {
        self.emit(IdTokenEvent::Changed(None));
        tracing::info!(session_id = %self.id, "Session signed out");
    }
}

/// How long a session lives without a sign-out
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Longest gap between two requests
    pub idle: Duration,
    /// Lifetime regardless of activity
    pub max_age: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            idle: Duration::hours(2),
            max_age: Duration::hours(24),
        }
    }
}

/// Live sessions keyed by the id stored in the session cookie
///
/// Expired and revoked sessions are dropped when looked up and by [`SessionStore::spawn_sweeper`].
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Arc<Session>>>>,
    limits: SessionLimits,
}

impl SessionStore {
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            inner: Arc::default(),
            limits,
        }
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.inner.write().insert(session.id(), session);
    }

    /// Live session by id; counts as activity
    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.get_at(id, Utc::now())
    }

    fn get_at(&self, id: &Uuid, now: DateTime<Utc>) -> Option<Arc<Session>> {
        let session = self.inner.read().get(id).cloned()?;

        if session.is_expired(&self.limits, now) {
            self.remove(id);
            tracing::info!(session_id = %id, "Session expired");
            return None;
        }

        session.touch(now);
        Some(session)
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.inner.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Drop every expired or revoked session, returning how many went
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.inner.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(&self.limits, now));
        before - sessions.len()
    }

    /// Periodically evict sessions nobody has looked up
    pub fn spawn_sweeper(&self, every: std::time::Duration) -> JoinHandle<()> {
        let store = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let evicted = store.evict_expired(Utc::now());
                if evicted > 0 {
                    tracing::info!(evicted, remaining = store.len(), "Swept expired sessions");
                }
            }
        })
    }
}
