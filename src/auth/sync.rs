//! Keeps a session's claims in step with its ID token
//!
//! Every token change (sign-in, refresh, sign-out, refresh failure) arrives as an
//! [`IdTokenEvent`]. [`ClaimsSync`] turns that stream into a claims snapshot:
//!
//! - `None` until the first event, and again after sign-out
//! - `Some(claims)` once a present user's token has been decoded
//! - `Some(empty)` when the provider reported an error or the claims could not be read

use futures::{Stream, StreamExt};
use std::future::Future;
use tokio::{sync::watch, task::JoinHandle};

use super::AuthClaims;

pub type ClaimsSnapshot = Option<AuthClaims>;

/// A signed-in user whose current token can be decoded into claims
pub trait ClaimsSource: Send + Sync + 'static {
    fn fetch_claims(&self) -> impl Future<Output = anyhow::Result<AuthClaims>> + Send;
}

#[derive(Debug)]
pub enum IdTokenEvent<U> {
    /// The signed-in user (or its token) changed; `None` after sign-out
    Changed(Option<U>),
    Failed(anyhow::Error),
}

/// Subscription to a stream of token events, publishing the current claims.
///
/// Events are handled one at a time in arrival order, so a slow claims fetch can never
/// overwrite the outcome of a later event. Dropping the value ends the subscription.
pub struct ClaimsSync {
    state: watch::Receiver<ClaimsSnapshot>,
    task: JoinHandle<()>,
}

impl ClaimsSync {
    pub fn spawn<S, U>(events: S) -> Self
    where
        S: Stream<Item = IdTokenEvent<U>> + Send + 'static,
        U: ClaimsSource,
    {
        let (tx, rx) = watch::channel(None);

        let task = tokio::spawn(async move {
            let mut events = Box::pin(events);

            while let Some(event) = events.next().await {
                let snapshot = match event {
                    IdTokenEvent::Changed(Some(user)) => match user.fetch_claims().await {
                        Ok(claims) => Some(claims),
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to read claims from ID token");
                            Some(AuthClaims::default())
                        }
                    },
                    IdTokenEvent::Changed(None) => None,
                    IdTokenEvent::Failed(e) => {
                        tracing::warn!(error = %e, "ID token listener reported an error");
                        Some(AuthClaims::default())
                    }
                };

                tx.send_replace(snapshot);
            }

            tracing::debug!("ID token event stream closed");
        });

        Self { state: rx, task }
    }

    pub fn current(&self) -> ClaimsSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<ClaimsSnapshot> {
        self.state.clone()
    }
}

impl Drop for ClaimsSync {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use serde_json::json;

    struct StubUser(Result<AuthClaims, &'static str>);

    impl ClaimsSource for StubUser {
        async fn fetch_claims(&self) -> anyhow::Result<AuthClaims> {
            self.0.clone().map_err(anyhow::Error::msg)
        }
    }

    fn committee() -> AuthClaims {
        [("dbRole".to_string(), json!("committee"))]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn unresolved_until_first_event() {
        let (_tx, rx) = mpsc::unbounded::<IdTokenEvent<StubUser>>();
        let sync = ClaimsSync::spawn(rx);

        assert_eq!(sync.current(), None);
    }

    #[tokio::test]
    async fn follows_sign_in_error_and_sign_out() {
        let (tx, rx) = mpsc::unbounded();
        let sync = ClaimsSync::spawn(rx);
        let mut updates = sync.subscribe();

        tx.unbounded_send(IdTokenEvent::Changed(Some(StubUser(Ok(committee())))))
            .unwrap();
        updates.changed().await.unwrap();
        assert_eq!(*updates.borrow_and_update(), Some(committee()));

        tx.unbounded_send(IdTokenEvent::Failed(anyhow::anyhow!("network down")))
            .unwrap();
        updates.changed().await.unwrap();
        assert_eq!(*updates.borrow_and_update(), Some(AuthClaims::default()));

        tx.unbounded_send(IdTokenEvent::Changed(None)).unwrap();
        updates.changed().await.unwrap();
        assert_eq!(*updates.borrow_and_update(), None);
        assert_eq!(sync.current(), None);
    }

    #[tokio::test]
    async fn unreadable_token_resolves_to_empty_claims() {
        let (tx, rx) = mpsc::unbounded();
        let sync = ClaimsSync::spawn(rx);
        let mut updates = sync.subscribe();

        tx.unbounded_send(IdTokenEvent::Changed(Some(StubUser(Err("bad signature")))))
            .unwrap();
        updates.changed().await.unwrap();

        assert_eq!(sync.current(), Some(AuthClaims::default()));
    }

    #[tokio::test]
    async fn dropping_ends_the_subscription() {
        let (tx, rx) = mpsc::unbounded::<IdTokenEvent<StubUser>>();
        let sync = ClaimsSync::spawn(rx);
        let mut updates = sync.subscribe();

        drop(sync);

        assert!(updates.changed().await.is_err());
        assert!(tx.unbounded_send(IdTokenEvent::Changed(None)).is_err());
    }
}
