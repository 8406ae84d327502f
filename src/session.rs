/// Authenticated session source
///
/// The auth provider owns users and credentials; the gallery only needs to
/// know who is signed in right now and to hear about changes.
use crate::models::UserSession;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Holds the current session and notifies watchers on change
#[derive(Clone)]
pub struct SessionSource {
    sender: Arc<watch::Sender<Option<UserSession>>>,
}

impl SessionSource {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Start with an already signed-in user
    pub fn signed_in(session: UserSession) -> Self {
        let (sender, _) = watch::channel(Some(session));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> Option<UserSession> {
        self.sender.borrow().clone()
    }

    /// Replace the session; watchers are only woken when it actually changed
    pub fn sign_in(&self, session: UserSession) {
        info!("User {} signed in", session.email);
        self.sender.send_if_modified(|current| {
            if current.as_ref() == Some(&session) {
                false
            } else {
                *current = Some(session);
                true
            }
        });
    }

    pub fn sign_out(&self) {
        self.sender.send_if_modified(|current| {
            if let Some(previous) = current.take() {
                info!("User {} signed out", previous.email);
                true
            } else {
                false
            }
        });
    }

    /// Watch for session changes
    pub fn watch(&self) -> watch::Receiver<Option<UserSession>> {
        self.sender.subscribe()
    }
}

impl Default for SessionSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_in_notifies_watchers() {
        let source = SessionSource::new();
        let mut rx = source.watch();
        assert!(rx.borrow().is_none());

        source.sign_in(UserSession::new("u1", "a@example.com"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().id, "u1");
    }

    #[tokio::test]
    async fn test_repeated_sign_in_is_not_a_change() {
        let source = SessionSource::signed_in(UserSession::new("u1", "a@example.com"));
        let rx = source.watch();

        source.sign_in(UserSession::new("u1", "a@example.com"));
        assert!(!rx.has_changed().unwrap());

        source.sign_out();
        assert!(rx.has_changed().unwrap());
        assert!(source.current().is_none());
    }
}
