use std::sync::Arc;

use tracing::{debug, info, warn};

use etra_types::AllowList;
use etra_types::api::INVALID_CREDENTIALS;

use crate::backend::{Auth, Session};
use crate::error::{BackendError, LoginError};

/// Login gate in front of the auth service.
///
/// Only the two allow-listed addresses ever reach the network.
#[derive(Clone)]
pub struct AuthGate {
    auth: Arc<dyn Auth>,
    allow_list: AllowList,
}

impl AuthGate {
    pub fn new(auth: Arc<dyn Auth>, allow_list: AllowList) -> Self {
        Self { auth, allow_list }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Resume a persisted session. A session whose email dropped off the
    /// allow-list is signed out and treated as absent.
    pub async fn restore(&self) -> Result<Option<Session>, BackendError> {
        let Some(session) = self.auth.get_session().await? else {
            return Ok(None);
        };
        if !self.allow_list.is_allowed_email(&session.user.email) {
            warn!("Dropping persisted session for {}", session.user.email);
            self.auth.sign_out().await?;
            return Ok(None);
        }
        debug!("Restored session for {}", session.user.email);
        Ok(Some(session))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, LoginError> {
        if !self.allow_list.is_allowed_email(email) {
            return Err(LoginError::NotAllowed);
        }

        // Clear whatever session is lying around first.
        if let Err(e) = self.auth.sign_out().await {
            warn!("Sign-out before login failed: {}", e);
        }

        match self.auth.sign_in_with_password(email, password).await {
            Ok(session) => {
                info!("Signed in as {}", session.user.email);
                Ok(session)
            }
            Err(BackendError::Rejected { message, .. }) if message == INVALID_CREDENTIALS => {
                Err(LoginError::InvalidCredentials)
            }
            Err(e) => Err(LoginError::Failed(e)),
        }
    }

    pub async fn logout(&self) -> Result<(), BackendError> {
        self.auth.sign_out().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use etra_types::{Participant, User};

    use super::*;

    #[derive(Default)]
    struct FakeAuth {
        calls: Mutex<Vec<String>>,
        session: Mutex<Option<Session>>,
    }

    fn session(email: &str) -> Session {
        Session {
            user: User {
                id: Uuid::new_v4(),
                email: email.into(),
                name: "n".into(),
                created_at: Utc::now(),
            },
            token: "t".into(),
        }
    }

    #[async_trait]
    impl Auth for FakeAuth {
        async fn get_session(&self) -> Result<Option<Session>, BackendError> {
            Ok(self.session.lock().unwrap().clone())
        }

        async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
            self.calls.lock().unwrap().push(format!("sign_in:{email}"));
            match password {
                "right" => Ok(session(email)),
                "wrong" => Err(BackendError::rejected(401, INVALID_CREDENTIALS)),
                _ => Err(BackendError::rejected(500, "boom")),
            }
        }

        async fn sign_out(&self) -> Result<(), BackendError> {
            self.calls.lock().unwrap().push("sign_out".into());
            *self.session.lock().unwrap() = None;
            Ok(())
        }
    }

    fn gate() -> (AuthGate, Arc<FakeAuth>) {
        let auth = Arc::new(FakeAuth::default());
        let list = AllowList::new(
            Participant::new("a@example.com", "A"),
            Participant::new("b@example.com", "B"),
        );
        (AuthGate::new(auth.clone(), list), auth)
    }

    #[tokio::test]
    async fn off_list_emails_never_reach_the_service() {
        let (gate, auth) = gate();
        let err = gate.login("x@example.com", "right").await.unwrap_err();
        assert!(matches!(err, LoginError::NotAllowed));
        assert!(auth.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn signs_out_then_in_case_insensitively() {
        let (gate, auth) = gate();
        gate.login("A@Example.com", "right").await.unwrap();
        assert_eq!(*auth.calls.lock().unwrap(), ["sign_out", "sign_in:A@Example.com"]);
    }

    #[tokio::test]
    async fn maps_backend_failures() {
        let (gate, _) = gate();
        assert!(matches!(
            gate.login("a@example.com", "wrong").await,
            Err(LoginError::InvalidCredentials)
        ));
        assert!(matches!(
            gate.login("a@example.com", "other").await,
            Err(LoginError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn restore_drops_sessions_off_the_list() {
        let (gate, auth) = gate();
        assert!(gate.restore().await.unwrap().is_none());

        *auth.session.lock().unwrap() = Some(session("b@example.com"));
        assert!(gate.restore().await.unwrap().is_some());

        *auth.session.lock().unwrap() = Some(session("gone@example.com"));
        assert!(gate.restore().await.unwrap().is_none());
        assert!(auth.session.lock().unwrap().is_none());
    }
}
