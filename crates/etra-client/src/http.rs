use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use etra_types::api::{
    ClearMessagesResponse, CreateNoteRequest, ErrorBody, LoginRequest, LoginResponse, SendMessageRequest,
    SessionResponse, UpdateNoteRequest,
};
use etra_types::{Message, Note, User};

use crate::backend::{Auth, Session, Store};
use crate::error::BackendError;

/// REST client for the ETRA backend.
///
/// Holds the bearer token of the current session; `sign_in_with_password`
/// sets it and `sign_out` clears it.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        }
    }

    /// Resume with a token persisted from an earlier session.
    pub fn with_token(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let backend = Self::new(base_url);
        backend.set_token(Some(token.into()));
        backend
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, BackendError> {
        let token = self.token().ok_or(BackendError::Unauthenticated)?;
        Ok(request.bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = self.authorized(request)?.send().await?;
        check(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        Ok(self.send(request).await?.json().await?)
    }
}

/// Turn a non-2xx response into `BackendError::Rejected`, keeping the
/// server's error text when it sent one.
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
    };
    Err(BackendError::rejected(status.as_u16(), message))
}

#[async_trait]
impl Auth for HttpBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let Some(token) = self.token() else {
            return Ok(None);
        };
        match self.send_json::<SessionResponse>(self.client.get(self.url("/auth/session"))).await {
            Ok(SessionResponse { user }) => Ok(Some(Session { user, token })),
            Err(BackendError::Rejected { status, .. }) if status == StatusCode::UNAUTHORIZED.as_u16() => {
                debug!("Persisted session expired");
                self.set_token(None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let LoginResponse { user, token }: LoginResponse = check(response).await?.json().await?;
        self.set_token(Some(token.clone()));
        Ok(Session { user, token })
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.token().is_none() {
            return Ok(());
        }
        let result = self.send(self.client.post(self.url("/auth/logout"))).await;
        self.set_token(None);
        match result {
            Ok(_) => Ok(()),
            // Already expired server-side.
            Err(BackendError::Rejected { status, .. }) if status == StatusCode::UNAUTHORIZED.as_u16() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Store for HttpBackend {
    async fn list_users(&self) -> Result<Vec<User>, BackendError> {
        self.send_json(self.client.get(self.url("/users"))).await
    }

    async fn fetch_messages(&self) -> Result<Vec<Message>, BackendError> {
        self.send_json(self.client.get(self.url("/messages"))).await
    }

    async fn insert_message(&self, request: SendMessageRequest) -> Result<Message, BackendError> {
        self.send_json(self.client.post(self.url("/messages")).json(&request))
            .await
    }

    async fn delete_message(&self, id: Uuid) -> Result<(), BackendError> {
        self.send(self.client.delete(self.url(&format!("/messages/{id}"))))
            .await?;
        Ok(())
    }

    async fn clear_messages(&self) -> Result<(), BackendError> {
        let ClearMessagesResponse { deleted }: ClearMessagesResponse =
            self.send_json(self.client.delete(self.url("/messages"))).await?;
        debug!("Cleared {} messages", deleted);
        Ok(())
    }

    async fn fetch_notes(&self) -> Result<Vec<Note>, BackendError> {
        self.send_json(self.client.get(self.url("/notes"))).await
    }

    async fn insert_note(&self, request: CreateNoteRequest) -> Result<Note, BackendError> {
        self.send_json(self.client.post(self.url("/notes")).json(&request))
            .await
    }

    async fn set_note_completed(&self, id: Uuid, is_completed: bool) -> Result<Note, BackendError> {
        self.send_json(
            self.client
                .patch(self.url(&format!("/notes/{id}")))
                .json(&UpdateNoteRequest { is_completed }),
        )
        .await
    }

    async fn delete_note(&self, id: Uuid) -> Result<(), BackendError> {
        self.send(self.client.delete(self.url(&format!("/notes/{id}"))))
            .await?;
        Ok(())
    }
}
