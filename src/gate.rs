//! Entry gate
//!
//! Decides, during the WebSocket handshake, whether a connection may enter
//! the room at all. A rejected request gets a plain HTTP response and never
//! reaches the room.

use cookie::Cookie;
use thiserror::Error;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request};
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};

/// Request path served by the room
pub const ROOM_PATH: &str = "/room";

/// Cookie checked by `CookieGate` unless configured otherwise
pub const DEFAULT_AUTH_COOKIE: &str = "auth";

/// Where unauthenticated requests are redirected
pub const LOGIN_LOCATION: &str = "/login";

/// Why a handshake was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Request path is not the room
    #[error("Not found")]
    NotFound,

    /// Caller must log in first
    #[error("Authentication required")]
    Unauthenticated { location: String },
}

impl Rejection {
    /// Build the HTTP response sent instead of the upgrade
    pub fn into_response(self) -> ErrorResponse {
        let mut response = ErrorResponse::new(Some(self.to_string()));
        match self {
            Rejection::NotFound => {
                *response.status_mut() = StatusCode::NOT_FOUND;
            }
            Rejection::Unauthenticated { location } => {
                *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
                if let Ok(value) = HeaderValue::from_str(&location) {
                    response.headers_mut().insert(header::LOCATION, value);
                }
            }
        }
        response
    }
}

/// Admission policy for new connections
pub trait EntryGate: Send + Sync {
    /// Admit or reject a handshake request
    fn admit(&self, request: &Request) -> Result<(), Rejection>;
}

/// Admits every request
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenGate;

impl EntryGate for OpenGate {
    fn admit(&self, _request: &Request) -> Result<(), Rejection> {
        Ok(())
    }
}

/// Admits only requests carrying a named cookie
///
/// The cookie's value is not inspected; issuing it is the login flow's job.
#[derive(Debug, Clone)]
pub struct CookieGate {
    cookie: String,
    login_location: String,
}

impl CookieGate {
    /// Require `cookie`, redirecting to the login page without it
    pub fn new(cookie: impl Into<String>) -> Self {
        Self {
            cookie: cookie.into(),
            login_location: LOGIN_LOCATION.to_string(),
        }
    }

    fn has_cookie(&self, request: &Request) -> bool {
        request
            .headers()
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|line| Cookie::split_parse(line))
            .filter_map(Result::ok)
            .any(|cookie| cookie.name() == self.cookie)
    }
}

impl Default for CookieGate {
    fn default() -> Self {
        Self::new(DEFAULT_AUTH_COOKIE)
    }
}

impl EntryGate for CookieGate {
    fn admit(&self, request: &Request) -> Result<(), Rejection> {
        if self.has_cookie(request) {
            Ok(())
        } else {
            Err(Rejection::Unauthenticated {
                location: self.login_location.clone(),
            })
        }
    }
}

/// Check the request path, then ask the gate
pub fn screen(request: &Request, gate: &dyn EntryGate) -> Result<(), Rejection> {
    if request.uri().path() != ROOM_PATH {
        return Err(Rejection::NotFound);
    }
    gate.admit(request)
}
