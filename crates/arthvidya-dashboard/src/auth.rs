use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tokio::sync::RwLock;

use arthvidya_core::TeamId;

use crate::error::AppError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Display name of the privileged role.
pub const CONTROL_ROLE: &str = "Control Center";

/// Who a dashboard session acts as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Control,
    Team(TeamId),
}

impl Role {
    /// Parse a role display name: "Control Center" or "Team N" (N >= 1).
    pub fn parse(name: &str) -> Option<Self> {
        if name == CONTROL_ROLE {
            return Some(Self::Control);
        }
        let n: usize = name.strip_prefix("Team ")?.parse().ok()?;
        (n > 0).then(|| Self::Team(format!("T{n}")))
    }

    pub fn team_id(&self) -> Option<&str> {
        match self {
            Self::Control => None,
            Self::Team(id) => Some(id),
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Self::Control)
    }

    pub fn require_control(&self) -> Result<(), AppError> {
        if self.is_control() {
            Ok(())
        } else {
            Err(AppError::Forbidden("control role required".to_string()))
        }
    }

    pub fn require_team(&self) -> Result<&str, AppError> {
        self.team_id()
            .ok_or_else(|| AppError::Forbidden("team role required".to_string()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Control => f.write_str(CONTROL_ROLE),
            Self::Team(id) => write!(f, "Team {}", id.trim_start_matches('T')),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Checks a role's credential.
pub trait Authenticator: Send + Sync {
    fn validate(&self, role: &str, credential: &str) -> bool;

    /// Whether `role` has a credential configured at all.
    fn knows(&self, role: &str) -> bool;
}

/// Plaintext role secrets. Insecure; meant for a game night on a trusted LAN.
pub struct StaticSecretAuthenticator {
    secrets: HashMap<String, String>,
}

impl StaticSecretAuthenticator {
    pub fn new(secrets: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            secrets: secrets.into_iter().collect(),
        }
    }

    /// The secrets the game has always shipped with.
    pub fn demo() -> Self {
        Self::new(
            [
                ("Team 1", "mercedes"),
                ("Team 2", "mclaren"),
                ("Team 3", "redbull"),
                ("Team 4", "audi"),
                ("Team 5", "astonmartin"),
                (CONTROL_ROLE, "ferrari"),
            ]
            .map(|(role, secret)| (role.to_string(), secret.to_string())),
        )
    }
}

impl Authenticator for StaticSecretAuthenticator {
    fn validate(&self, role: &str, credential: &str) -> bool {
        self.secrets
            .get(role)
            .is_some_and(|secret| secret == credential)
    }

    fn knows(&self, role: &str) -> bool {
        self.secrets.contains_key(role)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("digest for role {role:?} is not valid hex: {source}")]
    BadDigest {
        role: String,
        #[source]
        source: hex::FromHexError,
    },
    #[error("pepper must not be empty")]
    EmptyPepper,
}

/// Role secrets stored as HMAC-SHA256 digests keyed by a server pepper.
pub struct DigestAuthenticator {
    pepper: Vec<u8>,
    digests: HashMap<String, Vec<u8>>,
}

impl DigestAuthenticator {
    /// `digests` maps role name to the hex digest produced by [`Self::digest`].
    pub fn new(pepper: &str, digests: &BTreeMap<String, String>) -> Result<Self, AuthError> {
        if pepper.is_empty() {
            return Err(AuthError::EmptyPepper);
        }
        let digests = digests
            .iter()
            .map(|(role, hex_digest)| {
                hex::decode(hex_digest)
                    .map(|bytes| (role.clone(), bytes))
                    .map_err(|source| AuthError::BadDigest {
                        role: role.clone(),
                        source,
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            pepper: pepper.as_bytes().to_vec(),
            digests,
        })
    }

    /// Hex digest of `secret` under `pepper`, as stored in the config file.
    pub fn digest(pepper: &str, secret: &str) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(pepper.as_bytes()).ok()?;
        mac.update(secret.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}

impl Authenticator for DigestAuthenticator {
    fn validate(&self, role: &str, credential: &str) -> bool {
        let Some(expected) = self.digests.get(role) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.pepper) else {
            return false;
        };
        mac.update(credential.as_bytes());
        mac.verify_slice(expected).is_ok()
    }

    fn knows(&self, role: &str) -> bool {
        self.digests.contains_key(role)
    }
}

struct Session {
    role: Role,
    expires_at: Instant,
}

/// Bearer tokens handed out at login.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn create(&self, role: Role) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let session = Session {
            role,
            expires_at: Instant::now() + self.ttl,
        };
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(token.clone(), session);
        token
    }

    pub async fn role(&self, token: &str) -> Option<Role> {
        let sessions = self.sessions.read().await;
        sessions
            .get(token)
            .filter(|s| s.expires_at > Instant::now())
            .map(|s| s.role.clone())
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Remove expired sessions. Returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let now = Instant::now();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }

    pub async fn active_count(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.expires_at > now)
            .count()
    }
}

/// Session token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Axum middleware that resolves the session token to a [`Role`] and stores
/// it in the request extensions. Unknown or expired tokens are rejected.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(token) = bearer_token(request.headers()) else {
        return Err(AppError::Unauthorized("missing session token".to_string()));
    };
    let Some(role) = state.sessions.role(token).await else {
        return Err(AppError::Unauthorized(
            "invalid or expired session".to_string(),
        ));
    };
    request.extensions_mut().insert(role);
    Ok(next.run(request).await)
}
