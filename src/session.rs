//! Authentication state shared with every gated view.
//!
//! The store resolves the persisted session once at startup and then follows
//! the backend's change notifications for as long as it lives. Role lookup is
//! asymmetric:
//!
//! - at startup the role comes from the session's claim, then from the stored
//!   profile, then nothing;
//! - on every later notification only the claim is consulted.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{self, Backend, SessionChanges};
use crate::models::{Role, Session};

#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub loading: bool,
    pub session: Option<Session>,
    pub role: Option<Role>,
}

impl AuthState {
    pub fn loading() -> Self {
        Self {
            loading: true,
            session: None,
            role: None,
        }
    }

    pub fn signed_in(&self) -> bool {
        self.session.is_some()
    }
}

pub struct SessionStore {
    state: watch::Receiver<AuthState>,
    task: JoinHandle<()>,
}

impl SessionStore {
    /// Starts resolving the current session in the background.
    pub fn start(backend: Arc<dyn Backend>) -> Self {
        let (tx, rx) = watch::channel(AuthState::loading());
        // Subscribe before resolving so no notification can slip in between.
        let changes = backend.on_session_change();
        let task = tokio::spawn(run(backend, changes, tx));
        Self { state: rx, task }
    }

    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receives every state replacement. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.clone()
    }

    /// Waits until the startup resolution has finished.
    pub async fn resolved(&self) -> AuthState {
        let mut rx = self.state.clone();
        let state = match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            // The task is gone; report whatever was last published.
            Err(_) => self.current(),
        };
        state
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(backend: Arc<dyn Backend>, mut changes: SessionChanges, tx: watch::Sender<AuthState>) {
    info!("resolving existing session");
    let session = match backend.get_session().await {
        Ok(session) => session,
        Err(err) => {
            warn!(error = %err, "session resolution failed; continuing signed out");
            None
        }
    };
    let role = match &session {
        Some(session) => initial_role(backend.as_ref(), session).await,
        None => None,
    };
    tx.send_replace(AuthState {
        loading: false,
        session,
        role,
    });

    loop {
        match changes.recv().await {
            Ok(session) => {
                debug!(signed_in = session.is_some(), "auth state changed");
                let role = session.as_ref().and_then(|s| s.user.role_claim());
                tx.send_replace(AuthState {
                    loading: false,
                    session,
                    role,
                });
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "session notifications lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Claim first, then the stored profile, then no role.
pub async fn initial_role(backend: &dyn Backend, session: &Session) -> Option<Role> {
    if let Some(role) = session.user.role_claim() {
        return Some(role);
    }

    match backend.profile_by_id(session.user.id).await {
        Ok(profile) => profile.as_ref().and_then(backend::profile_role),
        Err(err) => {
            warn!(user = %session.user.id, error = %err, "profile role lookup failed");
            None
        }
    }
}
