use tokio::sync::watch;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::models::Session;
use crate::session::AuthState;

/// Credential form. A rejected attempt leaves its message for display and
/// can simply be resubmitted.
#[derive(Debug, Default)]
pub struct LoginForm {
    pub error: Option<String>,
}

impl LoginForm {
    pub async fn submit(
        &mut self,
        backend: &dyn Backend,
        email: &str,
        password: &str,
    ) -> Option<Session> {
        self.error = None;
        let result = backend.sign_in_with_password(email, password).await;

        match result {
            Ok(session) => {
                info!(user = %session.user.id, "signed in");
                Some(session)
            }
            Err(err) => {
                warn!(email, error = %err, "sign in failed");
                self.error = Some(err.to_string());
                None
            }
        }
    }
}

/// Waits until the store has applied `session`. A state still holding an
/// earlier account does not count, even if it is signed in.
pub async fn settled_on(
    changes: &mut watch::Receiver<AuthState>,
    session: &Session,
) -> Result<AuthState, watch::error::RecvError> {
    let token = session.access_token;
    let state = changes
        .wait_for(|state| {
            state.session.as_ref().map(|current| current.access_token) == Some(token)
        })
        .await?
        .clone();
    Ok(state)
}
