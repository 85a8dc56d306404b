use anyhow::{Context, Result, bail};
use log::debug;
use serde_json::{Value, json};

use super::BlogApi;
use crate::auth::SaveOutcome;
use crate::config::LOGIN_FALLBACK_PATH;

impl BlogApi {
    /// Signs in with username and password. Tries the SimpleJWT token obtain
    /// pair endpoint first; if that call fails for any reason, falls back to
    /// the dj-rest-auth style login endpoint. Whatever credential payload
    /// comes back is normalized into the session.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let body = json!({ "username": username, "password": password });

        let obtain_path = self.http().config().token_obtain_path.clone();
        let payload: Value = match self.http().post_json(&obtain_path, &body).await {
            Ok(payload) => payload,
            Err(e) => {
                debug!("Token obtain failed ({:#}), trying fallback login endpoint", e);
                self.http()
                    .post_json(LOGIN_FALLBACK_PATH, &body)
                    .await
                    .context("Login failed")?
            }
        };

        match self.session().save_tokens(&payload).await? {
            SaveOutcome::Saved => Ok(()),
            SaveOutcome::Unrecognized => {
                bail!("Login succeeded but the server returned no usable credential")
            }
        }
    }

    /// Signs out: drops the credential pair. Idempotent.
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.session().clear().await
    }
}
