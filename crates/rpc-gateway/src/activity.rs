//! Activity sessions
//!
//! Next to the gateway presence, the platform keeps track of running games
//! through `POST /api/v9/activities`. Each answer carries a token that the
//! next report has to send back.

use parking_lot::Mutex;
use rpc_core::Snowflake;
use serde::{Deserialize, Serialize};

use crate::error::ActivityError;
use crate::rest::Endpoints;

/// API path of activity session reports
pub const ACTIVITIES_PATH: &str = "/api/v9/activities";

#[derive(Debug, Serialize)]
struct SessionUpdate<'a> {
    token: Option<&'a str>,
    application_id: Snowflake,
    share_activity: bool,
    #[serde(rename = "exePath")]
    exe_path: &'a str,
    voice_channel_id: Option<Snowflake>,
    session_id: Option<&'a str>,
    media_session_id: Option<&'a str>,
    closed: bool,
}

#[derive(Debug, Deserialize)]
struct SessionReply {
    token: String,
}

/// Reports game starts and stops to the activity session API
#[derive(Debug)]
pub struct ActivitySessions {
    client: reqwest::Client,
    url: String,
    /// Rolling token from the last successful report
    token: Mutex<Option<String>>,
}

impl ActivitySessions {
    /// `client` should come from `rest_client` so it carries the account headers
    #[must_use]
    pub fn new(client: reqwest::Client, endpoints: &Endpoints) -> Self {
        Self {
            client,
            url: endpoints.api_url(ACTIVITIES_PATH),
            token: Mutex::new(None),
        }
    }

    /// Token the next report will carry
    pub fn token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    /// Report that `app_id`, run from `exe_path`, started (`closed = false`) or stopped
    ///
    /// `session_id` is the gateway session the activity belongs to.
    pub async fn report(
        &self,
        app_id: Snowflake,
        exe_path: &str,
        closed: bool,
        session_id: Option<&str>,
    ) -> Result<(), ActivityError> {
        let token = self.token();
        let update = SessionUpdate {
            token: token.as_deref(),
            application_id: app_id,
            share_activity: true,
            exe_path,
            voice_channel_id: None,
            session_id,
            media_session_id: None,
            closed,
        };

        let response = self.client.post(&self.url).json(&update).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ActivityError::Status(status.as_u16()));
        }

        let reply: SessionReply = response.json().await?;
        *self.token.lock() = Some(reply.token);
        Ok(())
    }
}
