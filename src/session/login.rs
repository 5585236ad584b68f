use std::sync::Arc;

use anyhow::Context;
use reqwest::{Url, blocking::Client, cookie::Jar};
use serde::Deserialize;
use serde_json::json;

use crate::config::ConnectionConfig;
use crate::error::UntisError;
use crate::session::{Connector, UntisClient};

/// Client identifier every authentication request is tagged with.
const CLIENT_ID: &str = concat!("webuntis-platforms/", env!("CARGO_PKG_VERSION"));

/// JSON-RPC error code the server answers with for a wrong username/password.
const BAD_CREDENTIALS_CODE: i64 = -8504;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResult {
    #[serde(default)]
    session_id: Option<String>,
}

impl UntisClient {
    /// Open an authenticated session against `https://{host}/WebUntis/`.
    ///
    /// # Errors
    /// * [`UntisError::BadCredentials`] when the server rejects the
    ///   username/password pair
    /// * [`UntisError::Auth`] when session negotiation fails for any other
    ///   reason the server reports (or no session id comes back)
    /// * [`UntisError::Other`] for transport-level failures; these are not
    ///   part of the recognized login failure taxonomy and propagate
    pub fn login(config: &ConnectionConfig) -> Result<Self, UntisError> {
        let url = format!("https://{}/WebUntis/jsonrpc.do", config.host);
        let mut url =
            Url::parse(&url).with_context(|| format!("Could not parse URL {url:?}"))?;
        url.query_pairs_mut().append_pair("school", &config.school);

        let jar = Arc::new(Jar::default());
        let http_client = Client::builder()
            .cookie_store(true)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .context("Could not build HTTP client")?;

        let client = Self { http_client, url };

        let params = json!({
            "user": config.username,
            "password": config.password,
            "client": CLIENT_ID,
        });
        let resp = client.rpc("authenticate", params)?;

        if let Some(err) = resp.error {
            if err.code == BAD_CREDENTIALS_CODE {
                return Err(UntisError::BadCredentials);
            }
            return Err(UntisError::Auth(err.describe()));
        }

        let auth: AuthResult = match resp.result {
            Some(value) => serde_json::from_value(value)
                .context("Unexpected shape of \"authenticate\" result")?,
            None => return Err(UntisError::Auth(String::from("empty authenticate response"))),
        };
        if auth.session_id.as_deref().unwrap_or_default().is_empty() {
            return Err(UntisError::Auth(String::from(
                "no session id in authenticate response",
            )));
        }

        // The session cookie now sits in the jar; nothing else to keep.
        Ok(client)
    }
}

/// The default connector: logs into the real service.
#[derive(Debug, Clone, Copy, Default)]
pub struct UntisConnector;

impl Connector for UntisConnector {
    type Session = UntisClient;

    fn connect(&self, config: &ConnectionConfig) -> Result<Self::Session, UntisError> {
        UntisClient::login(config)
    }
}
