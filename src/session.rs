use anyhow::{Context, Result as AnyResult, bail};
use chrono::NaiveDateTime;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod entries;
mod login;

pub use login::UntisConnector;

use crate::config::ConnectionConfig;
use crate::error::UntisError;
use crate::json_util::improve_json_error;
use crate::session::entries::{Klasse, Period};

/// The seam to the remote timetable service.
///
/// The platform code only ever talks to this trait; the bundled
/// [`UntisClient`] speaks the real wire endpoint and test suites substitute
/// their own fakes. All calls block, callers decide where they may run.
pub trait UntisSession: Send + Sync + 'static {
    /// List the classes available to the logged-in account.
    fn klassen(&self) -> Result<Vec<Klasse>, UntisError>;

    /// Fetch the timetable of a class for a time range.
    ///
    /// The result preserves the order the server returned; no local
    /// re-sorting happens anywhere downstream.
    fn timetable(
        &self,
        klasse: &Klasse,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Period>, UntisError>;

    /// Invalidate the session on the server. Best effort.
    fn logout(&self) -> Result<(), UntisError>;
}

/// Opens authenticated sessions from validated configuration.
///
/// Injectable so platform setup can be exercised against a fake service.
pub trait Connector {
    type Session: UntisSession;

    fn connect(&self, config: &ConnectionConfig) -> Result<Self::Session, UntisError>;
}

/// A logged-in session against a real WebUntis server.
///
/// The session cookie lives in the client's cookie store, so every request
/// after [`UntisClient::login`] is automatically authenticated.
pub struct UntisClient {
    http_client: Client,
    url: Url,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'a str,
    id: &'a str,
    method: &'a str,
    params: JsonValue,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<JsonValue>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn describe(&self) -> String {
        format!("{} (code {})", self.message, self.code)
    }
}

impl UntisClient {
    /// Sends one JSON-RPC request and splits the response into result/error
    fn rpc(&self, method: &str, params: JsonValue) -> Result<RpcResponse, UntisError> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: method,
            method,
            params,
        };
        let ctx = || format!("Could not send {method:?} request to {}", self.url);
        let resp: Response = self
            .http_client
            .post(self.url.clone())
            .json(&body)
            .send()
            .with_context(ctx)?;
        let text: String = handle_response(resp).with_context(ctx)?;
        let parsed: RpcResponse = serde_json::from_str(&text)
            .map_err(|e| improve_json_error(&e, &text))
            .with_context(|| format!("Could not extract JSON from {method:?} response"))?;
        Ok(parsed)
    }

    /// Sends a JSON-RPC request and deserializes its result
    fn call<T>(&self, method: &str, params: JsonValue) -> Result<T, UntisError>
    where
        T: DeserializeOwned,
    {
        let resp = self.rpc(method, params)?;
        if let Some(err) = resp.error {
            return Err(UntisError::Api(err.describe()));
        }
        let result = resp.result.ok_or_else(|| {
            UntisError::Api(format!("{method:?} returned neither result nor error"))
        })?;
        let value: T = serde_json::from_value(result)
            .with_context(|| format!("Unexpected shape of {method:?} result"))?;
        Ok(value)
    }
}

fn handle_response(response: Response) -> AnyResult<String> {
    let status: StatusCode = response.status();
    let text: String = response
        .text()
        .with_context(|| format!("Could not extract text from response with status {status}"))?;

    if status.is_success() {
        return Ok(text);
    }

    bail!("Request failed with status {status}: {text}");
}
