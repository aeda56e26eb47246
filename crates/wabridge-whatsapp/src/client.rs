// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the sidecar control API.
//!
//! Every call is scoped to one instance: `<base>/instances/<name>/...`.
//! Status mapping: 429 and 5xx are transient, other 4xx terminal, and an
//! unreachable sidecar is [`BridgeError::ProtocolUnavailable`].

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tracing::debug;
use wabridge_config::TransportConfig;
use wabridge_core::{BridgeError, MessageId, SendPayload};

/// Header carrying the sidecar API key.
pub const API_KEY_HEADER: &str = "apikey";

#[derive(Clone)]
pub struct SidecarClient {
    client: reqwest::Client,
    base_url: String,
    instance: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ConnectBody<'a> {
    creds: Option<&'a serde_json::Value>,
}

#[derive(Serialize)]
struct SendBody<'a> {
    jid: &'a str,
    message: &'a SendPayload,
}

#[derive(Deserialize)]
struct SendResponse {
    message_id: String,
}

#[derive(Serialize)]
struct ReadBody<'a> {
    chat_jid: &'a str,
    sender_jid: &'a str,
    message_id: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl SidecarClient {
    pub fn new(config: &TransportConfig, instance: &str) -> Result<Self, BridgeError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            headers.insert(
                API_KEY_HEADER,
                HeaderValue::from_str(key).map_err(|e| {
                    BridgeError::Config(format!("invalid sidecar API key header value: {e}"))
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BridgeError::Transport {
                message: format!("failed to build HTTP client: {e}"),
                transient: false,
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.sidecar_url.trim_end_matches('/').to_string(),
            instance: instance.to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    fn url(&self, path: &str) -> String {
        format!("{}/instances/{}/{path}", self.base_url, self.instance)
    }

    /// WebSocket URL of the instance's event stream.
    pub fn events_url(&self) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{base}/instances/{}/events", self.instance)
    }

    /// Handshake request for the event stream, carrying the API key.
    pub fn events_request(&self) -> Result<Request, BridgeError> {
        let mut request = self
            .events_url()
            .into_client_request()
            .map_err(|e| BridgeError::Config(format!("invalid sidecar event URL: {e}")))?;
        if let Some(key) = &self.api_key {
            let value = key.parse().map_err(|e| {
                BridgeError::Config(format!("invalid sidecar API key header value: {e}"))
            })?;
            request.headers_mut().insert(API_KEY_HEADER, value);
        }
        Ok(request)
    }

    /// Asks the sidecar to open the linked-device socket. Without
    /// credentials the sidecar starts pairing.
    pub async fn connect(&self, creds: Option<&serde_json::Value>) -> Result<(), BridgeError> {
        let response = self
            .client
            .post(self.url("connect"))
            .json(&ConnectBody { creds })
            .send()
            .await
            .map_err(request_error)?;
        check(response).await.map(|_| ())
    }

    pub async fn send(&self, jid: &str, payload: &SendPayload) -> Result<MessageId, BridgeError> {
        let response = self
            .client
            .post(self.url("messages"))
            .json(&SendBody {
                jid,
                message: payload,
            })
            .send()
            .await
            .map_err(request_error)?;
        let response = check(response).await?;
        let body: SendResponse = response.json().await.map_err(|e| {
            BridgeError::terminal(format!("unexpected send response from sidecar: {e}"))
        })?;
        debug!(instance = %self.instance, message_id = %body.message_id, "sidecar accepted message");
        Ok(MessageId(body.message_id))
    }

    /// Fetches decrypted media bytes for the message the handle describes.
    pub async fn download(&self, handle: &serde_json::Value) -> Result<Vec<u8>, BridgeError> {
        let response = self
            .client
            .post(self.url("media/download"))
            .json(handle)
            .send()
            .await
            .map_err(request_error)?;
        let response = check(response).await?;
        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(bytes.to_vec())
    }

    pub async fn mark_read(
        &self,
        chat_jid: &str,
        sender_jid: &str,
        message_id: &MessageId,
    ) -> Result<(), BridgeError> {
        let response = self
            .client
            .post(self.url("read"))
            .json(&ReadBody {
                chat_jid,
                sender_jid,
                message_id: &message_id.0,
            })
            .send()
            .await
            .map_err(request_error)?;
        check(response).await.map(|_| ())
    }

    pub async fn logout(&self) -> Result<(), BridgeError> {
        let response = self
            .client
            .delete(self.url("session"))
            .send()
            .await
            .map_err(request_error)?;
        check(response).await.map(|_| ())
    }

    pub async fn disconnect(&self) -> Result<(), BridgeError> {
        let response = self
            .client
            .post(self.url("disconnect"))
            .send()
            .await
            .map_err(request_error)?;
        check(response).await.map(|_| ())
    }

    /// Probes the sidecar's own liveness endpoint.
    pub async fn health(&self) -> Result<(), BridgeError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(request_error)?;
        check(response).await.map(|_| ())
    }
}

impl std::fmt::Debug for SidecarClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidecarClient")
            .field("base_url", &self.base_url)
            .field("instance", &self.instance)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

fn request_error(e: reqwest::Error) -> BridgeError {
    if e.is_connect() {
        return BridgeError::ProtocolUnavailable(format!("sidecar unreachable: {e}"));
    }
    BridgeError::Transport {
        message: format!("sidecar request failed: {e}"),
        transient: e.is_timeout() || e.is_request() || e.is_body(),
        source: Some(Box::new(e)),
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, BridgeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(status_error(status, &detail))
}

/// Maps a non-success sidecar status to a transport error.
pub fn status_error(status: StatusCode, detail: &str) -> BridgeError {
    let message = if detail.is_empty() {
        format!("sidecar returned {status}")
    } else {
        format!("sidecar returned {status}: {detail}")
    };
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        BridgeError::transient(message)
    } else {
        BridgeError::terminal(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> TransportConfig {
        TransportConfig {
            sidecar_url: url.to_string(),
            api_key: Some("sidecar-key".into()),
            request_timeout_secs: 5,
            connect_timeout_secs: 5,
        }
    }

    #[test]
    fn events_url_switches_scheme() {
        let client = SidecarClient::new(&config("http://127.0.0.1:8080/"), "home").unwrap();
        assert_eq!(client.events_url(), "ws://127.0.0.1:8080/instances/home/events");

        let client = SidecarClient::new(&config("https://sidecar.local"), "home").unwrap();
        assert_eq!(client.events_url(), "wss://sidecar.local/instances/home/events");
    }

    #[test]
    fn events_request_carries_api_key() {
        let client = SidecarClient::new(&config("http://127.0.0.1:8080"), "home").unwrap();
        let request = client.events_request().unwrap();
        assert_eq!(request.headers().get(API_KEY_HEADER).unwrap(), "sidecar-key");
    }

    #[test]
    fn debug_redacts_api_key() {
        let client = SidecarClient::new(&config("http://127.0.0.1:8080"), "home").unwrap();
        assert!(!format!("{client:?}").contains("sidecar-key"));
    }

    #[test]
    fn status_mapping() {
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "slow down").is_transient());
        assert!(!status_error(StatusCode::BAD_REQUEST, "bad jid").is_transient());
        assert!(!status_error(StatusCode::UNAUTHORIZED, "").is_transient());
    }

    #[tokio::test]
    async fn send_posts_payload_and_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instances/home/messages"))
            .and(header(API_KEY_HEADER, "sidecar-key"))
            .and(body_json(serde_json::json!({
                "jid": "491234@s.whatsapp.net",
                "message": {"kind": "text", "text": "hi", "quoted_message_id": null}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"message_id": "3EB0ABC"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = SidecarClient::new(&config(&server.uri()), "home").unwrap();
        let id = client
            .send("491234@s.whatsapp.net", &SendPayload::Text {
                text: "hi".into(),
                quoted_message_id: None,
            })
            .await
            .unwrap();
        assert_eq!(id, MessageId("3EB0ABC".into()));
    }

    #[tokio::test]
    async fn revoke_is_forwarded_as_tagged_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instances/home/messages"))
            .and(body_json(serde_json::json!({
                "jid": "49123456789@s.whatsapp.net",
                "message": {"kind": "revoke", "message_id": "MSG_ID_123"}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"message_id": "3EB0DEF"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = SidecarClient::new(&config(&server.uri()), "home").unwrap();
        let id = client
            .send("49123456789@s.whatsapp.net", &SendPayload::Revoke {
                message_id: "MSG_ID_123".into(),
            })
            .await
            .unwrap();
        assert_eq!(id, MessageId("3EB0DEF".into()));
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instances/home/messages"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(serde_json::json!({"error": "socket busy"})),
            )
            .mount(&server)
            .await;

        let client = SidecarClient::new(&config(&server.uri()), "home").unwrap();
        let err = client
            .send("491234@s.whatsapp.net", &SendPayload::Text {
                text: "hi".into(),
                quoted_message_id: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("socket busy"));
    }

    #[tokio::test]
    async fn client_errors_are_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instances/home/read"))
            .respond_with(ResponseTemplate::new(404).set_body_string("unknown message"))
            .mount(&server)
            .await;

        let client = SidecarClient::new(&config(&server.uri()), "home").unwrap();
        let err = client
            .mark_read(
                "491234@s.whatsapp.net",
                "491234@s.whatsapp.net",
                &MessageId("MSG1".into()),
            )
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(err.code(), "transport");
    }

    #[tokio::test]
    async fn download_returns_body_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instances/home/media/download"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .mount(&server)
            .await;

        let client = SidecarClient::new(&config(&server.uri()), "home").unwrap();
        let bytes = client
            .download(&serde_json::json!({"key": {"id": "MSG1"}}))
            .await
            .unwrap();
        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn unreachable_sidecar_is_protocol_unavailable() {
        let client = SidecarClient::new(&config("http://127.0.0.1:1"), "home").unwrap();
        let err = client.connect(None).await.unwrap_err();
        assert_eq!(err.code(), "protocol_unavailable");
    }
}
