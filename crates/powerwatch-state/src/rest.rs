//! RestStore — the Firebase Realtime Database REST dialect over HTTP/1.1.
//!
//! | Operation | Request |
//! |---|---|
//! | `get` | `GET /<path>.json` (`null` body means absent) |
//! | `set` | `PUT /<path>.json` with the JSON value |
//! | `delete` | `DELETE /<path>.json` |
//! | `update` | `PATCH /.json` with `{ "<path>": value, ... }` |
//!
//! Path segments and the `auth` token (appended as `?auth=<token>` when
//! configured) are percent-encoded. One connection is opened per request; callers bound latency with their own
//! timeouts.

use std::collections::BTreeMap;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use percent_encoding::{AsciiSet, CONTROLS, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::{normalize, SharedStore, StoreFuture};

/// Bytes escaped inside one path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Client for a Firebase-compatible REST endpoint.
#[derive(Debug, Clone)]
pub struct RestStore {
    /// `host:port` of the endpoint.
    address: String,
    auth_token: Option<String>,
}

impl RestStore {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Origin-form request target: `/<path>.json[?auth=<token>]`.
    fn target_for(&self, path: &str) -> String {
        let segments: Vec<String> = normalize(path)
            .split('/')
            .filter(|seg| !seg.is_empty())
            .map(|seg| utf8_percent_encode(seg, SEGMENT).to_string())
            .collect();
        let mut target = format!("/{}.json", segments.join("/"));
        if let Some(token) = &self.auth_token {
            target.push_str("?auth=");
            target.extend(utf8_percent_encode(token, NON_ALPHANUMERIC));
        }
        target
    }

    /// Send one request and return the decoded JSON body.
    async fn request(
        &self,
        method: &'static str,
        path: &str,
        body: Option<&Value>,
    ) -> StoreResult<Value> {
        let target = self.target_for(path);
        let connect_err = |reason: String| StoreError::Connect {
            address: self.address.clone(),
            reason,
        };

        let payload = match body {
            Some(value) => {
                Bytes::from(serde_json::to_vec(value).map_err(|e| StoreError::Serialize(e.to_string()))?)
            }
            None => Bytes::new(),
        };

        let req = http::Request::builder()
            .method(method)
            .uri(&target)
            .header("host", self.address.as_str())
            .header("user-agent", "powerwatch-state/0.1")
            .header("content-type", "application/json")
            .body(Full::new(payload))
            .map_err(|e| StoreError::Request {
                method,
                path: normalize(path),
                reason: e.to_string(),
            })?;

        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| connect_err(e.to_string()))?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| connect_err(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| connect_err(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            debug!(%status, method, %path, "store request rejected");
            return Err(StoreError::Status {
                method,
                path: normalize(path),
                status: status.as_u16(),
            });
        }

        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?
            .to_bytes();
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Deserialize(e.to_string()))
    }
}

impl SharedStore for RestStore {
    fn get<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            let value = self.request("GET", path, None).await?;
            Ok((!value.is_null()).then_some(value))
        })
    }

    fn set<'a>(&'a self, path: &'a str, value: Value) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.request("PUT", path, Some(&value)).await?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, path: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            self.request("DELETE", path, None).await?;
            Ok(true)
        })
    }

    fn update<'a>(&'a self, entries: BTreeMap<String, Value>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let body = Value::Object(
                entries
                    .into_iter()
                    .map(|(path, value)| (normalize(&path), value))
                    .collect(),
            );
            self.request("PATCH", "", Some(&body)).await?;
            Ok(())
        })
    }
}
