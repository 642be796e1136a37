//! JSON-RPC remote store
//!
//! Reads a node's datastore through two methods:
//!
//! - `get_datastore_entries`: `[[{"address", "key": [u8]}]]` → `[{"final_value": [u8] | null}]`
//! - `get_addresses`: `[[address]]` → `[{"final_datastore_keys": [[u8]]}]`
//!
//! Only final (not candidate) values are used.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::RemoteStore;
use crate::error::{Error, Result};

/// Default HTTP request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Serialize)]
struct DatastoreEntryInput<'a> {
    address: &'a str,
    key: &'a [u8],
}

#[derive(Debug, Deserialize)]
struct DatastoreEntryOutput {
    final_value: Option<Vec<u8>>,
}

#[derive(Debug, Deserialize)]
struct AddressInfo {
    #[serde(default)]
    final_datastore_keys: Vec<Vec<u8>>,
}

/// Remote store backed by a node's JSON-RPC API
pub struct JsonRpcStore {
    node_url: String,
    client: Client,
    next_id: AtomicU64,
}

impl JsonRpcStore {
    /// Create a store for `node_url` with the default request timeout
    pub fn new(node_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(node_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a store with a custom request timeout
    pub fn with_timeout(node_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            node_url: node_url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    /// Node URL this store talks to
    pub fn node_url(&self) -> &str {
        &self.node_url
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.node_url)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::RemoteUnavailable(format!(
                "{} failed with status: {}",
                method,
                response.status()
            )));
        }

        let body: RpcResponse<R> = response.json().await?;
        unwrap_response(method, body)
    }
}

fn unwrap_response<R>(method: &str, body: RpcResponse<R>) -> Result<R> {
    if let Some(err) = body.error {
        return Err(Error::RemoteUnavailable(format!(
            "{} returned error {}: {}",
            method, err.code, err.message
        )));
    }
    body.result
        .ok_or_else(|| Error::RemoteUnavailable(format!("{} returned no result", method)))
}

#[async_trait]
impl RemoteStore for JsonRpcStore {
    #[instrument(skip(self, keys), fields(keys = keys.len()))]
    async fn datastore_entries(
        &self,
        address: &str,
        keys: &[Vec<u8>],
    ) -> Result<Vec<Option<Bytes>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let inputs: Vec<DatastoreEntryInput<'_>> = keys
            .iter()
            .map(|key| DatastoreEntryInput { address, key })
            .collect();
        let outputs: Vec<DatastoreEntryOutput> =
            self.call("get_datastore_entries", [inputs]).await?;
        debug!(returned = outputs.len(), "Fetched datastore entries");

        Ok(outputs
            .into_iter()
            .map(|out| out.final_value.map(Bytes::from))
            .collect())
    }

    #[instrument(skip(self))]
    async fn datastore_keys(&self, address: &str) -> Result<Vec<Vec<u8>>> {
        let infos: Vec<AddressInfo> = self.call("get_addresses", [[address]]).await?;
        let info = infos.into_iter().next().ok_or_else(|| {
            Error::Corrupt(format!("get_addresses returned nothing for {}", address))
        })?;
        debug!(keys = info.final_datastore_keys.len(), "Listed datastore keys");
        Ok(info.final_datastore_keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_datastore_entries_request_shape() {
        let keys = [vec![1u8, 2], vec![3u8]];
        let inputs: Vec<DatastoreEntryInput<'_>> = keys
            .iter()
            .map(|key| DatastoreEntryInput { address: "AS1", key })
            .collect();
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 7,
            method: "get_datastore_entries",
            params: [inputs],
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "get_datastore_entries",
                "params": [[
                    {"address": "AS1", "key": [1, 2]},
                    {"address": "AS1", "key": [3]}
                ]]
            })
        );
    }

    #[test]
    fn test_get_addresses_request_shape() {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "get_addresses",
            params: [["AS1"]],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap()["params"],
            json!([["AS1"]])
        );
    }

    #[test]
    fn test_parse_datastore_entries_response() {
        let body: RpcResponse<Vec<DatastoreEntryOutput>> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": [
                {"final_value": [104, 105], "candidate_value": [104, 105]},
                {"final_value": null, "candidate_value": null}
            ]
        }))
        .unwrap();

        let outputs = unwrap_response("get_datastore_entries", body).unwrap();
        assert_eq!(outputs[0].final_value.as_deref(), Some(&b"hi"[..]));
        assert!(outputs[1].final_value.is_none());
    }

    #[test]
    fn test_parse_address_info() {
        let body: RpcResponse<Vec<AddressInfo>> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": [{"address": "AS1", "final_datastore_keys": [[2, 76], [1]]}]
        }))
        .unwrap();
        let infos = unwrap_response("get_addresses", body).unwrap();
        assert_eq!(infos[0].final_datastore_keys, vec![vec![2, 76], vec![1]]);
    }

    #[test]
    fn test_rpc_error_is_remote_unavailable() {
        let body: RpcResponse<Vec<AddressInfo>> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32602, "message": "invalid params"}
        }))
        .unwrap();
        let err = unwrap_response("get_addresses", body).unwrap_err();
        assert!(matches!(err, Error::RemoteUnavailable(msg) if msg.contains("invalid params")));
    }

    #[tokio::test]
    async fn test_connection_failure_is_remote_unavailable() {
        let store =
            JsonRpcStore::with_timeout("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = store.datastore_keys("AS1").await.unwrap_err();
        assert!(matches!(err, Error::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_key_set_skips_the_network() {
        let store = JsonRpcStore::new("http://127.0.0.1:1").unwrap();
        assert!(store.datastore_entries("AS1", &[]).await.unwrap().is_empty());
        assert_eq!(store.node_url(), "http://127.0.0.1:1");
    }
}
