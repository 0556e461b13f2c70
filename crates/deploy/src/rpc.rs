//! Minimal JSON-RPC 2.0 transport over HTTP.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client shared by the node and explorer adapters.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    /// `Some(Value::Null)` for an explicit `null`, `None` when the key is absent.
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    #[serde(default)]
    message: String,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl RpcResponse {
    fn into_result<T: DeserializeOwned>(self, method: &str) -> Result<T, anyhow::Error> {
        if let Some(error) = self.error {
            anyhow::bail!("{} failed with RPC error {}: {}", method, error.code, error.message);
        }

        let result = self
            .result
            .with_context(|| format!("No result in {} response", method))?;

        serde_json::from_value(result)
            .with_context(|| format!("Failed to deserialize {} result", method))
    }
}

/// Call `method` on the node at `url`. A JSON-RPC error object becomes an `Err`.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let request = RpcRequest {
        jsonrpc: "2.0",
        id: 1,
        method,
        params: &params,
    };

    let response: RpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    response.into_result(method)
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(value: &str) -> Result<u64, anyhow::Error> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid hex quantity: {}", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> RpcResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert_eq!(parse_quantity("ff").unwrap(), 255);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_request_envelope() {
        let params = [serde_json::json!("0xabc")];
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "eth_getTransactionReceipt",
            params: &params,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "eth_getTransactionReceipt",
                "params": ["0xabc"],
            })
        );
    }

    #[test]
    fn test_result_is_deserialized() {
        let head: String = response(r#"{"jsonrpc":"2.0","id":1,"result":"0x1b4"}"#)
            .into_result("eth_blockNumber")
            .unwrap();
        assert_eq!(head, "0x1b4");
    }

    #[test]
    fn test_null_result_is_a_value() {
        let receipt: Option<Value> = response(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .into_result("eth_getTransactionReceipt")
            .unwrap();
        assert!(receipt.is_none());
    }

    #[test]
    fn test_error_object_is_reported() {
        let err = response(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"insufficient funds for gas"}}"#,
        )
        .into_result::<String>("eth_sendTransaction")
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("eth_sendTransaction"));
        assert!(message.contains("-32000"));
        assert!(message.contains("insufficient funds"));
    }

    #[test]
    fn test_missing_result_is_an_error() {
        let err = response(r#"{"jsonrpc":"2.0","id":1}"#)
            .into_result::<String>("eth_blockNumber")
            .unwrap_err();
        assert!(err.to_string().contains("No result"));
    }
}
