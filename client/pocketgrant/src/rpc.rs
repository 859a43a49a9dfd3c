//! EVM JSON-RPC client: contract reads, wallet submission, receipts and logs.
//!
//! ## Resilience
//!
//! * Exponential back-off is applied to transport errors, HTTP 429 and the
//!   `-32005` "limit exceeded" RPC error, up to [`MAX_ATTEMPTS`] tries.
//! * Wallet submissions (`eth_sendTransaction`, `wallet_sendCalls`) are sent
//!   once and never retried.
//! * Any other JSON-RPC error object is returned immediately as
//!   [`ClientError::Rpc`]; revert payloads are decoded into the message so the
//!   error classifier can see the reason.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::abi;
use crate::chain::{GrantReader, LogSource, Wallet};
use crate::config::Config;
use crate::errors::{ClientError, Result};
use crate::types::{Address, ClaimCheck, Log, Program, Receipt, TxHash, WriteCall};

const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 250;
const MAX_BACKOFF_MS: u64 = 8_000;
const LIMIT_EXCEEDED: i64 = -32005;

const CALLS_STATUS_POLL: Duration = Duration::from_secs(1);
const CALLS_STATUS_ATTEMPTS: u32 = 120;

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    /// Message with the decoded revert reason appended when one is present.
    fn describe(&self) -> String {
        let reason = self
            .data
            .as_ref()
            .and_then(|d| d.as_str().or_else(|| d.get("data").and_then(Value::as_str)))
            .and_then(|hex| decode_hex(hex).ok())
            .and_then(|bytes| abi::decode_revert_reason(&bytes));
        match reason {
            Some(r) if !self.message.contains(&r) => format!("{}: {r}", self.message),
            _ => self.message.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReceipt {
    pub transaction_hash: String,
    pub status: Option<String>,
    pub block_number: Option<String>,
    #[serde(default)]
    pub logs: Vec<RawLog>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: Option<String>,
    pub transaction_hash: Option<String>,
    pub log_index: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    timestamp: String,
}

// ─────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────

/// One JSON-RPC endpoint.
#[derive(Clone)]
pub struct JsonRpc {
    client: Client,
    url: String,
}

impl JsonRpc {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Send `method`, retrying transport failures and rate limits with
    /// back-off. Only for calls that are safe to repeat.
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let mut backoff = INITIAL_BACKOFF_MS;
        let mut attempt = 1;

        loop {
            let retry_reason = match self.attempt(method, &params, attempt >= MAX_ATTEMPTS).await? {
                Attempt::Done(value) => return Ok(value),
                Attempt::Retry(reason) => reason,
            };

            warn!("{method} {retry_reason} (attempt {attempt}, retrying in {backoff}ms)");
            tokio::time::sleep(Duration::from_millis(backoff)).await;
            backoff = (backoff * 2).min(MAX_BACKOFF_MS);
            attempt += 1;
        }
    }

    /// Send `method` exactly once. Wallet submissions go through here: a
    /// request whose response was lost may already have been broadcast.
    pub async fn request_once<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        match self.attempt(method, &params, true).await? {
            Attempt::Done(value) => Ok(value),
            Attempt::Retry(reason) => Err(ClientError::Rpc {
                code: 0,
                message: format!("{method} {reason}"),
            }),
        }
    }

    /// One round-trip. With `last` set, conditions that would otherwise be
    /// retried are returned as errors.
    async fn attempt<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &Value,
        last: bool,
    ) -> Result<Attempt<T>> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await;

        let resp = match response {
            Err(e) if !last => return Ok(Attempt::Retry(format!("request failed: {e}"))),
            Err(e) => return Err(e.into()),
            Ok(resp) => resp,
        };
        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if last {
                return Err(ClientError::Rpc {
                    code: 429,
                    message: "rate limited".to_string(),
                });
            }
            return Ok(Attempt::Retry("rate limited".to_string()));
        }

        let body: RpcResponse = resp.error_for_status()?.json().await?;
        match body.error {
            Some(err) if err.code == LIMIT_EXCEEDED && !last => {
                Ok(Attempt::Retry(format!("limit exceeded: {}", err.message)))
            }
            Some(err) => {
                debug!(method, code = err.code, "RPC error: {}", err.message);
                Err(ClientError::Rpc {
                    code: err.code,
                    message: err.describe(),
                })
            }
            None => {
                let result = body.result.unwrap_or(Value::Null);
                debug!(method, "RPC ok");
                Ok(Attempt::Done(serde_json::from_value(result)?))
            }
        }
    }
}

enum Attempt<T> {
    Done(T),
    Retry(String),
}

// ─────────────────────────────────────────────────────────
// Hex helpers
// ─────────────────────────────────────────────────────────

pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let body = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(body).map_err(|e| ClientError::Decode(format!("invalid hex {s}: {e}")))
}

pub fn parse_quantity(s: &str) -> Result<u64> {
    let body = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(body, 16).map_err(|e| ClientError::Decode(format!("invalid quantity {s}: {e}")))
}

fn decode_topic(s: &str) -> Result<[u8; 32]> {
    let bytes = decode_hex(s)?;
    bytes
        .try_into()
        .map_err(|_| ClientError::Decode(format!("topic is not 32 bytes: {s}")))
}

pub fn decode_log(raw: &RawLog) -> Result<Log> {
    Ok(Log {
        address: raw.address.parse()?,
        topics: raw.topics.iter().map(|t| decode_topic(t)).collect::<Result<_>>()?,
        data: decode_hex(&raw.data)?,
        block_number: raw.block_number.as_deref().map(parse_quantity).transpose()?,
        tx_hash: raw.transaction_hash.clone(),
        log_index: raw.log_index.as_deref().map(parse_quantity).transpose()?,
    })
}

pub fn decode_receipt(raw: &RawReceipt) -> Result<Receipt> {
    Ok(Receipt {
        tx_hash: TxHash(raw.transaction_hash.clone()),
        success: raw.status.as_deref().map(parse_quantity).transpose()? == Some(1),
        block_number: raw.block_number.as_deref().map(parse_quantity).transpose()?.unwrap_or(0),
        logs: raw.logs.iter().map(decode_log).collect::<Result<_>>()?,
    })
}

// ─────────────────────────────────────────────────────────
// Chain client
// ─────────────────────────────────────────────────────────

/// PocketGrant + IDRX over a network endpoint and an optional wallet endpoint.
pub struct RpcChain {
    network: JsonRpc,
    wallet: Option<JsonRpc>,
    grant: Address,
    token: Address,
    required_chain_id: u64,
}

impl RpcChain {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            network: JsonRpc::new(client.clone(), &config.rpc_url),
            wallet: config
                .wallet_rpc_url
                .as_ref()
                .map(|url| JsonRpc::new(client, url)),
            grant: config.grant_address,
            token: config.token_address,
            required_chain_id: config.chain_id,
        }
    }

    fn wallet_rpc(&self) -> Result<&JsonRpc> {
        self.wallet.as_ref().ok_or(ClientError::WalletUnavailable)
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>> {
        let out: String = self
            .network
            .request(
                "eth_call",
                json!([{ "to": to.to_string(), "data": to_hex(&data) }, "latest"]),
            )
            .await?;
        decode_hex(&out)
    }

    async fn send_sponsored(&self, wallet: &JsonRpc, from: Address, call: &WriteCall) -> Result<TxHash> {
        let id: Value = wallet
            .request_once(
                "wallet_sendCalls",
                json!([{
                    "version": "1.0",
                    "chainId": format!("0x{:x}", self.required_chain_id),
                    "from": from.to_string(),
                    "calls": [{ "to": call.to.to_string(), "data": to_hex(&call.data) }],
                    "capabilities": call.capabilities,
                }]),
            )
            .await?;
        let id = id
            .as_str()
            .or_else(|| id.get("id").and_then(Value::as_str))
            .ok_or_else(|| ClientError::Decode("wallet_sendCalls returned no id".to_string()))?
            .to_string();
        info!("Sponsored call bundle submitted: {id}");

        for _ in 0..CALLS_STATUS_ATTEMPTS {
            let status: Value = wallet.request("wallet_getCallsStatus", json!([id])).await?;
            let hash = status
                .get("receipts")
                .and_then(Value::as_array)
                .and_then(|r| r.first())
                .and_then(|r| r.get("transactionHash"))
                .and_then(Value::as_str);
            if let Some(hash) = hash {
                return Ok(TxHash(hash.to_string()));
            }
            tokio::time::sleep(CALLS_STATUS_POLL).await;
        }
        Err(ClientError::Timeout(id))
    }
}

impl LogSource for RpcChain {
    async fn block_number(&self) -> Result<u64> {
        let n: String = self.network.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&n)
    }

    async fn grant_logs(&self, from: u64, to: u64, topics: &[[u8; 32]]) -> Result<Vec<Log>> {
        let topic0: Vec<String> = topics.iter().map(|t| to_hex(t)).collect();
        let raw: Vec<RawLog> = self
            .network
            .request(
                "eth_getLogs",
                json!([{
                    "address": self.grant.to_string(),
                    "fromBlock": format!("0x{from:x}"),
                    "toBlock": format!("0x{to:x}"),
                    "topics": [topic0],
                }]),
            )
            .await?;
        raw.iter().map(decode_log).collect()
    }
}

impl GrantReader for RpcChain {
    async fn get_program(&self, id: u64) -> Result<Program> {
        let out = self.call(self.grant, abi::get_program(id)).await?;
        abi::decode_program(id, &out)
    }

    async fn can_claim(&self, id: u64, wallet: Address) -> Result<ClaimCheck> {
        let out = self.call(self.grant, abi::can_claim(id, wallet)).await?;
        abi::decode_claim_check(&out)
    }

    async fn has_claimed(&self, id: u64, wallet: Address) -> Result<bool> {
        let out = self.call(self.grant, abi::has_claimed(id, wallet)).await?;
        abi::Decoder::new(&out).bool(0)
    }

    async fn is_verified(&self, id: u64, wallet: Address) -> Result<bool> {
        let out = self.call(self.grant, abi::is_verified(id, wallet)).await?;
        abi::Decoder::new(&out).bool(0)
    }

    async fn program_count(&self) -> Result<u64> {
        let out = self.call(self.grant, abi::program_count()).await?;
        abi::Decoder::new(&out).u64(0)
    }

    async fn admin(&self) -> Result<Address> {
        let out = self.call(self.grant, abi::admin()).await?;
        abi::Decoder::new(&out).address(0)
    }

    async fn is_verifier(&self, account: Address) -> Result<bool> {
        let out = self.call(self.grant, abi::verifiers(account)).await?;
        abi::Decoder::new(&out).bool(0)
    }

    async fn global_paused(&self) -> Result<bool> {
        let out = self.call(self.grant, abi::global_paused()).await?;
        abi::Decoder::new(&out).bool(0)
    }

    async fn balance_of(&self, owner: Address) -> Result<u128> {
        let out = self.call(self.token, abi::balance_of(owner)).await?;
        abi::Decoder::new(&out).u128(0)
    }

    async fn allowance(&self, owner: Address) -> Result<u128> {
        let out = self.call(self.token, abi::allowance(owner, self.grant)).await?;
        abi::Decoder::new(&out).u128(0)
    }

    async fn token_decimals(&self) -> Result<u8> {
        let out = self.call(self.token, abi::decimals()).await?;
        abi::Decoder::new(&out).u8(0)
    }

    async fn token_symbol(&self) -> Result<String> {
        let out = self.call(self.token, abi::symbol()).await?;
        abi::Decoder::new(&out).string(0)
    }

    async fn latest_timestamp(&self) -> Result<u64> {
        let block: RawBlock = self
            .network
            .request("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        parse_quantity(&block.timestamp)
    }
}

impl Wallet for RpcChain {
    async fn account(&self) -> Result<Option<Address>> {
        let Some(wallet) = &self.wallet else {
            return Ok(None);
        };
        let accounts: Vec<String> = wallet.request("eth_accounts", json!([])).await?;
        accounts.first().map(|a| a.parse()).transpose()
    }

    async fn chain_id(&self) -> Result<u64> {
        let id: String = self.wallet_rpc()?.request("eth_chainId", json!([])).await?;
        parse_quantity(&id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        let _: Value = self
            .wallet_rpc()?
            .request(
                "wallet_switchEthereumChain",
                json!([{ "chainId": format!("0x{chain_id:x}") }]),
            )
            .await?;
        Ok(())
    }

    async fn send(&self, from: Address, call: WriteCall) -> Result<TxHash> {
        let wallet = self.wallet_rpc()?;
        if call.capabilities.is_some() {
            return self.send_sponsored(wallet, from, &call).await;
        }
        let hash: String = wallet
            .request_once(
                "eth_sendTransaction",
                json!([{
                    "from": from.to_string(),
                    "to": call.to.to_string(),
                    "data": to_hex(&call.data),
                }]),
            )
            .await?;
        Ok(TxHash(hash))
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>> {
        let raw: Option<RawReceipt> = self
            .network
            .request("eth_getTransactionReceipt", json!([hash.0]))
            .await?;
        raw.as_ref().map(decode_receipt).transpose()
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
