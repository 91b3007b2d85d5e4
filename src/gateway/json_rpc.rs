//! JSON-RPC Ledger Gateway
//!
//! [`LedgerGateway`] over an Ethereum-style JSON-RPC endpoint. The faucet is a
//! node-managed (unlocked) account, so transfers go out through
//! `eth_sendTransaction`; the token is an ERC-20 contract.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream;
use serde_json::{json, Value};

use crate::domain::{Address, BaseUnits, Direction, TransferEvent, Unit, CURRENCY_DECIMALS};

use super::{
    Confirmation, EventStream, GatewayError, GatewayResult, LedgerGateway, PendingTransfer,
};

/// keccak256("Transfer(address,address,uint256)")
const TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// ERC-20 `balanceOf(address)` selector
const BALANCE_OF_SELECTOR: &str = "70a08231";

/// ERC-20 `transfer(address,uint256)` selector
const TRANSFER_SELECTOR: &str = "a9059cbb";

/// Gas limit for a plain value transfer
const CURRENCY_TRANSFER_GAS: u64 = 21_000;

/// Gas limit for an ERC-20 transfer call
const TOKEN_TRANSFER_GAS: u64 = 100_000;

fn gas_limit(unit: Unit) -> u64 {
    match unit {
        Unit::Currency => CURRENCY_TRANSFER_GAS,
        Unit::Token => TOKEN_TRANSFER_GAS,
    }
}

/// Upper bound on the fee: gas limit times the node's gas price.
fn fee_for(gas_price: BaseUnits, unit: Unit) -> GatewayResult<BaseUnits> {
    gas_price
        .value()
        .checked_mul(u128::from(gas_limit(unit)))
        .map(BaseUnits)
        .ok_or_else(|| GatewayError::InvalidResponse(format!("gas price {} overflows fee", gas_price)))
}

/// Connection settings for [`JsonRpcGateway`]
#[derive(Debug, Clone)]
pub struct JsonRpcConfig {
    pub rpc_url: String,
    pub faucet_address: Address,
    pub token_contract: Address,
    pub token_decimals: u32,
    /// Delay between receipt polls while awaiting confirmation
    pub poll_interval: Duration,
    /// Blocks per `eth_getLogs` page
    pub log_page_size: u64,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

/// JSON-RPC client for the ledger
pub struct JsonRpcGateway {
    config: JsonRpcConfig,
    client: reqwest::Client,
    request_id: AtomicU64,
}

impl JsonRpcGateway {
    pub fn new(config: JsonRpcConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::GatewayUnavailable(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            config,
            client,
            request_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> GatewayResult<Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id
        });

        let response = self
            .client
            .post(&self.config.rpc_url)
            .json(&payload)
            .send()
            .await?;

        if response.status().is_server_error() {
            return Err(GatewayError::GatewayUnavailable(format!(
                "{} returned HTTP {}",
                method,
                response.status()
            )));
        }

        let body: Value = response.json().await?;

        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(GatewayError::Rpc(message));
        }

        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn block_number(&self) -> GatewayResult<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&result, "eth_blockNumber")
    }

    async fn block_timestamp(&self, block_number: u64) -> GatewayResult<DateTime<Utc>> {
        let block = self
            .call("eth_getBlockByNumber", json!([format!("0x{:x}", block_number), false]))
            .await?;
        let secs = parse_quantity(field(&block, "timestamp")?, "timestamp")?;
        Utc.timestamp_opt(secs as i64, 0)
            .single()
            .ok_or_else(|| GatewayError::InvalidResponse(format!("bad block timestamp {}", secs)))
    }

    /// One page of `eth_getLogs`, with block timestamps resolved.
    async fn fetch_logs(
        &self,
        address: &Address,
        direction: Direction,
        from_block: u64,
        to_block: u64,
    ) -> GatewayResult<Vec<TransferEvent>> {
        let topics = match direction {
            Direction::Sent => json!([TRANSFER_TOPIC, address.to_topic(), Value::Null]),
            Direction::Received => json!([TRANSFER_TOPIC, Value::Null, address.to_topic()]),
        };
        let filter = json!([{
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
            "address": self.config.token_contract.as_str(),
            "topics": topics,
        }]);

        let logs = self.call("eth_getLogs", filter).await?;
        let logs = logs
            .as_array()
            .ok_or_else(|| GatewayError::InvalidResponse("eth_getLogs did not return an array".to_string()))?;

        let mut timestamps: HashMap<u64, DateTime<Utc>> = HashMap::new();
        let mut events = Vec::with_capacity(logs.len());

        for log in logs {
            let parsed = parse_transfer_log(log)?;
            let timestamp = match timestamps.get(&parsed.block_number) {
                Some(ts) => *ts,
                None => {
                    let ts = self.block_timestamp(parsed.block_number).await?;
                    timestamps.insert(parsed.block_number, ts);
                    ts
                }
            };

            events.push(TransferEvent {
                direction,
                from: parsed.from,
                to: parsed.to,
                amount: parsed.amount,
                confirmation_id: parsed.confirmation_id,
                block_number: parsed.block_number,
                log_index: parsed.log_index,
                timestamp,
            });
        }

        events.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(events)
    }

    async fn poll_receipt(&self, pending: &PendingTransfer) -> GatewayResult<Confirmation> {
        loop {
            let receipt = self
                .call("eth_getTransactionReceipt", json!([pending.confirmation_id]))
                .await?;

            if receipt.is_null() {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            let status = parse_quantity(field(&receipt, "status")?, "status")?;
            if status != 1 {
                return Err(GatewayError::TransactionReverted {
                    confirmation_id: pending.confirmation_id.clone(),
                });
            }

            let block_number = parse_quantity(field(&receipt, "blockNumber")?, "blockNumber")?;
            return Ok(Confirmation {
                confirmation_id: pending.confirmation_id.clone(),
                block_number,
            });
        }
    }

    /// Advance the log cursor by one event, fetching pages as needed.
    async fn next_event(
        &self,
        mut cursor: LogCursor,
        direction: Direction,
        page_size: u64,
    ) -> GatewayResult<Option<(TransferEvent, LogCursor)>> {
        loop {
            if let Some(event) = cursor.buffered.pop_front() {
                return Ok(Some((event, cursor)));
            }

            // The head is pinned on first poll so the stream stays finite.
            let head = match cursor.head {
                Some(head) => head,
                None => {
                    let head = self.block_number().await?;
                    cursor.head = Some(head);
                    head
                }
            };

            if cursor.next_block > head {
                return Ok(None);
            }

            let to_block = cursor
                .next_block
                .saturating_add(page_size - 1)
                .min(head);
            let page = self
                .fetch_logs(&cursor.address, direction, cursor.next_block, to_block)
                .await?;

            tracing::trace!(
                address = %cursor.address,
                %direction,
                from_block = cursor.next_block,
                to_block,
                events = page.len(),
                "Fetched log page"
            );

            cursor.buffered = page.into();
            cursor.next_block = to_block + 1;
        }
    }
}

#[async_trait]
impl LedgerGateway for JsonRpcGateway {
    fn faucet_address(&self) -> &Address {
        &self.config.faucet_address
    }

    fn decimals(&self, unit: Unit) -> u32 {
        match unit {
            Unit::Currency => CURRENCY_DECIMALS,
            Unit::Token => self.config.token_decimals,
        }
    }

    async fn read_balance(&self, address: &Address, unit: Unit) -> GatewayResult<BaseUnits> {
        let result = match unit {
            Unit::Currency => {
                self.call("eth_getBalance", json!([address.as_str(), "latest"]))
                    .await?
            }
            Unit::Token => {
                let call = json!({
                    "to": self.config.token_contract.as_str(),
                    "data": encode_balance_of(address),
                });
                self.call("eth_call", json!([call, "latest"])).await?
            }
        };

        let hex = result
            .as_str()
            .ok_or_else(|| GatewayError::InvalidResponse(format!("balance is not a string: {}", result)))?;
        Ok(BaseUnits::from_hex(hex)?)
    }

    async fn estimate_fee(&self, unit: Unit) -> GatewayResult<BaseUnits> {
        let result = self.call("eth_gasPrice", json!([])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| GatewayError::InvalidResponse(format!("gas price is not a string: {}", result)))?;
        fee_for(BaseUnits::from_hex(hex)?, unit)
    }

    async fn submit_transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: BaseUnits,
        unit: Unit,
    ) -> GatewayResult<PendingTransfer> {
        let tx = match unit {
            Unit::Currency => json!({
                "from": from.as_str(),
                "to": to.as_str(),
                "value": amount.to_hex(),
                "gas": format!("0x{:x}", gas_limit(unit)),
            }),
            Unit::Token => json!({
                "from": from.as_str(),
                "to": self.config.token_contract.as_str(),
                "data": encode_transfer(to, amount),
                "gas": format!("0x{:x}", gas_limit(unit)),
            }),
        };

        let result = self
            .call("eth_sendTransaction", json!([tx]))
            .await
            .map_err(|e| match e {
                GatewayError::Rpc(message) if is_insufficient_funds_message(&message) => {
                    GatewayError::insufficient_funds(amount, None)
                }
                other => other,
            })?;

        let confirmation_id = result
            .as_str()
            .filter(|hash| !hash.is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse("eth_sendTransaction returned no hash".to_string()))?
            .to_string();

        tracing::info!(%from, %to, %amount, %unit, tx = %confirmation_id, "Transfer submitted");

        Ok(PendingTransfer {
            confirmation_id,
            unit,
            amount,
        })
    }

    async fn await_confirmation(
        &self,
        pending: &PendingTransfer,
        timeout: Duration,
    ) -> GatewayResult<Confirmation> {
        let poll = self.poll_receipt(pending);

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::ConfirmationTimeout {
                confirmation_id: pending.confirmation_id.clone(),
                waited: timeout,
            }),
        }
    }

    fn read_events<'a>(
        &'a self,
        address: &Address,
        direction: Direction,
        from_sequence: u64,
    ) -> EventStream<'a> {
        let cursor = LogCursor {
            address: address.clone(),
            next_block: from_sequence,
            head: None,
            buffered: VecDeque::new(),
        };
        let page_size = self.config.log_page_size.max(1);

        Box::pin(stream::try_unfold(cursor, move |cursor| {
            self.next_event(cursor, direction, page_size)
        }))
    }
}

struct LogCursor {
    address: Address,
    next_block: u64,
    head: Option<u64>,
    buffered: VecDeque<TransferEvent>,
}

/// Fields of an ERC-20 Transfer log, before timestamp resolution
#[derive(Debug, PartialEq, Eq)]
struct TransferLog {
    from: Address,
    to: Address,
    amount: BaseUnits,
    confirmation_id: String,
    block_number: u64,
    log_index: u64,
}

fn field<'v>(value: &'v Value, name: &str) -> GatewayResult<&'v Value> {
    value
        .get(name)
        .ok_or_else(|| GatewayError::InvalidResponse(format!("missing field '{}'", name)))
}

fn parse_quantity(value: &Value, name: &str) -> GatewayResult<u64> {
    let hex = value
        .as_str()
        .ok_or_else(|| GatewayError::InvalidResponse(format!("'{}' is not a hex string", name)))?;
    let digits = hex.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| GatewayError::InvalidResponse(format!("'{}' = {}: {}", name, hex, e)))
}

fn parse_transfer_log(log: &Value) -> GatewayResult<TransferLog> {
    let topics = field(log, "topics")?
        .as_array()
        .ok_or_else(|| GatewayError::InvalidResponse("log topics is not an array".to_string()))?;
    if topics.len() < 3 {
        return Err(GatewayError::InvalidResponse(format!(
            "Transfer log has {} topics, expected 3",
            topics.len()
        )));
    }

    let topic = |i: usize| -> GatewayResult<Address> {
        let raw = topics[i]
            .as_str()
            .ok_or_else(|| GatewayError::InvalidResponse("topic is not a string".to_string()))?;
        Address::from_topic(raw).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    };

    let data = field(log, "data")?
        .as_str()
        .ok_or_else(|| GatewayError::InvalidResponse("log data is not a string".to_string()))?;

    let confirmation_id = field(log, "transactionHash")?
        .as_str()
        .ok_or_else(|| GatewayError::InvalidResponse("transactionHash is not a string".to_string()))?
        .to_string();

    Ok(TransferLog {
        from: topic(1)?,
        to: topic(2)?,
        amount: BaseUnits::from_hex(data)?,
        confirmation_id,
        block_number: parse_quantity(field(log, "blockNumber")?, "blockNumber")?,
        log_index: parse_quantity(field(log, "logIndex")?, "logIndex")?,
    })
}

fn encode_balance_of(owner: &Address) -> String {
    format!("0x{}{:0>64}", BALANCE_OF_SELECTOR, owner.hex_digits())
}

fn encode_transfer(to: &Address, amount: BaseUnits) -> String {
    format!(
        "0x{}{:0>64}{:064x}",
        TRANSFER_SELECTOR,
        to.hex_digits(),
        amount.value()
    )
}

fn is_insufficient_funds_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("insufficient funds") || message.contains("exceeds balance")
}
