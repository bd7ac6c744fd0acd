use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

pub const SELECTOR_BALANCE_OF: &str = "0x70a08231";
pub const SELECTOR_ALLOWANCE: &str = "0xdd62ed3e";
pub const SELECTOR_DECIMALS: &str = "0x313ce567";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SCAN_BLOCKS: u64 = 100;
const MAX_SCAN_RESULTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainNetwork {
    Mainnet,
    Testnet,
}

impl ChainNetwork {
    pub fn chain_id(&self) -> u64 {
        match self {
            ChainNetwork::Mainnet => 56,
            ChainNetwork::Testnet => 97,
        }
    }

    pub fn chain_name(&self) -> &'static str {
        match self {
            ChainNetwork::Mainnet => "BSC Mainnet",
            ChainNetwork::Testnet => "BSC Testnet",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainNetwork::Mainnet => "mainnet",
            ChainNetwork::Testnet => "testnet",
        }
    }

    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            ChainNetwork::Mainnet => "https://bsc-dataseed1.binance.org:443",
            ChainNetwork::Testnet => "https://data-seed-prebsc-1-s1.binance.org:8545",
        }
    }

    pub fn explorer_url(&self) -> &'static str {
        match self {
            ChainNetwork::Mainnet => "https://bscscan.com",
            ChainNetwork::Testnet => "https://testnet.bscscan.com",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "mainnet" => Some(ChainNetwork::Mainnet),
            "testnet" => Some(ChainNetwork::Testnet),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChainNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum ChainError {
    NetworkError(String),
    RpcError(String),
    InvalidAddress(String),
    InvalidResponse(String),
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::NetworkError(e) => write!(f, "Network error: {}", e),
            ChainError::RpcError(e) => write!(f, "RPC error: {}", e),
            ChainError::InvalidAddress(a) => write!(f, "Invalid address: {}", a),
            ChainError::InvalidResponse(e) => write!(f, "Invalid RPC response: {}", e),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        ChainError::NetworkError(e.to_string())
    }
}

/// `0x` followed by 40 hex digits, either case. Surrounding whitespace is
/// tolerated.
pub fn is_valid_address(address: &str) -> bool {
    let trimmed = address.trim();
    let hex_part = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(h) => h,
        None => return false,
    };
    hex_part.len() == 40 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Renders a raw integer amount as a decimal string, trimming trailing
/// zeros. `1500000000000000000` with 18 decimals becomes `1.5`.
pub fn wei_to_decimal(value: u128, decimals: u32) -> String {
    // 10^39 overflows u128; anything above is not a real token anyway.
    let decimals = decimals.min(38);
    let divisor = 10u128.pow(decimals);
    let whole = value / divisor;
    let frac = value % divisor;
    if frac == 0 {
        return whole.to_string();
    }
    let frac_str = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac_str.trim_end_matches('0'))
}

/// Parses a JSON-RPC quantity (`0x`-prefixed hex of arbitrary length).
fn parse_quantity(value: &Value) -> Result<u128, ChainError> {
    let raw = value
        .as_str()
        .ok_or_else(|| ChainError::InvalidResponse("quantity is not a string".to_string()))?;
    let digits = raw.trim_start_matches("0x").trim_start_matches("0X");
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| ChainError::InvalidResponse(format!("bad quantity '{}': {}", raw, e)))
}

/// Decodes a 32-byte `eth_call` return word into an unsigned integer.
fn decode_uint(raw: &str) -> Result<u128, ChainError> {
    let digits = raw.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    let bytes = hex::decode(digits)
        .map_err(|e| ChainError::InvalidResponse(format!("bad call result '{}': {}", raw, e)))?;
    if bytes.len() > 16 && bytes[..bytes.len() - 16].iter().any(|b| *b != 0) {
        return Err(ChainError::InvalidResponse(
            "call result exceeds 128 bits".to_string(),
        ));
    }
    let tail = if bytes.len() > 16 {
        &bytes[bytes.len() - 16..]
    } else {
        &bytes[..]
    };
    Ok(tail.iter().fold(0u128, |acc, b| (acc << 8) | *b as u128))
}

/// Left-pads an address to a 32-byte ABI argument.
fn encode_address_arg(address: &str) -> String {
    let digits = address.trim().trim_start_matches("0x").to_lowercase();
    format!("{:0>64}", digits)
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainTransaction {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub block: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenAllowance {
    pub allowance: String,
    pub allowance_raw: String,
}

/// Read-only JSON-RPC client for a BSC endpoint. All lookups hit the node
/// directly; nothing is cached.
#[derive(Debug, Clone)]
pub struct ChainClient {
    network: ChainNetwork,
    rpc_url: String,
    usdt_contract: String,
    http_client: reqwest::Client,
}

impl ChainClient {
    pub fn new(network: ChainNetwork, rpc_url: String, usdt_contract: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            network,
            rpc_url,
            usdt_contract,
            http_client,
        }
    }

    pub fn network(&self) -> ChainNetwork {
        self.network
    }

    pub fn usdt_contract(&self) -> &str {
        &self.usdt_contract
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await?;
        let body: Value = response.json().await?;
        if let Some(error) = body.get("error") {
            return Err(ChainError::RpcError(error.to_string()));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| ChainError::InvalidResponse("missing result field".to_string()))
    }

    fn require_address(address: &str) -> Result<String, ChainError> {
        if !is_valid_address(address) {
            return Err(ChainError::InvalidAddress(address.to_string()));
        }
        Ok(address.trim().to_lowercase())
    }

    /// True when the node answers `eth_chainId` with the configured chain.
    /// A reachable node on the wrong chain counts as disconnected.
    pub async fn check_connection(&self) -> bool {
        match self.rpc_call("eth_chainId", json!([])).await {
            Ok(result) => match parse_quantity(&result) {
                Ok(id) if id as u64 == self.network.chain_id() => true,
                Ok(id) => {
                    tracing::warn!(
                        "RPC endpoint reports chain id {} but {} expects {}",
                        id,
                        self.network.chain_name(),
                        self.network.chain_id()
                    );
                    false
                }
                Err(e) => {
                    tracing::warn!("Chain id probe returned garbage: {}", e);
                    false
                }
            },
            Err(e) => {
                tracing::warn!("Chain connection check failed: {}", e);
                false
            }
        }
    }

    /// Native BNB balance as a decimal string.
    pub async fn get_bnb_balance(&self, address: &str) -> Result<String, ChainError> {
        let address = Self::require_address(address)?;
        let result = self
            .rpc_call("eth_getBalance", json!([address, "latest"]))
            .await?;
        let wei = parse_quantity(&result)?;
        Ok(wei_to_decimal(wei, 18))
    }

    async fn call_contract(&self, to: &str, data: String) -> Result<u128, ChainError> {
        let result = self
            .rpc_call("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| ChainError::InvalidResponse("call result is not a string".to_string()))?;
        decode_uint(raw)
    }

    async fn token_decimals(&self, token: &str) -> Result<u32, ChainError> {
        let value = self
            .call_contract(token, SELECTOR_DECIMALS.to_string())
            .await?;
        Ok(value as u32)
    }

    /// USDT balance of `address`, scaled by the token's own `decimals()`.
    pub async fn get_usdt_balance(&self, address: &str) -> Result<String, ChainError> {
        let owner = Self::require_address(address)?;
        let token = self.usdt_contract.clone();
        let decimals = self.token_decimals(&token).await?;
        let data = format!("{}{}", SELECTOR_BALANCE_OF, encode_address_arg(&owner));
        let value = self.call_contract(&token, data).await?;
        Ok(wei_to_decimal(value, decimals))
    }

    /// USDT allowance granted by `owner` to `spender`, both scaled and raw.
    pub async fn get_allowance(
        &self,
        owner: &str,
        spender: &str,
    ) -> Result<TokenAllowance, ChainError> {
        let owner = Self::require_address(owner)?;
        let spender = Self::require_address(spender)?;
        let token = self.usdt_contract.clone();
        let decimals = self.token_decimals(&token).await?;
        let data = format!(
            "{}{}{}",
            SELECTOR_ALLOWANCE,
            encode_address_arg(&owner),
            encode_address_arg(&spender)
        );
        let value = self.call_contract(&token, data).await?;
        Ok(TokenAllowance {
            allowance: wei_to_decimal(value, decimals),
            allowance_raw: value.to_string(),
        })
    }

    pub async fn get_block_number(&self) -> Result<u64, ChainError> {
        let result = self.rpc_call("eth_blockNumber", json!([])).await?;
        Ok(parse_quantity(&result)? as u64)
    }

    /// Scans the most recent blocks for transfers touching `address` and
    /// returns the newest matches. Blocks that fail to fetch are skipped so
    /// one flaky block does not sink the whole scan.
    pub async fn get_recent_transactions(
        &self,
        address: &str,
    ) -> Result<Vec<ChainTransaction>, ChainError> {
        let target = Self::require_address(address)?;
        let latest = self.get_block_number().await?;
        let start = latest.saturating_sub(SCAN_BLOCKS - 1);

        let mut matches = Vec::new();
        for number in start..=latest {
            let tag = format!("0x{:x}", number);
            let block = match self
                .rpc_call("eth_getBlockByNumber", json!([tag, true]))
                .await
            {
                Ok(block) => block,
                Err(e) => {
                    tracing::debug!("Skipping block {}: {}", number, e);
                    continue;
                }
            };
            let transactions = match block.get("transactions").and_then(|t| t.as_array()) {
                Some(list) => list,
                None => continue,
            };
            for tx in transactions {
                let from = tx
                    .get("from")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_lowercase();
                let to = tx
                    .get("to")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_lowercase();
                if from != target && to != target {
                    continue;
                }
                let wei = tx
                    .get("value")
                    .and_then(|v| parse_quantity(v).ok())
                    .unwrap_or(0);
                matches.push(ChainTransaction {
                    hash: tx
                        .get("hash")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                    from,
                    to,
                    value: wei_to_decimal(wei, 18),
                    block: number,
                });
            }
        }

        let keep_from = matches.len().saturating_sub(MAX_SCAN_RESULTS);
        Ok(matches.split_off(keep_from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_validation() {
        assert!(is_valid_address("0x55d398326f99059fF775485246999027B3197955"));
        assert!(is_valid_address("  0x55d398326f99059ff775485246999027b3197955  "));
        assert!(is_valid_address("0X55D398326F99059FF775485246999027B3197955"));
        assert!(!is_valid_address("55d398326f99059fF775485246999027B3197955"));
        assert!(!is_valid_address("0x55d398"));
        assert!(!is_valid_address("0x55d398326f99059fF775485246999027B31979zz"));
        assert!(!is_valid_address(""));
    }

    #[test]
    fn wei_rendering_trims_trailing_zeros() {
        assert_eq!(wei_to_decimal(0, 18), "0");
        assert_eq!(wei_to_decimal(1_000_000_000_000_000_000, 18), "1");
        assert_eq!(wei_to_decimal(1_500_000_000_000_000_000, 18), "1.5");
        assert_eq!(wei_to_decimal(1, 18), "0.000000000000000001");
        assert_eq!(wei_to_decimal(123_450_000, 6), "123.45");
        assert_eq!(wei_to_decimal(42, 0), "42");
    }

    #[test]
    fn calldata_encoding_matches_abi_layout() {
        let balance = format!(
            "{}{}",
            SELECTOR_BALANCE_OF,
            encode_address_arg("0x8B9c85D168d82D6266d71b6f31bb48e3bE1caDf4")
        );
        assert_eq!(
            balance,
            "0x70a082310000000000000000000000008b9c85d168d82d6266d71b6f31bb48e3be1cadf4"
        );

        let allowance = format!(
            "{}{}{}",
            SELECTOR_ALLOWANCE,
            encode_address_arg("0x8B9c85D168d82D6266d71b6f31bb48e3bE1caDf4"),
            encode_address_arg("0x55d398326f99059fF775485246999027B3197955")
        );
        // Selector plus two 32-byte words.
        assert_eq!(allowance.len(), 2 + 8 + 64 + 64);
        assert!(allowance.ends_with(
            "00000000000000000000000055d398326f99059ff775485246999027b3197955"
        ));
    }

    #[test]
    fn quantity_parsing() {
        assert_eq!(parse_quantity(&json!("0x0")).expect("should parse"), 0);
        assert_eq!(parse_quantity(&json!("0x1b4")).expect("should parse"), 436);
        assert_eq!(parse_quantity(&json!("0x")).expect("should parse"), 0);
        assert!(parse_quantity(&json!(17)).is_err());
        assert!(parse_quantity(&json!("0xzz")).is_err());
    }

    #[test]
    fn call_result_decoding() {
        let zero = format!("0x{}", "0".repeat(64));
        assert_eq!(decode_uint(&zero).expect("should decode"), 0);

        let mut word = "0".repeat(64);
        word.replace_range(64 - 5.., "186a0");
        assert_eq!(
            decode_uint(&format!("0x{}", word)).expect("should decode"),
            100_000
        );

        let oversized = format!("0x{}{}", "ff".repeat(17), "00".repeat(15));
        assert!(decode_uint(&oversized).is_err());
    }

    #[test]
    fn network_metadata() {
        assert_eq!(ChainNetwork::Mainnet.chain_id(), 56);
        assert_eq!(ChainNetwork::Testnet.chain_id(), 97);
        assert_eq!(ChainNetwork::parse("Mainnet"), Some(ChainNetwork::Mainnet));
        assert_eq!(ChainNetwork::parse(" testnet "), Some(ChainNetwork::Testnet));
        assert_eq!(ChainNetwork::parse("ropsten"), None);
        assert!(ChainNetwork::Testnet.explorer_url().contains("testnet"));
    }
}
