//! Data exchanged between the orchestrator, the chain, the analysis backend and
//! the history store.
//!
//! Wire names follow the analysis backend (`snake_case`) for reports and the
//! persisted history format (`camelCase`) for [`HistoryEntry`].

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, TxHash};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::amount::UsdPrice;
use crate::chain::ChainId;
use crate::timestamp::UnixTimestamp;

/// Depth of analysis bought by a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanTier {
    /// Contract-level checks.
    Basic,
    /// Contract checks plus market and liquidity analysis.
    Full,
}

impl ScanTier {
    /// Price shown before the contract has been queried. Never used for payment.
    #[must_use]
    pub const fn display_fallback_price(&self) -> UsdPrice {
        match self {
            Self::Basic => UsdPrice::from_cents(100),
            Self::Full => UsdPrice::from_cents(250),
        }
    }

    /// Wire name of the tier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Full => "full",
        }
    }
}

impl Display for ScanTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ScanTier {
    type Err = UnknownScanTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "full" => Ok(Self::Full),
            _ => Err(UnknownScanTier(s.to_owned())),
        }
    }
}

/// A string that names no scan tier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scan tier: {0}")]
pub struct UnknownScanTier(pub String);

/// Proof that a purchase transaction was mined.
///
/// Created only after confirmation. The transaction hash is the idempotency key
/// presented to the analysis backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    /// Hash of the mined purchase transaction.
    pub transaction_hash: TxHash,
    /// The paying account.
    pub buyer: Address,
    /// The token that was paid for.
    pub token_address: Address,
    /// Chain the scanned token lives on.
    pub chain_id: ChainId,
    /// Tier that was bought.
    pub tier: ScanTier,
}

/// Coarse risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// Low risk.
    Low,
    /// Medium risk.
    Medium,
    /// High risk.
    High,
    /// Critical risk.
    Critical,
}

impl Display for RiskLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        })
    }
}

/// Contract security findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityInfo {
    /// Whether sells are blocked.
    #[serde(default)]
    pub is_honeypot: bool,
    /// Buy tax in percent.
    #[serde(default)]
    pub buy_tax: f64,
    /// Sell tax in percent.
    #[serde(default)]
    pub sell_tax: f64,
    /// Whether contract ownership has been renounced.
    #[serde(default)]
    pub ownership_renounced: bool,
}

/// Token metadata echoed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Token name.
    #[serde(default)]
    pub name: Option<String>,
    /// Token symbol.
    #[serde(default)]
    pub symbol: Option<String>,
}

/// Liquidity findings, present on full scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityInfo {
    /// Total pooled liquidity in USD.
    #[serde(default)]
    pub total_liquidity_usd: f64,
    /// Whether liquidity is locked.
    #[serde(default)]
    pub liquidity_locked: bool,
}

/// Structured result of a paid analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Risk score from 0 (safe) to 100.
    pub risk_score: u32,
    /// Risk classification.
    pub risk_level: RiskLevel,
    /// One-line verdict.
    pub verdict: String,
    /// Warnings raised by the analysis.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Contract security findings.
    pub security: SecurityInfo,
    /// Suggested actions.
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Token metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenInfo>,
    /// Liquidity findings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<LiquidityInfo>,
    /// Backend fields not modelled here, kept so history stores the full document.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ScanReport {
    /// Highest valid risk score.
    pub const MAX_RISK_SCORE: u32 = 100;

    /// Checks structural constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidReport`] if the score is out of range.
    pub const fn validate(&self) -> Result<(), InvalidReport> {
        if self.risk_score > Self::MAX_RISK_SCORE {
            return Err(InvalidReport::RiskScoreOutOfRange(self.risk_score));
        }
        Ok(())
    }
}

/// A report that decoded but is not usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidReport {
    /// Risk score above 100.
    #[error("risk score {0} is out of range 0..=100")]
    RiskScoreOutOfRange(u32),
}

/// One persisted scan: what was bought, when, and what came back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Unique id; the creation time in milliseconds, bumped past earlier entries.
    pub id: u64,
    /// The scanned token.
    #[serde(rename = "address")]
    pub token_address: Address,
    /// Chain the scanned token lives on.
    pub chain_id: ChainId,
    /// Tier that was bought.
    #[serde(rename = "scanType")]
    pub tier: ScanTier,
    /// When the analysis completed.
    pub timestamp: UnixTimestamp,
    /// Hash of the mined purchase transaction.
    #[serde(rename = "txHash")]
    pub transaction_hash: TxHash,
    /// The analysis result.
    #[serde(rename = "result")]
    pub report: ScanReport,
}

impl HistoryEntry {
    /// Builds an entry from a confirmed receipt and its report, stamped now.
    ///
    /// Entries created in the same millisecond are stamped one millisecond
    /// apart so their ids stay distinct.
    #[must_use]
    pub fn new(receipt: &PurchaseReceipt, report: ScanReport) -> Self {
        static LAST_MILLIS: AtomicU64 = AtomicU64::new(0);
        let now = UnixTimestamp::now().as_millis();
        let previous = LAST_MILLIS
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        let millis = now.max(previous + 1);
        Self::at(receipt, report, UnixTimestamp::from_millis(millis))
    }

    /// Builds an entry stamped with `timestamp`.
    #[must_use]
    pub fn at(receipt: &PurchaseReceipt, report: ScanReport, timestamp: UnixTimestamp) -> Self {
        Self {
            id: timestamp.as_millis(),
            token_address: receipt.token_address,
            chain_id: receipt.chain_id,
            tier: receipt.tier,
            timestamp,
            transaction_hash: receipt.transaction_hash,
            report,
        }
    }
}

/// The input is not a syntactically valid EVM address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid token address: {0}")]
pub struct InvalidAddress(pub String);

/// Parses a user-supplied token address.
///
/// Accepts `0x` followed by 40 hex digits. All-lowercase and all-uppercase
/// inputs are accepted as-is; mixed-case inputs must carry a valid EIP-55
/// checksum.
///
/// # Errors
///
/// Returns [`InvalidAddress`] when the input is malformed or mis-checksummed.
pub fn parse_token_address(input: &str) -> Result<Address, InvalidAddress> {
    static ADDRESS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid regex"));
    let trimmed = input.trim();
    if !ADDRESS.is_match(trimmed) {
        return Err(InvalidAddress(input.to_owned()));
    }
    let digits = &trimmed[2..];
    let mixed_case = digits.bytes().any(|b| b.is_ascii_lowercase())
        && digits.bytes().any(|b| b.is_ascii_uppercase());
    let parsed = if mixed_case {
        Address::parse_checksummed(trimmed, None).ok()
    } else {
        Address::from_str(trimmed).ok()
    };
    parsed.ok_or_else(|| InvalidAddress(input.to_owned()))
}

/// Abbreviates an address for display: `0x1234...abcd`.
#[must_use]
pub fn short_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}
