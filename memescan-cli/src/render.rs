//! Plain-text rendering of reports, history and market data.

use std::fmt::Write;
use std::io::Write as _;

use memescan::amount::format_units;
use memescan::chain::{ChainInfo, ChainRegistry};
use memescan::error::{FailureReason, ScanError};
use memescan::gateway::TokenBalance;
use memescan::orchestrator::{ScanObserver, ScanOutcome, ScanState};
use memescan::proto::{HistoryEntry, ScanReport, short_address};
use memescan_http::types::{CryptoPrices, PlatformStats, TrendingToken};

/// Renders an analysis report.
#[must_use]
pub fn report(report: &ScanReport) -> String {
    let mut out = String::new();
    if let Some(token) = &report.token {
        let _ = writeln!(
            out,
            "{} ({})",
            token.name.as_deref().unwrap_or("Unknown token"),
            token.symbol.as_deref().unwrap_or("?")
        );
    }
    let _ = writeln!(
        out,
        "Risk: {} ({}/100)\nVerdict: {}",
        report.risk_level, report.risk_score, report.verdict
    );
    let security = &report.security;
    let _ = writeln!(
        out,
        "Honeypot: {}  Buy tax: {:.1}%  Sell tax: {:.1}%  Ownership renounced: {}",
        yes_no(security.is_honeypot),
        security.buy_tax,
        security.sell_tax,
        yes_no(security.ownership_renounced)
    );
    if let Some(liquidity) = &report.liquidity {
        let _ = writeln!(
            out,
            "Liquidity: ${:.0}  Locked: {}",
            liquidity.total_liquidity_usd,
            yes_no(liquidity.liquidity_locked)
        );
    }
    list(&mut out, "Warnings", &report.warnings);
    list(&mut out, "Recommendations", &report.recommendations);
    out
}

/// Renders a completed scan, with an explorer link when the settlement chain has one.
#[must_use]
pub fn outcome(outcome: &ScanOutcome, settlement: Option<&ChainInfo>) -> String {
    let mut out = report(&outcome.report);
    let hash = outcome.receipt.transaction_hash;
    let _ = match settlement.and_then(|c| c.tx_url(&hash)) {
        Some(url) => writeln!(out, "Payment: {url}"),
        None => writeln!(out, "Payment: {hash}"),
    };
    if !outcome.persisted {
        let _ = writeln!(out, "Note: the report could not be saved to history.");
    }
    out
}

/// Renders a failed attempt, stating whether the user has already paid.
#[must_use]
pub fn failure(err: &ScanError, settlement: Option<&ChainInfo>) -> String {
    let mut out = format!("Scan failed: {}\n", err.reason());
    if let Some(receipt) = err.receipt() {
        let hash = receipt.transaction_hash;
        let link = settlement
            .and_then(|c| c.tx_url(&hash))
            .unwrap_or_else(|| hash.to_string());
        let _ = writeln!(out, "Your payment succeeded: {link}");
        if err.is_retryable() {
            let _ = writeln!(
                out,
                "Retry without paying again:\n  memescan retry-analysis {hash} --token {} --chain {} --tier {}",
                receipt.token_address, receipt.chain_id, receipt.tier
            );
        } else {
            let _ = writeln!(out, "Keep the transaction hash above when contacting support.");
        }
    } else if let Some(receipt) = err.unconfirmed_receipt() {
        let hash = receipt.transaction_hash;
        let link = settlement
            .and_then(|c| c.tx_url(&hash))
            .unwrap_or_else(|| hash.to_string());
        let _ = writeln!(
            out,
            "Your purchase was sent but its confirmation could not be read: {link}\n\
             Check the transaction before paying again. If it succeeded, fetch the report with:\n  \
             memescan retry-analysis {hash} --token {} --chain {} --tier {}",
            receipt.token_address, receipt.chain_id, receipt.tier
        );
    } else if let Some(hash) = err.transaction() {
        let _ = writeln!(out, "Transaction: {hash}");
    }
    if matches!(err.reason(), FailureReason::WrongChain { .. }) {
        let _ = writeln!(out, "A network switch was requested; run the scan again.");
    }
    out
}

/// Renders the scan history, newest first.
#[must_use]
pub fn history(entries: &[HistoryEntry], registry: &ChainRegistry) -> String {
    if entries.is_empty() {
        return "No scans yet.\n".to_owned();
    }
    let mut out = String::new();
    for entry in entries {
        let chain = registry
            .by_chain_id(entry.chain_id)
            .map_or_else(|| entry.chain_id.to_string(), |c| c.name.clone());
        let _ = writeln!(
            out,
            "{}  {:<5} {:<10} {:<8} {:>3}/100  {}",
            short_address(&entry.token_address),
            entry.tier,
            chain,
            entry.report.risk_level,
            entry.report.risk_score,
            entry.transaction_hash
        );
    }
    out
}

/// Renders platform statistics.
#[must_use]
pub fn stats(stats: &PlatformStats) -> String {
    let mut out = format!("Total scans: {}\n", stats.total_scans);
    for (level, count) in &stats.risk_distribution {
        let _ = writeln!(out, "  {level:<8} {count}");
    }
    out
}

/// Renders spot prices as a ticker line per asset.
#[must_use]
pub fn prices(prices: &CryptoPrices) -> String {
    let mut out = String::new();
    for (asset, price) in prices {
        let change = price
            .usd_24h_change
            .map_or_else(String::new, |c| format!("  {c:+.2}%"));
        let _ = writeln!(out, "{:<10} ${:.2}{change}", asset.to_uppercase(), price.usd);
    }
    out
}

/// Renders trending tokens.
#[must_use]
pub fn trending(tokens: &[TrendingToken]) -> String {
    let mut out = String::new();
    for token in tokens {
        let _ = writeln!(
            out,
            "{:<20} {:<8} {:<8} {:>8} {}",
            token.name,
            token.symbol,
            token.risk_level.as_deref().unwrap_or("-"),
            token.price_change_24h.as_deref().unwrap_or("-"),
            token.volume_24h.as_deref().unwrap_or("")
        );
    }
    out
}

/// Renders a token balance using its decimals.
#[must_use]
pub fn balance(balance: &TokenBalance, symbol: &str) -> String {
    format!("{} {symbol}", format_units(balance.amount, balance.decimals))
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "{title}:");
    for item in items {
        let _ = writeln!(out, "  - {item}");
    }
}

/// Prints each state the scan enters on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressPrinter;

impl ScanObserver for ProgressPrinter {
    fn on_transition(&self, _from: &ScanState, to: &ScanState) {
        let line = match to {
            ScanState::PreconditionCheck => "Checking wallet, network and balance...",
            ScanState::Approving => "Approving payment token (confirm in wallet)...",
            ScanState::Purchasing => "Sending purchase (confirm in wallet)...",
            ScanState::Confirming => "Waiting for the purchase to be mined...",
            ScanState::Analyzing => "Payment confirmed. Analyzing token...",
            _ => return,
        };
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, TxHash, U256};
    use memescan::proto::{PurchaseReceipt, ScanTier};
    use memescan_evm::networks::{POLYGON_MAINNET, known_registry};

    fn sample_report() -> ScanReport {
        serde_json::from_value(serde_json::json!({
            "risk_score": 15,
            "risk_level": "LOW",
            "verdict": "Looks fine",
            "security": {
                "is_honeypot": false,
                "buy_tax": 0.0,
                "sell_tax": 0.5,
                "ownership_renounced": true
            },
            "warnings": ["Low holder count"]
        }))
        .unwrap()
    }

    fn receipt() -> PurchaseReceipt {
        PurchaseReceipt {
            transaction_hash: TxHash::repeat_byte(0x42),
            buyer: Address::repeat_byte(0x01),
            token_address: Address::repeat_byte(0xaa),
            chain_id: 1,
            tier: ScanTier::Basic,
        }
    }

    #[test]
    fn report_lists_findings() {
        let text = report(&sample_report());
        assert!(text.contains("Risk: LOW (15/100)"));
        assert!(text.contains("  - Low holder count"));
        assert!(!text.contains("Recommendations"));
    }

    #[test]
    fn post_payment_failure_says_payment_succeeded() {
        let registry = known_registry();
        let polygon = registry.by_chain_id(POLYGON_MAINNET);
        let err = ScanError::after_payment(
            FailureReason::AnalysisUnreachable("timeout".into()),
            receipt(),
        );
        let text = failure(&err, polygon);
        assert!(text.contains("Your payment succeeded: https://polygonscan.com/tx/0x4242"));
        assert!(text.contains("memescan retry-analysis"));

        let rejected =
            ScanError::after_payment(FailureReason::AnalysisRejected("used".into()), receipt());
        assert!(!failure(&rejected, polygon).contains("retry-analysis"));
    }

    #[test]
    fn unconfirmed_purchase_points_at_the_transaction() {
        let registry = known_registry();
        let err = ScanError::payment_unconfirmed(
            FailureReason::PurchaseUnconfirmed("connection reset".into()),
            receipt(),
        );
        let text = failure(&err, registry.by_chain_id(POLYGON_MAINNET));
        assert!(text.contains("confirmation could not be read: https://polygonscan.com/tx/0x4242"));
        assert!(text.contains("Check the transaction before paying again"));
        assert!(text.contains("memescan retry-analysis"));
        assert!(!text.contains("Your payment succeeded"));
    }

    #[test]
    fn balance_uses_decimals() {
        let b = TokenBalance {
            amount: U256::from(2_500_000u64),
            decimals: 6,
        };
        assert_eq!(balance(&b, "USDC"), "2.5 USDC");
    }
}
