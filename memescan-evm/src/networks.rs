//! Known EVM networks, payment tokens and purchase contract deployments.

use std::collections::BTreeMap;

use alloy_primitives::{Address, address};
use memescan::chain::{ChainId, ChainInfo, ChainRegistry};

/// Ethereum Mainnet chain ID.
pub const ETHEREUM_MAINNET: ChainId = 1;

/// BNB Smart Chain chain ID.
pub const BSC_MAINNET: ChainId = 56;

/// Polygon Mainnet chain ID.
pub const POLYGON_MAINNET: ChainId = 137;

/// Arbitrum One chain ID.
pub const ARBITRUM_ONE: ChainId = 42161;

/// Local Hardhat node chain ID.
pub const HARDHAT_LOCAL: ChainId = 31337;

/// Chain on which scans are paid for.
pub const SETTLEMENT_CHAIN: ChainId = POLYGON_MAINNET;

/// Key of the default payment token.
pub const DEFAULT_PAYMENT_TOKEN: &str = "usdc";

/// USDC on Ethereum Mainnet.
pub const USDC_ETHEREUM: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

/// USDT on Ethereum Mainnet.
pub const USDT_ETHEREUM: Address = address!("dAC17F958D2ee523a2206206994597C13D831ec7");

/// USDC on BNB Smart Chain.
pub const USDC_BSC: Address = address!("8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d");

/// USDT on BNB Smart Chain.
pub const USDT_BSC: Address = address!("55d398326f99059fF775485246999027B3197955");

/// Bridged USDC on Polygon.
pub const USDC_POLYGON: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");

/// USDT on Polygon.
pub const USDT_POLYGON: Address = address!("c2132D05D31c914a87C6611C10748AEb04B58e8F");

/// Bridged USDC on Arbitrum One.
pub const USDC_ARBITRUM: Address = address!("FF970A61A04b1cA14834A43f5dE4533eBDDB5CC8");

/// USDT on Arbitrum One.
pub const USDT_ARBITRUM: Address = address!("Fd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9");

/// Mock stablecoin deployed first on a fresh Hardhat node.
pub const MOCK_STABLECOIN_HARDHAT: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");

/// Purchase contract deployed second on a fresh Hardhat node; also the Polygon default.
pub const PURCHASE_CONTRACT_DEFAULT: Address =
    address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512");

fn tokens(usdc: Address, usdt: Address) -> BTreeMap<String, Address> {
    BTreeMap::from([("usdc".to_owned(), usdc), ("usdt".to_owned(), usdt)])
}

/// Returns all chains known out of the box.
///
/// Only Polygon and the local Hardhat node carry a purchase contract; other
/// chains can be scanned but not used for settlement unless configured.
#[must_use]
pub fn known_chains() -> Vec<ChainInfo> {
    vec![
        ChainInfo {
            chain_id: ETHEREUM_MAINNET,
            name: "Ethereum".to_owned(),
            native_symbol: "ETH".to_owned(),
            rpc_url: "https://eth.llamarpc.com".to_owned(),
            explorer_base_url: Some("https://etherscan.io".to_owned()),
            payment_tokens: tokens(USDC_ETHEREUM, USDT_ETHEREUM),
            purchase_contract: None,
        },
        ChainInfo {
            chain_id: BSC_MAINNET,
            name: "BNB Chain".to_owned(),
            native_symbol: "BNB".to_owned(),
            rpc_url: "https://bsc-dataseed.binance.org".to_owned(),
            explorer_base_url: Some("https://bscscan.com".to_owned()),
            payment_tokens: tokens(USDC_BSC, USDT_BSC),
            purchase_contract: None,
        },
        ChainInfo {
            chain_id: POLYGON_MAINNET,
            name: "Polygon".to_owned(),
            native_symbol: "MATIC".to_owned(),
            rpc_url: "https://polygon-rpc.com".to_owned(),
            explorer_base_url: Some("https://polygonscan.com".to_owned()),
            payment_tokens: tokens(USDC_POLYGON, USDT_POLYGON),
            purchase_contract: Some(PURCHASE_CONTRACT_DEFAULT),
        },
        ChainInfo {
            chain_id: ARBITRUM_ONE,
            name: "Arbitrum".to_owned(),
            native_symbol: "ETH".to_owned(),
            rpc_url: "https://arb1.arbitrum.io/rpc".to_owned(),
            explorer_base_url: Some("https://arbiscan.io".to_owned()),
            payment_tokens: tokens(USDC_ARBITRUM, USDT_ARBITRUM),
            purchase_contract: None,
        },
        ChainInfo {
            chain_id: HARDHAT_LOCAL,
            name: "Hardhat Local".to_owned(),
            native_symbol: "ETH".to_owned(),
            rpc_url: "http://127.0.0.1:8545".to_owned(),
            explorer_base_url: None,
            payment_tokens: tokens(MOCK_STABLECOIN_HARDHAT, MOCK_STABLECOIN_HARDHAT),
            purchase_contract: Some(PURCHASE_CONTRACT_DEFAULT),
        },
    ]
}

/// A registry of [`known_chains`].
#[must_use]
pub fn known_registry() -> ChainRegistry {
    ChainRegistry::new(known_chains())
}
