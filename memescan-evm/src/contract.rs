//! Solidity interfaces of the contracts a scan purchase touches.
//!
//! - [`IERC20`] - the ERC-20 subset used for balance, allowance and approval
//! - [`IScanPurchase`] - the scan purchase contract

use alloy_sol_types::sol;

sol! {
    /// Minimal ERC-20 interface for stablecoin payment tokens.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function allowance(address owner, address spender) external view returns (uint256);
    }
}

sol! {
    /// Scan purchase contract.
    ///
    /// Each purchase pulls the tier price, in the chosen payment token, from the
    /// caller. Prices are denominated in US cents.
    #[allow(missing_docs)]
    #[allow(non_snake_case)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IScanPurchase {
        function purchaseBasicScan(address tokenAddress, uint256 tokenChainId, address paymentToken, address referrer) external returns (uint256 scanId);
        function purchaseFullScan(address tokenAddress, uint256 tokenChainId, address paymentToken, address referrer) external returns (uint256 scanId);
        function BASIC_SCAN_PRICE_USD() external view returns (uint256);
        function FULL_SCAN_PRICE_USD() external view returns (uint256);
    }
}
