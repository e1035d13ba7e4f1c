//! Contract interfaces used by the mint loop

use alloy::primitives::{Address, Bytes};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    /// Payable mint entrypoint on the mint contract
    #[sol(rpc)]
    interface IMint {
        function mint(address tokenAddress) external payable;
    }

    /// Minimal ERC-20 surface needed for balance display
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
    }
}

/// ABI-encoded `mint(address)` calldata for the given token
pub fn mint_calldata(token: Address) -> Bytes {
    IMint::mintCall { tokenAddress: token }.abi_encode().into()
}
