//! Solidity ABI bindings for the underlying ERC-20 asset and the
//! Coinflakes investment vault.

use alloy::sol;

sol!(
    #[sol(all_derives = true)]
    interface IERC20 {
        function name() external view returns (string name);
        function symbol() external view returns (string symbol);
        function decimals() external view returns (uint8 decimals);
        function totalSupply() external view returns (uint256 supply);
        function balanceOf(address account) external view returns (uint256 balance);
        function allowance(address owner, address spender) external view returns (uint256 remaining);
        function approve(address spender, uint256 amount) external returns (bool approved);
    }
);

// ERC-4626 surface plus the manager extensions. The vault is itself the
// ERC-20 share token, so the share-side reads go through `IERC20`.
sol!(
    #[sol(all_derives = true)]
    interface ICoinflakesVault {
        function asset() external view returns (address asset);
        function totalAssets() external view returns (uint256 assets);
        function assetsInUse() external view returns (uint256 assets);
        function convertToAssets(uint256 shares) external view returns (uint256 assets);
        function maxRedeem(address owner) external view returns (uint256 shares);
        function maxWithdraw(address owner) external view returns (uint256 assets);
        function manager() external view returns (address manager);
        function isShareholder(address account) external view returns (bool shareholder);

        function deposit(uint256 assets, address receiver) external returns (uint256 shares);
        function mint(uint256 shares, address receiver) external returns (uint256 assets);
        function redeem(uint256 shares, address receiver, address owner) external returns (uint256 assets);
        function withdraw(uint256 assets, address receiver, address owner) external returns (uint256 shares);

        function returnAssets(address from, uint256 assets) external;
        function useAssets(address receiver, uint256 assets) external;
        function setAssetsInUse(uint256 assets) external;
        function whitelistShareholder(address account) external;
        function revokeShareholder(address account) external;
    }
);
