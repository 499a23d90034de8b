//! Solidity interface of the ShieldSwap contract.
//!
//! Encrypted `euint32` values cross the ABI as their `bytes32` handles.
use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IShieldSwap {
        event OrderCreated(address indexed user, uint256 timestamp);

        function setOrder(bytes32 fromAmount, bytes32 toAmount, bytes calldata inputProof) external;
        function getMyOrder() external view returns (bytes32 fromAmount, bytes32 toAmount);
        function hasOrder() external view returns (bool);
        function getMyOrderTimestamp() external view returns (uint256);
        function protocolId() external pure returns (uint256);
    }
}
