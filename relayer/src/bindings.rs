use alloy::sol;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract L1Oracle {
        function latestValue() external view returns (uint256);
    }
}

sol! {
    /// Mirror of the L1 value on L2, written by the relayer.
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract L2Oracle {
        function value() external view returns (uint256);
        function lastUpdated() external view returns (uint256);
        function setValue(uint256 _value, uint64 _l1BlockNumber) external;
    }
}
