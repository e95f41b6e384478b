use alloy::sol;

sol! {
    /// L1 side of the native bridge. Deposits are credited to `_to` on L2.
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract L1Portal {
        function depositTransaction(
            address _to,
            uint256 _value,
            uint64 _gasLimit,
            bool _isCreation,
            bytes memory _data
        ) external payable;
    }
}
