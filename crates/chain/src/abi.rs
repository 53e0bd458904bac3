use alloy::sol;

// ─── MemeBattle ─────────────────────────────────────────────────────────────
sol! {
    #[allow(missing_docs)]
    #[derive(Debug, PartialEq, Eq)]
    contract MemeBattle {
        // === Battle lifecycle ===
        event BattleStarted(string category, uint256 startTime, uint256 endTime);
        event BattleCompleted(string category, address winner, uint256 winningMemeId);

        // === Memes ===
        event MemeSubmitted(uint256 indexed memeId, address indexed creator, string category);
        event MemeUpvoted(uint256 indexed memeId, address indexed voter);
        event MemeInfoRequested(uint256 indexed memeId);

        // === Ownable ===
        event OwnershipTransferred(address indexed previousOwner, address indexed newOwner);
    }
}
