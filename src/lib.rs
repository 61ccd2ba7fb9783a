pub mod client;

pub mod deployment;

pub mod events;

pub mod format;

pub mod resolver;

pub mod stats;

pub mod types;

pub mod ui;

pub mod wallets;

/// Typed bindings for the Rock-Paper-Scissors chain program. The ABI is the
/// deployed contract's public surface; the game itself (randomness, payout
/// computation, state transitions) lives entirely on chain.
pub mod rps_types {
    use ethers::contract::abigen;

    abigen!(
        RockPaperScissors,
        r#"[
            struct Game { address player; uint256 betAmount; uint8 playerChoice; uint8 houseChoice; uint8 result; uint64 entropySequenceNumber; bytes32 randomNumber; uint256 timestamp; uint256 payout; bool revealed; }
            function playGame(uint8 _choice, bytes32 _userRandomness) external payable returns (uint256)
            function getGame(uint256 _gameId) external view returns (Game memory)
            function getPlayerGames(address _player) external view returns (uint256[] memory)
            function getStats() external view returns (uint256, uint256, uint256, uint256, uint256)
            function getPlayerStats(address _player) external view returns (uint256, uint256, uint256, uint256, uint256, uint256)
            function getAllPlayers() external view returns (address[] memory)
            function getUsername(address _player) external view returns (string memory)
            function usernames(address _player) external view returns (string memory)
            function isUsernameTaken(string _username) external view returns (bool)
            function setUsername(string _username) external
            function hasClaimedWelcomeBonus(address _player) external view returns (bool)
            function welcomeBonusAmount() external view returns (uint256)
            function welcomeBonusEnabled() external view returns (bool)
            function claimWelcomeBonus() external
            function minBet() external view returns (uint256)
            function maxBet() external view returns (uint256)
            function getEntropyFee() external view returns (uint256)
            function pendingPayouts(address _player) external view returns (uint256)
            function withdrawPayout() external
            event GameCreated(uint256 indexed gameId, address indexed player, uint256 betAmount, uint8 playerChoice, uint64 entropySequenceNumber)
            event GameRevealed(uint256 indexed gameId, address indexed player, uint8 playerChoice, uint8 houseChoice, uint8 result, uint256 payout, bytes32 randomNumber)
            event UsernameSet(address indexed user, string username)
            event WelcomeBonusClaimed(address indexed user, uint256 amount)
        ]"#
    );
}
