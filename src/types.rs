use crate::rps_types::Game;
use color_eyre::eyre::{
    Report,
    Result,
    eyre,
};
use ethers::types::{
    Address,
    H256,
    U256,
};
use std::fmt;

/// A hand in the game. The chain program reserves value 0 as a "no choice"
/// sentinel; it only ever appears on `house_choice` while a game is pending.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Choice {
    None,
    Rock,
    Paper,
    Scissors,
}

impl Choice {
    pub fn as_u8(self) -> u8 {
        match self {
            Choice::None => 0,
            Choice::Rock => 1,
            Choice::Paper => 2,
            Choice::Scissors => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Choice::None => "None",
            Choice::Rock => "Rock",
            Choice::Paper => "Paper",
            Choice::Scissors => "Scissors",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Choice::None => "?",
            Choice::Rock => "✊",
            Choice::Paper => "✋",
            Choice::Scissors => "✌",
        }
    }

    /// The three playable hands, in display order.
    pub fn all_playable() -> [Choice; 3] {
        [Choice::Rock, Choice::Paper, Choice::Scissors]
    }

    pub fn next(self) -> Choice {
        match self {
            Choice::Rock => Choice::Paper,
            Choice::Paper => Choice::Scissors,
            Choice::Scissors | Choice::None => Choice::Rock,
        }
    }

    pub fn prev(self) -> Choice {
        match self {
            Choice::Rock | Choice::None => Choice::Scissors,
            Choice::Paper => Choice::Rock,
            Choice::Scissors => Choice::Paper,
        }
    }
}

impl TryFrom<u8> for Choice {
    type Error = Report;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Choice::None),
            1 => Ok(Choice::Rock),
            2 => Ok(Choice::Paper),
            3 => Ok(Choice::Scissors),
            other => Err(eyre!("invalid choice value {other} from chain program")),
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Outcome of a game from the player's point of view. Transitions exactly
/// once from `Pending` to a terminal value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum GameOutcome {
    Pending,
    Win,
    Loss,
    Draw,
}

impl GameOutcome {
    pub fn is_resolved(self) -> bool {
        !matches!(self, GameOutcome::Pending)
    }

    pub fn label(self) -> &'static str {
        match self {
            GameOutcome::Pending => "Pending",
            GameOutcome::Win => "Win",
            GameOutcome::Loss => "Loss",
            GameOutcome::Draw => "Draw",
        }
    }
}

impl TryFrom<u8> for GameOutcome {
    type Error = Report;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(GameOutcome::Pending),
            1 => Ok(GameOutcome::Win),
            2 => Ok(GameOutcome::Loss),
            3 => Ok(GameOutcome::Draw),
            other => Err(eyre!("invalid result value {other} from chain program")),
        }
    }
}

impl fmt::Display for GameOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One game as reported by the chain program. Records are owned and mutated
/// exclusively by the contract; this client only ever reads them. Once
/// `result` leaves `Pending` the record is immutable.
#[derive(Clone, Debug, PartialEq)]
pub struct GameRecord {
    pub game_id: u64,
    pub player: Address,
    pub bet_amount: u128,
    pub player_choice: Choice,
    pub house_choice: Choice,
    pub result: GameOutcome,
    pub payout: u128,
    pub entropy_sequence_number: u64,
    pub random_number: H256,
    pub timestamp: u64,
    pub revealed: bool,
}

impl GameRecord {
    pub fn is_resolved(&self) -> bool {
        self.result.is_resolved()
    }

    /// Decode the contract's `getGame` tuple, rejecting anything outside the
    /// documented value ranges rather than carrying sentinel garbage into
    /// the rest of the client.
    pub fn from_chain(game_id: U256, game: Game) -> Result<Self> {
        Ok(GameRecord {
            game_id: narrow_u64(game_id, "game id")?,
            player: game.player,
            bet_amount: narrow_u128(game.bet_amount, "bet amount")?,
            player_choice: Choice::try_from(game.player_choice)?,
            house_choice: Choice::try_from(game.house_choice)?,
            result: GameOutcome::try_from(game.result)?,
            payout: narrow_u128(game.payout, "payout")?,
            entropy_sequence_number: game.entropy_sequence_number,
            random_number: H256::from(game.random_number),
            timestamp: narrow_u64(game.timestamp, "timestamp")?,
            revealed: game.revealed,
        })
    }
}

/// Everything the UI needs to render a finished game. Constructed once per
/// resolution and discarded with the enclosing view; never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolutionOutcome {
    pub game_id: u64,
    pub player_choice: Choice,
    pub house_choice: Choice,
    pub result: GameOutcome,
    pub bet_amount: u128,
    pub payout: u128,
    pub transaction_hash: H256,
    pub random_number: H256,
}

pub(crate) fn narrow_u64(value: U256, what: &str) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(eyre!("{what} {value} exceeds u64 range"));
    }
    Ok(value.as_u64())
}

pub(crate) fn narrow_u128(value: U256, what: &str) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return Err(eyre!("{what} {value} exceeds u128 range"));
    }
    Ok(value.as_u128())
}
