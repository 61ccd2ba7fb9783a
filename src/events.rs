use crate::{
    rps_types::{
        GameCreatedFilter,
        GameRevealedFilter,
        UsernameSetFilter,
        WelcomeBonusClaimedFilter,
    },
    types::{
        Choice,
        GameOutcome,
        narrow_u128,
        narrow_u64,
    },
};
use color_eyre::eyre::{
    Report,
    Result,
};
use ethers::{
    abi::RawLog,
    contract::EthEvent,
    types::{
        Address,
        H256,
        Log,
        TransactionReceipt,
    },
};
use tracing::warn;

#[derive(Clone, Debug, PartialEq)]
pub struct GameCreatedEvent {
    pub game_id: u64,
    pub player: Address,
    pub bet_amount: u128,
    pub player_choice: Choice,
    pub entropy_sequence_number: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GameRevealedEvent {
    pub game_id: u64,
    pub player: Address,
    pub player_choice: Choice,
    pub house_choice: Choice,
    pub result: GameOutcome,
    pub payout: u128,
    pub random_number: H256,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UsernameSetEvent {
    pub user: Address,
    pub username: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WelcomeBonusClaimedEvent {
    pub user: Address,
    pub amount: u128,
}

/// A contract log decoded at the boundary. Every log in a receipt maps to
/// exactly one variant; anything unrecognized or malformed becomes `Other`
/// so a single odd log can never break resolution.
#[derive(Clone, Debug, PartialEq)]
pub enum ContractEvent {
    GameCreated(GameCreatedEvent),
    GameRevealed(GameRevealedEvent),
    UsernameSet(UsernameSetEvent),
    WelcomeBonusClaimed(WelcomeBonusClaimedEvent),
    Other,
}

/// Decode every log in a confirmed receipt.
pub fn decode_receipt(receipt: &TransactionReceipt) -> Vec<ContractEvent> {
    receipt.logs.iter().map(decode_log).collect()
}

pub fn find_game_created(events: &[ContractEvent]) -> Option<&GameCreatedEvent> {
    events.iter().find_map(|event| match event {
        ContractEvent::GameCreated(created) => Some(created),
        _ => None,
    })
}

pub fn find_game_revealed(
    events: &[ContractEvent],
    game_id: u64,
) -> Option<&GameRevealedEvent> {
    events.iter().find_map(|event| match event {
        ContractEvent::GameRevealed(revealed) if revealed.game_id == game_id => {
            Some(revealed)
        }
        _ => None,
    })
}

fn decode_log(log: &Log) -> ContractEvent {
    let Some(signature) = log.topics.first().copied() else {
        return ContractEvent::Other;
    };
    let raw = RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    };

    let decoded: Result<Option<ContractEvent>> = if signature
        == GameCreatedFilter::signature()
    {
        <GameCreatedFilter as EthEvent>::decode_log(&raw)
            .map_err(Report::from)
            .and_then(GameCreatedEvent::try_from)
            .map(|event| Some(ContractEvent::GameCreated(event)))
    } else if signature == GameRevealedFilter::signature() {
        <GameRevealedFilter as EthEvent>::decode_log(&raw)
            .map_err(Report::from)
            .and_then(GameRevealedEvent::try_from)
            .map(|event| Some(ContractEvent::GameRevealed(event)))
    } else if signature == UsernameSetFilter::signature() {
        <UsernameSetFilter as EthEvent>::decode_log(&raw)
            .map_err(Report::from)
            .map(|filter| {
                Some(ContractEvent::UsernameSet(UsernameSetEvent {
                    user: filter.user,
                    username: filter.username,
                }))
            })
    } else if signature == WelcomeBonusClaimedFilter::signature() {
        <WelcomeBonusClaimedFilter as EthEvent>::decode_log(&raw)
            .map_err(Report::from)
            .and_then(|filter| {
                Ok(Some(ContractEvent::WelcomeBonusClaimed(
                    WelcomeBonusClaimedEvent {
                        user: filter.user,
                        amount: narrow_u128(filter.amount, "bonus amount")?,
                    },
                )))
            })
    } else {
        Ok(None)
    };

    match decoded {
        Ok(Some(event)) => event,
        Ok(None) => ContractEvent::Other,
        Err(err) => {
            warn!(%err, topic = ?signature, "skipping undecodable contract log");
            ContractEvent::Other
        }
    }
}

impl TryFrom<GameCreatedFilter> for GameCreatedEvent {
    type Error = Report;

    fn try_from(filter: GameCreatedFilter) -> Result<Self> {
        Ok(GameCreatedEvent {
            game_id: narrow_u64(filter.game_id, "game id")?,
            player: filter.player,
            bet_amount: narrow_u128(filter.bet_amount, "bet amount")?,
            player_choice: Choice::try_from(filter.player_choice)?,
            entropy_sequence_number: filter.entropy_sequence_number,
        })
    }
}

impl TryFrom<GameRevealedFilter> for GameRevealedEvent {
    type Error = Report;

    fn try_from(filter: GameRevealedFilter) -> Result<Self> {
        Ok(GameRevealedEvent {
            game_id: narrow_u64(filter.game_id, "game id")?,
            player: filter.player,
            player_choice: Choice::try_from(filter.player_choice)?,
            house_choice: Choice::try_from(filter.house_choice)?,
            result: GameOutcome::try_from(filter.result)?,
            payout: narrow_u128(filter.payout, "payout")?,
            random_number: H256::from(filter.random_number),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use ethers::{
        abi::Token,
        types::U256,
    };

    fn id_topic(game_id: u64) -> H256 {
        H256::from_low_u64_be(game_id)
    }

    fn address_topic(address: Address) -> H256 {
        let mut topic = [0u8; 32];
        topic[12..].copy_from_slice(address.as_bytes());
        H256::from(topic)
    }

    fn created_log(game_id: u64, player: Address, choice: u8) -> Log {
        Log {
            topics: vec![
                GameCreatedFilter::signature(),
                id_topic(game_id),
                address_topic(player),
            ],
            data: ethers::abi::encode(&[
                Token::Uint(U256::from(50_000u64)),
                Token::Uint(U256::from(choice)),
                Token::Uint(U256::from(11u64)),
            ])
            .into(),
            ..Default::default()
        }
    }

    fn revealed_log(game_id: u64, player: Address, result: u8) -> Log {
        Log {
            topics: vec![
                GameRevealedFilter::signature(),
                id_topic(game_id),
                address_topic(player),
            ],
            data: ethers::abi::encode(&[
                Token::Uint(U256::from(1u64)),
                Token::Uint(U256::from(3u64)),
                Token::Uint(U256::from(result)),
                Token::Uint(U256::from(97_500u64)),
                Token::FixedBytes(vec![5u8; 32]),
            ])
            .into(),
            ..Default::default()
        }
    }

    fn receipt_with(logs: Vec<Log>) -> TransactionReceipt {
        TransactionReceipt {
            logs,
            ..Default::default()
        }
    }

    #[test]
    fn decode_receipt__decodes_created_and_revealed_events() {
        // given
        let player = Address::from([2u8; 20]);
        let receipt = receipt_with(vec![
            created_log(9, player, 1),
            revealed_log(9, player, 1),
        ]);

        // when
        let events = decode_receipt(&receipt);

        // then
        let created = find_game_created(&events).unwrap();
        assert_eq!(created.game_id, 9);
        assert_eq!(created.player_choice, Choice::Rock);
        assert_eq!(created.bet_amount, 50_000);

        let revealed = find_game_revealed(&events, 9).unwrap();
        assert_eq!(revealed.result, GameOutcome::Win);
        assert_eq!(revealed.house_choice, Choice::Scissors);
        assert_eq!(revealed.payout, 97_500);
        assert_eq!(revealed.random_number, H256::from([5u8; 32]));
    }

    #[test]
    fn decode_receipt__ignores_foreign_and_empty_logs() {
        // given
        let foreign = Log {
            topics: vec![H256::from([0xabu8; 32])],
            ..Default::default()
        };
        let empty = Log::default();
        let receipt = receipt_with(vec![foreign, empty]);

        // when
        let events = decode_receipt(&receipt);

        // then
        assert_eq!(events, vec![ContractEvent::Other, ContractEvent::Other]);
        assert!(find_game_created(&events).is_none());
    }

    #[test]
    fn decode_receipt__malformed_payload_becomes_other() {
        // given: a GameRevealed topic with truncated data
        let log = Log {
            topics: vec![
                GameRevealedFilter::signature(),
                id_topic(1),
                address_topic(Address::from([2u8; 20])),
            ],
            data: vec![0u8; 7].into(),
            ..Default::default()
        };

        // when
        let events = decode_receipt(&receipt_with(vec![log]));

        // then
        assert_eq!(events, vec![ContractEvent::Other]);
    }

    #[test]
    fn decode_receipt__out_of_range_result_becomes_other() {
        // given
        let player = Address::from([2u8; 20]);
        let receipt = receipt_with(vec![revealed_log(4, player, 9)]);

        // when
        let events = decode_receipt(&receipt);

        // then
        assert_eq!(events, vec![ContractEvent::Other]);
        assert!(find_game_revealed(&events, 4).is_none());
    }

    #[test]
    fn find_game_revealed__requires_matching_game_id() {
        // given
        let player = Address::from([2u8; 20]);
        let events = decode_receipt(&receipt_with(vec![revealed_log(4, player, 1)]));

        // then
        assert!(find_game_revealed(&events, 5).is_none());
        assert!(find_game_revealed(&events, 4).is_some());
    }
}
