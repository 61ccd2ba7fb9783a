#![allow(non_snake_case)]

use ethers::{
    abi::Token,
    contract::EthEvent,
    types::{
        Address,
        H256,
        Log,
        TransactionReceipt,
        U256,
    },
};
use roshambo_client::{
    resolver::{
        self,
        GameReader,
        PollConfig,
        Resolution,
    },
    rps_types::{
        GameCreatedFilter,
        GameRevealedFilter,
    },
    types::{
        Choice,
        GameOutcome,
        GameRecord,
    },
};
use std::sync::atomic::{
    AtomicU32,
    Ordering,
};

const PLAYER: [u8; 20] = [2u8; 20];
const BET: u128 = 50_000;

fn id_topic(game_id: u64) -> H256 {
    H256::from_low_u64_be(game_id)
}

fn player_topic() -> H256 {
    let mut topic = [0u8; 32];
    topic[12..].copy_from_slice(&PLAYER);
    H256::from(topic)
}

fn created_log(game_id: u64) -> Log {
    Log {
        topics: vec![
            GameCreatedFilter::signature(),
            id_topic(game_id),
            player_topic(),
        ],
        data: ethers::abi::encode(&[
            Token::Uint(U256::from(BET)),
            Token::Uint(U256::from(1u64)),
            Token::Uint(U256::from(7u64)),
        ])
        .into(),
        ..Default::default()
    }
}

fn revealed_log(game_id: u64, result: u8, payout: u128) -> Log {
    Log {
        topics: vec![
            GameRevealedFilter::signature(),
            id_topic(game_id),
            player_topic(),
        ],
        data: ethers::abi::encode(&[
            Token::Uint(U256::from(1u64)),
            Token::Uint(U256::from(3u64)),
            Token::Uint(U256::from(result)),
            Token::Uint(U256::from(payout)),
            Token::FixedBytes(vec![8u8; 32]),
        ])
        .into(),
        ..Default::default()
    }
}

fn receipt_with(logs: Vec<Log>) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: H256::from([0xcdu8; 32]),
        logs,
        ..Default::default()
    }
}

fn revealed_record(game_id: u64) -> GameRecord {
    GameRecord {
        game_id,
        player: Address::from(PLAYER),
        bet_amount: BET,
        player_choice: Choice::Rock,
        house_choice: Choice::Scissors,
        result: GameOutcome::Win,
        payout: BET * 195 / 100,
        entropy_sequence_number: 7,
        random_number: H256::from([8u8; 32]),
        timestamp: 1_700_000_000,
        revealed: true,
    }
}

fn pending_record(game_id: u64) -> GameRecord {
    GameRecord {
        house_choice: Choice::None,
        result: GameOutcome::Pending,
        payout: 0,
        revealed: false,
        ..revealed_record(game_id)
    }
}

/// Scripted read collaborator: transient failures for the first
/// `fail_first` calls, pending records until `reveal_on`, revealed after.
struct ScriptedReader {
    calls: AtomicU32,
    fail_first: u32,
    reveal_on: Option<u32>,
}

impl ScriptedReader {
    fn new(fail_first: u32, reveal_on: Option<u32>) -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_first,
            reveal_on,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GameReader for ScriptedReader {
    fn fetch_game(
        &self,
        game_id: u64,
    ) -> impl Future<Output = color_eyre::eyre::Result<GameRecord>> + Send {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let fail = call <= self.fail_first;
        let revealed = self.reveal_on.is_some_and(|on| call >= on);
        async move {
            if fail {
                return Err(color_eyre::eyre::eyre!("rpc connection reset"));
            }
            if revealed {
                Ok(revealed_record(game_id))
            } else {
                Ok(pending_record(game_id))
            }
        }
    }
}

#[tokio::test]
async fn resolve_game__synchronous_reveal_needs_no_fetches() {
    // given: the reveal landed in the submission transaction
    let receipt = receipt_with(vec![created_log(9), revealed_log(9, 1, 97_500)]);
    let reader = ScriptedReader::new(0, Some(1));
    let (_cancel, mut token) = resolver::cancel_pair();

    // when
    let resolution =
        resolver::resolve_game(&reader, &receipt, &PollConfig::default(), &mut token)
            .await
            .unwrap();

    // then
    let Resolution::Resolved(outcome) = resolution else {
        panic!("expected Resolved, got {resolution:?}");
    };
    assert_eq!(outcome.game_id, 9);
    assert_eq!(outcome.result, GameOutcome::Win);
    assert_eq!(outcome.house_choice, Choice::Scissors);
    assert_eq!(outcome.bet_amount, BET);
    assert_eq!(outcome.payout, 97_500);
    assert_eq!(outcome.transaction_hash, receipt.transaction_hash);
    assert_eq!(reader.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn resolve_game__polls_until_revealed() {
    // given: no reveal in the receipt; the 6th read returns a revealed game
    let receipt = receipt_with(vec![created_log(4)]);
    let reader = ScriptedReader::new(0, Some(6));
    let (_cancel, mut token) = resolver::cancel_pair();

    // when
    let resolution =
        resolver::resolve_game(&reader, &receipt, &PollConfig::default(), &mut token)
            .await
            .unwrap();

    // then
    let Resolution::Resolved(outcome) = resolution else {
        panic!("expected Resolved, got {resolution:?}");
    };
    assert_eq!(reader.calls(), 6);
    assert_eq!(outcome.game_id, 4);
    assert_eq!(outcome.result, GameOutcome::Win);
    assert_eq!(outcome.payout, BET * 195 / 100);
}

#[tokio::test(start_paused = true)]
async fn resolve_game__transient_errors_count_toward_the_budget() {
    // given: the first two reads fail, the fifth succeeds revealed
    let receipt = receipt_with(vec![created_log(4)]);
    let reader = ScriptedReader::new(2, Some(5));
    let (_cancel, mut token) = resolver::cancel_pair();

    // when
    let resolution =
        resolver::resolve_game(&reader, &receipt, &PollConfig::default(), &mut token)
            .await
            .unwrap();

    // then
    assert!(matches!(resolution, Resolution::Resolved(_)));
    assert_eq!(reader.calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn resolve_game__times_out_after_the_attempt_budget() {
    // given: the game never reveals
    let receipt = receipt_with(vec![created_log(4)]);
    let reader = ScriptedReader::new(0, None);
    let (_cancel, mut token) = resolver::cancel_pair();

    // when
    let resolution =
        resolver::resolve_game(&reader, &receipt, &PollConfig::default(), &mut token)
            .await
            .unwrap();

    // then: exactly the configured number of attempts, then nothing more
    assert_eq!(resolution, Resolution::TimedOut { attempts: 30 });
    assert_eq!(reader.calls(), 30);
}

#[tokio::test(start_paused = true)]
async fn resolve_game__errors_alone_still_time_out() {
    // given: every read fails
    let receipt = receipt_with(vec![created_log(4)]);
    let reader = ScriptedReader::new(u32::MAX, None);
    let (_cancel, mut token) = resolver::cancel_pair();

    // when
    let resolution =
        resolver::resolve_game(&reader, &receipt, &PollConfig::default(), &mut token)
            .await
            .unwrap();

    // then
    assert_eq!(resolution, Resolution::TimedOut { attempts: 30 });
    assert_eq!(reader.calls(), 30);
}

#[tokio::test(start_paused = true)]
async fn resolve_game__cancellation_stops_polling() {
    // given
    let receipt = receipt_with(vec![created_log(4)]);
    let reader = ScriptedReader::new(0, None);
    let (cancel, mut token) = resolver::cancel_pair();

    // when: cancelled before the first scheduled delay elapses
    cancel.cancel();
    let resolution =
        resolver::resolve_game(&reader, &receipt, &PollConfig::default(), &mut token)
            .await
            .unwrap();

    // then: abandoned without a single read call
    assert_eq!(resolution, Resolution::Cancelled);
    assert_eq!(reader.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn resolve_game__dropping_the_handle_cancels() {
    // given
    let receipt = receipt_with(vec![created_log(4)]);
    let reader = ScriptedReader::new(0, None);
    let (cancel, mut token) = resolver::cancel_pair();

    // when: the owning context goes away mid-poll
    drop(cancel);
    let resolution =
        resolver::resolve_game(&reader, &receipt, &PollConfig::default(), &mut token)
            .await
            .unwrap();

    // then
    assert_eq!(resolution, Resolution::Cancelled);
    assert_eq!(reader.calls(), 0);
}

#[tokio::test]
async fn resolve_game__missing_game_created_is_fatal() {
    // given: a receipt with no recognizable events at all
    let receipt = receipt_with(vec![Log::default()]);
    let reader = ScriptedReader::new(0, Some(1));
    let (_cancel, mut token) = resolver::cancel_pair();

    // when
    let result =
        resolver::resolve_game(&reader, &receipt, &PollConfig::default(), &mut token)
            .await;

    // then: surfaced immediately, nothing fabricated
    assert!(result.is_err());
    assert_eq!(reader.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn resolve_game__reveal_for_other_game_is_ignored() {
    // given: the receipt carries a reveal for a different game id
    let receipt = receipt_with(vec![created_log(4), revealed_log(5, 1, 10)]);
    let reader = ScriptedReader::new(0, Some(2));
    let (_cancel, mut token) = resolver::cancel_pair();

    // when
    let resolution =
        resolver::resolve_game(&reader, &receipt, &PollConfig::default(), &mut token)
            .await
            .unwrap();

    // then: falls through to polling its own game
    assert!(matches!(resolution, Resolution::Resolved(_)));
    assert_eq!(reader.calls(), 2);
}
