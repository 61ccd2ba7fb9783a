use crate::{
    events,
    types::{
        GameRecord,
        ResolutionOutcome,
    },
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use ethers::types::{
    H256,
    TransactionReceipt,
};
use std::time::Duration;
use tokio::{
    sync::watch,
    time,
};
use tracing::{
    debug,
    warn,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Read access to individual games on the chain program. Implemented by the
/// live contract client and by scripted stubs in tests.
pub trait GameReader {
    fn fetch_game(&self, game_id: u64) -> impl Future<Output = Result<GameRecord>> + Send;
}

#[derive(Clone, Debug)]
pub struct PollConfig {
    /// Fixed delay before each fetch attempt.
    pub interval: Duration,
    /// Total fetch attempts before giving up.
    pub max_attempts: u32,
    /// Extra delay applied after a successful poll, used only to pace the
    /// reveal animation. Not part of the resolution contract.
    pub display_delay: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            display_delay: None,
        }
    }
}

/// Terminal outcome of one resolution attempt. A timeout is not a game
/// result: the bet stays on chain and shows up in history once revealed.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Resolved(ResolutionOutcome),
    TimedOut { attempts: u32 },
    Cancelled,
}

/// Cancels the paired [`CancelToken`]. Dropping the handle cancels too, so a
/// poll can never outlive the context that spawned it.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    async fn cancelled(&mut self) {
        // Completes on explicit cancel or when the handle is dropped.
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Resolve a confirmed bet transaction into exactly one outcome.
///
/// The receipt's logs are the cheapest signal: a `GameRevealed` event for
/// the submitted game means the reveal happened in the same transaction and
/// no read calls are needed. Otherwise the reveal is pending an oracle
/// callback and the game is polled until revealed or the attempt budget runs
/// out. A receipt without a `GameCreated` event is a fatal local error —
/// there is no game identifier to poll.
pub async fn resolve_game<R>(
    reader: &R,
    receipt: &TransactionReceipt,
    config: &PollConfig,
    cancel: &mut CancelToken,
) -> Result<Resolution>
where
    R: GameReader,
{
    let decoded = events::decode_receipt(receipt);
    let created = events::find_game_created(&decoded).ok_or_else(|| {
        eyre!(
            "transaction {:?} emitted no GameCreated event; cannot resolve",
            receipt.transaction_hash
        )
    })?;
    let game_id = created.game_id;

    if let Some(revealed) = events::find_game_revealed(&decoded, game_id) {
        debug!(game_id, "reveal found in submission receipt");
        if let Some(delay) = config.display_delay {
            time::sleep(delay).await;
        }
        return Ok(Resolution::Resolved(ResolutionOutcome {
            game_id,
            player_choice: revealed.player_choice,
            house_choice: revealed.house_choice,
            result: revealed.result,
            bet_amount: created.bet_amount,
            payout: revealed.payout,
            transaction_hash: receipt.transaction_hash,
            random_number: revealed.random_number,
        }));
    }

    debug!(game_id, "reveal pending oracle callback; polling");
    poll_until_revealed(reader, game_id, receipt.transaction_hash, config, cancel).await
}

async fn poll_until_revealed<R>(
    reader: &R,
    game_id: u64,
    transaction_hash: H256,
    config: &PollConfig,
    cancel: &mut CancelToken,
) -> Result<Resolution>
where
    R: GameReader,
{
    for attempt in 1..=config.max_attempts {
        if cancel.is_cancelled() {
            debug!(game_id, attempt, "resolution poll cancelled");
            return Ok(Resolution::Cancelled);
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(game_id, attempt, "resolution poll cancelled");
                return Ok(Resolution::Cancelled);
            }
            _ = time::sleep(config.interval) => {}
        }

        match reader.fetch_game(game_id).await {
            Ok(record) if record.revealed && record.is_resolved() => {
                debug!(game_id, attempt, result = %record.result, "game revealed");
                if let Some(delay) = config.display_delay {
                    time::sleep(delay).await;
                }
                return Ok(Resolution::Resolved(ResolutionOutcome {
                    game_id,
                    player_choice: record.player_choice,
                    house_choice: record.house_choice,
                    result: record.result,
                    bet_amount: record.bet_amount,
                    payout: record.payout,
                    transaction_hash,
                    random_number: record.random_number,
                }));
            }
            Ok(_) => {
                debug!(game_id, attempt, "game not yet revealed");
            }
            // Transient read failures count against the budget; they are
            // retried, not surfaced per attempt.
            Err(err) => {
                warn!(game_id, attempt, %err, "game fetch failed; retrying");
            }
        }
    }

    warn!(
        game_id,
        attempts = config.max_attempts,
        "gave up waiting for reveal"
    );
    Ok(Resolution::TimedOut {
        attempts: config.max_attempts,
    })
}
