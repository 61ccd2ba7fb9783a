use crate::types::{
    Choice,
    GameOutcome,
    GameRecord,
};
use itertools::Itertools;

/// Count of resolved games per playable hand.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChoiceDistribution {
    pub rock: u64,
    pub paper: u64,
    pub scissors: u64,
}

impl ChoiceDistribution {
    pub fn is_empty(&self) -> bool {
        self.rock == 0 && self.paper == 0 && self.scissors == 0
    }
}

/// Derived snapshot of a player's full game history. Recomputed from scratch
/// on every refresh; nothing here is authoritative.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerStatistics {
    pub total_games: u64,
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    /// Games still awaiting their reveal. Counted here and nowhere else.
    pub in_flight: u64,
    pub win_rate: f64,
    pub total_bet: u128,
    pub total_payout: u128,
    pub net_profit: i128,
    pub current_streak: u64,
    pub best_streak: u64,
    pub choice_distribution: ChoiceDistribution,
}

/// Fold an unordered list of game records into a statistics snapshot.
///
/// Pending records only contribute to `in_flight`. Resolved records are
/// ordered by game id — ids are assigned monotonically by the chain program,
/// so they are the authoritative recency order; timestamps are display-only
/// and subject to ties. A draw breaks both streak counters exactly like a
/// loss; that matches the chain program's own accounting and is deliberate.
pub fn aggregate(records: &[GameRecord]) -> PlayerStatistics {
    let in_flight = records.iter().filter(|r| !r.is_resolved()).count() as u64;

    // Most recent first.
    let resolved: Vec<&GameRecord> = records
        .iter()
        .filter(|r| r.is_resolved())
        .sorted_by(|a, b| b.game_id.cmp(&a.game_id))
        .collect();

    let mut stats = PlayerStatistics {
        in_flight,
        ..PlayerStatistics::default()
    };

    for record in &resolved {
        match record.result {
            GameOutcome::Win => stats.wins += 1,
            GameOutcome::Loss => stats.losses += 1,
            GameOutcome::Draw => stats.draws += 1,
            GameOutcome::Pending => {}
        }
        match record.player_choice {
            Choice::Rock => stats.choice_distribution.rock += 1,
            Choice::Paper => stats.choice_distribution.paper += 1,
            Choice::Scissors => stats.choice_distribution.scissors += 1,
            Choice::None => {}
        }
        stats.total_bet = stats.total_bet.saturating_add(record.bet_amount);
        stats.total_payout = stats.total_payout.saturating_add(record.payout);
    }

    stats.total_games = stats.wins + stats.losses + stats.draws;
    stats.win_rate = if stats.total_games == 0 {
        0.0
    } else {
        stats.wins as f64 / stats.total_games as f64 * 100.0
    };
    stats.net_profit = signed_delta(stats.total_payout, stats.total_bet);

    for record in &resolved {
        if record.result == GameOutcome::Win {
            stats.current_streak += 1;
        } else {
            break;
        }
    }

    let mut run = 0u64;
    for record in resolved.iter().rev() {
        if record.result == GameOutcome::Win {
            run += 1;
            stats.best_streak = stats.best_streak.max(run);
        } else {
            run = 0;
        }
    }

    stats
}

/// `gained - spent` without an intermediate overflow.
pub(crate) fn signed_delta(gained: u128, spent: u128) -> i128 {
    if gained >= spent {
        i128::try_from(gained - spent).unwrap_or(i128::MAX)
    } else {
        i128::try_from(spent - gained).map(|v| -v).unwrap_or(i128::MIN)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use ethers::types::{
        Address,
        H256,
    };
    use proptest::prelude::*;

    fn record(game_id: u64, result: GameOutcome) -> GameRecord {
        record_with(game_id, result, Choice::Rock, 100, default_payout(result, 100))
    }

    fn record_with(
        game_id: u64,
        result: GameOutcome,
        choice: Choice,
        bet: u128,
        payout: u128,
    ) -> GameRecord {
        GameRecord {
            game_id,
            player: Address::from([1u8; 20]),
            bet_amount: bet,
            player_choice: choice,
            house_choice: match result {
                GameOutcome::Pending => Choice::None,
                _ => Choice::Paper,
            },
            result,
            payout,
            entropy_sequence_number: game_id,
            random_number: H256::from([3u8; 32]),
            timestamp: 1_700_000_000 + game_id,
            revealed: result.is_resolved(),
        }
    }

    fn default_payout(result: GameOutcome, bet: u128) -> u128 {
        match result {
            GameOutcome::Win => bet * 195 / 100,
            GameOutcome::Draw => bet,
            _ => 0,
        }
    }

    /// Build records from most-recent-first results, assigning descending ids.
    fn from_recent_results(results: &[GameOutcome]) -> Vec<GameRecord> {
        results
            .iter()
            .enumerate()
            .map(|(i, result)| record(results.len() as u64 - i as u64, *result))
            .collect()
    }

    #[test]
    fn aggregate__empty_input_is_all_zero() {
        // when
        let stats = aggregate(&[]);

        // then
        assert_eq!(stats, PlayerStatistics::default());
        assert_eq!(stats.win_rate, 0.0);
    }

    #[test]
    fn aggregate__all_pending_input_counts_only_in_flight() {
        // given
        let records = vec![
            record(1, GameOutcome::Pending),
            record(2, GameOutcome::Pending),
        ];

        // when
        let stats = aggregate(&records);

        // then
        assert_eq!(stats.total_games, 0);
        assert_eq!(stats.wins, 0);
        assert_eq!(stats.losses, 0);
        assert_eq!(stats.draws, 0);
        assert_eq!(stats.in_flight, 2);
        assert_eq!(stats.total_bet, 0);
        assert_eq!(stats.win_rate, 0.0);
        assert!(stats.choice_distribution.is_empty());
    }

    #[test]
    fn aggregate__draw_breaks_current_streak_like_a_loss() {
        // given: most recent first: Win, Win, Draw, Win
        use GameOutcome::*;
        let records = from_recent_results(&[Win, Win, Draw, Win]);

        // when
        let stats = aggregate(&records);

        // then
        assert_eq!(stats.current_streak, 2);
    }

    #[test]
    fn aggregate__best_streak_over_chronological_order() {
        // given: oldest first: Win, Win, Loss, Win, Win, Win, Draw
        use GameOutcome::*;
        let chronological = [Win, Win, Loss, Win, Win, Win, Draw];
        let records: Vec<GameRecord> = chronological
            .iter()
            .enumerate()
            .map(|(i, result)| record(i as u64 + 1, *result))
            .collect();

        // when
        let stats = aggregate(&records);

        // then
        assert_eq!(stats.best_streak, 3);
        // The run is broken by the trailing draw.
        assert_eq!(stats.current_streak, 0);
    }

    #[test]
    fn aggregate__best_streak_is_zero_without_wins() {
        use GameOutcome::*;
        let stats = aggregate(&from_recent_results(&[Loss, Draw, Loss]));
        assert_eq!(stats.best_streak, 0);
        assert_eq!(stats.current_streak, 0);
    }

    #[test]
    fn aggregate__net_profit_is_payout_minus_bet() {
        // given: two losses of 100 each, no payout
        use GameOutcome::*;
        let records = from_recent_results(&[Loss, Loss]);

        // when
        let stats = aggregate(&records);

        // then
        assert_eq!(stats.total_bet, 200);
        assert_eq!(stats.total_payout, 0);
        assert_eq!(stats.net_profit, -200);
    }

    #[test]
    fn aggregate__win_payout_includes_returned_stake() {
        // given: one win at 1.95x
        let records = vec![record_with(
            1,
            GameOutcome::Win,
            Choice::Scissors,
            1_000,
            1_950,
        )];

        // when
        let stats = aggregate(&records);

        // then
        assert_eq!(stats.net_profit, 950);
        assert_eq!(stats.win_rate, 100.0);
        assert_eq!(stats.choice_distribution.scissors, 1);
    }

    #[test]
    fn aggregate__counts_choices_of_resolved_games_only() {
        // given
        let records = vec![
            record_with(1, GameOutcome::Win, Choice::Rock, 100, 195),
            record_with(2, GameOutcome::Loss, Choice::Rock, 100, 0),
            record_with(3, GameOutcome::Draw, Choice::Paper, 100, 100),
            record_with(4, GameOutcome::Pending, Choice::Scissors, 100, 0),
        ];

        // when
        let stats = aggregate(&records);

        // then
        assert_eq!(stats.choice_distribution.rock, 2);
        assert_eq!(stats.choice_distribution.paper, 1);
        assert_eq!(stats.choice_distribution.scissors, 0);
        assert_eq!(stats.in_flight, 1);
    }

    #[test]
    fn aggregate__win_rate_counts_draws_in_denominator() {
        use GameOutcome::*;
        let stats = aggregate(&from_recent_results(&[Win, Loss, Draw, Win]));
        assert_eq!(stats.win_rate, 50.0);
    }

    proptest! {
        #[test]
        fn aggregate__is_order_independent(
            results in proptest::collection::vec(0u8..4, 0..40),
            seed in any::<u64>(),
        ) {
            let outcomes: Vec<GameOutcome> = results
                .iter()
                .map(|value| match value {
                    0 => GameOutcome::Pending,
                    1 => GameOutcome::Win,
                    2 => GameOutcome::Loss,
                    _ => GameOutcome::Draw,
                })
                .collect();
            let records = from_recent_results(&outcomes);

            // Deterministic shuffle of the input order.
            let mut shuffled = records.clone();
            let mut state = seed;
            for i in (1..shuffled.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = (state % (i as u64 + 1)) as usize;
                shuffled.swap(i, j);
            }

            prop_assert_eq!(aggregate(&records), aggregate(&shuffled));
        }
    }
}
