//! Property tests for team formation, drafting, series scoring and the queue

use proptest::prelude::*;
use scrim_room::config::{PersistenceSettings, QueueConfig, RatingConfig, SeriesConfig};
use scrim_room::lifecycle::{MatchContext, MatchLifecycle};
use scrim_room::persistence::{InMemorySnapshotStore, PersistenceGateway};
use scrim_room::queue::QueueManager;
use scrim_room::rating::RatingStore;
use scrim_room::series::{GameOutcome, Series};
use scrim_room::teams::{team_mmr, DraftState, FormationRequest, TeamFormationEngine};
use scrim_room::types::{MatchPhase, RosterPlayer, TeamLabel};
use std::collections::HashSet;
use std::sync::Arc;

const TEAM_SIZE: usize = 4;

fn roster_from(mmrs: &[i64]) -> Vec<RosterPlayer> {
    mmrs.iter()
        .enumerate()
        .map(|(i, mmr)| RosterPlayer {
            id: format!("p{}", i),
            mmr: *mmr,
        })
        .collect()
}

fn roster_strategy() -> impl Strategy<Value = Vec<RosterPlayer>> {
    prop::collection::vec(0i64..3000, TEAM_SIZE * 2).prop_map(|mmrs| roster_from(&mmrs))
}

#[derive(Debug, Clone)]
enum QueueOp {
    Join(u8),
    Leave(u8),
    Drain,
}

fn queue_op() -> impl Strategy<Value = QueueOp> {
    prop_oneof![
        4 => (0u8..20).prop_map(QueueOp::Join),
        2 => (0u8..20).prop_map(QueueOp::Leave),
        1 => Just(QueueOp::Drain),
    ]
}

/// Lifecycle step chosen by index into the live roster or map pool
#[derive(Debug, Clone)]
enum MatchOp {
    Balanced,
    BeginDraft,
    Pick(prop::sample::Index),
    Swap(prop::sample::Index, prop::sample::Index),
    Vote(prop::sample::Index, prop::sample::Index),
    CloseVoting,
    Win(bool),
    Finalize,
    Cancel,
}

fn match_op() -> impl Strategy<Value = MatchOp> {
    prop_oneof![
        1 => Just(MatchOp::Balanced),
        1 => Just(MatchOp::BeginDraft),
        4 => any::<prop::sample::Index>().prop_map(MatchOp::Pick),
        1 => (any::<prop::sample::Index>(), any::<prop::sample::Index>())
            .prop_map(|(a, b)| MatchOp::Swap(a, b)),
        2 => (any::<prop::sample::Index>(), any::<prop::sample::Index>())
            .prop_map(|(p, c)| MatchOp::Vote(p, c)),
        1 => Just(MatchOp::CloseVoting),
        3 => any::<bool>().prop_map(MatchOp::Win),
        1 => Just(MatchOp::Finalize),
        1 => Just(MatchOp::Cancel),
    ]
}

fn op_lifecycle() -> MatchLifecycle {
    let ratings = Arc::new(RatingStore::new(RatingConfig::default()).unwrap());
    let gateway = Arc::new(PersistenceGateway::spawn(
        Arc::new(InMemorySnapshotStore::new()),
        &PersistenceSettings::default(),
        None,
    ));
    MatchLifecycle::new(
        &QueueConfig::default(),
        SeriesConfig::default(),
        ratings,
        gateway,
    )
    .unwrap()
}

/// Apply `op`; rejected operations are part of the sequence too
async fn apply(lifecycle: &MatchLifecycle, op: MatchOp, pool: &[String]) {
    let Some(context) = lifecycle.match_context().await else {
        for i in 0..TEAM_SIZE * 2 {
            let id = format!("p{}", i);
            let _ = lifecycle.join_queue(&id, &id).await;
        }
        return;
    };
    let roster = context.roster_ids();
    let _ = match op {
        MatchOp::Balanced => lifecycle
            .select_teams(&roster[0], FormationRequest::Balanced)
            .await
            .map(|_| ()),
        MatchOp::BeginDraft => lifecycle
            .begin_captains_draft(&roster[0], None)
            .await
            .map(|_| ()),
        MatchOp::Pick(choice) => match context.draft.as_ref() {
            Some(draft) => {
                let progress = draft.progress();
                match progress.next_picker {
                    Some(captain) if !progress.remaining.is_empty() => {
                        let player = choice.get(&progress.remaining).clone();
                        lifecycle.draft_pick(&captain, &player).await.map(|_| ())
                    }
                    _ => Ok(()),
                }
            }
            None => Ok(()),
        },
        MatchOp::Swap(a, b) => lifecycle
            .swap_players(a.get::<String>(&roster), b.get::<String>(&roster))
            .await
            .map(|_| ()),
        MatchOp::Vote(player, choice) => lifecycle
            .cast_vote(player.get::<String>(&roster), choice.get::<String>(pool))
            .await
            .map(|_| ()),
        MatchOp::CloseVoting => lifecycle.close_voting().await.map(|_| ()),
        MatchOp::Win(a_wins) => {
            let winner = if a_wins { TeamLabel::A } else { TeamLabel::B };
            lifecycle.record_game_result(winner).await.map(|_| ())
        }
        MatchOp::Finalize => lifecycle.finalize_match().await.map(|_| ()),
        MatchOp::Cancel => lifecycle.cancel_current().await.map(|_| ()),
    };
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_match_context_survives_serialization(ops in prop::collection::vec(match_op(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let lifecycle = op_lifecycle();
            let pool = SeriesConfig::default().map_pool;

            for op in ops {
                apply(&lifecycle, op, &pool).await;
                let Some(context) = lifecycle.match_context().await else {
                    continue;
                };

                let json = serde_json::to_string(&context).unwrap();
                let restored: MatchContext = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(&restored, &context);
                // A second cycle changes nothing
                let again: MatchContext =
                    serde_json::from_str(&serde_json::to_string(&restored).unwrap()).unwrap();
                prop_assert_eq!(&again, &context);
            }
            Ok(())
        })?;
    }
}

proptest! {
    #[test]
    fn test_balanced_is_deterministic_partition(roster in roster_strategy()) {
        let engine = TeamFormationEngine::new(TEAM_SIZE);
        let first = engine.balanced(&roster).unwrap();
        let second = engine.balanced(&roster).unwrap();
        prop_assert_eq!(&first, &second);

        let (team_a, team_b) = first;
        prop_assert_eq!(team_a.len(), TEAM_SIZE);
        prop_assert_eq!(team_b.len(), TEAM_SIZE);
        let everyone: HashSet<&String> = team_a.players.iter().chain(team_b.players.iter()).collect();
        prop_assert_eq!(everyone.len(), roster.len());
    }

    #[test]
    fn test_balanced_has_no_improving_swap(roster in roster_strategy()) {
        let engine = TeamFormationEngine::new(TEAM_SIZE);
        let (team_a, team_b) = engine.balanced(&roster).unwrap();
        let sum_a = team_mmr(&team_a, &roster);
        let sum_b = team_mmr(&team_b, &roster);
        let diff = (sum_a - sum_b).abs();
        let mmr = |id: &String| roster.iter().find(|p| &p.id == id).map(|p| p.mmr).unwrap();

        for a in &team_a.players {
            for b in &team_b.players {
                let swapped = ((sum_a - mmr(a) + mmr(b)) - (sum_b - mmr(b) + mmr(a))).abs();
                prop_assert!(swapped >= diff, "swapping {} and {} improves {} to {}", a, b, diff, swapped);
            }
        }
    }

    #[test]
    fn test_draft_alternates_captains(
        roster in roster_strategy(),
        choices in prop::collection::vec(any::<prop::sample::Index>(), TEAM_SIZE * 2 - 2),
    ) {
        let mut draft = DraftState::new(&roster, None).unwrap();
        let captain_a = draft.team(TeamLabel::A).captain.clone().unwrap();
        let captain_b = draft.team(TeamLabel::B).captain.clone().unwrap();

        for (turn, choice) in choices.iter().enumerate() {
            let expected = if turn % 2 == 0 { &captain_a } else { &captain_b };
            let picker = draft.next_picker().cloned().unwrap();
            prop_assert_eq!(&picker, expected);

            let remaining = draft.progress().remaining;
            let player = choice.get(&remaining).clone();
            let progress = draft.pick(&picker, &player).unwrap();
            let sizes = (progress.team_a.len() as i64, progress.team_b.len() as i64);
            prop_assert!((sizes.0 - sizes.1).abs() <= 1);
        }

        prop_assert!(draft.is_complete());
        prop_assert!(draft.next_picker().is_none());
        let (team_a, team_b) = draft.into_teams().unwrap();
        prop_assert_eq!(team_a.len(), TEAM_SIZE);
        prop_assert_eq!(team_b.len(), TEAM_SIZE);
    }

    #[test]
    fn test_series_ends_at_threshold(
        length in prop::sample::select(vec![1u32, 3, 5, 7, 9]),
        winners in prop::collection::vec(any::<bool>(), 9),
    ) {
        let config = SeriesConfig { length, ..SeriesConfig::default() };
        let mut series = Series::new(&config, vec!["p0".to_string()]).unwrap();
        let threshold = config.threshold();

        let mut played = 0;
        for a_wins in winners {
            let winner = if a_wins { TeamLabel::A } else { TeamLabel::B };
            let outcome = series.record_game_result(winner).unwrap();
            played += 1;
            if let GameOutcome::SeriesComplete { winner } = outcome {
                prop_assert_eq!(series.wins(winner), threshold);
                prop_assert!(series.wins(winner.opponent()) < threshold);
                break;
            }
        }

        prop_assert!(series.is_complete());
        prop_assert!(played <= length);
        prop_assert!(series.record_game_result(TeamLabel::A).is_err());
    }

    #[test]
    fn test_queue_never_exceeds_capacity(ops in prop::collection::vec(queue_op(), 1..60)) {
        let mut queue = QueueManager::new(TEAM_SIZE * 2);
        for op in ops {
            match op {
                QueueOp::Join(id) => {
                    let id = format!("q{}", id);
                    let was_queued = queue.contains(&id);
                    let was_full = queue.is_full();
                    let result = queue.join(&id, &[]);
                    prop_assert_eq!(result.is_ok(), !was_queued && !was_full);
                }
                QueueOp::Leave(id) => {
                    queue.leave(&format!("q{}", id));
                }
                QueueOp::Drain => {
                    let drained = queue.drain_roster();
                    prop_assert!(drained.len() <= TEAM_SIZE * 2);
                }
            }
            prop_assert!(queue.len() <= queue.capacity());
            let ids: HashSet<String> = queue.entries().into_iter().map(|e| e.player_id).collect();
            prop_assert_eq!(ids.len(), queue.len());
        }
        prop_assert!(queue.reset(MatchPhase::Idle).is_ok());
        prop_assert!(queue.is_empty());
    }
}
