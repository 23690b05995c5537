//! Draw state machine against the in-memory repository and bus.
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use chrono::{DateTime, TimeDelta, Utc};
use lottery::draw::{Draw, DrawError, DrawLifecycle, DrawResult, DrawStatus, InMemoryDrawRepository};
use lottery::{DrawId, LotteryConfig};
use lottery_core::event_bus::EventBusError;
use lottery_core::transaction::TransactionError;
use lottery_testing::InMemoryEventBus;
use lottery_testing::mocks::{ManualClock, test_time};
use std::sync::Arc;

const CHANNEL: &str = "draw_events";

struct Harness {
    repo: InMemoryDrawRepository,
    bus: InMemoryEventBus,
    clock: ManualClock,
    draws: DrawLifecycle<InMemoryDrawRepository>,
}

fn harness() -> Harness {
    let repo = InMemoryDrawRepository::new();
    let bus = InMemoryEventBus::new();
    let clock = ManualClock::new(test_time());
    let draws = DrawLifecycle::new(
        Arc::new(repo.clone()),
        Arc::new(bus.clone()),
        Arc::new(clock.clone()),
        CHANNEL,
    );
    Harness { repo, bus, clock, draws }
}

fn draw(id: i64, status: DrawStatus, start: DateTime<Utc>, end: DateTime<Utc>) -> Draw {
    Draw {
        id: DrawId::new(id),
        lottery_type: LotteryConfig::new(5, 36).unwrap(),
        start_time: start,
        end_time: end,
        status,
    }
}

fn hours(n: i64) -> TimeDelta {
    TimeDelta::hours(n)
}

#[tokio::test]
async fn planned_draw_past_its_start_is_activated_and_announced() {
    let h = harness();
    let now = test_time();
    h.repo.insert(draw(7, DrawStatus::Planned, now - hours(1), now + hours(24)));

    let activated = h.draws.activate_draws().await.unwrap();

    assert_eq!(activated.len(), 1);
    assert_eq!(h.repo.draw(DrawId::new(7)).unwrap().status, DrawStatus::Active);

    let events = h.bus.published_json(CHANNEL);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "draw_activated");
    assert_eq!(events[0]["draw"]["id"], 7);
    assert_eq!(events[0]["draw"]["status"], "ACTIVE");
}

#[tokio::test]
async fn second_sweep_activates_nothing() {
    let h = harness();
    let now = test_time();
    h.repo.insert(draw(1, DrawStatus::Planned, now - hours(2), now + hours(1)));
    h.repo.insert(draw(2, DrawStatus::Planned, now, now + hours(1)));
    h.repo.insert(draw(3, DrawStatus::Planned, now + hours(1), now + hours(2)));

    let first = h.draws.activate_draws().await.unwrap();
    let ids: Vec<i64> = first.iter().map(|d| d.id.get()).collect();
    assert_eq!(ids, vec![1, 2]);

    let second = h.draws.activate_draws().await.unwrap();
    assert!(second.is_empty());
    assert_eq!(h.bus.published().len(), 2);
    assert_eq!(h.repo.draw(DrawId::new(3)).unwrap().status, DrawStatus::Planned);
}

#[tokio::test]
async fn active_draw_past_its_end_is_completed() {
    let h = harness();
    let now = test_time();
    h.repo.insert(draw(4, DrawStatus::Active, now - hours(3), now + hours(1)));

    assert!(h.draws.complete_draws().await.unwrap().is_empty());

    h.clock.advance(hours(1));
    let completed = h.draws.complete_draws().await.unwrap();

    assert_eq!(completed.len(), 1);
    assert_eq!(h.repo.draw(DrawId::new(4)).unwrap().status, DrawStatus::Completed);
    let events = h.bus.published_json(CHANNEL);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "draw_completed");
    assert_eq!(h.draws.completed_draws().await.unwrap().len(), 1);
}

#[tokio::test]
async fn publish_failure_after_commit_keeps_the_transition() {
    let h = harness();
    let now = test_time();
    h.repo.insert(draw(1, DrawStatus::Planned, now - hours(1), now + hours(1)));
    h.repo.insert(draw(2, DrawStatus::Planned, now - hours(1), now + hours(1)));
    h.bus.fail_next_publishes(1);

    let err = h.draws.activate_draws().await.unwrap_err();

    assert!(matches!(err, DrawError::Publish(EventBusError::PublishFailed { .. })));
    assert_eq!(h.repo.draw(DrawId::new(1)).unwrap().status, DrawStatus::Active);
    assert_eq!(h.repo.draw(DrawId::new(2)).unwrap().status, DrawStatus::Active);
    assert!(h.bus.published().is_empty());
    assert!(h.draws.activate_draws().await.unwrap().is_empty());
}

#[tokio::test]
async fn commit_failure_leaves_draws_planned_and_silent() {
    let h = harness();
    let now = test_time();
    h.repo.insert(draw(1, DrawStatus::Planned, now - hours(1), now + hours(1)));
    h.repo.store().fail_next_commit();

    let err = h.draws.activate_draws().await.unwrap_err();

    assert!(matches!(err, DrawError::Transaction(TransactionError::Commit(_))));
    assert_eq!(h.repo.draw(DrawId::new(1)).unwrap().status, DrawStatus::Planned);
    assert!(h.bus.published().is_empty());
}

#[tokio::test]
async fn storage_failure_stops_the_sweep_before_any_change() {
    let h = harness();
    let now = test_time();
    h.repo.insert(draw(1, DrawStatus::Planned, now - hours(1), now + hours(1)));
    h.repo.fail_next_writes(1);

    let err = h.draws.activate_draws().await.unwrap_err();

    assert!(matches!(err, DrawError::Repository(_)));
    assert_eq!(h.repo.draw(DrawId::new(1)).unwrap().status, DrawStatus::Planned);
    assert_eq!(h.repo.store().stats().committed, 0);
}

#[tokio::test]
async fn cancellation_is_published_inside_the_transaction() {
    let h = harness();
    let now = test_time();
    h.repo.insert(draw(5, DrawStatus::Planned, now + hours(1), now + hours(2)));

    h.bus.fail_next_publishes(1);
    let err = h.draws.cancel_draw(DrawId::new(5)).await.unwrap_err();
    assert!(matches!(err, DrawError::Publish(_)));
    assert_eq!(h.repo.draw(DrawId::new(5)).unwrap().status, DrawStatus::Planned);

    let cancelled = h.draws.cancel_draw(DrawId::new(5)).await.unwrap();
    assert_eq!(cancelled.status, DrawStatus::Cancelled);
    let events = h.bus.published_json(CHANNEL);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "draw_cancelled");
}

#[tokio::test]
async fn terminal_and_missing_draws_cannot_be_cancelled() {
    let h = harness();
    let now = test_time();
    h.repo.insert(draw(6, DrawStatus::Completed, now - hours(2), now - hours(1)));

    let err = h.draws.cancel_draw(DrawId::new(6)).await.unwrap_err();
    assert!(matches!(
        err,
        DrawError::InvalidTransition {
            from: DrawStatus::Completed,
            to: DrawStatus::Cancelled,
            ..
        }
    ));

    let err = h.draws.cancel_draw(DrawId::new(99)).await.unwrap_err();
    assert!(matches!(err, DrawError::NotFound(id) if id == DrawId::new(99)));
    assert!(h.bus.published().is_empty());
}

#[tokio::test]
async fn created_draws_start_planned() {
    let h = harness();
    let now = test_time();
    let config = LotteryConfig::new(6, 49).unwrap();

    let created = h.draws.create_draw(config, now + hours(1), now + hours(2)).await.unwrap();
    assert_eq!(created.status, DrawStatus::Planned);
    assert_eq!(h.draws.get_draw(created.id).await.unwrap(), created);

    let err = h.draws.create_draw(config, now + hours(2), now + hours(1)).await.unwrap_err();
    assert!(matches!(err, DrawError::InvalidSchedule { .. }));
    assert_eq!(h.repo.draws().len(), 1);
}

#[tokio::test]
async fn recorded_result_is_returned_for_its_draw_only() {
    let h = harness();
    let now = test_time();
    h.repo.insert(draw(3, DrawStatus::Completed, now - hours(2), now - hours(1)));
    h.repo.insert(draw(4, DrawStatus::Active, now - hours(1), now + hours(1)));
    let result = DrawResult {
        id: 1,
        draw_id: DrawId::new(3),
        winning_combination: ["04", "11", "19", "27", "33"].map(String::from).to_vec(),
        result_time: now - hours(1),
    };
    h.repo.insert_result(result.clone());

    assert_eq!(h.draws.get_draw_result(DrawId::new(3)).await.unwrap(), result);

    let err = h.draws.get_draw_result(DrawId::new(4)).await.unwrap_err();
    assert!(matches!(err, DrawError::NotFound(id) if id == DrawId::new(4)));
    assert_eq!(h.repo.store().stats().committed, 2);
}
