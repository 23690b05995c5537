//! Ticket service and consumers against the in-memory repository and bus.
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use chrono::TimeDelta;
use lottery::draw::{Draw, DrawEvent, DrawEventKind, DrawStatus};
use lottery::payment::InvoiceEvent;
use lottery::ticket::{
    DrawActivationHandler, InMemoryTicketRepository, InvoiceSettlementHandler, NumbersError, Ticket,
    TicketError, TicketService, TicketStatus,
};
use lottery::{DrawId, LotteryConfig, TicketId, UserId};
use lottery_core::event::Event;
use lottery_core::event_bus::EventBus;
use lottery_runtime::{EventConsumer, EventHandler, HandlerError};
use lottery_testing::InMemoryEventBus;
use lottery_testing::mocks::{ManualClock, test_time};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const ACTIVE_DRAW: DrawId = DrawId::new(1);
const PLANNED_DRAW: DrawId = DrawId::new(2);

fn five_from_36() -> LotteryConfig {
    LotteryConfig::new(5, 36).unwrap()
}

fn draw(id: DrawId, status: DrawStatus) -> Draw {
    Draw {
        id,
        lottery_type: five_from_36(),
        start_time: test_time() - TimeDelta::hours(1),
        end_time: test_time() + TimeDelta::hours(1),
        status,
    }
}

fn setup() -> (InMemoryTicketRepository, Arc<TicketService<InMemoryTicketRepository>>) {
    let repo = InMemoryTicketRepository::new();
    repo.insert_draw(draw(ACTIVE_DRAW, DrawStatus::Active));
    repo.insert_draw(draw(PLANNED_DRAW, DrawStatus::Planned));
    let service = TicketService::new(Arc::new(repo.clone()), Arc::new(ManualClock::new(test_time())));
    (repo, Arc::new(service))
}

fn picks(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

fn system_ticket(id: i64) -> Ticket {
    Ticket {
        id: TicketId::new(id),
        user_id: None,
        draw_id: ACTIVE_DRAW,
        numbers: picks(&["01", "02", "03", "04", "05"]),
        status: TicketStatus::Pending,
        created_at: test_time(),
    }
}

#[tokio::test]
async fn picked_numbers_are_stored_with_two_digits() {
    let (repo, tickets) = setup();
    let user = UserId::new(10);

    let ticket = tickets
        .create_ticket(user, ACTIVE_DRAW, picks(&["5", "17", "3", "36", "09"]))
        .await
        .unwrap();

    assert_eq!(ticket.numbers, picks(&["05", "17", "03", "36", "09"]));
    assert_eq!(ticket.status, TicketStatus::Pending);
    assert_eq!(ticket.user_id, Some(user));
    assert_eq!(repo.ticket(ticket.id), Some(ticket.clone()));
    let owned = tickets.user_tickets(user).await.unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].ticket, ticket);
}

#[tokio::test]
async fn user_tickets_carry_their_draw_newest_first() {
    let (repo, tickets) = setup();
    let user = UserId::new(4);
    repo.insert(Ticket {
        user_id: Some(user),
        ..system_ticket(1)
    });
    repo.insert(Ticket {
        user_id: Some(user),
        draw_id: PLANNED_DRAW,
        created_at: test_time() + TimeDelta::minutes(5),
        ..system_ticket(2)
    });
    repo.insert(Ticket {
        user_id: Some(UserId::new(5)),
        ..system_ticket(3)
    });

    let owned = tickets.user_tickets(user).await.unwrap();

    let ids: Vec<i64> = owned.iter().map(|t| t.ticket.id.get()).collect();
    assert_eq!(ids, vec![2, 1]);
    assert_eq!(owned[0].draw, draw(PLANNED_DRAW, DrawStatus::Planned));
    assert_eq!(owned[1].draw, draw(ACTIVE_DRAW, DrawStatus::Active));

    let json = serde_json::to_value(&owned[1]).unwrap();
    assert_eq!(json["id"], 1);
    assert_eq!(json["draw"]["status"], "ACTIVE");
}

#[tokio::test]
async fn duplicate_numbers_are_rejected_without_a_write() {
    let (repo, tickets) = setup();

    let err = tickets
        .create_ticket(UserId::new(1), ACTIVE_DRAW, picks(&["7", "07", "1", "2", "3"]))
        .await
        .unwrap_err();

    assert!(matches!(err, TicketError::InvalidNumbers(NumbersError::Duplicate(7))));
    assert!(repo.tickets().is_empty());
    assert_eq!(repo.store().stats().committed, 0);
}

#[tokio::test]
async fn inactive_or_unknown_draws_reject_tickets_without_a_write() {
    let (repo, tickets) = setup();
    let numbers = picks(&["1", "2", "3", "4", "5"]);

    let err = tickets
        .create_ticket(UserId::new(1), PLANNED_DRAW, numbers.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::DrawNotActive(id) if id == PLANNED_DRAW));

    let err = tickets
        .create_ticket(UserId::new(1), DrawId::new(404), numbers)
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::DrawNotActive(_)));

    assert!(repo.tickets().is_empty());
}

#[tokio::test]
async fn out_of_range_and_short_picks_are_rejected() {
    let (_repo, tickets) = setup();

    let err = tickets
        .create_ticket(UserId::new(1), ACTIVE_DRAW, picks(&["1", "2", "3", "4", "37"]))
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::InvalidNumbers(NumbersError::OutOfRange { value: 37, max: 36 })));

    let err = tickets
        .create_ticket(UserId::new(1), ACTIVE_DRAW, picks(&["1", "2"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TicketError::InvalidNumbers(NumbersError::WrongCount { expected: 5, actual: 2 })
    ));
}

#[tokio::test]
async fn generated_pool_is_unbooked_and_valid() {
    let (repo, tickets) = setup();

    let pool = tickets.generate_tickets(ACTIVE_DRAW, 50).await.unwrap();

    assert_eq!(pool.len(), 50);
    assert_eq!(repo.tickets().len(), 50);
    assert_eq!(repo.store().stats().committed, 51);
    for ticket in &pool {
        assert!(ticket.is_available());
        assert_eq!(ticket.numbers.len(), 5);
        assert!(ticket.numbers.iter().all(|n| n.len() == 2));
    }
    assert_eq!(tickets.available_tickets().await.unwrap().len(), 50);
}

#[tokio::test]
async fn generation_stops_at_the_first_failed_insert() {
    let (repo, tickets) = setup();
    repo.fail_insert_after(3);

    let err = tickets.generate_tickets(ACTIVE_DRAW, 10).await.unwrap_err();

    assert!(matches!(err, TicketError::Repository(_)));
    assert_eq!(repo.tickets().len(), 3);
}

#[tokio::test]
async fn generation_for_an_unknown_draw_fails() {
    let (_repo, tickets) = setup();
    let err = tickets.generate_tickets(DrawId::new(404), 5).await.unwrap_err();
    assert!(matches!(err, TicketError::DrawNotFound(_)));
}

#[tokio::test]
async fn booking_is_exclusive_and_release_resets_the_ticket() {
    let (repo, tickets) = setup();
    repo.insert(system_ticket(1));
    let (alice, bob) = (UserId::new(1), UserId::new(2));

    let booked = tickets.book_ticket(alice, TicketId::new(1)).await.unwrap();
    assert_eq!(booked.user_id, Some(alice));

    let err = tickets.book_ticket(bob, TicketId::new(1)).await.unwrap_err();
    assert!(matches!(err, TicketError::TicketUnavailable(_)));
    let err = tickets.book_ticket(bob, TicketId::new(9)).await.unwrap_err();
    assert!(matches!(err, TicketError::NotFound(_)));
    assert!(tickets.available_tickets().await.unwrap().is_empty());

    tickets.release_booking(TicketId::new(1)).await.unwrap();
    let released = repo.ticket(TicketId::new(1)).unwrap();
    assert_eq!(released.user_id, None);
    assert_eq!(released.status, TicketStatus::Pending);

    let err = tickets.release_booking(TicketId::new(9)).await.unwrap_err();
    assert!(matches!(err, TicketError::NotFound(_)));
}

#[tokio::test]
async fn winners_are_marked_and_reported() {
    let (repo, tickets) = setup();
    repo.insert(system_ticket(1));
    repo.insert(system_ticket(2));

    let err = tickets.set_winning_tickets(Vec::new()).await.unwrap_err();
    assert!(matches!(err, TicketError::NoTicketsSelected));

    let winners = tickets.set_winning_tickets(vec![TicketId::new(2)]).await.unwrap();
    assert_eq!(winners.len(), 1);
    assert_eq!(tickets.check_result(TicketId::new(2)).await.unwrap(), TicketStatus::Win);
    assert_eq!(tickets.check_result(TicketId::new(1)).await.unwrap(), TicketStatus::Pending);
}

#[tokio::test]
async fn activation_handler_generates_the_pool_and_ignores_other_events() {
    let (repo, tickets) = setup();
    let handler = DrawActivationHandler::new(Arc::clone(&tickets), 4);

    let mut draw = lottery::draw::Draw {
        id: ACTIVE_DRAW,
        lottery_type: five_from_36(),
        start_time: test_time(),
        end_time: test_time() + TimeDelta::hours(1),
        status: DrawStatus::Completed,
    };
    let completed = DrawEvent::new(DrawEventKind::DrawCompleted, draw.clone());
    handler.handle(&completed.to_json().unwrap()).await.unwrap();
    assert!(repo.tickets().is_empty());

    draw.status = DrawStatus::Active;
    let activated = DrawEvent::new(DrawEventKind::DrawActivated, draw);
    handler.handle(&activated.to_json().unwrap()).await.unwrap();
    assert_eq!(repo.tickets().len(), 4);

    let err = handler.handle(br#"{"type":"draw_activated","draw":"7"}"#).await.unwrap_err();
    assert!(matches!(err, HandlerError::Malformed(_)));
}

#[tokio::test]
async fn settlement_handler_releases_on_overdue_and_failure() {
    let (repo, tickets) = setup();
    let handler = InvoiceSettlementHandler::new(Arc::clone(&tickets));
    for id in 1..=2 {
        repo.insert(Ticket {
            user_id: Some(UserId::new(5)),
            ..system_ticket(id)
        });
    }

    handler
        .handle(&InvoiceEvent::overdue(TicketId::new(1)).to_json().unwrap())
        .await
        .unwrap();
    handler
        .handle(&InvoiceEvent::failure(TicketId::new(2)).to_json().unwrap())
        .await
        .unwrap();
    handler.handle(br#"{"type":"invoice_paid","ticket_id":1}"#).await.unwrap();

    assert!(repo.tickets().iter().all(Ticket::is_available));

    let err = handler
        .handle(&InvoiceEvent::overdue(TicketId::new(99)).to_json().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, HandlerError::Failed(_)));
}

#[tokio::test]
async fn activation_event_on_the_bus_fills_the_pool() {
    let (repo, tickets) = setup();
    let bus = InMemoryEventBus::new();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let consumer = EventConsumer::builder()
        .name("draw-activation")
        .channels(vec!["draw_events".to_string()])
        .event_bus(Arc::new(bus.clone()))
        .handler(Arc::new(DrawActivationHandler::new(tickets, 3)) as Arc<dyn EventHandler>)
        .shutdown(shutdown_rx)
        .retry_delay(Duration::from_millis(10))
        .build()
        .unwrap();
    let task = tokio::spawn(consumer.run());
    while bus.subscriber_count() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let draw = lottery::draw::Draw {
        id: ACTIVE_DRAW,
        lottery_type: five_from_36(),
        start_time: test_time(),
        end_time: test_time() + TimeDelta::hours(1),
        status: DrawStatus::Active,
    };
    let payload = DrawEvent::new(DrawEventKind::DrawActivated, draw).to_json().unwrap();
    bus.publish("draw_events", &payload).await.unwrap();

    for _ in 0..200 {
        if repo.tickets().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(repo.tickets().len(), 3);

    shutdown_tx.send(()).unwrap();
    assert!(task.await.unwrap().is_err());
}
