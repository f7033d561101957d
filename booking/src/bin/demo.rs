//! Seat booking walkthrough.
//!
//! Registers one event with ten seats, books three, asks for eight more (which
//! cannot fit), replays the first request and prints what happened.

use anyhow::Context;
use seatbook::{
    BookingEnvironment, Config, InMemoryBookingLedger, InMemoryInventoryStore, LocalEventBus,
    MockPaymentGateway, NotificationConsumer, ReservationCoordinator,
};
use seatbook_core::event_bus::EventBus;
use seatbook_core::{BookingRequest, EventId, IdempotencyKey, SystemClock, UserId};
use seatbook_runtime::MetricsServer;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut metrics = MetricsServer::new(
        config
            .metrics_address()
            .parse()
            .context("invalid metrics address")?,
    );
    metrics.start()?;

    let bus: Arc<dyn EventBus> = Arc::new(LocalEventBus::new());
    let coordinator = ReservationCoordinator::new(
        BookingEnvironment {
            inventory: Arc::new(InMemoryInventoryStore::new()),
            ledger: Arc::new(InMemoryBookingLedger::new()),
            payments: MockPaymentGateway::shared(),
            bus: Arc::clone(&bus),
            clock: Arc::new(SystemClock),
        },
        config.saga.clone(),
        &config.publisher,
    );

    let report = coordinator.recover_in_flight().await?;
    info!(recovered = report.recovered.len(), failed = report.failed.len(), "Startup recovery done");

    let notifications = Arc::new(NotificationConsumer::new());
    let consumer = Arc::clone(&notifications)
        .start(bus.as_ref(), &config.publisher.topic)
        .await?;

    let event_id = EventId::new();
    coordinator.inventory().register(event_id, 10).await?;

    let customer = UserId::new();
    let first = BookingRequest::new(IdempotencyKey::new("k1")?, customer, event_id, 3);
    let confirmed = coordinator.create_booking(first.clone()).await?;
    info!(booking_id = %confirmed.booking_id, status = %confirmed.status, "First booking");

    let too_many = BookingRequest::new(IdempotencyKey::new("k2")?, UserId::new(), event_id, 8);
    let rejected = coordinator.create_booking(too_many).await?;
    info!(
        status = %rejected.status,
        reason = ?rejected.reason.as_ref().map(ToString::to_string),
        "Second booking"
    );

    let replay = coordinator.create_booking(first).await?;
    info!(same_booking = replay == confirmed, "Replayed first request");

    info!(available = coordinator.get_available(event_id).await?, "Seats left");

    coordinator.publisher().flush().await;
    // Let the consumer drain what was just published
    tokio::task::yield_now().await;
    info!(notifications = notifications.notifications().len(), "Notifications queued");

    for booking in coordinator.list_bookings_by_user(customer).await? {
        info!(booking_id = %booking.booking_id, status = %booking.status, seats = booking.seats, "Customer booking");
    }

    if let Some(rendered) = metrics.render() {
        println!("{rendered}");
    }

    consumer.abort();
    Ok(())
}
