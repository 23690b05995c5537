//! Process wiring shared by the three service binaries.
//!
//! Each `run_*` function builds the service on top of the shared
//! infrastructure (metrics exporter, `PostgreSQL` pool, Redis transport),
//! spawns its periodic jobs or consumers on a [`Lifecycle`], and blocks until
//! Ctrl+C / SIGTERM or the first task failure.

use crate::config::Config;
use crate::draw::{DrawLifecycle, PgDrawRepository};
use crate::metrics::register_lottery_metrics;
use crate::payment::{MockPaymentGateway, PaymentService, PgInvoiceRepository};
use crate::ticket::{DrawActivationHandler, InvoiceSettlementHandler, PgTicketRepository, TicketService};
use anyhow::Context;
use lottery_core::environment::{Clock, SystemClock};
use lottery_core::event_bus::EventBus;
use lottery_redis::RedisEventBus;
use lottery_runtime::metrics::MetricsServer;
use lottery_runtime::{EventConsumer, EventHandler, Lifecycle, Scheduler, shutdown_signal};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global `tracing` subscriber: `RUST_LOG` filter (default
/// `info,lottery=debug,sqlx=warn`) and a `fmt` layer.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,lottery=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Connections every service needs.
struct Infrastructure {
    pool: PgPool,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
}

impl Infrastructure {
    async fn connect(config: &Config, lifecycle: &Lifecycle) -> anyhow::Result<Self> {
        MetricsServer::new(config.server.metrics_addr)
            .start()
            .context("starting metrics exporter")?;
        register_lottery_metrics();

        let pool = lottery_postgres::connect(&config.postgres.url, &config.pool_settings())
            .await
            .context("connecting to PostgreSQL")?;
        if config.postgres.run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("applying migrations")?;
            info!("Database migrations applied");
        }

        let closing = pool.clone();
        lifecycle.on_shutdown("postgres", move || {
            Box::pin(async move {
                closing.close().await;
                Ok(())
            })
        });

        let redis = RedisEventBus::connect(&config.redis.url)
            .await
            .context("connecting to Redis")?;
        redis.ping().await.context("pinging Redis")?;

        Ok(Self {
            pool,
            events: Arc::new(redis),
            clock: Arc::new(SystemClock),
        })
    }
}

fn scheduler(name: &str, interval_secs: u64, config: &Config) -> Scheduler {
    Scheduler::new(name, Duration::from_secs(interval_secs)).with_retry_policy(config.retry_policy())
}

/// Draw service: activation and completion sweeps.
///
/// # Errors
///
/// Startup failures, or the error of the first job that stopped.
pub async fn run_draw_service(config: Config) -> anyhow::Result<()> {
    let lifecycle = Lifecycle::new(config.shutdown_timeout());
    let infra = Infrastructure::connect(&config, &lifecycle).await?;

    let draws = Arc::new(
        DrawLifecycle::new(
            Arc::new(PgDrawRepository::new(infra.pool.clone())),
            Arc::clone(&infra.events),
            Arc::clone(&infra.clock),
            config.channels.draws.clone(),
        )
        .with_transaction_timeout(config.transaction_timeout()),
    );

    let activation = scheduler("draw-activation", config.scheduler.activation_interval, &config);
    let shutdown = lifecycle.subscribe_shutdown();
    let service = Arc::clone(&draws);
    lifecycle.spawn("draw-activation", async move {
        activation
            .run(shutdown, || {
                let service = Arc::clone(&service);
                async move { service.activate_draws().await.map(drop) }
            })
            .await
    });

    let completion = scheduler("draw-completion", config.scheduler.completion_interval, &config);
    let shutdown = lifecycle.subscribe_shutdown();
    let service = Arc::clone(&draws);
    lifecycle.spawn("draw-completion", async move {
        completion
            .run(shutdown, || {
                let service = Arc::clone(&service);
                async move { service.complete_draws().await.map(drop) }
            })
            .await
    });

    info!("Draw service running");
    lifecycle.run_until(shutdown_signal()).await?;
    Ok(())
}

/// Ticket service: draw-activation and invoice-settlement consumers.
///
/// # Errors
///
/// Startup failures, or the error of the first consumer that stopped.
pub async fn run_ticket_service(config: Config) -> anyhow::Result<()> {
    let lifecycle = Lifecycle::new(config.shutdown_timeout());
    let infra = Infrastructure::connect(&config, &lifecycle).await?;

    let tickets = Arc::new(
        TicketService::new(Arc::new(PgTicketRepository::new(infra.pool.clone())), Arc::clone(&infra.clock))
            .with_transaction_timeout(config.transaction_timeout()),
    );

    let consumers: [(&str, &String, Arc<dyn EventHandler>); 2] = [
        (
            "draw-activation",
            &config.channels.draws,
            Arc::new(DrawActivationHandler::new(Arc::clone(&tickets), config.tickets.per_draw)),
        ),
        (
            "invoice-settlement",
            &config.channels.invoices,
            Arc::new(InvoiceSettlementHandler::new(Arc::clone(&tickets))),
        ),
    ];

    for (name, channel, handler) in consumers {
        let consumer = EventConsumer::builder()
            .name(name)
            .channels(vec![channel.clone()])
            .event_bus(Arc::clone(&infra.events))
            .handler(handler)
            .shutdown(lifecycle.subscribe_shutdown())
            .retry_delay(config.consumer_retry_delay())
            .build()?;
        lifecycle.spawn(name, consumer.run());
    }

    info!("Ticket service running");
    lifecycle.run_until(shutdown_signal()).await?;
    Ok(())
}

/// Payment service: overdue-invoice sweep.
///
/// Tickets are booked through a [`TicketService`] on the same database.
///
/// # Errors
///
/// Startup failures, or the error of the sweep once it stopped.
pub async fn run_payment_service(config: Config) -> anyhow::Result<()> {
    let lifecycle = Lifecycle::new(config.shutdown_timeout());
    let infra = Infrastructure::connect(&config, &lifecycle).await?;

    let booking = Arc::new(
        TicketService::new(Arc::new(PgTicketRepository::new(infra.pool.clone())), Arc::clone(&infra.clock))
            .with_transaction_timeout(config.transaction_timeout()),
    );
    let payments = Arc::new(
        PaymentService::new(
            Arc::new(PgInvoiceRepository::new(infra.pool.clone())),
            booking,
            Arc::new(MockPaymentGateway::new(config.payment.mock_failure_rate)),
            Arc::clone(&infra.events),
            Arc::clone(&infra.clock),
            config.payment_settings(),
        )
        .with_transaction_timeout(config.transaction_timeout()),
    );

    let sweep = scheduler("invoice-sweep", config.scheduler.invoice_sweep_interval, &config);
    let shutdown = lifecycle.subscribe_shutdown();
    lifecycle.spawn("invoice-sweep", async move {
        sweep
            .run(shutdown, || {
                let payments = Arc::clone(&payments);
                async move {
                    let marked = payments.process_invoices().await?;
                    info!(marked, "Overdue sweep finished");
                    Ok::<_, crate::payment::PaymentError>(())
                }
            })
            .await
    });

    info!("Payment service running");
    lifecycle.run_until(shutdown_signal()).await?;
    Ok(())
}
