//! Walks an `order.paid` event through middleware, three handlers (one of
//! which fails) and the dead-letter sink.
//!
//! Run with `RUST_LOG=fault_isolated_events=trace` to see every dispatch step.

use fault_isolated_events::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct OrderPaid {
    order_id: u64,
    amount_cents: u64,
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fault_isolated_events=debug")),
        )
        .init();

    let bus = EventBus::builder()
        .dead_letter_capacity(100)
        .use_middleware(FnMiddleware::with_name(
            |mut ctx: ExecutionContext| {
                ctx.metadata_mut().set_source("checkout-service");
                Some(ctx)
            },
            "tag-source",
        ))
        .use_middleware(FnMiddleware::with_name(
            |mut ctx: ExecutionContext| {
                if ctx.event().payload()["amount_cents"] == 0 {
                    ctx.cancel_with_reason("nothing was charged");
                }
                Some(ctx)
            },
            "skip-free-orders",
        ))
        .build()?;

    bus.subscribe_handler(
        "order.paid",
        TypedHandler::with_name(
            |order: OrderPaid| Ok(format!("receipt for order {} sent", order.order_id)),
            "send-receipt",
        ),
        10,
    );
    bus.subscribe_handler(
        "order.paid",
        FunctionHandler::with_name(|_: &Event| Err(HandlerError::new("ledger offline")), "ledger"),
        5,
    );
    bus.subscribe_typed(
        "order.paid",
        |order: OrderPaid| Ok(json!({ "revenue_cents": order.amount_cents })),
        0,
    );

    let snapshot = bus.emit("order.paid", json!({ "order_id": 42, "amount_cents": 1299 }))?;
    println!("order 42: {}", snapshot.outcome());
    for result in snapshot.results() {
        println!("  ok    {:<16} -> {}", result.handler_name, result.value);
    }
    for failure in snapshot.errors() {
        println!("  error {:<16} -> {}", failure.handler_name, failure.error);
    }

    let free = bus.emit("order.paid", json!({ "order_id": 43, "amount_cents": 0 }))?;
    println!(
        "order 43: {} ({})",
        free.outcome(),
        free.cancel_reason().unwrap_or("no reason")
    );

    bus.emit("order.refunded", json!({ "order_id": 42 }))?;

    println!("dead letters:");
    for letter in bus.dead_letters().drain(10) {
        let event = letter.snapshot().event();
        println!(
            "  {:<15} {} {} at {}",
            letter.category(),
            event.event_type(),
            event.id(),
            letter.recorded_at()
        );
    }

    println!("{}", bus.stats());
    Ok(())
}
