use std::{fs::OpenOptions, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware,
};
use axum_server::Handle;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use expense_recorder::{
    AppState, DEFAULT_MAX_DELIVERY_COUNT, DEFAULT_REDELIVERY_DELAY, QueryConfig, QueueState,
    build_router, graceful_shutdown, listen_for_messages, logging_middleware, open_connection,
    queue_channel, run_consumer,
};

/// The REST API server and queue consumer for UPI payment notifications.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The port to serve the API from.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// The port to accept newline-delimited queue messages on.
    ///
    /// The queue consumer only runs when this is set.
    #[arg(long)]
    queue_port: Option<u16>,

    /// How many times a queue message is delivered before it is dead-lettered.
    #[arg(long, default_value_t = DEFAULT_MAX_DELIVERY_COUNT)]
    max_delivery_count: u32,

    /// Milliseconds an abandoned queue message waits before it is delivered
    /// again, multiplied by how many times it has been delivered.
    #[arg(long, default_value_t = DEFAULT_REDELIVERY_DELAY.as_millis() as u64)]
    redelivery_delay_ms: u64,

    /// The number of expenses returned when a request does not set a limit.
    #[arg(long, default_value_t = 100)]
    default_limit: u32,

    /// File path to write debug logs to.
    #[arg(long, default_value = "debug.log")]
    log_path: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    setup_logging(&args.log_path);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));

    let conn = open_connection(&args.db_path).expect("Could not open the database");
    let state = AppState::new(
        conn,
        QueryConfig {
            default_limit: args.default_limit,
        },
    )
    .expect("Could not initialize the database");

    if let Some(queue_port) = args.queue_port {
        let redelivery_delay = Duration::from_millis(args.redelivery_delay_ms);
        start_queue(&state, queue_port, args.max_delivery_count, redelivery_delay).await;
    }

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = build_router(state).layer(middleware::from_fn(logging_middleware));
    let router = add_tracing_layer(router);

    tracing::info!("HTTP server listening on {}", addr);
    axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .expect("The server stopped unexpectedly");
}

/// Spawn the queue listener and the consumer that records its messages.
async fn start_queue(
    state: &AppState,
    port: u16,
    max_delivery_count: u32,
    redelivery_delay: Duration,
) {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .expect("Could not bind the queue listener");

    let (broker, receiver) = queue_channel(max_delivery_count, redelivery_delay);
    let queue_state = QueueState {
        db_connection: state.db_connection.clone(),
    };

    tokio::spawn(run_consumer(queue_state, broker.clone(), receiver));
    tokio::spawn(async move {
        if let Err(error) = listen_for_messages(listener, broker).await {
            tracing::error!("Queue listener stopped: {error}");
        }
    });
}

fn setup_logging(log_path: &str) {
    let stdout_log = tracing_subscriber::fmt::layer().pretty();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .expect("Could not create log file");

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            stdout_log
                .with_filter(filter::LevelFilter::INFO)
                .and_then(debug_log)
                .with_filter(filter::LevelFilter::DEBUG),
        )
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // Errors are logged where they are handled.
        .on_failure(());

    router.layer(tracing_layer)
}
