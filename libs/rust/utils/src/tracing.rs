use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const QUIET_TARGETS: &[&str] = &[
    "hyper_util",
    "reqwest",
    "reqwest_retry",
    "alloy_rpc_client",
    "alloy_transport_http",
    "sqlx",
];

pub fn setup_tracing() {
    let mut filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    for target in QUIET_TARGETS {
        if let Ok(directive) = format!("{target}=off").parse() {
            filter_layer = filter_layer.add_directive(directive);
        }
    }

    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    install_panic_hook();
}

/// Routes panics from any task through `tracing` so they land in the same log stream.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = backtrace::Backtrace::new();
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        capture_panic_details(info.payload(), &location, &backtrace);
    }));
}

fn capture_panic_details(
    payload: &(dyn std::any::Any + Send),
    location: &str,
    backtrace: &backtrace::Backtrace,
) {
    if let Some(s) = payload.downcast_ref::<&str>() {
        error!(panic_message = *s, location, backtrace = ?backtrace, "Panic occurred with message");
    } else if let Some(s) = payload.downcast_ref::<String>() {
        error!(panic_message = s, location, backtrace = ?backtrace, "Panic occurred with message");
    } else {
        error!(location, backtrace = ?backtrace, "Panic occurred but the payload is not a string");
    }
}

pub async fn shutdown_tracing() {
    // stdout is line buffered; give in-flight writes a moment before exit
    tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
}
