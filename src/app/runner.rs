//! Application runner
//!
//! Entry point for the `manim-notebook` binary: logging, the initial start,
//! the stdin command loop and shutdown on signals.

use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::Layer;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use super::core::NotebookApp;
use super::handlers::{CommandContext, ReplCommand, parse_command};
use crate::cli::{Cli, LogFormat};
use crate::session::{SessionController, SessionEvent};
use crate::tracing::ErrorTraceExt;

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

/// Build an EnvFilter based on CLI args and RUST_LOG environment variable
///
/// Priority: RUST_LOG environment variable > CLI arguments (-v, -vv, -q)
fn build_env_filter(cli: &Cli) -> tracing_subscriber::EnvFilter {
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        if !rust_log.is_empty() {
            return tracing_subscriber::EnvFilter::new(rust_log);
        }
    }

    let level = cli.log_level();
    tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into())
}

fn build_fmt_layer(format: LogFormat, writer: BoxMakeWriter) -> BoxedLayer {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false);
    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Initialize logging based on CLI arguments
///
/// Diagnostic mode logs to a file; otherwise logs go to stderr so they do
/// not mix with ManimGL output on stdout.
fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let writer = if cli.is_diagnostic() {
        let log_path = cli.log_path();
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(&log_path)?;
        eprintln!("Diagnostic mode: logging to {}", log_path.display());
        BoxMakeWriter::new(std::sync::Mutex::new(file))
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    tracing_subscriber::registry()
        .with(build_fmt_layer(cli.log_format, writer))
        .with(build_env_filter(cli))
        .init();
    Ok(())
}

/// Run the notebook driver with CLI arguments
pub async fn run_with_cli(cli: &Cli) -> anyhow::Result<()> {
    let startup_time = std::time::Instant::now();
    init_logging(cli)?;

    tracing::info!(
        version = %env!("CARGO_PKG_VERSION"),
        pid = %std::process::id(),
        diagnostic = cli.is_diagnostic(),
        "========== ManimGL notebook starting =========="
    );

    let app = NotebookApp::new(cli).await?;
    let printer = tokio::spawn(print_events(app.controller().clone()));

    if !cli.no_start {
        spawn_command(
            app.context(),
            ReplCommand::Start {
                line: cli.cursor_line(),
                whole_scene: cli.whole_scene,
            },
        );
    }
    tracing::info!(
        elapsed_ms = startup_time.elapsed().as_millis(),
        file = %app.file().display(),
        "Ready for commands on stdin"
    );

    let result = tokio::select! {
        result = read_commands(&app) => result,
        () = shutdown_signal() => Ok(()),
    };

    app.shutdown().await;
    printer.abort();
    tracing::info!(
        uptime_secs = startup_time.elapsed().as_secs(),
        "========== ManimGL notebook stopped =========="
    );
    result
}

async fn read_commands(app: &NotebookApp) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(ReplCommand::Quit)) => break,
            Ok(Some(command)) => spawn_command(app.context(), command),
            Err(e) => eprintln!("{e}"),
        }
    }
    Ok(())
}

/// Commands run on their own task so a long preview does not block input
fn spawn_command(context: CommandContext, command: ReplCommand) {
    tokio::spawn(async move {
        match context.run(command).await {
            Ok(Some(message)) => eprintln!("{message}"),
            Ok(None) => {}
            Err(e) => {
                e.trace_error();
                eprintln!("{e}");
            }
        }
    });
}

/// Mirror session output to stdout and lifecycle events to stderr
async fn print_events(controller: std::sync::Arc<SessionController>) {
    let mut events = controller.event_stream();
    let mut stdout = tokio::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            SessionEvent::Data(text) => {
                if stdout.write_all(text.as_bytes()).await.is_err() {
                    break;
                }
                drop(stdout.flush().await);
            }
            SessionEvent::StartupProgress { elapsed, timeout } => {
                tracing::debug!(
                    elapsed_ms = elapsed.as_millis(),
                    timeout_ms = timeout.as_millis(),
                    "Waiting for ManimGL"
                );
            }
            SessionEvent::StartFailed { reason } => eprintln!("ManimGL failed to start: {reason}"),
            SessionEvent::ErrorDetected { cell, line } => {
                eprintln!("Error in cell {cell}, line {line}");
            }
            SessionEvent::SessionEnded { exit_code } => match exit_code {
                Some(code) => eprintln!("ManimGL exited with code {code}"),
                None => eprintln!("ManimGL exited"),
            },
            other => tracing::trace!(event = ?other, "Session event"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received SIGINT, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM, shutting down");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_and_text_layers_build() {
        drop(build_fmt_layer(LogFormat::Text, BoxMakeWriter::new(std::io::sink)));
        drop(build_fmt_layer(LogFormat::Json, BoxMakeWriter::new(std::io::sink)));
    }

    #[test]
    #[serial_test::serial]
    fn test_rust_log_overrides_verbosity() {
        // SAFETY: tests touching the environment are serialized
        unsafe { std::env::set_var("RUST_LOG", "manim_notebook=trace") };
        let filter = build_env_filter(&Cli {
            quiet: true,
            ..Default::default()
        });
        unsafe { std::env::remove_var("RUST_LOG") };
        assert_eq!(filter.to_string(), "manim_notebook=trace");
    }
}
