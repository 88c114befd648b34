//! Helpers for driving a controller through a `MemoryTerminalHost`

use std::sync::Arc;
use std::time::Duration;

use super::{BootstrapTarget, InterruptPolicy, SessionConfig, SessionController};
use crate::terminal::{MemoryTerminal, MemoryTerminalHost};

pub(crate) const BANNER: &str = "ManimGL v1.7.2\n";

pub(crate) fn test_config() -> SessionConfig {
    SessionConfig {
        startup_timeout: Duration::from_secs(3),
        startup_progress_slice: Duration::from_millis(20),
        interrupt_settle: Duration::from_millis(10),
        clipboard_restore: Duration::from_millis(10),
        ..Default::default()
    }
    .with_interrupt_policy(InterruptPolicy::Cooperative)
}

pub(crate) fn target() -> BootstrapTarget {
    BootstrapTarget::new("/tmp/scenes/intro.py", "Intro", Some(5))
}

pub(crate) fn controller_with(config: SessionConfig) -> (Arc<SessionController>, Arc<MemoryTerminalHost>) {
    let host = Arc::new(MemoryTerminalHost::new());
    let controller = SessionController::new(host.clone(), config);
    (controller, host)
}

/// Poll until `condition` holds, panicking after two seconds
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Wait for the `index`-th terminal to receive its `count`-th text
pub(crate) async fn terminal_with_sent(
    host: &MemoryTerminalHost,
    index: usize,
    count: usize,
) -> Arc<MemoryTerminal> {
    eventually(|| {
        host.terminals()
            .get(index)
            .is_some_and(|t| t.sent().len() >= count)
    })
    .await;
    host.terminals()[index].clone()
}

/// Bootstrap a session and bring it to prompt 1
pub(crate) async fn start_active(
    controller: &Arc<SessionController>,
    host: &MemoryTerminalHost,
) -> Arc<MemoryTerminal> {
    let index = host.terminals().len();
    let task = tokio::spawn({
        let controller = controller.clone();
        async move { controller.bootstrap_explicit(&target(), false).await }
    });
    let terminal = terminal_with_sent(host, index, 1).await;
    terminal.emit_output(BANNER);
    terminal.emit_output("In [1]: ");
    task.await.unwrap().unwrap();
    terminal
}
