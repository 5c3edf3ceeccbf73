//! Command-line interface and REPL
//!
//! Lines typed at the prompt are dispatched like protocol frames. The
//! surrounding `<` `>` are optional.

use crate::protocol::ProtocolDispatcher;
use anyhow::Result;
use rustyline::DefaultEditor;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

const PROMPT: &str = "station> ";

/// Strip optional frame delimiters, `None` for blank input
fn normalize_line(line: &str) -> Option<&str> {
    let line = line.trim();
    let line = line
        .strip_prefix('<')
        .and_then(|l| l.strip_suffix('>'))
        .unwrap_or(line)
        .trim();
    (!line.is_empty()).then_some(line)
}

/// Run one line, returns the reply followed by the notifications it produced
async fn execute(
    dispatcher: &ProtocolDispatcher,
    notifications: &mut broadcast::Receiver<String>,
    line: &str,
) -> Vec<String> {
    let mut out = Vec::new();
    let reply = dispatcher.process(line).await;
    if !reply.is_empty() {
        out.push(reply);
    }
    loop {
        match notifications.try_recv() {
            Ok(notification) => out.push(notification),
            Err(TryRecvError::Lagged(n)) => debug!("REPL skipped {} notification(s)", n),
            Err(_) => break,
        }
    }
    out
}

pub async fn run_repl(
    dispatcher: Arc<ProtocolDispatcher>,
    mut notifications: broadcast::Receiver<String>,
) -> Result<()> {
    let (line_tx, mut line_rx) = mpsc::channel::<(String, oneshot::Sender<()>)>(1);

    let mut rl = DefaultEditor::new()?;

    // rustyline blocks, so the editor lives on its own thread and waits for
    // each line to be handled before printing the next prompt. The thread is
    // detached so a pending readline does not hold up runtime shutdown.
    std::thread::spawn(move || {
        loop {
            let line = match rl.readline(PROMPT) {
                Ok(line) => line,
                Err(_) => break,
            };
            if line.trim() == "exit" || line.trim() == "quit" {
                break;
            }
            let _ = rl.add_history_entry(line.as_str());

            let (done_tx, done_rx) = oneshot::channel();
            if line_tx.blocking_send((line, done_tx)).is_err() {
                break;
            }
            let _ = done_rx.blocking_recv();
        }
    });

    while let Some((line, done)) = line_rx.recv().await {
        if let Some(command) = normalize_line(&line) {
            for out in execute(&dispatcher, &mut notifications, command).await {
                println!("{}", out);
            }
        }
        let _ = done.send(());
    }

    Ok(())
}
