use crossterm::{
    cursor::{Hide, MoveToColumn, Show},
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Spinner frames, drawn after the current message
pub const FRAMES: [char; 4] = ['-', '\\', '|', '/'];

/// Redraw interval of the spinner
pub const TICK: Duration = Duration::from_millis(100);

/// Transient progress indicator.
///
/// Shows the latest announced message with a spinning character after it.
/// A new message finalizes the previous one as a plain line. On
/// cancellation the current message is finalized too, so the terminal is
/// left on a clean line.
pub(crate) async fn spin(mut messages: mpsc::UnboundedReceiver<String>, cancel: CancellationToken) {
    let mut stdout = std::io::stdout();
    let mut ticker = tokio::time::interval(TICK);
    let mut current = String::new();
    let mut frame = 0usize;

    let _ = queue!(stdout, Hide);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            message = messages.recv() => {
                let Some(message) = message else {
                    break;
                };
                finalize(&mut stdout, &current);
                current = message;
                frame = 0;
            }
            _ = ticker.tick() => {
                if !current.is_empty() {
                    let _ = queue!(
                        stdout,
                        MoveToColumn(0),
                        Clear(ClearType::CurrentLine),
                        Print(format!("{current} {}", FRAMES[frame % FRAMES.len()]))
                    );
                    let _ = stdout.flush();
                    frame += 1;
                }
            }
        }
    }

    while let Ok(message) = messages.try_recv() {
        finalize(&mut stdout, &current);
        current = message;
    }
    finalize(&mut stdout, &current);
    let _ = queue!(stdout, Show);
    let _ = stdout.flush();
}

fn finalize(stdout: &mut std::io::Stdout, message: &str) {
    if message.is_empty() {
        return;
    }
    let _ = queue!(
        stdout,
        MoveToColumn(0),
        Clear(ClearType::CurrentLine),
        Print(message),
        Print("\n")
    );
    let _ = stdout.flush();
}
