//! Progress indicator decorating long-running remote calls.
//!
//! The animation runs as a background task and only starts drawing once the
//! call has been pending for [`START_DELAY`], so fast round-trips never flicker.

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    cursor::MoveToColumn,
    execute,
    terminal::{Clear, ClearType},
};
use is_terminal::IsTerminal;
use tokio::{sync::oneshot, task::JoinHandle, time};

const FRAMES: [&str; 8] = ["⠏", "⠛", "⠹", "⢸", "⣰", "⣤", "⣆", "⡇"];
pub const START_DELAY: Duration = Duration::from_millis(200);
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

type MakeWriter = Arc<dyn Fn() -> Box<dyn Write + Send> + Send + Sync>;

/// Where progress indicators are drawn. Cloning shares the destination.
#[derive(Clone, Default)]
pub struct Progress {
    make_writer: Option<MakeWriter>,
}

impl Progress {
    pub fn hidden() -> Self {
        Self::default()
    }

    /// Draws on stderr, or nowhere when stderr is not a terminal.
    pub fn stderr() -> Self {
        if !io::stderr().is_terminal() {
            return Self::hidden();
        }
        Self { make_writer: Some(Arc::new(|| -> Box<dyn Write + Send> { Box::new(io::stderr()) })) }
    }

    pub fn to_writer<W: Write + Clone + Send + Sync + 'static>(out: W) -> Self {
        Self { make_writer: Some(Arc::new(move || -> Box<dyn Write + Send> { Box::new(out.clone()) })) }
    }

    pub fn start(&self, label: &str) -> Spinner {
        match &self.make_writer {
            Some(make) => Spinner::start_with(label, make()),
            None => Spinner::disabled(),
        }
    }

    /// Awaits `fut` while a spinner labelled `label` is shown.
    pub async fn decorate<F: Future>(&self, label: &str, fut: F) -> F::Output {
        let spinner = self.start(label);
        let output = fut.await;
        spinner.stop().await;
        output
    }
}

pub struct Spinner {
    done: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Spinner {
    pub fn start_with<W: Write + Send + 'static>(label: &str, out: W) -> Self {
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(animate(label.to_string(), rx, out));
        Self { done: Some(tx), task: Some(task) }
    }

    pub fn disabled() -> Self {
        Self { done: None, task: None }
    }

    /// Signals completion and waits until the line has been cleared.
    pub async fn stop(mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

async fn animate<W: Write>(label: String, mut done: oneshot::Receiver<()>, mut out: W) {
    tokio::select! {
        _ = &mut done => return,
        _ = time::sleep(START_DELAY) => {}
    }

    let mut ticker = time::interval(FRAME_INTERVAL);
    ticker.tick().await;
    for frame in FRAMES.iter().cycle() {
        let _ = write!(out, "\r{label} {frame}");
        let _ = out.flush();
        tokio::select! {
            _ = &mut done => break,
            _ = ticker.tick() => {}
        }
    }
    let _ = execute!(out, MoveToColumn(0), Clear(ClearType::CurrentLine));
}
