// ── Console message printer ──
//
// A background task that drains a message source into a writer. When the
// source has nothing, the task sleeps for the idle interval; the sleep is
// raced against a cancellation token so `quit()` takes effect at once.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use zymbit_api::InboundMessage;

use crate::error::CoreError;

pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(1);

// ── Sources ─────────────────────────────────────────────────────────

/// Result of a single non-blocking poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePoll {
    Message(String),
    Idle,
    /// The source will never produce again.
    Closed,
}

/// Something the printer can poll for lines.
pub trait MessageSource: Send + 'static {
    fn poll_message(&mut self) -> SourcePoll;
}

impl MessageSource for broadcast::Receiver<Arc<InboundMessage>> {
    fn poll_message(&mut self) -> SourcePoll {
        use broadcast::error::TryRecvError;

        loop {
            match self.try_recv() {
                Ok(msg) => return SourcePoll::Message(format_message(&msg)),
                Err(TryRecvError::Empty) => return SourcePoll::Idle,
                Err(TryRecvError::Closed) => return SourcePoll::Closed,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "printer fell behind, messages dropped");
                }
            }
        }
    }
}

impl MessageSource for mpsc::Receiver<String> {
    fn poll_message(&mut self) -> SourcePoll {
        use mpsc::error::TryRecvError;

        match self.try_recv() {
            Ok(line) => SourcePoll::Message(line),
            Err(TryRecvError::Empty) => SourcePoll::Idle,
            Err(TryRecvError::Disconnected) => SourcePoll::Closed,
        }
    }
}

/// `[HH:MM:SS] payload`, local time.
pub fn format_message(msg: &InboundMessage) -> String {
    let at = msg.received_at.with_timezone(&chrono::Local);
    format!("[{}] {msg}", at.format("%H:%M:%S"))
}

// ── State ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PrinterState {
    Running = 0,
    Stopping = 1,
    Terminated = 2,
}

impl PrinterState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::Stopping,
            _ => Self::Terminated,
        }
    }
}

// ── Printer ─────────────────────────────────────────────────────────

pub struct Printer;

impl Printer {
    /// Start printing `source` into `sink` on a new task.
    pub fn spawn<S, W>(
        source: S,
        sink: W,
        idle: Duration,
        cancel: CancellationToken,
    ) -> PrinterHandle
    where
        S: MessageSource,
        W: Write + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(PrinterState::Running as u8));
        let task = tokio::spawn(print_loop(source, sink, idle, cancel.clone(), state.clone()));

        PrinterHandle {
            state,
            cancel,
            task,
        }
    }
}

async fn print_loop<S: MessageSource, W: Write>(
    mut source: S,
    mut sink: W,
    idle: Duration,
    cancel: CancellationToken,
    state: Arc<AtomicU8>,
) -> Result<(), CoreError> {
    let result = loop {
        if cancel.is_cancelled() {
            break Ok(());
        }

        match source.poll_message() {
            SourcePoll::Message(line) => {
                if let Err(e) = writeln!(sink, "{line}").and_then(|()| sink.flush()) {
                    break Err(CoreError::Stream {
                        message: format!("write failed: {e}"),
                    });
                }
            }
            SourcePoll::Idle => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break Ok(()),
                    () = tokio::time::sleep(idle) => {}
                }
            }
            SourcePoll::Closed => {
                tracing::debug!("message source closed");
                break Ok(());
            }
        }
    };

    state.store(PrinterState::Terminated as u8, Ordering::Release);
    tracing::debug!("printer terminated");
    result
}

/// Control handle for a running printer.
pub struct PrinterHandle {
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), CoreError>>,
}

impl PrinterHandle {
    /// Ask the printer to stop. Idempotent.
    pub fn quit(&self) {
        let _ = self.state.compare_exchange(
            PrinterState::Running as u8,
            PrinterState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.cancel.cancel();
    }

    pub fn state(&self) -> PrinterState {
        PrinterState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to end.
    pub async fn join(self) -> Result<(), CoreError> {
        self.task
            .await
            .map_err(|e| CoreError::Internal(format!("printer task failed: {e}")))?
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::time::Instant;

    use pretty_assertions::assert_eq;

    use super::*;

    /// Cloneable in-memory sink.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn prints_queued_lines_in_order() {
        let (tx, rx) = mpsc::channel(8);
        tx.send("one".to_owned()).await.unwrap();
        tx.send("two".to_owned()).await.unwrap();
        drop(tx);

        let buf = SharedBuf::default();
        let handle = Printer::spawn(rx, buf.clone(), DEFAULT_IDLE_INTERVAL, CancellationToken::new());
        handle.join().await.unwrap();

        assert_eq!(buf.contents(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn quit_interrupts_idle_sleep() {
        let (_tx, rx) = mpsc::channel::<String>(8);
        let handle = Printer::spawn(
            rx,
            SharedBuf::default(),
            Duration::from_secs(30),
            CancellationToken::new(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.state(), PrinterState::Running);

        let started = Instant::now();
        handle.quit();
        assert_ne!(handle.state(), PrinterState::Running);
        handle.join().await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn state_reaches_terminated() {
        let (_tx, rx) = mpsc::channel::<String>(8);
        let handle = Printer::spawn(rx, SharedBuf::default(), Duration::from_millis(10), CancellationToken::new());
        handle.quit();
        handle.quit();

        while !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(handle.state(), PrinterState::Terminated);
    }

    #[tokio::test]
    async fn external_cancel_stops_printer() {
        let cancel = CancellationToken::new();
        let (_tx, rx) = mpsc::channel::<String>(8);
        let handle = Printer::spawn(rx, SharedBuf::default(), Duration::from_secs(30), cancel.clone());

        cancel.cancel();
        handle.join().await.unwrap();
    }

    #[tokio::test]
    async fn broadcast_source_formats_with_timestamp() {
        let (tx, rx) = broadcast::channel(8);
        tx.send(Arc::new(InboundMessage::from_frame(r#"{"temp":21.5}"#)))
            .unwrap();
        tx.send(Arc::new(InboundMessage::from_frame("hello"))).unwrap();
        drop(tx);

        let buf = SharedBuf::default();
        let handle = Printer::spawn(rx, buf.clone(), Duration::from_millis(10), CancellationToken::new());
        handle.join().await.unwrap();

        let out = buf.contents();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with(r#"] {"temp":21.5}"#));
        assert!(lines[1].ends_with("] hello"));
    }

    #[test]
    fn lagged_receiver_skips_to_oldest_retained() {
        let (tx, mut rx) = broadcast::channel(2);
        for i in 0..4 {
            tx.send(Arc::new(InboundMessage::from_frame(&i.to_string())))
                .unwrap();
        }

        match rx.poll_message() {
            SourcePoll::Message(line) => assert!(line.ends_with("] 2")),
            other => panic!("expected message, got {other:?}"),
        }
    }
}
