use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const DEFAULT_WINDOW: Duration = Duration::from_millis(1000);

#[derive(Debug)]
enum State {
    Idle,
    Pending { value: String, deadline: Instant },
    Settled,
}

/// Debounce state machine, driven by a monotonic clock the caller supplies.
///
/// A changed input (re)arms a quiet-period deadline from any state; the value
/// settles once the deadline passes with no further change.
#[derive(Debug)]
pub struct DebounceMachine {
    window: Duration,
    state: State,
}

impl DebounceMachine {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: State::Idle,
        }
    }

    /// Record a changed input value.
    pub fn input(&mut self, value: impl Into<String>, now: Instant) {
        self.state = State::Pending {
            value: value.into(),
            deadline: now + self.window,
        };
    }

    /// The instant the pending value settles, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            State::Pending { deadline, .. } => Some(*deadline),
            State::Idle | State::Settled => None,
        }
    }

    /// Settle the pending value if its quiet period has elapsed.
    pub fn fire(&mut self, now: Instant) -> Option<String> {
        let due = matches!(&self.state, State::Pending { deadline, .. } if now >= *deadline);
        if !due {
            return None;
        }
        match std::mem::replace(&mut self.state, State::Settled) {
            State::Pending { value, .. } => Some(value),
            State::Idle | State::Settled => None,
        }
    }
}

/// A settled query plus the generation it was issued under.
#[derive(Debug, Clone)]
pub struct SettledQuery {
    pub text: String,
    pub generation: u64,
}

/// Coalesces a rapidly-changing query into settle events.
///
/// Each settle gets a fresh generation number; a consumer applies a request's
/// result only while its generation is still the current one, so a slow stale
/// request can never clobber a newer one.
pub struct QueryDebouncer {
    input_tx: mpsc::UnboundedSender<String>,
    settled_rx: mpsc::UnboundedReceiver<SettledQuery>,
    generation: Arc<AtomicU64>,
}

impl QueryDebouncer {
    pub fn new(window: Duration) -> Self {
        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
        let (settled_tx, settled_rx) = mpsc::unbounded_channel::<SettledQuery>();
        let generation = Arc::new(AtomicU64::new(0));
        let issued = generation.clone();

        tokio::spawn(async move {
            let mut machine = DebounceMachine::new(window);
            loop {
                tokio::select! {
                    changed = input_rx.recv() => {
                        match changed {
                            Some(value) => machine.input(value, Instant::now()),
                            None => return,
                        }
                    }
                    _ = wait_until(machine.deadline()) => {
                        if let Some(text) = machine.fire(Instant::now()) {
                            let generation = issued.fetch_add(1, Ordering::SeqCst) + 1;
                            if settled_tx.send(SettledQuery { text, generation }).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Self {
            input_tx,
            settled_rx,
            generation,
        }
    }

    /// Feed the latest query value; rearms the quiet period.
    pub fn push(&self, query: impl Into<String>) {
        let _ = self.input_tx.send(query.into());
    }

    /// The next settle event.
    pub async fn settled(&mut self) -> Option<SettledQuery> {
        self.settled_rx.recv().await
    }

    /// Latest issued generation.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether a result stamped with `generation` is still authoritative.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.current_generation()
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
