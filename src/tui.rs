#![cfg(feature = "tui")]

use crate::backend::BackendError;
use crate::client::Client;
use crate::debounce::QueryDebouncer;
use crate::{app, config, suggest};
use anyhow::Context;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Terminal;
use std::io;
use tokio::sync::mpsc;

#[derive(Debug)]
enum ApplyMsg {
    Snapshot(String),
    Done(Result<String, BackendError>),
}

#[derive(Debug, Default)]
struct PickerState {
    query: String,
    entries: Vec<String>,
    selected: usize,
    loading: bool,
    error: Option<String>,
    /// Accumulated text of the transformation being applied, while one is.
    applying: Option<String>,
}

/// Interactive picker: type to steer the suggestion list, Enter to apply the
/// highlighted one. The final transformed text is printed on exit.
pub async fn run_picker(
    http: &reqwest::Client,
    cfg: Option<&config::Config>,
    model_override: Option<String>,
    text: Option<String>,
) -> anyhow::Result<()> {
    let selected_text = app::resolve_selected_text(text).await?;
    let client = app::build_client(http, cfg, model_override)?;
    let window = cfg
        .map(|c| c.debounce_window())
        .unwrap_or(crate::debounce::DEFAULT_WINDOW);

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let (ev_tx, ev_rx) = mpsc::unbounded_channel::<Event>();
    std::thread::spawn(move || loop {
        match crossterm::event::read() {
            Ok(ev) => {
                if ev_tx.send(ev).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });

    let res = picker_loop(&mut terminal, &client, &selected_text, window, ev_rx).await;

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    if let Some(final_text) = res? {
        println!("{final_text}");
    }
    Ok(())
}

async fn picker_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    client: &Client,
    selected_text: &str,
    window: std::time::Duration,
    mut ev_rx: mpsc::UnboundedReceiver<Event>,
) -> anyhow::Result<Option<String>> {
    let mut debouncer = QueryDebouncer::new(window);
    // Kick off the broad list for the empty query.
    debouncer.push("");

    let (res_tx, mut res_rx) = mpsc::unbounded_channel::<(u64, Result<String, BackendError>)>();
    let (apply_tx, mut apply_rx) = mpsc::unbounded_channel::<ApplyMsg>();

    let mut state = PickerState {
        loading: true,
        ..Default::default()
    };

    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(33));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                draw(terminal, client.model(), &state)?;
            }
            Some(ev) = ev_rx.recv() => {
                if let Event::Key(key) = ev {
                    if let Some(exit) = handle_key(
                        key, client, selected_text, &debouncer, &apply_tx, &mut state,
                    ) {
                        return Ok(exit);
                    }
                }
            }
            Some(settle) = debouncer.settled() => {
                state.loading = true;
                let prompt = suggest::suggestion_prompt(selected_text, &settle.text);
                let handle = client.submit(&prompt);
                let tx = res_tx.clone();
                let generation = settle.generation;
                tokio::spawn(async move {
                    let _ = tx.send((generation, handle.join().await));
                });
            }
            Some((generation, outcome)) = res_rx.recv() => {
                if !debouncer.is_current(generation) {
                    // A newer query settled while this one was in flight.
                    tracing::debug!(generation, "discarding stale suggestion result");
                } else {
                    state.loading = false;
                    match outcome {
                        Ok(listing) => {
                            state.entries = suggest::parse_suggestions(&listing);
                            state.selected = 0;
                            state.error = None;
                        }
                        Err(e) => {
                            state.entries.clear();
                            state.error = Some(format!("{e}"));
                        }
                    }
                }
            }
            Some(msg) = apply_rx.recv() => {
                match msg {
                    ApplyMsg::Snapshot(text) => {
                        state.applying = Some(text);
                    }
                    ApplyMsg::Done(Ok(final_text)) => {
                        return Ok(Some(final_text));
                    }
                    ApplyMsg::Done(Err(e)) => {
                        state.applying = None;
                        state.error = Some(format!("{e}"));
                    }
                }
            }
        }
    }
}

fn handle_key(
    key: KeyEvent,
    client: &Client,
    selected_text: &str,
    debouncer: &QueryDebouncer,
    apply_tx: &mpsc::UnboundedSender<ApplyMsg>,
    state: &mut PickerState,
) -> Option<Option<String>> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(None);
    }
    if key.code == KeyCode::Esc {
        return Some(None);
    }

    // One application at a time; everything except quitting waits for it.
    if state.applying.is_some() {
        return None;
    }

    match key.code {
        KeyCode::Char(c) => {
            state.query.push(c);
            debouncer.push(state.query.clone());
        }
        KeyCode::Backspace => {
            state.query.pop();
            debouncer.push(state.query.clone());
        }
        KeyCode::Up => {
            state.selected = state.selected.saturating_sub(1);
        }
        KeyCode::Down => {
            if !state.entries.is_empty() {
                state.selected = (state.selected + 1).min(state.entries.len() - 1);
            }
        }
        KeyCode::Enter => {
            if let Some(entry) = state.entries.get(state.selected) {
                start_apply(client, entry, selected_text, apply_tx);
                state.applying = Some(String::new());
            }
        }
        _ => {}
    }

    None
}

fn start_apply(
    client: &Client,
    suggestion: &str,
    selected_text: &str,
    apply_tx: &mpsc::UnboundedSender<ApplyMsg>,
) {
    let handle = client.submit(&suggest::apply_prompt(suggestion, selected_text));
    let mut partials = handle.observe();
    let tx = apply_tx.clone();

    tokio::spawn(async move {
        let forward = tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(snapshot) = partials.recv().await {
                if forward.send(ApplyMsg::Snapshot(snapshot)).is_err() {
                    return;
                }
            }
        });

        let outcome = handle.join().await;
        reader.await.ok();
        let _ = tx.send(ApplyMsg::Done(outcome));
    });
}

fn draw(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    model: &str,
    state: &PickerState,
) -> anyhow::Result<()> {
    terminal.draw(|f| {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(3)])
            .split(f.area());

        if let Some(partial) = &state.applying {
            let pane = Paragraph::new(partial.clone())
                .block(Block::default().borders(Borders::ALL).title("applying"))
                .wrap(Wrap { trim: false });
            f.render_widget(pane, rows[0]);
        } else {
            let items: Vec<ListItem> = state
                .entries
                .iter()
                .map(|e| ListItem::new(e.clone()))
                .collect();
            let title = if state.loading {
                format!("suggestions (loading) — model: {model}")
            } else {
                format!("suggestions — model: {model}")
            };
            let list = List::new(items)
                .block(Block::default().borders(Borders::ALL).title(title))
                .highlight_style(Style::default().add_modifier(Modifier::BOLD))
                .highlight_symbol("> ");
            let mut list_state = ListState::default();
            if !state.entries.is_empty() {
                list_state.select(Some(state.selected.min(state.entries.len() - 1)));
            }
            f.render_stateful_widget(list, rows[0], &mut list_state);
        }

        let input_title = match &state.error {
            Some(e) => format!("query — error: {e}"),
            None => "query".to_string(),
        };
        let input = Paragraph::new(state.query.clone())
            .block(Block::default().borders(Borders::ALL).title(input_title));
        f.render_widget(input, rows[1]);

        let x = rows[1].x + 1 + state.query.chars().count() as u16;
        let y = rows[1].y + 1;
        f.set_cursor_position((x.min(rows[1].x + rows[1].width.saturating_sub(2)), y));
    })?;
    Ok(())
}
