//! Dashboard TUI for Mint Bot
//!
//! Architecture:
//! - UI Layer: TUI rendering, keyboard input
//! - Data Layer: the mint loop runs in its own task; the UI reads the event
//!   log, balance channel and run state each frame
//! - TuiUpdate: results of background work started from the UI

use std::{
    io::{self, Stdout},
    ops::Range,
    time::{Duration, Instant},
};

use alloy::primitives::Address;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame, Terminal,
};

use mint_core::target::parse_address;
use mint_core::{BalanceSnapshot, LogEntry, LoopPhase, RunState};

// =============================================================================
// TUI Update Messages (background tasks → TUI)
// =============================================================================

#[derive(Debug, Clone)]
pub enum TuiUpdate {
    /// Independent balance refresh finished
    BalancesRefreshed(BalanceSnapshot),
    /// Something the user should see in the status line
    Status { message: String, is_error: bool },
}

// =============================================================================
// App State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    EditingToken,
}

/// What the main loop should do after a key press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputResult {
    Continue,
    Quit,
    Start,
    Stop,
    /// Token field committed with Enter
    ApplyToken(String),
}

pub struct App {
    pub running: bool,

    // Connection info
    pub rpc_url: String,
    pub account: Option<Address>,

    // Controller view, refreshed every frame
    pub run_state: RunState,
    pub phase: LoopPhase,
    pub last_confirmed: Option<u64>,
    pub balances: BalanceSnapshot,
    pub log: Vec<LogEntry>,

    // Token editing
    pub token_input: String,
    /// Value restored when editing is cancelled
    token_committed: String,
    pub mode: InputMode,

    pub status: Option<(String, bool, Instant)>,
}

impl App {
    pub fn new(rpc_url: &str, account: Option<Address>, token: Option<&str>) -> Self {
        let token = token.unwrap_or_default().to_string();
        Self {
            running: true,
            rpc_url: rpc_url.to_string(),
            account,
            run_state: RunState::Idle,
            phase: LoopPhase::Halted,
            last_confirmed: None,
            balances: BalanceSnapshot::default(),
            log: Vec::new(),
            token_input: token.clone(),
            token_committed: token,
            mode: InputMode::Normal,
            status: None,
        }
    }

    pub fn apply_update(&mut self, update: TuiUpdate) {
        match update {
            TuiUpdate::BalancesRefreshed(snapshot) => {
                if self.accept_balances(snapshot) {
                    self.set_status("Balances refreshed".to_string(), false);
                }
            }
            TuiUpdate::Status { message, is_error } => self.set_status(message, is_error),
        }
    }

    /// Show a snapshot only if it was queried for the token currently set.
    /// A run keeps refreshing the token it started with after an edit.
    pub fn accept_balances(&mut self, snapshot: BalanceSnapshot) -> bool {
        let current = parse_address(self.token()).ok();
        if current != Some(snapshot.token_address) {
            return false;
        }
        self.balances = snapshot;
        true
    }

    pub fn push_log(&mut self, entries: Vec<LogEntry>) {
        self.log.extend(entries);
    }

    pub fn set_status(&mut self, message: String, is_error: bool) {
        self.status = Some((message, is_error, Instant::now()));
    }

    /// Committed token text (what a start() would use)
    pub fn token(&self) -> &str {
        &self.token_committed
    }

    pub fn can_start(&self) -> bool {
        self.run_state != RunState::Running
    }

    pub fn can_stop(&self) -> bool {
        self.run_state == RunState::Running
    }

    /// Apply one key press to the app state
    pub fn handle_key(&mut self, code: KeyCode) -> InputResult {
        match self.mode {
            InputMode::EditingToken => match code {
                KeyCode::Enter => {
                    self.mode = InputMode::Normal;
                    self.token_committed = self.token_input.trim().to_string();
                    self.token_input = self.token_committed.clone();
                    InputResult::ApplyToken(self.token_committed.clone())
                }
                KeyCode::Esc => {
                    self.mode = InputMode::Normal;
                    self.token_input = self.token_committed.clone();
                    InputResult::Continue
                }
                KeyCode::Backspace => {
                    self.token_input.pop();
                    InputResult::Continue
                }
                KeyCode::Char(c) => {
                    self.token_input.push(c);
                    InputResult::Continue
                }
                _ => InputResult::Continue,
            },
            InputMode::Normal => match code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    self.running = false;
                    InputResult::Quit
                }
                KeyCode::Char('s') => {
                    if self.can_start() {
                        InputResult::Start
                    } else {
                        self.set_status("Already minting".to_string(), true);
                        InputResult::Continue
                    }
                }
                KeyCode::Char('x') => {
                    if self.can_stop() {
                        InputResult::Stop
                    } else {
                        self.set_status("Not minting".to_string(), true);
                        InputResult::Continue
                    }
                }
                KeyCode::Char('t') => {
                    self.mode = InputMode::EditingToken;
                    InputResult::Continue
                }
                _ => InputResult::Continue,
            },
        }
    }
}

pub fn shorten_address(address: &Address) -> String {
    let s = address.to_string();
    format!("{}...{}", &s[..6], &s[s.len() - 4..])
}

/// Entries that fit in `rows`, newest at the bottom
pub fn visible_log_window(len: usize, rows: usize) -> Range<usize> {
    len.saturating_sub(rows)..len
}

// =============================================================================
// Terminal Setup
// =============================================================================

pub type Tui = Terminal<CrosstermBackend<Stdout>>;

pub fn init() -> io::Result<Tui> {
    execute!(io::stdout(), EnterAlternateScreen)?;
    enable_raw_mode()?;
    Terminal::new(CrosstermBackend::new(io::stdout()))
}

pub fn restore() -> io::Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;
    Ok(())
}

// =============================================================================
// Main Draw Function
// =============================================================================

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Header
            Constraint::Length(5), // Balances + token
            Constraint::Min(6),    // Log
            Constraint::Length(1), // Status line
        ])
        .split(frame.area());

    draw_header(frame, chunks[0], app);
    draw_panels(frame, chunks[1], app);
    draw_log(frame, chunks[2], app);
    draw_status(frame, chunks[3], app);
}

// =============================================================================
// Header Section
// =============================================================================

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let state_color = match app.run_state {
        RunState::Running => Color::Green,
        RunState::Stopped => Color::Red,
        RunState::Idle => Color::Yellow,
    };
    let account = app
        .account
        .as_ref()
        .map(shorten_address)
        .unwrap_or_else(|| "no key".to_string());
    let last_block = app
        .last_confirmed
        .map(|b| b.to_string())
        .unwrap_or_else(|| "-".to_string());

    let line1 = Line::from(vec![
        Span::styled("  ⚡ MINT BOT ", Style::default().fg(Color::Magenta).bold()),
        Span::styled("│ ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("RPC: {} ", app.rpc_url), Style::default().fg(Color::Cyan)),
        Span::styled("│ ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("Account: {}", account), Style::default().fg(Color::White)),
    ]);

    let line2 = Line::from(vec![
        Span::styled("  State: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{} ", app.run_state.as_str()),
            Style::default().fg(state_color).bold(),
        ),
        Span::styled("│ ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("Phase: {} ", app.phase.as_str()), Style::default().fg(Color::White)),
        Span::styled("│ ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("Last mint block: {}", last_block), Style::default().fg(Color::Yellow)),
    ]);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .style(Style::default().bg(Color::Rgb(15, 15, 25)));

    frame.render_widget(Paragraph::new(vec![line1, line2]).block(block), area);
}

// =============================================================================
// Balances / Token Panels
// =============================================================================

fn draw_panels(frame: &mut Frame, area: Rect, app: &App) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let balances = vec![
        Line::from(vec![
            Span::styled(" BNB Balance: ", Style::default().fg(Color::DarkGray)),
            Span::styled(app.balances.native.to_string(), Style::default().fg(Color::White).bold()),
        ]),
        Line::from(vec![
            Span::styled(" Mint Amount: ", Style::default().fg(Color::DarkGray)),
            Span::styled(app.balances.token.to_string(), Style::default().fg(Color::Green).bold()),
        ]),
    ];
    let block = Block::default()
        .title(" Balances ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    frame.render_widget(Paragraph::new(balances).block(block), cols[0]);

    let editing = app.mode == InputMode::EditingToken;
    let token_display = if app.token_input.is_empty() && !editing {
        "(none, press t to set)".to_string()
    } else if editing {
        format!("{}▏", app.token_input)
    } else {
        app.token_input.clone()
    };
    let token_style = if editing {
        Style::default().fg(Color::White).bold().on_blue()
    } else {
        Style::default().fg(Color::White)
    };

    let start_style = if app.can_start() {
        Style::default().fg(Color::Green).bold()
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let stop_style = if app.can_stop() {
        Style::default().fg(Color::Red).bold()
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let controls = vec![
        Line::from(vec![
            Span::styled(" Token: ", Style::default().fg(Color::DarkGray)),
            Span::styled(token_display, token_style),
        ]),
        Line::from(if editing {
            vec![Span::styled(
                " Enter:apply  Esc:cancel",
                Style::default().fg(Color::DarkGray),
            )]
        } else {
            vec![
                Span::styled(" s:start ", start_style),
                Span::styled(" x:stop ", stop_style),
                Span::styled(" t:token  q:quit", Style::default().fg(Color::DarkGray)),
            ]
        }),
    ];
    let block = Block::default()
        .title(" Mint ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Blue } else { Color::DarkGray }));
    frame.render_widget(Paragraph::new(controls).block(block), cols[1]);
}

// =============================================================================
// Event Log
// =============================================================================

fn draw_log(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(" Log ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    if app.log.is_empty() {
        let paragraph = Paragraph::new("Nothing logged yet")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let rows = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = app.log[visible_log_window(app.log.len(), rows)]
        .iter()
        .map(|entry| {
            let color = if entry.message.starts_with("Error") {
                Color::Red
            } else if entry.message.starts_with("Minted") {
                Color::Green
            } else {
                Color::White
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:>4}: ", entry.index + 1),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("[{}] ", entry.at.format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(entry.message.clone(), Style::default().fg(color)),
            ]))
        })
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}

fn draw_status(frame: &mut Frame, area: Rect, app: &App) {
    let line = match &app.status {
        Some((message, is_error, _)) => Line::from(Span::styled(
            format!(" {}", message),
            Style::default().fg(if *is_error { Color::Red } else { Color::Green }),
        )),
        None => Line::from(""),
    };
    frame.render_widget(Paragraph::new(line), area);
}

// =============================================================================
// Input Handling
// =============================================================================

/// Poll for one key press (non-blocking, 50ms budget)
pub fn handle_input(app: &mut App) -> io::Result<InputResult> {
    let mut result = InputResult::Continue;
    if event::poll(Duration::from_millis(50))? {
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                result = app.handle_key(key.code);
            }
        }
    }

    // Clear status message after 4 seconds
    if let Some((_, _, instant)) = &app.status {
        if instant.elapsed() > Duration::from_secs(4) {
            app.status = None;
        }
    }

    Ok(result)
}
