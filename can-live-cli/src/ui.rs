//! Interactive summary view
//!
//! Polls the frame summary store on a fixed interval and draws one row per
//! tracked identifier, with the payload shown in every display mode. Changed
//! bytes are highlighted in the RAW and U8 columns.
//!
//! Keys: `Ctrl-C`/`q`/`Esc` quit, `Ctrl-L` clear, `s` cycle sort column,
//! `S` reverse, `+`/`-` adjust the identifier limit, `p` pause.

use anyhow::{Context, Result};
use can_live_analyzer::{
    render_segments, AnalyzerConfig, DisplayMode, FrameSummary, FrameSummaryStore, RenderedData,
    SortKey, Timestamp,
};
use chrono::{TimeDelta, Utc};
use ratatui::backend::CrosstermBackend;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::crossterm::execute;
use ratatui::crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Summary columns, in display order
const SUMMARY_COLUMNS: [SortKey; 4] = [
    SortKey::Id,
    SortKey::Count,
    SortKey::LastSeen,
    SortKey::Length,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    Continue,
    Quit,
}

/// One prepared table row
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub id: String,
    pub count: String,
    pub last_seen: String,
    pub length: String,
    pub data: Vec<RenderedData>,
}

pub struct AnalyzerUi {
    store: Arc<FrameSummaryStore>,
    refresh_interval: Duration,
    highlight_changes: bool,
    sort_by: SortKey,
    reverse: bool,
    paused: bool,
    rows: Vec<SummaryRow>,
}

impl AnalyzerUi {
    pub fn new(store: Arc<FrameSummaryStore>, config: &AnalyzerConfig) -> Self {
        Self {
            store,
            refresh_interval: config.refresh_interval(),
            highlight_changes: config.highlight_changes,
            sort_by: config.default_sort,
            reverse: config.default_reverse,
            paused: false,
            rows: Vec::new(),
        }
    }

    /// Run the view until the user quits or `should_abort` returns true
    pub fn run(mut self, should_abort: impl Fn() -> bool) -> Result<()> {
        let mut terminal = TerminalGuard::enter()?;

        self.refresh(Utc::now());
        let mut next_refresh = Instant::now() + self.refresh_interval;

        loop {
            terminal
                .terminal
                .draw(|f| self.draw(f))
                .context("Failed to draw summary view")?;

            if should_abort() {
                log::warn!("Ingestion ended, closing summary view");
                break;
            }

            let timeout = next_refresh.saturating_duration_since(Instant::now());
            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key(key) == UiAction::Quit {
                        break;
                    }
                }
            }

            if Instant::now() >= next_refresh {
                self.refresh(Utc::now());
                next_refresh = Instant::now() + self.refresh_interval;
            }
        }

        Ok(())
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> UiAction {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') => return UiAction::Quit,
                KeyCode::Char('l') => {
                    self.store.clear();
                    self.refresh(Utc::now());
                }
                _ => {}
            }
            return UiAction::Continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return UiAction::Quit,
            KeyCode::Char('s') => {
                self.sort_by = next_sort(self.sort_by);
                self.refresh(Utc::now());
            }
            KeyCode::Char('S') => {
                self.reverse = !self.reverse;
                self.refresh(Utc::now());
            }
            KeyCode::Char('+') => {
                let limit = self.store.limit();
                self.store.set_limit(limit.saturating_add(1));
            }
            KeyCode::Char('-') => {
                let limit = self.store.limit();
                if limit > 1 {
                    self.store.set_limit(limit - 1);
                }
            }
            KeyCode::Char('p') => {
                self.paused = !self.paused;
                log::debug!("Summary view paused: {}", self.paused);
            }
            _ => {}
        }

        UiAction::Continue
    }

    /// Take a fresh snapshot of the store, unless paused
    pub fn refresh(&mut self, now: Timestamp) {
        if self.paused {
            return;
        }

        let summaries = self.store.query(self.sort_by, self.reverse);
        self.rows = build_rows(&summaries, now, self.highlight_changes);
    }

    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    /// Column headers; the active sort column carries a direction marker
    pub fn header_labels(&self) -> Vec<String> {
        let marker = if self.reverse { "\u{25bc}" } else { "\u{25b2}" };

        SUMMARY_COLUMNS
            .iter()
            .map(|key| {
                let name = key.as_str().to_uppercase();
                if *key == self.sort_by {
                    format!("{} {}", name, marker)
                } else {
                    name
                }
            })
            .chain(DisplayMode::ALL.iter().map(|mode| mode.label().to_string()))
            .collect()
    }

    fn draw(&self, f: &mut ratatui::Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1)])
            .split(f.area());

        let bold = Style::default().add_modifier(Modifier::BOLD);
        let header = Row::new(
            self.header_labels()
                .into_iter()
                .enumerate()
                .map(|(i, label)| {
                    if i < SUMMARY_COLUMNS.len() && SUMMARY_COLUMNS[i] == self.sort_by {
                        Cell::from(label).style(bold)
                    } else {
                        Cell::from(label)
                    }
                }),
        );

        let rows = self.rows.iter().map(|row| {
            let mut cells = vec![
                Cell::from(row.id.clone()),
                Cell::from(row.count.clone()),
                Cell::from(row.last_seen.clone()),
                Cell::from(row.length.clone()),
            ];
            cells.extend(row.data.iter().map(|data| Cell::from(styled_line(data))));
            Row::new(cells)
        });

        let table = Table::new(rows, column_widths())
            .header(header)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Message Summary "),
            );
        f.render_widget(table, chunks[0]);

        f.render_widget(self.footer(), chunks[1]);
    }

    fn footer(&self) -> Paragraph<'static> {
        let key = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
        let mut spans = vec![
            Span::styled(" q", key),
            Span::raw(" quit  "),
            Span::styled("^L", key),
            Span::raw(" clear  "),
            Span::styled("s/S", key),
            Span::raw(" sort/reverse  "),
            Span::styled("+/-", key),
            Span::raw(" limit  "),
            Span::styled("p", key),
            Span::raw(" pause   "),
            Span::raw(format!(
                "limit {} | tracked {}",
                self.store.limit(),
                self.store.len()
            )),
        ];
        if self.paused {
            spans.push(Span::styled(" | PAUSED", Style::default().fg(Color::Red)));
        }

        Paragraph::new(Line::from(spans)).style(Style::default().fg(Color::DarkGray))
    }
}

/// Prepare display rows for a snapshot
pub fn build_rows(
    summaries: &[Arc<FrameSummary>],
    now: Timestamp,
    highlight_changes: bool,
) -> Vec<SummaryRow> {
    summaries
        .iter()
        .map(|summary| SummaryRow {
            id: format!("{:04X}", summary.id()),
            count: summary.count.to_string(),
            last_seen: format_elapsed(now - summary.last_seen),
            length: summary.len().to_string(),
            data: DisplayMode::ALL
                .iter()
                .map(|mode| {
                    let mut rendered = render_segments(summary, *mode);
                    if !highlight_changes {
                        rendered.segments.iter_mut().for_each(|s| s.changed = false);
                    }
                    rendered
                })
                .collect(),
        })
        .collect()
}

/// Elapsed time rounded to whole seconds, e.g. `4s`, `2m5s`, `1h0m12s`
pub fn format_elapsed(elapsed: TimeDelta) -> String {
    let secs = ((elapsed.num_milliseconds() + 500) / 1000).max(0);
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

fn next_sort(current: SortKey) -> SortKey {
    match current {
        SortKey::Id => SortKey::Count,
        SortKey::Count => SortKey::LastSeen,
        SortKey::LastSeen => SortKey::Length,
        SortKey::Length => SortKey::Id,
    }
}

fn styled_line(data: &RenderedData) -> Line<'static> {
    let changed = Style::default().fg(Color::Red).add_modifier(Modifier::BOLD);
    let mut spans = Vec::with_capacity(data.segments.len() * 2);

    for (i, segment) in data.segments.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" "));
        }
        if segment.changed {
            spans.push(Span::styled(segment.text.clone(), changed));
        } else {
            spans.push(Span::raw(segment.text.clone()));
        }
    }

    Line::from(spans)
}

fn column_widths() -> Vec<Constraint> {
    let mut widths = vec![
        Constraint::Length(10), // ID
        Constraint::Length(9),  // COUNT
        Constraint::Length(10), // LASTSEEN
        Constraint::Length(9),  // LENGTH
    ];
    widths.extend(DisplayMode::ALL.iter().map(|mode| {
        Constraint::Length(match mode {
            DisplayMode::Raw => 23,
            DisplayMode::U8 => 31,
            DisplayMode::U16LE | DisplayMode::U16BE => 27,
            DisplayMode::U32LE | DisplayMode::U32BE | DisplayMode::S32 => 23,
            DisplayMode::Ascii => 8,
        })
    }));
    widths
}

/// Owns the terminal while the view runs and restores it on drop
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e).context("Failed to enter alternate screen");
        }

        // Restore the terminal before a panic message is printed
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
            original_hook(info);
        }));

        let terminal =
            Terminal::new(CrosstermBackend::new(stdout)).context("Failed to create terminal")?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}
