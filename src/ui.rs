use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use major_income::{IncomeStatistics, MajorIncomeRecord};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

/// Income bands selectable with the number keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomeBand {
    All,
    Under50k,
    From50kTo80k,
    Over80k,
}

impl IncomeBand {
    pub fn contains(&self, income: u64) -> bool {
        match self {
            IncomeBand::All => true,
            IncomeBand::Under50k => income < 50_000,
            IncomeBand::From50kTo80k => (50_000..80_000).contains(&income),
            IncomeBand::Over80k => income >= 80_000,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            IncomeBand::All => "All",
            IncomeBand::Under50k => "< $50k",
            IncomeBand::From50kTo80k => "$50k - $80k",
            IncomeBand::Over80k => ">= $80k",
        }
    }
}

pub struct App {
    pub records: Vec<MajorIncomeRecord>,
    pub filtered: Vec<MajorIncomeRecord>,
    pub stats: IncomeStatistics,
    pub state: TableState,
    pub band: IncomeBand,
    pub show_detail: bool,
}

impl App {
    pub fn new(records: Vec<MajorIncomeRecord>, stats: IncomeStatistics) -> Self {
        let mut app = Self {
            filtered: records.clone(),
            records,
            stats,
            state: TableState::default(),
            band: IncomeBand::All,
            show_detail: false,
        };
        app.apply_band(IncomeBand::All);
        app
    }

    pub fn apply_band(&mut self, band: IncomeBand) {
        self.band = band;
        self.filtered = self
            .records
            .iter()
            .filter(|r| band.contains(r.income))
            .cloned()
            .collect();

        if self.filtered.is_empty() {
            self.state.select(None);
        } else {
            self.state.select(Some(0));
        }
    }

    pub fn selected(&self) -> Option<&MajorIncomeRecord> {
        self.state.selected().and_then(|i| self.filtered.get(i))
    }

    pub fn next(&mut self) {
        let len = self.filtered.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.filtered.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.filtered.len();
        if len == 0 {
            return;
        }
        let i = self.state.selected().map(|i| (i + 20).min(len - 1)).unwrap_or(0);
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        if self.filtered.is_empty() {
            return;
        }
        let i = self.state.selected().map(|i| i.saturating_sub(20)).unwrap_or(0);
        self.state.select(Some(i));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.show_detail = !app.show_detail,
                KeyCode::Char('1') => app.apply_band(IncomeBand::All),
                KeyCode::Char('2') => app.apply_band(IncomeBand::Under50k),
                KeyCode::Char('3') => app.apply_band(IncomeBand::From50kTo80k),
                KeyCode::Char('4') => app.apply_band(IncomeBand::Over80k),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => {
                    if !app.filtered.is_empty() {
                        app.state.select(Some(0));
                    }
                }
                KeyCode::End => {
                    if !app.filtered.is_empty() {
                        app.state.select(Some(app.filtered.len() - 1));
                    }
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Statistics header
            Constraint::Min(0),    // Table
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail {
        let content = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(chunks[1]);
        render_table(f, content[0], app);
        render_detail_panel(f, content[1], app);
    } else {
        render_table(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let dollars = |v: Option<u64>| v.map(|v| format!("${}", v)).unwrap_or_else(|| "n/a".to_string());

    let spans = vec![
        Span::styled(
            "Income by Major",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(format!("Majors: {}", app.stats.count), Style::default().fg(Color::White)),
        Span::raw("  |  "),
        Span::styled(
            format!(
                "Avg: {}",
                dollars(app.stats.average.map(|a| a.round() as u64))
            ),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw("  "),
        Span::styled(format!("↓ {}", dollars(app.stats.min)), Style::default().fg(Color::Red)),
        Span::raw("  "),
        Span::styled(format!("↑ {}", dollars(app.stats.max)), Style::default().fg(Color::Green)),
    ];

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn income_color(income: u64) -> Color {
    if income >= 80_000 {
        Color::Green
    } else if income >= 50_000 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["#", "Major", "Income", "Updated"].iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.filtered.iter().enumerate().map(|(i, record)| {
        Row::new(vec![
            Cell::from(format!("{}", i + 1)),
            Cell::from(truncate(&record.major, 40)),
            Cell::from(format!("${}", record.income))
                .style(Style::default().fg(income_color(record.income))),
            Cell::from(record.timestamp.format("%Y-%m-%d %H:%M").to_string()),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(5),
            Constraint::Length(42),
            Constraint::Length(14),
            Constraint::Length(18),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" Majors ({}) ", app.band.title())),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let lines = match app.selected() {
        Some(record) => vec![
            Line::from(Span::styled(
                record.major.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(format!("Income:  ${}", record.income)),
            Line::from(format!("Updated: {}", record.timestamp.to_rfc3339())),
            Line::from(format!("ID:      {}", record.id)),
        ],
        None => vec![Line::from("No major selected")],
    };

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Detail "),
    );

    f.render_widget(panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);

    let spans = vec![
        Span::styled(
            format!(" Row: {}/{} ", selected, app.filtered.len()),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" | "),
        Span::styled("1-4", Style::default().fg(Color::Yellow)),
        Span::raw(" Band | "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" Details | "),
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(" Nav | "),
        Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)),
        Span::raw(" Fast | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
