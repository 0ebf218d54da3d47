use anyhow::Result;
use pacman_core::{
    Direction,
    cell::GridCell,
    config::GameConfig,
    game_state::{GameState, GameStatus, PlayerSetup},
    map::Level,
    q_learning::QLearningAgent,
    session::GameSession,
};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    io::{self, Stdout},
    time::{Duration, Instant},
};

const HELP: &str = "P1: arrows, Insert stops | P2: w/a/s/d, q stops | Enter restarts | Esc quits";

struct App {
    session: GameSession,
    /// Drives the first pacman when it is under learned control.
    learner: Option<QLearningAgent>,
    config: GameConfig,
    /// Flag to control the main loop.
    should_quit: bool,
    /// Last error raised by the simulation, shown in the status bar.
    error: Option<String>,
}

impl App {
    fn new(
        level: Level,
        players: PlayerSetup,
        config: GameConfig,
        learner: Option<QLearningAgent>,
    ) -> Result<Self> {
        let session = GameSession::initialize(level, players, config.clone())?;
        Ok(App {
            session,
            learner,
            config,
            should_quit: false,
            error: None,
        })
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) {
        if self.session.is_game_over() {
            return;
        }
        match self.learner.as_mut() {
            Some(learner) => {
                if let Err(e) = self.session.policy_step(learner) {
                    self.error = Some(e.to_string());
                }
            }
            None => {
                self.session.tick();
            }
        }
    }

    fn handle_key(&mut self, code: KeyCode) {
        let command = match code {
            KeyCode::Esc => {
                self.should_quit = true;
                return;
            }
            KeyCode::Enter => {
                if let Err(e) = self.session.restart(self.config.clone()) {
                    self.error = Some(e.to_string());
                }
                return;
            }
            KeyCode::Up => (1, Direction::Up),
            KeyCode::Down => (1, Direction::Down),
            KeyCode::Left => (1, Direction::Left),
            KeyCode::Right => (1, Direction::Right),
            KeyCode::Insert => (1, Direction::None),
            KeyCode::Char('w') => (2, Direction::Up),
            KeyCode::Char('s') => (2, Direction::Down),
            KeyCode::Char('a') => (2, Direction::Left),
            KeyCode::Char('d') => (2, Direction::Right),
            KeyCode::Char('q') => (2, Direction::None),
            _ => return,
        };
        let (player, direction) = command;
        if let Err(e) = self.session.input_mut().push(player, direction) {
            self.error = Some(e.to_string());
        }
    }
}

/// Runs a game in the terminal until the user quits.
pub fn run(
    level: Level,
    players: PlayerSetup,
    config: GameConfig,
    learner: Option<QLearningAgent>,
    tick_ms: u64,
) -> Result<()> {
    let mut app = App::new(level, players, config, learner)?;
    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app, Duration::from_millis(tick_ms));
    restore_terminal(&mut terminal)?;
    result
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn ui(frame: &mut Frame, app: &App) {
    let [map_area, stats_area, help_area] = Layout::vertical([
        Constraint::Min(5),
        Constraint::Length(6),
        Constraint::Length(2),
    ])
    .areas(frame.area());

    let state = app.session.state();
    render_map(frame, map_area, state, &app.session.level().id);
    render_stats(frame, stats_area, state);

    let status = match &app.error {
        Some(error) => Line::from(Span::styled(error.as_str(), Style::default().fg(Color::Red))),
        None => Line::from(HELP),
    };
    let help_text = Paragraph::new(status)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, help_area);
}

fn render_stats(frame: &mut Frame, area: Rect, state: &GameState) {
    let status = match state.status() {
        GameStatus::Ongoing => Span::raw("playing"),
        GameStatus::Win => Span::styled("WIN", Style::default().fg(Color::Green).bold()),
        GameStatus::Lose => Span::styled("LOSE", Style::default().fg(Color::Red).bold()),
    };
    let mut lines = vec![
        Line::from(vec![
            Span::raw(format!(
                "Score: {}  Tick: {}  Food: {}/{}  Status: ",
                state.score(),
                state.elapsed_ticks(),
                state.remaining_food(),
                state.original_food()
            )),
            status,
        ]),
        Line::from(format!(
            "Invulnerable: {}  Ghosts killed: {}",
            state.pacman_invulnerable_time(),
            state.ghosts_killed()
        )),
    ];

    let tick = state.elapsed_ticks();
    let ghosts: Vec<String> = state
        .ghost_ids()
        .iter()
        .filter_map(|&id| state.agent(id).ok())
        .map(|ghost| match ghost.respawn_remaining(tick) {
            Some(remaining) => format!("#{} respawns in {remaining}", ghost.id),
            None => format!("#{} at ({}, {})", ghost.id, ghost.position.x, ghost.position.y),
        })
        .collect();
    if !ghosts.is_empty() {
        lines.push(Line::from(format!("Ghosts: {}", ghosts.join(", "))));
    }

    let stats =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Stats"));
    frame.render_widget(stats, area);
}

/// Renders the grid onto the frame.
fn render_map(frame: &mut Frame, area: Rect, state: &GameState, title: &str) {
    let invulnerable = state.is_pacman_invulnerable();
    let lines: Vec<Line> = state
        .grid()
        .rows()
        .map(|row| {
            Line::from(
                row.iter()
                    .map(|cell| cell_span(cell, invulnerable))
                    .collect::<Vec<_>>(),
            )
        })
        .collect();

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title(title.to_string()).borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}

fn cell_span(cell: &GridCell, invulnerable: bool) -> Span<'static> {
    let style = if cell.has_pacman() {
        Style::default().fg(Color::Yellow).bold()
    } else if cell.has_ghost() {
        // Ghosts turn blue while the pacman can eat them.
        if invulnerable {
            Style::default().fg(Color::Blue).bold()
        } else {
            Style::default().fg(Color::Red).bold()
        }
    } else if cell.has_wall() {
        Style::default().fg(Color::DarkGray)
    } else if cell.has_powerup() {
        Style::default().fg(Color::Magenta)
    } else {
        Style::default()
    };
    Span::styled(cell.symbol().to_string(), style)
}
