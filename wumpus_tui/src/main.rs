mod stats;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rand::{SeedableRng, rngs::StdRng};
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
    fs::File,
    io::{self, Stdout},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};
use wumpus_core::{
    AgentStatus, BeliefFlags, Cell, EpisodeEnd, Position, RoundOutcome, SearchMode, SimConfig,
    Simulation, load_board_from_string,
};

use crate::stats::Statistics;

const MIN_STEP_INTERVAL: Duration = Duration::from_millis(15);
const MAX_STEP_INTERVAL: Duration = Duration::from_secs(4);

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SearchArg {
    /// Breadth-first over certified-safe cells
    Bfs,
    /// Dijkstra over certified-safe cells
    Weighted,
    /// Dijkstra that may cross suspected cells at high cost
    Risky,
}

impl From<SearchArg> for SearchMode {
    fn from(arg: SearchArg) -> Self {
        match arg {
            SearchArg::Bfs => SearchMode::BreadthFirst,
            SearchArg::Weighted => SearchMode::Weighted { risky: false },
            SearchArg::Risky => SearchMode::Weighted { risky: true },
        }
    }
}

/// Cooperative Wumpus-world explorers coordinated by a task auction.
///
/// Every simulation parameter can also be set through its environment
/// variable. Unset parameters fall back to the built-in defaults.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Map file to load instead of generating a random board
    #[arg(short, long, value_name = "MAP_FILE", env = "WUMPUS_MAP")]
    map: Option<PathBuf>,

    /// Side length of a generated board
    #[arg(long, env = "WUMPUS_GRID_SIZE")]
    grid_size: Option<usize>,

    /// Number of agents on a generated board
    #[arg(long, env = "WUMPUS_AGENTS")]
    agents: Option<usize>,

    #[arg(long, env = "WUMPUS_WUMPUS")]
    wumpus: Option<usize>,

    #[arg(long, env = "WUMPUS_PITS")]
    pits: Option<usize>,

    #[arg(long, env = "WUMPUS_GOLD")]
    gold: Option<usize>,

    /// Hand out arrows and auction Shoot tasks against confirmed wumpus
    #[arg(long, env = "WUMPUS_SHOOTING")]
    shooting: bool,

    #[arg(long, value_enum, env = "WUMPUS_SEARCH")]
    search: Option<SearchArg>,

    /// Favour targets far away from the other agents
    #[arg(long, env = "WUMPUS_SPREAD_BONUS")]
    spread_bonus: bool,

    /// Rounds after which an episode is abandoned
    #[arg(long, env = "WUMPUS_MAX_ROUNDS")]
    max_rounds: Option<usize>,

    /// Seed for board generation
    #[arg(long, env = "WUMPUS_SEED")]
    seed: Option<u64>,

    /// Run episodes without the terminal viewer
    #[arg(long)]
    headless: bool,

    /// Episodes to run in headless mode
    #[arg(long, default_value_t = 1)]
    episodes: usize,

    /// Write the run statistics to this file when done
    #[arg(long, value_name = "FILE")]
    stats_out: Option<PathBuf>,

    /// Write logs to this file. Without it the viewer logs nothing.
    #[arg(long, value_name = "FILE", env = "WUMPUS_LOG_FILE")]
    log_file: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> SimConfig {
        let defaults = SimConfig::default();
        SimConfig {
            grid_size: self.grid_size.unwrap_or(defaults.grid_size),
            agent_count: self.agents.unwrap_or(defaults.agent_count),
            wumpus_count: self.wumpus.unwrap_or(defaults.wumpus_count),
            pit_count: self.pits.unwrap_or(defaults.pit_count),
            gold_count: self.gold.unwrap_or(defaults.gold_count),
            shooting: self.shooting,
            search: self.search.map_or(defaults.search, SearchMode::from),
            spread_bonus: self.spread_bonus,
            max_rounds: self.max_rounds.unwrap_or(defaults.max_rounds),
            seed: self.seed,
        }
    }
}

/// Where new episodes come from.
struct Scenario {
    config: SimConfig,
    /// Fixed map text; `None` generates a fresh board per episode.
    map: Option<String>,
    rng: StdRng,
}

impl Scenario {
    fn new(config: SimConfig, map_file: Option<&Path>) -> Result<Self> {
        let map = map_file
            .map(|path| {
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read map file {}", path.display()))
            })
            .transpose()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Scenario { config, map, rng })
    }

    fn next_episode(&mut self) -> Result<Simulation> {
        match &self.map {
            Some(map) => {
                let (board, starts) =
                    load_board_from_string(map).context("Failed to load map")?;
                Ok(Simulation::new(self.config.clone(), board, &starts))
            }
            None => Simulation::generate(self.config.clone(), &mut self.rng)
                .context("Failed to generate board"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Step,
    Continuous,
}

struct App {
    scenario: Scenario,
    simulation: Simulation,
    stats: Statistics,
    mode: Mode,
    step_interval: Duration,
    step_requested: bool,
    /// Show the hidden board instead of the agents' beliefs.
    clear_vision: bool,
    last_outcome: Option<RoundOutcome>,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(mut scenario: Scenario) -> Result<Self> {
        let simulation = scenario.next_episode()?;
        Ok(App {
            scenario,
            simulation,
            stats: Statistics::default(),
            mode: Mode::Step,
            step_interval: Duration::from_millis(250),
            step_requested: false,
            clear_vision: false,
            last_outcome: None,
            should_quit: false,
        })
    }

    /// How the current episode ended, `None` while it is still running.
    fn episode_end(&self) -> Option<EpisodeEnd> {
        match self.last_outcome {
            Some(RoundOutcome::Stuck) => Some(EpisodeEnd::Stuck),
            Some(RoundOutcome::GoldFound { agent }) => Some(EpisodeEnd::GoldFound { agent }),
            Some(RoundOutcome::AllDead) => Some(EpisodeEnd::AllDead),
            _ if self.simulation.rounds() >= self.simulation.config().max_rounds => {
                Some(EpisodeEnd::RoundLimit)
            }
            _ => None,
        }
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) {
        if self.episode_end().is_some() {
            return;
        }
        self.last_outcome = Some(self.simulation.step());
    }

    /// Records the current episode and starts a new one.
    fn restart(&mut self) -> Result<()> {
        self.record_episode();
        self.simulation = self.scenario.next_episode()?;
        self.last_outcome = None;
        Ok(())
    }

    /// Unfinished episodes are not counted.
    fn record_episode(&mut self) {
        if let Some(end) = self.episode_end() {
            self.stats.record(&self.simulation.summary(end));
        }
    }

    fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            Mode::Step => Mode::Continuous,
            Mode::Continuous => Mode::Step,
        };
    }

    fn faster(&mut self) {
        self.step_interval = (self.step_interval / 2).max(MIN_STEP_INTERVAL);
    }

    fn slower(&mut self) {
        self.step_interval = (self.step_interval * 2).min(MAX_STEP_INTERVAL);
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref(), args.headless)?;

    let config = args.config();
    info!(?config, "configuration loaded");
    let scenario = Scenario::new(config, args.map.as_deref())?;

    let stats = if args.headless {
        run_headless(scenario, args.episodes)?
    } else {
        let mut terminal = setup_terminal()?;
        let app = App::new(scenario);
        let result = app.and_then(|mut app| {
            run_app(&mut terminal, &mut app)?;
            app.record_episode();
            Ok(app.stats)
        });
        restore_terminal(&mut terminal)?;
        result?
    };

    print!("{stats}");
    if let Some(path) = &args.stats_out {
        stats.write_to(path)?;
    }
    Ok(())
}

/// Logs go to `log_file` when given, otherwise to stderr in headless mode.
/// The viewer owns the terminal, so it logs nowhere by default.
fn init_logging(log_file: Option<&Path>, headless: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None if headless => fmt().with_env_filter(filter).with_writer(io::stderr).init(),
        None => {}
    }
    Ok(())
}

fn run_headless(mut scenario: Scenario, episodes: usize) -> Result<Statistics> {
    let mut stats = Statistics::default();
    for episode in 0..episodes {
        let mut simulation = scenario.next_episode()?;
        let summary = simulation.run_episode();
        debug!(episode, ?summary, "episode recorded");
        stats.record(&summary);
    }
    Ok(stats)
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

/// Runs the main loop of the TUI application.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = app
            .step_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                        KeyCode::Char(' ') if app.mode == Mode::Step => app.step_requested = true,
                        KeyCode::Enter => app.toggle_mode(),
                        KeyCode::Char('+') => app.faster(),
                        KeyCode::Char('-') => app.slower(),
                        KeyCode::Char('c') => app.clear_vision = !app.clear_vision,
                        KeyCode::Char('r') => app.restart()?,
                        _ => {}
                    }
                }
            }
        }

        match app.mode {
            Mode::Step if app.step_requested => {
                app.step_requested = false;
                app.tick();
            }
            Mode::Continuous if last_tick.elapsed() >= app.step_interval => {
                app.tick();
                last_tick = Instant::now();
            }
            _ => {}
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),     // Area for the board
            Constraint::Length(8),  // Area for the agent list
            Constraint::Length(3),  // Area for status/help
        ])
        .split(frame.area());

    render_board(frame, main_layout[0], app);
    render_agents(frame, main_layout[1], &app.simulation);

    let mode = match app.mode {
        Mode::Step => "step".to_string(),
        Mode::Continuous => format!("continuous, {} ms", app.step_interval.as_millis()),
    };
    let outcome = match app.last_outcome {
        None => "not started".to_string(),
        Some(RoundOutcome::Continue) if app.episode_end().is_some() => "round limit".to_string(),
        Some(RoundOutcome::Continue) => "running".to_string(),
        Some(RoundOutcome::Stuck) => "stuck".to_string(),
        Some(RoundOutcome::GoldFound { agent }) => format!("gold found by agent {agent}"),
        Some(RoundOutcome::AllDead) => "all agents dead".to_string(),
    };
    let status = format!(
        "Round {} ({outcome}) | Mode: {mode} | Episodes: {} | space step, enter mode, +/- speed, c vision, r restart, q quit",
        app.simulation.rounds(),
        app.stats.episodes(),
    );
    let help_text = Paragraph::new(status)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

fn render_agents(frame: &mut Frame, area: Rect, simulation: &Simulation) {
    let items: Vec<ListItem> = simulation
        .agents()
        .iter()
        .map(|agent| {
            let (status, style) = match agent.status {
                AgentStatus::Alive => ("alive", Style::default()),
                AgentStatus::Dead => ("dead", Style::default().fg(Color::DarkGray)),
            };
            let arrow = if agent.has_arrow { " arrow" } else { "" };
            ListItem::from(Line::from(Span::styled(
                format!("Agent {} at {} {status}{arrow}", agent.id, agent.position),
                style,
            )))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Agents"));
    frame.render_widget(list, area);
}

/// Renders the board as the agents believe it, or the hidden truth with
/// clear vision on.
fn render_board(frame: &mut Frame, area: Rect, app: &App) {
    let simulation = &app.simulation;
    let board = simulation.board();
    let beliefs = simulation.beliefs();

    let mut lines: Vec<Line> = Vec::with_capacity(board.height());
    for y in 0..board.height() {
        let mut spans: Vec<Span> = Vec::with_capacity(board.width());
        for x in 0..board.width() {
            let position = Position { x, y };
            let agent = simulation
                .agents()
                .iter()
                .find(|agent| agent.position == position);

            let span = match agent {
                Some(agent) if agent.is_alive() => Span::styled(
                    format!(" {} ", agent.id % 10),
                    Style::default().fg(Color::Red).bold(),
                ),
                Some(_) => Span::styled(" x ", Style::default().fg(Color::DarkGray).bold()),
                None if app.clear_vision => truth_span(&board.cells()[position]),
                None => belief_span(&beliefs.flags(position)),
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let title = if app.clear_vision {
        "Wumpus World (clear vision)"
    } else {
        "Wumpus World (beliefs)"
    };
    let board_paragraph = Paragraph::new(lines)
        .block(Block::default().title(title).borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(board_paragraph, area);
}

fn signal_style(breeze: bool, stench: bool) -> Style {
    match (breeze, stench) {
        (true, true) => Style::default().fg(Color::LightRed),
        (true, false) => Style::default().fg(Color::Cyan),
        (false, true) => Style::default().fg(Color::Magenta),
        (false, false) => Style::default(),
    }
}

fn truth_span(cell: &Cell) -> Span<'static> {
    if cell.pit {
        Span::styled(" O ", Style::default().fg(Color::Blue).bold())
    } else if cell.wumpus {
        Span::styled(" W ", Style::default().fg(Color::Red).bold())
    } else if cell.dead_wumpus {
        Span::styled(" w ", Style::default().fg(Color::DarkGray))
    } else if cell.gold {
        Span::styled(" $ ", Style::default().fg(Color::Yellow).bold())
    } else {
        Span::styled(" . ", signal_style(cell.breeze, cell.stench))
    }
}

fn belief_span(flags: &BeliefFlags) -> Span<'static> {
    if flags.pit {
        Span::styled(" O ", Style::default().fg(Color::Blue))
    } else if flags.live_wumpus() {
        Span::styled(" W ", Style::default().fg(Color::Red))
    } else if flags.dead_wumpus {
        Span::styled(" w ", Style::default().fg(Color::DarkGray))
    } else if flags.is_potential_hazard() {
        Span::styled(" ? ", Style::default().fg(Color::Yellow))
    } else if flags.visited {
        Span::styled(" . ", signal_style(flags.breeze, flags.stench))
    } else {
        Span::styled(" # ", Style::default().fg(Color::DarkGray))
    }
}
