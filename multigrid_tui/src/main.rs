use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use multigrid_core::{
    AgentColor, Position,
    map::{GridMap, MapCatalog},
    policy::{PathPolicy, Policy, RandomPolicy},
    world::{AgentState, MultiAgentGridWorld},
};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    io::{self, Stdout},
    path::PathBuf,
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyKind {
    /// Uniformly random directions.
    Random,
    /// A* towards each agent's own goal.
    Path,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Preset map name ("4x4" or "8x8")
    #[arg(short, long, default_value = "8x8", conflicts_with = "map")]
    preset: String,

    /// Custom map file: one row of '0'/'1' per line
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// Start cells as "x,y" pairs separated by ';'
    #[arg(long, default_value = "0,0;7,0;3,1")]
    starts: String,

    /// Goal cells as "x,y" pairs separated by ';', one per start
    #[arg(long, default_value = "0,4;7,4;7,1")]
    goals: String,

    /// Direction supplier driving the agents
    #[arg(long, value_enum, default_value_t = PolicyKind::Path)]
    policy: PolicyKind,

    /// Seed for the random policy
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Milliseconds between simulation steps
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,
}

struct App {
    /// The core simulation world.
    world: MultiAgentGridWorld,
    /// One direction supplier per agent.
    policies: Vec<Box<dyn Policy>>,
    /// Policy selection kept for reset.
    policy_kind: PolicyKind,
    seed: u64,
    /// Steps taken since the last reset.
    step_count: usize,
    /// Flag to control the main loop.
    should_quit: bool,
    /// Flag set once every agent reached its goal.
    game_over: bool,
}

impl App {
    fn new(args: &Args) -> Result<Self> {
        let grid = match &args.map {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read map file {}", path.display()))?;
                let rows: Vec<&str> = contents.lines().filter(|l| !l.is_empty()).collect();
                GridMap::from_rows(&rows).context("Failed to parse map file")?
            }
            None => GridMap::from_preset(&MapCatalog::default(), &args.preset)
                .context("Failed to load preset map")?,
        };

        let starts = parse_positions(&args.starts).context("Failed to parse --starts")?;
        let goals = parse_positions(&args.goals).context("Failed to parse --goals")?;
        let world = MultiAgentGridWorld::new(grid, starts, goals, None)
            .context("Invalid world configuration")?;
        let policies = make_policies(args.policy, args.seed, world.num_agents());
        let game_over = world.is_done();

        Ok(App {
            world,
            policies,
            policy_kind: args.policy,
            seed: args.seed,
            step_count: 0,
            should_quit: false,
            game_over,
        })
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) {
        if self.game_over {
            return;
        }
        let directions: Vec<_> = {
            let view = self.world.snapshot();
            self.policies
                .iter_mut()
                .enumerate()
                .map(|(agent, policy)| policy.decide(&view, agent))
                .collect()
        };
        // The batch length always matches the agent count here.
        if let Ok(outcome) = self.world.step(&directions) {
            self.step_count += 1;
            if outcome.episode_done {
                self.game_over = true;
            }
        }
    }

    /// Starts a fresh episode on the same map and configuration.
    fn reset(&mut self) {
        let outcome = self.world.reset();
        self.policies = make_policies(self.policy_kind, self.seed, self.world.num_agents());
        self.step_count = 0;
        self.game_over = outcome.episode_done;
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn make_policies(kind: PolicyKind, seed: u64, agents: usize) -> Vec<Box<dyn Policy>> {
    (0..agents)
        .map(|agent| -> Box<dyn Policy> {
            match kind {
                PolicyKind::Random => Box::new(RandomPolicy::new(seed.wrapping_add(agent as u64))),
                PolicyKind::Path => Box::new(PathPolicy::new()),
            }
        })
        .collect()
}

/// Parses "x,y" pairs separated by ';' into positions.
fn parse_positions(input: &str) -> Result<Vec<Position>> {
    input
        .split(';')
        .map(|pair| {
            let (x, y) = pair
                .trim()
                .split_once(',')
                .with_context(|| format!("Expected 'x,y', got '{pair}'"))?;
            Ok(Position::new(
                x.trim().parse().with_context(|| format!("Bad x in '{pair}'"))?,
                y.trim().parse().with_context(|| format!("Bad y in '{pair}'"))?,
            ))
        })
        .collect()
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Create the application state before touching the terminal so config
    // errors print normally.
    let mut app = App::new(&args)?;

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Run the main application loop
    let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));

    // Restore the terminal state
    restore_terminal(&mut terminal)?;

    result
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?; // Put terminal in raw mode
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?; // Use alternate screen and enable mouse capture
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into) // Map io::Error to anyhow::Error
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
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        // Draw the UI
        terminal.draw(|f| ui(f, app))?;

        // Calculate timeout for event polling
        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        // Poll for events (keyboard, mouse, etc.)
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    KeyCode::Char('r') => app.reset(),
                    _ => {}
                }
            }
        }

        // Update application state if enough time has passed
        if last_tick.elapsed() >= tick_rate {
            app.tick(); // Perform simulation step
            last_tick = Instant::now();
        }

        // Exit loop if requested
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
            Constraint::Percentage(70), // Area for the map
            Constraint::Percentage(20), // Area for agent status
            Constraint::Percentage(10), // Area for status/help
        ])
        .split(frame.area());

    // Render the map
    render_map(frame, main_layout[0], &app.world);

    // Render per-agent status
    render_agents(frame, main_layout[1], app.world.snapshot().agents);

    // Render status/help text
    let status = if app.game_over {
        format!(
            "All agents reached their goals in {} steps. Press 'r' to reset, 'q' to quit.",
            app.step_count
        )
    } else {
        format!("Step {}. Press 'r' to reset, 'q' or 'Esc' to quit.", app.step_count)
    };
    let help_text = Paragraph::new(status)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

/// Maps an agent identity color to a terminal color.
fn terminal_color(color: AgentColor) -> Color {
    match color {
        AgentColor::Red => Color::Red,
        AgentColor::Green => Color::Green,
        AgentColor::Blue => Color::Blue,
        AgentColor::Purple => Color::Magenta,
        AgentColor::Yellow => Color::Yellow,
        AgentColor::Grey => Color::Gray,
        AgentColor::Black => Color::DarkGray,
    }
}

/// Renders the status list of each agent onto the frame.
fn render_agents(frame: &mut Frame, area: Rect, agents: &[AgentState]) {
    let items: Vec<ListItem> = agents
        .iter()
        .map(|agent| {
            let marker = Span::styled("@ ", Style::default().fg(terminal_color(agent.color)).bold());
            let info = Span::raw(format!(
                "Agent {} Pos: ({}, {}) Goal: ({}, {}) {}",
                agent.id,
                agent.position.x,
                agent.position.y,
                agent.goal.x,
                agent.goal.y,
                if agent.reached_goal { "done" } else { "moving" },
            ));
            ListItem::from(Line::from(vec![marker, info]))
        })
        .collect();

    let widget = List::new(items).block(Block::default().borders(Borders::ALL).title("Agents"));
    frame.render_widget(widget, area);
}

/// Renders the grid, goals and agents onto the frame.
fn render_map(frame: &mut Frame, area: Rect, world: &MultiAgentGridWorld) {
    let view = world.snapshot();
    let grid = view.grid;

    let mut lines: Vec<Line> = Vec::with_capacity(grid.height());
    for y in 0..grid.height() {
        let mut spans: Vec<Span> = Vec::with_capacity(grid.width());
        for x in 0..grid.width() {
            let pos = Position::new(x, y);
            if let Some(agent) = view.agent_at(pos) {
                // Display agent character '@' with its identity color
                spans.push(Span::styled(
                    "@",
                    Style::default().fg(terminal_color(agent.color)).bold(),
                ));
            } else if let Some(agent) = view.agents.iter().find(|a| a.goal == pos) {
                // Goal cell in the owning agent's color
                spans.push(Span::styled(
                    "G",
                    Style::default().fg(terminal_color(agent.color)),
                ));
            } else if grid.is_wall(pos) {
                spans.push(Span::styled("#", Style::default().fg(Color::DarkGray)));
            } else {
                spans.push(Span::raw(" "));
            }
        }
        lines.push(Line::from(spans));
    }

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Multigrid").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}
