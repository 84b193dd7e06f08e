use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{AgentColor, AgentId, Position, map::GridMap};

/// Represents errors in the initial world configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Got {starts} start cells but {goals} goal cells")]
    LengthMismatch { starts: usize, goals: usize },
    #[error("Got {colors} colors for {agents} agents")]
    ColorCountMismatch { colors: usize, agents: usize },
    #[error("Start cell {pos} of agent {agent} is out of bounds or on a wall")]
    BlockedStart { agent: AgentId, pos: Position },
    #[error("Goal cell {pos} of agent {agent} is out of bounds or on a wall")]
    BlockedGoal { agent: AgentId, pos: Position },
    #[error("Agents {first} and {second} share start cell {pos}")]
    DuplicateStart {
        first: AgentId,
        second: AgentId,
        pos: Position,
    },
    #[error("Agents {first} and {second} share goal cell {pos}")]
    DuplicateGoal {
        first: AgentId,
        second: AgentId,
        pos: Position,
    },
}

/// Represents errors in a step input batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("Got {found} directions for {expected} agents")]
    DirectionCountMismatch { expected: usize, found: usize },
    #[error("Unknown direction '{token}'")]
    UnknownDirection { token: String },
}

/// An intended move for one agent within one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Stay,
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Unit offset as `(dx, dy)`. `Up` decreases `y`, `Left` decreases `x`.
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::Stay => (0, 0),
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Applies the offset to `pos`. Returns `None` when the move would
    /// leave the non-negative coordinate range.
    pub fn apply(self, pos: Position) -> Option<Position> {
        let (dx, dy) = self.offset();
        Some(Position {
            x: pos.x.checked_add_signed(dx)?,
            y: pos.y.checked_add_signed(dy)?,
        })
    }
}

impl FromStr for Direction {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stay" => Ok(Direction::Stay),
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            _ => Err(StepError::UnknownDirection {
                token: s.to_string(),
            }),
        }
    }
}

/// Holds the per-episode state of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: AgentId,
    pub color: AgentColor,
    pub position: Position,
    pub goal: Position,
    /// Monotonic within an episode: once true, the agent is frozen at its
    /// goal cell until `reset`.
    pub reached_goal: bool,
}

/// Provides a read-only view of the current world state.
///
/// Consumed by policies and renderers; holding a view borrows the world, so
/// no step can run while a view is alive.
#[derive(Debug, Clone, Copy)]
pub struct WorldView<'a> {
    pub grid: &'a GridMap,
    pub agents: &'a [AgentState],
}

impl WorldView<'_> {
    /// Returns the agent currently occupying `pos`, if any.
    pub fn agent_at(&self, pos: Position) -> Option<&AgentState> {
        self.agents.iter().find(|a| a.position == pos)
    }
}

/// The joint result of one step (or of a reset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Agent positions after the step, indexed by agent id.
    pub positions: Vec<Position>,
    /// Per-agent goal flags after the step, indexed by agent id.
    pub reached_goals: Vec<bool>,
    /// True iff every agent stands on its own goal.
    pub episode_done: bool,
}

/// Manages an episodic multi-agent gridworld.
///
/// Agents move synchronously in the four cardinal directions over a shared
/// [`GridMap`]; moves into walls, out of bounds, or into conflict with
/// another agent are rejected in place. The episode ends once every agent
/// occupies its own goal cell, after which agents stay frozen until
/// [`MultiAgentGridWorld::reset`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiAgentGridWorld {
    grid: GridMap,
    agents: Vec<AgentState>,
    starts: Vec<Position>,
}

impl MultiAgentGridWorld {
    /// Creates a new world from a grid and per-agent start/goal cells.
    ///
    /// Index `i` of `starts` and `goals` describes agent `i`. When `colors`
    /// is `None`, colors are assigned by cycling [`AgentColor::PALETTE`].
    /// An agent whose start equals its goal begins the episode done.
    ///
    /// Start and goal cells must be free on the grid; starts must be
    /// pairwise distinct and goals must be pairwise distinct. One agent's
    /// start may coincide with a different agent's goal.
    pub fn new(
        grid: GridMap,
        starts: Vec<Position>,
        goals: Vec<Position>,
        colors: Option<Vec<AgentColor>>,
    ) -> Result<Self, ConfigError> {
        if starts.len() != goals.len() {
            return Err(ConfigError::LengthMismatch {
                starts: starts.len(),
                goals: goals.len(),
            });
        }
        if let Some(colors) = &colors {
            if colors.len() != starts.len() {
                return Err(ConfigError::ColorCountMismatch {
                    colors: colors.len(),
                    agents: starts.len(),
                });
            }
        }

        let mut seen_starts: HashSet<Position> = HashSet::new();
        let mut seen_goals: HashSet<Position> = HashSet::new();
        for (id, (&start, &goal)) in starts.iter().zip(&goals).enumerate() {
            if !grid.is_free(start) {
                return Err(ConfigError::BlockedStart { agent: id, pos: start });
            }
            if !grid.is_free(goal) {
                return Err(ConfigError::BlockedGoal { agent: id, pos: goal });
            }
            if !seen_starts.insert(start) {
                let first = starts.iter().position(|&p| p == start).unwrap();
                return Err(ConfigError::DuplicateStart {
                    first,
                    second: id,
                    pos: start,
                });
            }
            if !seen_goals.insert(goal) {
                let first = goals.iter().position(|&p| p == goal).unwrap();
                return Err(ConfigError::DuplicateGoal {
                    first,
                    second: id,
                    pos: goal,
                });
            }
        }

        let agents = starts
            .iter()
            .zip(&goals)
            .enumerate()
            .map(|(id, (&position, &goal))| AgentState {
                id,
                color: match &colors {
                    Some(colors) => colors[id],
                    None => AgentColor::PALETTE[id % AgentColor::PALETTE.len()],
                },
                position,
                goal,
                reached_goal: position == goal,
            })
            .collect();

        Ok(MultiAgentGridWorld {
            grid,
            agents,
            starts,
        })
    }

    /// Returns the number of agents in the world.
    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    /// Returns the shared wall grid.
    pub fn grid(&self) -> &GridMap {
        &self.grid
    }

    /// Returns a read-only view of the current state.
    pub fn snapshot(&self) -> WorldView<'_> {
        WorldView {
            grid: &self.grid,
            agents: &self.agents,
        }
    }

    /// True iff every agent stands on its own goal.
    pub fn is_done(&self) -> bool {
        self.agents.iter().all(|a| a.reached_goal)
    }

    /// Advances the simulation by one synchronous step.
    ///
    /// Takes one intended direction per agent, in agent-id order. All moves
    /// are resolved against the pre-step state and applied atomically:
    ///
    /// 1. Agents that already reached their goal stay frozen regardless of
    ///    their direction.
    /// 2. Out-of-bounds and wall targets revert to the current cell.
    /// 3. Two or more agents resolving to the same cell all revert, and a
    ///    pair of agents exchanging cells both revert. Rejection is
    ///    symmetric: no agent wins a contested cell by iteration order.
    ///    Reverted agents can block agents behind them, so resolution
    ///    repeats until a fixed point. An agent may still enter a cell
    ///    whose occupant moves out in the same step.
    ///
    /// No two agents ever occupy the same cell after a step.
    pub fn step(&mut self, directions: &[Direction]) -> Result<StepOutcome, StepError> {
        if directions.len() != self.agents.len() {
            return Err(StepError::DirectionCountMismatch {
                expected: self.agents.len(),
                found: directions.len(),
            });
        }

        let current: Vec<Position> = self.agents.iter().map(|a| a.position).collect();

        // Candidate cells against walls and bounds only; inter-agent
        // conflicts are resolved below.
        let mut next: Vec<Position> = self
            .agents
            .iter()
            .zip(directions)
            .map(|(agent, &direction)| {
                if agent.reached_goal {
                    return agent.position;
                }
                match direction.apply(agent.position) {
                    Some(target) if self.grid.is_free(target) => target,
                    _ => agent.position,
                }
            })
            .collect();

        // Fixed-point conflict resolution. Each pass evaluates every mover
        // against the same snapshot of `next`, so contested cells reject
        // all contenders in the same pass rather than the ones visited
        // later. Each pass reverts at least one mover, bounding the loop
        // by the agent count.
        loop {
            let mut revert = vec![false; next.len()];
            for i in 0..next.len() {
                if next[i] == current[i] {
                    continue;
                }
                for j in 0..next.len() {
                    if i == j {
                        continue;
                    }
                    // Shared destination, whether j moves there or stays there.
                    if next[j] == next[i] {
                        revert[i] = true;
                        break;
                    }
                    // Pairwise swap.
                    if next[i] == current[j] && next[j] == current[i] {
                        revert[i] = true;
                        break;
                    }
                }
            }
            if !revert.iter().any(|&r| r) {
                break;
            }
            for (i, reverted) in revert.into_iter().enumerate() {
                if reverted {
                    next[i] = current[i];
                }
            }
        }

        for (agent, position) in self.agents.iter_mut().zip(next) {
            agent.position = position;
            if !agent.reached_goal {
                agent.reached_goal = agent.position == agent.goal;
            }
        }

        Ok(self.outcome())
    }

    /// Returns the world to its initial state: agents back on their start
    /// cells with goal flags cleared, except for agents whose start equals
    /// their goal.
    pub fn reset(&mut self) -> StepOutcome {
        for (agent, &start) in self.agents.iter_mut().zip(&self.starts) {
            agent.position = start;
            agent.reached_goal = start == agent.goal;
        }
        self.outcome()
    }

    fn outcome(&self) -> StepOutcome {
        StepOutcome {
            positions: self.agents.iter().map(|a| a.position).collect(),
            reached_goals: self.agents.iter().map(|a| a.reached_goal).collect(),
            episode_done: self.is_done(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapCatalog;

    fn open_map(size: usize) -> GridMap {
        let row = "0".repeat(size);
        let rows: Vec<String> = (0..size).map(|_| row.clone()).collect();
        GridMap::from_rows(&rows).unwrap()
    }

    fn preset_4x4() -> GridMap {
        GridMap::from_preset(&MapCatalog::default(), "4x4").unwrap()
    }

    fn world(
        grid: GridMap,
        starts: &[(usize, usize)],
        goals: &[(usize, usize)],
    ) -> MultiAgentGridWorld {
        MultiAgentGridWorld::new(
            grid,
            starts.iter().map(|&(x, y)| Position::new(x, y)).collect(),
            goals.iter().map(|&(x, y)| Position::new(x, y)).collect(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn construction_rejects_length_mismatch() {
        let err = MultiAgentGridWorld::new(
            open_map(4),
            vec![Position::new(0, 0)],
            vec![],
            None,
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::LengthMismatch { starts: 1, goals: 0 });
    }

    #[test]
    fn construction_rejects_blocked_cells() {
        let err = MultiAgentGridWorld::new(
            preset_4x4(),
            vec![Position::new(1, 1)],
            vec![Position::new(0, 0)],
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::BlockedStart {
                agent: 0,
                pos: Position::new(1, 1)
            }
        );

        let err = MultiAgentGridWorld::new(
            preset_4x4(),
            vec![Position::new(0, 0)],
            vec![Position::new(4, 0)],
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::BlockedGoal {
                agent: 0,
                pos: Position::new(4, 0)
            }
        );
    }

    #[test]
    fn construction_rejects_duplicates() {
        let err = MultiAgentGridWorld::new(
            open_map(4),
            vec![Position::new(0, 0), Position::new(0, 0)],
            vec![Position::new(1, 0), Position::new(2, 0)],
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateStart {
                first: 0,
                second: 1,
                pos: Position::new(0, 0)
            }
        );

        let err = MultiAgentGridWorld::new(
            open_map(4),
            vec![Position::new(0, 0), Position::new(1, 0)],
            vec![Position::new(2, 0), Position::new(2, 0)],
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateGoal {
                first: 0,
                second: 1,
                pos: Position::new(2, 0)
            }
        );
    }

    #[test]
    fn start_may_equal_another_agents_goal() {
        let w = world(open_map(4), &[(0, 0), (3, 0)], &[(3, 0), (0, 3)]);
        assert!(!w.is_done());
    }

    #[test]
    fn start_on_own_goal_begins_done() {
        let w = world(open_map(4), &[(0, 0), (1, 0)], &[(0, 0), (3, 3)]);
        assert!(w.snapshot().agents[0].reached_goal);
        assert!(!w.snapshot().agents[1].reached_goal);
        assert!(!w.is_done());
    }

    #[test]
    fn colors_cycle_when_unassigned() {
        let starts: Vec<Position> = (0..9).map(|i| Position::new(i, 0)).collect();
        let goals: Vec<Position> = (0..9).map(|i| Position::new(i, 8)).collect();
        let w = MultiAgentGridWorld::new(open_map(9), starts, goals, None).unwrap();
        let agents = w.snapshot().agents.to_vec();
        assert_eq!(agents[0].color, AgentColor::Red);
        assert_eq!(agents[7].color, AgentColor::Red);
        assert_eq!(agents[8].color, AgentColor::Green);
    }

    #[test]
    fn rejects_direction_count_mismatch() {
        let mut w = world(open_map(4), &[(0, 0)], &[(3, 3)]);
        let err = w.step(&[Direction::Up, Direction::Up]).unwrap_err();
        assert_eq!(err, StepError::DirectionCountMismatch { expected: 1, found: 2 });
    }

    #[test]
    fn direction_tokens_parse() {
        assert_eq!("up".parse::<Direction>().unwrap(), Direction::Up);
        assert_eq!("Right".parse::<Direction>().unwrap(), Direction::Right);
        assert_eq!(
            "north".parse::<Direction>().unwrap_err(),
            StepError::UnknownDirection {
                token: "north".to_string()
            }
        );
    }

    #[test]
    fn wall_and_bounds_moves_stay_in_place() {
        let mut w = world(preset_4x4(), &[(0, 0), (0, 1)], &[(3, 3), (2, 2)]);
        // Agent 0 walks off the top edge, agent 1 into the wall at (1, 1).
        let out = w.step(&[Direction::Up, Direction::Right]).unwrap();
        assert_eq!(out.positions, vec![Position::new(0, 0), Position::new(0, 1)]);
        // Agent 0 walks off the left edge.
        let out = w.step(&[Direction::Left, Direction::Stay]).unwrap();
        assert_eq!(out.positions[0], Position::new(0, 0));
    }

    #[test]
    fn example_scenario_from_4x4_map() {
        let mut w = world(preset_4x4(), &[(0, 0), (3, 0)], &[(3, 3), (0, 0)]);
        let out = w.step(&[Direction::Right, Direction::Left]).unwrap();
        assert_eq!(out.positions, vec![Position::new(1, 0), Position::new(2, 0)]);
        assert!(!out.episode_done);
    }

    #[test]
    fn contested_cell_rejects_both_movers() {
        let mut w = world(open_map(4), &[(0, 0), (2, 0)], &[(3, 3), (0, 3)]);
        let out = w.step(&[Direction::Right, Direction::Left]).unwrap();
        assert_eq!(out.positions, vec![Position::new(0, 0), Position::new(2, 0)]);
    }

    #[test]
    fn contested_cell_rejects_every_mover() {
        // Three agents all target (1, 1).
        let mut w = world(
            open_map(3),
            &[(0, 1), (2, 1), (1, 0)],
            &[(2, 2), (0, 0), (0, 2)],
        );
        let out = w
            .step(&[Direction::Right, Direction::Left, Direction::Down])
            .unwrap();
        assert_eq!(
            out.positions,
            vec![Position::new(0, 1), Position::new(2, 1), Position::new(1, 0)]
        );
    }

    #[test]
    fn cannot_move_onto_staying_agent() {
        let mut w = world(open_map(4), &[(0, 0), (1, 0)], &[(3, 3), (0, 3)]);
        let out = w.step(&[Direction::Right, Direction::Stay]).unwrap();
        assert_eq!(out.positions, vec![Position::new(0, 0), Position::new(1, 0)]);
    }

    #[test]
    fn cannot_swap_cells() {
        let mut w = world(open_map(4), &[(0, 0), (1, 0)], &[(3, 3), (0, 3)]);
        let out = w.step(&[Direction::Right, Direction::Left]).unwrap();
        assert_eq!(out.positions, vec![Position::new(0, 0), Position::new(1, 0)]);
    }

    #[test]
    fn may_follow_a_vacating_agent() {
        let mut w = world(open_map(4), &[(0, 0), (1, 0)], &[(3, 3), (3, 0)]);
        let out = w.step(&[Direction::Right, Direction::Right]).unwrap();
        assert_eq!(out.positions, vec![Position::new(1, 0), Position::new(2, 0)]);
    }

    #[test]
    fn blocked_leader_blocks_the_train() {
        // Leader runs into a wall; the follower behind it must also stay.
        let grid = GridMap::from_rows(&["0010", "0000"]).unwrap();
        let mut w = world(grid, &[(0, 0), (1, 0)], &[(0, 1), (1, 1)]);
        let out = w.step(&[Direction::Right, Direction::Right]).unwrap();
        assert_eq!(out.positions, vec![Position::new(0, 0), Position::new(1, 0)]);
    }

    #[test]
    fn no_two_agents_share_a_cell_after_any_step() {
        let mut w = world(
            open_map(3),
            &[(0, 0), (1, 0), (2, 0), (0, 1)],
            &[(2, 2), (1, 2), (0, 2), (2, 1)],
        );
        let batches = [
            [Direction::Right, Direction::Right, Direction::Down, Direction::Up],
            [Direction::Down, Direction::Down, Direction::Left, Direction::Right],
            [Direction::Right, Direction::Left, Direction::Stay, Direction::Up],
            [Direction::Down, Direction::Down, Direction::Down, Direction::Down],
        ];
        for batch in &batches {
            let out = w.step(batch).unwrap();
            let unique: HashSet<Position> = out.positions.iter().copied().collect();
            assert_eq!(unique.len(), out.positions.len());
        }
    }

    #[test]
    fn freeze_on_goal() {
        let mut w = world(open_map(4), &[(0, 0)], &[(1, 0)]);
        let out = w.step(&[Direction::Right]).unwrap();
        assert!(out.reached_goals[0]);
        assert!(out.episode_done);
        // Frozen regardless of further input.
        for direction in [Direction::Left, Direction::Down, Direction::Up] {
            let out = w.step(&[direction]).unwrap();
            assert_eq!(out.positions[0], Position::new(1, 0));
            assert!(out.reached_goals[0]);
        }
    }

    #[test]
    fn done_only_when_all_agents_on_goal() {
        let mut w = world(open_map(4), &[(0, 0), (0, 1)], &[(1, 0), (1, 1)]);
        let out = w.step(&[Direction::Right, Direction::Stay]).unwrap();
        assert!(out.reached_goals[0]);
        assert!(!out.reached_goals[1]);
        assert!(!out.episode_done);
        let out = w.step(&[Direction::Stay, Direction::Right]).unwrap();
        assert!(out.episode_done);
        assert!(w.is_done());
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut w = world(open_map(4), &[(0, 0), (3, 3)], &[(1, 0), (3, 3)]);
        w.step(&[Direction::Right, Direction::Stay]).unwrap();
        assert!(w.is_done());
        let out = w.reset();
        assert_eq!(out.positions, vec![Position::new(0, 0), Position::new(3, 3)]);
        assert_eq!(out.reached_goals, vec![false, true]);
        assert!(!out.episode_done);
    }

    #[test]
    fn identical_runs_are_identical() {
        let batches = [
            [Direction::Right, Direction::Left],
            [Direction::Down, Direction::Down],
            [Direction::Right, Direction::Stay],
        ];
        let run = |mut w: MultiAgentGridWorld| -> Vec<StepOutcome> {
            batches.iter().map(|b| w.step(b).unwrap()).collect()
        };
        let a = run(world(preset_4x4(), &[(0, 0), (3, 0)], &[(3, 3), (0, 0)]));
        let b = run(world(preset_4x4(), &[(0, 0), (3, 0)], &[(3, 3), (0, 0)]));
        assert_eq!(a, b);
    }

    #[test]
    fn snapshot_reports_occupancy() {
        let w = world(open_map(4), &[(0, 0), (2, 1)], &[(3, 3), (0, 3)]);
        let view = w.snapshot();
        assert_eq!(view.agent_at(Position::new(2, 1)).unwrap().id, 1);
        assert!(view.agent_at(Position::new(1, 1)).is_none());
    }
}
