use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, VecDeque},
};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    Position,
    world::{Direction, WorldView},
};

/// Trait defining a direction supplier for one agent.
///
/// Policies live outside the step transition: the world never consults
/// them. A driver asks each agent's policy for a direction against a
/// pre-step [`WorldView`], then feeds the whole batch to the world.
/// `&mut self` allows the policy to maintain internal state (e.g. a
/// cached plan).
pub trait Policy {
    fn decide(&mut self, view: &WorldView, agent: usize) -> Direction;
}

/// A policy that picks uniformly among the five directions.
#[derive(Debug)]
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn decide(&mut self, _view: &WorldView, _agent: usize) -> Direction {
        match self.rng.random_range(0..5) {
            0 => Direction::Stay,
            1 => Direction::Up,
            2 => Direction::Down,
            3 => Direction::Left,
            _ => Direction::Right,
        }
    }
}

/// A policy that walks an A* path towards the agent's own goal.
///
/// Other agents' current cells are treated as blocked while planning; when
/// the cached plan runs into one, the policy drops the plan, stays for a
/// step and replans on the next tick.
#[derive(Debug, Default)]
pub struct PathPolicy {
    plan: VecDeque<Position>,
}

impl PathPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the manhattan distance between two positions.
    fn manhattan_distance(a: &Position, b: &Position) -> usize {
        a.x.abs_diff(b.x) + a.y.abs_diff(b.y)
    }

    /// Converts a move between two adjacent positions into a Direction.
    fn step_between(src: Position, dst: Position) -> Direction {
        let dx = dst.x as isize - src.x as isize;
        let dy = dst.y as isize - src.y as isize;
        match (dx, dy) {
            (0, -1) => Direction::Up,
            (0, 1) => Direction::Down,
            (-1, 0) => Direction::Left,
            (1, 0) => Direction::Right,
            _ => Direction::Stay,
        }
    }

    /// Cardinal neighbors that are free and not occupied by another agent.
    fn open_neighbors(position: Position, view: &WorldView, agent: usize) -> Vec<Position> {
        [Direction::Up, Direction::Down, Direction::Left, Direction::Right]
            .into_iter()
            .filter_map(|d| d.apply(position))
            .filter(|&p| view.grid.is_free(p))
            .filter(|&p| match view.agent_at(p) {
                Some(other) => other.id == agent,
                None => true,
            })
            .collect()
    }

    /// A* pathfinding over the wall grid, from `start` to `goal` inclusive.
    fn a_star_path(
        start: Position,
        goal: Position,
        view: &WorldView,
        agent: usize,
    ) -> Option<Vec<Position>> {
        // For priority queue
        #[derive(Clone, Eq, PartialEq)]
        struct PrioritizedCell {
            priority: usize,
            position: Position,
        }

        impl Ord for PrioritizedCell {
            fn cmp(&self, other: &Self) -> Ordering {
                // Reverse ordering for min-heap behavior, with position as
                // a deterministic tie-break.
                other
                    .priority
                    .cmp(&self.priority)
                    .then_with(|| (other.position.y, other.position.x).cmp(&(self.position.y, self.position.x)))
            }
        }

        impl PartialOrd for PrioritizedCell {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut frontier = BinaryHeap::new();
        let mut came_from: HashMap<Position, Position> = HashMap::new();
        let mut cost_so_far: HashMap<Position, usize> = HashMap::new();

        frontier.push(PrioritizedCell {
            priority: 0,
            position: start,
        });
        cost_so_far.insert(start, 0);

        let mut goal_reached = false;

        while let Some(PrioritizedCell {
            position: current, ..
        }) = frontier.pop()
        {
            if current == goal {
                goal_reached = true;
                break;
            }

            for neighbor in Self::open_neighbors(current, view, agent) {
                let new_cost = cost_so_far[&current] + 1;
                if cost_so_far
                    .get(&neighbor)
                    .is_none_or(|&cost| new_cost < cost)
                {
                    cost_so_far.insert(neighbor, new_cost);
                    frontier.push(PrioritizedCell {
                        priority: new_cost + Self::manhattan_distance(&neighbor, &goal),
                        position: neighbor,
                    });
                    came_from.insert(neighbor, current);
                }
            }
        }

        if !goal_reached {
            return None;
        }

        // Reconstruct path
        let mut path = vec![goal];
        let mut current = goal;
        while current != start {
            current = *came_from.get(&current)?;
            path.push(current);
        }
        path.reverse();
        Some(path)
    }
}

impl Policy for PathPolicy {
    fn decide(&mut self, view: &WorldView, agent: usize) -> Direction {
        let me = &view.agents[agent];
        if me.reached_goal || me.position == me.goal {
            self.plan.clear();
            return Direction::Stay;
        }

        // The plan front is consumed only once the agent is observed there,
        // so a move the world rejected is simply retried or replanned.
        if self.plan.front() == Some(&me.position) {
            self.plan.pop_front();
        }

        // Drop the plan if its next cell is no longer adjacent or got
        // occupied since planning.
        if let Some(&next) = self.plan.front() {
            if Self::manhattan_distance(&me.position, &next) != 1
                || view.agent_at(next).is_some()
            {
                self.plan.clear();
            }
        }

        if self.plan.is_empty() {
            match Self::a_star_path(me.position, me.goal, view, agent) {
                Some(path) if path.len() > 1 => {
                    // Skip the first position (current position).
                    self.plan.extend(path.into_iter().skip(1));
                }
                // Goal unreachable right now; wait and replan next tick.
                _ => return Direction::Stay,
            }
        }

        match self.plan.front() {
            Some(&next) => Self::step_between(me.position, next),
            None => Direction::Stay,
        }
    }
}
