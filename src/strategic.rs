use crate::components::GameConfig;
use crate::grid::{GridPos, Heading};
use crate::level::{LevelQuery, TileKind};
use crate::search::Action;
use crate::solver::{cell_walkable, Plan, SolverConfig};
use crate::tools::{self, ToolKind, ToolState};

/// Alternate planning strategy: enumerate lattice paths from the start
/// pose under a rotation budget (one movable tool per turn), pick the
/// feasible path with the fewest turns, then emit one `PlaceTool` per
/// turn cell followed by the cube moves. Produces the same `Plan` shape
/// as the best-first search.
pub fn solve(
    query: &impl LevelQuery,
    start_cell: GridPos,
    start_heading: Heading,
    cfg: &SolverConfig,
    game: &GameConfig,
) -> Option<Plan> {
    let finish = query.finish_center()?;
    let ts = query.tile_size();
    let finish_cell = GridPos::from_world(finish, ts);

    let initial_tools = tools::capture(query);
    let movable: Vec<ToolState> = initial_tools
        .iter()
        .copied()
        .filter(|t| t.kind == ToolKind::Movable)
        .collect();

    let mut found: Vec<(Vec<GridPos>, usize)> = Vec::new();
    let mut path = vec![start_cell];
    enumerate_paths(
        query,
        game.ground_probe,
        cfg.max_path_len,
        finish_cell,
        start_cell,
        start_heading,
        &mut path,
        0,
        movable.len(),
        &mut found,
    );
    if found.is_empty() {
        return None;
    }
    // Fewest turns first; discovery order breaks ties.
    found.sort_by_key(|(_, rotations)| *rotations);
    let examined = found.len();

    'candidates: for (cells, _) in found {
        let mut actions = Vec::new();
        let mut heading = start_heading;
        let mut next_tool = movable.iter();

        // Assign one tool to every cell where the path changes direction.
        for window in cells.windows(2) {
            let dir = step_heading(window[0], window[1])?;
            if dir != heading {
                let Some(tool) = next_tool.next() else {
                    continue 'candidates;
                };
                if !tool_placeable(query, window[0], tool.id.0, game.ground_probe) {
                    continue 'candidates;
                }
                actions.push(Action::PlaceTool {
                    tool: tool.id,
                    cell: window[0],
                    facing: dir,
                });
                heading = dir;
            }
        }

        let mut heading = start_heading;
        for window in cells.windows(2) {
            let dir = step_heading(window[0], window[1])?;
            heading = dir;
            actions.push(Action::MoveCube {
                cell: window[1],
                heading,
            });
        }

        return Some(Plan {
            actions,
            initial_tools,
            expanded: examined,
        });
    }
    None
}

fn step_heading(from: GridPos, to: GridPos) -> Option<Heading> {
    Heading::ALL
        .into_iter()
        .find(|h| from.offset(*h, 1) == to)
}

/// A tool may land on a plain ground cell that holds no other tool.
fn tool_placeable(query: &impl LevelQuery, cell: GridPos, tool_id: u32, probe: f32) -> bool {
    let ts = query.tile_size();
    match query.tile_under(cell.to_world(ts, ts * 0.5), probe) {
        Some(tile) => {
            tile.id == tool_id || (tile.kind == TileKind::Ground && tile.tool.is_none())
        }
        None => false,
    }
}

#[allow(clippy::too_many_arguments)]
fn enumerate_paths(
    query: &impl LevelQuery,
    probe: f32,
    max_len: usize,
    finish_cell: GridPos,
    current: GridPos,
    heading: Heading,
    path: &mut Vec<GridPos>,
    rotations: usize,
    budget: usize,
    found: &mut Vec<(Vec<GridPos>, usize)>,
) {
    if current == finish_cell {
        found.push((path.clone(), rotations));
        return;
    }
    if path.len() > max_len {
        return;
    }

    // Straight ahead at no rotation cost.
    let ahead = current.offset(heading, 1);
    if cell_walkable(query, ahead, probe) && !path.contains(&ahead) {
        path.push(ahead);
        enumerate_paths(
            query, probe, max_len, finish_cell, ahead, heading, path, rotations, budget, found,
        );
        path.pop();
    }

    // Branch left and right while tools remain to pay for the turn.
    if rotations < budget {
        for turn in [1i8, -1] {
            let dir = heading.turned(turn);
            let side = current.offset(dir, 1);
            if cell_walkable(query, side, probe) && !path.contains(&side) {
                path.push(side);
                enumerate_paths(
                    query,
                    probe,
                    max_len,
                    finish_cell,
                    side,
                    dir,
                    path,
                    rotations + 1,
                    budget,
                    found,
                );
                path.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use crate::tools::ToolId;

    fn l_shaped_level(with_tool: bool) -> Level {
        let mut level = Level::new(1.0);
        for z in 0..=2 {
            level.push(TileKind::Ground, GridPos::new(0, z), Heading::North);
        }
        for x in 1..=2 {
            level.push(TileKind::Ground, GridPos::new(x, 2), Heading::North);
        }
        level.push(TileKind::Finish, GridPos::new(2, 2), Heading::North);
        if with_tool {
            // A movable direction tool parked off the route.
            level.push_tool(
                TileKind::Direction,
                GridPos::new(4, 0),
                Heading::North,
                ToolKind::Movable,
            );
        }
        level
    }

    fn run(level: &Level) -> Option<Plan> {
        solve(
            level,
            level.start_cell,
            level.start_heading,
            &SolverConfig::default(),
            &GameConfig::default(),
        )
    }

    #[test]
    fn straight_run_needs_no_tools() {
        let level = Level::corridor(4);
        let plan = run(&level).expect("straight corridor is solvable");
        assert_eq!(plan.tool_action_count(), 0);
        assert_eq!(plan.actions.len(), 4);
    }

    #[test]
    fn one_turn_places_one_tool_at_the_corner() {
        let level = l_shaped_level(true);
        let plan = run(&level).expect("one movable tool covers one turn");
        assert_eq!(
            plan.actions[0],
            Action::PlaceTool {
                tool: ToolId(
                    level
                        .tool_states()
                        .first()
                        .map(|t| t.id.0)
                        .unwrap()
                ),
                cell: GridPos::new(0, 2),
                facing: Heading::East,
            }
        );
        let moves: Vec<Action> = plan
            .actions
            .iter()
            .copied()
            .filter(|a| !a.is_tool_action())
            .collect();
        assert_eq!(
            moves,
            vec![
                Action::MoveCube {
                    cell: GridPos::new(0, 1),
                    heading: Heading::North,
                },
                Action::MoveCube {
                    cell: GridPos::new(0, 2),
                    heading: Heading::North,
                },
                Action::MoveCube {
                    cell: GridPos::new(1, 2),
                    heading: Heading::East,
                },
                Action::MoveCube {
                    cell: GridPos::new(2, 2),
                    heading: Heading::East,
                },
            ]
        );
    }

    #[test]
    fn turn_without_movable_tools_is_infeasible() {
        let level = l_shaped_level(false);
        assert!(run(&level).is_none());
    }

    #[test]
    fn budget_limits_the_number_of_turns() {
        // A zig-zag needing two turns with only one movable tool.
        let mut level = Level::new(1.0);
        for z in 0..=2 {
            level.push(TileKind::Ground, GridPos::new(0, z), Heading::North);
        }
        level.push(TileKind::Ground, GridPos::new(1, 2), Heading::North);
        for z in 3..=4 {
            level.push(TileKind::Ground, GridPos::new(1, z), Heading::North);
        }
        level.push(TileKind::Finish, GridPos::new(1, 4), Heading::North);
        level.push_tool(
            TileKind::Direction,
            GridPos::new(4, 0),
            Heading::North,
            ToolKind::Movable,
        );
        assert!(run(&level).is_none());

        level.push_tool(
            TileKind::Direction,
            GridPos::new(5, 0),
            Heading::North,
            ToolKind::Movable,
        );
        let plan = run(&level).expect("two tools cover two turns");
        assert_eq!(plan.tool_action_count(), 2);
    }
}
