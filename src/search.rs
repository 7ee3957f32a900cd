use std::fmt::Write;

use bevy::prelude::Vec3;
use serde::{Deserialize, Serialize};

use crate::grid::{GridPos, Heading};
use crate::tools::{self, ToolId, ToolState};

/// One planned step, carried as plain data on the node that produced it
/// and interpreted later by the executor.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Action {
    /// Turn a rotatable tool by a single quarter turn (+1 clockwise).
    RotateTool { tool: ToolId, quarter_turns: i8 },
    /// Move a movable tool to a cell and orient it, atomically.
    PlaceTool {
        tool: ToolId,
        cell: GridPos,
        facing: Heading,
    },
    /// Put the cube on a cell with a resulting heading.
    MoveCube { cell: GridPos, heading: Heading },
}

impl Action {
    pub fn is_tool_action(&self) -> bool {
        !matches!(self, Action::MoveCube { .. })
    }
}

/// Composite search state: cube pose plus a private snapshot of every
/// tool's transform. Nodes form a tree via arena indices, rooted at the
/// captured start state and owned by one solve invocation.
#[derive(Clone, Debug)]
pub struct SearchNode {
    pub cell: GridPos,
    pub heading: Heading,
    pub tools: Vec<ToolState>,
    pub parent: Option<usize>,
    /// The action that produced this node; `None` only at the root.
    pub action: Option<Action>,
    pub path_cost: u32,
    pub heuristic: u32,
}

impl SearchNode {
    pub fn total_cost(&self) -> u32 {
        self.path_cost.saturating_add(self.heuristic)
    }
}

/// Canonical visited-set key: cube cell and heading plus, per tool, its
/// identity, cell and rotation angle. Two states with equal keys are the
/// same state.
pub fn state_key(cell: GridPos, heading: Heading, tool_states: &[ToolState]) -> String {
    let mut key = format!("{},{},{}", cell.x, cell.z, heading.index());
    for t in tool_states {
        let _ = write!(
            key,
            ":{}@{},{},{}",
            t.id.0,
            t.cell.x,
            t.cell.z,
            t.facing.angle_deg()
        );
    }
    key
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum HeuristicMode {
    DistanceOnly,
    DistanceAndTools,
    Advanced,
}

/// Priority estimate for a node. Greedy, not admissible: the weighted
/// unused-tools term biases the search toward trying tool
/// reconfigurations before long walks.
#[allow(clippy::too_many_arguments)]
pub fn evaluate(
    mode: HeuristicMode,
    distance_weight: f32,
    tools_weight: f32,
    direction_weight: f32,
    position: Vec3,
    heading: Heading,
    tool_states: &[ToolState],
    initial: &[ToolState],
    finish: Vec3,
) -> u32 {
    let distance = (finish - position).length();
    let unused = tools::count_unused(tool_states, initial) as f32;
    let score = match mode {
        HeuristicMode::DistanceOnly => distance * distance_weight,
        HeuristicMode::DistanceAndTools => distance * distance_weight + unused * tools_weight,
        HeuristicMode::Advanced => {
            let alignment = heading.vec().dot((finish - position).normalize_or_zero());
            distance * distance_weight + unused * tools_weight - alignment * direction_weight
        }
    };
    score.max(0.0).round() as u32
}
