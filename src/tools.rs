use serde::{Deserialize, Serialize};

use crate::grid::{GridPos, Heading};
use crate::level::LevelQuery;

/// Identity of a reconfigurable tile, stable for the lifetime of a scene.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct ToolId(pub u32);

/// What a player (or the executor) may do with a tool.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ToolKind {
    Rotatable,
    Movable,
}

/// Snapshot of one tool's transform: lattice cell plus facing, which is
/// always a whole number of quarter turns about the vertical axis.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ToolState {
    pub id: ToolId,
    pub kind: ToolKind,
    pub cell: GridPos,
    pub facing: Heading,
}

/// Enumerate every reconfigurable tile in the scene as an immutable,
/// id-ordered snapshot. Positions are lattice cells, so they are
/// grid-snapped by construction.
pub fn capture(query: &impl LevelQuery) -> Vec<ToolState> {
    let mut states = query.tool_states();
    states.sort_by_key(|t| t.id.0);
    states
}

/// Deep-copy a snapshot so a hypothetical search state can be mutated
/// without touching the registry's captured values or sibling nodes.
pub fn clone_states(states: &[ToolState]) -> Vec<ToolState> {
    states.to_vec()
}

/// The single tool whose cell or facing differs between two snapshots,
/// taken from `a`. Assumes at most one tool changes per transition; a
/// multi-tool change reports only the first difference, which is why
/// plan actions are recorded explicitly rather than inferred from here.
pub fn diff<'a>(a: &'a [ToolState], b: &[ToolState]) -> Option<&'a ToolState> {
    a.iter().find(|ta| {
        b.iter()
            .find(|tb| tb.id == ta.id)
            .is_none_or(|tb| tb.cell != ta.cell || tb.facing != ta.facing)
    })
}

/// How many tools still sit at their captured initial facing. The
/// heuristic reads this as "tools not yet put to use".
pub fn count_unused(current: &[ToolState], initial: &[ToolState]) -> usize {
    current
        .iter()
        .filter(|t| {
            initial
                .iter()
                .find(|i| i.id == t.id)
                .is_some_and(|i| i.facing == t.facing)
        })
        .count()
}
