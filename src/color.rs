//! Stable color identities for evaluation records. The same record keeps
//! one color across the A line, the E line and the subexpression list;
//! a call never shares a color with the records of its own arguments.

use crate::classify::ExprTree;
use crate::eval::Recording;

/// SGR codes of the cyclic palette.
const PALETTE: [u8; 6] = [31, 32, 33, 34, 35, 36];

pub const RESET: &str = "\x1b[0m";

/// Index into the palette, stable for one record within one report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ColorId(u8);

impl ColorId {
    pub fn escape(self) -> String {
        format!("\x1b[{}m", PALETTE[self.0 as usize])
    }
}

/// Assigns palette colors to every displayed record in evaluation order.
/// `pruned` marks subtrees that will not be shown; their records stay
/// uncolored so the palette is spent on visible text only.
pub fn assign_colors(tree: &ExprTree, recording: &mut Recording, pruned: &[bool]) {
    // Collect the descendant set of each record's node first; the borrow
    // on the record table stays exclusive below.
    let descendant_sets: Vec<Vec<usize>> = recording
        .records()
        .iter()
        .map(|r| {
            tree.descendants(r.node)
                .into_iter()
                .map(|n| n.index())
                .collect()
        })
        .collect();

    let mut assigned: Vec<(usize, ColorId)> = Vec::new(); // (node index, color)
    let mut next = 0usize;

    for i in 0..recording.records().len() {
        let node_index = recording.records()[i].node.index();
        if pruned[node_index] {
            continue;
        }

        // A call must stay distinguishable from the argument records it
        // encloses, which were colored before it in evaluation order.
        let forbidden: Vec<ColorId> = assigned
            .iter()
            .filter(|(n, _)| descendant_sets[i].contains(n))
            .map(|&(_, c)| c)
            .collect();

        let mut choice = ColorId((next % PALETTE.len()) as u8);
        for step in 0..PALETTE.len() {
            let candidate = ColorId(((next + step) % PALETTE.len()) as u8);
            if !forbidden.contains(&candidate) {
                choice = candidate;
                break;
            }
        }
        next = choice.0 as usize + 1;

        assigned.push((node_index, choice));
        recording.records_mut()[i].color = Some(choice);
    }
}
