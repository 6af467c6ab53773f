// simplify.rs — Control-flow graph simplification
//
// Threads jumps through empty forwarding blocks, merges a block into its
// predecessor when that predecessor is its only one and jumps straight to
// it, then drops whatever became unreachable.

use crate::cfg::Cfg;
use crate::cir::{CirFunction, Terminator};
use crate::id::BlockId;

use super::dce::remove_unreachable;

pub(super) fn run(f: &mut CirFunction) -> bool {
    let mut changed = thread_jumps(f);
    changed |= merge_chains(f);
    changed |= remove_unreachable(f);
    changed
}

/// Final target of a chain of empty `jump` blocks starting at `b`.
fn forward_target(f: &CirFunction, b: BlockId) -> BlockId {
    let mut cur = b;
    for _ in 0..f.blocks.len() {
        let block = f.block(cur);
        match block.term {
            Terminator::Jump(next) if block.insts.is_empty() && next != cur && cur != BlockId(0) => cur = next,
            _ => break,
        }
    }
    cur
}

fn thread_jumps(f: &mut CirFunction) -> bool {
    let targets: Vec<BlockId> = (0..f.blocks.len())
        .map(|i| forward_target(f, BlockId(i as u32)))
        .collect();
    let mut changed = false;
    for b in &mut f.blocks {
        let before = b.term.clone();
        b.term.retarget(|t| targets[t.index()]);
        changed |= b.term != before;
    }
    changed
}

fn merge_chains(f: &mut CirFunction) -> bool {
    let mut changed = false;
    loop {
        let cfg = Cfg::build(f);
        let candidate = cfg.rpo.iter().copied().find_map(|a| match f.block(a).term {
            Terminator::Jump(b)
                if b != a
                    && b != BlockId(0)
                    && cfg.preds[b.index()].iter().filter(|p| cfg.reachable[p.index()]).count() == 1 =>
            {
                Some((a, b))
            }
            _ => None,
        });
        let Some((a, b)) = candidate else {
            break;
        };
        let taken = std::mem::replace(
            &mut f.blocks[b.index()],
            crate::cir::Block {
                insts: Vec::new(),
                term: Terminator::Unreachable,
            },
        );
        let into = &mut f.blocks[a.index()];
        into.insts.extend(taken.insts);
        into.term = taken.term;
        changed = true;
    }
    changed
}
