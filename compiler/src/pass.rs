// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the compiler's semantic passes (parse is outside the runner),
// their dependency edges, and the artifacts they produce. Used by the pipeline
// runner to compute minimal pass subsets for each --emit target.

use std::collections::HashSet;

// ── Stage certificates ─────────────────────────────────────────────────────

/// Postcondition record produced by a verifying stage.
pub trait StageCert {
    /// True if every obligation holds.
    fn all_pass(&self) -> bool;
    /// Each obligation by name, with whether it holds.
    fn obligations(&self) -> Vec<(&'static str, bool)>;

    /// Names of the obligations that do not hold.
    fn failed(&self) -> Vec<&'static str> {
        self.obligations()
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name)
            .collect()
    }
}

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each compiler pass (parse excluded — handled before the runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Check,
    Lower,
    Optimize,
    Codegen,
}

/// Machine-readable artifact identifiers. Each maps to a concrete type
/// in the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Typed,     // TypedProgram
    Cir,       // CirProgram (as lowered)
    LowerCert, // CirCert of the lowered program
    Optimized, // CirProgram (after the optimizer)
    OptCert,   // CirCert of the optimized program
    Generated, // GeneratedCode
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a compiler pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics and `--verbose` output.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// What invalidates this pass's output.
    pub invalidation_key: &'static str,
    /// Postconditions. Logged at debug level with `outputs` and
    /// `invalidation_key` when a pass completes.
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Check => PassDescriptor {
            name: "check",
            inputs: &[],
            outputs: &[ArtifactId::Typed],
            invalidation_key: "program + registry + widening policy",
            invariants: "every expression typed, matches exhaustive, generic calls instantiated",
        },
        PassId::Lower => PassDescriptor {
            name: "lower",
            inputs: &[PassId::Check],
            outputs: &[ArtifactId::Cir, ArtifactId::LowerCert],
            invalidation_key: "program + typed",
            invariants: "C1-C6 obligations verified, generic functions monomorphized",
        },
        PassId::Optimize => PassDescriptor {
            name: "optimize",
            inputs: &[PassId::Lower],
            outputs: &[ArtifactId::Optimized, ArtifactId::OptCert],
            invalidation_key: "cir + opt level",
            invariants: "C1-C6 still hold, observable behavior unchanged",
        },
        PassId::Codegen => PassDescriptor {
            name: "codegen",
            inputs: &[PassId::Optimize],
            outputs: &[ArtifactId::Generated],
            invalidation_key: "optimized cir + codegen options + provenance",
            invariants: "deterministic Rust source emitted",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 4] = [PassId::Check, PassId::Lower, PassId::Optimize, PassId::Codegen];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_passes_check_is_minimal() {
        assert_eq!(required_passes(PassId::Check), vec![PassId::Check]);
    }

    #[test]
    fn required_passes_codegen_includes_all() {
        let passes = required_passes(PassId::Codegen);
        assert_eq!(passes, ALL_PASSES.to_vec());
    }

    #[test]
    fn required_passes_optimize_skips_codegen() {
        let passes = required_passes(PassId::Optimize);
        assert_eq!(passes, vec![PassId::Check, PassId::Lower, PassId::Optimize]);
    }

    #[test]
    fn no_parse_in_pass_id() {
        for pass in &ALL_PASSES {
            assert_ne!(descriptor(*pass).name, "parse");
        }
    }

    #[test]
    fn all_descriptors_have_outputs() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            assert!(!desc.outputs.is_empty(), "pass {:?} has no outputs declared", pass);
        }
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            let order = required_passes(*pass);
            for dep in descriptor(*pass).inputs {
                let dep_pos = order.iter().position(|p| p == dep);
                let self_pos = order.iter().position(|p| p == pass);
                assert!(
                    dep_pos < self_pos,
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }

    struct Two(bool, bool);

    impl StageCert for Two {
        fn all_pass(&self) -> bool {
            self.0 && self.1
        }
        fn obligations(&self) -> Vec<(&'static str, bool)> {
            vec![("first", self.0), ("second", self.1)]
        }
    }

    #[test]
    fn failed_lists_broken_obligations() {
        assert_eq!(Two(true, false).failed(), vec!["second"]);
        assert!(Two(true, true).failed().is_empty());
    }
}
