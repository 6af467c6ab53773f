// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used across all compiler phases.
// Every diagnostic names the phase that produced it and a JSON pointer into
// the input document.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::Serialize;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0101`, `E0402`).
///
/// Codes are `&'static str` constants defined in the `codes` module. The
/// hundreds digit names the phase: 1 structural, 2 type, 3 lowering,
/// 4 optimization, 5 code generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // Structural (parse) errors.
    pub const E0100: DiagCode = DiagCode("E0100"); // malformed JSON
    pub const E0101: DiagCode = DiagCode("E0101"); // missing required field
    pub const E0102: DiagCode = DiagCode("E0102"); // wrong JSON shape for field
    pub const E0103: DiagCode = DiagCode("E0103"); // unknown key or node kind
    pub const E0104: DiagCode = DiagCode("E0104"); // literal does not fit its type
    pub const E0105: DiagCode = DiagCode("E0105"); // unsupported version

    // Type errors.
    pub const E0200: DiagCode = DiagCode("E0200"); // type mismatch
    pub const E0201: DiagCode = DiagCode("E0201"); // unknown name
    pub const E0202: DiagCode = DiagCode("E0202"); // duplicate declaration
    pub const E0203: DiagCode = DiagCode("E0203"); // arity mismatch
    pub const E0204: DiagCode = DiagCode("E0204"); // operator not defined for type
    pub const E0205: DiagCode = DiagCode("E0205"); // assignment to immutable binding
    pub const E0206: DiagCode = DiagCode("E0206"); // non-exhaustive match
    pub const E0207: DiagCode = DiagCode("E0207"); // missing return
    pub const E0208: DiagCode = DiagCode("E0208"); // bound not satisfied
    pub const E0209: DiagCode = DiagCode("E0209"); // interface or impl error
    pub const E0210: DiagCode = DiagCode("E0210"); // invalid pattern
    pub const E0211: DiagCode = DiagCode("E0211"); // break/continue outside loop
    pub const E0212: DiagCode = DiagCode("E0212"); // distribution misuse
    pub const E0213: DiagCode = DiagCode("E0213"); // cannot infer type
    pub const W0214: DiagCode = DiagCode("W0214"); // unreachable code or arm

    // Lowering.
    pub const E0301: DiagCode = DiagCode("E0301"); // CIR verification failed
    pub const E0302: DiagCode = DiagCode("E0302"); // instantiation limit

    // Optimization.
    pub const E0401: DiagCode = DiagCode("E0401"); // constant division by zero
    pub const W0402: DiagCode = DiagCode("W0402"); // pass reverted after failed verification

    // Code generation.
    pub const E0501: DiagCode = DiagCode("E0501"); // codegen precondition failed
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Phase ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Structural,
    Type,
    Lowering,
    Optimization,
    Codegen,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Structural => "structural",
            Phase::Type => "type",
            Phase::Lowering => "lowering",
            Phase::Optimization => "optimization",
            Phase::Codegen => "codegen",
        })
    }
}

// ── Related span ─────────────────────────────────────────────────────────

/// A secondary location providing context for a diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedSpan {
    pub span: Span,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A compiler diagnostic emitted by any phase.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub phase: Phase,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
    pub related_spans: Vec<RelatedSpan>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, or related spans.
    pub fn new(level: DiagLevel, phase: Phase, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            phase,
            span,
            message: message.into(),
            hint: None,
            related_spans: Vec::new(),
        }
    }

    pub fn error(phase: Phase, span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, phase, span, message)
    }

    pub fn warning(phase: Phase, span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, phase, span, message)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related span.
    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related_spans.push(RelatedSpan {
            span,
            label: label.into(),
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        write!(f, "\n  --> {} ({})", self.span, self.phase)?;
        for related in &self.related_spans {
            write!(f, "\n  note: {} at {}", related.label, related.span)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// True if any diagnostic in the slice is an error.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(Diagnostic::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::root().child("functions").index(0)
    }

    #[test]
    fn display_without_code() {
        let d = Diagnostic::error(Phase::Type, span(), "something failed");
        assert_eq!(
            format!("{d}"),
            "error: something failed\n  --> /functions/0 (type)"
        );
    }

    #[test]
    fn display_with_code() {
        let d = Diagnostic::warning(Phase::Optimization, span(), "pass reverted")
            .with_code(codes::W0402);
        assert_eq!(
            format!("{d}"),
            "warning[W0402]: pass reverted\n  --> /functions/0 (optimization)"
        );
    }

    #[test]
    fn builder_chain() {
        let d = Diagnostic::error(Phase::Type, span(), "type mismatch")
            .with_code(codes::E0200)
            .with_hint("insert an explicit cast")
            .with_related(Span::root(), "declared here");

        assert_eq!(d.code, Some(codes::E0200));
        assert_eq!(d.hint.as_deref(), Some("insert an explicit cast"));
        assert_eq!(d.related_spans.len(), 1);
        assert!(d.is_error());
        assert!(has_errors(&[d]));
    }
}
