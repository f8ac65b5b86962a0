//! Line-oriented formula buffer

use crate::smtlib;
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A formula as the ordered list of SMT-LIB lines sent to the solver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Formula {
    lines: Vec<String>,
}

impl Formula {
    /// An empty formula that asks the solver for unsat cores
    pub fn new() -> Self {
        Self {
            lines: vec![smtlib::PRODUCE_UNSAT_CORES.to_string()],
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Banner echoed before a constraint category
    pub fn section(&mut self, title: &str) {
        self.push(smtlib::echo(&format!("{title} CONSTRAINTS -----")));
    }

    pub fn declare_int(&mut self, name: &str) {
        self.push(smtlib::declare_int(name));
    }

    /// Integer constant restricted to `[lo, hi]`
    pub fn declare_bounded(&mut self, name: &str, lo: i64, hi: i64) {
        self.declare_int(name);
        self.assert(&smtlib::ge(name, &lo.to_string()));
        self.assert(&smtlib::le(name, &hi.to_string()));
    }

    pub fn assert(&mut self, expr: &str) {
        self.push(smtlib::assert(expr));
    }

    pub fn assert_named(&mut self, expr: &str, label: &str) {
        self.push(smtlib::named_assert(expr, label));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Labels of every named assertion, in order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter_map(|line| smtlib::split_named_assert(line).map(|(_, label)| label))
    }

    /// Write the formula to `path`, replacing its content
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let mut out = BufWriter::new(fs::File::create(path)?);
        for line in &self.lines {
            writeln!(out, "{line}")?;
        }
        out.flush()
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_formula_enables_cores() {
        let formula = Formula::new();
        assert_eq!(formula.lines(), &[smtlib::PRODUCE_UNSAT_CORES.to_string()]);
    }

    #[test]
    fn test_bounded_declaration() {
        let mut formula = Formula::new();
        formula.declare_bounded("OS-exit-1&a.c@9", 0, 3);
        assert_eq!(
            &formula.lines()[1..],
            &[
                "(declare-const OS-exit-1&a.c@9 Int)".to_string(),
                "(assert (>= OS-exit-1&a.c@9 0))".to_string(),
                "(assert (<= OS-exit-1&a.c@9 3))".to_string(),
            ]
        );
    }

    #[test]
    fn test_labels_and_write() {
        let mut formula = Formula::new();
        formula.section("MEMORY-ORDER");
        formula.assert_named("(< a b)", "MO0");
        formula.assert("(distinct a b)");
        formula.assert_named("(= x 1)", "RWC0");
        assert_eq!(formula.labels().collect::<Vec<_>>(), vec!["MO0", "RWC0"]);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.smt2");
        formula.write_to(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, formula.to_string());
        assert!(text.contains("(echo \"MEMORY-ORDER CONSTRAINTS -----\")"));
    }
}
