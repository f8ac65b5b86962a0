//! SMT-LIB term and command text
//!
//! Terms are plain strings. Empty conjunctions and disjunctions collapse to
//! `true` and `false`, so callers never emit `(and)` or `(or)`.

/// Echoed after every query; marks the end of the solver's answer
pub const END_MARKER: &str = "end";

pub const CHECK_SAT: &str = "(check-sat)";
pub const GET_MODEL: &str = "(get-model)";
pub const GET_UNSAT_CORE: &str = "(get-unsat-core)";
pub const RESET: &str = "(reset)";
pub const EXIT: &str = "(exit)";
pub const PRODUCE_UNSAT_CORES: &str = "(set-option :produce-unsat-cores true)";

pub fn and<S: AsRef<str>>(terms: &[S]) -> String {
    match terms {
        [] => "true".to_string(),
        [single] => single.as_ref().to_string(),
        _ => nary("and", terms),
    }
}

pub fn or<S: AsRef<str>>(terms: &[S]) -> String {
    match terms {
        [] => "false".to_string(),
        [single] => single.as_ref().to_string(),
        _ => nary("or", terms),
    }
}

/// Sum of terms; `0` when empty
pub fn sum<S: AsRef<str>>(terms: &[S]) -> String {
    match terms {
        [] => "0".to_string(),
        [single] => single.as_ref().to_string(),
        _ => nary("+", terms),
    }
}

pub fn distinct<S: AsRef<str>>(terms: &[S]) -> String {
    nary("distinct", terms)
}

/// Strictly increasing chain `(< a b c ...)`
pub fn chain_lt<S: AsRef<str>>(terms: &[S]) -> String {
    nary("<", terms)
}

pub fn eq(lhs: &str, rhs: &str) -> String {
    format!("(= {lhs} {rhs})")
}

pub fn lt(lhs: &str, rhs: &str) -> String {
    format!("(< {lhs} {rhs})")
}

pub fn gt(lhs: &str, rhs: &str) -> String {
    format!("(> {lhs} {rhs})")
}

pub fn le(lhs: &str, rhs: &str) -> String {
    format!("(<= {lhs} {rhs})")
}

pub fn ge(lhs: &str, rhs: &str) -> String {
    format!("(>= {lhs} {rhs})")
}

/// Negation in the form the bug-condition rewrite uses
pub fn invert(expr: &str) -> String {
    format!("(= false {expr})")
}

pub fn declare_int(name: &str) -> String {
    format!("(declare-const {name} Int)")
}

pub fn assert(expr: &str) -> String {
    format!("(assert {expr})")
}

pub fn named_assert(expr: &str, label: &str) -> String {
    format!("(assert (! {expr} :named {label}))")
}

pub fn echo(text: &str) -> String {
    format!("(echo \"{text}\")")
}

fn nary<S: AsRef<str>>(op: &str, terms: &[S]) -> String {
    let mut out = format!("({op}");
    for term in terms {
        out.push(' ');
        out.push_str(term.as_ref());
    }
    out.push(')');
    out
}

/// Split a named assertion into its expression and label
///
/// Returns `None` for anything that is not `(assert (! <expr> :named <label>))`.
pub fn split_named_assert(line: &str) -> Option<(&str, &str)> {
    let body = line.trim().strip_prefix("(assert (!")?.strip_suffix("))")?;
    let (expr, label) = body.rsplit_once(":named")?;
    Some((expr.trim(), label.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_connectives() {
        let none: [&str; 0] = [];
        assert_eq!(and(&none), "true");
        assert_eq!(or(&none), "false");
        assert_eq!(sum(&none), "0");
    }

    #[test]
    fn test_single_and_many() {
        assert_eq!(and(&["(< a b)"]), "(< a b)");
        assert_eq!(or(&["x", "y", "z"]), "(or x y z)");
        assert_eq!(sum(&["b1", "b2"]), "(+ b1 b2)");
        assert_eq!(chain_lt(&["a", "b", "c"]), "(< a b c)");
        assert_eq!(distinct(&["a", "b"]), "(distinct a b)");
    }

    #[test]
    fn test_commands() {
        assert_eq!(declare_int("OR-x-1-0&a.c@3"), "(declare-const OR-x-1-0&a.c@3 Int)");
        assert_eq!(
            named_assert("(< a b)", "MO0"),
            "(assert (! (< a b) :named MO0))"
        );
        assert_eq!(echo("end"), "(echo \"end\")");
        assert_eq!(invert("(= 0 R-x-1-0)"), "(= false (= 0 R-x-1-0))");
    }

    #[test]
    fn test_split_named_assert() {
        let line = named_assert("(= 0 R-x-1-0)", "PC1_T1_BUGCOND");
        assert_eq!(
            split_named_assert(&line),
            Some(("(= 0 R-x-1-0)", "PC1_T1_BUGCOND"))
        );
        assert_eq!(split_named_assert("(assert (>= a 0))"), None);
    }
}
