//! Recorded-expression → SMT-LIB translation
//!
//! Written values and path conditions arrive in the syntax of the tool that
//! recorded them. Both translators are total: input they cannot make sense of
//! is returned unchanged and left for the solver to reject.

use crate::model::Dialect;

/// Rewrites one recorded expression into solver syntax
pub trait ExpressionTranslator: Send + Sync {
    fn translate(&self, expr: &str) -> String;
}

/// Translator matching a trace dialect
pub fn translator_for(dialect: Dialect) -> &'static dyn ExpressionTranslator {
    match dialect {
        Dialect::KQuery => &KQueryTranslator,
        Dialect::Jpf => &JpfTranslator,
    }
}

/// KLEE KQuery s-expressions such as `(Eq 0 (ReadLSB w32 0 x-1-0))`
#[derive(Debug, Clone, Copy, Default)]
pub struct KQueryTranslator;

/// KLEE encodes `x - 1` as an addition of this constant
const MINUS_ONE_U32: &str = "4294967295";

#[derive(Debug, Clone, PartialEq)]
enum SExpr {
    Atom(String),
    List(Vec<SExpr>),
}

impl SExpr {
    fn contains_atom(&self, needle: &str) -> bool {
        match self {
            SExpr::Atom(atom) => atom.contains(needle),
            SExpr::List(items) => items.iter().any(|item| item.contains_atom(needle)),
        }
    }

    fn atom(&self) -> Option<&str> {
        match self {
            SExpr::Atom(atom) => Some(atom),
            SExpr::List(_) => None,
        }
    }
}

fn tokenize(expr: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in expr.chars() {
        match c {
            '(' | ')' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_sexpr(tokens: &[String], pos: &mut usize) -> Option<SExpr> {
    let token = tokens.get(*pos)?;
    *pos += 1;
    match token.as_str() {
        "(" => {
            let mut items = Vec::new();
            loop {
                if tokens.get(*pos)?.as_str() == ")" {
                    *pos += 1;
                    return Some(SExpr::List(items));
                }
                items.push(parse_sexpr(tokens, pos)?);
            }
        }
        ")" => None,
        atom => Some(SExpr::Atom(atom.to_string())),
    }
}

fn is_width(item: &SExpr) -> bool {
    item.atom().is_some_and(|atom| {
        atom.len() > 1 && atom.starts_with('w') && atom[1..].bytes().all(|b| b.is_ascii_digit())
    })
}

impl KQueryTranslator {
    fn lower(&self, expr: &SExpr) -> Option<String> {
        let items = match expr {
            SExpr::Atom(atom) => return Some(atom.clone()),
            SExpr::List(items) => items,
        };
        let (op, args) = items.split_first()?;
        let op = op.atom()?;
        // width annotations carry no meaning over the integers
        let args: Vec<&SExpr> = args.iter().filter(|arg| !is_width(arg)).collect();

        let binary = |smt_op: &str| -> Option<String> {
            let [l, r] = args.as_slice() else {
                return None;
            };
            Some(format!("({smt_op} {} {})", self.lower(l)?, self.lower(r)?))
        };

        match op {
            "Add" => {
                let [l, r] = args.as_slice() else {
                    return None;
                };
                if l.contains_atom(MINUS_ONE_U32) {
                    Some(format!("(- {} 1)", self.lower(r)?))
                } else if r.contains_atom(MINUS_ONE_U32) {
                    Some(format!("(- {} 1)", self.lower(l)?))
                } else {
                    binary("+")
                }
            }
            "Sub" => binary("-"),
            "Mul" => binary("*"),
            "UDiv" | "SDiv" => binary("div"),
            "URem" | "SRem" => binary("rem"),
            // only ever seen masking the low bit, i.e. `x % 2`
            "And" => {
                let l = args.first()?;
                Some(format!("(rem {} 2)", self.lower(l)?))
            }
            "ReadLSB" | "ReadMSB" => {
                let var = args.last()?.atom()?;
                Some(format!("R-{var}"))
            }
            "Eq" => binary("="),
            "Ne" => {
                let eq = binary("=")?;
                Some(format!("(not {eq})"))
            }
            "Ult" | "Slt" => binary("<"),
            "Ule" | "Sle" => binary("<="),
            "Ugt" | "Sgt" => binary(">"),
            "Uge" | "Sge" => binary(">="),
            "SExt" | "ZExt" | "Extract" => self.lower(args.last()?),
            _ => None,
        }
    }
}

impl ExpressionTranslator for KQueryTranslator {
    fn translate(&self, expr: &str) -> String {
        let trimmed = expr.trim();
        if !trimmed.starts_with('(') {
            return trimmed.to_string();
        }
        let tokens = tokenize(trimmed);
        let mut pos = 0;
        parse_sexpr(&tokens, &mut pos)
            .filter(|_| pos == tokens.len())
            .and_then(|sexpr| self.lower(&sexpr))
            .unwrap_or_else(|| expr.to_string())
    }
}

/// Java PathFinder infix expressions such as `(x_1 + CONST_2) == 3`
#[derive(Debug, Clone, Copy, Default)]
pub struct JpfTranslator;

fn jpf_operator(token: &str) -> Option<&'static str> {
    let op = match token {
        "+" => "+",
        "-" => "-",
        "*" => "*",
        "/" => "div",
        "%" => "mod",
        "==" => "=",
        "!=" => "!=",
        "<" => "<",
        "<=" => "<=",
        ">" => ">",
        ">=" => ">=",
        _ => return None,
    };
    Some(op)
}

impl JpfTranslator {
    fn operand(&self, tokens: &[String], pos: &mut usize) -> Option<String> {
        let token = tokens.get(*pos)?;
        *pos += 1;
        match token.as_str() {
            "(" => {
                let inner = self.infix(tokens, pos)?;
                if tokens.get(*pos)?.as_str() != ")" {
                    return None;
                }
                *pos += 1;
                Some(inner)
            }
            ")" => None,
            atom if jpf_operator(atom).is_some() => None,
            atom => Some(atom.replacen("CONST_", "", 1)),
        }
    }

    /// Left-associative chain of binary operators
    fn infix(&self, tokens: &[String], pos: &mut usize) -> Option<String> {
        let mut acc = self.operand(tokens, pos)?;
        while let Some(op) = tokens.get(*pos).and_then(|token| jpf_operator(token)) {
            *pos += 1;
            let rhs = self.operand(tokens, pos)?;
            acc = match op {
                "!=" => format!("(not (= {acc} {rhs}))"),
                op => format!("({op} {acc} {rhs})"),
            };
        }
        Some(acc)
    }
}

impl ExpressionTranslator for JpfTranslator {
    fn translate(&self, expr: &str) -> String {
        let tokens = tokenize(expr);
        if tokens.is_empty() {
            return expr.to_string();
        }
        let mut pos = 0;
        self.infix(&tokens, &mut pos)
            .filter(|_| pos == tokens.len())
            .unwrap_or_else(|| expr.to_string())
    }
}
