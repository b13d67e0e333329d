use once_cell::sync::Lazy;
use regex::Regex;

use super::{Diagnostic, Position, Script, Statement, StatementKind};

static CREATE_TENSOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)CREATE\s+TENSOR\s+(\w+)\s*\(\s*shape\s*\[([^\]]+)\]\s*,\s*dtype\s+(\w+)(?:\s*,\s*chunk_size\s*\[([^\]]+)\])?\s*\)\s*;",
    )
    .expect("static pattern")
});

static INT_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+(\s*,\s*\d+)*\s*$").expect("static pattern"));

/// Argument grammars for the tensor operation call forms, checked when a
/// statement begins with the operation token. Longest tokens first so a
/// shorter token never claims a longer operation's statement.
static OPERATION_GRAMMARS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    let patterns: &[(&str, &str)] = &[
        (
            "COSINE_SIMILARITY",
            r"(?i)COSINE_SIMILARITY\s*\(\s*(\w+)\s*,\s*(\w+)\s*\)",
        ),
        (
            "EUCLIDEAN_DISTANCE",
            r"(?i)EUCLIDEAN_DISTANCE\s*\(\s*(\w+)\s*,\s*(\w+)\s*\)",
        ),
        (
            "MATRIX_MULTIPLY",
            r"(?i)MATRIX_MULTIPLY\s*\(\s*(\w+)\s*,\s*(\w+)\s*\)",
        ),
        ("EIGENVALUES", r"(?i)EIGENVALUES\s*\(\s*(\w+)\s*\)"),
        (
            "CONV2D",
            r"(?i)CONV2D\s*\(\s*(\w+)\s*,\s*(\w+)\s*(?:,\s*stride\s*=\s*\[(\d+,\s*\d+)\])?\s*(?:,\s*padding\s*=\s*\[(\d+,\s*\d+)\])?\s*\)",
        ),
        (
            "CONV1D",
            r"(?i)CONV1D\s*\(\s*(\w+)\s*,\s*(\w+)\s*(?:,\s*stride\s*=\s*(\d+))?\s*(?:,\s*padding\s*=\s*(\d+))?\s*\)",
        ),
        ("TRANSPOSE", r"(?i)TRANSPOSE\s*\(\s*(\w+)\s*\)"),
        ("MULTIPLY", r"(?i)MULTIPLY\s*\(\s*(\w+)\s*,\s*(\w+)\s*\)"),
        ("SIGMOID", r"(?i)SIGMOID\s*\(\s*(\w+)\s*\)"),
        ("RELU", r"(?i)RELU\s*\(\s*(\w+)\s*\)"),
        ("TANH", r"(?i)TANH\s*\(\s*(\w+)\s*\)"),
        ("MEAN", r"(?i)MEAN\s*\(\s*(\w+)\s*(?:,\s*axis\s*=\s*(\d+))?\s*\)"),
        ("ADD", r"(?i)ADD\s*\(\s*(\w+)\s*,\s*(\w+)\s*\)"),
        ("SUM", r"(?i)SUM\s*\(\s*(\w+)\s*(?:,\s*axis\s*=\s*(\d+))?\s*\)"),
        ("MAX", r"(?i)MAX\s*\(\s*(\w+)\s*(?:,\s*axis\s*=\s*(\d+))?\s*\)"),
        ("MIN", r"(?i)MIN\s*\(\s*(\w+)\s*(?:,\s*axis\s*=\s*(\d+))?\s*\)"),
        ("SVD", r"(?i)SVD\s*\(\s*(\w+)\s*\)"),
    ];
    patterns
        .iter()
        .map(|(op, pattern)| (*op, Regex::new(pattern).expect("static pattern")))
        .collect()
});

/// Validate all statements in a script, collecting every diagnostic.
pub fn validate_script(script: &Script) -> Vec<Diagnostic> {
    script
        .statements
        .iter()
        .filter_map(|stmt| validate_statement(stmt, &script.source).err())
        .collect()
}

/// Validate a single statement against the statement-level rules: the
/// terminator, balanced parentheses, and the tensor grammar for tensor
/// statements. Comments and empty statements always pass.
pub fn validate_statement(stmt: &Statement, source: &str) -> Result<(), Diagnostic> {
    if matches!(stmt.kind, StatementKind::Empty | StatementKind::Comment) {
        return Ok(());
    }

    let trimmed = stmt.text.trim();
    if !trimmed.ends_with(';') {
        return Err(Diagnostic::with_source(
            stmt.position,
            "Statement must end with semicolon",
            stmt.text.clone(),
        ));
    }

    check_balanced_parentheses(stmt, source)?;

    if stmt.kind == StatementKind::Tensor {
        validate_tensor_statement(stmt)?;
    }

    Ok(())
}

fn check_balanced_parentheses(stmt: &Statement, source: &str) -> Result<(), Diagnostic> {
    let mut depth = 0usize;

    for (i, ch) in stmt.text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    let offset = stmt.position.offset + i;
                    let (line, column) = line_column_at(source, offset);
                    return Err(Diagnostic::with_source(
                        Position::new(line, column, offset),
                        "Unmatched closing parenthesis",
                        stmt.text.clone(),
                    ));
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    if depth > 0 {
        return Err(Diagnostic::with_source(
            stmt.position,
            "Unmatched opening parenthesis",
            stmt.text.clone(),
        ));
    }

    Ok(())
}

fn validate_tensor_statement(stmt: &Statement) -> Result<(), Diagnostic> {
    let upper = stmt.text.to_uppercase();

    if upper.contains("CREATE TENSOR") {
        let captures = CREATE_TENSOR.captures(&stmt.text).ok_or_else(|| {
            Diagnostic::with_source(
                stmt.position,
                "Invalid CREATE TENSOR syntax. Expected: CREATE TENSOR name (shape [dims], dtype type[, chunk_size [dims]])",
                stmt.text.clone(),
            )
        })?;

        let shape = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        check_dimension_list(stmt, shape, "tensor shape")?;

        if let Some(chunk) = captures.get(4) {
            check_dimension_list(stmt, chunk.as_str(), "chunk_size")?;
        }
    }

    validate_operation_call(stmt)
}

fn check_dimension_list(stmt: &Statement, list: &str, what: &str) -> Result<(), Diagnostic> {
    if !INT_LIST.is_match(list) {
        return Err(Diagnostic::with_source(
            stmt.position,
            format!("Invalid {} format. Expected comma-separated integers", what),
            stmt.text.clone(),
        ));
    }
    let has_zero = list
        .split(',')
        .filter_map(|part| part.trim().parse::<usize>().ok())
        .any(|d| d == 0);
    if has_zero {
        return Err(Diagnostic::with_source(
            stmt.position,
            format!("Invalid {}: dimensions must be positive", what),
            stmt.text.clone(),
        ));
    }
    Ok(())
}

fn validate_operation_call(stmt: &Statement) -> Result<(), Diagnostic> {
    let upper = stmt.text.trim().to_uppercase();

    for (operation, grammar) in OPERATION_GRAMMARS.iter() {
        if upper.starts_with(operation) {
            if grammar.is_match(&stmt.text) {
                return Ok(());
            }
            return Err(Diagnostic::with_source(
                stmt.position,
                format!("Invalid {} syntax", operation),
                stmt.text.clone(),
            ));
        }
    }

    Ok(())
}

/// Recompute a 1-based line/column pair from a byte offset into the source.
fn line_column_at(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(pos) => offset - pos,
        None => offset + 1,
    };
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_script;

    fn first_error(source: &str) -> Diagnostic {
        let script = parse_script(source);
        let mut diags = script.validate();
        assert!(!diags.is_empty(), "expected a diagnostic for {:?}", source);
        diags.remove(0)
    }

    #[test]
    fn test_valid_statements_pass() {
        let script = parse_script(
            "SELECT * FROM users;\nCREATE TENSOR e (shape [2, 3], dtype float32);\nSHOW TENSORS;\n",
        );
        assert!(script.validate().is_empty());
    }

    #[test]
    fn test_missing_semicolon() {
        let diag = first_error("SELECT * FROM users");
        assert!(diag.message.contains("end with semicolon"));
    }

    #[test]
    fn test_unmatched_opening_paren() {
        let diag = first_error("SELECT * FROM users WHERE id = (SELECT id FROM orders;");
        assert!(diag.message.contains("Unmatched opening parenthesis"));
        assert_eq!(diag.position.line, 1);
        assert_eq!(diag.position.column, 1);
    }

    #[test]
    fn test_unmatched_closing_paren_points_at_character() {
        let diag = first_error("SELECT 1);");
        assert!(diag.message.contains("Unmatched closing parenthesis"));
        assert_eq!(diag.position.line, 1);
        assert_eq!(diag.position.column, 9);
    }

    #[test]
    fn test_create_tensor_grammar() {
        assert!(parse_script("CREATE TENSOR t (shape [4, 4], dtype float32, chunk_size [2, 2]);")
            .validate()
            .is_empty());

        let diag = first_error("CREATE TENSOR t (shape [2, 2]);");
        assert!(diag.message.contains("Invalid CREATE TENSOR syntax"));

        let diag = first_error("CREATE TENSOR t (shape [a, b], dtype float32);");
        assert!(diag.message.contains("Invalid tensor shape format"));

        let diag = first_error("CREATE TENSOR t (shape [2, 0], dtype float32);");
        assert!(diag.message.contains("must be positive"));
    }

    #[test]
    fn test_operation_arity() {
        assert!(parse_script("MATRIX_MULTIPLY(a, b);").validate().is_empty());
        assert!(parse_script("CONV2D(img, k, stride=[2, 2], padding=[1, 1]);")
            .validate()
            .is_empty());

        let diag = first_error("MATRIX_MULTIPLY(a);");
        assert!(diag.message.contains("Invalid MATRIX_MULTIPLY syntax"));

        let diag = first_error("TRANSPOSE(a, b);");
        assert!(diag.message.contains("Invalid TRANSPOSE syntax"));
    }

    #[test]
    fn test_caret_rendering() {
        let diag = first_error("SELECT 1);");
        let printed = diag.to_string();
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "SELECT 1);");
        assert_eq!(lines[2], "        ^");
    }
}
