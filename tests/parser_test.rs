use tensordb::parser::{parse_script, StatementKind};

#[test]
fn test_mixed_script_statement_kinds() {
    let source = "\
-- head
SELECT * FROM users;
CREATE TENSOR e (shape [2, 3], dtype float32);
SHOW TENSORS;";

    let script = parse_script(source);
    let kinds: Vec<StatementKind> = script.statements.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![
            StatementKind::Comment,
            StatementKind::Sql,
            StatementKind::Tensor,
            StatementKind::Tensor,
        ]
    );
    assert!(script.validate().is_empty());
}

#[test]
fn test_multi_line_sql_statement() {
    let source = "SELECT u.name,\n       u.age\nFROM users;";
    let script = parse_script(source);

    assert_eq!(script.statements.len(), 1);
    let stmt = &script.statements[0];
    assert_eq!(stmt.kind, StatementKind::Sql);
    assert_eq!(stmt.position.line, 1);
    assert_eq!(stmt.position.column, 1);
    assert_eq!(stmt.text, source);
}

#[test]
fn test_unbalanced_parenthesis_diagnostic() {
    let script = parse_script("SELECT * FROM users WHERE id = (SELECT id FROM orders;");
    let diags = script.validate();
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("Unmatched opening parenthesis"));
}

#[test]
fn test_splitter_round_trip() {
    let source = "\
-- embeddings pipeline

CREATE TENSOR e (shape [8, 4], dtype float32);
SELECT name,
       age
FROM users;
SUM(e, axis=0);";

    let script = parse_script(source);
    let rebuilt: Vec<&str> = script.statements.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(rebuilt.join("\n"), source);
}

#[test]
fn test_position_fidelity() {
    let source = "SELECT 1;\n\n-- note\nCREATE TENSOR t (shape [2], dtype float32);\nMEAN(t);\n";
    let script = parse_script(source);

    assert!(!script.statements.is_empty());
    for stmt in &script.statements {
        assert!(
            source[stmt.position.offset..].starts_with(&stmt.text),
            "statement at offset {} does not match source: {:?}",
            stmt.position.offset,
            stmt.text
        );
        let line_start = source[..stmt.position.offset]
            .rfind('\n')
            .map(|p| p + 1)
            .unwrap_or(0);
        assert_eq!(line_start, stmt.position.offset, "statements start at column 1");
    }
}

#[test]
fn test_classification_table() {
    let cases = [
        ("SELECT * FROM users;", StatementKind::Sql),
        ("INSERT INTO users (name) VALUES ('x');", StatementKind::Sql),
        ("CREATE TABLE t (id INTEGER);", StatementKind::Sql),
        ("CREATE TENSOR t (shape [2], dtype float32);", StatementKind::Tensor),
        ("DROP TENSOR t;", StatementKind::Tensor),
        ("ALTER TENSOR t SET owner = 'ml';", StatementKind::Tensor),
        ("SHOW TENSORS;", StatementKind::Tensor),
        ("DESCRIBE TENSOR t;", StatementKind::Tensor),
        ("TRANSPOSE(m);", StatementKind::Tensor),
        ("MATRIX_MULTIPLY(a, b);", StatementKind::Tensor),
        ("RELU(x);", StatementKind::Tensor),
        ("CONV2D(img, k);", StatementKind::Tensor),
        (
            "SELECT cosine_similarity(a.vec, b.vec) FROM pairs;",
            StatementKind::Tensor,
        ),
        ("SELECT TENSOR_SLICE(e, [0:2]) FROM t;", StatementKind::Tensor),
        ("SUM(weights);", StatementKind::Tensor),
        ("MIN(weights, axis=0);", StatementKind::Tensor),
        ("SELECT SUM(price) FROM orders;", StatementKind::Sql),
        ("SELECT MEAN(age) FROM users;", StatementKind::Sql),
    ];

    for (text, expected) in cases {
        let script = parse_script(text);
        assert_eq!(script.statements.len(), 1, "{}", text);
        assert_eq!(script.statements[0].kind, expected, "{}", text);
    }
}

#[test]
fn test_validator_reports_every_bad_statement() {
    let source = "\
SELECT 1);
CREATE TENSOR t (shape [x], dtype float32);
MATRIX_MULTIPLY(a);
SELECT 1;";

    let script = parse_script(source);
    let diags = script.validate();
    // Every invalid statement yields at least one diagnostic; the valid
    // trailing statement yields none.
    assert_eq!(diags.len(), 3);
}

#[test]
fn test_unterminated_final_statement() {
    let script = parse_script("MEAN(t)");
    let diags = script.validate();
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.contains("end with semicolon"));
}

#[test]
fn test_diagnostic_printed_form() {
    let script = parse_script("SELECT 1);");
    let diags = script.validate();
    assert_eq!(diags.len(), 1);

    let printed = diags[0].to_string();
    assert!(printed.starts_with("line 1, column 9: Unmatched closing parenthesis"));
    let lines: Vec<&str> = printed.lines().collect();
    assert_eq!(lines[1], "SELECT 1);");
    assert_eq!(lines[2], "        ^");
}

#[test]
fn test_create_tensor_multi_line_validates() {
    let source = "CREATE TENSOR big (\n    shape [64, 64],\n    dtype float32,\n    chunk_size [8, 8]\n);";
    let script = parse_script(source);
    assert_eq!(script.statements.len(), 1);
    assert_eq!(script.statements[0].kind, StatementKind::Tensor);
    assert!(script.validate().is_empty());
}
