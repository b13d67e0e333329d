use std::io::BufRead;

use super::{classify, Diagnostic, Position, Script, Statement, StatementKind};

/// Split a script held in memory into statements.
pub fn parse_script(source: &str) -> Script {
    // Reading from an in-memory cursor cannot fail.
    match parse_reader(std::io::Cursor::new(source.as_bytes())) {
        Ok(script) => script,
        Err(_) => unreachable!("in-memory reads do not fail"),
    }
}

/// Split a script from a line reader, tracking byte offsets as lines are
/// consumed. Read errors surface as a diagnostic at the current line.
pub fn parse_reader<R: BufRead>(mut reader: R) -> Result<Script, Diagnostic> {
    let mut statements = Vec::new();
    let mut source = String::new();
    let mut line_num = 0usize;
    let mut offset = 0usize;

    loop {
        let (line, raw) = match read_line(&mut reader, line_num, offset) {
            Ok(None) => break,
            Ok(Some(pair)) => pair,
            Err(diag) => return Err(diag),
        };
        line_num += 1;
        let start = Position::new(line_num, 1, offset);
        offset += raw.len();
        source.push_str(&raw);

        let trimmed = line.trim();

        if trimmed.is_empty() {
            statements.push(Statement {
                text: line,
                position: start,
                kind: StatementKind::Empty,
            });
            continue;
        }

        if trimmed.starts_with("--") || trimmed.starts_with("/*") {
            statements.push(Statement {
                text: line,
                position: start,
                kind: StatementKind::Comment,
            });
            continue;
        }

        if trimmed.ends_with(';') {
            let kind = classify(&line);
            statements.push(Statement {
                text: line,
                position: start,
                kind,
            });
            continue;
        }

        // Multi-line statement: accumulate until a line whose trimmed
        // content ends with the terminator. An unterminated tail still
        // becomes a statement so the validator can report it.
        let mut text = line;
        loop {
            let (next, raw) = match read_line(&mut reader, line_num, offset) {
                Ok(None) => break,
                Ok(Some(pair)) => pair,
                Err(diag) => return Err(diag),
            };
            line_num += 1;
            offset += raw.len();
            source.push_str(&raw);
            text.push('\n');
            text.push_str(&next);
            if next.trim().ends_with(';') {
                break;
            }
        }

        let kind = classify(&text);
        statements.push(Statement {
            text,
            position: start,
            kind,
        });
    }

    Ok(Script { statements, source })
}

/// One line with its terminator stripped, plus the raw bytes as read so the
/// caller can keep offsets and the retained source exact.
fn read_line<R: BufRead>(
    reader: &mut R,
    line_num: usize,
    offset: usize,
) -> Result<Option<(String, String)>, Diagnostic> {
    let mut raw = String::new();
    let n = reader.read_line(&mut raw).map_err(|e| {
        Diagnostic::new(
            Position::new(line_num + 1, 1, offset),
            format!("IO error: {}", e),
        )
    })?;
    if n == 0 {
        return Ok(None);
    }
    let mut line = raw.clone();
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(Some((line, raw)))
}
