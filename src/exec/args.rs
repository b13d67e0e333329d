//! Argument parsing for tensor statements. The validator has already checked
//! the grammar for known call forms; these helpers turn the text into typed
//! values.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::schema::Range;

static CREATE_TENSOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)CREATE\s+TENSOR\s+(\w+)\s*\(\s*shape\s*\[([^\]]+)\]\s*,\s*dtype\s+(\w+)(?:\s*,\s*chunk_size\s*\[([^\]]+)\])?\s*\)\s*;",
    )
    .expect("static pattern")
});

/// Pieces of a `CREATE TENSOR` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
    pub chunk_shape: Option<Vec<usize>>,
}

pub fn parse_create_tensor(text: &str) -> Result<CreateTensor, String> {
    let captures = CREATE_TENSOR.captures(text).ok_or_else(|| {
        "Expected: CREATE TENSOR name (shape [dims], dtype type[, chunk_size [dims]])".to_string()
    })?;

    let shape = parse_bare_usize_list(&captures[2])?;
    let chunk_shape = match captures.get(4) {
        Some(m) => Some(parse_bare_usize_list(m.as_str())?),
        None => None,
    };

    Ok(CreateTensor {
        name: captures[1].to_string(),
        shape,
        dtype: captures[3].to_lowercase(),
        chunk_shape,
    })
}

/// A call statement split into its operation token and arguments.
#[derive(Debug, Clone, Default)]
pub struct Call {
    pub operation: String,
    pub positional: Vec<String>,
    pub keywords: Vec<(String, String)>,
}

impl Call {
    pub fn positional(&self, index: usize, what: &str) -> Result<&str, String> {
        self.positional
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| format!("{} expects an argument at position {}", what, index + 1))
    }

    pub fn keyword(&self, key: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn axis(&self) -> Result<Option<usize>, String> {
        match self.keyword("axis") {
            None => Ok(None),
            Some(raw) => raw
                .parse::<usize>()
                .map(Some)
                .map_err(|_| format!("invalid axis: {}", raw)),
        }
    }

    pub fn scalar_param(&self, key: &str, default: usize) -> Result<usize, String> {
        match self.keyword(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| format!("invalid {}: {}", key, raw)),
        }
    }

    pub fn pair_param(&self, key: &str, default: (usize, usize)) -> Result<(usize, usize), String> {
        match self.keyword(key) {
            None => Ok(default),
            Some(raw) => {
                let values = parse_usize_list(raw)?;
                if values.len() != 2 {
                    return Err(format!("{} expects a pair like [1, 1], got: {}", key, raw));
                }
                Ok((values[0], values[1]))
            }
        }
    }
}

/// Split `OP(arg, key=value, ...)` into its parts. Commas inside brackets do
/// not separate arguments, so `stride=[2, 2]` stays one argument.
pub fn parse_call(text: &str) -> Result<Call, String> {
    let body = text.trim().trim_end_matches(';').trim();

    let open = body
        .find('(')
        .ok_or_else(|| format!("expected a call, got: {}", body))?;
    let close = body
        .rfind(')')
        .filter(|&c| c > open)
        .ok_or_else(|| format!("unterminated call: {}", body))?;

    let operation = body[..open].trim().to_uppercase();
    if operation.is_empty() {
        return Err(format!("missing operation name in: {}", body));
    }

    let mut call = Call {
        operation,
        ..Call::default()
    };

    for arg in split_top_level(&body[open + 1..close]) {
        let arg = arg.trim();
        if arg.is_empty() {
            continue;
        }
        match split_keyword(arg) {
            Some((key, value)) => call.keywords.push((key, value)),
            None => call.positional.push(arg.to_string()),
        }
    }

    Ok(call)
}

/// `key=value` where key is a bare identifier; anything else is positional.
fn split_keyword(arg: &str) -> Option<(String, String)> {
    let eq = arg.find('=')?;
    let key = arg[..eq].trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key.to_lowercase(), arg[eq + 1..].trim().to_string()))
}

fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for ch in text.chars() {
        match ch {
            '[' | '(' => {
                depth += 1;
                current.push(ch);
            }
            ']' | ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

/// Parse `[1, 2, 3]` into dimensions.
pub fn parse_usize_list(text: &str) -> Result<Vec<usize>, String> {
    let inner = text.trim();
    if !inner.starts_with('[') || !inner.ends_with(']') {
        return Err(format!("Expected [d1, d2, ...], got: {}", text));
    }
    parse_bare_usize_list(&inner[1..inner.len() - 1])
}

fn parse_bare_usize_list(inner: &str) -> Result<Vec<usize>, String> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|part| {
            let p = part.trim();
            p.parse::<usize>()
                .map_err(|_| format!("Invalid dimension: {}", p))
        })
        .collect()
}

/// Parse `[0:2, 1:3]` into half-open ranges, one per dimension.
pub fn parse_ranges(text: &str) -> Result<Vec<Range>, String> {
    let inner = text.trim();
    if !inner.starts_with('[') || !inner.ends_with(']') {
        return Err(format!("Expected [start:end, ...], got: {}", text));
    }
    let inner = &inner[1..inner.len() - 1];
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| {
            let p = part.trim();
            let (start, end) = p
                .split_once(':')
                .ok_or_else(|| format!("Invalid range: {}", p))?;
            let start = start
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("Invalid range start: {}", p))?;
            let end = end
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("Invalid range end: {}", p))?;
            Ok(Range::new(start, end))
        })
        .collect()
}
