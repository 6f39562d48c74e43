//! Statement text clean-up ahead of the keyword check.
//!
//! Comments are replaced by a single space rather than removed, so
//! `UPDATE/**/t` keeps its token boundary. Quoted strings and identifiers
//! are copied through untouched.
//!
//! A statement has two readings: with every comment stripped, and with
//! executable comments (`/*!NNNNN ... */`) unwrapped. Which one the server
//! runs depends on its version, so callers check both.

/// Trailing NULs, comments and leading whitespace removed.
pub fn normalize_statement(sql: &str) -> String {
    let sql = sql.trim_end_matches('\0');
    strip_comments(sql).trim_start().to_string()
}

/// Like [`normalize_statement`], but the bodies of executable comments are
/// kept as statement text.
pub fn normalize_executed(sql: &str) -> String {
    let sql = sql.trim_end_matches('\0');
    unwrap_executable_comments(sql).trim_start().to_string()
}

/// Case-insensitive `UPDATE` at the very start, followed by anything that
/// cannot continue an identifier.
pub fn starts_with_update(normalized: &str) -> bool {
    const KEYWORD: &[u8] = b"UPDATE";
    let bytes = normalized.as_bytes();
    if bytes.len() < KEYWORD.len() || !bytes[..KEYWORD.len()].eq_ignore_ascii_case(KEYWORD) {
        return false;
    }
    match bytes.get(KEYWORD.len()) {
        None => true,
        Some(&b) => !is_ident_byte(b),
    }
}

pub fn strip_comments(sql: &str) -> String {
    rewrite(sql, false)
}

pub fn unwrap_executable_comments(sql: &str) -> String {
    rewrite(sql, true)
}

fn rewrite(sql: &str, keep_executable: bool) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                let end = quoted_end(bytes, i, quote);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let close = find_close(bytes, i + 2);
                let body_end = close.unwrap_or(bytes.len());
                out.push(' ');
                if keep_executable && bytes.get(i + 2) == Some(&b'!') {
                    let mut start = i + 3;
                    while start < body_end && bytes[start].is_ascii_digit() {
                        start += 1;
                    }
                    out.push_str(&rewrite(&sql[start..body_end], true));
                    out.push(' ');
                }
                i = close.map_or(bytes.len(), |c| c + 2);
            }
            b'-' if bytes.get(i + 1) == Some(&b'-')
                && bytes.get(i + 2).map_or(true, |b| b.is_ascii_whitespace()) =>
            {
                out.push(' ');
                i = line_end(bytes, i);
            }
            b'#' => {
                out.push(' ');
                i = line_end(bytes, i);
            }
            _ => {
                let start = i;
                i += 1;
                while i < bytes.len() && !is_special(bytes[i]) {
                    i += 1;
                }
                out.push_str(&sql[start..i]);
            }
        }
    }
    out
}

fn is_special(b: u8) -> bool {
    matches!(b, b'\'' | b'"' | b'`' | b'/' | b'-' | b'#')
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn quoted_end(bytes: &[u8], open: usize, quote: u8) -> usize {
    let mut j = open + 1;
    while j < bytes.len() {
        if bytes[j] == b'\\' && quote != b'`' {
            j += 2;
            continue;
        }
        if bytes[j] == quote {
            return j + 1;
        }
        j += 1;
    }
    bytes.len()
}

fn find_close(bytes: &[u8], from: usize) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(2)
        .position(|w| w == b"*/")
        .map(|pos| from + pos)
}

// Leaves the newline in place so it is copied as whitespace.
fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |pos| from + pos)
}
