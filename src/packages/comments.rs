//! Comment scanning for C-family source text
//!
//! Line comments are returned trimmed with their `//` marker; block comments
//! are returned whole, including `/*` and `*/`. Comment markers inside
//! double-quoted string literals are ignored.

/// Extract every comment from `source`, in source order
pub fn extract_comments(source: &str) -> Vec<String> {
    let bytes = source.as_bytes();
    let mut comments = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => i = skip_string(bytes, i + 1),
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = source[i..].find('\n').map_or(source.len(), |n| i + n);
                comments.push(source[i..end].trim().to_string());
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                // An unterminated block runs to the end of the file.
                let end = source[i + 2..]
                    .find("*/")
                    .map_or(source.len(), |n| i + 2 + n + 2);
                comments.push(source[i..end].to_string());
                i = end;
            }
            _ => i += 1,
        }
    }

    comments
}

/// Index just past the closing quote of a string starting at `start`
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            b'\n' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}
