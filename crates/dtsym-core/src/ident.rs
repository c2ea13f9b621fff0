//! Identifier sanitization and value formatting helpers
//!
//! Everything that turns devicetree tokens (paths, compatibles, property
//! names, labels) into symbol text goes through here.

/// Convert an arbitrary devicetree token into an identifier-safe token.
///
/// `-`, `,`, `@`, `/` and `.` become `_`, `+` becomes `PLUS`, and the
/// result is upper-cased. Sanitizing an already sanitized token returns it
/// unchanged.
pub fn sanitize(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for c in token.chars() {
        match c {
            '-' | ',' | '@' | '/' | '.' => out.push('_'),
            '+' => out.push_str("PLUS"),
            c => out.extend(c.to_uppercase()),
        }
    }
    out
}

/// Backslash-escape double quotes and backslashes.
pub fn escape(s: &str) -> String {
    // Backslashes first, otherwise the ones added for quotes get doubled
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Quote `s` as a string literal.
pub fn quote(s: &str) -> String {
    format!("\"{}\"", escape(s))
}

/// Lowercase `0x`-prefixed hex, e.g. `0x4000c000`.
pub fn hex(value: u64) -> String {
    format!("{value:#x}")
}

/// Uppercase hex without prefix, as used inside legacy identifiers.
pub fn unit_hex(value: u64) -> String {
    format!("{value:X}")
}
