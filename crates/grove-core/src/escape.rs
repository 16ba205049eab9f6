//! Escaping for text stored as node content.

/// Escapes text embedded as node content.
///
/// The replacement order is fixed: backslash first, then double quote, then
/// newline, tab and carriage return. Escaping quotes before backslashes would
/// double-escape the backslash introduced for each quote.
pub fn escape_content(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\t', "\\t")
        .replace('\r', "\\r")
}
