//! Filter and DN value escaping
//!
//! Helpers for callers that build search filters or DNs from untrusted input
//! before handing them to [`crate::DirectorySession`].

/// Escape special characters in LDAP filter values (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => result.push_str("\\5c"),
            '*' => result.push_str("\\2a"),
            '(' => result.push_str("\\28"),
            ')' => result.push_str("\\29"),
            '\0' => result.push_str("\\00"),
            _ => result.push(ch),
        }
    }
    result
}

/// Escape special characters in DN attribute values (RFC 4514).
///
/// - `,` `+` `"` `\` `<` `>` `;` `=` are backslash-escaped
/// - NUL becomes `\00`
/// - a leading or trailing space becomes `\20`
/// - a leading `#` becomes `\23`
pub fn escape_dn_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len() * 2);
    let last = value.chars().count().saturating_sub(1);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i == last;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if is_first || is_last => result.push_str("\\20"),
            '#' if is_first => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}
