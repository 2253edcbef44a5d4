//! Naming utilities shared by the rpcgen importers and backends.
//!
//! Everything in here is pure string manipulation:
//! - splitting identifiers into words and re-joining them in a target case
//! - sanitizing identifiers against C and Swift reserved words
//! - escaping string literals for the emitted languages
//! - the tiny English inflection used to name OpenAPI-derived methods

use std::collections::HashSet;
use std::sync::LazyLock;

/// C keywords (C11 plus the common typedef names the emitted code relies on).
pub static C_RESERVED_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
        "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
        "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch",
        "typedef", "union", "unsigned", "void", "volatile", "while", "bool", "true", "false",
        "ctx", "args", "out", "value", "key", "item",
    ]
    .into_iter()
    .collect()
});

/// Swift keywords that cannot be used as bare identifiers.
pub static SWIFT_RESERVED_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "associatedtype", "class", "deinit", "enum", "extension", "fileprivate", "func",
        "import", "init", "inout", "internal", "let", "open", "operator", "private", "protocol",
        "public", "rethrows", "static", "struct", "subscript", "typealias", "var", "break",
        "case", "continue", "default", "defer", "do", "else", "fallthrough", "for", "guard",
        "if", "in", "repeat", "return", "switch", "where", "while", "as", "catch", "false",
        "is", "nil", "self", "Self", "super", "throw", "throws", "true", "try", "Type",
    ]
    .into_iter()
    .collect()
});

/// Split an identifier into lowercase-insensitive words.
///
/// Word boundaries are non-alphanumeric characters, a lower-to-upper transition
/// (`getBalance`) and the end of an acronym (`HTTPServer` -> `HTTP`, `Server`).
pub fn split_words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_ascii_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let starts_word = prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower);
            if starts_word {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Convert a string to snake_case.
pub fn to_snake_case(name: &str) -> String {
    split_words(name)
        .iter()
        .map(|w| w.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Convert a string to PascalCase.
pub fn to_pascal_case(name: &str) -> String {
    split_words(name)
        .iter()
        .map(|w| capitalize_first(&w.to_ascii_lowercase()))
        .collect()
}

/// Convert a string to lowerCamelCase.
pub fn to_camel_case(name: &str) -> String {
    let pascal = to_pascal_case(name);
    let mut chars = pascal.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
    }
}

/// Capitalize the first letter of a string.
pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars).collect(),
    }
}

fn sanitize_with(name: &str, reserved: &HashSet<&'static str>) -> String {
    let mut result: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if result.is_empty() {
        return "_empty".to_string();
    }
    if result.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        result = format!("_{result}");
    }
    if reserved.contains(result.as_str()) {
        result = format!("{result}_");
    }
    result
}

/// Sanitize a name into a valid C identifier.
///
/// - Replaces every character outside `[A-Za-z0-9_]` with `_`
/// - Prepends `_` if the name starts with a digit
/// - Appends `_` to reserved words
pub fn sanitize_c_identifier(name: &str) -> String {
    sanitize_with(name, &C_RESERVED_WORDS)
}

/// Sanitize a name into a valid lowerCamelCase Swift identifier.
pub fn sanitize_swift_identifier(name: &str) -> String {
    let camel = to_camel_case(name);
    if camel.is_empty() {
        return "_empty".to_string();
    }
    if SWIFT_RESERVED_WORDS.contains(camel.as_str()) {
        return format!("`{camel}`");
    }
    if camel.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return format!("_{camel}");
    }
    camel
}

/// Escape a string for use inside a C string literal.
pub fn escape_c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Escape a string for use inside a Swift string literal.
pub fn escape_swift_string(s: &str) -> String {
    escape_c_string(s)
}

/// Longest common leading substring of all names.
///
/// Returns an empty string for an empty input.
pub fn common_prefix<'a, I>(names: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut iter = names.into_iter();
    let Some(first) = iter.next() else {
        return String::new();
    };
    let mut prefix_len = first.len();
    for name in iter {
        prefix_len = first
            .bytes()
            .zip(name.bytes())
            .take(prefix_len)
            .take_while(|(a, b)| a == b)
            .count();
        if prefix_len == 0 {
            break;
        }
    }
    while !first.is_char_boundary(prefix_len) {
        prefix_len -= 1;
    }
    first[..prefix_len].to_string()
}

fn ends_with_consonant_y(word: &str) -> bool {
    let bytes = word.as_bytes();
    bytes.len() >= 2
        && bytes[bytes.len() - 1] == b'y'
        && !matches!(bytes[bytes.len() - 2], b'a' | b'e' | b'i' | b'o' | b'u')
}

/// Naive English singular form of a lowercase word.
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies")
        && !stem.is_empty()
    {
        return format!("{stem}y");
    }
    for suffix in ["sses", "xes", "ches", "shes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") && word.len() > 1 {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Naive English plural form of a lowercase word.
pub fn pluralize(word: &str) -> String {
    if ends_with_consonant_y(word) {
        return format!("{}ies", &word[..word.len() - 1]);
    }
    if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        return format!("{word}es");
    }
    format!("{word}s")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("eth_getBalance"), vec!["eth", "get", "Balance"]);
        assert_eq!(split_words("HTTPServer"), vec!["HTTP", "Server"]);
        assert_eq!(split_words("verify-email"), vec!["verify", "email"]);
        assert_eq!(split_words("uint256Value"), vec!["uint256", "Value"]);
        assert!(split_words("--").is_empty());
    }

    #[test]
    fn test_case_conversions() {
        assert_eq!(to_snake_case("getBalance"), "get_balance");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_pascal_case("eth_call"), "EthCall");
        assert_eq!(to_pascal_case("tx-data"), "TxData");
        assert_eq!(to_camel_case("eth_get_balance"), "ethGetBalance");
        assert_eq!(to_camel_case(""), "");
    }

    #[test]
    fn test_capitalize_first() {
        assert_eq!(capitalize_first("foo"), "Foo");
        assert_eq!(capitalize_first(""), "");
        assert_eq!(capitalize_first("ABC"), "ABC");
    }

    #[test]
    fn test_sanitize_c_identifier() {
        assert_eq!(sanitize_c_identifier("block-number"), "block_number");
        assert_eq!(sanitize_c_identifier("2fa"), "_2fa");
        assert_eq!(sanitize_c_identifier("default"), "default_");
        assert_eq!(sanitize_c_identifier(""), "_empty");
    }

    #[test]
    fn test_sanitize_swift_identifier() {
        assert_eq!(sanitize_swift_identifier("block_number"), "blockNumber");
        assert_eq!(sanitize_swift_identifier("default"), "`default`");
        assert_eq!(sanitize_swift_identifier("in"), "`in`");
    }

    #[test]
    fn test_escape_c_string() {
        assert_eq!(escape_c_string("plain"), "plain");
        assert_eq!(escape_c_string("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape_c_string("a\\b\nc"), "a\\\\b\\nc");
    }

    #[test]
    fn test_common_prefix() {
        assert_eq!(common_prefix(["eth_call", "eth_getBalance"]), "eth_");
        assert_eq!(common_prefix(["a", "b"]), "");
        assert_eq!(common_prefix(["only"]), "only");
        assert_eq!(common_prefix(Vec::<&str>::new()), "");
    }

    #[test]
    fn test_inflection() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("policies"), "policy");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("address"), "address");
        assert_eq!(pluralize("user"), "users");
        assert_eq!(pluralize("policy"), "policies");
        assert_eq!(pluralize("key"), "keys");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize(&singularize("users")), "users");
    }
}
