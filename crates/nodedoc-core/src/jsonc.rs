//! JSON with comments (tsconfig.json, .eslintrc.json)
//!
//! Comments and trailing commas are removed before handing the text to
//! `serde_json`. String literals are left untouched, so `"@/*"` and URLs
//! containing `//` survive.

use serde::de::DeserializeOwned;

/// Strip `//` and `/* */` comments and trailing commas
pub fn strip(input: &str) -> String {
    strip_trailing_commas(&strip_comments(input))
}

fn strip_comments(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                out.push(c);
                i += 1;
                while i < chars.len() {
                    let s = chars[i];
                    out.push(s);
                    i += 1;
                    if s == '\\' {
                        if let Some(&escaped) = chars.get(i) {
                            out.push(escaped);
                            i += 1;
                        }
                    } else if s == '"' {
                        break;
                    }
                }
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    // Keep line numbers stable for error messages
                    if chars[i] == '\n' {
                        out.push('\n');
                    }
                    i += 1;
                }
                i += 2;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn strip_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&escaped) = chars.get(i + 1) {
                    out.push(escaped);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
            out.push(c);
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if !matches!(next, Some(&'}') | Some(&']')) {
                out.push(c);
            }
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}

pub fn from_str<T: DeserializeOwned>(input: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(&strip(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_strips_comments_outside_strings() {
        let input = r#"{
            // line comment
            "paths": { "@/*": ["src/*"] }, /* block
            comment */
            "url": "https://example.com//x"
        }"#;
        let value: Value = from_str(input).unwrap();
        assert_eq!(value["paths"]["@/*"], json!(["src/*"]));
        assert_eq!(value["url"], "https://example.com//x");
    }

    #[test]
    fn test_trailing_commas() {
        let value: Value = from_str(r#"{"a": [1, 2,], "b": {"c": 1,},}"#).unwrap();
        assert_eq!(value, json!({"a": [1, 2], "b": {"c": 1}}));

        let value: Value = from_str("{\"a\": 1, // last\n}").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_escaped_quotes() {
        let value: Value = from_str(r#"{"a": "say \"hi\" // not a comment"}"#).unwrap();
        assert_eq!(value["a"], "say \"hi\" // not a comment");
    }
}
