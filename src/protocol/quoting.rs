//! POSIX shell word splitting and quoting for command lines

use std::borrow::Cow;

use crate::error::{Error, Result};

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Between,
    Word,
    Single,
    Double,
}

/// Split one line into words the way a POSIX shell would, minus expansions
pub fn split(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut state = State::Between;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match state {
            State::Between | State::Word => match c {
                c if c.is_whitespace() => {
                    if state == State::Word {
                        words.push(std::mem::take(&mut word));
                        state = State::Between;
                    }
                }
                '\'' => state = State::Single,
                '"' => state = State::Double,
                '\\' => {
                    let escaped = chars
                        .next()
                        .ok_or_else(|| Error::Framing("no escaped character".to_string()))?;
                    word.push(escaped);
                    state = State::Word;
                }
                c => {
                    word.push(c);
                    state = State::Word;
                }
            },
            State::Single => match c {
                '\'' => state = State::Word,
                c => word.push(c),
            },
            State::Double => match c {
                '"' => state = State::Word,
                '\\' => match chars.next() {
                    Some(e @ ('"' | '\\')) => word.push(e),
                    Some(other) => {
                        word.push('\\');
                        word.push(other);
                    }
                    None => return Err(Error::Framing("no closing quotation".to_string())),
                },
                c => word.push(c),
            },
        }
    }

    match state {
        State::Single | State::Double => Err(Error::Framing("no closing quotation".to_string())),
        State::Word => {
            words.push(word);
            Ok(words)
        }
        State::Between => Ok(words),
    }
}

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c)
}

/// Quote a word so `split` returns it unchanged
pub fn quote(word: &str) -> Cow<'_, str> {
    if word.is_empty() {
        return Cow::Borrowed("''");
    }
    if word.chars().all(is_safe) {
        return Cow::Borrowed(word);
    }
    Cow::Owned(format!("'{}'", word.replace('\'', r#"'"'"'"#)))
}

/// Render one response record
pub fn join(words: &[String]) -> String {
    words
        .iter()
        .map(|w| quote(w))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split() {
        assert_eq!(split("get  SSID").unwrap(), vec!["get", "SSID"]);
        assert_eq!(
            split(r#"set SSID 'my net' Name "a \"b\" \c""#).unwrap(),
            vec!["set", "SSID", "my net", "Name", r#"a "b" \c"#]
        );
        assert_eq!(split(r"set x a\ b ''").unwrap(), vec!["set", "x", "a b", ""]);
        assert_eq!(split(r#"a'b'"c"d"#).unwrap(), vec!["abcd"]);
        assert!(split("   ").unwrap().is_empty());
    }

    #[test]
    fn test_split_framing_errors() {
        assert!(matches!(split("get 'SSID"), Err(Error::Framing(_))));
        assert!(matches!(split("get \"SSID"), Err(Error::Framing(_))));
        assert!(matches!(split("get SSID\\"), Err(Error::Framing(_))));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("Device.Name"), "Device.Name");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("two words"), "'two words'");
        assert_eq!(quote("it's"), r#"'it'"'"'s'"#);

        let words = vec!["ERROR".to_string(), "9007".to_string(), "it's bad".to_string()];
        assert_eq!(split(&join(&words)).unwrap(), words);
    }
}
