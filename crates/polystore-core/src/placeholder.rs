//! Placeholder scanning and translation.
//!
//! Portable statements carry either `?` positional markers or `@name` named
//! markers. Backends whose drivers use numbered placeholders (`$1..$N`)
//! rewrite the statement through [`translate`]; backends with native support
//! for both marker shapes use [`scan_markers`] to validate bindings up front.
//!
//! Scanning is quote-aware: markers inside single- or double-quoted strings
//! (including doubled-quote escapes), line comments (`--`), and block
//! comments (`/* */`) are left untouched.

use std::collections::HashMap;

use polystore_common::{Result, StorageError};

use crate::params::Params;
use crate::value::SqlValue;

/// A placeholder found outside quotes and comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// `?`, bound by position in source order.
    Positional,
    /// `@ident`, bound by name.
    Named(String),
}

/// A statement rewritten for a numbered-placeholder driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Translated {
    /// SQL with every marker replaced by `$1..$N`.
    pub sql: String,
    /// Values in driver order.
    pub values: Vec<SqlValue>,
}

/// One lexer event: either a verbatim character or a recognized marker.
enum LexEvent {
    Char(char),
    Marker(Marker),
}

/// Lexer states shared by the scanner, the translator, and the script
/// splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Plain,
    SingleQuote,
    DoubleQuote,
    LineComment,
    BlockComment,
}

/// Walks `sql`, emitting a [`LexEvent`] per character or marker.
fn lex(sql: &str, mut emit: impl FnMut(LexEvent)) {
    let mut state = LexState::Plain;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match state {
            LexState::Plain => match ch {
                '\'' => {
                    state = LexState::SingleQuote;
                    emit(LexEvent::Char(ch));
                }
                '"' => {
                    state = LexState::DoubleQuote;
                    emit(LexEvent::Char(ch));
                }
                '-' if chars.peek() == Some(&'-') => {
                    state = LexState::LineComment;
                    emit(LexEvent::Char(ch));
                }
                '/' if chars.peek() == Some(&'*') => {
                    state = LexState::BlockComment;
                    emit(LexEvent::Char(ch));
                }
                '?' => emit(LexEvent::Marker(Marker::Positional)),
                '@' => {
                    let mut name = String::new();
                    while let Some(&next) = chars.peek() {
                        if next.is_ascii_alphanumeric() || next == '_' {
                            name.push(next);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
                        // Not an identifier marker (e.g. a bare `@`).
                        emit(LexEvent::Char(ch));
                        for c in name.chars() {
                            emit(LexEvent::Char(c));
                        }
                    } else {
                        emit(LexEvent::Marker(Marker::Named(name)));
                    }
                }
                _ => emit(LexEvent::Char(ch)),
            },
            LexState::SingleQuote => {
                emit(LexEvent::Char(ch));
                if ch == '\'' {
                    if chars.peek() == Some(&'\'') {
                        // Doubled quote stays inside the literal.
                        emit(LexEvent::Char('\''));
                        chars.next();
                    } else {
                        state = LexState::Plain;
                    }
                }
            }
            LexState::DoubleQuote => {
                emit(LexEvent::Char(ch));
                if ch == '"' {
                    if chars.peek() == Some(&'"') {
                        emit(LexEvent::Char('"'));
                        chars.next();
                    } else {
                        state = LexState::Plain;
                    }
                }
            }
            LexState::LineComment => {
                emit(LexEvent::Char(ch));
                if ch == '\n' {
                    state = LexState::Plain;
                }
            }
            LexState::BlockComment => {
                emit(LexEvent::Char(ch));
                if ch == '*' && chars.peek() == Some(&'/') {
                    emit(LexEvent::Char('/'));
                    chars.next();
                    state = LexState::Plain;
                }
            }
        }
    }
}

/// Returns every placeholder in source order.
pub fn scan_markers(sql: &str) -> Vec<Marker> {
    let mut markers = Vec::new();
    lex(sql, |event| {
        if let LexEvent::Marker(marker) = event {
            markers.push(marker);
        }
    });
    markers
}

/// Rewrites `sql` into `$1..$N` form and produces the driver value list.
///
/// Positional markers consume values left to right. Named markers are
/// numbered by first occurrence; repeats reuse the assigned number.
/// A marker with no corresponding value fails with a bind error;
/// unreferenced named values are dropped.
pub fn translate(sql: &str, params: &Params) -> Result<Translated> {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut values: Vec<SqlValue> = Vec::new();
    let mut assigned: HashMap<String, usize> = HashMap::new();
    let mut next_positional = 0usize;
    let mut error: Option<StorageError> = None;

    lex(sql, |event| {
        let marker = match event {
            LexEvent::Char(ch) => {
                out.push(ch);
                return;
            }
            LexEvent::Marker(marker) => marker,
        };
        {
            if error.is_some() {
                return;
            }
            match marker {
                Marker::Positional => {
                    let value = match params {
                        Params::Positional(list) => list.get(next_positional).cloned(),
                        _ => None,
                    };
                    match value {
                        Some(value) => {
                            next_positional += 1;
                            values.push(value);
                            out.push_str(&format!("${}", values.len()));
                        }
                        None => {
                            error = Some(StorageError::Bind {
                                marker: format!("?{}", next_positional + 1),
                            });
                        }
                    }
                }
                Marker::Named(name) => {
                    if let Some(&position) = assigned.get(&name) {
                        out.push_str(&format!("${position}"));
                        return;
                    }
                    let value = match params {
                        Params::Named(map) => map.get(&name).cloned(),
                        _ => None,
                    };
                    match value {
                        Some(value) => {
                            values.push(value);
                            let position = values.len();
                            assigned.insert(name, position);
                            out.push_str(&format!("${position}"));
                        }
                        None => {
                            error = Some(StorageError::Bind {
                                marker: format!("@{name}"),
                            });
                        }
                    }
                }
            }
        }
    });

    match error {
        Some(err) => Err(err),
        None => Ok(Translated { sql: out, values }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_rewrite_in_source_order() {
        let params = Params::positional(vec![SqlValue::Text("x".to_string()), SqlValue::Integer(1)]);
        let translated = translate("INSERT INTO t VALUES (?, ?)", &params).unwrap();
        assert_eq!(translated.sql, "INSERT INTO t VALUES ($1, $2)");
        assert_eq!(
            translated.values,
            vec![SqlValue::Text("x".to_string()), SqlValue::Integer(1)]
        );
    }

    #[test]
    fn test_named_first_occurrence_numbering() {
        let params = Params::from([("n", "x"), ("r", "admin")]);
        let translated = translate(
            "SELECT * FROM u WHERE name=@n AND role=@r OR alias=@n",
            &params,
        )
        .unwrap();
        assert_eq!(
            translated.sql,
            "SELECT * FROM u WHERE name=$1 AND role=$2 OR alias=$1"
        );
        assert_eq!(
            translated.values,
            vec![
                SqlValue::Text("x".to_string()),
                SqlValue::Text("admin".to_string())
            ]
        );
    }

    #[test]
    fn test_unresolved_named_marker_fails() {
        let params = Params::from([("n", "x")]);
        let err = translate("SELECT * FROM u WHERE role=@r", &params).unwrap_err();
        match err {
            StorageError::Bind { marker } => assert_eq!(marker, "@r"),
            other => panic!("expected bind error, got {other}"),
        }
    }

    #[test]
    fn test_unreferenced_named_values_dropped() {
        let params = Params::from([("n", "x"), ("unused", "y")]);
        let translated = translate("SELECT * FROM u WHERE name=@n", &params).unwrap();
        assert_eq!(translated.values.len(), 1);
    }

    #[test]
    fn test_missing_positional_value_fails() {
        let params = Params::positional(vec![SqlValue::Integer(1)]);
        let err = translate("SELECT ? + ?", &params).unwrap_err();
        match err {
            StorageError::Bind { marker } => assert_eq!(marker, "?2"),
            other => panic!("expected bind error, got {other}"),
        }
    }

    #[test]
    fn test_markers_inside_quotes_ignored() {
        let params = Params::positional(vec![SqlValue::Integer(1)]);
        let translated =
            translate("SELECT '?', \"@col\", 'it''s @here' , ? FROM t", &params).unwrap();
        assert_eq!(
            translated.sql,
            "SELECT '?', \"@col\", 'it''s @here' , $1 FROM t"
        );
        assert_eq!(translated.values, vec![SqlValue::Integer(1)]);
    }

    #[test]
    fn test_markers_inside_comments_ignored() {
        let params = Params::none();
        let translated = translate("SELECT 1 -- what?\n/* @not_a_param */", &params).unwrap();
        assert_eq!(translated.sql, "SELECT 1 -- what?\n/* @not_a_param */");
        assert!(translated.values.is_empty());
    }

    #[test]
    fn test_scan_markers() {
        let markers = scan_markers("SELECT ? FROM t WHERE a=@x AND b=@x");
        assert_eq!(
            markers,
            vec![
                Marker::Positional,
                Marker::Named("x".to_string()),
                Marker::Named("x".to_string()),
            ]
        );
    }
}
