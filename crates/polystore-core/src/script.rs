//! Top-level script splitting.

/// Splits a multi-statement script on `;` at top level.
///
/// Quote and comment handling matches the placeholder scanner: separators
/// inside string literals, quoted identifiers, or comments do not split.
/// Empty fragments (trailing separators, blank lines) are dropped.
pub fn split_script(script: &str) -> Vec<String> {
    #[derive(PartialEq)]
    enum State {
        Plain,
        SingleQuote,
        DoubleQuote,
        LineComment,
        BlockComment,
    }

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = State::Plain;
    let mut chars = script.chars().peekable();

    while let Some(ch) = chars.next() {
        match state {
            State::Plain => match ch {
                ';' => {
                    let statement = current.trim();
                    if !statement.is_empty() {
                        statements.push(statement.to_string());
                    }
                    current.clear();
                    continue;
                }
                '\'' => {
                    state = State::SingleQuote;
                }
                '"' => {
                    state = State::DoubleQuote;
                }
                '-' if chars.peek() == Some(&'-') => {
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    state = State::BlockComment;
                }
                _ => {}
            },
            State::SingleQuote => {
                if ch == '\'' {
                    if chars.peek() == Some(&'\'') {
                        current.push('\'');
                        chars.next();
                    } else {
                        state = State::Plain;
                    }
                }
            }
            State::DoubleQuote => {
                if ch == '"' {
                    if chars.peek() == Some(&'"') {
                        current.push('"');
                        chars.next();
                    } else {
                        state = State::Plain;
                    }
                }
            }
            State::LineComment => {
                if ch == '\n' {
                    state = State::Plain;
                }
            }
            State::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    current.push('*');
                    current.push('/');
                    state = State::Plain;
                    continue;
                }
            }
        }
        current.push(ch);
    }

    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_statements() {
        let statements = split_script(
            "CREATE TABLE t(k TEXT); INSERT INTO t VALUES ('a');\nINSERT INTO t VALUES ('b')",
        );
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0], "CREATE TABLE t(k TEXT)");
        assert_eq!(statements[2], "INSERT INTO t VALUES ('b')");
    }

    #[test]
    fn test_separator_inside_quotes_does_not_split() {
        let statements = split_script("INSERT INTO t VALUES ('a;b'); SELECT 1");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "INSERT INTO t VALUES ('a;b')");
    }

    #[test]
    fn test_separator_inside_comment_does_not_split() {
        let statements = split_script("SELECT 1 -- not; a separator\n; SELECT 2");
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_empty_fragments_dropped() {
        let statements = split_script(";;  SELECT 1;  ;");
        assert_eq!(statements, vec!["SELECT 1".to_string()]);
    }

    #[test]
    fn test_doubled_quotes_stay_in_literal() {
        let statements = split_script("INSERT INTO t VALUES ('it''s; fine'); SELECT 1");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "INSERT INTO t VALUES ('it''s; fine')");
    }
}
