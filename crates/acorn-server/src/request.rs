//! Request-line parsing for the dictionary front-end.
//!
//! Requests arrive one per connection as an HTTP-style request line; the
//! command is the target path with its leading slash removed. A leading `?`
//! closes the store, a leading `-` removes the remainder, and any other
//! non-empty string is an add.

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add the key to the store.
    Add(String),
    /// Remove the key from the store.
    Remove(String),
    /// Close the store; the next request reopens it.
    Close,
    /// Nothing was asked.
    Empty,
}

/// Parses the first line of a request into a command.
pub fn parse_request_line(line: &str) -> Command {
    let target = line.split_whitespace().nth(1).unwrap_or("");
    classify(target.strip_prefix('/').unwrap_or(target))
}

fn classify(request: &str) -> Command {
    if let Some(rest) = request.strip_prefix('-') {
        Command::Remove(rest.to_string())
    } else if request.starts_with('?') {
        Command::Close
    } else if request.is_empty() {
        Command::Empty
    } else {
        Command::Add(request.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_word_is_an_add() {
        assert_eq!(
            parse_request_line("GET /acorn HTTP/1.1"),
            Command::Add("acorn".to_string())
        );
    }

    #[test]
    fn test_leading_dash_is_a_remove() {
        assert_eq!(
            parse_request_line("GET /-acorn HTTP/1.1"),
            Command::Remove("acorn".to_string())
        );
    }

    #[test]
    fn test_question_mark_closes() {
        assert_eq!(parse_request_line("GET /? HTTP/1.1"), Command::Close);
    }

    #[test]
    fn test_bare_path_is_empty() {
        assert_eq!(parse_request_line("GET / HTTP/1.1"), Command::Empty);
    }

    #[test]
    fn test_missing_target_is_empty() {
        assert_eq!(parse_request_line("GET"), Command::Empty);
        assert_eq!(parse_request_line(""), Command::Empty);
    }

    #[test]
    fn test_lone_dash_removes_nothing() {
        assert_eq!(
            parse_request_line("GET /- HTTP/1.1"),
            Command::Remove(String::new())
        );
    }
}
