//! Translate key text into tmux `send-keys` invocations.
//!
//! Each line becomes one invocation. Lines mentioning a tmux key name are
//! split into literal text and key arguments; other lines are sent literally
//! with `-l`.

const NAMED_KEYS: &[&str] = &[
    "Up", "Down", "Left", "Right", "BSpace", "BTab", "DC", "End", "Enter", "Escape", "Home", "IC",
    "NPage", "PageDown", "PgDn", "PPage", "PageUp", "PgUp", "Space", "Tab",
];

/// One `tmux send-keys -t <pane>` invocation, minus the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStroke {
    /// `send-keys -l <text>`.
    Literal(String),
    /// `send-keys <args...>` where key names are interpreted by tmux.
    Keys(Vec<String>),
}

impl KeyStroke {
    /// Arguments following `send-keys -t <pane>`.
    pub fn args(&self) -> Vec<String> {
        match self {
            KeyStroke::Literal(text) => vec!["-l".to_string(), text.clone()],
            KeyStroke::Keys(keys) => keys.clone(),
        }
    }
}

fn is_key_token(token: &str) -> bool {
    token.starts_with("C-")
        || token.starts_with("M-")
        || NAMED_KEYS.contains(&token)
        || is_function_key(token)
}

fn is_function_key(token: &str) -> bool {
    token
        .strip_prefix('F')
        .and_then(|n| n.parse::<u8>().ok())
        .is_some_and(|n| (1..=12).contains(&n))
}

fn mentions_key(line: &str) -> bool {
    line.contains("C-")
        || line.contains("M-")
        || NAMED_KEYS.iter().any(|key| line.contains(key))
        || (1..=12).any(|n| line.contains(&format!("F{n}")))
}

/// Split one line containing key names into send-keys arguments.
///
/// Words that are key names become their own argument; runs of other words
/// are joined with single spaces.
fn split_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut text = String::new();
    for word in line.split(' ').filter(|word| !word.is_empty()) {
        if is_key_token(word) {
            if !text.is_empty() {
                args.push(std::mem::take(&mut text));
            }
            args.push(word.to_string());
        } else {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(word);
        }
    }
    if !text.is_empty() {
        args.push(text);
    }
    args
}

/// Plan the send-keys invocations for `text`.
///
/// With `auto_enter`, `Enter` follows every line except a trailing empty one.
pub fn plan(text: &str, auto_enter: bool) -> Vec<KeyStroke> {
    let lines: Vec<&str> = text.split('\n').collect();
    let last = lines.len() - 1;
    let mut strokes = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !line.is_empty() {
            if mentions_key(line) {
                let args = split_line(line);
                if !args.is_empty() {
                    strokes.push(KeyStroke::Keys(args));
                }
            } else {
                let literal = match line.strip_suffix(';') {
                    Some(head) => format!("{head}\\;"),
                    None => line.to_string(),
                };
                strokes.push(KeyStroke::Literal(literal));
            }
        }
        if auto_enter && (i < last || !line.is_empty()) {
            strokes.push(KeyStroke::Keys(vec!["Enter".to_string()]));
        }
    }
    strokes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keys(args: &[&str]) -> KeyStroke {
        KeyStroke::Keys(args.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn plain_command_with_enter() {
        assert_eq!(
            plan("ls -la", true),
            vec![KeyStroke::Literal("ls -la".to_string()), keys(&["Enter"])]
        );
    }

    #[test]
    fn key_names_split_from_text() {
        assert_eq!(plan("C-c", false), vec![keys(&["C-c"])]);
        assert_eq!(
            plan(":wq Enter", false),
            vec![keys(&[":wq", "Enter"])]
        );
        assert_eq!(
            plan("echo  hi F5 Escape", false),
            vec![keys(&["echo hi", "F5", "Escape"])]
        );
    }

    #[test]
    fn trailing_semicolon_is_escaped() {
        assert_eq!(
            plan("echo a;", false),
            vec![KeyStroke::Literal("echo a\\;".to_string())]
        );
    }

    /// A trailing newline does not produce a second Enter.
    #[test]
    fn multiline_enter_placement() {
        assert_eq!(
            plan("a\nb\n", true),
            vec![
                KeyStroke::Literal("a".to_string()),
                keys(&["Enter"]),
                KeyStroke::Literal("b".to_string()),
                keys(&["Enter"]),
            ]
        );
        assert_eq!(
            plan("a\n\nb", true),
            vec![
                KeyStroke::Literal("a".to_string()),
                keys(&["Enter"]),
                keys(&["Enter"]),
                KeyStroke::Literal("b".to_string()),
                keys(&["Enter"]),
            ]
        );
        assert_eq!(plan("", true), Vec::new());
    }

    #[test]
    fn literal_args_use_dash_l() {
        assert_eq!(
            KeyStroke::Literal("x".to_string()).args(),
            vec!["-l".to_string(), "x".to_string()]
        );
    }
}
