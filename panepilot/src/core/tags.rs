//! Tag scanner for model replies.
//!
//! The model answers in free text with a fixed vocabulary of XML-like tags
//! appended (`<ExecCommand>`, `<RequestAccomplished>`, ...). Scanning is total:
//! malformed or absent tags produce empty fields and the full text as message.
//!
//! The scanner is a single-pass tokenizer. It splits the reply into text and
//! recognized tag tokens, then rebuilds the residual message from the text
//! tokens. Runs of adjacent tags wrapped in a code fence or inline backticks
//! take the wrapper with them. Anything outside the vocabulary is text.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{ExecCommand, ParsedResponse, PasteContent, ReadFileRequest, SendKeys};

const FENCE: &str = "```";

/// Recognized tag names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    ExecCommand,
    TmuxSendKeys,
    PasteMultilineContent,
    ReadFile,
    RequestAccomplished,
    ExecPaneSeemsBusy,
    WaitingForUserResponse,
    NoComment,
    CreateExecPane,
}

impl TagKind {
    pub const ALL: [TagKind; 9] = [
        TagKind::ExecCommand,
        TagKind::TmuxSendKeys,
        TagKind::PasteMultilineContent,
        TagKind::ReadFile,
        TagKind::RequestAccomplished,
        TagKind::ExecPaneSeemsBusy,
        TagKind::WaitingForUserResponse,
        TagKind::NoComment,
        TagKind::CreateExecPane,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TagKind::ExecCommand => "ExecCommand",
            TagKind::TmuxSendKeys => "TmuxSendKeys",
            TagKind::PasteMultilineContent => "PasteMultilineContent",
            TagKind::ReadFile => "ReadFile",
            TagKind::RequestAccomplished => "RequestAccomplished",
            TagKind::ExecPaneSeemsBusy => "ExecPaneSeemsBusy",
            TagKind::WaitingForUserResponse => "WaitingForUserResponse",
            TagKind::NoComment => "NoComment",
            TagKind::CreateExecPane => "CreateExecPane",
        }
    }

    /// Pane-addressable tags accept an optional `pane_id="..."` attribute.
    pub fn accepts_pane_id(self) -> bool {
        matches!(
            self,
            TagKind::ExecCommand
                | TagKind::TmuxSendKeys
                | TagKind::PasteMultilineContent
                | TagKind::ReadFile
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Tag<'a> {
    kind: TagKind,
    pane_id: Option<&'a str>,
    content: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    Tag(Tag<'a>),
}

/// Scan a raw model reply into a [`ParsedResponse`].
///
/// Repeatable tags are collected in document order. Boolean tags take the
/// value of their last occurrence.
pub fn scan(raw: &str) -> ParsedResponse {
    let tokens = tokenize(raw);
    let mut response = ParsedResponse::default();
    let mut message = String::new();
    // Bytes of the next text token already consumed as a closing fence.
    let mut skip = 0usize;

    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Text(text) => {
                message.push_str(&text[skip..]);
                skip = 0;
                i += 1;
            }
            Token::Tag(_) => {
                let end = run_end(&tokens, i);
                let run = &tokens[i..end];
                for token in run {
                    if let Token::Tag(tag) = token {
                        apply(&mut response, tag);
                    }
                }

                let following = match tokens.get(end) {
                    Some(Token::Text(text)) => *text,
                    _ => "",
                };
                match unwrap_fence(&message, following) {
                    Some((open_at, close_len)) => {
                        message.truncate(open_at);
                        skip = close_len;
                    }
                    None => {
                        for token in run {
                            if let Token::Text(text) = token {
                                message.push_str(text);
                            }
                        }
                    }
                }
                i = end;
            }
        }
    }

    response.message = collapse_blank_lines(&message).trim().to_string();
    response
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while let Some(offset) = input[pos..].find('<') {
        let at = pos + offset;
        match match_tag(input, at) {
            Some((tag, end)) => {
                if text_start < at {
                    tokens.push(Token::Text(&input[text_start..at]));
                }
                tokens.push(Token::Tag(tag));
                pos = end;
                text_start = end;
            }
            None => pos = at + 1,
        }
    }
    if text_start < input.len() {
        tokens.push(Token::Text(&input[text_start..]));
    }
    tokens
}

/// Try to read a complete recognized tag starting at the `<` at byte `at`.
///
/// Returns the tag and the byte offset just past its closing marker.
fn match_tag(input: &str, at: usize) -> Option<(Tag<'_>, usize)> {
    let rest = &input[at + 1..];
    for kind in TagKind::ALL {
        let name = kind.name();
        let Some(after_name) = rest.strip_prefix(name) else {
            continue;
        };
        let (pane_id, body) = if let Some(body) = after_name.strip_prefix('>') {
            (None, body)
        } else if kind.accepts_pane_id() {
            match parse_pane_attribute(after_name) {
                Some(parsed) => parsed,
                None => continue,
            }
        } else {
            continue;
        };

        let close = format!("</{name}>");
        let Some(content_len) = body.find(&close) else {
            continue;
        };
        let body_start = input.len() - body.len();
        let tag = Tag {
            kind,
            pane_id,
            content: &body[..content_len],
        };
        return Some((tag, body_start + content_len + close.len()));
    }
    None
}

fn parse_pane_attribute(after_name: &str) -> Option<(Option<&str>, &str)> {
    static PANE_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"^\s+pane_id\s*=\s*"([^"]*)"\s*>"#).expect("pane_id attribute pattern")
    });
    let caps = PANE_ATTR_RE.captures(after_name)?;
    let whole = caps.get(0)?;
    let id = caps.get(1).map(|m| m.as_str().trim()).filter(|s| !s.is_empty());
    Some((id, &after_name[whole.end()..]))
}

/// Index one past the last tag of the run starting at `start`.
///
/// A run is a sequence of tags separated only by whitespace text.
fn run_end(tokens: &[Token<'_>], start: usize) -> usize {
    let mut end = start + 1;
    let mut j = end;
    while j < tokens.len() {
        match &tokens[j] {
            Token::Tag(_) => {
                j += 1;
                end = j;
            }
            Token::Text(text) if text.trim().is_empty() => j += 1,
            Token::Text(_) => break,
        }
    }
    end
}

/// Detect a fence or inline backticks wrapping a tag run.
///
/// `before` is the message built so far, `after` the text following the run.
/// Returns the byte offset in `before` where the opener starts and the number
/// of bytes of `after` the closer occupies.
fn unwrap_fence(before: &str, after: &str) -> Option<(usize, usize)> {
    if before.ends_with('`')
        && !before.ends_with("``")
        && after.starts_with('`')
        && !after.starts_with("``")
        && opens_code_span(before)
    {
        return Some((before.len() - 1, 1));
    }

    let head = before.trim_end();
    let open_at = head.rfind(FENCE)?;
    let lang = &head[open_at + FENCE.len()..];
    if !lang
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'))
    {
        return None;
    }
    // An odd number of fences before this one means it closes an earlier block.
    if head[..open_at].matches(FENCE).count() % 2 != 0 {
        return None;
    }

    let rest = after.trim_start().strip_prefix(FENCE)?;
    let line_rest = rest.lines().next().unwrap_or("");
    if !line_rest.trim().is_empty() {
        return None;
    }
    Some((open_at, after.len() - rest.len()))
}

/// The trailing backtick of `before` opens a span only when the backticks
/// earlier on its line are balanced; otherwise it closes one.
fn opens_code_span(before: &str) -> bool {
    let line = &before[before.rfind('\n').map_or(0, |i| i + 1)..];
    line[..line.len() - 1].matches('`').count() % 2 == 0
}

fn apply(response: &mut ParsedResponse, tag: &Tag<'_>) {
    let pane_id = tag.pane_id.map(str::to_string);
    match tag.kind {
        TagKind::ExecCommand => response.exec_commands.push(ExecCommand {
            command: decode_entities(tag.content.trim()),
            pane_id,
        }),
        TagKind::TmuxSendKeys => response.send_keys.push(SendKeys {
            keys: decode_entities(tag.content),
            pane_id,
        }),
        TagKind::PasteMultilineContent => response.paste_contents.push(PasteContent {
            content: decode_entities(tag.content.trim()),
            pane_id,
        }),
        TagKind::ReadFile => response.read_files.push(ReadFileRequest {
            path: decode_entities(tag.content.trim()),
            pane_id,
        }),
        TagKind::RequestAccomplished => response.request_accomplished = is_truthy(tag.content),
        TagKind::ExecPaneSeemsBusy => response.exec_pane_seems_busy = is_truthy(tag.content),
        TagKind::WaitingForUserResponse => {
            response.waiting_for_user_response = is_truthy(tag.content);
        }
        TagKind::NoComment => response.no_comment = is_truthy(tag.content),
        TagKind::CreateExecPane => response.create_exec_pane = is_truthy(tag.content),
    }
}

fn is_truthy(content: &str) -> bool {
    matches!(content.trim().to_ascii_lowercase().as_str(), "1" | "true")
}

/// Decode XML character entities. Unknown or bare `&` is kept as-is.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        match decode_entity(candidate) {
            Some((ch, len)) => {
                out.push(ch);
                rest = &candidate[len..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(candidate: &str) -> Option<(char, usize)> {
    let (semi, _) = candidate
        .char_indices()
        .take(12)
        .find(|(_, c)| *c == ';')?;
    let name = &candidate[1..semi];
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)?
        }
    };
    Some((ch, semi + 1))
}

fn collapse_blank_lines(text: &str) -> String {
    static BLANK_RUN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n)+").expect("blank line pattern"));
    BLANK_RUN_RE.replace_all(text, "\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wrap(kind: TagKind, value: &str, pane_id: Option<&str>) -> String {
        let name = kind.name();
        match pane_id {
            Some(id) => format!("<{name} pane_id=\"{id}\">{value}</{name}>"),
            None => format!("<{name}>{value}</{name}>"),
        }
    }

    fn encode(value: &str) -> String {
        value
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&apos;")
    }

    #[test]
    fn waiting_for_user_inline() {
        let got =
            scan("Just let me know what you'd like me to do. <WaitingForUserResponse>1</WaitingForUserResponse>");
        assert_eq!(
            got,
            ParsedResponse {
                message: "Just let me know what you'd like me to do.".to_string(),
                waiting_for_user_response: true,
                ..ParsedResponse::default()
            }
        );
    }

    #[test]
    fn send_keys_collected_in_order() {
        let got = scan("<TmuxSendKeys>foo</TmuxSendKeys><TmuxSendKeys>bar</TmuxSendKeys>");
        assert_eq!(
            got,
            ParsedResponse {
                send_keys: vec![
                    SendKeys {
                        keys: "foo".to_string(),
                        pane_id: None
                    },
                    SendKeys {
                        keys: "bar".to_string(),
                        pane_id: None
                    },
                ],
                ..ParsedResponse::default()
            }
        );
    }

    #[test]
    fn exec_command_with_pane_id() {
        let got = scan(r#"<ExecCommand pane_id="%1">ls -l</ExecCommand>"#);
        assert_eq!(
            got.exec_commands,
            vec![ExecCommand {
                command: "ls -l".to_string(),
                pane_id: Some("%1".to_string()),
            }]
        );
        assert_eq!(got.message, "");
    }

    #[test]
    fn pane_ids_on_every_addressable_tag() {
        let got = scan(
            r#"<ExecCommand pane_id="%1">ls -l</ExecCommand><TmuxSendKeys pane_id="%2">vim</TmuxSendKeys><PasteMultilineContent pane_id="%3">hello</PasteMultilineContent><ReadFile pane_id="%4"> notes.txt </ReadFile>"#,
        );
        assert_eq!(got.exec_commands[0].pane_id.as_deref(), Some("%1"));
        assert_eq!(got.send_keys[0].pane_id.as_deref(), Some("%2"));
        assert_eq!(got.paste_contents[0].pane_id.as_deref(), Some("%3"));
        assert_eq!(got.read_files[0].pane_id.as_deref(), Some("%4"));
        assert_eq!(got.read_files[0].path, "notes.txt");
    }

    #[test]
    fn pane_id_attribute_tolerates_spacing_and_empty_value() {
        let got = scan(r#"<ExecCommand  pane_id = "%7" >pwd</ExecCommand><ExecCommand pane_id="">ls</ExecCommand>"#);
        assert_eq!(got.exec_commands[0].pane_id.as_deref(), Some("%7"));
        assert_eq!(got.exec_commands[1].pane_id, None);
    }

    #[test]
    fn plain_text_is_returned_unchanged() {
        let got = scan("Just a message with no tags.");
        assert_eq!(
            got,
            ParsedResponse {
                message: "Just a message with no tags.".to_string(),
                ..ParsedResponse::default()
            }
        );
    }

    #[test]
    fn plain_text_only_loses_outer_whitespace_and_blank_runs() {
        let got = scan("\n  first line\n\n\n   \nsecond line  \n");
        assert_eq!(got.message, "first line\nsecond line");
    }

    #[test]
    fn only_tags_leave_empty_message() {
        let got = scan("<RequestAccomplished>1</RequestAccomplished>");
        assert_eq!(got.message, "");
        assert!(got.request_accomplished);
    }

    #[test]
    fn boolean_content_is_trimmed_and_case_insensitive() {
        let got = scan("Some text\n\n<RequestAccomplished> 1 </RequestAccomplished>\n");
        assert_eq!(got.message, "Some text");
        assert!(got.request_accomplished);

        assert!(scan("<NoComment>TRUE</NoComment>").no_comment);
        assert!(!scan("<NoComment>yes</NoComment>").no_comment);
        assert!(!scan("<NoComment>0</NoComment>").no_comment);
    }

    /// Duplicate boolean tags are allowed by the grammar; the last one decides.
    #[test]
    fn boolean_tags_last_occurrence_wins() {
        let got = scan("<ExecPaneSeemsBusy>1</ExecPaneSeemsBusy> <ExecPaneSeemsBusy>0</ExecPaneSeemsBusy>");
        assert!(!got.exec_pane_seems_busy);
        let got = scan("<CreateExecPane>0</CreateExecPane><CreateExecPane>true</CreateExecPane>");
        assert!(got.create_exec_pane);
    }

    #[test]
    fn tag_inside_xml_fence_is_extracted_and_fence_removed() {
        let got = scan(
            "Here is some lines and than the tag.\n```xml\n<RequestAccomplished>1</RequestAccomplished>\n```",
        );
        assert_eq!(
            got,
            ParsedResponse {
                message: "Here is some lines and than the tag.".to_string(),
                request_accomplished: true,
                ..ParsedResponse::default()
            }
        );
    }

    #[test]
    fn multiple_fenced_runs_with_text_between() {
        let got = scan(
            "Here is some lines and than the tag.\n```\n<TmuxSendKeys>SOmething</TmuxSendKeys>\n```\nMore content\n```<ExecPaneSeemsBusy>1</ExecPaneSeemsBusy>```",
        );
        assert_eq!(
            got,
            ParsedResponse {
                message: "Here is some lines and than the tag.\nMore content".to_string(),
                send_keys: vec![SendKeys {
                    keys: "SOmething".to_string(),
                    pane_id: None
                }],
                exec_pane_seems_busy: true,
                ..ParsedResponse::default()
            }
        );
    }

    #[test]
    fn inline_backticks_are_removed_with_the_tag() {
        let got = scan("The AI said `<RequestAccomplished>1</RequestAccomplished>`");
        assert_eq!(got.message, "The AI said");
        assert!(got.request_accomplished);
    }

    /// Backticks that close and open neighbouring code spans stay put.
    #[test]
    fn adjacent_code_spans_are_not_merged() {
        let got = scan("`code`<ExecCommand>ls</ExecCommand>`more`");
        assert_eq!(got.message, "`code``more`");
        assert_eq!(got.exec_commands.len(), 1);

        let got = scan("Use `a` then `<ExecCommand>ls</ExecCommand>`");
        assert_eq!(got.message, "Use `a` then");
    }

    #[test]
    fn fenced_and_unfenced_extraction_match() {
        let bare = scan("Run it.\n<ExecCommand>make test</ExecCommand>");
        let fenced = scan("Run it.\n```xml\n<ExecCommand>make test</ExecCommand>\n```");
        let ticked = scan("Run it.\n`<ExecCommand>make test</ExecCommand>`");
        assert_eq!(bare, fenced);
        assert_eq!(bare, ticked);
    }

    #[test]
    fn fence_with_other_content_keeps_the_fence() {
        let got = scan("```sh\nls\n<ExecCommand>ls</ExecCommand>\n```");
        assert_eq!(got.exec_commands.len(), 1);
        assert_eq!(got.message, "```sh\nls\n```");
    }

    #[test]
    fn closing_fence_of_earlier_block_is_not_an_opener() {
        let got = scan("```bash\nls\n```\n<ExecCommand>ls</ExecCommand>\n```python\nprint(1)\n```");
        assert_eq!(got.exec_commands.len(), 1);
        assert_eq!(got.message, "```bash\nls\n```\n```python\nprint(1)\n```");
    }

    #[test]
    fn foreign_tags_stay_verbatim() {
        let got = scan(
            "Message before.\n<TmuxSendKeys>foo</TmuxSendKeys>\n```\n<NotAIResponse>foo</NotAIResponse>\n```\n<MessageTag>bar</MessageTag>\n<RequestAccomplished>1</RequestAccomplished>\nAfter.",
        );
        assert_eq!(
            got,
            ParsedResponse {
                message: "Message before.\n```\n<NotAIResponse>foo</NotAIResponse>\n```\n<MessageTag>bar</MessageTag>\nAfter.".to_string(),
                send_keys: vec![SendKeys {
                    keys: "foo".to_string(),
                    pane_id: None
                }],
                request_accomplished: true,
                ..ParsedResponse::default()
            }
        );
    }

    #[test]
    fn unclosed_and_misspelled_tags_are_text() {
        let got = scan("<ExecCommand>ls -la\n<ExecCommands>pwd</ExecCommands>");
        assert!(got.exec_commands.is_empty());
        assert_eq!(got.message, "<ExecCommand>ls -la\n<ExecCommands>pwd</ExecCommands>");
    }

    #[test]
    fn boolean_tags_do_not_take_attributes() {
        let got = scan(r#"<RequestAccomplished pane_id="%1">1</RequestAccomplished>"#);
        assert!(!got.request_accomplished);
        assert_eq!(got.message, r#"<RequestAccomplished pane_id="%1">1</RequestAccomplished>"#);
    }

    #[test]
    fn send_keys_preserve_whitespace_and_newlines() {
        let got = scan("<TmuxSendKeys>  line1\nline2 </TmuxSendKeys>");
        assert_eq!(got.send_keys[0].keys, "  line1\nline2 ");
    }

    #[test]
    fn entities_decode_with_bare_ampersands_kept() {
        let got = scan("<TmuxSendKeys>foo &amp; bar & baz</TmuxSendKeys>");
        assert_eq!(got.send_keys[0].keys, "foo & bar & baz");

        let got = scan("<TmuxSendKeys>line1 &lt;tag&gt;\nline2 &amp; more</TmuxSendKeys>");
        assert_eq!(got.send_keys[0].keys, "line1 <tag>\nline2 & more");

        assert_eq!(decode_entities("&#65;&#x42;&unknown;&"), "AB&unknown;&");
    }

    /// A recognized tag inside another tag's content belongs to that content.
    #[test]
    fn nested_tag_is_content_of_outer_tag() {
        let got = scan("<PasteMultilineContent>echo '<ExecCommand>x</ExecCommand>'</PasteMultilineContent>");
        assert!(got.exec_commands.is_empty());
        assert_eq!(
            got.paste_contents[0].content,
            "echo '<ExecCommand>x</ExecCommand>'"
        );
    }

    #[test]
    fn every_tag_kind_round_trips_multiline_and_entity_values() {
        let raw_value = "if [ \"$a\" -lt 3 ] && echo 'ok'; then\n  cat <file> \nfi";
        let encoded = encode(raw_value);

        let got = scan(&wrap(TagKind::ExecCommand, &encoded, Some("%2")));
        assert_eq!(got.exec_commands[0].command, raw_value.trim());
        assert_eq!(got.exec_commands[0].pane_id.as_deref(), Some("%2"));

        let got = scan(&wrap(TagKind::TmuxSendKeys, &encoded, None));
        assert_eq!(got.send_keys[0].keys, raw_value);

        let got = scan(&wrap(TagKind::PasteMultilineContent, &encoded, None));
        assert_eq!(got.paste_contents[0].content, raw_value.trim());

        let got = scan(&wrap(TagKind::ReadFile, "src/&lt;odd&gt; &amp; &quot;name&apos;.txt", None));
        assert_eq!(got.read_files[0].path, "src/<odd> & \"name'.txt");

        for kind in [
            TagKind::RequestAccomplished,
            TagKind::ExecPaneSeemsBusy,
            TagKind::WaitingForUserResponse,
            TagKind::NoComment,
            TagKind::CreateExecPane,
        ] {
            let got = scan(&wrap(kind, "1", None));
            let flags = [
                got.request_accomplished,
                got.exec_pane_seems_busy,
                got.waiting_for_user_response,
                got.no_comment,
                got.create_exec_pane,
            ];
            assert_eq!(flags.iter().filter(|f| **f).count(), 1, "{}", kind.name());
        }
    }
}
