//! Parsing generation backend replies into authored chat lines.
//!
//! Channel generations come back as a single `"name: content"` line,
//! sometimes wrapped in markdown or preceded by chatter. Direct-message
//! replies are raw text that may echo the speaker's name. Malformed replies
//! yield `None` and are logged, never surfaced.

use tracing::debug;

/// Longest nickname accepted from a reply.
const MAX_NICK_CHARS: usize = 32;

/// One authored line extracted from a channel reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    /// Claimed author nickname.
    pub author: String,
    /// What they said.
    pub content: String,
    /// Whether the line was written as a `/me`-style action.
    pub action: bool,
}

fn clean_nick(raw: &str) -> Option<String> {
    let nick = raw
        .trim()
        .trim_matches(|c: char| matches!(c, '<' | '>' | '*' | '[' | ']' | '_' | '`' | '@'))
        .trim();
    let valid = !nick.is_empty()
        && nick.chars().count() <= MAX_NICK_CHARS
        && !nick.chars().any(char::is_whitespace);
    valid.then(|| nick.to_owned())
}

fn parse_line(line: &str) -> Option<ParsedLine> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("* ").or_else(|| line.strip_prefix("/me ")) {
        let (nick, action) = rest.split_once(' ')?;
        let action = action.trim();
        return (!action.is_empty()).then_some(ParsedLine {
            author: clean_nick(nick)?,
            content: action.to_owned(),
            action: true,
        });
    }
    let (nick, content) = line.split_once(':')?;
    let content = content.trim().trim_start_matches("**").trim();
    if content.is_empty() {
        return None;
    }
    Some(ParsedLine {
        author: clean_nick(nick)?,
        content: content.to_owned(),
        action: false,
    })
}

/// Extract the first well-formed `"name: content"` line from a reply.
pub fn parse_channel_reply(raw: &str) -> Option<ParsedLine> {
    let parsed = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("```"))
        .find_map(parse_line);
    if parsed.is_none() {
        debug!(raw_reply = raw, "reply did not contain a name: content line");
    }
    parsed
}

/// Strip a leading `"name:"`, `"name -"` or `"name "` echo from a direct
/// reply written by `name`.
pub fn strip_echo(name: &str, reply: &str) -> String {
    let trimmed = reply.trim();
    let lower = trimmed.to_lowercase();
    let name_lower = name.to_lowercase();

    let mut rest = trimmed;
    for prefix in [format!("<{name_lower}>"), name_lower] {
        if lower.starts_with(&prefix) {
            rest = trimmed.get(prefix.len()..).unwrap_or(trimmed);
            break;
        }
    }
    if rest.len() == trimmed.len() {
        return trimmed.to_owned();
    }

    let stripped = rest
        .strip_prefix(':')
        .or_else(|| rest.trim_start().strip_prefix('-'))
        .or_else(|| rest.strip_prefix(' '));
    match stripped {
        Some(body) if !body.trim().is_empty() => body.trim().to_owned(),
        _ => trimmed.to_owned(),
    }
}

/// Whether `content` is one of the recognized bot commands.
///
/// A command matches as a whole word: `!roll 2d6` matches `!roll`,
/// `!rolling` does not.
pub fn is_bot_command(content: &str, commands: &[String]) -> bool {
    let first = content.split_whitespace().next().unwrap_or_default();
    !first.is_empty() && commands.iter().any(|c| c.eq_ignore_ascii_case(first))
}
