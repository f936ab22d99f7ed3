//! Text command parser.
//!
//! Commands are plain chat messages starting with `/`. Parsing is separate
//! from execution so it stays synchronous and unit-testable; the runtime
//! acts on the returned [`Command`].

use banter_llm::ThinkingLevel;

pub const CONTEXT_COUNT_RANGE: (u32, u32) = (1, 50);
pub const CONTEXT_USES_RANGE: (u32, u32) = (1, 20);

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Forget,
    Thinking(Option<ThinkingLevel>),
    PersonaShow,
    PersonaSet(String),
    PersonaClear,
    Settings,
    Context { count: u32, lasts_for: u32 },
    CreateThread { name: String },
    Image { prompt: String },
}

/// `None` when the input is not a command at all. `Err` carries a usage
/// message to show the user verbatim.
pub fn parse_command(input: &str) -> Option<Result<Command, String>> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.split_whitespace();
    let head = parts.next()?.to_ascii_lowercase();
    let rest = trimmed[head.len()..].trim();

    let parsed = match head.as_str() {
        "/help" => Ok(Command::Help),
        "/forget" => Ok(Command::Forget),
        "/settings" => Ok(Command::Settings),
        "/thinking" => {
            if rest.is_empty() {
                Ok(Command::Thinking(None))
            } else {
                match ThinkingLevel::parse(rest) {
                    Some(level) => Ok(Command::Thinking(Some(level))),
                    None => Err("Usage: /thinking <minimal|low|medium|high>".to_string()),
                }
            }
        }
        "/persona" => {
            if rest.is_empty() {
                Ok(Command::PersonaShow)
            } else if rest.eq_ignore_ascii_case("default") {
                Ok(Command::PersonaClear)
            } else {
                Ok(Command::PersonaSet(rest.to_string()))
            }
        }
        "/context" => parse_context(rest),
        "/createthread" => {
            if rest.is_empty() {
                Err("Usage: /createthread <name>".to_string())
            } else {
                Ok(Command::CreateThread {
                    name: rest.to_string(),
                })
            }
        }
        "/image" => {
            if rest.is_empty() {
                Err("Usage: /image <prompt>".to_string())
            } else {
                Ok(Command::Image {
                    prompt: rest.to_string(),
                })
            }
        }
        _ => Err(
            "Unknown command. Supported: /help /forget /thinking /persona /settings \
             /context /createthread /image"
                .to_string(),
        ),
    };
    Some(parsed)
}

fn parse_context(rest: &str) -> Result<Command, String> {
    let usage = "Usage: /context [count 1-50] [lasts_for 1-20]";
    let mut args = rest.split_whitespace();

    let count = match args.next() {
        None => 10,
        Some(raw) => raw.parse::<u32>().map_err(|_| usage.to_string())?,
    };
    let lasts_for = match args.next() {
        None => 5,
        Some(raw) => raw.parse::<u32>().map_err(|_| usage.to_string())?,
    };
    if args.next().is_some() {
        return Err(usage.to_string());
    }

    Ok(Command::Context {
        count: count.clamp(CONTEXT_COUNT_RANGE.0, CONTEXT_COUNT_RANGE.1),
        lasts_for: lasts_for.clamp(CONTEXT_USES_RANGE.0, CONTEXT_USES_RANGE.1),
    })
}

pub fn help_text() -> String {
    [
        "I reply when you @mention me, DM me, post in a tracked channel, or talk in a thread I created.",
        "",
        "/help - this summary",
        "/forget - clear our conversation history here",
        "/thinking <minimal|low|medium|high> - set reasoning depth",
        "/persona <text> | /persona default - set or reset my persona",
        "/settings - show current settings for this conversation",
        "/context [count] [lasts_for] - load recent channel messages as context",
        "/createthread <name> - start a thread where I answer every message",
        "/image <prompt> - generate an image",
        "",
        "React \u{1f5d1}\u{fe0f} on my reply to delete it, \u{1f504} to regenerate it.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert!(parse_command("hello there").is_none());
        assert!(parse_command("  what / why").is_none());
    }

    #[test]
    fn thinking_levels_parse_case_insensitively() {
        assert_eq!(
            parse_command("/thinking HIGH").unwrap().unwrap(),
            Command::Thinking(Some(ThinkingLevel::High))
        );
        assert_eq!(
            parse_command("/thinking").unwrap().unwrap(),
            Command::Thinking(None)
        );
        assert!(parse_command("/thinking ultra").unwrap().is_err());
    }

    #[test]
    fn persona_set_show_and_clear() {
        assert_eq!(
            parse_command("/persona a dry-witted librarian").unwrap().unwrap(),
            Command::PersonaSet("a dry-witted librarian".to_string())
        );
        assert_eq!(
            parse_command("/persona").unwrap().unwrap(),
            Command::PersonaShow
        );
        assert_eq!(
            parse_command("/persona default").unwrap().unwrap(),
            Command::PersonaClear
        );
    }

    #[test]
    fn context_defaults_and_clamps() {
        assert_eq!(
            parse_command("/context").unwrap().unwrap(),
            Command::Context { count: 10, lasts_for: 5 }
        );
        assert_eq!(
            parse_command("/context 200 999").unwrap().unwrap(),
            Command::Context { count: 50, lasts_for: 20 }
        );
        assert_eq!(
            parse_command("/context 0 0").unwrap().unwrap(),
            Command::Context { count: 1, lasts_for: 1 }
        );
        assert!(parse_command("/context many").unwrap().is_err());
        assert!(parse_command("/context 5 2 extra").unwrap().is_err());
    }

    #[test]
    fn image_and_thread_need_arguments() {
        assert!(parse_command("/image").unwrap().is_err());
        assert_eq!(
            parse_command("/image a red fox in the snow").unwrap().unwrap(),
            Command::Image {
                prompt: "a red fox in the snow".to_string()
            }
        );
        assert!(parse_command("/createthread").unwrap().is_err());
    }

    #[test]
    fn unknown_commands_get_a_usage_reply() {
        assert!(parse_command("/wat").unwrap().is_err());
    }
}
