//! Slash command parsing.
//!
//! Anything that is not a recognized command is either ordinary chat text
//! (no leading slash) or an unknown command to be ignored silently.

/// A parsed bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Greeting plus the command list.
    Start,
    /// Reset the chat's session.
    New,
    /// Inference server health, model name, active session count.
    Status,
    /// Show remembered name and facts.
    Memory,
    /// Record the user's name. `None` means the argument was missing.
    Iam(Option<String>),
    /// Store a fact. `None` means the argument was missing.
    Remember(Option<String>),
    /// Wipe memory or drop a single fact. `None` means the argument did
    /// not parse.
    Forget(Option<ForgetScope>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgetScope {
    /// Bare `/forget`: wipe the whole record.
    All,
    /// `/forget <n>`: drop fact number `n` as shown by `/memory` (1-based).
    Fact(usize),
}

/// Parse a message text into a command. Returns `None` for ordinary text
/// and for unknown commands. The slash must be the first character;
/// indented text is ordinary chat.
pub fn parse(text: &str) -> Option<Command> {
    let rest = text.trim_end().strip_prefix('/')?;
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    // Group chats address commands as /cmd@BotName
    let name = name.split('@').next().unwrap_or(name);

    let arg_or_none = || (!arg.is_empty()).then(|| arg.to_string());

    Some(match name {
        "start" => Command::Start,
        "new" => Command::New,
        "status" => Command::Status,
        "memory" => Command::Memory,
        "iam" => Command::Iam(arg_or_none()),
        "remember" => Command::Remember(arg_or_none()),
        "forget" => Command::Forget(parse_forget_scope(arg)),
        _ => return None,
    })
}

fn parse_forget_scope(arg: &str) -> Option<ForgetScope> {
    if arg.is_empty() {
        return Some(ForgetScope::All);
    }
    arg.parse::<usize>().ok().map(ForgetScope::Fact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse("hola"), None);
        assert_eq!(parse("what does /start do?"), None);
    }

    #[test]
    fn unknown_commands_are_ignored() {
        assert_eq!(parse("/selfdestruct"), None);
    }

    #[test]
    fn bare_commands_parse() {
        assert_eq!(parse("/start"), Some(Command::Start));
        assert_eq!(parse("/new"), Some(Command::New));
        assert_eq!(parse("/status"), Some(Command::Status));
        assert_eq!(parse("/memory"), Some(Command::Memory));
    }

    #[test]
    fn group_mention_suffix_is_stripped() {
        assert_eq!(parse("/start@PincerBot"), Some(Command::Start));
        assert_eq!(
            parse("/iam@PincerBot Ana"),
            Some(Command::Iam(Some("Ana".into())))
        );
    }

    #[test]
    fn iam_takes_the_whole_rest_as_name() {
        assert_eq!(
            parse("/iam Ana María"),
            Some(Command::Iam(Some("Ana María".into())))
        );
    }

    #[test]
    fn missing_arguments_are_flagged() {
        assert_eq!(parse("/iam"), Some(Command::Iam(None)));
        assert_eq!(parse("/iam   "), Some(Command::Iam(None)));
        assert_eq!(parse("/remember"), Some(Command::Remember(None)));
    }

    #[test]
    fn remember_keeps_the_fact_verbatim() {
        assert_eq!(
            parse("/remember el wifi es Casa24"),
            Some(Command::Remember(Some("el wifi es Casa24".into())))
        );
    }

    #[test]
    fn forget_scopes() {
        assert_eq!(parse("/forget"), Some(Command::Forget(Some(ForgetScope::All))));
        assert_eq!(
            parse("/forget 3"),
            Some(Command::Forget(Some(ForgetScope::Fact(3))))
        );
        assert_eq!(parse("/forget everything"), Some(Command::Forget(None)));
    }

    #[test]
    fn trailing_whitespace_is_tolerated() {
        assert_eq!(parse("/new  "), Some(Command::New));
    }

    #[test]
    fn indented_slash_text_stays_ordinary_chat() {
        assert_eq!(parse("  /new"), None);
        assert_eq!(parse(" /start"), None);
    }
}
