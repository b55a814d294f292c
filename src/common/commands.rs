/// A line typed by the local operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    SendMessage(String),
    ConnectToPeer { address: String },
    ListPeers,
    ShowHistory,
    Quit,
}

impl ConsoleCommand {
    /// Returns `None` for blank input.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let Some(rest) = trimmed.strip_prefix('/') else {
            return Some(ConsoleCommand::SendMessage(line.trim_end().to_string()));
        };

        let mut parts = rest.splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::trim).unwrap_or_default();

        match command {
            "peers" => Some(ConsoleCommand::ListPeers),
            "history" => Some(ConsoleCommand::ShowHistory),
            "quit" | "exit" => Some(ConsoleCommand::Quit),
            "connect" if !arg.is_empty() => Some(ConsoleCommand::ConnectToPeer {
                address: arg.to_string(),
            }),
            // Unknown slash-words are ordinary chat.
            _ => Some(ConsoleCommand::SendMessage(line.trim_end().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_chat() {
        assert_eq!(
            ConsoleCommand::parse("hello there  \n"),
            Some(ConsoleCommand::SendMessage("hello there".into()))
        );
        assert_eq!(ConsoleCommand::parse("   "), None);
    }

    #[test]
    fn slash_commands() {
        assert_eq!(ConsoleCommand::parse("/peers"), Some(ConsoleCommand::ListPeers));
        assert_eq!(ConsoleCommand::parse("/history"), Some(ConsoleCommand::ShowHistory));
        assert_eq!(ConsoleCommand::parse("/quit"), Some(ConsoleCommand::Quit));
        assert_eq!(
            ConsoleCommand::parse("/connect 127.0.0.1:9000"),
            Some(ConsoleCommand::ConnectToPeer {
                address: "127.0.0.1:9000".into()
            })
        );
    }

    #[test]
    fn connect_without_address_is_sent_as_text() {
        assert_eq!(
            ConsoleCommand::parse("/connect"),
            Some(ConsoleCommand::SendMessage("/connect".into()))
        );
        assert_eq!(
            ConsoleCommand::parse("/shrug"),
            Some(ConsoleCommand::SendMessage("/shrug".into()))
        );
    }
}
