//! Parsing trigger-prefixed text and resolving it against both tables.

use crate::Error;
use crate::plugins::godcmd::commands::{admin_commands, general_commands, AdminCommandKind, CommandKind, CommandTable};

/// A line that started with the trigger character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand<'a> {
    /// Only the trigger, possibly followed by whitespace.
    Empty,
    Command { cmd: &'a str, args: Vec<&'a str> },
}

/// Returns `None` when `content` does not start with `trigger`.
pub fn parse(content: &str, trigger: char) -> Option<ParsedCommand<'_>> {
    let rest = content.strip_prefix(trigger)?;
    let mut tokens = rest.split_whitespace();
    Some(match tokens.next() {
        None => ParsedCommand::Empty,
        Some(cmd) => ParsedCommand::Command { cmd, args: tokens.collect() },
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    General(CommandKind),
    Admin(AdminCommandKind),
    Unknown,
}

#[derive(Debug)]
pub struct CommandRouter {
    general: CommandTable<CommandKind>,
    admin: CommandTable<AdminCommandKind>,
}

impl CommandRouter {
    pub fn new(trigger: char, clear_memory_commands: &[String]) -> Result<Self, Error> {
        Ok(Self {
            general: general_commands(trigger, clear_memory_commands)?,
            admin: admin_commands()?,
        })
    }

    /// General table first, then admin.
    pub fn resolve(&self, cmd: &str) -> Resolved {
        if let Some(kind) = self.general.resolve(cmd) {
            Resolved::General(kind)
        } else if let Some(kind) = self.admin.resolve(cmd) {
            Resolved::Admin(kind)
        } else {
            Resolved::Unknown
        }
    }

    pub fn general(&self) -> &CommandTable<CommandKind> {
        &self.general
    }

    pub fn admin(&self) -> &CommandTable<AdminCommandKind> {
        &self.admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_any_whitespace() {
        assert_eq!(
            parse("#setpri  Echo\t5", '#'),
            Some(ParsedCommand::Command { cmd: "setpri", args: vec!["Echo", "5"] })
        );
        assert_eq!(parse("#   ", '#'), Some(ParsedCommand::Empty));
        assert_eq!(parse("#", '#'), Some(ParsedCommand::Empty));
        assert_eq!(parse("hello #help", '#'), None);
    }

    #[test]
    fn general_and_admin_aliases_resolve() {
        let router = CommandRouter::new('#', &[]).unwrap();
        assert_eq!(router.resolve("帮助"), Resolved::General(CommandKind::Help));
        assert_eq!(router.resolve("在吗"), Resolved::General(CommandKind::Status));
        assert_eq!(router.resolve("晚安"), Resolved::Admin(AdminCommandKind::Stop));
        assert_eq!(router.resolve("nope"), Resolved::Unknown);
    }
}
