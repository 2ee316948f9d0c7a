//! Slash commands typed on stdin.

use kinship_hub_connection::{ConnectionManager, SendError};

const USAGE: &str = "\
commands:
  /dm <user> <conversation> <text>   send a direct message
  /group <group> <text>              send to a group
  /join <group>                      join a group chat
  /leave <group>                     leave a group chat
  /typing <user> on|off              typing indicator
  /status                            connection state
  /quit                              disconnect and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Direct {
        to_user_id: String,
        conversation_id: String,
        text: String,
    },
    Group {
        group_id: String,
        text: String,
    },
    Join(String),
    Leave(String),
    Typing {
        to_user_id: String,
        is_typing: bool,
    },
    Status,
    Help,
    Quit,
}

/// Parses one input line. Blank lines yield `Ok(None)`; errors carry the
/// message to show the user.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Err(format!("not a command: {line}\n{USAGE}"));
    };

    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let args = args.trim();

    let command = match name {
        "dm" => {
            let (to, rest) = word(args, "/dm <user> <conversation> <text>")?;
            let (conversation, text) = word(rest, "/dm <user> <conversation> <text>")?;
            Command::Direct {
                to_user_id: to.into(),
                conversation_id: conversation.into(),
                text: non_empty(text, "/dm <user> <conversation> <text>")?.into(),
            }
        }
        "group" => {
            let (group, text) = word(args, "/group <group> <text>")?;
            Command::Group {
                group_id: group.into(),
                text: non_empty(text, "/group <group> <text>")?.into(),
            }
        }
        "join" => Command::Join(non_empty(args, "/join <group>")?.into()),
        "leave" => Command::Leave(non_empty(args, "/leave <group>")?.into()),
        "typing" => {
            let (to, flag) = word(args, "/typing <user> on|off")?;
            let is_typing = match flag {
                "on" => true,
                "off" => false,
                _ => return Err("usage: /typing <user> on|off".into()),
            };
            Command::Typing {
                to_user_id: to.into(),
                is_typing,
            }
        }
        "status" => Command::Status,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command: /{other}\n{USAGE}")),
    };
    Ok(Some(command))
}

/// Runs a command against the manager.
pub async fn execute(manager: &ConnectionManager, command: Command) -> Result<(), SendError> {
    match command {
        Command::Direct {
            to_user_id,
            conversation_id,
            text,
        } => {
            manager
                .send_direct(&to_user_id, &text, &conversation_id)
                .await
        }
        Command::Group { group_id, text } => manager.send_group(&group_id, &text).await,
        Command::Join(group_id) => manager.join_group(&group_id).await,
        Command::Leave(group_id) => manager.leave_group(&group_id).await,
        Command::Typing {
            to_user_id,
            is_typing,
        } => manager.set_typing(&to_user_id, is_typing).await,
        Command::Status => {
            let flags = manager.flags();
            println!(
                "state: {:?} (reconnecting in background: {})",
                manager.state(),
                flags.reconnect_in_progress
            );
            Ok(())
        }
        Command::Help => {
            println!("{USAGE}");
            Ok(())
        }
        Command::Quit => Ok(()),
    }
}

fn word<'a>(input: &'a str, usage: &str) -> Result<(&'a str, &'a str), String> {
    let input = input.trim_start();
    match input.split_once(char::is_whitespace) {
        Some((head, tail)) => Ok((head, tail.trim_start())),
        None if !input.is_empty() => Ok((input, "")),
        None => Err(format!("usage: {usage}")),
    }
}

fn non_empty<'a>(input: &'a str, usage: &str) -> Result<&'a str, String> {
    let input = input.trim();
    if input.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse("   "), Ok(None));
    }

    #[test]
    fn direct_message_keeps_spaces_in_text() {
        assert_eq!(
            parse("/dm bob c-1 hello there  bob").unwrap(),
            Some(Command::Direct {
                to_user_id: "bob".into(),
                conversation_id: "c-1".into(),
                text: "hello there  bob".into(),
            })
        );
    }

    #[test]
    fn group_commands() {
        assert_eq!(
            parse("/group g-1 hi all").unwrap(),
            Some(Command::Group {
                group_id: "g-1".into(),
                text: "hi all".into(),
            })
        );
        assert_eq!(parse("/join g-1").unwrap(), Some(Command::Join("g-1".into())));
        assert_eq!(parse("/leave g-1").unwrap(), Some(Command::Leave("g-1".into())));
    }

    #[test]
    fn typing_flag() {
        assert_eq!(
            parse("/typing bob off").unwrap(),
            Some(Command::Typing {
                to_user_id: "bob".into(),
                is_typing: false,
            })
        );
        assert!(parse("/typing bob maybe").is_err());
    }

    #[test]
    fn missing_arguments_show_usage() {
        assert!(parse("/dm bob").unwrap_err().starts_with("usage:"));
        assert!(parse("/group g").unwrap_err().starts_with("usage:"));
        assert!(parse("/join").unwrap_err().starts_with("usage:"));
    }

    #[test]
    fn unknown_input_is_rejected() {
        assert!(parse("hello").unwrap_err().contains("not a command"));
        assert!(parse("/shout x").unwrap_err().contains("unknown command"));
        assert_eq!(parse("/exit").unwrap(), Some(Command::Quit));
    }
}
