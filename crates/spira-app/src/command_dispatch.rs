use spira_core::SHOW_INFO_COMMAND;
use spira_domain::{ArtifactType, CoreError};

pub const REFRESH_COMMAND: &str = "spira.refresh";
pub const SETUP_CREDENTIALS_COMMAND: &str = "spira.setupCredentials";

pub const HELP_TEXT: &str = "\
Commands:
  refresh                                  reload assigned artifacts now
  info <type> [id]                         show details of a requirement, task or incident
  setup-credentials <url> <user> <token>   save Spira credentials
  tree                                     print the current tree
  quit                                     stop polling and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Refresh,
    /// A missing id selects the category header.
    Info {
        category: ArtifactType,
        artifact_id: Option<i64>,
    },
    SetupCredentials {
        url: String,
        username: String,
        token: String,
    },
    Tree,
    Help,
    Quit,
}

fn invalid_usage(reason: impl Into<String>) -> CoreError {
    CoreError::InvalidCommand(reason.into())
}

/// Parses one console line; blank lines yield `None`. Accepts the stable
/// command ids as well as their short aliases.
pub fn parse_command_line(line: &str) -> Result<Option<Command>, CoreError> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(None);
    };
    let args = parts.collect::<Vec<_>>();

    let command = match head {
        REFRESH_COMMAND | "refresh" => {
            expect_no_args(head, &args)?;
            Command::Refresh
        }
        SHOW_INFO_COMMAND | "info" => parse_info(&args)?,
        SETUP_CREDENTIALS_COMMAND | "setup-credentials" => match args.as_slice() {
            [url, username, token] => Command::SetupCredentials {
                url: (*url).to_owned(),
                username: (*username).to_owned(),
                token: (*token).to_owned(),
            },
            _ => {
                return Err(invalid_usage("Usage: setup-credentials <url> <username> <rss-token>"))
            }
        },
        "tree" => {
            expect_no_args(head, &args)?;
            Command::Tree
        }
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => {
            return Err(invalid_usage(format!(
                "Unknown command '{other}'. Type 'help' for available commands."
            )))
        }
    };

    Ok(Some(command))
}

fn expect_no_args(command: &str, args: &[&str]) -> Result<(), CoreError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(invalid_usage(format!("'{command}' takes no arguments")))
    }
}

fn parse_info(args: &[&str]) -> Result<Command, CoreError> {
    let (raw_category, raw_id) = match args {
        [category] => (*category, None),
        [category, id] => (*category, Some(*id)),
        _ => return Err(invalid_usage("Usage: info <type> [id]")),
    };

    let category = ArtifactType::from_key(raw_category).ok_or_else(|| {
        invalid_usage(format!(
            "Unknown artifact type '{raw_category}'. Expected requirement, task or incident."
        ))
    })?;
    let artifact_id = raw_id
        .map(|raw| {
            raw.trim_start_matches('#')
                .parse::<i64>()
                .map_err(|_| invalid_usage(format!("'{raw}' is not a valid artifact id")))
        })
        .transpose()?;

    Ok(Command::Info {
        category,
        artifact_id,
    })
}
