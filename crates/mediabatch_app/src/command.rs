//! Line commands typed at the interactive prompt.

use mediabatch_core::Msg;
use thiserror::Error;

use crate::cli::{parse_format, parse_quality};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Messages for the controller, applied in order.
    Update(Vec<Msg>),
    List,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}' (type 'help')")]
    Unknown(String),
    #[error("'{command}' needs {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    #[error("{0}")]
    Invalid(String),
}

pub const HELP: &str = "\
Commands:
  analyze <url>        list the videos behind a link (a bare link works too)
  list                 show the catalog with selection and results
  toggle <n>...        check or uncheck rows by number
  all on|off           check or uncheck every row
  format video|audio   output format
  quality <height>     240p, 360p, 480p, 720p or 1080p
  compat on|off        prefer H.264 video for older players
  start                download the checked rows in order
  pause | resume       pause after the current progress update, resume the same item
  cancel               stop the batch
  quit                 exit";

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();

    let command = match head.to_ascii_lowercase().as_str() {
        "analyze" | "a" | "open" => {
            let url = rest.join(" ");
            if url.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "analyze",
                    expected: "a link",
                });
            }
            analyze(url)
        }
        "list" | "ls" | "l" => Command::List,
        "toggle" | "t" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "toggle",
                    expected: "row numbers",
                });
            }
            let msgs = rest
                .iter()
                .map(|raw| row_index(raw).map(Msg::ItemToggled))
                .collect::<Result<Vec<_>, _>>()?;
            Command::Update(msgs)
        }
        "all" => Command::Update(vec![Msg::SelectAllToggled(switch("all", &rest)?)]),
        "none" => Command::Update(vec![Msg::SelectAllToggled(false)]),
        "format" | "f" => {
            let raw = single("format", "video or audio", &rest)?;
            Command::Update(vec![Msg::FormatChosen(
                parse_format(raw).map_err(CommandError::Invalid)?,
            )])
        }
        "quality" | "q" => {
            let raw = single("quality", "a height such as 720p", &rest)?;
            Command::Update(vec![Msg::QualityChosen(
                parse_quality(raw).map_err(CommandError::Invalid)?,
            )])
        }
        "compat" => Command::Update(vec![Msg::CompatibilityToggled(switch("compat", &rest)?)]),
        "start" | "download" | "go" => Command::Update(vec![Msg::StartClicked]),
        "pause" => Command::Update(vec![Msg::PauseClicked]),
        "resume" | "continue" => Command::Update(vec![Msg::ResumeClicked]),
        "cancel" | "stop" => Command::Update(vec![Msg::CancelClicked]),
        "help" | "?" | "h" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ if looks_like_link(head) => analyze(line.trim().to_string()),
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn analyze(url: String) -> Command {
    Command::Update(vec![Msg::UrlChanged(url), Msg::AnalyzeClicked])
}

fn looks_like_link(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("www.")
}

/// Rows are shown 1-based.
fn row_index(raw: &str) -> Result<usize, CommandError> {
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(CommandError::Invalid(format!(
            "'{raw}' is not a row number"
        ))),
    }
}

fn single<'a>(
    command: &'static str,
    expected: &'static str,
    rest: &[&'a str],
) -> Result<&'a str, CommandError> {
    match rest {
        [value] => Ok(*value),
        [] => Err(CommandError::MissingArgument { command, expected }),
        _ => Err(CommandError::Invalid(format!(
            "'{command}' takes one value, got {}",
            rest.len()
        ))),
    }
}

fn switch(command: &'static str, rest: &[&str]) -> Result<bool, CommandError> {
    let raw = single(command, "on or off", rest)?;
    match raw.to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" | "1" => Ok(true),
        "off" | "no" | "false" | "0" => Ok(false),
        _ => Err(CommandError::Invalid(format!(
            "'{command}' takes on or off, not '{raw}'"
        ))),
    }
}
