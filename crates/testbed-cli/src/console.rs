//! Interactive commands of the sniff/replay console
//!
//! ```text
//! pause | resume                 stop / restart capture (numbering continues)
//! include <id> | exclude <id>    toggle one id in the filter
//! all | none                     select every known id / clear the filter
//! replay <id> <hz> <count> <data...>
//! cancel                         stop the running replay
//! full | short                   show whole payloads / 5-char previews
//! ids                            list known ids
//! quit
//! ```

use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Pause,
    Resume,
    Include(u32),
    Exclude(u32),
    SelectAll,
    SelectNone,
    Replay {
        id: String,
        frequency: String,
        count: String,
        data: String,
    },
    Cancel,
    Full(bool),
    Ids,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleError {
    #[error("Unknown command: {0} (try 'help')")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid CAN id: {0}")]
    InvalidId(String),
}

/// Hex arbitration id, with or without `0x`
pub fn parse_id(s: &str) -> Result<u32, ConsoleError> {
    let digits = s.trim().trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|_| ConsoleError::InvalidId(s.to_string()))
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ConsoleError::Unknown(String::new()));
        };

        match verb.to_ascii_lowercase().as_str() {
            "pause" | "stop" => Ok(ConsoleCommand::Pause),
            "resume" | "start" => Ok(ConsoleCommand::Resume),
            "include" | "exclude" => {
                let id = words
                    .next()
                    .ok_or(ConsoleError::Usage("include|exclude <id>"))?;
                let id = parse_id(id)?;
                Ok(if verb.eq_ignore_ascii_case("include") {
                    ConsoleCommand::Include(id)
                } else {
                    ConsoleCommand::Exclude(id)
                })
            }
            "all" => Ok(ConsoleCommand::SelectAll),
            "none" => Ok(ConsoleCommand::SelectNone),
            "replay" => {
                const USAGE: &str = "replay <id> <hz> <count> <data...>";
                let id = words.next().ok_or(ConsoleError::Usage(USAGE))?;
                let frequency = words.next().ok_or(ConsoleError::Usage(USAGE))?;
                let count = words.next().ok_or(ConsoleError::Usage(USAGE))?;
                let data: Vec<&str> = words.collect();
                Ok(ConsoleCommand::Replay {
                    id: id.to_string(),
                    frequency: frequency.to_string(),
                    count: count.to_string(),
                    data: data.join(" "),
                })
            }
            "cancel" => Ok(ConsoleCommand::Cancel),
            "full" => Ok(ConsoleCommand::Full(true)),
            "short" => Ok(ConsoleCommand::Full(false)),
            "ids" => Ok(ConsoleCommand::Ids),
            "help" | "?" => Ok(ConsoleCommand::Help),
            "quit" | "exit" | "q" => Ok(ConsoleCommand::Quit),
            _ => Err(ConsoleError::Unknown(line.trim().to_string())),
        }
    }
}
