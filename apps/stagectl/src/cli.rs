use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use shared::{
    domain::{AgendaId, DisplayMode, TimerTheme},
    protocol::{ClientFrame, Intent, PresentRequest},
};

#[derive(Parser, Debug)]
#[command(name = "stagectl", about = "Operator controls for a running presenter server")]
pub struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:4000")]
    pub server_url: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the advertised address and connected phones.
    Info,
    #[command(subcommand)]
    Timer(TimerCommand),
    #[command(subcommand)]
    Agenda(AgendaCommand),
    /// Show verses. Chapter and verse numbers are 1-based, the book is the
    /// 0-based book index.
    Present {
        version: String,
        book: u32,
        chapter: u32,
        #[arg(required = true)]
        verses: Vec<u32>,
    },
    /// Take presented content off air.
    Clear,
    /// Print frames as a display of the given mode sees them.
    Watch {
        #[arg(long, default_value = "controller")]
        mode: String,
    },
    /// Maintain the scripture database directly.
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Subcommand, Debug)]
pub enum TimerCommand {
    /// Count down from a duration: `5`, `5m`, `90s` or `4:30`.
    Start { duration: String },
    /// Count down to a wall-clock time (`HH:MM`).
    Event { target: String },
    Stop,
    Pause,
    Resume,
    Theme { name: String },
}

#[derive(Subcommand, Debug)]
pub enum AgendaCommand {
    Add {
        duration: String,
        label: String,
        #[arg(long, default_value = "")]
        anchor: String,
    },
    Start { id: i64 },
    Delete { id: i64 },
    PlusMinute { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum DbCommand {
    AddBook {
        index: u32,
        name: String,
        abbrev: String,
        #[arg(long, default_value = "sqlite://./data/bibles.db")]
        database_url: String,
    },
    AddVerse {
        version: String,
        book: u32,
        chapter: u32,
        verse: u32,
        text: String,
        #[arg(long, default_value = "sqlite://./data/bibles.db")]
        database_url: String,
    },
    Books {
        #[arg(long, default_value = "sqlite://./data/bibles.db")]
        database_url: String,
    },
}

impl Command {
    /// The controller frame this command sends, or `None` for commands that
    /// do not talk to the display socket.
    pub fn frame(&self) -> Result<Option<ClientFrame>> {
        let intent = match self {
            Command::Timer(timer) => timer.intent()?,
            Command::Agenda(agenda) => agenda.intent()?,
            Command::Clear => Intent::ClearContent,
            Command::Present {
                version,
                book,
                chapter,
                verses,
            } => {
                let chapter_index = chapter
                    .checked_sub(1)
                    .ok_or_else(|| anyhow!("chapter numbers start at 1"))?;
                let indices = verses
                    .iter()
                    .map(|verse| {
                        verse
                            .checked_sub(1)
                            .ok_or_else(|| anyhow!("verse numbers start at 1"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                return Ok(Some(ClientFrame::Present(PresentRequest {
                    indices,
                    version: version.clone(),
                    book_index: *book,
                    chapter_index,
                })));
            }
            Command::Info | Command::Watch { .. } | Command::Db(_) => return Ok(None),
        };
        Ok(Some(ClientFrame::Intent(intent)))
    }
}

impl TimerCommand {
    fn intent(&self) -> Result<Intent> {
        Ok(match self {
            TimerCommand::Start { duration } => Intent::SetTimer {
                seconds: parse_duration(duration)?,
                agenda_id: None,
            },
            TimerCommand::Event { target } => Intent::StartEvent {
                target: target.clone(),
            },
            TimerCommand::Stop => Intent::StopTimer,
            TimerCommand::Pause => Intent::SetPaused { paused: true },
            TimerCommand::Resume => Intent::SetPaused { paused: false },
            TimerCommand::Theme { name } => Intent::SetTheme {
                theme: parse_theme(name)?,
            },
        })
    }
}

impl AgendaCommand {
    fn intent(&self) -> Result<Intent> {
        Ok(match self {
            AgendaCommand::Add {
                duration,
                label,
                anchor,
            } => Intent::AddAgenda {
                id: None,
                duration_seconds: parse_duration(duration)?,
                label: label.clone(),
                anchor: anchor.clone(),
            },
            AgendaCommand::Start { id } => Intent::StartAgenda { id: AgendaId(*id) },
            AgendaCommand::Delete { id } => Intent::DeleteAgenda { id: AgendaId(*id) },
            AgendaCommand::PlusMinute { id } => Intent::AddMinute { id: AgendaId(*id) },
        })
    }
}

/// Bare numbers are minutes.
pub fn parse_duration(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    let number = |text: &str| -> Result<u64> {
        text.parse::<u64>()
            .with_context(|| format!("invalid duration '{raw}'"))
    };
    let to_seconds = |minutes: u64| -> Result<u64> {
        minutes
            .checked_mul(60)
            .ok_or_else(|| anyhow!("duration '{raw}' is too long"))
    };

    if let Some((minutes, seconds)) = raw.split_once(':') {
        let seconds = number(seconds)?;
        if seconds >= 60 {
            bail!("invalid duration '{raw}': seconds must be below 60");
        }
        return to_seconds(number(minutes)?)?
            .checked_add(seconds)
            .ok_or_else(|| anyhow!("duration '{raw}' is too long"));
    }
    if let Some(seconds) = raw.strip_suffix('s') {
        return number(seconds);
    }
    let minutes = raw.strip_suffix('m').unwrap_or(raw);
    to_seconds(number(minutes)?)
}

pub fn parse_theme(raw: &str) -> Result<TimerTheme> {
    serde_json::from_value(serde_json::Value::String(raw.to_ascii_lowercase()))
        .map_err(|_| anyhow!("unknown timer theme '{raw}' (default, digital, minimal, pill)"))
}

pub fn parse_mode(raw: &str) -> Result<DisplayMode> {
    serde_json::from_value(serde_json::Value::String(raw.to_ascii_lowercase()))
        .map_err(|_| anyhow!("unknown display mode '{raw}' (speaker, general, controller)"))
}

#[cfg(test)]
#[path = "tests/cli_tests.rs"]
mod tests;
