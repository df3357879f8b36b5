//! Serial console commands.
//!
//! Line based: `status`, `test`, `reset`, `photos`, `help`. Input is trimmed
//! and matched case-insensitively. Output is plain text with CRLF line
//! endings for terminal emulators.

use core::fmt::Write;

use crate::error::{Error, Result};
use crate::sorter::SorterStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConsoleCommand {
    Status,
    Test,
    Reset,
    Photos,
    Help,
}

const COMMANDS: [(&str, ConsoleCommand, &str); 5] = [
    ("status", ConsoleCommand::Status, "Show machine state and counters"),
    ("test", ConsoleCommand::Test, "Run the hardware self-test (idle only)"),
    ("reset", ConsoleCommand::Reset, "Safe reset and wait for the next coin"),
    ("photos", ConsoleCommand::Photos, "List recently captured images"),
    ("help", ConsoleCommand::Help, "Show this list"),
];

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let word = line.trim();
        if word.is_empty() {
            return Err(Error::EmptyCommand);
        }
        COMMANDS
            .iter()
            .find(|(name, _, _)| name.eq_ignore_ascii_case(word))
            .map(|(_, cmd, _)| *cmd)
            .ok_or(Error::UnknownCommand)
    }
}

pub fn write_line<W: Write>(out: &mut W, text: &str) -> Result<()> {
    write!(out, "{}\r\n", text)?;
    Ok(())
}

pub fn write_help<W: Write>(out: &mut W) -> Result<()> {
    write_line(out, "Commands:")?;
    for (name, _, summary) in COMMANDS.iter() {
        write!(out, "  {:<8}{}\r\n", name, summary)?;
    }
    Ok(())
}

pub fn write_status<W: Write>(out: &mut W, status: &SorterStatus) -> Result<()> {
    write!(
        out,
        "State: {} (from {}, {} ms)\r\n",
        status.state.as_str(),
        status.previous_state.as_str(),
        status.time_in_state_ms
    )?;
    write!(out, "Status: {}\r\n", status.status.description())?;
    write!(
        out,
        "Processing: {}  Photo step: {}\r\n",
        if status.processing { "yes" } else { "no" },
        status.photo_step as u8
    )?;
    write!(
        out,
        "Sensor count: {}  Bounced: {}  Debounce: {} ms\r\n",
        status.detector_count, status.bounced_edges, status.debounce_ms
    )?;
    write!(
        out,
        "Accepted: {}  Rejected: {}  Errors: {}  Images: {}\r\n",
        status.stats.coins_accepted,
        status.stats.coins_rejected,
        status.stats.error_episodes,
        status.images_captured
    )?;
    Ok(())
}

pub fn write_photos<'a, W: Write>(out: &mut W, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut listed = 0;
    for name in names {
        write_line(out, name)?;
        listed += 1;
    }
    if listed == 0 {
        write_line(out, "No images captured")?;
    }
    Ok(())
}

pub fn write_error<W: Write>(out: &mut W, err: Error) -> Result<()> {
    let text = match err {
        Error::EmptyCommand => return Ok(()),
        Error::UnknownCommand => "Unknown command, type 'help'",
        Error::Busy => "Busy: a coin is being handled",
        Error::Format => "Output error",
    };
    write_line(out, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{MachineState, Stats};
    use crate::error::StatusCode;
    use crate::photo::PhotoStep;

    #[test]
    fn parses_commands_case_insensitively() {
        assert_eq!(ConsoleCommand::parse("status"), Ok(ConsoleCommand::Status));
        assert_eq!(ConsoleCommand::parse("  RESET\r\n"), Ok(ConsoleCommand::Reset));
        assert_eq!(ConsoleCommand::parse("Photos"), Ok(ConsoleCommand::Photos));
        assert_eq!(ConsoleCommand::parse("test"), Ok(ConsoleCommand::Test));
    }

    #[test]
    fn rejects_empty_and_unknown_input() {
        assert_eq!(ConsoleCommand::parse("   "), Err(Error::EmptyCommand));
        assert_eq!(ConsoleCommand::parse("reboot"), Err(Error::UnknownCommand));
    }

    #[test]
    fn status_report_lists_state_and_counters() {
        let status = SorterStatus {
            state: MachineState::Rejecting,
            previous_state: MachineState::CoinDetected,
            time_in_state_ms: 1200,
            status: StatusCode::MultipleCoins,
            processing: true,
            detector_count: 0,
            bounced_edges: 3,
            debounce_ms: 50,
            photo_step: PhotoStep::MoveToSide1,
            stats: Stats { coins_accepted: 4, coins_rejected: 1, error_episodes: 0 },
            images_captured: 8,
        };
        let mut out = String::new();
        write_status(&mut out, &status).unwrap();
        assert!(out.starts_with("State: REJECTING (from COIN_DETECTED, 1200 ms)\r\n"));
        assert!(out.contains("Status: Multiple coins detected\r\n"));
        assert!(out.contains("Sensor count: 0  Bounced: 3  Debounce: 50 ms\r\n"));
        assert!(out.contains("Accepted: 4  Rejected: 1  Errors: 0  Images: 8\r\n"));
    }

    #[test]
    fn empty_photo_list_says_so() {
        let mut out = String::new();
        write_photos(&mut out, core::iter::empty()).unwrap();
        assert_eq!(out, "No images captured\r\n");
    }

    #[test]
    fn help_names_every_command() {
        let mut out = String::new();
        write_help(&mut out).unwrap();
        for (name, _, _) in COMMANDS.iter() {
            assert!(out.contains(name));
        }
    }
}
