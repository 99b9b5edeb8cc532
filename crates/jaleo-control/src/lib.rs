//! Line-oriented commands for driving an engine from a terminal.
//!
//! ```text
//! effect robot | deep | chipmunk
//! gain 0-100
//! start | stop
//! play 1-10
//! load 1-10 <path>
//! clear 1-10
//! save | status | help | quit
//! ```
//!
//! Slots are numbered 1-10 here, like the buttons on the original board, and
//! come out of the parser as 0-based indices.

use std::path::PathBuf;

use jaleo_engine::{EffectKind, SLOT_COUNT};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Effect(EffectKind),
    Gain(u8),
    Start,
    Stop,
    Play(usize),
    Load(usize, PathBuf),
    Clear(usize),
    Save,
    Status,
    Help,
    Quit,
    /// Blank line or comment.
    Nop,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unknown command '{0}' (try 'help')")]
    UnknownCommand(String),
    #[error("'{0}' needs {1}")]
    MissingArgument(&'static str, &'static str),
    #[error("'{0}' takes no arguments")]
    UnexpectedArgument(&'static str),
    #[error("'{0}' is not a number")]
    BadNumber(String),
    #[error("slot {0} out of range (1-{max})", max = SLOT_COUNT)]
    SlotOutOfRange(usize),
    #[error("gain {0} out of range (0-100)")]
    GainOutOfRange(u32),
    #[error("{0}")]
    UnknownEffect(String),
}

pub const HELP: &str = "\
commands:
  effect <robot|deep|chipmunk>   select the voice effect
  gain <0-100>                   output volume
  start | stop                   run or halt the voice changer
  play <1-10>                    play a sound slot
  load <1-10> <path>             load a .wav or .mp3 into a slot
  clear <1-10>                   empty a slot
  save                           write the sound bank now
  status                         show the current settings
  quit                           save the bank and exit";

pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(Command::Nop);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };

    match word.to_lowercase().as_str() {
        "effect" | "fx" => {
            let name = required(rest, "effect", "an effect name")?;
            name.parse::<EffectKind>()
                .map(Command::Effect)
                .map_err(|e| ParseError::UnknownEffect(e.to_string()))
        }
        "gain" | "volume" | "vol" => {
            let n = number(required(rest, "gain", "a value 0-100")?)?;
            if n > 100 {
                return Err(ParseError::GainOutOfRange(n));
            }
            Ok(Command::Gain(n as u8))
        }
        "start" => bare(rest, "start", Command::Start),
        "stop" => bare(rest, "stop", Command::Stop),
        "play" => Ok(Command::Play(slot(required(rest, "play", "a slot number")?)?)),
        "clear" => Ok(Command::Clear(slot(required(rest, "clear", "a slot number")?)?)),
        "load" => {
            let args = required(rest, "load", "a slot number and a file path")?;
            let (n, path) = match args.split_once(char::is_whitespace) {
                Some((n, p)) => (n, p.trim()),
                None => (args, ""),
            };
            let index = slot(n)?;
            let path = required(path, "load", "a file path")?;
            Ok(Command::Load(index, PathBuf::from(unquote(path))))
        }
        "save" => bare(rest, "save", Command::Save),
        "status" => bare(rest, "status", Command::Status),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => bare(rest, "quit", Command::Quit),
        _ => Err(ParseError::UnknownCommand(word.to_string())),
    }
}

fn required<'a>(rest: &'a str, cmd: &'static str, what: &'static str) -> Result<&'a str, ParseError> {
    if rest.is_empty() { Err(ParseError::MissingArgument(cmd, what)) } else { Ok(rest) }
}

fn bare(rest: &str, cmd: &'static str, out: Command) -> Result<Command, ParseError> {
    if rest.is_empty() { Ok(out) } else { Err(ParseError::UnexpectedArgument(cmd)) }
}

fn number(s: &str) -> Result<u32, ParseError> {
    s.parse().map_err(|_| ParseError::BadNumber(s.to_string()))
}

/// 1-based slot on the line, 0-based index out.
fn slot(s: &str) -> Result<usize, ParseError> {
    let n = number(s)? as usize;
    if (1..=SLOT_COUNT).contains(&n) { Ok(n - 1) } else { Err(ParseError::SlotOutOfRange(n)) }
}

/// Paths with spaces may be wrapped in matching quotes.
fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_controls() {
        assert_eq!(parse_command("effect chipmunk"), Ok(Command::Effect(EffectKind::Chipmunk)));
        assert_eq!(parse_command("  FX   Deep  "), Ok(Command::Effect(EffectKind::DeepVoice)));
        assert_eq!(parse_command("gain 80"), Ok(Command::Gain(80)));
        assert_eq!(parse_command("start"), Ok(Command::Start));
        assert_eq!(parse_command("Stop"), Ok(Command::Stop));
        assert_eq!(parse_command("status"), Ok(Command::Status));
        assert_eq!(parse_command("exit"), Ok(Command::Quit));
    }

    #[test]
    fn slots_are_one_based() {
        assert_eq!(parse_command("play 1"), Ok(Command::Play(0)));
        assert_eq!(parse_command("clear 10"), Ok(Command::Clear(9)));
        assert_eq!(parse_command("play 0"), Err(ParseError::SlotOutOfRange(0)));
        assert_eq!(parse_command("play 11"), Err(ParseError::SlotOutOfRange(11)));
    }

    #[test]
    fn load_keeps_the_whole_path() {
        assert_eq!(
            parse_command("load 3 sounds/air horn.wav"),
            Ok(Command::Load(2, PathBuf::from("sounds/air horn.wav")))
        );
        assert_eq!(
            parse_command("load 4 \"my clip.mp3\""),
            Ok(Command::Load(3, PathBuf::from("my clip.mp3")))
        );
        assert_eq!(
            parse_command("load 3"),
            Err(ParseError::MissingArgument("load", "a file path"))
        );
    }

    #[test]
    fn blanks_and_comments_do_nothing() {
        assert_eq!(parse_command(""), Ok(Command::Nop));
        assert_eq!(parse_command("   "), Ok(Command::Nop));
        assert_eq!(parse_command("# warm up"), Ok(Command::Nop));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_command("reverb"), Err(ParseError::UnknownCommand("reverb".into())));
        assert_eq!(parse_command("gain"), Err(ParseError::MissingArgument("gain", "a value 0-100")));
        assert_eq!(parse_command("gain loud"), Err(ParseError::BadNumber("loud".into())));
        assert_eq!(parse_command("gain 101"), Err(ParseError::GainOutOfRange(101)));
        assert_eq!(parse_command("start now"), Err(ParseError::UnexpectedArgument("start")));
        assert!(matches!(parse_command("effect echo"), Err(ParseError::UnknownEffect(_))));
    }
}
