//! Line grammar for the emulator console.
//!
//! Commands are parsed with `winnow` straight from the input line. Keywords
//! are case-insensitive; numbers accept decimal or `0x`-prefixed hex.

use std::fmt;

use pulse_core::spec::TaskSpec;
use winnow::ascii::{Caseless, dec_uint, hex_uint, space1};
use winnow::combinator::{alt, opt, preceded, repeat};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{literal, take_while};

/// One console command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command<'a> {
    /// Queue a pulse train for the timing core.
    Task(TaskSpec),
    Start,
    Abort,
    /// Advance simulated time by the given number of microseconds.
    Run(u32),
    Status,
    Help(Option<&'a str>),
    Exit,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandError {
    /// The line did not match the grammar; `offset` is the byte position of
    /// the first unparsed character.
    Syntax { offset: usize },
    /// A `task` line omitted a required field.
    MissingField(&'static str),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Syntax { offset } => write!(f, "unexpected input at column {offset}"),
            CommandError::MissingField(field) => write!(f, "task requires `{field}=`"),
        }
    }
}

impl std::error::Error for CommandError {}

/// Parses a trimmed console line.
pub fn parse_command(line: &str) -> Result<Command<'_>, CommandError> {
    let parsed = command
        .parse(line.trim())
        .map_err(|err| CommandError::Syntax {
            offset: err.offset(),
        })?;
    match parsed {
        Parsed::Task(fields) => fields.into_spec().map(Command::Task),
        Parsed::Start => Ok(Command::Start),
        Parsed::Abort => Ok(Command::Abort),
        Parsed::Run(micros) => Ok(Command::Run(micros)),
        Parsed::Status => Ok(Command::Status),
        Parsed::Help(topic) => Ok(Command::Help(topic)),
        Parsed::Exit => Ok(Command::Exit),
    }
}

#[derive(Clone, Debug)]
enum Parsed<'a> {
    Task(TaskFields),
    Start,
    Abort,
    Run(u32),
    Status,
    Help(Option<&'a str>),
    Exit,
}

#[derive(Clone, Copy, Debug)]
enum Field {
    Offset(u32),
    On(u32),
    Period(u32),
    Mask(u32),
    Cycles(u32),
    Invert,
}

/// `task` arguments in whatever order they were given. Later duplicates win.
#[derive(Clone, Debug, Default)]
struct TaskFields {
    offset: Option<u32>,
    on: Option<u32>,
    period: Option<u32>,
    mask: Option<u32>,
    cycles: u32,
    invert: bool,
}

impl TaskFields {
    fn apply(mut self, field: Field) -> Self {
        match field {
            Field::Offset(value) => self.offset = Some(value),
            Field::On(value) => self.on = Some(value),
            Field::Period(value) => self.period = Some(value),
            Field::Mask(value) => self.mask = Some(value),
            Field::Cycles(value) => self.cycles = value,
            Field::Invert => self.invert = true,
        }
        self
    }

    fn into_spec(self) -> Result<TaskSpec, CommandError> {
        let offset = self.offset.ok_or(CommandError::MissingField("offset"))?;
        let on = self.on.ok_or(CommandError::MissingField("on"))?;
        let period = self.period.ok_or(CommandError::MissingField("period"))?;
        let mask = self.mask.ok_or(CommandError::MissingField("mask"))?;
        let spec = TaskSpec::new(offset, on, period, mask, self.cycles);
        Ok(if self.invert { spec.inverted() } else { spec })
    }
}

fn command<'a>(input: &mut &'a str) -> ModalResult<Parsed<'a>> {
    alt((
        preceded(keyword("task"), task_fields).map(Parsed::Task),
        preceded((keyword("run"), space1), number).map(Parsed::Run),
        preceded(keyword("help"), opt(preceded(space1, topic))).map(Parsed::Help),
        keyword("start").value(Parsed::Start),
        keyword("abort").value(Parsed::Abort),
        keyword("status").value(Parsed::Status),
        alt((keyword("exit"), keyword("quit"))).value(Parsed::Exit),
    ))
    .parse_next(input)
}

fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, &'a str, ErrMode<ContextError>> {
    literal(Caseless(word))
}

fn task_fields(input: &mut &str) -> ModalResult<TaskFields> {
    repeat(0.., preceded(space1, field))
        .fold(TaskFields::default, TaskFields::apply)
        .parse_next(input)
}

fn field(input: &mut &str) -> ModalResult<Field> {
    alt((
        preceded("offset=", number).map(Field::Offset),
        preceded("on=", number).map(Field::On),
        preceded("period=", number).map(Field::Period),
        preceded("mask=", number).map(Field::Mask),
        preceded("cycles=", number).map(Field::Cycles),
        keyword("invert").value(Field::Invert),
    ))
    .parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<u32> {
    alt((preceded(alt(("0x", "0X")), hex_uint), dec_uint)).parse_next(input)
}

fn topic<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric()).parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_task_line() {
        let command =
            parse_command("task offset=10 on=5 period=0x20 mask=0x3 cycles=4 invert").unwrap();
        assert_eq!(
            command,
            Command::Task(TaskSpec::new(10, 5, 0x20, 0x3, 4).inverted())
        );
    }

    #[test]
    fn task_fields_accept_any_order() {
        let command = parse_command("TASK mask=1 period=100 on=50 offset=0").unwrap();
        assert_eq!(command, Command::Task(TaskSpec::new(0, 50, 100, 1, 0)));
    }

    #[test]
    fn task_without_period_is_rejected() {
        assert_eq!(
            parse_command("task offset=0 on=5 mask=1"),
            Err(CommandError::MissingField("period"))
        );
    }

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse_command("start"), Ok(Command::Start));
        assert_eq!(parse_command("  Abort "), Ok(Command::Abort));
        assert_eq!(parse_command("status"), Ok(Command::Status));
        assert_eq!(parse_command("run 1500"), Ok(Command::Run(1500)));
        assert_eq!(parse_command("help"), Ok(Command::Help(None)));
        assert_eq!(parse_command("help task"), Ok(Command::Help(Some("task"))));
        assert_eq!(parse_command("quit"), Ok(Command::Exit));
    }

    #[test]
    fn trailing_garbage_is_a_syntax_error() {
        assert!(matches!(
            parse_command("start now"),
            Err(CommandError::Syntax { .. })
        ));
        assert!(matches!(
            parse_command("task offset=x"),
            Err(CommandError::Syntax { .. })
        ));
    }
}
