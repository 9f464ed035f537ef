mod command;
mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use pulse_core::time::Timestamp;

use command::{Command, parse_command};
use session::Session;

fn main() -> io::Result<()> {
    let start_at = parse_start_at().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("Usage: pulse-emulator [--start-at <us>]");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(start_at);
    let mut line = String::new();

    writeln!(
        writer,
        "Pulse Expander Emulator ready at t={start_at}. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        for response in session.handle_command(trimmed) {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    matches!(parse_command(input), Ok(Command::Exit))
}

/// Reads the initial counter value, so runs near the 32-bit wrap can be
/// exercised.
fn parse_start_at() -> Result<Timestamp, String> {
    let mut args = env::args().skip(1);
    let Some(arg) = args.next() else {
        return Ok(Timestamp::ZERO);
    };
    let value = if let Some(value) = arg.strip_prefix("--start-at=") {
        value.to_string()
    } else if arg == "--start-at" {
        args.next()
            .ok_or_else(|| "Expected value after --start-at".to_string())?
    } else {
        return Err(format!("Unknown argument `{arg}`"));
    };
    value
        .parse::<u32>()
        .map(Timestamp::from_micros)
        .map_err(|err| format!("Invalid --start-at value `{value}`: {err}"))
}
