//! Line-oriented console surface.
//!
//! Reads commands from any async line source (stdin in the binary) and feeds
//! them into the controller exactly like the touch display or remote app
//! would. Triggers are submitted fire-and-forget; the prompt comes back
//! immediately while the send runs on its own task.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::ControlCommand;
use crate::gate::GateController;

pub const HELP_TEXT: &str = "\
Commands:
  open | o              send open
  close | c             send close
  status | s            request gate status
  moment | m            momentary open, auto-close after the countdown
  autoclose HH:MM       set the daily auto-close time
  state                 show controller state (JSON)
  log [n]               show the newest n log entries
  help                  this text
  quit                  leave the console";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleInput {
    Command(ControlCommand),
    State,
    Log(Option<usize>),
    Help,
    Quit,
}

fn parse_time(arg: &str) -> Result<(u32, u32), String> {
    let (h, m) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected HH:MM, got '{}'", arg))?;
    let hour: u32 = h.trim().parse().map_err(|_| format!("bad hour '{}'", h))?;
    let minute: u32 = m.trim().parse().map_err(|_| format!("bad minute '{}'", m))?;
    if hour > 23 || minute > 59 {
        return Err(format!("{}:{:02} is not a valid time of day", hour, minute));
    }
    Ok((hour, minute))
}

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleInput>, String> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();
    let input = match word.to_ascii_lowercase().as_str() {
        "open" | "o" => ConsoleInput::Command(ControlCommand::Open),
        "close" | "c" => ConsoleInput::Command(ControlCommand::Close),
        "status" | "s" => ConsoleInput::Command(ControlCommand::Status),
        "moment" | "momentary" | "m" => ConsoleInput::Command(ControlCommand::Momentary),
        "autoclose" | "ac" => {
            let arg = arg.ok_or("usage: autoclose HH:MM")?;
            let (hour, minute) = parse_time(arg)?;
            ConsoleInput::Command(ControlCommand::SetAutoClose { hour, minute })
        }
        "state" => ConsoleInput::State,
        "log" | "l" => match arg {
            Some(n) => ConsoleInput::Log(Some(
                n.parse().map_err(|_| format!("bad line count '{}'", n))?,
            )),
            None => ConsoleInput::Log(None),
        },
        "help" | "h" | "?" => ConsoleInput::Help,
        "quit" | "exit" | "q" => ConsoleInput::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(input))
}

/// Serve console commands from `reader` until `quit` or end of input.
pub async fn run_console<R, W>(
    controller: &GateController,
    reader: R,
    mut writer: W,
    default_tail: usize,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    writer.write_all(b"Type 'help' for commands.\n").await?;
    writer.flush().await?;
    while let Some(line) = lines.next_line().await? {
        let reply = match parse_line(&line) {
            Ok(None) => continue,
            Ok(Some(ConsoleInput::Quit)) => break,
            Ok(Some(ConsoleInput::Help)) => HELP_TEXT.to_string(),
            Ok(Some(ConsoleInput::Command(cmd))) => {
                controller.submit(cmd);
                format!("queued {:?}", cmd)
            }
            Ok(Some(ConsoleInput::State)) => serde_json::to_string_pretty(&controller.state())?,
            Ok(Some(ConsoleInput::Log(n))) => controller
                .log_tail(n.unwrap_or(default_tail))
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => e,
        };
        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
