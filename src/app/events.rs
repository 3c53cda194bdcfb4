use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;

use crate::audio::spectral::WindowKind;
use crate::error::CommandError;

/// A GUI control changed. One variant per control, each with its own payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Slider: hidden layer width. Re-seeds random weights.
    Neurons(usize),
    /// Slider: display smoothing in `[0, 1)`.
    Smoothing(f32),
    /// Slider: resynthesis output gain.
    OutputGain(f32),
    /// Toggle: feed the reconstructed spectrum to the audio output.
    Resynthesis(bool),
    /// Radio: analysis window.
    Window(WindowKind),
}

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    Other(u16),
}

/// Raw input forwarded by the host.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    KeyPressed(char),
    KeyReleased(char),
    MouseMoved { x: i32, y: i32 },
    MouseDragged { x: i32, y: i32, button: MouseButton },
    MousePressed { x: i32, y: i32, button: MouseButton },
    MouseReleased { x: i32, y: i32, button: MouseButton },
    WindowResized { width: u32, height: u32 },
    FilesDropped { paths: Vec<PathBuf>, x: i32, y: i32 },
    Message(String),
}

/// One console line, mapped onto the event the equivalent GUI action sends.
///
/// `neurons N`, `smoothing X`, `gain X`, `resynth on|off` and
/// `window hann|rectangular` are controls. A single character is a key
/// press, `load PATH` drops a file and `resize W H` resizes the viewport.
/// Any other line is passed on as a message.
#[cfg_attr(not(feature = "live"), allow(dead_code))]
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Control(ControlEvent),
    Input(InputEvent),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let mut words = line.split_whitespace();
        let head = words.next().ok_or(CommandError::Empty)?;
        let args: Vec<&str> = words.collect();

        let control = match head {
            "neurons" => Some(ControlEvent::Neurons(value(head, &args)?)),
            "smoothing" => Some(ControlEvent::Smoothing(value(head, &args)?)),
            "gain" => Some(ControlEvent::OutputGain(value(head, &args)?)),
            "resynth" => {
                let enabled = match arg(head, &args, 0)? {
                    "on" | "true" | "1" => true,
                    "off" | "false" | "0" => false,
                    other => return Err(invalid(head, other)),
                };
                Some(ControlEvent::Resynthesis(enabled))
            }
            "window" => {
                let name = arg(head, &args, 0)?;
                let kind = WindowKind::from_str(name, true).map_err(|_| invalid(head, name))?;
                Some(ControlEvent::Window(kind))
            }
            _ => None,
        };
        if let Some(event) = control {
            return Ok(Command::Control(event));
        }

        let input = match head {
            "load" => InputEvent::FilesDropped {
                paths: vec![PathBuf::from(arg(head, &args, 0)?)],
                x: 0,
                y: 0,
            },
            "resize" => InputEvent::WindowResized {
                width: parse(head, arg(head, &args, 0)?)?,
                height: parse(head, arg(head, &args, 1)?)?,
            },
            _ => {
                let mut chars = head.chars();
                match (chars.next(), chars.next(), args.is_empty()) {
                    (Some(key), None, true) => InputEvent::KeyPressed(key),
                    _ => InputEvent::Message(line.to_string()),
                }
            }
        };
        Ok(Command::Input(input))
    }
}

fn arg<'a>(command: &str, args: &[&'a str], index: usize) -> Result<&'a str, CommandError> {
    args.get(index)
        .copied()
        .ok_or_else(|| CommandError::MissingValue(command.to_string()))
}

fn value<T: FromStr>(command: &str, args: &[&str]) -> Result<T, CommandError> {
    parse(command, arg(command, args, 0)?)
}

fn parse<T: FromStr>(command: &str, raw: &str) -> Result<T, CommandError> {
    raw.parse().map_err(|_| invalid(command, raw))
}

fn invalid(command: &str, value: &str) -> CommandError {
    CommandError::InvalidValue {
        command: command.to_string(),
        value: value.to_string(),
    }
}
