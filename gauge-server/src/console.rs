//! Operator console
//!
//! Reads commands from stdin while the server runs:
//!
//! | Command | Effect |
//! |---|---|
//! | `exit`, `quit` | shut the server down |
//! | `set <name> <unit\|null> <value>` | force the value of a variable |
//! | `set <name> <value>` | force the value of a unitless variable |
//! | `unset <name> [unit\|null]` | stop forcing a variable |
//! | `watch <name> [unit]` | log the next deliveries of a variable |
//! | `vehicle <name>` | force the vehicle context |
//! | `vehicle` | stop forcing the vehicle context |
//!
//! Double quotes group words into one argument: `set "PLANE BANK DEGREES" degrees 15`.

use std::io::BufRead;

use gauge_protocol::VariableKey;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use var_manager::SubscriptionManager;

use crate::error::{Result, ServerError};

/// A parsed console command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Exit,
    Set { key: VariableKey, value: Value },
    Unset { key: VariableKey },
    Watch { name: String, unit: Option<String> },
    Vehicle(Option<String>),
}

/// Split a console line into arguments, honouring double quotes
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted = false;

    for c in line.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
            quoted = true;
            continue;
        }

        if c.is_whitespace() && !in_quotes {
            if !current.is_empty() || quoted {
                args.push(std::mem::take(&mut current));
            }
            quoted = false;
        } else {
            current.push(c);
        }
    }

    if !current.is_empty() || quoted {
        args.push(current);
    }

    args
}

/// `null` (any case) means "no unit"
fn parse_unit(arg: &str) -> Option<String> {
    if arg.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(arg.to_string())
    }
}

fn usage(text: &str) -> ServerError {
    ServerError::Command(format!("Usage: {text}"))
}

/// Parse one console line; blank lines yield `None`
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let args = split_args(line);
    let Some((command, args)) = args.split_first() else {
        return Ok(None);
    };

    let command = match command.to_lowercase().as_str() {
        "exit" | "quit" => Command::Exit,
        "set" => match args {
            [name, unit, value] => Command::Set {
                key: VariableKey::new(name.as_str(), parse_unit(unit)),
                value: Value::String(value.clone()),
            },
            [name, value] => Command::Set {
                key: VariableKey::unitless(name.as_str()),
                value: Value::String(value.clone()),
            },
            _ => return Err(usage("set <name> [unit|null] <value>")),
        },
        "unset" => match args {
            [name, unit] => Command::Unset {
                key: VariableKey::new(name.as_str(), parse_unit(unit)),
            },
            [name] => Command::Unset {
                key: VariableKey::unitless(name.as_str()),
            },
            _ => return Err(usage("unset <name> [unit|null]")),
        },
        "watch" => match args {
            [name] => Command::Watch {
                name: name.clone(),
                unit: None,
            },
            [name, unit] => Command::Watch {
                name: name.clone(),
                unit: parse_unit(unit),
            },
            _ => return Err(usage("watch <name> [unit]")),
        },
        "vehicle" if args.is_empty() => Command::Vehicle(None),
        "vehicle" => Command::Vehicle(Some(args.join(" "))),
        _ => return Err(ServerError::Command(format!("Unknown command: {line}"))),
    };

    Ok(Some(command))
}

/// Carry out a parsed command
pub fn execute(command: Command, manager: &SubscriptionManager, shutdown: &CancellationToken) {
    match command {
        Command::Exit => {
            tracing::info!("Shutdown requested from console");
            shutdown.cancel();
        }
        Command::Set { key, value } => manager.force_value(&key, value),
        Command::Unset { key } => {
            if !manager.clear_forced_value(&key) {
                tracing::info!("{} was not forced", key);
            }
        }
        Command::Watch { name, unit } => manager.watch(&name, unit.as_deref()),
        Command::Vehicle(Some(vehicle)) => manager.force_vehicle(vehicle),
        Command::Vehicle(None) => {
            if !manager.clear_forced_vehicle() {
                tracing::info!("No vehicle was forced");
            }
        }
    }
}

/// Process console lines until shutdown or until input ends
///
/// Bad lines are logged; the console keeps going.
pub async fn run_console(
    mut lines: mpsc::UnboundedReceiver<String>,
    manager: SubscriptionManager,
    shutdown: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => {
                    tracing::debug!("Console input closed");
                    break;
                }
            },
        };

        tracing::debug!("Console: {}", line);
        match parse_command(&line) {
            Ok(Some(command)) => execute(command, &manager, &shutdown),
            Ok(None) => {}
            Err(e) => tracing::warn!("{}", e),
        }
    }
}

/// Read stdin lines on a dedicated thread
///
/// Blocking stdin reads stay off the runtime, so shutdown never waits for a
/// line to be typed.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    let spawned = std::thread::Builder::new()
        .name("console-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read console input: {}", e);
                        break;
                    }
                }
            }
        });

    if let Err(e) = spawned {
        tracing::warn!("Console unavailable: {}", e);
    }

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("set ALT feet 100", vec!["set", "ALT", "feet", "100"])]
    #[case(r#"set "PLANE BANK DEGREES" degrees 15"#, vec!["set", "PLANE BANK DEGREES", "degrees", "15"])]
    #[case("  watch   ALT  ", vec!["watch", "ALT"])]
    #[case(r#"vehicle """#, vec!["vehicle", ""])]
    #[case("", vec![])]
    fn test_split_args(#[case] line: &str, #[case] expected: Vec<&str>) {
        assert_eq!(split_args(line), expected);
    }

    #[test]
    fn test_parse_set_forms() {
        assert_eq!(
            parse_command(r#"SET "INDICATED ALTITUDE" feet 2500"#).unwrap(),
            Some(Command::Set {
                key: VariableKey::new("INDICATED ALTITUDE", Some("feet")),
                value: json!("2500"),
            })
        );
        assert_eq!(
            parse_command("set TITLE null Cessna").unwrap(),
            Some(Command::Set {
                key: VariableKey::unitless("TITLE"),
                value: json!("Cessna"),
            })
        );
        assert_eq!(
            parse_command("set TITLE Cessna").unwrap(),
            Some(Command::Set {
                key: VariableKey::unitless("TITLE"),
                value: json!("Cessna"),
            })
        );
    }

    #[rstest]
    #[case("quit", Command::Exit)]
    #[case("exit", Command::Exit)]
    #[case("unset ALT feet", Command::Unset { key: VariableKey::new("ALT", Some("feet")) })]
    #[case("unset TITLE", Command::Unset { key: VariableKey::unitless("TITLE") })]
    #[case("watch ALT", Command::Watch { name: "ALT".to_string(), unit: None })]
    #[case("watch ALT Feet", Command::Watch { name: "ALT".to_string(), unit: Some("Feet".to_string()) })]
    #[case(r#"vehicle "Piper PA44""#, Command::Vehicle(Some("Piper PA44".to_string())))]
    #[case("vehicle", Command::Vehicle(None))]
    fn test_parse_commands(#[case] line: &str, #[case] expected: Command) {
        assert_eq!(parse_command(line).unwrap(), Some(expected));
    }

    #[rstest]
    #[case("set")]
    #[case("set a b c d")]
    #[case("unset")]
    #[case("watch")]
    #[case("fly me to the moon")]
    fn test_parse_errors(#[case] line: &str) {
        assert!(matches!(parse_command(line), Err(ServerError::Command(_))));
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_command("   ").unwrap(), None);
    }
}
