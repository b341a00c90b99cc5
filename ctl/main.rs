#![forbid(unsafe_code)]

//! `kerbside-ctl` — local CLI companion for the `kerbside` daemon.
//!
//! Connects to the IPC socket and sends JSON commands to the daemon.

use std::io::{BufRead, BufReader, Write};

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

#[derive(Debug, Parser)]
#[command(
    name = "kerbside-ctl",
    about = "Local CLI for the kerbside daemon",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the daemon's `ipc_name` config).
    #[arg(long, default_value = "kerbside")]
    ipc_name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show collection dates, task states and offsets.
    Status,

    /// Fetch collection dates now.
    Refresh,

    /// Mark a task complete, or clear the flag with `--undo`.
    Complete {
        /// Task name, e.g. `red_put_out` or `yellow_bring_in`.
        task: String,
        /// Clear the completion flag instead of setting it.
        #[arg(long)]
        undo: bool,
    },

    /// List the eight window offsets.
    Params,

    /// Change one window offset.
    Set {
        /// Parameter name, e.g. `red_put_out_pre_hours`.
        name: String,
        /// Hours, 0 to 48 in 0.5 steps.
        value: f64,
    },
}

fn main() {
    let args = Cli::parse();

    let request_json = match &args.command {
        Command::Status => serde_json::json!({ "command": "status" }),
        Command::Refresh => serde_json::json!({ "command": "refresh" }),
        Command::Complete { task, undo } => {
            serde_json::json!({ "command": "complete", "task": task, "completed": !undo })
        }
        Command::Params => serde_json::json!({ "command": "params" }),
        Command::Set { name, value } => {
            serde_json::json!({ "command": "set_param", "name": name, "value": value })
        }
    };

    match send_ipc_command(&args.ipc_name, &request_json) {
        Ok(response) => {
            if let Some(obj) = response.as_object() {
                let ok = obj
                    .get("ok")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if ok {
                    if let Some(data) = obj.get("data") {
                        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                    } else {
                        println!("OK");
                    }
                } else {
                    let err_msg = obj
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    eprintln!("Error: {err_msg}");
                    std::process::exit(1);
                }
            } else {
                println!("{response}");
            }
        }
        Err(err) => {
            eprintln!("Failed to connect to daemon: {err}");
            eprintln!("Is kerbside running with ipc_name '{}'?", args.ipc_name);
            std::process::exit(1);
        }
    }
}

/// Connect to the IPC socket, send a JSON command, and read the response.
fn send_ipc_command(
    ipc_name: &str,
    request: &serde_json::Value,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: serde_json::Value = serde_json::from_str(response_line.trim())?;
    Ok(response)
}
