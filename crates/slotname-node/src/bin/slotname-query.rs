//! slotname-query CLI tool
//!
//! Queries a running slotname node over its resolve socket.
//!
//! Usage:
//!   slotname-query resolve <name> [A|AAAA]
//!   slotname-query status
//!   slotname-query ping

use serde::Serialize;
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum ResolveCommand {
    Resolve { name: String, record_type: String },
    Status,
    Ping,
}

fn print_usage() {
    eprintln!("slotname-query - Query a slotname node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  slotname-query resolve <name> [A|AAAA]   Resolve a name (default type A)");
    eprintln!("  slotname-query status                    Show this node's slot");
    eprintln!("  slotname-query ping                      Check if the node is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SLOTNAME_SOCKET  Path to resolve socket (default: ./slotname.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("SLOTNAME_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./slotname.sock"))
}

fn send_command(cmd: ResolveCommand) -> Result<Value, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to slotname-node at {:?}: {}\n\
             Is the slotname-node running?",
            socket_path, e
        )
    })?;

    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let cmd = match args[1].as_str() {
        "resolve" => {
            if args.len() < 3 {
                eprintln!("Error: resolve requires a name argument");
                std::process::exit(1);
            }
            ResolveCommand::Resolve {
                name: args[2].clone(),
                record_type: args.get(3).cloned().unwrap_or_else(|| "A".to_string()),
            }
        }
        "status" => ResolveCommand::Status,
        "ping" => ResolveCommand::Ping,
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    let response = match send_command(cmd) {
        Ok(response) => response,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    match response["status"].as_str() {
        Some("answer") => {
            for record in response["records"].as_array().into_iter().flatten() {
                println!(
                    "{}\t{}\tIN\t{}\t{}",
                    record["name"].as_str().unwrap_or_default(),
                    record["ttl"],
                    record["type"].as_str().unwrap_or_default(),
                    record["address"].as_str().unwrap_or_default()
                );
            }
        }
        Some("pass_through") => {
            println!("(no answer - passed through)");
            std::process::exit(1);
        }
        Some("status") => {
            println!("slot:     {}", response["ordinal"]);
            println!("name:     {}", response["name"].as_str().unwrap_or_default());
            println!("identity: {}", response["identity"].as_str().unwrap_or_default());
            println!("keeper:   {}", response["keeper"].as_str().unwrap_or_default());
        }
        Some("pong") => {
            println!("pong - slotname-node is running");
        }
        Some("error") => {
            eprintln!("Error: {}", response["error"].as_str().unwrap_or("unknown error"));
            std::process::exit(1);
        }
        _ => {
            eprintln!("Unexpected response: {}", response);
            std::process::exit(1);
        }
    }
}
