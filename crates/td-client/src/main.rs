//! The tickdown client: connects to a server socket, mirrors the shared
//! document locally, and forwards typed command lines.
//!
//! A listener thread reassembles END-delimited broadcast blocks and replays
//! each block's successful edits into the local replica, so `DOC?` always
//! shows the server's document as of the last received tick.

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use tickdown::broadcast::{apply_block, parse_block};
use tickdown::Document;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Username announced to the server; must appear in its role table.
    username: String,

    /// Unix socket path of the server.
    #[arg(short, long, default_value = "td.sock")]
    socket: PathBuf,
}

struct Replica {
    doc: Mutex<Document>,
    log: Mutex<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let stream = UnixStream::connect(&args.socket)
        .with_context(|| format!("connecting to {}", args.socket.display()))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    writer.write_all(format!("{}\n", args.username).as_bytes())?;

    // Handshake: role, version, snapshot length, snapshot bytes.
    let role = read_trimmed_line(&mut reader)?;
    if role.is_empty() || role == "Reject UNAUTHORISED" {
        bail!("server rejected user {:?}", args.username);
    }
    let version: u64 = read_trimmed_line(&mut reader)?.parse().context("bad version line")?;
    let len: usize = read_trimmed_line(&mut reader)?.parse().context("bad length line")?;
    let mut snapshot = vec![0u8; len];
    reader.read_exact(&mut snapshot)?;

    let replica = Arc::new(Replica {
        doc: Mutex::new(Document::parse_markdown(&snapshot)),
        log: Mutex::new(String::new()),
    });
    info!(%role, version, bytes = len, "connected");

    {
        let replica = Arc::clone(&replica);
        thread::spawn(move || listener_loop(reader, replica, version));
    }

    console_loop(&replica, &mut writer, &role)
}

fn read_trimmed_line(reader: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim_end().to_string())
}

/// Reassemble broadcast blocks (everything up to an `END` line) and replay
/// them. Blocks are logged once per new version; heartbeats repeat the
/// current version and are applied as no-ops.
fn listener_loop(mut reader: BufReader<UnixStream>, replica: Arc<Replica>, start_version: u64) {
    let mut last_logged = start_version;
    let mut block_text = String::new();
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => {
                eprintln!("server connection lost");
                std::process::exit(1);
            }
            Ok(_) => {}
        }
        block_text.push_str(&line);
        if line.trim_end() != "END" {
            continue;
        }

        match parse_block(&block_text) {
            Ok(block) => {
                if block.version > last_logged {
                    replica.log.lock().unwrap().push_str(&block_text);
                    last_logged = block.version;
                }
                let mut doc = replica.doc.lock().unwrap();
                if let Err(err) = apply_block(&mut doc, &block) {
                    warn!(%err, "broadcast block failed to apply");
                }
            }
            Err(err) => warn!(%err, "ignoring malformed broadcast block"),
        }
        block_text.clear();
    }
}

/// The interactive console: local queries are answered from the replica,
/// anything else goes to the server verbatim.
fn console_loop(replica: &Replica, writer: &mut UnixStream, role: &str) -> Result<()> {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match line.trim_end() {
            "DOC?" => {
                let doc = replica.doc.lock().unwrap();
                print!("{}", String::from_utf8_lossy(&doc.flatten()));
                std::io::stdout().flush()?;
            }
            "LOG?" => {
                print!("{}", replica.log.lock().unwrap());
                std::io::stdout().flush()?;
            }
            "PERM?" => println!("{}", role),
            "DISCONNECT" => {
                writer.write_all(b"DISCONNECT\n")?;
                break;
            }
            "" => {}
            _ => {
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}
