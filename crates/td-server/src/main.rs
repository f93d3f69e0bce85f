//! The tickdown server: hosts one shared Markdown document over a Unix
//! socket, ticking the engine at a fixed cadence and fanning the per-tick
//! broadcast block out to every connected client.
//!
//! Threading mirrors the engine's locking model: one engine-loop thread, one
//! accept-loop thread, one thread per connected client feeding the shared
//! command queue, and a console thread on stdin (`DOC?`, `LOG?`, `QUIT?`).

mod roles;

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use tickdown::broadcast::render_block;
use tickdown::engine::run_tick;
use tickdown::{CommandQueue, Document, QueuedCommand, Role, Timestamp};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Milliseconds between ticks.
    interval_ms: u64,

    /// Unix socket path clients connect to.
    #[arg(short, long, default_value = "td.sock")]
    socket: PathBuf,

    /// Role table: one `<username> <read|write>` pair per line, re-read on
    /// every connect.
    #[arg(short, long, default_value = "roles.txt")]
    roles: PathBuf,

    /// Where the document is written on clean shutdown.
    #[arg(short, long, default_value = "doc.md")]
    output: PathBuf,
}

struct ClientHandle {
    id: u64,
    username: String,
    stream: UnixStream,
}

struct Server {
    doc: Mutex<Document>,
    queue: Mutex<CommandQueue>,
    clients: Mutex<Vec<ClientHandle>>,
    log: Mutex<String>,
    next_client_id: AtomicU64,
    roles: PathBuf,
    output: PathBuf,
    socket: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let _ = std::fs::remove_file(&args.socket);
    let listener = UnixListener::bind(&args.socket)
        .with_context(|| format!("binding {}", args.socket.display()))?;
    info!(socket = %args.socket.display(), "listening");

    let server = Arc::new(Server {
        doc: Mutex::new(Document::new()),
        queue: Mutex::new(CommandQueue::new()),
        clients: Mutex::new(Vec::new()),
        log: Mutex::new(String::new()),
        next_client_id: AtomicU64::new(0),
        roles: args.roles,
        output: args.output,
        socket: args.socket,
    });

    {
        let server = Arc::clone(&server);
        thread::spawn(move || accept_loop(listener, server));
    }
    {
        let server = Arc::clone(&server);
        thread::spawn(move || console_loop(server));
    }

    engine_loop(server, Duration::from_millis(args.interval_ms))
}

/// Tick forever: drain the queue, run the batch, append the block to the
/// server log, and fan it out. Heartbeat blocks go out even when nothing was
/// queued.
fn engine_loop(server: Arc<Server>, interval: Duration) -> ! {
    loop {
        thread::sleep(interval);

        let batch = server.queue.lock().unwrap().drain();
        let report = {
            let mut doc = server.doc.lock().unwrap();
            run_tick(&mut doc, batch)
        };
        if !report.edits.is_empty() {
            info!(version = report.version, edits = report.edits.len(), "tick committed");
        }

        let block = render_block(&report);
        server.log.lock().unwrap().push_str(&block);
        broadcast(&server, block.as_bytes());
    }
}

fn broadcast(server: &Server, bytes: &[u8]) {
    let mut clients = server.clients.lock().unwrap();
    clients.retain_mut(|c| match c.stream.write_all(bytes) {
        Ok(()) => true,
        Err(err) => {
            warn!(username = %c.username, %err, "dropping unreachable client");
            false
        }
    });
}

fn accept_loop(listener: UnixListener, server: Arc<Server>) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let server = Arc::clone(&server);
                thread::spawn(move || {
                    if let Err(err) = client_session(stream, &server) {
                        warn!(%err, "client session error");
                    }
                });
            }
            Err(err) => warn!(%err, "accept failed"),
        }
    }
}

/// One connected client: handshake, then feed command lines into the shared
/// queue until EOF or an explicit DISCONNECT.
fn client_session(stream: UnixStream, server: &Server) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    let mut username = String::new();
    if reader.read_line(&mut username)? == 0 {
        return Ok(());
    }
    let username = username.trim().to_string();

    let Some(role) = roles::lookup(&server.roles, &username) else {
        info!(%username, "rejecting unknown user");
        writer.write_all(b"Reject UNAUTHORISED\n")?;
        return Ok(());
    };

    // Handshake: role, version, snapshot length, then the snapshot bytes.
    {
        let doc = server.doc.lock().unwrap();
        let header = format!("{}\n{}\n{}\n", role, doc.version(), doc.snapshot_len());
        writer.write_all(header.as_bytes())?;
        writer.write_all(doc.snapshot())?;
    }

    let id = server.next_client_id.fetch_add(1, Ordering::Relaxed);
    server.clients.lock().unwrap().push(ClientHandle {
        id,
        username: username.clone(),
        stream: writer,
    });
    info!(%username, %role, "client connected");

    let result = read_commands(&mut reader, server, &username, role);

    server.clients.lock().unwrap().retain(|c| c.id != id);
    info!(%username, "client disconnected");
    result
}

fn read_commands(
    reader: &mut impl BufRead,
    server: &Server,
    username: &str,
    role: Role,
) -> Result<()> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 || line.trim_end() == "DISCONNECT" {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }
        let cmd = QueuedCommand::new(username, role, now(), &line);
        server.queue.lock().unwrap().push(cmd);
    }
}

fn now() -> Timestamp {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// The operator console on stdin.
fn console_loop(server: Arc<Server>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        match line.trim_end() {
            "DOC?" => {
                let doc = server.doc.lock().unwrap();
                print!("{}", String::from_utf8_lossy(&doc.flatten()));
                let _ = std::io::stdout().flush();
            }
            "LOG?" => {
                print!("{}", server.log.lock().unwrap());
                let _ = std::io::stdout().flush();
            }
            "QUIT?" => {
                let connected = server.clients.lock().unwrap().len();
                if connected == 0 {
                    shutdown(&server);
                } else {
                    println!("QUIT rejected, {} clients still connected.", connected);
                }
            }
            _ => {}
        }
    }
}

/// Persist the document and exit. Only reachable once no clients remain.
fn shutdown(server: &Server) -> ! {
    {
        let doc = server.doc.lock().unwrap();
        if let Err(err) = std::fs::write(&server.output, doc.flatten()) {
            warn!(%err, "failed to write document");
        } else {
            info!(path = %server.output.display(), "document written");
        }
    }
    let _ = std::fs::remove_file(&server.socket);
    std::process::exit(0);
}
