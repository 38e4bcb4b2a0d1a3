//! Control socket used by `shaderbg select`/`current` and external pickers.
//!
//! Line protocol over a Unix stream socket, one request per connection:
//!
//! ```text
//! list                 -> catalog, one effect per line, selected marked `*`
//! current              -> "<index> <stable name>"
//! select <index>       -> "ok <index> <stable name>" | "error: ..."
//! select-name <name>   -> same as `select`
//! ```

use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use renderer::{EffectRegistry, RenderSurface};
use tracing::{debug, info, warn};

use crate::catalog::render_catalog;

/// Longest request line read from a client; the rest is ignored.
const MAX_REQUEST_LEN: u64 = 256;
/// Clients that stay silent longer than this are dropped.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    List,
    Current,
    Select(usize),
    SelectName(String),
}

pub fn parse_request(line: &str) -> Result<Request, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    match (verb, rest) {
        ("list", "") => Ok(Request::List),
        ("current", "") => Ok(Request::Current),
        ("select", index) if !index.is_empty() => index
            .parse()
            .map(Request::Select)
            .map_err(|_| format!("invalid effect index '{index}'")),
        ("select-name", name) if !name.is_empty() => Ok(Request::SelectName(name.to_string())),
        ("", _) => Err("empty request".to_string()),
        _ => Err(format!("unknown request '{line}'")),
    }
}

/// Request line the client sends for a `select` argument: indices go by
/// number, anything else by name.
pub fn select_line(effect: &str) -> String {
    let effect = effect.trim();
    if effect.parse::<usize>().is_ok() {
        format!("select {effect}")
    } else {
        format!("select-name {effect}")
    }
}

pub fn handle_request<S: RenderSurface>(registry: &EffectRegistry<S>, request: Request) -> String {
    let describe = |index: usize| {
        registry
            .descriptor(index)
            .map(|descriptor| format!("{index} {}", descriptor.stable_name))
            .unwrap_or_else(|| index.to_string())
    };
    match request {
        Request::List => render_catalog(registry, registry.selected()),
        Request::Current => format!("{}\n", describe(registry.selected())),
        Request::Select(index) => {
            if registry.select(index) {
                format!("ok {}\n", describe(index))
            } else {
                format!("error: no effect at index {index} ({} available)\n", registry.len())
            }
        }
        Request::SelectName(name) => {
            if registry.select_by_name(&name) {
                format!("ok {}\n", describe(registry.selected()))
            } else {
                format!("error: unknown effect '{name}'\n")
            }
        }
    }
}

/// Listening socket; the socket file is removed on drop.
pub struct ControlServer {
    path: PathBuf,
}

impl ControlServer {
    pub fn spawn<S: RenderSurface>(path: &Path, registry: Arc<EffectRegistry<S>>) -> Result<Self> {
        let listener = bind(path)?;
        info!(socket = %path.display(), "control socket listening");
        thread::Builder::new()
            .name("control".into())
            .spawn(move || {
                for stream in listener.incoming() {
                    match stream {
                        Ok(stream) => {
                            let registry = Arc::clone(&registry);
                            let spawned = thread::Builder::new()
                                .name("control-client".into())
                                .spawn(move || {
                                    if let Err(err) = serve(stream, &registry) {
                                        debug!(error = %err, "control connection failed");
                                    }
                                });
                            if let Err(err) = spawned {
                                warn!(error = %err, "failed to spawn control connection thread");
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "control socket accept failed; stopping");
                            break;
                        }
                    }
                }
            })
            .context("failed to spawn control socket thread")?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn bind(path: &Path) -> Result<UnixListener> {
    match UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
            if UnixStream::connect(path).is_ok() {
                bail!("another shaderbg instance is listening on {}", path.display());
            }
            debug!(socket = %path.display(), "removing stale control socket");
            std::fs::remove_file(path)
                .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
            UnixListener::bind(path)
                .with_context(|| format!("failed to bind control socket {}", path.display()))
        }
        Err(err) => Err(err)
            .with_context(|| format!("failed to bind control socket {}", path.display())),
    }
}

fn serve<S: RenderSurface>(stream: UnixStream, registry: &EffectRegistry<S>) -> io::Result<()> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut line = String::new();
    BufReader::new((&stream).take(MAX_REQUEST_LEN)).read_line(&mut line)?;
    let reply = match parse_request(&line) {
        Ok(request) => handle_request(registry, request),
        Err(err) => format!("error: {err}\n"),
    };
    (&stream).write_all(reply.as_bytes())
}

/// Sends one request to a running daemon and returns its reply.
pub fn send_request(path: &Path, line: &str) -> Result<String> {
    let mut stream = UnixStream::connect(path).with_context(|| {
        format!(
            "failed to reach shaderbg at {} (is the daemon running?)",
            path.display()
        )
    })?;
    stream
        .write_all(format!("{line}\n").as_bytes())
        .context("failed to send control request")?;
    stream
        .shutdown(std::net::Shutdown::Write)
        .context("failed to finish control request")?;
    let mut reply = String::new();
    stream
        .read_to_string(&mut reply)
        .context("failed to read control reply")?;
    if let Some(message) = reply.strip_prefix("error: ") {
        return Err(anyhow!("{}", message.trim_end()));
    }
    Ok(reply)
}
