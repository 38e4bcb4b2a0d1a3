//! X11 desktop signals: monitor bounds, stacked client windows, CPU load,
//! screen saver (lock) state and global pointer/keyboard input.

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use pacing::{ProbeError, Rect, SystemProbe, Utilization, WindowSample};
use renderer::{DisplayEvent, InputListener, InputSink};
use tracing::{debug, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::randr::ConnectionExt as _;
use x11rb::protocol::screensaver::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, ConnectionExt as _, EventMask, KeyButMask, MapState,
    QueryPointerReply, Window,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

x11rb::atom_manager! {
    Atoms: AtomsCookie {
        _NET_CLIENT_LIST_STACKING,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_DESKTOP,
        _NET_WM_WINDOW_TYPE_DOCK,
        _NET_WM_STATE,
        _NET_WM_STATE_HIDDEN,
        _NET_WM_DESKTOP,
        _NET_CURRENT_DESKTOP,
    }
}

const POINTER_POLL: Duration = Duration::from_millis(16);
/// `_NET_WM_DESKTOP` value for windows shown on every desktop.
const ALL_DESKTOPS: u32 = 0xFFFF_FFFF;

fn query_error(err: impl std::fmt::Display) -> ProbeError {
    ProbeError::Query(err.to_string())
}

pub struct X11Probe {
    conn: RustConnection,
    root: Window,
    atoms: Atoms,
    cpu: CpuSampler,
}

impl X11Probe {
    pub fn connect() -> Result<Self, ProbeError> {
        let (conn, screen) = RustConnection::connect(None)
            .map_err(|err| ProbeError::Unavailable(format!("failed to connect to X11: {err}")))?;
        let root = conn
            .setup()
            .roots
            .get(screen)
            .ok_or_else(|| ProbeError::Unavailable(format!("invalid X11 screen index {screen}")))?
            .root;
        let atoms = Atoms::new(&conn)
            .map_err(query_error)?
            .reply()
            .map_err(query_error)?;
        Ok(Self {
            conn,
            root,
            atoms,
            cpu: CpuSampler::default(),
        })
    }

    fn atom_list(&self, window: Window, property: u32) -> Result<Vec<u32>, ProbeError> {
        let reply = self
            .conn
            .get_property(false, window, property, AtomEnum::ATOM, 0, 64)
            .map_err(query_error)?
            .reply()
            .map_err(query_error)?;
        Ok(reply
            .value32()
            .map(|atoms| atoms.collect())
            .unwrap_or_default())
    }

    fn cardinal(&self, window: Window, property: u32) -> Result<Option<u32>, ProbeError> {
        let reply = self
            .conn
            .get_property(false, window, property, AtomEnum::CARDINAL, 0, 1)
            .map_err(query_error)?
            .reply()
            .map_err(query_error)?;
        Ok(reply.value32().and_then(|mut values| values.next()))
    }

    fn owner(&self, window: Window) -> Result<String, ProbeError> {
        let reply = self
            .conn
            .get_property(false, window, AtomEnum::WM_CLASS, AtomEnum::STRING, 0, 256)
            .map_err(query_error)?
            .reply()
            .map_err(query_error)?;
        Ok(wm_class_name(&reply.value))
    }

    fn sample(
        &self,
        window: Window,
        current_desktop: Option<u32>,
    ) -> Result<Option<WindowSample>, ProbeError> {
        let map_state = self
            .conn
            .get_window_attributes(window)
            .map_err(query_error)?
            .reply()
            .map_err(query_error)?
            .map_state;
        let desktop = self.cardinal(window, self.atoms._NET_WM_DESKTOP)?;
        if !on_screen(map_state, desktop, current_desktop) {
            return Ok(None);
        }
        let state = self.atom_list(window, self.atoms._NET_WM_STATE)?;
        if state.contains(&self.atoms._NET_WM_STATE_HIDDEN) {
            return Ok(None);
        }
        let kinds = self.atom_list(window, self.atoms._NET_WM_WINDOW_TYPE)?;
        let layer = if kinds.contains(&self.atoms._NET_WM_WINDOW_TYPE_DESKTOP) {
            -1
        } else if kinds.contains(&self.atoms._NET_WM_WINDOW_TYPE_DOCK) {
            0
        } else {
            1
        };
        let geometry = self
            .conn
            .get_geometry(window)
            .map_err(query_error)?
            .reply()
            .map_err(query_error)?;
        let origin = self
            .conn
            .translate_coordinates(window, self.root, 0, 0)
            .map_err(query_error)?
            .reply()
            .map_err(query_error)?;
        Ok(Some(WindowSample {
            owner: self.owner(window)?,
            layer,
            bounds: Rect::new(
                f64::from(origin.dst_x),
                f64::from(origin.dst_y),
                f64::from(geometry.width),
                f64::from(geometry.height),
            ),
        }))
    }
}

impl SystemProbe for X11Probe {
    fn display_bounds(&mut self) -> Result<Vec<Rect>, ProbeError> {
        let monitors = self
            .conn
            .randr_get_monitors(self.root, true)
            .map_err(query_error)?
            .reply()
            .map_err(query_error)?
            .monitors;
        if !monitors.is_empty() {
            return Ok(monitors
                .iter()
                .map(|monitor| {
                    Rect::new(
                        f64::from(monitor.x),
                        f64::from(monitor.y),
                        f64::from(monitor.width),
                        f64::from(monitor.height),
                    )
                })
                .collect());
        }
        let root = self
            .conn
            .get_geometry(self.root)
            .map_err(query_error)?
            .reply()
            .map_err(query_error)?;
        Ok(vec![Rect::new(
            0.0,
            0.0,
            f64::from(root.width),
            f64::from(root.height),
        )])
    }

    fn foreground_windows(&mut self) -> Result<Vec<WindowSample>, ProbeError> {
        let stacking = self
            .conn
            .get_property(
                false,
                self.root,
                self.atoms._NET_CLIENT_LIST_STACKING,
                AtomEnum::WINDOW,
                0,
                u32::MAX,
            )
            .map_err(query_error)?
            .reply()
            .map_err(query_error)?;
        let windows: Vec<Window> = stacking
            .value32()
            .ok_or_else(|| {
                ProbeError::Unavailable("window manager does not publish a stacking list".into())
            })?
            .collect();
        let current_desktop = self.cardinal(self.root, self.atoms._NET_CURRENT_DESKTOP)?;
        let mut samples = Vec::with_capacity(windows.len());
        for window in windows {
            // clients can disappear between the list and the query
            match self.sample(window, current_desktop) {
                Ok(Some(sample)) => samples.push(sample),
                Ok(None) => {}
                Err(err) => debug!(window, error = %err, "skipping window"),
            }
        }
        Ok(samples)
    }

    fn utilization(&mut self) -> Option<Utilization> {
        let cpu = self.cpu.sample()?;
        Some(Utilization {
            cpu: Some(cpu),
            gpu: None,
        })
    }
}

/// Mapped and on the current desktop. Windows without desktop hints, or a
/// window manager without desktops, count as on screen.
fn on_screen(map_state: MapState, desktop: Option<u32>, current: Option<u32>) -> bool {
    if map_state != MapState::VIEWABLE {
        return false;
    }
    match (desktop, current) {
        (Some(desktop), Some(current)) => desktop == ALL_DESKTOPS || desktop == current,
        _ => true,
    }
}

/// Class part of a `WM_CLASS` value (`instance\0class\0`).
fn wm_class_name(raw: &[u8]) -> String {
    let mut parts = raw.split(|byte| *byte == 0).filter(|part| !part.is_empty());
    let instance = parts.next();
    let class = parts.next().or(instance).unwrap_or_default();
    String::from_utf8_lossy(class).into_owned()
}

/// CPU busy fraction between consecutive `/proc/stat` reads.
#[derive(Debug, Default)]
struct CpuSampler {
    previous: Option<(u64, u64)>,
}

impl CpuSampler {
    fn sample(&mut self) -> Option<f32> {
        let stat = fs::read_to_string("/proc/stat").ok()?;
        let current = parse_cpu_line(stat.lines().next()?)?;
        let previous = self.previous.replace(current)?;
        busy_fraction(previous, current)
    }
}

/// `(busy, total)` jiffies from the aggregate `cpu` line.
fn parse_cpu_line(line: &str) -> Option<(u64, u64)> {
    let mut fields = line.split_whitespace();
    if fields.next()? != "cpu" {
        return None;
    }
    let values: Vec<u64> = fields.map(|field| field.parse().ok()).collect::<Option<_>>()?;
    if values.len() < 4 {
        return None;
    }
    let total: u64 = values.iter().sum();
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    Some((total - idle, total))
}

fn busy_fraction(previous: (u64, u64), current: (u64, u64)) -> Option<f32> {
    let total = current.1.checked_sub(previous.1)?;
    let busy = current.0.checked_sub(previous.0)?;
    if total == 0 {
        return None;
    }
    Some(busy as f32 / total as f32)
}

/// Polls the global pointer and keymap on a background thread. Button 1
/// presses and key presses become ripples.
#[derive(Debug, Default)]
pub struct X11InputListener;

impl InputListener for X11InputListener {
    fn start(&mut self, sink: InputSink) -> anyhow::Result<()> {
        let (conn, screen) = RustConnection::connect(None).context("failed to connect to X11")?;
        let root = conn
            .setup()
            .roots
            .get(screen)
            .context("invalid X11 screen index")?
            .root;
        thread::Builder::new()
            .name("x11-input".into())
            .spawn(move || {
                let mut was_pressed = false;
                let mut keys = [0u8; 32];
                loop {
                    let reply = match query_pointer(&conn, root) {
                        Ok(reply) => reply,
                        Err(err) => {
                            warn!(error = %err, "pointer query failed; input disabled");
                            return;
                        }
                    };
                    let now = Instant::now();
                    let (x, y) = (f64::from(reply.root_x), f64::from(reply.root_y));
                    sink.pointer_moved(x, y, now);
                    let pressed =
                        u16::from(reply.mask) & u16::from(KeyButMask::BUTTON1) != 0;
                    if pressed && !was_pressed {
                        sink.pressed(x, y, now);
                    }
                    was_pressed = pressed;

                    match query_keymap(&conn) {
                        Ok(current) => {
                            for keycode in newly_pressed(&keys, &current) {
                                sink.key_pressed(key_position(keycode), now);
                            }
                            keys = current;
                        }
                        Err(err) => debug!(error = %err, "keymap query failed"),
                    }
                    thread::sleep(POINTER_POLL);
                }
            })
            .context("failed to spawn pointer thread")?;
        Ok(())
    }
}

/// Calls `on_change` from a background thread whenever the window manager
/// reports a new active window.
pub fn watch_activation(on_change: impl Fn() + Send + 'static) -> anyhow::Result<()> {
    let (conn, screen) = RustConnection::connect(None).context("failed to connect to X11")?;
    let root = conn
        .setup()
        .roots
        .get(screen)
        .context("invalid X11 screen index")?
        .root;
    let active = conn
        .intern_atom(false, b"_NET_ACTIVE_WINDOW")?
        .reply()
        .context("failed to intern _NET_ACTIVE_WINDOW")?
        .atom;
    conn.change_window_attributes(
        root,
        &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
    )?
    .check()
    .context("failed to select root property events")?;
    conn.flush()?;
    thread::Builder::new()
        .name("x11-activation".into())
        .spawn(move || loop {
            match conn.wait_for_event() {
                Ok(Event::PropertyNotify(event)) if event.atom == active => on_change(),
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "X11 event stream closed; activation tracking stopped");
                    return;
                }
            }
        })
        .context("failed to spawn activation thread")?;
    Ok(())
}

fn query_pointer(conn: &RustConnection, root: Window) -> anyhow::Result<QueryPointerReply> {
    Ok(conn.query_pointer(root)?.reply()?)
}

fn query_keymap(conn: &RustConnection) -> anyhow::Result<[u8; 32]> {
    Ok(conn.query_keymap()?.reply()?.keys)
}

/// Keycodes down in `current` but not in `previous`.
fn newly_pressed(previous: &[u8; 32], current: &[u8; 32]) -> Vec<u8> {
    let mut pressed = Vec::new();
    for (byte, (old, new)) in previous.iter().zip(current).enumerate() {
        let fresh = new & !old;
        for bit in 0..8 {
            if fresh & (1 << bit) != 0 {
                pressed.push((byte * 8 + bit) as u8);
            }
        }
    }
    pressed
}

/// Rows of a US keyboard by X keycode (evdev + 8), number row first.
const KEY_ROWS: [&[u8]; 5] = [
    &[49, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22],
    &[23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 51],
    &[66, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 36],
    &[50, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62],
    &[37, 133, 64, 65, 108, 105],
];
const KEY_COLUMNS: f32 = 14.0;

/// Normalised position of a key on the keyboard, origin top-left. Keys off
/// the main block land in the middle.
fn key_position(keycode: u8) -> [f32; 2] {
    for (row, keys) in KEY_ROWS.iter().enumerate() {
        if let Some(column) = keys.iter().position(|key| *key == keycode) {
            let column = if row == 4 && keycode == 65 {
                // space bar spans the middle of the row
                6.5
            } else {
                column as f32
            };
            return [
                (column + 0.5) / KEY_COLUMNS,
                (row as f32 + 0.5) / KEY_ROWS.len() as f32,
            ];
        }
    }
    [0.5, 0.5]
}

/// Session signal carried by a screen saver state change.
fn session_event(state: screensaver::State) -> Option<DisplayEvent> {
    if state == screensaver::State::ON {
        Some(DisplayEvent::SessionLocked)
    } else if state == screensaver::State::OFF {
        Some(DisplayEvent::SessionResumed)
    } else {
        None
    }
}

/// Calls `on_event` from a background thread when the screen saver (and with
/// it the screen locker) activates or deactivates.
pub fn watch_session(on_event: impl Fn(DisplayEvent) + Send + 'static) -> anyhow::Result<()> {
    let (conn, screen) = RustConnection::connect(None).context("failed to connect to X11")?;
    let root = conn
        .setup()
        .roots
        .get(screen)
        .context("invalid X11 screen index")?
        .root;
    if conn
        .extension_information(screensaver::X11_EXTENSION_NAME)?
        .is_none()
    {
        anyhow::bail!("X server lacks the MIT-SCREEN-SAVER extension");
    }
    conn.screensaver_query_version(1, 1)?
        .reply()
        .context("failed to query screen saver version")?;
    conn.screensaver_select_input(root, screensaver::Event::NOTIFY_MASK)?
        .check()
        .context("failed to select screen saver events")?;
    conn.flush()?;
    thread::Builder::new()
        .name("x11-session".into())
        .spawn(move || loop {
            match conn.wait_for_event() {
                Ok(Event::ScreensaverNotify(event)) => {
                    if let Some(session) = session_event(event.state) {
                        debug!(?session, "screen saver state changed");
                        on_event(session);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "X11 event stream closed; lock tracking stopped");
                    return;
                }
            }
        })
        .context("failed to spawn session thread")?;
    Ok(())
}
