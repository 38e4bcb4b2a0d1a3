//! winit implementation of [`DisplayPlatform`].
//!
//! Each wallpaper window is borderless, never takes focus, ignores the
//! pointer and sits at the bottom of the stacking order covering exactly one
//! monitor. On X11 it is additionally typed `_NET_WM_WINDOW_TYPE_DESKTOP` so
//! window managers keep it below regular windows and out of task lists.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event_loop::EventLoopWindowTarget;
use winit::monitor::MonitorHandle;
use winit::window::{Window, WindowBuilder, WindowLevel};

use crate::display::{DisplayPlatform, PlatformError, WallpaperWindow};
use crate::gpu::{GpuContext, WgpuSurface};
use crate::types::{Display, DisplayId, DisplayPower, NativeWindowId, ViewportSize};

pub const WINDOW_TITLE: &str = "shader-bg";

/// Borrowed view of the event loop plus the GPU context, built fresh for
/// each call into the display manager.
pub struct WinitPlatform<'a, T: 'static> {
    target: &'a EventLoopWindowTarget<T>,
    gpu: &'a mut GpuContext,
}

impl<'a, T: 'static> WinitPlatform<'a, T> {
    pub fn new(target: &'a EventLoopWindowTarget<T>, gpu: &'a mut GpuContext) -> Self {
        Self { target, gpu }
    }
}

/// Identity derived from connector name and desktop position; stable while
/// the arrangement is unchanged.
pub fn monitor_id(monitor: &MonitorHandle) -> DisplayId {
    let mut hasher = DefaultHasher::new();
    monitor.name().hash(&mut hasher);
    let position = monitor.position();
    (position.x, position.y).hash(&mut hasher);
    DisplayId(hasher.finish())
}

/// Describes a monitor as a [`Display`].
pub fn describe_monitor(monitor: &MonitorHandle) -> Display {
    let position = monitor.position();
    Display {
        id: monitor_id(monitor),
        name: monitor
            .name()
            .unwrap_or_else(|| format!("monitor@{},{}", position.x, position.y)),
        origin: (position.x, position.y),
        size: monitor.size().into(),
        scale_factor: monitor.scale_factor(),
        power: DisplayPower::Active,
    }
}

/// Cheap comparable summary of the monitor layout, used to detect topology
/// changes between polls.
pub fn layout_fingerprint<T>(target: &EventLoopWindowTarget<T>) -> Vec<(DisplayId, ViewportSize)> {
    let mut layout: Vec<_> = target
        .available_monitors()
        .map(|monitor| (monitor_id(&monitor), ViewportSize::from(monitor.size())))
        .collect();
    layout.sort_by_key(|(id, _)| *id);
    layout
}

impl<T: 'static> DisplayPlatform for WinitPlatform<'_, T> {
    type Surface = WgpuSurface;
    type Window = WinitWallpaperWindow;

    fn active_displays(&mut self) -> Result<Vec<Display>, PlatformError> {
        let displays: Vec<Display> = self
            .target
            .available_monitors()
            .map(|monitor| describe_monitor(&monitor))
            .filter(|display| !display.size.is_empty())
            .collect();
        if displays.is_empty() {
            return Err(PlatformError::Enumerate(
                "window system reported no monitors".to_string(),
            ));
        }
        Ok(displays)
    }

    fn open_wallpaper(
        &mut self,
        display: &Display,
    ) -> Result<(WinitWallpaperWindow, Arc<WgpuSurface>), PlatformError> {
        #[allow(unused_mut)]
        let mut builder = WindowBuilder::new()
            .with_title(WINDOW_TITLE)
            .with_decorations(false)
            .with_resizable(false)
            .with_active(false)
            .with_window_level(WindowLevel::AlwaysOnBottom)
            .with_position(PhysicalPosition::new(display.origin.0, display.origin.1))
            .with_inner_size(PhysicalSize::<u32>::from(display.size));

        #[cfg(target_os = "linux")]
        {
            use winit::platform::x11::{WindowBuilderExtX11, XWindowType};
            builder = builder
                .with_x11_window_type(vec![XWindowType::Desktop])
                .with_name(WINDOW_TITLE, WINDOW_TITLE);
        }

        let window = builder
            .build(self.target)
            .map_err(|err| PlatformError::Window(err.to_string()))?;
        if let Err(err) = window.set_cursor_hittest(false) {
            tracing::debug!(error = %err, "pointer passthrough unsupported on this platform");
        }
        let window = Arc::new(window);
        let native_id = native_window_id(&window);
        let surface = self.gpu.create_surface(Arc::clone(&window), display.size)?;
        Ok((WinitWallpaperWindow { window, native_id }, surface))
    }
}

pub struct WinitWallpaperWindow {
    window: Arc<Window>,
    native_id: NativeWindowId,
}

impl WallpaperWindow for WinitWallpaperWindow {
    fn native_id(&self) -> NativeWindowId {
        self.native_id
    }

    fn close(self) {
        // the surface keeps its own handle; hide now so the desktop shows
        // through even if a frame thread still holds a reference
        self.window.set_visible(false);
    }
}

fn native_window_id(window: &Window) -> NativeWindowId {
    let raw = window.window_handle().map(|handle| handle.as_raw());
    let id = match raw {
        Ok(RawWindowHandle::Xlib(handle)) => handle.window as u64,
        Ok(RawWindowHandle::Xcb(handle)) => u64::from(handle.window.get()),
        Ok(RawWindowHandle::Win32(handle)) => handle.hwnd.get() as u64,
        Ok(RawWindowHandle::AppKit(handle)) => handle.ns_view.as_ptr() as u64,
        Ok(RawWindowHandle::Wayland(handle)) => handle.surface.as_ptr() as u64,
        _ => u64::from(window.id()),
    };
    NativeWindowId(id)
}
