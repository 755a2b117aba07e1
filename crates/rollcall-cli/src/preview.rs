//! Watching a running session: a live preview window, or plain log output
//! when headless.

use crate::engine::{
    EngineError, FaceMark, MarkKind, PreviewFrame, SessionEnd, SessionEvent, SessionHandle,
};
use anyhow::{anyhow, Result};
use minifb::{Key, Window, WindowOptions};
use rollcall_core::Region;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};

const SAMPLE_COLOR: u32 = 0x0000_80FF;
const KNOWN_COLOR: u32 = 0x0000_C000;
const UNKNOWN_COLOR: u32 = 0x00E0_2020;
const BOX_THICKNESS: u32 = 2;

/// How the user follows a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveMode {
    /// Preview window; q, Esc or closing the window ends the session.
    Window { duration: Option<Duration> },
    /// No window; Ctrl-C or the time limit ends the session.
    Headless { duration: Option<Duration> },
}

impl ObserveMode {
    pub fn new(window: bool, duration: Option<Duration>) -> Self {
        if window {
            Self::Window { duration }
        } else {
            Self::Headless { duration }
        }
    }

    fn duration(&self) -> Option<Duration> {
        match *self {
            Self::Window { duration } | Self::Headless { duration } => duration,
        }
    }
}

/// Follow a session until it ends or the user stops it, then return how it ended.
///
/// Fails only when the engine thread went away without reporting an outcome.
pub async fn observe<O: Send + 'static>(
    handle: SessionHandle<O>,
    title: &str,
    mode: ObserveMode,
) -> Result<SessionEnd<O>> {
    let SessionHandle {
        stop,
        events,
        outcome,
    } = handle;

    let deadline = async {
        match mode.duration() {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut window_error = None;
    match mode {
        ObserveMode::Window { .. } => {
            let title = title.to_string();
            let mut window = tokio::task::spawn_blocking(move || window_loop(events, &title));

            let finished = tokio::select! {
                res = &mut window => Some(res),
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted");
                    None
                }
                _ = &mut deadline => {
                    tracing::info!("time limit reached");
                    None
                }
            };
            stop.send_replace(true);

            // the window loop returns once the engine drops its event sender
            let res = match finished {
                Some(res) => res,
                None => window.await,
            };
            window_error = match res {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{e:#}")),
                Err(e) => Some(e.to_string()),
            };
        }
        ObserveMode::Headless { .. } => {
            let mut events = events;
            let mut stopping = false;
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => {
                            announce(&event);
                        }
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c(), if !stopping => {
                        tracing::info!("interrupted");
                        stopping = true;
                        stop.send_replace(true);
                    }
                    _ = &mut deadline, if !stopping => {
                        tracing::info!("time limit reached");
                        stopping = true;
                        stop.send_replace(true);
                    }
                }
            }
        }
    }

    let mut end = outcome.await.map_err(|_| EngineError::ChannelClosed)?;
    if let Some(msg) = window_error {
        tracing::error!(error = %msg, "preview window failed");
        end.error.get_or_insert(EngineError::Preview(msg));
    }
    Ok(end)
}

/// Print notable events; returns a short status line for the window title.
fn announce(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Frame(_) => None,
        SessionEvent::SampleSaved { sequence, .. } => Some(format!("sample {sequence}")),
        SessionEvent::Recognized {
            id,
            name,
            timestamp,
        } => {
            println!("{timestamp}  {id}  {name}");
            Some(format!("{name} marked present"))
        }
    }
}

fn window_loop(mut events: mpsc::Receiver<SessionEvent>, title: &str) -> Result<()> {
    let mut status = String::from("starting");

    // size the window from the first frame
    let first = loop {
        match events.blocking_recv() {
            Some(SessionEvent::Frame(preview)) => break preview,
            Some(other) => {
                if let Some(s) = announce(&other) {
                    status = s;
                }
            }
            None => return Ok(()),
        }
    };

    let width = first.frame.width as usize;
    let height = first.frame.height as usize;
    let mut window = Window::new(title, width, height, WindowOptions::default())
        .map_err(|e| anyhow!("cannot open preview window: {e}"))?;
    window.set_target_fps(30);

    let mut buffer = vec![0u32; width * height];
    render(&first, &mut buffer);
    window
        .update_with_buffer(&buffer, width, height)
        .map_err(|e| anyhow!("preview update failed: {e}"))?;

    let mut shown_title = String::new();
    while window.is_open() && !window.is_key_down(Key::Q) && !window.is_key_down(Key::Escape) {
        let mut latest = None;
        loop {
            match events.try_recv() {
                Ok(SessionEvent::Frame(preview)) => latest = Some(preview),
                Ok(other) => {
                    if let Some(s) = announce(&other) {
                        status = s;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }

        let clock = chrono::Local::now().format("%H:%M:%S");
        let full_title = format!("{title} | {clock} | {status}");
        if full_title != shown_title {
            window.set_title(&full_title);
            shown_title = full_title;
        }

        match latest {
            Some(preview)
                if preview.frame.width as usize == width
                    && preview.frame.height as usize == height =>
            {
                render(&preview, &mut buffer);
                window
                    .update_with_buffer(&buffer, width, height)
                    .map_err(|e| anyhow!("preview update failed: {e}"))?;
            }
            _ => window.update(),
        }
    }

    tracing::debug!("preview window closed");
    Ok(())
}

fn render(preview: &PreviewFrame, buffer: &mut [u32]) {
    let (width, height) = (preview.frame.width, preview.frame.height);
    gray_to_rgb(&preview.frame.data, buffer);
    for FaceMark { region, kind } in &preview.marks {
        let color = match kind {
            MarkKind::Sample => SAMPLE_COLOR,
            MarkKind::Known(_) => KNOWN_COLOR,
            MarkKind::Unknown => UNKNOWN_COLOR,
        };
        draw_box(buffer, width, height, region, color);
    }
}

/// Expand 8-bit gray into minifb's 0RGB pixels.
fn gray_to_rgb(gray: &[u8], out: &mut [u32]) {
    for (px, &g) in out.iter_mut().zip(gray) {
        let g = g as u32;
        *px = (g << 16) | (g << 8) | g;
    }
}

/// Outline `region`, clipped to the buffer.
fn draw_box(buffer: &mut [u32], width: u32, height: u32, region: &Region, color: u32) {
    let x0 = region.x.min(width);
    let y0 = region.y.min(height);
    let x1 = (region.x + region.width).min(width);
    let y1 = (region.y + region.height).min(height);

    for y in y0..y1 {
        for x in x0..x1 {
            let on_edge = x < x0 + BOX_THICKNESS
                || x + BOX_THICKNESS >= x1
                || y < y0 + BOX_THICKNESS
                || y + BOX_THICKNESS >= y1;
            if on_edge {
                buffer[(y * width + x) as usize] = color;
            }
        }
    }
}
