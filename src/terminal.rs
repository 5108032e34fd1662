// SPDX-License-Identifier: GPL-3.0-only

//! Terminal viewer
//!
//! Renders the colorized depth map and the video image side by side using
//! Unicode half-block characters for improved vertical resolution, with a
//! status bar on the bottom line. Keyboard input is read between frames.

use crate::constants::frame;
use crate::errors::StartupError;
use crate::pipeline::display::{FrameRenderer, PresentedFrame, VideoFrame};
use crate::pipeline::input::Key;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    widgets::Widget,
};
use std::io::{self, Stdout, stdout};
use std::time::Duration;
use tracing::{debug, warn};

/// Half-block renderer on the controlling terminal
///
/// The terminal is put into raw mode on creation and restored on
/// [`TerminalRenderer::restore`] or drop, whichever comes first.
pub struct TerminalRenderer {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    status: String,
    restored: bool,
}

impl TerminalRenderer {
    pub fn enter() -> Result<Self, StartupError> {
        enable_raw_mode().map_err(StartupError::Terminal)?;
        let mut stdout = stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(StartupError::Terminal(e));
        }
        let terminal = match Terminal::new(CrosstermBackend::new(stdout)) {
            Ok(terminal) => terminal,
            Err(e) => {
                let _ = disable_raw_mode();
                let _ = execute!(io::stdout(), LeaveAlternateScreen);
                return Err(StartupError::Terminal(e));
            }
        };
        debug!("Terminal in raw mode");
        Ok(Self {
            terminal,
            status: String::new(),
            restored: false,
        })
    }

    /// Leave raw mode and the alternate screen
    pub fn restore(&mut self) -> io::Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()
    }

    pub fn set_status(&mut self, status: String) {
        self.status = status;
    }

    /// Collect key presses, waiting at most `timeout` for the first one
    pub fn poll_keys(&mut self, timeout: Duration) -> io::Result<Vec<Key>> {
        let mut keys = Vec::new();
        let mut wait = timeout;
        while event::poll(wait)? {
            wait = Duration::ZERO;
            if let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                let mapped = match key.code {
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        Some(Key::CtrlC)
                    }
                    KeyCode::Char(c) => Some(Key::Char(c)),
                    KeyCode::Esc => Some(Key::Esc),
                    _ => None,
                };
                keys.extend(mapped);
            }
        }
        Ok(keys)
    }
}

impl Drop for TerminalRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!(error = %e, "Failed to restore terminal");
        }
    }
}

impl FrameRenderer for TerminalRenderer {
    fn present(&mut self, presented: &PresentedFrame<'_>) -> io::Result<()> {
        let status = &self.status;
        self.terminal.draw(|f| {
            let [depth_area, video_area, status_area] = split_screen(f.area());
            f.render_widget(
                FramePane {
                    image: Some(VideoFrame::Rgb(presented.depth)),
                    placeholder: "",
                },
                depth_area,
            );
            f.render_widget(
                FramePane {
                    image: presented.video,
                    placeholder: "Switching format...",
                },
                video_area,
            );
            f.render_widget(StatusBar { message: status }, status_area);
        })?;
        Ok(())
    }
}

/// Depth pane, video pane and the one-line status bar below them
fn split_screen(area: Rect) -> [Rect; 3] {
    let pane_height = area.height.saturating_sub(1);
    let half = area.width / 2;
    [
        Rect {
            x: area.x,
            y: area.y,
            width: half,
            height: pane_height,
        },
        Rect {
            x: area.x + half,
            y: area.y,
            width: area.width - half,
            height: pane_height,
        },
        Rect {
            x: area.x,
            y: area.y + pane_height,
            width: area.width,
            height: area.height.min(1),
        },
    ]
}

/// One 640×480 image scaled into a pane using half-block characters
struct FramePane<'a> {
    image: Option<VideoFrame<'a>>,
    placeholder: &'a str,
}

impl Widget for FramePane<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }
        let Some(image) = self.image else {
            let msg = self.placeholder;
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            buf.set_string(x, y, msg, ratatui::style::Style::default());
            return;
        };

        // Each terminal cell displays 2 vertical pixels
        let frame_aspect = frame::WIDTH as f64 / frame::HEIGHT as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            let h = term_height;
            ((h * frame_aspect) as u16, (h / 2.0) as u16)
        } else {
            let w = term_width;
            (w as u16, (w / frame_aspect / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;
        let x_scale = frame::WIDTH as f64 / display_width as f64;
        let y_scale = frame::HEIGHT as f64 / (display_height * 2) as f64;

        for ty in 0..display_height {
            for tx in 0..display_width {
                let src_x = ((tx as f64 * x_scale) as u32).min(frame::WIDTH - 1);
                let src_top = ((ty as f64 * 2.0 * y_scale) as u32).min(frame::HEIGHT - 1);
                let src_bottom = (((ty as f64 * 2.0 + 1.0) * y_scale) as u32).min(frame::HEIGHT - 1);

                let top = sample(&image, src_x, src_top);
                let bottom = sample(&image, src_x, src_bottom);

                if let Some(cell) = buf.cell_mut((x_offset + tx, y_offset + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(top);
                    cell.set_bg(bottom);
                }
            }
        }
    }
}

fn sample(image: &VideoFrame<'_>, x: u32, y: u32) -> Color {
    let [r, g, b] = image.pixel((y * frame::WIDTH + x) as usize);
    Color::Rgb(r, g, b)
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            ratatui::style::Style::default()
                .fg(Color::White)
                .bg(Color::DarkGray),
        );
    }
}
