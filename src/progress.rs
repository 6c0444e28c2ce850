use crate::cli::ProgressMode;
use crate::schema::{Event, EventListener, EventType};
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

pub struct ProgressConfig {
    pub mode: ProgressMode,
    pub is_tty: bool,
}

impl ProgressConfig {
    fn enabled(&self) -> bool {
        match self.mode {
            ProgressMode::Never => false,
            ProgressMode::Always => true,
            ProgressMode::Auto => self.is_tty,
        }
    }
}

/// Renders pipeline events as a status line on stderr.
pub struct ProgressDriver {
    inner: Option<Rc<RefCell<ProgressRenderer>>>,
}

impl ProgressDriver {
    pub fn new(config: ProgressConfig) -> Self {
        if config.enabled() {
            Self {
                inner: Some(Rc::new(RefCell::new(ProgressRenderer::new(config.is_tty)))),
            }
        } else {
            Self { inner: None }
        }
    }

    pub fn listener(&self) -> Option<EventListener> {
        self.inner.as_ref().map(|inner| {
            let inner = inner.clone();
            Box::new(move |event: &Event| {
                if let Ok(mut renderer) = inner.try_borrow_mut() {
                    renderer.handle_event(event);
                }
            }) as EventListener
        })
    }

    /// Clear the status line before the final output is printed.
    pub fn finish(&self) {
        if let Some(inner) = &self.inner
            && let Ok(mut renderer) = inner.try_borrow_mut()
        {
            renderer.finish();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }
}

struct ProgressRenderer {
    is_tty: bool,
    spinner_index: usize,
    rendered: bool,
}

impl ProgressRenderer {
    fn new(is_tty: bool) -> Self {
        Self {
            is_tty,
            spinner_index: 0,
            rendered: false,
        }
    }

    fn handle_event(&mut self, event: &Event) {
        if let Some(message) = status_message(event) {
            self.render(&message);
        }
    }

    fn render(&mut self, message: &str) {
        let spinner = SPINNER_FRAMES[self.spinner_index % SPINNER_FRAMES.len()];
        self.spinner_index = (self.spinner_index + 1) % SPINNER_FRAMES.len();

        let mut stderr = io::stderr();
        if self.is_tty {
            let _ = write!(stderr, "\r\x1b[2K{spinner} {message}");
        } else {
            let _ = writeln!(stderr, "{spinner} {message}");
        }
        let _ = stderr.flush();
        self.rendered = true;
    }

    fn finish(&mut self) {
        if !self.rendered {
            return;
        }
        let mut stderr = io::stderr();
        if self.is_tty {
            let _ = write!(stderr, "\r\x1b[2K");
        }
        let _ = stderr.flush();
        self.rendered = false;
    }
}

fn status_message(event: &Event) -> Option<String> {
    let data = event.data.as_ref();
    let message = match event.event_type {
        EventType::CollectStart => "Collecting diagnostics".to_string(),
        EventType::CollectComplete => format!(
            "Collected {} artifacts ({} failed)",
            data.and_then(|d| d["artifacts"].as_u64()).unwrap_or(0),
            data.and_then(|d| d["failed"].as_u64()).unwrap_or(0),
        ),
        EventType::ArchiveComplete => format!(
            "Created {}",
            data.and_then(|d| d["filename"].as_str()).unwrap_or("bundle")
        ),
        EventType::UploadStart => event
            .message
            .clone()
            .unwrap_or_else(|| "Uploading bundle".to_string()),
        EventType::UploadRetry => format!(
            "Retrying upload (attempt {})",
            data.and_then(|d| d["attempt"].as_u64()).unwrap_or(2)
        ),
        EventType::UploadComplete => "Upload complete".to_string(),
        EventType::CommandStart | EventType::CommandEnd => return None,
    };
    Some(message)
}

const SPINNER_FRAMES: &[&str] = &["-", "\\", "|", "/"];
