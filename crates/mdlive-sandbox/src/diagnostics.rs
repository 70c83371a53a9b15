//! Scoped capture of warning and error events raised during an evaluation.
//!
//! A [`Scope`] installs a collecting subscriber as the thread's default
//! dispatcher. Every `WARN` or `ERROR` event emitted on the thread while the
//! scope is alive is rendered and buffered instead of reaching the regular log.
//! Dropping or finishing the scope restores the previous dispatcher, so no hook
//! outlives the call that created it.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
    subscriber::DefaultGuard,
};
use tracing_subscriber::{Registry, layer::Context, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Error,
    Warning,
}

impl MessageKind {
    fn prefix(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "Warning",
        }
    }
}

/// A rendered diagnostic in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub text: String,
}

impl Message {
    pub fn new(kind: MessageKind, body: impl fmt::Display) -> Self {
        Self {
            kind,
            text: format!("{}: {}", kind.prefix(), body),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

type Buffer = Arc<Mutex<Vec<Message>>>;

struct Collector {
    buffer: Buffer,
}

impl<S: Subscriber> tracing_subscriber::Layer<S> for Collector {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let kind = match *event.metadata().level() {
            Level::ERROR => MessageKind::Error,
            Level::WARN => MessageKind::Warning,
            _ => return,
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push(Message::new(kind, visitor.finish()));
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

/// A live collection scope.
///
/// The collector stays registered for the current thread until the scope is
/// finished or dropped.
pub struct Scope {
    buffer: Buffer,
    guard: Option<DefaultGuard>,
}

impl Scope {
    pub fn begin() -> Self {
        let buffer = Buffer::default();
        let subscriber = Registry::default().with(Collector {
            buffer: Arc::clone(&buffer),
        });
        let guard = tracing::subscriber::set_default(subscriber);

        Self {
            buffer,
            guard: Some(guard),
        }
    }

    /// Deregisters the collector and drains the messages gathered so far.
    pub fn finish(mut self) -> Vec<Message> {
        self.guard.take();
        self.drain()
    }

    fn drain(&self) -> Vec<Message> {
        self.buffer
            .lock()
            .map(|mut buffer| std::mem::take(&mut *buffer))
            .unwrap_or_default()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.guard.take();
    }
}

/// Runs `operation` inside a fresh [`Scope`] and returns its result together
/// with the collected messages.
pub fn with_collection<T>(operation: impl FnOnce() -> T) -> (T, Vec<Message>) {
    let scope = Scope::begin();
    let result = operation();
    (result, scope.finish())
}
