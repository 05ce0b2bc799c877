use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::errors::UploaderError;

/// Notification published by an upload run.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Fraction of files uploaded so far, in `[0, 1]`.
    Progress(f64),
    Status(String),
    Complete,
    Error(Arc<UploaderError>),
}

type Handler = Arc<dyn Fn(&UploadEvent) + Send + Sync>;

/// Thread-safe fan-out of [`UploadEvent`]s to any number of subscribers.
///
/// Cloning an `EventBus` yields another handle onto the same subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<Vec<Handler>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&UploadEvent) + Send + Sync + 'static,
    {
        match self.handlers.lock() {
            Ok(mut handlers) => handlers.push(Arc::new(handler)),
            Err(e) => log::error!("Failed to register event subscriber: {}", e),
        }
    }

    pub fn on_progress<F>(&self, handler: F)
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let UploadEvent::Progress(fraction) = event {
                handler(*fraction);
            }
        });
    }

    pub fn on_status<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let UploadEvent::Status(message) = event {
                handler(message);
            }
        });
    }

    pub fn on_complete<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let UploadEvent::Complete = event {
                handler();
            }
        });
    }

    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&UploaderError) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let UploadEvent::Error(error) = event {
                handler(error);
            }
        });
    }

    /// Receive every event on an async channel instead of a callback.
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<UploadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(move |event| {
            // Receiver dropped: nothing left to deliver to
            let _ = tx.send(event.clone());
        });
        rx
    }

    /// Re-publish everything emitted here on `target`, unchanged.
    pub fn forward_to(&self, target: &EventBus) {
        let target = target.clone();
        self.subscribe(move |event| {
            target.emit(event.clone());
        });
    }

    /// Deliver `event` to all subscribers. Returns how many were reached.
    pub fn emit(&self, event: UploadEvent) -> usize {
        // Snapshot so handlers may subscribe or emit without deadlocking
        let handlers: Vec<Handler> = match self.handlers.lock() {
            Ok(handlers) => handlers.clone(),
            Err(e) => {
                log::warn!("Failed to emit {:?} (non-critical): {}", event, e);
                return 0;
            }
        };

        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    pub fn progress(&self, fraction: f64) {
        self.emit(UploadEvent::Progress(fraction));
    }

    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{}", message);
        self.emit(UploadEvent::Status(message));
    }

    pub fn complete(&self) {
        self.emit(UploadEvent::Complete);
    }

    pub fn error(&self, error: Arc<UploaderError>) {
        self.emit(UploadEvent::Error(error));
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().map(|h| h.len()).unwrap_or(0)
    }
}
