//! Наблюдатель за событиями преобразований
//!
//! Каждый оператор получает свой наблюдатель вместо глобальной настройки логирования.
//! По умолчанию события уходят в `tracing`, в тестах их можно собрать в память.

use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformEvent {
    pub operator: &'static str,
    pub level: EventLevel,
    pub message: String,
}

impl fmt::Display for TransformEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:?}: {}", self.operator, self.level, self.message)
    }
}

pub trait TransformObserver: Send + Sync {
    fn record(&self, event: TransformEvent);
}

/// Передаёт события в `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TransformObserver for TracingObserver {
    fn record(&self, event: TransformEvent) {
        let operator = event.operator;
        match event.level {
            EventLevel::Debug => tracing::debug!(operator, "{}", event.message),
            EventLevel::Info => tracing::info!(operator, "{}", event.message),
            EventLevel::Warn => tracing::warn!(operator, "{}", event.message),
            EventLevel::Error => tracing::error!(operator, "{}", event.message),
        }
    }
}

/// Складывает события в память
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<TransformEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<TransformEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn messages(&self, level: EventLevel) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.message)
            .collect()
    }
}

impl TransformObserver for RecordingObserver {
    fn record(&self, event: TransformEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

pub fn default_observer() -> Arc<dyn TransformObserver> {
    Arc::new(TracingObserver)
}

/// Обёртка, которую хранит каждый оператор
#[derive(Clone)]
pub(crate) struct Emitter {
    operator: &'static str,
    observer: Arc<dyn TransformObserver>,
}

impl Emitter {
    pub(crate) fn new(operator: &'static str) -> Self {
        Self {
            operator,
            observer: default_observer(),
        }
    }

    pub(crate) fn with_observer(mut self, observer: Arc<dyn TransformObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn emit(&self, level: EventLevel, message: String) {
        self.observer.record(TransformEvent {
            operator: self.operator,
            level,
            message,
        });
    }

    pub(crate) fn debug(&self, message: impl Into<String>) {
        self.emit(EventLevel::Debug, message.into());
    }

    pub(crate) fn info(&self, message: impl Into<String>) {
        self.emit(EventLevel::Info, message.into());
    }

    pub(crate) fn warn(&self, message: impl Into<String>) {
        self.emit(EventLevel::Warn, message.into());
    }

    /// Логирует ошибку и возвращает её для `Err(...)`
    pub(crate) fn fail<E: fmt::Display>(&self, err: E) -> E {
        self.emit(EventLevel::Error, err.to_string());
        err
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("operator", &self.operator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_observer_keeps_order() {
        let observer = RecordingObserver::new();
        let emitter = Emitter::new("test").with_observer(observer.clone());
        emitter.info("first");
        emitter.debug("second");
        let err = emitter.fail("boom".to_string());
        assert_eq!(err, "boom");

        let events = observer.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].message, "first");
        assert_eq!(events[2].level, EventLevel::Error);
        assert_eq!(observer.messages(EventLevel::Error), vec!["boom"]);
    }
}
