use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, SessionCancelledEvent, SessionCompletedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub session_completed_producer: Vec<EventProducer<SessionCompletedEvent>>,
    pub session_cancelled_producer: Vec<EventProducer<SessionCancelledEvent>>,
}

pub struct EventHandlers {
    pub on_session_completed: Option<EventHandler<SessionCompletedEvent>>,
    pub on_session_cancelled: Option<EventHandler<SessionCancelledEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_session_completed = hooks.on_session_completed.map(|f| EventHandler::new(buffer_size, f));
        let on_session_cancelled = hooks.on_session_cancelled.map(|f| EventHandler::new(buffer_size, f));
        Self { on_session_completed, on_session_cancelled }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_session_completed {
            result.session_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_session_cancelled {
            result.session_cancelled_producer.push(handler.subscribe());
        }
        result
    }

    pub fn start_handlers(self) {
        if let Some(handler) = self.on_session_completed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_session_cancelled {
            tokio::spawn(handler.start_handler());
        }
    }
}

type BoxedHook = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_session_completed: Option<Handler<SessionCompletedEvent>>,
    pub on_session_cancelled: Option<Handler<SessionCancelledEvent>>,
}

impl EventHooks {
    pub fn on_session_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SessionCompletedEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_session_completed = Some(Arc::new(f));
        self
    }

    pub fn on_session_cancelled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SessionCancelledEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_session_cancelled = Some(Arc::new(f));
        self
    }
}
