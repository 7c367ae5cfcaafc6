#![allow(dead_code)]

use reminder_core::{
    Dispatcher, Notification, NotificationChannel, NotificationEvent, Scheduler, SchedulerConfig,
};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Events observed by the UI callback, with a blocking wait.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<NotificationEvent>>,
    changed: Condvar,
}

impl EventLog {
    pub fn push(&self, event: &NotificationEvent) {
        self.events.lock().unwrap().push(event.clone());
        self.changed.notify_all();
    }

    pub fn snapshot(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Waits until at least `count` events arrived or `timeout` elapsed.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<NotificationEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock().unwrap();
        while events.len() < count {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            events = self.changed.wait_timeout(events, deadline - now).unwrap().0;
        }
        events.clone()
    }
}

/// Channel that swallows notifications so tests stay quiet.
pub struct SilentChannel;

impl NotificationChannel for SilentChannel {
    fn name(&self) -> &str {
        "silent"
    }

    fn show(&self, _notification: &Notification) -> bool {
        true
    }
}

pub fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        poll_interval: Duration::from_millis(50),
        shutdown_timeout: Duration::from_secs(1),
    }
}

/// Dispatcher without native channels whose UI callback records events.
pub fn recording_dispatcher() -> (Arc<Dispatcher>, Arc<EventLog>) {
    let log = Arc::new(EventLog::default());
    let dispatcher = Dispatcher::new(Vec::new()).with_last_resort(Arc::new(SilentChannel));
    let sink = Arc::clone(&log);
    dispatcher.set_ui_callback(Arc::new(move |event: &NotificationEvent| sink.push(event)));
    (Arc::new(dispatcher), log)
}

pub fn recording_scheduler() -> (Scheduler, Arc<EventLog>) {
    let (dispatcher, log) = recording_dispatcher();
    let scheduler = Scheduler::new(dispatcher, test_config()).expect("scheduler should start");
    (scheduler, log)
}
