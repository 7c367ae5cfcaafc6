//! Event dispatcher over an ordered channel chain.
//!
//! # Responsibility
//! - Convert a `NotificationEvent` into a user-visible notification.
//! - Always give a registered UI callback the event, even after a native
//!   notification succeeded.
//!
//! # Invariants
//! - Platform channels are tried in order until one succeeds.
//! - Without a working UI callback the event falls through to the
//!   interactive channel, then to the last-resort channel.
//! - Panics inside channels or the UI callback are caught here.

use super::channel::{Notification, NotificationChannel};
use super::platform::{interactive_channel, platform_channels, ConsoleChannel};
use crate::model::event::NotificationEvent;
use log::{debug, error, info, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// Host UI hook; expected to marshal onto the UI's own thread.
pub type UiCallback = Arc<dyn Fn(&NotificationEvent) + Send + Sync>;

/// What happened while dispatching one event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeliveryReport {
    /// Platform channel that showed the notification.
    pub native_channel: Option<String>,
    /// Whether the UI callback ran to completion.
    pub ui_notified: bool,
    /// Interactive or last-resort channel used after the UI step.
    pub fallback_channel: Option<String>,
}

/// Delivers fired events through platform channels and the UI callback.
pub struct Dispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
    interactive: Option<Arc<dyn NotificationChannel>>,
    last_resort: Arc<dyn NotificationChannel>,
    ui_callback: RwLock<Option<UiCallback>>,
}

impl Dispatcher {
    /// Creates a dispatcher with the given platform channels, no interactive
    /// fallback and a stdout console as last resort.
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self {
            channels,
            interactive: None,
            last_resort: Arc::new(ConsoleChannel::stdout()),
            ui_callback: RwLock::new(None),
        }
    }

    /// Creates the dispatcher appropriate for the running OS.
    pub fn for_current_platform() -> Self {
        let mut dispatcher = Self::new(platform_channels());
        dispatcher.interactive = interactive_channel();
        dispatcher
    }

    pub fn with_interactive(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.interactive = Some(channel);
        self
    }

    pub fn with_last_resort(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.last_resort = channel;
        self
    }

    /// Registers (or replaces) the UI callback.
    pub fn set_ui_callback(&self, callback: UiCallback) {
        match self.ui_callback.write() {
            Ok(mut slot) => *slot = Some(callback),
            Err(poisoned) => *poisoned.into_inner() = Some(callback),
        }
    }

    pub fn clear_ui_callback(&self) {
        match self.ui_callback.write() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    pub fn has_ui_callback(&self) -> bool {
        self.current_ui_callback().is_some()
    }

    /// Delivers one event. Never panics and never returns an error.
    pub fn dispatch(&self, event: &NotificationEvent) -> DeliveryReport {
        let notification = Notification::for_event(event);

        let native_channel = self
            .channels
            .iter()
            .find(|channel| show_guarded(channel.as_ref(), &notification))
            .map(|channel| channel.name().to_string());
        if native_channel.is_none() {
            warn!(
                "event=reminder_deliver module=notify status=degraded task_id={} reason=native_failed channels={}",
                event.task_id,
                self.channels.len()
            );
        }

        let ui_notified = self.notify_ui(event);
        let fallback_channel = if ui_notified {
            None
        } else {
            Some(self.fall_back(&notification))
        };

        info!(
            "event=reminder_deliver module=notify status=ok task_id={} native={} ui={} fallback={}",
            event.task_id,
            native_channel.as_deref().unwrap_or("none"),
            ui_notified,
            fallback_channel.as_deref().unwrap_or("none")
        );

        DeliveryReport {
            native_channel,
            ui_notified,
            fallback_channel,
        }
    }

    fn notify_ui(&self, event: &NotificationEvent) -> bool {
        let Some(callback) = self.current_ui_callback() else {
            return false;
        };
        match catch_unwind(AssertUnwindSafe(|| callback(event))) {
            Ok(()) => true,
            Err(_) => {
                error!(
                    "event=ui_callback module=notify status=error task_id={} error_code=callback_panicked",
                    event.task_id
                );
                false
            }
        }
    }

    fn fall_back(&self, notification: &Notification) -> String {
        if let Some(channel) = &self.interactive {
            if show_guarded(channel.as_ref(), notification) {
                return channel.name().to_string();
            }
        }
        if !show_guarded(self.last_resort.as_ref(), notification) {
            error!(
                "event=reminder_deliver module=notify status=error channel={} error_code=last_resort_failed",
                self.last_resort.name()
            );
        }
        self.last_resort.name().to_string()
    }

    fn current_ui_callback(&self) -> Option<UiCallback> {
        match self.ui_callback.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

fn show_guarded(channel: &dyn NotificationChannel, notification: &Notification) -> bool {
    match catch_unwind(AssertUnwindSafe(|| channel.show(notification))) {
        Ok(shown) => {
            debug!(
                "event=channel_show module=notify channel={} shown={}",
                channel.name(),
                shown
            );
            shown
        }
        Err(_) => {
            error!(
                "event=channel_show module=notify status=error channel={} error_code=channel_panicked",
                channel.name()
            );
            false
        }
    }
}
