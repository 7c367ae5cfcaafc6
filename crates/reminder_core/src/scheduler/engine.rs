//! Scheduler threads and public API.
//!
//! One timer thread sleeps until the earliest deadline (or a wake-up) and
//! moves due entries onto a FIFO channel. One consumer thread drains that
//! channel and calls the dispatcher, so slow delivery never delays firing.

use super::queue::TimerQueue;
use crate::config::SchedulerConfig;
use crate::model::event::{ActiveReminder, NotificationEvent};
use crate::model::task::Timestamp;
use crate::notify::Dispatcher;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest uninterrupted timer sleep. Deadlines are wall-clock times, so the
/// timer re-reads the clock at least this often to follow clock changes and
/// system suspend.
const MAX_TIMER_SLEEP: Duration = Duration::from_secs(30);

struct Shared {
    queue: Mutex<TimerState>,
    wakeup: Condvar,
    events: Mutex<Option<Sender<NotificationEvent>>>,
    accepting: AtomicBool,
}

#[derive(Default)]
struct TimerState {
    timers: TimerQueue,
    stopped: bool,
}

struct Consumer {
    thread: JoinHandle<()>,
    done: Receiver<()>,
}

/// Reminder scheduler owning the armed entries and their threads.
///
/// Construct one per application (or per test) and share it through `Arc`.
/// Dropping the scheduler shuts it down.
pub struct Scheduler {
    shared: Arc<Shared>,
    dispatcher: Arc<Dispatcher>,
    config: SchedulerConfig,
    timer: Mutex<Option<JoinHandle<()>>>,
    consumer: Mutex<Option<Consumer>>,
}

impl Scheduler {
    /// Starts the timer and delivery threads.
    ///
    /// # Errors
    /// - Returns an error when the OS refuses to spawn a thread.
    pub fn new(dispatcher: Arc<Dispatcher>, config: SchedulerConfig) -> std::io::Result<Self> {
        let (events_tx, events_rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            queue: Mutex::new(TimerState::default()),
            wakeup: Condvar::new(),
            events: Mutex::new(Some(events_tx)),
            accepting: AtomicBool::new(true),
        });

        let timer_shared = Arc::clone(&shared);
        let timer = thread::Builder::new()
            .name("reminder-timer".to_string())
            .spawn(move || run_timer(&timer_shared))?;

        let (done_tx, done_rx) = mpsc::channel();
        let consumer_shared = Arc::clone(&shared);
        let consumer_dispatcher = Arc::clone(&dispatcher);
        let poll_interval = config.poll_interval;
        let spawned = thread::Builder::new()
            .name("reminder-delivery".to_string())
            .spawn(move || {
                run_consumer(
                    &consumer_shared,
                    &events_rx,
                    &consumer_dispatcher,
                    poll_interval,
                );
                let _ = done_tx.send(());
            });
        let consumer = match spawned {
            Ok(thread) => Consumer {
                thread,
                done: done_rx,
            },
            Err(err) => {
                shared.stop_timer();
                let _ = timer.join();
                return Err(err);
            }
        };

        info!("event=scheduler_start module=scheduler status=ok");
        Ok(Self {
            shared,
            dispatcher,
            config,
            timer: Mutex::new(Some(timer)),
            consumer: Mutex::new(Some(consumer)),
        })
    }

    /// Dispatcher used for delivery; hosts register their UI callback here.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Arms a reminder for `task_id`, replacing any existing one.
    ///
    /// A `fire_time` that is not strictly in the future fires immediately.
    /// Returns `false` only after [`Scheduler::shutdown`].
    pub fn schedule(&self, task_id: &str, fire_time: Timestamp, text: &str) -> bool {
        let mut state = self.shared.lock_queue();
        if state.stopped {
            warn!("event=reminder_schedule module=scheduler status=rejected task_id={task_id} reason=shutdown");
            return false;
        }

        if state.timers.remove(task_id).is_some() {
            debug!("event=reminder_cancel module=scheduler status=replaced task_id={task_id}");
        }

        let now = Utc::now();
        if fire_time <= now {
            info!(
                "event=reminder_schedule module=scheduler status=past_due task_id={} late_ms={}",
                task_id,
                (now - fire_time).num_milliseconds()
            );
            self.shared.enqueue(task_id, text);
            return true;
        }

        state.timers.insert(task_id, fire_time, text);
        info!(
            "event=reminder_schedule module=scheduler status=armed task_id={} delay_ms={} active={}",
            task_id,
            (fire_time - now).num_milliseconds(),
            state.timers.len()
        );
        drop(state);
        self.shared.wakeup.notify_one();
        true
    }

    /// Disarms the reminder for `task_id`; returns whether one existed.
    pub fn cancel(&self, task_id: &str) -> bool {
        let cancelled = self.shared.lock_queue().timers.remove(task_id).is_some();
        if cancelled {
            info!("event=reminder_cancel module=scheduler status=ok task_id={task_id}");
            self.shared.wakeup.notify_one();
        }
        cancelled
    }

    /// Disarms every reminder; returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let cancelled = self.shared.lock_queue().timers.clear();
        info!("event=reminder_cancel_all module=scheduler status=ok cancelled={cancelled}");
        self.shared.wakeup.notify_one();
        cancelled
    }

    /// Live entries ordered by fire time.
    pub fn list_active(&self) -> Vec<ActiveReminder> {
        self.shared.lock_queue().timers.snapshot(Utc::now())
    }

    pub fn count(&self) -> usize {
        self.shared.lock_queue().timers.len()
    }

    pub fn is_scheduled(&self, task_id: &str) -> bool {
        self.shared.lock_queue().timers.contains(task_id)
    }

    /// Stops delivery, cancels every entry and waits for the consumer.
    ///
    /// The wait is bounded by `SchedulerConfig::shutdown_timeout`; a delivery
    /// already in progress may finish after this returns, but no new one
    /// starts. Calling it again is a no-op.
    pub fn shutdown(&self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        let cancelled = self.shared.stop_timer();
        self.shared.close_events();

        if let Some(timer) = lock_or_recover(&self.timer).take() {
            if timer.join().is_err() {
                error!("event=scheduler_shutdown module=scheduler status=error error_code=timer_panicked");
            }
        }

        let Some(consumer) = lock_or_recover(&self.consumer).take() else {
            return;
        };
        match consumer.done.recv_timeout(self.config.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = consumer.thread.join();
                info!("event=scheduler_shutdown module=scheduler status=ok cancelled={cancelled}");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "event=scheduler_shutdown module=scheduler status=timeout cancelled={} timeout_ms={}",
                    cancelled,
                    self.config.shutdown_timeout.as_millis()
                );
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn lock_queue(&self) -> MutexGuard<'_, TimerState> {
        lock_or_recover(&self.queue)
    }

    /// Marks the timer stopped and drops all entries.
    fn stop_timer(&self) -> usize {
        let cancelled = {
            let mut state = self.lock_queue();
            state.stopped = true;
            state.timers.clear()
        };
        self.wakeup.notify_all();
        cancelled
    }

    fn close_events(&self) {
        lock_or_recover(&self.events).take();
    }

    /// Queues a fired event for the consumer.
    ///
    /// Callers hold the queue lock, which orders firing against cancel and
    /// replace for the same task.
    fn enqueue(&self, task_id: &str, text: &str) {
        let event = NotificationEvent {
            task_id: task_id.to_string(),
            task_text: text.to_string(),
            fired_at: Utc::now(),
        };
        let sent = match lock_or_recover(&self.events).as_ref() {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        };
        if sent {
            info!("event=reminder_fire module=scheduler status=ok task_id={task_id}");
        } else {
            warn!("event=reminder_fire module=scheduler status=dropped task_id={task_id} reason=consumer_closed");
        }
    }
}

fn run_timer(shared: &Shared) {
    let mut state = shared.lock_queue();
    loop {
        if state.stopped {
            break;
        }

        let now = Utc::now();
        if let Some(entry) = state.timers.pop_due(now) {
            shared.enqueue(&entry.task_id, &entry.text);
            continue;
        }

        state = match state.timers.next_fire_time() {
            Some(next) => {
                let wait = (next - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .min(MAX_TIMER_SLEEP);
                shared
                    .wakeup
                    .wait_timeout(state, wait)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => shared
                .wakeup
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner),
        };
    }
    debug!("event=timer_stop module=scheduler status=ok");
}

fn run_consumer(
    shared: &Shared,
    events: &Receiver<NotificationEvent>,
    dispatcher: &Dispatcher,
    poll_interval: Duration,
) {
    while shared.accepting.load(Ordering::SeqCst) {
        let event = match events.recv_timeout(poll_interval) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if !shared.accepting.load(Ordering::SeqCst) {
            warn!(
                "event=reminder_deliver module=scheduler status=dropped task_id={} reason=shutdown",
                event.task_id
            );
            break;
        }
        if catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(&event))).is_err() {
            error!(
                "event=reminder_deliver module=scheduler status=error task_id={} error_code=dispatch_panicked",
                event.task_id
            );
        }
    }
    debug!("event=consumer_stop module=scheduler status=ok");
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
