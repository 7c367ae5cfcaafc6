//! Reminder CLI.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `reminder_core` linkage.
//! - Add and list tasks against the same store the desktop app uses.
//!
//! Usage:
//!   reminders                         # ping/version probe
//!   reminders list                    # stored tasks
//!   reminders add "buy milk" --in 60  # task with a reminder in 60 s
//!   reminders add "stretch" --in 5 --wait

use chrono::{Duration as ChronoDuration, Local, Utc};
use clap::{Parser, Subcommand};
use log::warn;
use reminder_core::{
    init_logging_for, Dispatcher, NotificationEvent, ReminderConfig, ReminderService, Task,
    TaskStore, Timestamp,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "reminders", version, about = "Task reminders from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Data directory holding tasks.db and logs
    #[arg(long, global = true, env = "REMINDERS_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Print core ping and version
    Ping,
    /// List stored tasks
    List,
    /// Add a task, optionally with a reminder
    Add {
        /// Task text
        text: String,

        /// Remind after this many seconds
        #[arg(long = "in", value_name = "SECONDS")]
        in_seconds: Option<u64>,

        /// Stay running until the reminder fired
        #[arg(long, requires = "in_seconds")]
        wait: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match cli.data_dir {
        Some(dir) => ReminderConfig::with_data_dir(dir),
        None => ReminderConfig::default(),
    };

    let result = match cli.command.unwrap_or(Command::Ping) {
        Command::Ping => {
            print_probe();
            Ok(())
        }
        Command::List => list(&config),
        Command::Add {
            text,
            in_seconds,
            wait,
        } => add(&config, text, in_seconds, wait),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn print_probe() {
    println!("reminder_core ping={}", reminder_core::ping());
    println!("reminder_core version={}", reminder_core::core_version());
}

fn list(config: &ReminderConfig) -> Result<(), String> {
    let service = open_service(config, Dispatcher::for_current_platform())?;
    let tasks = service.list_tasks().map_err(|err| err.to_string());
    service.close();

    let tasks = tasks?;
    if tasks.is_empty() {
        println!("No tasks.");
    }
    for task in &tasks {
        println!("{}", describe(task));
    }
    Ok(())
}

fn add(
    config: &ReminderConfig,
    text: String,
    in_seconds: Option<u64>,
    wait: bool,
) -> Result<(), String> {
    let notify_at = in_seconds.map(reminder_time).transpose()?;
    let wait = waits_for_delivery(in_seconds, wait);
    let dispatcher = Dispatcher::for_current_platform();
    let (fired_tx, fired_rx) = mpsc::channel::<NotificationEvent>();
    if wait {
        let fired_tx = Mutex::new(fired_tx);
        dispatcher.set_ui_callback(Arc::new(move |event: &NotificationEvent| {
            if let Ok(sender) = fired_tx.lock() {
                let _ = sender.send(event.clone());
            }
        }));
    }

    let service = open_service(config, dispatcher)?;

    let task = service
        .add_task(text, notify_at)
        .map_err(|err| err.to_string())?;
    println!("added {}", describe(&task));

    if let (true, Some(secs)) = (wait, in_seconds) {
        let grace = Duration::from_secs(secs.saturating_add(5));
        match fired_rx.recv_timeout(grace) {
            Ok(event) => println!(
                "fired {} at {}",
                event.task_id,
                event.fired_at.with_timezone(&Local).format("%H:%M:%S")
            ),
            Err(_) => {
                warn!("event=cli_wait module=cli status=timeout task_id={}", task.id);
                eprintln!("reminder did not fire within {}s", grace.as_secs());
            }
        }
    }
    service.close();
    Ok(())
}

fn open_service(
    config: &ReminderConfig,
    dispatcher: Dispatcher,
) -> Result<ReminderService<TaskStore>, String> {
    if let Err(err) = init_logging_for(config) {
        eprintln!("warning: logging disabled: {err}");
    }
    let (service, report) =
        ReminderService::open(config, Arc::new(dispatcher)).map_err(|err| err.to_string())?;
    if report.missed > 0 {
        println!("{} reminder(s) were missed while not running", report.missed);
    }
    Ok(service)
}

/// An immediate reminder would be dropped by the shutdown that follows, so
/// `--in 0` always waits for it.
fn waits_for_delivery(in_seconds: Option<u64>, wait: bool) -> bool {
    wait || in_seconds == Some(0)
}

fn reminder_time(in_seconds: u64) -> Result<Timestamp, String> {
    i64::try_from(in_seconds)
        .ok()
        .and_then(ChronoDuration::try_seconds)
        .and_then(|delay| Utc::now().checked_add_signed(delay))
        .ok_or_else(|| format!("--in {in_seconds} is out of range"))
}

fn describe(task: &Task) -> String {
    match task.notification_time {
        Some(at) => format!(
            "{}  {}  (at {})",
            task.id,
            task.text,
            at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        ),
        None => format!("{}  {}", task.id, task.text),
    }
}
