//! Host-platform notification channels.
//!
//! # Responsibility
//! - Show native notifications through OS command-line tools.
//! - Provide an interactive dialog fallback and a console last resort.
//!
//! # Invariants
//! - Every child process is bounded by the channel timeout.
//! - User text is escaped for the target scripting language before use.

use super::channel::{Notification, NotificationChannel};
use super::process::{run_bounded, ProcessOutcome};
use log::{debug, info, warn};
use std::io::Write;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const APP_NAME: &str = "Reminders";
const MACOS_DEFAULT_SOUND: &str = "Glass";
const NATIVE_TIMEOUT: Duration = Duration::from_secs(5);
const WINDOWS_TIMEOUT: Duration = Duration::from_secs(10);
const DIALOG_VISIBLE_SECS: u64 = 10;
const DIALOG_TIMEOUT: Duration = Duration::from_secs(DIALOG_VISIBLE_SECS + 5);
/// `zenity` exit status when its own `--timeout` closes the dialog.
const ZENITY_TIMEOUT_EXIT: i32 = 5;

/// Returns the native channels for the running OS, in preference order.
pub fn platform_channels() -> Vec<Arc<dyn NotificationChannel>> {
    if cfg!(target_os = "macos") {
        vec![Arc::new(MacOsBannerChannel::default())]
    } else if cfg!(target_os = "windows") {
        vec![Arc::new(WindowsToastChannel::default())]
    } else {
        vec![Arc::new(NotifySendChannel::default())]
    }
}

/// Returns a modal dialog channel when the OS has one.
pub fn interactive_channel() -> Option<Arc<dyn NotificationChannel>> {
    if cfg!(unix) {
        Some(Arc::new(DialogChannel::default()))
    } else {
        None
    }
}

/// macOS banner via `osascript display notification`.
pub struct MacOsBannerChannel {
    timeout: Duration,
}

impl Default for MacOsBannerChannel {
    fn default() -> Self {
        Self {
            timeout: NATIVE_TIMEOUT,
        }
    }
}

impl MacOsBannerChannel {
    fn script(notification: &Notification) -> String {
        let mut script = format!(
            "display notification \"{}\" with title \"{}\"",
            escape_applescript(&notification.message),
            escape_applescript(&notification.title)
        );
        if let Some(subtitle) = &notification.subtitle {
            script.push_str(&format!(" subtitle \"{}\"", escape_applescript(subtitle)));
        }
        let sound = notification.sound.as_deref().unwrap_or(MACOS_DEFAULT_SOUND);
        script.push_str(&format!(" sound name \"{}\"", escape_applescript(sound)));
        script
    }
}

impl NotificationChannel for MacOsBannerChannel {
    fn name(&self) -> &str {
        "macos_banner"
    }

    fn show(&self, notification: &Notification) -> bool {
        let mut command = Command::new("osascript");
        command.arg("-e").arg(Self::script(notification));
        exited_ok(self.name(), &mut command, self.timeout)
    }
}

/// Windows toast through PowerShell, falling back to a tray balloon.
pub struct WindowsToastChannel {
    timeout: Duration,
}

impl Default for WindowsToastChannel {
    fn default() -> Self {
        Self {
            timeout: WINDOWS_TIMEOUT,
        }
    }
}

impl WindowsToastChannel {
    fn script(notification: &Notification) -> String {
        let title = escape_powershell(&escape_xml(&notification.title));
        let message = escape_powershell(&escape_xml(&notification.message));
        let balloon_title = escape_powershell(&notification.title);
        let balloon_message = escape_powershell(&notification.message);
        format!(
            r#"
$ErrorActionPreference = 'Stop'
try {{
    [Windows.UI.Notifications.ToastNotificationManager, Windows.UI.Notifications, ContentType = WindowsRuntime] | Out-Null
    [Windows.Data.Xml.Dom.XmlDocument, Windows.Data.Xml.Dom.XmlDocument, ContentType = WindowsRuntime] | Out-Null
    $template = '<toast><visual><binding template="ToastText02"><text id="1">{title}</text><text id="2">{message}</text></binding></visual></toast>'
    $xml = New-Object Windows.Data.Xml.Dom.XmlDocument
    $xml.LoadXml($template)
    $toast = [Windows.UI.Notifications.ToastNotification]::new($xml)
    [Windows.UI.Notifications.ToastNotificationManager]::CreateToastNotifier('{APP_NAME}').Show($toast)
    exit 0
}} catch {{}}
try {{
    Add-Type -AssemblyName System.Windows.Forms
    $notifyIcon = New-Object System.Windows.Forms.NotifyIcon
    $notifyIcon.Icon = [System.Drawing.SystemIcons]::Information
    $notifyIcon.BalloonTipTitle = '{balloon_title}'
    $notifyIcon.BalloonTipText = '{balloon_message}'
    $notifyIcon.Visible = $true
    $notifyIcon.ShowBalloonTip(5000)
    Start-Sleep -Seconds 5
    $notifyIcon.Dispose()
    exit 0
}} catch {{
    exit 1
}}
"#
        )
    }
}

impl NotificationChannel for WindowsToastChannel {
    fn name(&self) -> &str {
        "windows_toast"
    }

    fn show(&self, notification: &Notification) -> bool {
        let mut command = Command::new("powershell");
        command
            .args(["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command"])
            .arg(Self::script(notification));
        hide_console_window(&mut command);
        exited_ok(self.name(), &mut command, self.timeout)
    }
}

/// Freedesktop notification via `notify-send`.
pub struct NotifySendChannel {
    timeout: Duration,
}

impl Default for NotifySendChannel {
    fn default() -> Self {
        Self {
            timeout: NATIVE_TIMEOUT,
        }
    }
}

impl NotificationChannel for NotifySendChannel {
    fn name(&self) -> &str {
        "notify_send"
    }

    fn show(&self, notification: &Notification) -> bool {
        if !has_graphical_session() {
            debug!("event=channel_show module=notify status=skipped channel=notify_send reason=no_display");
            return false;
        }
        let mut command = Command::new("notify-send");
        command
            .arg(format!("--app-name={APP_NAME}"))
            .arg("--")
            .arg(&notification.title)
            .arg(notification.body_with_subtitle());
        exited_ok(self.name(), &mut command, self.timeout)
    }
}

/// Modal dialog that closes itself after a few seconds.
///
/// Uses `zenity` on Linux/BSD and `osascript display alert` on macOS.
/// Reports failure when no graphical session is present.
pub struct DialogChannel {
    timeout: Duration,
}

impl Default for DialogChannel {
    fn default() -> Self {
        Self {
            timeout: DIALOG_TIMEOUT,
        }
    }
}

impl NotificationChannel for DialogChannel {
    fn name(&self) -> &str {
        "dialog"
    }

    fn show(&self, notification: &Notification) -> bool {
        if cfg!(target_os = "macos") {
            let script = format!(
                "display alert \"{}\" message \"{}\" giving up after {DIALOG_VISIBLE_SECS}",
                escape_applescript(&notification.title),
                escape_applescript(&notification.body_with_subtitle())
            );
            let mut command = Command::new("osascript");
            command.arg("-e").arg(script);
            return exited_ok(self.name(), &mut command, self.timeout);
        }

        if !has_graphical_session() {
            debug!("event=channel_show module=notify status=skipped channel=dialog reason=no_display");
            return false;
        }
        let mut command = Command::new("zenity");
        command
            .arg("--info")
            .arg(format!("--title={}", notification.title))
            .arg(format!("--text={}", notification.body_with_subtitle()))
            .arg(format!("--timeout={DIALOG_VISIBLE_SECS}"))
            .arg("--no-markup");
        match run_bounded(&mut command, self.timeout) {
            Ok(ProcessOutcome::Exited(Some(0 | ZENITY_TIMEOUT_EXIT))) => true,
            Ok(outcome) => {
                warn!("event=channel_show module=notify status=error channel=dialog outcome={outcome:?}");
                false
            }
            Err(err) => {
                warn!("event=channel_show module=notify status=error channel=dialog error={err}");
                false
            }
        }
    }
}

/// Textual last resort: writes a banner to a sink (stdout by default).
pub struct ConsoleChannel {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleChannel {
    pub fn stdout() -> Self {
        Self::with_sink(Box::new(std::io::stdout()))
    }

    pub fn with_sink(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    fn render(notification: &Notification) -> String {
        let rule = "=".repeat(40);
        let mut banner = format!("{rule}\n=== {} ===\n", notification.title);
        if let Some(subtitle) = &notification.subtitle {
            banner.push_str(&format!("[{subtitle}]\n"));
        }
        banner.push_str(&notification.message);
        banner.push('\n');
        banner.push_str(&rule);
        banner.push('\n');
        banner
    }
}

impl NotificationChannel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    fn show(&self, notification: &Notification) -> bool {
        let banner = Self::render(notification);
        let written = match self.sink.lock() {
            Ok(mut sink) => sink
                .write_all(banner.as_bytes())
                .and_then(|()| sink.flush())
                .map_err(|err| err.to_string()),
            Err(_) => Err("sink lock poisoned".to_string()),
        };
        match written {
            Ok(()) => info!("event=channel_show module=notify status=ok channel=console"),
            Err(err) => warn!("event=channel_show module=notify status=error channel=console error={err}"),
        }
        // Last resort: the log line above is the delivery when the sink fails.
        true
    }
}

fn exited_ok(channel: &str, command: &mut Command, timeout: Duration) -> bool {
    match run_bounded(command, timeout) {
        Ok(ProcessOutcome::Exited(Some(0))) => {
            debug!("event=channel_show module=notify status=ok channel={channel}");
            true
        }
        Ok(outcome) => {
            warn!("event=channel_show module=notify status=error channel={channel} outcome={outcome:?}");
            false
        }
        Err(err) => {
            warn!("event=channel_show module=notify status=error channel={channel} error={err}");
            false
        }
    }
}

fn has_graphical_session() -> bool {
    ["DISPLAY", "WAYLAND_DISPLAY"]
        .iter()
        .any(|key| std::env::var_os(key).is_some_and(|value| !value.is_empty()))
}

#[cfg(windows)]
fn hide_console_window(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_command: &mut Command) {}

fn escape_applescript(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn escape_powershell(value: &str) -> String {
    value.replace('\'', "''")
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
