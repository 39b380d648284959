//! Sources for the text the server sends back for each command.

use std::{fs, process, sync::Arc};

use chrono::Local;
use tracing::warn;

use crate::protocol::Command;

/// Supplies the payload for every command. Failures are reported in the returned text,
/// never as errors.
pub trait HostInfoProvider: Send + Sync {
    fn date_time(&self) -> String;

    fn uptime(&self) -> String;

    fn memory(&self) -> String;

    fn netstat(&self) -> String;

    fn users(&self) -> String;

    fn processes(&self) -> String;

    fn respond(&self, command: Command) -> String {
        match command {
            Command::DateTime => self.date_time(),
            Command::Uptime => self.uptime(),
            Command::Memory => self.memory(),
            Command::Netstat => self.netstat(),
            Command::Users => self.users(),
            Command::Processes => self.processes(),
        }
    }
}

/// Returns the provider for the platform we're running on.
pub fn detect() -> Arc<dyn HostInfoProvider> {
    if cfg!(target_os = "linux") {
        Arc::new(LiveHost)
    } else {
        Arc::new(UnsupportedHost)
    }
}

fn local_date_time() -> String {
    Local::now().format("%m/%d/%Y, %H:%M:%S").to_string()
}

/// Reads procfs and shells out to the usual utilities.
pub struct LiveHost;

impl LiveHost {
    fn command_output(what: &str, program: &str, args: &[&str]) -> String {
        match process::Command::new(program).args(args).output() {
            Ok(output) => String::from_utf8_lossy(&output.stdout).into_owned(),
            Err(e) => {
                warn!(program, error = %e, "Failed to run host utility");
                format!("Error reading {what}")
            }
        }
    }
}

impl HostInfoProvider for LiveHost {
    fn date_time(&self) -> String {
        local_date_time()
    }

    fn uptime(&self) -> String {
        let seconds = fs::read_to_string("/proc/uptime").ok().and_then(|contents| {
            contents
                .split_whitespace()
                .next()
                .and_then(|field| field.parse::<f64>().ok())
        });

        match seconds {
            Some(seconds) => format_uptime(seconds as u64),
            None => {
                warn!("Failed to read /proc/uptime");
                "Error reading uptime".to_string()
            }
        }
    }

    fn memory(&self) -> String {
        Self::command_output("memory usage", "free", &[])
    }

    fn netstat(&self) -> String {
        Self::command_output("netstat", "netstat", &[])
    }

    fn users(&self) -> String {
        Self::command_output("users", "who", &[])
    }

    fn processes(&self) -> String {
        Self::command_output("processes", "ps", &["-e"])
    }
}

/// Answers the date and nothing else.
pub struct UnsupportedHost;

impl HostInfoProvider for UnsupportedHost {
    fn date_time(&self) -> String {
        local_date_time()
    }

    fn uptime(&self) -> String {
        "Uptime not supported (linux not detected)".to_string()
    }

    fn memory(&self) -> String {
        "Memory usage not supported (linux not detected)".to_string()
    }

    fn netstat(&self) -> String {
        "Netstat not supported (linux not detected)".to_string()
    }

    fn users(&self) -> String {
        "Users not supported (linux not detected)".to_string()
    }

    fn processes(&self) -> String {
        "Processes not supported (linux not detected)".to_string()
    }
}

/// Formats seconds as `1d 2h 03m 04s`, leaving out the days when there are none.
pub fn format_uptime(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let hours = total_seconds / 3_600 % 24;
    let minutes = total_seconds / 60 % 60;
    let seconds = total_seconds % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes:02}m {seconds:02}s")
    } else {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    }
}
