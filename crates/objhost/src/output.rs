use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use objhost_registry::{pid_alive, RegistryEntry};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EntryOutput<'a> {
    name: &'a str,
    owner_pid: u32,
    alive: bool,
    created_at: u64,
    endpoint: String,
}

pub fn print_entries(entries: &[RegistryEntry], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let rows: Vec<EntryOutput<'_>> = entries.iter().map(entry_output).collect();
            println!(
                "{}",
                serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NAME", "PID", "ALIVE", "AGE", "ENDPOINT"]);
            for entry in entries {
                table.add_row(vec![
                    entry.name.clone(),
                    entry.owner_pid.to_string(),
                    pid_alive(entry.owner_pid).to_string(),
                    age(entry.created_at),
                    entry.endpoint.display().to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for entry in entries {
                println!(
                    "{} pid={} alive={} age={} endpoint={}",
                    entry.name,
                    entry.owner_pid,
                    pid_alive(entry.owner_pid),
                    age(entry.created_at),
                    entry.endpoint.display()
                );
            }
        }
    }
}

pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
        ),
        OutputFormat::Table | OutputFormat::Pretty => println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
        ),
    }
}

fn entry_output(entry: &RegistryEntry) -> EntryOutput<'_> {
    EntryOutput {
        name: &entry.name,
        owner_pid: entry.owner_pid,
        alive: pid_alive(entry.owner_pid),
        created_at: entry.created_at,
        endpoint: entry.endpoint.display().to_string(),
    }
}

fn age(created_at: u64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let seconds = now.saturating_sub(created_at);
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 3600 {
        return format!("{}m{}s", seconds / 60, seconds % 60);
    }
    format!("{}h{}m", seconds / 3600, (seconds % 3600) / 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_formatting() {
        assert_eq!(age(u64::MAX), "0s");
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert_eq!(age(now - 42), "42s");
        assert_eq!(age(now - 192), "3m12s");
        assert_eq!(age(now - 3900), "1h5m");
    }
}
