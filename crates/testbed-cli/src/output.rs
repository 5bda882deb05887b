//! Output formatting for the testbed tools (table, json)

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};
use testbed_attack::{Attack, SniffRow};
use testbed_core::MessageDef;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print data in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    println!("{}", Table::new(data));
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
        }
    }
}

/// One attack in the catalogue listing
#[derive(Debug, Tabled, Serialize)]
pub struct AttackRow {
    #[tabled(rename = "Attack")]
    pub name: &'static str,
    #[tabled(rename = "Description")]
    pub description: &'static str,
}

impl From<Attack> for AttackRow {
    fn from(attack: Attack) -> Self {
        Self {
            name: attack.name(),
            description: attack.description(),
        }
    }
}

/// One known arbitration id
#[derive(Debug, Tabled, Serialize)]
pub struct MessageRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: &'static str,
    #[tabled(rename = "Bus")]
    pub bus: String,
    #[tabled(rename = "Rate")]
    pub rate: String,
}

impl From<&MessageDef> for MessageRow {
    fn from(def: &MessageDef) -> Self {
        Self {
            id: format!("{:#05x}", def.id),
            name: def.name,
            bus: def.bus.to_string(),
            rate: def.rate.to_string(),
        }
    }
}

/// Captured frame as a table row
#[derive(Debug, Tabled, Serialize)]
pub struct SniffLine {
    #[tabled(rename = "#")]
    pub sequence: u64,
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: &'static str,
    #[tabled(rename = "Len")]
    pub len: usize,
    #[tabled(rename = "Data")]
    pub data: String,
}

impl SniffLine {
    /// `full` shows the whole payload instead of the preview
    pub fn from_row(row: &SniffRow, full: bool) -> Self {
        Self {
            sequence: row.sequence,
            id: row.id_hex(),
            name: row.name,
            len: row.len,
            data: if full {
                row.data_full.clone()
            } else {
                row.data_preview.clone()
            },
        }
    }

    /// Single streaming line, unknown ids dimmed
    pub fn render(&self) -> String {
        let line = format!(
            "{:>6}  {:<6} {:<28} {:>2}  {}",
            self.sequence, self.id, self.name, self.len, self.data
        );
        if self.name == testbed_core::UNKNOWN_ID {
            line.dimmed().to_string()
        } else {
            line
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use testbed_core::{CanFrame, MessageRegistry};

    #[test]
    fn sniff_line_preview_and_full() {
        colored::control::set_override(false);
        let frame = CanFrame::new(0x1A, &[0x00, 0x64, 0, 0, 0, 0, 0, 0]).unwrap();
        let row = SniffRow::from_frame(3, &frame);

        let short = SniffLine::from_row(&row, false);
        assert_eq!(short.id, "0x1a");
        assert_eq!(short.data, "00 64");

        let full = SniffLine::from_row(&row, true);
        assert_eq!(full.data, "00 64 00 00 00 00 00 00");
        assert!(full.render().contains("BRAKE_OPERATION_MSG"));
    }

    #[test]
    fn message_rows_cover_registry() {
        let rows: Vec<MessageRow> = MessageRegistry::global().iter().map(MessageRow::from).collect();
        assert_eq!(rows.len(), MessageRegistry::global().len());
        assert!(rows.iter().any(|r| r.id == "0x043" && r.name == "ENGINE_RPM_MSG"));
    }

    #[test]
    fn attack_rows_use_kebab_names() {
        let rows: Vec<AttackRow> = Attack::ALL.into_iter().map(AttackRow::from).collect();
        assert_eq!(rows[2].name, "engine-off");
        assert_eq!(rows.len(), 9);
    }
}
