use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use scriptwire_channel::ChannelStats;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

/// One answered request, as printed by `call` and `eval`.
#[derive(Serialize)]
pub struct ReplyOutput<'a> {
    pub request: &'a str,
    pub defined: bool,
    pub value: Option<&'a Value>,
    pub stats: ChannelStats,
}

impl<'a> ReplyOutput<'a> {
    pub fn new(request: &'a str, value: Option<&'a Value>, stats: ChannelStats) -> Self {
        Self {
            request,
            defined: value.is_some(),
            value,
            stats,
        }
    }
}

pub fn print_reply(out: &ReplyOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["REQUEST", "VALUE", "SENT", "RECEIVED"])
                .add_row(vec![
                    out.request.to_string(),
                    render_value(out.value),
                    out.stats.sent.to_string(),
                    out.stats.received.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "request={} value={} sent={} received={}",
                out.request,
                render_value(out.value),
                out.stats.sent,
                out.stats.received
            );
        }
        OutputFormat::Raw => {
            print_raw(render_value(out.value).as_bytes());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Reply text as it appeared on the wire: JSON, or `undefined`.
pub fn render_value(value: Option<&Value>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "undefined".to_string(),
    }
}
