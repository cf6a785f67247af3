//! Live hop table on the console.

use std::io::{self, IsTerminal, Stdout, Write};

use colored::*;
use crossterm::cursor::MoveToPreviousLine;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use tcproute_core::aggregator::{HopRecord, HopTable, RenderHook};
use tracing::debug;

use crate::terminal::colors;

const UNKNOWN_ADDRESS: &str = "???";
const NO_LATENCY: &str = "*   ";

/// Draws the rows up to the highest contiguous position with a result.
///
/// On a terminal the table is redrawn in place after each update. Otherwise
/// rows are appended once their lookups have finished.
pub struct ConsoleRenderer<W: Write + Send + 'static> {
    out: W,
    redraw: bool,
    drawn: usize,
}

impl ConsoleRenderer<Stdout> {
    pub fn stdout() -> Self {
        let out = io::stdout();
        let redraw = out.is_terminal();
        Self::new(out, redraw)
    }
}

impl<W: Write + Send + 'static> ConsoleRenderer<W> {
    pub fn new(out: W, redraw: bool) -> Self {
        Self { out, redraw, drawn: 0 }
    }

    fn draw(&mut self, table: &HopTable) -> io::Result<()> {
        let rows = render_rows(table);

        if self.redraw {
            if self.drawn > 0 {
                let up = u16::try_from(self.drawn).unwrap_or(u16::MAX);
                queue!(self.out, MoveToPreviousLine(up), Clear(ClearType::FromCursorDown))?;
            }
            for row in &rows {
                writeln!(self.out, "{row}")?;
            }
            self.drawn = rows.len();
        } else {
            let ready = table
                .hops()
                .iter()
                .take(rows.len())
                .take_while(|hop| hop.lookups_complete() || table.is_completed())
                .count();
            for row in rows.iter().take(ready).skip(self.drawn) {
                writeln!(self.out, "{row}")?;
            }
            self.drawn = self.drawn.max(ready);
        }

        self.out.flush()
    }
}

impl<W: Write + Send + 'static> RenderHook for ConsoleRenderer<W> {
    fn on_update(&mut self, table: &HopTable) {
        if let Err(e) = self.draw(table) {
            debug!("Could not draw hop table: {e}");
        }
    }
}

pub fn render_rows(table: &HopTable) -> Vec<String> {
    let count = table.highest_contiguous_complete_position();
    let hops = &table.hops()[..count];
    let addresses: Vec<String> = hops.iter().map(|hop| address_label(table, hop)).collect();
    let width = addresses.iter().map(|a| a.chars().count()).max().unwrap_or(0);

    hops.iter()
        .zip(addresses)
        .map(|(hop, address)| {
            let address = format!("{address:<width$}");
            let address = if hop.ip().is_some() {
                address.color(colors::TEXT_DEFAULT)
            } else {
                address.color(colors::UNRESOLVED)
            };
            let row = format!(
                "{:>3} {:>8}  {} {}",
                hop.position,
                latency_label(hop),
                address,
                location_label(table, hop)
            );
            row.trim_end().to_string()
        })
        .collect()
}

fn latency_label(hop: &HopRecord) -> String {
    match hop.mean_latency() {
        Some(latency) => format!("{} ms", latency.as_millis()),
        None => NO_LATENCY.to_string(),
    }
}

fn address_label(table: &HopTable, hop: &HopRecord) -> String {
    match hop.ip() {
        Some(ip) => match table.name(&ip) {
            Some(name) => format!("{name} [{ip}]"),
            None => ip.to_string(),
        },
        None => UNKNOWN_ADDRESS.to_string(),
    }
}

fn location_label(table: &HopTable, hop: &HopRecord) -> String {
    hop.ip()
        .and_then(|ip| table.location(&ip))
        .and_then(|location| location.label())
        .map(|label| format!("({label})"))
        .unwrap_or_default()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
