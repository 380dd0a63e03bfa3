//! Row-oriented status screen.
//!
//! Implements [`DisplayPort`] on top of any [`RowWriter`], a character
//! grid that can overwrite the tail of one row.  Each status field owns one
//! row, in mask bit order:
//!
//! ```text
//!   col 0     6
//!   ┌─────────────────────┐
//! 0 │SSID  HomeNet        │
//! 1 │STAT  Online         │
//! 2 │IP    192.168.1.40   │
//! 3 │DATE  2024-03-01     │
//! 4 │TIME  12:00:05       │
//! 5 │NOW  >420 W          │
//! 6 │TODAY 1337 Wh        │
//! 7 │HEAP  187392 B       │
//!   └─────────────────────┘
//! ```
//!
//! Titles are painted once, with a `?` placeholder, on the first redraw.
//! Afterwards only the data column of dirty rows is rewritten.  The
//! highlighted metric carries a `>` marker in the last title column.

use core::fmt::Write as _;
use log::{debug, info};

use crate::app::ports::{DisplayPort, PortError};
use crate::display::{DisplayField, DisplayFieldMask, DisplayMetric, DisplayValues};

/// Characters per row (5x8 glyphs on a 6 px advance across 128 px).
pub const COLUMNS: usize = 21;
/// Rows on the panel.
pub const ROWS: u8 = 8;
/// First column of the data area.
pub const DATA_COLUMN: u8 = 6;
/// Characters available to a value.
pub const DATA_WIDTH: usize = COLUMNS - DATA_COLUMN as usize;

/// Placeholder for values not known yet.
pub const UNKNOWN: &str = "?";

/// Text of one row segment.
pub type RowText = heapless::String<COLUMNS>;

/// A character-cell screen.
pub trait RowWriter {
    /// Write `text` starting at `col` and blank the remainder of `row`.
    fn write_row(&mut self, row: u8, col: u8, text: &str) -> Result<(), PortError>;

    /// Push buffered changes to the panel.
    fn flush(&mut self) -> Result<(), PortError> {
        Ok(())
    }
}

/// Row occupied by `field`.
pub const fn row_of(field: DisplayField) -> u8 {
    field.mask().trailing_zeros() as u8
}

fn title_of(field: DisplayField) -> &'static str {
    match field {
        DisplayField::Ssid => "SSID",
        DisplayField::Status => "STAT",
        DisplayField::Ip => "IP",
        DisplayField::Date => "DATE",
        DisplayField::Time => "TIME",
        DisplayField::Now => "NOW",
        DisplayField::Today => "TODAY",
        DisplayField::Heap => "HEAP",
    }
}

fn highlighted(field: DisplayField, metric: DisplayMetric) -> bool {
    matches!(
        (field, metric),
        (DisplayField::Now, DisplayMetric::Live) | (DisplayField::Today, DisplayMetric::Today)
    )
}

/// Formatter sink that silently drops whatever does not fit.
struct Clip<'a, const N: usize> {
    out: &'a mut heapless::String<N>,
    limit: usize,
}

impl<const N: usize> core::fmt::Write for Clip<'_, N> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            if self.out.len() + c.len_utf8() > self.limit || self.out.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Render the data column of one field, cut to [`DATA_WIDTH`].
pub fn format_field(field: DisplayField, values: &DisplayValues) -> RowText {
    let mut out = RowText::new();
    let mut w = Clip {
        out: &mut out,
        limit: DATA_WIDTH,
    };
    // Clip never fails.
    let _ = match field {
        DisplayField::Ssid if values.ssid.is_empty() => w.write_str(UNKNOWN),
        DisplayField::Ssid => w.write_str(&values.ssid),
        DisplayField::Status => w.write_str(values.status),
        DisplayField::Ip => match values.ip {
            Some([a, b, c, d]) => write!(w, "{}.{}.{}.{}", a, b, c, d),
            None => w.write_str(UNKNOWN),
        },
        DisplayField::Date => match values.local_time {
            Some(t) => write!(w, "{:04}-{:02}-{:02}", t.year, t.month, t.day),
            None => w.write_str(UNKNOWN),
        },
        DisplayField::Time => match values.local_time {
            Some(t) => write!(w, "{:02}:{:02}:{:02}", t.hour, t.minute, t.second),
            None => w.write_str(UNKNOWN),
        },
        DisplayField::Now => write!(w, "{} W", values.now_watts),
        DisplayField::Today => write!(w, "{} Wh", values.today_wh),
        DisplayField::Heap if values.heap_free == 0 => w.write_str(UNKNOWN),
        DisplayField::Heap => write!(w, "{} B", values.heap_free),
    };
    out
}

/// Title column of one field, `>`-marked when it is the highlighted metric.
pub fn format_title(field: DisplayField, metric: DisplayMetric) -> RowText {
    let mut out = RowText::new();
    let mut w = Clip {
        out: &mut out,
        limit: DATA_COLUMN as usize - 1,
    };
    let _ = write!(w, "{:<5}", title_of(field));
    let marker = if highlighted(field, metric) { '>' } else { ' ' };
    let _ = out.push(marker);
    out
}

// ───────────────────────────────────────────────────────────────
// RowDisplay
// ───────────────────────────────────────────────────────────────

pub struct RowDisplay<W: RowWriter> {
    writer: W,
    titles_drawn: bool,
    shown_metric: Option<DisplayMetric>,
}

impl<W: RowWriter> RowDisplay<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            titles_drawn: false,
            shown_metric: None,
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Paint every title with a placeholder value.
    fn draw_titles(&mut self, metric: DisplayMetric) -> Result<(), PortError> {
        for field in DisplayField::ALL {
            let mut line = format_title(field, metric);
            let _ = line.push_str(UNKNOWN);
            self.writer.write_row(row_of(field), 0, &line)?;
        }
        self.titles_drawn = true;
        self.shown_metric = Some(metric);
        Ok(())
    }

    fn draw_field(&mut self, field: DisplayField, values: &DisplayValues) -> Result<(), PortError> {
        let mut line = format_title(field, values.metric);
        // Title (6) plus a clipped value always fits the row.
        let _ = line.push_str(&format_field(field, values));
        self.writer.write_row(row_of(field), 0, &line)
    }
}

impl<W: RowWriter> DisplayPort for RowDisplay<W> {
    fn redraw(
        &mut self,
        dirty: DisplayFieldMask,
        values: &DisplayValues,
    ) -> Result<DisplayFieldMask, PortError> {
        if !self.titles_drawn {
            self.draw_titles(values.metric)?;
        }

        let mut todo = dirty;
        // Moving the marker rewrites both metric rows.
        if self.shown_metric != Some(values.metric) {
            todo.insert(DisplayFieldMask::NOW | DisplayFieldMask::TODAY);
        }

        let mut drawn = DisplayFieldMask::EMPTY;
        for field in todo.fields() {
            self.draw_field(field, values)?;
            drawn.insert(field.into());
        }
        self.writer.flush()?;
        self.shown_metric = Some(values.metric);

        debug!("Display: redrew 0b{:08b}", drawn.bits());
        Ok(drawn)
    }
}

// ───────────────────────────────────────────────────────────────
// LogRows: serial console fallback when no panel is attached
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct LogRows;

impl RowWriter for LogRows {
    fn write_row(&mut self, row: u8, col: u8, text: &str) -> Result<(), PortError> {
        if row >= ROWS {
            return Err(PortError::Rejected);
        }
        info!("SCREEN | r{} c{} | {}", row, col, text);
        Ok(())
    }
}
