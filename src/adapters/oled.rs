//! SSD1306 128x64 OLED over I²C.
//!
//! [`RowWriter`] for the status panel: 8 text rows of 5x8 glyphs.  Rows are
//! drawn into the driver's frame buffer and pushed on
//! [`flush`](RowWriter::flush), so one redraw costs a single bus transfer.

use embedded_graphics::mono_font::ascii::FONT_5X8;
use embedded_graphics::mono_font::{MonoTextStyle, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use log::{info, warn};
use ssd1306::I2CDisplayInterface;
use ssd1306::Ssd1306;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;

use super::display::{ROWS, RowWriter};
use crate::app::ports::PortError;
use crate::error::{Error, Result};

const PANEL_WIDTH: u32 = 128;
const CELL_WIDTH: i32 = 6;
const ROW_HEIGHT: u32 = 8;

type Panel<I2C> =
    Ssd1306<I2CInterface<I2C>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

pub struct OledRows<I2C> {
    panel: Panel<I2C>,
    style: MonoTextStyle<'static, BinaryColor>,
}

impl<I2C> OledRows<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    /// Initialise the controller and blank the screen.
    pub fn new(i2c: I2C) -> Result<Self> {
        let interface = I2CDisplayInterface::new(i2c);
        let mut panel = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        panel.init().map_err(|e| {
            warn!("OLED: init failed: {:?}", e);
            Error::Init("ssd1306 init")
        })?;
        panel.clear_buffer();
        panel.flush().map_err(|_| Error::Init("ssd1306 flush"))?;
        info!("OLED: 128x64 panel ready");

        let style = MonoTextStyleBuilder::new()
            .font(&FONT_5X8)
            .text_color(BinaryColor::On)
            .background_color(BinaryColor::Off)
            .build();
        Ok(Self { panel, style })
    }
}

impl<I2C> RowWriter for OledRows<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    fn write_row(&mut self, row: u8, col: u8, text: &str) -> core::result::Result<(), PortError> {
        if row >= ROWS {
            return Err(PortError::Rejected);
        }
        let x = i32::from(col) * CELL_WIDTH;
        let y = i32::from(row) * ROW_HEIGHT as i32;

        let blank_width = PANEL_WIDTH.saturating_sub(x as u32);
        Rectangle::new(Point::new(x, y), Size::new(blank_width, ROW_HEIGHT))
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::Off))
            .draw(&mut self.panel)
            .map_err(|_| PortError::Io)?;
        Text::with_baseline(text, Point::new(x, y), self.style, Baseline::Top)
            .draw(&mut self.panel)
            .map_err(|_| PortError::Io)?;
        Ok(())
    }

    fn flush(&mut self) -> core::result::Result<(), PortError> {
        self.panel.flush().map_err(|_| PortError::Io)
    }
}
