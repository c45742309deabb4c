//! Video ULA (Uncommitted Logic Array).
//!
//! Maps logical screen-memory bytes to physical pixels for the bitmap modes
//! (0-6). Mode 7 (teletext) is a pass-through: [`VideoUla::emit_pixels`]
//! tags the batch and leaves pixel generation to the SAA5050.
//!
//! Registers live at 0xFE20-0xFE2F, mirrored every 2 bytes:
//!   offset & 1 == 0: control register (write-only)
//!   offset & 1 == 1: palette register (write-only)
//! Reads of either offset return 0xFE.

use crate::pixel_batch::{bbc_colors, PixelBatch, PixelBatchType, VideoDataPixel};

const CTRL_FLASH: u8 = 0x01;
const CTRL_TELETEXT: u8 = 0x02;
const CTRL_FAST_CLOCK: u8 = 0x10;

/// Video ULA. Owns the palette lookup table and the in-flight screen byte.
pub struct VideoUla {
    control: u8,
    palette: [u8; 16],
    output_palette: [VideoDataPixel; 16],
    work_byte: u8,
    cursor_pattern: u8,
}

impl VideoUla {
    #[must_use]
    pub fn new() -> Self {
        Self {
            control: 0,
            palette: [0; 16],
            output_palette: [VideoDataPixel::default(); 16],
            work_byte: 0,
            cursor_pattern: 0,
        }
    }

    #[must_use]
    pub fn read(&self, _offset: u16) -> u8 {
        0xFE
    }

    pub fn write(&mut self, offset: u16, value: u8) {
        if offset & 1 != 0 {
            let index = usize::from((value >> 4) & 0x0F);
            let physical = (value & 0x0F) ^ 0x07;
            self.palette[index] = physical;
            self.output_palette[index] = bbc_colors::PALETTE[usize::from(physical & 0x07)];
        } else {
            self.control = value;
        }
    }

    /// Latch a byte read from video memory; `cursor_active` is the CRTC's
    /// cursor output for this character position.
    pub fn byte(&mut self, data: u8, cursor_active: bool) {
        self.work_byte = data;
        self.cursor_pattern = if cursor_active { self.cursor_width_pattern() } else { 0 };
    }

    /// Fill `batch` with 8 pixels derived from the current mode and the
    /// latched screen byte. No-op (batch left tagged `Teletext`) in mode 7.
    pub fn emit_pixels(&mut self, batch: &mut PixelBatch) {
        if self.teletext_mode() {
            batch.set_type(PixelBatchType::Teletext);
            return;
        }

        batch.set_type(PixelBatchType::Bitmap);

        let lw = self.line_width_mode();
        if self.fast_clock() {
            match lw {
                3 => self.emit_n(batch, 8, 1),
                2 => self.emit_n(batch, 4, 2),
                1 => self.emit_n(batch, 2, 4),
                _ => Self::emit_blank(batch),
            }
        } else {
            match lw {
                3 => self.emit_n(batch, 4, 2),
                2 => self.emit_n(batch, 2, 4),
                1 => self.emit_n(batch, 1, 8),
                _ => Self::emit_blank(batch),
            }
        }

        if self.cursor_pattern & 1 != 0 {
            batch.invert_all();
        }
        self.cursor_pattern >>= if self.fast_clock() { 2 } else { 1 };
    }

    fn emit_blank(batch: &mut PixelBatch) {
        batch.set_type(PixelBatchType::Nothing);
        batch.clear();
    }

    /// Emit `count` distinct pixels from the work byte, each replicated
    /// `replication` times to fill all 8 output slots.
    fn emit_n(&mut self, batch: &mut PixelBatch, count: usize, replication: usize) {
        for i in 0..count {
            let idx = self.shift_pixel();
            let pixel = self.get_pixel(idx);
            for r in 0..replication {
                batch.pixels[i * replication + r] = pixel;
            }
        }
    }

    #[must_use]
    pub fn flash_select(&self) -> bool {
        self.control & CTRL_FLASH != 0
    }

    #[must_use]
    pub fn teletext_mode(&self) -> bool {
        self.control & CTRL_TELETEXT != 0
    }

    #[must_use]
    pub fn fast_clock(&self) -> bool {
        self.control & CTRL_FAST_CLOCK != 0
    }

    #[must_use]
    pub fn line_width_mode(&self) -> u8 {
        (self.control >> 2) & 0x03
    }

    #[must_use]
    pub fn cursor_width_bits(&self) -> u8 {
        (self.control >> 5) & 0x07
    }

    #[must_use]
    pub fn palette(&self, index: u8) -> u8 {
        self.palette.get(usize::from(index)).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn output_palette(&self, index: u8) -> VideoDataPixel {
        self.output_palette.get(usize::from(index)).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn control(&self) -> u8 {
        self.control
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Extract the 4-bit logical colour index from the current work byte
    /// using the BBC's interleaved bit layout, then shift the byte left.
    fn shift_pixel(&mut self) -> u8 {
        let index = ((self.work_byte >> 4) & 8)
            | ((self.work_byte >> 3) & 4)
            | ((self.work_byte >> 2) & 2)
            | ((self.work_byte >> 1) & 1);
        self.work_byte = (self.work_byte << 1) | 1;
        index
    }

    fn get_pixel(&self, logical_index: u8) -> VideoDataPixel {
        self.output_palette[usize::from(logical_index & 0x0F)]
    }

    fn cursor_width_pattern(&self) -> u8 {
        match self.cursor_width_bits() {
            0 => 0x00,
            1 => 0x01,
            2 => 0x03,
            3 => 0x0F,
            _ => 0xFF,
        }
    }
}

impl Default for VideoUla {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_always_return_0xfe() {
        let ula = VideoUla::new();
        assert_eq!(ula.read(0), 0xFE);
        assert_eq!(ula.read(1), 0xFE);
    }

    #[test]
    fn palette_write_xors_physical_with_seven() {
        let mut ula = VideoUla::new();
        ula.write(1, 0x30); // logical 3 -> physical (0^7)=7
        assert_eq!(ula.palette(3), 7);
        assert_eq!(ula.output_palette(3), bbc_colors::WHITE);
    }

    #[test]
    fn mode0_emits_eight_distinct_pixels_unreplicated() {
        let mut ula = VideoUla::new();
        // Mode 0: fast clock, line width 3.
        ula.write(0, 0x1C);
        for i in 0..8u8 {
            ula.write(1, (i << 4) | (i ^ 0x07));
        }
        ula.byte(0xFF, false);
        let mut batch = PixelBatch::blank();
        ula.emit_pixels(&mut batch);
        assert_eq!(batch.batch_type(), PixelBatchType::Bitmap);
        // All bits set -> every pixel is logical index 15.
        assert_eq!(batch.pixels[0], ula.output_palette(15));
        assert_eq!(batch.pixels[7], ula.output_palette(15));
    }

    #[test]
    fn mode2_replicates_each_pixel_four_times() {
        let mut ula = VideoUla::new();
        // Mode 2: fast clock, line width 1.
        ula.write(0, 0x14);
        ula.byte(0b1010_0000, false);
        let mut batch = PixelBatch::blank();
        ula.emit_pixels(&mut batch);
        assert_eq!(batch.pixels[0], batch.pixels[1]);
        assert_eq!(batch.pixels[1], batch.pixels[2]);
        assert_eq!(batch.pixels[2], batch.pixels[3]);
    }

    #[test]
    fn teletext_mode_leaves_pixels_untouched() {
        let mut ula = VideoUla::new();
        ula.write(0, CTRL_TELETEXT);
        let mut batch = PixelBatch::blank();
        batch.fill(bbc_colors::RED);
        ula.emit_pixels(&mut batch);
        assert_eq!(batch.batch_type(), PixelBatchType::Teletext);
        assert_eq!(batch.pixels[4], bbc_colors::RED);
    }

    #[test]
    fn active_cursor_inverts_every_pixel() {
        let mut ula = VideoUla::new();
        ula.write(0, 0x3C); // mode 0 + cursor width bits = 1 (one byte wide)
        ula.byte(0x00, true);
        let mut batch = PixelBatch::blank();
        ula.emit_pixels(&mut batch);
        // Logical index 0 with no palette writes maps to physical 0 (black),
        // so after inversion every pixel should be white (0x0FFF).
        assert_eq!(batch.pixels[0].0, 0x0FFF);
    }
}
