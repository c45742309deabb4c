//! Motorola 6845 CRT Controller.
//!
//! The 6845 owns display timing: it drives horizontal and vertical sync,
//! display-enable, cursor, and the 14-bit refresh address fed to the video
//! data path every character clock. It has no opinion about pixels; that is
//! the Video ULA's job downstream of [`tick`](Crtc6845::tick).
//!
//! Registers are addressed with the usual two-step protocol: an even offset
//! selects one of 18 registers (5-bit index), an odd offset reads or writes
//! the selected register.

#![allow(clippy::cast_possible_truncation)]

pub const R0_HTOTAL: u8 = 0;
pub const R1_HDISPLAYED: u8 = 1;
pub const R2_HSYNC_POS: u8 = 2;
pub const R3_SYNC_WIDTH: u8 = 3;
pub const R4_VTOTAL: u8 = 4;
pub const R5_VTOTAL_ADJ: u8 = 5;
pub const R6_VDISPLAYED: u8 = 6;
pub const R7_VSYNC_POS: u8 = 7;
pub const R8_INTERLACE: u8 = 8;
pub const R9_MAX_SCANLINE: u8 = 9;
pub const R10_CURSOR_START: u8 = 10;
pub const R11_CURSOR_END: u8 = 11;
pub const R12_START_ADDR_HI: u8 = 12;
pub const R13_START_ADDR_LO: u8 = 13;
pub const R14_CURSOR_HI: u8 = 14;
pub const R15_CURSOR_LO: u8 = 15;
pub const R16_LIGHTPEN_HI: u8 = 16;
pub const R17_LIGHTPEN_LO: u8 = 17;

/// Blink mode selected by R10 bits 5-6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorBlink {
    Steady,
    Off,
    FastBlink,
    SlowBlink,
}

impl CursorBlink {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Steady,
            1 => Self::Off,
            2 => Self::FastBlink,
            _ => Self::SlowBlink,
        }
    }

    /// Whether the cursor is lit on the given frame, for blinking modes.
    fn visible(self, frame: u32) -> bool {
        match self {
            Self::Steady => true,
            Self::Off => false,
            Self::FastBlink => (frame / 16) % 2 == 0,
            Self::SlowBlink => (frame / 32) % 2 == 0,
        }
    }
}

/// Per-cycle output record produced by [`Crtc6845::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrtcOutput {
    /// 14-bit refresh address driven to the video data path.
    pub address: u16,
    /// Raster line within the current character row (0..=R9).
    pub raster: u8,
    pub hsync: bool,
    pub vsync: bool,
    pub display: bool,
    pub cursor: bool,
}

/// Motorola 6845 CRT Controller.
pub struct Crtc6845 {
    registers: [u8; 18],
    address_register: u8,

    hc: u16,
    raster: u8,
    row: u8,
    in_vadj: bool,
    vadj_remaining: u8,

    line_start: u16,
    address: u16,

    hsync_remaining: u8,
    vsync_remaining: u8,

    frame_counter: u32,
}

impl Crtc6845 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registers: [0; 18],
            address_register: 0,
            hc: 0,
            raster: 0,
            row: 0,
            in_vadj: false,
            vadj_remaining: 0,
            line_start: 0,
            address: 0,
            hsync_remaining: 0,
            vsync_remaining: 0,
            frame_counter: 0,
        }
    }

    /// Read the register-select/data pair at the given offset (offset & 1).
    #[must_use]
    pub fn read(&self, offset: u16) -> u8 {
        if offset & 1 != 0 && (self.address_register as usize) < 18 {
            self.registers[self.address_register as usize]
        } else {
            0x00
        }
    }

    /// Write the register-select/data pair at the given offset (offset & 1).
    pub fn write(&mut self, offset: u16, value: u8) {
        if offset & 1 == 0 {
            self.address_register = value & 0x1F;
        } else if (self.address_register as usize) < 18 {
            self.registers[self.address_register as usize] = value;
        }
    }

    #[must_use]
    pub fn reg(&self, index: u8) -> u8 {
        if (index as usize) < 18 {
            self.registers[index as usize]
        } else {
            0
        }
    }

    #[must_use]
    pub fn screen_start(&self) -> u16 {
        (u16::from(self.reg(R12_START_ADDR_HI) & 0x3F) << 8) | u16::from(self.reg(R13_START_ADDR_LO))
    }

    #[must_use]
    pub fn cursor_position(&self) -> u16 {
        (u16::from(self.reg(R14_CURSOR_HI) & 0x3F) << 8) | u16::from(self.reg(R15_CURSOR_LO))
    }

    #[must_use]
    pub fn max_scanline(&self) -> u8 {
        self.reg(R9_MAX_SCANLINE) & 0x1F
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advance by one character clock (rate set externally, see the Video
    /// ULA's fast-mode bit) and return the sync/display/cursor/address state
    /// for this cycle.
    pub fn tick(&mut self) -> CrtcOutput {
        let htotal = self.reg(R0_HTOTAL);
        let hdisplayed = self.reg(R1_HDISPLAYED);
        let hsync_pos = self.reg(R2_HSYNC_POS);
        let sync_width = self.reg(R3_SYNC_WIDTH);
        let hsync_width = sync_width & 0x0F;
        let vsync_width = (sync_width >> 4) & 0x0F;
        let vtotal = self.reg(R4_VTOTAL) & 0x7F;
        let vtotal_adj = self.reg(R5_VTOTAL_ADJ) & 0x1F;
        let vdisplayed = self.reg(R6_VDISPLAYED) & 0x7F;
        let vsync_pos = self.reg(R7_VSYNC_POS) & 0x7F;
        let max_scanline = self.max_scanline();
        let cursor_start = self.reg(R10_CURSOR_START);
        let cursor_end = self.reg(R11_CURSOR_END) & 0x1F;

        if self.hc == 0 {
            self.address = self.line_start;
            if self.row == vsync_pos && self.raster == 0 && vsync_width > 0 {
                self.vsync_remaining = vsync_width;
            }
        }
        if u16::from(self.hc) == u16::from(hsync_pos) && hsync_width > 0 {
            self.hsync_remaining = hsync_width;
        }

        let v_display = !self.in_vadj && self.row < vdisplayed;
        let display = (self.hc as u8) < hdisplayed && v_display;
        let hsync = self.hsync_remaining > 0;
        let vsync = self.vsync_remaining > 0;

        let cursor_disabled = cursor_start & 0x60 == 0x20;
        let blink = CursorBlink::from_bits(cursor_start >> 5);
        let raster_in_cursor_band = self.raster >= (cursor_start & 0x1F) && self.raster <= cursor_end;
        let cursor = display
            && !cursor_disabled
            && raster_in_cursor_band
            && self.address == self.cursor_position()
            && blink.visible(self.frame_counter);

        let out = CrtcOutput { address: self.address & 0x3FFF, raster: self.raster, hsync, vsync, display, cursor };

        // Advance to next character.
        self.address = self.address.wrapping_add(1) & 0x3FFF;
        if self.hsync_remaining > 0 {
            self.hsync_remaining -= 1;
        }

        if self.hc >= u16::from(htotal) {
            self.hc = 0;
            self.advance_scanline(max_scanline, vtotal, vtotal_adj);
            if self.vsync_remaining > 0 {
                self.vsync_remaining -= 1;
            }
        } else {
            self.hc += 1;
        }

        out
    }

    fn advance_scanline(&mut self, max_scanline: u8, vtotal: u8, vtotal_adj: u8) {
        if self.in_vadj {
            if self.vadj_remaining == 0 {
                self.in_vadj = false;
                self.row = 0;
                self.raster = 0;
                self.line_start = self.screen_start();
                self.address = self.line_start;
                self.frame_counter = self.frame_counter.wrapping_add(1);
            } else {
                self.vadj_remaining -= 1;
            }
            return;
        }

        if self.raster >= max_scanline {
            self.raster = 0;
            if self.row >= vtotal {
                if vtotal_adj > 0 {
                    self.in_vadj = true;
                    self.vadj_remaining = vtotal_adj - 1;
                } else {
                    self.row = 0;
                    self.line_start = self.screen_start();
                    self.address = self.line_start;
                    self.frame_counter = self.frame_counter.wrapping_add(1);
                }
            } else {
                self.row += 1;
                self.line_start = self.line_start.wrapping_add(u16::from(self.reg(R1_HDISPLAYED))) & 0x3FFF;
            }
        } else {
            self.raster += 1;
        }
    }
}

impl Default for Crtc6845 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configure_text_mode(crtc: &mut Crtc6845) {
        let regs: [(u8, u8); 10] = [
            (R0_HTOTAL, 63),
            (R1_HDISPLAYED, 40),
            (R2_HSYNC_POS, 48),
            (R3_SYNC_WIDTH, 0x28), // hsync width 8, vsync width 2
            (R4_VTOTAL, 30),
            (R5_VTOTAL_ADJ, 0),
            (R6_VDISPLAYED, 25),
            (R7_VSYNC_POS, 27),
            (R9_MAX_SCANLINE, 7),
            (R12_START_ADDR_HI, 0x30),
        ];
        for (reg, val) in regs {
            crtc.write(0, reg);
            crtc.write(1, val);
        }
    }

    fn run_ticks(crtc: &mut Crtc6845, n: usize) -> Vec<CrtcOutput> {
        (0..n).map(|_| crtc.tick()).collect()
    }

    #[test]
    fn register_select_two_step_protocol() {
        let mut crtc = Crtc6845::new();
        crtc.write(0, R1_HDISPLAYED);
        crtc.write(1, 40);
        assert_eq!(crtc.reg(R1_HDISPLAYED), 40);
        crtc.write(0, R1_HDISPLAYED);
        assert_eq!(crtc.read(1), 40);
        assert_eq!(crtc.read(0), 0);
    }

    #[test]
    fn display_true_for_exactly_hdisplayed_characters() {
        let mut crtc = Crtc6845::new();
        configure_text_mode(&mut crtc);
        let outs = run_ticks(&mut crtc, 64);
        let displayed = outs.iter().filter(|o| o.display).count();
        assert_eq!(displayed, 40);
    }

    #[test]
    fn hsync_spans_low_nibble_of_r3() {
        let mut crtc = Crtc6845::new();
        configure_text_mode(&mut crtc);
        let outs = run_ticks(&mut crtc, 64);
        let hsync_count = outs.iter().filter(|o| o.hsync).count();
        assert_eq!(hsync_count, 8);
        assert!(outs[48].hsync);
    }

    #[test]
    fn vsync_spans_high_nibble_of_r3_scanlines() {
        let mut crtc = Crtc6845::new();
        configure_text_mode(&mut crtc);
        // Run to vsync row (row 27), scanline 0 onward.
        let total_chars_per_row = 64;
        run_ticks(&mut crtc, total_chars_per_row * 27 * 8);
        let outs = run_ticks(&mut crtc, total_chars_per_row * 2);
        let vsync_count = outs.iter().filter(|o| o.vsync).count();
        assert_eq!(vsync_count, total_chars_per_row * 2);
    }

    #[test]
    fn refresh_address_advances_by_r1_per_row() {
        let mut crtc = Crtc6845::new();
        configure_text_mode(&mut crtc);
        let start = crtc.screen_start();
        run_ticks(&mut crtc, 64 * 8); // one full character row
        let out = crtc.tick();
        assert_eq!(out.address, (start + 40) & 0x3FFF);
    }
}
