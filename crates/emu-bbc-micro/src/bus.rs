//! BBC Micro bus: routes CPU accesses to memory and the six I/O chips at
//! $FE00-$FE7F.
//!
//! Implements `emu_core::Bus`. The 6502 has no separate I/O address space,
//! so `io_read`/`io_write` are unused (open-bus $FF / discarded, matching
//! every other memory-mapped 8-bit system in this workspace).
//!
//! I/O region order (first match wins), each mirrored across its block:
//!   $FE00-$FE07 CRTC        (mirror every 8 bytes, offset & 1 selects reg/data)
//!   $FE20-$FE2F Video ULA   (mirror every 2 bytes)
//!   $FE30-$FE3F ROMSEL      (write-only)
//!   $FE40-$FE5F System VIA  (mirror every 16 bytes)
//!   $FE60-$FE7F User VIA    (mirror every 16 bytes)
//! Model B+ adds ACCCON at $FE34 inside the ROMSEL block.

use emu_core::{Bus, ReadResult};
use mos_via_6522::Via6522;
use motorola_6845::Crtc6845;

use std::cell::RefCell;
use std::rc::Rc;

use crate::keyboard::{KeyboardMatrix, SystemViaPeripheral};
use crate::memory::BbcMemory;
use bbc_video::{OutputQueue, PixelBatch, Saa5050, VideoUla};

pub struct BbcBus {
    pub memory: BbcMemory,
    pub crtc: Crtc6845,
    pub video_ula: VideoUla,
    pub saa5050: Saa5050,
    pub system_via: Via6522,
    pub user_via: Via6522,
    pub pixel_queue: OutputQueue<PixelBatch>,
    /// Shared with the System VIA's peripheral hook, which can't be reached
    /// directly through the `Box<dyn ViaPeripheral>` trait object.
    pub keyboard: Rc<RefCell<KeyboardMatrix>>,
    /// PC of the instruction currently executing, set by the machine before
    /// each CPU sub-cycle so memory paging can apply the shadow-RAM rule.
    pub current_pc: u16,
    /// CRTC hsync/vsync outputs as of the previous video tick, to find the
    /// edges that bound a teletext character row and a field.
    prev_hsync: bool,
    prev_vsync: bool,
}

impl BbcBus {
    #[must_use]
    pub fn new(memory: BbcMemory) -> Self {
        let keyboard = Rc::new(RefCell::new(KeyboardMatrix::new()));
        Self {
            memory,
            crtc: Crtc6845::new(),
            video_ula: VideoUla::new(),
            saa5050: Saa5050::new(),
            system_via: Via6522::with_peripheral(Box::new(SystemViaPeripheral::new(Rc::clone(&keyboard)))),
            user_via: Via6522::new(),
            pixel_queue: OutputQueue::with_default_capacity(),
            keyboard,
            current_pc: 0,
            prev_hsync: false,
            prev_vsync: false,
        }
    }

    /// Advance the video path (CRTC + ULA/SAA5050 + pixel queue) by one
    /// character clock. Called once or twice per CPU cycle depending on the
    /// Video ULA's fast-clock bit.
    ///
    /// Also drives the System VIA's CA1 input from CRTC vsync: on real
    /// hardware the 50 Hz field sync is wired straight to CA1, which is
    /// where the MOS's periodic interrupt comes from.
    pub fn tick_video(&mut self) {
        let out = self.crtc.tick();
        self.system_via.set_ca1_input(out.vsync);

        self.saa5050.set_raster(out.raster);
        if out.hsync && !self.prev_hsync {
            self.saa5050.end_of_line();
        } else if !out.hsync && self.prev_hsync {
            self.saa5050.start_of_line();
        }
        if out.vsync && !self.prev_vsync {
            self.saa5050.vsync();
        }
        self.prev_hsync = out.hsync;
        self.prev_vsync = out.vsync;

        let byte_addr = (((out.address as u32) << 3) | u32::from(out.raster)) as u16 & 0x7FFF;
        let screen_byte = if out.display { self.memory.video_read(byte_addr) } else { 0 };

        let mut batch = PixelBatch::blank();
        if self.video_ula.teletext_mode() {
            self.saa5050.byte(screen_byte, out.display, out.cursor);
            self.saa5050.emit_pixels(&mut batch, &bbc_video::bbc_colors::PALETTE);
        } else {
            self.video_ula.byte(screen_byte, out.cursor);
            self.video_ula.emit_pixels(&mut batch);
        }

        let mut flags = 0u8;
        if out.hsync {
            flags |= bbc_video::video_flag::HSYNC;
        }
        if out.vsync {
            flags |= bbc_video::video_flag::VSYNC;
        }
        if out.display {
            flags |= bbc_video::video_flag::DISPLAY;
        }
        batch.set_flags(flags);

        self.pixel_queue.push(batch);
    }
}

impl Bus for BbcBus {
    fn read(&mut self, addr: u32) -> ReadResult {
        let addr16 = addr as u16;
        let data = match addr16 {
            0xFE00..=0xFE07 => self.crtc.read(addr16 & 0x07),
            0xFE08..=0xFE1F => self.crtc.read(addr16 & 0x07),
            0xFE20..=0xFE2F => self.video_ula.read(addr16 & 0x01),
            0xFE30..=0xFE3F => 0xFF, // ROMSEL/ACCCON: write-only
            0xFE40..=0xFE5F => self.system_via.read(((addr16 - 0xFE40) & 0x0F) as u8),
            0xFE60..=0xFE7F => self.user_via.read(((addr16 - 0xFE60) & 0x0F) as u8),
            0xFE80..=0xFEFF => 0xFF,
            _ => self.memory.cpu_read(addr16, self.current_pc),
        };
        ReadResult::new(data)
    }

    fn write(&mut self, addr: u32, value: u8) -> u8 {
        let addr16 = addr as u16;
        match addr16 {
            0xFE00..=0xFE1F => self.crtc.write(addr16 & 0x07, value),
            0xFE20..=0xFE2F => self.video_ula.write(addr16 & 0x01, value),
            0xFE30..=0xFE33 => self.memory.write_romsel(value),
            0xFE34..=0xFE3F => {
                if self.memory.model() == crate::config::BbcModel::ModelBPlus {
                    self.memory.write_acccon(value);
                } else {
                    self.memory.write_romsel(value);
                }
            }
            0xFE40..=0xFE5F => self.system_via.write(((addr16 - 0xFE40) & 0x0F) as u8, value),
            0xFE60..=0xFE7F => self.user_via.write(((addr16 - 0xFE60) & 0x0F) as u8, value),
            0xFE80..=0xFEFF => {}
            _ => self.memory.cpu_write(addr16, value, self.current_pc),
        }
        0
    }

    fn io_read(&mut self, _addr: u32) -> ReadResult {
        ReadResult::new(0xFF)
    }

    fn io_write(&mut self, _addr: u32, _value: u8) -> u8 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BbcConfig, BbcModel};

    fn make_bus() -> BbcBus {
        let config = BbcConfig::new(BbcModel::ModelB, vec![0xEA; 0x4000]);
        BbcBus::new(BbcMemory::new(&config))
    }

    #[test]
    fn ram_round_trips() {
        let mut bus = make_bus();
        bus.write(0x1000, 0xAB);
        assert_eq!(bus.read(0x1000).data, 0xAB);
    }

    #[test]
    fn crtc_register_mirrors_every_eight_bytes() {
        let mut bus = make_bus();
        bus.write(0xFE00, 0x01); // select R1 (horizontal displayed)
        bus.write(0xFE01, 80);
        assert_eq!(bus.crtc.reg(1), 80);
        bus.write(0xFE08, 0x00); // mirror: select R0
        bus.write(0xFE09, 63);
        assert_eq!(bus.crtc.reg(0), 63);
    }

    #[test]
    fn romsel_is_write_only() {
        let mut bus = make_bus();
        bus.write(0xFE30, 0x03);
        assert_eq!(bus.memory.romsel(), 0x03);
        assert_eq!(bus.read(0xFE30).data, 0xFF);
    }

    #[test]
    fn mos_rom_at_top_of_address_space() {
        let mut bus = make_bus();
        assert_eq!(bus.read(0xC000).data, 0xEA);
    }
}
