//! BBC Micro configuration: model selection and ROM images.

/// Hardware variant being emulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BbcModel {
    /// Original Model B: 32K RAM, 16 sideways ROM slots, no shadow RAM.
    ModelB,
    /// Model B+: adds the ANDY private RAM overlay and ACCCON shadow RAM.
    ModelBPlus,
}

/// One 16K sideways ROM image, loaded into a slot selected by ROMSEL.
#[derive(Debug, Clone)]
pub struct SidewaysRom {
    pub slot: u8,
    pub data: Vec<u8>,
}

/// Configuration for constructing a [`crate::machine::Machine`].
pub struct BbcConfig {
    pub model: BbcModel,
    /// MOS ROM (16K, mapped at $C000-$FFFF).
    pub mos_rom: Vec<u8>,
    /// Sideways ROM images, one per populated slot (0-15).
    pub sideways_roms: Vec<SidewaysRom>,
}

impl BbcConfig {
    /// Build a config with the given MOS ROM and no sideways ROMs loaded.
    #[must_use]
    pub fn new(model: BbcModel, mos_rom: Vec<u8>) -> Self {
        Self { model, mos_rom, sideways_roms: Vec::new() }
    }

    /// Load a ROM image into a sideways slot (0-15). Short images are
    /// zero-padded to 16K; oversized images are truncated.
    pub fn with_sideways_rom(mut self, slot: u8, mut data: Vec<u8>) -> Self {
        data.resize(0x4000, 0);
        self.sideways_roms.retain(|r| r.slot != slot);
        self.sideways_roms.push(SidewaysRom { slot, data });
        self
    }
}
