//! BBC Micro keyboard matrix and the System VIA addressable latch (IC32).
//!
//! The keyboard is a 10 column x 8 row matrix. Port A of the System VIA
//! carries the column (bits 0-3) and row (bits 4-6) to scan when "keyboard
//! write enable" is set in the addressable latch; bit 7 of port A then
//! reads back whether that (column, row) key is held down.
//!
//! The addressable latch (IC32) is a 74LS259: Port B bits 0-2 select one of
//! eight output lines, bit 3 is the value written to it. The eight lines
//! are: sound chip write enable, speech processor read/write selects
//! (unused on the Model B), keyboard write enable, two screen start address
//! bits, and the caps lock / shift lock LEDs.

/// Bit index within the latch for each IC32 output line.
mod latch_bit {
    pub const SOUND_ENABLE: u8 = 0;
    pub const SPEECH_READ: u8 = 1;
    pub const SPEECH_WRITE: u8 = 2;
    pub const KEYBOARD_WRITE_ENABLE: u8 = 3;
    pub const SCREEN_BASE_0: u8 = 4;
    pub const SCREEN_BASE_1: u8 = 5;
    pub const CAPS_LOCK_LED: u8 = 6;
    pub const SHIFT_LOCK_LED: u8 = 7;
}

/// 10x8 keyboard matrix. Internally 1 = pressed.
pub struct KeyboardMatrix {
    /// `rows[r]` has bit `c` set if (column=c, row=r) is pressed.
    rows: [u16; 8],
}

impl KeyboardMatrix {
    #[must_use]
    pub fn new() -> Self {
        Self { rows: [0; 8] }
    }

    pub fn set_key(&mut self, column: u8, row: u8, pressed: bool) {
        if column < 10 && row < 8 {
            if pressed {
                self.rows[row as usize] |= 1 << column;
            } else {
                self.rows[row as usize] &= !(1 << column);
            }
        }
    }

    #[must_use]
    pub fn is_pressed(&self, column: u8, row: u8) -> bool {
        column < 10 && row < 8 && self.rows[row as usize] & (1 << column) != 0
    }

    /// True if any key is pressed anywhere in the matrix (row 0 carries
    /// the keyboard's "any key down" wiring used for power-on scanning).
    #[must_use]
    pub fn any_pressed(&self) -> bool {
        self.rows.iter().any(|&r| r != 0)
    }

    pub fn release_all(&mut self) {
        self.rows = [0; 8];
    }
}

impl Default for KeyboardMatrix {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the System VIA's ports: port A scans the keyboard matrix, port B
/// addresses the IC32 latch.
///
/// Holds the matrix behind `Rc<RefCell<_>>` rather than owning it outright:
/// the VIA only ever reaches this peripheral through a `Box<dyn
/// ViaPeripheral>` trait object, which can't be downcast back to a concrete
/// type, so the bus and the RPC service need their own handle to the same
/// matrix to press and release keys.
pub struct SystemViaPeripheral {
    keyboard: std::rc::Rc<std::cell::RefCell<KeyboardMatrix>>,
    latch: u8,
}

impl SystemViaPeripheral {
    #[must_use]
    pub fn new(keyboard: std::rc::Rc<std::cell::RefCell<KeyboardMatrix>>) -> Self {
        // Power-on state: all latch lines high except those pulled low by
        // pull-up resistors on the PCB. Keyboard write enable starts clear.
        Self { keyboard, latch: 0xFF & !(1 << latch_bit::KEYBOARD_WRITE_ENABLE) }
    }

    fn latch_bit(&self, bit: u8) -> bool {
        self.latch & (1 << bit) != 0
    }

    #[must_use]
    pub fn sound_enabled(&self) -> bool {
        !self.latch_bit(latch_bit::SOUND_ENABLE)
    }

    #[must_use]
    pub fn keyboard_write_enabled(&self) -> bool {
        self.latch_bit(latch_bit::KEYBOARD_WRITE_ENABLE)
    }

    #[must_use]
    pub fn screen_base_bits(&self) -> u8 {
        u8::from(self.latch_bit(latch_bit::SCREEN_BASE_0)) | (u8::from(self.latch_bit(latch_bit::SCREEN_BASE_1)) << 1)
    }

    #[must_use]
    pub fn caps_lock_led(&self) -> bool {
        self.latch_bit(latch_bit::CAPS_LOCK_LED)
    }

    #[must_use]
    pub fn shift_lock_led(&self) -> bool {
        self.latch_bit(latch_bit::SHIFT_LOCK_LED)
    }

    #[must_use]
    pub fn speech_read_select(&self) -> bool {
        self.latch_bit(latch_bit::SPEECH_READ)
    }

    #[must_use]
    pub fn speech_write_select(&self) -> bool {
        self.latch_bit(latch_bit::SPEECH_WRITE)
    }
}

impl mos_via_6522::ViaPeripheral for SystemViaPeripheral {
    fn update_port_a(&mut self, output: u8, _ddr: u8) -> u8 {
        if self.keyboard_write_enabled() {
            let column = output & 0x0F;
            let row = (output >> 4) & 0x07;
            let pressed = self.keyboard.borrow().is_pressed(column, row);
            (output & 0x7F) | (u8::from(pressed) << 7)
        } else {
            output
        }
    }

    fn update_port_b(&mut self, output: u8, _ddr: u8) -> u8 {
        let address = output & 0x07;
        let value = output & 0x08 != 0;
        let bit = 1 << address;
        if value {
            self.latch |= bit;
        } else {
            self.latch &= !bit;
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mos_via_6522::ViaPeripheral;

    fn make_peripheral() -> (SystemViaPeripheral, std::rc::Rc<std::cell::RefCell<KeyboardMatrix>>) {
        let keyboard = std::rc::Rc::new(std::cell::RefCell::new(KeyboardMatrix::new()));
        (SystemViaPeripheral::new(std::rc::Rc::clone(&keyboard)), keyboard)
    }

    #[test]
    fn key_press_sets_bit_seven_when_scanned() {
        let (mut p, keyboard) = make_peripheral();
        keyboard.borrow_mut().set_key(4, 5, true);
        // Enable keyboard write: address 3 (bit index), value 1.
        p.update_port_b(0x08 | latch_bit::KEYBOARD_WRITE_ENABLE, 0xFF);
        assert!(p.keyboard_write_enabled());

        let scanned = p.update_port_a(0x54, 0xFF);
        assert_eq!(scanned, 0xD4);

        keyboard.borrow_mut().set_key(4, 5, false);
        let scanned = p.update_port_a(0x54, 0xFF);
        assert_eq!(scanned, 0x54);
    }

    #[test]
    fn latch_bits_are_individually_addressable() {
        let (mut p, _keyboard) = make_peripheral();
        p.update_port_b(0x08 | latch_bit::CAPS_LOCK_LED, 0xFF);
        assert!(p.caps_lock_led());
        p.update_port_b(latch_bit::CAPS_LOCK_LED, 0xFF);
        assert!(!p.caps_lock_led());
    }

    #[test]
    fn unscanned_port_a_passes_through() {
        let (mut p, _keyboard) = make_peripheral();
        assert!(!p.keyboard_write_enabled());
        assert_eq!(p.update_port_a(0x54, 0xFF), 0x54);
    }
}
