//! Top-level BBC Micro system: CPU, bus, scheduler, and run/pause control.
//!
//! # Tick loop
//!
//! Each call to [`Machine::step`] advances the system by one CPU cycle
//! (1 MHz). Within that cycle:
//!
//! 1. Video path (CRTC + Video ULA/SAA5050) advances once, or twice if the
//!    Video ULA's fast-clock bit selects 2 MHz for this mode.
//! 2. The CPU executes one bus cycle.
//! 3. Both VIAs advance their timers and handshake logic by one tick.
//! 4. The IRQ aggregator polls both VIAs and updates the CPU's IRQ input.
//! 5. The cycle and sequence counters advance.

use std::sync::{Arc, Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use emu_6502::Mos6502;
use emu_core::{Bus, Cpu, Observable, Value};

use crate::bus::BbcBus;
use crate::config::BbcConfig;
use crate::irq;
use crate::memory::BbcMemory;

/// Why the machine most recently stopped running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    Running,
    Stopped,
    Breakpoint(u16),
}

#[derive(Default)]
struct PauseState {
    paused: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

pub struct Machine {
    cpu: Mos6502,
    bus: BbcBus,
    cycle_count: u64,
    sequence: u64,
    breakpoints: Vec<u16>,
    halt_reason: HaltReason,
    pause: Arc<PauseState>,
}

impl Machine {
    #[must_use]
    pub fn new(config: &BbcConfig) -> Self {
        let memory = BbcMemory::new(config);
        let mut bus = BbcBus::new(memory);
        let mut cpu = Mos6502::new();

        let reset_lo = bus.read(0xFFFC).data;
        let reset_hi = bus.read(0xFFFD).data;
        cpu.regs.pc = u16::from(reset_lo) | (u16::from(reset_hi) << 8);

        Self {
            cpu,
            bus,
            cycle_count: 0,
            sequence: 0,
            breakpoints: Vec::new(),
            halt_reason: HaltReason::Running,
            pause: Arc::new(PauseState::default()),
        }
    }

    #[must_use]
    pub fn cpu(&self) -> &Mos6502 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Mos6502 {
        &mut self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &BbcBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut BbcBus {
        &mut self.bus
    }

    #[must_use]
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn halt_reason(&self) -> &HaltReason {
        &self.halt_reason
    }

    /// Advance by exactly one CPU cycle.
    pub fn step(&mut self) {
        self.bus.current_pc = self.cpu.pc();

        let video_subcycles = if self.bus.video_ula.fast_clock() { 2 } else { 1 };
        for _ in 0..video_subcycles {
            self.bus.tick_video();
        }

        self.cpu.tick(&mut self.bus);

        self.bus.system_via.tick();
        self.bus.user_via.tick();

        if irq::poll(&self.bus) {
            self.cpu.interrupt();
        }

        self.cycle_count += 1;
        self.sequence += 1;
    }

    /// True if execution is at an instruction boundary that sits on a
    /// breakpoint. Checked before, not after, executing that instruction.
    fn at_breakpoint(&self) -> bool {
        self.cpu.is_instruction_complete() && self.breakpoints.contains(&self.cpu.pc())
    }

    /// Run until `cycles` cycles have executed or a breakpoint is hit.
    pub fn run_cycles(&mut self, cycles: u64) {
        self.halt_reason = HaltReason::Running;
        for _ in 0..cycles {
            if self.at_breakpoint() {
                self.halt_reason = HaltReason::Breakpoint(self.cpu.pc());
                break;
            }
            self.step();
            self.wait_if_paused();
        }
    }

    /// Run `count` whole instructions (or until a breakpoint is hit).
    pub fn step_instructions(&mut self, count: u32) {
        self.halt_reason = HaltReason::Running;
        for _ in 0..count {
            if self.at_breakpoint() {
                self.halt_reason = HaltReason::Breakpoint(self.cpu.pc());
                return;
            }
            loop {
                self.step();
                if self.cpu.is_instruction_complete() {
                    break;
                }
            }
        }
    }

    pub fn add_breakpoint(&mut self, addr: u16) {
        if !self.breakpoints.contains(&addr) {
            self.breakpoints.push(addr);
            self.sequence += 1;
        }
    }

    pub fn remove_breakpoint(&mut self, addr: u16) {
        self.breakpoints.retain(|&b| b != addr);
        self.sequence += 1;
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
        self.sequence += 1;
    }

    /// Advance the sequence counter for a mutation that doesn't otherwise
    /// bump it, e.g. a debugger register write.
    pub fn bump_sequence(&mut self) {
        self.sequence += 1;
    }

    #[must_use]
    pub fn breakpoints(&self) -> &[u16] {
        &self.breakpoints
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
        let reset_lo = self.bus.read(0xFFFC).data;
        let reset_hi = self.bus.read(0xFFFD).data;
        self.cpu.regs.pc = u16::from(reset_lo) | (u16::from(reset_hi) << 8);
        self.halt_reason = HaltReason::Running;
        self.sequence += 1;
    }

    /// Side-effect-free memory read, bypassing shadow-RAM PC routing and
    /// I/O register side effects (VIA register reads that clear flags).
    #[must_use]
    pub fn peek_memory(&self, addr: u16) -> u8 {
        match addr {
            0xFE00..=0xFE07 => self.bus.crtc.reg(addr as u8 & 0x1F),
            0xFE20..=0xFE2F => self.bus.video_ula.control(),
            0xFE30..=0xFE3F => self.bus.memory.romsel(),
            0xFE40..=0xFE5F => self.bus.system_via.port_a_output(),
            0xFE60..=0xFE7F => self.bus.user_via.port_a_output(),
            _ => self.bus.memory.peek(addr),
        }
    }

    /// Handle to the shared pause flag, for a control thread to flip.
    #[must_use]
    pub fn pause_handle(&self) -> Arc<PauseState> {
        Arc::clone(&self.pause)
    }

    pub fn set_paused(&self, paused: bool) {
        self.pause.paused.store(paused, Ordering::SeqCst);
        if !paused {
            let _guard = self.pause.lock.lock().unwrap();
            self.pause.condvar.notify_all();
        }
    }

    fn wait_if_paused(&self) {
        if !self.pause.paused.load(Ordering::SeqCst) {
            return;
        }
        let mut guard = self.pause.lock.lock().unwrap();
        while self.pause.paused.load(Ordering::SeqCst) {
            guard = self.pause.condvar.wait(guard).unwrap();
        }
    }
}

impl Observable for Machine {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            self.cpu.query(rest)
        } else if let Some(rest) = path.strip_prefix("memory.") {
            let addr = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
                u16::from_str_radix(hex, 16).ok()
            } else if let Some(hex) = rest.strip_prefix('$') {
                u16::from_str_radix(hex, 16).ok()
            } else {
                rest.parse().ok()
            };
            addr.map(|a| Value::U8(self.peek_memory(a)))
        } else {
            match path {
                "cycle_count" => Some(Value::U64(self.cycle_count)),
                "sequence" => Some(Value::U64(self.sequence)),
                "romsel" => Some(Value::U8(self.bus.memory.romsel())),
                _ => self.cpu.query(path),
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["cpu.<6502_paths>", "memory.<address>", "cycle_count", "sequence", "romsel"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BbcModel;

    fn make_machine() -> Machine {
        let mut mos = vec![0xEA; 0x4000]; // NOP sled
        mos[0x3FFC] = 0x00; // reset vector -> $C000
        mos[0x3FFD] = 0xC0;
        Machine::new(&BbcConfig::new(BbcModel::ModelB, mos))
    }

    #[test]
    fn resets_pc_from_vector() {
        let m = make_machine();
        assert_eq!(m.cpu().pc(), 0xC000);
    }

    #[test]
    fn cycle_count_advances() {
        let mut m = make_machine();
        m.step();
        assert_eq!(m.cycle_count(), 1);
    }

    #[test]
    fn ram_round_trip_via_debugger_increases_sequence() {
        let mut m = make_machine();
        let before = m.sequence();
        m.bus_mut().write(0x1000, 0x42);
        assert_eq!(m.peek_memory(0x1000), 0x42);
        m.add_breakpoint(0x1234);
        assert!(m.sequence() > before);
    }

    #[test]
    fn breakpoint_halts_step_instructions() {
        let mut m = make_machine();
        m.add_breakpoint(0xC000);
        m.step_instructions(5);
        assert_eq!(*m.halt_reason(), HaltReason::Breakpoint(0xC000));
    }
}
