//! JSON-RPC 2.0 debug and control service.
//!
//! Each accepted TCP connection (or stdin/stdout, for local debugging) is
//! served line-by-line: one JSON-RPC request per line in, one response per
//! line out. The core is single-threaded cooperative (no parallelism inside
//! the machine), so connections are handled one at a time.
//!
//! Method names are dotted `service.method`, mirroring the four named
//! services this machine exposes: `video`, `keyboard`, `debugger`, `cpu`.
//! Every debugger mutation returns `is_running`/`cycle_count`/`halt_reason`/
//! `sequence` so a caller can tell whether its own request, or something
//! else, changed machine state first.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpListener;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use emu_core::{Bus, Cpu};

use crate::config::BbcConfig;
use crate::machine::{HaltReason, Machine};

#[derive(Deserialize)]
struct RpcRequest {
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: JsonValue,
    id: JsonValue,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
    id: JsonValue,
}

#[derive(Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

impl RpcResponse {
    fn success(id: JsonValue, result: JsonValue) -> Self {
        Self { jsonrpc: "2.0", result: Some(result), error: None, id }
    }

    fn error(id: JsonValue, code: i32, message: String) -> Self {
        Self { jsonrpc: "2.0", result: None, error: Some(RpcError { code, message }), id }
    }
}

fn halt_reason_string(reason: &HaltReason) -> String {
    match reason {
        HaltReason::Running => "running".to_string(),
        HaltReason::Stopped => "stopped".to_string(),
        HaltReason::Breakpoint(addr) => format!("breakpoint at ${addr:04X}"),
    }
}

fn status_json(machine: &Machine) -> JsonValue {
    serde_json::json!({
        "is_running": matches!(machine.halt_reason(), HaltReason::Running),
        "cycle_count": machine.cycle_count(),
        "halt_reason": halt_reason_string(machine.halt_reason()),
        "sequence": machine.sequence(),
    })
}

/// Server wrapping a headless machine. `None` until `debugger.Boot` runs.
pub struct RpcServer {
    machine: Option<Machine>,
}

impl RpcServer {
    #[must_use]
    pub fn new() -> Self {
        Self { machine: None }
    }

    /// Boot a machine from a config assembled at startup (CLI-loaded ROMs),
    /// so a client can connect and find the machine already running rather
    /// than having to call `debugger.Boot` itself.
    pub fn preboot(&mut self, config: BbcConfig) {
        self.machine = Some(Machine::new(&config));
    }

    /// Serve JSON-RPC over stdin/stdout, for local debugging without a port.
    pub fn run(&mut self) {
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.serve_stream(stdin.lock(), stdout.lock());
    }

    /// Bind `port` and serve JSON-RPC connections one at a time, forever.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be bound.
    pub fn serve_tcp(&mut self, port: u16) -> io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Accept error: {e}");
                    continue;
                }
            };
            let reader = match stream.try_clone() {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Failed to clone connection: {e}");
                    continue;
                }
            };
            self.serve_stream(reader, stream);
        }
        Ok(())
    }

    fn serve_stream<R: Read, W: Write>(&mut self, reader: R, mut writer: W) {
        let reader = BufReader::new(reader);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let request: RpcRequest = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    let resp = RpcResponse::error(JsonValue::Null, -32700, format!("Parse error: {e}"));
                    let _ = writeln!(writer, "{}", serde_json::to_string(&resp).unwrap_or_default());
                    let _ = writer.flush();
                    continue;
                }
            };

            if request.jsonrpc != "2.0" {
                let resp = RpcResponse::error(request.id, -32600, "Invalid JSON-RPC version".to_string());
                let _ = writeln!(writer, "{}", serde_json::to_string(&resp).unwrap_or_default());
                let _ = writer.flush();
                continue;
            }

            let response = self.dispatch(&request.method, &request.params, request.id.clone());
            let _ = writeln!(writer, "{}", serde_json::to_string(&response).unwrap_or_default());
            let _ = writer.flush();
        }
    }

    fn dispatch(&mut self, method: &str, params: &JsonValue, id: JsonValue) -> RpcResponse {
        match method {
            "debugger.Boot" => self.handle_boot(params, id),
            "debugger.GetState" => self.with_machine(id, |m, id| RpcResponse::success(id, status_json(m))),
            "debugger.Run" => self.handle_run(params, id),
            "debugger.Stop" => self.with_machine_mut(id, |m, id| {
                m.run_cycles(0);
                RpcResponse::success(id, status_json(m))
            }),
            "debugger.Reset" => self.with_machine_mut(id, |m, id| {
                m.reset();
                RpcResponse::success(id, status_json(m))
            }),
            "debugger.StepInstruction" => self.handle_step_instruction(params, id),
            "debugger.StepCycle" => self.handle_step_cycle(params, id),
            "debugger.ReadMemory" => self.handle_read_memory(params, id),
            "debugger.WriteMemory" => self.handle_write_memory(params, id),
            "debugger.PeekMemory" => self.handle_peek_memory(params, id),
            "debugger.AddBreakpoint" => self.handle_add_breakpoint(params, id),
            "debugger.RemoveBreakpoint" => self.handle_remove_breakpoint(params, id),
            "debugger.ListBreakpoints" => self.with_machine(id, |m, id| {
                RpcResponse::success(id, serde_json::json!({"breakpoints": m.breakpoints()}))
            }),
            "debugger.ClearBreakpoints" => self.with_machine_mut(id, |m, id| {
                m.clear_breakpoints();
                RpcResponse::success(id, status_json(m))
            }),
            "cpu.ReadRegisters" => self.with_machine(id, |m, id| {
                let regs = m.cpu().registers();
                RpcResponse::success(
                    id,
                    serde_json::json!({
                        "a": regs.a, "x": regs.x, "y": regs.y,
                        "sp": regs.s, "pc": regs.pc, "p": regs.p.0,
                    }),
                )
            }),
            "cpu.WriteRegisters" => self.handle_write_registers(params, id),
            "keyboard.KeyDown" => self.handle_key(params, id, true),
            "keyboard.KeyUp" => self.handle_key(params, id, false),
            "keyboard.GetState" => self.with_machine(id, |m, id| {
                let keyboard = m.bus().keyboard.borrow();
                let rows: Vec<u16> = (0..8).map(|r| (0..10).fold(0u16, |acc, c| acc | (u16::from(keyboard.is_pressed(c, r)) << c))).collect();
                RpcResponse::success(id, serde_json::json!({"rows": rows}))
            }),
            "video.GetConfig" => RpcResponse::success(
                id,
                serde_json::json!({"width": 640, "height": 512, "framerate_hz": 50}),
            ),
            _ => RpcResponse::error(id, -32601, format!("Unknown method: {method}")),
        }
    }

    fn require_machine(&mut self, id: &JsonValue) -> Result<&mut Machine, RpcResponse> {
        self.machine
            .as_mut()
            .ok_or_else(|| RpcResponse::error(id.clone(), -32000, "No machine booted. Call debugger.Boot first.".to_string()))
    }

    fn with_machine<T>(&mut self, id: JsonValue, f: T) -> RpcResponse
    where
        T: FnOnce(&Machine, JsonValue) -> RpcResponse,
    {
        match self.require_machine(&id) {
            Ok(m) => f(m, id),
            Err(e) => e,
        }
    }

    fn with_machine_mut<T>(&mut self, id: JsonValue, f: T) -> RpcResponse
    where
        T: FnOnce(&mut Machine, JsonValue) -> RpcResponse,
    {
        match self.require_machine(&id) {
            Ok(m) => f(m, id),
            Err(e) => e,
        }
    }

    fn handle_boot(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let mos_path = params.get("mos").and_then(|v| v.as_str()).unwrap_or("roms/os12.rom");
        let mos_rom = match std::fs::read(mos_path) {
            Ok(d) => d,
            Err(e) => return RpcResponse::error(id, -32000, format!("Cannot read MOS ROM at {mos_path}: {e}")),
        };
        let model = match params.get("model").and_then(|v| v.as_str()) {
            Some("b-plus") | Some("model-b-plus") => crate::config::BbcModel::ModelBPlus,
            _ => crate::config::BbcModel::ModelB,
        };
        let mut config = BbcConfig::new(model, mos_rom);
        if let Some(roms) = params.get("sideways_roms").and_then(|v| v.as_array()) {
            for entry in roms {
                let Some(slot) = entry.get("slot").and_then(JsonValue::as_u64) else { continue };
                let Some(b64) = entry.get("data").and_then(|v| v.as_str()) else { continue };
                let Ok(data) = base64::engine::general_purpose::STANDARD.decode(b64) else { continue };
                config = config.with_sideways_rom(slot as u8, data);
            }
        }
        self.machine = Some(Machine::new(&config));
        RpcResponse::success(id, serde_json::json!({"status": "ok"}))
    }

    fn handle_run(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let cycles = params.get("cycles").and_then(JsonValue::as_u64).unwrap_or(1_000_000);
        self.with_machine_mut(id, |m, id| {
            m.run_cycles(cycles);
            RpcResponse::success(id, status_json(m))
        })
    }

    fn handle_step_instruction(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let count = params.get("count").and_then(JsonValue::as_u64).unwrap_or(1) as u32;
        self.with_machine_mut(id, |m, id| {
            m.step_instructions(count);
            RpcResponse::success(id, status_json(m))
        })
    }

    fn handle_step_cycle(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let count = params.get("count").and_then(JsonValue::as_u64).unwrap_or(1);
        self.with_machine_mut(id, |m, id| {
            for _ in 0..count {
                m.step();
            }
            RpcResponse::success(id, status_json(m))
        })
    }

    fn parse_addr_len(params: &JsonValue) -> Option<(u16, usize)> {
        let addr = params.get("address").and_then(JsonValue::as_u64)? as u16;
        let length = params.get("length").and_then(JsonValue::as_u64).unwrap_or(1) as usize;
        Some((addr, length))
    }

    fn handle_read_memory(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let Some((addr, length)) = Self::parse_addr_len(params) else {
            return RpcResponse::error(id, -32602, "Missing 'address'".to_string());
        };
        self.with_machine_mut(id, |m, id| {
            let mut data = Vec::with_capacity(length);
            for offset in 0..length {
                let a = addr.wrapping_add(offset as u16);
                m.bus_mut().current_pc = m.cpu().pc();
                data.push(m.bus_mut().read(u32::from(a)).data);
            }
            RpcResponse::success(id, serde_json::json!({"data": base64::engine::general_purpose::STANDARD.encode(&data)}))
        })
    }

    fn handle_peek_memory(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let Some((addr, length)) = Self::parse_addr_len(params) else {
            return RpcResponse::error(id, -32602, "Missing 'address'".to_string());
        };
        self.with_machine(id, |m, id| {
            let data: Vec<u8> = (0..length).map(|o| m.peek_memory(addr.wrapping_add(o as u16))).collect();
            RpcResponse::success(id, serde_json::json!({"data": base64::engine::general_purpose::STANDARD.encode(&data)}))
        })
    }

    fn handle_write_memory(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let Some(addr) = params.get("address").and_then(JsonValue::as_u64) else {
            return RpcResponse::error(id, -32602, "Missing 'address'".to_string());
        };
        let Some(b64) = params.get("data").and_then(|v| v.as_str()) else {
            return RpcResponse::error(id, -32602, "Missing 'data'".to_string());
        };
        let data = match base64::engine::general_purpose::STANDARD.decode(b64) {
            Ok(d) => d,
            Err(e) => return RpcResponse::error(id, -32602, format!("Invalid base64: {e}")),
        };
        self.with_machine_mut(id, |m, id| {
            for (offset, byte) in data.iter().enumerate() {
                let a = (addr as u16).wrapping_add(offset as u16);
                m.bus_mut().write(u32::from(a), *byte);
            }
            RpcResponse::success(id, status_json(m))
        })
    }

    fn handle_add_breakpoint(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let Some(addr) = params.get("address").and_then(JsonValue::as_u64) else {
            return RpcResponse::error(id, -32602, "Missing 'address'".to_string());
        };
        self.with_machine_mut(id, |m, id| {
            m.add_breakpoint(addr as u16);
            RpcResponse::success(id, status_json(m))
        })
    }

    fn handle_remove_breakpoint(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let Some(addr) = params.get("address").and_then(JsonValue::as_u64) else {
            return RpcResponse::error(id, -32602, "Missing 'address'".to_string());
        };
        self.with_machine_mut(id, |m, id| {
            m.remove_breakpoint(addr as u16);
            RpcResponse::success(id, status_json(m))
        })
    }

    fn handle_write_registers(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        self.with_machine_mut(id, |m, id| {
            let regs = &mut m.cpu_mut().regs;
            if let Some(v) = params.get("a").and_then(JsonValue::as_u64) {
                regs.a = v as u8;
            }
            if let Some(v) = params.get("x").and_then(JsonValue::as_u64) {
                regs.x = v as u8;
            }
            if let Some(v) = params.get("y").and_then(JsonValue::as_u64) {
                regs.y = v as u8;
            }
            if let Some(v) = params.get("sp").and_then(JsonValue::as_u64) {
                regs.s = v as u8;
            }
            if let Some(v) = params.get("pc").and_then(JsonValue::as_u64) {
                regs.pc = v as u16;
            }
            if let Some(v) = params.get("p").and_then(JsonValue::as_u64) {
                regs.p = emu_6502::Status::from_byte(v as u8);
            }
            m.bump_sequence();
            RpcResponse::success(id, status_json(m))
        })
    }

    fn handle_key(&mut self, params: &JsonValue, id: JsonValue, down: bool) -> RpcResponse {
        let (Some(row), Some(column)) = (
            params.get("row").and_then(JsonValue::as_u64),
            params.get("column").and_then(JsonValue::as_u64),
        ) else {
            return RpcResponse::error(id, -32602, "Missing 'row'/'column'".to_string());
        };
        self.with_machine_mut(id, |m, id| {
            if row >= 8 || column >= 10 {
                return RpcResponse::success(id, serde_json::json!({"accepted": false}));
            }
            m.bus().keyboard.borrow_mut().set_key(column as u8, row as u8, down);
            RpcResponse::success(id, serde_json::json!({"accepted": true}))
        })
    }
}

impl Default for RpcServer {
    fn default() -> Self {
        Self::new()
    }
}
