//! BBC Micro emulator binary: headless core served over a JSON-RPC socket.
//!
//! There is no windowed front end in this binary; the frame renderer and
//! network plumbing around the debug service are external collaborators.
//! This binary owns only ROM loading, CLI parsing, and handing a booted
//! machine to the RPC service.

use std::path::{Path, PathBuf};
use std::process;

use emu_bbc_micro::{BbcConfig, BbcModel};

/// Default TCP port, chosen to spell "BEEB" in hex.
const DEFAULT_PORT: u16 = 0xBEEB;

struct CliArgs {
    mos_path: Option<PathBuf>,
    roms: Vec<(u8, PathBuf)>,
    rom_dir: Option<PathBuf>,
    port: u16,
    info: bool,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs { mos_path: None, roms: Vec::new(), rom_dir: None, port: DEFAULT_PORT, info: false };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--mos" => {
                i += 1;
                cli.mos_path = args.get(i).map(PathBuf::from);
            }
            "--rom" => {
                i += 1;
                let Some(spec) = args.get(i) else {
                    eprintln!("--rom requires a <slot>:<path> argument");
                    process::exit(1);
                };
                let Some((slot_str, path_str)) = spec.split_once(':') else {
                    eprintln!("Invalid --rom argument {spec:?}, expected <slot>:<path>");
                    process::exit(1);
                };
                let Ok(slot) = slot_str.parse::<u8>() else {
                    eprintln!("Invalid ROM slot {slot_str:?}, expected 0-15");
                    process::exit(1);
                };
                if slot > 15 {
                    eprintln!("ROM slot {slot} out of range, expected 0-15");
                    process::exit(1);
                }
                cli.roms.push((slot, PathBuf::from(path_str)));
            }
            "--rom-dir" => {
                i += 1;
                cli.rom_dir = args.get(i).map(PathBuf::from);
            }
            "--port" => {
                i += 1;
                let Some(s) = args.get(i) else {
                    eprintln!("--port requires a value");
                    process::exit(1);
                };
                match s.parse() {
                    Ok(p) => cli.port = p,
                    Err(_) => {
                        eprintln!("Invalid port {s:?}");
                        process::exit(1);
                    }
                }
            }
            "--info" => {
                cli.info = true;
            }
            "--version" => {
                println!("emu-bbc-micro {}", env!("CARGO_PKG_VERSION"));
                process::exit(0);
            }
            "--help" | "-h" => {
                eprintln!("Usage: emu-bbc-micro [OPTIONS]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --mos <path>         MOS ROM image (16K) [default: roms/os12.rom]");
                eprintln!("  --rom <slot>:<path>  Load a sideways ROM into a slot (0-15), may repeat");
                eprintln!("  --rom-dir <dir>      Directory to search for ROM images");
                eprintln!("  --port <u16>         RPC service port [default: 0xBEEB]");
                eprintln!("  --info               Print a JSON description of the machine and exit");
                eprintln!("  --help               Print this message");
                eprintln!("  --version            Print the version");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

/// ROM discovery priority: explicit CLI path, `BBC_ROM_DIR` env var, a
/// `roms/` directory relative to the executable (build layout), an
/// installed `share/emu-bbc-micro/roms/` layout, then `roms/` in the cwd.
fn find_roms_dir(cli: &CliArgs) -> PathBuf {
    if let Some(ref dir) = cli.rom_dir {
        return dir.clone();
    }
    if let Ok(dir) = std::env::var("BBC_ROM_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(exe) = std::env::current_exe() {
        let mut dir = exe.parent().map(Path::to_path_buf);
        for _ in 0..5 {
            if let Some(ref d) = dir {
                let roms = d.join("roms");
                if roms.is_dir() {
                    return roms;
                }
                let installed = d.join("share").join("emu-bbc-micro").join("roms");
                if installed.is_dir() {
                    return installed;
                }
                dir = d.parent().map(Path::to_path_buf);
            }
        }
    }
    PathBuf::from("roms")
}

/// Load a ROM image, zero-padding a short image or truncating an oversized
/// one to exactly `size` bytes with a visible warning.
fn load_rom_padded(path: &Path, size: usize) -> Vec<u8> {
    let mut data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Cannot read ROM at {}: {e}", path.display());
            process::exit(1);
        }
    };
    if data.len() != size {
        eprintln!("Warning: ROM at {} is {} bytes, expected {size}; padding/truncating", path.display(), data.len());
        data.resize(size, 0);
    }
    data
}

fn load_config(cli: &CliArgs) -> BbcConfig {
    let roms_dir = find_roms_dir(cli);
    let mos_path = cli.mos_path.clone().unwrap_or_else(|| roms_dir.join("os12.rom"));
    let mos_rom = load_rom_padded(&mos_path, 0x4000);

    let mut config = BbcConfig::new(BbcModel::ModelB, mos_rom);
    for (slot, path) in &cli.roms {
        let resolved = if path.is_absolute() || path.exists() { path.clone() } else { roms_dir.join(path) };
        let data = load_rom_padded(&resolved, 0x4000);
        config = config.with_sideways_rom(*slot, data);
    }
    config
}

fn print_info(cli: &CliArgs) {
    let config = load_config(cli);
    let info = serde_json::json!({
        "machine": "bbc-micro",
        "model": "model-b",
        "sideways_slots": config.sideways_roms.iter().map(|r| r.slot).collect::<Vec<_>>(),
        "port": cli.port,
    });
    println!("{info}");
}

fn main() {
    let cli = parse_args();

    if cli.info {
        print_info(&cli);
        return;
    }

    let config = load_config(&cli);
    let mut server = emu_bbc_micro::rpc::RpcServer::new();
    server.preboot(config);

    eprintln!("Listening on port {}", cli.port);
    if let Err(e) = server.serve_tcp(cli.port) {
        eprintln!("Failed to bind port {}: {e}", cli.port);
        process::exit(1);
    }
}
