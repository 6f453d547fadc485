mod config;

use anyhow::Context;
use clap::Parser;
use config::AppConfig;
use env_logger::Env;
use smsmem_core::memory::address::page_start;
use smsmem_core::memory::{ArrayBlock, BlockId, MapDirection, MemoryBlock, TypedBlock};
use smsmem_core::{
    determine_save_state_path, Cartridge, Session, StorageBackend, UnmappedAccess,
};
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Poke {
    address: u16,
    value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DumpRange {
    start: u16,
    len: usize,
}

#[derive(Parser)]
struct Cli {
    #[arg(short = 'f', long = "rom-file-path")]
    rom_file_path: String,
    /// TOML config file; command line options override its values
    #[arg(short = 'c', long = "config")]
    config_path: Option<PathBuf>,
    #[arg(long = "storage-backend")]
    storage_backend: Option<StorageBackend>,
    #[arg(long = "unmapped-access")]
    unmapped_access: Option<UnmappedAccess>,
    /// Cartridge RAM image, loaded at startup if present and written back on exit
    #[arg(long = "ram-file-path")]
    ram_file_path: Option<PathBuf>,
    /// Write a byte, e.g. FFFE=03 (hexadecimal); may be repeated
    #[arg(short = 'w', long = "write", value_parser = parse_poke)]
    writes: Vec<Poke>,
    /// Dump memory after all writes, e.g. 4000:64 (hexadecimal address, decimal length)
    #[arg(short = 'd', long = "dump", value_parser = parse_dump_range)]
    dumps: Vec<DumpRange>,
    #[arg(long = "print-page-map")]
    print_page_map: bool,
    /// Start from a save state instead of power-on; defaults to the ROM path with a .ss0 extension
    #[arg(long = "load-state", num_args = 0..=1)]
    load_state_path: Option<Option<PathBuf>>,
    /// Write a save state on exit; defaults to the ROM path with a .ss0 extension
    #[arg(long = "save-state", num_args = 0..=1)]
    save_state_path: Option<Option<PathBuf>>,
}

impl Cli {
    fn state_path(&self, path: &Option<PathBuf>) -> PathBuf {
        path.clone().unwrap_or_else(|| determine_save_state_path(&self.rom_file_path))
    }
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches('$');
    u16::from_str_radix(digits, 16).map_err(|err| format!("invalid hex value '{s}': {err}"))
}

fn parse_poke(s: &str) -> Result<Poke, String> {
    let Some((address, value)) = s.split_once('=') else {
        return Err(format!("expected ADDRESS=VALUE, got '{s}'"));
    };

    let address = parse_hex_u16(address)?;
    let value = parse_hex_u16(value)?;
    let value = u8::try_from(value).map_err(|_| format!("value {value:X} does not fit in a byte"))?;

    Ok(Poke { address, value })
}

fn parse_dump_range(s: &str) -> Result<DumpRange, String> {
    let Some((start, len)) = s.split_once(':') else {
        return Err(format!("expected ADDRESS:LENGTH, got '{s}'"));
    };

    let start = parse_hex_u16(start)?;
    let len = match len.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => len.parse(),
    }
    .map_err(|err| format!("invalid length '{len}': {err}"))?;

    Ok(DumpRange { start, len })
}

fn format_binding(binding: Option<BlockId>) -> String {
    match binding {
        Some(block) => block.to_string(),
        None => "-".into(),
    }
}

fn format_page_map<B: MemoryBlock>(session: &Session<B>) -> String {
    let page_table = session.bus().page_table();
    let mut out = String::new();

    let reads = page_table.bindings(MapDirection::Read);
    let writes = page_table.bindings(MapDirection::Write);
    for ((page, read), (_, write)) in reads.zip(writes) {
        let start = page_start(page);
        let _ = writeln!(
            out,
            "{start:04X}-{:04X}  read {:>5}  write {:>5}",
            start + 0x3FF,
            format_binding(read),
            format_binding(write)
        );
    }

    out
}

fn format_dump<B: MemoryBlock>(
    session: &Session<B>,
    range: DumpRange,
    bytes_per_line: usize,
) -> String {
    let bytes_per_line = bytes_per_line.max(1);
    let mut out = String::new();

    for line_start in (0..range.len).step_by(bytes_per_line) {
        let line_address = range.start.wrapping_add(line_start as u16);
        let _ = write!(out, "{line_address:04X}:");
        for i in line_start..(line_start + bytes_per_line).min(range.len) {
            let value = session.read_byte(range.start.wrapping_add(i as u16));
            let _ = write!(out, " {value:02X}");
        }
        out.push('\n');
    }

    out
}

// A restored session keeps the policy it was saved with unless the current config says otherwise
fn apply_unmapped_access<B: MemoryBlock>(
    session: &mut Session<B>,
    unmapped_access: UnmappedAccess,
) {
    let current = session.bus().unmapped_access();
    if current != unmapped_access {
        log::info!("Switching unmapped access from {current} to {unmapped_access}");
        session.set_unmapped_access(unmapped_access);
    }
}

fn run<B: MemoryBlock>(
    args: &Cli,
    app_config: &AppConfig,
    cartridge: &Cartridge,
) -> Result<(), anyhow::Error> {
    let mut session = match &args.load_state_path {
        Some(path) => {
            let path = args.state_path(path);
            smsmem_core::load_state::<B, _>(&path)
                .with_context(|| format!("error loading save state from '{}'", path.display()))?
        }
        None => Session::<B>::init(app_config.bus, cartridge)?,
    };
    apply_unmapped_access(&mut session, app_config.bus.unmapped_access);

    for &Poke { address, value } in &args.writes {
        log::debug!("Writing {value:02X} to {address:04X}");
        session.write_byte(address, value);
    }

    if args.print_page_map {
        print!("{}", format_page_map(&session));
    }

    for &range in &args.dumps {
        print!("{}", format_dump(&session, range, app_config.dump_bytes_per_line));
    }

    if let Some(path) = &args.save_state_path {
        let path = args.state_path(path);
        smsmem_core::save_state(&session, &path)
            .with_context(|| format!("error writing save state to '{}'", path.display()))?;
    }

    let cartridge_ram = session.teardown();
    if let Some(path) = &args.ram_file_path {
        fs::write(path, cartridge_ram)
            .with_context(|| format!("error writing cartridge RAM to '{}'", path.display()))?;
        log::info!("Wrote cartridge RAM to '{}'", path.display());
    }

    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Cli::parse();

    let mut app_config = match &args.config_path {
        Some(path) => AppConfig::from_toml_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(storage_backend) = args.storage_backend {
        app_config.bus.storage_backend = storage_backend;
    }
    if let Some(unmapped_access) = args.unmapped_access {
        app_config.bus.unmapped_access = unmapped_access;
    }

    log::info!("Bus config: {}", app_config.bus);

    let mut cartridge = Cartridge::from_file(&args.rom_file_path)
        .with_context(|| format!("error loading cartridge from '{}'", args.rom_file_path))?;
    if let Some(path) = args.ram_file_path.as_ref().filter(|path| path.exists()) {
        let ram = fs::read(path)
            .with_context(|| format!("error reading cartridge RAM from '{}'", path.display()))?;
        cartridge = cartridge.with_ram(ram)?;
    }

    match app_config.bus.storage_backend {
        StorageBackend::TypedBuffer => run::<TypedBlock>(&args, &app_config, &cartridge),
        StorageBackend::NumericArray => run::<ArrayBlock>(&args, &app_config, &cartridge),
    }
}
