//! CLI entry point: load a Thumb application image, run it, dump the state.

use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use serde::Serialize;
#[cfg(test)]
use tempfile as _;
use thumb_core::{
    disassemble, is_wide_prefix, load_image, return_to_caller, AppHeader, Core, CoreConfig,
    CoreState, Decoder, FaultClass, RegisterFile, StopReason, DEFAULT_CODE_BYTES,
    DEFAULT_LOAD_ADDRESS, DEFAULT_RAM_BYTES,
};
use tracing::{info, Level};

/// Supervisor call the runtime uses to return from a host callback.
const RETURN_SVC: u8 = 129;

#[derive(Parser, Debug)]
#[command(name = "thumb-run", version)]
#[command(about = "Run a Thumb application image on the instruction-set simulator", long_about = None)]
struct Args {
    /// Application image to load
    image: PathBuf,

    /// Code-region capacity in bytes
    #[arg(long, value_parser = parse_size, default_value_t = DEFAULT_CODE_BYTES)]
    code_bytes: usize,

    /// Working-memory capacity in bytes
    #[arg(long, value_parser = parse_size, default_value_t = DEFAULT_RAM_BYTES)]
    ram_bytes: usize,

    /// Code-region address the image is copied to
    #[arg(long, value_parser = parse_address, default_value_t = DEFAULT_LOAD_ADDRESS)]
    load_address: u32,

    /// Address of the application header (defaults to the load address)
    #[arg(long, value_parser = parse_address)]
    header_offset: Option<u32>,

    /// Maximum number of instructions to execute
    #[arg(long, value_parser = parse_count, default_value_t = 1_000_000)]
    max_steps: u64,

    /// Print the final state as JSON instead of the text dump
    #[arg(long, action = ArgAction::SetTrue)]
    dump_json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Parses a decimal or `0x`-prefixed hexadecimal number.
fn parse_count(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid number {text:?}: {e}"))
}

fn parse_address(text: &str) -> Result<u32, String> {
    parse_count(text).and_then(|value| {
        u32::try_from(value).map_err(|_| format!("{text:?} does not fit in 32 bits"))
    })
}

fn parse_size(text: &str) -> Result<usize, String> {
    parse_address(text).and_then(|value| {
        usize::try_from(value).map_err(|_| format!("size {text:?} does not fit this platform"))
    })
}

const fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

#[derive(Serialize)]
struct Report<'a> {
    steps: u64,
    stop: String,
    fault_class: Option<FaultClass>,
    fault_address: Option<u32>,
    header: &'a AppHeader,
    registers: &'a RegisterFile,
}

fn describe_stop(stop: &StopReason) -> String {
    match stop {
        StopReason::Halted => "halted".to_string(),
        StopReason::ReturnedToHost => "returned to host".to_string(),
        StopReason::StepLimit => "step limit reached".to_string(),
        StopReason::Faulted(error) => format!("fault: {error}"),
    }
}

/// Disassembles the instruction at `addr`, when it still decodes.
fn instruction_at(state: &CoreState, addr: u32) -> Option<String> {
    let first = state.memory.read_halfword(addr).ok()?;
    let instr = if is_wide_prefix(first) {
        let second = state.memory.read_halfword(addr.wrapping_add(2)).ok()?;
        Decoder::decode32((u32::from(first) << 16) | u32::from(second)).ok()?
    } else {
        Decoder::decode16(first).ok()?
    };
    Some(disassemble(&instr, Some(addr)))
}

/// Reads the header out of the image file before anything touches memory.
fn read_header(bytes: &[u8], load_address: u32, header_address: u32) -> Result<AppHeader> {
    let Some(offset) = header_address.checked_sub(load_address) else {
        bail!(
            "header address {header_address:#010x} lies below the load address {load_address:#010x}"
        );
    };
    let record = usize::try_from(offset)
        .ok()
        .and_then(|offset| bytes.get(offset..))
        .with_context(|| format!("header offset {offset:#x} lies past the end of the image"))?;
    let header = AppHeader::from_bytes(record).context("reading application header")?;
    header.validate().context("rejecting image")?;
    Ok(header)
}

fn run(args: &Args) -> Result<()> {
    let bytes = fs::read(&args.image)
        .with_context(|| format!("reading image {}", args.image.display()))?;
    let header_address = args.header_offset.unwrap_or(args.load_address);
    let header = read_header(&bytes, args.load_address, header_address)?;

    let config = CoreConfig {
        code_bytes: args.code_bytes,
        ram_bytes: args.ram_bytes,
    };
    let mut core = Core::new(&config).context("invalid core configuration")?;
    load_image(&mut core.state_mut().memory, args.load_address, &bytes)
        .with_context(|| format!("loading image at {:#010x}", args.load_address))?;
    header
        .apply(core.state_mut())
        .context("applying application header")?;
    core.register_svc(RETURN_SVC, return_to_caller);

    info!(
        image = %args.image.display(),
        len = bytes.len(),
        entry = format_args!("{:#010x}", header.entry),
        "starting run"
    );
    let outcome = core.run(args.max_steps);
    info!(steps = outcome.steps, stop = %describe_stop(&outcome.stop), "run finished");

    let fault = match &outcome.stop {
        StopReason::Faulted(error) => Some((error, core.last_fetch_address())),
        _ => None,
    };

    if args.dump_json {
        let report = Report {
            steps: outcome.steps,
            stop: describe_stop(&outcome.stop),
            fault_class: fault.map(|(error, _)| error.class()),
            fault_address: fault.map(|(_, addr)| addr),
            header: &header,
            registers: &core.state().registers,
        };
        serde_json::to_writer_pretty(io::stdout().lock(), &report)
            .context("writing JSON report")?;
        println!();
    } else {
        println!("{}", core.state().registers);
        println!(
            "{} after {} instructions",
            describe_stop(&outcome.stop),
            outcome.steps
        );
    }

    if let Some((error, addr)) = fault {
        let location = instruction_at(core.state(), addr)
            .map_or_else(String::new, |text| format!(" ({text})"));
        bail!(
            "{:?} fault at {addr:#010x}{location}: {error}",
            error.class()
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(log_level(args.verbose))
        .with_writer(io::stderr)
        .init();
    run(&args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_parse_as_decimal_or_hex() {
        assert_eq!(parse_address("22784"), Ok(0x5900));
        assert_eq!(parse_address("0x5900"), Ok(0x5900));
        assert_eq!(parse_address("0X2000_0000"), Ok(0x2000_0000));
        assert!(parse_address("0xZZ").is_err());
        assert!(parse_address("-1").is_err());
        assert_eq!(parse_size("0x1000"), Ok(4096));
        assert_eq!(parse_count("0x1_0000_0000"), Ok(1 << 32));
        assert!(parse_address("0x1_0000_0000").is_err());
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(log_level(0), Level::WARN);
        assert_eq!(log_level(1), Level::INFO);
        assert_eq!(log_level(2), Level::DEBUG);
        assert_eq!(log_level(7), Level::TRACE);
    }

    #[test]
    fn defaults_follow_the_core() {
        let args = Args::try_parse_from(["thumb-run", "app.bin"]).unwrap();
        assert_eq!(args.code_bytes, DEFAULT_CODE_BYTES);
        assert_eq!(args.ram_bytes, DEFAULT_RAM_BYTES);
        assert_eq!(args.load_address, DEFAULT_LOAD_ADDRESS);
        assert_eq!(args.header_offset, None);
        assert!(!args.dump_json);
    }

    #[test]
    fn flags_parse() {
        let args = Args::try_parse_from([
            "thumb-run",
            "app.bin",
            "--ram-bytes",
            "0x2000",
            "--header-offset",
            "0x5a00",
            "--max-steps",
            "0x40",
            "-vv",
        ])
        .unwrap();
        assert_eq!(args.ram_bytes, 0x2000);
        assert_eq!(args.header_offset, Some(0x5A00));
        assert_eq!(args.max_steps, 0x40);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn header_below_load_address_is_rejected() {
        let error = read_header(&[0; 0x40], 0x5900, 0x5800).unwrap_err();
        assert!(error.to_string().contains("below the load address"));
    }

    #[test]
    fn short_image_is_rejected() {
        let error = read_header(&[0; 0x10], 0x5900, 0x5900).unwrap_err();
        assert!(error.to_string().contains("reading application header"));
    }

    #[test]
    fn stop_reasons_describe_themselves() {
        assert_eq!(describe_stop(&StopReason::ReturnedToHost), "returned to host");
        assert_eq!(describe_stop(&StopReason::StepLimit), "step limit reached");
    }
}
