use std::path::{Path, PathBuf};
use std::{env, io::IsTerminal};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use x16dbg_cc65::{Container, ExportValue, FragmentKind, LibraryArchive, ObjectFile};
use x16dbg_debug::{Region, format_debugger_address, resolve_flag_slots, to_machine_address};
use x16dbg_link::{ReconcileOptions, RenderOptions, SourceAttributedBinary};

#[derive(Debug, Parser)]
#[command(
    name = "x16dbg",
    version,
    about = "Debug information tooling for cc65-built Commander X16 programs",
    long_about = None,
    after_help = "Examples:\n  x16dbg dump main.o\n  x16dbg verify -C cx16.cfg --binary game.prg main.o cx16.lib\n  x16dbg addr 04:C123"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the segments, fragments and symbols of an object or library.
    Dump(DumpArgs),
    /// Check a linked output file against its objects and print which source
    /// line produced each byte.
    Verify(VerifyArgs),
    /// Show how a debugger address maps onto the banked address space.
    Addr(AddrArgs),
}

#[derive(Debug, Parser)]
struct DumpArgs {
    /// Object (.o) or library (.lib) file.
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

#[derive(Debug, Parser)]
struct VerifyArgs {
    /// Objects and libraries passed to the linker, in link order.
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,
    /// Linker config the output was linked with.
    #[arg(short = 'C', long = "config", value_name = "CONFIG")]
    config: PathBuf,
    /// Linked output file to check.
    #[arg(long = "binary", value_name = "FILE")]
    binary: PathBuf,
    /// Output name `%O` stood for at link time. Defaults to the file name of
    /// the binary.
    #[arg(short = 'o', long = "output-name", value_name = "NAME")]
    output_name: Option<String>,
    /// Start address `%S` stood for at link time.
    #[arg(short = 'S', long = "start", value_name = "ADDR", default_value = "$0801", value_parser = parse_start)]
    start: u32,
    /// x16dbg.toml with a `[link]` table.
    #[arg(long = "settings", value_name = "TOML")]
    settings: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct AddrArgs {
    /// Debugger address (`bb:oooo`, `$hex` or hex), or a CPU address when a
    /// bank is given.
    #[arg(value_name = "ADDR")]
    address: String,
    #[arg(long = "ram-bank", value_name = "N")]
    ram_bank: Option<u8>,
    #[arg(long = "rom-bank", value_name = "N")]
    rom_bank: Option<u8>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Dump(args) => dump_command(args),
        Commands::Verify(args) => verify_command(args),
        Commands::Addr(args) => addr_command(args),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(stderr_supports_color())
        .init();
}

fn stderr_supports_color() -> bool {
    if env::var_os("NO_COLOR").is_some() {
        return false;
    }

    if let Some(force) = env::var_os("CLICOLOR_FORCE") {
        return force != "0";
    }

    if let Some(choice) = env::var_os("CLICOLOR")
        && choice == "0"
    {
        return false;
    }

    std::io::stderr().is_terminal()
}

fn parse_start(text: &str) -> Result<u32, String> {
    let value = x16dbg_eval::evaluate(text).map_err(|error| error.to_string())?;
    u32::try_from(value).map_err(|_| format!("start address {value} is out of range"))
}

fn dump_command(args: DumpArgs) -> anyhow::Result<()> {
    match x16dbg_cc65::read_container(&args.input)? {
        Container::Object(object) => print!("{}", describe_object(&object)?),
        Container::Archive(archive) => print!("{}", describe_archive(&archive)?),
    }
    Ok(())
}

fn describe_archive(archive: &LibraryArchive) -> anyhow::Result<String> {
    let mut out = String::new();
    for name in archive.member_names() {
        let object = archive.require(name)?;
        out.push_str(&describe_object(object)?);
    }
    Ok(out)
}

fn describe_object(object: &ObjectFile) -> anyhow::Result<String> {
    let mut out = format!(
        "object {} (version {:#06X}, offset {:#X})\n",
        object.name, object.version, object.offset
    );

    for segment in &object.segments {
        out.push_str(&format!(
            "  segment {}: {} bytes, align {}, {} fragments\n",
            object.segment_name(segment)?,
            segment.size,
            segment.alignment,
            segment.fragments.len()
        ));

        let mut offset = 0u32;
        for fragment in &segment.fragments {
            let what = match &fragment.kind {
                FragmentKind::Literal(bytes) => format!("literal {} bytes", bytes.len()),
                FragmentKind::Expression {
                    width,
                    signed,
                    expr,
                } => {
                    let sign = if *signed { "signed " } else { "" };
                    format!("{sign}expr {width} bytes = {expr}")
                }
                FragmentKind::Fill(count) => format!("fill {count} bytes"),
            };
            let location = match fragment.line_infos.last() {
                Some(line_info) => {
                    let (path, line) = object.source_location(*line_info)?;
                    format!("  {path}:{line}")
                }
                None => String::new(),
            };
            out.push_str(&format!("    +{offset:04X} {what}{location}\n"));
            offset += fragment.len();
        }
    }

    for import in &object.imports {
        out.push_str(&format!("  import {}\n", object.string(import.name)?));
    }
    for export in &object.exports {
        let value = match &export.value {
            ExportValue::Literal(value) => format!("${value:04X}"),
            ExportValue::Expression(expr) => expr.to_string(),
        };
        out.push_str(&format!(
            "  export {} = {value}\n",
            object.export_name(export)?
        ));
    }
    Ok(out)
}

fn verify_command(args: VerifyArgs) -> anyhow::Result<()> {
    let options = match &args.settings {
        Some(path) => x16dbg_link::load_options(path)?,
        None => ReconcileOptions::default(),
    };
    let output_name = match args.output_name {
        Some(name) => name,
        None => file_name(&args.binary)?,
    };

    let config = x16dbg_link::load_config_with_options(
        &args.config,
        &output_name,
        args.start,
        RenderOptions {
            color: stderr_supports_color(),
        },
    )?;

    let mut objects = Vec::new();
    let mut archives = Vec::new();
    for input in &args.inputs {
        match x16dbg_cc65::read_container(input)? {
            Container::Object(object) => objects.push(object),
            Container::Archive(archive) => archives.push(archive),
        }
    }
    tracing::debug!(
        objects = objects.len(),
        libraries = archives.len(),
        "loaded link inputs"
    );

    let bytes = std::fs::read(&args.binary)
        .with_context(|| format!("failed to read '{}'", args.binary.display()))?;
    let mut graph = x16dbg_debug::SourceGraph::new();
    let binary = x16dbg_link::reconcile(
        &config,
        &output_name,
        &objects,
        &archives,
        &bytes,
        &mut graph,
        &options,
    )
    .with_context(|| format!("failed to verify '{}'", args.binary.display()))?;

    print!("{}", x16dbg_link::render_attribution(&binary, &graph));
    print_summary(&binary);
    Ok(())
}

fn print_summary(binary: &SourceAttributedBinary) {
    println!(
        "verified '{}': {} attributed bytes from {}",
        binary.file_name,
        binary.bytes.len(),
        format_debugger_address(binary.base)
    );
    for (area, end) in &binary.area_ends {
        println!("  area {area} ends at {}", format_debugger_address(*end));
    }
}

fn file_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("'{}' has no file name", path.display()))
}

fn addr_command(args: AddrArgs) -> anyhow::Result<()> {
    let debugger_address = if args.ram_bank.is_some() || args.rom_bank.is_some() {
        let text = args.address.trim();
        let digits = text
            .strip_prefix('$')
            .or_else(|| text.strip_prefix("0x"))
            .unwrap_or(text);
        let address = u16::from_str_radix(digits, 16)
            .with_context(|| format!("invalid CPU address '{}'", args.address))?;
        x16dbg_debug::to_debugger_address(
            address,
            args.ram_bank.unwrap_or_default(),
            args.rom_bank.unwrap_or_default(),
        )
    } else {
        x16dbg_debug::parse_debugger_address(&args.address)?
    };

    let machine = to_machine_address(debugger_address);
    let region = match machine.region() {
        Region::Direct => "direct",
        Region::BankedRam => "banked RAM",
        Region::BankedRom => "banked ROM",
    };
    let (primary, secondary) = resolve_flag_slots(machine.bank(), machine.address);

    println!(
        "{} (${debugger_address:06X})",
        format_debugger_address(debugger_address)
    );
    println!("  cpu address: ${:04X}", machine.address);
    println!("  region: {region}");
    println!(
        "  ram bank: {}, rom bank: {}",
        machine.ram_bank, machine.rom_bank
    );
    println!("  flag slots: ${primary:06X}, ${secondary:06X}");
    Ok(())
}
