//! microbus emulator - CLI entry point
//!
//! Commands:
//! - `microbus-emu run <program>` - Run an image or assembly file
//! - `microbus-emu debug <program>` - Interactive debugger
//! - `microbus-emu asm <source>` - Assemble to an image
//! - `microbus-emu disasm <image>` - Disassemble an image

use clap::{Parser, Subcommand, ValueEnum};
use microbus::cpu::clock::Clock;
use microbus::io::{Display, Typewriter};
use microbus::{Error, Image, Machine, MachineConfig, MachineState, Register};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "microbus-emu")]
#[command(version = "0.1.0")]
#[command(about = "Emulator of a microcoded 16-bit bus computer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Image or .asm file to execute (defaults to the configured image)
        program: Option<PathBuf>,
        /// Memory size in bytes
        #[arg(long)]
        ram_size: Option<usize>,
        /// Clock rate in ticks per second (0 = unthrottled)
        #[arg(long)]
        clock_rate: Option<u32>,
        /// Stop after this many ticks
        #[arg(long)]
        max_ticks: Option<u64>,
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Peripherals to attach, in port order
        #[arg(long, value_enum, default_values_t = [Device::Display])]
        device: Vec<Device>,
        /// Print the final machine state as JSON
        #[arg(long)]
        dump: bool,
    },
    /// Interactive debugger
    Debug {
        /// Image or .asm file to debug
        program: PathBuf,
        /// Memory size in bytes
        #[arg(long, default_value_t = microbus::cpu::memory::DEFAULT_MEMORY_SIZE)]
        ram_size: usize,
    },
    /// Assemble source to an image
    Asm {
        /// Path to the source file
        source: PathBuf,
        /// Output image file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Pad or truncate the image to this many bytes (0 = exact size)
        #[arg(long, default_value_t = 256)]
        output_size: usize,
    },
    /// Disassemble an image to assembler text
    Disasm {
        /// Path to the image
        image: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Device {
    /// Prints values as numbers
    Display,
    /// Prints values as characters
    Typewriter,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { program, ram_size, clock_rate, max_ticks, config, device, dump } => {
            run_program(program, ram_size, clock_rate, max_ticks, config, &device, dump)
        }
        Commands::Debug { program, ram_size } => debug_program(&program, ram_size),
        Commands::Asm { source, output, output_size } => assemble_file(&source, output, output_size),
        Commands::Disasm { image } => disassemble_file(&image),
    };

    if let Err(e) = result {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}

/// Load an image, assembling it first if the path ends in `.asm`.
fn load_program(path: &Path) -> Result<Image, Error> {
    if path.extension().is_some_and(|ext| ext == "asm") {
        let source = std::fs::read_to_string(path)?;
        let image = microbus::assemble(&source)?;
        println!("📝 Assembled {} words", image.len());
        Ok(image)
    } else {
        let image = microbus::load_image(path)?;
        println!("📂 Loaded {} words", image.trimmed_words().len());
        Ok(image)
    }
}

fn run_program(
    program: Option<PathBuf>,
    ram_size: Option<usize>,
    clock_rate: Option<u32>,
    max_ticks: Option<u64>,
    config_path: Option<PathBuf>,
    devices: &[Device],
    dump: bool,
) -> Result<(), Error> {
    let mut config = match &config_path {
        Some(path) => MachineConfig::from_file(path)?,
        None => MachineConfig::default(),
    };
    if let Some(size) = ram_size {
        config.memory_size = size;
    }
    if let Some(rate) = clock_rate {
        config.clock_rate = rate;
    }
    if program.is_some() {
        config.image = program;
    }
    config.validate()?;

    let path = config.image.clone().ok_or_else(|| {
        Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "no program given"))
    })?;
    println!("🔧 Running: {}", path.display());
    let image = load_program(&path)?;

    let mut machine = Machine::new(config.memory_size);
    machine.load_image(&image);
    for device in devices {
        let port = match device {
            Device::Display => machine.attach(Display::new),
            Device::Typewriter => machine.attach(Typewriter::new),
        };
        println!("🔌 {:?} on port {}", device, port);
    }

    println!();
    println!("━━━ Execution ━━━");
    let clock: Clock = config.clock();
    let outcome = machine.run_clocked(&clock, max_ticks);

    println!();
    println!("━━━ Result ━━━");
    println!("Ticks: {}", machine.ticks());
    println!("Instructions: {}", machine.instructions());
    println!("State: {:?}", machine.state());
    for (reg, value) in machine.regs.iter() {
        if reg != Register::AddressBackup {
            println!("{:>4}: {:>6}  ({:#06x})", reg.name(), value, value as u16);
        }
    }

    if machine.state() == MachineState::Running {
        println!();
        println!("⚠️  Reached max ticks limit ({}). Use --max-ticks to increase.", machine.ticks());
    }

    if dump {
        let snapshot = serde_json::to_string_pretty(&machine.snapshot())
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        println!("{}", snapshot);
    }

    // Report the fault only after the state has been shown.
    outcome?;
    Ok(())
}

#[cfg(feature = "tui")]
fn debug_program(path: &Path, ram_size: usize) -> Result<(), Error> {
    println!("🔍 Loading: {}", path.display());
    let image = load_program(path)?;
    MachineConfig { memory_size: ram_size, ..Default::default() }.validate()?;

    println!("🚀 Launching debugger...");
    microbus::run_debugger(image, ram_size)?;
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &Path, _ram_size: usize) -> Result<(), Error> {
    Err(Error::Io(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "built without the `tui` feature",
    )))
}

fn assemble_file(source_path: &Path, output: Option<PathBuf>, output_size: usize) -> Result<(), Error> {
    let out_path = output.unwrap_or_else(|| source_path.with_extension("bin"));
    println!("📝 Assembling: {} → {}", source_path.display(), out_path.display());

    let source = std::fs::read_to_string(source_path)?;
    let image = microbus::assemble(&source)?;
    println!("✓ Assembled {} words, starting at {}", image.len(), image.start_address());

    let size = (output_size > 0).then_some(output_size);
    if let Some(size) = size {
        let needed = image.to_bytes().len();
        if needed > size {
            log::warn!(target: "asm", "image needs {} bytes, truncated to {}", needed, size);
        }
    }
    microbus::save_image(&out_path, &image, size)?;

    println!("✓ Saved to {}", out_path.display());
    Ok(())
}

fn disassemble_file(path: &Path) -> Result<(), Error> {
    let image = microbus::load_image(path)?;
    println!("{}", microbus::disassemble(&image));
    Ok(())
}
