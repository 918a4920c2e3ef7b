use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use max1464::config::Config;
use max1464::protocol::parse_number;
use max1464::{CpuPort, InterfaceMode, Max1464, ModuleRegister, Partition};

#[derive(Parser)]
#[command(
    name = "max1464",
    version,
    about = "Command-line programmer for the MAX1464 sensor signal processor"
)]
struct Cli {
    /// YAML file describing the transport
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use a spidev device, overriding the config file
    #[arg(long, global = true)]
    spidev: Option<String>,

    /// Log the wire traffic instead of talking to a chip
    #[arg(long, global = true)]
    dry_run: bool,

    /// More output, repeat for wire-level tracing
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the CPU program counter and accumulator
    Info {},
    /// Halt the CPU
    Halt {},
    /// Let a halted CPU run
    Release {},
    /// Reset the program counter and run
    Reset {},
    /// Execute one instruction of a halted CPU
    Step {
        /// Number of instructions
        #[arg(default_value_t = 1)]
        count: u32,
    },
    /// Erase a flash partition, or both
    Erase {
        /// Partition to erase, both when omitted
        #[arg(short, long)]
        partition: Option<Partition>,
    },
    /// Program a HEX or binary file and reset the CPU
    Flash {
        path: PathBuf,
        #[arg(short, long, default_value = "0")]
        partition: Partition,
        /// Verify the partition after programming
        #[arg(long)]
        verify: bool,
        /// Leave the CPU halted afterwards
        #[arg(long)]
        no_reset: bool,
    },
    /// Read a partition out as Intel HEX
    Dump {
        #[arg(short, long, default_value = "0")]
        partition: Partition,
        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print a hexdump instead of Intel HEX
        #[arg(long)]
        hexdump: bool,
    },
    /// Compare a partition with a HEX or binary file
    Verify {
        path: PathBuf,
        #[arg(short, long, default_value = "0")]
        partition: Partition,
    },
    /// Read a CPU port
    ReadPort { port: CpuPort },
    /// Write a CPU port
    WritePort {
        port: CpuPort,
        #[arg(value_parser = parse_word)]
        value: u16,
    },
    /// Read a module register, by name or address
    ReadReg { register: ModuleRegister },
    /// Write a module register, by name or address
    WriteReg {
        register: ModuleRegister,
        #[arg(value_parser = parse_word)]
        value: u16,
    },
    /// Switch the chip between 3-wire and 4-wire transfers
    Mode { mode: InterfaceMode },
}

fn parse_word(s: &str) -> Result<u16> {
    let value = parse_number(s).ok_or_else(|| anyhow::format_err!("not a number: {:?}", s))?;
    Ok(u16::try_from(value)?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let config = if cli.dry_run {
        Config::trace()
    } else if let Some(device) = &cli.spidev {
        Config::spidev(device.as_str())
    } else if let Some(path) = &cli.config {
        Config::load(path)?
    } else {
        anyhow::bail!("no transport configured, pass --config, --spidev or --dry-run");
    };

    let transport = config.open_transport()?;
    let mut chip = Max1464::new(transport).with_progress(true);
    let mode = config.interface_mode();
    if mode != chip.interface_mode() {
        chip.set_interface_mode(mode)?;
    }

    match cli.command {
        Commands::Info {} => {
            chip.dump_info()?;
        }
        Commands::Halt {} => {
            chip.halt_cpu()?;
            log::info!("CPU halted");
        }
        Commands::Release {} => {
            chip.release_cpu()?;
            log::info!("CPU running");
        }
        Commands::Reset {} => {
            chip.reset_cpu()?;
            log::info!("CPU reset");
        }
        Commands::Step { count } => {
            for _ in 0..count {
                chip.single_step_cpu()?;
            }
            let pc = chip.read_cpu_program_counter()?;
            log::info!("PC: 0x{:04x}", pc);
        }
        Commands::Erase { partition } => {
            match partition {
                Some(p) => chip.erase_flash_partition(p)?,
                None => chip.erase_flash_memory()?,
            }
            log::info!("Flash erased");
        }
        Commands::Flash {
            path,
            partition,
            verify,
            no_reset,
        } => {
            let lines = max1464::format::read_firmware_lines(&path)?;
            log::info!("Flashing {} lines to {}", lines.len(), partition);
            chip.flash_hex_lines(partition, &lines)?;
            if verify {
                let image = max1464::format::read_firmware_from_file(&path)?;
                chip.verify_flash_partition(partition, &image)?;
            }
            if !no_reset {
                chip.reset_cpu()?;
            }
        }
        Commands::Dump {
            partition,
            output,
            hexdump,
        } => {
            if hexdump {
                let image = chip.read_flash_partition_to_vec(partition)?;
                let mut out = io::stdout().lock();
                hxdmp::hexdump(&image, &mut out)?;
            } else if let Some(path) = output {
                let file = BufWriter::new(File::create(&path)?);
                chip.read_flash_partition(partition, file)?;
                log::info!("{} written to {}", partition, path.display());
            } else {
                chip.read_flash_partition(partition, io::stdout().lock())?;
            }
        }
        Commands::Verify { path, partition } => {
            let image = max1464::format::read_firmware_from_file(&path)?;
            log::info!("Firmware size: {}", image.len());
            chip.verify_flash_partition(partition, &image)?;
            log::info!("Verified!");
        }
        Commands::ReadPort { port } => {
            let value = chip.read_cpu_port(port)?;
            println!("{} = 0x{:04x}", port, value);
        }
        Commands::WritePort { port, value } => {
            chip.write_cpu_port(value, port)?;
        }
        Commands::ReadReg { register } => {
            let value = chip.read_module_register(register)?;
            println!("{} = 0x{:04x}", register, value);
        }
        Commands::WriteReg { register, value } => {
            chip.write_module_register(value, register)?;
        }
        Commands::Mode { mode } => {
            chip.set_interface_mode(mode)?;
            log::info!("Chip switched to {} transfers", mode);
        }
    }

    Ok(())
}
