//! Binary entrypoint for the slipxfer CLI.
//!
//! Commands:
//! - `receive [--port <path>] [--input <file>] [--sink memory|file] [--ack]` - reassemble incoming transfers
//! - `send --port <path> --file <path> [--chunk <n>] [--no-ack]` - push a file to a receiver
//! - `encode --file <path> --out <path>` - write the SLIP stream for a file without a device
//! - `init` - create a starter `config.toml`
//!
//! See the library crate docs for module-level details: `slipxfer::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;

use slipxfer::config::{Config, SinkKind};
use slipxfer::link::{ByteSource, NullResponder, ReaderSource, Responder};
use slipxfer::server::{ReceiveServer, RunSummary};
use slipxfer::transfer::sender::encode_transfer;
use slipxfer::transfer::{FileSink, MemorySink, Receiver, Sink};

#[derive(Parser)]
#[command(name = "slipxfer")]
#[command(about = "File transfer over SLIP-framed serial links")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive transfers from a serial port or a captured byte stream
    Receive {
        /// Serial port (e.g., /dev/ttyUSB0); overrides the config
        #[arg(short, long, conflicts_with = "input")]
        port: Option<String>,
        /// Baud rate; overrides the config
        #[arg(short = 'b', long)]
        baud: Option<u32>,
        /// Read raw link bytes from a file instead of a port
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Where reassembled data goes
        #[arg(long, value_enum)]
        sink: Option<SinkKind>,
        /// Output directory for the file sink
        #[arg(short, long)]
        output: Option<String>,
        /// Reply ACK/END/BAD after every frame
        #[arg(long)]
        ack: bool,
    },
    /// Send a file to a receiver
    Send {
        /// Serial port
        #[arg(short, long)]
        port: Option<String>,
        /// Baud rate
        #[arg(short = 'b', long)]
        baud: Option<u32>,
        /// File to send
        #[arg(short, long)]
        file: PathBuf,
        /// DATA payload size (64..4096)
        #[arg(long)]
        chunk: Option<usize>,
        /// Do not wait for ACK after each frame
        #[arg(long)]
        no_ack: bool,
    },
    /// Write the SLIP stream for a file, for replay with `receive --input`
    Encode {
        /// File to encode
        #[arg(short, long)]
        file: PathBuf,
        /// Destination of the encoded stream
        #[arg(short, long)]
        out: PathBuf,
        /// DATA payload size (64..4096)
        #[arg(long)]
        chunk: Option<usize>,
        /// File id to use instead of a random one
        #[arg(long)]
        file_id: Option<u32>,
    },
    /// Write a default configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.command {
        Commands::Init => None,
        _ => Some(load_or_default(&cli.config).await?),
    };
    init_logging(&config, cli.verbose);
    let mut config = config.unwrap_or_default();

    match cli.command {
        Commands::Receive {
            port,
            baud,
            input,
            sink,
            output,
            ack,
        } => {
            if let Some(p) = port {
                config.serial.port = p;
            }
            if let Some(b) = baud {
                config.serial.baud_rate = b;
            }
            if let Some(s) = sink {
                config.transfer.sink = s;
            }
            if let Some(o) = output {
                config.transfer.output_dir = o;
            }
            config.transfer.flow_control |= ack;
            config.validate()?;

            let summary = match input {
                Some(path) => {
                    if config.transfer.flow_control {
                        warn!("Flow control has no effect when reading from {}", path.display());
                    }
                    let file = std::fs::File::open(&path)
                        .map_err(|e| anyhow!("Failed to open {}: {}", path.display(), e))?;
                    info!("Replaying link capture {}", path.display());
                    receive(&config, ReaderSource::new(file), NullResponder, false).await?
                }
                None => receive_serial(&config).await?,
            };
            println!("{}", serde_json::to_string(&summary)?);
        }
        Commands::Send {
            port,
            baud,
            file,
            chunk,
            no_ack,
        } => {
            if let Some(p) = port {
                config.serial.port = p;
            }
            if let Some(b) = baud {
                config.serial.baud_rate = b;
            }
            if let Some(c) = chunk {
                config.sender.chunk = c;
            }
            config.validate()?;
            send_serial(&config, file, !no_ack).await?;
        }
        Commands::Encode {
            file,
            out,
            chunk,
            file_id,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .map_err(|e| anyhow!("Failed to read {}: {}", file.display(), e))?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let file_id = file_id.unwrap_or_else(rand::random::<u32>);
            let stream = encode_transfer(
                &name,
                &data,
                file_id,
                chunk.unwrap_or(config.sender.chunk),
            )?;
            tokio::fs::write(&out, &stream).await?;
            info!(
                "Encoded {} ({} bytes, fid=0x{:08x}) into {} stream bytes at {}",
                file.display(),
                data.len(),
                file_id,
                stream.len(),
                out.display()
            );
        }
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
    }

    Ok(())
}

/// A missing config file is not an error; every setting has a default.
async fn load_or_default(path: &str) -> Result<Config> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        Config::load(path).await
    } else {
        Ok(Config::default())
    }
}

fn build_sink(config: &Config) -> Box<dyn Sink> {
    match config.transfer.sink {
        SinkKind::Memory => Box::new(MemorySink::new(config.transfer.sink_capacity)),
        SinkKind::File => Box::new(FileSink::new(
            &config.transfer.output_dir,
            config.transfer.sink_capacity,
        )),
    }
}

async fn receive<B: ByteSource, R: Responder>(
    config: &Config,
    source: B,
    responder: R,
    flow_control: bool,
) -> Result<RunSummary> {
    let receiver = Receiver::with_max_frame(build_sink(config), config.transfer.max_frame);
    let mut server = ReceiveServer::new(source, responder, receiver)
        .with_flow_control(flow_control)
        .with_idle_sleep(config.serial.idle_sleep());
    info!(
        "Receiving (sink={:?}, capacity={} bytes, flow_control={})",
        config.transfer.sink, config.transfer.sink_capacity, flow_control
    );
    server.run().await
}

#[cfg(feature = "serial")]
async fn receive_serial(config: &Config) -> Result<RunSummary> {
    use slipxfer::link::SerialLink;
    let link = SerialLink::open(
        &config.serial.port,
        config.serial.baud_rate,
        config.serial.read_timeout(),
    )?;
    info!(
        "Listening on {} at {} baud",
        link.port_name(),
        config.serial.baud_rate
    );
    let replies = link.try_clone()?;
    receive(config, link, replies, config.transfer.flow_control).await
}

#[cfg(not(feature = "serial"))]
async fn receive_serial(_config: &Config) -> Result<RunSummary> {
    Err(anyhow!(
        "Serial support not compiled in; rebuild with --features serial or use --input"
    ))
}

#[cfg(feature = "serial")]
async fn send_serial(config: &Config, file: PathBuf, flow_control: bool) -> Result<()> {
    use slipxfer::link::SerialLink;
    use slipxfer::transfer::{Sender, SenderOptions};
    use std::time::Duration;

    let link = SerialLink::open(
        &config.serial.port,
        config.serial.baud_rate,
        config.serial.read_timeout(),
    )?;
    let opts = SenderOptions {
        chunk: config.sender.chunk,
        flow_control,
        ack_timeout: Duration::from_millis(config.sender.ack_timeout_ms),
        max_retries: config.sender.max_retries,
    };
    let report = tokio::task::spawn_blocking(move || Sender::new(link, opts).send_file(&file))
        .await??;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

#[cfg(not(feature = "serial"))]
async fn send_serial(_config: &Config, _file: PathBuf, _flow_control: bool) -> Result<()> {
    Err(anyhow!("Serial support not compiled in; rebuild with --features serial"))
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .map(|c| c.logging.level_filter())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
    if let Some(f) = log_file {
        let file = std::sync::Mutex::new(f);
        // Mirror to the console only when someone is watching it
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = file.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
