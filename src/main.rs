use clap::Parser;
use serial_transport::config::{Config, ConfigLoader, LogFormat, LoggingConfig};
use serial_transport::{
    BaudRate, DataBits, Parity, ReceiveParameters, SerialTransport, StopBits, TraceLevel,
};
use std::path::PathBuf;
use std::process::ExitCode;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "serial-transport",
    version,
    about = "Send one message over a serial port and print the reply.",
    long_about = "Opens a serial port, sends the message followed by a newline, waits for a newline-terminated reply and prints it. Settings come from the config file and environment, then from these flags."
)]
struct Args {
    /// Serial port, e.g. /dev/ttyUSB0 or COM3. Config aliases are resolved.
    #[arg(short = 'S', long)]
    port: Option<String>,

    /// Baud rate.
    #[arg(short, long)]
    baud: Option<u32>,

    /// Data bits (5-8).
    #[arg(short, long)]
    data_bits: Option<u8>,

    /// Parity: none, odd, even, mark or space.
    #[arg(short, long)]
    parity: Option<Parity>,

    /// Stop bits: one or two.
    #[arg(short, long)]
    stop_bits: Option<StopBits>,

    /// Message to send.
    #[arg(short, long, default_value = "Hello")]
    message: String,

    /// Trace level: off, error, warning, info or verbose.
    #[arg(short, long)]
    trace: Option<TraceLevel>,

    /// How long to wait for the reply, in milliseconds.
    #[arg(short, long)]
    wait: Option<i64>,

    /// Locale for lifecycle messages, e.g. de or fi-FI.
    #[arg(long)]
    lang: Option<String>,

    /// List available serial ports and exit.
    #[arg(long)]
    list: bool,

    /// Explicit config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.logging);

    if args.list {
        return match SerialTransport::port_names() {
            Ok(names) => {
                for name in names {
                    println!("{name}");
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to get available serial ports: {e}");
                ExitCode::FAILURE
            }
        };
    }

    match run(&config, &args.message) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Config file and environment first, then command-line flags.
fn load_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let mut config = loader.into_config();

    if let Some(port) = &args.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = BaudRate::try_from(baud)?;
    }
    if let Some(bits) = args.data_bits {
        config.serial.data_bits = DataBits::try_from(bits)?;
    }
    if let Some(parity) = args.parity {
        config.serial.parity = parity;
    }
    if let Some(stop_bits) = args.stop_bits {
        config.serial.stop_bits = stop_bits;
    }
    if let Some(level) = args.trace {
        config.transport.trace_level = level;
    }
    if let Some(wait) = args.wait {
        config.transport.wait_time_ms = wait;
    }
    if let Some(lang) = &args.lang {
        config.transport.locale = lang.clone();
    }
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    let fmt = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = match logging.format {
        LogFormat::Json => registry.with(fmt.json()).try_init(),
        LogFormat::Pretty => registry.with(fmt.pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt.compact()).try_init(),
    };
}

fn run(config: &Config, message: &str) -> serial_transport::Result<()> {
    let transport = config.transport();

    transport.on_error(|err| eprintln!("error: {err}"));
    transport.on_received(|event| {
        println!("Async data: {}", String::from_utf8_lossy(&event.data));
    });
    transport.on_state_change(|state| println!("Media state change : {state}"));
    transport.on_trace(|event| println!("Trace: {:?} {}", event.kind, event.text));

    transport.validate()?;
    println!("Host port: {}", transport.port_name());
    println!("Message: '{message}'");
    println!("Trace level {}", transport.trace_level());

    if let Err(e) = transport.open() {
        match SerialTransport::port_names() {
            Ok(names) => eprintln!("Available serial ports: {}", names.join(",")),
            Err(list_err) => eprintln!("Failed to get available serial ports: {list_err}"),
        }
        return Err(e);
    }

    let outcome = exchange(&transport, config, message);
    let closed = transport.close();
    outcome.and(closed)?;
    println!("Exit");
    Ok(())
}

/// Send `message` and a newline, then wait for one newline-terminated reply.
fn exchange(
    transport: &SerialTransport,
    config: &Config,
    message: &str,
) -> serial_transport::Result<()> {
    let _sync = transport.synchronous();
    transport.send(message, None)?;
    transport.send("\n", None)?;
    let mut params = ReceiveParameters::<String>::new()
        .with_eop("\n")
        .with_wait_time(config.transport.wait_time_ms);
    if transport.receive(&mut params)? {
        println!("Sync data: {}", params.reply.unwrap_or_default());
    } else {
        println!("No reply within {} ms", config.transport.wait_time_ms);
    }
    Ok(())
}
