use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use sigpad::surface::from_png_data_url;
use sigpad::{
    CaptureOutcome, CaptureOutput, EventBus, EventFilter, InputMode, PadSimulator,
    SignatureCapture, SignatureRequest, SigpadConfig, SimulatorKeyboard, SurfaceOptions,
    TransportSession,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "sigpad")]
#[command(about = "Capture signatures from a hardware signature pad")]
#[command(version)]
#[command(long_about = "Captures handwritten signatures from a signature pad attached to a local \
pad server reachable over WebSocket, and ships a simulator of that server for development.")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, default_value = "sigpad.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Write logs to a file instead of stderr
    #[arg(long, value_name = "FILE", help = "Append log output to FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture one signature from the hardware pad
    Capture {
        /// PNG file or directory to write; prints the data URL when omitted
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Index of the pad in the discovery list
        #[arg(short, long, value_name = "INDEX")]
        pad: Option<u32>,
    },
    /// List the pads the server can see
    Pads,
    /// Run a simulated pad server driven from the keyboard
    Simulate {
        #[arg(short, long, default_value_t = 49494)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting sigpad v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match SigpadConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate().context("invalid configuration")?;

    match args.command.unwrap_or(Commands::Capture {
        output: None,
        pad: None,
    }) {
        Commands::Capture { output, pad } => {
            let pad_index = pad.unwrap_or(config.server.pad_index);
            run_capture(&config, pad_index, output.as_deref()).await
        }
        Commands::Pads => list_pads(&config).await,
        Commands::Simulate { port } => run_simulator(port).await,
    }
}

async fn run_capture(config: &SigpadConfig, pad_index: u32, output: Option<&Path>) -> Result<()> {
    let session = TransportSession::from_config(config);
    let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));

    let mut status = event_bus.subscribe_filtered(EventFilter::All, "cli");
    let status_task = tokio::spawn(async move {
        while let Ok(event) = status.recv().await {
            eprintln!("• {}", event.description());
        }
    });

    let captured: Arc<Mutex<Option<CaptureOutput>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&captured);
    let surface = SignatureCapture::new(
        SurfaceOptions::from_config(&config.surface),
        session.clone(),
        move |value| *sink.lock() = Some(value),
    )?
    .with_event_bus(Arc::clone(&event_bus))
    .with_signature_request(SignatureRequest::from(&config.signature))
    .with_pad_index(pad_index);

    surface.set_input_mode(InputMode::Hardware).await?;
    eprintln!("Please sign on the pad and press confirm");

    let outcome = tokio::select! {
        outcome = surface.start_hardware_capture() => outcome?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, releasing the pad");
            surface.unmount().await;
            CaptureOutcome::Superseded
        }
    };

    session.disconnect().await;
    status_task.abort();

    match outcome {
        CaptureOutcome::Published => {}
        CaptureOutcome::Failed { message } => bail!(message),
        CaptureOutcome::Superseded => bail!("signature capture was interrupted"),
    }

    let value = captured.lock().take();
    let Some(CaptureOutput::Image(data_url)) = value else {
        bail!("no signature image was published");
    };

    match output {
        Some(path) => {
            let path = resolve_output_path(path);
            let image = from_png_data_url(&data_url)?;
            image
                .save_with_format(&path, image::ImageFormat::Png)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Signature written to {}", path.display());
            println!("{}", path.display());
        }
        None => println!("{}", data_url),
    }
    Ok(())
}

/// Directories get a timestamped file name
fn resolve_output_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        path.join(format!("signature_{}.png", stamp))
    } else {
        path.to_path_buf()
    }
}

async fn list_pads(config: &SigpadConfig) -> Result<()> {
    let session = TransportSession::from_config(config);
    session.connect().await?;
    let pads = session.search_pads().await;
    session.disconnect().await;

    let pads = pads?;
    if pads.is_empty() {
        println!("No {} signature pads found", config.server.pad_subset);
        return Ok(());
    }
    for (index, pad) in pads.iter().enumerate() {
        println!(
            "{}: {} serial {} via {}",
            index, pad.pad_type, pad.serial, pad.connection
        );
    }
    Ok(())
}

async fn run_simulator(port: u16) -> Result<()> {
    let simulator = PadSimulator::new()
        .bind(&format!("127.0.0.1:{}", port))
        .await?;
    println!("Simulated pad server on {}", simulator.url());

    let keyboard = SimulatorKeyboard::new(simulator.handle());
    let quit = keyboard.start().await?;

    tokio::select! {
        _ = quit => info!("Simulator stopped by user"),
        _ = tokio::signal::ctrl_c() => info!("Simulator interrupted"),
    }
    keyboard.stop().await?;
    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sigpad={}", log_level)));

    let (writer, guard) = match &args.log_file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path
                .file_name()
                .context("log file path has no file name")?;
            let appender =
                tracing_appender::rolling::never(directory.unwrap_or(Path::new(".")), file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (fmt::writer::BoxMakeWriter::new(writer), Some(guard))
        }
        None => (fmt::writer::BoxMakeWriter::new(std::io::stderr), None),
    };
    let ansi = args.log_file.is_none();

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(true)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# sigpad configuration file");
    println!("# Every key can be overridden with SIGPAD_<SECTION>__<KEY>, e.g. SIGPAD_SERVER__URL");
    println!();
    println!("{}", SigpadConfig::default().to_toml()?);
    Ok(())
}
