use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use beacon_device::audio::{
    AudioSource, InputStream, LogAmplifier, OutputStream, PlaybackLoop, PlaybackTask, Recorder,
    play_tone,
};
use beacon_device::codec::adpcm_to_wav;
use beacon_device::ir::{IrTransmitter, LogIrTransmitter};
use beacon_device::modem::{LogPowerControl, Modem, UartPort, signal_percent};
use beacon_device::{
    CellularTransport, Config, LinkKind, SessionClient, SessionEvent, TcpTransport, Transport,
    ring_buffer,
};

/// Beacon Device - Voice-assistant device core
#[derive(Parser)]
#[command(name = "beacon-device", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/omni/beacon-device/config.toml)
    #[arg(short, long, env = "BEACON_DEVICE_CONFIG")]
    config: Option<PathBuf>,

    /// Network link: wifi or cellular
    #[arg(long)]
    link: Option<LinkKind>,

    /// Assistant server host
    #[arg(long)]
    host: Option<String>,

    /// Assistant server port
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Push-to-talk loop: record, send, play the reply (default)
    Run,
    /// Power on the cellular module and report its state
    Probe {
        /// Seconds to wait for network registration
        #[arg(short, long, default_value = "30")]
        registration_timeout: u64,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Record through the ADPCM encoder and save as WAV
    Record {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Output WAV path
        #[arg(short, long, default_value = "recording.wav")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,beacon_device=info",
        1 => "info,beacon_device=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(link) = cli.link {
        config.link = link;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => push_to_talk(config).await,
        Command::Probe {
            registration_timeout,
        } => probe(&config, Duration::from_secs(registration_timeout)).await,
        Command::TestMic { duration } => test_mic(&config, duration).await,
        Command::TestSpeaker => test_speaker(&config).await,
        Command::Record { duration, output } => record(&config, duration, &output).await,
    }
}

/// Open the configured link, bringing the modem up first when cellular
async fn open_transport(config: &Config) -> anyhow::Result<Box<dyn Transport>> {
    match config.link {
        LinkKind::Wifi => Ok(Box::new(TcpTransport::new())),
        LinkKind::Cellular => {
            let serial = UartPort::open(&config.modem.serial_port, config.modem.target_baud)?;
            let mut modem = Modem::new(serial, LogPowerControl, config.modem.clone());
            let health = modem.start().await?;
            tracing::info!(?health, baud = modem.baud(), "modem started");
            Ok(Box::new(CellularTransport::with_chunk_size(
                modem,
                config.session.upload_chunk_size,
            )))
        }
    }
}

/// Interactive record → send → play loop
#[allow(clippy::future_not_send)]
async fn push_to_talk(config: Config) -> anyhow::Result<()> {
    let (_output, sink) = OutputStream::open(config.audio.sample_rate)?;
    let (_input, mut source) = InputStream::open(config.audio.sample_rate)?;

    let (mut play, play_rx) = ring_buffer(config.audio.play_buffer_size);
    let mut playback = PlaybackTask::spawn(PlaybackLoop::new(
        play_rx,
        sink,
        LogAmplifier::default(),
        config.audio.silence_timeout,
    ))?;

    let mut transport = open_transport(&config).await?;
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let client = SessionClient::new(config.server.clone(), config.session.clone())
        .with_events(events_tx);

    let ui = tokio::spawn(async move {
        let mut ir = LogIrTransmitter::default();
        while let Some(event) = events_rx.recv().await {
            match event {
                SessionEvent::Status(status) => println!("[{status}]"),
                SessionEvent::Directive(directive) => match directive.ir_code() {
                    Ok(Some(code)) => {
                        if let Err(e) = ir.transmit(&code) {
                            tracing::warn!(error = %e, "ir transmit failed");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "bad ir code in directive"),
                },
                SessionEvent::Finished => println!("[ready]"),
            }
        }
    });

    let recorder = Recorder::new(config.audio.max_record_bytes);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    tracing::info!(link = transport.name(), server = %config.server.host, "beacon device ready");
    loop {
        println!("Press Enter to talk (Ctrl-D to quit)");
        if lines.next_line().await?.is_none() {
            break;
        }

        let recording = recorder.start(source)?;
        println!("Recording... press Enter to send");
        let quit = lines.next_line().await?.is_none();
        let (adpcm, returned) = recording.stop()?;
        source = returned;
        if quit {
            break;
        }

        if let Err(e) = client.exchange(transport.as_mut(), &adpcm, &mut play).await {
            tracing::warn!(error = %e, "exchange failed");
        }
    }

    drop(client);
    ui.await?;
    playback.stop();
    Ok(())
}

/// Bring the cellular module up and report state and signal
async fn probe(config: &Config, registration_timeout: Duration) -> anyhow::Result<()> {
    println!("Probing modem on {}...", config.modem.serial_port);

    let serial = UartPort::open(&config.modem.serial_port, config.modem.target_baud)?;
    let mut modem = Modem::new(serial, LogPowerControl, config.modem.clone());
    let health = modem.start().await?;

    println!("Health: {health:?}");
    println!("State:  {:?}", modem.state());
    println!("Baud:   {}", modem.baud());

    if !modem.is_synced() {
        println!("\nModule not responding");
        return Ok(());
    }

    match modem.signal_quality().await? {
        Some(csq) => println!("Signal: {csq} ({}%)", signal_percent(csq)),
        None => println!("Signal: unknown"),
    }

    let registered = modem.wait_for_registration(registration_timeout).await?;
    println!("Registered: {registered}");

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let (_input, mut source) = InputStream::open(config.audio.sample_rate)?;
    println!("Sample rate: {} Hz", config.audio.sample_rate);
    println!("---");

    let mut buf = vec![0i16; usize::try_from(config.audio.sample_rate)?];
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let n = source.read_samples(&mut buf)?;
        let samples = &buf[..n];
        let energy = calculate_rms(samples);
        let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:5} | [{meter}]", i + 1);

        source.discard_pending();
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");

    Ok(())
}

/// RMS energy of i16 samples, normalized to 0.0..=1.0
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let v = f32::from(s) / 32768.0;
            v * v
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with the confirmation tone
#[allow(clippy::future_not_send)]
async fn test_speaker(config: &Config) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 1kHz tone for 2 seconds\n");

    let (_output, mut sink) = OutputStream::open(config.audio.sample_rate)?;
    let mut amp = LogAmplifier::default();
    let duration = Duration::from_secs(2);

    play_tone(&mut sink, &mut amp, 1000.0, duration, config.audio.sample_rate)?;
    tokio::time::sleep(duration + Duration::from_millis(200)).await;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}

/// Record through the encoder and write a WAV for inspection
#[allow(clippy::future_not_send)]
async fn record(config: &Config, duration: u64, output: &std::path::Path) -> anyhow::Result<()> {
    let (_input, source) = InputStream::open(config.audio.sample_rate)?;
    let recorder = Recorder::new(config.audio.max_record_bytes);

    println!("Recording for {duration} seconds...");
    let recording = recorder.start(source)?;
    tokio::time::sleep(Duration::from_secs(duration)).await;
    let (adpcm, _source) = recording.stop()?;

    let wav = adpcm_to_wav(&adpcm, config.audio.sample_rate)?;
    tokio::fs::write(output, &wav).await?;

    println!(
        "Wrote {} ({} bytes ADPCM, {} bytes WAV)",
        output.display(),
        adpcm.len(),
        wav.len()
    );
    Ok(())
}
