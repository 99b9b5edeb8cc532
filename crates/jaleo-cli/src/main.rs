use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use jaleo_control::{parse_command, Command, HELP};
use jaleo_engine::{EffectKind, Engine, EngineConfig};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name="jaleo", version, about="Real-time voice changer and sound board")]
struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd
}

#[derive(Subcommand)]
enum Cmd {
    /// List audio devices
    Devices,
    /// Run the voice changer, reading commands from stdin
    Run(RunArgs),
    /// Render a sound file through an effect, without audio devices
    Process {
        input: PathBuf,
        output: PathBuf,
        #[arg(short, long, default_value = "robot", value_parser = parse_effect)]
        effect: EffectKind,
        #[arg(short, long, default_value_t = 100, value_parser = clap::value_parser!(u8).range(0..=100))]
        gain: u8,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

#[derive(Args)]
struct PipelineArgs {
    /// Native pipeline sample rate in Hz
    #[arg(long, default_value_t = 44_100)]
    sample_rate: u32,
    /// Frames per processing block
    #[arg(long, default_value_t = 1024, value_parser = parse_block_size)]
    block_size: usize,
}

#[derive(Args)]
struct RunArgs {
    /// Input device name (case-insensitive substring)
    #[arg(long)]
    input: Option<String>,
    /// Output device name (case-insensitive substring)
    #[arg(long)]
    output: Option<String>,
    /// Input device index from `jaleo devices`
    #[arg(long)]
    input_index: Option<usize>,
    /// Output device index from `jaleo devices`
    #[arg(long)]
    output_index: Option<usize>,
    #[command(flatten)]
    pipeline: PipelineArgs,
    /// Hardware buffer size in frames, if the backend honours it
    #[arg(long)]
    device_buffer: Option<u32>,
    /// Seconds a device read or write may stall before the stream stops
    #[arg(long, default_value_t = 2.0)]
    device_timeout: f64,
    /// Sound bank file
    #[arg(long, default_value = "custom_sounds.bank")]
    bank: PathBuf,
    /// Effect selected at startup
    #[arg(short, long, default_value = "robot", value_parser = parse_effect)]
    effect: EffectKind,
    /// Volume at startup (0-100)
    #[arg(short, long, default_value_t = 80, value_parser = clap::value_parser!(u8).range(0..=100))]
    gain: u8,
    /// Start the voice changer right away
    #[arg(long)]
    autostart: bool,
}

impl RunArgs {
    fn into_config(self) -> Result<EngineConfig> {
        let device_timeout = Duration::try_from_secs_f64(self.device_timeout)
            .context("--device-timeout must be a non-negative number of seconds")?;
        Ok(EngineConfig {
            input_name: self.input,
            output_name: self.output,
            input_index: self.input_index,
            output_index: self.output_index,
            sample_rate: self.pipeline.sample_rate,
            block_size: self.pipeline.block_size,
            device_buffer: self.device_buffer,
            device_timeout,
            bank_path: self.bank,
            initial_effect: self.effect,
            initial_gain: self.gain,
        })
    }
}

fn parse_effect(s: &str) -> Result<EffectKind, String> {
    s.parse().map_err(|e: jaleo_engine::dsp::effect::UnknownEffect| e.to_string())
}

fn parse_block_size(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1 frame".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.cmd {
        Cmd::Devices => jaleo_engine::devices::print_devices(),
        Cmd::Run(args) => run(args),
        Cmd::Process { input, output, effect, gain, pipeline } => {
            let report = jaleo_engine::offline::process_file(
                &input,
                &output,
                effect,
                gain,
                pipeline.sample_rate,
                pipeline.block_size,
            )
            .with_context(|| format!("processing {}", input.display()))?;
            println!(
                "{} -> {}: {} blocks, {} -> {} samples",
                input.display(),
                output.display(),
                report.blocks,
                report.samples_in,
                report.samples_out
            );
            Ok(())
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(200);

fn run(args: RunArgs) -> Result<()> {
    let autostart = args.autostart;
    let cfg = args.into_config()?;
    let mut engine = Engine::open(cfg).context("Failed to open audio devices")?;

    if autostart {
        engine.start().context("Failed to start voice changer")?;
    }
    println!("{HELP}");
    println!("sound bank: {}", engine.config().bank_path.display());
    print_status(&engine);

    let failures = control_loop(&mut engine, &spawn_stdin(), POLL_INTERVAL)?;
    if failures > 0 {
        warn!(failures, "voice changer sessions ended on device errors");
    }
    engine.shutdown().context("Shutdown did not complete cleanly")
}

/// Stdin lines on a channel, so the control loop can wake up without input.
fn spawn_stdin() -> Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Runs commands until `quit` or end of input. Checks for a session that died
/// on a device error every `poll_every`, typed input or not. Returns how many
/// such sessions it reported.
fn control_loop(engine: &mut Engine, lines: &Receiver<io::Result<String>>, poll_every: Duration) -> Result<usize> {
    let mut failures = 0;
    prompt();
    loop {
        let line = match lines.recv_timeout(poll_every) {
            Ok(line) => line.context("Failed to read stdin")?,
            Err(RecvTimeoutError::Timeout) => {
                if report_exit(engine) {
                    failures += 1;
                    prompt();
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if report_exit(engine) {
            failures += 1;
        }
        match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(cmd) => {
                if let Err(e) = dispatch(engine, cmd) {
                    warn!(error = %e, "command failed");
                }
            }
            Err(e) => println!("{e}"),
        }
        prompt();
    }
    Ok(failures)
}

fn report_exit(engine: &mut Engine) -> bool {
    match engine.poll() {
        Some(e) => {
            error!(error = %e, "voice changer stopped");
            true
        }
        None => false,
    }
}

fn prompt() {
    print!("> ");
    io::stdout().flush().ok();
}

fn dispatch(engine: &mut Engine, cmd: Command) -> jaleo_engine::Result<()> {
    match cmd {
        Command::Effect(kind) => engine.select_effect(kind),
        Command::Gain(percent) => engine.set_gain(percent),
        Command::Start => engine.start()?,
        Command::Stop => engine.stop()?,
        Command::Play(slot) => engine.trigger_slot(slot)?,
        Command::Load(slot, path) => {
            engine.configure_slot(slot, &path)?;
            println!("sound {} <- {}", slot + 1, path.display());
        }
        Command::Clear(slot) => engine.clear_slot(slot)?,
        Command::Save => engine.save_bank()?,
        Command::Status => print_status(engine),
        Command::Help => println!("{HELP}"),
        Command::Quit | Command::Nop => {}
    }
    Ok(())
}

fn print_status(engine: &Engine) {
    let s = engine.status();
    let slots: Vec<String> = s.loaded_slots.iter().map(|i| (i + 1).to_string()).collect();
    println!(
        "{:?} | effect {} | gain {:.0}% | sounds [{}]",
        s.state,
        s.effect,
        s.gain * 100.0,
        slots.join(" ")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use jaleo_engine::backend::{MemoryCapture, MemoryRender};
    use jaleo_engine::StreamState;

    #[test]
    fn block_size_must_be_positive() {
        assert_eq!(parse_block_size("512"), Ok(512));
        assert!(parse_block_size("0").is_err());
        assert!(parse_block_size("-4").is_err());
    }

    #[test]
    fn idle_loop_reports_a_dead_session() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig { bank_path: dir.path().join("bank.bin"), ..EngineConfig::default() };
        let (render, _log) = MemoryRender::new();
        // one block of input, then the capture reports a device error
        let capture = MemoryCapture::new(vec![0i16; 1024]);
        let mut engine = Engine::with_devices(cfg, Box::new(capture), Box::new(render)).unwrap();
        engine.start().unwrap();

        // no input at all until the channel closes
        let (tx, rx) = mpsc::channel();
        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            drop(tx);
        });
        let failures = control_loop(&mut engine, &rx, Duration::from_millis(5)).unwrap();
        closer.join().unwrap();

        assert_eq!(failures, 1);
        assert_eq!(engine.state(), StreamState::Inactive);
        assert!(engine.poll().is_none());
        engine.shutdown().unwrap();
    }
}
