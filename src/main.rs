use anyhow::Context;
use clap::{Parser, Subcommand};
use shiftchef::config::Config;
use shiftchef::typing::InputMethod;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shiftchef", version, about = "Autopilot for The Chef's Shift")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Capture, plan and type in a loop (default)
    Run {
        /// Stop after this many cycles once the queue has drained
        #[arg(long)]
        cycles: Option<u32>,
        /// Override typing.method: key or text
        #[arg(long)]
        method: Option<String>,
    },
    /// Capture the game window once and print the uploaded URL
    Capture,
    /// Run the planner on existing screenshot URLs and print the words
    Plan {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// List visible window titles
    Windows,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shiftchef=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command.unwrap_or(Command::Run { cycles: None, method: None }) {
        Command::Run { cycles, method } => {
            if let Some(method) = method {
                config.typing.method = InputMethod::from_str(&method);
            }
            commands::run(&config, cycles)
        }
        Command::Capture => commands::capture(&config).map(|()| ExitCode::SUCCESS),
        Command::Plan { urls } => commands::plan(&config, &urls).map(|()| ExitCode::SUCCESS),
        Command::Windows => commands::windows().map(|()| ExitCode::SUCCESS),
    }
}

#[cfg(feature = "desktop")]
mod commands {
    use anyhow::Context;
    use shiftchef::automation::{AutomationLoop, LoopOutcome};
    use shiftchef::capture::{ImgurPublisher, ScreenPublisher};
    use shiftchef::config::Config;
    use shiftchef::desktop::{self, DesktopLocator};
    use shiftchef::planner::{Planner, VisionPlanner};
    use shiftchef::typing::{DispatchTiming, EnigoSink, InputDispatcher, WordQueue};
    use shiftchef::window::WindowLocator;
    use std::process::ExitCode;
    use std::sync::Arc;

    /// Exit status for a run that ended on Ctrl+C
    const EXIT_INTERRUPTED: u8 = 130;

    fn publisher(config: &Config) -> anyhow::Result<ImgurPublisher> {
        config.require_imgur()?;
        ImgurPublisher::new(
            &config.imgur,
            &config.screenshot_dir,
            config.cycle.capture_settle(),
        )
        .context("building Imgur client")
    }

    fn planner(config: &Config) -> anyhow::Result<VisionPlanner> {
        config.require_vision()?;
        VisionPlanner::new(&config.vision).context("building vision client")
    }

    pub fn run(config: &Config, cycles: Option<u32>) -> anyhow::Result<ExitCode> {
        let publisher = publisher(config)?;
        let planner = planner(config)?;

        let (shutdown_tx, shutdown_rx) = flume::bounded::<()>(1);
        ctrlc::set_handler(move || {
            let _ = shutdown_tx.try_send(());
        })
        .context("installing Ctrl+C handler")?;

        let sink = EnigoSink::new(config.typing.method).context("initialising keyboard input")?;
        let locator: Arc<dyn WindowLocator> = Arc::new(DesktopLocator::new());
        let queue = Arc::new(WordQueue::new());
        let dispatcher = InputDispatcher::new(
            &config.window_title,
            queue,
            Arc::clone(&locator),
            Box::new(sink),
            DispatchTiming::from(&config.typing),
        );

        let mut automation = AutomationLoop::new(
            &config.window_title,
            dispatcher,
            locator,
            Box::new(publisher),
            Box::new(planner),
        )
        .with_cycle_delay(config.cycle.delay())
        .with_max_cycles(cycles);

        let report = automation.run(&shutdown_rx)?;
        println!(
            "{} after {} cycles: {}",
            report.outcome,
            report.cycles,
            report.stats.summary()
        );

        Ok(match report.outcome {
            LoopOutcome::Interrupted => ExitCode::from(EXIT_INTERRUPTED),
            LoopOutcome::Completed => ExitCode::SUCCESS,
        })
    }

    pub fn capture(config: &Config) -> anyhow::Result<()> {
        let publisher = publisher(config)?;
        let window = DesktopLocator::new().find(&config.window_title)?;
        let url = publisher.capture_and_publish(window.as_ref())?;
        println!("{url}");
        Ok(())
    }

    pub fn plan(config: &Config, urls: &[String]) -> anyhow::Result<()> {
        let planner = planner(config)?;
        for url in urls {
            let words = planner
                .plan(url)
                .with_context(|| format!("planning {url}"))?;
            let words: Vec<&str> = words.iter().map(|w| w.as_str()).collect();
            println!("{url}: {}", words.join(" "));
        }
        Ok(())
    }

    pub fn windows() -> anyhow::Result<()> {
        for title in desktop::list_titles()? {
            println!("{title}");
        }
        Ok(())
    }
}

#[cfg(not(feature = "desktop"))]
mod commands {
    use anyhow::{Context, bail};
    use shiftchef::config::Config;
    use shiftchef::planner::{Planner, VisionPlanner};
    use std::process::ExitCode;

    const NEEDS_DESKTOP: &str = "this build has no desktop support; rebuild with --features desktop";

    pub fn run(_config: &Config, _cycles: Option<u32>) -> anyhow::Result<ExitCode> {
        bail!(NEEDS_DESKTOP)
    }

    pub fn capture(_config: &Config) -> anyhow::Result<()> {
        bail!(NEEDS_DESKTOP)
    }

    pub fn plan(config: &Config, urls: &[String]) -> anyhow::Result<()> {
        config.require_vision()?;
        let planner = VisionPlanner::new(&config.vision).context("building vision client")?;
        for url in urls {
            let words = planner
                .plan(url)
                .with_context(|| format!("planning {url}"))?;
            let words: Vec<&str> = words.iter().map(|w| w.as_str()).collect();
            println!("{url}: {}", words.join(" "));
        }
        Ok(())
    }

    pub fn windows() -> anyhow::Result<()> {
        bail!(NEEDS_DESKTOP)
    }
}
