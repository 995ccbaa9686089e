use clap::{Parser, ValueEnum};
use gradectl::capture::list_monitors;
use gradectl::{
    load_question_context, load_reference_answer, write_results, Config, Grader, GradingResult,
    Overrides, Region,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gradectl")]
#[command(about = "Grade exam answers on screen with a vision model")]
#[command(version)]
struct Cli {
    /// Grade once, or repeatedly on a fixed interval
    #[arg(long, value_enum, default_value_t = Mode::Single)]
    mode: Mode,

    /// Seconds between captures in periodic mode
    #[arg(long)]
    interval: Option<f64>,

    /// Total seconds to run in periodic mode
    #[arg(long)]
    duration: Option<f64>,

    /// Capture region in desktop coordinates (left,top,width,height)
    #[arg(long, value_parser = parse_region)]
    region: Option<Region>,

    /// Monitor to capture (0 = all monitors, 1 = first, ...)
    #[arg(long)]
    monitor: Option<usize>,

    /// Reference answer file (Markdown)
    #[arg(long)]
    reference_answer: Option<PathBuf>,

    /// Question text to give the model as context
    #[arg(long)]
    question_context: Option<String>,

    /// Read the question context from a file
    #[arg(long, conflicts_with = "question_context")]
    question_file: Option<PathBuf>,

    /// Config file (default: ~/.config/gradectl/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Inference endpoint base URL, e.g. http://localhost:8000/v1
    #[arg(long)]
    api_base: Option<String>,

    /// API key for the inference endpoint
    #[arg(long)]
    api_key: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// Save every capture as a PNG
    #[arg(long)]
    save_screenshots: bool,

    /// Directory for saved captures
    #[arg(long)]
    screenshot_dir: Option<PathBuf>,

    /// Write all results to this JSON file
    #[arg(long)]
    output: Option<PathBuf>,

    /// List monitors and exit
    #[arg(long)]
    list_monitors: bool,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Single,
    Periodic,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            monitor: self.monitor,
            region: self.region,
            interval: self.interval,
            duration: self.duration,
            save_screenshots: self.save_screenshots.then_some(true),
            screenshot_dir: self.screenshot_dir.clone(),
            results_path: self.output.clone(),
        }
    }
}

fn parse_region(s: &str) -> Result<Region, String> {
    s.parse()
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("gradectl={},gradectl_capture={}", level, level))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Grading aborted");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> gradectl::Result<()> {
    if cli.list_monitors {
        print_monitors()?;
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref(), cli.overrides())?;

    let reference_answer = match &cli.reference_answer {
        Some(path) => Some(load_reference_answer(path)?),
        None => {
            info!("No reference answer given, grading with general criteria");
            None
        }
    };
    let question_context =
        load_question_context(cli.question_context.as_deref(), cli.question_file.as_deref())?;

    let mut grader = Grader::from_config(&config, reference_answer, question_context)?;
    let target = grader.check_target()?;
    info!(
        monitor = target.index,
        name = %target.name,
        region = ?grader.job().region,
        model = %config.api.model,
        "Ready to grade"
    );

    let results = match cli.mode {
        Mode::Single => {
            let result = grader.run_single()?;
            print_result(&result);
            vec![result]
        }
        Mode::Periodic => {
            let interval = seconds("interval", config.screenshot.default_interval)?;
            let duration = seconds("duration", config.screenshot.default_duration)?;
            grader.run_periodic_with(interval, duration, print_result)?
        }
    };

    if let Some(path) = &config.output.results_path {
        write_results(&results, path)?;
        println!("Results saved to {}", path.display());
    }

    let failed = results.iter().filter(|r| r.is_error()).count();
    if failed > 0 {
        error!(failed, total = results.len(), "Some grading cycles failed");
    }
    Ok(())
}

fn seconds(name: &str, secs: f64) -> gradectl::Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| gradectl::Error::Config(format!("Invalid {} {}: {}", name, secs, e)))
}

fn print_monitors() -> gradectl::Result<()> {
    let monitors = list_monitors()?;
    println!("{:<6} {:<24} {:<24} {}", "INDEX", "NAME", "BOUNDS", "PRIMARY");
    for m in monitors {
        println!(
            "{:<6} {:<24} {:<24} {}",
            m.index,
            m.name,
            m.bounds.to_string(),
            if m.primary { "yes" } else { "" }
        );
    }
    Ok(())
}

fn print_result(result: &GradingResult) {
    println!("--- Capture {} ({}) ---", result.index, result.timestamp.to_rfc3339());
    if let Some(err) = &result.error {
        println!("Error: {}", err);
        return;
    }
    match result.score {
        Some(score) => println!("Score: {}", score),
        None => println!("Score: (not found)"),
    }
    if let Some(answer) = &result.student_answer {
        println!("Student answer: {}", answer);
    }
    println!("Reasoning: {}", result.reasoning);
    if let Some(path) = &result.screenshot_path {
        println!("Screenshot: {}", path.display());
    }
}
