use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use smile_fixtures_core::audit::log::AuditLog;
use smile_fixtures_core::capture::model::{Capture, EndpointKind};
use smile_fixtures_core::capture::source::load_capture_dir;
use smile_fixtures_core::catalog::corpus::{Corpus, INTAKE_LOG_FILE};
use smile_fixtures_core::catalog::detect::detect_device;
use smile_fixtures_core::catalog::profile::{DeviceFamily, Feature, Peripheral, ProfileTags};
use smile_fixtures_core::catalog::render::{render_catalog_csv, render_catalog_markdown};
use smile_fixtures_core::config::SanitizerConfig;
use smile_fixtures_core::error::CoreError;
use smile_fixtures_core::gate::GateFinding;
use smile_fixtures_core::intake::{Intake, Submission};
use smile_fixtures_core::validator::verify_corpus;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "fixture-intake",
    version,
    about = "Sanitize Plugwise Smile captures and catalogue them as test fixtures."
)]
struct Cli {
    /// Sanitizer configuration (JSON). The built-in Plugwise rule table is used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Redact one capture and write the sanitized text.
    Redact(RedactArgs),
    /// Run the validation gate over text that is claimed to be sanitized.
    Check(CheckArgs),
    /// Redact, validate and catalogue a directory of captures.
    Submit(SubmitArgs),
    /// Identify the gateway behind a domain_objects capture.
    Detect(DetectArgs),
    /// Show the corpus catalog.
    List(ListArgs),
    /// Re-check every stored fixture against the catalog and the gate.
    Verify(VerifyArgs),
    /// Print the gateway URLs a contributor fetches captures from.
    Urls(UrlsArgs),
}

#[derive(Debug, Parser)]
struct RedactArgs {
    /// Raw capture file.
    file: PathBuf,

    /// Endpoint kind (default: taken from a core.<endpoint>.xml file name).
    #[arg(long)]
    endpoint: Option<EndpointKind>,

    /// Output file (default: stdout).
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct CheckArgs {
    file: PathBuf,

    #[arg(long)]
    endpoint: Option<EndpointKind>,
}

#[derive(Debug, Parser)]
struct SubmitArgs {
    /// Corpus root directory.
    #[arg(long)]
    corpus: PathBuf,

    /// Directory holding core.<endpoint>.xml captures of one device.
    #[arg(long)]
    captures: PathBuf,

    #[arg(long)]
    family: Option<DeviceFamily>,

    #[arg(long)]
    firmware: Option<String>,

    /// Mark the gateway as a legacy model.
    #[arg(long, default_value_t = false)]
    legacy: bool,

    /// Connected peripheral (repeatable).
    #[arg(long = "peripheral")]
    peripherals: Vec<Peripheral>,

    /// Household feature (repeatable).
    #[arg(long = "feature")]
    features: Vec<Feature>,

    /// Human-readable fixture label.
    #[arg(long)]
    label: Option<String>,
}

#[derive(Debug, Parser)]
struct DetectArgs {
    /// A domain_objects capture.
    file: PathBuf,
}

#[derive(Debug, Parser)]
struct ListArgs {
    #[arg(long)]
    corpus: PathBuf,

    #[arg(long, value_enum, default_value = "markdown")]
    format: ListFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ListFormat {
    Markdown,
    Csv,
    Json,
}

#[derive(Debug, Parser)]
struct VerifyArgs {
    #[arg(long)]
    corpus: PathBuf,
}

#[derive(Debug, Parser)]
struct UrlsArgs {
    /// Gateway host or base URL, e.g. 192.168.1.10.
    host: String,
}

fn main() -> ExitCode {
    match real_main() {
        Ok(code) => code,
        Err(e) => {
            error!("{:?}", e);
            ExitCode::from(1)
        }
    }
}

fn real_main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    match cli.cmd {
        Command::Redact(args) => cmd_redact(&config, args),
        Command::Check(args) => cmd_check(&config, args),
        Command::Submit(args) => cmd_submit(config, args),
        Command::Detect(args) => cmd_detect(args),
        Command::List(args) => cmd_list(args),
        Command::Verify(args) => cmd_verify(&config, args),
        Command::Urls(args) => cmd_urls(args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SanitizerConfig> {
    match path {
        Some(p) => SanitizerConfig::load_json(p)
            .with_context(|| format!("load sanitizer config {}", p.display())),
        None => Ok(SanitizerConfig::default()),
    }
}

fn read_capture(file: &Path, endpoint: Option<EndpointKind>) -> anyhow::Result<Capture> {
    let endpoint = match endpoint {
        Some(e) => e,
        None => {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match EndpointKind::from_file_name(&name) {
                Some(e) => e,
                None => bail!(
                    "cannot tell the endpoint of {}; pass --endpoint",
                    file.display()
                ),
            }
        }
    };
    let text = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    Ok(Capture::new(endpoint, text))
}

fn print_findings(findings: &[GateFinding]) {
    for f in findings {
        println!(
            "FINDING {} {} line={} column={} reason={:?} rule={}",
            f.endpoint,
            f.path,
            f.line,
            f.column,
            f.reason,
            f.rule_id.as_deref().unwrap_or("-")
        );
    }
}

fn cmd_redact(config: &SanitizerConfig, args: RedactArgs) -> anyhow::Result<ExitCode> {
    let capture = read_capture(&args.file, args.endpoint)?;
    let intake = Intake::new(config.clone())?;
    let sanitized = match intake.sanitize(&capture) {
        Ok(s) => s,
        Err(e @ CoreError::MalformedCapture { .. }) => {
            eprintln!("{}", e);
            return Ok(ExitCode::from(1));
        }
        Err(e) => return Err(e.into()),
    };
    match &args.out {
        Some(out) => {
            fs::write(out, sanitized.text.as_bytes())
                .with_context(|| format!("write {}", out.display()))?;
            info!(
                endpoint = %sanitized.endpoint,
                out = %out.display(),
                changed = sanitized.changed_count(),
                "wrote sanitized capture"
            );
        }
        None => print!("{}", sanitized.text),
    }
    eprintln!(
        "redacted {} value(s) in {} (sha256 {})",
        sanitized.changed_count(),
        sanitized.endpoint,
        sanitized.sha256
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_check(config: &SanitizerConfig, args: CheckArgs) -> anyhow::Result<ExitCode> {
    let capture = read_capture(&args.file, args.endpoint)?;
    let intake = Intake::new(config.clone())?;
    let report = match intake.check(capture.endpoint, &capture.text) {
        Ok(r) => r,
        Err(e @ CoreError::MalformedCapture { .. }) => {
            println!("FAIL {}", e);
            return Ok(ExitCode::from(1));
        }
        Err(e) => return Err(e.into()),
    };
    println!("{} {}", report.result(), report.endpoint);
    print_findings(&report.findings);
    Ok(if report.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn cmd_submit(config: SanitizerConfig, args: SubmitArgs) -> anyhow::Result<ExitCode> {
    let captures = load_capture_dir(&args.captures)
        .with_context(|| format!("load captures from {}", args.captures.display()))?;
    debug!(count = captures.len(), "loaded captures");

    let mut corpus = Corpus::open_or_create(&args.corpus)
        .with_context(|| format!("open corpus {}", args.corpus.display()))?;
    let (mut audit, _) = AuditLog::open_or_create(args.corpus.join(INTAKE_LOG_FILE))
        .context("open intake log")?;

    let tags = ProfileTags {
        label: args.label,
        family: args.family,
        firmware_version: args.firmware,
        legacy: args.legacy.then_some(true),
        peripherals: args.peripherals.into_iter().collect(),
        features: args.features.into_iter().collect(),
    };
    let intake = Intake::new(config)?;
    match intake.submit(&mut corpus, &mut audit, Submission { captures, tags }) {
        Ok(receipt) => {
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(CoreError::UnsanitizedFields(findings)) => {
            println!("REJECTED unsanitized fields");
            print_findings(&findings);
            Ok(ExitCode::from(1))
        }
        Err(
            e @ (CoreError::MalformedCapture { .. }
            | CoreError::UnrecognizedDevice(_)
            | CoreError::InvalidInput(_)),
        ) => {
            println!("REJECTED {}", e);
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e).context("submit captures"),
    }
}

fn cmd_detect(args: DetectArgs) -> anyhow::Result<ExitCode> {
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("read {}", args.file.display()))?;
    match detect_device(&text) {
        Ok(device) => {
            println!("{}", serde_json::to_string_pretty(&device)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ (CoreError::UnrecognizedDevice(_) | CoreError::MalformedCapture { .. })) => {
            println!("UNRECOGNIZED {}", e);
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_list(args: ListArgs) -> anyhow::Result<ExitCode> {
    let corpus = Corpus::open_existing(&args.corpus)
        .with_context(|| format!("open corpus {}", args.corpus.display()))?;
    match args.format {
        ListFormat::Markdown => print!("{}", render_catalog_markdown(corpus.entries())),
        ListFormat::Csv => print!("{}", render_catalog_csv(corpus.entries())?),
        ListFormat::Json => println!("{}", serde_json::to_string_pretty(corpus.entries())?),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_verify(config: &SanitizerConfig, args: VerifyArgs) -> anyhow::Result<ExitCode> {
    let summary = verify_corpus(&args.corpus, config)
        .with_context(|| format!("verify corpus {}", args.corpus.display()))?;
    println!(
        "CORPUS overall={} entries={} rule_set={}",
        summary.overall, summary.entries, summary.rule_set_version
    );
    for c in &summary.checks {
        println!("CHECK {} {} {}", c.check_id, c.result, c.message);
    }
    Ok(if summary.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn cmd_urls(args: UrlsArgs) -> anyhow::Result<ExitCode> {
    for endpoint in EndpointKind::ALL {
        let url = endpoint.fetch_url(&args.host)?;
        println!("{} {}", endpoint.file_name(), url);
    }
    Ok(ExitCode::SUCCESS)
}
