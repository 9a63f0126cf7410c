use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use petal_curator::app::{
    App, ConvertResult, EnrichResult, HarvestResult, MergeResult, ProgressSink, RunResult,
    ScrapeResult, ValidateResult,
};
use petal_curator::config::ConfigLoader;
use petal_curator::domain::Doi;
use petal_curator::error::PetalError;
use petal_curator::openalex::{OpenAlexClient, OpenAlexHttpClient, OpenAlexWork};
use petal_curator::output::{ConsoleProgress, JsonOutput, OutputMode};
use petal_curator::scrape::{HttpPageFetcher, PageFetcher};
use petal_curator::store::Store;

#[derive(Parser)]
#[command(name = "petal")]
#[command(about = "Curate biomimicry papers: AskNature labels to PeTaL, OpenAlex enrichment, golden dataset merge")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Path to petal.json (defaults to ./petal.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Convert saved AskNature search hits into paper rows")]
    Harvest(HarvestArgs),
    #[command(about = "Fill missing DOIs by scraping paper landing pages")]
    ScrapeDois(InOutArgs),
    #[command(about = "Map AskNature labels to PeTaL labels, holding out unmapped papers")]
    Convert(ConvertArgs),
    #[command(about = "Enrich papers with OpenAlex metadata")]
    Enrich(InOutArgs),
    #[command(about = "Merge a labeled batch into the golden dataset")]
    Merge(MergeArgs),
    #[command(about = "Run data-quality checks on the golden dataset")]
    Validate(GoldenArgs),
    #[command(about = "convert, enrich, merge and validate in one pass")]
    Run(RunArgs),
}

#[derive(Args)]
struct HarvestArgs {
    hits: Utf8PathBuf,

    #[arg(long, short, default_value = "asknature_papers.csv")]
    output: Utf8PathBuf,
}

#[derive(Args)]
struct InOutArgs {
    input: Utf8PathBuf,

    #[arg(long, short)]
    output: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct ConvertArgs {
    input: Utf8PathBuf,

    #[arg(long, default_value = "function_map.csv")]
    function_map: Utf8PathBuf,

    #[arg(long, short, default_value = "converted_papers.csv")]
    output: Utf8PathBuf,
}

#[derive(Args)]
struct GoldenArgs {
    #[arg(long, default_value = "golden.json")]
    golden: Utf8PathBuf,
}

#[derive(Args)]
struct MergeArgs {
    batch: Utf8PathBuf,

    #[command(flatten)]
    golden: GoldenArgs,
}

#[derive(Args)]
struct RunArgs {
    input: Utf8PathBuf,

    #[arg(long, default_value = "function_map.csv")]
    function_map: Utf8PathBuf,

    #[command(flatten)]
    golden: GoldenArgs,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(petal) = report.downcast_ref::<PetalError>() {
            return ExitCode::from(map_exit_code(petal));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PetalError) -> u8 {
    match error {
        PetalError::InputRead { .. }
        | PetalError::DatasetParse { .. }
        | PetalError::ConfigRead(_)
        | PetalError::ConfigParse(_)
        | PetalError::FunctionMapColumn(_)
        | PetalError::FunctionMapParse(_) => 2,
        PetalError::OpenAlexHttp(_)
        | PetalError::OpenAlexStatus { .. }
        | PetalError::OpenAlexParse(_)
        | PetalError::PageHttp(_)
        | PetalError::PageStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = Store::new(config.workspace.clone());

    match cli.command {
        Commands::Harvest(args) => {
            let app = App::new(store, config, NopOpenAlex, NopPages);
            execute(
                output_mode,
                "Harvest",
                |sink| app.harvest(&args.hits, &args.output, sink),
                harvest_summary,
            )?;
        }
        Commands::ScrapeDois(args) => {
            let pages = HttpPageFetcher::new(config.openalex.timeout_secs)?;
            let app = App::new(store, config, NopOpenAlex, pages);
            let output = args
                .output
                .unwrap_or_else(|| Utf8PathBuf::from("doi_scraped_papers.csv"));
            execute(
                output_mode,
                "DOI scraping",
                |sink| app.scrape_dois(&args.input, &output, sink),
                scrape_summary,
            )?;
        }
        Commands::Convert(args) => {
            let app = App::new(store, config, NopOpenAlex, NopPages);
            execute(
                output_mode,
                "Label conversion",
                |sink| app.convert(&args.input, &args.function_map, &args.output, sink),
                convert_summary,
            )?;
        }
        Commands::Enrich(args) => {
            let openalex = OpenAlexHttpClient::new(&config.openalex)?;
            let app = App::new(store, config, openalex, NopPages);
            let output = args
                .output
                .unwrap_or_else(|| Utf8PathBuf::from("enriched_papers.csv"));
            execute(
                output_mode,
                "Enrichment",
                |sink| app.enrich(&args.input, &output, sink),
                enrich_summary,
            )?;
        }
        Commands::Merge(args) => {
            let app = App::new(store, config, NopOpenAlex, NopPages);
            execute(
                output_mode,
                "Golden merge",
                |sink| app.merge(&args.golden.golden, &args.batch, sink),
                merge_summary,
            )?;
        }
        Commands::Validate(args) => {
            let app = App::new(store, config, NopOpenAlex, NopPages);
            let result = execute(
                output_mode,
                "Validation",
                |sink| app.validate(&args.golden, sink),
                validate_summary,
            )?;
            require_valid(result.report.success)?;
        }
        Commands::Run(args) => {
            let openalex = OpenAlexHttpClient::new(&config.openalex)?;
            let app = App::new(store, config, openalex, NopPages);
            let result = execute(
                output_mode,
                "Pipeline run",
                |sink| app.run(&args.input, &args.function_map, &args.golden.golden, sink),
                run_summary,
            )?;
            require_valid(result.validation.success)?;
        }
    }
    Ok(())
}

/// Runs `op` with the sink matching the output mode, then prints the result
/// as JSON or as a console summary.
fn execute<T, F>(
    output_mode: OutputMode,
    title: &str,
    op: F,
    summary: fn(&T) -> Vec<(&'static str, String)>,
) -> miette::Result<T>
where
    T: Serialize,
    F: FnOnce(&dyn ProgressSink) -> Result<T, PetalError>,
{
    let result = match output_mode {
        OutputMode::NonInteractive => {
            let result = op(&JsonOutput)?;
            JsonOutput::print_json(&result).into_diagnostic()?;
            result
        }
        OutputMode::Interactive => {
            let console = ConsoleProgress::new();
            let result = op(&console)?;
            console
                .finish(&format!("{title} finished"), &summary(&result))
                .into_diagnostic()?;
            result
        }
    };
    Ok(result)
}

fn require_valid(success: bool) -> miette::Result<()> {
    if success {
        Ok(())
    } else {
        Err(miette::Report::msg("golden dataset failed validation"))
    }
}

fn harvest_summary(result: &HarvestResult) -> Vec<(&'static str, String)> {
    vec![
        ("hits", result.hits.to_string()),
        ("papers", result.records.to_string()),
        ("output", result.output.clone()),
    ]
}

fn scrape_summary(result: &ScrapeResult) -> Vec<(&'static str, String)> {
    vec![
        ("attempted", result.report.attempted.to_string()),
        ("found", result.report.found.to_string()),
        ("failed", result.report.failed.to_string()),
        ("output", result.output.clone()),
    ]
}

fn convert_summary(result: &ConvertResult) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("papers", result.report.total.to_string()),
        ("mapped", result.report.mapped.to_string()),
        ("manual review", result.report.manual.to_string()),
        ("output", result.output.clone()),
    ];
    if let Some(path) = &result.manual_review {
        rows.push(("to label", path.clone()));
    }
    rows
}

fn enrich_summary(result: &EnrichResult) -> Vec<(&'static str, String)> {
    vec![
        ("papers", result.report.total.to_string()),
        ("enriched", result.report.enriched.to_string()),
        ("not found", result.report.not_found.to_string()),
        ("failed", result.report.failures.len().to_string()),
        ("output", result.output.clone()),
    ]
}

fn merge_summary(result: &MergeResult) -> Vec<(&'static str, String)> {
    vec![
        ("updated", result.report.updated.to_string()),
        ("unchanged", result.report.unchanged.to_string()),
        ("appended", result.report.appended.to_string()),
        ("inconsistencies", result.report.inconsistencies.len().to_string()),
        ("golden", format!("{} ({} papers)", result.golden, result.golden_size)),
    ]
}

fn validate_summary(result: &ValidateResult) -> Vec<(&'static str, String)> {
    vec![
        ("papers", result.report.total.to_string()),
        ("success", result.report.success.to_string()),
        ("missing ids", result.report.missing_ids.len().to_string()),
        ("duplicate ids", result.report.duplicate_ids.len().to_string()),
        ("level 1 violations", result.report.level1_violations.len().to_string()),
    ]
}

fn run_summary(result: &RunResult) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("mapped", result.conversion.mapped.to_string()),
        ("manual review", result.conversion.manual.to_string()),
        ("enriched", result.enrichment.enriched.to_string()),
        ("enrichment failures", result.enrichment.failures.len().to_string()),
        ("updated", result.merge.updated.to_string()),
        ("appended", result.merge.appended.to_string()),
        ("valid", result.validation.success.to_string()),
        ("golden", result.golden.clone()),
    ];
    if let Some(path) = &result.manual_review {
        rows.push(("to label", path.clone()));
    }
    rows
}

struct NopOpenAlex;

impl OpenAlexClient for NopOpenAlex {
    fn work_by_doi(&self, _doi: &Doi) -> Result<Option<OpenAlexWork>, PetalError> {
        Err(PetalError::OpenAlexHttp("not available".to_string()))
    }

    fn work_by_id(&self, _id: &str) -> Result<Option<OpenAlexWork>, PetalError> {
        Err(PetalError::OpenAlexHttp("not available".to_string()))
    }
}

struct NopPages;

impl PageFetcher for NopPages {
    fn fetch_page(&self, _url: &str) -> Result<String, PetalError> {
        Err(PetalError::PageHttp("not available".to_string()))
    }
}
