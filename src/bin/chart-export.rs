use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use chart_export::{
    ChartGraphic, DirectoryTarget, ExportConfig, ExportOutcome, ExportRequest, ExportResult,
    Exporter, telemetry,
};

#[derive(Parser, Debug)]
#[command(name = "chart-export")]
#[command(author, version, about = "Export a styled SVG chart as a PNG image")]
struct Cli {
    /// SVG chart to export
    #[arg(required_unless_present = "print_config")]
    svg: Option<PathBuf>,

    /// Stylesheet applied to the chart (repeatable, later sheets win ties)
    #[arg(long = "css", value_name = "FILE")]
    stylesheets: Vec<PathBuf>,

    /// Directory the PNG is written to
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Output file name (defaults to the configured default filename)
    #[arg(short, long)]
    filename: Option<String>,

    /// Title drawn above the chart
    #[arg(short, long)]
    title: Option<String>,

    /// Canvas width in pixels (defaults to the chart's width)
    #[arg(long)]
    width: Option<u32>,

    /// Canvas height in pixels (defaults to the chart's height)
    #[arg(long)]
    height: Option<u32>,

    /// Browser engine whose markup quirks to apply
    #[arg(long, default_value = "")]
    browser: String,

    /// JSON export configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

fn main() {
    let _ = telemetry::init_default_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> ExportResult<()> {
    let config = match &cli.config {
        Some(path) => ExportConfig::from_json_file(path)?,
        None => ExportConfig::default(),
    };

    if cli.print_config {
        println!("{}", config.to_json_pretty()?);
        return Ok(());
    }

    let Some(svg_path) = &cli.svg else {
        return Ok(());
    };

    let mut graphic = ChartGraphic::from_markup(&std::fs::read_to_string(svg_path)?)?;
    for path in &cli.stylesheets {
        graphic.add_stylesheet(std::fs::read_to_string(path)?);
    }

    let width = cli.width.or_else(|| graphic.width().map(|w| w.round() as u32));
    let height = cli.height.or_else(|| graphic.height().map(|h| h.round() as u32));
    let (width, height) = (width.unwrap_or(0), height.unwrap_or(0));

    std::fs::create_dir_all(&cli.out_dir)?;
    let exporter = Exporter::builder()
        .config(config)
        .browser(cli.browser.clone())
        .target(Arc::new(DirectoryTarget::new(&cli.out_dir)))
        .build()?;

    let mut request = ExportRequest::new(Some(&mut graphic), width, height);
    if let Some(filename) = &cli.filename {
        request = request.with_filename(filename.clone());
    }
    if let Some(title) = &cli.title {
        request = request.with_title(title.clone());
    }

    if let ExportOutcome::Downloaded(download) = exporter.export(request)? {
        match &download.path {
            Some(path) => info!(path = %path.display(), bytes = download.bytes, "wrote chart"),
            None => info!(filename = %download.filename, "exported chart"),
        }
    }
    Ok(())
}
