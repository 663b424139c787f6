use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cyopt::{
    CyoptConfig, OptimizationPipeline, OptimizationReport, OptimizationStage, PackagingStage,
    Reporter, TracingReporter,
};

#[derive(Parser)]
#[command(name = "cyopt")]
#[command(version, about = "Rewrite a Python project into Cython and package the compiled modules", long_about = None)]
struct Cli {
    /// Root of the Python project to optimize
    project_path: PathBuf,

    /// Output directory; relative paths are resolved against the project root
    #[arg(long, default_value = "optimized_output")]
    output: PathBuf,

    /// Enable debug output (generated code, full error chains)
    #[arg(short, long)]
    debug: bool,
}

fn resolve_output(project_path: &Path, output: &Path) -> PathBuf {
    if output.is_absolute() {
        output.to_path_buf()
    } else {
        project_path.join(output)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter_layer = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("cyopt v{}", env!("CARGO_PKG_VERSION"));

    let config = CyoptConfig::load_optional(&cli.project_path)?;
    let output = resolve_output(&cli.project_path, &cli.output);
    let reporter: Arc<dyn Reporter> = Arc::new(TracingReporter::new(cli.debug));

    let pipeline = OptimizationPipeline::new(config.pipeline.validation, Arc::clone(&reporter))
        .add_stage(Box::new(OptimizationStage::new(
            config.clone(),
            Arc::clone(&reporter),
        )))
        .add_stage(Box::new(PackagingStage::new(
            config.packaging.clone(),
            Arc::clone(&reporter),
        )));

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match rt.block_on(pipeline.run(&cli.project_path, &output)) {
        Ok(result) => {
            let report = OptimizationReport::from_output(&result);
            info!("\n{}", report.to_text());
            debug!("{}", report.to_json()?);
            Ok(())
        }
        Err(e) => {
            reporter.error("Optimization run failed", &*e);
            std::process::exit(1);
        }
    }
}
