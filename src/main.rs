// src/main.rs

use kiln::pipeline::PipelineRegistry;

#[tokio::main]
async fn main() {
    let args = kiln::cli::parse();

    if let Err(e) = kiln::logging::init_logging(args.log_level) {
        eprintln!("kiln: failed to initialise logging: {e}");
        std::process::exit(1);
    }

    let registry = PipelineRegistry::with_defaults();

    if let Err(err) = kiln::run(args, &registry).await {
        tracing::error!(error = %err, "build failed");
        std::process::exit(1);
    }
}
