//! damage-eval: score a classifier against `<data>/<class>/*.jpg` and write
//! `evaluation_results.json` plus `confusion_matrix.csv`.
//!
//! Usage:
//!   cargo run -p damage-eval -- --data data/processed/test --output results
//!   cargo run -p damage-eval -- --demo --concurrency 4

use classifier_client::{ClassifierConfig, DamageClassifier, DemoClassifier, EdgeImpulseClient};
use damage_analytics::LabelSet;
use damage_eval::{collect_samples, usage, write_report, EvalArgs, EvalRunner};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "damage_eval=info,classifier_client=warn".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let args = match EvalArgs::parse(&args) {
        Ok(parsed) if !parsed.help => parsed,
        Ok(_) => {
            print!("{}", usage());
            return Ok(());
        }
        Err(e) => {
            eprintln!("{e}\n\n{}", usage());
            std::process::exit(2);
        }
    };

    let labels = LabelSet::road_damage();
    let classifier = build_classifier(&args, &labels)?;
    tracing::info!(
        backend = classifier.backend_name(),
        data = %args.data_dir.display(),
        concurrency = args.concurrency,
        "Starting evaluation"
    );

    let samples = collect_samples(&args.data_dir, &labels)?;
    let accumulator = EvalRunner::new(classifier, labels)
        .with_concurrency(args.concurrency)
        .run(&samples)
        .await?;

    let report = accumulator.finalize()?;
    write_report(&report, &args.output_dir)?;
    println!("{}", report.render_table());

    Ok(())
}

/// The hosted model when credentials are present, the demo classifier when
/// asked for. Failures are never silently replaced by demo predictions here.
fn build_classifier(
    args: &EvalArgs,
    labels: &LabelSet,
) -> anyhow::Result<Arc<dyn DamageClassifier>> {
    if args.demo {
        tracing::warn!("Evaluating the demo classifier: metrics are not meaningful");
        return Ok(Arc::new(DemoClassifier::new(labels.clone()).with_latency(false)));
    }

    let client = EdgeImpulseClient::from_config(&ClassifierConfig::from_env()).map_err(|e| {
        anyhow::anyhow!(
            "{e}: set EDGE_IMPULSE_API_KEY and EDGE_IMPULSE_PROJECT_ID, or pass --demo"
        )
    })?;
    Ok(Arc::new(client))
}
