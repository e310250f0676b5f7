//! Score predicted events against ground truth.
//! Usage: evaluate <pred.json> <gt.json> [--max-dt seconds] [-o eval.json]

use anyhow::{anyhow, Context, Result};
use sc_eval::{evaluate, DEFAULT_MAX_DT};
use std::path::PathBuf;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sc_eval=info")),
        )
        .init();

    let mut positional = Vec::new();
    let mut max_dt = DEFAULT_MAX_DT;
    let mut out = PathBuf::from("eval.json");

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--max-dt" => {
                let value = args.next().ok_or_else(|| anyhow!("--max-dt needs a value"))?;
                max_dt = value
                    .parse()
                    .with_context(|| format!("Invalid --max-dt value: {}", value))?;
            }
            "-o" | "--out" => {
                out = PathBuf::from(args.next().ok_or_else(|| anyhow!("{} needs a path", arg))?);
            }
            _ => positional.push(PathBuf::from(&arg)),
        }
    }

    let [pred, gt] = positional.as_slice() else {
        eprintln!("Usage: evaluate <pred.json> <gt.json> [--max-dt seconds] [-o eval.json]");
        std::process::exit(1);
    };

    let evaluation = evaluate(pred, gt, max_dt)?;
    let json = serde_json::to_string_pretty(&evaluation)?;
    std::fs::write(&out, json).with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "precision={:.3} recall={:.3} f1={:.3} mean_dt={:.3}",
        evaluation.metrics.precision,
        evaluation.metrics.recall,
        evaluation.metrics.f1,
        evaluation.metrics.mean_dt
    );
    Ok(())
}
