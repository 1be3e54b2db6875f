use anyhow::{Context, Result};
use smart_energy_scheduler::{config, controller, domain, telemetry};
use config::Config;
use controller::SchedulingService;
use domain::SchedulingRequest;
use telemetry::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;

    let request_path = std::env::args()
        .nth(1)
        .context("usage: smart-energy-scheduler <request.json>")?;
    let raw = std::fs::read_to_string(&request_path)
        .with_context(|| format!("failed to read request {request_path}"))?;
    let request: SchedulingRequest =
        serde_json::from_str(&raw).with_context(|| format!("invalid request {request_path}"))?;

    let service = SchedulingService::new(cfg);
    let ctx = service.context_from_request(request)?;

    info!(
        appliances = ctx.appliances.len(),
        horizon = ctx.horizon(),
        "scheduling request loaded"
    );

    let report = service.compare(&ctx).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
