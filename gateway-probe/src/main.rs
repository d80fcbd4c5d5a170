//! Gateway Probe
//!
//! Checks credentials, account state and one balance on every configured
//! venue, then prints a JSON report.
//!
//! # Usage
//!
//! ```bash
//! GATEWAY_OKX_API_KEY=... GATEWAY_OKX_API_SECRET=... GATEWAY_OKX_PASSPHRASE=... \
//!     cargo run -p gateway-probe
//!
//! # JSON logs
//! GATEWAY_LOG_FORMAT=json cargo run -p gateway-probe
//! ```
//!
//! # Environment Variables
//!
//! See `gateway_connectors::config` for the full list. In addition:
//! - `GATEWAY_LOG_FORMAT`: `json` for structured logs (default: text)
//! - `RUST_LOG`: log filter (default: gateway_probe=info)

use gateway_connectors::GatewayConfig;
use gateway_probe::run;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive("gateway_probe=info".parse()?);
    let json = std::env::var("GATEWAY_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry().with(fmt::layer().json()).with(filter).init();
    } else {
        tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
    }

    // Load configuration
    let config = GatewayConfig::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        venues = config.venues.len(),
        currency = %config.probe_currency,
        "Gateway probe"
    );

    let reports = run(config).await?;
    println!("{}", serde_json::to_string_pretty(&reports)?);

    let unhealthy = reports.iter().filter(|r| !r.is_healthy()).count();
    if unhealthy > 0 {
        anyhow::bail!("{} of {} venues failed the probe", unhealthy, reports.len());
    }

    info!("All venues healthy");
    Ok(())
}
