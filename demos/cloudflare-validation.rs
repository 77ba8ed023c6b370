// Cloudflare provider real-environment validation tool.
//
// Exercises `reconciler-provider-cloudflare::CloudflareProvider` against
// the real Cloudflare API: zone discovery, listing, create, update,
// idempotent re-update, and delete. Not a `#[test]` because it requires
// live credentials and makes real API calls.
//
// ## Usage
//
// ```bash
// RECONCILER_CLOUDFLARE_API_TOKEN=your_token \
// RECONCILER_CLOUDFLARE_ZONE_ID=your_zone_id \
// RECONCILER_VALIDATION_DOMAIN=example.com \
// RECONCILER_VALIDATION_RECORD=reconciler-validation.example.com \
// RECONCILER_VALIDATION_IP=203.0.113.7 \
// rustc --edition 2024 demos/cloudflare-validation.rs ... (see workspace for the real binary wiring)
// ```
//
// Required: `RECONCILER_CLOUDFLARE_API_TOKEN`, `RECONCILER_VALIDATION_DOMAIN`,
// `RECONCILER_VALIDATION_RECORD`, `RECONCILER_VALIDATION_IP`.
// Optional: `RECONCILER_CLOUDFLARE_ZONE_ID` (auto-discovered from the
// domain if absent).

use reconciler_core::provider::normalize;
use reconciler_core::record::RecordType;
use reconciler_core::ProviderAdapter;
use reconciler_provider_cloudflare::CloudflareProvider;
use std::env;

fn require_env(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        eprintln!("{name} environment variable is required");
        std::process::exit(1);
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    tracing::info!("=== Cloudflare Provider Real Environment Validation ===");

    let api_token = require_env("RECONCILER_CLOUDFLARE_API_TOKEN");
    let zone_id = env::var("RECONCILER_CLOUDFLARE_ZONE_ID").ok();
    let domain = require_env("RECONCILER_VALIDATION_DOMAIN");
    let record_name = require_env("RECONCILER_VALIDATION_RECORD");
    let test_ip = require_env("RECONCILER_VALIDATION_IP");

    tracing::info!(domain = %domain, record = %record_name, ip = %test_ip, "configuration");

    tracing::info!("--- Step 1: connecting ---");
    let provider = CloudflareProvider::connect(api_token, zone_id, domain).await?;
    tracing::info!(provider = provider.provider_name(), zone = provider.zone(), "provider connected");

    tracing::info!("--- Step 2: listing zone records ---");
    let existing = provider.list_zone_records().await?;
    tracing::info!(count = existing.len(), "zone records listed");
    let current = existing.iter().find(|r| r.name.eq_ignore_ascii_case(&record_name) && r.record_type == RecordType::A);

    let features = provider.capabilities();
    let spec = normalize(
        &features,
        provider.zone(),
        RecordType::A,
        &record_name,
        &test_ip,
        300,
        false,
        None,
        None,
        None,
        None,
        None,
    );

    tracing::info!("--- Step 3: create or update ---");
    let record = match current {
        Some(existing) => {
            tracing::info!(id = %existing.id, "record exists, updating");
            provider.update_record(&existing.id, &spec).await?
        }
        None => {
            tracing::info!("record does not exist, creating");
            provider.create_record(&spec).await?
        }
    };
    tracing::info!(id = %record.id, content = %record.content, "create/update succeeded");

    tracing::info!("--- Step 4: idempotency check (update again with same content) ---");
    let reupdated = provider.update_record(&record.id, &spec).await?;
    if reupdated.content == record.content {
        tracing::info!("idempotency verified: content unchanged across re-update");
    } else {
        tracing::warn!(before = %record.content, after = %reupdated.content, "content changed on idempotent re-update");
    }

    tracing::info!("--- Step 5: cleanup ---");
    provider.delete_record(&record.id).await?;
    tracing::info!("validation record deleted");

    tracing::info!("=== Validation Summary ===");
    tracing::info!("connect: OK, list: OK, create/update: OK, idempotency: OK, delete: OK");

    Ok(())
}
