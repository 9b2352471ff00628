use std::collections::BTreeMap;
use std::sync::Arc;
use std::{fs, path::PathBuf};

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use mwm_traffic::keys::{decode_keys, encode_keys};
use mwm_traffic::section::{DirectoryKeysSection, KeysSection, NoKeysSection};
use mwm_traffic::values::{decode_values, encode_values};
use mwm_traffic::{
    Coloring, Direction, MwmId, RemoteUrlBuilder, RoadClassifier, RoadFeature, RoadSegmentId,
    SpeedGroup, TrafficInfo, extract_traffic_keys,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

mod config;
mod transport;

use config::TrafficConfig;
use transport::ReqwestClient;

#[derive(Parser, Debug)]
#[command(name = "mwm-traffic", author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON config file with a `traffic` section
    #[arg(long, env = "TRAFFIC_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Base URL of the traffic server (overrides the config file)
    #[arg(long, env = "TRAFFIC_DATA_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Subcommand/tool to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Summarize an encoded traffic keys file
    InspectKeys { path: PathBuf },
    /// Summarize an encoded traffic values file
    InspectValues { path: PathBuf },
    /// Build a traffic keys file from a JSON list of features
    EncodeKeys {
        /// JSON array of `{feature_id, point_count, road, one_way}` objects
        features: PathBuf,
        output: PathBuf,
    },
    /// Build a traffic values file from a JSON list of speed group names
    EncodeValues { values: PathBuf, output: PathBuf },
    /// Fetch keys and values for one mwm and report the result
    Sync {
        /// Region name of the mwm
        #[arg(long)]
        region: String,
        /// Edition version of the mwm
        #[arg(long)]
        version: i64,
        /// Newest data format version this client understands
        #[arg(long)]
        data_version: i64,
        /// Revision token from a previous sync
        #[arg(long, default_value = "")]
        etag: String,
    },
}

/// A feature as described in the JSON input of `encode-keys`.
#[derive(Debug, Deserialize)]
struct FeatureRecord {
    feature_id: u32,
    point_count: usize,
    #[serde(default = "default_true")]
    road: bool,
    #[serde(default)]
    one_way: bool,
}

const fn default_true() -> bool {
    true
}

impl RoadFeature for FeatureRecord {
    fn feature_id(&self) -> u32 {
        self.feature_id
    }

    fn point_count(&self) -> usize {
        self.point_count
    }
}

/// Takes road classes verbatim from the input records.
struct RecordClassifier;

impl RoadClassifier<FeatureRecord> for RecordClassifier {
    fn is_road(&self, feature: &FeatureRecord) -> bool {
        feature.road
    }

    fn is_one_way(&self, feature: &FeatureRecord) -> bool {
        feature.one_way
    }
}

fn summarize_keys(keys: &[RoadSegmentId]) -> serde_json::Value {
    let mut features = 0usize;
    let mut two_way = 0usize;
    for run in keys.chunk_by(|a, b| a.feature_id() == b.feature_id()) {
        features += 1;
        if run.iter().any(|k| k.direction() == Direction::Backward) {
            two_way += 1;
        }
    }

    json!({
        "segments": keys.len(),
        "features": features,
        "one_way_features": features - two_way,
        "two_way_features": two_way,
        "first": keys.first(),
        "last": keys.last(),
    })
}

fn histogram<'a>(groups: impl IntoIterator<Item = &'a SpeedGroup>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for group in groups {
        *counts.entry(group.to_string()).or_default() += 1;
    }
    counts
}

fn summarize_coloring(coloring: &Coloring) -> serde_json::Value {
    json!({
        "segments": coloring.len(),
        "speed_groups": histogram(coloring.iter().map(|(_, group)| group)),
    })
}

async fn sync(
    config: &TrafficConfig,
    base_url: Option<String>,
    mwm: MwmId,
    data_version: i64,
    mut etag: String,
) -> anyhow::Result<serde_json::Value> {
    let remote = RemoteUrlBuilder::new(
        base_url
            .or_else(|| config.base_url.clone())
            .unwrap_or_default(),
    );
    if !remote.is_configured() {
        info!("No traffic server configured; only local keys can be used");
    }

    let client =
        Arc::new(ReqwestClient::new(config.timeout()).context("Failed to build HTTP client")?);
    let section: Box<dyn KeysSection> = match &config.keys_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "Using local traffic keys directory");
            Box::new(DirectoryKeysSection::new(dir))
        }
        None => Box::new(NoKeysSection),
    };

    let traffic = TrafficInfo::new(mwm, data_version, remote, client);
    traffic
        .load_keys(section.as_ref())
        .await
        .context("Failed to load traffic keys")?;
    let synced = traffic.sync(&mut etag).await;

    Ok(json!({
        "mwm": traffic.mwm().to_string(),
        "synced": synced,
        "availability": traffic.availability(),
        "etag": etag,
        "keys": traffic.keys().len(),
        "coloring": summarize_coloring(&traffic.coloring()),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        // Standard logger, configured via the RUST_LOG env variable
        .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env()))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => TrafficConfig::load(path)?,
        None => TrafficConfig::default(),
    };

    let output = match cli.command {
        Commands::InspectKeys { path } => {
            let bytes = fs::read(&path)
                .with_context(|| format!("Failed to read keys at {}", path.display()))?;
            let keys = decode_keys(&bytes).context("Invalid traffic keys")?;
            json!({ "bytes": bytes.len(), "keys": summarize_keys(&keys) })
        }
        Commands::InspectValues { path } => {
            let bytes = fs::read(&path)
                .with_context(|| format!("Failed to read values at {}", path.display()))?;
            let values = decode_values(&bytes).context("Invalid traffic values")?;
            json!({
                "bytes": bytes.len(),
                "values": values.len(),
                "speed_groups": histogram(&values),
            })
        }
        Commands::EncodeKeys { features, output } => {
            let records: Vec<FeatureRecord> = serde_json::from_slice(
                &fs::read(&features)
                    .with_context(|| format!("Failed to read features at {}", features.display()))?,
            )
            .context("Invalid features JSON")?;
            let keys = extract_traffic_keys(records, &RecordClassifier)?;
            let bytes = encode_keys(&keys)?;
            fs::write(&output, &bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            json!({ "bytes": bytes.len(), "keys": summarize_keys(&keys) })
        }
        Commands::EncodeValues { values, output } => {
            let groups: Vec<SpeedGroup> = serde_json::from_slice(
                &fs::read(&values)
                    .with_context(|| format!("Failed to read values at {}", values.display()))?,
            )
            .context("Invalid speed group JSON")?;
            let bytes = encode_values(&groups)?;
            fs::write(&output, &bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            json!({ "bytes": bytes.len(), "values": groups.len() })
        }
        Commands::Sync {
            region,
            version,
            data_version,
            etag,
        } => {
            if region.is_empty() {
                return Err(anyhow!("The region name must not be empty"));
            }
            sync(
                &config,
                cli.base_url,
                MwmId::new(region, version),
                data_version,
                etag,
            )
            .await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_summary() {
        let records: Vec<FeatureRecord> = serde_json::from_str(
            r#"[
                {"feature_id": 3, "point_count": 3, "one_way": true},
                {"feature_id": 4, "point_count": 9, "road": false},
                {"feature_id": 8, "point_count": 2}
            ]"#,
        )
        .unwrap();
        let keys = extract_traffic_keys(records, &RecordClassifier).unwrap();
        let summary = summarize_keys(&keys);

        insta::assert_snapshot!(summary["segments"], @"4");
        insta::assert_snapshot!(summary["one_way_features"], @"1");
        insta::assert_snapshot!(summary["two_way_features"], @"1");
    }

    #[test]
    fn speed_group_histogram() {
        let counts = histogram(&[SpeedGroup::G1, SpeedGroup::Unknown, SpeedGroup::G1]);
        assert_eq!(counts["G1"], 2);
        assert_eq!(counts["Unknown"], 1);
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn cli_parses() {
        let cli = Cli::try_parse_from([
            "mwm-traffic",
            "--base-url",
            "http://localhost/",
            "sync",
            "--region",
            "Monaco",
            "--version",
            "190830",
            "--data-version",
            "190901",
        ])
        .unwrap();

        assert_eq!(cli.base_url.as_deref(), Some("http://localhost/"));
        assert!(matches!(
            cli.command,
            Commands::Sync { ref region, version: 190_830, data_version: 190_901, ref etag }
                if region == "Monaco" && etag.is_empty()
        ));
    }
}
