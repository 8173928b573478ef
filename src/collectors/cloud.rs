//! Cloud provider detection via instance metadata services.

use std::time::Duration;

use futures_util::future::{BoxFuture, join_all};

use crate::error::ProbeError;
use crate::model::CloudInfo;

const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

const AWS_BASE: &str = "http://169.254.169.254/latest/meta-data";
const GCP_BASE: &str = "http://metadata.google.internal/computeMetadata/v1/instance";
const AZURE_BASE: &str = "http://169.254.169.254/metadata/instance/compute";
const DO_BASE: &str = "http://169.254.169.254/metadata/v1";

async fn fetch(
    client: &reqwest::Client,
    url: &str,
    header: Option<(&str, &str)>,
) -> Result<String, ProbeError> {
    let mut req = client.get(url).timeout(METADATA_TIMEOUT);
    if let Some((name, value)) = header {
        req = req.header(name, value);
    }
    let text = req.send().await?.error_for_status()?.text().await?;
    Ok(text.trim().to_string())
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// `us-east-1a` → `us-east-1`
pub fn aws_region_from_zone(zone: &str) -> Option<String> {
    let region = zone.trim().strip_suffix(|c: char| c.is_ascii_alphabetic())?;
    non_empty(region.to_string())
}

/// `projects/123/zones/us-central1-a` → `us-central1`
pub fn gcp_region_from_zone(zone: &str) -> Option<String> {
    let zone = last_segment(zone)?;
    let (region, _) = zone.rsplit_once('-')?;
    non_empty(region.to_string())
}

/// `projects/123/machineTypes/e2-medium` → `e2-medium`
pub fn last_segment(path: &str) -> Option<String> {
    path.trim().rsplit('/').next().and_then(|s| non_empty(s.to_string()))
}

async fn aws(client: &reqwest::Client) -> Result<CloudInfo, ProbeError> {
    let zone = fetch(client, &format!("{AWS_BASE}/placement/availability-zone"), None).await?;
    let instance_type = fetch(client, &format!("{AWS_BASE}/instance-type"), None)
        .await
        .ok()
        .and_then(non_empty);
    Ok(CloudInfo {
        provider: "aws".into(),
        region: aws_region_from_zone(&zone),
        instance_type,
    })
}

async fn gcp(client: &reqwest::Client) -> Result<CloudInfo, ProbeError> {
    let flavor = Some(("Metadata-Flavor", "Google"));
    let zone = fetch(client, &format!("{GCP_BASE}/zone"), flavor).await?;
    let machine_type = fetch(client, &format!("{GCP_BASE}/machine-type"), flavor)
        .await
        .ok();
    Ok(CloudInfo {
        provider: "gcp".into(),
        region: gcp_region_from_zone(&zone),
        instance_type: machine_type.as_deref().and_then(last_segment),
    })
}

async fn azure(client: &reqwest::Client) -> Result<CloudInfo, ProbeError> {
    let metadata = Some(("Metadata", "true"));
    let query = "api-version=2021-02-01&format=text";
    let location = fetch(client, &format!("{AZURE_BASE}/location?{query}"), metadata).await?;
    let vm_size = fetch(client, &format!("{AZURE_BASE}/vmSize?{query}"), metadata)
        .await
        .ok()
        .and_then(non_empty);
    Ok(CloudInfo {
        provider: "azure".into(),
        region: non_empty(location),
        instance_type: vm_size,
    })
}

async fn digitalocean(client: &reqwest::Client) -> Result<CloudInfo, ProbeError> {
    let region = fetch(client, &format!("{DO_BASE}/region"), None).await?;
    Ok(CloudInfo {
        provider: "digitalocean".into(),
        region: non_empty(region),
        instance_type: None,
    })
}

/// Query every provider at once and return the first, in priority order
/// (AWS, GCP, Azure, DigitalOcean), that reported a region or instance
/// type.
pub async fn detect(client: &reqwest::Client) -> Result<CloudInfo, ProbeError> {
    let probes: Vec<BoxFuture<'_, Result<CloudInfo, ProbeError>>> = vec![
        Box::pin(aws(client)),
        Box::pin(gcp(client)),
        Box::pin(azure(client)),
        Box::pin(digitalocean(client)),
    ];
    pick(join_all(probes).await)
}

fn pick(results: Vec<Result<CloudInfo, ProbeError>>) -> Result<CloudInfo, ProbeError> {
    results
        .into_iter()
        .filter_map(Result::ok)
        .find(|info| info.region.is_some() || info.instance_type.is_some())
        .ok_or(ProbeError::Unsupported("cloud metadata"))
}
