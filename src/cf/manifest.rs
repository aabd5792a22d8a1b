//! Single-tenant variant of the multi-tenant java sample manifest

use log::debug;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::Result;

const SMS_BINDING: &str = "- java-ams-sms";
const SUBSCRIBER_ROUTE: &str = "- route: ((SUBSCRIBER_TENANT_ID))";
const PROVIDER_ROUTE: &str = "- route: ((PROVIDER_TENANT_ID))";
const PROVIDER_APPROUTER_HOST: &str = "((PROVIDER_TENANT_ID))--((PROVIDER_TENANT_NAME))-ar";
const SINGLE_TENANT_APPROUTER_HOST: &str = "java-ams-approuter";

/// Drops the subscription binding and subscriber route; points the provider route at the
/// single-tenant approuter host. Line endings and indentation are preserved.
pub fn strip_multi_tenancy(manifest: &str) -> String {
    manifest
        .split_inclusive('\n')
        .filter(|line| {
            let trimmed = line.trim();
            trimmed != SMS_BINDING && !trimmed.starts_with(SUBSCRIBER_ROUTE)
        })
        .map(|line| {
            if line.trim().starts_with(PROVIDER_ROUTE) {
                line.replace(PROVIDER_APPROUTER_HOST, SINGLE_TENANT_APPROUTER_HOST)
            } else {
                line.to_string()
            }
        })
        .collect()
}

/// Writes `manifest-non-mt-*.yml` next to `<dir>/manifest.yml`. The file is deleted when
/// the returned handle is dropped.
pub fn write_single_tenant_manifest(manifest_dir: &Path) -> Result<NamedTempFile> {
    let original = fs::read_to_string(manifest_dir.join("manifest.yml"))?;
    let mut file = tempfile::Builder::new()
        .prefix("manifest-non-mt-")
        .suffix(".yml")
        .tempfile_in(manifest_dir)?;
    file.write_all(strip_multi_tenancy(&original).as_bytes())?;
    file.flush()?;
    debug!("wrote single-tenant manifest {:?}", file.path());
    Ok(file)
}
