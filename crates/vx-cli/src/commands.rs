use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use vx_core::mirror::{mirror_cves, MirrorError};
use vx_core::{env_secret, CacheStore, StreamingOutput};
use vx_ghsa::{AdvisoryPages, Classification, GhsaClientConfig};
use vx_nvd::{timestamp, CveFilter, CvePages, NvdClientConfig};

use crate::cli::{CommandCli, CveArgs, GhsaArgs, VxCli};

/// Exit code for an upstream-reported non-success status.
const EXIT_UPSTREAM: i32 = 2;

pub fn run(cli: VxCli) -> Result<i32> {
    match cli.command {
        CommandCli::Cve(args) => run_cve(args),
        CommandCli::Ghsa(args) => run_ghsa(args),
    }
}

fn run_cve(args: CveArgs) -> Result<i32> {
    let config = nvd_config(&args)?;
    if args.cache {
        let directory = args
            .directory
            .as_deref()
            .context("--cache requires --directory")?;
        let mut store = CacheStore::open(directory, args.prefix.as_deref())?;
        match mirror_cves(&mut store, config) {
            Ok(summary) => {
                tracing::info!(
                    pages = summary.pages,
                    records = summary.records,
                    directory = %directory.display(),
                    "mirror complete"
                );
                Ok(0)
            }
            Err(MirrorError::Status(status)) => {
                tracing::error!(status, "mirror aborted by upstream; cache left untouched");
                Ok(EXIT_UPSTREAM)
            }
            Err(err) => Err(err.into()),
        }
    } else {
        let mut pages = CvePages::new(config)?;
        let sink = open_sink(args.output.as_deref())?;
        let mut output = StreamingOutput::new(sink, "cves", args.pretty_print)?;
        for page in &mut pages {
            let page = page?;
            output.batch_received(Some(page.timestamp));
            for item in &page.items {
                output.record(&item.cve)?;
            }
        }
        if pages.last_status() != 200 {
            output.upstream_failed(pages.last_status());
        }
        let failed = output.failed();
        output.finish()?;
        Ok(if failed { EXIT_UPSTREAM } else { 0 })
    }
}

fn run_ghsa(args: GhsaArgs) -> Result<i32> {
    let config = ghsa_config(&args)?;
    let mut pages = AdvisoryPages::new(config)?;
    let sink = open_sink(args.output.as_deref())?;
    let mut output = StreamingOutput::new(sink, "advisories", args.pretty_print)?;
    for page in &mut pages {
        let page = page?;
        output.batch_received(None);
        for advisory in &page.advisories {
            output.record(advisory)?;
        }
    }
    if pages.last_status() != 200 {
        output.upstream_failed(pages.last_status());
    }
    let failed = output.failed();
    output.finish()?;
    Ok(if failed { EXIT_UPSTREAM } else { 0 })
}

fn nvd_config(args: &CveArgs) -> Result<NvdClientConfig> {
    if args.api_key.is_some() {
        tracing::warn!("prefer the NVD_API_KEY environment variable over --api-key");
    }
    let api_key = args.api_key.clone().or_else(|| env_secret("NVD_API_KEY"));

    let mut config = NvdClientConfig {
        api_key,
        delay: args.delay.map(Duration::from_millis),
        thread_count: args.threads,
        max_page_count: args.page_count,
        results_per_page: args.records_per_page,
        max_retry_count: args.max_retry,
        filters: cve_filters(args)?,
        ..NvdClientConfig::default()
    };
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    Ok(config)
}

fn cve_filters(args: &CveArgs) -> Result<Vec<CveFilter>> {
    let mut filters = Vec::new();
    if let Some(value) = &args.cve_id {
        filters.push(CveFilter::CveId(value.clone()));
    }
    if let Some(value) = &args.cpe_name {
        filters.push(CveFilter::CpeName(value.clone()));
    }
    if let Some(value) = &args.cvss_v2_metrics {
        filters.push(CveFilter::CvssV2Metrics(value.clone()));
    }
    if let Some(value) = &args.cvss_v3_metrics {
        filters.push(CveFilter::CvssV3Metrics(value.clone()));
    }
    if let Some(value) = &args.cwe_id {
        filters.push(CveFilter::CweId(value.clone()));
    }
    if let Some(value) = &args.keyword_exact_match {
        filters.push(CveFilter::KeywordExactMatch(value.clone()));
    }
    if let Some(value) = &args.keyword_search {
        filters.push(CveFilter::KeywordSearch(value.clone()));
    }
    if args.has_cert_alerts {
        filters.push(CveFilter::HasCertAlerts);
    }
    if args.has_cert_notes {
        filters.push(CveFilter::HasCertNotes);
    }
    if args.has_kev {
        filters.push(CveFilter::HasKev);
    }
    if args.has_oval {
        filters.push(CveFilter::HasOval);
    }
    if args.is_vulnerable {
        filters.push(CveFilter::IsVulnerable);
    }
    if args.no_rejected {
        filters.push(CveFilter::NoRejected);
    }
    if let Some(value) = &args.cvss_v2_severity {
        filters.push(CveFilter::CvssV2Severity(value.parse()?));
    }
    if let Some(value) = &args.cvss_v3_severity {
        filters.push(CveFilter::CvssV3Severity(value.parse()?));
    }
    if let Some(start) = &args.last_mod_start_date {
        let start = parse_datetime(start)?;
        let end = match &args.last_mod_end_date {
            Some(end) => parse_datetime(end)?,
            None => start + time::Duration::days(120),
        };
        filters.push(CveFilter::LastModifiedRange { start, end });
    }
    if let (Some(start), Some(end)) = (&args.pub_start_date, &args.pub_end_date) {
        filters.push(CveFilter::PublishedRange {
            start: parse_datetime(start)?,
            end: parse_datetime(end)?,
        });
    }
    if let Some(value) = &args.virtual_match_string {
        filters.push(CveFilter::VirtualMatchString(value.clone()));
    }
    if let Some(version) = &args.version_start {
        filters.push(CveFilter::VersionStart {
            version: version.clone(),
            bound: bound_type(args.version_start_type.as_deref())?,
        });
    }
    if let Some(version) = &args.version_end {
        filters.push(CveFilter::VersionEnd {
            version: version.clone(),
            bound: bound_type(args.version_end_type.as_deref())?,
        });
    }
    Ok(filters)
}

fn ghsa_config(args: &GhsaArgs) -> Result<GhsaClientConfig> {
    if args.token.is_some() {
        tracing::warn!("prefer the GITHUB_TOKEN environment variable over --token");
    }
    let mut config = GhsaClientConfig {
        token: args.token.clone().or_else(|| env_secret("GITHUB_TOKEN")),
        page_size: args.page_size,
        delay: Duration::from_millis(args.delay),
        max_retry_count: args.max_retry,
        ..GhsaClientConfig::default()
    };
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(value) = &args.updated_since {
        config.updated_since = Some(parse_datetime(value)?);
    }
    if let Some(value) = &args.published_since {
        config.published_since = Some(parse_datetime(value)?);
    }
    if let Some(value) = &args.classifications {
        config.classifications = Classification::parse_list(value)?;
    }
    Ok(config)
}

fn parse_datetime(value: &str) -> Result<time::OffsetDateTime> {
    timestamp::parse(value)
        .with_context(|| format!("`{value}` is not a UTC datetime such as 2024-01-01T00:00:00"))
}

fn bound_type(value: Option<&str>) -> Result<vx_nvd::VersionBoundType> {
    Ok(value.unwrap_or("INCLUDING").parse()?)
}

fn open_sink(path: Option<&std::path::Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(std::io::stdout()))),
    }
}
