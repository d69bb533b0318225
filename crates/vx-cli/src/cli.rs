use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "vx",
    version,
    about = "Mirror vulnerability data from the NVD and GitHub",
    propagate_version = true
)]
pub struct VxCli {
    #[arg(short, long, action = ArgAction::Count, global = true, help = "Increase logging (-vv reaches trace)")]
    pub verbose: u8,
    #[arg(long, global = true, help = "Force trace logging regardless of -v")]
    pub trace: bool,
    #[arg(short, long, global = true, help = "Only log warnings and errors")]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: CommandCli,
}

#[derive(Subcommand, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum CommandCli {
    /// Fetch CVE records from the NVD API, streaming JSON or maintaining a
    /// year-partitioned cache
    Cve(CveArgs),
    /// Fetch security advisories from the GitHub GraphQL API
    Ghsa(GhsaArgs),
}

#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct CveArgs {
    #[arg(long, help = "Override the NVD API endpoint")]
    pub endpoint: Option<String>,
    #[arg(
        long,
        help = "NVD API key; prefer setting the NVD_API_KEY environment variable"
    )]
    pub api_key: Option<String>,
    #[arg(long, value_name = "MS", help = "Minimum delay between API calls")]
    pub delay: Option<u64>,
    #[arg(
        long,
        default_value_t = 1,
        help = "Worker threads; honored only with an API key"
    )]
    pub threads: usize,
    #[arg(
        long,
        default_value_t = 0,
        help = "Maximum pages to fetch, 0 for unlimited"
    )]
    pub page_count: usize,
    #[arg(long, default_value_t = 2000, help = "Records per page, 1..=2000")]
    pub records_per_page: u32,
    #[arg(
        long,
        default_value_t = 0,
        help = "Retry budget for 429/503 responses"
    )]
    pub max_retry: u32,

    #[arg(long, requires = "directory", help = "Maintain the on-disk cache instead of streaming JSON")]
    pub cache: bool,
    #[arg(long, value_name = "DIR", help = "Cache directory")]
    pub directory: Option<PathBuf>,
    #[arg(long, help = "Cache filename prefix (default nvdcve-)")]
    pub prefix: Option<String>,
    #[arg(
        long,
        value_name = "FILE",
        help = "Write the JSON stream to a file instead of stdout"
    )]
    pub output: Option<PathBuf>,
    #[arg(long, help = "Pretty print the JSON output")]
    pub pretty_print: bool,

    #[arg(long, help = "Filter by CVE id")]
    pub cve_id: Option<String>,
    #[arg(long, help = "Filter by CPE name")]
    pub cpe_name: Option<String>,
    #[arg(long, help = "Filter by a full or partial CVSSv2 vector")]
    pub cvss_v2_metrics: Option<String>,
    #[arg(long, help = "Filter by a full or partial CVSSv3 vector")]
    pub cvss_v3_metrics: Option<String>,
    #[arg(long, help = "Filter by CWE id")]
    pub cwe_id: Option<String>,
    #[arg(long, help = "Exact keyword match in descriptions")]
    pub keyword_exact_match: Option<String>,
    #[arg(long, help = "Keyword search in descriptions")]
    pub keyword_search: Option<String>,
    #[arg(long, help = "Only records with CERT alerts")]
    pub has_cert_alerts: bool,
    #[arg(long, help = "Only records with CERT notes")]
    pub has_cert_notes: bool,
    #[arg(long, help = "Only records in the CISA KEV catalog")]
    pub has_kev: bool,
    #[arg(long, help = "Only records with OVAL definitions")]
    pub has_oval: bool,
    #[arg(
        long,
        requires = "cpe_name",
        help = "Only records marking the given CPE vulnerable"
    )]
    pub is_vulnerable: bool,
    #[arg(long, help = "Exclude rejected records")]
    pub no_rejected: bool,
    #[arg(long, value_name = "SEVERITY", help = "LOW, MEDIUM, or HIGH")]
    pub cvss_v2_severity: Option<String>,
    #[arg(
        long,
        value_name = "SEVERITY",
        help = "LOW, MEDIUM, HIGH, or CRITICAL"
    )]
    pub cvss_v3_severity: Option<String>,
    #[arg(
        long,
        value_name = "DATETIME",
        help = "Start of the lastModified range (UTC)"
    )]
    pub last_mod_start_date: Option<String>,
    #[arg(
        long,
        value_name = "DATETIME",
        requires = "last_mod_start_date",
        help = "End of the lastModified range; defaults to start + 120 days"
    )]
    pub last_mod_end_date: Option<String>,
    #[arg(
        long,
        value_name = "DATETIME",
        requires = "pub_end_date",
        help = "Start of the published range (UTC)"
    )]
    pub pub_start_date: Option<String>,
    #[arg(
        long,
        value_name = "DATETIME",
        requires = "pub_start_date",
        help = "End of the published range (UTC)"
    )]
    pub pub_end_date: Option<String>,
    #[arg(long, help = "Filter by a CPE match string fragment")]
    pub virtual_match_string: Option<String>,
    #[arg(long, value_name = "VERSION", help = "Lower bound for virtual matching")]
    pub version_start: Option<String>,
    #[arg(
        long,
        value_name = "TYPE",
        requires = "version_start",
        help = "INCLUDING or EXCLUDING"
    )]
    pub version_start_type: Option<String>,
    #[arg(long, value_name = "VERSION", help = "Upper bound for virtual matching")]
    pub version_end: Option<String>,
    #[arg(
        long,
        value_name = "TYPE",
        requires = "version_end",
        help = "INCLUDING or EXCLUDING"
    )]
    pub version_end_type: Option<String>,
}

#[derive(Args, Debug)]
pub struct GhsaArgs {
    #[arg(long, help = "Override the GitHub GraphQL endpoint")]
    pub endpoint: Option<String>,
    #[arg(
        long,
        help = "GitHub token; prefer setting the GITHUB_TOKEN environment variable"
    )]
    pub token: Option<String>,
    #[arg(long, value_name = "MS", default_value_t = 0, help = "Minimum delay between API calls")]
    pub delay: u64,
    #[arg(long, default_value_t = 100, help = "Advisories per page, 1..=100")]
    pub page_size: u32,
    #[arg(
        long,
        default_value_t = 0,
        help = "Retry budget for 429/503 responses"
    )]
    pub max_retry: u32,
    #[arg(
        long,
        value_name = "DATETIME",
        help = "Only advisories updated since this UTC datetime"
    )]
    pub updated_since: Option<String>,
    #[arg(
        long,
        value_name = "DATETIME",
        help = "Only advisories published since this UTC datetime"
    )]
    pub published_since: Option<String>,
    #[arg(
        long,
        value_name = "LIST",
        help = "Comma-separated classifications: GENERAL, MALWARE"
    )]
    pub classifications: Option<String>,
    #[arg(
        long,
        value_name = "FILE",
        help = "Write the JSON stream to a file instead of stdout"
    )]
    pub output: Option<PathBuf>,
    #[arg(long, help = "Pretty print the JSON output")]
    pub pretty_print: bool,
}
