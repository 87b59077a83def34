use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use clap::Parser;
use ozon_client::report::ProgressObserver;
use ozon_client::{
    ApiRequest, ClientConfig, GroupBy, PerformanceClient, PerformanceCredentials, ProgressEvent,
    ReportOptions, ReportRequest, RetryPolicy, SellerClient, SellerCredentials,
};
use reqwest::Method;
use std::time::Duration;

/// ozon-client - resilient client for the Ozon Seller and Performance APIs
///
/// Seller credentials are read from OZON_SELLER_CLIENT_ID and OZON_SELLER_API_KEY,
/// Performance credentials from OZON_PERF_CLIENT_ID and OZON_PERF_CLIENT_SECRET.
///
/// Examples:
///   ozon-client get /v1/warehouse/list
///   ozon-client post /v3/product/list --body '{"limit": 100}'
///   ozon-client report 123 456 --from 2024-01-01 --to 2024-01-31
#[derive(Parser, Debug)]
#[command(author, version = env!("OZON_CLIENT_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API host (defaults to the production host of the selected API)
    #[arg(long = "base-url", env = "OZON_BASE_URL", value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Maximum number of requests in flight
    #[arg(long = "max-concurrent", value_name = "N", global = true)]
    pub max_concurrent: Option<usize>,

    /// Retries after the first attempt for transient failures
    #[arg(long = "max-retries", value_name = "N", global = true)]
    pub max_retries: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long = "timeout", value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Send a GET request and print the JSON response
    Get(GetArgs),

    /// Send a POST request with a JSON body and print the JSON response
    Post(PostArgs),

    /// Generate a campaign statistics report (Performance API)
    Report(ReportArgs),
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
enum Api {
    #[default]
    Seller,
    Performance,
}

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// Endpoint path, e.g. /v1/warehouse/list
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Query parameter as KEY=VALUE (repeatable)
    #[arg(long = "query", short = 'q', value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub query: Vec<(String, String)>,

    /// Extra header as NAME=VALUE (repeatable)
    #[arg(long = "header", short = 'H', value_name = "NAME=VALUE", value_parser = parse_key_value)]
    pub headers: Vec<(String, String)>,

    #[arg(long, value_enum, default_value_t = Api::Seller)]
    api: Api,
}

#[derive(clap::Args, Debug)]
pub struct PostArgs {
    /// Endpoint path, e.g. /v3/product/list
    #[arg(value_name = "PATH")]
    pub path: String,

    /// JSON request body
    #[arg(long, short = 'b', value_name = "JSON", default_value = "{}")]
    pub body: String,

    /// Extra header as NAME=VALUE (repeatable)
    #[arg(long = "header", short = 'H', value_name = "NAME=VALUE", value_parser = parse_key_value)]
    pub headers: Vec<(String, String)>,

    #[arg(long, value_enum, default_value_t = Api::Seller)]
    api: Api,
}

#[derive(clap::Args, Debug)]
pub struct ReportArgs {
    /// Campaign ids (at most 10)
    #[arg(value_name = "CAMPAIGN_ID", required = true)]
    pub campaigns: Vec<String>,

    /// First day of the period (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub from: NaiveDate,

    /// Last day of the period (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub to: NaiveDate,

    /// Row grouping: DATE, NO_GROUP_BY, START_OF_WEEK or START_OF_MONTH
    #[arg(long = "group-by", value_name = "GROUPING", default_value = "DATE")]
    pub group_by: GroupBy,

    /// Maximum number of status polls
    #[arg(long = "max-attempts", default_value_t = 30)]
    pub max_attempts: u32,

    /// Seconds between status polls
    #[arg(long = "poll-interval", value_name = "SECONDS", default_value_t = 10)]
    pub poll_interval: u64,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", s))
}

fn build_config(cli: &Cli, api: Api) -> ClientConfig {
    let mut config = match api {
        Api::Seller => ClientConfig::seller(),
        Api::Performance => ClientConfig::performance(),
    };
    if let Some(url) = &cli.base_url {
        config = config.with_base_url(url.clone());
    }
    if let Some(n) = cli.max_concurrent {
        config = config.with_max_concurrent_requests(n);
    }
    if let Some(n) = cli.max_retries {
        config = config.with_retry(RetryPolicy::default().with_max_retries(n));
    }
    if let Some(secs) = cli.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    config
}

fn build_request(
    method: Method,
    path: &str,
    query: &[(String, String)],
    headers: &[(String, String)],
) -> Result<ApiRequest> {
    let mut request = ApiRequest::new(method, path);
    for (key, value) in query {
        request = request.with_query(key, value);
    }
    for (name, value) in headers {
        request = request.with_header(name, value)?;
    }
    Ok(request)
}

async fn send(cli: &Cli, api: Api, request: ApiRequest) -> Result<serde_json::Value> {
    let config = build_config(cli, api);
    let value = match api {
        Api::Seller => {
            let credentials = SellerCredentials::from_env()?;
            let client = SellerClient::connect(config, credentials)
                .await
                .context("Failed to open Seller API session")?;
            client.execute(&request).await?
        }
        Api::Performance => {
            let credentials = PerformanceCredentials::from_env()?;
            let client = PerformanceClient::connect(config, credentials)
                .await
                .context("Failed to open Performance API session")?;
            client.execute(&request).await?
        }
    };
    Ok(value)
}

fn print_progress(event: &ProgressEvent) {
    eprintln!(
        "Report {}: attempt {}/{} status {} ({:.0}s elapsed)",
        event.job_id,
        event.attempt,
        event.max_attempts,
        event.status,
        event.elapsed.as_secs_f64()
    );
}

async fn report(cli: &Cli, args: &ReportArgs) -> Result<()> {
    let config = build_config(cli, Api::Performance);
    let credentials = PerformanceCredentials::from_env()?;
    let client = PerformanceClient::connect(config, credentials)
        .await
        .context("Failed to open Performance API session")?;

    let request = ReportRequest::new(args.campaigns.iter().cloned(), args.from, args.to)
        .with_group_by(args.group_by);
    let options = ReportOptions::new(args.max_attempts, Duration::from_secs(args.poll_interval));
    let observer: &dyn ProgressObserver = &print_progress;

    let parts = client
        .statistics_report(&request, options, Some(observer))
        .await?;
    if parts.is_empty() {
        return Err(anyhow!("Report contained no data"));
    }
    for part in parts {
        println!("== {} ==", part.item_id);
        println!("{}", part.content.trim_end());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Get(args) => {
            let request = build_request(Method::GET, &args.path, &args.query, &args.headers)?;
            let value = send(&cli, args.api, request).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Post(args) => {
            let body: serde_json::Value =
                serde_json::from_str(&args.body).context("--body is not valid JSON")?;
            let request =
                build_request(Method::POST, &args.path, &[], &args.headers)?.with_json(body);
            let value = send(&cli, args.api, request).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Report(args) => report(&cli, args).await?,
    }
    Ok(())
}
