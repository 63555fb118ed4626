use clap::{Arg, ArgAction, ArgMatches, Command};
use housing_ingest::metrics::{self, Direction, METRICS, PRICE, PRICE_PER_SQFT_YY};
use housing_ingest::{
    FilteredResult, LoadRequest, Loader, LoaderConfig, Resolution, ResultCache, BATCH_SIZE,
};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

const DEFAULT_URL: &str =
    "https://econdata.s3-us-west-2.amazonaws.com/Reports/Core/RDC_Inventory_Core_Metrics_Zip_History.csv";

fn cli() -> Command {
    Command::new("housing")
        .about("Filter a housing-metrics CSV by zip code and print trends")
        .arg(
            Arg::new("url")
                .long("url")
                .env("HOUSING_CSV_URL")
                .default_value(DEFAULT_URL)
                .help("CSV URL or local path"),
        )
        .arg(
            Arg::new("zip")
                .long("zip")
                .action(ArgAction::Append)
                .default_value("11530")
                .help("Zip code to filter on (repeatable)"),
        )
        .arg(
            Arg::new("rows")
                .long("rows")
                .env("HOUSING_ROWS")
                .default_value("-1")
                .allow_hyphen_values(true)
                .help("Rows to read; -1 reads the entire file"),
        )
        .arg(
            Arg::new("batch-size")
                .long("batch-size")
                .value_parser(clap::value_parser!(usize))
                .default_value("10000"),
        )
        .arg(
            Arg::new("batch-timeout-secs")
                .long("batch-timeout-secs")
                .value_parser(clap::value_parser!(u64))
                .default_value("120")
                .help("Abort a scan when no batch arrives in time; 0 waits forever"),
        )
        .arg(
            Arg::new("interactive")
                .long("interactive")
                .help("Keep reading requests from stdin, reusing cached results")
                .action(ArgAction::SetTrue),
        )
}

fn loader_config(matches: &ArgMatches) -> LoaderConfig {
    let batch_size = matches.get_one::<usize>("batch-size").copied().unwrap_or(BATCH_SIZE);
    let timeout = matches.get_one::<u64>("batch-timeout-secs").copied().unwrap_or(0);
    LoaderConfig {
        batch_size,
        batch_timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
        ..LoaderConfig::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "housing_ingest=info,housing=info".into()),
        )
        .with_target(true)
        .init();

    let matches = cli().get_matches();
    let url = matches.get_one::<String>("url").cloned().unwrap_or_default();
    let rows = matches.get_one::<String>("rows").cloned().unwrap_or_default();
    let zips: Vec<String> = matches
        .get_many::<String>("zip")
        .map(|z| z.cloned().collect())
        .unwrap_or_default();

    let loader = Loader::from_config(loader_config(&matches))?;
    let mut cache = ResultCache::new();

    let request = LoadRequest::parse(&url, &zips, &rows)?;
    if !matches.get_flag("interactive") {
        let started = Instant::now();
        let resolution = loader.resolve(&mut cache, &request).await?;
        report(&resolution, started.elapsed());
        return Ok(());
    }

    let mut defaults = request;
    println!(
        "Enter zip codes (e.g. `11530 10001 rows=5000 url=...`), empty line to reload, `quit` to exit"
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let next = match parse_line(&defaults, lines.next_line().await?.as_deref()) {
            Ok(Some(next)) => next,
            Ok(None) => break,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        let started = Instant::now();
        match loader.resolve(&mut cache, &next).await {
            Ok(resolution) => report(&resolution, started.elapsed()),
            Err(e) => {
                error!("{e}");
                eprintln!("Please check your CSV URL and try again.");
            }
        }
        defaults = next;
    }
    Ok(())
}

/// `None` on end of input or `quit`.
fn parse_line(
    defaults: &LoadRequest,
    line: Option<&str>,
) -> Result<Option<LoadRequest>, housing_ingest::ValidationError> {
    let Some(line) = line.map(str::trim) else {
        return Ok(None);
    };
    if line == "quit" {
        return Ok(None);
    }

    let mut url = defaults.url.clone();
    let mut rows = defaults.row_limit.to_string();
    let mut zips = Vec::new();
    for token in line.split_whitespace() {
        if let Some(v) = token.strip_prefix("url=") {
            url = v.to_string();
        } else if let Some(v) = token.strip_prefix("rows=") {
            rows = v.to_string();
        } else {
            zips.push(token.to_string());
        }
    }
    if zips.is_empty() {
        zips = defaults.zips.iter().map(|z| z.to_string()).collect();
    }
    LoadRequest::parse(&url, &zips, &rows).map(Some)
}

fn report(resolution: &Resolution, elapsed: Duration) {
    for warning in &resolution.warnings {
        println!("warning: {warning} (data may not reflect the latest version of the file)");
    }
    for (zip, result) in &resolution.results {
        if resolution.is_cached(zip) {
            println!("[{zip}] using cached data (file unchanged)");
        }
        report_zip(result);
    }
    println!(
        "scans={} zips={} elapsed={:.1}s",
        resolution.scans,
        resolution.results.len(),
        elapsed.as_secs_f64()
    );
}

fn report_zip(result: &FilteredResult) {
    let zip = &result.zip;
    if result.is_empty() {
        println!(
            "No data found for zip code {zip} ({} rows processed)",
            result.total_rows_processed
        );
        return;
    }
    let table = match result.dated() {
        Ok(table) => table,
        Err(e) => {
            println!("[{zip}] cannot build table: {e}");
            return;
        }
    };
    println!(
        "Found {} records for zip code {zip} (from {} total rows processed)",
        table.len(),
        result.total_rows_processed
    );

    let columns = table.display_columns();
    println!("{}", columns.join("\t"));
    for dated in &table.rows {
        let cells: Vec<&str> = columns.iter().map(|c| dated.row.get(c).unwrap_or("")).collect();
        println!("{}", cells.join("\t"));
    }

    for (column, label) in METRICS {
        let Some(summary) = metrics::summarize(&table.series(column)) else {
            continue;
        };
        let change = summary
            .last_change_pct
            .map_or_else(|| "N/A".to_string(), |pct| format!("{pct:+.1}%"));
        println!("{label}: {:.1} ({change})", summary.mean);
    }

    let yy = table.series(PRICE_PER_SQFT_YY);
    let negative = yy.iter().filter(|(_, v)| Direction::of(*v) == Direction::Below).count();
    if !yy.is_empty() {
        println!("Price per sq ft (YY): {negative} of {} months negative", yy.len());
    }

    let yearly = metrics::compare_to_group_mean(&table.series(PRICE), metrics::by_year);
    for point in yearly.iter().filter(|p| p.direction == Direction::Above) {
        println!(
            "{}: {:.0} above {} average of {:.0}",
            point.date.format("%b %Y"),
            point.value,
            point.bucket,
            point.bucket_mean
        );
    }

    let insights = metrics::insights(&table);
    if let (Some(pct), Some(up)) = (insights.price_change_pct, insights.appreciating()) {
        let trend = if up { "appreciating" } else { "depreciating" };
        println!("Total price change: {pct:+.1}% (market is {trend})");
    }
    if let (Some(pct), Some(speed)) = (insights.days_change_pct, insights.speed) {
        println!("Days on market change: {pct:+.1}% ({})", speed.label());
    }
}
