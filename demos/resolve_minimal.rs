use housing_ingest::{LoadRequest, Loader, LoaderConfig, ResultCache};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let loader = Loader::from_config(LoaderConfig::default())?;
    let mut cache = ResultCache::new();
    let request = LoadRequest::parse("./data/zip_history.csv.gz", &["11530", "10001"], "-1")?;

    // The second call is answered from `cache` while the file is unchanged.
    for _ in 0..2 {
        let resolution = loader.resolve(&mut cache, &request).await?;
        for (zip, result) in &resolution.results {
            let table = result.dated()?;
            let latest = table.rows.last().and_then(|r| r.row.get("median_listing_price"));
            println!(
                "{zip}: {} rows of {} scanned, latest price {}",
                table.len(),
                result.total_rows_processed,
                latest.unwrap_or("n/a")
            );
        }
        println!("scans={}", resolution.scans);
    }
    Ok(())
}
