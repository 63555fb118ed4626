use clap::{Arg, Command};
use std::io::{self, Write};

/// Writes a synthetic zip-history CSV: one row per (month, zip), newest month first.
fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .arg(
            Arg::new("zips")
                .long("zips")
                .value_parser(clap::value_parser!(u32))
                .required(true),
        )
        .arg(
            Arg::new("months")
                .long("months")
                .value_parser(clap::value_parser!(u32))
                .default_value("24"),
        )
        .arg(
            Arg::new("start")
                .long("start")
                .help("Oldest month, YYYYMM")
                .value_parser(clap::value_parser!(u32))
                .default_value("202201"),
        )
        .get_matches();

    let zips = matches.get_one::<u32>("zips").copied().unwrap_or(1).min(99_999);
    let months = matches.get_one::<u32>("months").copied().unwrap_or(24);
    let start = matches.get_one::<u32>("start").copied().unwrap_or(202_201);
    let (start_year, start_month) = (start / 100, (start % 100).clamp(1, 12) - 1);

    let mut out = io::BufWriter::new(io::stdout().lock());
    writeln!(
        &mut out,
        "month_date_yyyymm,postal_code,zip_name,median_listing_price,median_days_on_market,\
         median_listing_price_per_square_foot,median_listing_price_per_square_foot_yy,median_square_feet"
    )?;

    // Deterministic data; postal codes are written without padding, like numeric exports.
    for m in (0..months).rev() {
        let idx = start_month + m;
        let yyyymm = (start_year + idx / 12) * 100 + idx % 12 + 1;
        for z in 1..=zips {
            let base = 150_000 + (z % 500) * 1_000;
            let price = base + m * (z % 7 + 1) * 250;
            let days = 20 + (z + m) % 70;
            let sqft = 1_200 + (z % 40) * 25;
            let ppsf = price as f64 / sqft as f64;
            let yy = ((z + m) % 21) as f64 / 100.0 - 0.1;
            writeln!(
                &mut out,
                "{yyyymm},{z},\"zip {z}, xx\",{price},{days},{ppsf:.2},{yy:.4},{sqft}"
            )?;
        }
        if m % 12 == 0 {
            out.flush()?;
        } // keep buffers moving on huge runs
    }

    out.flush()?;
    Ok(())
}
