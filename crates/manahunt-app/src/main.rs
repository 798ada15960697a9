//! Command-line driver for the manahunt search: builds the dungeon, deploys
//! hunters over the worker pool, reports the peak, and renders the maps.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use manahunt_core::{
    ColorMap, HuntConfig, Hunter, ManaField, SearchResult, global_peak, power_map,
    power_map_with_grain,
};
use rand::Rng;
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "manahunt",
    version,
    about = "Parallel hill-climb search for the dungeon master's mana peak"
)]
struct Cli {
    /// Half-width of the square dungeon; bounds are [-size, size] on both axes.
    size: f64,

    /// Search density; the hunt deploys density * (2 * size)^2 * 5 hunters.
    density: f64,

    /// RNG seed for boss placement and start cells; 0 draws from entropy.
    seed: u64,

    /// Sequential cutoff for the search fork/join.
    #[arg(long, default_value_t = 10)]
    search_grain: usize,

    /// Sequential cutoff in rows for the render fork/join; defaults to a
    /// value tuned from the worker count.
    #[arg(long)]
    render_grain: Option<usize>,

    /// Number of worker threads; defaults to all cores.
    #[arg(long)]
    threads: Option<usize>,

    /// Where to write the full power map.
    #[arg(long, default_value = "mana_map.png")]
    map_out: PathBuf,

    /// Where to write the trails-only power map.
    #[arg(long, default_value = "mana_trails.png")]
    trail_out: PathBuf,

    /// Skip writing the PNG maps.
    #[arg(long)]
    no_images: bool,

    /// Emit the hunt summary as JSON instead of the plain report.
    #[arg(long)]
    json: bool,
}

/// Where and by whom the strongest mana was found.
#[derive(Debug, Serialize)]
struct PeakReport {
    mana: i32,
    finder: usize,
    x: f64,
    y: f64,
    steps: u32,
}

/// Everything the hunt produced, ready for the report or JSON output.
#[derive(Debug, Serialize)]
struct HuntSummary {
    half_width: f64,
    rows: usize,
    columns: usize,
    hunters: usize,
    workers: usize,
    search_ms: u128,
    evaluated_cells: usize,
    coverage_percent: f64,
    peak: Option<PeakReport>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to size the worker pool")?;
    }

    let config = HuntConfig {
        half_width: cli.size,
        search_density: cli.density,
        seed: cli.seed,
        search_grain: cli.search_grain,
        render_grain: cli.render_grain,
    };

    let field = ManaField::new(&config)?;
    let mut hunters = deploy(&config, &field);
    info!(
        rows = field.rows(),
        columns = field.columns(),
        hunters = hunters.len(),
        workers = rayon::current_num_threads(),
        "deploying hunters"
    );

    let started = Instant::now();
    let result = global_peak(&field, &mut hunters, config.search_grain);
    let search_ms = started.elapsed().as_millis();

    let summary = summarize(&config, &field, &hunters, result, search_ms);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        report(&summary);
    }

    if !cli.no_images {
        let full = render(&field, &config, false);
        write_map(&full, &cli.map_out)?;
        let trails = render(&field, &config, true);
        write_map(&trails, &cli.trail_out)?;
    }

    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Samples hunter start cells from the config-seeded RNG, ids in dispatch
/// order.
fn deploy(config: &HuntConfig, field: &ManaField) -> Vec<Hunter> {
    let mut rng = config.seeded_rng();
    (0..config.hunter_count())
        .map(|i| {
            let row = rng.random_range(0..field.rows());
            let col = rng.random_range(0..field.columns());
            Hunter::new(i as u32, row, col)
        })
        .collect()
}

fn summarize(
    config: &HuntConfig,
    field: &ManaField,
    hunters: &[Hunter],
    result: SearchResult,
    search_ms: u128,
) -> HuntSummary {
    let cells = field.rows() * field.columns();
    let evaluated = field.evaluated_cells();
    let peak = result.finder.and_then(|finder| {
        let hunter = hunters.get(finder)?;
        let (row, col) = hunter.position();
        Some(PeakReport {
            mana: result.peak_mana,
            finder,
            x: field.x_coord(row),
            y: field.y_coord(col),
            steps: hunter.steps(),
        })
    });

    HuntSummary {
        half_width: config.half_width,
        rows: field.rows(),
        columns: field.columns(),
        hunters: hunters.len(),
        workers: rayon::current_num_threads(),
        search_ms,
        evaluated_cells: evaluated,
        coverage_percent: evaluated as f64 / cells as f64 * 100.0,
        peak,
    }
}

fn report(summary: &HuntSummary) {
    println!("dungeon size: {:.1}", summary.half_width);
    println!(
        "grid: {} rows x {} columns, x in [{:.1}, {:.1}], y in [{:.1}, {:.1}]",
        summary.rows,
        summary.columns,
        -summary.half_width,
        summary.half_width,
        -summary.half_width,
        summary.half_width,
    );
    println!(
        "hunters deployed: {} across {} workers",
        summary.hunters, summary.workers
    );
    println!("search time: {} ms", summary.search_ms);
    println!(
        "grid points evaluated: {} of {} ({:.0}%)",
        summary.evaluated_cells,
        summary.rows * summary.columns,
        summary.coverage_percent
    );
    match &summary.peak {
        Some(peak) => println!(
            "dungeon master (mana {}) found at x={:.1} y={:.1} by hunter {} after {} steps",
            peak.mana, peak.x, peak.y, peak.finder, peak.steps
        ),
        None => println!("no mana observed; deploy more hunters"),
    }
}

fn render(field: &ManaField, config: &HuntConfig, path_only: bool) -> ColorMap {
    match config.render_grain {
        Some(grain) => power_map_with_grain(field, path_only, grain),
        None => power_map(field, path_only),
    }
}

/// Flattens the map into tight RGB rows for the encoder. Grid rows run along
/// the image x axis and column 0 lands at the bottom of the image.
fn image_bytes(map: &ColorMap) -> Vec<u8> {
    let rows = map.rows();
    let columns = map.columns();
    let mut bytes = vec![0u8; rows * columns * 3];
    for (idx, pixel) in map.pixels().iter().enumerate() {
        let row = idx / columns;
        let col = idx % columns;
        let base = ((columns - 1 - col) * rows + row) * 3;
        bytes[base..base + 3].copy_from_slice(pixel);
    }
    bytes
}

fn write_map(map: &ColorMap, path: &Path) -> Result<()> {
    let bytes = image_bytes(map);
    image::save_buffer_with_format(
        path,
        &bytes,
        map.rows() as u32,
        map.columns() as u32,
        image::ColorType::Rgb8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "map saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_positionals_and_flags() {
        let cli =
            Cli::try_parse_from(["manahunt", "4", "0.2", "7", "--threads", "2", "--no-images"])
                .expect("cli");
        assert!((cli.size - 4.0).abs() < f64::EPSILON);
        assert!((cli.density - 0.2).abs() < f64::EPSILON);
        assert_eq!(cli.seed, 7);
        assert_eq!(cli.search_grain, 10);
        assert_eq!(cli.threads, Some(2));
        assert!(cli.no_images);
        assert!(!cli.json);
    }

    #[test]
    fn cli_rejects_missing_positionals() {
        assert!(Cli::try_parse_from(["manahunt", "4", "0.2"]).is_err());
    }

    #[test]
    fn image_bytes_flip_columns_for_the_encoder() {
        let config = HuntConfig {
            half_width: 1.0,
            seed: 5,
            ..HuntConfig::default()
        };
        let field = ManaField::new(&config).expect("field");
        field.mana_at(0, 0);

        let map = power_map(&field, false);
        let bytes = image_bytes(&map);
        let rows = map.rows();
        let columns = map.columns();
        assert_eq!(bytes.len(), rows * columns * 3);

        // grid cell (0, 0) lands on the bottom image row, first column
        let base = (columns - 1) * rows * 3;
        let pixel = [bytes[base], bytes[base + 1], bytes[base + 2]];
        assert_eq!(map.get(0, 0), Some(pixel));
        assert_ne!(pixel, [0, 0, 0]);
    }

    #[test]
    fn summary_handles_a_hunt_with_no_hunters() {
        let config = HuntConfig {
            half_width: 1.0,
            search_density: 0.0,
            seed: 3,
            ..HuntConfig::default()
        };
        let field = ManaField::new(&config).expect("field");
        let mut hunters = deploy(&config, &field);
        assert!(hunters.is_empty());

        let result = global_peak(&field, &mut hunters, config.search_grain);
        let summary = summarize(&config, &field, &hunters, result, 0);
        assert!(summary.peak.is_none());
        assert_eq!(summary.evaluated_cells, 0);
        assert_eq!(summary.coverage_percent, 0.0);
    }
}
