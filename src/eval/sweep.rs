use std::fs;
use std::path::Path;
use std::process;

use log::warn;
use mips_sim::cpu::CPUPolicy;
use mips_sim::error::SimulatorError;
use mips_sim::error::SimulatorResult;
use mips_sim::memory::cache::CachePolicy;
use mips_sim::memory::CacheConfig;
use mips_sim::memory::CacheMode;
use mips_sim::memory::WritePolicy;
use mips_sim::run_wrapper::run;
use mips_sim::run_wrapper::RunStats;
use plotters::prelude::*;

// Cache sizes in words
const CACHE_SIZES: [u32; 4] = [16, 64, 256, 1024];
const BLOCK_SIZES: [usize; 3] = [1, 4, 8];
const WRITE_POLICIES: [WritePolicy; 2] = [WritePolicy::WriteBack, WritePolicy::WriteThrough];
const MODES: [CacheMode; 2] = [CacheMode::Split, CacheMode::Unified];

/// One line of the plot: a cache organisation swept across sizes
struct Series {
    label: String,
    points: Vec<(u32, u64)>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .init();

    if let Err(e) = run_eval() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn io_error(context: &str, err: impl std::fmt::Display) -> SimulatorError {
    SimulatorError::IoError(std::io::Error::other(format!("{}: {}", context, err)))
}

fn config(mode: CacheMode, size: u32, block_size: usize, write_policy: WritePolicy) -> CacheConfig {
    let policy = CachePolicy::make(size as usize, block_size);
    CacheConfig { mode, icache: policy, dcache: policy, write_policy, ..Default::default() }
}

fn policy_name(write_policy: WritePolicy) -> &'static str {
    match write_policy {
        WritePolicy::WriteBack => "wb",
        WritePolicy::WriteThrough => "wt",
    }
}

fn run_eval() -> SimulatorResult<()> {
    let program = std::env::args()
        .nth(1)
        .ok_or_else(|| SimulatorError::ConfigError("You should specify exactly one program".into()))?;
    let program = Path::new(&program);
    let name = program
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "program".into());

    fs::create_dir_all("eval")?;
    let csv_path = format!("eval/sweep_{}.csv", name);
    let mut writer =
        csv::Writer::from_path(&csv_path).map_err(|e| io_error(&csv_path, e))?;
    writer
        .write_record([
            "Mode",
            "Write policy",
            "Block size",
            "Cache size",
            "Cycles",
            "Instructions",
            "CPI",
            "I-cache miss rate",
            "D-cache miss rate",
        ])
        .map_err(|e| io_error("Failed to write header to CSV", e))?;

    let mut write_row = |mode: &str, policy: &str, block: usize, size: u32, stats: &RunStats| {
        let miss_rate = |history: Option<mips_sim::memory::cache::CacheHistory>| {
            history.map_or("-".to_string(), |h| format!("{:.3}", h.get_miss_rate()))
        };
        writer
            .write_record([
                mode,
                policy,
                &block.to_string(),
                &size.to_string(),
                &stats.cycles.to_string(),
                &stats.instructions.to_string(),
                &format!("{:.3}", stats.cpi),
                &miss_rate(stats.icache),
                &miss_rate(stats.dcache),
            ])
            .map_err(|e| io_error("Failed to write record to CSV", e))
    };

    let baseline = run(
        program,
        CPUPolicy::default(),
        CacheConfig { mode: CacheMode::Disabled, ..Default::default() },
        Default::default(),
    )?;
    write_row("off", "-", 0, 0, &baseline)?;

    let mut all_series = Vec::new();
    let mut y_max = baseline.cycles;
    for mode in MODES {
        for block_size in BLOCK_SIZES {
            for write_policy in WRITE_POLICIES {
                let label = format!(
                    "{:?}, {}-word blocks, {}",
                    mode,
                    block_size,
                    policy_name(write_policy)
                );
                eprintln!("Running {}", label);

                let mut points = Vec::new();
                for size in CACHE_SIZES {
                    let cache_config = config(mode, size, block_size, write_policy);
                    match run(program, CPUPolicy::default(), cache_config, Default::default()) {
                        Ok(stats) => {
                            write_row(
                                &format!("{:?}", mode),
                                policy_name(write_policy),
                                block_size,
                                size,
                                &stats,
                            )?;
                            y_max = y_max.max(stats.cycles);
                            points.push((size, stats.cycles));
                        }
                        Err(e) => warn!("{} at {} words failed: {}", label, size, e),
                    }
                }
                all_series.push(Series { label, points });
            }
        }
    }
    writer.flush()?;

    plot(&name, &all_series, baseline.cycles, y_max)
        .map_err(|e| io_error("Failed to draw plot", e))
}

/// Cycles against cache size, log-scaled on x, with the uncached run as a flat line
fn plot(
    name: &str,
    all_series: &[Series],
    baseline: u64,
    y_max: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let plot_title = format!("Cache sweep (cycles): {}", name);
    let output_path = format!("eval/sweep_{}.svg", name);
    let x_range = CACHE_SIZES[0]..CACHE_SIZES[CACHE_SIZES.len() - 1];

    let root = SVGBackend::new(output_path.as_str(), (1000, 700)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut ctx = ChartBuilder::on(&root)
        .caption(plot_title.as_str(), ("sans-serif", 32).into_font())
        .margin(5)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range.clone().log_scale(), 0..y_max + y_max / 10)?;
    ctx.configure_mesh()
        .x_desc("Cache size (words)")
        .y_desc("Cycles")
        .draw()?;

    ctx.draw_series(LineSeries::new(
        [(x_range.start, baseline), (x_range.end, baseline)],
        BLACK.stroke_width(2),
    ))?
    .label("No caches")
    .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK));

    for (i, series) in all_series.iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        ctx.draw_series(LineSeries::new(series.points.iter().copied(), color))?
            .label(series.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    ctx.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;

    Ok(())
}
