use particle_sim::config::{Driver, SimulationConfig};
use particle_sim::snapshot::Snapshot;
use particle_sim::statistics::{max_density_contrast, SimulationStatistics};
use particle_sim::Scalar;

use eyre::WrapErr;
use structopt::StructOpt;
use tracing::{debug, info, Level};

#[derive(StructOpt, Debug)]
#[structopt(name = "particle_sim")]
struct Opt {
    /// JSON run configuration. The built-in FLIP demo runs without one.
    #[structopt(short, long)]
    input_file: Option<std::path::PathBuf>,
    /// Where snapshots go. Overrides the configuration.
    #[structopt(short, long)]
    output_dir: Option<std::path::PathBuf>,
    /// Number of steps. Overrides the configuration.
    #[structopt(short, long)]
    steps: Option<usize>,
    /// More logging: -v for debug, -vv for trace.
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

fn read_config(opt: &Opt) -> eyre::Result<SimulationConfig> {
    let mut config = match &opt.input_file {
        Some(input_file) => std::fs::read(input_file)
            .wrap_err_with(|| format!("Failed to read JSON settings file: {:?}", input_file))
            .and_then(|json| {
                SimulationConfig::from_json(&json).wrap_err("Serde failed to deserialize JSON.")
            })?,
        None => SimulationConfig::default(),
    };

    if let Some(dir) = &opt.output_dir {
        config.output_dir = Some(dir.clone());
    }
    if let Some(steps) = opt.steps {
        config.steps = steps;
    }
    Ok(config)
}

/// Per-step diagnostics. The density contrast needs a full mesh assignment, so it is only
/// worked out for lines that will actually be emitted.
#[derive(Debug)]
struct Progress {
    count: usize,
    t: Scalar,
    redshift: Option<(Scalar, Scalar)>,
    contrast: Option<Scalar>,
    rms: Scalar,
}

fn progress(driver: &Driver, save: bool) -> Option<Progress> {
    if !save && !tracing::enabled!(Level::DEBUG) {
        return None;
    }

    let base = driver.simulation().base();
    Some(Progress {
        count: base.count,
        t: base.t,
        redshift: driver.cosmology().map(|c| (c.z(), c.a)),
        contrast: driver
            .solver()
            .map(|solver| max_density_contrast(solver, &base.pos)),
        rms: base.rms_velocity(),
    })
}

fn log_progress(driver: &Driver, save: bool) {
    let p = match progress(driver, save) {
        Some(p) => p,
        None => return,
    };
    let contrast = p.contrast;

    match (p.redshift, save) {
        (Some((z, a)), true) => info!(count = p.count, z, a, ?contrast, rms = p.rms, "step"),
        (Some((z, a)), false) => debug!(count = p.count, z, a, ?contrast, rms = p.rms, "step"),
        (None, true) => info!(count = p.count, t = p.t, ?contrast, rms = p.rms, "step"),
        (None, false) => debug!(count = p.count, t = p.t, ?contrast, rms = p.rms, "step"),
    }
}

fn main() -> eyre::Result<()> {
    let opt = Opt::from_args();

    let level = match opt.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = read_config(&opt)?;

    if let Some(threads) = config.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .wrap_err("Failed to start the worker pool.")?;
    }

    let mut driver = config
        .build()
        .wrap_err_with(|| format!("Failed to set up the {} simulation", config.scenario))?;
    info!(
        scenario = %config.scenario,
        particles = driver.simulation().base().num_particles(),
        steps = config.steps,
        "starting simulation"
    );

    let spin = config.view_spin != particle_sim::Vec3::zeros();
    for _ in 0..config.steps {
        if config.is_finished(&driver) {
            info!(
                stop_redshift = config.stop_redshift,
                count = driver.simulation().base().count,
                "reached the final redshift"
            );
            break;
        }

        if spin && matches!(driver, Driver::Flip(_)) {
            let base = driver.base_mut();
            base.gravity = config.gravity_at(base.t);
        }

        let count = driver.simulation().base().count;
        driver
            .simulation_mut()
            .step()
            .wrap_err_with(|| format!("Step {} failed", count))?;

        let count = driver.simulation().base().count;
        let save = config.save_interval > 0 && count % config.save_interval == 0;
        log_progress(&driver, save);

        if let (true, Some(dir)) = (save, &config.output_dir) {
            Snapshot::capture(driver.simulation().base())
                .save(dir)
                .wrap_err_with(|| format!("Failed to save snapshot {} to {:?}", count, dir))?;
        }
    }

    Ok(())
}
