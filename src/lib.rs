pub mod error;
pub mod family;
pub mod kernel;
pub mod likelihood;
pub mod phylo;
pub mod posterior;
pub mod report;
pub mod search;
pub mod sim;

pub use error::Error;

/// dimensional analysis types
pub type Count = usize;
pub type Rate = f64;
pub type Probability = f64;
pub type Likelihood = f64;
pub type Score = f64;

// numeric tolerances
pub const ROW_SUM_TOLERANCE: f64 = 1e-9;
pub const PRIOR_SUM_TOLERANCE: f64 = 1e-9;
pub const COLUMN_SUM_TOLERANCE: f64 = 1e-6;
pub const ULTRAMETRIC_TOLERANCE: f64 = 1e-9;

// birth death kernel parameters
pub const BRANCH_IDENTITY_CLAMP: f64 = 1e-9;
pub const RATE_EQUALITY_EPSILON: f64 = 1e-12;

// monte carlo parameters
pub const CONDITIONAL_DRAWS: usize = 1000;

// simplex search parameters
pub const SIMPLEX_REFLECT: f64 = 1.0;
pub const SIMPLEX_EXPAND: f64 = 2.0;
pub const SIMPLEX_CONTRACT: f64 = 0.5;
pub const SIMPLEX_SHRINK: f64 = 0.5;
pub const SIMPLEX_TOL_X: f64 = 1e-6;
pub const SIMPLEX_TOL_F: f64 = 1e-8;
pub const SIMPLEX_MAX_ITERATIONS: usize = 10_000;
pub const SIMPLEX_MAX_RUNS: usize = 100;

/// trait for random generation, mainly (strictly?) for testing
pub trait Arbitrary {
    fn random() -> Self;
}

/// progress bar
pub fn progress(n: usize) -> indicatif::ProgressBar {
    let tick = std::time::Duration::from_secs(60);
    let style = "{spinner:.cyan} {elapsed} ~ {percent:>3}% {wide_bar:.cyan}";
    let style = indicatif::ProgressStyle::with_template(style).unwrap();
    let progress = indicatif::ProgressBar::new(n as u64);
    progress.set_style(style);
    progress.enable_steady_tick(tick);
    progress
}

/// initialize logging
pub fn init() {
    std::fs::create_dir_all("logs").expect("create logs directory");
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves slow")
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{}.log", time)).expect("create log file"),
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config.clone(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).expect("initialize logger");
}

/// size the worker pool once at startup. family evaluations fan out
/// over this pool and are reduced in family index order, so results
/// do not depend on scheduling.
pub fn workers() {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus::get())
        .build_global()
        .ok();
}
