use anyhow::Context;
use anyhow::bail;
use clap::Parser;
use clap::Subcommand;
use famevol::family::errormodel::ErrorModel;
use famevol::family::estimate::ErrorEstimate;
use famevol::family::estimate::PairCounts;
use famevol::family::store::FamilyStore;
use famevol::kernel::cache::MatrixCache;
use famevol::kernel::rates::DeathRate;
use famevol::likelihood::prior::RootPrior;
use famevol::likelihood::range::SizeRange;
use famevol::phylo::newick;
use famevol::phylo::tree::Phylogeny;
use famevol::report::Report;
use famevol::search::lambdas::Layout;
use famevol::search::objective::Objective;
use famevol::search::simplex::Restarts;
use famevol::search::simplex::Simplex;
use famevol::sim::forward::Simulator;
use famevol::sim::lrt;
use std::path::PathBuf;

/// gene family size evolution under a birth death model
#[derive(Parser)]
#[command(name = "famevol", version, about)]
struct Cli {
    /// newick tree with branch lengths and optional [group] tags
    #[arg(short, long)]
    tree: PathBuf,
    /// tab separated family counts
    #[arg(short, long)]
    families: Option<PathBuf>,
    /// attach an error model, `<species>=<file>` or `all=<file>`
    #[arg(long = "error-model", value_name = "BINDING")]
    errors: Vec<String>,
    /// poisson root prior rate; omitted means empirical prior
    #[arg(long)]
    poisson: Option<f64>,
    /// seed for restarts and simulation
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// maximum likelihood estimation of birth (and death) rates
    Estimate {
        /// estimate death rates separately from birth rates
        #[arg(long)]
        mu: bool,
        /// latent rate clusters per branch group
        #[arg(short = 'k', long, default_value_t = 1)]
        clusters: usize,
        /// pin cluster 0 to a zero birth rate
        #[arg(long)]
        fix0: bool,
    },
    /// estimate, then write p-values and MAP ancestral sizes
    Report {
        #[arg(long)]
        mu: bool,
        #[arg(short = 'k', long, default_value_t = 1)]
        clusters: usize,
        #[arg(long)]
        fix0: bool,
        /// monte carlo draws per root size
        #[arg(long, default_value_t = famevol::CONDITIONAL_DRAWS)]
        draws: usize,
        /// write json instead of text
        #[arg(long)]
        json: bool,
        /// output path, stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// forward simulation of families under fixed rates
    Simulate {
        #[arg(short)]
        n: usize,
        #[arg(long)]
        lambda: f64,
        /// death rate; omitted means same as lambda
        #[arg(long)]
        mu: Option<f64>,
        /// largest family size to carry
        #[arg(long, default_value_t = 20)]
        max: usize,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// likelihood ratio test of per-group rates against one global rate
    Lhtest {
        #[arg(long)]
        mu: bool,
    },
    /// estimate an error model from replicate measurements
    Errormodel {
        /// second replicate of the family counts
        #[arg(long)]
        replicate: PathBuf,
        /// widest misclassification offset to fit
        #[arg(long, default_value_t = 2)]
        maxdiff: usize,
        /// fit an asymmetric window
        #[arg(long)]
        asymmetric: bool,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    famevol::init();
    famevol::workers();
    let cli = Cli::parse();
    let text = std::fs::read_to_string(&cli.tree)
        .with_context(|| format!("reading {}", cli.tree.display()))?;
    let mut tree = newick::parse_named(&text, &cli.tree.display().to_string())?;
    log::info!(
        "tree: {} leaves, max depth {}, ultrametric: {}",
        tree.leaves().len(),
        tree.leaves()
            .into_iter()
            .map(|l| tree.depth(l))
            .fold(0.0, f64::max),
        tree.is_ultrametric()
    );
    match cli.command {
        Command::Estimate { mu, clusters, fix0 } => {
            let (store, range, cache, prior) = prepare(&cli, &mut tree)?;
            let layout = Layout::from_tree(&tree, clusters, mu, fix0);
            let mut objective = Objective::new(&mut tree, &store, &cache, &prior, range, layout);
            let fit = objective.fit(&Simplex::default(), &restarts(&cli))?;
            print_rates(&fit.rates, fit.minimum.score);
        }
        Command::Report {
            mu,
            clusters,
            fix0,
            draws,
            json,
            ref out,
        } => {
            let (store, range, cache, prior) = prepare(&cli, &mut tree)?;
            let layout = Layout::from_tree(&tree, clusters, mu, fix0);
            let fit = {
                let mut objective =
                    Objective::new(&mut tree, &store, &cache, &prior, range, layout);
                objective.fit(&Simplex::default(), &restarts(&cli))?
            };
            let report = Report::assemble(
                &mut tree,
                &store,
                &fit.rates,
                range,
                &prior,
                &cache,
                fit.minimum.score,
                draws,
                cli.seed,
            )?;
            match out {
                Some(path) => report.save(&path, json)?,
                None => print!("{}", if json { report.json()? } else { report.text() }),
            }
        }
        Command::Simulate {
            n,
            lambda,
            mu,
            max,
            out,
        } => {
            let death = mu.map(DeathRate::Value).unwrap_or(DeathRate::SameAsBirth);
            for index in tree.postorder() {
                let node = tree.node_mut(index);
                node.birth = lambda;
                node.death = death;
            }
            let cache = MatrixCache::new(max);
            cache.apply(&mut tree);
            let prior = match cli.poisson {
                Some(rate) => RootPrior::poisson(rate, max)?,
                None => bail!("simulation needs --poisson for the root prior"),
            };
            let simulator = Simulator::new(&tree);
            let store = simulator.generate(&prior, n, cli.seed)?;
            match out {
                Some(path) => {
                    let file = std::fs::File::create(&path)?;
                    store.write(std::io::BufWriter::new(file))?;
                }
                None => store.write(std::io::stdout().lock())?,
            }
        }
        Command::Lhtest { mu } => {
            let (store, range, cache, prior) = prepare(&cli, &mut tree)?;
            let alternative = Layout::from_tree(&tree, 1, mu, false);
            let null = Layout::single(mu);
            if alternative.dimensions() == null.dimensions() {
                bail!("the tree has a single branch group, nothing to test");
            }
            let null_fit = {
                let mut objective =
                    Objective::new(&mut tree, &store, &cache, &prior, range, null);
                objective.fit(&Simplex::default(), &restarts(&cli))?
            };
            let alternative_fit = {
                let mut objective =
                    Objective::new(&mut tree, &store, &cache, &prior, range, alternative);
                objective.fit(&Simplex::default(), &restarts(&cli))?
            };
            let ratio = lrt::ratio(
                null_fit.minimum.score,
                alternative_fit.minimum.score,
                alternative.dimensions() - null.dimensions(),
            )?;
            println!(
                "2dlnL\t{}\ndf\t{}\npvalue\t{}",
                ratio.statistic, ratio.degrees, ratio.pvalue
            );
        }
        Command::Errormodel {
            ref replicate,
            maxdiff,
            asymmetric,
            ref out,
        } => {
            let first = match &cli.families {
                Some(path) => FamilyStore::load(path)?,
                None => bail!("error estimation needs --families"),
            };
            let second = FamilyStore::load(&replicate)?;
            let pairs = PairCounts::from_replicates(&first, &second)?;
            let prior =
                RootPrior::empirical(first.sizes().chain(second.sizes()), pairs.max());
            let estimate = ErrorEstimate::new(&pairs, prior, maxdiff, !asymmetric);
            let model = estimate.estimate(&Simplex::default(), &restarts(&cli))?;
            match out {
                Some(path) => model.save(&path)?,
                None => model.write(std::io::stdout().lock())?,
            }
        }
    }
    Ok(())
}

fn restarts(cli: &Cli) -> Restarts {
    Restarts {
        runs: famevol::SIMPLEX_MAX_RUNS,
        seed: cli.seed,
    }
}

/// shared setup for the estimation commands: load and index the
/// families, attach error models, size the range, build the cache and
/// the root prior
fn prepare(
    cli: &Cli,
    tree: &mut Phylogeny,
) -> anyhow::Result<(FamilyStore, SizeRange, MatrixCache, RootPrior)> {
    let mut store = match &cli.families {
        Some(path) => FamilyStore::load(path)?,
        None => bail!("this command needs --families"),
    };
    store.index(tree)?;
    for attachment in &cli.errors {
        let (species, path) = attachment
            .split_once('=')
            .with_context(|| format!("bad --error-model '{}', want species=file", attachment))?;
        let model = ErrorModel::load(std::path::Path::new(path))?;
        let model = store.adopt(model);
        let target = if species == "all" { None } else { Some(species) };
        if !tree.attach_error(target, &model) {
            bail!("no leaf named '{}' for error model '{}'", species, path);
        }
        log::info!("error model '{}' attached to {}", path, species);
    }
    let range = SizeRange::observed(store.max_count());
    let cache = MatrixCache::new(range.max);
    let prior = match cli.poisson {
        Some(rate) => RootPrior::poisson(rate, range.max)?,
        None => RootPrior::empirical(store.sizes(), range.max),
    };
    log::info!(
        "{} families over {} species, size range up to {}",
        store.len(),
        store.species().len(),
        range.max
    );
    Ok((store, range, cache, prior))
}

fn print_rates(rates: &famevol::search::lambdas::Rates, score: famevol::Score) {
    for (group, clusters) in rates.birth.iter().enumerate() {
        let clusters: Vec<String> = clusters.iter().map(|l| l.to_string()).collect();
        println!("lambda[{}]\t{}", group, clusters.join("\t"));
    }
    if let Some(death) = &rates.death {
        for (group, mu) in death.iter().enumerate() {
            println!("mu[{}]\t{}", group, mu);
        }
    }
    if rates.weights.len() > 1 {
        let weights: Vec<String> = rates.weights.iter().map(|w| w.to_string()).collect();
        println!("weights\t{}", weights.join("\t"));
    }
    println!("score\t{}", score);
}
