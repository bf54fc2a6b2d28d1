use std::{
    io,
    net::SocketAddr,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use clap::Parser;
use log::info;
use rand::{SeedableRng, rngs::StdRng};
use tokio::{net::TcpListener, signal};

use comms::cluster::{ClusterSpec, Role};
use machine_learning::{
    arch::loss::SoftmaxCrossEntropy,
    init::ParamInit,
    mnist,
    spec::{ActFnSpec, LayerSpec, NetSpec},
};
use parameter_server::{Checkpoint, ParameterStore, Service, optimization::GradientDescent};
use worker::{SummaryWriter, Trainer, Worker, WorkerConfig};

/// The fixed cluster layout: one parameter server task, two worker tasks.
const NUM_WORKERS: usize = 2;
const NUM_PS: usize = 1;

const HIDDEN_UNITS: usize = 100;
const SHARD_SIZE: usize = 4096;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Either 'ps' or 'worker'
    #[arg(long, default_value = "ps")]
    job_name: Role,

    /// Index of this task within its job
    #[arg(long, default_value = "0")]
    task_index: usize,

    /// Samples per gradient computation
    #[arg(long, default_value = "100")]
    batch_size: NonZeroUsize,

    /// Step size of the shared gradient descent updates
    #[arg(long, default_value = "0.0005")]
    learning_rate: f32,

    /// Passes over the training set per worker
    #[arg(long, default_value = "20")]
    training_epochs: NonZeroUsize,

    /// Checkpoint and summary directory
    #[arg(long, default_value = "./tmp/mnist/1")]
    logdir: PathBuf,

    /// Directory holding the four uncompressed MNIST IDX files
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Fixed seed for initialization and shuffling
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let cluster = ClusterSpec::new(NUM_WORKERS, NUM_PS);
    let Some(endpoint) = cluster.endpoint(args.job_name, args.task_index) else {
        return Err(io::Error::other(format!(
            "task index {} is out of range for job '{}'",
            args.task_index, args.job_name
        )));
    };

    info!(
        "starting {}:{} assigned to {endpoint}",
        args.job_name, args.task_index
    );

    match args.job_name {
        Role::Ps => run_ps(args, endpoint).await,
        Role::Worker => run_worker(args, &cluster).await,
    }
}

/// The network both roles agree on: 784 inputs, a sigmoid hidden layer and
/// ten linear logits.
fn net_spec() -> io::Result<NetSpec> {
    let nz = |v| NonZeroUsize::new(v).unwrap();

    let spec = NetSpec::new(vec![
        LayerSpec {
            input: nz(mnist::INPUT_SIZE),
            output: nz(HIDDEN_UNITS),
            act_fn: Some(ActFnSpec::Sigmoid),
        },
        LayerSpec {
            input: nz(HIDDEN_UNITS),
            output: nz(mnist::NUM_CLASSES),
            act_fn: None,
        },
    ])?;

    Ok(spec)
}

async fn run_ps(args: Args, endpoint: SocketAddr) -> io::Result<()> {
    let spec = net_spec()?;
    let checkpoint = Checkpoint::new(&args.logdir)?;

    let (values, step) = match checkpoint.load().map_err(io::Error::from)? {
        Some((values, step)) => {
            if values.len() != spec.param_count() {
                return Err(io::Error::other(format!(
                    "checkpoint holds {} parameters, the model takes {}",
                    values.len(),
                    spec.param_count()
                )));
            }

            info!(
                step = step;
                "restored parameters from {}",
                checkpoint.path().display()
            );
            (values, step)
        }
        None => {
            let mut rng = rng_from(args.seed);
            let init = ParamInit::Normal {
                mean: 0.0,
                std_dev: 1.0,
            };

            let values = init
                .generate(spec.param_count(), &mut rng)
                .map_err(io::Error::from)?;

            info!("initialized {} fresh parameters", values.len());
            (values, 0)
        }
    };

    let lr = args.learning_rate;
    let store = ParameterStore::new(
        NonZeroUsize::new(SHARD_SIZE).unwrap(),
        values,
        step,
        |_| GradientDescent::new(lr),
    );
    let service = Service::new(store, checkpoint, NUM_WORKERS);

    let listener = TcpListener::bind(endpoint).await?;
    info!("listening at {endpoint}");

    tokio::select! {
        ret = service.run(listener) => {
            ret.map_err(io::Error::from)?;
            info!("parameter server finished");
        }
        _ = signal::ctrl_c() => {
            info!("received SIGTERM");
        }
    }

    Ok(())
}

async fn run_worker(args: Args, cluster: &ClusterSpec) -> io::Result<()> {
    let spec = net_spec()?;

    let data = mnist::load(&args.data_dir).map_err(io::Error::from)?;
    info!(
        "loaded {} training and {} test samples",
        data.train.len(),
        data.test.len()
    );

    let trainer = Trainer::new(
        spec.build(),
        SoftmaxCrossEntropy::new(),
        data.train,
        data.test,
        args.batch_size,
    );

    let mut config = WorkerConfig::new(args.task_index, args.batch_size, args.training_epochs);
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }

    let summary = SummaryWriter::create(
        &summary_dir(&args.logdir, args.task_index),
        worker::metrics::FLUSH_EVERY,
    )?;

    let server_addr = cluster.ps()[0];
    let stream = worker::connect(server_addr).await?;
    let (rx, tx) = stream.into_split();
    let (rx, tx) = comms::channel(rx, tx);
    info!("connected to parameter server at {server_addr}");

    let node = Worker::new(config, trainer, summary);

    tokio::select! {
        ret = node.run(rx, tx) => {
            ret.map_err(io::Error::from)?;
            info!("wrapping up, disconnecting...");
        }
        _ = signal::ctrl_c() => {
            info!("received SIGTERM");
        }
    }

    Ok(())
}

/// Each worker writes summaries next to the checkpoint directory, suffixed
/// with its task index.
fn summary_dir(logdir: &Path, task_index: usize) -> PathBuf {
    PathBuf::from(format!("{}_{task_index}", logdir.display()))
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}
