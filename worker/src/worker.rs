use std::{
    io,
    net::SocketAddr,
    time::{Duration, Instant},
};

use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg, Payload},
};
use log::{debug, info};
use machine_learning::arch::loss::LossFn;
use rand::{SeedableRng, rngs::StdRng};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    time,
};

use crate::{Result, SummaryRecord, SummaryWriter, Trainer, WorkerConfig, WorkerErr};

/// How many times the parameter server is dialed before giving up.
pub const DIAL_ATTEMPTS: usize = 20;

/// How long to wait between dial attempts.
pub const DIAL_DELAY: Duration = Duration::from_millis(500);

/// Dials the parameter server, retrying while it comes up.
///
/// Worker processes usually start together with the server process, so the
/// first attempts may land before the server's listener is bound.
///
/// # Args
/// * `addr` - The server's cluster endpoint.
///
/// # Returns
/// The connected stream, or the last connect error once the attempts run out.
pub async fn connect(addr: SocketAddr) -> io::Result<TcpStream> {
    let mut attempt = 1;

    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt < DIAL_ATTEMPTS => {
                debug!("parameter server not ready at {addr} (attempt {attempt}): {e}");
                attempt += 1;
                time::sleep(DIAL_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// The replica-holding training runtime.
///
/// Keeps a local copy of the parameters that is overwritten from the server's
/// snapshot around every gradient step, so each batch trains against weights
/// at most one round older than the authoritative copy.
pub struct Worker<L: LossFn> {
    config: WorkerConfig,
    trainer: Trainer<L>,
    summary: SummaryWriter,
}

impl<L: LossFn> Worker<L> {
    /// Creates a new `Worker`.
    ///
    /// # Args
    /// * `config` - The execution bounds.
    /// * `trainer` - The gradient computer.
    /// * `summary` - The sink for training summaries.
    ///
    /// # Returns
    /// A new `Worker` instance.
    pub fn new(config: WorkerConfig, trainer: Trainer<L>, summary: SummaryWriter) -> Self {
        Self {
            config,
            trainer,
            summary,
        }
    }

    /// Runs the training loop against the parameter server channel.
    ///
    /// Joins, receives the initial snapshot, then pushes one gradient per
    /// mini-batch and refreshes the replica from every reply until the epoch
    /// budget is exhausted. Finishes with the held-out accuracy report and a
    /// disconnect handshake.
    ///
    /// # Args
    /// * `rx` - Receiving end of the server channel.
    /// * `tx` - Sending end of the server channel.
    ///
    /// # Returns
    /// Returns `Ok(())` on graceful completion.
    ///
    /// # Errors
    /// Returns `WorkerErr` on I/O failures or protocol violations.
    pub async fn run<R, W>(mut self, mut rx: OnoReceiver<R>, mut tx: OnoSender<W>) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let worker_id = self.config.worker_id();
        let mut rng = match self.config.seed() {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut rx_buf: Vec<f32> = Vec::new();
        let mut replica = vec![0.0; self.trainer.num_params()];

        tx.send(&Msg::Control(Command::Join { worker_id })).await?;
        let mut step = recv_weights(&mut rx, &mut rx_buf, &mut replica, 0).await?;
        info!(worker_id = worker_id, step = step; "joined, replica initialized");

        let begin = Instant::now();
        let mut window = Instant::now();
        let mut since_report = 0;
        let mut last_cost = 0.0;

        let num_batches = self.trainer.num_batches();

        for epoch in 0..self.config.max_epochs() {
            self.trainer.shuffle(&mut rng);

            for batch in 0..num_batches {
                last_cost = self.trainer.train_batch(&replica, batch)?;

                tx.send(&Msg::Data(Payload::Gradient(self.trainer.grad())))
                    .await?;
                step = recv_weights(&mut rx, &mut rx_buf, &mut replica, epoch).await?;
                since_report += 1;

                if since_report == self.config.log_every() || batch + 1 == num_batches {
                    let avg_ms =
                        window.elapsed().as_secs_f64() * 1000.0 / since_report as f64;
                    info!(
                        "step: {step}, epoch: {:2}, batch: {:3} of {num_batches}, cost: {last_cost:.4}, avg time: {avg_ms:.2}ms",
                        epoch + 1,
                        batch + 1,
                    );

                    let accuracy = self.trainer.batch_accuracy(&replica, batch)?;
                    self.summary.record(&SummaryRecord {
                        step,
                        epoch,
                        loss: last_cost,
                        accuracy,
                    })?;

                    since_report = 0;
                    window = Instant::now();
                }
            }
        }

        let test_accuracy = self.trainer.test_accuracy(&replica)?;
        info!("test accuracy: {test_accuracy:.2}");
        info!("total time: {:.2}s", begin.elapsed().as_secs_f64());
        info!("final cost: {last_cost:.4}");
        self.summary.flush()?;

        tx.send(&Msg::Control(Command::Disconnect)).await?;
        while !matches!(
            rx.recv_into::<Msg, _>(&mut rx_buf).await?,
            Msg::Control(Command::Disconnect)
        ) {}

        Ok(())
    }
}

/// Overwrites the replica from the next `Weights` message.
///
/// # Args
/// * `rx` - Receiving end of the server channel.
/// * `buf` - The receive buffer.
/// * `replica` - The local parameter copy to refresh.
/// * `epoch` - The current epoch, for error context.
///
/// # Returns
/// The global step the snapshot corresponds to.
async fn recv_weights<R>(
    rx: &mut OnoReceiver<R>,
    buf: &mut Vec<f32>,
    replica: &mut [f32],
    epoch: usize,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    match rx.recv_into(buf).await? {
        Msg::Data(Payload::Weights { step, params }) => {
            if params.len() != replica.len() {
                return Err(WorkerErr::WeightsLengthMismatch {
                    epoch,
                    got: params.len(),
                    expected: replica.len(),
                });
            }

            replica.copy_from_slice(params);
            Ok(step)
        }
        Msg::Err(detail) => Err(WorkerErr::Server(detail.into_owned())),
        other => Err(WorkerErr::UnexpectedMessage {
            epoch,
            got: msg_kind(&other),
        }),
    }
}

fn msg_kind(msg: &Msg<'_>) -> &'static str {
    match msg {
        Msg::Control(Command::Join { .. }) => "control/join",
        Msg::Control(Command::Disconnect) => "control/disconnect",
        Msg::Err(_) => "err",
        Msg::Data(Payload::Gradient(_)) => "data/gradient",
        Msg::Data(Payload::Weights { .. }) => "data/weights",
    }
}
