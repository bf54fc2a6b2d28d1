//! The serving loop of the parameter server role.
//!
//! Each worker connection gets its own task over the shared store. The
//! protocol per connection is strict: one `Join`, then `Gradient` pushes, each
//! answered with a fresh `Weights` snapshot, until `Disconnect`. A periodic
//! checkpoint runs alongside the connections, and a final one is written when
//! the last worker leaves.

use std::{borrow::Cow, time::Duration};

use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg, Payload},
};
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    task::JoinSet,
    time::{self, MissedTickBehavior},
};

use crate::{Checkpoint, ParameterStore, PsErr, Result, optimization::Optimizer};

/// How often the authoritative parameters are persisted while serving.
pub const SAVE_EVERY: Duration = Duration::from_secs(30);

/// The parameter serving front of the store.
pub struct Service<O> {
    store: ParameterStore<O>,
    checkpoint: Checkpoint,
    workers: usize,
}

impl<O: Optimizer + Send + Sync + 'static> Service<O> {
    /// Creates a new `Service`.
    ///
    /// # Arguments
    /// * `store` - The shared parameter store.
    /// * `checkpoint` - The checkpoint handle parameters are persisted to.
    /// * `workers` - The amount of worker connections to serve.
    ///
    /// # Returns
    /// A new `Service` instance.
    pub fn new(store: ParameterStore<O>, checkpoint: Checkpoint, workers: usize) -> Self {
        Self {
            store,
            checkpoint,
            workers,
        }
    }

    /// Serves every worker to completion.
    ///
    /// Accepts `workers` connections on `listener`, runs each on its own task,
    /// checkpoints on a fixed cadence in between, and returns once every
    /// joined worker has disconnected and the final checkpoint is written.
    ///
    /// # Arguments
    /// * `listener` - The listener bound to this task's cluster endpoint.
    ///
    /// # Returns
    /// Returns `Ok(())` on graceful completion.
    ///
    /// # Errors
    /// Returns `PsErr` on I/O failures, protocol violations or checkpoint
    /// write failures.
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        let mut join_set: JoinSet<Result<()>> = JoinSet::new();
        let mut accepted = 0;

        let mut ticker = time::interval_at(time::Instant::now() + SAVE_EVERY, SAVE_EVERY);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while accepted < self.workers || !join_set.is_empty() {
            tokio::select! {
                conn = listener.accept(), if accepted < self.workers => {
                    let (stream, addr) = conn?;
                    info!("worker connected from {addr}");

                    let (rx, tx) = stream.into_split();
                    let (rx, tx) = comms::channel(rx, tx);

                    let store = self.store.clone();
                    join_set.spawn(serve_connection(store, rx, tx));
                    accepted += 1;
                }

                Some(joined) = join_set.join_next(), if !join_set.is_empty() => {
                    match joined {
                        Ok(Ok(())) => debug!("worker connection closed"),
                        Ok(Err(e)) => warn!("worker connection failed: {e}"),
                        Err(e) => warn!("worker task panicked: {e}"),
                    }
                }

                _ = ticker.tick() => {
                    self.save_checkpoint()?;
                }
            }
        }

        self.save_checkpoint()?;
        info!("all workers disconnected, final checkpoint written");

        Ok(())
    }

    fn save_checkpoint(&self) -> Result<()> {
        let mut params = vec![0.0; self.store.len()];
        let step = self.store.snapshot(&mut params)?;

        self.checkpoint.save(&params, step)?;
        info!(step = step; "checkpoint saved");

        Ok(())
    }
}

/// Runs the per-worker protocol loop over one connection.
///
/// # Arguments
/// * `store` - The shared parameter store.
/// * `rx` - Receiving end of the worker channel.
/// * `tx` - Sending end of the worker channel.
///
/// # Errors
/// Returns `PsErr` on I/O failures or protocol violations; protocol
/// violations are also reported to the worker as an `Err` message before the
/// connection is dropped.
pub async fn serve_connection<O, R, W>(
    store: ParameterStore<O>,
    mut rx: OnoReceiver<R>,
    mut tx: OnoSender<W>,
) -> Result<()>
where
    O: Optimizer + Send + Sync,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut rx_buf: Vec<f32> = Vec::new();
    let mut params = vec![0.0; store.len()];

    let worker_id = match rx.recv_into(&mut rx_buf).await? {
        Msg::Control(Command::Join { worker_id }) => worker_id,
        other => {
            let got = msg_kind(&other);
            tx.send(&Msg::Err(Cow::Borrowed("expected a join command")))
                .await?;
            return Err(PsErr::UnexpectedMessage { got });
        }
    };

    info!(worker_id = worker_id; "worker joined");

    let step = store.snapshot(&mut params)?;
    tx.send(&Msg::Data(Payload::Weights {
        step,
        params: &mut params,
    }))
    .await?;

    loop {
        match rx.recv_into(&mut rx_buf).await? {
            Msg::Data(Payload::Gradient(grad)) => {
                if grad.len() != store.len() {
                    let detail = format!(
                        "gradient length mismatch: got {}, expected {}",
                        grad.len(),
                        store.len()
                    );
                    tx.send(&Msg::Err(Cow::Owned(detail))).await?;

                    return Err(PsErr::GradientLengthMismatch {
                        got: grad.len(),
                        expected: store.len(),
                    });
                }

                let step = store.apply(grad)?;
                debug!(worker_id = worker_id, step = step; "gradient applied");

                let step = store.snapshot(&mut params)?;
                tx.send(&Msg::Data(Payload::Weights {
                    step,
                    params: &mut params,
                }))
                .await?;
            }

            Msg::Control(Command::Disconnect) => {
                info!(worker_id = worker_id; "worker disconnected");
                tx.send(&Msg::Control(Command::Disconnect)).await?;
                return Ok(());
            }

            other => {
                let got = msg_kind(&other);
                warn!(worker_id = worker_id; "unexpected message: got {got}");

                tx.send(&Msg::Err(Cow::Borrowed("expected a gradient or a disconnect")))
                    .await?;
                return Err(PsErr::UnexpectedMessage { got });
            }
        }
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

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use tokio::io as tokio_io;

    use super::*;
    use crate::optimization::GradientDescent;

    fn test_store(params: usize) -> ParameterStore<GradientDescent> {
        ParameterStore::new(
            NonZeroUsize::new(4).unwrap(),
            vec![1.0; params],
            0,
            |_| GradientDescent::new(1.0),
        )
    }

    #[tokio::test]
    async fn serves_join_gradient_disconnect() {
        const BUF_SIZE: usize = 4096;
        const PARAMS: usize = 6;

        let (ps_stream, wk_stream) = tokio_io::duplex(BUF_SIZE);

        let (ps_rx, ps_tx) = tokio_io::split(ps_stream);
        let (ps_rx, ps_tx) = comms::channel(ps_rx, ps_tx);

        let (wk_rx, wk_tx) = tokio_io::split(wk_stream);
        let (mut wk_rx, mut wk_tx) = comms::channel(wk_rx, wk_tx);

        let store = test_store(PARAMS);
        let server = tokio::spawn(serve_connection(store, ps_rx, ps_tx));

        let mut buf = vec![0f32; 64];

        wk_tx
            .send(&Msg::Control(Command::Join { worker_id: 0 }))
            .await
            .unwrap();

        match wk_rx.recv_into(&mut buf).await.unwrap() {
            Msg::Data(Payload::Weights { step, params }) => {
                assert_eq!(step, 0);
                assert_eq!(params, [1.0; PARAMS]);
            }
            other => panic!("unexpected msg: {other:?}"),
        }

        let grad = [0.5; PARAMS];
        wk_tx.send(&Msg::Data(Payload::Gradient(&grad))).await.unwrap();

        match wk_rx.recv_into(&mut buf).await.unwrap() {
            Msg::Data(Payload::Weights { step, params }) => {
                assert_eq!(step, 1);
                // lr 1.0: 1.0 - 0.5
                assert_eq!(params, [0.5; PARAMS]);
            }
            other => panic!("unexpected msg: {other:?}"),
        }

        wk_tx.send(&Msg::Control(Command::Disconnect)).await.unwrap();
        assert!(matches!(
            wk_rx.recv_into(&mut buf).await.unwrap(),
            Msg::Control(Command::Disconnect)
        ));

        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bad_gradient_length_is_reported_and_fatal() {
        const BUF_SIZE: usize = 4096;

        let (ps_stream, wk_stream) = tokio_io::duplex(BUF_SIZE);

        let (ps_rx, ps_tx) = tokio_io::split(ps_stream);
        let (ps_rx, ps_tx) = comms::channel(ps_rx, ps_tx);

        let (wk_rx, wk_tx) = tokio_io::split(wk_stream);
        let (mut wk_rx, mut wk_tx) = comms::channel(wk_rx, wk_tx);

        let store = test_store(6);
        let server = tokio::spawn(serve_connection(store, ps_rx, ps_tx));

        let mut buf = vec![0f32; 64];

        wk_tx
            .send(&Msg::Control(Command::Join { worker_id: 1 }))
            .await
            .unwrap();
        wk_rx.recv_into::<Msg, _>(&mut buf).await.unwrap();

        wk_tx
            .send(&Msg::Data(Payload::Gradient(&[0.0; 3])))
            .await
            .unwrap();

        match wk_rx.recv_into(&mut buf).await.unwrap() {
            Msg::Err(detail) => assert!(detail.contains("mismatch")),
            other => panic!("unexpected msg: {other:?}"),
        }

        assert!(matches!(
            server.await.unwrap(),
            Err(PsErr::GradientLengthMismatch { got: 3, expected: 6 })
        ));
    }

    #[tokio::test]
    async fn join_is_required_first() {
        const BUF_SIZE: usize = 4096;

        let (ps_stream, wk_stream) = tokio_io::duplex(BUF_SIZE);

        let (ps_rx, ps_tx) = tokio_io::split(ps_stream);
        let (ps_rx, ps_tx) = comms::channel(ps_rx, ps_tx);

        let (wk_rx, wk_tx) = tokio_io::split(wk_stream);
        let (mut wk_rx, mut wk_tx) = comms::channel(wk_rx, wk_tx);

        let store = test_store(6);
        let server = tokio::spawn(serve_connection(store, ps_rx, ps_tx));

        let mut buf = vec![0f32; 64];

        wk_tx
            .send(&Msg::Data(Payload::Gradient(&[0.0; 6])))
            .await
            .unwrap();

        assert!(matches!(
            wk_rx.recv_into(&mut buf).await.unwrap(),
            Msg::Err(_)
        ));

        assert!(matches!(
            server.await.unwrap(),
            Err(PsErr::UnexpectedMessage { got: "data/gradient" })
        ));
    }
}
