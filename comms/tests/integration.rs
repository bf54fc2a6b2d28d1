use std::io;

use tokio::io as tokio_io;

use comms::msg::{Command, Msg, Payload};

#[tokio::test]
async fn send_recv_weights() -> io::Result<()> {
    const BUF_SIZE: usize = 256;

    let (one, two) = tokio_io::duplex(BUF_SIZE);

    let (rx, tx) = tokio_io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    let mut params = [0.25, -0.5, 1.5];
    tx.send(&Msg::Data(Payload::Weights {
        step: 42,
        params: &mut params,
    }))
    .await?;

    let (rx, tx) = tokio_io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf = vec![0f32; 16];
    match rx.recv_into(&mut buf).await? {
        Msg::Data(Payload::Weights { step, params }) => {
            assert_eq!(step, 42);
            assert_eq!(params, [0.25, -0.5, 1.5]);
        }
        other => panic!("unexpected msg: {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn send_recv_sequence() -> io::Result<()> {
    const BUF_SIZE: usize = 1024;

    let (wk_stream, sv_stream) = tokio_io::duplex(BUF_SIZE);

    let (wk_rx, wk_tx) = tokio_io::split(wk_stream);
    let (mut wk_rx, mut wk_tx) = comms::channel(wk_rx, wk_tx);

    let (sv_rx, sv_tx) = tokio_io::split(sv_stream);
    let (mut sv_rx, mut sv_tx) = comms::channel(sv_rx, sv_tx);

    let mut sv_buf = vec![0f32; 64];
    let mut wk_buf = vec![0f32; 64];

    wk_tx
        .send(&Msg::Control(Command::Join { worker_id: 1 }))
        .await?;

    match sv_rx.recv_into(&mut sv_buf).await? {
        Msg::Control(Command::Join { worker_id }) => assert_eq!(worker_id, 1),
        other => panic!("unexpected msg: {other:?}"),
    }

    let grad = [1.0, 2.0];
    wk_tx.send(&Msg::Data(Payload::Gradient(&grad))).await?;

    match sv_rx.recv_into(&mut sv_buf).await? {
        Msg::Data(Payload::Gradient(got)) => assert_eq!(got, grad),
        other => panic!("unexpected msg: {other:?}"),
    }

    let mut params = [3.0, 4.0];
    sv_tx
        .send(&Msg::Data(Payload::Weights {
            step: 1,
            params: &mut params,
        }))
        .await?;

    match wk_rx.recv_into(&mut wk_buf).await? {
        Msg::Data(Payload::Weights { step, params }) => {
            assert_eq!(step, 1);
            assert_eq!(params, [3.0, 4.0]);
        }
        other => panic!("unexpected msg: {other:?}"),
    }

    wk_tx.send(&Msg::Control(Command::Disconnect)).await?;

    assert!(matches!(
        sv_rx.recv_into(&mut sv_buf).await?,
        Msg::Control(Command::Disconnect)
    ));

    Ok(())
}
