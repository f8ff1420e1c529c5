//! Mirror and proxy tests over in-memory and framed connections

mod support;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use execmux::proto::Message;
use execmux::transport::{framed, memory, Connection};
use execmux::{
    console_mirror, mirror, proxy, InboundExit, InboundPump, InboundStrategy, LocalReader,
    LocalWriter, Mirror, OutboundExit, OutboundStrategy,
};
use rand::RngCore;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use support::collect_until_end;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_proxy_three_and_two() -> Result<()> {
    let (a_remote, a) = memory::pair(8);
    let (b, b_remote) = memory::pair(8);
    let done = proxy(a.clone(), b.clone());

    for i in 0..3u8 {
        a_remote.send_binary(Bytes::from(vec![i; 4])).await?;
    }
    for i in 0..2u8 {
        b_remote.send_binary(Bytes::from(vec![0x10 + i; 2])).await?;
    }

    for i in 0..3u8 {
        assert_eq!(b_remote.next_message().await?, Message::binary(vec![i; 4]));
    }
    for i in 0..2u8 {
        assert_eq!(a_remote.next_message().await?, Message::binary(vec![0x10 + i; 2]));
    }

    a_remote.close().await?;
    timeout(WAIT, done.wait()).await?;

    assert!(a.is_closed());
    assert!(b.is_closed());
    assert!(b_remote.next_message().await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_proxy_over_framed_streams() -> Result<()> {
    let (client_a, relay_a) = tokio::io::duplex(64 * 1024);
    let (relay_b, client_b) = tokio::io::duplex(64 * 1024);

    let done = proxy(framed::connect(relay_a), framed::connect(relay_b));
    let left = framed::connect(client_a);
    let right = framed::connect(client_b);

    let mut payload = vec![0u8; 200 * 1024];
    rand::thread_rng().fill_bytes(&mut payload);

    left.send_binary(Bytes::from(payload.clone())).await?;
    left.send_barrier().await?;
    right.send(Message::text("resize 80x24")).await?;

    assert_eq!(right.next_message().await?, Message::Binary(Bytes::from(payload)));
    assert_eq!(right.next_message().await?, Message::barrier());
    assert_eq!(left.next_message().await?, Message::text("resize 80x24"));

    left.close().await?;
    timeout(WAIT, done.wait()).await?;
    assert!(right.next_message().await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_mirror_large_echo() -> Result<()> {
    let (local, remote) = memory::pair(4);
    let (stdout, mut screen) = tokio::io::duplex(64 * 1024);

    let mut input = vec![0u8; 512 * 1024];
    rand::thread_rng().fill_bytes(&mut input);

    let handle = mirror(&local, Box::new(stdout), Box::new(Cursor::new(input.clone())));

    // Echo every chunk back as it arrives, then end the stream
    let echo = tokio::spawn(async move {
        let (data, end) = collect_until_end(&remote).await;
        remote.send_binary(Bytes::from(data.clone())).await?;
        remote.send_barrier().await?;
        anyhow::Ok((data, end))
    });

    let mut echoed = Vec::new();
    screen.read_to_end(&mut echoed).await?;
    let (sent, end) = echo.await??;

    timeout(WAIT, handle.wait()).await?;
    assert_eq!(sent, input);
    assert_eq!(end, Some(Message::barrier()));
    assert_eq!(echoed, input);
    assert!(!local.is_closed());
    Ok(())
}

#[tokio::test]
async fn test_console_mirror_reattach() -> Result<()> {
    let (local, remote) = memory::pair(8);

    // First attachment types one line and detaches
    let (stdout, _screen) = tokio::io::duplex(1024);
    let first = console_mirror(&local, Box::new(stdout), Box::new(Cursor::new(b"whoami\n".to_vec())));
    timeout(WAIT, first.read_done.wait()).await?;

    let (typed, end) = collect_until_end(&remote).await;
    assert_eq!(typed, b"whoami\n");
    assert_eq!(end, Some(Message::barrier()));
    assert_eq!(remote.next_message().await?, Message::close_normal());

    remote.send_barrier().await?;
    timeout(WAIT, first.write_done.wait()).await?;

    // The connection was left open, so a second attachment works
    let (stdout, mut screen) = tokio::io::duplex(1024);
    let (mut keyboard, stdin) = tokio::io::duplex(1024);
    let second = console_mirror(&local, Box::new(stdout), Box::new(stdin));

    keyboard.write_all(b"id\n").await?;
    assert_eq!(remote.next_message().await?, Message::binary(&b"id\n"[..]));

    remote.send_binary(Bytes::from("uid=0(root)\n")).await?;
    remote.send_close().await?;

    timeout(WAIT, second.write_done.wait()).await?;
    let mut shown = String::new();
    screen.read_to_string(&mut shown).await?;
    assert_eq!(shown, "uid=0(root)\n");

    drop(keyboard);
    timeout(WAIT, second.read_done.wait()).await?;
    local.close().await?;
    Ok(())
}

/// Sends each line of input as its own message
struct LineOutbound;

#[async_trait]
impl OutboundStrategy for LineOutbound {
    async fn run(&self, connection: &Connection, mut reader: LocalReader) -> OutboundExit {
        let mut input = String::new();
        if reader.read_to_string(&mut input).await.is_err() {
            return OutboundExit::EndOfInput;
        }
        for line in input.lines() {
            if connection.send(Message::text(line)).await.is_err() {
                return OutboundExit::TransportFailed;
            }
        }
        OutboundExit::EndOfInput
    }
}

/// Upper-cases binary payloads before handing off to the stock pump logic
struct ShoutingInbound;

#[async_trait]
impl InboundStrategy for ShoutingInbound {
    async fn run(&self, connection: &Connection, writer: Option<LocalWriter>) -> InboundExit {
        let Some(mut writer) = writer else {
            return InboundPump.run(connection, None).await;
        };
        loop {
            match connection.next_message().await {
                Ok(Message::Binary(payload)) => {
                    if writer.write_all(&payload.to_ascii_uppercase()).await.is_err() {
                        return InboundExit::WriteFailed;
                    }
                }
                Ok(_) => {
                    let _ = writer.shutdown().await;
                    return InboundExit::Barrier;
                }
                Err(_) => return InboundExit::TransportEnded,
            }
        }
    }
}

#[tokio::test]
async fn test_custom_mirror_strategies() -> Result<()> {
    let (local, remote) = memory::pair(8);
    let (stdout, mut screen) = tokio::io::duplex(1024);

    let handle = Mirror::default()
        .with_outbound(Arc::new(LineOutbound))
        .with_inbound(Arc::new(ShoutingInbound))
        .start(&local, Box::new(stdout), Box::new(Cursor::new(b"one\ntwo\n".to_vec())));

    assert_eq!(remote.next_message().await?, Message::text("one"));
    assert_eq!(remote.next_message().await?, Message::text("two"));

    remote.send_binary(Bytes::from("quiet")).await?;
    remote.send_barrier().await?;

    timeout(WAIT, handle.wait()).await?;
    let mut shown = String::new();
    screen.read_to_string(&mut shown).await?;
    assert_eq!(shown, "QUIET");
    Ok(())
}
