//! Criterion benchmarks for the frame codec and the ARQ channel.

use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tinylink::tinylink_core::{ChannelConfig, ChecksumMode, FrameCodec, ReliableChannel};
use tinylink::{LinkConfig, LoopbackTransport, Session};

const MODES: [ChecksumMode; 4] = [
    ChecksumMode::Off,
    ChecksumMode::Crc8,
    ChecksumMode::Crc16,
    ChecksumMode::Crc32,
];

/// Perfect wire: every pending byte from src reaches dst.
fn transfer(src: &mut ReliableChannel, dst: &mut ReliableChannel, now: Instant) {
    let mut buf = [0u8; 256];
    loop {
        let n = src.get_tx_data(&mut buf, now);
        if n == 0 {
            break;
        }
        dst.on_rx_data(&buf[..n], now);
    }
}

fn connected_pair(config: &ChannelConfig, now: Instant) -> (ReliableChannel, ReliableChannel) {
    let mut a = ReliableChannel::new(config.clone()).unwrap();
    let mut b = ReliableChannel::new(config.clone()).unwrap();
    a.connect();
    transfer(&mut a, &mut b, now);
    transfer(&mut b, &mut a, now);
    assert!(a.is_connected() && b.is_connected());
    (a, b)
}

fn codec_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_encode");
    let payload: Vec<u8> = (0..=255u8).cycle().take(256).collect();
    group.throughput(Throughput::Bytes(payload.len() as u64));

    for mode in MODES {
        let id = BenchmarkId::new("256B", format!("{mode:?}"));
        group.bench_with_input(id, &mode, |b, &mode| {
            let mut codec = FrameCodec::new(mode, 512);
            let mut out = [0u8; 1024];
            b.iter(|| {
                let mut encoder = codec.encode(&[0xFF, 0x00], &payload);
                encoder.fill(&mut out)
            });
        });
    }

    group.finish();
}

fn codec_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_decode");
    let payload: Vec<u8> = (0..=255u8).cycle().take(256).collect();
    group.throughput(Throughput::Bytes(payload.len() as u64));

    for mode in MODES {
        let mut codec = FrameCodec::new(mode, 512);
        let mut encoder = codec.encode(&[0xFF, 0x00], &payload);
        let mut wire = vec![0u8; encoder.wire_len()];
        encoder.fill(&mut wire);

        let id = BenchmarkId::new("256B", format!("{mode:?}"));
        group.bench_with_input(id, &wire, |b, wire| {
            let mut decoder = FrameCodec::new(mode, 512);
            b.iter(|| {
                let frames = decoder.feed(wire);
                assert_eq!(frames.len(), 1);
            });
        });
    }

    group.finish();
}

fn channel_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_throughput");

    for &window in &[1u8, 4, 7] {
        let msg_count = 500;
        let msg_size = 64;
        group.throughput(Throughput::Bytes((msg_count * msg_size) as u64));

        group.bench_with_input(
            BenchmarkId::new("64B_x_500", format!("w{window}")),
            &window,
            |b, &window| {
                let config = ChannelConfig {
                    window,
                    ..ChannelConfig::default()
                };
                let payload = vec![0xA5u8; msg_size];
                b.iter(|| {
                    let mut now = Instant::now();
                    let (mut tx, mut rx) = connected_pair(&config, now);
                    let mut received = 0;
                    let mut sent = 0;
                    while received < msg_count {
                        while sent < msg_count && tx.send(&payload).is_ok() {
                            sent += 1;
                        }
                        transfer(&mut tx, &mut rx, now);
                        while rx.recv().is_some() {
                            received += 1;
                        }
                        // Let the standalone acknowledgment fall due
                        now += config.ack_delay;
                        rx.update(now).unwrap();
                        transfer(&mut rx, &mut tx, now);
                    }
                    received
                });
            },
        );
    }

    group.finish();
}

fn session_echo(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_echo");
    let msg_count = 100;
    group.throughput(Throughput::Elements(msg_count as u64));
    group.sample_size(10);

    group.bench_function("threaded_32B_x_100", |b| {
        b.iter(|| {
            let config = LinkConfig::new()
                .mtu(32)
                .ack_delay(Duration::from_millis(1))
                .poll_interval(Duration::from_millis(1))
                .threaded();
            let (left, right) = LoopbackTransport::pair();
            let server_config = config.clone();
            let server = std::thread::spawn(move || {
                let session = Session::open(right, server_config).unwrap();
                for _ in 0..msg_count {
                    let frame = session.read(Duration::from_secs(5)).unwrap().unwrap();
                    session.send(&frame, Duration::from_secs(5)).unwrap();
                }
                session
            });

            let client = Session::open(left, config).unwrap();
            for i in 0..msg_count {
                let message = [i as u8; 32];
                client.send(&message, Duration::from_secs(5)).unwrap();
                let reply = client.read(Duration::from_secs(5)).unwrap().unwrap();
                assert_eq!(&reply[..], &message[..]);
            }
            let server = server.join().unwrap();
            let _ = client.close();
            let _ = server.close();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    codec_encode,
    codec_decode,
    channel_throughput,
    session_echo
);
criterion_main!(benches);
