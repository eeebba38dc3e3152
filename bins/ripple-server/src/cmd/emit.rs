use std::io::Write;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::net::TcpStream;

use ripple_api::Record;
use ripple_codec::{FrameCodec, RecordEncoder};

use crate::config::EmitArgs;
use crate::error::ServerError;
use crate::wire::{FrameReader, FrameWriter};

// ═══════════════════════════════════════════════════════════════
//  Emit: synthetic readings → server, status frames → stdout
// ═══════════════════════════════════════════════════════════════

pub async fn run(args: EmitArgs) -> Result<(), ServerError> {
    let stream = TcpStream::connect(&args.addr)
        .await
        .map_err(|source| ServerError::Connect { addr: args.addr.clone(), source })?;
    let (reader, writer) = stream.into_split();
    tracing::info!(addr = %args.addr, count = args.count, "connected");

    let codec = FrameCodec::default();
    let tag = args.tag;

    // Статусы печатаются по мере прихода; сервер закрывает поток после drain.
    let printer = tokio::spawn(async move {
        let mut input = FrameReader::new(reader, codec);
        let mut received = 0u64;
        while let Some(frame) = input.next_frame().await? {
            if frame.tag != tag {
                tracing::debug!(tag = frame.tag, "ignoring frame with foreign tag");
                continue;
            }
            received += 1;
            writeln!(std::io::stdout().lock(), "{}", String::from_utf8_lossy(&frame.payload))?;
        }
        Ok::<_, ServerError>(received)
    });

    let encoder = RecordEncoder::new(tag);
    let mut output = FrameWriter::new(writer, codec);
    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));

    for i in 0..args.count {
        ticker.tick().await;
        let record = Record {
            value: noise_level(i),
            timestamp: now_ms(),
            source: args.source.clone(),
        };
        output.write_frame(&encoder.encode(&record)?).await?;
    }
    output.shutdown().await?;
    tracing::info!(sent = args.count, "all readings sent, waiting for status frames");

    let received = printer.await??;
    tracing::info!(statuses = received, "done");
    Ok(())
}

/// Deterministic pseudo noise level, 40..80 dB.
fn noise_level(i: u64) -> f32 {
    let x = i as f32;
    60.0 + 15.0 * (x * 0.37).sin() + 5.0 * (x * 1.91).cos()
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_level_stays_in_range() {
        for i in 0..1_000 {
            let v = noise_level(i);
            assert!((40.0..=80.0).contains(&v), "{i}: {v}");
        }
    }
}
