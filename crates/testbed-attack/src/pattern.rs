//! Frame emission patterns
//!
//! All patterns send 8-byte classic frames and pace themselves with
//! `tokio::time::sleep`. A send failure aborts the pattern; frames already
//! sent stay sent.

use std::time::Duration;

use rand::Rng;
use testbed_can::CanTransport;
use testbed_core::CanFrame;

use crate::error::AttackResult;

/// Highest arbitration id the random flood and the fuzzer use
pub const FUZZ_MAX_ID: u32 = 0xFFF;

/// Sends between cooperative yields when no pacing delay is configured
const YIELD_EVERY: usize = 256;

/// `count` copies of `frame`, `spacing` apart
pub async fn fixed_burst(
    transport: &dyn CanTransport,
    frame: &CanFrame,
    count: usize,
    spacing: Duration,
) -> AttackResult<usize> {
    for i in 0..count {
        if i > 0 {
            tokio::time::sleep(spacing).await;
        }
        transport.send(frame).await?;
    }
    Ok(count)
}

/// One frame
pub async fn single_shot(transport: &dyn CanTransport, frame: &CanFrame) -> AttackResult<usize> {
    transport.send(frame).await?;
    Ok(1)
}

/// `groups` bursts of `per_group` sends, `pause` between bursts
///
/// Looks like a button being held down to a receiver that debounces.
pub async fn pulsed_burst(
    transport: &dyn CanTransport,
    frame: &CanFrame,
    groups: usize,
    per_group: usize,
    spacing: Duration,
    pause: Duration,
) -> AttackResult<usize> {
    let mut sent = 0;
    for group in 0..groups {
        if group > 0 {
            tokio::time::sleep(pause).await;
        }
        sent += fixed_burst(transport, frame, per_group, spacing).await?;
    }
    Ok(sent)
}

/// `count` frames with a random id in `0..=0xFFF` and a random first byte
pub async fn random_flood<R: Rng + Send>(
    transport: &dyn CanTransport,
    count: usize,
    spacing: Duration,
    rng: &mut R,
) -> AttackResult<usize> {
    for i in 0..count {
        if i > 0 {
            tokio::time::sleep(spacing).await;
        }
        let id = rng.gen_range(0..=FUZZ_MAX_ID);
        let first = rng.gen::<u8>();
        let frame = first_byte_frame(id, first)?;
        transport.send(&frame).await?;
    }
    Ok(count)
}

/// Every `(id, first byte)` pair, ids `0..=0xFFF` × bytes `0..=0xFF`
pub fn fuzz_space() -> impl Iterator<Item = (u32, u8)> {
    (0..=FUZZ_MAX_ID).flat_map(|id| (0..=u8::MAX).map(move |b| (id, b)))
}

/// Send one frame per pair of [`fuzz_space`], without pacing
pub async fn exhaustive_fuzz(transport: &dyn CanTransport) -> AttackResult<usize> {
    let mut sent = 0;
    for (id, first) in fuzz_space() {
        let frame = first_byte_frame(id, first)?;
        transport.send(&frame).await?;
        sent += 1;
        if sent % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
        }
    }
    Ok(sent)
}

/// 8-byte frame carrying `first` followed by zeros
pub fn first_byte_frame(id: u32, first: u8) -> AttackResult<CanFrame> {
    let mut data = [0u8; 8];
    data[0] = first;
    Ok(CanFrame::new(id, &data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use testbed_can::{MockCanTransport, MockConfig, TransportError};

    fn mock() -> MockCanTransport {
        MockCanTransport::new(&MockConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn burst_sends_exact_count_with_spacing() {
        let bus = mock();
        let frame = first_byte_frame(0x43, 0xFF).unwrap();

        let sent = fixed_burst(&bus, &frame, 3000, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(sent, 3000);

        let frames = bus.sent_frames();
        assert_eq!(frames.len(), 3000);
        assert!(frames.iter().all(|f| *f == frame));

        let instants = bus.sent_instants();
        for pair in instants.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pulsed_burst_pauses_between_groups() {
        let bus = mock();
        let frame = first_byte_frame(0x98, 0x01).unwrap();

        let sent = pulsed_burst(
            &bus,
            &frame,
            5,
            50,
            Duration::from_millis(1),
            Duration::from_millis(200),
        )
        .await
        .unwrap();
        assert_eq!(sent, 250);

        let instants = bus.sent_instants();
        let gap = instants[50] - instants[49];
        assert!(gap >= Duration::from_millis(200));
        let inner = instants[49] - instants[48];
        assert!(inner < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn random_flood_stays_in_id_range() {
        let bus = mock();
        let mut rng = StdRng::seed_from_u64(7);

        random_flood(&bus, 500, Duration::from_millis(1), &mut rng)
            .await
            .unwrap();
        let frames = bus.sent_frames();
        assert_eq!(frames.len(), 500);
        assert!(frames.iter().all(|f| f.id() <= FUZZ_MAX_ID && f.len() == 8));
        assert!(frames.iter().all(|f| f.data()[1..].iter().all(|&b| b == 0)));
    }

    #[test]
    fn fuzz_space_visits_each_pair_once() {
        let mut seen = HashSet::new();
        for pair in fuzz_space() {
            assert!(seen.insert(pair), "duplicate {:?}", pair);
        }
        assert_eq!(seen.len(), 0x1000 * 0x100);
        assert!(seen.contains(&(0xFFF, 0xFF)));
        assert!(seen.contains(&(0, 0)));
    }

    #[tokio::test]
    async fn fuzz_sends_without_recording() {
        let bus = MockCanTransport::new(&MockConfig {
            record: false,
            ..Default::default()
        });
        let sent = exhaustive_fuzz(&bus).await.unwrap();
        assert_eq!(sent, 0x1000 * 0x100);
        assert_eq!(bus.sent_count(), sent);
    }

    #[tokio::test]
    async fn send_failure_aborts_pattern() {
        let bus = mock();
        bus.set_connected(false);
        let frame = first_byte_frame(0x1A, 0x00).unwrap();
        let err = fixed_burst(&bus, &frame, 10, Duration::ZERO).await.unwrap_err();
        assert!(matches!(
            err,
            crate::AttackError::Transport(TransportError::ConnectionClosed)
        ));
        assert_eq!(bus.sent_count(), 0);
    }
}
