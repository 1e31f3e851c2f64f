mod common;

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use rand::Rng;
    use tokio::time::Instant;
    use tsflow::config::{
        PacerConfig, RTPPacketizerConfig, SyncMode, TLVConfig, TSPacketizerConfig, TrackerConfig,
    };
    use tsflow::format::rtp::{RTPHeader, RTPPacketizer, RTPTracker};
    use tsflow::format::ts::{TSPacketizer, TSTracker, ValidationError, TS_PACKET_SIZE};
    use tsflow::format::{tlv, Packetizer, TLVPacketizer};
    use tsflow::pacer::{AsyncPacer, RTPSchedule};
    use tsflow::FlowError;

    use crate::common::*;

    fn run_ts(packetizer: &mut TSPacketizer, tracker: &mut TSTracker, chunks: Vec<Bytes>) -> usize {
        let mut errors = 0;
        for chunk in chunks {
            packetizer.write(chunk).unwrap();
            while let Some(frame) = packetizer.next().unwrap() {
                assert_eq!(frame.len() % TS_PACKET_SIZE, 0);
                errors += tracker.track(frame).errors.len();
            }
        }
        errors
    }

    #[test]
    fn test_ts_pipeline_clean_stream() {
        let mut rng = rng(1);
        let stream = program_stream(40).concat();
        let mut packetizer = TSPacketizer::new(TSPacketizerConfig::default());
        let mut tracker = TSTracker::new(TrackerConfig::default());

        let chunks = random_chunks(&mut rng, &stream, 3_000);
        assert_eq!(run_ts(&mut packetizer, &mut tracker, chunks), 0);

        let stats = tracker.stats();
        assert_eq!(stats.packets as usize, stream.len() / TS_PACKET_SIZE);
        assert_eq!(stats.errors, 0);
        assert!(stats.pmt_complete);
        assert_eq!(tracker.stream_count(), 5);
        for (stream_type, pid) in STREAMS {
            assert_eq!(tracker.stream_type(pid), Some(stream_type));
        }
        assert_eq!(stats.pids[&PCR_PID].pcr_jitter.total(), 40);
    }

    #[test]
    fn test_ts_pipeline_random_loss() {
        let mut rng = rng(7);
        let stream = program_stream(50);
        let kept: Vec<bool> = (0..stream.len())
            .map(|i| i < 2 || rng.gen_range(0..10) != 0)
            .collect();

        // every run of dropped payload packets on a PID breaks continuity
        // once, at the next packet that PID delivers
        let mut pending = HashMap::new();
        let mut expected = 0u64;
        for (packet, &keep) in stream.iter().zip(&kept) {
            let pid = u16::from_be_bytes([packet[1] & 0x1F, packet[2]]);
            let dropped = pending.entry(pid).or_insert(false);
            if !keep {
                *dropped |= packet[3] & 0x10 != 0;
            } else if std::mem::take(dropped) {
                expected += 1;
            }
        }
        assert!(expected > 10);

        let packets: Vec<_> = stream
            .iter()
            .zip(&kept)
            .filter(|(_, keep)| **keep)
            .map(|(packet, _)| *packet)
            .collect();
        let mut packetizer = TSPacketizer::new(TSPacketizerConfig::default());
        let mut tracker = TSTracker::new(TrackerConfig::default());
        let errors = run_ts(&mut packetizer, &mut tracker, vec![Bytes::from(packets.concat())]);

        let stats = tracker.stats();
        assert!(errors as u64 >= expected);
        let continuity: u64 = stats.pids.values().map(|p| p.continuity_errors).sum();
        assert_eq!(continuity, expected);
        assert_eq!(tracker.stream_count(), 5);
    }

    #[test]
    fn test_ts_pipeline_resyncs_after_garbage() {
        let packets = program_stream(10);
        let mut stream = Vec::new();
        for (i, packet) in packets.iter().enumerate() {
            if i == 5 || i == 60 || i == 111 {
                stream.extend_from_slice(&[0u8; 5]);
            }
            stream.extend_from_slice(packet);
        }

        let mut packetizer = TSPacketizer::new(TSPacketizerConfig {
            sync: SyncMode::Continuous,
            ..Default::default()
        });
        let mut tracker = TSTracker::new(TrackerConfig::default());
        let mut rng = rng(3);
        let chunks = random_chunks(&mut rng, &stream, 1_000);

        assert_eq!(run_ts(&mut packetizer, &mut tracker, chunks), 0);
        assert_eq!(packetizer.skipped(), 15);
        assert_eq!(tracker.stats().packets as usize, packets.len());
    }

    #[test]
    fn test_rtp_pipeline() {
        let mut rng = rng(11);
        let packets = program_stream(20);
        let frames = rtp_frames(&packets, 7, 65_530);
        let stream: Vec<u8> = frames.iter().flat_map(|f| f.iter().copied()).collect();

        let mut packetizer = RTPPacketizer::new(RTPPacketizerConfig::default());
        let mut tracker = RTPTracker::new(TrackerConfig::default());
        let mut errors = Vec::new();
        let mut count = 0;
        for chunk in random_chunks(&mut rng, &stream, 2_500) {
            packetizer.write(chunk).unwrap();
            while let Some(frame) = packetizer.next().unwrap() {
                count += 1;
                errors.extend(tracker.track(frame).errors);
            }
        }

        assert_eq!(errors, Vec::<ValidationError>::new());
        assert_eq!(count, frames.len());
        let stats = tracker.stats();
        assert_eq!(stats.packets as usize, frames.len());
        assert_eq!(stats.lost, 0);
        assert_eq!(stats.ts.errors, 0);
        assert_eq!(tracker.stream_count(), 5);
    }

    #[test]
    fn test_rtp_pipeline_reports_loss() {
        let frames = rtp_frames(&program_stream(20), 7, 100);
        let mut tracker = RTPTracker::new(TrackerConfig::default());

        let mut gaps = 0;
        for (i, frame) in frames.iter().enumerate() {
            if i == 6 || i == 7 {
                continue;
            }
            gaps += tracker
                .track(frame)
                .errors
                .iter()
                .filter(|e| matches!(e, ValidationError::Gap(_)))
                .count();
        }
        assert_eq!(gaps, 1);
        assert_eq!(tracker.stats().lost, 2);
    }

    #[test]
    fn test_tlv_carries_ts() {
        let packets = program_stream(5);
        let mut stream = Vec::new();
        for group in packets.chunks(7) {
            stream.extend_from_slice(&tlv::encode(1, &group.concat()).unwrap());
        }

        let mut packetizer = TLVPacketizer::new(TLVConfig {
            allowed_types: Some(vec![1]),
            ..Default::default()
        });
        let mut tracker = TSTracker::new(TrackerConfig::default());
        let mut rng = rng(5);
        let mut errors = 0;
        for chunk in random_chunks(&mut rng, &stream, 500) {
            packetizer.write(chunk).unwrap();
            while let Some(payload) = packetizer.next().unwrap() {
                errors += tracker.track(payload).errors.len();
            }
        }
        assert_eq!(errors, 0);
        assert_eq!(tracker.stats().packets as usize, packets.len());
    }

    #[test]
    fn test_random_input_never_panics() {
        let mut rng = rng(99);
        let noise = random_bytes(&mut rng, 64 * 1024);

        let mut ts = TSPacketizer::new(TSPacketizerConfig {
            sync: SyncMode::Continuous,
            ..Default::default()
        });
        let mut tracker = TSTracker::new(TrackerConfig::default());
        for chunk in random_chunks(&mut rng, &noise, 4_096) {
            ts.write(chunk).unwrap();
            while let Some(frame) = ts.next().unwrap() {
                tracker.track(frame);
            }
        }

        let mut rtp = RTPPacketizer::new(RTPPacketizerConfig::default());
        let mut rtp_tracker = RTPTracker::new(TrackerConfig::default());
        for chunk in random_chunks(&mut rng, &noise, 4_096) {
            rtp.write(chunk).unwrap();
            loop {
                match rtp.next() {
                    Ok(Some(frame)) => {
                        rtp_tracker.track(frame);
                    }
                    Ok(None) => break,
                    Err(_) => {}
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_pacer_preserves_order() {
        let config = PacerConfig {
            queue_depth: 4,
            ..Default::default()
        };
        let pacer = AsyncPacer::new(RTPSchedule::new(&config), &config);
        let frames = rtp_frames(&program_stream(10), 1, 0);
        let total = frames.len();
        assert_eq!(total, 162);

        let producer = {
            let pacer = pacer.clone();
            tokio::spawn(async move {
                let mut pushed = 0;
                // keeps going until the consumer shuts the pacer down
                for frame in frames.iter().cycle() {
                    match pacer.push(frame).await {
                        Ok(()) => pushed += 1,
                        Err(e) => return (pushed, e),
                    }
                }
                unreachable!("cycle over a non-empty list")
            })
        };

        let start = Instant::now();
        for i in 0..total {
            let packet = pacer.pop().await.unwrap();
            let header = RTPHeader::parse(&packet).unwrap();
            assert_eq!(header.sequence_number as usize, i);
        }
        // 3000 ticks per frame at 90 kHz
        let expected = Duration::from_micros(33_333) * (total as u32 - 1);
        assert!(start.elapsed() + Duration::from_millis(5) >= expected);

        pacer.shutdown("consumer done");
        let (pushed, error) = producer.await.unwrap();
        assert!(pushed >= total);
        assert!(matches!(error, FlowError::Cancelled(cause) if cause == "consumer done"));
        assert_eq!(pacer.pool().allocated(), pacer.pool().available());
    }
}
