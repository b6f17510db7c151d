//! Loose-sync timing calculator.
//!
//! Placement is a single forward pass over the segments that tracks
//! `current_time`, the end of the last placed clip. Each clip either flows
//! naturally (`current_time + gap`) or, when a sync trigger fires and there is
//! enough headroom, jumps to its original start. Either way a clip never
//! starts before the previous one ends.
//!
//! Clip durations come from a concurrent probe prefetch that runs before the
//! pass; the pass itself is pure.

use futures::future::join_all;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use dubsync_media::ClipProber;
use dubsync_models::{
    clip_is_readable, LooseSyncConfig, Schedule, ScheduledSegment, Segment, SyncReason,
};

use crate::metrics;

/// Duration known for one segment before placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbedDuration {
    /// No readable clip; the segment is not scheduled
    Skipped,
    /// Duration reported by the prober
    Probed(f64),
    /// Probe failed; the segment's own window is used
    Fallback(f64),
}

impl ProbedDuration {
    /// Fallback for a segment whose clip could not be probed.
    pub fn fallback_for(segment: &Segment) -> Self {
        ProbedDuration::Fallback(segment.duration_fallback())
    }
}

/// Probe every renderable segment's clip, at most `max_parallel` at a time.
///
/// The result is aligned with `segments`. Failures, timeouts and nonsensical
/// durations fall back to `end - start`.
pub async fn prefetch_durations(
    segments: &[Segment],
    prober: &dyn ClipProber,
    max_parallel: usize,
    timeout: Duration,
) -> Vec<ProbedDuration> {
    let semaphore = Semaphore::new(max_parallel.max(1));
    let semaphore = &semaphore;

    let probes = segments.iter().enumerate().map(|(index, segment)| async move {
        let path = match segment.clip_path() {
            Some(path) if clip_is_readable(path) => path,
            _ => {
                debug!(segment = index, "Skipping segment {}: no audio file", index);
                return ProbedDuration::Skipped;
            }
        };

        let _permit = semaphore.acquire().await;

        match tokio::time::timeout(timeout, prober.duration(path)).await {
            Ok(Ok(duration)) if duration.is_finite() && duration >= 0.0 => {
                ProbedDuration::Probed(duration)
            }
            Ok(Ok(duration)) => {
                warn!(
                    segment = index,
                    duration,
                    "Probe returned an invalid duration, using the segment window"
                );
                metrics::record_probe_failure("invalid");
                ProbedDuration::fallback_for(segment)
            }
            Ok(Err(e)) => {
                warn!(segment = index, "Probe failed, using the segment window: {}", e);
                metrics::record_probe_failure("error");
                ProbedDuration::fallback_for(segment)
            }
            Err(_) => {
                warn!(
                    segment = index,
                    timeout_ms = timeout.as_millis() as u64,
                    "Probe timed out, using the segment window"
                );
                metrics::record_probe_failure("timeout");
                ProbedDuration::fallback_for(segment)
            }
        }
    });

    join_all(probes).await
}

/// Place every renderable segment on the output timeline.
///
/// `durations` must be aligned with `segments` (see [`prefetch_durations`]);
/// segments without an entry, or whose entry is [`ProbedDuration::Skipped`],
/// are left out of the schedule and of the speaker-change context.
pub fn schedule_segments(
    segments: &[Segment],
    durations: &[ProbedDuration],
    config: &LooseSyncConfig,
) -> Schedule {
    let mut entries: Vec<ScheduledSegment> = Vec::new();
    let mut current_time = 0.0_f64;
    let mut previous: Option<&Segment> = None;

    for (index, segment) in segments.iter().enumerate() {
        let (duration, duration_probed) = match durations.get(index) {
            Some(ProbedDuration::Probed(d)) => (*d, true),
            Some(ProbedDuration::Fallback(d)) => (d.max(0.0), false),
            Some(ProbedDuration::Skipped) | None => continue,
        };
        let Some(audio_file) = segment.audio_file.clone() else {
            continue;
        };

        let position = entries.len();
        let original_start = segment.start;

        let gap = match previous {
            Some(prev) if config.respect_segment_buffers => config
                .min_gap
                .max(prev.buffer_after + segment.buffer_before),
            _ => config.min_gap,
        };

        let window = config
            .crossfade
            .filter(|w| w.duration > 0.0 && (w.global || segment.wants_crossfade()));

        let natural_start = match window {
            Some(w) => current_time.max(current_time + gap - w.duration / 2.0),
            None => current_time + gap,
        };

        let sync_reason = sync_trigger(
            position,
            segment,
            previous,
            natural_start,
            window.is_some(),
            config,
        );

        let synced =
            sync_reason.is_some() && original_start >= current_time + config.safety_buffer;
        let start_time = if synced { original_start } else { natural_start };
        let drift = start_time - original_start;

        match (sync_reason, synced) {
            (Some(reason), true) => {
                debug!(
                    segment = index,
                    "Segment {}: SYNC to original ({}) at {:.2}s", index, reason, start_time
                );
                metrics::record_scheduled("synced", drift);
            }
            (Some(reason), false) => {
                debug!(
                    segment = index,
                    "Segment {}: SYNC attempted ({}) but unsafe, using flow at {:.2}s",
                    index,
                    reason,
                    start_time
                );
                metrics::record_scheduled("abandoned", drift);
            }
            (None, _) => {
                debug!(
                    segment = index,
                    "Segment {}: Natural flow at {:.2}s (drift: {:+.2}s)", index, start_time, drift
                );
                metrics::record_scheduled("natural", drift);
            }
        }

        entries.push(ScheduledSegment {
            index,
            audio_file,
            speaker: segment.speaker.clone(),
            original_start,
            start_time,
            duration,
            synced,
            sync_reason,
            drift,
            crossfade: window.is_some(),
            duration_probed,
        });

        current_time = start_time + duration;
        previous = Some(segment);
    }

    let schedule = Schedule::new(entries);
    let summary = &schedule.summary;
    info!(
        total = summary.total_segments,
        synced = summary.synced_segments,
        abandoned = summary.abandoned_syncs,
        sync_rate = format!("{:.1}%", summary.sync_rate * 100.0),
        max_drift = format!("{:+.2}s", summary.max_positive_drift),
        min_drift = format!("{:+.2}s", summary.max_negative_drift),
        span = format!("{:.2}s", summary.total_span),
        "Loose sync timing calculated"
    );

    schedule
}

/// Probe then place: the full timing calculation.
pub async fn calculate_loose_sync_timing(
    segments: &[Segment],
    prober: &dyn ClipProber,
    config: &LooseSyncConfig,
    max_parallel: usize,
    probe_timeout: Duration,
) -> Schedule {
    let durations = prefetch_durations(segments, prober, max_parallel, probe_timeout).await;
    schedule_segments(segments, &durations, config)
}

/// Pick the trigger for a sync attempt, highest precedence first.
fn sync_trigger(
    position: usize,
    segment: &Segment,
    previous: Option<&Segment>,
    natural_start: f64,
    crossfaded: bool,
    config: &LooseSyncConfig,
) -> Option<SyncReason> {
    if position == 0 {
        return Some(SyncReason::FirstSegment);
    }

    if config.sync_on_speaker_change
        && previous.is_some_and(|prev| prev.speaker != segment.speaker)
    {
        return Some(SyncReason::SpeakerChange);
    }

    // Crossfaded segments stay in the flow of the previous clip
    if crossfaded {
        return None;
    }

    if let Some(threshold) = config.max_drift_seconds {
        if (natural_start - segment.start).abs() > threshold {
            return Some(SyncReason::MaxDrift);
        }
    }

    match config.sync_every_n_segments {
        Some(n) if n > 0 && position % n == 0 => Some(SyncReason::Periodic),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dubsync_media::{MediaError, MediaResult};
    use dubsync_models::AudioSettings;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const EPS: f64 = 1e-9;

    fn seg(start: f64, end: f64, speaker: &str) -> Segment {
        Segment::new(start, end, "line")
            .with_speaker(speaker)
            .with_audio_file(format!("/clips/{}-{}.mp3", start, speaker))
    }

    fn probed(durations: &[f64]) -> Vec<ProbedDuration> {
        durations.iter().map(|d| ProbedDuration::Probed(*d)).collect()
    }

    fn assert_no_overlap(schedule: &Schedule) {
        for pair in schedule.entries.windows(2) {
            assert!(
                pair[0].end_time() <= pair[1].start_time + EPS,
                "segment {} ends at {} after segment {} starts at {}",
                pair[0].index,
                pair[0].end_time(),
                pair[1].index,
                pair[1].start_time
            );
        }
    }

    #[test]
    fn test_documented_scenario() {
        let segments = vec![seg(0.0, 2.0, "A"), seg(2.0, 4.0, "A"), seg(4.0, 6.0, "B")];
        let durations = probed(&[1.8, 1.9, 1.7]);

        for config in [
            LooseSyncConfig::default(),
            LooseSyncConfig::enhanced(&AudioSettings::default()),
        ] {
            let schedule = schedule_segments(&segments, &durations, &config);
            let e = &schedule.entries;
            assert_eq!(e.len(), 3);

            assert!((e[0].start_time - 0.15).abs() < EPS);
            assert!(!e[0].synced);
            assert_eq!(e[0].sync_reason, Some(SyncReason::FirstSegment));

            assert!((e[1].start_time - 2.10).abs() < EPS);
            assert!((e[1].drift - 0.10).abs() < EPS);
            assert_eq!(e[1].sync_reason, None);

            assert!((e[2].start_time - 4.15).abs() < EPS);
            assert!(!e[2].synced);
            assert_eq!(e[2].sync_reason, Some(SyncReason::SpeakerChange));

            assert_eq!(schedule.summary.synced_segments, 0);
            assert_eq!(schedule.summary.abandoned_syncs, 2);
            assert!(schedule.summary.sync_reasons.is_empty());
            assert_no_overlap(&schedule);
        }
    }

    #[test]
    fn test_reachable_first_segment_is_synced() {
        let segments = vec![seg(1.0, 3.0, "A")];
        let schedule = schedule_segments(&segments, &probed(&[1.5]), &LooseSyncConfig::default());
        let first = &schedule.entries[0];
        assert!(first.synced);
        assert_eq!(first.start_time, 1.0);
        assert_eq!(first.drift, 0.0);
        assert_eq!(schedule.summary.sync_reasons.get("first_segment"), Some(&1));
    }

    #[test]
    fn test_speaker_change_realigns_when_safe() {
        let segments = vec![seg(0.5, 2.0, "A"), seg(5.0, 7.0, "B")];
        let schedule =
            schedule_segments(&segments, &probed(&[1.0, 1.0]), &LooseSyncConfig::default());
        let second = &schedule.entries[1];
        assert!(second.synced);
        assert_eq!(second.start_time, 5.0);
        assert_eq!(second.sync_reason, Some(SyncReason::SpeakerChange));
    }

    #[test]
    fn test_safety_buffer_boundary() {
        let config = LooseSyncConfig {
            min_gap: 0.5,
            safety_buffer: 0.25,
            ..LooseSyncConfig::default()
        };

        // First clip ends at 2.0; 2.25 is exactly current_time + safety_buffer
        let segments = vec![seg(0.5, 2.0, "A"), seg(2.25, 3.0, "B")];
        let schedule = schedule_segments(&segments, &probed(&[1.5, 0.5]), &config);
        assert!(schedule.entries[1].synced);
        assert_eq!(schedule.entries[1].start_time, 2.25);

        let segments = vec![seg(0.5, 2.0, "A"), seg(2.125, 3.0, "B")];
        let schedule = schedule_segments(&segments, &probed(&[1.5, 0.5]), &config);
        assert!(!schedule.entries[1].synced);
        assert_eq!(schedule.entries[1].start_time, 2.5);
    }

    #[test]
    fn test_skipped_segments_do_not_count_as_previous_speaker() {
        let segments = vec![seg(0.0, 1.0, "A"), seg(1.0, 2.0, "B"), seg(2.0, 3.0, "A")];
        let durations = vec![
            ProbedDuration::Probed(0.8),
            ProbedDuration::Skipped,
            ProbedDuration::Probed(0.8),
        ];
        let schedule = schedule_segments(&segments, &durations, &LooseSyncConfig::default());
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule.entries[1].index, 2);
        assert_eq!(schedule.entries[1].sync_reason, None);
    }

    #[test]
    fn test_segment_without_clip_is_not_scheduled() {
        let segments = vec![Segment::new(0.0, 1.0, "no clip")];
        let schedule = schedule_segments(
            &segments,
            &[ProbedDuration::Probed(1.0)],
            &LooseSyncConfig::default(),
        );
        assert!(schedule.is_empty());
    }

    #[test]
    fn test_periodic_resync() {
        let segments: Vec<Segment> = (0..4)
            .map(|i| seg(1.0 + i as f64 * 3.0, 2.0 + i as f64 * 3.0, "A"))
            .collect();
        let config = LooseSyncConfig::default().with_sync_every(3);
        let schedule = schedule_segments(&segments, &probed(&[1.0; 4]), &config);

        let e = &schedule.entries;
        assert_eq!(e[0].sync_reason, Some(SyncReason::FirstSegment));
        assert_eq!(e[1].sync_reason, None);
        assert_eq!(e[2].sync_reason, None);
        assert_eq!(e[3].sync_reason, Some(SyncReason::Periodic));
        assert!(e[3].synced);
        assert_eq!(e[3].start_time, 10.0);
    }

    #[test]
    fn test_zero_period_disables_periodic_resync() {
        let segments: Vec<Segment> = (0..3)
            .map(|i| seg(1.0 + i as f64 * 3.0, 2.0 + i as f64 * 3.0, "A"))
            .collect();
        let config = LooseSyncConfig::default().with_sync_every(0);
        let schedule = schedule_segments(&segments, &probed(&[1.0; 3]), &config);
        assert!(schedule.entries[1..].iter().all(|e| e.sync_reason.is_none()));
    }

    #[test]
    fn test_max_drift_forces_resync() {
        let segments = vec![seg(0.0, 1.0, "A"), seg(10.0, 11.0, "A"), seg(11.5, 12.0, "A")];
        let config = LooseSyncConfig::default().with_max_drift(1.5);
        let schedule = schedule_segments(&segments, &probed(&[1.0, 1.0, 0.4]), &config);

        let e = &schedule.entries;
        assert_eq!(e[1].sync_reason, Some(SyncReason::MaxDrift));
        assert!(e[1].synced);
        assert_eq!(e[1].start_time, 10.0);
        // Back in step: natural flow lands 0.35s early, within the bound
        assert_eq!(e[2].sync_reason, None);
        assert!((e[2].start_time - 11.15).abs() < EPS);
    }

    #[test]
    fn test_speaker_change_outranks_other_triggers() {
        let segments = vec![
            seg(0.0, 1.0, "A"),
            seg(1.0, 2.0, "A"),
            seg(2.0, 3.0, "A"),
            seg(20.0, 21.0, "B"),
        ];
        let config = LooseSyncConfig::default().with_sync_every(3).with_max_drift(1.0);
        let schedule = schedule_segments(&segments, &probed(&[0.5; 4]), &config);
        assert_eq!(schedule.entries[3].sync_reason, Some(SyncReason::SpeakerChange));
    }

    #[test]
    fn test_crossfade_shrinks_gap_without_overlap() {
        let mut second = seg(10.0, 12.0, "A");
        second.priority = 2;
        let segments = vec![seg(1.0, 2.0, "A"), second];

        let config = LooseSyncConfig::default().with_crossfade(0.2, false);
        let schedule = schedule_segments(&segments, &probed(&[1.0, 1.0]), &config);
        let e = &schedule.entries;
        assert!(!e[0].crossfade);
        assert!(e[1].crossfade);
        assert!((e[1].start_time - 2.05).abs() < EPS);

        // A window wider than twice the gap is clamped to the previous clip's end
        let config = LooseSyncConfig::default().with_crossfade(0.5, true);
        let schedule = schedule_segments(&segments, &probed(&[1.0, 1.0]), &config);
        assert!((schedule.entries[1].start_time - 2.0).abs() < EPS);
        assert_no_overlap(&schedule);
    }

    #[test]
    fn test_crossfaded_segment_skips_drift_resync() {
        let segments = vec![seg(0.0, 1.0, "A"), seg(10.0, 11.0, "A")];
        let config = LooseSyncConfig::default()
            .with_max_drift(1.5)
            .with_crossfade(0.15, true);
        let schedule = schedule_segments(&segments, &probed(&[1.0, 1.0]), &config);
        assert_eq!(schedule.entries[1].sync_reason, None);
        assert!(!schedule.entries[1].synced);
    }

    #[test]
    fn test_segment_buffers_widen_the_gap() {
        let mut first = seg(0.0, 1.0, "A");
        first.buffer_after = 0.45;
        let segments = vec![first, seg(1.0, 2.0, "A")];

        let config = LooseSyncConfig::default().with_segment_buffers(true);
        let schedule = schedule_segments(&segments, &probed(&[1.0, 1.0]), &config);
        // 0.15 + 1.0, then 0.45 + 0.2 of pause
        assert!((schedule.entries[1].start_time - 1.80).abs() < EPS);
    }

    #[test]
    fn test_fallback_durations_are_flagged() {
        let segments = vec![seg(0.5, 2.5, "A"), seg(3.0, 3.0, "A")];
        let durations = vec![
            ProbedDuration::fallback_for(&segments[0]),
            ProbedDuration::fallback_for(&segments[1]),
        ];
        let schedule = schedule_segments(&segments, &durations, &LooseSyncConfig::default());
        assert!(!schedule.entries[0].duration_probed);
        assert_eq!(schedule.entries[0].duration, 2.0);
        assert_eq!(schedule.entries[1].duration, 0.0);
        assert_no_overlap(&schedule);
    }

    #[test]
    fn test_no_overlap_for_every_trigger_set() {
        // Deterministic pseudo-random inputs (LCG)
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (state >> 33) as f64 / (1u64 << 31) as f64
        };

        let configs = [
            LooseSyncConfig::default(),
            LooseSyncConfig::enhanced(&AudioSettings::default()),
            LooseSyncConfig::default().with_sync_every(2).with_max_drift(0.5),
            LooseSyncConfig::default()
                .with_crossfade(0.6, true)
                .with_segment_buffers(true),
            LooseSyncConfig {
                sync_on_speaker_change: false,
                ..LooseSyncConfig::default().with_max_drift(0.1)
            },
        ];

        for _ in 0..50 {
            let mut t = 0.0;
            let mut segments = Vec::new();
            let mut durations = Vec::new();
            for i in 0..25 {
                let len = 0.2 + next() * 3.0;
                let speaker = if next() < 0.3 { "B" } else { "A" };
                let mut s = seg(t, t + len, speaker);
                s.priority = if next() < 0.3 { 2 } else { 1 };
                s.buffer_after = next() * 0.6;
                segments.push(s);
                durations.push(match i % 7 {
                    3 => ProbedDuration::Skipped,
                    5 => ProbedDuration::Fallback(len),
                    _ => ProbedDuration::Probed(len * (0.5 + next() * 1.5)),
                });
                t += len + next() * 1.0 - 0.3;
            }

            for config in &configs {
                let schedule = schedule_segments(&segments, &durations, config);
                assert_no_overlap(&schedule);
                for entry in &schedule.entries {
                    assert!((entry.drift - (entry.start_time - entry.original_start)).abs() < EPS);
                    if entry.synced {
                        assert_eq!(entry.start_time, entry.original_start);
                    }
                }
            }
        }
    }

    struct FakeProber {
        durations: HashMap<PathBuf, MediaResult<f64>>,
        slow: Option<PathBuf>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeProber {
        fn new(durations: Vec<(PathBuf, MediaResult<f64>)>) -> Self {
            Self {
                durations: durations.into_iter().collect(),
                slow: None,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ClipProber for FakeProber {
        async fn duration(&self, path: &Path) -> MediaResult<f64> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let wait = if self.slow.as_deref() == Some(path) {
                Duration::from_secs(5)
            } else {
                Duration::from_millis(10)
            };
            tokio::time::sleep(wait).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            match self.durations.get(path) {
                Some(Ok(d)) => Ok(*d),
                Some(Err(_)) | None => Err(MediaError::invalid_audio("unreadable")),
            }
        }
    }

    fn clip(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"clip").unwrap();
        path
    }

    #[tokio::test]
    async fn test_prefetch_falls_back_per_segment() {
        let dir = TempDir::new().unwrap();
        let good = clip(dir.path(), "good.mp3");
        let broken = clip(dir.path(), "broken.mp3");
        let nan = clip(dir.path(), "nan.mp3");
        let slow = clip(dir.path(), "slow.mp3");

        let mut prober = FakeProber::new(vec![
            (good.clone(), Ok(1.25)),
            (broken.clone(), Err(MediaError::invalid_audio("x"))),
            (nan.clone(), Ok(f64::NAN)),
            (slow.clone(), Ok(9.0)),
        ]);
        prober.slow = Some(slow.clone());

        let segments = vec![
            Segment::new(0.0, 2.0, "a").with_audio_file(&good),
            Segment::new(2.0, 3.5, "b").with_audio_file(&broken),
            Segment::new(4.0, 4.5, "c").with_audio_file(&nan),
            Segment::new(5.0, 6.0, "d").with_audio_file(&slow),
            Segment::new(6.0, 7.0, "e").with_audio_file(dir.path().join("missing.mp3")),
            Segment::new(7.0, 8.0, "f"),
        ];

        let durations =
            prefetch_durations(&segments, &prober, 4, Duration::from_millis(200)).await;

        assert_eq!(
            durations,
            vec![
                ProbedDuration::Probed(1.25),
                ProbedDuration::Fallback(1.5),
                ProbedDuration::Fallback(0.5),
                ProbedDuration::Fallback(1.0),
                ProbedDuration::Skipped,
                ProbedDuration::Skipped,
            ]
        );
    }

    #[tokio::test]
    async fn test_prefetch_respects_parallel_limit() {
        let dir = TempDir::new().unwrap();
        let mut entries = Vec::new();
        let mut segments = Vec::new();
        for i in 0..12 {
            let path = clip(dir.path(), &format!("chunk_{:03}.mp3", i));
            entries.push((path.clone(), Ok(1.0)));
            segments.push(Segment::new(i as f64, i as f64 + 1.0, "x").with_audio_file(path));
        }
        let prober = FakeProber::new(entries);

        let durations = prefetch_durations(&segments, &prober, 3, Duration::from_secs(5)).await;

        assert!(durations.iter().all(|d| *d == ProbedDuration::Probed(1.0)));
        assert!(prober.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_calculate_end_to_end_with_files() {
        let dir = TempDir::new().unwrap();
        let a = clip(dir.path(), "a.mp3");
        let b = clip(dir.path(), "b.mp3");
        let prober = FakeProber::new(vec![(a.clone(), Ok(1.0)), (b.clone(), Ok(1.0))]);

        let segments = vec![
            Segment::new(0.5, 1.5, "a").with_speaker("A").with_audio_file(&a),
            Segment::new(4.0, 5.0, "b").with_speaker("B").with_audio_file(&b),
        ];
        let schedule = calculate_loose_sync_timing(
            &segments,
            &prober,
            &LooseSyncConfig::default(),
            2,
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(schedule.summary.synced_segments, 2);
        assert_eq!(schedule.summary.sync_rate, 1.0);
        assert!((schedule.summary.total_span - 5.0).abs() < EPS);
    }
}
