//! Frame playback scheduler.
//!
//! Drives the session's timeline forward on a fixed cadence. The tick
//! interval is `1000 / (30 * speed)` milliseconds, so speed 1.0 plays at
//! 30 frames per second. Advancing goes through the same navigation path
//! as manual stepping, which means every tick also captures, broadcasts
//! and announces position exactly like a user pressing "next".

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::session::ReplicationSession;

/// Nominal playback rate at speed 1.0.
pub const BASE_FPS: f64 = 30.0;
/// Slowest multiplier reachable through [`PlaybackScheduler::slow_down`].
pub const MIN_SPEED: f64 = 0.25;
/// Fastest multiplier reachable through [`PlaybackScheduler::speed_up`].
pub const MAX_SPEED: f64 = 8.0;

/// Tick interval for a given speed multiplier.
pub fn frame_delay(speed: f64) -> Duration {
    Duration::from_secs_f64(1.0 / (BASE_FPS * speed))
}

#[derive(Debug)]
struct PlaybackState {
    playing: bool,
    speed: f64,
}

/// Timeline playback driver for one session.
pub struct PlaybackScheduler {
    session: Arc<ReplicationSession>,
    state: Arc<RwLock<PlaybackState>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackScheduler {
    pub fn new(session: Arc<ReplicationSession>) -> Self {
        Self {
            session,
            state: Arc::new(RwLock::new(PlaybackState {
                playing: false,
                speed: 1.0,
            })),
            timer: Mutex::new(None),
        }
    }

    /// Start playback from the current frame. No-op if already playing.
    pub async fn start(&self) {
        {
            let mut state = self.state.write().await;
            if state.playing {
                return;
            }
            state.playing = true;
        }
        log::info!("Playback started at speed {}", self.speed().await);
        self.spawn_timer().await;
    }

    /// Stop playback. Idempotent; the current frame stays where it is.
    pub async fn stop(&self) {
        self.state.write().await.playing = false;
        if let Some(handle) = self.timer.lock().await.take() {
            handle.abort();
        }
    }

    pub async fn is_playing(&self) -> bool {
        self.state.read().await.playing
    }

    pub async fn speed(&self) -> f64 {
        self.state.read().await.speed
    }

    /// Double the playback speed, up to [`MAX_SPEED`].
    pub async fn speed_up(&self) {
        self.scale_speed(2.0).await;
    }

    /// Halve the playback speed, down to [`MIN_SPEED`].
    pub async fn slow_down(&self) {
        self.scale_speed(0.5).await;
    }

    async fn scale_speed(&self, factor: f64) {
        let (playing, speed) = {
            let mut state = self.state.write().await;
            state.speed = (state.speed * factor).clamp(MIN_SPEED, MAX_SPEED);
            (state.playing, state.speed)
        };
        log::debug!("Playback speed now {speed}");
        // Pick up the new cadence without losing the frame position.
        if playing {
            self.spawn_timer().await;
        }
    }

    /// Spawn the tick loop at the current speed, replacing any previous
    /// timer task.
    async fn spawn_timer(&self) {
        let delay = frame_delay(self.state.read().await.speed);
        let session = self.session.clone();
        let state = self.state.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(delay).await;
                if !state.read().await.playing {
                    break;
                }
                if !session.try_advance().await {
                    // End of the timeline.
                    state.write().await.playing = false;
                    log::info!("Playback reached the last frame, stopping");
                    break;
                }
            }
        });
        let mut timer = self.timer.lock().await;
        if let Some(old) = timer.replace(handle) {
            old.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use crate::view::NullPresenter;
    use tacgrid_core::MAX_FRAMES;

    fn scheduler() -> PlaybackScheduler {
        let session = ReplicationSession::new(SessionConfig::default(), Arc::new(NullPresenter));
        PlaybackScheduler::new(session)
    }

    #[test]
    fn test_frame_delay_math() {
        assert_eq!(frame_delay(1.0).as_millis(), 33);
        assert_eq!(frame_delay(2.0).as_millis(), 16);
        assert_eq!(frame_delay(0.25).as_millis(), 133);
        assert_eq!(frame_delay(8.0).as_millis(), 4);
    }

    #[tokio::test]
    async fn test_speed_clamps_at_both_ends() {
        let playback = scheduler();
        assert_eq!(playback.speed().await, 1.0);

        for _ in 0..6 {
            playback.speed_up().await;
        }
        assert_eq!(playback.speed().await, MAX_SPEED);

        for _ in 0..10 {
            playback.slow_down().await;
        }
        assert_eq!(playback.speed().await, MIN_SPEED);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let playback = scheduler();
        playback.stop().await;
        playback.stop().await;
        assert!(!playback.is_playing().await);
    }

    #[tokio::test]
    async fn test_playback_advances_frames() {
        let playback = scheduler();
        playback.start().await;
        assert!(playback.is_playing().await);

        tokio::time::sleep(Duration::from_millis(120)).await;
        playback.stop().await;

        let current = playback.session.current_frame().await;
        assert!(current > 1, "expected advance past frame 1, at {current}");
        // Stopping holds position.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(playback.session.current_frame().await, current);
    }

    #[tokio::test]
    async fn test_start_twice_is_single_timer() {
        let playback = scheduler();
        playback.start().await;
        playback.start().await;
        assert!(playback.is_playing().await);
        playback.stop().await;
    }

    #[tokio::test]
    async fn test_playback_stops_at_last_frame() {
        let playback = scheduler();
        playback.session.go_to_frame(MAX_FRAMES - 3).await;
        for _ in 0..3 {
            playback.speed_up().await;
        }
        playback.start().await;

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(!playback.is_playing().await);
        assert_eq!(playback.session.current_frame().await, MAX_FRAMES);
    }

    #[tokio::test]
    async fn test_speed_change_while_playing_keeps_position_and_state() {
        let playback = scheduler();
        playback.session.go_to_frame(10).await;
        playback.start().await;

        playback.speed_up().await;
        assert!(playback.is_playing().await);
        assert!(playback.session.current_frame().await >= 10);

        playback.stop().await;
    }
}
