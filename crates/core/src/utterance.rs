use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Text-to-speech output.
#[async_trait]
pub trait SynthesisEngine: Send + Sync + 'static {
    /// Speaks `text` and resolves once playback has finished. Dropping the
    /// future must stop playback.
    async fn speak(&self, text: String) -> Result<()>;
}

/// Speaks model replies one at a time. A new utterance always replaces the
/// current one, and playback can be interrupted at any moment.
pub struct UtterancePlayer {
    engine: Arc<dyn SynthesisEngine>,
    // Id of the utterance being played, if any.
    playing: Arc<watch::Sender<Option<u64>>>,
    next_id: u64,
    current: Option<JoinHandle<()>>,
}

impl UtterancePlayer {
    pub fn new(engine: Arc<dyn SynthesisEngine>) -> Self {
        let (playing, _) = watch::channel(None);
        Self {
            engine,
            playing: Arc::new(playing),
            next_id: 0,
            current: None,
        }
    }

    /// Starts speaking `text` in the background, cutting off anything still
    /// playing. Returns immediately.
    pub fn speak(&mut self, text: &str) {
        self.cancel();
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        self.next_id += 1;
        let id = self.next_id;
        self.playing.send_replace(Some(id));

        let engine = Arc::clone(&self.engine);
        let playing = Arc::clone(&self.playing);
        let text = text.to_string();
        self.current = Some(tokio::spawn(async move {
            if let Err(e) = engine.speak(text).await {
                tracing::warn!(utterance = id, "speech playback failed: {:#}", e);
            }
            playing.send_if_modified(|current| {
                if *current == Some(id) {
                    *current = None;
                    true
                } else {
                    false
                }
            });
        }));
    }

    /// Stops playback immediately. Safe to call at any time.
    pub fn cancel(&mut self) {
        if let Some(task) = self.current.take() {
            task.abort();
        }
        self.playing.send_if_modified(|current| current.take().is_some());
    }

    pub fn is_speaking(&self) -> bool {
        self.playing.borrow().is_some()
    }

    /// Notified whenever playback starts or stops.
    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.playing.subscribe()
    }
}

impl Drop for UtterancePlayer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Counters {
        started: Vec<String>,
        completed: usize,
        active: usize,
        max_active: usize,
    }

    // Plays for a fixed time. Counts overlapping playbacks.
    struct TimedEngine {
        duration: Duration,
        fail: bool,
        counters: Arc<Mutex<Counters>>,
    }

    struct ActiveGuard(Arc<Mutex<Counters>>);

    impl Drop for ActiveGuard {
        fn drop(&mut self) {
            self.0.lock().unwrap().active -= 1;
        }
    }

    #[async_trait]
    impl SynthesisEngine for TimedEngine {
        async fn speak(&self, text: String) -> Result<()> {
            {
                let mut counters = self.counters.lock().unwrap();
                counters.started.push(text);
                counters.active += 1;
                counters.max_active = counters.max_active.max(counters.active);
            }
            let _guard = ActiveGuard(Arc::clone(&self.counters));
            tokio::time::sleep(self.duration).await;
            if self.fail {
                anyhow::bail!("audio device lost");
            }
            self.counters.lock().unwrap().completed += 1;
            Ok(())
        }
    }

    fn player(fail: bool) -> (UtterancePlayer, Arc<Mutex<Counters>>) {
        let counters = Arc::new(Mutex::new(Counters::default()));
        let engine = TimedEngine {
            duration: Duration::from_secs(2),
            fail,
            counters: Arc::clone(&counters),
        };
        (UtterancePlayer::new(Arc::new(engine)), counters)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn speaking_flag_follows_playback() {
        let (mut player, counters) = player(false);

        player.speak("Tell me about yourself.");
        assert!(player.is_speaking());
        settle().await;

        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;

        assert!(!player.is_speaking());
        assert_eq!(counters.lock().unwrap().completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_new_utterance_replaces_the_current_one() {
        let (mut player, counters) = player(false);

        player.speak("first");
        settle().await;
        player.speak("second");
        settle().await;
        assert!(player.is_speaking());

        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;

        let counters = counters.lock().unwrap();
        assert_eq!(counters.started, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(counters.max_active, 1);
        assert_eq!(counters.completed, 1);
        assert!(!player.is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn playback_errors_clear_the_flag() {
        let (mut player, _counters) = player(true);

        player.speak("hello");
        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;

        assert!(!player.is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let (mut player, counters) = player(false);
        player.cancel();

        player.speak("hello");
        settle().await;
        player.cancel();
        player.cancel();
        assert!(!player.is_speaking());

        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(counters.lock().unwrap().completed, 0);
        assert_eq!(counters.lock().unwrap().active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_text_is_not_spoken() {
        let (mut player, counters) = player(false);
        player.speak("   ");
        settle().await;
        assert!(!player.is_speaking());
        assert!(counters.lock().unwrap().started.is_empty());
    }
}
