//! # Phase Handler
//!
//! Turns the stream of small console writes of one run into a few
//! `agent_output` events, tagged with the phase that is currently running.
//!
//! Writes come from the run thread (through the console router) while phase
//! changes come from the task callback, possibly on another thread; both go
//! through one mutex so a flush is never split.

use regex::Regex;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;

use super::events::{keep_tail, PipelineEvent};
use crate::config::StreamSettings;
use crate::console::OutputSink;

/// Box-drawing glyphs replaced before buffering
const GLYPHS: [(char, &str); 6] = [
    ('╭', "+"),
    ('╰', "+"),
    ('╮', "+"),
    ('╯', "+"),
    ('─', "-"),
    ('│', "|"),
];

/// Flush thresholds and event sizing
#[derive(Debug, Clone, Copy)]
pub struct FlushPolicy {
    pub interval: Duration,
    pub fragments: usize,
    pub ceiling_chars: usize,
    pub tail_chars: usize,
}

impl From<&StreamSettings> for FlushPolicy {
    fn from(s: &StreamSettings) -> Self {
        Self {
            interval: s.flush_interval(),
            fragments: s.flush_fragments.max(1),
            ceiling_chars: s.buffer_ceiling_chars.max(1),
            tail_chars: s.output_tail_chars,
        }
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::from(&StreamSettings::default())
    }
}

struct State {
    phase_index: usize,
    chunks: Vec<String>,
    buffered_chars: usize,
    last_flush: Instant,
}

/// Per-run output buffer
pub struct PhaseHandler {
    queue: UnboundedSender<PipelineEvent>,
    policy: FlushPolicy,
    state: Mutex<State>,
}

impl PhaseHandler {
    pub fn new(queue: UnboundedSender<PipelineEvent>, policy: FlushPolicy) -> Self {
        Self {
            queue,
            policy,
            state: Mutex::new(State {
                phase_index: 0,
                chunks: Vec::new(),
                buffered_chars: 0,
                last_flush: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Buffer one write, flushing when a threshold is reached
    pub fn process(&self, text: &str) {
        let cleaned = clean(text);
        if cleaned.trim().is_empty() {
            return;
        }

        let mut state = self.lock();
        state.buffered_chars += cleaned.chars().count();
        state.chunks.push(cleaned);

        let due = state.last_flush.elapsed() > self.policy.interval
            || state.chunks.len() >= self.policy.fragments
            || state.buffered_chars >= self.policy.ceiling_chars;
        if due {
            self.flush_locked(&mut state);
        }
    }

    /// Emit whatever is buffered; no-op when empty
    pub fn flush(&self) {
        let mut state = self.lock();
        self.flush_locked(&mut state);
    }

    /// Flush under the previous index, then switch phase
    pub fn set_phase(&self, index: usize) {
        let mut state = self.lock();
        self.flush_locked(&mut state);
        state.phase_index = index;
    }

    pub fn phase_index(&self) -> usize {
        self.lock().phase_index
    }

    fn flush_locked(&self, state: &mut State) {
        if state.chunks.is_empty() {
            return;
        }

        let combined = state.chunks.concat();
        state.chunks.clear();
        state.buffered_chars = 0;
        state.last_flush = Instant::now();

        // A closed queue means nobody is listening any more
        let _ = self.queue.send(PipelineEvent::AgentOutput {
            phase_index: state.phase_index,
            text: keep_tail(&combined, self.policy.tail_chars).to_string(),
        });
    }
}

impl OutputSink for PhaseHandler {
    fn process(&self, text: &str) {
        PhaseHandler::process(self, text);
    }

    fn flush_remaining(&self) {
        self.flush();
    }
}

/// Strip ANSI color codes and replace box glyphs
fn clean(text: &str) -> String {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();

    let stripped = match ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").ok()) {
        Some(re) => re.replace_all(text, ""),
        None => text.into(),
    };

    if !stripped.contains(|c: char| GLYPHS.iter().any(|(g, _)| *g == c)) {
        return stripped.into_owned();
    }

    let mut out = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        match GLYPHS.iter().find(|(g, _)| *g == c) {
            Some((_, replacement)) => out.push_str(replacement),
            None => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn handler(policy: FlushPolicy) -> (PhaseHandler, UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = unbounded_channel();
        (PhaseHandler::new(tx, policy), rx)
    }

    /// Flushes only when asked
    fn manual() -> FlushPolicy {
        FlushPolicy {
            interval: Duration::from_secs(3600),
            fragments: usize::MAX,
            ceiling_chars: usize::MAX,
            tail_chars: 4000,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<PipelineEvent>) -> Vec<(usize, String)> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                PipelineEvent::AgentOutput { phase_index, text } => out.push((phase_index, text)),
                other => panic!("unexpected {:?}", other),
            }
        }
        out
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean("\x1b[1;32mok\x1b[0m"), "ok");
        assert_eq!(clean("╭─ Agent ─╮"), "+- Agent -+");
        assert_eq!(clean("│ x │"), "| x |");
        assert_eq!(clean("plain"), "plain");
    }

    #[test]
    fn test_flushes_after_fragment_count() {
        let (h, mut rx) = handler(FlushPolicy {
            fragments: 4,
            ..manual()
        });

        for word in ["a", "b", "c"] {
            h.process(word);
        }
        assert!(drain(&mut rx).is_empty());

        h.process("d");
        assert_eq!(drain(&mut rx), vec![(0, "abcd".to_string())]);
    }

    #[test]
    fn test_flushes_after_interval() {
        let (h, mut rx) = handler(FlushPolicy {
            interval: Duration::ZERO,
            ..manual()
        });

        std::thread::sleep(Duration::from_millis(2));
        h.process("tick");
        assert_eq!(drain(&mut rx), vec![(0, "tick".to_string())]);
    }

    #[test]
    fn test_buffer_ceiling_forces_flush() {
        let (h, mut rx) = handler(FlushPolicy {
            ceiling_chars: 10,
            ..manual()
        });

        h.process("12345");
        assert!(drain(&mut rx).is_empty());
        h.process("67890");
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_blank_writes_are_dropped() {
        let (h, mut rx) = handler(manual());

        h.process("\n");
        h.process("   ");
        h.process("\x1b[0m");
        h.flush();
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_emitted_text_preserves_written_text() {
        let (h, mut rx) = handler(FlushPolicy {
            fragments: 3,
            ..manual()
        });

        let writes = ["Thinking", " ", "about", "\n", " the ", "\x1b[2mplan\x1b[0m", "!", "\n\n", "done"];
        for w in writes {
            h.process(w);
        }
        h.flush();

        let emitted: String = drain(&mut rx).into_iter().map(|(_, t)| t).collect();
        assert_eq!(emitted, "Thinkingabout the plan!done");
    }

    #[test]
    fn test_double_flush_emits_once() {
        let (h, mut rx) = handler(manual());

        h.process("x");
        h.flush();
        h.flush();
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_set_phase_flushes_with_previous_index() {
        let (h, mut rx) = handler(manual());

        h.process("spec text");
        h.set_phase(1);
        h.process("code text");
        h.flush();

        assert_eq!(
            drain(&mut rx),
            vec![(0, "spec text".to_string()), (1, "code text".to_string())]
        );
        assert_eq!(h.phase_index(), 1);
    }

    #[test]
    fn test_output_keeps_tail() {
        let (h, mut rx) = handler(FlushPolicy {
            tail_chars: 5,
            ..manual()
        });

        h.process("0123456789");
        h.flush();
        assert_eq!(drain(&mut rx), vec![(0, "56789".to_string())]);
    }

    #[test]
    fn test_closed_queue_is_ignored() {
        let (h, rx) = handler(manual());
        drop(rx);

        h.process("nobody listens");
        h.flush();
    }

    #[test]
    fn test_cross_thread_phase_changes() {
        let (h, mut rx) = handler(FlushPolicy {
            fragments: 2,
            ..manual()
        });
        let h = Arc::new(h);

        let writer = {
            let h = h.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    h.process("w");
                }
            })
        };
        for phase in 1..=50 {
            h.set_phase(phase);
        }
        writer.join().unwrap();
        h.flush();

        let events = drain(&mut rx);
        let total: usize = events.iter().map(|(_, t)| t.len()).sum();
        assert_eq!(total, 500);
        assert!(events.windows(2).all(|w| w[0].0 <= w[1].0));
    }
}
