//! Scripted stand-ins for remote endpoints, shared by unit tests.

use std::collections::VecDeque;

use async_trait::async_trait;

use super::shell::ShellChannel;

/// Output queued by a reaction; `None` closes the channel.
type Chunk = Option<Vec<u8>>;

struct Reaction {
    trigger: String,
    chunks: Vec<Chunk>,
    repeat: bool,
}

/// Shell that answers what is sent to it and is silent otherwise.
///
/// A send fires the first reaction whose trigger is a prefix of the sent
/// text. One-shot reactions are consumed; repeating ones stay. While nothing
/// is queued, `recv` never resolves, so only timeouts move the driver on.
#[derive(Default)]
pub(crate) struct ScriptedShell {
    reactions: Vec<Reaction>,
    pending: VecDeque<Chunk>,
    eof: bool,
    pub sent: Vec<String>,
    pub closed: usize,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output already waiting before anything is sent.
    pub fn banner(mut self, text: &str) -> Self {
        self.pending.push_back(Some(text.as_bytes().to_vec()));
        self
    }

    pub fn on_send(self, trigger: &str, outputs: &[&str]) -> Self {
        self.react(trigger, outputs, false, false)
    }

    pub fn on_every_send(self, trigger: &str, outputs: &[&str]) -> Self {
        self.react(trigger, outputs, true, false)
    }

    /// Emit `outputs`, then report the channel closed.
    pub fn on_send_then_close(self, trigger: &str, outputs: &[&str]) -> Self {
        self.react(trigger, outputs, false, true)
    }

    fn react(mut self, trigger: &str, outputs: &[&str], repeat: bool, close: bool) -> Self {
        let mut chunks: Vec<Chunk> = outputs
            .iter()
            .map(|text| Some(text.as_bytes().to_vec()))
            .collect();
        if close {
            chunks.push(None);
        }
        self.reactions.push(Reaction {
            trigger: trigger.to_string(),
            chunks,
            repeat,
        });
        self
    }

    pub fn sent_count(&self, text: &str) -> usize {
        self.sent.iter().filter(|s| s.as_str() == text).count()
    }
}

#[async_trait]
impl ShellChannel for ScriptedShell {
    async fn send(&mut self, data: &[u8]) -> Result<(), String> {
        if self.eof {
            return Err("channel closed".to_string());
        }
        let text = String::from_utf8_lossy(data).into_owned();
        if let Some(index) = self
            .reactions
            .iter()
            .position(|r| text.starts_with(&r.trigger))
        {
            let chunks = if self.reactions[index].repeat {
                self.reactions[index].chunks.clone()
            } else {
                self.reactions.remove(index).chunks
            };
            self.pending.extend(chunks);
        }
        self.sent.push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>, String>> {
        if self.eof {
            return None;
        }
        match self.pending.pop_front() {
            Some(Some(chunk)) => Some(Ok(chunk)),
            Some(None) => {
                self.eof = true;
                None
            }
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.closed += 1;
    }
}
