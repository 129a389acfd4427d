use serde::{Deserialize, Serialize};

/// What the user asked the session to do while a track plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    Previous,
    Next,
    Restart,
    Exit,
    Unrecognized,
}

/// Control tokens, one per transport action. Matching is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Controls {
    pub previous: String,
    pub next: String,
    pub restart: String,
    pub exit: String,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            previous: "p".to_string(),
            next: "n".to_string(),
            restart: "b".to_string(),
            exit: "x".to_string(),
        }
    }
}

impl Controls {
    /// Bindings in priority order.
    pub fn bindings(&self) -> [(&'static str, &str); 4] {
        [
            ("previous", self.previous.as_str()),
            ("next", self.next.as_str()),
            ("restart", self.restart.as_str()),
            ("exit", self.exit.as_str()),
        ]
    }

    /// Decode a raw input token. A token matches a binding when it contains
    /// the binding; previous beats next beats restart beats exit.
    pub fn interpret(&self, raw: &str) -> TransportCommand {
        let token = raw.to_lowercase();
        let hit = |key: &str| !key.is_empty() && token.contains(&key.to_lowercase());

        if hit(&self.previous) {
            TransportCommand::Previous
        } else if hit(&self.next) {
            TransportCommand::Next
        } else if hit(&self.restart) {
            TransportCommand::Restart
        } else if hit(&self.exit) {
            TransportCommand::Exit
        } else {
            TransportCommand::Unrecognized
        }
    }

    /// First pair of bindings where one token would also trigger the other.
    pub fn first_overlap(&self) -> Option<(String, String)> {
        let keys = self.bindings();
        for (i, (_, a)) in keys.iter().enumerate() {
            for (_, b) in keys.iter().skip(i + 1) {
                let (a, b) = (a.to_lowercase(), b.to_lowercase());
                if !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a)) {
                    return Some((a, b));
                }
            }
        }
        None
    }
}
