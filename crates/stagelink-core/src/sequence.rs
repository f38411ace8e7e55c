//! Per-output sequence counters

/// How a counter wraps after 255
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapRule {
    /// 1, 2, ..., 255, 1, ... (0 means "sequencing disabled" to Art-Net receivers)
    ArtNet,
    /// 0, 1, ..., 255, 0, ...
    Sacn,
    /// PSN frame id, 0..=255
    PsnFrame,
}

impl WrapRule {
    fn first(self) -> u8 {
        match self {
            WrapRule::ArtNet => 1,
            WrapRule::Sacn | WrapRule::PsnFrame => 0,
        }
    }
}

/// Monotonic 8-bit counter embedded in outbound packets
#[derive(Debug, Clone)]
pub struct SequenceCounter {
    rule: WrapRule,
    next: u8,
}

impl SequenceCounter {
    pub fn new(rule: WrapRule) -> Self {
        Self {
            rule,
            next: rule.first(),
        }
    }

    pub fn rule(&self) -> WrapRule {
        self.rule
    }

    /// Value the next call to [`SequenceCounter::advance`] will return
    pub fn peek(&self) -> u8 {
        self.next
    }

    /// Take the current value and step the counter
    pub fn advance(&mut self) -> u8 {
        let current = self.next;
        self.next = match (self.rule, current) {
            (WrapRule::ArtNet, 255) => 1,
            _ => current.wrapping_add(1),
        };
        current
    }

    pub fn reset(&mut self) {
        self.next = self.rule.first();
    }
}
