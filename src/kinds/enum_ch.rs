//! Enum — a named-label view over an integer value, either
//! mirroring a source channel or writable directly (e.g. from the wire
//! protocol's set-value command).

use heapless::{String, Vec};

pub const MAX_LABELS: usize = 16;
pub const MAX_LABEL_LEN: usize = 15;

#[derive(Debug, Clone)]
pub struct EnumLabel {
    pub value: i32,
    pub label: String<MAX_LABEL_LEN>,
}

#[derive(Debug, Clone)]
pub struct EnumCfg {
    pub source_id: u16,
    pub writable: bool,
    pub labels: Vec<EnumLabel, MAX_LABELS>,

    // --- state ---
    pub value: i32,
}

impl EnumCfg {
    pub fn new(writable: bool) -> Self {
        Self {
            source_id: crate::channel::ID_NONE,
            writable,
            labels: Vec::new(),
            value: 0,
        }
    }

    /// Mirrors `source` unless this channel is `writable` and has been
    /// set directly (`source_id` is then `ID_NONE`: a writable Enum has
    /// no upstream source).
    pub fn eval(&mut self, source: Option<i32>) -> i32 {
        if let Some(v) = source {
            self.value = v;
        }
        self.value
    }

    /// Applied by a set-value command; rejected (returns
    /// `false`) for a non-writable or wired Enum.
    pub fn write(&mut self, v: i32) -> bool {
        if !self.writable || self.source_id != crate::channel::ID_NONE {
            return false;
        }
        self.value = v;
        true
    }

    pub fn label_for(&self, value: i32) -> Option<&str> {
        self.labels.iter().find(|l| l.value == value).map(|l| l.label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrors_source_when_wired() {
        let mut cfg = EnumCfg::new(false);
        assert_eq!(cfg.eval(Some(3)), 3);
        assert_eq!(cfg.eval(Some(5)), 5);
    }

    #[test]
    fn writable_rejects_write_when_wired() {
        let mut cfg = EnumCfg::new(true);
        cfg.source_id = 42;
        assert!(!cfg.write(7));
    }

    #[test]
    fn writable_accepts_write_when_unwired() {
        let mut cfg = EnumCfg::new(true);
        assert!(cfg.write(2));
        assert_eq!(cfg.eval(None), 2);
    }

    #[test]
    fn label_lookup() {
        let mut cfg = EnumCfg::new(false);
        cfg.labels
            .push(EnumLabel { value: 1, label: String::try_from("ON").unwrap() })
            .unwrap();
        assert_eq!(cfg.label_for(1), Some("ON"));
        assert_eq!(cfg.label_for(2), None);
    }
}
