use serde::{Deserialize, Serialize};

/// Upload progress of one file kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindProgress {
    /// 0..=100
    pub percent: u8,
    pub uploaded: bool,
}

impl KindProgress {
    /// Percentage of `sent` out of `total`, floored and clamped to 0..=100.
    /// An empty body counts as fully sent.
    pub fn percent_of(sent: u64, total: u64) -> u8 {
        if total == 0 {
            return 100;
        }
        ((sent.min(total) as u128 * 100) / total as u128) as u8
    }

    /// Apply a new reading, never moving backwards.
    pub fn advance(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        if percent > self.percent {
            self.percent = percent;
            true
        } else {
            false
        }
    }

    pub fn complete(&mut self) {
        self.percent = 100;
        self.uploaded = true;
    }

    pub fn reset(&mut self) {
        *self = KindProgress::default();
    }
}
