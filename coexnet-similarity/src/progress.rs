//! Progress reporting for a similarity run.

/// Callback invoked with the new integer percentage.
pub type ProgressFn<'a> = Box<dyn FnMut(u8) + Send + 'a>;

/// Tracks committed pairs and reports `completed / total × 100` whenever
/// the integer percentage changes.
pub struct Progress<'a> {
    total: u64,
    completed: u64,
    percent: u8,
    callback: Option<ProgressFn<'a>>,
}

impl<'a> Progress<'a> {
    pub fn new(total: u64, callback: Option<ProgressFn<'a>>) -> Self {
        Self {
            total,
            completed: 0,
            percent: 0,
            callback,
        }
    }

    /// Record `pairs` more completed pairs.
    pub fn advance(&mut self, pairs: u64) {
        self.completed = (self.completed + pairs).min(self.total);
        let percent = if self.total == 0 {
            100
        } else {
            (self.completed * 100 / self.total) as u8
        };
        if percent != self.percent {
            self.percent = percent;
            if let Some(callback) = self.callback.as_mut() {
                callback(percent);
            }
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Last reported percentage.
    pub fn percent(&self) -> u8 {
        self.percent
    }
}

impl std::fmt::Debug for Progress<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("total", &self.total)
            .field("completed", &self.completed)
            .field("percent", &self.percent)
            .finish()
    }
}
