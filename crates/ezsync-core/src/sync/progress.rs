/// Transfer progress against a total fixed before the first download.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncProgress {
    total_files: u64,
    processed_files: u64,
    current_operation: String,
}

impl SyncProgress {
    pub fn new(total_files: u64) -> Self {
        Self {
            total_files,
            processed_files: 0,
            current_operation: String::new(),
        }
    }

    pub fn total_files(&self) -> u64 {
        self.total_files
    }

    pub fn processed_files(&self) -> u64 {
        self.processed_files
    }

    pub fn current_operation(&self) -> &str {
        &self.current_operation
    }

    pub fn is_complete(&self) -> bool {
        self.processed_files >= self.total_files
    }

    pub fn set_operation(&mut self, operation: impl Into<String>) {
        self.current_operation = operation.into();
    }

    /// Count one processed file. Refuses to move past the total.
    pub fn advance(&mut self) -> bool {
        if self.is_complete() {
            return false;
        }
        self.processed_files += 1;
        true
    }

    /// `processed / total * 100`, clamped to `[0, 100]`.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn percent(&self) -> f64 {
        if self.total_files == 0 {
            return 100.0;
        }
        (self.processed_files as f64 / self.total_files as f64 * 100.0).clamp(0.0, 100.0)
    }
}
