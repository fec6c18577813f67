use clinic_core::model::ActivityId;

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionProgress {
    pub total: usize,
    pub evaluated: usize,
    pub remaining: usize,
    pub percent: f64,
    pub is_complete: bool,
}

/// Progress of one activity inside a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityProgress {
    pub activity_id: ActivityId,
    pub name: String,
    pub required: usize,
    pub evaluated: usize,
    pub is_complete: bool,
}
