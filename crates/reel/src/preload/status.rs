use std::fmt;

/// Lifecycle of one preload entry.
///
/// Only `Loading` and `Completed` entries are tracked; `Failed` and
/// `Cancelled` describe how a retired entry ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PreloadStatus {
    #[default]
    NotStarted,
    Loading,
    Completed,
    Failed,
    Cancelled,
}

impl PreloadStatus {
    /// Whether a new `preload_video` call should leave the entry alone.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Loading | Self::Completed)
    }
}

impl fmt::Display for PreloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not-started",
            Self::Loading => "loading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// How urgently a feed item should be warmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PreloadPriority {
    Low,
    Medium,
    High,
}

impl PreloadPriority {
    pub fn weight(&self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    /// Priority of the item `offset` positions after the current one.
    pub fn from_offset(offset: usize) -> Self {
        match offset {
            0 | 1 => Self::High,
            2 => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl fmt::Display for PreloadPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(name)
    }
}
