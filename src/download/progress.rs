//! Download progress snapshots

/// Bytes read so far for one download session.
///
/// `fraction` is `None` when the server did not declare a length; it is never
/// computed by dividing by an unknown or zero total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub bytes_read: u64,
    pub total_bytes: Option<u64>,
    pub fraction: Option<f64>,
}

impl DownloadProgress {
    pub fn new(bytes_read: u64, total_bytes: Option<u64>) -> Self {
        let fraction = match total_bytes {
            None => None,
            Some(0) => Some(1.0),
            Some(total) => Some((bytes_read as f64 / total as f64).clamp(0.0, 1.0)),
        };
        Self {
            bytes_read,
            total_bytes,
            fraction,
        }
    }

    /// Session start.
    pub fn start(total_bytes: Option<u64>) -> Self {
        Self::new(0, total_bytes)
    }

    /// Declared length with `-1` standing for "unknown".
    pub fn total_bytes_or_unknown(&self) -> i64 {
        self.total_bytes
            .and_then(|t| i64::try_from(t).ok())
            .unwrap_or(-1)
    }

    pub fn is_indeterminate(&self) -> bool {
        self.fraction.is_none()
    }

    /// Whole percent for display, `None` when indeterminate.
    pub fn percent(&self) -> Option<u8> {
        self.fraction.map(|f| (f * 100.0).floor() as u8)
    }

    /// Human-readable line, e.g. `12.5 MB / 40.0 MB (31%)`.
    pub fn describe(&self) -> String {
        let mb_read = self.bytes_read as f64 / 1_048_576.0;
        match (self.total_bytes, self.percent()) {
            (Some(total), Some(percent)) => format!(
                "{:.1} MB / {:.1} MB ({}%)",
                mb_read,
                total as f64 / 1_048_576.0,
                percent
            ),
            _ => format!("{mb_read:.1} MB"),
        }
    }
}
