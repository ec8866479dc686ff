/// Class names, index-aligned with the model output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelList {
    labels: Vec<String>,
}

impl LabelList {
    /// Parse a newline-delimited label file. Lines are trimmed; blank lines are skipped.
    pub fn parse(raw: &str) -> Self {
        let labels = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { labels }
    }

    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Label at `index`, or `"unknown"` when the model has more outputs than labels.
    pub fn get(&self, index: usize) -> &str {
        self.labels.get(index).map(String::as_str).unwrap_or("unknown")
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }
}
