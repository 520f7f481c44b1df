//! Line classifier for workload output.
//!
//! The marker tables come from configuration so the fuzzy matching of child
//! output lives in exactly one place. Priority is success, then noise, then
//! error: a completion line that also embeds driver text is still a success.

use genbench_common::config::ClassifierConfig;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputClassification {
    pub progress_rate: Option<f64>,
    pub is_success_marker: bool,
    pub is_noise: bool,
    /// The line as written, minus its terminator, for non-empty lines that are
    /// neither success nor noise.
    pub error_text: Option<String>,
}

impl OutputClassification {
    pub fn is_heartbeat(&self) -> bool { *self == Self::default() }
}

#[derive(Debug, Clone)]
pub struct OutputClassifier {
    success_markers: Vec<String>,
    noise_markers: Vec<String>,
    rate_unit: String,
}

impl OutputClassifier {
    pub fn new(cfg: &ClassifierConfig) -> Self {
        Self {
            success_markers: cfg.success_markers.clone(),
            noise_markers: cfg.noise_markers.clone(),
            rate_unit: cfg.rate_unit.clone(),
        }
    }

    pub fn classify(&self, line: &str) -> OutputClassification {
        let line = line.trim_end_matches(['\n', '\r']);
        let text = line.trim();
        if text.is_empty() {
            return OutputClassification::default();
        }
        let progress_rate = self.parse_rate(text);
        if self.success_markers.iter().any(|m| text.contains(m.as_str())) {
            return OutputClassification { progress_rate, is_success_marker: true, ..Default::default() };
        }
        let is_noise = self.is_noise(text);
        OutputClassification {
            progress_rate,
            is_success_marker: false,
            is_noise,
            error_text: (!is_noise).then(|| line.to_string()),
        }
    }

    pub fn is_noise(&self, line: &str) -> bool { self.noise_markers.iter().any(|m| line.contains(m.as_str())) }

    /// Number written directly before the rate unit, e.g. `1.37` in `[00:41<01:10, 1.37it/s]`.
    /// Malformed numbers yield `None`.
    pub fn parse_rate(&self, line: &str) -> Option<f64> {
        if self.rate_unit.is_empty() {
            return None;
        }
        let (before, _) = line.split_once(self.rate_unit.as_str())?;
        let token = before.split_whitespace().last()?;
        let token = token.trim_start_matches(|c: char| !(c.is_ascii_digit() || c == '.'));
        token.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

impl Default for OutputClassifier {
    fn default() -> Self { Self::new(&ClassifierConfig::default()) }
}
