//! Per-user digest of inactive channels.
//!
//! Building and rendering are pure, so the whole report can be checked
//! without touching Slack.

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::activity::{ClassifiedChannel, Thresholds};

/// Report wording. Placeholders: `{user}` in the greeting; `{emoji}`,
/// `{days}` (threshold day count) and `{label}` (`"<days>+"`) in the tier
/// header; `{date}` and `{time}` in the footer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportTemplate {
    pub greeting: String,
    pub tier_header: String,
    pub footer: String,
    /// chrono format string for `{date}`.
    pub date_format: String,
    /// chrono format string for `{time}`.
    pub time_format: String,
}

impl Default for ReportTemplate {
    fn default() -> Self {
        Self {
            greeting: "Hi {user}! Here is your Slack room activity report:".to_string(),
            tier_header: "{emoji} Inactive for {days}+ days:".to_string(),
            footer: "Report generated on {date} - {time}.".to_string(),
            date_format: "%d/%m/%Y".to_string(),
            time_format: "%H:%M:%S".to_string(),
        }
    }
}

/// Channels of one tier.
#[derive(Debug, Clone, PartialEq)]
pub struct TierSection {
    pub emoji: String,
    pub days: u32,
    pub label: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub user_name: String,
    /// Non-empty tiers, most inactive first.
    pub sections: Vec<TierSection>,
    pub generated_at: DateTime<Tz>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.sections.iter().map(|s| s.lines.len()).sum()
    }

    pub fn render(&self, template: &ReportTemplate) -> String {
        let mut text = template.greeting.replace("{user}", &self.user_name);
        text.push_str("\n\n");

        for section in &self.sections {
            let header = template
                .tier_header
                .replace("{emoji}", &section.emoji)
                .replace("{days}", &section.days.to_string())
                .replace("{label}", &section.label);
            text.push_str(&header);
            text.push_str("\n\t");
            text.push_str(&section.lines.join("\n\t"));
            text.push_str("\n\n");
        }
        text.push('\n');

        let date = self.generated_at.format(&template.date_format).to_string();
        let time = self.generated_at.format(&template.time_format).to_string();
        text.push_str(&template.footer.replace("{date}", &date).replace("{time}", &time));
        text
    }
}

/// Group classified channels by tier, in threshold order.
///
/// Unclassified channels and empty tiers are left out. Within a tier,
/// channels keep their input order.
pub fn build_report(
    user_name: &str,
    classified: &[ClassifiedChannel],
    thresholds: &Thresholds,
    generated_at: DateTime<Tz>,
) -> Report {
    let sections = thresholds
        .iter()
        .filter_map(|threshold| {
            let lines: Vec<String> = classified
                .iter()
                .filter(|c| c.tier == Some(threshold.days))
                .map(|c| c.line.clone())
                .collect();
            (!lines.is_empty()).then(|| TierSection {
                emoji: threshold.emoji.clone(),
                days: threshold.days,
                label: threshold.label(),
                lines,
            })
        })
        .collect();

    Report { user_name: user_name.to_string(), sections, generated_at }
}
