//! Notification analytics.
//!
//! `track_event` appends one immutable event to a local JSONL log (best
//! effort, never surfaces an error to the caller). All derived metrics are
//! recomputed from the full event log on every read, so two reads over an
//! unchanged log are identical.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Analytics event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Sent,
    Read,
    Viewed,
    Clicked,
    Dismissed,
}

/// One immutable analytics event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub ts: DateTime<Utc>,
    pub notification_id: String,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Per-day sent/viewed/clicked counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    pub sent: u64,
    pub viewed: u64,
    pub clicked: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateUsage {
    pub template_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub count: u64,
}

/// Derived metrics, recomputed from the event log on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMetrics {
    pub total_sent: u64,
    pub total_viewed: u64,
    pub total_clicked: u64,
    /// viewed / sent x 100 (0 when nothing was sent)
    pub read_rate: f64,
    /// clicked / sent x 100 (0 when nothing was sent)
    pub click_through_rate: f64,
    /// (viewed + clicked) / (2 x sent) x 100 (0 when nothing was sent)
    pub engagement_rate: f64,
    /// Last 7 calendar days, oldest first.
    pub daily: Vec<DailyMetrics>,
    pub top_categories: Vec<CategoryCount>,
    pub top_templates: Vec<TemplateUsage>,
}

/// Append-only event log plus metric recomputation.
pub struct AnalyticsAggregator {
    path: PathBuf,
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl AnalyticsAggregator {
    /// Empty aggregator (does not read disk).
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Load past events from the JSONL log; a missing file is an empty log.
    pub fn load(path: PathBuf) -> Self {
        let mut events = Vec::new();
        if path.exists() {
            match File::open(&path) {
                Ok(file) => {
                    let reader = BufReader::new(file);
                    events = reader
                        .lines()
                        .filter_map(|line| line.ok())
                        .filter_map(|line| serde_json::from_str(&line).ok())
                        .collect();
                }
                Err(e) => warn!(error = %e, path = %path.display(), "Failed to open event log"),
            }
        }
        Self {
            path,
            events: Mutex::new(events),
        }
    }

    /// Record one event. Best effort: a persistence failure is logged and
    /// swallowed, the in-memory log always grows.
    pub fn track_event(
        &self,
        notification_id: &str,
        kind: EventKind,
        template_id: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) {
        let event = AnalyticsEvent {
            ts: Utc::now(),
            notification_id: notification_id.to_string(),
            kind,
            template_id: template_id.map(|s| s.to_string()),
            metadata,
        };

        if let Err(e) = self.append_to_log(&event) {
            warn!(error = %e, "Failed to persist analytics event");
        }

        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    /// Snapshot of the raw event log.
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Recompute all metrics; template ids are left unnamed.
    pub fn metrics(&self) -> NotificationMetrics {
        self.metrics_with_names(&HashMap::new())
    }

    /// Recompute all metrics, joining template usage with display names.
    pub fn metrics_with_names(&self, names: &HashMap<String, String>) -> NotificationMetrics {
        let events = self.events();

        let mut total_sent = 0u64;
        let mut total_viewed = 0u64;
        let mut total_clicked = 0u64;

        let today = Utc::now().date_naive();
        let window_start = today - Duration::days(6);
        let mut daily: Vec<DailyMetrics> = (0..7)
            .map(|offset| DailyMetrics {
                date: window_start + Duration::days(offset),
                sent: 0,
                viewed: 0,
                clicked: 0,
            })
            .collect();

        let mut categories: HashMap<String, u64> = HashMap::new();
        let mut templates: HashMap<String, u64> = HashMap::new();

        for event in &events {
            match event.kind {
                EventKind::Sent => total_sent += 1,
                EventKind::Viewed => total_viewed += 1,
                EventKind::Clicked => total_clicked += 1,
                EventKind::Read | EventKind::Dismissed => {}
            }

            let date = event.ts.date_naive();
            if date >= window_start && date <= today {
                let bucket = &mut daily[(date - window_start).num_days() as usize];
                match event.kind {
                    EventKind::Sent => bucket.sent += 1,
                    EventKind::Viewed => bucket.viewed += 1,
                    EventKind::Clicked => bucket.clicked += 1,
                    _ => {}
                }
            }

            if event.kind == EventKind::Sent {
                if let Some(category) = event
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("category"))
                    .and_then(|v| v.as_str())
                {
                    *categories.entry(category.to_string()).or_insert(0) += 1;
                }
                if let Some(template_id) = &event.template_id {
                    *templates.entry(template_id.clone()).or_insert(0) += 1;
                }
            }
        }

        let mut top_categories: Vec<CategoryCount> = categories
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect();
        // 次数降序，同次数按名称升序，保证输出确定性
        top_categories.sort_by(|a, b| b.count.cmp(&a.count).then(a.category.cmp(&b.category)));

        let mut top_templates: Vec<TemplateUsage> = templates
            .into_iter()
            .map(|(template_id, count)| TemplateUsage {
                name: names.get(&template_id).cloned(),
                template_id,
                count,
            })
            .collect();
        top_templates.sort_by(|a, b| b.count.cmp(&a.count).then(a.template_id.cmp(&b.template_id)));

        NotificationMetrics {
            total_sent,
            total_viewed,
            total_clicked,
            read_rate: rate(total_viewed, total_sent),
            click_through_rate: rate(total_clicked, total_sent),
            engagement_rate: rate(total_viewed + total_clicked, total_sent * 2),
            daily,
            top_categories,
            top_templates,
        }
    }

    /// Append one line to the JSONL log under an advisory file lock.
    fn append_to_log(&self, event: &AnalyticsEvent) -> std::io::Result<()> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.lock_exclusive()?;
        let mut file = file;
        writeln!(file, "{}", serde_json::to_string(event)?)?;
        file.unlock()?;
        Ok(())
    }
}

/// numerator / denominator x 100,上下界钳制到 [0, 100]
///
/// 同一通知可多次记录 viewed/clicked 事件，分子可能超过分母。
fn rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64 * 100.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn aggregator(dir: &TempDir) -> AnalyticsAggregator {
        AnalyticsAggregator::new(dir.path().join("events.jsonl"))
    }

    #[test]
    fn test_empty_log_zero_metrics() {
        let dir = TempDir::new().unwrap();
        let metrics = aggregator(&dir).metrics();
        assert_eq!(metrics.total_sent, 0);
        assert_eq!(metrics.read_rate, 0.0);
        assert_eq!(metrics.click_through_rate, 0.0);
        assert_eq!(metrics.engagement_rate, 0.0);
        assert_eq!(metrics.daily.len(), 7);
        assert!(metrics.top_categories.is_empty());
    }

    #[test]
    fn test_rates_from_events() {
        // 2 sent + 1 viewed -> readRate 50
        let dir = TempDir::new().unwrap();
        let agg = aggregator(&dir);
        agg.track_event("n1", EventKind::Sent, None, None);
        agg.track_event("n1", EventKind::Sent, None, None);
        agg.track_event("n1", EventKind::Viewed, None, None);

        let metrics = agg.metrics();
        assert_eq!(metrics.total_sent, 2);
        assert_eq!(metrics.total_viewed, 1);
        assert_eq!(metrics.read_rate, 50.0);
        assert_eq!(metrics.click_through_rate, 0.0);
        assert_eq!(metrics.engagement_rate, 25.0);
    }

    #[test]
    fn test_rates_stay_in_bounds() {
        let dir = TempDir::new().unwrap();
        let agg = aggregator(&dir);
        for _ in 0..4 {
            agg.track_event("n1", EventKind::Sent, None, None);
        }
        for _ in 0..4 {
            agg.track_event("n1", EventKind::Viewed, None, None);
            agg.track_event("n1", EventKind::Clicked, None, None);
        }

        let metrics = agg.metrics();
        assert!(metrics.read_rate >= 0.0 && metrics.read_rate <= 100.0);
        assert!(metrics.click_through_rate >= 0.0 && metrics.click_through_rate <= 100.0);
        assert!(metrics.engagement_rate >= 0.0 && metrics.engagement_rate <= 100.0);
        assert_eq!(metrics.engagement_rate, 100.0);
    }

    #[test]
    fn test_rates_clamped_when_events_exceed_sends() {
        // 同一通知重复曝光/点击时分子超过分母，比率钳制在 100
        let dir = TempDir::new().unwrap();
        let agg = aggregator(&dir);
        agg.track_event("n1", EventKind::Sent, None, None);
        agg.track_event("n1", EventKind::Viewed, None, None);
        agg.track_event("n1", EventKind::Viewed, None, None);
        for _ in 0..3 {
            agg.track_event("n1", EventKind::Clicked, None, None);
        }

        let metrics = agg.metrics();
        assert_eq!(metrics.total_sent, 1);
        assert_eq!(metrics.total_viewed, 2);
        assert_eq!(metrics.total_clicked, 3);
        assert_eq!(metrics.read_rate, 100.0);
        assert_eq!(metrics.click_through_rate, 100.0);
        assert_eq!(metrics.engagement_rate, 100.0);
    }

    #[test]
    fn test_metrics_deterministic() {
        let dir = TempDir::new().unwrap();
        let agg = aggregator(&dir);
        agg.track_event("n1", EventKind::Sent, Some("tpl-1"), Some(serde_json::json!({"category": "job"})));
        agg.track_event("n2", EventKind::Sent, Some("tpl-2"), Some(serde_json::json!({"category": "payment"})));
        agg.track_event("n1", EventKind::Clicked, None, None);

        let first = agg.metrics();
        let second = agg.metrics();
        assert_eq!(first, second);
    }

    #[test]
    fn test_daily_buckets_today() {
        let dir = TempDir::new().unwrap();
        let agg = aggregator(&dir);
        agg.track_event("n1", EventKind::Sent, None, None);
        agg.track_event("n1", EventKind::Viewed, None, None);

        let metrics = agg.metrics();
        let today = metrics.daily.last().unwrap();
        assert_eq!(today.date, Utc::now().date_naive());
        assert_eq!(today.sent, 1);
        assert_eq!(today.viewed, 1);
        // 更早的桶为空
        assert!(metrics.daily[..6].iter().all(|d| d.sent == 0));
    }

    #[test]
    fn test_top_categories_descending() {
        let dir = TempDir::new().unwrap();
        let agg = aggregator(&dir);
        for _ in 0..3 {
            agg.track_event("n", EventKind::Sent, None, Some(serde_json::json!({"category": "job"})));
        }
        agg.track_event("n", EventKind::Sent, None, Some(serde_json::json!({"category": "payment"})));

        let metrics = agg.metrics();
        assert_eq!(metrics.top_categories[0].category, "job");
        assert_eq!(metrics.top_categories[0].count, 3);
        assert_eq!(metrics.top_categories[1].category, "payment");
    }

    #[test]
    fn test_top_templates_joined_with_names() {
        let dir = TempDir::new().unwrap();
        let agg = aggregator(&dir);
        agg.track_event("n1", EventKind::Sent, Some("tpl-1"), None);
        agg.track_event("n2", EventKind::Sent, Some("tpl-1"), None);
        agg.track_event("n3", EventKind::Sent, Some("tpl-2"), None);

        let names: HashMap<String, String> =
            [("tpl-1".to_string(), "Job Alert".to_string())].into_iter().collect();
        let metrics = agg.metrics_with_names(&names);

        assert_eq!(metrics.top_templates[0].template_id, "tpl-1");
        assert_eq!(metrics.top_templates[0].name.as_deref(), Some("Job Alert"));
        assert_eq!(metrics.top_templates[0].count, 2);
        assert!(metrics.top_templates[1].name.is_none());
    }

    #[test]
    fn test_read_and_dismissed_do_not_affect_totals() {
        let dir = TempDir::new().unwrap();
        let agg = aggregator(&dir);
        agg.track_event("n1", EventKind::Sent, None, None);
        agg.track_event("n1", EventKind::Read, None, None);
        agg.track_event("n1", EventKind::Dismissed, None, None);

        let metrics = agg.metrics();
        assert_eq!(metrics.total_sent, 1);
        assert_eq!(metrics.total_viewed, 0);
        assert_eq!(metrics.total_clicked, 0);
    }

    #[test]
    fn test_log_survives_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        {
            let agg = AnalyticsAggregator::new(path.clone());
            agg.track_event("n1", EventKind::Sent, Some("tpl-1"), None);
            agg.track_event("n1", EventKind::Viewed, None, None);
        }
        let reloaded = AnalyticsAggregator::load(path);
        assert_eq!(reloaded.events().len(), 2);
        assert_eq!(reloaded.metrics().total_sent, 1);
    }

    #[test]
    fn test_track_event_never_fails_on_bad_path() {
        // 路径不可写时事件仍进入内存日志
        let agg = AnalyticsAggregator::new(PathBuf::from("/dev/null/impossible/events.jsonl"));
        agg.track_event("n1", EventKind::Sent, None, None);
        assert_eq!(agg.events().len(), 1);
    }
}
