use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
struct PlanItem {
    /// Any JSON value; only its truthiness matters.
    #[serde(default)]
    apple_item: Option<Value>,
}

impl PlanItem {
    fn is_vendor_item(&self) -> bool {
        self.apple_item.as_ref().is_some_and(truthy)
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// The install plan written by the update check.
#[derive(Debug, Default, Deserialize)]
struct InstallPlan {
    #[serde(default)]
    managed_installs: Vec<PlanItem>,
    #[serde(default)]
    removals: Vec<PlanItem>,
}

// ---------------------------------------------------------------------------
// PendingUpdateSummary
// ---------------------------------------------------------------------------

/// Counts derived from the install plan on disk. Read-only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingUpdateSummary {
    pub managed_installs: usize,
    pub removals: usize,
    /// True if any planned install or removal is a platform-vendor item.
    pub has_vendor_items: bool,
}

impl PendingUpdateSummary {
    /// Summarize the plan at `path`. A missing plan means nothing is
    /// pending; an unreadable one is logged and treated the same way.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read(path) {
            Ok(d) => d,
            Err(_) => return Self::default(),
        };
        match serde_json::from_slice::<InstallPlan>(&data) {
            Ok(plan) => Self::from_plan(&plan),
            Err(e) => {
                tracing::error!("install info at {} is invalid: {e}", path.display());
                Self::default()
            }
        }
    }

    fn from_plan(plan: &InstallPlan) -> Self {
        Self {
            managed_installs: plan.managed_installs.len(),
            removals: plan.removals.len(),
            has_vendor_items: plan
                .managed_installs
                .iter()
                .chain(plan.removals.iter())
                .any(PlanItem::is_vendor_item),
        }
    }

    pub fn count(&self) -> usize {
        self.managed_installs + self.removals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_plan_is_empty() {
        let dir = TempDir::new().unwrap();
        let summary = PendingUpdateSummary::load(&dir.path().join("InstallInfo.json"));
        assert_eq!(summary, PendingUpdateSummary::default());
        assert_eq!(summary.count(), 0);
    }

    #[test]
    fn counts_installs_and_removals() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("InstallInfo.json");
        std::fs::write(
            &path,
            r#"{
                "managed_installs": [{"name": "Firefox"}, {"name": "Slack"}],
                "removals": [{"name": "OldVPN"}],
                "processed_installs": []
            }"#,
        )
        .unwrap();
        let summary = PendingUpdateSummary::load(&path);
        assert_eq!(summary.managed_installs, 2);
        assert_eq!(summary.removals, 1);
        assert_eq!(summary.count(), 3);
        assert!(!summary.has_vendor_items);
    }

    #[test]
    fn detects_vendor_item_in_removals() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("InstallInfo.json");
        std::fs::write(
            &path,
            r#"{"removals": [{"name": "Safari", "apple_item": true}]}"#,
        )
        .unwrap();
        assert!(PendingUpdateSummary::load(&path).has_vendor_items);
    }

    #[test]
    fn loosely_typed_vendor_flags_still_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("InstallInfo.json");
        std::fs::write(
            &path,
            r#"{"managed_installs": [{"name": "Firefox", "apple_item": null}, {"name": "Slack"}]}"#,
        )
        .unwrap();
        let summary = PendingUpdateSummary::load(&path);
        assert_eq!(summary.count(), 2);
        assert!(!summary.has_vendor_items);

        std::fs::write(
            &path,
            r#"{"managed_installs": [{"name": "Safari", "apple_item": 1}, {"name": "Xcode", "apple_item": ""}]}"#,
        )
        .unwrap();
        assert!(PendingUpdateSummary::load(&path).has_vendor_items);
    }

    #[test]
    fn invalid_plan_counts_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("InstallInfo.json");
        std::fs::write(&path, "{ truncated").unwrap();
        assert_eq!(PendingUpdateSummary::load(&path).count(), 0);
    }
}
