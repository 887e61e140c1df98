use serde::{Deserialize, Serialize};

/// 任务备注：按失败原因分桶的视图列表
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRemark {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub total_count: usize,
    pub details: Vec<RemarkBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemarkBucket {
    pub reason: String,
    pub view_ids: Vec<String>,
}

impl TaskRemark {
    pub fn with_description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Default::default()
        }
    }

    /// 按原因聚合 (reason, view_id)，桶顺序与首次出现顺序一致
    pub fn from_failures<I, R, V>(failures: I) -> Self
    where
        I: IntoIterator<Item = (R, V)>,
        R: Into<String>,
        V: Into<String>,
    {
        let mut remark = Self::default();
        for (reason, view_id) in failures {
            remark.push(reason, view_id);
        }
        remark
    }

    pub fn push(&mut self, reason: impl Into<String>, view_id: impl Into<String>) {
        let reason = reason.into();
        let view_id = view_id.into();
        match self.details.iter_mut().find(|b| b.reason == reason) {
            Some(bucket) => bucket.view_ids.push(view_id),
            None => self.details.push(RemarkBucket {
                reason,
                view_ids: vec![view_id],
            }),
        }
        self.total_count += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0 && self.description.is_none()
    }

    pub fn bucket(&self, reason: &str) -> Option<&RemarkBucket> {
        self.details.iter().find(|b| b.reason == reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_grouped_by_reason() {
        let remark = TaskRemark::from_failures([
            ("load", "v1"),
            ("explore", "v2"),
            ("load", "v3"),
        ]);

        assert_eq!(remark.total_count, 3);
        assert_eq!(remark.details.len(), 2);
        assert_eq!(remark.details[0].reason, "load");
        assert_eq!(remark.details[0].view_ids, vec!["v1", "v3"]);
        assert_eq!(remark.bucket("explore").unwrap().view_ids, vec!["v2"]);
    }

    #[test]
    fn test_description_only() {
        let remark = TaskRemark::with_description("boom");
        assert!(!remark.is_empty());
        assert_eq!(remark.total_count, 0);

        let json = serde_json::to_value(TaskRemark::default()).unwrap();
        assert!(json.get("description").is_none());
    }
}
